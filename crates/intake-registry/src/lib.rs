//! Credential registry seam for the intake pipeline.
//!
//! Defines the `CredentialRegistry` trait consumed by onboarding and an HTTP
//! implementation that talks to the registry admin API.

mod client;
mod types;

pub use client::{HttpRegistryClient, RegistryClientConfig, DEFAULT_REGISTRY_URL};
pub use types::{
    AuthMethod, CreatedCredential, CredentialRegistry, NewCredential, RegisteredCredential,
    RegistryError, UsageSnapshot,
};
