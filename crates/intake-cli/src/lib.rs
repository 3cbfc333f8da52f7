//! CLI argument model for the credential intake binary.
//!
//! Exposes the clap-backed `Cli` plus conversions into the plain config
//! structs consumed by the registry client and onboarding pipeline.

pub mod cli_args;

pub use cli_args::{Cli, InputSource};
