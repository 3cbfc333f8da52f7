//! Content-hash deduplication against the registry and the running batch.

use std::collections::HashMap;

use intake_registry::{CredentialRegistry, RegisteredCredential, RegistryError};
use sha2::{Digest, Sha256};

use crate::input::SecretToken;

/// Returns the lowercase hex SHA-256 digest used as a credential's content hash.
pub fn content_hash(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}

/// Short, log-safe prefix of a content hash.
pub fn hash_preview(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// What is known about a credential whose hash is already indexed.
pub struct ExistingCredential {
    pub remote_id: Option<u64>,
    pub identity: Option<String>,
    /// Registry reports the credential as disabled; it still blocks re-import.
    pub disabled: bool,
}

/// Content hashes of credentials that are already onboarded.
///
/// Entries are only ever added; a run never removes membership.
#[derive(Debug, Clone, Default)]
pub struct ExistingIndex {
    entries: HashMap<String, ExistingCredential>,
}

impl ExistingIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_registered(credentials: &[RegisteredCredential]) -> Self {
        let mut index = Self::new();
        for credential in credentials {
            let Some(hash) = credential.content_hash.as_deref() else {
                continue;
            };
            index.insert(
                hash.to_ascii_lowercase(),
                ExistingCredential {
                    remote_id: Some(credential.remote_id),
                    identity: credential.identity.clone(),
                    disabled: credential.disabled,
                },
            );
        }
        index
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.entries.contains_key(hash)
    }

    pub fn get(&self, hash: &str) -> Option<&ExistingCredential> {
        self.entries.get(hash)
    }

    /// Adds a hash; returns false when it was already present, in which case
    /// the first recorded credential is kept.
    pub fn insert(&mut self, hash: String, existing: ExistingCredential) -> bool {
        if self.entries.contains_key(&hash) {
            return false;
        }
        self.entries.insert(hash, existing);
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Seeds an index from the registry's current credential set.
pub async fn load_existing_index(
    registry: &dyn CredentialRegistry,
) -> Result<ExistingIndex, RegistryError> {
    let credentials = registry.list_credentials().await?;
    let index = ExistingIndex::from_registered(&credentials);
    tracing::info!(
        registry_credentials = credentials.len(),
        indexed_hashes = index.len(),
        disabled = credentials.iter().filter(|credential| credential.disabled).count(),
        "seeded existing credential index"
    );
    Ok(index)
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Enumerates supported `DedupVerdict` values.
pub enum DedupVerdict {
    New {
        hash: String,
    },
    Duplicate {
        hash: String,
        existing: ExistingCredential,
    },
}

impl DedupVerdict {
    pub fn hash(&self) -> &str {
        match self {
            DedupVerdict::New { hash } | DedupVerdict::Duplicate { hash, .. } => hash,
        }
    }
}

/// Classifies inputs against an index borrowed for the duration of a run.
pub struct DuplicateDetector<'a> {
    index: &'a mut ExistingIndex,
    hashes_computed: usize,
}

impl<'a> DuplicateDetector<'a> {
    pub fn new(index: &'a mut ExistingIndex) -> Self {
        Self {
            index,
            hashes_computed: 0,
        }
    }

    /// Hashes the token once and reports whether it is already indexed.
    pub fn classify(&mut self, token: &SecretToken) -> DedupVerdict {
        let hash = content_hash(token.expose());
        self.hashes_computed += 1;
        match self.index.get(&hash) {
            Some(existing) => DedupVerdict::Duplicate {
                existing: existing.clone(),
                hash,
            },
            None => DedupVerdict::New { hash },
        }
    }

    /// Records a successfully onboarded credential so later inputs match it.
    pub fn commit(&mut self, hash: String, existing: ExistingCredential) -> bool {
        self.index.insert(hash, existing)
    }

    pub fn hashes_computed(&self) -> usize {
        self.hashes_computed
    }

    pub fn index(&self) -> &ExistingIndex {
        self.index
    }
}
