use crate::descriptor::{identity_from_entry_digests, DescriptorIdentity, EnvironmentDescriptor};
use crate::types::ValueDigest;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock file I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("lock file parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("lock file serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("descriptor serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported lock_version: {0}, expected 1")]
    UnsupportedVersion(u32),
    #[error("lock file digest mismatch: lock has '{lock_digest}', recomputed '{computed_digest}'")]
    DigestMismatch {
        lock_digest: String,
        computed_digest: String,
    },
    #[error("descriptor drifted from lock file: {}", join_drift(.0))]
    Drift(Vec<EntryDrift>),
}

/// One difference between a lock file and a freshly composed descriptor.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum EntryDrift {
    Added(String),
    Removed(String),
    Changed(String),
}

impl fmt::Display for EntryDrift {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryDrift::Added(id) => write!(f, "'{id}' added"),
            EntryDrift::Removed(id) => write!(f, "'{id}' removed"),
            EntryDrift::Changed(id) => write!(f, "'{id}' changed"),
        }
    }
}

fn join_drift(drift: &[EntryDrift]) -> String {
    drift
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Snapshot of a composed descriptor: one digest per entry plus the
/// descriptor digest derived from them.
///
/// `generated_at` is informational and excluded from every digest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DescriptorLock {
    pub lock_version: u32,
    pub digest: String,
    pub short_digest: String,
    pub generated_at: String,
    #[serde(default)]
    pub entries: BTreeMap<String, ValueDigest>,
}

impl DescriptorLock {
    pub fn from_descriptor(descriptor: &EnvironmentDescriptor) -> Result<Self, LockError> {
        let entries = descriptor.entry_digests()?;
        let identity = identity_from_entry_digests(&entries);
        Ok(DescriptorLock {
            lock_version: 1,
            digest: identity.digest.into_inner(),
            short_digest: identity.short_digest.into_inner(),
            generated_at: chrono::Utc::now().to_rfc3339(),
            entries,
        })
    }

    /// Verify that the stored digest matches the stored entry digests.
    pub fn verify_integrity(&self) -> Result<DescriptorIdentity, LockError> {
        if self.lock_version != 1 {
            return Err(LockError::UnsupportedVersion(self.lock_version));
        }
        let identity = identity_from_entry_digests(&self.entries);
        if self.digest != identity.digest.as_str() {
            return Err(LockError::DigestMismatch {
                lock_digest: self.digest.clone(),
                computed_digest: identity.digest.into_inner(),
            });
        }
        Ok(identity)
    }

    /// Compare against a freshly composed descriptor, reporting every
    /// added, removed, or changed id.
    pub fn verify_descriptor(&self, descriptor: &EnvironmentDescriptor) -> Result<(), LockError> {
        let current = descriptor.entry_digests()?;
        let mut drift = Vec::new();

        for (id, digest) in &current {
            match self.entries.get(id) {
                None => drift.push(EntryDrift::Added(id.clone())),
                Some(locked) if locked != digest => drift.push(EntryDrift::Changed(id.clone())),
                Some(_) => {}
            }
        }
        for id in self.entries.keys() {
            if !current.contains_key(id) {
                drift.push(EntryDrift::Removed(id.clone()));
            }
        }

        if drift.is_empty() {
            Ok(())
        } else {
            drift.sort();
            Err(LockError::Drift(drift))
        }
    }

    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<(), LockError> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)?;
        let dir = path.parent().unwrap_or(Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        std::io::Write::write_all(&mut tmp, content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| LockError::Io(e.error))?;
        // Directory fsync is best-effort; some filesystems refuse it.
        if let Ok(f) = fs::File::open(dir) {
            let _ = f.sync_all();
        }
        Ok(())
    }

    pub fn read_from_file(path: impl AsRef<Path>) -> Result<Self, LockError> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }
}
