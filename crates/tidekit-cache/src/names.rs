//! Version-tagged cache namespace names.

/// The pair of namespace names owned by one deployed version.
///
/// Changing the version tag changes both names, which is what drives
/// whole-generation eviction on the next activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheNames {
    /// Precache namespace, populated once at install.
    pub precache: String,
    /// Runtime namespace, populated lazily at fetch time.
    pub runtime: String,
}

impl CacheNames {
    /// Derive the namespace names for an app and version tag.
    pub fn derive(app: &str, version: &str) -> Self {
        Self {
            precache: format!("{}-{}", app, version),
            runtime: format!("{}-runtime-{}", app, version),
        }
    }

    /// Whether a storage-level namespace name belongs to this version.
    pub fn owns(&self, name: &str) -> bool {
        name == self.precache || name == self.runtime
    }
}
