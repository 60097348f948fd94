//! Cache namespace model

use serde::{Deserialize, Serialize};

/// Which logical partition a namespace belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NamespaceKind {
    /// Precached, immutable-by-convention assets
    Static,
    /// Runtime-populated, bounded entries
    Dynamic,
}

impl NamespaceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NamespaceKind::Static => "static",
            NamespaceKind::Dynamic => "dynamic",
        }
    }
}

impl std::fmt::Display for NamespaceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named, versioned cache partition.
///
/// The version is embedded in `name`, so bumping it yields a fresh namespace
/// and orphans the previous one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheNamespace {
    pub name: String,
    pub version: String,
    pub kind: NamespaceKind,
    pub max_entries: Option<usize>,
}

impl CacheNamespace {
    /// Build the namespace for `app` at `version`.
    pub fn new(app: &str, version: &str, kind: NamespaceKind, max_entries: Option<usize>) -> Self {
        Self {
            name: Self::name_for(app, version, kind),
            version: version.to_string(),
            kind,
            max_entries,
        }
    }

    /// `<app>-<kind>-v<version>`
    pub fn name_for(app: &str, version: &str, kind: NamespaceKind) -> String {
        format!("{}-{}-v{}", app, kind.as_str(), version)
    }

    /// Whether inserts are bounded.
    pub fn is_bounded(&self) -> bool {
        self.kind == NamespaceKind::Dynamic && self.max_entries.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_naming() {
        let ns = CacheNamespace::new("shop", "3", NamespaceKind::Static, None);
        assert_eq!(ns.name, "shop-static-v3");
        assert!(!ns.is_bounded());

        let ns = CacheNamespace::new("shop", "3", NamespaceKind::Dynamic, Some(50));
        assert_eq!(ns.name, "shop-dynamic-v3");
        assert!(ns.is_bounded());
    }

    #[test]
    fn test_version_bump_changes_identity() {
        let old = CacheNamespace::new("shop", "1", NamespaceKind::Dynamic, Some(50));
        let new = CacheNamespace::new("shop", "2", NamespaceKind::Dynamic, Some(50));
        assert_ne!(old.name, new.name);
    }
}
