//! Read-only view of a previously written lock document.
//!
//! The engine only ever reads lock data; writing it back belongs to the
//! surrounding tooling. Locked packages feed the solver twice: as version
//! preferences for the policy and, depending on the update policy, as fixed
//! assignments.

use std::sync::Arc;

use serde::Deserialize;

use crate::error::SolverError;
use crate::package::Package;
use crate::repository::Repository;

/// The subset of the lock document the engine consumes.
#[derive(Debug, Clone, Deserialize)]
pub struct LockFile {
    #[serde(default)]
    pub packages: Vec<Package>,

    #[serde(rename = "packages-dev", default)]
    pub packages_dev: Vec<Package>,

    #[serde(rename = "content-hash", default)]
    pub content_hash: Option<String>,
}

impl LockFile {
    /// Parse a lock document from its JSON form.
    pub fn from_json(json: &str) -> Result<Self, SolverError> {
        serde_json::from_str(json)
            .map_err(|e| SolverError::PoolBuildAborted(format!("invalid lock document: {}", e)))
    }

    /// Turn the lock data into a repository of prior packages.
    pub fn into_repository(self, include_dev: bool) -> LockedRepository {
        let mut packages: Vec<Arc<Package>> =
            self.packages.into_iter().map(Arc::new).collect();
        let dev_offset = packages.len();
        if include_dev {
            packages.extend(self.packages_dev.into_iter().map(Arc::new));
        }
        LockedRepository {
            packages,
            dev_offset,
        }
    }
}

/// Repository over the previously decided package set.
pub struct LockedRepository {
    packages: Vec<Arc<Package>>,
    dev_offset: usize,
}

impl LockedRepository {
    pub fn from_packages(packages: Vec<Package>) -> Self {
        let packages: Vec<Arc<Package>> = packages.into_iter().map(Arc::new).collect();
        let dev_offset = packages.len();
        Self {
            packages,
            dev_offset,
        }
    }

    /// Whether the locked entry at `name` came from the dev section.
    pub fn is_dev_package(&self, name: &str) -> bool {
        self.packages[self.dev_offset..]
            .iter()
            .any(|pkg| pkg.name.eq_ignore_ascii_case(name))
    }
}

impl Repository for LockedRepository {
    fn repo_name(&self) -> &str {
        "locked"
    }

    fn packages(&self) -> &[Arc<Package>] {
        &self.packages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOCK_JSON: &str = r#"{
        "content-hash": "abc123",
        "packages": [
            {
                "name": "vendor/a",
                "version": "1.0.0",
                "type": "library",
                "source": {"url": "https://example.org/a.git", "reference": "deadbeef"},
                "require": {"vendor/b": "^1.0"}
            },
            {
                "name": "vendor/b",
                "version": "1.2.0",
                "replace": {"vendor/b-legacy": "self.version"}
            }
        ],
        "packages-dev": [
            {"name": "vendor/testtool", "version": "3.0.0"}
        ]
    }"#;

    #[test]
    fn test_lock_parse() {
        let lock = LockFile::from_json(LOCK_JSON).unwrap();
        assert_eq!(lock.content_hash.as_deref(), Some("abc123"));
        assert_eq!(lock.packages.len(), 2);
        assert_eq!(lock.packages_dev.len(), 1);
        assert_eq!(lock.packages[0].require["vendor/b"], "^1.0");
        assert_eq!(
            lock.packages[0].source.as_ref().unwrap().reference,
            "deadbeef"
        );
    }

    #[test]
    fn test_lock_into_repository_with_dev() {
        let lock = LockFile::from_json(LOCK_JSON).unwrap();
        let repo = lock.into_repository(true);
        assert_eq!(repo.packages().len(), 3);
        assert!(repo.is_dev_package("vendor/testtool"));
        assert!(!repo.is_dev_package("vendor/a"));
    }

    #[test]
    fn test_lock_into_repository_without_dev() {
        let lock = LockFile::from_json(LOCK_JSON).unwrap();
        let repo = lock.into_repository(false);
        assert_eq!(repo.packages().len(), 2);
    }

    #[test]
    fn test_lock_invalid_json() {
        assert!(LockFile::from_json("{not json").is_err());
    }
}
