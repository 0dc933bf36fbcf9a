//! Package sources consumed by the pool builder.
//!
//! Repositories are read-only: the engine queries them for candidate
//! packages and never mutates them. Repository order inside a
//! [`RepositorySet`] doubles as priority (earlier wins ties in the policy).

use std::sync::Arc;

use indexmap::IndexMap;

use pakt_semver::{Constraint, VersionParser};

use crate::package::{AliasPackage, Package};
use crate::platform::is_platform_package;

/// A source of candidate packages.
pub trait Repository {
    /// Identifier used in diagnostics and priority bookkeeping.
    fn repo_name(&self) -> &str;

    /// Every package this repository offers.
    fn packages(&self) -> &[Arc<Package>];

    /// Alias entries this repository contributes (branch aliases).
    fn aliases(&self) -> &[Arc<AliasPackage>] {
        &[]
    }

    /// Packages named `name` whose version satisfies `constraint`.
    fn find_packages(&self, name: &str, constraint: Option<&Constraint>) -> Vec<Arc<Package>> {
        let parser = VersionParser::new();
        let name = name.to_lowercase();
        self.packages()
            .iter()
            .filter(|pkg| pkg.name == name)
            .filter(|pkg| match constraint {
                None => true,
                Some(constraint) => parser
                    .normalize(&pkg.version)
                    .map(|v| constraint.matches_version(&v))
                    .unwrap_or(false),
            })
            .cloned()
            .collect()
    }

    /// Packages whose `provide` or `replace` links contribute `name`.
    fn providers_of(&self, name: &str) -> Vec<Arc<Package>> {
        let name = name.to_lowercase();
        self.packages()
            .iter()
            .filter(|pkg| {
                pkg.provide.keys().any(|n| n.to_lowercase() == name)
                    || pkg.replace.keys().any(|n| n.to_lowercase() == name)
            })
            .cloned()
            .collect()
    }
}

/// An in-memory repository.
#[derive(Default, Clone)]
pub struct ArrayRepository {
    name: String,
    packages: Vec<Arc<Package>>,
    aliases: Vec<Arc<AliasPackage>>,
}

impl ArrayRepository {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            packages: Vec::new(),
            aliases: Vec::new(),
        }
    }

    pub fn add_package(&mut self, package: Package) -> &mut Self {
        self.packages.push(Arc::new(package));
        self
    }

    pub fn add_packages(&mut self, packages: impl IntoIterator<Item = Package>) -> &mut Self {
        for package in packages {
            self.add_package(package);
        }
        self
    }

    pub fn add_alias(&mut self, alias: AliasPackage) -> &mut Self {
        self.aliases.push(Arc::new(alias));
        self
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

impl Repository for ArrayRepository {
    fn repo_name(&self) -> &str {
        &self.name
    }

    fn packages(&self) -> &[Arc<Package>] {
        &self.packages
    }

    fn aliases(&self) -> &[Arc<AliasPackage>] {
        &self.aliases
    }
}

/// Repository synthesized from a platform probe: a map of platform package
/// name to detected version, where `None` marks a requirement that exists
/// but is disabled.
pub struct PlatformRepository {
    packages: Vec<Arc<Package>>,
    disabled: Vec<String>,
}

impl PlatformRepository {
    pub fn new(probe: IndexMap<String, Option<String>>) -> Self {
        let mut packages = Vec::new();
        let mut disabled = Vec::new();

        for (name, version) in probe {
            let name = name.to_lowercase();
            if !is_platform_package(&name) {
                continue;
            }
            match version {
                Some(version) => packages.push(Arc::new(Package::new(name, version))),
                None => disabled.push(name),
            }
        }

        Self { packages, disabled }
    }

    /// Whether the probe reported `name` as present but disabled.
    pub fn is_disabled(&self, name: &str) -> bool {
        self.disabled.iter().any(|n| n.eq_ignore_ascii_case(name))
    }
}

impl Repository for PlatformRepository {
    fn repo_name(&self) -> &str {
        "platform"
    }

    fn packages(&self) -> &[Arc<Package>] {
        &self.packages
    }
}

/// Ordered collection of repositories. The index of a repository is its
/// priority: lower index, higher priority.
#[derive(Default)]
pub struct RepositorySet {
    repositories: Vec<Box<dyn Repository>>,
}

impl RepositorySet {
    pub fn new() -> Self {
        Self {
            repositories: Vec::new(),
        }
    }

    pub fn add_repository(&mut self, repository: Box<dyn Repository>) -> &mut Self {
        self.repositories.push(repository);
        self
    }

    pub fn repositories(&self) -> impl Iterator<Item = (usize, &dyn Repository)> {
        self.repositories
            .iter()
            .enumerate()
            .map(|(i, repo)| (i, repo.as_ref()))
    }

    pub fn len(&self) -> usize {
        self.repositories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.repositories.is_empty()
    }

    /// All matching packages across repositories, in repository order.
    pub fn find_packages(
        &self,
        name: &str,
        constraint: Option<&Constraint>,
    ) -> Vec<(usize, Arc<Package>)> {
        let mut found = Vec::new();
        for (priority, repo) in self.repositories() {
            for pkg in repo.find_packages(name, constraint) {
                found.push((priority, pkg));
            }
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constraint(text: &str) -> Constraint {
        VersionParser::new().parse_constraints(text).unwrap()
    }

    #[test]
    fn test_array_repository_find() {
        let mut repo = ArrayRepository::new("test");
        repo.add_package(Package::new("vendor/a", "1.0.0"));
        repo.add_package(Package::new("vendor/a", "2.0.0"));
        repo.add_package(Package::new("vendor/b", "1.0.0"));

        assert_eq!(repo.find_packages("vendor/a", None).len(), 2);
        let c = constraint("^1.0");
        let matches = repo.find_packages("vendor/a", Some(&c));
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].version, "1.0.0");
        assert!(repo.find_packages("vendor/missing", None).is_empty());
    }

    #[test]
    fn test_array_repository_providers() {
        let mut repo = ArrayRepository::new("test");
        let mut replacer = Package::new("vendor/new", "1.0.0");
        replacer
            .replace
            .insert("vendor/old".to_string(), ">=1.0".to_string());
        repo.add_package(replacer);
        repo.add_package(Package::new("vendor/other", "1.0.0"));

        let providers = repo.providers_of("vendor/old");
        assert_eq!(providers.len(), 1);
        assert_eq!(providers[0].name, "vendor/new");
    }

    #[test]
    fn test_platform_repository() {
        let mut probe = IndexMap::new();
        probe.insert("php".to_string(), Some("8.2.0".to_string()));
        probe.insert("ext-json".to_string(), Some("8.2.0".to_string()));
        probe.insert("ext-curl".to_string(), None);
        // Non-platform names are ignored entirely.
        probe.insert("vendor/pkg".to_string(), Some("1.0".to_string()));

        let repo = PlatformRepository::new(probe);
        assert_eq!(repo.packages().len(), 2);
        assert!(repo.is_disabled("ext-curl"));
        assert!(!repo.is_disabled("ext-json"));
        assert!(!repo.find_packages("php", None).is_empty());
    }

    #[test]
    fn test_repository_set_order() {
        let mut first = ArrayRepository::new("first");
        first.add_package(Package::new("vendor/a", "1.0.0"));
        let mut second = ArrayRepository::new("second");
        second.add_package(Package::new("vendor/a", "1.0.0"));

        let mut set = RepositorySet::new();
        set.add_repository(Box::new(first));
        set.add_repository(Box::new(second));

        let found = set.find_packages("vendor/a", None);
        assert_eq!(found.len(), 2);
        // Repository order is preserved and exposed as priority.
        assert_eq!(found[0].0, 0);
        assert_eq!(found[1].0, 1);
    }
}
