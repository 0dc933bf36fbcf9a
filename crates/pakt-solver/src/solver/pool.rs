//! The candidate pool for one solve.
//!
//! Every candidate (package or alias entry) gets a dense 1-based id; a
//! positive literal on that id means "install", negative means "do not
//! install". The pool indexes candidates by name and by the names they
//! provide or replace, and caches parsed versions and constraints so rule
//! generation does not re-parse on every lookup.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;

use pakt_semver::{Constraint, Stability, Version, VersionParser};

use crate::package::{AliasPackage, Package};

/// Identifier of a pool candidate. Positive literals are this id, negative
/// literals its negation.
pub type PackageId = i32;

/// A pool slot: a concrete package or an alias of one.
#[derive(Debug, Clone)]
pub enum PoolEntry {
    Package(Arc<Package>),
    Alias(Arc<AliasPackage>),
}

impl PoolEntry {
    pub fn name(&self) -> &str {
        match self {
            PoolEntry::Package(p) => p.name(),
            PoolEntry::Alias(a) => a.name(),
        }
    }

    pub fn version(&self) -> &str {
        match self {
            PoolEntry::Package(p) => p.version(),
            PoolEntry::Alias(a) => a.version(),
        }
    }

    pub fn pretty_string(&self) -> String {
        match self {
            PoolEntry::Package(p) => p.pretty_string(),
            PoolEntry::Alias(a) => a.pretty_string(),
        }
    }

    pub fn is_alias(&self) -> bool {
        matches!(self, PoolEntry::Alias(_))
    }

    pub fn as_package(&self) -> Option<&Arc<Package>> {
        match self {
            PoolEntry::Package(p) => Some(p),
            PoolEntry::Alias(_) => None,
        }
    }

    pub fn as_alias(&self) -> Option<&Arc<AliasPackage>> {
        match self {
            PoolEntry::Alias(a) => Some(a),
            PoolEntry::Package(_) => None,
        }
    }

    pub fn stability(&self) -> Stability {
        match self {
            PoolEntry::Package(p) => p.stability(),
            PoolEntry::Alias(a) => a.stability(),
        }
    }
}

/// Records that a candidate contributes a name through `provide` or
/// `replace`, together with the constraint that name is offered at.
#[derive(Debug, Clone)]
pub struct ProviderRecord {
    pub id: PackageId,
    pub constraint: String,
}

/// The immutable candidate universe for one solve.
pub struct Pool {
    entries: Vec<PoolEntry>,

    /// Repository priority per entry (parallel to `entries`); lower wins.
    repo_priority: Vec<usize>,

    /// Candidate ids per package name, in insertion order.
    by_name: IndexMap<String, Vec<PackageId>>,

    /// Provider records per provided/replaced name, in insertion order.
    providers: IndexMap<String, Vec<ProviderRecord>>,

    /// Alias id to base package id.
    alias_map: HashMap<PackageId, PackageId>,

    minimum_stability: Stability,

    /// Per-name overrides of the minimum stability.
    stability_flags: IndexMap<String, Stability>,

    parsed_versions: RefCell<HashMap<PackageId, Option<Version>>>,
    parsed_constraints: RefCell<HashMap<String, Option<Constraint>>>,
}

impl Pool {
    pub fn new() -> Self {
        Self::with_minimum_stability(Stability::Stable)
    }

    pub fn with_minimum_stability(minimum_stability: Stability) -> Self {
        Self {
            entries: Vec::new(),
            repo_priority: Vec::new(),
            by_name: IndexMap::new(),
            providers: IndexMap::new(),
            alias_map: HashMap::new(),
            minimum_stability,
            stability_flags: IndexMap::new(),
            parsed_versions: RefCell::new(HashMap::new()),
            parsed_constraints: RefCell::new(HashMap::new()),
        }
    }

    pub fn minimum_stability(&self) -> Stability {
        self.minimum_stability
    }

    pub fn add_stability_flag(&mut self, name: &str, stability: Stability) {
        self.stability_flags.insert(name.to_lowercase(), stability);
    }

    pub fn stability_flags(&self) -> &IndexMap<String, Stability> {
        &self.stability_flags
    }

    fn effective_minimum_stability(&self, name: &str) -> Stability {
        self.stability_flags
            .get(&name.to_lowercase())
            .copied()
            .unwrap_or(self.minimum_stability)
    }

    /// Whether a candidate of this name and stability may enter the pool.
    pub fn accepts_stability(&self, name: &str, stability: Stability) -> bool {
        stability.is_acceptable(self.effective_minimum_stability(name))
    }

    /// Add a package candidate. Returns 0 when the candidate is filtered out
    /// by the stability policy.
    pub fn add_package(&mut self, package: Package) -> PackageId {
        self.add_package_arc(Arc::new(package), 0)
    }

    /// Add a package candidate from the repository with the given priority.
    pub fn add_package_from_repo(&mut self, package: Package, priority: usize) -> PackageId {
        self.add_package_arc(Arc::new(package), priority)
    }

    pub fn add_package_arc(&mut self, package: Arc<Package>, priority: usize) -> PackageId {
        if !self.accepts_stability(&package.name, package.stability()) {
            return 0;
        }
        self.add_package_unchecked(package, priority)
    }

    /// Add a package bypassing the stability filter (fixed and locked
    /// candidates stay in the pool whatever their stability).
    pub fn add_package_unchecked(&mut self, package: Arc<Package>, priority: usize) -> PackageId {
        let id = (self.entries.len() + 1) as PackageId;
        let name = package.name.to_lowercase();

        self.by_name.entry(name).or_default().push(id);

        for (provided, constraint) in package.provide.iter().chain(package.replace.iter()) {
            self.providers
                .entry(provided.to_lowercase())
                .or_default()
                .push(ProviderRecord {
                    id,
                    constraint: constraint.clone(),
                });
        }

        self.entries.push(PoolEntry::Package(package));
        self.repo_priority.push(priority);
        id
    }

    /// Materialize an alias of an existing pool entry.
    pub fn add_alias(
        &mut self,
        base_id: PackageId,
        alias_version: &str,
        is_root_package_alias: bool,
    ) -> PackageId {
        let Some(base) = self.package(base_id).cloned() else {
            return 0;
        };

        let mut alias = AliasPackage::new(
            base,
            alias_version.to_string(),
            alias_version.to_string(),
        );
        alias.set_root_package_alias(is_root_package_alias);

        let priority = self.priority_of(base_id);
        self.add_alias_arc(Arc::new(alias), priority, Some(base_id))
    }

    pub fn add_alias_package(&mut self, alias: AliasPackage) -> PackageId {
        let base = alias.alias_of().clone();
        let base_id = self.find_package_id(base.name(), base.version());
        self.add_alias_arc(Arc::new(alias), 0, base_id)
    }

    pub fn add_alias_arc(
        &mut self,
        alias: Arc<AliasPackage>,
        priority: usize,
        base_id: Option<PackageId>,
    ) -> PackageId {
        let id = (self.entries.len() + 1) as PackageId;
        let name = alias.name().to_lowercase();

        self.by_name.entry(name).or_default().push(id);

        for (provided, constraint) in alias.provide().iter().chain(alias.replace().iter()) {
            self.providers
                .entry(provided.to_lowercase())
                .or_default()
                .push(ProviderRecord {
                    id,
                    constraint: constraint.clone(),
                });
        }

        if let Some(base_id) = base_id {
            self.alias_map.insert(id, base_id);
        }

        self.entries.push(PoolEntry::Alias(alias));
        self.repo_priority.push(priority);
        id
    }

    pub fn entry(&self, id: PackageId) -> Option<&PoolEntry> {
        if id <= 0 {
            return None;
        }
        self.entries.get((id - 1) as usize)
    }

    pub fn package(&self, id: PackageId) -> Option<&Arc<Package>> {
        self.entry(id).and_then(|e| e.as_package())
    }

    pub fn is_alias(&self, id: PackageId) -> bool {
        self.entry(id).map_or(false, |e| e.is_alias())
    }

    pub fn is_root_package_alias(&self, id: PackageId) -> bool {
        self.entry(id)
            .and_then(|e| e.as_alias())
            .map_or(false, |a| a.is_root_package_alias())
    }

    pub fn alias_base(&self, id: PackageId) -> Option<PackageId> {
        self.alias_map.get(&id).copied()
    }

    /// Alias ids of a base package, in id order.
    pub fn aliases_of(&self, base_id: PackageId) -> Vec<PackageId> {
        let mut ids: Vec<PackageId> = self
            .alias_map
            .iter()
            .filter(|(_, &base)| base == base_id)
            .map(|(&alias, _)| alias)
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn priority_of(&self, id: PackageId) -> usize {
        if id <= 0 {
            return 0;
        }
        self.repo_priority.get((id - 1) as usize).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn package_ids(&self) -> impl Iterator<Item = PackageId> {
        1..=(self.entries.len() as PackageId)
    }

    pub fn packages_by_name(&self, name: &str) -> Vec<PackageId> {
        self.by_name
            .get(&name.to_lowercase())
            .cloned()
            .unwrap_or_default()
    }

    pub fn name_of(&self, id: PackageId) -> Option<&str> {
        self.entry(id).map(|e| e.name())
    }

    /// The parsed version of a candidate, cached per id.
    pub fn version_of(&self, id: PackageId) -> Option<Version> {
        if let Some(cached) = self.parsed_versions.borrow().get(&id) {
            return cached.clone();
        }
        let version = self
            .entry(id)
            .and_then(|e| VersionParser::new().normalize(e.version()).ok());
        self.parsed_versions.borrow_mut().insert(id, version.clone());
        version
    }

    /// Parse a constraint expression, cached per expression text.
    pub fn parse_constraint(&self, text: &str) -> Option<Constraint> {
        if text == "*" || text.is_empty() {
            return Some(Constraint::Any);
        }
        if let Some(cached) = self.parsed_constraints.borrow().get(text) {
            return cached.clone();
        }
        let parsed = VersionParser::new().parse_constraints(text).ok();
        self.parsed_constraints
            .borrow_mut()
            .insert(text.to_string(), parsed.clone());
        parsed
    }

    fn find_package_id(&self, name: &str, version: &str) -> Option<PackageId> {
        self.by_name
            .get(&name.to_lowercase())?
            .iter()
            .copied()
            .find(|&id| self.entry(id).map_or(false, |e| e.version() == version))
    }

    /// Whether the candidate's own version satisfies `constraint`.
    pub fn matches_constraint(&self, id: PackageId, constraint: Option<&Constraint>) -> bool {
        let Some(constraint) = constraint else {
            return true;
        };
        if *constraint == Constraint::Any {
            return true;
        }
        match self.version_of(id) {
            Some(version) => constraint.matches_version(&version),
            // Unparseable versions are accepted rather than silently lost.
            None => true,
        }
    }

    fn provided_constraint_matches(
        &self,
        record: &ProviderRecord,
        constraint: Option<&Constraint>,
    ) -> bool {
        let Some(constraint) = constraint else {
            return true;
        };
        if *constraint == Constraint::Any || record.constraint == "*" {
            return true;
        }
        match self.parse_constraint(&record.constraint) {
            Some(provided) => constraint.matches(&provided),
            None => true,
        }
    }

    /// All candidates offering `name` at a version satisfying `constraint`:
    /// direct matches plus provide/replace contributions.
    pub fn what_provides(&self, name: &str, constraint: Option<&Constraint>) -> Vec<PackageId> {
        self.what_provides_filtered(name, constraint, true)
    }

    /// Direct candidates only, no providers or replacers.
    pub fn what_provides_direct(
        &self,
        name: &str,
        constraint: Option<&Constraint>,
    ) -> Vec<PackageId> {
        self.what_provides_filtered(name, constraint, false)
    }

    fn what_provides_filtered(
        &self,
        name: &str,
        constraint: Option<&Constraint>,
        include_providers: bool,
    ) -> Vec<PackageId> {
        let name = name.to_lowercase();
        let mut result = Vec::new();

        if let Some(ids) = self.by_name.get(&name) {
            for &id in ids {
                if self.matches_constraint(id, constraint) {
                    result.push(id);
                }
            }
        }

        if include_providers {
            if let Some(records) = self.providers.get(&name) {
                for record in records {
                    if !result.contains(&record.id)
                        && self.provided_constraint_matches(record, constraint)
                    {
                        result.push(record.id);
                    }
                }
            }
        }

        result
    }

    /// Provider records registered for `name`.
    pub fn provider_records(&self, name: &str) -> &[ProviderRecord] {
        self.providers
            .get(&name.to_lowercase())
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }
}

impl Default for Pool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pakt_semver::VersionParser;

    fn constraint(text: &str) -> Constraint {
        VersionParser::new().parse_constraints(text).unwrap()
    }

    #[test]
    fn test_pool_ids_are_one_based() {
        let mut pool = Pool::new();
        let id = pool.add_package(Package::new("vendor/a", "1.0.0"));
        assert_eq!(id, 1);
        assert_eq!(pool.len(), 1);
        assert!(pool.entry(0).is_none());
        assert_eq!(pool.package(1).unwrap().name, "vendor/a");
    }

    #[test]
    fn test_pool_by_name() {
        let mut pool = Pool::new();
        pool.add_package(Package::new("vendor/a", "1.0.0"));
        pool.add_package(Package::new("vendor/a", "2.0.0"));
        pool.add_package(Package::new("vendor/b", "1.0.0"));

        assert_eq!(pool.packages_by_name("vendor/a").len(), 2);
        assert_eq!(pool.packages_by_name("Vendor/A").len(), 2);
        assert!(pool.packages_by_name("vendor/c").is_empty());
    }

    #[test]
    fn test_what_provides_with_constraint() {
        let mut pool = Pool::new();
        pool.add_package(Package::new("php", "8.4.0"));
        pool.add_package(Package::new("php", "8.2.0"));
        pool.add_package(Package::new("php", "7.4.0"));

        assert_eq!(pool.what_provides("php", Some(&constraint(">=8.4"))).len(), 1);
        assert_eq!(pool.what_provides("php", Some(&constraint(">=8.0"))).len(), 2);
        assert_eq!(pool.what_provides("php", Some(&constraint("^7.4"))).len(), 1);
        assert_eq!(pool.what_provides("php", None).len(), 3);
    }

    #[test]
    fn test_what_provides_includes_providers() {
        let mut pool = Pool::new();
        let mut implementation = Package::new("vendor/impl", "1.0.0");
        implementation
            .provide
            .insert("vendor/interface".to_string(), "1.0.0".to_string());
        pool.add_package(implementation);
        pool.add_package(Package::new("vendor/interface", "1.0.0"));

        assert_eq!(pool.what_provides("vendor/interface", None).len(), 2);
        assert_eq!(pool.what_provides_direct("vendor/interface", None).len(), 1);
    }

    #[test]
    fn test_provider_constraint_matching() {
        let mut pool = Pool::new();
        for (version, provided) in [("1.0.0", "1.0.0"), ("2.0.0", "2.0.0"), ("3.0.0", "3.0.0")] {
            let mut pkg = Package::new("acme/logger", version);
            pkg.provide
                .insert("acme/log-impl".to_string(), provided.to_string());
            pool.add_package(pkg);
        }

        assert_eq!(pool.what_provides("acme/log-impl", Some(&constraint("^1.0"))).len(), 1);
        assert_eq!(pool.what_provides("acme/log-impl", Some(&constraint(">=2.0"))).len(), 2);
        assert_eq!(pool.what_provides("acme/log-impl", None).len(), 3);
    }

    #[test]
    fn test_provider_wildcard() {
        let mut pool = Pool::new();
        let mut pkg = Package::new("vendor/impl", "1.0.0");
        pkg.provide
            .insert("vendor/interface".to_string(), "*".to_string());
        pool.add_package(pkg);

        assert_eq!(pool.what_provides("vendor/interface", Some(&constraint("^99.0"))).len(), 1);
    }

    #[test]
    fn test_replace_registers_provider() {
        let mut pool = Pool::new();
        let mut replacer = Package::new("acme/new", "1.0.0");
        replacer
            .replace
            .insert("acme/old".to_string(), ">=1.0".to_string());
        pool.add_package(replacer);

        assert_eq!(pool.what_provides("acme/old", Some(&constraint("^1.0"))).len(), 1);
        assert!(pool.what_provides("acme/old", Some(&constraint("^2.0"))).is_empty());
        assert_eq!(pool.provider_records("acme/old").len(), 1);
    }

    #[test]
    fn test_stability_filtering() {
        let mut pool = Pool::new();
        assert_ne!(pool.add_package(Package::new("vendor/pkg", "1.0.0")), 0);
        assert_eq!(pool.add_package(Package::new("vendor/pkg", "2.0.0-dev")), 0);
        assert_eq!(pool.add_package(Package::new("vendor/pkg", "2.0.0-beta1")), 0);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_stability_minimum_dev() {
        let mut pool = Pool::with_minimum_stability(Stability::Dev);
        pool.add_package(Package::new("vendor/pkg", "1.0.0"));
        pool.add_package(Package::new("vendor/pkg", "2.0.0-dev"));
        pool.add_package(Package::new("vendor/pkg", "3.0.0-alpha1"));
        assert_eq!(pool.len(), 3);
    }

    #[test]
    fn test_stability_flags_override() {
        let mut pool = Pool::new();
        pool.add_stability_flag("vendor/dev-pkg", Stability::Dev);

        assert_eq!(pool.add_package(Package::new("vendor/other", "1.0.0-dev")), 0);
        assert_ne!(pool.add_package(Package::new("vendor/dev-pkg", "1.0.0-dev")), 0);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_alias_entries() {
        let mut pool = Pool::with_minimum_stability(Stability::Dev);
        let base_id = pool.add_package(Package::new("vendor/pkg", "dev-main"));
        let alias_id = pool.add_alias(base_id, "1.0.0.0", false);

        assert!(alias_id > base_id);
        assert!(pool.is_alias(alias_id));
        assert!(!pool.is_alias(base_id));
        assert_eq!(pool.alias_base(alias_id), Some(base_id));
        assert_eq!(pool.aliases_of(base_id), vec![alias_id]);

        // The alias is indexed under the package name.
        assert_eq!(pool.packages_by_name("vendor/pkg").len(), 2);
        // A stable constraint reaches only the alias.
        assert_eq!(pool.what_provides("vendor/pkg", Some(&constraint("^1.0"))).len(), 1);
        // The branch constraint reaches only the base.
        assert_eq!(pool.what_provides("vendor/pkg", Some(&constraint("dev-main"))).len(), 1);
    }

    #[test]
    fn test_root_package_alias_flag() {
        let mut pool = Pool::with_minimum_stability(Stability::Dev);
        let base_id = pool.add_package(Package::new("vendor/pkg", "dev-main"));
        let alias_id = pool.add_alias(base_id, "1.0.0.0", true);
        assert!(pool.is_root_package_alias(alias_id));
        assert!(!pool.is_root_package_alias(base_id));
    }

    #[test]
    fn test_repo_priority_recorded() {
        let mut pool = Pool::new();
        let first = pool.add_package_from_repo(Package::new("vendor/a", "1.0.0"), 0);
        let second = pool.add_package_from_repo(Package::new("vendor/a", "1.0.0"), 1);
        assert_eq!(pool.priority_of(first), 0);
        assert_eq!(pool.priority_of(second), 1);
    }

    #[test]
    fn test_version_cache() {
        let mut pool = Pool::new();
        let id = pool.add_package(Package::new("vendor/a", "1.2.3"));
        let first = pool.version_of(id).unwrap();
        let second = pool.version_of(id).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.to_string(), "1.2.3.0");
    }
}
