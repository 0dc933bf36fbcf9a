//! Demand-driven construction of the candidate pool.
//!
//! Rather than copying whole repositories, the builder expands outward from
//! the root requirements: each wave loads the candidates matching the union
//! of all constraints collected for a name so far, then enqueues the names
//! reachable through their require, replace and provide links. Stability
//! limits and the platform requirement filter decide what enters the pool;
//! an ignored platform requirement pulls nothing at all.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use indexmap::IndexMap;

use pakt_semver::{Constraint, Stability};

use crate::package::Package;
use crate::platform::PlatformRequirementFilter;
use crate::repository::RepositorySet;

use super::pool::Pool;
use super::request::Request;

pub struct PoolBuilder {
    minimum_stability: Stability,
    stability_flags: IndexMap<String, Stability>,
    platform_filter: PlatformRequirementFilter,
}

impl PoolBuilder {
    pub fn new() -> Self {
        Self {
            minimum_stability: Stability::Stable,
            stability_flags: IndexMap::new(),
            platform_filter: PlatformRequirementFilter::No,
        }
    }

    pub fn minimum_stability(mut self, stability: Stability) -> Self {
        self.minimum_stability = stability;
        self
    }

    pub fn stability_flag(mut self, name: &str, stability: Stability) -> Self {
        self.stability_flags.insert(name.to_lowercase(), stability);
        self
    }

    pub fn platform_filter(mut self, filter: PlatformRequirementFilter) -> Self {
        self.platform_filter = filter;
        self
    }

    /// Expand the request's transitive candidate closure over the
    /// repositories into a pool.
    pub fn build_pool(&self, repositories: &RepositorySet, request: &Request) -> Pool {
        let mut pool = Pool::with_minimum_stability(self.minimum_stability);
        for (name, stability) in &self.stability_flags {
            pool.add_stability_flag(name, *stability);
        }

        let mut state = BuildState::default();

        // Fixed and non-updatable locked names are pinned to their exact
        // version; loading wider ranges for them would be wasted work.
        for fixed in &request.fixed_packages {
            let exact = pool
                .parse_constraint(&format!("={}", fixed.version))
                .unwrap_or(Constraint::Any);
            state.loaded.insert(fixed.name.to_lowercase(), exact);
        }

        for locked in &request.locked_packages {
            let name = locked.name.to_lowercase();
            if request.is_update_allowed(&name) {
                continue;
            }
            let exact = pool
                .parse_constraint(&format!("={}", locked.version))
                .unwrap_or(Constraint::Any);
            state.loaded.insert(name, exact);

            for replaced in locked.replace.keys() {
                state
                    .loaded
                    .entry(replaced.to_lowercase())
                    .or_insert(Constraint::Any);
            }
        }

        for (name, constraint_str) in request.all_requires() {
            let name = name.to_lowercase();
            if self.platform_filter.ignores(&name) || state.loaded.contains_key(&name) {
                continue;
            }
            let constraint = pool.parse_constraint(constraint_str).unwrap_or(Constraint::Any);
            state.mark_for_loading(&name, constraint);
        }

        while !state.to_load.is_empty() {
            self.load_wave(&mut pool, repositories, &mut state);
        }

        log::info!(
            "Built pool of {} candidates from {} repositories",
            pool.len(),
            repositories.len()
        );

        // Seed fixed and locked packages that no repository supplied; they
        // bypass the stability filter.
        for package in request
            .fixed_packages
            .iter()
            .chain(request.locked_packages.iter())
        {
            if !pool
                .packages_by_name(&package.name)
                .iter()
                .any(|&id| pool.entry(id).map_or(false, |e| e.version() == package.version))
            {
                pool.add_package_unchecked(Arc::clone(package), 0);
            }
        }

        // Materialize remaining branch aliases whose base entered the pool
        // through some other constraint.
        for (priority, repo) in repositories.repositories() {
            for alias in repo.aliases() {
                if !state.seen_aliases.insert(alias_key(alias, priority)) {
                    continue;
                }
                let base = alias.alias_of();
                if let Some(base_id) = find_in_pool(&pool, base.name(), base.version()) {
                    pool.add_alias_arc(Arc::clone(alias), priority, Some(base_id));
                }
            }
        }

        pool
    }

    fn load_wave(&self, pool: &mut Pool, repositories: &RepositorySet, state: &mut BuildState) {
        let wave: Vec<(String, Constraint)> = state.to_load.drain(..).collect();

        for (name, constraint) in &wave {
            state.loaded.insert(name.clone(), constraint.clone());
        }

        for (name, constraint) in &wave {
            for (priority, repo) in repositories.repositories() {
                for package in repo.find_packages(name, Some(constraint)) {
                    self.load_package(pool, state, package, priority);
                }

                // An alias satisfying the constraint pulls in its base even
                // when the base version itself is out of range.
                for alias in repo.aliases() {
                    if alias.name() != name {
                        continue;
                    }
                    let matches = pakt_semver::VersionParser::new()
                        .normalize(alias.version())
                        .map(|v| constraint.matches_version(&v))
                        .unwrap_or(false);
                    if !matches {
                        continue;
                    }

                    let base = alias.alias_of();
                    self.load_package(pool, state, Arc::clone(base), priority);

                    if state.seen_aliases.insert(alias_key(alias, priority)) {
                        if let Some(base_id) = find_in_pool(pool, base.name(), base.version()) {
                            pool.add_alias_arc(Arc::clone(alias), priority, Some(base_id));
                        }
                    }
                }
            }
        }
    }

    fn load_package(
        &self,
        pool: &mut Pool,
        state: &mut BuildState,
        package: Arc<Package>,
        priority: usize,
    ) {
        let key = (package.name.to_lowercase(), package.version.clone(), priority);
        if !state.seen.insert(key) {
            return;
        }

        if !pool.accepts_stability(&package.name, package.stability()) {
            return;
        }

        let id = pool.add_package_unchecked(Arc::clone(&package), priority);
        debug_assert!(id > 0);

        for (target, constraint_str) in package
            .require
            .iter()
            .chain(package.replace.iter())
            .chain(package.provide.iter())
        {
            let target = target.to_lowercase();
            if self.platform_filter.ignores(&target) {
                continue;
            }
            let constraint = pool.parse_constraint(constraint_str).unwrap_or(Constraint::Any);
            state.mark_for_loading(&target, constraint);
        }
    }
}

impl Default for PoolBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default)]
struct BuildState {
    /// Names queued for the next wave with the union of their constraints.
    to_load: IndexMap<String, Constraint>,
    /// Names already loaded, with the constraint that was loaded.
    loaded: HashMap<String, Constraint>,
    /// `(name, version, repository)` triples already in the pool.
    seen: HashSet<(String, String, usize)>,
    /// Alias entries already materialized.
    seen_aliases: HashSet<(String, String, usize)>,
}

fn alias_key(alias: &crate::package::AliasPackage, priority: usize) -> (String, String, usize) {
    (alias.name().to_string(), alias.version().to_string(), priority)
}

fn find_in_pool(pool: &Pool, name: &str, version: &str) -> Option<super::pool::PackageId> {
    pool.packages_by_name(name)
        .into_iter()
        .find(|&id| pool.entry(id).map_or(false, |e| e.version() == version))
}

impl BuildState {
    /// Queue `name` for loading, widening an already queued or already
    /// loaded constraint when the new one is not covered by it.
    fn mark_for_loading(&mut self, name: &str, constraint: Constraint) {
        if let Some(queued) = self.to_load.get(name) {
            if *queued == constraint || *queued == Constraint::Any {
                return;
            }
            let widened = queued.clone().union(constraint);
            self.to_load.insert(name.to_string(), widened);
            return;
        }

        if let Some(loaded) = self.loaded.get(name) {
            if *loaded == constraint || *loaded == Constraint::Any {
                return;
            }
            // The loaded range does not cover this constraint: reload the
            // widened union. Already-seen candidates stay deduplicated.
            let widened = loaded.clone().union(constraint);
            self.loaded.remove(name);
            self.to_load.insert(name.to_string(), widened);
            return;
        }

        self.to_load.insert(name.to_string(), constraint);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::ArrayRepository;

    fn repo_set(repos: Vec<ArrayRepository>) -> RepositorySet {
        let mut set = RepositorySet::new();
        for repo in repos {
            set.add_repository(Box::new(repo));
        }
        set
    }

    #[test]
    fn test_loads_only_reachable_packages() {
        let mut repo = ArrayRepository::new("packages");
        let mut app = Package::new("vendor/app", "1.0.0");
        app.require.insert("vendor/lib".to_string(), "^1.0".to_string());
        repo.add_package(app);
        repo.add_package(Package::new("vendor/lib", "1.0.0"));
        repo.add_package(Package::new("vendor/unrelated", "1.0.0"));

        let mut request = Request::new();
        request.require("vendor/app", "*");

        let pool = PoolBuilder::new().build_pool(&repo_set(vec![repo]), &request);

        assert!(!pool.packages_by_name("vendor/app").is_empty());
        assert!(!pool.packages_by_name("vendor/lib").is_empty());
        assert!(pool.packages_by_name("vendor/unrelated").is_empty());
    }

    #[test]
    fn test_constraint_narrowing_limits_candidates() {
        let mut repo = ArrayRepository::new("packages");
        let mut app = Package::new("vendor/app", "1.0.0");
        app.require.insert("vendor/lib".to_string(), "^1.0".to_string());
        repo.add_package(app);
        repo.add_package(Package::new("vendor/lib", "1.0.0"));
        repo.add_package(Package::new("vendor/lib", "2.0.0"));

        let mut request = Request::new();
        request.require("vendor/app", "*");

        let pool = PoolBuilder::new().build_pool(&repo_set(vec![repo]), &request);
        // lib 2.0.0 satisfies no collected constraint and stays out.
        assert_eq!(pool.packages_by_name("vendor/lib").len(), 1);
    }

    #[test]
    fn test_constraint_union_across_requirers() {
        let mut repo = ArrayRepository::new("packages");
        let mut a = Package::new("vendor/a", "1.0.0");
        a.require.insert("vendor/lib".to_string(), "^1.0".to_string());
        repo.add_package(a);
        let mut b = Package::new("vendor/b", "1.0.0");
        b.require.insert("vendor/lib".to_string(), "^2.0".to_string());
        repo.add_package(b);
        repo.add_package(Package::new("vendor/lib", "1.0.0"));
        repo.add_package(Package::new("vendor/lib", "2.0.0"));
        repo.add_package(Package::new("vendor/lib", "3.0.0"));

        let mut request = Request::new();
        request.require("vendor/a", "*");
        request.require("vendor/b", "*");

        let pool = PoolBuilder::new().build_pool(&repo_set(vec![repo]), &request);
        // Both branches of the union load; 3.0.0 matches neither.
        assert_eq!(pool.packages_by_name("vendor/lib").len(), 2);
    }

    #[test]
    fn test_replace_and_provide_targets_are_pulled() {
        let mut repo = ArrayRepository::new("packages");
        let mut fork = Package::new("vendor/fork", "1.0.0");
        fork.replace.insert("vendor/orig".to_string(), "^1.0".to_string());
        repo.add_package(fork);
        repo.add_package(Package::new("vendor/orig", "1.0.0"));

        let mut request = Request::new();
        request.require("vendor/fork", "*");

        let pool = PoolBuilder::new().build_pool(&repo_set(vec![repo]), &request);
        // The replaced package is pulled so the conflict is visible.
        assert!(!pool.packages_by_name("vendor/orig").is_empty());
    }

    #[test]
    fn test_stability_filtering() {
        let mut repo = ArrayRepository::new("packages");
        repo.add_package(Package::new("vendor/lib", "1.0.0"));
        repo.add_package(Package::new("vendor/lib", "2.0.0-beta1"));

        let mut request = Request::new();
        request.require("vendor/lib", "*");

        let pool = PoolBuilder::new().build_pool(&repo_set(vec![repo]), &request);
        assert_eq!(pool.packages_by_name("vendor/lib").len(), 1);

        let mut repo = ArrayRepository::new("packages");
        repo.add_package(Package::new("vendor/lib", "1.0.0"));
        repo.add_package(Package::new("vendor/lib", "2.0.0-beta1"));
        let pool = PoolBuilder::new()
            .minimum_stability(Stability::Beta)
            .build_pool(&repo_set(vec![repo]), &request);
        assert_eq!(pool.packages_by_name("vendor/lib").len(), 2);
    }

    #[test]
    fn test_ignored_platform_requirement_pulls_nothing() {
        let mut repo = ArrayRepository::new("packages");
        let mut app = Package::new("vendor/app", "1.0.0");
        app.require.insert("ext-json".to_string(), "*".to_string());
        repo.add_package(app);
        repo.add_package(Package::new("ext-json", "8.2.0"));

        let mut request = Request::new();
        request.require("vendor/app", "*");

        let pool = PoolBuilder::new()
            .platform_filter(PlatformRequirementFilter::All)
            .build_pool(&repo_set(vec![repo.clone()]), &request);
        assert!(pool.packages_by_name("ext-json").is_empty());

        let pool = PoolBuilder::new().build_pool(&repo_set(vec![repo]), &request);
        assert!(!pool.packages_by_name("ext-json").is_empty());
    }

    #[test]
    fn test_same_package_from_two_repositories() {
        let mut first = ArrayRepository::new("first");
        first.add_package(Package::new("vendor/lib", "1.0.0"));
        let mut second = ArrayRepository::new("second");
        second.add_package(Package::new("vendor/lib", "1.0.0"));

        let mut request = Request::new();
        request.require("vendor/lib", "*");

        let pool = PoolBuilder::new().build_pool(&repo_set(vec![first, second]), &request);
        let ids = pool.packages_by_name("vendor/lib");
        // Both stay distinct, tagged with their repository priority.
        assert_eq!(ids.len(), 2);
        assert_eq!(pool.priority_of(ids[0]), 0);
        assert_eq!(pool.priority_of(ids[1]), 1);
    }

    #[test]
    fn test_fixed_package_seeded_when_missing() {
        let repo = ArrayRepository::new("packages");

        let mut request = Request::new();
        request.fix(Package::new("php", "8.2.0"));

        let pool = PoolBuilder::new().build_pool(&repo_set(vec![repo]), &request);
        assert_eq!(pool.packages_by_name("php").len(), 1);
    }

    #[test]
    fn test_locked_package_bypasses_stability() {
        let repo = ArrayRepository::new("packages");

        let mut request = Request::new();
        request.lock(Package::new("vendor/lib", "dev-main"));

        let pool = PoolBuilder::new().build_pool(&repo_set(vec![repo]), &request);
        assert_eq!(pool.packages_by_name("vendor/lib").len(), 1);
    }

    #[test]
    fn test_repository_aliases_materialized() {
        use crate::package::AliasPackage;

        let mut repo = ArrayRepository::new("packages");
        let base = Package::new("vendor/lib", "dev-main");
        repo.add_package(base.clone());
        repo.add_alias(AliasPackage::new(
            Arc::new(base),
            "1.0.x-dev".to_string(),
            "1.0.x-dev".to_string(),
        ));

        let mut request = Request::new();
        request.require("vendor/lib", "1.0.x-dev");

        let pool = PoolBuilder::new()
            .minimum_stability(Stability::Dev)
            .build_pool(&repo_set(vec![repo]), &request);

        let ids = pool.packages_by_name("vendor/lib");
        assert_eq!(ids.len(), 2);
        assert!(ids.iter().any(|&id| pool.is_alias(id)));
    }
}
