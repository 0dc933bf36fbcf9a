//! Optional pre-solve pool pruning.
//!
//! Two behavior-preserving simplifications shrink the rule set before
//! solving: candidates whose version lies outside every requirement interval
//! collected for their name are dropped, and runs of versions with identical
//! dependency definitions collapse to the policy-preferred one per matched
//! interval. Fixed and locked candidates, sole providers of a name and
//! alias/base pairs are never dropped, so the optimized pool decides exactly
//! like the full one.

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use pakt_semver::Constraint;

use crate::package::Package;

use super::policy::Policy;
use super::pool::{PackageId, Pool, PoolEntry};
use super::request::Request;

pub struct PoolOptimizer<'a> {
    policy: &'a Policy,
}

impl<'a> PoolOptimizer<'a> {
    pub fn new(policy: &'a Policy) -> Self {
        Self { policy }
    }

    pub fn optimize(&mut self, request: &Request, pool: &Pool) -> Pool {
        let irremovable = self.collect_irremovable(request, pool);
        let constraints_by_name = self.collect_constraints(request, pool);

        let mut remove: HashSet<PackageId> = HashSet::new();

        // Group candidates per name by the set of requirement intervals they
        // satisfy and by their dependency definition.
        let mut groups: BTreeMap<(String, Vec<usize>, u64), Vec<PackageId>> = BTreeMap::new();

        for id in pool.package_ids() {
            if irremovable.contains(&id) || pool.is_alias(id) {
                continue;
            }
            let Some(package) = pool.package(id) else {
                continue;
            };

            let name = package.name.to_lowercase();
            let Some(branches) = constraints_by_name.get(&name) else {
                // Nothing constrains this name; it only got here through a
                // provide edge or similar. Keep it.
                continue;
            };

            let Some(version) = pool.version_of(id) else {
                continue;
            };
            let matched: Vec<usize> = branches
                .iter()
                .enumerate()
                .filter(|(_, c)| c.matches_version(&version))
                .map(|(i, _)| i)
                .collect();

            // Outside every interval the request graph could accept.
            remove.insert(id);
            if !matched.is_empty() {
                let dep_hash = dependency_hash(package);
                groups.entry((name, matched, dep_hash)).or_default().push(id);
            }
        }

        // Keep the preferred candidate of each group (plus equal-version
        // duplicates from other repositories).
        for ids in groups.values() {
            for kept in self.policy.select_best_per_name(pool, ids) {
                remove.remove(&kept);
            }
        }

        // Alias entries are never pruned, and an alias without its base
        // would be meaningless, so every aliased base stays too.
        for id in pool.package_ids() {
            if let Some(base_id) = pool.alias_base(id) {
                remove.remove(&base_id);
            }
        }

        log::info!(
            "Pool optimizer removed {} of {} candidates",
            remove.len(),
            pool.len()
        );

        self.rebuild(pool, &remove)
    }

    fn collect_irremovable(&self, request: &Request, pool: &Pool) -> HashSet<PackageId> {
        let mut irremovable = HashSet::new();

        for pinned in request
            .fixed_packages
            .iter()
            .chain(request.locked_packages.iter())
        {
            for id in pool.packages_by_name(&pinned.name) {
                if pool
                    .entry(id)
                    .map_or(false, |e| e.version() == pinned.version)
                {
                    irremovable.insert(id);
                }
            }
        }

        // The only candidate occupying a provided or replaced name must stay.
        for id in pool.package_ids() {
            let Some(package) = pool.package(id) else {
                continue;
            };
            for name in package.provided_names(true) {
                if name == package.name {
                    continue;
                }
                let providers = pool.what_provides(&name, None);
                if providers.len() <= 1 {
                    irremovable.insert(id);
                    break;
                }
            }
        }

        irremovable
    }

    /// Requirement intervals per name: root requirements plus every require
    /// link in the pool, disjunctions expanded into their branches.
    fn collect_constraints(
        &self,
        request: &Request,
        pool: &Pool,
    ) -> BTreeMap<String, Vec<Constraint>> {
        let mut by_name: BTreeMap<String, Vec<Constraint>> = BTreeMap::new();

        let mut push = |name: &str, constraint: Option<Constraint>| {
            let Some(constraint) = constraint else {
                return;
            };
            let entry = by_name.entry(name.to_lowercase()).or_default();
            let branches = match constraint {
                Constraint::Or(branches) => branches,
                single => vec![single],
            };
            for branch in branches {
                if !entry.contains(&branch) {
                    entry.push(branch);
                }
            }
        };

        for (name, constraint_str) in request.all_requires() {
            push(name, pool.parse_constraint(constraint_str));
        }

        for id in pool.package_ids() {
            match pool.entry(id) {
                Some(PoolEntry::Package(package)) => {
                    for (target, constraint_str) in &package.require {
                        push(target, pool.parse_constraint(constraint_str));
                    }
                }
                Some(PoolEntry::Alias(alias)) => {
                    for (target, constraint_str) in alias.require() {
                        push(target, pool.parse_constraint(constraint_str));
                    }
                }
                None => {}
            }
        }

        by_name
    }

    fn rebuild(&self, pool: &Pool, remove: &HashSet<PackageId>) -> Pool {
        let mut optimized = Pool::with_minimum_stability(pool.minimum_stability());
        for (name, stability) in pool.stability_flags() {
            optimized.add_stability_flag(name, *stability);
        }

        let mut id_map: HashMap<PackageId, PackageId> = HashMap::new();

        for id in pool.package_ids() {
            if remove.contains(&id) {
                continue;
            }
            match pool.entry(id) {
                Some(PoolEntry::Package(package)) => {
                    let new_id =
                        optimized.add_package_unchecked(Arc::clone(package), pool.priority_of(id));
                    id_map.insert(id, new_id);
                }
                Some(PoolEntry::Alias(alias)) => {
                    let base_id = pool.alias_base(id).and_then(|b| id_map.get(&b)).copied();
                    if base_id.is_some() {
                        optimized.add_alias_arc(Arc::clone(alias), pool.priority_of(id), base_id);
                    }
                }
                None => {}
            }
        }

        optimized
    }
}

fn dependency_hash(package: &Package) -> u64 {
    let mut hasher = DefaultHasher::new();

    let mut hash_map = |map: &indexmap::IndexMap<String, String>, tag: u8| {
        if map.is_empty() {
            return;
        }
        tag.hash(&mut hasher);
        let mut sorted: Vec<_> = map.iter().collect();
        sorted.sort_unstable_by(|a, b| a.0.cmp(b.0));
        for (name, constraint) in sorted {
            name.hash(&mut hasher);
            constraint.hash(&mut hasher);
        }
    };

    hash_map(&package.require, 1);
    hash_map(&package.conflict, 2);
    hash_map(&package.replace, 3);
    hash_map(&package.provide, 4);

    hasher.finish()
}
