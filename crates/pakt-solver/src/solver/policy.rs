use std::cmp::Ordering;
use std::collections::BTreeMap;

use indexmap::IndexMap;

use pakt_semver::{Version, VersionParser};

use super::pool::{PackageId, Pool};

/// Ranks candidate literals for branching.
///
/// Given a set of candidates that could satisfy a requirement, the policy
/// orders them best-first. The ranking is lexicographic:
///
/// 1. root package aliases;
/// 2. alias entries over their base, for the same name;
/// 3. locked (preferred) versions, when a preference is registered;
/// 4. original packages over replacers, and among replacers those sharing
///    the required package's vendor prefix;
/// 5. repository priority (lower index wins);
/// 6. stability, when `prefer_stable` is set;
/// 7. version, descending unless `prefer_lowest`;
/// 8. pool insertion order.
///
/// The policy is pure: identical inputs produce identical orderings.
#[derive(Debug, Clone, Default)]
pub struct Policy {
    pub prefer_stable: bool,
    pub prefer_lowest: bool,
    /// Preferred version per package name, normally fed from the lock.
    pub preferred_versions: IndexMap<String, String>,
}

impl Policy {
    pub fn new() -> Self {
        Self {
            prefer_stable: true,
            prefer_lowest: false,
            preferred_versions: IndexMap::new(),
        }
    }

    pub fn prefer_stable(mut self, prefer: bool) -> Self {
        self.prefer_stable = prefer;
        self
    }

    pub fn prefer_lowest(mut self, prefer: bool) -> Self {
        self.prefer_lowest = prefer;
        self
    }

    pub fn preferred_versions(mut self, versions: IndexMap<String, String>) -> Self {
        self.preferred_versions = versions;
        self
    }

    pub fn with_preferred_version(mut self, package: &str, version: &str) -> Self {
        self.preferred_versions
            .insert(package.to_lowercase(), version.to_string());
        self
    }

    /// Candidates in preference order, best first.
    pub fn select_preferred(&self, pool: &Pool, candidates: &[PackageId]) -> Vec<PackageId> {
        self.select_preferred_for_requirement(pool, candidates, None)
    }

    /// Candidates in preference order, with the required package name taken
    /// into account for vendor-affine replacer ranking.
    pub fn select_preferred_for_requirement(
        &self,
        pool: &Pool,
        candidates: &[PackageId],
        required_package: Option<&str>,
    ) -> Vec<PackageId> {
        if candidates.is_empty() {
            return Vec::new();
        }

        // Rank versions within each name first, ignoring cross-name replacer
        // effects, then rank the flattened list with them applied.
        let mut by_name: BTreeMap<&str, Vec<PackageId>> = BTreeMap::new();
        for &id in candidates {
            if let Some(name) = pool.name_of(id) {
                by_name.entry(name).or_default().push(id);
            }
        }

        for group in by_name.values_mut() {
            group.sort_by(|&a, &b| self.compare(pool, a, b, required_package, true));
        }

        let mut result: Vec<PackageId> = by_name.into_values().flatten().collect();
        result.sort_by(|&a, &b| self.compare(pool, a, b, required_package, false));
        result
    }

    /// The single best candidate, if any.
    pub fn select_best(&self, pool: &Pool, candidates: &[PackageId]) -> Option<PackageId> {
        self.select_preferred(pool, candidates).into_iter().next()
    }

    /// Best candidates per name, for pool pruning. Duplicate ids with the
    /// same version and priority as the winner are kept alongside it.
    pub fn select_best_per_name(&self, pool: &Pool, candidates: &[PackageId]) -> Vec<PackageId> {
        let mut by_name: BTreeMap<&str, Vec<PackageId>> = BTreeMap::new();
        for &id in candidates {
            if let Some(name) = pool.name_of(id) {
                by_name.entry(name).or_default().push(id);
            }
        }

        let mut result = Vec::new();
        for group in by_name.values_mut() {
            group.sort_by(|&a, &b| self.compare(pool, a, b, None, true));
            let Some(&best) = group.first() else {
                continue;
            };
            result.push(best);

            let best_version = pool.version_of(best);
            let best_priority = pool.priority_of(best);
            for &id in &group[1..] {
                if pool.priority_of(id) == best_priority && pool.version_of(id) == best_version {
                    result.push(id);
                } else {
                    break;
                }
            }
        }
        result
    }

    /// Whether a candidate sits at the version its name is locked to.
    fn is_preferred_version(&self, pool: &Pool, id: PackageId) -> bool {
        let Some(name) = pool.name_of(id) else {
            return false;
        };
        let Some(preferred) = self.preferred_versions.get(name) else {
            return false;
        };
        match VersionParser::new().normalize(preferred) {
            Ok(preferred) => pool.version_of(id) == Some(preferred),
            Err(_) => false,
        }
    }

    fn compare(
        &self,
        pool: &Pool,
        a: PackageId,
        b: PackageId,
        required_package: Option<&str>,
        ignore_replace: bool,
    ) -> Ordering {
        let (Some(entry_a), Some(entry_b)) = (pool.entry(a), pool.entry(b)) else {
            return a.cmp(&b);
        };

        // Root package aliases outrank everything.
        let a_root_alias = pool.is_root_package_alias(a);
        let b_root_alias = pool.is_root_package_alias(b);
        if a_root_alias != b_root_alias {
            return if a_root_alias {
                Ordering::Less
            } else {
                Ordering::Greater
            };
        }

        // For one name, the alias entry is tried before its base.
        if entry_a.name() == entry_b.name() {
            let a_alias = entry_a.is_alias();
            let b_alias = entry_b.is_alias();
            if a_alias != b_alias {
                return if a_alias {
                    Ordering::Less
                } else {
                    Ordering::Greater
                };
            }
        }

        // Locked versions are kept where a preference is registered.
        if !self.preferred_versions.is_empty() {
            let a_preferred = self.is_preferred_version(pool, a);
            let b_preferred = self.is_preferred_version(pool, b);
            if a_preferred != b_preferred {
                return if a_preferred {
                    Ordering::Less
                } else {
                    Ordering::Greater
                };
            }
        }

        if !ignore_replace {
            // Originals beat their replacers.
            if replaces(pool, a, entry_b.name()) {
                return Ordering::Greater;
            }
            if replaces(pool, b, entry_a.name()) {
                return Ordering::Less;
            }

            // Among replacers, prefer the required package's own vendor.
            if let Some(required) = required_package {
                if let Some(vendor) = required.split('/').next() {
                    let prefix = format!("{}/", vendor);
                    let a_same = entry_a.name().starts_with(&prefix);
                    let b_same = entry_b.name().starts_with(&prefix);
                    if a_same != b_same {
                        return if a_same {
                            Ordering::Less
                        } else {
                            Ordering::Greater
                        };
                    }
                }
            }
        }

        let priority_cmp = pool.priority_of(a).cmp(&pool.priority_of(b));
        if priority_cmp != Ordering::Equal {
            return priority_cmp;
        }

        if self.prefer_stable {
            let stability_cmp = entry_a
                .stability()
                .priority()
                .cmp(&entry_b.stability().priority());
            if stability_cmp != Ordering::Equal {
                return stability_cmp;
            }
        }

        let version_cmp = compare_versions(pool.version_of(a), pool.version_of(b));
        let version_cmp = if self.prefer_lowest {
            version_cmp
        } else {
            version_cmp.reverse()
        };
        if version_cmp != Ordering::Equal {
            return version_cmp;
        }

        a.cmp(&b)
    }
}

/// Compare parsed versions, treating unparseable ones as lowest.
fn compare_versions(a: Option<Version>, b: Option<Version>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => Ordering::Equal,
    }
}

/// Whether candidate `id` replaces `target_name`.
fn replaces(pool: &Pool, id: PackageId, target_name: &str) -> bool {
    let Some(entry) = pool.entry(id) else {
        return false;
    };
    match entry {
        super::pool::PoolEntry::Package(pkg) => pkg
            .replace
            .keys()
            .any(|name| name.eq_ignore_ascii_case(target_name)),
        super::pool::PoolEntry::Alias(alias) => alias
            .replace()
            .keys()
            .any(|name| name.eq_ignore_ascii_case(target_name)),
    }
}
