use std::collections::{HashSet, VecDeque};

use indexmap::IndexMap;

use crate::package::{Link, LinkKind};
use crate::platform::PlatformRequirementFilter;

use super::pool::{PackageId, Pool};
use super::request::Request;
use super::rule::{Rule, RuleKind};
use super::rule_set::RuleSet;

/// Name rules for root-level instructions are attributed to.
pub const ROOT_SOURCE: &str = "__root__";

/// Translates the pool and the request into the solver's clause set.
///
/// Emitted rules:
/// - one root-require disjunction per root requirement (empty when nothing
///   matches, which the solver reports as a missing requirement);
/// - per candidate, a requires rule for each of its require links and a
///   conflict rule for each of its conflict links;
/// - one multi-conflict per package name (at most one version installs);
/// - pairwise conflicts between replacers and what they replace, and between
///   distinct packages occupying the same provided name;
/// - biconditional implications tying alias entries to their base;
/// - unit rules pinning fixed candidates, banning removed names and keeping
///   locked candidates the update policy does not allow to move.
pub struct RuleGenerator<'a> {
    pool: &'a Pool,
    platform_filter: PlatformRequirementFilter,
    rules: RuleSet,
    added: HashSet<PackageId>,
    same_name_added: HashSet<String>,
    /// Candidates per effective name (own name, replaces and provides), used
    /// for cross-package same-name conflicts.
    carriers_by_name: IndexMap<String, Vec<PackageId>>,
    /// Names the root explicitly requires, directly or through a provider of
    /// a required name. Providers are only auto-selectable for these.
    root_required_names: HashSet<String>,
}

impl<'a> RuleGenerator<'a> {
    pub fn new(pool: &'a Pool, platform_filter: PlatformRequirementFilter) -> Self {
        Self {
            pool,
            platform_filter,
            rules: RuleSet::new(),
            added: HashSet::new(),
            same_name_added: HashSet::new(),
            carriers_by_name: IndexMap::new(),
            root_required_names: HashSet::new(),
        }
    }

    pub fn generate(mut self, request: &Request) -> RuleSet {
        for (name, _) in request.all_requires() {
            self.root_required_names.insert(name.to_lowercase());
        }

        // A replacer of a root-required name makes every name it occupies
        // root-reachable, so requiring a replacer lets it stand in for the
        // packages it replaces elsewhere in the graph.
        let initial: Vec<String> = self.root_required_names.iter().cloned().collect();
        for name in initial {
            for id in self.pool.what_provides(&name, None) {
                if let Some(package) = self.pool.package(id) {
                    for provided in package.provided_names(true) {
                        self.root_required_names.insert(provided);
                    }
                }
            }
        }

        self.add_removal_rules(request);
        self.add_fixed_rules(request);
        self.add_installed_rules(request);
        self.add_root_require_rules(request);
        self.add_replace_conflict_rules();
        self.add_provider_conflict_rules();

        log::debug!("Generated rules: {:?}", self.rules.stats());
        self.rules
    }

    /// Removed names must not appear in the target state.
    fn add_removal_rules(&mut self, request: &Request) {
        for name in &request.removals {
            for id in self.pool.packages_by_name(name) {
                let rule = Rule::new(vec![-id], RuleKind::Fixed)
                    .with_source(id)
                    .with_reason(Link::new(ROOT_SOURCE, name, "*", LinkKind::Conflict));
                self.rules.add(rule);
            }
        }
    }

    /// Fixed candidates are pinned true and their competitors pinned false.
    fn add_fixed_rules(&mut self, request: &Request) {
        for fixed in &request.fixed_packages {
            let ids = self.pool.packages_by_name(&fixed.name);
            let Some(&fixed_id) = ids.iter().find(|&&id| {
                self.pool
                    .entry(id)
                    .map_or(false, |e| e.version() == fixed.version)
            }) else {
                continue;
            };

            self.rules.add(Rule::fixed(fixed_id).with_source(fixed_id));
            for &other in &ids {
                if other != fixed_id {
                    let rule = Rule::new(vec![-other], RuleKind::Fixed).with_source(other);
                    self.rules.add(rule);
                }
            }
            self.add_package_rules(fixed_id);
        }
    }

    /// Locked candidates the update policy keeps in place.
    fn add_installed_rules(&mut self, request: &Request) {
        for locked in &request.locked_packages {
            if request.is_fixed(&locked.name)
                || request.is_removed(&locked.name)
                || request.is_update_allowed(&locked.name)
            {
                continue;
            }
            let ids = self.pool.packages_by_name(&locked.name);
            let Some(&locked_id) = ids.iter().find(|&&id| {
                self.pool
                    .entry(id)
                    .map_or(false, |e| e.version() == locked.version)
            }) else {
                continue;
            };

            let rule = Rule::assertion(locked_id, RuleKind::InstalledPackage).with_source(locked_id);
            self.rules.add(rule);
            self.add_package_rules(locked_id);
        }
    }

    /// Per requirement: package rules for every candidate first (breadth
    /// first through the dependency graph), the root-require disjunction
    /// after them. The solver scans rules in emission order, so this puts
    /// each subgraph's own rules ahead of the requirement that pulled it in.
    fn add_root_require_rules(&mut self, request: &Request) {
        for (name, constraint_str) in request.all_requires() {
            if self.platform_filter.ignores(name) {
                continue;
            }

            let link = Link::new(ROOT_SOURCE, name, constraint_str, LinkKind::Require);
            let constraint = self.pool.parse_constraint(constraint_str);
            let providers = self.pool.what_provides(name, constraint.as_ref());

            if providers.is_empty() {
                // Recorded as an empty disjunction; the solver turns it into
                // a missing-requirement failure.
                self.rules
                    .add(Rule::new(vec![], RuleKind::RootRequire).with_reason(link));
                continue;
            }

            for &id in &providers {
                self.add_package_rules(id);
            }
            self.rules
                .add(Rule::root_require(providers).with_reason(link));
        }
    }

    /// Emit the rules of a candidate and everything reachable from it,
    /// walking the graph breadth first.
    fn add_package_rules(&mut self, package_id: PackageId) {
        let mut queue = VecDeque::new();
        queue.push_back(package_id);

        while let Some(id) = queue.pop_front() {
            if !self.added.insert(id) {
                continue;
            }

            let Some(entry) = self.pool.entry(id) else {
                continue;
            };

            if let Some(alias) = entry.as_alias().cloned() {
                // Alias and base install together.
                if let Some(base_id) = self.pool.alias_base(id) {
                    let link = Link::new(
                        alias.name(),
                        alias.name(),
                        format!("={}", alias.version()),
                        LinkKind::Require,
                    );
                    self.rules.add(
                        Rule::new(vec![-id, base_id], RuleKind::PackageAlias)
                            .with_source(id)
                            .with_reason(link),
                    );
                    self.rules.add(
                        Rule::new(vec![-base_id, id], RuleKind::PackageInverseAlias)
                            .with_source(base_id),
                    );
                    queue.push_back(base_id);
                }

                let requires: Vec<Link> = alias
                    .require()
                    .iter()
                    .map(|(target, constraint)| {
                        Link::new(alias.name(), target, constraint, LinkKind::Require)
                    })
                    .collect();
                for link in requires {
                    self.add_require_rule(id, link, &mut queue);
                }
                continue;
            }

            let Some(package) = entry.as_package().cloned() else {
                continue;
            };

            self.add_same_name_rules(&package.name);

            for name in package.provided_names(true) {
                self.carriers_by_name.entry(name).or_default().push(id);
            }

            for link in package.links(LinkKind::Require).collect::<Vec<_>>() {
                self.add_require_rule(id, link, &mut queue);
            }

            for link in package.links(LinkKind::Conflict).collect::<Vec<_>>() {
                let constraint = self.pool.parse_constraint(&link.constraint);
                for conflict_id in self.pool.what_provides(&link.target, constraint.as_ref()) {
                    if conflict_id != id {
                        self.rules.add(
                            Rule::conflict(vec![id, conflict_id])
                                .with_source(id)
                                .with_reason(link.clone()),
                        );
                    }
                }
            }
        }
    }

    fn add_require_rule(
        &mut self,
        source_id: PackageId,
        link: Link,
        queue: &mut VecDeque<PackageId>,
    ) {
        if self.platform_filter.ignores(&link.target) {
            return;
        }

        let constraint = self.pool.parse_constraint(&link.constraint);
        let direct = self
            .pool
            .what_provides_direct(&link.target, constraint.as_ref());

        // Providers and replacers can only stand in for a name when a direct
        // candidate exists as well, or when the name is root-required.
        let providers = if !direct.is_empty() || self.root_required_names.contains(&link.target) {
            self.pool.what_provides(&link.target, constraint.as_ref())
        } else {
            direct
        };

        if providers.is_empty() {
            // No candidate can satisfy this link: installing the source is
            // itself impossible.
            self.rules.add(
                Rule::new(vec![-source_id], RuleKind::PackageRequires)
                    .with_source(source_id)
                    .with_reason(link),
            );
            return;
        }

        self.rules.add(
            Rule::requires(source_id, providers.clone())
                .with_source(source_id)
                .with_reason(link),
        );

        queue.extend(providers);
    }

    /// At most one version per package name. Alias entries are skipped when
    /// their base is in the candidate list; the alias follows its base.
    fn add_same_name_rules(&mut self, name: &str) {
        let name = name.to_lowercase();
        if !self.same_name_added.insert(name.clone()) {
            return;
        }

        let versions = self.pool.packages_by_name(&name);
        if versions.len() <= 1 {
            return;
        }

        let mut candidates: Vec<PackageId> = Vec::with_capacity(versions.len());
        for &id in &versions {
            if let Some(base_id) = self.pool.alias_base(id) {
                if versions.contains(&base_id) {
                    continue;
                }
            }
            candidates.push(id);
        }

        if candidates.len() > 1 {
            self.rules.add(Rule::multi_conflict(candidates));
        }
    }

    /// A replacer conflicts with every direct candidate of the names it
    /// replaces.
    fn add_replace_conflict_rules(&mut self) {
        let added: Vec<PackageId> = self
            .pool
            .package_ids()
            .filter(|id| self.added.contains(id))
            .collect();

        for package_id in added {
            let Some(package) = self.pool.package(package_id) else {
                continue;
            };
            for link in package.links(LinkKind::Replace).collect::<Vec<_>>() {
                for replaced_id in self.pool.packages_by_name(&link.target) {
                    if replaced_id != package_id {
                        self.rules.add(
                            Rule::conflict(vec![package_id, replaced_id])
                                .with_source(package_id)
                                .with_reason(link.clone()),
                        );
                    }
                }
            }
        }
    }

    /// Distinct packages occupying the same provided or replaced name
    /// conflict pairwise. Names that already received a same-name rule are
    /// covered there.
    fn add_provider_conflict_rules(&mut self) {
        let carriers = std::mem::take(&mut self.carriers_by_name);
        for (name, ids) in &carriers {
            if ids.len() <= 1 || self.same_name_added.contains(name) {
                continue;
            }

            for i in 0..ids.len() {
                for j in (i + 1)..ids.len() {
                    let (a, b) = (ids[i], ids[j]);
                    if a == b {
                        continue;
                    }
                    let same_package = match (self.pool.name_of(a), self.pool.name_of(b)) {
                        (Some(name_a), Some(name_b)) => name_a == name_b,
                        _ => false,
                    };
                    if same_package {
                        continue;
                    }
                    self.rules.add(
                        Rule::same_name(a, b)
                            .with_source(a)
                            .with_reason(Link::new(
                                self.pool.name_of(a).unwrap_or(ROOT_SOURCE),
                                name,
                                "*",
                                LinkKind::Replace,
                            )),
                    );
                }
            }
        }
    }
}
