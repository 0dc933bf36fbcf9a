use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use crate::package::{AliasPackage, Package};
use crate::platform::is_platform_package;

/// One step of bringing the installed state to the decided state.
#[derive(Debug, Clone)]
pub enum Operation {
    Install(Arc<Package>),
    Update {
        from: Arc<Package>,
        to: Arc<Package>,
    },
    Uninstall(Arc<Package>),
    /// The alias version becomes visible; the underlying package is the one
    /// actually installed.
    MarkAliasInstalled(Arc<AliasPackage>),
    MarkAliasUninstalled(Arc<AliasPackage>),
}

/// The ordered operation sequence turning the prior package set into the
/// solver's decided set.
///
/// Uninstalls come first, in reverse topological order of the prior state;
/// installs and updates follow in topological order of the target state
/// (dependencies first, ties broken by name). Alias marks ride along with
/// their base package's operation.
#[derive(Debug, Clone, Default)]
pub struct Transaction {
    pub operations: Vec<Operation>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_packages(
        present_packages: Vec<Arc<Package>>,
        present_aliases: Vec<Arc<AliasPackage>>,
        result_packages: Vec<Arc<Package>>,
        result_aliases: Vec<Arc<AliasPackage>>,
    ) -> Self {
        let mut transaction = Self::new();
        transaction.calculate(
            present_packages,
            present_aliases,
            result_packages,
            result_aliases,
        );
        transaction
    }

    fn calculate(
        &mut self,
        present_packages: Vec<Arc<Package>>,
        present_aliases: Vec<Arc<AliasPackage>>,
        result_packages: Vec<Arc<Package>>,
        result_aliases: Vec<Arc<AliasPackage>>,
    ) {
        let present_by_name: HashMap<String, Arc<Package>> = present_packages
            .iter()
            .map(|p| (p.name.to_lowercase(), Arc::clone(p)))
            .collect();
        let result_names: BTreeSet<String> = result_packages
            .iter()
            .map(|p| p.name.to_lowercase())
            .collect();

        // Prior packages with no counterpart in the decided state go away,
        // dependents before their dependencies.
        let removals: Vec<Arc<Package>> = present_packages
            .iter()
            .filter(|p| !result_names.contains(&p.name.to_lowercase()))
            .cloned()
            .collect();

        let alias_key =
            |alias: &Arc<AliasPackage>| format!("{}::{}", alias.name().to_lowercase(), alias.version());
        let result_alias_keys: BTreeSet<String> = result_aliases.iter().map(&alias_key).collect();
        let present_alias_keys: BTreeSet<String> = present_aliases.iter().map(&alias_key).collect();

        let removal_order = topological_order(&removals);
        for &index in removal_order.iter().rev() {
            let package = &removals[index];
            for alias in &present_aliases {
                if alias.name().eq_ignore_ascii_case(&package.name)
                    && !result_alias_keys.contains(&alias_key(alias))
                {
                    self.operations
                        .push(Operation::MarkAliasUninstalled(Arc::clone(alias)));
                }
            }
            self.operations
                .push(Operation::Uninstall(Arc::clone(package)));
        }

        // Stale aliases whose base package survives.
        for alias in &present_aliases {
            if result_alias_keys.contains(&alias_key(alias)) {
                continue;
            }
            let base_removed = removals
                .iter()
                .any(|p| p.name.eq_ignore_ascii_case(alias.name()));
            if !base_removed {
                self.operations
                    .push(Operation::MarkAliasUninstalled(Arc::clone(alias)));
            }
        }

        // Installs and updates, dependencies first.
        let target_order = topological_order(&result_packages);
        let mut pending_aliases: Vec<&Arc<AliasPackage>> = result_aliases
            .iter()
            .filter(|alias| !present_alias_keys.contains(&alias_key(alias)))
            .collect();

        for &index in &target_order {
            let package = &result_packages[index];
            let name = package.name.to_lowercase();

            match present_by_name.get(&name) {
                Some(present) if needs_update(present, package) => {
                    self.operations.push(Operation::Update {
                        from: Arc::clone(present),
                        to: Arc::clone(package),
                    });
                }
                Some(_) => {}
                None => {
                    self.operations
                        .push(Operation::Install(Arc::clone(package)));
                }
            }

            // Alias marks directly follow the operation on their base.
            pending_aliases.retain(|alias| {
                if alias.name().eq_ignore_ascii_case(&package.name)
                    && alias.alias_of().version == package.version
                {
                    self.operations
                        .push(Operation::MarkAliasInstalled(Arc::clone(alias)));
                    false
                } else {
                    true
                }
            });
        }

        for alias in pending_aliases {
            self.operations
                .push(Operation::MarkAliasInstalled(Arc::clone(alias)));
        }
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Everything that ends up present, updates included.
    pub fn installs(&self) -> impl Iterator<Item = &Arc<Package>> {
        self.operations.iter().filter_map(|op| match op {
            Operation::Install(pkg) => Some(pkg),
            Operation::Update { to, .. } => Some(to),
            _ => None,
        })
    }

    pub fn new_installs(&self) -> impl Iterator<Item = &Arc<Package>> {
        self.operations.iter().filter_map(|op| match op {
            Operation::Install(pkg) => Some(pkg),
            _ => None,
        })
    }

    pub fn updates(&self) -> impl Iterator<Item = (&Arc<Package>, &Arc<Package>)> {
        self.operations.iter().filter_map(|op| match op {
            Operation::Update { from, to } => Some((from, to)),
            _ => None,
        })
    }

    pub fn removals(&self) -> impl Iterator<Item = &Arc<Package>> {
        self.operations.iter().filter_map(|op| match op {
            Operation::Uninstall(pkg) => Some(pkg),
            _ => None,
        })
    }

    pub fn alias_installs(&self) -> impl Iterator<Item = &Arc<AliasPackage>> {
        self.operations.iter().filter_map(|op| match op {
            Operation::MarkAliasInstalled(alias) => Some(alias),
            _ => None,
        })
    }

    pub fn summary(&self) -> TransactionSummary {
        let mut summary = TransactionSummary::default();
        for op in &self.operations {
            match op {
                Operation::Install(_) => summary.installs += 1,
                Operation::Update { .. } => summary.updates += 1,
                Operation::Uninstall(_) => summary.uninstalls += 1,
                Operation::MarkAliasInstalled(_) => summary.alias_installs += 1,
                Operation::MarkAliasUninstalled(_) => summary.alias_uninstalls += 1,
            }
        }
        summary
    }
}

/// Whether the installed copy must be replaced by the decided one.
fn needs_update(present: &Package, target: &Package) -> bool {
    if present.version != target.version {
        return true;
    }

    let present_dist = present.dist.as_ref().and_then(|d| d.reference.as_ref());
    let target_dist = target.dist.as_ref().and_then(|d| d.reference.as_ref());
    if present_dist.is_some() && target_dist.is_some() && present_dist != target_dist {
        return true;
    }

    let present_source = present.source.as_ref().map(|s| &s.reference);
    let target_source = target.source.as_ref().map(|s| &s.reference);
    present_source.is_some() && target_source.is_some() && present_source != target_source
}

/// Kahn's algorithm over the require edges inside `packages`, dependencies
/// first, ties resolved by package name. Platform requirements carry no
/// install ordering. Cycle leftovers are appended in name order; the root
/// package never shows up here, so root-level cycles are already broken.
fn topological_order(packages: &[Arc<Package>]) -> Vec<usize> {
    if packages.is_empty() {
        return Vec::new();
    }

    let index_by_name: HashMap<String, usize> = packages
        .iter()
        .enumerate()
        .map(|(i, p)| (p.name.to_lowercase(), i))
        .collect();

    let mut in_degree = vec![0usize; packages.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); packages.len()];

    for (index, package) in packages.iter().enumerate() {
        for dep_name in package.require.keys() {
            let dep_name = dep_name.to_lowercase();
            if is_platform_package(&dep_name) {
                continue;
            }
            if let Some(&dep_index) = index_by_name.get(&dep_name) {
                if dep_index != index {
                    dependents[dep_index].push(index);
                    in_degree[index] += 1;
                }
            }
        }
    }

    let mut ready: BTreeSet<(String, usize)> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, &degree)| degree == 0)
        .map(|(i, _)| (packages[i].name.to_lowercase(), i))
        .collect();

    let mut order = Vec::with_capacity(packages.len());
    while let Some(entry) = ready.iter().next().cloned() {
        ready.remove(&entry);
        let (_, index) = entry;
        order.push(index);

        for &dependent in &dependents[index] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                ready.insert((packages[dependent].name.to_lowercase(), dependent));
            }
        }
    }

    // Cycles: emit what is left in name order rather than dropping it.
    if order.len() != packages.len() {
        let placed: BTreeSet<usize> = order.iter().copied().collect();
        let mut leftover: Vec<usize> = (0..packages.len())
            .filter(|i| !placed.contains(i))
            .collect();
        leftover.sort_by_key(|&i| packages[i].name.to_lowercase());
        order.extend(leftover);
    }

    order
}

/// Operation counts for progress reporting.
#[derive(Debug, Clone, Default)]
pub struct TransactionSummary {
    pub installs: usize,
    pub updates: usize,
    pub uninstalls: usize,
    pub alias_installs: usize,
    pub alias_uninstalls: usize,
}

impl fmt::Display for TransactionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if self.installs > 0 {
            parts.push(format!("{} install(s)", self.installs));
        }
        if self.updates > 0 {
            parts.push(format!("{} update(s)", self.updates));
        }
        if self.uninstalls > 0 {
            parts.push(format!("{} removal(s)", self.uninstalls));
        }
        if parts.is_empty() {
            write!(f, "Nothing to do")
        } else {
            write!(f, "{}", parts.join(", "))
        }
    }
}
