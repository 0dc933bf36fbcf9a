use std::collections::BTreeSet;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::package::Package;

/// Which locked packages may change during a solve.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdatePolicy {
    /// Only the allow-listed names may change.
    OnlyListed,
    /// Allow-listed names and their transitive dependencies may change.
    ListedWithTransitive,
    /// Like `ListedWithTransitive`, but transitive dependencies that are
    /// themselves root requirements stay locked.
    ListedWithTransitiveNoRoot,
    /// Everything may change.
    #[default]
    All,
}

/// What the host asks the engine to do: root requirements, pinned and
/// previously locked packages, removals and the update policy.
///
/// Requirement maps preserve insertion order; the solver branches on root
/// requirements in the order they were declared.
#[derive(Debug, Clone, Default)]
pub struct Request {
    pub requires: IndexMap<String, String>,
    pub dev_requires: IndexMap<String, String>,

    /// Packages pinned to an exact version (platform packages, replayed
    /// installs). Fixed packages must appear unchanged in the result.
    pub fixed_packages: Vec<Arc<Package>>,

    /// The previously decided package set.
    pub locked_packages: Vec<Arc<Package>>,

    /// Names the host asks to drop from the target state.
    pub removals: Vec<String>,

    /// Names the host asks to update (empty means everything, subject to
    /// the update policy).
    pub update_allowlist: Vec<String>,

    pub update_policy: UpdatePolicy,

    /// Whether dev requirements participate in the solve.
    pub install_dev: bool,
}

impl Request {
    pub fn new() -> Self {
        Self {
            install_dev: true,
            ..Self::default()
        }
    }

    pub fn require(&mut self, name: impl Into<String>, constraint: impl Into<String>) -> &mut Self {
        self.requires
            .insert(name.into().to_lowercase(), constraint.into());
        self
    }

    pub fn require_dev(
        &mut self,
        name: impl Into<String>,
        constraint: impl Into<String>,
    ) -> &mut Self {
        self.dev_requires
            .insert(name.into().to_lowercase(), constraint.into());
        self
    }

    pub fn fix(&mut self, package: Package) -> &mut Self {
        self.fixed_packages.push(Arc::new(package));
        self
    }

    pub fn lock(&mut self, package: Package) -> &mut Self {
        self.locked_packages.push(Arc::new(package));
        self
    }

    pub fn remove(&mut self, name: impl Into<String>) -> &mut Self {
        self.removals.push(name.into().to_lowercase());
        self
    }

    pub fn update(&mut self, names: Vec<String>) -> &mut Self {
        self.update_allowlist = names.into_iter().map(|n| n.to_lowercase()).collect();
        self
    }

    pub fn update_policy(&mut self, policy: UpdatePolicy) -> &mut Self {
        self.update_policy = policy;
        self
    }

    pub fn with_dev(&mut self, install_dev: bool) -> &mut Self {
        self.install_dev = install_dev;
        self
    }

    /// All active requirements, dev requirements last.
    pub fn all_requires(&self) -> impl Iterator<Item = (&String, &String)> {
        let dev = self.install_dev.then(|| self.dev_requires.iter());
        self.requires.iter().chain(dev.into_iter().flatten())
    }

    pub fn is_fixed(&self, name: &str) -> bool {
        self.fixed_packages
            .iter()
            .any(|p| p.name.eq_ignore_ascii_case(name))
    }

    pub fn get_locked(&self, name: &str) -> Option<&Arc<Package>> {
        self.locked_packages
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    pub fn is_removed(&self, name: &str) -> bool {
        self.removals.iter().any(|n| n.eq_ignore_ascii_case(name))
    }

    /// The set of locked names the update policy allows to change.
    ///
    /// For the transitive policies this walks the locked packages' require
    /// edges outward from the allow-listed names.
    pub fn update_scope(&self) -> BTreeSet<String> {
        let mut scope: BTreeSet<String> = self
            .update_allowlist
            .iter()
            .map(|n| n.to_lowercase())
            .collect();

        match self.update_policy {
            UpdatePolicy::All => {
                for locked in &self.locked_packages {
                    scope.insert(locked.name.to_lowercase());
                }
                return scope;
            }
            UpdatePolicy::OnlyListed => return scope,
            UpdatePolicy::ListedWithTransitive | UpdatePolicy::ListedWithTransitiveNoRoot => {}
        }

        let root_required: BTreeSet<String> =
            self.requires.keys().map(|n| n.to_lowercase()).collect();

        let mut queue: Vec<String> = scope.iter().cloned().collect();
        while let Some(name) = queue.pop() {
            let Some(locked) = self.get_locked(&name) else {
                continue;
            };
            for dep in locked.require.keys() {
                let dep = dep.to_lowercase();
                if scope.contains(&dep) {
                    continue;
                }
                if self.update_policy == UpdatePolicy::ListedWithTransitiveNoRoot
                    && root_required.contains(&dep)
                {
                    continue;
                }
                scope.insert(dep.clone());
                queue.push(dep);
            }
        }

        scope
    }

    /// Whether a locked package of this name may move to another version.
    pub fn is_update_allowed(&self, name: &str) -> bool {
        if self.update_allowlist.is_empty() && self.update_policy == UpdatePolicy::All {
            return true;
        }
        self.update_scope().contains(&name.to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn locked_chain() -> Request {
        // a -> b -> c, d standalone; all locked.
        let mut request = Request::new();
        let mut a = Package::new("vendor/a", "1.0.0");
        a.require.insert("vendor/b".to_string(), "^1.0".to_string());
        let mut b = Package::new("vendor/b", "1.0.0");
        b.require.insert("vendor/c".to_string(), "^1.0".to_string());
        request.lock(a);
        request.lock(b);
        request.lock(Package::new("vendor/c", "1.0.0"));
        request.lock(Package::new("vendor/d", "1.0.0"));
        request
    }

    #[test]
    fn test_request_requires_order() {
        let mut request = Request::new();
        request.require("vendor/z", "*");
        request.require("vendor/a", "*");

        let names: Vec<&String> = request.all_requires().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["vendor/z", "vendor/a"]);
    }

    #[test]
    fn test_request_dev_requires_toggle() {
        let mut request = Request::new();
        request.require("vendor/prod", "^1.0");
        request.require_dev("vendor/dev", "^2.0");

        assert_eq!(request.all_requires().count(), 2);
        request.with_dev(false);
        assert_eq!(request.all_requires().count(), 1);
    }

    #[test]
    fn test_request_fixed_case_insensitive() {
        let mut request = Request::new();
        request.fix(Package::new("php", "8.3.0"));
        assert!(request.is_fixed("php"));
        assert!(request.is_fixed("PHP"));
        assert!(!request.is_fixed("ext-json"));
    }

    #[test]
    fn test_update_policy_all() {
        let mut request = locked_chain();
        request.update_policy(UpdatePolicy::All);
        assert!(request.is_update_allowed("vendor/a"));
        assert!(request.is_update_allowed("vendor/d"));
    }

    #[test]
    fn test_update_policy_only_listed() {
        let mut request = locked_chain();
        request
            .update(vec!["vendor/a".to_string()])
            .update_policy(UpdatePolicy::OnlyListed);

        assert!(request.is_update_allowed("vendor/a"));
        assert!(!request.is_update_allowed("vendor/b"));
        assert!(!request.is_update_allowed("vendor/d"));
    }

    #[test]
    fn test_update_policy_transitive() {
        let mut request = locked_chain();
        request
            .update(vec!["vendor/a".to_string()])
            .update_policy(UpdatePolicy::ListedWithTransitive);

        assert!(request.is_update_allowed("vendor/a"));
        assert!(request.is_update_allowed("vendor/b"));
        assert!(request.is_update_allowed("vendor/c"));
        assert!(!request.is_update_allowed("vendor/d"));
    }

    #[test]
    fn test_update_policy_transitive_no_root() {
        let mut request = locked_chain();
        request.require("vendor/b", "^1.0");
        request
            .update(vec!["vendor/a".to_string()])
            .update_policy(UpdatePolicy::ListedWithTransitiveNoRoot);

        assert!(request.is_update_allowed("vendor/a"));
        // b is a root requirement, so it stays locked even though it is a
        // transitive dependency of a.
        assert!(!request.is_update_allowed("vendor/b"));
        assert!(!request.is_update_allowed("vendor/c"));
    }

    #[test]
    fn test_removals() {
        let mut request = Request::new();
        request.remove("Vendor/Old");
        assert!(request.is_removed("vendor/old"));
        assert!(!request.is_removed("vendor/new"));
    }
}
