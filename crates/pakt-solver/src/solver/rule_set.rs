use std::collections::HashMap;

use super::rule::{Rule, RuleKind};

/// The rule store for one solve: sequential ids, deduplication on the
/// literal set and a per-kind index.
///
/// When a duplicate is added, the id of the earlier rule is returned and the
/// earlier rule's reason is the one that survives for explanations.
#[derive(Debug, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
    by_kind: HashMap<RuleKind, Vec<u32>>,
    hashes: HashMap<u64, u32>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rule, returning its id (or the id of an identical earlier rule).
    pub fn add(&mut self, mut rule: Rule) -> u32 {
        let hash = rule.literal_hash();
        if let Some(&existing_id) = self.hashes.get(&hash) {
            if let Some(existing) = self.get(existing_id) {
                if existing.equals_literals(&rule) {
                    return existing_id;
                }
            }
        }

        let id = self.rules.len() as u32;
        rule.set_id(id);
        self.by_kind.entry(rule.kind()).or_default().push(id);
        self.hashes.insert(hash, id);
        self.rules.push(rule);
        id
    }

    pub fn get(&self, id: u32) -> Option<&Rule> {
        self.rules.get(id as usize)
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut Rule> {
        self.rules.get_mut(id as usize)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }

    pub fn as_slice(&self) -> &[Rule] {
        &self.rules
    }

    pub fn of_kind(&self, kind: RuleKind) -> impl Iterator<Item = &Rule> {
        self.by_kind
            .get(&kind)
            .into_iter()
            .flatten()
            .filter_map(move |&id| self.get(id))
    }

    pub fn assertions(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter().filter(|r| r.is_assertion())
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn count_of_kind(&self, kind: RuleKind) -> usize {
        self.by_kind.get(&kind).map_or(0, |v| v.len())
    }

    pub fn disable(&mut self, id: u32) {
        if let Some(rule) = self.get_mut(id) {
            rule.disable();
        }
    }

    pub fn stats(&self) -> RuleSetStats {
        let mut stats = RuleSetStats {
            total: self.rules.len(),
            ..Default::default()
        };

        for rule in &self.rules {
            match rule.kind() {
                RuleKind::RootRequire => stats.root_require += 1,
                RuleKind::Fixed => stats.fixed += 1,
                RuleKind::PackageRequires => stats.requires += 1,
                RuleKind::PackageConflict => stats.conflict += 1,
                RuleKind::SameName => stats.same_name += 1,
                RuleKind::MultiConflict => stats.multi_conflict += 1,
                RuleKind::PackageAlias | RuleKind::PackageInverseAlias => stats.alias += 1,
                RuleKind::InstalledPackage => stats.installed += 1,
                RuleKind::Learned => stats.learned += 1,
            }
            if rule.is_assertion() {
                stats.assertions += 1;
            }
        }

        stats
    }
}

/// Rule counts by kind, reported through logging after generation.
#[derive(Debug, Default)]
pub struct RuleSetStats {
    pub total: usize,
    pub assertions: usize,
    pub root_require: usize,
    pub fixed: usize,
    pub requires: usize,
    pub conflict: usize,
    pub same_name: usize,
    pub multi_conflict: usize,
    pub alias: usize,
    pub installed: usize,
    pub learned: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_set_sequential_ids() {
        let mut rules = RuleSet::new();
        let a = rules.add(Rule::assertion(1, RuleKind::Fixed));
        let b = rules.add(Rule::requires(1, vec![2, 3]));
        assert_eq!(a, 0);
        assert_eq!(b, 1);
        assert_eq!(rules.len(), 2);
    }

    #[test]
    fn test_rule_set_dedup() {
        let mut rules = RuleSet::new();
        let a = rules.add(Rule::new(vec![1, 2, 3], RuleKind::PackageRequires));
        let b = rules.add(Rule::new(vec![3, 1, 2], RuleKind::PackageRequires));
        assert_eq!(a, b);
        assert_eq!(rules.len(), 1);
    }

    #[test]
    fn test_rule_set_dedup_keeps_earliest_reason() {
        use crate::package::{Link, LinkKind};

        let mut rules = RuleSet::new();
        let first = Rule::new(vec![-1, 2], RuleKind::PackageRequires)
            .with_reason(Link::new("a", "b", "^1.0", LinkKind::Require));
        let second = Rule::new(vec![-1, 2], RuleKind::PackageRequires)
            .with_reason(Link::new("c", "b", "^2.0", LinkKind::Require));

        let id = rules.add(first);
        assert_eq!(rules.add(second), id);
        assert_eq!(rules.get(id).unwrap().reason().unwrap().source, "a");
    }

    #[test]
    fn test_rule_set_of_kind() {
        let mut rules = RuleSet::new();
        rules.add(Rule::assertion(1, RuleKind::Fixed));
        rules.add(Rule::assertion(2, RuleKind::Fixed));
        rules.add(Rule::requires(1, vec![3]));

        assert_eq!(rules.of_kind(RuleKind::Fixed).count(), 2);
        assert_eq!(rules.of_kind(RuleKind::PackageRequires).count(), 1);
        assert_eq!(rules.count_of_kind(RuleKind::Learned), 0);
    }

    #[test]
    fn test_rule_set_assertions() {
        let mut rules = RuleSet::new();
        rules.add(Rule::assertion(1, RuleKind::Fixed));
        rules.add(Rule::requires(1, vec![2, 3]));
        rules.add(Rule::assertion(4, RuleKind::RootRequire));
        assert_eq!(rules.assertions().count(), 2);
    }

    #[test]
    fn test_rule_set_disable() {
        let mut rules = RuleSet::new();
        let id = rules.add(Rule::assertion(1, RuleKind::Fixed));
        assert!(!rules.get(id).unwrap().is_disabled());
        rules.disable(id);
        assert!(rules.get(id).unwrap().is_disabled());
    }

    #[test]
    fn test_rule_set_stats() {
        let mut rules = RuleSet::new();
        rules.add(Rule::assertion(1, RuleKind::Fixed));
        rules.add(Rule::requires(1, vec![2, 3]));
        rules.add(Rule::conflict(vec![2, 3]));

        let stats = rules.stats();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.fixed, 1);
        assert_eq!(stats.requires, 1);
        assert_eq!(stats.conflict, 1);
        assert_eq!(stats.assertions, 1);
    }
}
