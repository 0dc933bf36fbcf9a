use std::fmt;
use std::hash::{Hash, Hasher};

use super::pool::PackageId;
use crate::package::Link;

/// A literal: a signed candidate id. Positive asserts "install", negative
/// asserts "do not install".
pub type Literal = i32;

/// Why a rule exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleKind {
    /// A root requirement: one of the listed candidates must be installed.
    RootRequire,
    /// A request-fixed candidate pinned true (or its competitors false).
    Fixed,
    /// If the source candidate is installed, one of the targets must be.
    PackageRequires,
    /// Two candidates that cannot be installed together.
    PackageConflict,
    /// Pairwise conflict between candidates occupying the same name.
    SameName,
    /// At most one of the listed candidates may be installed (n-ary form of
    /// the same-name conflict).
    MultiConflict,
    /// An alias entry forces its base package.
    PackageAlias,
    /// A base package forces its alias entry.
    PackageInverseAlias,
    /// A previously installed candidate kept in place by the update policy.
    InstalledPackage,
    /// Clause learned during conflict analysis.
    Learned,
}

impl RuleKind {
    pub fn is_multi_conflict(&self) -> bool {
        matches!(self, RuleKind::MultiConflict)
    }

    fn as_str(&self) -> &'static str {
        match self {
            RuleKind::RootRequire => "root-require",
            RuleKind::Fixed => "fixed",
            RuleKind::PackageRequires => "requires",
            RuleKind::PackageConflict => "conflict",
            RuleKind::SameName => "same-name",
            RuleKind::MultiConflict => "multi-conflict",
            RuleKind::PackageAlias => "alias",
            RuleKind::PackageInverseAlias => "inverse-alias",
            RuleKind::InstalledPackage => "installed",
            RuleKind::Learned => "learned",
        }
    }
}

/// A disjunction of literals that must hold in any valid assignment.
///
/// Examples:
/// - `[a]` — candidate `a` must be installed
/// - `[-a]` — candidate `a` must not be installed
/// - `[-a, b, c]` — if `a` is installed, `b` or `c` must be
/// - `[-a, -b]` — `a` and `b` cannot both be installed
#[derive(Clone)]
pub struct Rule {
    literals: Vec<Literal>,
    kind: RuleKind,
    id: u32,
    /// Source candidate, for resolving a display name in diagnostics.
    source: Option<PackageId>,
    /// The link this rule was generated from, if any. Only the problem
    /// explainer reads it.
    reason: Option<Link>,
    disabled: bool,
}

impl Rule {
    pub fn new(literals: Vec<Literal>, kind: RuleKind) -> Self {
        Self {
            literals,
            kind,
            id: 0,
            source: None,
            reason: None,
            disabled: false,
        }
    }

    pub fn assertion(literal: Literal, kind: RuleKind) -> Self {
        Self::new(vec![literal], kind)
    }

    /// `source` requires one of `targets`.
    pub fn requires(source: PackageId, targets: Vec<PackageId>) -> Self {
        let mut literals = vec![-source];
        literals.extend(targets);
        Self::new(literals, RuleKind::PackageRequires)
    }

    /// The listed candidates cannot all be installed together.
    pub fn conflict(packages: Vec<PackageId>) -> Self {
        let literals = packages.into_iter().map(|p| -p).collect();
        Self::new(literals, RuleKind::PackageConflict)
    }

    /// Pairwise same-name conflict.
    pub fn same_name(a: PackageId, b: PackageId) -> Self {
        Self::new(vec![-a, -b], RuleKind::SameName)
    }

    /// At most one of the candidates may be installed. Watches all literals.
    pub fn multi_conflict(packages: Vec<PackageId>) -> Self {
        let literals = packages.into_iter().map(|p| -p).collect();
        Self::new(literals, RuleKind::MultiConflict)
    }

    pub fn root_require(targets: Vec<PackageId>) -> Self {
        Self::new(targets, RuleKind::RootRequire)
    }

    pub fn fixed(package: PackageId) -> Self {
        Self::assertion(package, RuleKind::Fixed)
    }

    pub fn learned(literals: Vec<Literal>) -> Self {
        Self::new(literals, RuleKind::Learned)
    }

    pub fn with_source(mut self, package: PackageId) -> Self {
        self.source = Some(package);
        self
    }

    pub fn with_reason(mut self, link: Link) -> Self {
        self.reason = Some(link);
        self
    }

    pub fn set_id(&mut self, id: u32) {
        self.id = id;
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn kind(&self) -> RuleKind {
        self.kind
    }

    pub fn literals(&self) -> &[Literal] {
        &self.literals
    }

    pub fn source(&self) -> Option<PackageId> {
        self.source
    }

    pub fn reason(&self) -> Option<&Link> {
        self.reason.as_ref()
    }

    pub fn is_assertion(&self) -> bool {
        self.literals.len() == 1
    }

    pub fn is_multi_conflict(&self) -> bool {
        self.kind.is_multi_conflict()
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    pub fn disable(&mut self) {
        self.disabled = true;
    }

    pub fn enable(&mut self) {
        self.disabled = false;
    }

    pub fn len(&self) -> usize {
        self.literals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.literals.is_empty()
    }

    /// Order-independent hash of the literal set, for deduplication.
    pub fn literal_hash(&self) -> u64 {
        use std::collections::hash_map::DefaultHasher;
        let mut sorted = self.literals.clone();
        sorted.sort_unstable();
        let mut hasher = DefaultHasher::new();
        sorted.hash(&mut hasher);
        hasher.finish()
    }

    /// Whether two rules carry the same literal set, in any order.
    pub fn equals_literals(&self, other: &Rule) -> bool {
        if self.literals.len() != other.literals.len() {
            return false;
        }
        let mut a = self.literals.clone();
        let mut b = other.literals.clone();
        a.sort_unstable();
        b.sort_unstable();
        a == b
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rule({:?}, {:?})", self.kind, self.literals)
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let literals: Vec<String> = self
            .literals
            .iter()
            .map(|&l| {
                if l > 0 {
                    format!("+{}", l)
                } else {
                    l.to_string()
                }
            })
            .collect();
        write!(f, "({}) [{}]", self.kind.as_str(), literals.join(" | "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_assertion() {
        let rule = Rule::assertion(5, RuleKind::Fixed);
        assert!(rule.is_assertion());
        assert_eq!(rule.literals(), &[5]);
    }

    #[test]
    fn test_rule_requires() {
        let rule = Rule::requires(1, vec![2, 3, 4]);
        assert_eq!(rule.literals(), &[-1, 2, 3, 4]);
        assert_eq!(rule.kind(), RuleKind::PackageRequires);
    }

    #[test]
    fn test_rule_conflict() {
        let rule = Rule::conflict(vec![1, 2]);
        assert_eq!(rule.literals(), &[-1, -2]);
    }

    #[test]
    fn test_rule_multi_conflict() {
        let rule = Rule::multi_conflict(vec![1, 2, 3]);
        assert_eq!(rule.literals(), &[-1, -2, -3]);
        assert!(rule.is_multi_conflict());
    }

    #[test]
    fn test_rule_literal_hash() {
        let a = Rule::new(vec![1, 2, 3], RuleKind::PackageRequires);
        let b = Rule::new(vec![3, 1, 2], RuleKind::PackageRequires);
        let c = Rule::new(vec![1, 2, 4], RuleKind::PackageRequires);
        assert_eq!(a.literal_hash(), b.literal_hash());
        assert_ne!(a.literal_hash(), c.literal_hash());
    }

    #[test]
    fn test_rule_equals_literals() {
        let a = Rule::new(vec![1, 2, 3], RuleKind::PackageRequires);
        let b = Rule::new(vec![3, 1, 2], RuleKind::PackageConflict);
        let c = Rule::new(vec![1, 2], RuleKind::PackageRequires);
        assert!(a.equals_literals(&b));
        assert!(!a.equals_literals(&c));
    }

    #[test]
    fn test_rule_display() {
        let rule = Rule::requires(1, vec![2, 3]);
        let text = rule.to_string();
        assert!(text.contains("requires"));
        assert!(text.contains("-1"));
        assert!(text.contains("+2"));
    }
}
