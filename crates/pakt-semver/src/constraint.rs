//! Version constraints.
//!
//! A constraint is a tagged variant: the universal constraint, the empty
//! constraint, a primitive `(operator, version)` pair, or a conjunction or
//! disjunction of further constraints. `matches` tests whether two
//! constraints intersect, so a requirement can be checked against a provided
//! constraint without enumerating versions.

use std::cmp::Ordering;
use std::fmt;

use crate::version::Version;

/// Comparison operators for primitive constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Op {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "=" | "==" => Some(Op::Eq),
            "!=" | "<>" => Some(Op::Ne),
            "<" => Some(Op::Lt),
            "<=" => Some(Op::Le),
            ">" => Some(Op::Gt),
            ">=" => Some(Op::Ge),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Op::Eq => "==",
            Op::Ne => "!=",
            Op::Lt => "<",
            Op::Le => "<=",
            Op::Gt => ">",
            Op::Ge => ">=",
        }
    }

    /// Evaluate `a <op> b` on two comparable versions.
    fn eval(&self, cmp: Ordering) -> bool {
        match self {
            Op::Eq => cmp == Ordering::Equal,
            Op::Ne => cmp != Ordering::Equal,
            Op::Lt => cmp == Ordering::Less,
            Op::Le => cmp != Ordering::Greater,
            Op::Gt => cmp == Ordering::Greater,
            Op::Ge => cmp != Ordering::Less,
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which side of the number line a comparison operator opens up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Less,
    Greater,
}

fn direction_of(op: Op) -> Option<Direction> {
    match op {
        Op::Lt | Op::Le => Some(Direction::Less),
        Op::Gt | Op::Ge => Some(Direction::Greater),
        Op::Eq | Op::Ne => None,
    }
}

/// A version constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constraint {
    /// Matches any version (`*`).
    Any,
    /// Matches nothing.
    None,
    /// A primitive comparison against a single version.
    Version(Op, Version),
    /// All inner constraints must hold.
    And(Vec<Constraint>),
    /// At least one inner constraint must hold.
    Or(Vec<Constraint>),
}

impl Constraint {
    /// An exact-version constraint.
    pub fn exact(version: Version) -> Self {
        Constraint::Version(Op::Eq, version)
    }

    /// Build a conjunction, collapsing trivial cases.
    pub fn and(mut constraints: Vec<Constraint>) -> Self {
        match constraints.len() {
            0 => Constraint::Any,
            1 => constraints.pop().unwrap(),
            _ => Constraint::And(constraints),
        }
    }

    /// Build a disjunction, collapsing trivial cases.
    pub fn or(mut constraints: Vec<Constraint>) -> Self {
        match constraints.len() {
            0 => Constraint::Any,
            1 => constraints.pop().unwrap(),
            _ => Constraint::Or(constraints),
        }
    }

    /// Widen `self` so it also accepts everything `other` accepts.
    pub fn union(self, other: Constraint) -> Constraint {
        if self == Constraint::Any || other == Constraint::Any {
            return Constraint::Any;
        }
        if self == other {
            return self;
        }
        let mut branches = match self {
            Constraint::Or(inner) => inner,
            single => vec![single],
        };
        match other {
            Constraint::Or(inner) => branches.extend(inner),
            single => branches.push(single),
        }
        Constraint::Or(branches)
    }

    /// Test whether this constraint and `provider` can be satisfied by a
    /// common version.
    pub fn matches(&self, provider: &Constraint) -> bool {
        match (self, provider) {
            (Constraint::Any, _) | (_, Constraint::Any) => true,
            (Constraint::None, _) | (_, Constraint::None) => false,
            (Constraint::Version(op_a, ver_a), Constraint::Version(op_b, ver_b)) => {
                match_primitive(*op_a, ver_a, *op_b, ver_b)
            }
            // A conjunction against a disjunctive provider is decided on the
            // disjunctive side, branch by branch.
            (Constraint::And(_), Constraint::Or(_)) => provider.matches(self),
            (Constraint::And(inner), _) => inner.iter().all(|c| c.matches(provider)),
            (Constraint::Or(inner), _) => inner.iter().any(|c| c.matches(provider)),
            (Constraint::Version(..), Constraint::And(inner)) => {
                inner.iter().all(|c| c.matches(self))
            }
            (Constraint::Version(..), Constraint::Or(inner)) => {
                inner.iter().any(|c| c.matches(self))
            }
        }
    }

    /// Test a concrete version against this constraint.
    pub fn matches_version(&self, version: &Version) -> bool {
        self.matches(&Constraint::Version(Op::Eq, version.clone()))
    }
}

/// Intersection test for two primitive constraints. Branch versions never
/// satisfy bounded numeric ranges; they only compare for equality against
/// the identical branch.
fn match_primitive(req_op: Op, req_ver: &Version, prov_op: Op, prov_ver: &Version) -> bool {
    let req_eq = req_op == Op::Eq;
    let req_ne = req_op == Op::Ne;
    let prov_eq = prov_op == Op::Eq;
    let prov_ne = prov_op == Op::Ne;

    if req_ne || prov_ne {
        if req_ne && !prov_ne && !prov_eq && prov_ver.is_branch() {
            return false;
        }
        if prov_ne && !req_ne && !req_eq && req_ver.is_branch() {
            return false;
        }
        if !req_eq && !prov_eq {
            return true;
        }
        return version_compare(prov_ver, req_ver, Op::Ne);
    }

    let req_dir = direction_of(req_op);
    let prov_dir = direction_of(prov_op);

    // Two bounds opening the same way always intersect, unless a branch is
    // involved.
    if req_dir.is_some() && req_dir == prov_dir {
        return !(req_ver.is_branch() || prov_ver.is_branch());
    }

    let (version_a, version_b, op) = if req_eq {
        (req_ver, prov_ver, prov_op)
    } else {
        (prov_ver, req_ver, req_op)
    };

    if version_compare(version_a, version_b, op) {
        // Opposite-direction bounds meeting at the same version only
        // intersect when both ends are inclusive.
        if !req_eq && !prov_eq {
            let opposite = req_dir.is_some() && prov_dir.is_some() && req_dir != prov_dir;
            if opposite && !prov_ver.is_branch() && !req_ver.is_branch() && prov_ver == req_ver {
                let req_inclusive = req_op == Op::Le || req_op == Op::Ge;
                let prov_inclusive = prov_op == Op::Le || prov_op == Op::Ge;
                return req_inclusive && prov_inclusive;
            }
        }
        return true;
    }

    false
}

/// Compare two versions under an operator, with branch semantics applied.
fn version_compare(a: &Version, b: &Version, op: Op) -> bool {
    let a_branch = a.is_branch();
    let b_branch = b.is_branch();

    if op == Op::Ne && (a_branch || b_branch) {
        return a != b;
    }

    if a_branch && b_branch {
        return op == Op::Eq && a == b;
    }

    // A branch on one side of a numeric comparison never matches.
    if a_branch || b_branch {
        return false;
    }

    op.eval(a.cmp(b))
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::Any => f.write_str("*"),
            Constraint::None => f.write_str("none"),
            Constraint::Version(op, version) => write!(f, "{} {}", op, version),
            Constraint::And(inner) => {
                let rendered: Vec<String> = inner.iter().map(|c| c.to_string()).collect();
                write!(f, "[{}]", rendered.join(" "))
            }
            Constraint::Or(inner) => {
                let rendered: Vec<String> = inner.iter().map(|c| c.to_string()).collect();
                write!(f, "[{}]", rendered.join(" || "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::Version;

    fn ver(parts: [u64; 4]) -> Version {
        Version::new(parts)
    }

    fn prim(op: Op, parts: [u64; 4]) -> Constraint {
        Constraint::Version(op, ver(parts))
    }

    fn check(req_op: Op, req: [u64; 4], prov_op: Op, prov: [u64; 4]) -> bool {
        prim(req_op, req).matches(&prim(prov_op, prov))
    }

    #[test]
    fn test_equal_matches() {
        assert!(check(Op::Eq, [2, 0, 0, 0], Op::Eq, [2, 0, 0, 0]));
        assert!(check(Op::Eq, [2, 0, 0, 0], Op::Lt, [3, 0, 0, 0]));
        assert!(check(Op::Eq, [2, 0, 0, 0], Op::Le, [2, 0, 0, 0]));
        assert!(check(Op::Eq, [2, 0, 0, 0], Op::Ge, [2, 0, 0, 0]));
        assert!(check(Op::Eq, [2, 0, 0, 0], Op::Gt, [1, 0, 0, 0]));
        assert!(check(Op::Eq, [2, 0, 0, 0], Op::Ne, [1, 0, 0, 0]));
    }

    #[test]
    fn test_equal_fails() {
        assert!(!check(Op::Eq, [2, 0, 0, 0], Op::Eq, [1, 0, 0, 0]));
        assert!(!check(Op::Eq, [2, 0, 0, 0], Op::Lt, [2, 0, 0, 0]));
        assert!(!check(Op::Eq, [2, 0, 0, 0], Op::Gt, [2, 0, 0, 0]));
        assert!(!check(Op::Eq, [2, 0, 0, 0], Op::Ne, [2, 0, 0, 0]));
    }

    #[test]
    fn test_same_direction_always_intersects() {
        assert!(check(Op::Lt, [2, 0, 0, 0], Op::Lt, [1, 0, 0, 0]));
        assert!(check(Op::Lt, [2, 0, 0, 0], Op::Le, [3, 0, 0, 0]));
        assert!(check(Op::Ge, [2, 0, 0, 0], Op::Gt, [5, 0, 0, 0]));
    }

    #[test]
    fn test_opposite_direction_bounds() {
        // >= 2 and <= 2 meet at 2.
        assert!(check(Op::Ge, [2, 0, 0, 0], Op::Le, [2, 0, 0, 0]));
        // >= 2 and < 2 do not.
        assert!(!check(Op::Ge, [2, 0, 0, 0], Op::Lt, [2, 0, 0, 0]));
        // >= 1 and < 3 overlap between the bounds.
        assert!(check(Op::Ge, [1, 0, 0, 0], Op::Lt, [3, 0, 0, 0]));
        // >= 3 and < 2 are disjoint.
        assert!(!check(Op::Ge, [3, 0, 0, 0], Op::Lt, [2, 0, 0, 0]));
    }

    #[test]
    fn test_not_equal() {
        assert!(check(Op::Ne, [2, 0, 0, 0], Op::Eq, [1, 0, 0, 0]));
        assert!(!check(Op::Ne, [2, 0, 0, 0], Op::Eq, [2, 0, 0, 0]));
        assert!(check(Op::Ne, [2, 0, 0, 0], Op::Lt, [1, 0, 0, 0]));
        assert!(check(Op::Ne, [2, 0, 0, 0], Op::Ne, [2, 0, 0, 0]));
    }

    #[test]
    fn test_branches_match_exactly_only() {
        let foo = Constraint::exact(Version::branch("foo-bar"));
        let xyz = Constraint::exact(Version::branch("foo-xyz"));
        assert!(foo.matches(&foo.clone()));
        assert!(!foo.matches(&xyz));
    }

    #[test]
    fn test_branches_never_satisfy_numeric_ranges() {
        let range = prim(Op::Ge, [1, 0, 0, 0]);
        let branch = Constraint::exact(Version::branch("main"));
        assert!(!range.matches(&branch));
        assert!(!branch.matches(&range));
    }

    #[test]
    fn test_branch_not_equal() {
        let ne_branch = Constraint::Version(Op::Ne, Version::branch("foo"));
        let other_branch = Constraint::exact(Version::branch("bar"));
        let same_branch = Constraint::exact(Version::branch("foo"));
        assert!(ne_branch.matches(&other_branch));
        assert!(!ne_branch.matches(&same_branch));
    }

    #[test]
    fn test_conjunction() {
        // >= 1, < 2
        let range = Constraint::and(vec![
            prim(Op::Ge, [1, 0, 0, 0]),
            prim(Op::Lt, [2, 0, 0, 0]),
        ]);
        assert!(range.matches_version(&ver([1, 5, 0, 0])));
        assert!(!range.matches_version(&ver([2, 0, 0, 0])));
        assert!(!range.matches_version(&ver([0, 9, 0, 0])));
    }

    #[test]
    fn test_disjunction() {
        let either = Constraint::or(vec![
            prim(Op::Eq, [1, 0, 0, 0]),
            prim(Op::Eq, [2, 0, 0, 0]),
        ]);
        assert!(either.matches_version(&ver([1, 0, 0, 0])));
        assert!(either.matches_version(&ver([2, 0, 0, 0])));
        assert!(!either.matches_version(&ver([3, 0, 0, 0])));
    }

    #[test]
    fn test_range_intersection_via_multi() {
        let a = Constraint::and(vec![
            prim(Op::Ge, [1, 0, 0, 0]),
            prim(Op::Lt, [2, 0, 0, 0]),
        ]);
        let b = Constraint::and(vec![
            prim(Op::Ge, [1, 5, 0, 0]),
            prim(Op::Lt, [3, 0, 0, 0]),
        ]);
        let c = Constraint::and(vec![
            prim(Op::Ge, [2, 5, 0, 0]),
            prim(Op::Lt, [3, 0, 0, 0]),
        ]);
        assert!(a.matches(&b));
        assert!(b.matches(&a));
        assert!(!a.matches(&c));
        assert!(!c.matches(&a));
    }

    #[test]
    fn test_any_matches_everything() {
        let branch = Constraint::exact(Version::branch("main"));
        assert!(Constraint::Any.matches(&branch));
        assert!(branch.matches(&Constraint::Any));
        assert!(Constraint::Any.matches_version(&ver([9, 9, 9, 9])));
    }

    #[test]
    fn test_none_matches_nothing() {
        assert!(!Constraint::None.matches_version(&ver([1, 0, 0, 0])));
        assert!(!prim(Op::Ge, [1, 0, 0, 0]).matches(&Constraint::None));
    }

    #[test]
    fn test_union() {
        let a = prim(Op::Eq, [1, 0, 0, 0]);
        let b = prim(Op::Eq, [2, 0, 0, 0]);
        let joined = a.clone().union(b);
        assert!(joined.matches_version(&ver([1, 0, 0, 0])));
        assert!(joined.matches_version(&ver([2, 0, 0, 0])));
        assert_eq!(a.clone().union(Constraint::Any), Constraint::Any);
        assert_eq!(a.clone().union(a.clone()), a);
    }

    #[test]
    fn test_collapse_helpers() {
        assert_eq!(Constraint::and(vec![]), Constraint::Any);
        let single = prim(Op::Eq, [1, 0, 0, 0]);
        assert_eq!(Constraint::and(vec![single.clone()]), single);
        assert_eq!(Constraint::or(vec![single.clone()]), single);
    }

    #[test]
    fn test_display() {
        assert_eq!(prim(Op::Ge, [1, 0, 0, 0]).to_string(), ">= 1.0.0.0");
        assert_eq!(Constraint::Any.to_string(), "*");
        let range = Constraint::and(vec![
            prim(Op::Ge, [1, 0, 0, 0]),
            prim(Op::Lt, [2, 0, 0, 0]),
        ]);
        assert_eq!(range.to_string(), "[>= 1.0.0.0 < 2.0.0.0]");
    }
}
