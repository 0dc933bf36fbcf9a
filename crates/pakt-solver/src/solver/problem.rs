use std::collections::HashSet;
use std::fmt;

use crate::package::Link;
use crate::platform::is_platform_package;

use super::pool::{PackageId, Pool};
use super::rule::{Rule, RuleKind};
use super::rule_generator::ROOT_SOURCE;

/// One unsatisfiable requirement chain, as a minimized list of the rules
/// that imply the conflict.
#[derive(Debug, Clone, Default)]
pub struct Problem {
    rules: Vec<ProblemRule>,
    seen: HashSet<u32>,
    message: Option<String>,
}

/// A rule snapshot taken when the problem is assembled, so descriptions do
/// not depend on the pool outliving the solve.
#[derive(Debug, Clone)]
struct ProblemRule {
    kind: RuleKind,
    source: Option<PackageId>,
    source_name: Option<String>,
    reason: Option<Link>,
}

impl Problem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Record a rule in the chain; repeated rules are kept once, so the
    /// earliest mention wins.
    pub fn add_rule(&mut self, rule: &Rule, pool: &Pool) {
        if !self.seen.insert(rule.id()) {
            return;
        }

        let source_name = rule
            .source()
            .and_then(|id| pool.entry(id))
            .map(|entry| entry.pretty_string());

        self.rules.push(ProblemRule {
            kind: rule.kind(),
            source: rule.source(),
            source_name,
            reason: rule.reason().cloned(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty() && self.message.is_none()
    }

    /// Render the chain, one line per rule, in recorded order.
    pub fn describe(&self, pool: &Pool) -> String {
        let mut lines = Vec::new();
        if let Some(message) = &self.message {
            lines.push(message.clone());
        }
        for rule in &self.rules {
            let line = describe_rule(pool, rule);
            if !line.is_empty() {
                lines.push(format!("  - {}", line));
            }
        }
        lines.join("\n")
    }
}

fn source_name(pool: &Pool, rule: &ProblemRule) -> String {
    if let Some(name) = &rule.source_name {
        return name.clone();
    }
    rule.source
        .and_then(|id| pool.entry(id))
        .map(|entry| entry.pretty_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// `Name[1.0, 1.1]` listing for a set of candidates.
fn candidate_list(pool: &Pool, ids: &[PackageId]) -> String {
    let mut name = String::new();
    let mut versions = Vec::new();
    for &id in ids {
        if let Some(entry) = pool.entry(id) {
            if name.is_empty() {
                name = entry
                    .as_package()
                    .map(|p| p.pretty_name().to_string())
                    .unwrap_or_else(|| entry.name().to_string());
            }
            versions.push(
                entry
                    .as_package()
                    .map(|p| p.pretty_version().to_string())
                    .unwrap_or_else(|| entry.version().to_string()),
            );
        }
    }
    format!("{}[{}]", name, versions.join(", "))
}

/// Explain what the pool holds for an unsatisfied link target.
fn describe_target(pool: &Pool, link: &Link) -> String {
    let constraint = pool.parse_constraint(&link.constraint);
    let matching = pool.what_provides(&link.target, constraint.as_ref());
    if !matching.is_empty() {
        return format!("satisfiable by {}", candidate_list(pool, &matching));
    }

    let any_version = pool.what_provides(&link.target, None);
    if !any_version.is_empty() {
        return format!(
            "found {} but it does not match the constraint",
            candidate_list(pool, &any_version)
        );
    }

    if is_platform_package(&link.target) {
        return format!(
            "{} is missing from your platform; install or enable it, or ignore the requirement \
             with the platform requirement filter",
            link.target
        );
    }

    "it could not be found in any version".to_string()
}

fn describe_rule(pool: &Pool, rule: &ProblemRule) -> String {
    match rule.kind {
        RuleKind::RootRequire => {
            let Some(link) = &rule.reason else {
                return "Root package has an unsatisfiable requirement".to_string();
            };
            format!(
                "Root package requires {} {} -> {}",
                link.target,
                link.pretty_constraint(),
                describe_target(pool, link)
            )
        }
        RuleKind::Fixed => {
            if let Some(link) = &rule.reason {
                if link.source == ROOT_SOURCE {
                    return format!("{} is marked for removal", link.target);
                }
            }
            format!("{} is fixed and cannot be modified", source_name(pool, rule))
        }
        RuleKind::InstalledPackage => format!(
            "{} is locked and the update policy does not allow it to change",
            source_name(pool, rule)
        ),
        RuleKind::PackageRequires => {
            let source = source_name(pool, rule);
            match &rule.reason {
                Some(link) => format!(
                    "{} requires {} {} -> {}",
                    source,
                    link.target,
                    link.pretty_constraint(),
                    describe_target(pool, link)
                ),
                None => format!("{} has an unsatisfiable requirement", source),
            }
        }
        RuleKind::PackageConflict => {
            let source = source_name(pool, rule);
            match &rule.reason {
                Some(link) => format!(
                    "{} {} {} {}",
                    source,
                    link.kind,
                    link.target,
                    link.pretty_constraint()
                ),
                None => format!("{} conflicts with another package", source),
            }
        }
        RuleKind::SameName | RuleKind::MultiConflict => match &rule.reason {
            Some(link) => format!(
                "only one package providing {} can be installed",
                link.target
            ),
            None => "only one version of a package can be installed".to_string(),
        },
        RuleKind::PackageAlias | RuleKind::PackageInverseAlias => format!(
            "{} is an alias and installs together with its base package",
            source_name(pool, rule)
        ),
        RuleKind::Learned => "conclusion reached by conflict analysis".to_string(),
    }
}

/// All problems found in one solve.
#[derive(Debug, Default)]
pub struct ProblemSet {
    problems: Vec<Problem>,
}

impl ProblemSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, problem: Problem) {
        self.problems.push(problem);
    }

    pub fn is_empty(&self) -> bool {
        self.problems.is_empty()
    }

    pub fn len(&self) -> usize {
        self.problems.len()
    }

    pub fn problems(&self) -> &[Problem] {
        &self.problems
    }

    /// Stable, numbered rendering of every problem.
    pub fn describe(&self, pool: &Pool) -> String {
        if self.problems.is_empty() {
            return "No problems found".to_string();
        }
        self.problems
            .iter()
            .enumerate()
            .map(|(i, p)| format!("Problem {}:\n{}", i + 1, p.describe(pool)))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

impl fmt::Display for ProblemSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} problem(s) found", self.problems.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::{LinkKind, Package};

    #[test]
    fn test_missing_requirement_description() {
        let pool = Pool::new();
        let mut problem = Problem::new();

        let rule = Rule::new(vec![], RuleKind::RootRequire).with_reason(Link::new(
            ROOT_SOURCE,
            "vendor/missing",
            "^1.0",
            LinkKind::Require,
        ));
        problem.add_rule(&rule, &pool);

        let text = problem.describe(&pool);
        assert!(text.contains("vendor/missing"));
        assert!(text.contains("^1.0"));
        assert!(text.contains("could not be found"));
    }

    #[test]
    fn test_unmatched_constraint_description() {
        let mut pool = Pool::new();
        pool.add_package(Package::new("B", "1.0"));
        let a = pool.add_package(Package::new("A", "1.0"));

        let mut problem = Problem::new();
        let rule = Rule::new(vec![-a], RuleKind::PackageRequires)
            .with_source(a)
            .with_reason(Link::new("a", "b", ">= 2.0", LinkKind::Require));
        problem.add_rule(&rule, &pool);

        let text = problem.describe(&pool);
        assert!(text.contains("A 1.0 requires b >= 2.0"));
        assert!(text.contains("found B[1.0] but it does not match the constraint"));
    }

    #[test]
    fn test_satisfiable_link_description() {
        let mut pool = Pool::new();
        pool.add_package(Package::new("B", "1.0"));
        let a = pool.add_package(Package::new("A", "1.0"));

        let mut problem = Problem::new();
        let rule = Rule::new(vec![-a, 1], RuleKind::PackageRequires)
            .with_source(a)
            .with_reason(Link::new("a", "b", ">= 1.0", LinkKind::Require));
        problem.add_rule(&rule, &pool);

        let text = problem.describe(&pool);
        assert!(text.contains("A 1.0 requires b >= 1.0 -> satisfiable by B[1.0]"));
    }

    #[test]
    fn test_platform_requirement_rewrite() {
        let mut pool = Pool::new();
        let a = pool.add_package(Package::new("vendor/app", "1.0.0"));

        let mut problem = Problem::new();
        let rule = Rule::new(vec![-a], RuleKind::PackageRequires)
            .with_source(a)
            .with_reason(Link::new("vendor/app", "ext-redis", "*", LinkKind::Require));
        problem.add_rule(&rule, &pool);

        let text = problem.describe(&pool);
        assert!(text.contains("ext-redis is missing from your platform"));
        assert!(text.contains("platform requirement filter"));
    }

    #[test]
    fn test_duplicate_rules_collapse() {
        let pool = Pool::new();
        let mut problem = Problem::new();

        let mut rule = Rule::new(vec![], RuleKind::RootRequire).with_reason(Link::new(
            ROOT_SOURCE,
            "vendor/x",
            "*",
            LinkKind::Require,
        ));
        rule.set_id(7);
        problem.add_rule(&rule, &pool);
        problem.add_rule(&rule, &pool);

        assert_eq!(problem.describe(&pool).matches("vendor/x").count(), 1);
    }

    #[test]
    fn test_problem_set_describe() {
        let pool = Pool::new();
        let mut problems = ProblemSet::new();
        assert!(problems.is_empty());
        problems.add(Problem::new().with_message("boom"));

        let text = problems.describe(&pool);
        assert!(text.starts_with("Problem 1:"));
        assert!(text.contains("boom"));
    }
}
