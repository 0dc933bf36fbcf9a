//! High-level facade over parsing, matching and sorting.

use crate::constraint::Constraint;
use crate::parser::{VersionParser, VersionParserError};
use crate::version::Version;

/// Convenience entry points for one-shot version operations.
pub struct Semver;

impl Semver {
    /// Check whether a version satisfies a constraint expression.
    pub fn satisfies(version: &str, constraints: &str) -> bool {
        let parser = VersionParser::new();

        let version = match parser.normalize(version) {
            Ok(v) => v,
            Err(_) => return false,
        };
        let constraints = match parser.parse_constraints(constraints) {
            Ok(c) => c,
            Err(_) => return false,
        };

        constraints.matches_version(&version)
    }

    /// Filter `versions` down to those satisfying the constraint expression,
    /// preserving input order.
    pub fn satisfied_by(versions: &[&str], constraints: &str) -> Vec<String> {
        let parser = VersionParser::new();
        let constraints = match parser.parse_constraints(constraints) {
            Ok(c) => c,
            Err(_) => return Vec::new(),
        };

        versions
            .iter()
            .filter_map(|raw| {
                let version = parser.normalize(raw).ok()?;
                constraints.matches_version(&version).then(|| raw.to_string())
            })
            .collect()
    }

    /// Parse a constraint expression once for repeated checks.
    pub fn parse_constraints(constraints: &str) -> Result<Constraint, VersionParserError> {
        VersionParser::new().parse_constraints(constraints)
    }

    /// Sort version strings ascending.
    pub fn sort(versions: &[&str]) -> Vec<String> {
        Self::usort(versions, true)
    }

    /// Sort version strings descending.
    pub fn rsort(versions: &[&str]) -> Vec<String> {
        Self::usort(versions, false)
    }

    fn usort(versions: &[&str], ascending: bool) -> Vec<String> {
        let parser = VersionParser::new();

        let mut normalized: Vec<(Version, usize)> = versions
            .iter()
            .enumerate()
            .filter_map(|(i, raw)| {
                let version = parser.normalize(raw).ok()?;
                Some((parser.normalize_default_branch(&version), i))
            })
            .collect();

        normalized.sort_by(|(a, _), (b, _)| if ascending { a.cmp(b) } else { b.cmp(a) });

        normalized
            .into_iter()
            .map(|(_, i)| versions[i].to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_satisfies_positive() {
        assert!(Semver::satisfies("1.2.3", "1.0.0 - 2.0.0"));
        assert!(Semver::satisfies("1.2.3", "^1.2.3+build"));
        assert!(Semver::satisfies("1.3.0", "^1.2.3+build"));
        assert!(Semver::satisfies("1.0.0", "1.0.0"));
        assert!(Semver::satisfies("v1.2.3", "*"));
        assert!(Semver::satisfies("1.0.1", ">=1.0.0"));
        assert!(Semver::satisfies("1.9999.9999", "<=2.0.0"));
        assert!(Semver::satisfies("2.1.3", "2.x.x"));
        assert!(Semver::satisfies("1.2.3", "1.2.x || 2.x"));
        assert!(Semver::satisfies("2.9.0", "~2.4"));
        assert!(Semver::satisfies("1.8.1", "^1.2.3"));
        assert!(Semver::satisfies("1.2.3", "~1.2.1 >=1.2.3"));
        assert!(Semver::satisfies("1.2.8", ">=1.2"));
        assert!(Semver::satisfies("1.4.2", "^1.2 ^1"));
        assert!(Semver::satisfies("0.0.1-beta", "^0.0.1-alpha"));
    }

    #[test]
    fn test_satisfies_negative() {
        assert!(!Semver::satisfies("2.2.3", "1.0.0 - 2.0.0"));
        assert!(!Semver::satisfies("2.0.0", "^1.2.3+build"));
        assert!(!Semver::satisfies("1.0.0beta", "1"));
        assert!(!Semver::satisfies("1.0.1", "1.0.0"));
        assert!(!Semver::satisfies("0.1.0", ">=1.0.0"));
        assert!(!Semver::satisfies("3.0.0", "<=2.0.0"));
        assert!(!Semver::satisfies("1.1.3", "2.x.x"));
        assert!(!Semver::satisfies("3.1.3", "1.2.x || 2.x"));
        assert!(!Semver::satisfies("3.0.0", "~2.4"));
        assert!(!Semver::satisfies("1.2.2", "^1.2.3"));
        assert!(!Semver::satisfies("0.5.4-alpha", "~v0.5.4-beta"));
        assert!(!Semver::satisfies("2.0.0-alpha", "^1.2.3"));
    }

    #[test]
    fn test_satisfied_by() {
        let versions = vec!["1.0", "1.2", "1.9999.9999", "2.0", "2.1", "0.9999.9999"];
        assert_eq!(
            Semver::satisfied_by(&versions, "~1.0"),
            vec!["1.0", "1.2", "1.9999.9999"]
        );

        let versions = vec!["0.1.1", "0.1.9999", "0.2.0", "0.2.1", "0.3.0"];
        assert_eq!(Semver::satisfied_by(&versions, "^0.2.0"), vec!["0.2.0", "0.2.1"]);
    }

    #[test]
    fn test_sort() {
        let versions = vec!["1.0", "0.1", "0.1", "3.2.1", "2.4.0-alpha", "2.4.0"];
        assert_eq!(
            Semver::sort(&versions),
            vec!["0.1", "0.1", "1.0", "2.4.0-alpha", "2.4.0", "3.2.1"]
        );

        let versions = vec!["dev-foo", "dev-master", "1.0", "50.2"];
        assert_eq!(
            Semver::sort(&versions),
            vec!["dev-foo", "1.0", "50.2", "dev-master"]
        );
    }

    #[test]
    fn test_rsort() {
        let versions = vec!["1.0", "0.1", "0.1", "3.2.1", "2.4.0-alpha", "2.4.0"];
        assert_eq!(
            Semver::rsort(&versions),
            vec!["3.2.1", "2.4.0", "2.4.0-alpha", "1.0", "0.1", "0.1"]
        );
    }

    #[test]
    fn test_parsed_constraint_reuse() {
        let parsed = Semver::parse_constraints("^1.2").unwrap();
        let parser = VersionParser::new();
        assert!(parsed.matches_version(&parser.normalize("1.2.3").unwrap()));
        assert!(parsed.matches_version(&parser.normalize("1.9.0").unwrap()));
        assert!(!parsed.matches_version(&parser.normalize("2.0.0").unwrap()));
    }
}
