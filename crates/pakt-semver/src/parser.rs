//! Version string normalization and constraint parsing.

use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

use crate::constraint::{Constraint, Op};
use crate::version::{Release, Stability, Version, BRANCH_WILDCARD};

/// Error type for version and constraint parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionParserError {
    #[error("Invalid version string \"{0}\"")]
    InvalidVersion(String),
    #[error("Invalid operator \"{0}\"")]
    InvalidOperator(String),
    #[error("Invalid stability \"{0}\"")]
    InvalidStability(String),
    #[error("Could not parse version constraint {constraint}: {reason}")]
    ConstraintParse { constraint: String, reason: String },
}

const MODIFIER: &str =
    r"[._-]?(?:(stable|beta|b|RC|alpha|a|patch|pl|p)((?:[.-]?\d+)*)?)?([.-]?dev)?";
const STABILITIES: &str = "stable|RC|beta|alpha|dev";

lazy_static! {
    static ref CLASSICAL_RE: Regex = Regex::new(&format!(
        r"(?i)^v?(\d{{1,5}})(\.\d+)?(\.\d+)?(\.\d+)?{}$",
        MODIFIER
    ))
    .unwrap();
    static ref DATE_RE: Regex = Regex::new(&format!(
        r"(?i)^v?(\d{{4}}(?:[.:-]?\d{{2}}){{1,6}}(?:[.:-]?\d{{1,3}}){{0,2}}){}$",
        MODIFIER
    ))
    .unwrap();
    static ref BRANCH_RE: Regex =
        Regex::new(r"(?i)^v?(\d+)(?:\.(\d+|[xX*]))?(?:\.(\d+|[xX*]))?(?:\.(\d+|[xX*]))?$")
            .unwrap();
    static ref ALIAS_RE: Regex = Regex::new(r"^([^,\s]+) +as +([^,\s]+)$").unwrap();
    static ref STABILITY_FLAG_RE: Regex =
        Regex::new(&format!(r"(?i)@(?:{})$", STABILITIES)).unwrap();
    static ref BUILD_METADATA_RE: Regex = Regex::new(r"^([^,\s+]+)\+[^\s]+$").unwrap();
    static ref DEV_SUFFIX_RE: Regex = Regex::new(r"(?i)^(.*?)[.-]?dev$").unwrap();
    // A version prefix as used inside tilde / caret / hyphen / x ranges.
    static ref PREFIX_RE: Regex = Regex::new(&format!(
        r"(?i)^v?(\d+)(?:\.(\d+))?(?:\.(\d+))?(?:\.(\d+))?{}(?:\+[^\s]+)?$",
        MODIFIER
    ))
    .unwrap();
    static ref WILDCARD_RE: Regex = Regex::new(r"(?i)^(v)?[xX*](\.[xX*])*$").unwrap();
    static ref X_RANGE_RE: Regex =
        Regex::new(r"^v?(\d+)(?:\.(\d+))?(?:\.(\d+))?(?:\.[xX*])+$").unwrap();
    static ref HYPHEN_RE: Regex = Regex::new(r"^(\S+) +- +(\S+)$").unwrap();
    static ref COMPARATOR_RE: Regex = Regex::new(r"^(<>|!=|>=?|<=?|==?)?\s*(.*)$").unwrap();
    static ref OR_SPLIT_RE: Regex = Regex::new(r"\s*\|\|?\s*").unwrap();
    static ref CONSTRAINT_STABILITY_RE: Regex =
        Regex::new(&format!(r"(?i)^([^,\s]*?)@({})$", STABILITIES)).unwrap();
    static ref CONSTRAINT_REF_RE: Regex =
        Regex::new(r"(?i)^(dev-[^,\s@]+?|[^,\s@]+?\.x-dev)#.+$").unwrap();
}

/// Numeric components plus the release marker parsed from a version prefix,
/// along with how many segments were written out explicitly.
struct VersionPrefix {
    parts: [u64; 4],
    explicit: usize,
    release: Release,
    dev_tail: bool,
    has_modifier: bool,
}

/// Parser for version strings and constraint expressions.
#[derive(Debug, Default)]
pub struct VersionParser;

impl VersionParser {
    pub fn new() -> Self {
        VersionParser
    }

    /// Whether `version` normalizes cleanly.
    pub fn is_valid(&self, version: &str) -> bool {
        self.normalize(version).is_ok()
    }

    /// The stability a raw version string carries.
    pub fn parse_stability(version: &str) -> Stability {
        let version = version.split('#').next().unwrap_or(version);
        let lower = version.to_ascii_lowercase();
        if lower.starts_with("dev-") || lower.ends_with("-dev") {
            return Stability::Dev;
        }
        VersionParser
            .normalize(version)
            .map(|v| v.stability())
            .unwrap_or(Stability::Stable)
    }

    /// Parse a minimum-stability style string.
    pub fn normalize_stability(stability: &str) -> Result<Stability, VersionParserError> {
        stability
            .parse()
            .map_err(|_| VersionParserError::InvalidStability(stability.to_string()))
    }

    /// Normalize a version string into a parsed [`Version`].
    pub fn normalize(&self, version: &str) -> Result<Version, VersionParserError> {
        let version = version.trim();
        if version.is_empty() {
            return Err(VersionParserError::InvalidVersion(version.to_string()));
        }
        let original = version;

        // Strip aliasing: "dev-main as 1.0.0" normalizes to its source.
        let version = match ALIAS_RE.captures(version) {
            Some(caps) => caps.get(1).unwrap().as_str(),
            None => version,
        };

        // Strip a @stability flag.
        let version = STABILITY_FLAG_RE.replace(version, "").into_owned();
        let version = version.as_str();

        // Default VCS branch names are branch versions.
        if version == "master" || version == "trunk" || version == "default" {
            return Ok(Version::branch(version));
        }

        if version.len() > 4
            && version
                .get(..4)
                .map_or(false, |prefix| prefix.eq_ignore_ascii_case("dev-"))
        {
            return Ok(Version::branch(&version[4..]));
        }

        // Strip build metadata.
        let version = match BUILD_METADATA_RE.captures(version) {
            Some(caps) => caps.get(1).unwrap().as_str(),
            None => version,
        };

        if let Some(caps) = CLASSICAL_RE.captures(version) {
            let mut parts = [0u64; 4];
            parts[0] = parse_segment(caps.get(1).unwrap().as_str(), original)?;
            for (i, group) in (2..=4).enumerate() {
                if let Some(m) = caps.get(group) {
                    parts[i + 1] = parse_segment(m.as_str().trim_start_matches('.'), original)?;
                }
            }
            return Ok(build_version(parts, &caps, 5));
        }

        if let Some(caps) = DATE_RE.captures(version) {
            let digits: Vec<&str> = caps
                .get(1)
                .unwrap()
                .as_str()
                .split(|c: char| !c.is_ascii_digit())
                .filter(|s| !s.is_empty())
                .collect();
            if digits.len() > 4 {
                return Err(VersionParserError::InvalidVersion(original.to_string()));
            }
            let mut parts = [0u64; 4];
            for (i, segment) in digits.iter().enumerate() {
                parts[i] = parse_segment(segment, original)?;
            }
            return Ok(build_version(parts, &caps, 2));
        }

        // A "-dev" suffix on a numeric-ish name is a branch version.
        if let Some(caps) = DEV_SUFFIX_RE.captures(version) {
            if let Some(prefix) = caps.get(1) {
                let normalized = self.normalize_branch(prefix.as_str());
                if !normalized.is_branch() {
                    return Ok(normalized);
                }
            }
        }

        Err(VersionParserError::InvalidVersion(original.to_string()))
    }

    /// Normalize a branch name: numeric branches become wildcard-padded dev
    /// versions (`1.x` is `1.9999999.9999999.9999999-dev`), anything else is
    /// a named branch.
    pub fn normalize_branch(&self, name: &str) -> Version {
        let name = name.trim();
        if let Some(caps) = BRANCH_RE.captures(name) {
            let mut parts = [BRANCH_WILDCARD; 4];
            for (i, group) in (1..=4).enumerate() {
                if let Some(m) = caps.get(group) {
                    let text = m.as_str();
                    if !text.eq_ignore_ascii_case("x") && text != "*" {
                        if let Ok(n) = text.parse() {
                            parts[i] = n;
                        }
                    }
                }
            }
            return Version::new(parts).with_dev_tail(true);
        }
        Version::branch(name)
    }

    /// Map the default VCS branches to the highest possible dev version, so
    /// they sort above every tagged release.
    pub fn normalize_default_branch(&self, version: &Version) -> Version {
        match version.branch_name() {
            Some("master") | Some("default") | Some("trunk") => {
                Version::new([BRANCH_WILDCARD; 4]).with_dev_tail(true)
            }
            _ => version.clone(),
        }
    }

    /// Parse a constraint expression into a [`Constraint`].
    pub fn parse_constraints(&self, constraints: &str) -> Result<Constraint, VersionParserError> {
        let trimmed = constraints.trim();
        if trimmed.is_empty() {
            return Err(VersionParserError::InvalidVersion(String::new()));
        }

        let or_groups: Vec<&str> = OR_SPLIT_RE.split(trimmed).collect();
        if or_groups.first().map_or(false, |s| s.is_empty())
            || or_groups.last().map_or(false, |s| s.is_empty())
        {
            return Err(VersionParserError::ConstraintParse {
                constraint: trimmed.to_string(),
                reason: "dangling OR operator".to_string(),
            });
        }

        let mut branches = Vec::with_capacity(or_groups.len());
        for group in or_groups {
            let mut conjuncts = Vec::new();
            for part in split_and_constraints(group) {
                conjuncts.extend(self.parse_constraint(&part)?);
            }
            branches.push(Constraint::and(conjuncts));
        }

        Ok(Constraint::or(branches))
    }

    fn parse_constraint(&self, constraint: &str) -> Result<Vec<Constraint>, VersionParserError> {
        let constraint = constraint.trim();

        // Strip aliasing.
        let constraint = match ALIAS_RE.captures(constraint) {
            Some(caps) => caps.get(1).unwrap().as_str(),
            None => constraint,
        };

        // Strip a @stability suffix; a bare "@dev" means any version.
        let constraint = match CONSTRAINT_STABILITY_RE.captures(constraint) {
            Some(caps) => {
                let prefix = caps.get(1).map_or("", |m| m.as_str());
                if prefix.is_empty() {
                    "*"
                } else {
                    // Safe: the capture borrows from `constraint`.
                    &constraint[..prefix.len()]
                }
            }
            None => constraint,
        };

        // Strip a #reference on branch requirements.
        let constraint = match CONSTRAINT_REF_RE.captures(constraint) {
            Some(caps) => caps.get(1).unwrap().as_str(),
            None => constraint,
        };

        if WILDCARD_RE.is_match(constraint) {
            let has_v = constraint.starts_with('v') || constraint.starts_with('V');
            if has_v || constraint.contains('.') {
                return Ok(vec![Constraint::Version(
                    Op::Ge,
                    Version::new([0; 4]).with_dev_tail(true),
                )]);
            }
            return Ok(vec![Constraint::Any]);
        }

        if let Some(rest) = constraint.strip_prefix('~') {
            if rest.starts_with('>') {
                return Err(VersionParserError::ConstraintParse {
                    constraint: constraint.to_string(),
                    reason: "invalid operator \"~>\", did you mean \"~\"".to_string(),
                });
            }
            if let Some(prefix) = parse_version_prefix(rest) {
                return Ok(tilde_range(&prefix));
            }
        }

        if let Some(rest) = constraint.strip_prefix('^') {
            if let Some(prefix) = parse_version_prefix(rest) {
                return Ok(caret_range(&prefix));
            }
        }

        if let Some(caps) = X_RANGE_RE.captures(constraint) {
            return Ok(x_range(&caps));
        }

        if let Some(caps) = HYPHEN_RE.captures(constraint) {
            let from = caps.get(1).unwrap().as_str();
            let to = caps.get(2).unwrap().as_str();
            if let (Some(low), Some(high)) =
                (parse_version_prefix(from), parse_version_prefix(to))
            {
                return Ok(hyphen_range(&low, &high));
            }
        }

        let caps = COMPARATOR_RE.captures(constraint).unwrap();
        let operator = caps.get(1).map_or("=", |m| m.as_str());
        let version_str = caps.get(2).map_or("", |m| m.as_str()).trim();

        if version_str.is_empty() {
            return Err(VersionParserError::ConstraintParse {
                constraint: constraint.to_string(),
                reason: "missing version".to_string(),
            });
        }

        let op = Op::from_str(operator)
            .ok_or_else(|| VersionParserError::InvalidOperator(operator.to_string()))?;

        let version = match self.normalize(version_str) {
            Ok(v) => v,
            Err(_) => {
                // Recover "foo-dev" style spellings of branch requirements.
                if let Some(base) = version_str.strip_suffix("-dev") {
                    if base
                        .chars()
                        .all(|c| c.is_alphanumeric() || c == '-' || c == '.' || c == '/')
                    {
                        Version::branch(base)
                    } else {
                        return Err(VersionParserError::ConstraintParse {
                            constraint: constraint.to_string(),
                            reason: format!("invalid version \"{}\"", version_str),
                        });
                    }
                } else {
                    return Err(VersionParserError::ConstraintParse {
                        constraint: constraint.to_string(),
                        reason: format!("invalid version \"{}\"", version_str),
                    });
                }
            }
        };

        // For < and >= on plain releases, use the -dev boundary so that
        // prereleases of the boundary version land on the correct side.
        let version = if matches!(op, Op::Lt | Op::Ge)
            && !version.is_branch()
            && !version.has_dev_tail()
            && version.release() == Release::Stable
        {
            version.with_dev_tail(true)
        } else {
            version
        };

        Ok(vec![Constraint::Version(op, version)])
    }
}

/// Split a constraint group on its AND separators (comma or space), keeping
/// operator-then-version, hyphen-range and alias token runs together.
fn split_and_constraints(input: &str) -> Vec<String> {
    let tokens: Vec<&str> = input
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
        .collect();

    let mut parts = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        let token = tokens[i];

        if is_operator_token(token) && i + 1 < tokens.len() {
            parts.push(format!("{}{}", token, tokens[i + 1]));
            i += 2;
            continue;
        }
        if i + 2 < tokens.len() && tokens[i + 1] == "-" {
            parts.push(format!("{} - {}", token, tokens[i + 2]));
            i += 3;
            continue;
        }
        if i + 2 < tokens.len() && tokens[i + 1] == "as" {
            parts.push(format!("{} as {}", token, tokens[i + 2]));
            i += 3;
            continue;
        }

        parts.push(token.to_string());
        i += 1;
    }

    if parts.is_empty() {
        parts.push(input.trim().to_string());
    }
    parts
}

fn is_operator_token(token: &str) -> bool {
    !token.is_empty()
        && token
            .chars()
            .all(|c| matches!(c, '<' | '>' | '=' | '!' | '^' | '~'))
}

fn parse_segment(text: &str, original: &str) -> Result<u64, VersionParserError> {
    text.parse()
        .map_err(|_| VersionParserError::InvalidVersion(original.to_string()))
}

/// Assemble a [`Version`] from numeric parts plus the modifier capture groups
/// starting at `index` (stability word, stability digits, dev suffix).
fn build_version(parts: [u64; 4], caps: &regex::Captures<'_>, index: usize) -> Version {
    let release = match caps.get(index) {
        Some(word) => {
            let digits: String = caps
                .get(index + 1)
                .map(|m| m.as_str().chars().filter(|c| c.is_ascii_digit()).collect())
                .unwrap_or_default();
            let number = if digits.is_empty() {
                None
            } else {
                digits.parse().ok()
            };
            release_from_token(word.as_str(), number)
        }
        None => Release::Stable,
    };

    let dev_tail = caps
        .get(index + 2)
        .map_or(false, |m| !m.as_str().is_empty());

    Version::with_release(parts, release).with_dev_tail(dev_tail)
}

fn release_from_token(token: &str, number: Option<u64>) -> Release {
    match token.to_ascii_lowercase().as_str() {
        "alpha" | "a" => Release::Alpha(number),
        "beta" | "b" => Release::Beta(number),
        "rc" => Release::RC(number),
        "patch" | "pl" | "p" => Release::Patch(number),
        _ => Release::Stable,
    }
}

fn parse_version_prefix(text: &str) -> Option<VersionPrefix> {
    let caps = PREFIX_RE.captures(text)?;

    let mut parts = [0u64; 4];
    let mut explicit = 0;
    for (i, group) in (1..=4).enumerate() {
        if let Some(m) = caps.get(group) {
            parts[i] = m.as_str().parse().ok()?;
            explicit = i + 1;
        }
    }

    let has_stability_word = caps.get(5).is_some();
    let dev_tail = caps.get(7).map_or(false, |m| !m.as_str().is_empty());
    let version = build_version(parts, &caps, 5);

    Some(VersionPrefix {
        parts,
        explicit,
        release: version.release(),
        dev_tail,
        has_modifier: has_stability_word || dev_tail,
    })
}

fn lower_bound_version(prefix: &VersionPrefix) -> Version {
    let dev_tail = prefix.dev_tail || !prefix.has_modifier;
    Version::with_release(prefix.parts, prefix.release).with_dev_tail(dev_tail)
}

/// Zero out everything after `position` (1-based) and increment the segment
/// at `position`.
fn increment_at(parts: [u64; 4], position: usize) -> [u64; 4] {
    let mut out = [0u64; 4];
    for (i, part) in parts.iter().enumerate() {
        match (i + 1).cmp(&position) {
            std::cmp::Ordering::Less => out[i] = *part,
            std::cmp::Ordering::Equal => out[i] = part + 1,
            std::cmp::Ordering::Greater => {}
        }
    }
    out
}

fn zero_after(parts: [u64; 4], position: usize) -> [u64; 4] {
    let mut out = [0u64; 4];
    for (i, part) in parts.iter().enumerate() {
        if i < position {
            out[i] = *part;
        }
    }
    out
}

/// `~1.2` allows everything up to the next increment of the second-to-last
/// explicit segment: `>= 1.2.0.0-dev < 2.0.0.0-dev`.
fn tilde_range(prefix: &VersionPrefix) -> Vec<Constraint> {
    let position = prefix.explicit.saturating_sub(1).max(1);
    let upper = Version::new(increment_at(prefix.parts, position)).with_dev_tail(true);
    vec![
        Constraint::Version(Op::Ge, lower_bound_version(prefix)),
        Constraint::Version(Op::Lt, upper),
    ]
}

/// `^1.2.3` allows everything below the next breaking version, where the
/// breaking position is the first non-zero segment.
fn caret_range(prefix: &VersionPrefix) -> Vec<Constraint> {
    let position = if prefix.parts[0] != 0 || prefix.explicit < 2 {
        1
    } else if prefix.parts[1] != 0 || prefix.explicit < 3 {
        2
    } else {
        3
    };
    let upper = Version::new(increment_at(prefix.parts, position)).with_dev_tail(true);
    vec![
        Constraint::Version(Op::Ge, lower_bound_version(prefix)),
        Constraint::Version(Op::Lt, upper),
    ]
}

fn x_range(caps: &regex::Captures<'_>) -> Vec<Constraint> {
    let mut parts = [0u64; 4];
    let mut explicit = 0;
    for (i, group) in (1..=3).enumerate() {
        if let Some(m) = caps.get(group) {
            parts[i] = m.as_str().parse().unwrap_or(0);
            explicit = i + 1;
        }
    }

    let low = Version::new(zero_after(parts, explicit)).with_dev_tail(true);
    let high = Version::new(increment_at(parts, explicit)).with_dev_tail(true);

    if low.parts() == [0; 4] {
        return vec![Constraint::Version(Op::Lt, high)];
    }
    vec![
        Constraint::Version(Op::Ge, low),
        Constraint::Version(Op::Lt, high),
    ]
}

/// `1.0 - 2.0`: the upper side is inclusive when fully specified, otherwise
/// it covers every `2.0.x`.
fn hyphen_range(low: &VersionPrefix, high: &VersionPrefix) -> Vec<Constraint> {
    let lower = Constraint::Version(Op::Ge, lower_bound_version(low));

    let upper = if high.explicit >= 3 || high.has_modifier {
        Constraint::Version(
            Op::Le,
            Version::with_release(high.parts, high.release).with_dev_tail(high.dev_tail),
        )
    } else {
        let position = high.explicit.max(1);
        Constraint::Version(
            Op::Lt,
            Version::new(increment_at(high.parts, position)).with_dev_tail(true),
        )
    };

    vec![lower, upper]
}
