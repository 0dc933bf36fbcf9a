//! Parsed version representation.
//!
//! A version is either a numeric version (four-segment tuple plus an optional
//! release marker and `-dev` tail) or a named branch (`dev-<name>`). Numeric
//! versions form a total order: tuple first, then release rank, then the
//! release number, with a trailing `-dev` sorting just below the plain form.
//! Branches only compare meaningfully against other branches.

use std::cmp::Ordering;
use std::fmt;

/// Stability levels, most stable first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stability {
    Stable,
    RC,
    Beta,
    Alpha,
    Dev,
}

impl Stability {
    /// Stability weight used for ordering and minimum-stability checks.
    /// Lower is more stable.
    pub fn priority(&self) -> u8 {
        match self {
            Stability::Stable => 0,
            Stability::RC => 5,
            Stability::Beta => 10,
            Stability::Alpha => 15,
            Stability::Dev => 20,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Stability::Stable => "stable",
            Stability::RC => "RC",
            Stability::Beta => "beta",
            Stability::Alpha => "alpha",
            Stability::Dev => "dev",
        }
    }

    /// Whether a version of this stability is acceptable under `minimum`.
    pub fn is_acceptable(&self, minimum: Stability) -> bool {
        self.priority() <= minimum.priority()
    }
}

impl fmt::Display for Stability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Stability {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "stable" | "" => Ok(Stability::Stable),
            "rc" => Ok(Stability::RC),
            "beta" => Ok(Stability::Beta),
            "alpha" => Ok(Stability::Alpha),
            "dev" => Ok(Stability::Dev),
            _ => Err(()),
        }
    }
}

/// Pre-release marker on a numeric version. The number is the optional
/// counter after the marker (`RC2`, `beta1`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Release {
    Alpha(Option<u64>),
    Beta(Option<u64>),
    RC(Option<u64>),
    Stable,
    Patch(Option<u64>),
}

impl Release {
    fn rank(&self) -> u8 {
        match self {
            Release::Alpha(_) => 1,
            Release::Beta(_) => 2,
            Release::RC(_) => 3,
            Release::Stable => 4,
            Release::Patch(_) => 5,
        }
    }

    fn number(&self) -> u64 {
        match self {
            Release::Alpha(n) | Release::Beta(n) | Release::RC(n) | Release::Patch(n) => {
                n.unwrap_or(0)
            }
            Release::Stable => 0,
        }
    }
}

/// The segment value branch wildcards (`1.x`) normalize to.
pub const BRANCH_WILDCARD: u64 = 9_999_999;

/// A fully parsed version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Version {
    parts: [u64; 4],
    release: Release,
    /// Trailing `-dev` marker (`1.2.x-dev`, `2.0.0-beta1-dev`).
    dev_tail: bool,
    /// Branch name for `dev-<name>` versions. When set, `parts` and
    /// `release` carry no meaning.
    branch: Option<String>,
}

impl Version {
    /// A plain numeric version with no release marker.
    pub fn new(parts: [u64; 4]) -> Self {
        Self {
            parts,
            release: Release::Stable,
            dev_tail: false,
            branch: None,
        }
    }

    pub fn with_release(parts: [u64; 4], release: Release) -> Self {
        Self {
            parts,
            release,
            dev_tail: false,
            branch: None,
        }
    }

    pub fn with_dev_tail(mut self, dev_tail: bool) -> Self {
        self.dev_tail = dev_tail;
        self
    }

    /// A named branch version (`dev-<name>`).
    pub fn branch(name: impl Into<String>) -> Self {
        Self {
            parts: [0; 4],
            release: Release::Stable,
            dev_tail: false,
            branch: Some(name.into()),
        }
    }

    pub fn parts(&self) -> [u64; 4] {
        self.parts
    }

    pub fn release(&self) -> Release {
        self.release
    }

    pub fn is_branch(&self) -> bool {
        self.branch.is_some()
    }

    pub fn branch_name(&self) -> Option<&str> {
        self.branch.as_deref()
    }

    pub fn has_dev_tail(&self) -> bool {
        self.dev_tail
    }

    /// The stability this version carries.
    pub fn stability(&self) -> Stability {
        if self.branch.is_some() || self.dev_tail {
            return Stability::Dev;
        }
        match self.release {
            Release::Alpha(_) => Stability::Alpha,
            Release::Beta(_) => Stability::Beta,
            Release::RC(_) => Stability::RC,
            Release::Stable | Release::Patch(_) => Stability::Stable,
        }
    }

    /// Rank of the release marker with the `-dev` tail folded in: a plain
    /// `-dev` version sorts like a dev release, `beta2-dev` sorts just below
    /// `beta2`.
    fn order_key(&self) -> (u8, u64, u8) {
        let rank = match self.release {
            Release::Stable if self.dev_tail => 0,
            ref release => release.rank(),
        };
        (rank, self.release.number(), u8::from(!self.dev_tail))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        match (&self.branch, &other.branch) {
            (Some(a), Some(b)) => a.cmp(b),
            // Branches sort below any numeric version.
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self
                .parts
                .cmp(&other.parts)
                .then_with(|| self.order_key().cmp(&other.order_key())),
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = &self.branch {
            return write!(f, "dev-{}", name);
        }

        write!(
            f,
            "{}.{}.{}.{}",
            self.parts[0], self.parts[1], self.parts[2], self.parts[3]
        )?;

        match self.release {
            Release::Stable => {}
            Release::Alpha(n) => write_marker(f, "alpha", n)?,
            Release::Beta(n) => write_marker(f, "beta", n)?,
            Release::RC(n) => write_marker(f, "RC", n)?,
            Release::Patch(n) => write_marker(f, "patch", n)?,
        }

        if self.dev_tail {
            f.write_str("-dev")?;
        }

        Ok(())
    }
}

fn write_marker(f: &mut fmt::Formatter<'_>, name: &str, number: Option<u64>) -> fmt::Result {
    write!(f, "-{}", name)?;
    if let Some(n) = number {
        write!(f, "{}", n)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stability_priority_order() {
        assert!(Stability::Stable.priority() < Stability::RC.priority());
        assert!(Stability::RC.priority() < Stability::Beta.priority());
        assert!(Stability::Beta.priority() < Stability::Alpha.priority());
        assert!(Stability::Alpha.priority() < Stability::Dev.priority());
    }

    #[test]
    fn test_stability_acceptable() {
        assert!(Stability::Stable.is_acceptable(Stability::Stable));
        assert!(Stability::Beta.is_acceptable(Stability::Dev));
        assert!(!Stability::Dev.is_acceptable(Stability::Beta));
    }

    #[test]
    fn test_numeric_ordering() {
        assert!(Version::new([1, 0, 0, 0]) < Version::new([2, 0, 0, 0]));
        assert!(Version::new([1, 9, 0, 0]) < Version::new([1, 10, 0, 0]));
        assert_eq!(Version::new([1, 0, 0, 0]), Version::new([1, 0, 0, 0]));
    }

    #[test]
    fn test_release_ordering() {
        let parts = [1, 0, 0, 0];
        let dev = Version::new(parts).with_dev_tail(true);
        let alpha = Version::with_release(parts, Release::Alpha(Some(1)));
        let beta = Version::with_release(parts, Release::Beta(Some(1)));
        let rc = Version::with_release(parts, Release::RC(Some(1)));
        let stable = Version::new(parts);
        let patch = Version::with_release(parts, Release::Patch(Some(1)));

        assert!(dev < alpha);
        assert!(alpha < beta);
        assert!(beta < rc);
        assert!(rc < stable);
        assert!(stable < patch);
    }

    #[test]
    fn test_release_number_ordering() {
        let rc1 = Version::with_release([1, 0, 0, 0], Release::RC(Some(1)));
        let rc2 = Version::with_release([1, 0, 0, 0], Release::RC(Some(2)));
        assert!(rc1 < rc2);
    }

    #[test]
    fn test_dev_tail_sorts_below_plain() {
        let beta = Version::with_release([1, 0, 0, 0], Release::Beta(Some(2)));
        let beta_dev = beta.clone().with_dev_tail(true);
        assert!(beta_dev < beta);
    }

    #[test]
    fn test_dev_version_below_prerelease() {
        let dev = Version::new([2, 1, 0, 0]).with_dev_tail(true);
        let alpha = Version::with_release([2, 1, 0, 0], Release::Alpha(None));
        let stable = Version::new([2, 1, 0, 0]);
        assert!(dev < alpha);
        assert!(dev < stable);
    }

    #[test]
    fn test_branch_ordering() {
        let branch = Version::branch("main");
        let numeric = Version::new([0, 1, 0, 0]);
        assert!(branch < numeric);
        assert!(Version::branch("a") < Version::branch("b"));
    }

    #[test]
    fn test_display_normalized() {
        assert_eq!(Version::new([1, 2, 3, 0]).to_string(), "1.2.3.0");
        assert_eq!(
            Version::with_release([1, 0, 0, 0], Release::RC(Some(2))).to_string(),
            "1.0.0.0-RC2"
        );
        assert_eq!(
            Version::with_release([1, 0, 0, 0], Release::Alpha(None)).to_string(),
            "1.0.0.0-alpha"
        );
        assert_eq!(
            Version::new([1, 2, 0, 0]).with_dev_tail(true).to_string(),
            "1.2.0.0-dev"
        );
        assert_eq!(Version::branch("main").to_string(), "dev-main");
    }

    #[test]
    fn test_stability_from_version() {
        assert_eq!(Version::new([1, 0, 0, 0]).stability(), Stability::Stable);
        assert_eq!(Version::branch("main").stability(), Stability::Dev);
        assert_eq!(
            Version::new([1, 0, 0, 0]).with_dev_tail(true).stability(),
            Stability::Dev
        );
        assert_eq!(
            Version::with_release([1, 0, 0, 0], Release::RC(None)).stability(),
            Stability::RC
        );
        assert_eq!(
            Version::with_release([1, 0, 0, 0], Release::Patch(Some(1))).stability(),
            Stability::Stable
        );
    }
}
