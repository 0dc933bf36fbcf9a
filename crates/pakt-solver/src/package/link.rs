use std::fmt;

use serde::{Deserialize, Serialize};

/// The closed set of edge kinds between packages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinkKind {
    #[serde(rename = "requires")]
    Require,
    #[serde(rename = "devRequires")]
    DevRequire,
    #[serde(rename = "provides")]
    Provide,
    #[serde(rename = "conflicts")]
    Conflict,
    #[serde(rename = "replaces")]
    Replace,
}

impl LinkKind {
    pub fn description(&self) -> &'static str {
        match self {
            LinkKind::Require => "requires",
            LinkKind::DevRequire => "requires (for development)",
            LinkKind::Provide => "provides",
            LinkKind::Conflict => "conflicts with",
            LinkKind::Replace => "replaces",
        }
    }
}

impl fmt::Display for LinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// A directed edge from a source package to a target package name, carrying
/// the constraint the target must satisfy. Rules hang onto their originating
/// link so the problem explainer can print where a rule came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    /// Source package name (lowercase).
    pub source: String,
    /// Target package name (lowercase).
    pub target: String,
    /// Constraint expression on the target (e.g. `^1.0`).
    pub constraint: String,
    /// Constraint as originally written, kept for diagnostics when the
    /// effective constraint was rewritten (e.g. `self.version`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pretty_constraint: Option<String>,
    #[serde(rename = "type")]
    pub kind: LinkKind,
}

impl Link {
    pub fn new(
        source: impl Into<String>,
        target: impl Into<String>,
        constraint: impl Into<String>,
        kind: LinkKind,
    ) -> Self {
        Self {
            source: source.into().to_lowercase(),
            target: target.into().to_lowercase(),
            constraint: constraint.into(),
            pretty_constraint: None,
            kind,
        }
    }

    pub fn with_pretty_constraint(mut self, pretty: impl Into<String>) -> Self {
        self.pretty_constraint = Some(pretty.into());
        self
    }

    /// Constraint text to show in diagnostics.
    pub fn pretty_constraint(&self) -> &str {
        self.pretty_constraint.as_deref().unwrap_or(&self.constraint)
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} ({})",
            self.source,
            self.kind,
            self.target,
            self.pretty_constraint()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_lowercases_names() {
        let link = Link::new("Vendor/App", "Vendor/Lib", "^1.0", LinkKind::Require);
        assert_eq!(link.source, "vendor/app");
        assert_eq!(link.target, "vendor/lib");
    }

    #[test]
    fn test_link_pretty_constraint() {
        let link = Link::new("a", "b", "=1.0.0", LinkKind::Replace)
            .with_pretty_constraint("self.version");
        assert_eq!(link.constraint, "=1.0.0");
        assert_eq!(link.pretty_constraint(), "self.version");
    }

    #[test]
    fn test_link_display() {
        let link = Link::new("my/app", "vendor/lib", "^1.0", LinkKind::Require);
        let text = link.to_string();
        assert!(text.contains("my/app"));
        assert!(text.contains("requires"));
        assert!(text.contains("^1.0"));
    }
}
