use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use pakt_semver::{Stability, VersionParser};

use super::{Link, LinkKind};

/// What a package is, beyond its links. Aliases are not a package kind; they
/// are separate pool entries wrapping a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PackageKind {
    /// An installable library or project.
    Normal,
    /// Dependencies only, no install payload.
    Metapackage,
}

impl From<String> for PackageKind {
    fn from(value: String) -> Self {
        if value.eq_ignore_ascii_case("metapackage") {
            PackageKind::Metapackage
        } else {
            PackageKind::Normal
        }
    }
}

impl From<PackageKind> for String {
    fn from(value: PackageKind) -> Self {
        match value {
            PackageKind::Normal => "library".to_string(),
            PackageKind::Metapackage => "metapackage".to_string(),
        }
    }
}

impl Default for PackageKind {
    fn default() -> Self {
        PackageKind::Normal
    }
}

/// Reference into the source repository a package was cut from.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SourceRef {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub reference: String,
}

/// Reference to a distribution archive.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DistRef {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

/// An immutable package descriptor: identity, kind and outgoing links.
///
/// `name` is always lowercase; the original spelling is kept in
/// `pretty_name`. Link maps are ordered so iteration over them is
/// deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Package {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub pretty_name: Option<String>,

    pub version: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub pretty_version: Option<String>,

    #[serde(rename = "type", default)]
    pub kind: PackageKind,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceRef>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub dist: Option<DistRef>,

    #[serde(skip_serializing_if = "IndexMap::is_empty", default)]
    pub require: IndexMap<String, String>,

    #[serde(
        rename = "require-dev",
        skip_serializing_if = "IndexMap::is_empty",
        default
    )]
    pub require_dev: IndexMap<String, String>,

    #[serde(skip_serializing_if = "IndexMap::is_empty", default)]
    pub conflict: IndexMap<String, String>,

    #[serde(skip_serializing_if = "IndexMap::is_empty", default)]
    pub provide: IndexMap<String, String>,

    #[serde(skip_serializing_if = "IndexMap::is_empty", default)]
    pub replace: IndexMap<String, String>,
}

impl Package {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        let name = name.into();
        let version = version.into();
        Self {
            name: name.to_lowercase(),
            pretty_name: Some(name),
            pretty_version: Some(version.clone()),
            version,
            kind: PackageKind::Normal,
            source: None,
            dist: None,
            require: IndexMap::new(),
            require_dev: IndexMap::new(),
            conflict: IndexMap::new(),
            provide: IndexMap::new(),
            replace: IndexMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pretty_name(&self) -> &str {
        self.pretty_name.as_deref().unwrap_or(&self.name)
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn pretty_version(&self) -> &str {
        self.pretty_version.as_deref().unwrap_or(&self.version)
    }

    pub fn is_metapackage(&self) -> bool {
        self.kind == PackageKind::Metapackage
    }

    /// Stability derived from the version string.
    pub fn stability(&self) -> Stability {
        VersionParser::parse_stability(&self.version)
    }

    /// `name-version` identity within a single repository.
    pub fn unique_name(&self) -> String {
        format!("{}-{}", self.name, self.version)
    }

    /// Human-facing `name version` string for diagnostics.
    pub fn pretty_string(&self) -> String {
        format!("{} {}", self.pretty_name(), self.pretty_version())
    }

    /// Rewrite `self.version` constraints in the link maps into an exact
    /// match on this package's version, keeping the original spelling
    /// recoverable through [`Package::links`]' pretty constraint.
    pub fn replace_self_version(&mut self) {
        let exact = format!("={}", self.version);
        for map in [
            &mut self.require,
            &mut self.require_dev,
            &mut self.conflict,
            &mut self.provide,
            &mut self.replace,
        ] {
            for constraint in map.values_mut() {
                if constraint == "self.version" {
                    *constraint = exact.clone();
                }
            }
        }
    }

    /// Outgoing links of one kind.
    pub fn links(&self, kind: LinkKind) -> impl Iterator<Item = Link> + '_ {
        let map = match kind {
            LinkKind::Require => &self.require,
            LinkKind::DevRequire => &self.require_dev,
            LinkKind::Provide => &self.provide,
            LinkKind::Conflict => &self.conflict,
            LinkKind::Replace => &self.replace,
        };
        map.iter().map(move |(target, constraint)| {
            if constraint == "self.version" {
                Link::new(&self.name, target, format!("={}", self.version), kind)
                    .with_pretty_constraint("self.version")
            } else {
                Link::new(&self.name, target, constraint, kind)
            }
        })
    }

    /// All names this package occupies in the pool: its own plus everything
    /// it replaces, and optionally everything it provides.
    pub fn provided_names(&self, include_provides: bool) -> Vec<String> {
        let mut names = vec![self.name.clone()];
        for replaced in self.replace.keys() {
            names.push(replaced.to_lowercase());
        }
        if include_provides {
            for provided in self.provide.keys() {
                names.push(provided.to_lowercase());
            }
        }
        names
    }

    /// The vendor prefix (`vendor` of `vendor/package`), if any.
    pub fn vendor(&self) -> Option<&str> {
        self.name.split_once('/').map(|(vendor, _)| vendor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_package_new_lowercases() {
        let pkg = Package::new("Vendor/Package", "1.0.0");
        assert_eq!(pkg.name, "vendor/package");
        assert_eq!(pkg.pretty_name(), "Vendor/Package");
        assert_eq!(pkg.version, "1.0.0");
    }

    #[test]
    fn test_package_stability() {
        assert_eq!(Package::new("a", "1.0.0").stability(), Stability::Stable);
        assert_eq!(Package::new("a", "1.0.0-beta1").stability(), Stability::Beta);
        assert_eq!(Package::new("a", "dev-main").stability(), Stability::Dev);
    }

    #[test]
    fn test_package_kind_from_string() {
        assert_eq!(PackageKind::from("library".to_string()), PackageKind::Normal);
        assert_eq!(PackageKind::from("project".to_string()), PackageKind::Normal);
        assert_eq!(
            PackageKind::from("metapackage".to_string()),
            PackageKind::Metapackage
        );
    }

    #[test]
    fn test_replace_self_version() {
        let mut pkg = Package::new("vendor/lib", "1.2.0");
        pkg.replace
            .insert("vendor/lib-core".to_string(), "self.version".to_string());
        pkg.replace_self_version();
        assert_eq!(pkg.replace["vendor/lib-core"], "=1.2.0");
    }

    #[test]
    fn test_links_rewrite_self_version() {
        let mut pkg = Package::new("vendor/lib", "1.2.0");
        pkg.replace
            .insert("vendor/lib-core".to_string(), "self.version".to_string());

        let links: Vec<Link> = pkg.links(LinkKind::Replace).collect();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].constraint, "=1.2.0");
        assert_eq!(links[0].pretty_constraint(), "self.version");
    }

    #[test]
    fn test_provided_names() {
        let mut pkg = Package::new("vendor/impl", "1.0.0");
        pkg.replace.insert("vendor/old".to_string(), "*".to_string());
        pkg.provide
            .insert("vendor/interface".to_string(), "1.0.0".to_string());

        let without = pkg.provided_names(false);
        assert_eq!(without, vec!["vendor/impl", "vendor/old"]);

        let with = pkg.provided_names(true);
        assert!(with.contains(&"vendor/interface".to_string()));
    }

    #[test]
    fn test_vendor_prefix() {
        assert_eq!(Package::new("vendor/pkg", "1.0").vendor(), Some("vendor"));
        assert_eq!(Package::new("php", "8.2").vendor(), None);
    }

    #[test]
    fn test_serde_roundtrip() {
        let mut pkg = Package::new("vendor/pkg", "1.0.0");
        pkg.require.insert("vendor/dep".to_string(), "^2.0".to_string());
        pkg.kind = PackageKind::Metapackage;

        let json = serde_json::to_string(&pkg).unwrap();
        let back: Package = serde_json::from_str(&json).unwrap();
        assert_eq!(back, pkg);
        assert!(json.contains("\"metapackage\""));
    }
}
