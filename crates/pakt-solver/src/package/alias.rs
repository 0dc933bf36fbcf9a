use std::sync::Arc;

use indexmap::IndexMap;

use pakt_semver::{Stability, VersionParser};

use super::Package;

/// A package presented under a different declared version.
///
/// Aliases wrap an existing package and re-export its links with
/// `self.version` constraints rewritten to an exact match on the alias
/// version; everything else delegates to the aliased package. They come from
/// branch aliases (`dev-main` visible as `1.0.x-dev`) and from root
/// requirements spelled `dev-main as 1.0.0`.
#[derive(Debug, Clone)]
pub struct AliasPackage {
    alias_of: Arc<Package>,

    /// Normalized alias version.
    version: String,

    /// Alias version for display.
    pretty_version: String,

    stability: Stability,

    /// Set when the alias comes from the root package's own requirements;
    /// biases the selection policy.
    is_root_package_alias: bool,

    require: IndexMap<String, String>,
    require_dev: IndexMap<String, String>,
    conflict: IndexMap<String, String>,
    provide: IndexMap<String, String>,
    replace: IndexMap<String, String>,
}

impl AliasPackage {
    pub fn new(alias_of: Arc<Package>, version: String, pretty_version: String) -> Self {
        let stability = VersionParser::parse_stability(&version);
        let exact = format!("={}", version);

        let rewrite = |map: &IndexMap<String, String>| -> IndexMap<String, String> {
            map.iter()
                .map(|(target, constraint)| {
                    let constraint = if constraint == "self.version" {
                        exact.clone()
                    } else {
                        constraint.clone()
                    };
                    (target.clone(), constraint)
                })
                .collect()
        };

        Self {
            version,
            pretty_version,
            stability,
            is_root_package_alias: false,
            require: rewrite(&alias_of.require),
            require_dev: rewrite(&alias_of.require_dev),
            conflict: rewrite(&alias_of.conflict),
            provide: rewrite(&alias_of.provide),
            replace: rewrite(&alias_of.replace),
            alias_of,
        }
    }

    pub fn alias_of(&self) -> &Arc<Package> {
        &self.alias_of
    }

    pub fn name(&self) -> &str {
        self.alias_of.name()
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn pretty_version(&self) -> &str {
        &self.pretty_version
    }

    pub fn stability(&self) -> Stability {
        self.stability
    }

    pub fn pretty_string(&self) -> String {
        format!("{} {}", self.alias_of.pretty_name(), self.pretty_version)
    }

    pub fn is_root_package_alias(&self) -> bool {
        self.is_root_package_alias
    }

    pub fn set_root_package_alias(&mut self, value: bool) {
        self.is_root_package_alias = value;
    }

    pub fn require(&self) -> &IndexMap<String, String> {
        &self.require
    }

    pub fn require_dev(&self) -> &IndexMap<String, String> {
        &self.require_dev
    }

    pub fn conflict(&self) -> &IndexMap<String, String> {
        &self.conflict
    }

    pub fn provide(&self) -> &IndexMap<String, String> {
        &self.provide
    }

    pub fn replace(&self) -> &IndexMap<String, String> {
        &self.replace
    }
}
