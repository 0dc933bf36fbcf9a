//! Platform packages and the platform requirement filter.

use serde::{Deserialize, Serialize};

/// Check if a package name represents a platform package.
///
/// Platform packages are virtual packages describing the runtime and its
/// extensions rather than installable code:
/// - `php` and its capability variants (`php-64bit`, `php-ipv6`, ...)
/// - `ext-*` extensions (e.g. `ext-json`)
/// - `lib-*` system libraries (e.g. `lib-libxml`)
/// - the runtime API packages (`composer-runtime-api`, `composer-plugin-api`)
///
/// # Examples
///
/// ```
/// use pakt_solver::platform::is_platform_package;
///
/// assert!(is_platform_package("php"));
/// assert!(is_platform_package("ext-json"));
/// assert!(is_platform_package("lib-libxml"));
/// assert!(!is_platform_package("phpunit/phpunit"));
/// assert!(!is_platform_package("symfony/console"));
/// ```
pub fn is_platform_package(name: &str) -> bool {
    name == "php"
        || name == "php-64bit"
        || name == "php-ipv6"
        || name == "php-zts"
        || name == "php-debug"
        || name.starts_with("ext-")
        || name.starts_with("lib-")
        || name == "composer"
        || name == "composer-runtime-api"
        || name == "composer-plugin-api"
}

/// Which platform requirements should be dropped before rule generation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformRequirementFilter {
    /// Keep all platform requirements.
    #[default]
    No,
    /// Ignore every platform requirement.
    All,
    /// Ignore only the listed requirement names.
    Only(Vec<String>),
}

impl PlatformRequirementFilter {
    /// Whether a requirement on `name` should be ignored.
    pub fn ignores(&self, name: &str) -> bool {
        match self {
            PlatformRequirementFilter::No => false,
            PlatformRequirementFilter::All => is_platform_package(name),
            PlatformRequirementFilter::Only(names) => {
                is_platform_package(name) && names.iter().any(|n| n.eq_ignore_ascii_case(name))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_package_names() {
        assert!(is_platform_package("php"));
        assert!(is_platform_package("php-64bit"));
        assert!(is_platform_package("ext-mbstring"));
        assert!(is_platform_package("lib-openssl"));
        assert!(is_platform_package("composer-runtime-api"));
    }

    #[test]
    fn test_non_platform_package_names() {
        assert!(!is_platform_package("phpstan/phpstan"));
        assert!(!is_platform_package("phpunit/phpunit"));
        assert!(!is_platform_package("ext"));
        assert!(!is_platform_package("library-package"));
        assert!(!is_platform_package("PHP"));
    }

    #[test]
    fn test_filter_no() {
        let filter = PlatformRequirementFilter::No;
        assert!(!filter.ignores("php"));
        assert!(!filter.ignores("ext-json"));
    }

    #[test]
    fn test_filter_all() {
        let filter = PlatformRequirementFilter::All;
        assert!(filter.ignores("php"));
        assert!(filter.ignores("ext-json"));
        // Regular packages are never platform requirements.
        assert!(!filter.ignores("vendor/package"));
    }

    #[test]
    fn test_filter_only() {
        let filter = PlatformRequirementFilter::Only(vec!["ext-json".to_string()]);
        assert!(filter.ignores("ext-json"));
        assert!(!filter.ignores("ext-curl"));
        assert!(!filter.ignores("php"));
    }
}
