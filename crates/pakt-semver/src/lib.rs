//! Composer-compatible semantic versioning.
//!
//! Provides version parsing and normalization, constraint expression parsing
//! and constraint-against-constraint matching for the package resolver.

pub mod constraint;
mod parser;
mod semver;
mod version;

pub use constraint::{Constraint, Op};
pub use parser::{VersionParser, VersionParserError};
pub use semver::Semver;
pub use version::{Release, Stability, Version, BRANCH_WILDCARD};
