// Package model: descriptors, links between packages and version aliases.

mod alias;
mod link;
#[allow(clippy::module_inception)]
mod package;

pub use alias::AliasPackage;
pub use link::{Link, LinkKind};
pub use package::{DistRef, Package, PackageKind, SourceRef};
