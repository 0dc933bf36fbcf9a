//! SAT-based dependency resolution for Composer-ecosystem packages.
//!
//! Given root requirements and a set of package repositories, the engine
//! decides which exact package versions to install, update or remove. The
//! pipeline is: a demand-driven pool of candidates, a CNF rule set over
//! candidate literals, a conflict-driven clause-learning search guided by a
//! domain selection policy, and a diff of the decided state against the
//! prior state into ordered operations. Unsolvable requests come back as a
//! minimized, human-readable conflict chain.
//!
//! Downloading, archive handling, lockfile writing and all user interaction
//! live outside this crate; repositories, the platform probe and the lock
//! document are consumed through narrow read-only interfaces.

pub mod error;
pub mod lock;
pub mod package;
pub mod platform;
pub mod repository;
pub mod solver;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use error::{Result, SolverError};
pub use lock::{LockFile, LockedRepository};
pub use package::{AliasPackage, DistRef, Link, LinkKind, Package, PackageKind, SourceRef};
pub use platform::{is_platform_package, PlatformRequirementFilter};
pub use repository::{ArrayRepository, PlatformRepository, Repository, RepositorySet};
pub use solver::{
    Operation, Policy, Pool, PoolBuilder, Problem, ProblemSet, Request, Solver, SolverResult,
    SolverStats, Transaction, UpdatePolicy,
};

/// The enumerated solver configuration. Deserialization rejects unknown
/// options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase", default)]
pub struct SolverFlags {
    /// Rank stable versions before less stable ones of the same name.
    pub prefer_stable: bool,
    /// Rank versions ascending instead of descending.
    pub prefer_lowest: bool,
    /// Which locked packages become fixed assignments.
    pub update_policy: UpdatePolicy,
    /// Platform requirements to drop before rule generation.
    pub ignore_platform_reqs: PlatformRequirementFilter,
    /// Run the pool simplification pass before solving.
    pub pool_optimizer: bool,
}

impl Default for SolverFlags {
    fn default() -> Self {
        Self {
            prefer_stable: true,
            prefer_lowest: false,
            update_policy: UpdatePolicy::default(),
            ignore_platform_reqs: PlatformRequirementFilter::default(),
            pool_optimizer: true,
        }
    }
}

/// One-call entry point: build the pool for the request, solve it and diff
/// the decisions against the locked state into an ordered transaction.
pub fn resolve(
    repositories: &RepositorySet,
    request: &Request,
    flags: &SolverFlags,
) -> Result<Transaction> {
    let mut request = request.clone();
    request.update_policy = flags.update_policy;

    let pool = PoolBuilder::new()
        .platform_filter(flags.ignore_platform_reqs.clone())
        .build_pool(repositories, &request);

    let mut policy = Policy::new()
        .prefer_stable(flags.prefer_stable)
        .prefer_lowest(flags.prefer_lowest);

    // When updating a subset, everything else prefers its locked version.
    if !request.update_allowlist.is_empty() {
        for locked in &request.locked_packages {
            if !request.is_update_allowed(&locked.name) {
                policy = policy.with_preferred_version(&locked.name, &locked.version);
            }
        }
    }

    let solver = Solver::new(&pool, &policy)
        .with_optimization(flags.pool_optimizer)
        .with_platform_filter(flags.ignore_platform_reqs.clone());
    let result = solver.solve(&request)?;

    let present: Vec<Arc<Package>> = request
        .locked_packages
        .iter()
        .filter(|package| !request.is_fixed(&package.name))
        .cloned()
        .collect();

    Ok(Transaction::from_packages(
        present,
        Vec::new(),
        result.packages,
        result.aliases,
    ))
}
