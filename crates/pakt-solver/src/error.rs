use thiserror::Error;

use crate::solver::problem::ProblemSet;

/// Failures the resolution engine can surface to its host.
///
/// The engine performs no local recovery: any of these short-circuits the
/// solve and leaves presentation to the caller.
#[derive(Error, Debug)]
pub enum SolverError {
    #[error("Root requirement {name} {constraint} could not be matched by any package")]
    RequirementNotFound { name: String, constraint: String },

    #[error("Dependencies could not be resolved: {0} problem(s) found")]
    VersionConflict(ProblemSet),

    #[error("Platform requirement {name} failed: {reason}")]
    PlatformRequirementFailure { name: String, reason: String },

    #[error("Fixed package {name} contradicts another requirement")]
    FixedConflict { name: String },

    #[error("Pool construction failed: {0}")]
    PoolBuildAborted(String),

    #[error("Resolution was aborted")]
    Aborted,
}

pub type Result<T> = std::result::Result<T, SolverError>;
