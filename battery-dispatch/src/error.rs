use dispatch_model::ValidationError;
use thiserror::Error;

/// Terminal outcomes of a dispatch run that produce no schedule.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("invalid dispatch input: {0}")]
    Invalid(#[from] ValidationError),

    #[error("no dispatch schedule satisfies the grid and battery limits")]
    Infeasible,

    #[error("dispatch model is unbounded")]
    Unbounded,

    #[error("invalid solver option: {0}")]
    SolverOption(String),

    #[error("solver failed: {0}")]
    Solver(String),
}

impl From<good_lp::ResolutionError> for DispatchError {
    fn from(err: good_lp::ResolutionError) -> Self {
        match err {
            good_lp::ResolutionError::Infeasible => DispatchError::Infeasible,
            good_lp::ResolutionError::Unbounded => DispatchError::Unbounded,
            other => DispatchError::Solver(other.to_string()),
        }
    }
}
