use thiserror::Error;

/// Reasons a dispatch input is rejected before any model is built.
///
/// Limits that are well defined but contradictory (for example `min_soc > max_soc`)
/// are not validation errors; they reach the solver and come back as infeasible.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("horizon contains no timesteps")]
    EmptyHorizon,

    #[error("timestep duration must be positive and finite, got {0} h")]
    InvalidTimestep(f64),

    #[error("timestep {index}: {field} is not a finite number ({value})")]
    NonFiniteTimestep {
        index: usize,
        field: &'static str,
        value: f64,
    },

    #[error("{field} is not a finite number ({value})")]
    NonFiniteParameter { field: &'static str, value: f64 },

    #[error("battery capacity must be positive, got {0}")]
    NonPositiveCapacity(f64),

    #[error("{field} must not be negative, got {value}")]
    NegativeRate { field: &'static str, value: f64 },

    #[error("{field} must lie in [0, 1], got {value}")]
    EfficiencyOutOfRange { field: &'static str, value: f64 },

    #[error("discharge_eff of 1 divides the state-of-charge recursion by zero")]
    DegenerateDischargeEfficiency,

    #[error("{field} must be a fraction in [0, 1], got {value}")]
    SocOutOfRange { field: &'static str, value: f64 },
}
