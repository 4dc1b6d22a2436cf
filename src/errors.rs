use thiserror::Error;

#[derive(Debug, Error)]
pub enum HvacSimError {
    #[error("Request was considered invalid due to error: {0}")]
    InvalidRequest(#[from] anyhow::Error),
    #[error("Error identified while building the thermal model: {0}")]
    Model(#[from] ModelError),
    #[error("Error identified during day-ahead dispatch: {0}")]
    Dispatch(#[from] DispatchError),
}

/// Failure to derive a usable state-space model from a building envelope.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ModelError {
    #[error("System matrix for building '{building}' is singular and cannot be inverted")]
    SingularSystemMatrix { building: String },
    #[error("Building '{building}' has a non-finite value for {quantity}")]
    NonFiniteCoefficient {
        building: String,
        quantity: &'static str,
    },
}

#[derive(Clone, Debug, Error, PartialEq)]
#[error("{quantity} of {value} is outside the validated correlation range [{min}, {max}]")]
pub struct CorrelationRangeError {
    pub quantity: &'static str,
    pub value: f64,
    pub min: f64,
    pub max: f64,
}

/// Outcome signals from a MILP backend that did not produce an assignment.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum SolveError {
    #[error("model is infeasible")]
    Infeasible,
    #[error("model is unbounded")]
    Unbounded,
    #[error("solver stopped before reaching the relative gap of {relative_gap}")]
    Timeout { relative_gap: f64 },
    #[error("solver backend failed: {0}")]
    Backend(String),
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum DispatchError {
    #[error("No feasible schedule exists for day {day}")]
    Infeasible { day: u32 },
    #[error("Solver did not reach the optimality gap for day {day} within its allotted effort")]
    Timeout { day: u32 },
    #[error("Solver failed for day {day}: {source}")]
    Solver { day: u32, source: SolveError },
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Correlation(#[from] CorrelationRangeError),
}

impl DispatchError {
    pub(crate) fn from_solve_error(day: u32, error: SolveError) -> Self {
        match error {
            SolveError::Infeasible => Self::Infeasible { day },
            SolveError::Timeout { .. } => Self::Timeout { day },
            other => Self::Solver { day, source: other },
        }
    }
}

/// Failure of the forward simulation of a single building, tagged with the user it belongs to.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum SimulationError {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("Heat pump performance for user '{user}' could not be evaluated: {source}")]
    Correlation {
        user: String,
        source: CorrelationRangeError,
    },
}
