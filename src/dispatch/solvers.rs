use crate::dispatch::linear_model::{Assignment, Comparison, LinearExpr, LinearModel, VariableKind};
use crate::errors::SolveError;
use crate::input::OptimizerSettings;
use good_lp::{
    constraint, variable, Expression, ProblemVariables, ResolutionError, Solution, SolverModel,
    Variable,
};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// A MILP backend able to minimise a `LinearModel`.
pub trait Solver {
    fn solve(&self, model: &LinearModel) -> Result<Assignment, SolveError>;
}

/// Branch-and-bound backend through `good_lp`, using the pure Rust `microlp` solver.
#[derive(Clone, Debug, PartialEq)]
pub struct GoodLpSolver {
    relative_gap: f64,
    time_limit: Option<f64>,
}

impl GoodLpSolver {
    pub fn new(settings: &OptimizerSettings) -> Self {
        Self {
            relative_gap: settings.relative_gap,
            time_limit: settings.time_limit,
        }
    }
}

impl Default for GoodLpSolver {
    fn default() -> Self {
        Self::new(&OptimizerSettings::default())
    }
}

fn to_expression(expr: &LinearExpr, variables: &[Variable]) -> Expression {
    let mut expression = Expression::from(expr.constant_term());
    for (id, coefficient) in expr.terms() {
        expression += *coefficient * variables[id.index()];
    }
    expression
}

impl Solver for GoodLpSolver {
    fn solve(&self, model: &LinearModel) -> Result<Assignment, SolveError> {
        // microlp proves optimality, so any non-negative gap is met once it returns
        debug!(
            relative_gap = self.relative_gap,
            time_limit = ?self.time_limit,
            "solving with microlp"
        );

        let Some(time_limit) = self.time_limit else {
            return solve_with_microlp(model);
        };
        let deadline = Duration::try_from_secs_f64(time_limit)
            .map_err(|error| SolveError::Backend(format!("invalid time limit: {error}")))?;

        let (sender, receiver) = mpsc::channel();
        let owned = model.clone();
        thread::spawn(move || {
            // the receiver is gone once the deadline has passed
            let _ = sender.send(solve_with_microlp(&owned));
        });

        match receiver.recv_timeout(deadline) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                warn!(time_limit, "solver did not finish within its time limit");
                Err(SolveError::Timeout {
                    relative_gap: self.relative_gap,
                })
            }
            Err(RecvTimeoutError::Disconnected) => Err(SolveError::Backend(
                "solver worker stopped without a result".to_string(),
            )),
        }
    }
}

fn solve_with_microlp(model: &LinearModel) -> Result<Assignment, SolveError> {
    let mut problem_variables = ProblemVariables::new();
    let variables: Vec<Variable> = model
        .variables()
        .iter()
        .map(|spec| {
            let mut definition = variable().name(spec.name.clone());
            match spec.kind {
                VariableKind::Binary => definition = definition.binary(),
                VariableKind::Integer => definition = definition.integer(),
                VariableKind::Continuous => {}
            }
            if let Some(lower) = spec.lower {
                definition = definition.min(lower);
            }
            if let Some(upper) = spec.upper {
                definition = definition.max(upper);
            }
            problem_variables.add(definition)
        })
        .collect();

    let objective = to_expression(model.objective(), &variables);
    let mut problem = problem_variables
        .minimise(objective)
        .using(good_lp::microlp);

    for c in model.constraints() {
        let lhs = to_expression(&c.lhs, &variables);
        problem.add_constraint(match c.comparison {
            Comparison::Equal => constraint::eq(lhs, c.rhs),
            Comparison::LessOrEqual => constraint::leq(lhs, c.rhs),
            Comparison::GreaterOrEqual => constraint::geq(lhs, c.rhs),
        });
    }

    let solution = problem.solve().map_err(|error| match error {
        ResolutionError::Infeasible => SolveError::Infeasible,
        ResolutionError::Unbounded => SolveError::Unbounded,
        other => SolveError::Backend(other.to_string()),
    })?;

    Ok(Assignment::new(
        variables.iter().map(|v| solution.value(*v)).collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;
    use rstest::*;

    #[rstest]
    fn test_solves_small_milp() {
        // cheapest way to deliver 7 units from a unit that runs between 2 and 5 or not at all,
        // topped up by a dearer continuous source
        let mut model = LinearModel::new();
        let q = model.continuous("q", Some(0.), Some(5.));
        let on = model.binary("on");
        let backup = model.non_negative("backup");
        model.greater_or_equal("q_min", LinearExpr::from(q) - 2. * on, 0.);
        model.less_or_equal("q_max", LinearExpr::from(q) - 5. * on, 0.);
        model.equal("demand", LinearExpr::from(q) + backup, 7.);
        model.minimise(1. * q + 3. * backup + 0.5 * on);

        let assignment = GoodLpSolver::default().solve(&model).unwrap();
        assert_relative_eq!(assignment[q], 5., epsilon = 1e-6);
        assert_relative_eq!(assignment[backup], 2., epsilon = 1e-6);
        assert!(assignment.is_set(on));
        assert!(model.violations(&assignment, 1e-6).is_empty());
    }

    #[rstest]
    fn test_reports_infeasibility() {
        let mut model = LinearModel::new();
        let x = model.continuous("x", Some(0.), Some(1.));
        model.greater_or_equal("too_much", x, 2.);
        model.minimise(LinearExpr::from(x));

        assert_eq!(
            GoodLpSolver::default().solve(&model),
            Err(SolveError::Infeasible)
        );
    }

    /// 0/1 knapsack with many near-equal items: branch and bound has plenty to explore.
    fn knapsack(items: usize) -> LinearModel {
        let mut model = LinearModel::new();
        let mut weight = LinearExpr::default();
        let mut value = LinearExpr::default();
        for i in 0..items {
            let pick = model.binary(format!("pick_{i}"));
            weight = weight + (10. + (i % 7) as f64 + 0.01 * i as f64) * pick;
            value = value - (11. + (i % 5) as f64 + 0.013 * i as f64) * pick;
        }
        model.less_or_equal("capacity", weight, 5. * items as f64 + 0.5);
        model.minimise(value);
        model
    }

    #[rstest]
    fn test_generous_time_limit_still_solves() {
        let settings = OptimizerSettings {
            time_limit: Some(60.),
            ..Default::default()
        };
        let mut model = LinearModel::new();
        let x = model.continuous("x", Some(1.), Some(4.));
        model.minimise(LinearExpr::from(x));

        let assignment = GoodLpSolver::new(&settings).solve(&model).unwrap();
        assert_relative_eq!(assignment[x], 1., epsilon = 1e-6);
    }

    #[rstest]
    fn test_expired_time_limit_reports_timeout_with_configured_gap() {
        let settings = OptimizerSettings {
            relative_gap: 0.02,
            time_limit: Some(1e-9),
            ..Default::default()
        };

        assert_eq!(
            GoodLpSolver::new(&settings).solve(&knapsack(60)),
            Err(SolveError::Timeout { relative_gap: 0.02 })
        );
    }
}
