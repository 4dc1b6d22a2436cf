//! Rolling-horizon dispatch: one mixed-integer program per calendar day, solved in sequence,
//! each seeded with the state the previous day ended in.

pub mod day_ahead;
pub mod linear_model;
pub mod solvers;

use crate::core::heating_systems::storage_tank::{TankHysteresis, TankState};
use crate::core::space_heat_demand::state_space::ThermalState;
use crate::corpus::{Community, Corpus};
use crate::dispatch::day_ahead::DayModel;
use crate::dispatch::solvers::Solver;
use crate::errors::DispatchError;
use crate::external_conditions::DayWindow;
use indexmap::IndexMap;
use std::ops::Range;
use tracing::{debug, error, info, instrument};

/// Node temperatures of every dwelling and the buffer tank state at a day boundary.
#[derive(Clone, Debug, PartialEq)]
pub struct BoundaryState {
    pub zones: IndexMap<String, ThermalState>,
    /// present for a centralized unit with a buffer tank
    pub tank: Option<TankState>,
}

impl BoundaryState {
    /// State before the first day: every node at the optimizer's start temperature and a charged
    /// tank with the compressor off
    pub fn initial(corpus: &Corpus) -> Self {
        let start = ThermalState::uniform(corpus.optimizer.start_temperature());
        let tank = match &corpus.community {
            Community::CollectiveSelfConsumption { heat_pump, .. }
                if heat_pump.has_thermal_storage() =>
            {
                Some(TankHysteresis::new(heat_pump.auxiliaries()).initial_state())
            }
            _ => None,
        };

        Self {
            zones: corpus
                .users
                .iter()
                .map(|user| (user.name().to_string(), start))
                .collect(),
            tank,
        }
    }
}

/// Planned operation of a heat pump, per interval.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UnitSchedule {
    pub on: Vec<bool>,
    /// compressor output, as a magnitude in W
    pub thermal_output: Vec<f64>,
    /// resistive backup output, in W
    pub backup: Vec<f64>,
    /// electrical consumption, in Wh
    pub consumption: Vec<f64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct UserSchedule {
    /// heating (positive) or cooling (negative) flux delivered to the air node, in W
    pub phi_hc: Vec<f64>,
    /// node temperatures at each interval boundary, starting with the carried-over state
    pub states: Vec<ThermalState>,
    /// the dwelling's own unit, in a renewable energy community
    pub unit: Option<UnitSchedule>,
}

/// Energy drawn from and fed into the grid, in Wh per interval
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GridExchange {
    pub import: Vec<f64>,
    pub export: Vec<f64>,
}

impl GridExchange {
    pub fn net_import(&self) -> impl Iterator<Item = f64> + '_ {
        self.import.iter().zip(&self.export).map(|(i, e)| i - e)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CentralSchedule {
    pub unit: UnitSchedule,
    /// tank state at each interval boundary, on days the tank is modelled
    pub tank: Option<Vec<TankState>>,
}

/// The optimized operation of the community over one day.
#[derive(Clone, Debug, PartialEq)]
pub struct DaySchedule {
    pub day: u32,
    /// indices of the day's intervals in the full series
    pub intervals: Range<usize>,
    pub users: IndexMap<String, UserSchedule>,
    pub prosumers: IndexMap<String, GridExchange>,
    pub virtual_exchange: GridExchange,
    pub central: Option<CentralSchedule>,
    /// cost of the day, in EUR
    pub objective: f64,
    /// state handed on to the following day
    pub boundary: BoundaryState,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DayFailure {
    pub day: u32,
    pub error: DispatchError,
}

/// Days optimized before the run ended, the state after the last of them and, if the run
/// stopped early, the day that could not be optimized.
#[derive(Clone, Debug, PartialEq)]
pub struct DispatchOutcome {
    pub days: Vec<DaySchedule>,
    pub boundary: BoundaryState,
    pub failure: Option<DayFailure>,
}

impl DispatchOutcome {
    pub fn is_complete(&self) -> bool {
        self.failure.is_none()
    }
}

/// Runs the day-ahead program over consecutive days with a given MILP backend.
pub struct DayAheadOptimizer<'a, S: Solver> {
    corpus: &'a Corpus,
    solver: S,
}

impl<'a, S: Solver> DayAheadOptimizer<'a, S> {
    pub fn new(corpus: &'a Corpus, solver: S) -> Self {
        Self { corpus, solver }
    }

    /// Optimize every day of the series from the initial boundary state
    pub fn run(&self) -> DispatchOutcome {
        let days = self.corpus.external_conditions.days();
        self.run_days(&days, BoundaryState::initial(self.corpus))
    }

    /// Optimize the given days in order, starting from `boundary`
    ///
    /// A day that cannot be optimized ends the run, since every later day starts from its final
    /// state. Days already optimized are kept in the outcome.
    pub fn run_days(&self, days: &[DayWindow], boundary: BoundaryState) -> DispatchOutcome {
        let mut outcome = DispatchOutcome {
            days: Vec::with_capacity(days.len()),
            boundary,
            failure: None,
        };

        if let Some((building, model_error)) = self.corpus.model_failures.first() {
            if let Some(window) = days.first() {
                error!(building = building.as_str(), %model_error, "cannot dispatch an incomplete community");
                outcome.failure = Some(DayFailure {
                    day: window.day,
                    error: DispatchError::Model(model_error.clone()),
                });
            }
            return outcome;
        }

        for window in days {
            match self.dispatch_day(window, &outcome.boundary) {
                Ok(schedule) => {
                    outcome.boundary = schedule.boundary.clone();
                    outcome.days.push(schedule);
                }
                Err(dispatch_error) => {
                    error!(day = window.day, %dispatch_error, "day-ahead dispatch stopped");
                    outcome.failure = Some(DayFailure {
                        day: window.day,
                        error: dispatch_error,
                    });
                    break;
                }
            }
        }

        outcome
    }

    /// Build and solve the program for one day
    #[instrument(skip_all, fields(day = window.day))]
    pub fn dispatch_day(
        &self,
        window: &DayWindow,
        boundary: &BoundaryState,
    ) -> Result<DaySchedule, DispatchError> {
        let day = DayModel::build(self.corpus, window, boundary)?;
        let model = day.model();
        info!(
            intervals = window.intervals.len(),
            variables = model.variables().len(),
            binaries = model.binary_count(),
            constraints = model.constraints().len(),
            "built day-ahead model"
        );

        let assignment = self
            .solver
            .solve(model)
            .map_err(|error| DispatchError::from_solve_error(window.day, error))?;
        let schedule = day.schedule(&assignment);

        info!(objective = schedule.objective, "solved day-ahead model");
        debug!(tank = ?schedule.boundary.tank, "carrying state to the next day");
        Ok(schedule)
    }
}
