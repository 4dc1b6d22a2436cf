use crate::core::controls::season_control::SeasonControl;
use crate::core::space_heat_demand::state_space::{IntervalForcing, StateSpaceModel, ThermalState};
use crate::core::space_heat_demand::thermal_fluxes::ThermalFluxes;
use crate::errors::ModelError;
use crate::external_conditions::ExternalConditions;
use crate::input::{BuildingEnvelopeInput, ComfortSetpoints};
use crate::simulation_time::SimulationStep;
use tracing::debug;

/// A conditioned dwelling: its thermal network, the exogenous fluxes acting on it over the
/// simulation and its comfort setpoints.
#[derive(Clone, Debug)]
pub struct Zone {
    name: String,
    model: StateSpaceModel,
    fluxes: ThermalFluxes,
    comfort: ComfortSetpoints,
}

/// Outcome of one thermostat interval
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ZoneStep {
    /// heating (positive) or cooling (negative) flux delivered to the air node, in W
    pub phi_hc: f64,
    /// node temperatures at the end of the interval
    pub state: ThermalState,
}

/// Node temperatures and delivered fluxes over a run. `states` holds one more entry than
/// `phi_hc`: the first is the initial state.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ZoneTrajectory {
    pub phi_hc: Vec<f64>,
    pub states: Vec<ThermalState>,
}

impl ZoneTrajectory {
    /// State at the start of interval `idx`
    pub fn state_before(&self, idx: usize) -> &ThermalState {
        &self.states[idx]
    }

    pub fn final_state(&self) -> Option<&ThermalState> {
        self.states.last()
    }

    pub fn indoor_temperatures(&self) -> impl Iterator<Item = f64> + '_ {
        self.states[1..].iter().map(|state| state.t_air)
    }
}

impl Zone {
    /// Construct a Zone
    ///
    /// Arguments:
    /// * `name` - user the dwelling belongs to
    /// * `envelope` - envelope of the dwelling
    /// * `comfort` - heating and cooling setpoints of the deadband thermostat
    /// * `step` - simulation interval length
    /// * `conditions` - weather and irradiance series
    pub fn new(
        name: &str,
        envelope: &BuildingEnvelopeInput,
        comfort: ComfortSetpoints,
        step: SimulationStep,
        conditions: &ExternalConditions,
    ) -> Result<Self, ModelError> {
        let model = StateSpaceModel::new(name, envelope, step)?;
        let fluxes = ThermalFluxes::generate(envelope, &model, conditions);
        debug!(
            zone = name,
            h_tr_w = model.h_tr_w,
            h_tr_em = model.h_tr_em,
            h_ve = model.h_ve,
            "built state-space model"
        );

        Ok(Self {
            name: name.to_string(),
            model,
            fluxes,
            comfort,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn model(&self) -> &StateSpaceModel {
        &self.model
    }

    pub fn comfort(&self) -> &ComfortSetpoints {
        &self.comfort
    }

    /// State the simulation starts from: every node at the heating setpoint
    pub fn initial_state(&self) -> ThermalState {
        ThermalState::uniform(self.comfort.heating)
    }

    pub fn forcing(&self, idx: usize, conditions: &ExternalConditions) -> IntervalForcing {
        self.fluxes.forcing(idx, conditions.air_temperature(idx))
    }

    /// Advance by one interval with the heating and cooling switched off
    pub fn free_running_step(
        &self,
        state: &ThermalState,
        idx: usize,
        conditions: &ExternalConditions,
    ) -> ThermalState {
        self.model.step(state, &self.forcing(idx, conditions), 0.)
    }

    /// Advance by one interval under the deadband thermostat
    ///
    /// If the air would drift above the cooling setpoint while cooling is allowed, or below the
    /// heating setpoint while heating is allowed, the air is held at that setpoint and the flux
    /// needed to do so is delivered; otherwise the zone floats.
    pub fn thermostat_step(
        &self,
        state: &ThermalState,
        idx: usize,
        conditions: &ExternalConditions,
        control: &SeasonControl,
    ) -> ZoneStep {
        let forcing = self.forcing(idx, conditions);
        let [air, surface, mass] = self.model.transition_rows(&forcing);
        let t_air_free = air.evaluate(state, 0.);

        let month = conditions.month(idx);
        let hour = conditions.hour(idx);
        let setpoint = if t_air_free > self.comfort.cooling && control.cooling_allowed(month, hour)
        {
            Some(self.comfort.cooling)
        } else if t_air_free < self.comfort.heating && control.heating_allowed(month, hour) {
            Some(self.comfort.heating)
        } else {
            None
        };

        let (t_air, phi_hc) = match setpoint {
            Some(t_set) => (t_set, (t_set - t_air_free) / air.hvac),
            None => (t_air_free, 0.),
        };

        ZoneStep {
            phi_hc,
            state: ThermalState {
                t_air,
                t_surface: surface.evaluate(state, phi_hc),
                t_mass: mass.evaluate(state, phi_hc),
            },
        }
    }

    /// Run the deadband thermostat over the whole series
    pub fn simulate(
        &self,
        conditions: &ExternalConditions,
        control: &SeasonControl,
        initial: ThermalState,
    ) -> ZoneTrajectory {
        let mut trajectory = ZoneTrajectory {
            phi_hc: Vec::with_capacity(conditions.len()),
            states: Vec::with_capacity(conditions.len() + 1),
        };
        trajectory.states.push(initial);

        let mut state = initial;
        for idx in 0..conditions.len() {
            let step = self.thermostat_step(&state, idx, conditions, control);
            trajectory.phi_hc.push(step.phi_hc);
            trajectory.states.push(step.state);
            state = step.state;
        }
        trajectory
    }
}
