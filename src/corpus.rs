use crate::core::controls::season_control::{OperatingMode, SeasonControl};
use crate::core::heating_systems::heat_pump::{HeatPumpConfiguration, HeatPumpModel};
use crate::core::heating_systems::storage_tank::{TankHysteresis, TankState};
use crate::core::space_heat_demand::zone::{Zone, ZoneTrajectory};
use crate::core::units::{power_to_energy, watt_hours_to_kilowatt_hours};
use crate::errors::{CorrelationRangeError, ModelError, SimulationError};
use crate::external_conditions::ExternalConditions;
use crate::input::{CommunityInput, Input, OptimizerSettings, Tariffs};
use crate::simulation_time::SimulationStep;
use anyhow::bail;
use indexmap::IndexMap;
use rayon::prelude::*;
use tracing::{debug, info, instrument, warn};

/// A dwelling of the community together with its grid connection.
#[derive(Clone, Debug)]
pub struct User {
    pub(crate) zone: Zone,
    /// autonomous unit serving this dwelling alone, if any
    pub(crate) heat_pump: Option<HeatPumpModel>,
    /// contracted connection power, in W
    pub(crate) contract_power: f64,
    pub(crate) prosumer: bool,
    /// non-HVAC electrical demand, in W
    pub(crate) base_load: f64,
}

impl User {
    pub fn name(&self) -> &str {
        self.zone.name()
    }

    pub fn zone(&self) -> &Zone {
        &self.zone
    }

    pub fn heat_pump(&self) -> Option<&HeatPumpModel> {
        self.heat_pump.as_ref()
    }

    pub fn is_prosumer(&self) -> bool {
        self.prosumer
    }
}

/// How heating and cooling are supplied to the community.
#[derive(Clone, Debug)]
pub enum Community {
    /// each dwelling runs its own autonomous unit
    RenewableEnergyCommunity,
    /// one centralized unit serves every dwelling through a water loop
    CollectiveSelfConsumption {
        heat_pump: HeatPumpModel,
        /// contracted connection power of the central unit, in W
        contract_power: f64,
    },
}

/// Electrical consumption of a heat pump split by service, in Wh per interval
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Consumption {
    pub heating: Vec<f64>,
    pub cooling: Vec<f64>,
}

impl Consumption {
    /// Totals for heating and cooling, in kWh
    pub fn totals_kwh(&self) -> (f64, f64) {
        (
            watt_hours_to_kilowatt_hours(self.heating.iter().sum()),
            watt_hours_to_kilowatt_hours(self.cooling.iter().sum()),
        )
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct UserSimulation {
    pub trajectory: ZoneTrajectory,
    /// present for dwellings with their own unit
    pub consumption: Option<Consumption>,
}

/// Result of running the community's centralized unit against the summed dwelling loads.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CentralizedSimulation {
    /// summed thermal load of the dwellings, in W
    pub load: Vec<f64>,
    /// in Wh per interval
    pub consumption: Vec<f64>,
    /// tank state at the end of each interval
    pub tank: Vec<TankState>,
}

#[derive(Clone, Debug, Default)]
pub struct SimulationResults {
    pub users: IndexMap<String, UserSimulation>,
    pub centralized: Option<CentralizedSimulation>,
    /// dwellings whose run could not be completed; the others are unaffected
    pub failures: IndexMap<String, SimulationError>,
}

/// The community assembled from its configuration, ready to be simulated or dispatched.
#[derive(Debug)]
pub struct Corpus {
    pub(crate) step: SimulationStep,
    pub(crate) control: SeasonControl,
    pub(crate) external_conditions: ExternalConditions,
    pub(crate) users: Vec<User>,
    pub(crate) community: Community,
    pub(crate) tariffs: Tariffs,
    pub(crate) optimizer: OptimizerSettings,
    /// dwellings whose thermal model could not be derived
    pub(crate) model_failures: IndexMap<String, ModelError>,
}

impl Corpus {
    pub fn from_inputs(input: &Input, external_conditions: ExternalConditions) -> anyhow::Result<Self> {
        if external_conditions.is_empty() {
            bail!("External conditions contain no intervals");
        }

        let community = match &input.community {
            CommunityInput::RenewableEnergyCommunity => Community::RenewableEnergyCommunity,
            CommunityInput::CollectiveSelfConsumption {
                central_heat_pump,
                central_contract_power,
            } => Community::CollectiveSelfConsumption {
                heat_pump: HeatPumpModel::from_input(
                    central_heat_pump,
                    HeatPumpConfiguration::Centralized,
                ),
                contract_power: *central_contract_power,
            },
        };

        let mut users = vec![];
        let mut model_failures = IndexMap::new();

        for (name, user) in &input.users {
            let heat_pump = match (&community, &user.heat_pump) {
                (Community::RenewableEnergyCommunity, Some(heat_pump)) => Some(
                    HeatPumpModel::from_input(heat_pump, HeatPumpConfiguration::Autonomous),
                ),
                (Community::RenewableEnergyCommunity, None) => {
                    bail!("User '{name}' of a renewable energy community needs a heat pump")
                }
                (Community::CollectiveSelfConsumption { .. }, Some(_)) => {
                    warn!(
                        user = name.as_str(),
                        "ignoring own heat pump of a user served by the central unit"
                    );
                    None
                }
                (Community::CollectiveSelfConsumption { .. }, None) => None,
            };

            if user.prosumer && !external_conditions.has_pv_generation(name) {
                warn!(
                    user = name.as_str(),
                    "prosumer has no PV generation series, assuming none"
                );
            }

            match Zone::new(
                name,
                &user.building,
                user.comfort,
                input.simulation_step,
                &external_conditions,
            ) {
                Ok(zone) => users.push(User {
                    zone,
                    heat_pump,
                    contract_power: user.contract_power,
                    prosumer: user.prosumer,
                    base_load: user.base_load,
                }),
                Err(error) => {
                    warn!(user = name.as_str(), %error, "skipping building");
                    model_failures.insert(name.clone(), error);
                }
            }
        }

        info!(
            users = users.len(),
            failed = model_failures.len(),
            intervals = external_conditions.len(),
            "assembled community"
        );

        Ok(Self {
            step: input.simulation_step,
            control: SeasonControl::new(&input.seasons),
            external_conditions,
            users,
            community,
            tariffs: input.tariffs,
            optimizer: input.optimizer.clone(),
            model_failures,
        })
    }

    pub fn users(&self) -> &[User] {
        &self.users
    }

    pub fn community(&self) -> &Community {
        &self.community
    }

    pub fn external_conditions(&self) -> &ExternalConditions {
        &self.external_conditions
    }

    pub fn model_failures(&self) -> &IndexMap<String, ModelError> {
        &self.model_failures
    }

    /// Run the deadband thermostat for every dwelling, then work out the heat pumps'
    /// electrical consumption.
    ///
    /// Dwellings are independent and run in parallel. A failing dwelling is reported in the
    /// results without stopping the others; the centralized unit is only simulated when every
    /// dwelling it serves completed.
    pub fn run(&self) -> SimulationResults {
        let outcomes: Vec<(String, Result<UserSimulation, SimulationError>)> = self
            .users
            .par_iter()
            .map(|user| (user.name().to_string(), self.simulate_user(user)))
            .collect();

        let mut results = SimulationResults::default();
        for (name, error) in &self.model_failures {
            results
                .failures
                .insert(name.clone(), SimulationError::Model(error.clone()));
        }
        for (name, outcome) in outcomes {
            match outcome {
                Ok(simulation) => {
                    results.users.insert(name, simulation);
                }
                Err(error) => {
                    warn!(user = name.as_str(), %error, "simulation failed");
                    results.failures.insert(name, error);
                }
            }
        }

        if let Community::CollectiveSelfConsumption { heat_pump, .. } = &self.community {
            if results.failures.is_empty() {
                match self.simulate_centralized(heat_pump, &results.users) {
                    Ok(centralized) => results.centralized = Some(centralized),
                    Err(error) => {
                        warn!(%error, "centralized unit simulation failed");
                        results.failures.insert(
                            "community".to_string(),
                            SimulationError::Correlation {
                                user: "community".to_string(),
                                source: error,
                            },
                        );
                    }
                }
            } else {
                warn!(
                    failed = results.failures.len(),
                    "not simulating the centralized unit with incomplete dwelling loads"
                );
            }
        }

        results
    }

    #[instrument(skip_all, fields(user = user.name()))]
    fn simulate_user(&self, user: &User) -> Result<UserSimulation, SimulationError> {
        let conditions = &self.external_conditions;
        let trajectory = user
            .zone
            .simulate(conditions, &self.control, user.zone.initial_state());

        let consumption = match &user.heat_pump {
            Some(heat_pump) => Some(
                self.autonomous_consumption(heat_pump, &trajectory)
                    .map_err(|source| SimulationError::Correlation {
                        user: user.name().to_string(),
                        source,
                    })?,
            ),
            None => None,
        };

        if let Some(consumption) = &consumption {
            let (heating, cooling) = consumption.totals_kwh();
            debug!(heating_kwh = heating, cooling_kwh = cooling, "simulated dwelling");
        }

        Ok(UserSimulation {
            trajectory,
            consumption,
        })
    }

    fn autonomous_consumption(
        &self,
        heat_pump: &HeatPumpModel,
        trajectory: &ZoneTrajectory,
    ) -> Result<Consumption, CorrelationRangeError> {
        let conditions = &self.external_conditions;
        let hours = self.step.hours();
        let mut consumption = Consumption::default();

        for (idx, &phi_hc) in trajectory.phi_hc.iter().enumerate() {
            let month = conditions.month(idx);
            let hour = conditions.hour(idx);
            let t_ext = conditions.air_temperature(idx);
            let rh = conditions.relative_humidity(idx);
            let t_indoor = trajectory.state_before(idx).t_air;

            let service = |load: f64| {
                let mode = self.control.mode_for_demand(month, hour, load);
                heat_pump
                    .autonomous_electrical_power(load, t_ext, t_indoor, rh, mode)
                    .map(|power| power_to_energy(power, hours))
            };
            consumption.heating.push(service(phi_hc.max(0.))?);
            consumption.cooling.push(service(phi_hc.min(0.))?);
        }

        Ok(consumption)
    }

    #[instrument(skip_all)]
    fn simulate_centralized(
        &self,
        heat_pump: &HeatPumpModel,
        users: &IndexMap<String, UserSimulation>,
    ) -> Result<CentralizedSimulation, CorrelationRangeError> {
        let conditions = &self.external_conditions;
        let auxiliaries = heat_pump.auxiliaries();
        let tank = TankHysteresis::new(auxiliaries);
        let mut state = tank.initial_state();
        let mut simulation = CentralizedSimulation::default();

        for idx in 0..conditions.len() {
            let load: f64 = users.values().map(|user| user.trajectory.phi_hc[idx]).sum();
            let t_ext = conditions.air_temperature(idx);
            let rh = conditions.relative_humidity(idx);

            let power = match self.control.mode_for_month(conditions.month(idx)) {
                None => 0.,
                Some(mode) => {
                    let performance =
                        heat_pump.water_loop_performance(t_ext, state.temperature, rh, mode)?;
                    match mode {
                        OperatingMode::Cooling => {
                            load.abs() / performance.eta + auxiliaries.electrical_power()
                        }
                        OperatingMode::Heating if heat_pump.has_thermal_storage() => {
                            let step = tank.step(&state, load, &performance, self.step.seconds());
                            state = step.state;
                            step.electrical_power
                        }
                        OperatingMode::Heating => {
                            load / performance.eta + auxiliaries.electrical_power()
                        }
                    }
                }
            };

            simulation.load.push(load);
            simulation.consumption.push(power_to_energy(power, self.step.hours()));
            simulation.tank.push(state);
        }

        debug!(
            consumption_kwh = watt_hours_to_kilowatt_hours(simulation.consumption.iter().sum()),
            "simulated centralized unit"
        );
        Ok(simulation)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::space_heat_demand::zone::tests::conditions;
    use crate::input::tests::{envelope_json, heat_pump_json};
    use crate::input::ingest;
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;
    use rstest::*;
    use serde_json::json;

    pub(crate) fn renewable_energy_community_json() -> serde_json::Value {
        json!({
            "seasons": {
                "heating_months": [1, 2, 3, 11, 12],
                "cooling_months": [6, 7, 8]
            },
            "community": {"kind": "CER"},
            "users": {
                "flat_1": {
                    "building": envelope_json(),
                    "heat_pump": heat_pump_json(false, 0.1)
                },
                "flat_2": {
                    "building": envelope_json(),
                    "comfort": {"heating": 21., "cooling": 25.},
                    "heat_pump": heat_pump_json(false, 0.1),
                    "prosumer": true,
                    "base_load": 300.
                }
            }
        })
    }

    pub(crate) fn collective_self_consumption_json(thermal_storage: bool) -> serde_json::Value {
        json!({
            "seasons": {
                "heating_months": [1, 2, 3, 11, 12],
                "cooling_months": [6, 7, 8]
            },
            "community": {
                "kind": "AUC",
                "central_heat_pump": heat_pump_json(thermal_storage, 1.)
            },
            "users": {
                "flat_1": {"building": envelope_json()},
                "flat_2": {"building": envelope_json()}
            }
        })
    }

    pub(crate) fn corpus(json: serde_json::Value, conditions: ExternalConditions) -> Corpus {
        let input = ingest(json.to_string().as_bytes()).unwrap();
        Corpus::from_inputs(&input, conditions).unwrap()
    }

    #[rstest]
    fn test_renewable_energy_community_run() {
        let corpus = corpus(renewable_energy_community_json(), conditions(1, &[2.; 24]));
        let results = corpus.run();

        assert!(results.failures.is_empty());
        assert!(results.centralized.is_none());
        assert_eq!(results.users.keys().collect::<Vec<_>>(), vec!["flat_1", "flat_2"]);

        for user in results.users.values() {
            let consumption = user.consumption.as_ref().unwrap();
            assert_eq!(consumption.heating.len(), 24);
            assert!(consumption.cooling.iter().all(|energy| *energy == 0.));
            for (energy, phi) in consumption.heating.iter().zip(&user.trajectory.phi_hc) {
                assert!(*phi > 0.);
                assert!(*energy > 0.);
            }
        }
        // the warmer setpoint needs more energy
        let total = |name: &str| results.users[name].consumption.as_ref().unwrap().totals_kwh().0;
        assert!(total("flat_2") > total("flat_1"));
    }

    #[rstest]
    fn test_renewable_energy_community_requires_heat_pumps() {
        let mut json = renewable_energy_community_json();
        json["users"]["flat_1"]
            .as_object_mut()
            .unwrap()
            .remove("heat_pump");
        let input = ingest(json.to_string().as_bytes()).unwrap();
        assert!(Corpus::from_inputs(&input, conditions(1, &[2.; 24])).is_err());
    }

    #[rstest]
    fn test_failing_building_does_not_abort_others() {
        let mut json = renewable_energy_community_json();
        json["users"]["flat_2"]["building"]["a_walls"] = json!([0., 0., 0., 0., 0., 0., 0., 0.]);
        json["users"]["flat_2"]["building"]["a_windows"] = json!([0., 0., 0., 0., 0., 0., 0., 0.]);
        json["users"]["flat_2"]["building"]["a_floor"] = json!(0.);
        json["users"]["flat_2"]["building"]["a_partitions"] = json!(0.);

        let corpus = corpus(json, conditions(1, &[2.; 24]));
        assert_eq!(corpus.users().len(), 1);

        let results = corpus.run();
        assert_eq!(results.users.keys().collect::<Vec<_>>(), vec!["flat_1"]);
        assert!(matches!(
            results.failures["flat_2"],
            SimulationError::Model(ModelError::NonFiniteCoefficient { .. })
        ));
    }

    #[rstest]
    fn test_centralized_cooling_sums_dwelling_loads() {
        let corpus = corpus(collective_self_consumption_json(false), conditions(7, &[34.; 24]));
        let results = corpus.run();

        let centralized = results.centralized.unwrap();
        assert_eq!(centralized.consumption.len(), 24);
        for (idx, load) in centralized.load.iter().enumerate() {
            let expected: f64 = results.users.values().map(|u| u.trajectory.phi_hc[idx]).sum();
            assert_relative_eq!(*load, expected);
        }
        assert!(results.users.values().all(|user| user.consumption.is_none()));
        assert!(centralized.consumption.iter().all(|energy| *energy > 0.));
    }

    #[rstest]
    fn test_centralized_heating_cycles_tank() {
        let corpus = corpus(collective_self_consumption_json(true), conditions(1, &[0.; 96]));
        let results = corpus.run();
        let centralized = results.centralized.unwrap();

        // first interval draws down the charged tank with only the pumps running
        assert!(centralized.tank[0].temperature < 60.);
        assert_relative_eq!(centralized.consumption[0], 40. / 0.5);
        assert!(centralized.tank.iter().any(|state| state.compressor_on));

        let mut previous = TankState {
            temperature: 60.,
            compressor_on: false,
        };
        for state in &centralized.tank {
            if previous.compressor_on && !state.compressor_on {
                assert!(state.temperature >= 60.);
            }
            if !previous.compressor_on && state.compressor_on {
                assert!(state.temperature <= 55.);
            }
            previous = *state;
        }
    }

    #[rstest]
    fn test_idle_months_consume_nothing() {
        let corpus = corpus(collective_self_consumption_json(true), conditions(4, &[14.; 24]));
        let centralized = corpus.run().centralized.unwrap();
        assert!(centralized.consumption.iter().all(|energy| *energy == 0.));
        assert!(centralized.tank.iter().all(|state| state.temperature == 60.));
    }
}
