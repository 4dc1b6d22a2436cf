use crate::core::heating_systems::heat_pump::{Auxiliaries, Performance};

/// Water temperature and compressor status of a centralized unit's buffer tank
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TankState {
    /// in deg C
    pub temperature: f64,
    pub compressor_on: bool,
}

/// Result of advancing the tank by one interval
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TankStep {
    /// electrical draw of compressor, backup heater, fans and pumps, in W
    pub electrical_power: f64,
    /// state at the end of the interval
    pub state: TankState,
}

/// On/off hysteresis controller for a compressor charging a buffer tank.
///
/// The compressor switches off only once the tank reaches the cut-off temperature and back on
/// only once it has cooled to the cut-in temperature. While on, it runs at full capacity and the
/// surplus over the load charges the tank; while off, the load discharges the tank.
#[derive(Clone, Debug, PartialEq)]
pub struct TankHysteresis {
    t_cut_in: f64,
    t_cut_off: f64,
    /// in J/K
    heat_capacity: f64,
    /// in W
    backup_heater_capacity: f64,
    fan_power: f64,
    pump_power: f64,
}

impl TankHysteresis {
    pub fn new(auxiliaries: &Auxiliaries) -> Self {
        Self {
            t_cut_in: auxiliaries.t_cut_in(),
            t_cut_off: auxiliaries.t_cut_off(),
            heat_capacity: auxiliaries.tank_heat_capacity(),
            backup_heater_capacity: auxiliaries.backup_heater_capacity(),
            fan_power: auxiliaries.fan_electrical_power(),
            pump_power: auxiliaries.pump_electrical_power(),
        }
    }

    /// A freshly charged tank with the compressor off
    pub fn initial_state(&self) -> TankState {
        TankState {
            temperature: self.t_cut_off,
            compressor_on: false,
        }
    }

    /// Advance the tank over one interval
    ///
    /// Arguments:
    /// * `state` - tank state at the start of the interval
    /// * `load` - heat drawn from the tank by the dwellings, in W
    /// * `performance` - compressor performance at the current tank temperature
    /// * `interval_seconds` - interval length, in s
    pub fn step(
        &self,
        state: &TankState,
        load: f64,
        performance: &Performance,
        interval_seconds: f64,
    ) -> TankStep {
        let auxiliaries = self.fan_power + self.pump_power;
        let mut temperature = state.temperature;

        let (electrical_power, compressor_on) = if state.compressor_on {
            let electrical_power = if load > performance.q_max {
                // load beyond compressor capacity is met by the backup heater, tank held
                self.backup_heater_capacity + auxiliaries
            } else {
                temperature +=
                    (performance.q_max - load) * interval_seconds / self.heat_capacity;
                performance.q_max / performance.eta + auxiliaries
            };
            (electrical_power, temperature < self.t_cut_off)
        } else {
            temperature -= load * interval_seconds / self.heat_capacity;
            (self.pump_power, temperature <= self.t_cut_in)
        };

        TankStep {
            electrical_power,
            state: TankState {
                temperature,
                compressor_on,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::heating_systems::heat_pump::tests::heat_pump;
    use crate::core::heating_systems::heat_pump::HeatPumpConfiguration;
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;
    use rstest::*;

    #[fixture]
    fn controller() -> TankHysteresis {
        TankHysteresis::new(heat_pump(HeatPumpConfiguration::Centralized, true).auxiliaries())
    }

    fn performance(q_max: f64) -> Performance {
        Performance {
            eta: 3.,
            q_max,
            pe_defrost: 0.,
            backup_only: false,
        }
    }

    #[rstest]
    fn test_initial_state(controller: TankHysteresis) {
        assert_eq!(
            controller.initial_state(),
            TankState {
                temperature: 60.,
                compressor_on: false
            }
        );
    }

    #[rstest]
    fn test_discharge_while_off(controller: TankHysteresis) {
        // 0.3 m3 of water holds 1.2558 MJ/K
        let step = controller.step(
            &controller.initial_state(),
            1_255_800. / 3600.,
            &performance(6000.),
            3600.,
        );
        assert_relative_eq!(step.state.temperature, 59., max_relative = 1e-12);
        assert!(!step.state.compressor_on);
        assert_relative_eq!(step.electrical_power, 40. / 0.5);
    }

    #[rstest]
    fn test_charge_while_on(controller: TankHysteresis) {
        let state = TankState {
            temperature: 55.,
            compressor_on: true,
        };
        let step = controller.step(&state, 3000., &performance(6000.), 900.);
        assert_relative_eq!(
            step.state.temperature,
            55. + 3000. * 900. / 1_255_800.,
            max_relative = 1e-12
        );
        assert!(step.state.compressor_on);
        assert_relative_eq!(step.electrical_power, 2000. + 50. / 0.8 + 40. / 0.5);
    }

    #[rstest]
    fn test_compressor_stops_at_cut_off(controller: TankHysteresis) {
        let state = TankState {
            temperature: 59.,
            compressor_on: true,
        };
        let step = controller.step(&state, 1000., &performance(6000.), 3600.);
        assert!(step.state.temperature >= 60.);
        assert!(!step.state.compressor_on);
    }

    #[rstest]
    fn test_backup_heater_holds_tank(controller: TankHysteresis) {
        let state = TankState {
            temperature: 57.,
            compressor_on: true,
        };
        let step = controller.step(&state, 8000., &performance(6000.), 3600.);
        assert_eq!(step.state, state);
        assert_relative_eq!(step.electrical_power, 3000. + 50. / 0.8 + 40. / 0.5);
    }

    #[rstest]
    #[case(1000.)]
    #[case(2500.)]
    #[case(4000.)]
    #[case(5500.)]
    fn test_compressor_switches_only_at_thresholds(controller: TankHysteresis, #[case] load: f64) {
        let mut state = controller.initial_state();
        for _ in 0..500 {
            let next = controller.step(&state, load, &performance(6000.), 900.).state;
            if state.compressor_on && !next.compressor_on {
                assert!(next.temperature >= 60.);
            }
            if !state.compressor_on && next.compressor_on {
                assert!(next.temperature <= 55.);
            }
            state = next;
        }
    }
}
