use crate::external_conditions::PerOrientation;
use crate::simulation_time::SimulationStep;
use indexmap::IndexMap;
use anyhow::bail;
use serde::Deserialize;
use std::io::{BufReader, Read};

/// Read and deserialize the full configuration tree once; the result is passed by reference to
/// every component from then on.
pub fn ingest(json: impl Read) -> anyhow::Result<Input> {
    let reader = BufReader::new(json);
    let input: Input = serde_json::from_reader(reader)?;
    input.optimizer.validate()?;

    Ok(input)
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Input {
    #[serde(default)]
    pub simulation_step: SimulationStep,
    #[serde(default)]
    pub seasons: Seasons,
    pub community: CommunityInput,
    pub users: IndexMap<String, UserInput>,
    #[serde(default)]
    pub tariffs: Tariffs,
    #[serde(default)]
    pub optimizer: OptimizerSettings,
}

/// Months and hours in which heating and cooling are allowed to operate.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Seasons {
    #[serde(default = "all_months")]
    pub heating_months: Vec<u32>,
    #[serde(default = "default_cooling_months")]
    pub cooling_months: Vec<u32>,
    #[serde(default = "all_hours")]
    pub heating_hours: Vec<u32>,
    #[serde(default = "all_hours")]
    pub cooling_hours: Vec<u32>,
}

impl Default for Seasons {
    fn default() -> Self {
        Self {
            heating_months: all_months(),
            cooling_months: default_cooling_months(),
            heating_hours: all_hours(),
            cooling_hours: all_hours(),
        }
    }
}

fn all_months() -> Vec<u32> {
    (1..=12).collect()
}

fn default_cooling_months() -> Vec<u32> {
    (5..=9).collect()
}

fn all_hours() -> Vec<u32> {
    (0..24).collect()
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind")]
pub enum CommunityInput {
    /// Renewable energy community: every user runs its own autonomous air-to-air heat pump.
    #[serde(rename = "CER")]
    RenewableEnergyCommunity,
    /// Collective self-consumption: one centralized water-loop heat pump serves every user.
    #[serde(rename = "AUC")]
    CollectiveSelfConsumption {
        central_heat_pump: HeatPumpInput,
        #[serde(default = "default_contract_power")]
        central_contract_power: f64,
    },
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserInput {
    pub building: BuildingEnvelopeInput,
    #[serde(default)]
    pub comfort: ComfortSetpoints,
    /// required for users of a renewable energy community
    pub heat_pump: Option<HeatPumpInput>,
    /// contracted grid connection power, in W
    #[serde(default = "default_contract_power")]
    pub contract_power: f64,
    /// users with on-site PV take part in the grid energy balance as prosumers
    #[serde(default)]
    pub prosumer: bool,
    /// constant non-HVAC electrical demand of a prosumer, in W
    #[serde(default)]
    pub base_load: f64,
}

pub(crate) fn default_contract_power() -> f64 {
    3_500.
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ComfortSetpoints {
    /// indoor temperature below which heating is called for, in deg C
    pub heating: f64,
    /// indoor temperature above which cooling is called for, in deg C
    pub cooling: f64,
}

impl Default for ComfortSetpoints {
    fn default() -> Self {
        Self {
            heating: 20.,
            cooling: 26.,
        }
    }
}

/// Envelope record for one building. Per-orientation quantities follow the order
/// N, NE, E, SE, S, SW, W, NW. Keys the model does not use are ignored.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct BuildingEnvelopeInput {
    /// solar gain factor of glazed surfaces
    pub ks_gla: f64,
    /// solar gain factor of opaque surfaces
    pub ks_opa: f64,
    /// infrared re-radiation factor of opaque surfaces
    pub ks_infra: f64,
    /// heated volume, in m3
    pub volume: f64,
    /// heated floor area, in m2
    pub a_floor: f64,
    /// external wall area per orientation, in m2
    pub a_walls: PerOrientation,
    /// window area per orientation, in m2
    pub a_windows: PerOrientation,
    /// internal partition area, in m2
    pub a_partitions: f64,
    /// area of light internal elements, in m2
    pub a_s: f64,
    pub a_window_frame: f64,
    /// glazed fraction of a window
    pub f_f: f64,
    /// U-values, in W/(m2.K)
    pub u_walls: f64,
    pub u_windows: f64,
    pub u_roof: f64,
    pub u_ground: f64,
    /// air changes per hour
    pub acr: f64,
    /// areal heat capacities, in J/(m2.K)
    pub c_m_walls: f64,
    pub c_m_roof: f64,
    pub c_m_floor: f64,
    pub c_s: f64,
    /// constant internal heat gain baseline, in W
    #[serde(default = "default_internal_gains")]
    pub internal_gains: f64,
    /// temperature beneath the ground floor, in deg C
    #[serde(default = "default_ground_temperature")]
    pub ground_temperature: f64,
}

fn default_internal_gains() -> f64 {
    200.
}

fn default_ground_temperature() -> f64 {
    15.
}

/// Coefficients of a 9-term biquadratic performance correlation plus its offset.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct BiquadraticCorrelation {
    pub alpha: [f64; 9],
    pub q: f64,
}

/// Manufacturer record for one operating mode. Other catalogue keys (fit quality, rated
/// electrical power and the like) are ignored.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct HeatPumpModeInput {
    pub efficiency: BiquadraticCorrelation,
    pub capacity: BiquadraticCorrelation,
    /// minimum and nominal thermal power, in W (negative in cooling)
    pub p_th_min: f64,
    pub p_th_nom: f64,
    pub f_seasonal_eta: f64,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct HeatPumpAuxiliariesInput {
    /// fan electrical power, in W
    pub pel_fans: f64,
    pub eta_fans: f64,
    /// circulation pump electrical power, in W
    pub pel_pumps: f64,
    pub eta_pumps: f64,
    /// storage tank volume, in m3
    pub v_tank: f64,
    #[serde(default = "default_cp_water")]
    pub cp_water: f64,
    #[serde(default = "default_rho_water")]
    pub rho_water: f64,
    /// backup electric heater capacity, in W
    pub q_heater: f64,
    /// tank temperature at which the compressor switches on, in deg C
    pub t_cut_in: f64,
    /// width of the tank hysteresis band, in K
    pub t_dead_band: f64,
    /// admissible tank temperature range used by the dispatch optimizer, in deg C;
    /// defaults to one dead band either side of the hysteresis band
    #[serde(default)]
    pub tank_temperature_range: Option<(f64, f64)>,
}

fn default_cp_water() -> f64 {
    crate::core::units::SPECIFIC_HEAT_WATER
}

fn default_rho_water() -> f64 {
    crate::core::units::DENSITY_WATER
}

/// Range of correlation inputs for which the manufacturer fit is trusted.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CorrelationRangeInput {
    pub t_ext_min: f64,
    pub t_ext_max: f64,
    pub t_ref_min: f64,
    pub t_ref_max: f64,
}

/// Unknown keys such as maker and model names are ignored.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct HeatPumpInput {
    #[serde(default)]
    pub thermal_storage: bool,
    pub heating_mode: HeatPumpModeInput,
    pub cooling_mode: HeatPumpModeInput,
    pub auxiliaries: HeatPumpAuxiliariesInput,
    #[serde(default)]
    pub validated_range: Option<CorrelationRangeInput>,
}

/// Energy prices, in EUR/kWh
#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Tariffs {
    pub purchase_price: f64,
    pub feed_in_tariff: f64,
    /// incentive paid on energy shared within the community
    pub incentive: f64,
}

impl Default for Tariffs {
    fn default() -> Self {
        Self {
            purchase_price: 0.35,
            feed_in_tariff: 0.15,
            incentive: 0.13,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct OptimizerSettings {
    /// lowest admissible indoor temperature, in deg C
    pub t_min: f64,
    /// highest admissible indoor temperature, in deg C
    pub t_max: f64,
    /// hours of the day in which the comfort band is enforced
    #[serde(default = "all_hours")]
    pub comfort_hours: Vec<u32>,
    /// accepted relative optimality gap
    pub relative_gap: f64,
    /// wall-clock limit on each daily solve, in seconds
    #[serde(default)]
    pub time_limit: Option<f64>,
    /// indoor temperature of every node at the start of the first day; defaults to `t_min`
    #[serde(default)]
    pub initial_temperature: Option<f64>,
}

impl OptimizerSettings {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(self.t_min < self.t_max) {
            bail!(
                "Optimizer comfort band is empty: t_min {} is not below t_max {}",
                self.t_min,
                self.t_max
            );
        }
        if !(0. ..1.).contains(&self.relative_gap) {
            bail!(
                "Optimizer relative_gap must lie in [0, 1), got {}",
                self.relative_gap
            );
        }
        if let Some(time_limit) = self.time_limit {
            if !(time_limit.is_finite() && time_limit > 0.) {
                bail!("Optimizer time_limit must be a positive number of seconds, got {time_limit}");
            }
        }
        Ok(())
    }

    /// Temperature of every thermal node at the start of the first optimized day, in deg C
    pub fn start_temperature(&self) -> f64 {
        self.initial_temperature.unwrap_or(self.t_min)
    }

    /// Reference indoor temperature for autonomous unit performance: the middle of the
    /// comfort band
    pub fn reference_indoor_temperature(&self) -> f64 {
        (self.t_min + self.t_max) / 2.
    }
}

impl Default for OptimizerSettings {
    fn default() -> Self {
        Self {
            t_min: 19.,
            t_max: 26.,
            comfort_hours: all_hours(),
            relative_gap: 0.005,
            time_limit: None,
            initial_temperature: None,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::*;
    use serde_json::json;

    pub(crate) fn envelope_json() -> serde_json::Value {
        json!({
            "ks_gla": 0.6,
            "ks_opa": 0.04,
            "ks_infra": 0.5,
            "volume": 300.,
            "a_floor": 100.,
            "a_walls": [12.5, 12.5, 12.5, 12.5, 12.5, 12.5, 12.5, 12.5],
            "a_windows": [2., 0., 2., 0., 4., 0., 2., 0.],
            "a_partitions": 80.,
            "a_s": 150.,
            "a_window_frame": 1.5,
            "f_f": 0.8,
            "u_walls": 0.5,
            "u_windows": 1.8,
            "u_roof": 0.4,
            "u_ground": 0.3,
            "acr": 0.5,
            "c_m_walls": 110_000.,
            "c_m_roof": 80_000.,
            "c_m_floor": 80_000.,
            "c_s": 10_000.
        })
    }

    /// Performance record for one mode. `efficiency_scale` is 0.1 for an autonomous unit whose
    /// correlation yields an energy input ratio and 1 for a centralized unit yielding a COP.
    pub(crate) fn mode_json(sign: f64, efficiency_scale: f64) -> serde_json::Value {
        json!({
            "efficiency": {
                "alpha": [0.02 * efficiency_scale, 0., 0., -0.01 * efficiency_scale, 0., 0., 0., 0., 0.],
                "q": 3. * efficiency_scale
            },
            "capacity": {"alpha": [0.01, 0., 0., -0.005, 0., 0., 0., 0., 0.], "q": 1.},
            "p_th_min": sign * 500.,
            "p_th_nom": sign * 5_000.,
            "f_seasonal_eta": 0.9
        })
    }

    pub(crate) fn heat_pump_json(thermal_storage: bool, efficiency_scale: f64) -> serde_json::Value {
        json!({
            "thermal_storage": thermal_storage,
            "heating_mode": mode_json(1., efficiency_scale),
            "cooling_mode": mode_json(-1., efficiency_scale),
            "auxiliaries": {
                "pel_fans": 50.,
                "eta_fans": 0.8,
                "pel_pumps": 40.,
                "eta_pumps": 0.5,
                "v_tank": 0.3,
                "q_heater": 3_000.,
                "t_cut_in": 55.,
                "t_dead_band": 5.
            }
        })
    }

    #[rstest]
    fn test_ingest_renewable_energy_community() {
        let json = json!({
            "community": {"kind": "CER"},
            "users": {
                "flat_1": {
                    "building": envelope_json(),
                    "heat_pump": heat_pump_json(false, 0.1),
                    "prosumer": true
                }
            }
        });
        let input = ingest(json.to_string().as_bytes()).unwrap();

        assert!(matches!(
            input.community,
            CommunityInput::RenewableEnergyCommunity
        ));
        assert_eq!(input.simulation_step, SimulationStep::Hourly);
        assert_eq!(input.seasons, Seasons::default());
        assert_eq!(input.tariffs, Tariffs::default());
        let user = &input.users["flat_1"];
        assert!(user.prosumer);
        assert_eq!(user.contract_power, 3_500.);
        assert_eq!(user.comfort, ComfortSetpoints::default());
        assert_eq!(user.building.internal_gains, 200.);
        assert_eq!(user.building.ground_temperature, 15.);
        let heat_pump = user.heat_pump.as_ref().unwrap();
        assert_eq!(heat_pump.auxiliaries.cp_water, 4_186.);
        assert_eq!(heat_pump.cooling_mode.p_th_nom, -5_000.);
    }

    #[rstest]
    fn test_ingest_collective_self_consumption() {
        let json = json!({
            "simulation_step": "15Min",
            "seasons": {"heating_months": [1, 2, 3, 11, 12], "heating_hours": [0, 7, 8, 18, 19]},
            "community": {
                "kind": "AUC",
                "central_heat_pump": heat_pump_json(true, 1.),
                "central_contract_power": 6_000.
            },
            "users": {"flat_1": {"building": envelope_json()}},
            "optimizer": {"t_min": 20., "t_max": 24., "relative_gap": 0.01}
        });
        let input = ingest(json.to_string().as_bytes()).unwrap();

        match &input.community {
            CommunityInput::CollectiveSelfConsumption {
                central_heat_pump,
                central_contract_power,
            } => {
                assert!(central_heat_pump.thermal_storage);
                assert_eq!(*central_contract_power, 6_000.);
            }
            _ => panic!("expected a collective self-consumption community"),
        }
        assert_eq!(input.seasons.heating_months, vec![1, 2, 3, 11, 12]);
        assert_eq!(input.seasons.cooling_months, vec![5, 6, 7, 8, 9]);
        assert_eq!(input.optimizer.comfort_hours.len(), 24);
    }

    #[rstest]
    fn test_ingest_rejects_unknown_fields() {
        let json = json!({
            "community": {"kind": "CER"},
            "users": {},
            "unexpected": true
        });
        assert!(ingest(json.to_string().as_bytes()).is_err());
    }

    #[rstest]
    fn test_ingest_ignores_catalogue_keys_of_equipment_records() {
        let mut building = envelope_json();
        building["c_m_partitions"] = json!(60_000.);
        building["reflectance"] = json!(0.3);
        let mut heat_pump = heat_pump_json(false, 0.1);
        heat_pump["maker"] = json!("Acme");
        heat_pump["model"] = json!("AW-5");
        for mode in ["heating_mode", "cooling_mode"] {
            heat_pump[mode]["p_th_max"] = json!(6_000.);
            heat_pump[mode]["p_nom"] = json!(1_500.);
            heat_pump[mode]["r_sq"] = json!(0.98);
            heat_pump[mode]["t_setpoint_max"] = json!(45.);
            heat_pump[mode]["f_min_ee"] = json!(0.4);
        }
        let json = json!({
            "community": {"kind": "CER"},
            "users": {"flat_1": {"building": building, "heat_pump": heat_pump}}
        });
        let input = ingest(json.to_string().as_bytes()).unwrap();

        let plain = ingest(
            json!({
                "community": {"kind": "CER"},
                "users": {
                    "flat_1": {"building": envelope_json(), "heat_pump": heat_pump_json(false, 0.1)}
                }
            })
            .to_string()
            .as_bytes(),
        )
        .unwrap();
        assert_eq!(input.users["flat_1"].building, plain.users["flat_1"].building);
        assert_eq!(input.users["flat_1"].heat_pump, plain.users["flat_1"].heat_pump);
    }

    #[rstest]
    #[case::negative_gap(json!({"t_min": 19., "t_max": 26., "relative_gap": -0.01}))]
    #[case::gap_of_one(json!({"t_min": 19., "t_max": 26., "relative_gap": 1.}))]
    #[case::zero_time_limit(json!({"t_min": 19., "t_max": 26., "relative_gap": 0.01, "time_limit": 0.}))]
    #[case::negative_time_limit(json!({"t_min": 19., "t_max": 26., "relative_gap": 0.01, "time_limit": -5.}))]
    #[case::empty_comfort_band(json!({"t_min": 24., "t_max": 20., "relative_gap": 0.01}))]
    fn test_ingest_rejects_unusable_optimizer_settings(#[case] optimizer: serde_json::Value) {
        let json = json!({
            "community": {"kind": "CER"},
            "users": {},
            "optimizer": optimizer
        });
        assert!(ingest(json.to_string().as_bytes()).is_err());
    }

    #[rstest]
    fn test_ingest_accepts_time_limit() {
        let json = json!({
            "community": {"kind": "CER"},
            "users": {},
            "optimizer": {"t_min": 19., "t_max": 26., "relative_gap": 0., "time_limit": 30.}
        });
        let input = ingest(json.to_string().as_bytes()).unwrap();
        assert_eq!(input.optimizer.time_limit, Some(30.));
        assert_eq!(input.optimizer.relative_gap, 0.);
    }
}
