//! This module provides objects to represent the performance of heat pumps serving the
//! community, either one autonomous air-to-air unit per dwelling or a single centralized unit
//! feeding a water loop. Performance follows manufacturer biquadratic fits, with the EnergyPlus
//! timed-defrost derating applied to air-source units in cold, humid weather.

use crate::core::air_properties::{humidity_ratio, wet_bulb_temperature};
use crate::core::controls::season_control::OperatingMode;
use crate::errors::CorrelationRangeError;
use crate::input::{
    BiquadraticCorrelation, CorrelationRangeInput, HeatPumpAuxiliariesInput, HeatPumpInput,
    HeatPumpModeInput,
};

/// At or below this outdoor temperature the heat pump is disabled and only the backup heater runs
pub const BACKUP_ONLY_TEMPERATURE: f64 = -8.;
/// At or below this outdoor temperature defrost cycles derate an air-source unit
pub const DEFROST_TEMPERATURE_LIMIT: f64 = 5.;

/// Relative humidity assumed for indoor air when evaluating cooling capacity, in %
const INDOOR_RELATIVE_HUMIDITY: f64 = 50.;
/// Air leaving the outdoor coil is treated as saturated
const COIL_RELATIVE_HUMIDITY: f64 = 100.;
const MIN_HUMIDITY_RATIO_DIFFERENCE: f64 = 1e-6;
/// Additional electrical draw during defrost, in W
const DEFROST_ELECTRICAL_POWER: f64 = (5.9645 / 1.01667) * 0.05833 * 1000.;

/// Whether the unit is an air-to-air unit serving one dwelling, or a central unit serving all.
/// The two have different efficiency result conventions (see `HeatPumpModel::efficiency`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeatPumpConfiguration {
    Autonomous,
    Centralized,
}

/// A biquadratic performance correlation
/// `nominal * (a1 x + a2 x^2 + a3 x^3 + a4 y + a5 y^2 + a6 y^3 + a7 x y + a8 x^2 y + a9 x y^2 + q)`
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PerformanceCurve {
    alpha: [f64; 9],
    offset: f64,
}

impl PerformanceCurve {
    pub fn evaluate(&self, nominal: f64, x: f64, y: f64) -> f64 {
        let a = &self.alpha;
        nominal
            * (a[0] * x
                + a[1] * x.powi(2)
                + a[2] * x.powi(3)
                + a[3] * y
                + a[4] * y.powi(2)
                + a[5] * y.powi(3)
                + a[6] * x * y
                + a[7] * x.powi(2) * y
                + a[8] * x * y.powi(2)
                + self.offset)
    }
}

impl From<&BiquadraticCorrelation> for PerformanceCurve {
    fn from(correlation: &BiquadraticCorrelation) -> Self {
        Self {
            alpha: correlation.alpha,
            offset: correlation.q,
        }
    }
}

/// Correlations and power limits for one operating mode.
#[derive(Clone, Debug, PartialEq)]
pub struct ModeParameters {
    efficiency: PerformanceCurve,
    capacity: PerformanceCurve,
    /// minimum modulated thermal power, in W, signed as supplied (negative in cooling)
    p_th_min: f64,
    p_th_nom: f64,
    f_seasonal_eta: f64,
}

impl ModeParameters {
    fn from_input(input: &HeatPumpModeInput) -> Self {
        Self {
            efficiency: (&input.efficiency).into(),
            capacity: (&input.capacity).into(),
            p_th_min: input.p_th_min,
            p_th_nom: input.p_th_nom,
            f_seasonal_eta: input.f_seasonal_eta,
        }
    }

    /// Smallest modulated thermal output, as a magnitude in W
    pub fn minimum_output(&self) -> f64 {
        self.p_th_min.abs()
    }
}

/// Fans, pumps, backup heater and storage tank that accompany a heat pump.
#[derive(Clone, Debug, PartialEq)]
pub struct Auxiliaries {
    fan_power: f64,
    fan_efficiency: f64,
    pump_power: f64,
    pump_efficiency: f64,
    tank_volume: f64,
    cp_water: f64,
    rho_water: f64,
    backup_heater_capacity: f64,
    t_cut_in: f64,
    t_dead_band: f64,
    tank_temperature_range: Option<(f64, f64)>,
}

impl Auxiliaries {
    fn from_input(input: &HeatPumpAuxiliariesInput) -> Self {
        Self {
            fan_power: input.pel_fans,
            fan_efficiency: input.eta_fans,
            pump_power: input.pel_pumps,
            pump_efficiency: input.eta_pumps,
            tank_volume: input.v_tank,
            cp_water: input.cp_water,
            rho_water: input.rho_water,
            backup_heater_capacity: input.q_heater,
            t_cut_in: input.t_cut_in,
            t_dead_band: input.t_dead_band,
            tank_temperature_range: input.tank_temperature_range,
        }
    }

    /// Electrical draw of the fans, in W
    pub fn fan_electrical_power(&self) -> f64 {
        self.fan_power / self.fan_efficiency
    }

    /// Electrical draw of the circulation pumps, in W
    pub fn pump_electrical_power(&self) -> f64 {
        self.pump_power / self.pump_efficiency
    }

    /// Electrical draw of fans and pumps together, in W
    pub fn electrical_power(&self) -> f64 {
        self.fan_electrical_power() + self.pump_electrical_power()
    }

    pub fn backup_heater_capacity(&self) -> f64 {
        self.backup_heater_capacity
    }

    pub fn t_cut_in(&self) -> f64 {
        self.t_cut_in
    }

    pub fn t_cut_off(&self) -> f64 {
        self.t_cut_in + self.t_dead_band
    }

    /// Heat capacity of the stored water, in J/K
    pub fn tank_heat_capacity(&self) -> f64 {
        self.tank_volume * self.rho_water * self.cp_water
    }

    /// Lowest and highest tank temperature the optimizer may plan for, in deg C
    pub fn tank_temperature_range(&self) -> (f64, f64) {
        self.tank_temperature_range.unwrap_or((
            self.t_cut_in - self.t_dead_band,
            self.t_cut_off() + self.t_dead_band,
        ))
    }
}

/// Multipliers applied to an air-source unit while it runs timed defrost cycles.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DefrostDerating {
    pub heat_capacity_multiplier: f64,
    pub input_power_multiplier: f64,
    /// additional electrical draw, in W
    pub electrical_power: f64,
}

/// Defrost derating from the moisture that can freeze out on the outdoor coil
///
/// Arguments:
/// * `t_ext` - outdoor air temperature, in deg C
/// * `relative_humidity` - outdoor relative humidity, in %
pub fn defrost_derating(t_ext: f64, relative_humidity: f64) -> DefrostDerating {
    let t_coil = 0.82 * t_ext - 8.589;
    let delta = (humidity_ratio(t_ext, relative_humidity)
        - humidity_ratio(t_coil, COIL_RELATIVE_HUMIDITY))
    .max(MIN_HUMIDITY_RATIO_DIFFERENCE);

    DefrostDerating {
        heat_capacity_multiplier: 0.909 - 107.33 * delta,
        input_power_multiplier: 0.9 - 36.45 * delta,
        electrical_power: DEFROST_ELECTRICAL_POWER,
    }
}

/// Instantaneous performance of a unit for one interval.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Performance {
    /// ratio of thermal output to electrical input
    pub eta: f64,
    /// maximum deliverable thermal output, as a magnitude in W
    pub q_max: f64,
    /// additional defrost electrical draw, in W
    pub pe_defrost: f64,
    /// the compressor is locked out and only the backup heater is available
    pub backup_only: bool,
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct CorrelationRange {
    t_ext: (f64, f64),
    t_ref: (f64, f64),
}

impl CorrelationRange {
    fn check(&self, t_ext: f64, t_ref: f64) -> Result<(), CorrelationRangeError> {
        for (quantity, value, (min, max)) in [
            ("outdoor temperature", t_ext, self.t_ext),
            ("reference temperature", t_ref, self.t_ref),
        ] {
            if !(min..=max).contains(&value) {
                return Err(CorrelationRangeError {
                    quantity,
                    value,
                    min,
                    max,
                });
            }
        }
        Ok(())
    }
}

impl From<&CorrelationRangeInput> for CorrelationRange {
    fn from(input: &CorrelationRangeInput) -> Self {
        Self {
            t_ext: (input.t_ext_min, input.t_ext_max),
            t_ref: (input.t_ref_min, input.t_ref_max),
        }
    }
}

/// Heat pump performance model holding both mode parameter sets; the active set is picked by
/// an `OperatingMode` rather than by a separate type per mode.
#[derive(Clone, Debug, PartialEq)]
pub struct HeatPumpModel {
    configuration: HeatPumpConfiguration,
    heating: ModeParameters,
    cooling: ModeParameters,
    auxiliaries: Auxiliaries,
    thermal_storage: bool,
    validated_range: Option<CorrelationRange>,
}

impl HeatPumpModel {
    pub fn from_input(input: &HeatPumpInput, configuration: HeatPumpConfiguration) -> Self {
        Self {
            configuration,
            heating: ModeParameters::from_input(&input.heating_mode),
            cooling: ModeParameters::from_input(&input.cooling_mode),
            auxiliaries: Auxiliaries::from_input(&input.auxiliaries),
            thermal_storage: input.thermal_storage,
            validated_range: input.validated_range.as_ref().map(Into::into),
        }
    }

    pub fn configuration(&self) -> HeatPumpConfiguration {
        self.configuration
    }

    pub fn auxiliaries(&self) -> &Auxiliaries {
        &self.auxiliaries
    }

    pub fn has_thermal_storage(&self) -> bool {
        self.thermal_storage
    }

    pub fn mode_parameters(&self, mode: OperatingMode) -> &ModeParameters {
        match mode {
            OperatingMode::Heating => &self.heating,
            OperatingMode::Cooling => &self.cooling,
        }
    }

    fn check_range(&self, t_ext: f64, t_ref: f64) -> Result<(), CorrelationRangeError> {
        match &self.validated_range {
            Some(range) => range.check(t_ext, t_ref),
            None => Ok(()),
        }
    }

    /// Efficiency of the unit from the manufacturer correlation
    ///
    /// A centralized unit's correlation yields a COP that is scaled by the seasonal factor; an
    /// autonomous unit's correlation yields an energy input ratio whose inverse, scaled by the
    /// seasonal factor, gives the COP. The two conventions are kept as supplied by the
    /// manufacturer data sets.
    ///
    /// Arguments:
    /// * `t_ext` - outdoor (or outdoor wet-bulb) temperature, in deg C
    /// * `t_ref` - indoor or supply water temperature, in deg C
    /// * `mode` - operating mode selecting the parameter set
    pub fn efficiency(
        &self,
        t_ext: f64,
        t_ref: f64,
        mode: OperatingMode,
    ) -> Result<f64, CorrelationRangeError> {
        self.check_range(t_ext, t_ref)?;
        let params = self.mode_parameters(mode);
        let efficiency = params.efficiency.evaluate(1., t_ext, t_ref);

        Ok(match self.configuration {
            HeatPumpConfiguration::Centralized => params.f_seasonal_eta * efficiency,
            HeatPumpConfiguration::Autonomous => params.f_seasonal_eta / efficiency,
        })
    }

    /// Maximum thermal output, in W, signed as the mode's nominal power
    ///
    /// In cooling the correlation runs over the indoor wet-bulb temperature and the outdoor
    /// temperature; in heating over the outdoor and indoor/supply temperatures.
    pub fn max_capacity(
        &self,
        t_ext: f64,
        t_ref: f64,
        mode: OperatingMode,
    ) -> Result<f64, CorrelationRangeError> {
        self.check_range(t_ext, t_ref)?;
        let params = self.mode_parameters(mode);
        let (x, y) = match mode {
            OperatingMode::Cooling => (wet_bulb_temperature(t_ref, INDOOR_RELATIVE_HUMIDITY), t_ext),
            OperatingMode::Heating => (t_ext, t_ref),
        };

        Ok(params.capacity.evaluate(params.p_th_nom, x, y))
    }

    /// Performance of an air-source unit including defrost derating and the low-temperature
    /// lockout in favour of the backup heater
    pub fn air_source_performance(
        &self,
        t_ext: f64,
        t_ref: f64,
        relative_humidity: f64,
        mode: OperatingMode,
    ) -> Result<Performance, CorrelationRangeError> {
        if t_ext <= BACKUP_ONLY_TEMPERATURE {
            return Ok(Performance {
                eta: 1.,
                q_max: self.auxiliaries.backup_heater_capacity,
                pe_defrost: 0.,
                backup_only: true,
            });
        }

        let mut eta = self.efficiency(t_ext, t_ref, mode)?;
        let mut q_max = self.max_capacity(t_ext, t_ref, mode)?.abs();
        let mut pe_defrost = 0.;

        if t_ext <= DEFROST_TEMPERATURE_LIMIT {
            let derating = defrost_derating(t_ext, relative_humidity);
            q_max *= derating.heat_capacity_multiplier;
            eta /= derating.input_power_multiplier;
            pe_defrost = derating.electrical_power;
        }

        Ok(Performance {
            eta,
            q_max,
            pe_defrost,
            backup_only: false,
        })
    }

    /// Electrical draw, in W, of an autonomous unit meeting a thermal load
    ///
    /// Load beyond the unit's capacity is met by direct electric backup.
    ///
    /// Arguments:
    /// * `phi` - thermal load, in W (positive heating, negative cooling)
    /// * `t_ext` - outdoor temperature, in deg C
    /// * `t_indoor` - indoor air temperature at the start of the interval, in deg C
    /// * `relative_humidity` - outdoor relative humidity, in %
    /// * `mode` - active mode, or None if the unit may not run in this interval
    pub fn autonomous_electrical_power(
        &self,
        phi: f64,
        t_ext: f64,
        t_indoor: f64,
        relative_humidity: f64,
        mode: Option<OperatingMode>,
    ) -> Result<f64, CorrelationRangeError> {
        let mode = match mode {
            Some(mode) if phi != 0. => mode,
            _ => return Ok(0.),
        };

        let performance = self.air_source_performance(t_ext, t_indoor, relative_humidity, mode)?;
        let load = phi.abs();

        if performance.backup_only {
            return Ok(load);
        }

        Ok(if load <= performance.q_max {
            load / performance.eta + performance.pe_defrost
        } else {
            performance.q_max / performance.eta + (load - performance.q_max) + performance.pe_defrost
        })
    }

    /// Efficiency and capacity of a centralized unit drawing on outdoor air to heat or cool the
    /// water loop
    pub fn water_loop_performance(
        &self,
        t_ext: f64,
        t_supply: f64,
        relative_humidity: f64,
        mode: OperatingMode,
    ) -> Result<Performance, CorrelationRangeError> {
        let eta = self.efficiency(
            wet_bulb_temperature(t_ext, relative_humidity),
            t_supply,
            mode,
        )?;
        let q_max = self.max_capacity(t_ext, t_supply, mode)?.abs();

        Ok(Performance {
            eta,
            q_max,
            pe_defrost: 0.,
            backup_only: false,
        })
    }
}
