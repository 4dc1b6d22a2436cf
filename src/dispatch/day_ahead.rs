//! The mixed-integer program for one calendar day of the community.
//!
//! Every dwelling's three-node recurrence enters as equality constraints seeded with the state
//! carried over from the previous day, so the planned temperatures follow the same physics as
//! the forward simulator. Heat pumps are modelled with an on/off binary gating their modulation
//! range, the centralized unit's buffer tank with hysteresis transition binaries, and every
//! grid-connected party with direction binaries on its import and export.

use crate::core::controls::season_control::OperatingMode;
use crate::core::heating_systems::heat_pump::{HeatPumpModel, Performance};
use crate::core::heating_systems::storage_tank::TankState;
use crate::core::space_heat_demand::state_space::{ThermalState, NODE_AIR};
use crate::corpus::{Community, Corpus, User};
use crate::dispatch::linear_model::{
    Assignment, LinearExpr, LinearModel, VariableId, VariableKind,
};
use crate::dispatch::{
    BoundaryState, CentralSchedule, DaySchedule, GridExchange, UnitSchedule, UserSchedule,
};
use crate::errors::{CorrelationRangeError, DispatchError};
use crate::external_conditions::DayWindow;
use crate::core::units::WATTS_PER_KILOWATT;
use indexmap::IndexMap;
use std::ops::Range;

const NODE_NAMES: [&str; 3] = ["t_air", "t_s", "t_m"];

/// What a unit can do over one interval
#[derive(Clone, Copy, Debug, PartialEq)]
struct UnitLimits {
    mode: Option<OperatingMode>,
    /// modulation range of the compressor, as magnitudes in W
    q_min: f64,
    q_max: f64,
    eta: f64,
    /// in W
    pe_defrost: f64,
    /// resistive backup capacity, in W
    backup: Option<f64>,
    /// fans and pumps, in W
    auxiliaries: f64,
}

impl UnitLimits {
    fn idle() -> Self {
        Self {
            mode: None,
            q_min: 0.,
            q_max: 0.,
            eta: 1.,
            pe_defrost: 0.,
            backup: None,
            auxiliaries: 0.,
        }
    }

    fn from_performance(
        heat_pump: &HeatPumpModel,
        mode: OperatingMode,
        performance: &Performance,
        backup: Option<f64>,
        auxiliaries: f64,
    ) -> Self {
        Self {
            mode: Some(mode),
            q_min: heat_pump
                .mode_parameters(mode)
                .minimum_output()
                .min(performance.q_max),
            q_max: performance.q_max,
            eta: performance.eta,
            pe_defrost: performance.pe_defrost,
            backup,
            auxiliaries,
        }
    }

    /// An air-to-air unit at the middle of the comfort band. In heating the resistive backup
    /// covers load beyond the compressor, and is all that is left below the lockout temperature.
    fn autonomous(
        heat_pump: &HeatPumpModel,
        mode: Option<OperatingMode>,
        t_ext: f64,
        t_ref: f64,
        relative_humidity: f64,
    ) -> Result<Self, CorrelationRangeError> {
        let Some(mode) = mode else {
            return Ok(Self::idle());
        };
        let performance = heat_pump.air_source_performance(t_ext, t_ref, relative_humidity, mode)?;
        let backup = match mode {
            OperatingMode::Heating => Some(heat_pump.auxiliaries().backup_heater_capacity()),
            OperatingMode::Cooling => None,
        };

        if performance.backup_only {
            return Ok(Self {
                mode: Some(mode),
                backup,
                ..Self::idle()
            });
        }
        Ok(Self::from_performance(heat_pump, mode, &performance, backup, 0.))
    }

    /// The centralized unit supplying the water loop at `t_supply`
    fn centralized(
        heat_pump: &HeatPumpModel,
        mode: Option<OperatingMode>,
        t_ext: f64,
        t_supply: f64,
        relative_humidity: f64,
    ) -> Result<Self, CorrelationRangeError> {
        let Some(mode) = mode else {
            return Ok(Self::idle());
        };
        let performance =
            heat_pump.water_loop_performance(t_ext, t_supply, relative_humidity, mode)?;
        Ok(Self::from_performance(
            heat_pump,
            mode,
            &performance,
            None,
            heat_pump.auxiliaries().electrical_power(),
        ))
    }
}

#[derive(Clone, Debug, Default)]
struct UnitVariables {
    output: Vec<VariableId>,
    on: Vec<VariableId>,
    backup: Vec<Option<VariableId>>,
    consumption: Vec<VariableId>,
}

impl UnitVariables {
    /// Add one interval of a modulating unit and return the heat it delivers, as a magnitude
    ///
    /// The compressor output lies in `[q_min, q_max]` when `on` is set and is zero otherwise.
    /// Electrical consumption is `dt (q / eta + pe_defrost on + q_backup + auxiliaries)`,
    /// bounded by the contracted energy for the interval.
    fn add_interval(
        &mut self,
        model: &mut LinearModel,
        label: &str,
        i: usize,
        limits: &UnitLimits,
        dt_h: f64,
        contract_energy: f64,
    ) -> LinearExpr {
        let output = model.continuous(format!("q_{label}_{i}"), Some(0.), Some(limits.q_max));
        // no compressor capacity in this interval (idle or backup only): the unit stays off
        let on = if limits.q_max > 0. {
            model.binary(format!("on_{label}_{i}"))
        } else {
            model.add_variable(format!("on_{label}_{i}"), VariableKind::Binary, Some(0.), Some(0.))
        };
        model.greater_or_equal(
            format!("q_min_{label}_{i}"),
            LinearExpr::from(output) - limits.q_min * on,
            0.,
        );
        model.less_or_equal(
            format!("q_max_{label}_{i}"),
            LinearExpr::from(output) - limits.q_max * on,
            0.,
        );

        let backup = limits.backup.map(|capacity| {
            model.continuous(format!("q_backup_{label}_{i}"), Some(0.), Some(capacity))
        });
        let consumption = model.non_negative(format!("ee_{label}_{i}"));

        let mut delivered = LinearExpr::from(output);
        let mut drawn = (dt_h / limits.eta) * output + (dt_h * limits.pe_defrost) * on;
        if let Some(backup) = backup {
            delivered += backup;
            drawn += dt_h * backup;
        }
        model.equal(
            format!("consumption_{label}_{i}"),
            LinearExpr::from(consumption) - drawn,
            dt_h * limits.auxiliaries,
        );
        model.less_or_equal(format!("contract_{label}_{i}"), consumption, contract_energy);

        self.output.push(output);
        self.on.push(on);
        self.backup.push(backup);
        self.consumption.push(consumption);
        delivered
    }

    fn schedule(&self, assignment: &Assignment) -> UnitSchedule {
        UnitSchedule {
            on: self.on.iter().map(|&on| assignment.is_set(on)).collect(),
            thermal_output: self.output.iter().map(|&q| assignment[q]).collect(),
            backup: self
                .backup
                .iter()
                .map(|backup| backup.map_or(0., |backup| assignment[backup]))
                .collect(),
            consumption: self.consumption.iter().map(|&ee| assignment[ee]).collect(),
        }
    }
}

#[derive(Clone, Debug)]
struct UserVariables {
    name: String,
    /// node temperatures, one more entry than intervals
    states: Vec<[VariableId; 3]>,
    phi: Vec<VariableId>,
    unit: Option<UnitVariables>,
}

/// Grid exchange of one party with its direction binaries
#[derive(Clone, Debug, Default)]
struct ExchangeVariables {
    import: Vec<VariableId>,
    export: Vec<VariableId>,
    importing: Vec<VariableId>,
    exporting: Vec<VariableId>,
}

impl ExchangeVariables {
    /// Add one interval in which the party may import up to `import_cap` or export up to
    /// `export_cap`, but not both. Returns `(import, export)`.
    fn add_interval(
        &mut self,
        model: &mut LinearModel,
        label: &str,
        i: usize,
        import_cap: f64,
        export_cap: f64,
    ) -> (VariableId, VariableId) {
        let import = model.non_negative(format!("e_in_{label}_{i}"));
        let export = model.non_negative(format!("e_out_{label}_{i}"));
        let importing = model.binary(format!("importing_{label}_{i}"));
        let exporting = model.binary(format!("exporting_{label}_{i}"));

        model.less_or_equal(
            format!("import_cap_{label}_{i}"),
            LinearExpr::from(import) - import_cap * importing,
            0.,
        );
        model.less_or_equal(
            format!("export_cap_{label}_{i}"),
            LinearExpr::from(export) - export_cap * exporting,
            0.,
        );
        model.less_or_equal(
            format!("direction_{label}_{i}"),
            LinearExpr::from(importing) + exporting,
            1.,
        );

        self.import.push(import);
        self.export.push(export);
        self.importing.push(importing);
        self.exporting.push(exporting);
        (import, export)
    }

    fn exchange(&self, assignment: &Assignment) -> GridExchange {
        GridExchange {
            import: self.import.iter().map(|&v| assignment[v]).collect(),
            export: self.export.iter().map(|&v| assignment[v]).collect(),
        }
    }
}

#[derive(Clone, Debug)]
struct TankVariables {
    /// tank temperature at each interval boundary
    temperature: Vec<VariableId>,
    /// compressor status at the start of the day, then during each interval
    status: Vec<VariableId>,
    switch_on: Vec<VariableId>,
    switch_off: Vec<VariableId>,
    q_max: Vec<f64>,
    consumption: Vec<VariableId>,
}

#[derive(Clone, Debug)]
enum CentralVariables {
    /// the unit follows the summed load directly
    Direct(UnitVariables),
    /// a heating day of a unit charging a buffer tank
    Storage(TankVariables),
}

/// The day's program together with the handles needed to read a schedule back out of a solver
/// assignment.
#[derive(Clone, Debug)]
pub struct DayModel {
    day: u32,
    intervals: Range<usize>,
    model: LinearModel,
    users: Vec<UserVariables>,
    prosumers: Vec<(String, ExchangeVariables)>,
    virtual_exchange: ExchangeVariables,
    central: Option<CentralVariables>,
    /// tank state handed over unchanged on days the tank is not modelled
    carried_tank: Option<TankState>,
}

impl DayModel {
    /// Build the program for one day
    ///
    /// Arguments:
    /// * `corpus` - the community
    /// * `window` - the day and the intervals it spans
    /// * `boundary` - node temperatures and tank state at the start of the day
    pub fn build(
        corpus: &Corpus,
        window: &DayWindow,
        boundary: &BoundaryState,
    ) -> Result<Self, DispatchError> {
        let conditions = &corpus.external_conditions;
        let dt_h = corpus.step.hours();
        let modes: Vec<Option<OperatingMode>> = window
            .intervals
            .clone()
            .map(|idx| corpus.control.mode_for_month(conditions.month(idx)))
            .collect();

        let mut model = LinearModel::new();
        let mut users: Vec<UserVariables> = corpus
            .users
            .iter()
            .map(|user| {
                let start = boundary.zones.get(user.name()).copied().unwrap_or_else(|| {
                    ThermalState::uniform(corpus.optimizer.start_temperature())
                });
                add_thermal_dynamics(&mut model, corpus, user, window, &modes, &start)
            })
            .collect();

        let mut central = None;
        let mut carried_tank = boundary.tank;
        match &corpus.community {
            Community::RenewableEnergyCommunity => {
                let t_ref = corpus.optimizer.reference_indoor_temperature();
                for (user, variables) in corpus.users.iter().zip(users.iter_mut()) {
                    let Some(heat_pump) = &user.heat_pump else {
                        continue;
                    };
                    let mut unit = UnitVariables::default();
                    for (i, idx) in window.intervals.clone().enumerate() {
                        let limits = UnitLimits::autonomous(
                            heat_pump,
                            modes[i],
                            conditions.air_temperature(idx),
                            t_ref,
                            conditions.relative_humidity(idx),
                        )?;
                        let delivered = unit.add_interval(
                            &mut model,
                            user.name(),
                            i,
                            &limits,
                            dt_h,
                            user.contract_power * dt_h,
                        );
                        let sign = limits.mode.map_or(1., |mode| mode.sign());
                        model.equal(
                            format!("phi_balance_{}_{i}", user.name()),
                            LinearExpr::from(variables.phi[i]) - delivered * sign,
                            0.,
                        );
                    }
                    variables.unit = Some(unit);
                }
            }
            Community::CollectiveSelfConsumption {
                heat_pump,
                contract_power,
            } => {
                let contract_energy = contract_power * dt_h;
                let storage_day = heat_pump.has_thermal_storage()
                    && modes.first() == Some(&Some(OperatingMode::Heating));

                central = Some(if storage_day {
                    let tank = boundary
                        .tank
                        .unwrap_or_else(|| TankState {
                            temperature: heat_pump.auxiliaries().t_cut_off(),
                            compressor_on: false,
                        });
                    carried_tank = None;
                    CentralVariables::Storage(add_storage_tank(
                        &mut model,
                        corpus,
                        heat_pump,
                        window,
                        &users,
                        &tank,
                        contract_energy,
                    )?)
                } else {
                    let t_supply = heat_pump.auxiliaries().t_cut_off();
                    let mut unit = UnitVariables::default();
                    for (i, idx) in window.intervals.clone().enumerate() {
                        let limits = UnitLimits::centralized(
                            heat_pump,
                            modes[i],
                            conditions.air_temperature(idx),
                            t_supply,
                            conditions.relative_humidity(idx),
                        )?;
                        let delivered = unit.add_interval(
                            &mut model,
                            "central",
                            i,
                            &limits,
                            dt_h,
                            contract_energy,
                        );
                        let sign = limits.mode.map_or(1., |mode| mode.sign());
                        let loads: LinearExpr =
                            users.iter().map(|user| LinearExpr::from(user.phi[i])).sum();
                        model.equal(
                            format!("phi_balance_central_{i}"),
                            loads - delivered * sign,
                            0.,
                        );
                    }
                    CentralVariables::Direct(unit)
                });
            }
        }

        let (prosumers, virtual_exchange) =
            add_energy_balances(&mut model, corpus, window, &users, central.as_ref());

        let mut day = Self {
            day: window.day,
            intervals: window.intervals.clone(),
            model,
            users,
            prosumers,
            virtual_exchange,
            central,
            carried_tank,
        };
        day.set_objective(corpus);
        Ok(day)
    }

    pub fn model(&self) -> &LinearModel {
        &self.model
    }

    pub fn day(&self) -> u32 {
        self.day
    }

    fn consumption_variables(&self) -> Vec<VariableId> {
        let mut consumption = vec![];
        for unit in self.users.iter().filter_map(|user| user.unit.as_ref()) {
            consumption.extend(&unit.consumption);
        }
        match &self.central {
            Some(CentralVariables::Direct(unit)) => consumption.extend(&unit.consumption),
            Some(CentralVariables::Storage(tank)) => consumption.extend(&tank.consumption),
            None => {}
        }
        consumption
    }

    /// Cost of the day in EUR: purchases of the prosumers and the heat pumps less feed-in
    /// revenue and the incentive on energy shared within the community
    fn set_objective(&mut self, corpus: &Corpus) {
        let tariffs = &corpus.tariffs;
        let per_kwh = |price: f64| price / WATTS_PER_KILOWATT as f64;
        let mut objective = LinearExpr::default();

        for (_, exchange) in &self.prosumers {
            for (&import, &export) in exchange.import.iter().zip(&exchange.export) {
                objective += per_kwh(tariffs.purchase_price) * import;
                objective += per_kwh(-tariffs.feed_in_tariff - tariffs.incentive) * export;
            }
        }
        for consumption in self.consumption_variables() {
            objective += per_kwh(tariffs.purchase_price) * consumption;
        }
        for &export in &self.virtual_exchange.export {
            objective += per_kwh(tariffs.incentive) * export;
        }
        self.model.minimise(objective);
    }

    /// Read the day's schedule out of a solver assignment
    pub fn schedule(&self, assignment: &Assignment) -> DaySchedule {
        let users: IndexMap<String, UserSchedule> = self
            .users
            .iter()
            .map(|user| {
                let schedule = UserSchedule {
                    phi_hc: user.phi.iter().map(|&phi| assignment[phi]).collect(),
                    states: user
                        .states
                        .iter()
                        .map(|nodes| ThermalState::from_array(nodes.map(|v| assignment[v])))
                        .collect(),
                    unit: user.unit.as_ref().map(|unit| unit.schedule(assignment)),
                };
                (user.name.clone(), schedule)
            })
            .collect();

        let central = self.central.as_ref().map(|central| match central {
            CentralVariables::Direct(unit) => CentralSchedule {
                unit: unit.schedule(assignment),
                tank: None,
            },
            CentralVariables::Storage(tank) => {
                let on: Vec<bool> = tank.status[1..]
                    .iter()
                    .map(|&status| assignment.is_set(status))
                    .collect();
                CentralSchedule {
                    unit: UnitSchedule {
                        thermal_output: on
                            .iter()
                            .zip(&tank.q_max)
                            .map(|(&on, &q_max)| if on { q_max } else { 0. })
                            .collect(),
                        backup: vec![0.; on.len()],
                        consumption: tank.consumption.iter().map(|&ee| assignment[ee]).collect(),
                        on,
                    },
                    tank: Some(
                        tank.temperature
                            .iter()
                            .zip(&tank.status)
                            .map(|(&temperature, &status)| TankState {
                                temperature: assignment[temperature],
                                compressor_on: assignment.is_set(status),
                            })
                            .collect(),
                    ),
                }
            }
        });

        let boundary = BoundaryState {
            zones: users
                .iter()
                .filter_map(|(name, user)| Some((name.clone(), *user.states.last()?)))
                .collect(),
            tank: match &central {
                Some(CentralSchedule {
                    tank: Some(tank), ..
                }) => tank.last().copied(),
                _ => self.carried_tank,
            },
        };

        DaySchedule {
            day: self.day,
            intervals: self.intervals.clone(),
            users,
            prosumers: self
                .prosumers
                .iter()
                .map(|(name, exchange)| (name.clone(), exchange.exchange(assignment)))
                .collect(),
            virtual_exchange: self.virtual_exchange.exchange(assignment),
            central,
            objective: self.model.objective().evaluate(assignment),
            boundary,
        }
    }
}

/// Node temperature variables and the recurrence linking them, for one dwelling
///
/// Comfort bounds on the air temperature hold at the end of every interval in a comfort hour in
/// which a unit may run.
fn add_thermal_dynamics(
    model: &mut LinearModel,
    corpus: &Corpus,
    user: &User,
    window: &DayWindow,
    modes: &[Option<OperatingMode>],
    start: &ThermalState,
) -> UserVariables {
    let name = user.name();
    let conditions = &corpus.external_conditions;
    let settings = &corpus.optimizer;

    let states: Vec<[VariableId; 3]> = (0..=window.intervals.len())
        .map(|k| NODE_NAMES.map(|node| model.free(format!("{node}_{name}_{k}"))))
        .collect();
    for ((node, &variable), temperature) in NODE_NAMES.iter().zip(&states[0]).zip(start.to_array())
    {
        model.equal(format!("initial_{node}_{name}"), variable, temperature);
    }

    let mut phi = Vec::with_capacity(window.intervals.len());
    for (i, idx) in window.intervals.clone().enumerate() {
        let (lower, upper) = match modes[i] {
            Some(OperatingMode::Heating) => (Some(0.), None),
            Some(OperatingMode::Cooling) => (None, Some(0.)),
            None => (Some(0.), Some(0.)),
        };
        let phi_hc = model.continuous(format!("phi_{name}_{i}"), lower, upper);

        let rows = user
            .zone
            .model()
            .transition_rows(&user.zone.forcing(idx, conditions));
        for (node, row) in rows.iter().enumerate() {
            let mut lhs = LinearExpr::from(states[i + 1][node]);
            for (previous, coefficient) in states[i].iter().zip(row.state) {
                lhs.add_term(*previous, -coefficient);
            }
            lhs.add_term(phi_hc, -row.hvac);
            model.equal(
                format!("dynamics_{}_{name}_{i}", NODE_NAMES[node]),
                lhs,
                row.constant,
            );
        }

        if modes[i].is_some() && settings.comfort_hours.contains(&conditions.hour(idx)) {
            let t_air = states[i + 1][NODE_AIR];
            model.greater_or_equal(format!("comfort_min_{name}_{i}"), t_air, settings.t_min);
            model.less_or_equal(format!("comfort_max_{name}_{i}"), t_air, settings.t_max);
        }
        phi.push(phi_hc);
    }

    UserVariables {
        name: name.to_string(),
        states,
        phi,
        unit: None,
    }
}

/// Buffer tank of a centralized unit on a heating day
///
/// The compressor may switch off only with the tank at or above cut-off and on only at or below
/// cut-in, and must do so once the tank is beyond either threshold. While on it runs at full
/// capacity; the tank absorbs the difference from the delivered load.
fn add_storage_tank(
    model: &mut LinearModel,
    corpus: &Corpus,
    heat_pump: &HeatPumpModel,
    window: &DayWindow,
    users: &[UserVariables],
    start: &TankState,
    contract_energy: f64,
) -> Result<TankVariables, CorrelationRangeError> {
    let conditions = &corpus.external_conditions;
    let dt_h = corpus.step.hours();
    let auxiliaries = heat_pump.auxiliaries();
    let (t_low, t_high) = auxiliaries.tank_temperature_range();
    let big_m = t_high - t_low;
    let t_cut_in = auxiliaries.t_cut_in();
    let t_cut_off = auxiliaries.t_cut_off();
    let kelvin_per_watt = corpus.step.seconds() / auxiliaries.tank_heat_capacity();
    let n = window.intervals.len();

    let temperature: Vec<VariableId> = (0..=n)
        .map(|k| model.continuous(format!("t_tank_{k}"), Some(t_low), Some(t_high)))
        .collect();
    let status: Vec<VariableId> = (0..=n)
        .map(|k| model.binary(format!("status_{k}")))
        .collect();
    model.equal("initial_t_tank", temperature[0], start.temperature);
    model.equal(
        "initial_status",
        status[0],
        if start.compressor_on { 1. } else { 0. },
    );

    let mut tank = TankVariables {
        temperature,
        status,
        switch_on: Vec::with_capacity(n),
        switch_off: Vec::with_capacity(n),
        q_max: Vec::with_capacity(n),
        consumption: Vec::with_capacity(n),
    };

    for (i, idx) in window.intervals.clone().enumerate() {
        let t = tank.temperature[i];
        let status = tank.status[i];
        let switch_on = model.binary(format!("switch_on_{i}"));
        let switch_off = model.binary(format!("switch_off_{i}"));

        model.less_or_equal(
            format!("switch_off_when_on_{i}"),
            LinearExpr::from(switch_off) - status,
            0.,
        );
        model.less_or_equal(
            format!("switch_on_when_off_{i}"),
            LinearExpr::from(switch_on) + status,
            1.,
        );
        model.greater_or_equal(
            format!("switch_off_above_cut_off_{i}"),
            LinearExpr::from(t) - big_m * switch_off,
            t_cut_off - big_m,
        );
        model.less_or_equal(
            format!("switch_on_below_cut_in_{i}"),
            LinearExpr::from(t) + big_m * switch_on,
            t_cut_in + big_m,
        );
        model.less_or_equal(
            format!("forced_off_{i}"),
            LinearExpr::from(t) - big_m * switch_off + big_m * status,
            t_cut_off + big_m,
        );
        model.less_or_equal(
            format!("forced_on_{i}"),
            -LinearExpr::from(t) - big_m * switch_on - big_m * status,
            -t_cut_in,
        );
        model.equal(
            format!("status_{i}_next"),
            LinearExpr::from(tank.status[i + 1]) - status - switch_on + switch_off,
            0.,
        );

        let performance = heat_pump.water_loop_performance(
            conditions.air_temperature(idx),
            t_cut_off,
            conditions.relative_humidity(idx),
            OperatingMode::Heating,
        )?;
        let delivered: LinearExpr = users
            .iter()
            .map(|user| LinearExpr::from(user.phi[i]))
            .sum();
        model.equal(
            format!("tank_energy_{i}"),
            LinearExpr::from(tank.temperature[i + 1]) - t
                - (kelvin_per_watt * performance.q_max) * tank.status[i + 1]
                + delivered * kelvin_per_watt,
            0.,
        );

        let consumption = model.non_negative(format!("ee_central_{i}"));
        model.equal(
            format!("consumption_central_{i}"),
            LinearExpr::from(consumption)
                - (dt_h
                    * (auxiliaries.fan_electrical_power() + performance.q_max / performance.eta))
                    * tank.status[i + 1],
            dt_h * auxiliaries.pump_electrical_power(),
        );
        model.less_or_equal(format!("contract_central_{i}"), consumption, contract_energy);

        tank.switch_on.push(switch_on);
        tank.switch_off.push(switch_off);
        tank.q_max.push(performance.q_max);
        tank.consumption.push(consumption);
    }

    Ok(tank)
}

/// Import/export balances of the prosumers and of the community as a whole
///
/// A prosumer's import less export plus its PV generation meets its base load. The community's
/// virtual import less virtual export covers the prosumers' net import plus the heat pumps'
/// consumption.
fn add_energy_balances(
    model: &mut LinearModel,
    corpus: &Corpus,
    window: &DayWindow,
    users: &[UserVariables],
    central: Option<&CentralVariables>,
) -> (Vec<(String, ExchangeVariables)>, ExchangeVariables) {
    let conditions = &corpus.external_conditions;
    let dt_h = corpus.step.hours();
    let prosumers: Vec<&User> = corpus.users.iter().filter(|user| user.prosumer).collect();

    let consumers_contract: f64 = match &corpus.community {
        Community::RenewableEnergyCommunity => corpus
            .users
            .iter()
            .filter(|user| user.heat_pump.is_some())
            .map(|user| user.contract_power)
            .sum(),
        Community::CollectiveSelfConsumption { contract_power, .. } => *contract_power,
    };
    let community_contract: f64 =
        prosumers.iter().map(|user| user.contract_power).sum::<f64>() + consumers_contract;

    let mut exchanges: Vec<(String, ExchangeVariables)> = prosumers
        .iter()
        .map(|user| (user.name().to_string(), ExchangeVariables::default()))
        .collect();
    let mut virtual_exchange = ExchangeVariables::default();

    for (i, idx) in window.intervals.clone().enumerate() {
        let mut net_import = LinearExpr::default();
        let mut generation = 0.;

        for (user, (name, exchange)) in prosumers.iter().zip(exchanges.iter_mut()) {
            let pv = conditions.pv_generation(name, idx);
            let contract_energy = user.contract_power * dt_h;
            let (import, export) =
                exchange.add_interval(model, name, i, contract_energy, contract_energy.max(pv));
            model.equal(
                format!("prosumer_balance_{name}_{i}"),
                LinearExpr::from(import) - export,
                user.base_load * dt_h - pv,
            );
            net_import += LinearExpr::from(import) - export;
            generation += pv;
        }

        let mut consumption = LinearExpr::default();
        for unit in users.iter().filter_map(|user| user.unit.as_ref()) {
            consumption += unit.consumption[i];
        }
        match central {
            Some(CentralVariables::Direct(unit)) => consumption += unit.consumption[i],
            Some(CentralVariables::Storage(tank)) => consumption += tank.consumption[i],
            None => {}
        }

        let cap = community_contract * dt_h + generation;
        let (import, export) = virtual_exchange.add_interval(model, "community", i, cap, cap);
        model.equal(
            format!("virtual_balance_{i}"),
            LinearExpr::from(import) - export - net_import - consumption,
            0.,
        );
    }

    (exchanges, virtual_exchange)
}
