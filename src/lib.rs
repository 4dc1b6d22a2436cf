#![allow(clippy::too_many_arguments)]

pub mod core;
pub mod corpus;
pub mod dispatch;
pub mod errors;
pub mod external_conditions;
pub mod input;
pub mod output;
pub mod read_weather_file;
pub mod simulation_time;

pub use crate::corpus::{Corpus, SimulationResults};
pub use crate::dispatch::{DayAheadOptimizer, DispatchOutcome};
pub use crate::errors::HvacSimError;
use crate::corpus::Community;
use crate::dispatch::solvers::GoodLpSolver;
use crate::input::ingest;
use crate::output::Output;
use crate::read_weather_file::conditions_from_csv;
use csv::WriterBuilder;
use std::borrow::Cow;
use std::io::Read;
use tracing::{info, warn};

/// What a run produced: the forward simulation of every dwelling or the day-by-day dispatch.
#[derive(Debug)]
pub enum RunResults {
    Simulation(SimulationResults),
    Dispatch(DispatchOutcome),
}

impl RunResults {
    /// Whether every dwelling (or every day) could be completed
    pub fn is_complete(&self) -> bool {
        match self {
            RunResults::Simulation(results) => results.failures.is_empty(),
            RunResults::Dispatch(outcome) => outcome.is_complete(),
        }
    }
}

pub const DISPATCH_OUTPUT_KEY: &str = "dispatch";
pub const DISPATCH_DAYS_OUTPUT_KEY: &str = "dispatch_days";
pub const CENTRALIZED_OUTPUT_KEY: &str = "centralized";

/// Build the community from its JSON configuration and the per-interval weather file, then
/// either simulate it under the deadband thermostat or optimize it day by day.
///
/// Partial results are written out and returned even when some dwellings or days fail; the
/// failures are carried in the returned results.
pub fn run_project(
    input: impl Read,
    weather: impl Read,
    output: impl Output,
    optimize: bool,
) -> Result<RunResults, anyhow::Error> {
    let input = ingest(input)?;
    let external_conditions = conditions_from_csv(weather)?;
    let corpus = Corpus::from_inputs(&input, external_conditions)?;

    if optimize {
        let solver = GoodLpSolver::new(&input.optimizer);
        let outcome = DayAheadOptimizer::new(&corpus, solver).run();
        if let Some(failure) = &outcome.failure {
            warn!(day = failure.day, error = %failure.error, "dispatch ended early");
        }
        if !output.is_noop() {
            write_dispatch_output_files(&output, &corpus, &outcome)?;
        }
        info!(days = outcome.days.len(), "finished day-ahead dispatch");
        Ok(RunResults::Dispatch(outcome))
    } else {
        let results = corpus.run();
        for (user, error) in &results.failures {
            warn!(user = user.as_str(), %error, "dwelling left out of the results");
        }
        if !output.is_noop() {
            write_simulation_output_files(&output, &corpus, &results)?;
        }
        info!(users = results.users.len(), "finished simulation");
        Ok(RunResults::Simulation(results))
    }
}

fn bool_cell(value: bool) -> String {
    u8::from(value).to_string()
}

fn write_simulation_output_files(
    output: &impl Output,
    corpus: &Corpus,
    results: &SimulationResults,
) -> anyhow::Result<()> {
    let conditions = corpus.external_conditions();

    for (user, simulation) in &results.users {
        info!("writing out to {user}");
        let writer = output.writer_for_location_key(user)?;
        let mut writer = WriterBuilder::new().flexible(true).from_writer(writer);

        writer.write_record([
            "Timestep",
            "month",
            "day",
            "hour",
            "thermal load",
            "indoor temperature",
            "surface temperature",
            "mass temperature",
            "heating consumption",
            "cooling consumption",
        ])?;
        writer.write_record([
            "[count]", "[month]", "[day]", "[hour]", "[W]", "[deg C]", "[deg C]", "[deg C]",
            "[Wh]", "[Wh]",
        ])?;

        for (t_idx, phi_hc) in simulation.trajectory.phi_hc.iter().enumerate() {
            let interval = conditions.interval(t_idx);
            let state = simulation.trajectory.state_before(t_idx + 1);
            let (heating, cooling) = match &simulation.consumption {
                Some(consumption) => (
                    consumption.heating[t_idx].to_string(),
                    consumption.cooling[t_idx].to_string(),
                ),
                None => (String::new(), String::new()),
            };
            writer.write_record([
                t_idx.to_string(),
                interval.month.to_string(),
                interval.day.to_string(),
                interval.hour.to_string(),
                phi_hc.to_string(),
                state.t_air.to_string(),
                state.t_surface.to_string(),
                state.t_mass.to_string(),
                heating,
                cooling,
            ])?;
        }
        writer.flush()?;
    }

    if let Some(centralized) = &results.centralized {
        info!("writing out to {CENTRALIZED_OUTPUT_KEY}");
        let writer = output.writer_for_location_key(CENTRALIZED_OUTPUT_KEY)?;
        let mut writer = WriterBuilder::new().flexible(true).from_writer(writer);

        writer.write_record([
            "Timestep",
            "thermal load",
            "consumption",
            "tank temperature",
            "compressor on",
        ])?;
        writer.write_record(["[count]", "[W]", "[Wh]", "[deg C]", "[bool]"])?;
        for (t_idx, load) in centralized.load.iter().enumerate() {
            let tank = &centralized.tank[t_idx];
            writer.write_record([
                t_idx.to_string(),
                load.to_string(),
                centralized.consumption[t_idx].to_string(),
                tank.temperature.to_string(),
                bool_cell(tank.compressor_on),
            ])?;
        }
        writer.flush()?;
    }

    Ok(())
}

fn write_dispatch_output_files(
    output: &impl Output,
    corpus: &Corpus,
    outcome: &DispatchOutcome,
) -> anyhow::Result<()> {
    let conditions = corpus.external_conditions();
    let has_central = matches!(
        corpus.community(),
        Community::CollectiveSelfConsumption { .. }
    );
    let prosumers: Vec<&str> = corpus
        .users()
        .iter()
        .filter(|user| user.is_prosumer())
        .map(|user| user.name())
        .collect();

    info!("writing out to {DISPATCH_OUTPUT_KEY}");
    let writer = output.writer_for_location_key(DISPATCH_OUTPUT_KEY)?;
    let mut writer = WriterBuilder::new().flexible(true).from_writer(writer);

    let mut headings: Vec<Cow<'static, str>> =
        vec!["Timestep".into(), "day".into(), "hour".into()];
    let mut units_row = vec!["[count]", "[day]", "[hour]"];
    for user in corpus.users() {
        let name = user.name();
        headings.push(format!("{name} thermal load").into());
        units_row.push("[W]");
        headings.push(format!("{name} indoor temperature").into());
        units_row.push("[deg C]");
        if user.heat_pump().is_some() {
            headings.push(format!("{name} heat pump on").into());
            units_row.push("[bool]");
            headings.push(format!("{name} consumption").into());
            units_row.push("[Wh]");
        }
    }
    for name in &prosumers {
        headings.push(format!("{name} import").into());
        units_row.push("[Wh]");
        headings.push(format!("{name} export").into());
        units_row.push("[Wh]");
    }
    headings.push("virtual import".into());
    units_row.push("[Wh]");
    headings.push("virtual export".into());
    units_row.push("[Wh]");
    if has_central {
        headings.push("central heat pump on".into());
        units_row.push("[bool]");
        headings.push("central consumption".into());
        units_row.push("[Wh]");
        headings.push("tank temperature".into());
        units_row.push("[deg C]");
    }

    writer.write_record(headings.iter().map(|heading| heading.as_ref()))?;
    writer.write_record(&units_row)?;

    for schedule in &outcome.days {
        for (i, t_idx) in schedule.intervals.clone().enumerate() {
            let interval = conditions.interval(t_idx);
            let mut row: Vec<String> = vec![
                t_idx.to_string(),
                interval.day.to_string(),
                interval.hour.to_string(),
            ];

            for user in corpus.users() {
                let planned = &schedule.users[user.name()];
                row.push(planned.phi_hc[i].to_string());
                row.push(planned.states[i + 1].t_air.to_string());
                if user.heat_pump().is_some() {
                    match &planned.unit {
                        Some(unit) => {
                            row.push(bool_cell(unit.on[i]));
                            row.push(unit.consumption[i].to_string());
                        }
                        None => row.extend([String::new(), String::new()]),
                    }
                }
            }
            for name in &prosumers {
                let exchange = &schedule.prosumers[*name];
                row.push(exchange.import[i].to_string());
                row.push(exchange.export[i].to_string());
            }
            row.push(schedule.virtual_exchange.import[i].to_string());
            row.push(schedule.virtual_exchange.export[i].to_string());
            if has_central {
                match &schedule.central {
                    Some(central) => {
                        row.push(bool_cell(central.unit.on[i]));
                        row.push(central.unit.consumption[i].to_string());
                        row.push(
                            central
                                .tank
                                .as_ref()
                                .map(|tank| tank[i + 1].temperature.to_string())
                                .unwrap_or_default(),
                        );
                    }
                    None => row.extend([String::new(), String::new(), String::new()]),
                }
            }

            writer.write_record(&row)?;
        }
    }
    writer.flush()?;

    info!("writing out to {DISPATCH_DAYS_OUTPUT_KEY}");
    let writer = output.writer_for_location_key(DISPATCH_DAYS_OUTPUT_KEY)?;
    let mut writer = WriterBuilder::new().from_writer(writer);
    writer.write_record(["day", "objective", "status"])?;
    for schedule in &outcome.days {
        writer.write_record([
            schedule.day.to_string(),
            schedule.objective.to_string(),
            "optimal".to_string(),
        ])?;
    }
    if let Some(failure) = &outcome.failure {
        writer.write_record([failure.day.to_string(), String::new(), failure.error.to_string()])?;
    }
    writer.flush()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::tests::renewable_energy_community_json;
    use crate::external_conditions::Orientation;
    use crate::output::{MemoryOutput, SinkOutput};
    use pretty_assertions::assert_eq;
    use rstest::*;
    use strum::IntoEnumIterator;

    fn weather_csv(days: u32, t_ext: f64, pv: f64) -> String {
        let mut columns: Vec<String> = ["month", "day", "hour", "temp_air", "relative_humidity"]
            .into_iter()
            .map(String::from)
            .collect();
        for prefix in ["wall_", "roof_"] {
            columns.extend(Orientation::iter().map(|orientation| format!("{prefix}{orientation}")));
        }
        columns.push("pv_flat_2".to_string());

        let mut lines = vec![columns.join(",")];
        for day in 1..=days {
            for hour in 0..24 {
                let mut fields = vec![
                    "1".to_string(),
                    day.to_string(),
                    hour.to_string(),
                    t_ext.to_string(),
                    "70".to_string(),
                ];
                fields.extend((0..16).map(|_| "0".to_string()));
                fields.push(pv.to_string());
                lines.push(fields.join(","));
            }
        }
        lines.join("\n")
    }

    fn input_json() -> String {
        renewable_energy_community_json().to_string()
    }

    #[rstest]
    fn test_run_project_simulation_writes_one_file_per_user() {
        let output = MemoryOutput::default();
        let results = run_project(
            input_json().as_bytes(),
            weather_csv(1, 5., 0.).as_bytes(),
            output.clone(),
            false,
        )
        .unwrap();

        assert!(results.is_complete());
        assert_eq!(output.keys(), vec!["flat_1", "flat_2"]);
        let contents = output.contents("flat_1").unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        // headings, units and one row per interval
        assert_eq!(lines.len(), 26);
        assert!(lines[0].starts_with("Timestep,month,day,hour,thermal load"));
        assert!(lines[2].starts_with("0,1,1,0,"));
    }

    #[rstest]
    fn test_run_project_dispatch_writes_schedule_and_days() {
        let output = MemoryOutput::default();
        let results = run_project(
            input_json().as_bytes(),
            weather_csv(2, 8., 100.).as_bytes(),
            output.clone(),
            true,
        )
        .unwrap();

        let RunResults::Dispatch(outcome) = results else {
            panic!("expected a dispatch outcome");
        };
        assert!(outcome.is_complete());
        assert_eq!(output.keys(), vec![DISPATCH_OUTPUT_KEY, DISPATCH_DAYS_OUTPUT_KEY]);

        let schedule = output.contents(DISPATCH_OUTPUT_KEY).unwrap();
        let headings = schedule.lines().next().unwrap();
        assert!(headings.contains("flat_2 import"));
        assert!(!headings.contains("flat_1 import"));
        assert!(!headings.contains("tank temperature"));
        assert_eq!(schedule.lines().count(), 2 + 48);

        let days = output.contents(DISPATCH_DAYS_OUTPUT_KEY).unwrap();
        assert_eq!(days.lines().count(), 3);
    }

    #[rstest]
    fn test_run_project_reports_unreadable_weather() {
        let result = run_project(
            input_json().as_bytes(),
            "month,day\n1,1".as_bytes(),
            SinkOutput,
            false,
        );
        assert!(result.is_err());
    }
}
