use crate::external_conditions::{
    ExternalConditions, IntervalConditions, Orientation, PerOrientation, ORIENTATION_COUNT,
};
use anyhow::{anyhow, Context};
use csv::{ReaderBuilder as CsvReaderBuilder, StringRecord};
use indexmap::IndexMap;
use std::io::Read;
use strum::IntoEnumIterator;

const COLUMN_MONTH: &str = "month";
const COLUMN_DAY: &str = "day";
const COLUMN_HOUR: &str = "hour";
const COLUMN_AIR_TEMP: &str = "temp_air"; // dry bulb temp in degrees
const COLUMN_RELATIVE_HUMIDITY: &str = "relative_humidity"; // in %
const PREFIX_WALL_IRRADIANCE: &str = "wall_"; // plane-of-array on vertical walls, W/m2
const PREFIX_ROOF_IRRADIANCE: &str = "roof_"; // plane-of-array on the tilted roof, W/m2
const PREFIX_PV_GENERATION: &str = "pv_"; // energy per interval in Wh

struct Columns {
    month: usize,
    day: usize,
    hour: usize,
    air_temperature: usize,
    relative_humidity: usize,
    walls: [usize; ORIENTATION_COUNT],
    roof: [usize; ORIENTATION_COUNT],
    pv: IndexMap<String, usize>,
}

impl Columns {
    fn from_headers(headers: &StringRecord) -> anyhow::Result<Self> {
        let position = |name: &str| {
            headers
                .iter()
                .position(|header| header.trim() == name)
                .ok_or_else(|| anyhow!("Weather file is missing column '{name}'"))
        };
        let per_orientation = |prefix: &str| -> anyhow::Result<[usize; ORIENTATION_COUNT]> {
            let mut columns = [0; ORIENTATION_COUNT];
            for (idx, orientation) in Orientation::iter().enumerate() {
                columns[idx] = position(&format!("{prefix}{orientation}"))?;
            }
            Ok(columns)
        };

        Ok(Self {
            month: position(COLUMN_MONTH)?,
            day: position(COLUMN_DAY)?,
            hour: position(COLUMN_HOUR)?,
            air_temperature: position(COLUMN_AIR_TEMP)?,
            relative_humidity: position(COLUMN_RELATIVE_HUMIDITY)?,
            walls: per_orientation(PREFIX_WALL_IRRADIANCE)?,
            roof: per_orientation(PREFIX_ROOF_IRRADIANCE)?,
            pv: headers
                .iter()
                .enumerate()
                .filter_map(|(idx, header)| {
                    header
                        .trim()
                        .strip_prefix(PREFIX_PV_GENERATION)
                        .map(|user| (user.to_string(), idx))
                })
                .collect(),
        })
    }
}

fn field<T: std::str::FromStr>(record: &StringRecord, column: usize, row: usize) -> anyhow::Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    record
        .get(column)
        .ok_or_else(|| anyhow!("Row {row} of weather file has no column {column}"))?
        .trim()
        .parse()
        .with_context(|| format!("Could not parse column {column} of row {row} of weather file"))
}

/// Read the per-interval weather, calendar and PV series from a headed CSV with columns
/// `month, day, hour, temp_air, relative_humidity, wall_N..wall_NW, roof_N..roof_NW` and any
/// number of `pv_<user>` columns.
pub fn conditions_from_csv(file: impl Read) -> anyhow::Result<ExternalConditions> {
    let mut reader = CsvReaderBuilder::new().has_headers(true).from_reader(file);
    let columns = Columns::from_headers(reader.headers()?)?;

    let mut intervals = vec![];
    let mut pv_generation: IndexMap<String, Vec<f64>> =
        columns.pv.keys().map(|user| (user.clone(), vec![])).collect();

    for (row, result) in reader.records().enumerate() {
        let record = result?;
        let per_orientation = |indices: &[usize; ORIENTATION_COUNT]| -> anyhow::Result<PerOrientation> {
            let mut values = [0.; ORIENTATION_COUNT];
            for (value, &column) in values.iter_mut().zip(indices) {
                *value = field(&record, column, row)?;
            }
            Ok(values)
        };

        intervals.push(IntervalConditions {
            month: field(&record, columns.month, row)?,
            day: field(&record, columns.day, row)?,
            hour: field(&record, columns.hour, row)?,
            air_temperature: field(&record, columns.air_temperature, row)?,
            relative_humidity: field(&record, columns.relative_humidity, row)?,
            wall_irradiance: per_orientation(&columns.walls)?,
            roof_irradiance: per_orientation(&columns.roof)?,
        });
        for (user, &column) in &columns.pv {
            pv_generation[user].push(field(&record, column, row)?);
        }
    }

    pv_generation
        .into_iter()
        .try_fold(ExternalConditions::new(intervals), |conditions, (user, series)| {
            conditions.with_pv_generation(user, series)
        })
}
