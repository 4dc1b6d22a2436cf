use anyhow::bail;
use indexmap::IndexMap;
use itertools::Itertools;
use std::ops::Range;
use strum::{Display, EnumIter, EnumString};

pub const ORIENTATION_COUNT: usize = 8;

/// Compass orientations used for per-orientation envelope areas and irradiance.
#[derive(Clone, Copy, Debug, Display, EnumIter, EnumString, PartialEq, Eq)]
pub enum Orientation {
    N,
    NE,
    E,
    SE,
    S,
    SW,
    W,
    NW,
}

pub type PerOrientation = [f64; ORIENTATION_COUNT];

/// Ambient conditions for a single simulation interval.
#[derive(Clone, Debug, PartialEq)]
pub struct IntervalConditions {
    /// calendar month, 1-12
    pub month: u32,
    /// calendar day identifier; consecutive intervals with the same value form one optimization day
    pub day: u32,
    /// hour of day, 0-23
    pub hour: u32,
    /// dry-bulb air temperature, in deg C
    pub air_temperature: f64,
    /// relative humidity, in %
    pub relative_humidity: f64,
    /// plane-of-array irradiance on vertical walls, in W/m2
    pub wall_irradiance: PerOrientation,
    /// plane-of-array irradiance on the tilted roof, in W/m2
    pub roof_irradiance: PerOrientation,
}

/// One optimization day: its identifier and the interval indices it spans.
#[derive(Clone, Debug, PartialEq)]
pub struct DayWindow {
    pub day: u32,
    pub intervals: Range<usize>,
}

/// Per-interval weather, calendar and on-site generation series shared by the simulator and
/// the dispatch optimizer.
#[derive(Clone, Debug, Default)]
pub struct ExternalConditions {
    intervals: Vec<IntervalConditions>,
    pv_generation: IndexMap<String, Vec<f64>>,
}

impl ExternalConditions {
    pub fn new(intervals: Vec<IntervalConditions>) -> Self {
        Self {
            intervals,
            pv_generation: Default::default(),
        }
    }

    /// Attach a photovoltaic generation series (energy per interval, in Wh) for a user.
    pub fn with_pv_generation(
        mut self,
        user: impl Into<String>,
        generation: Vec<f64>,
    ) -> anyhow::Result<Self> {
        let user = user.into();
        if generation.len() != self.intervals.len() {
            bail!(
                "PV generation series for '{user}' has {} values but there are {} intervals",
                generation.len(),
                self.intervals.len()
            );
        }
        self.pv_generation.insert(user, generation);
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    pub fn interval(&self, idx: usize) -> &IntervalConditions {
        &self.intervals[idx]
    }

    pub fn iter(&self) -> impl Iterator<Item = &IntervalConditions> {
        self.intervals.iter()
    }

    pub fn air_temperature(&self, idx: usize) -> f64 {
        self.intervals[idx].air_temperature
    }

    pub fn relative_humidity(&self, idx: usize) -> f64 {
        self.intervals[idx].relative_humidity
    }

    pub fn month(&self, idx: usize) -> u32 {
        self.intervals[idx].month
    }

    pub fn hour(&self, idx: usize) -> u32 {
        self.intervals[idx].hour
    }

    /// PV generation for a user, or zero generation if none was supplied.
    pub fn pv_generation(&self, user: &str, idx: usize) -> f64 {
        self.pv_generation
            .get(user)
            .map(|series| series[idx])
            .unwrap_or(0.)
    }

    pub fn has_pv_generation(&self, user: &str) -> bool {
        self.pv_generation.contains_key(user)
    }

    /// Split the series into calendar days, i.e. runs of consecutive intervals sharing a day
    /// identifier.
    pub fn days(&self) -> Vec<DayWindow> {
        let mut start = 0;
        let windows = self
            .intervals
            .iter()
            .chunk_by(|interval| interval.day)
            .into_iter()
            .map(|(day, chunk)| {
                let count = chunk.count();
                let window = DayWindow {
                    day,
                    intervals: start..start + count,
                };
                start += count;
                window
            })
            .collect();
        windows
    }
}
