use crate::core::units::{HOURS_PER_DAY, SECONDS_PER_HOUR};
use serde::Deserialize;

/// Length of one simulation interval. Only hourly and quarter-hourly steps are supported by the
/// thermal model.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
pub enum SimulationStep {
    #[default]
    #[serde(rename = "1H")]
    Hourly,
    #[serde(rename = "15Min")]
    QuarterHourly,
}

impl SimulationStep {
    /// Interval length in seconds (the `tau` of the state-space model)
    pub fn seconds(&self) -> f64 {
        match self {
            SimulationStep::Hourly => SECONDS_PER_HOUR as f64,
            SimulationStep::QuarterHourly => SECONDS_PER_HOUR as f64 / 4.,
        }
    }

    /// Interval length in hours, used to turn power into energy
    pub fn hours(&self) -> f64 {
        self.seconds() / SECONDS_PER_HOUR as f64
    }

    pub fn intervals_per_day(&self) -> usize {
        (HOURS_PER_DAY as f64 / self.hours()).round() as usize
    }
}
