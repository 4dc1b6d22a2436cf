use crate::input::Seasons;
use strum::Display;

/// Which of a heat pump's two parameter sets is in use.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum OperatingMode {
    Heating,
    Cooling,
}

impl OperatingMode {
    /// Sign of the thermal output delivered to the indoor air node in this mode
    pub fn sign(&self) -> f64 {
        match self {
            OperatingMode::Heating => 1.,
            OperatingMode::Cooling => -1.,
        }
    }
}

/// Decides when heating and cooling are allowed to run, from the configured seasons and daily
/// schedules. Cooling months take precedence: a month listed in both seasons is a cooling month.
#[derive(Clone, Debug, PartialEq)]
pub struct SeasonControl {
    heating_months: Vec<u32>,
    cooling_months: Vec<u32>,
    heating_hours: Vec<u32>,
    cooling_hours: Vec<u32>,
}

impl SeasonControl {
    pub fn new(seasons: &Seasons) -> Self {
        Self {
            heating_months: seasons
                .heating_months
                .iter()
                .copied()
                .filter(|month| !seasons.cooling_months.contains(month))
                .collect(),
            cooling_months: seasons.cooling_months.clone(),
            heating_hours: seasons.heating_hours.clone(),
            cooling_hours: seasons.cooling_hours.clone(),
        }
    }

    pub fn is_heating_month(&self, month: u32) -> bool {
        self.heating_months.contains(&month)
    }

    pub fn is_cooling_month(&self, month: u32) -> bool {
        self.cooling_months.contains(&month)
    }

    pub fn heating_allowed(&self, month: u32, hour: u32) -> bool {
        self.is_heating_month(month) && self.heating_hours.contains(&hour)
    }

    pub fn cooling_allowed(&self, month: u32, hour: u32) -> bool {
        self.is_cooling_month(month) && self.cooling_hours.contains(&hour)
    }

    /// Mode a unit runs in to meet a thermal demand, or None if the unit stays idle
    ///
    /// Arguments:
    /// * `month` - calendar month, 1-12
    /// * `hour` - hour of day
    /// * `demand` - thermal load, in W (positive heating, negative cooling)
    pub fn mode_for_demand(&self, month: u32, hour: u32, demand: f64) -> Option<OperatingMode> {
        if demand < 0. && self.cooling_allowed(month, hour) {
            Some(OperatingMode::Cooling)
        } else if demand > 0. && self.heating_allowed(month, hour) {
            Some(OperatingMode::Heating)
        } else {
            None
        }
    }

    /// Seasonal mode for a month regardless of demand, used where the mode must be fixed before
    /// the demand is known
    pub fn mode_for_month(&self, month: u32) -> Option<OperatingMode> {
        if self.is_cooling_month(month) {
            Some(OperatingMode::Cooling)
        } else if self.is_heating_month(month) {
            Some(OperatingMode::Heating)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::*;

    #[fixture]
    fn control() -> SeasonControl {
        SeasonControl::new(&Seasons {
            heating_months: vec![1, 2, 3, 5, 11, 12],
            cooling_months: vec![5, 6, 7, 8, 9],
            heating_hours: vec![0, 7, 8, 18, 19, 20, 21, 22, 23],
            cooling_hours: (0..24).collect(),
        })
    }

    #[rstest]
    fn test_cooling_months_take_precedence(control: SeasonControl) {
        assert!(!control.is_heating_month(5));
        assert!(control.is_cooling_month(5));
        assert!(control.is_heating_month(1));
    }

    #[rstest]
    #[case(1, 7, 500., Some(OperatingMode::Heating))]
    #[case(1, 12, 500., None)]
    #[case(1, 7, -500., None)]
    #[case(7, 12, -500., Some(OperatingMode::Cooling))]
    #[case(7, 12, 500., None)]
    #[case(4, 7, 500., None)]
    #[case(1, 7, 0., None)]
    fn test_mode_for_demand(
        control: SeasonControl,
        #[case] month: u32,
        #[case] hour: u32,
        #[case] demand: f64,
        #[case] expected: Option<OperatingMode>,
    ) {
        assert_eq!(control.mode_for_demand(month, hour, demand), expected);
    }

    #[rstest]
    fn test_mode_for_month(control: SeasonControl) {
        assert_eq!(control.mode_for_month(2), Some(OperatingMode::Heating));
        assert_eq!(control.mode_for_month(6), Some(OperatingMode::Cooling));
        assert_eq!(control.mode_for_month(10), None);
    }

    #[rstest]
    fn test_sign() {
        assert_eq!(OperatingMode::Heating.sign(), 1.);
        assert_eq!(OperatingMode::Cooling.sign(), -1.);
    }
}
