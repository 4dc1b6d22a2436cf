pub const WATTS_PER_KILOWATT: u32 = 1_000;
pub const SECONDS_PER_HOUR: u32 = 3_600;
pub const HOURS_PER_DAY: u32 = 24;

/// Specific heat capacity of air, in J/(kg.K)
pub const SPECIFIC_HEAT_AIR: f64 = 1_000.;
/// Density of air, in kg/m3
pub const DENSITY_AIR: f64 = 1.2;
/// Specific heat capacity of water, in J/(kg.K)
pub const SPECIFIC_HEAT_WATER: f64 = 4_186.;
/// Density of water, in kg/m3
pub const DENSITY_WATER: f64 = 1_000.;

/// Convert an average power over an interval into energy, W -> Wh
pub fn power_to_energy(power_in_watts: f64, timestep_in_hours: f64) -> f64 {
    power_in_watts * timestep_in_hours
}

pub fn watt_hours_to_kilowatt_hours(energy: f64) -> f64 {
    energy / WATTS_PER_KILOWATT as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::*;

    #[rstest]
    #[case(1_000., 1., 1_000.)]
    #[case(1_000., 0.25, 250.)]
    #[case(-400., 0.5, -200.)]
    fn test_power_to_energy(#[case] power: f64, #[case] step: f64, #[case] expected: f64) {
        assert_relative_eq!(power_to_energy(power, step), expected);
    }

    #[rstest]
    fn test_watt_hours_to_kilowatt_hours() {
        assert_relative_eq!(watt_hours_to_kilowatt_hours(3_500.), 3.5);
    }
}
