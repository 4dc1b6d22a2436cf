//! Psychrometric relations for moist air used by the heat pump defrost and cooling-capacity
//! correlations.

/// Atmospheric pressure assumed for humidity ratios, in Pa
pub const ATMOSPHERIC_PRESSURE: f64 = 100_094.;

/// Ratio of molar masses of water vapour and dry air
const MOLAR_MASS_RATIO: f64 = 0.62198;

/// Saturation vapour pressure of water over air at the given temperature (Arden Buck equation)
///
/// Arguments:
/// * `temp` - air temperature, in deg C
///
/// Returns saturation pressure in Pa
pub fn saturation_vapour_pressure(temp: f64) -> f64 {
    611.21 * ((18.678 - temp / 234.5) * (temp / (temp + 257.14))).exp()
}

/// Humidity ratio (kg water vapour per kg dry air)
///
/// Arguments:
/// * `temp` - air temperature, in deg C
/// * `relative_humidity` - in %
pub fn humidity_ratio(temp: f64, relative_humidity: f64) -> f64 {
    let partial_pressure = relative_humidity / 100. * saturation_vapour_pressure(temp);
    MOLAR_MASS_RATIO * partial_pressure / (ATMOSPHERIC_PRESSURE - partial_pressure)
}

/// Wet-bulb temperature from dry-bulb temperature and relative humidity, using Stull's
/// empirical fit (valid roughly for -20 to 50 deg C and 5-99 % RH).
///
/// Arguments:
/// * `temp_dry_bulb` - in deg C
/// * `relative_humidity` - in %
pub fn wet_bulb_temperature(temp_dry_bulb: f64, relative_humidity: f64) -> f64 {
    let rh = relative_humidity;
    temp_dry_bulb * (0.151977 * (rh + 8.313659).sqrt()).atan() + (temp_dry_bulb + rh).atan()
        - (rh - 1.676331).atan()
        + 0.00391838 * rh.powf(1.5) * (0.023101 * rh).atan()
        - 4.686035
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::*;

    #[rstest]
    fn test_saturation_vapour_pressure() {
        assert_relative_eq!(saturation_vapour_pressure(0.), 611.21);
        assert_relative_eq!(saturation_vapour_pressure(20.), 2338.8, max_relative = 1e-3);
    }

    #[rstest]
    fn test_humidity_ratio() {
        // 20 deg C, 50 % RH is roughly 7.3 g/kg
        assert_relative_eq!(humidity_ratio(20., 50.), 0.00730, max_relative = 1e-2);
        assert_relative_eq!(humidity_ratio(5., 0.), 0.);
    }

    #[rstest]
    fn test_wet_bulb_temperature() {
        // reference value from Stull (2011)
        assert_relative_eq!(wet_bulb_temperature(20., 50.), 13.7, epsilon = 0.1);
    }

    #[rstest]
    fn test_wet_bulb_never_exceeds_dry_bulb() {
        for temp in [0., 10., 25., 35.] {
            assert!(wet_bulb_temperature(temp, 60.) <= temp);
        }
    }
}
