use crate::core::space_heat_demand::state_space::{IntervalForcing, StateSpaceModel};
use crate::external_conditions::{ExternalConditions, PerOrientation, ORIENTATION_COUNT};
use crate::input::BuildingEnvelopeInput;

/// Share of the internal gain baseline delivered directly to the air node
const INTERNAL_GAIN_AIR_FRACTION: f64 = 0.5;

/// Weighted areas through which irradiance reaches a building, per orientation.
#[derive(Clone, Debug, PartialEq)]
pub struct SolarApertures {
    opaque: PerOrientation,
    roof: PerOrientation,
    glazed: PerOrientation,
    ks_gla: f64,
    ks_opa: f64,
    ks_infra: f64,
}

impl SolarApertures {
    pub fn new(envelope: &BuildingEnvelopeInput) -> Self {
        let opaque = std::array::from_fn(|o| {
            envelope.a_walls[o] * envelope.u_walls
                + envelope.a_windows[o] * (1. - envelope.f_f) * envelope.a_window_frame
        });
        let roof = [envelope.a_floor / ORIENTATION_COUNT as f64 * envelope.u_roof; ORIENTATION_COUNT];

        Self {
            opaque,
            roof,
            glazed: envelope.a_windows,
            ks_gla: envelope.ks_gla,
            ks_opa: envelope.ks_opa,
            ks_infra: envelope.ks_infra,
        }
    }

    /// Net solar gain for one interval (glazed plus opaque minus infrared re-radiation), in W
    pub fn solar_gain(&self, wall_irradiance: &PerOrientation, roof_irradiance: &PerOrientation) -> f64 {
        let weighted = |irradiance: &PerOrientation, areas: &PerOrientation| -> f64 {
            irradiance.iter().zip(areas).map(|(i, a)| i * a).sum()
        };

        let glazed = self.ks_gla * weighted(wall_irradiance, &self.glazed);
        let opaque = self.ks_opa * weighted(wall_irradiance, &self.opaque)
            + self.ks_opa * weighted(roof_irradiance, &self.roof);
        let infrared: f64 = self.opaque.iter().map(|a| self.ks_infra * a).sum();

        glazed + opaque - infrared
    }
}

/// Exogenous heat flows to the three nodes of a building, one value per interval, in W.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ThermalFluxes {
    pub phi_ia: Vec<f64>,
    pub phi_st: Vec<f64>,
    pub phi_m: Vec<f64>,
}

impl ThermalFluxes {
    /// Split the internal gain baseline and the solar gains of every interval between the air,
    /// surface and mass nodes
    ///
    /// Arguments:
    /// * `envelope` - building envelope, for apertures and the internal gain baseline
    /// * `model` - state-space model of the same building, for the distribution factors
    /// * `conditions` - irradiance series
    pub fn generate(
        envelope: &BuildingEnvelopeInput,
        model: &StateSpaceModel,
        conditions: &ExternalConditions,
    ) -> Self {
        let apertures = SolarApertures::new(envelope);
        let phi_0 = envelope.internal_gains;
        let phi_ia = INTERNAL_GAIN_AIR_FRACTION * phi_0;

        let mut fluxes = Self::default();
        for interval in conditions.iter() {
            let phi_sol = apertures.solar_gain(&interval.wall_irradiance, &interval.roof_irradiance);
            let shared = (1. - INTERNAL_GAIN_AIR_FRACTION) * phi_0 + 0.5 * phi_sol;

            fluxes.phi_ia.push(phi_ia);
            fluxes.phi_st.push((1. - model.k_a - model.k_s) * shared);
            fluxes.phi_m.push(model.k_a * shared);
        }
        fluxes
    }

    pub fn len(&self) -> usize {
        self.phi_ia.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phi_ia.is_empty()
    }

    pub fn forcing(&self, idx: usize, t_ext: f64) -> IntervalForcing {
        IntervalForcing {
            t_ext,
            phi_ia: self.phi_ia[idx],
            phi_st: self.phi_st[idx],
            phi_m: self.phi_m[idx],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::space_heat_demand::state_space::tests::envelope;
    use crate::external_conditions::tests::interval;
    use crate::simulation_time::SimulationStep;
    use approx::assert_relative_eq;
    use rstest::*;

    #[rstest]
    fn test_apertures() {
        let apertures = SolarApertures::new(&envelope());
        // N: 12.5 m2 wall at U 0.5 plus 2 m2 window, 20 % frame, frame factor 1.5
        assert_relative_eq!(apertures.opaque[0], 12.5 * 0.5 + 2. * 0.2 * 1.5, max_relative = 1e-12);
        assert_relative_eq!(apertures.opaque[1], 12.5 * 0.5);
        assert_relative_eq!(apertures.roof[3], 100. / 8. * 0.4);
        assert_eq!(apertures.glazed[4], 4.);
    }

    #[rstest]
    fn test_dark_interval_only_loses_infrared() {
        let apertures = SolarApertures::new(&envelope());
        let infrared: f64 = apertures.opaque.iter().sum::<f64>() * 0.5;
        assert_relative_eq!(
            apertures.solar_gain(&[0.; 8], &[0.; 8]),
            -infrared,
            max_relative = 1e-12
        );
    }

    #[rstest]
    fn test_south_irradiance() {
        let apertures = SolarApertures::new(&envelope());
        let mut walls = [0.; 8];
        walls[4] = 300.;
        let gain = apertures.solar_gain(&walls, &[0.; 8]);
        let dark = apertures.solar_gain(&[0.; 8], &[0.; 8]);
        let south_opaque = 12.5 * 0.5 + 4. * 0.2 * 1.5;
        assert_relative_eq!(
            gain - dark,
            0.6 * 300. * 4. + 0.04 * 300. * south_opaque,
            max_relative = 1e-12
        );
    }

    #[rstest]
    fn test_fluxes_split_between_nodes() {
        let envelope = envelope();
        let model = StateSpaceModel::new("flat_1", &envelope, SimulationStep::Hourly).unwrap();
        let mut noon = interval(1, 1, 12, 5.);
        noon.wall_irradiance = [50., 80., 150., 250., 300., 250., 150., 80.];
        noon.roof_irradiance = [400.; 8];
        let conditions = ExternalConditions::new(vec![interval(1, 1, 0, 2.), noon]);

        let fluxes = ThermalFluxes::generate(&envelope, &model, &conditions);
        assert_eq!(fluxes.len(), 2);

        for idx in 0..2 {
            assert_relative_eq!(fluxes.phi_ia[idx], 100.);
            // surface and mass shares plus the air share add up to the total gain
            let apertures = SolarApertures::new(&envelope);
            let interval = conditions.interval(idx);
            let phi_sol = apertures.solar_gain(&interval.wall_irradiance, &interval.roof_irradiance);
            assert_relative_eq!(
                fluxes.phi_m[idx] / model.k_a,
                100. + 0.5 * phi_sol,
                max_relative = 1e-12
            );
            assert_relative_eq!(
                fluxes.phi_st[idx] + fluxes.phi_m[idx],
                (1. - model.k_s) * (100. + 0.5 * phi_sol),
                max_relative = 1e-12
            );
        }
        assert!(fluxes.phi_m[1] > fluxes.phi_m[0]);

        let forcing = fluxes.forcing(1, 5.);
        assert_eq!(forcing.t_ext, 5.);
        assert_eq!(forcing.phi_st, fluxes.phi_st[1]);
    }
}
