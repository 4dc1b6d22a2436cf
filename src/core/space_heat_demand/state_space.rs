//! Simplified hourly building model (BS EN ISO 13790:2008 section C.2) with three thermal nodes
//! (indoor air, internal surfaces and envelope mass), discretised with an implicit step so that
//! each interval advances the node temperatures by one fixed linear recurrence
//! `T' = A T + B u`.

use crate::core::units::{DENSITY_AIR, SECONDS_PER_HOUR, SPECIFIC_HEAT_AIR};
use crate::errors::ModelError;
use crate::input::BuildingEnvelopeInput;
use crate::simulation_time::SimulationStep;
use nalgebra::{Matrix3, Vector3};

/// Heat transfer coefficient between the air node and the surface node, per m2 of internal
/// surface area, in W/(m2.K) (BS EN ISO 13790:2008 section 7.2.2.2)
const H_TR_IS_PER_AREA: f64 = 3.45;
/// Heat transfer coefficient between the mass node and the surface node, per m2 of effective
/// mass area, in W/(m2.K) (BS EN ISO 13790:2008 section 12.2.2)
const H_TR_MS_PER_AREA: f64 = 9.1;

pub const NODE_AIR: usize = 0;
pub const NODE_SURFACE: usize = 1;
pub const NODE_MASS: usize = 2;

/// Temperatures of the three nodes, in deg C
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ThermalState {
    pub t_air: f64,
    pub t_surface: f64,
    pub t_mass: f64,
}

impl ThermalState {
    pub fn uniform(temperature: f64) -> Self {
        Self {
            t_air: temperature,
            t_surface: temperature,
            t_mass: temperature,
        }
    }

    /// Temperatures in node order (air, surface, mass)
    pub fn to_array(&self) -> [f64; 3] {
        [self.t_air, self.t_surface, self.t_mass]
    }

    pub fn from_array(temperatures: [f64; 3]) -> Self {
        Self {
            t_air: temperatures[NODE_AIR],
            t_surface: temperatures[NODE_SURFACE],
            t_mass: temperatures[NODE_MASS],
        }
    }
}

/// Exogenous inputs for one interval
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IntervalForcing {
    /// outdoor air temperature, in deg C
    pub t_ext: f64,
    /// heat flow to the air node, in W
    pub phi_ia: f64,
    /// heat flow to the surface node, in W
    pub phi_st: f64,
    /// heat flow to the mass node, in W
    pub phi_m: f64,
}

/// One row of the recurrence written as an affine function of the previous state and the
/// heating/cooling flux: `state . T + hvac * phi_hc + constant`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AffineRow {
    pub state: [f64; 3],
    pub hvac: f64,
    pub constant: f64,
}

impl AffineRow {
    pub fn evaluate(&self, state: &ThermalState, phi_hc: f64) -> f64 {
        self.state[NODE_AIR] * state.t_air
            + self.state[NODE_SURFACE] * state.t_surface
            + self.state[NODE_MASS] * state.t_mass
            + self.hvac * phi_hc
            + self.constant
    }
}

/// State-space form of a building's thermal network, fixed for a given envelope and interval
/// length.
#[derive(Clone, Debug, PartialEq)]
pub struct StateSpaceModel {
    a: Matrix3<f64>,
    b: Matrix3<f64>,
    /// coupling conductance between air and surface nodes, in W/K
    pub h_tr_is: f64,
    /// transmission conductance of glazed elements, in W/K
    pub h_tr_w: f64,
    /// transmission conductance of opaque elements, in W/K
    pub h_tr_op: f64,
    /// coupling conductance between surface and mass nodes, in W/K
    pub h_tr_ms: f64,
    /// conductance between mass node and exterior, in W/K
    pub h_tr_em: f64,
    /// ventilation conductance, in W/K
    pub h_ve: f64,
    /// heat capacities of the mass, surface and air nodes, in J/K
    pub c_m: f64,
    pub c_s: f64,
    pub c_i: f64,
    /// fraction of internal and solar gains distributed to the mass node
    pub k_a: f64,
    /// fraction of internal and solar gains distributed to the surface node
    pub k_s: f64,
    /// conductance from the mass node to the ground, in W/K
    ground_conductance: f64,
    ground_temperature: f64,
}

impl StateSpaceModel {
    /// Derive the model for a building
    ///
    /// Arguments:
    /// * `building` - name of the building, used in error reports
    /// * `envelope` - envelope areas, transmittances and capacities
    /// * `step` - simulation interval length
    pub fn new(
        building: &str,
        envelope: &BuildingEnvelopeInput,
        step: SimulationStep,
    ) -> Result<Self, ModelError> {
        let tau = step.seconds();
        let a_walls: f64 = envelope.a_walls.iter().sum();
        let a_windows: f64 = envelope.a_windows.iter().sum();

        // internal surface area facing the air node and effective mass area
        let a_t = a_walls + 2. * envelope.a_floor + envelope.a_partitions;
        let a_m = a_walls + 2. * envelope.a_floor;

        let h_tr_is = H_TR_IS_PER_AREA * a_t;
        let h_tr_w = envelope.u_windows * a_windows;
        let h_tr_op = envelope.u_walls * a_walls + envelope.u_roof * envelope.a_floor;
        let h_tr_ms = H_TR_MS_PER_AREA * a_m;
        let h_tr_em = 1. / (1. / h_tr_op - 1. / h_tr_ms);
        let h_ve = DENSITY_AIR * SPECIFIC_HEAT_AIR * envelope.volume / SECONDS_PER_HOUR as f64
            * envelope.acr;

        let k_a = a_m / a_t;
        let k_s = h_tr_w / (H_TR_MS_PER_AREA * a_t);

        let c_m = envelope.c_m_walls * (a_walls + envelope.a_partitions)
            + (envelope.c_m_roof + envelope.c_m_floor) * envelope.a_floor;
        let c_s = envelope.a_s * envelope.c_s;
        let c_i = SPECIFIC_HEAT_AIR * DENSITY_AIR * envelope.volume;

        for (quantity, value) in [
            ("H_tr_is", h_tr_is),
            ("H_tr_w", h_tr_w),
            ("H_tr_op", h_tr_op),
            ("H_tr_ms", h_tr_ms),
            ("H_tr_em", h_tr_em),
            ("H_ve", h_ve),
            ("k_a", k_a),
            ("k_s", k_s),
        ] {
            if !value.is_finite() {
                return Err(ModelError::NonFiniteCoefficient {
                    building: building.to_string(),
                    quantity,
                });
            }
        }

        #[rustfmt::skip]
        let system = Matrix3::new(
            -(h_tr_is + h_ve) - c_i / tau, h_tr_is,                               0.,
            h_tr_is,                       -(h_tr_is + h_tr_w + h_tr_ms) - c_s / tau, h_tr_ms,
            0.,                            h_tr_ms,                               -h_tr_em - h_tr_ms - c_m / tau,
        );
        let decay = Matrix3::from_diagonal(&Vector3::new(-c_i / tau, -c_s / tau, -c_m / tau));

        let inverse = system
            .try_inverse()
            .ok_or_else(|| ModelError::SingularSystemMatrix {
                building: building.to_string(),
            })?;
        let a = inverse * decay;
        let b = inverse * Matrix3::identity();

        if a.iter().chain(b.iter()).any(|value| !value.is_finite()) {
            return Err(ModelError::SingularSystemMatrix {
                building: building.to_string(),
            });
        }

        Ok(Self {
            a,
            b,
            h_tr_is,
            h_tr_w,
            h_tr_op,
            h_tr_ms,
            h_tr_em,
            h_ve,
            c_m,
            c_s,
            c_i,
            k_a,
            k_s,
            ground_conductance: envelope.u_ground * envelope.a_floor,
            ground_temperature: envelope.ground_temperature,
        })
    }

    pub fn a(&self) -> &Matrix3<f64> {
        &self.a
    }

    pub fn b(&self) -> &Matrix3<f64> {
        &self.b
    }

    /// The recurrence for one interval as three affine rows (air, surface, mass), shared by the
    /// forward simulator and the dispatch optimizer.
    ///
    /// The input vector is
    /// `u0 = -H_ve Te - phi_ia - phi_hc`,
    /// `u1 = -phi_st - H_tr_w Te`,
    /// `u2 = -H_tr_em Te - (phi_m + H_g (T_ground - T_m))`,
    /// where the ground exchange uses the mass temperature at the start of the interval.
    pub fn transition_rows(&self, forcing: &IntervalForcing) -> [AffineRow; 3] {
        let te = forcing.t_ext;
        let u0 = -self.h_ve * te - forcing.phi_ia;
        let u1 = -forcing.phi_st - self.h_tr_w * te;
        let u2 = -self.h_tr_em * te
            - forcing.phi_m
            - self.ground_conductance * self.ground_temperature;

        [NODE_AIR, NODE_SURFACE, NODE_MASS].map(|row| {
            let b_row = self.b.row(row);
            let mut state = [self.a[(row, 0)], self.a[(row, 1)], self.a[(row, 2)]];
            state[NODE_MASS] += b_row[2] * self.ground_conductance;

            AffineRow {
                state,
                hvac: -b_row[0],
                constant: b_row[0] * u0 + b_row[1] * u1 + b_row[2] * u2,
            }
        })
    }

    /// Advance the node temperatures by one interval
    ///
    /// Arguments:
    /// * `state` - node temperatures at the start of the interval
    /// * `forcing` - exogenous inputs for the interval
    /// * `phi_hc` - heating (positive) or cooling (negative) flux to the air node, in W
    pub fn step(&self, state: &ThermalState, forcing: &IntervalForcing, phi_hc: f64) -> ThermalState {
        let [air, surface, mass] = self.transition_rows(forcing);
        ThermalState {
            t_air: air.evaluate(state, phi_hc),
            t_surface: surface.evaluate(state, phi_hc),
            t_mass: mass.evaluate(state, phi_hc),
        }
    }

    /// Heating/cooling flux that brings the air node exactly to a target temperature by the end
    /// of the interval
    pub fn required_hvac_flux(
        &self,
        state: &ThermalState,
        forcing: &IntervalForcing,
        t_air_target: f64,
    ) -> f64 {
        let [air, _, _] = self.transition_rows(forcing);
        (t_air_target - air.evaluate(state, 0.)) / air.hvac
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::input::tests::envelope_json;
    use approx::assert_relative_eq;
    use rstest::*;

    pub(crate) fn envelope() -> BuildingEnvelopeInput {
        serde_json::from_value(envelope_json()).unwrap()
    }

    /// Advance the state with the full matrix form, for checking the affine rows against the
    /// matrices
    fn step_matrix_form(
        model: &StateSpaceModel,
        state: &ThermalState,
        forcing: &IntervalForcing,
        phi_hc: f64,
    ) -> ThermalState {
        let te = forcing.t_ext;
        let u = Vector3::new(
            -model.h_ve * te - forcing.phi_ia - phi_hc,
            -forcing.phi_st - model.h_tr_w * te,
            -model.h_tr_em * te
                - (forcing.phi_m
                    + model.ground_conductance * (model.ground_temperature - state.t_mass)),
        );
        let current = Vector3::new(state.t_air, state.t_surface, state.t_mass);
        let next = model.a * current + model.b * u;
        ThermalState {
            t_air: next[0],
            t_surface: next[1],
            t_mass: next[2],
        }
    }

    #[fixture]
    fn model() -> StateSpaceModel {
        StateSpaceModel::new("flat_1", &envelope(), SimulationStep::Hourly).unwrap()
    }

    #[rstest]
    fn test_conductances(model: StateSpaceModel) {
        // walls 100 m2, windows 10 m2, floor 100 m2, partitions 80 m2
        assert_relative_eq!(model.h_tr_is, 3.45 * 380.);
        assert_relative_eq!(model.h_tr_w, 1.8 * 10.);
        assert_relative_eq!(model.h_tr_op, 0.5 * 100. + 0.4 * 100.);
        assert_relative_eq!(model.h_tr_ms, 9.1 * 300.);
        assert_relative_eq!(
            model.h_tr_em,
            1. / (1. / 90. - 1. / 2730.),
            max_relative = 1e-12
        );
        assert_relative_eq!(model.h_ve, 1.2 * 1000. * 300. / 3600. * 0.5);
        assert_relative_eq!(model.k_a, 300. / 380.);
        assert_relative_eq!(model.k_s, 18. / (9.1 * 380.));
    }

    #[rstest]
    fn test_capacities(model: StateSpaceModel) {
        assert_relative_eq!(model.c_m, 110_000. * 180. + 160_000. * 100.);
        assert_relative_eq!(model.c_s, 150. * 10_000.);
        assert_relative_eq!(model.c_i, 1000. * 1.2 * 300.);
    }

    #[rstest]
    #[case([2., 0., 2., 0., 4., 0., 2., 0.], 1.8)]
    #[case([0.; 8], 1.8)]
    #[case([1., 1., 1., 1., 1., 1., 1., 1.], 1.1)]
    fn test_window_transmittance_is_u_times_area(#[case] a_windows: [f64; 8], #[case] u_windows: f64) {
        let mut envelope = envelope();
        envelope.a_windows = a_windows;
        envelope.u_windows = u_windows;
        let model = StateSpaceModel::new("flat_1", &envelope, SimulationStep::Hourly).unwrap();
        assert_relative_eq!(model.h_tr_w, u_windows * a_windows.iter().sum::<f64>());
    }

    #[rstest]
    fn test_affine_rows_match_matrix_form(model: StateSpaceModel) {
        let state = ThermalState {
            t_air: 21.,
            t_surface: 20.5,
            t_mass: 19.,
        };
        let forcing = IntervalForcing {
            t_ext: 3.,
            phi_ia: 100.,
            phi_st: 250.,
            phi_m: 400.,
        };
        for phi_hc in [0., 1_500., -800.] {
            let affine = model.step(&state, &forcing, phi_hc);
            let matrix = step_matrix_form(&model, &state, &forcing, phi_hc);
            assert_relative_eq!(affine.t_air, matrix.t_air, max_relative = 1e-10);
            assert_relative_eq!(affine.t_surface, matrix.t_surface, max_relative = 1e-10);
            assert_relative_eq!(affine.t_mass, matrix.t_mass, max_relative = 1e-10);
        }
    }

    #[rstest]
    fn test_required_hvac_flux_reaches_target(model: StateSpaceModel) {
        let state = ThermalState::uniform(19.);
        let forcing = IntervalForcing {
            t_ext: 0.,
            phi_ia: 100.,
            phi_st: 50.,
            phi_m: 50.,
        };
        let phi_hc = model.required_hvac_flux(&state, &forcing, 20.);
        assert!(phi_hc > 0.);
        assert_relative_eq!(
            model.step(&state, &forcing, phi_hc).t_air,
            20.,
            max_relative = 1e-10
        );
    }

    #[rstest]
    #[case(SimulationStep::Hourly)]
    #[case(SimulationStep::QuarterHourly)]
    fn test_free_running_converges_to_uniform_boundary_temperature(#[case] step: SimulationStep) {
        let target = 17.5;
        let mut envelope = envelope();
        envelope.ground_temperature = target;
        let model = StateSpaceModel::new("flat_1", &envelope, step).unwrap();
        let forcing = IntervalForcing {
            t_ext: target,
            phi_ia: 0.,
            phi_st: 0.,
            phi_m: 0.,
        };

        let mut state = ThermalState {
            t_air: 25.,
            t_surface: 10.,
            t_mass: 30.,
        };
        for _ in 0..(24 * 4 * 365) {
            state = model.step(&state, &forcing, 0.);
        }
        assert_relative_eq!(state.t_air, target, epsilon = 1e-6);
        assert_relative_eq!(state.t_surface, target, epsilon = 1e-6);
        assert_relative_eq!(state.t_mass, target, epsilon = 1e-6);
    }

    #[rstest]
    fn test_opaque_elements_without_transmittance_decouple_mass() {
        let mut envelope = envelope();
        envelope.u_walls = 0.;
        envelope.u_roof = 0.;
        let model = StateSpaceModel::new("flat_1", &envelope, SimulationStep::Hourly).unwrap();
        assert_eq!(model.h_tr_em, 0.);
    }

    #[rstest]
    fn test_empty_building_is_rejected() {
        let mut envelope = envelope();
        envelope.a_walls = [0.; 8];
        envelope.a_windows = [0.; 8];
        envelope.a_floor = 0.;
        envelope.a_partitions = 0.;
        assert_eq!(
            StateSpaceModel::new("empty", &envelope, SimulationStep::Hourly),
            Err(ModelError::NonFiniteCoefficient {
                building: "empty".to_string(),
                quantity: "H_tr_em",
            })
        );
    }
}
