/*

=========================================================
 Extended-system temperature and pressure coupling
=========================================================

Advances auxiliary thermostat and barostat variables every coupling step so
that particle velocities and the simulation box evolve in a chosen ensemble
(NVT, NPT, NPH).

Thermostats
-----------
- Nose-Hoover chains, Suzuki-Yoshida sub-stepped, Trotter scheduled
- Leap-frog single-link Nose-Hoover
- Berendsen weak coupling
- Stochastic velocity rescaling (v-rescale)
- Andersen and massive Andersen randomization
- Drude (polarizable pair) chains acting on center-of-mass and internal
  motion separately

Barostats
---------
- MTTK barostat velocity (Trotter, isotropic)
- Parrinello-Rahman box equations of motion
- Berendsen box scaling

Conventions
-----------
- Units: nm, ps, K, kJ/mol, bar
- Box matrices hold one box vector per row and are lower triangular
- Stochastic draws are pure functions of (step, counter, seed) and therefore
  independent of how particles are split over workers

*/

pub mod comm;
pub mod config;
pub mod constants;
pub mod ensembles;
pub mod error;
pub mod observables;
pub mod random;
pub mod state;
pub mod system;
pub mod thermostat_barostat;

pub use config::CouplingConfig;
pub use error::{CouplingError, CouplingResult};
pub use state::ExtendedSystemState;
pub use system::ExtendedSystem;

pub mod tensors {
    /*
    3x3 tensor helpers on top of nalgebra. Pressure, virial, kinetic energy
    and box matrices are all Matrix3<f64>; the configuration stores them as
    row arrays.
     */
    use nalgebra::Matrix3;

    pub fn from_rows(rows: &[[f64; 3]; 3]) -> Matrix3<f64> {
        Matrix3::new(
            rows[0][0], rows[0][1], rows[0][2], //
            rows[1][0], rows[1][1], rows[1][2], //
            rows[2][0], rows[2][1], rows[2][2],
        )
    }

    pub fn to_rows(m: &Matrix3<f64>) -> [[f64; 3]; 3] {
        let mut rows = [[0.0; 3]; 3];
        for (d, row) in rows.iter_mut().enumerate() {
            for (n, value) in row.iter_mut().enumerate() {
                *value = m[(d, n)];
            }
        }
        rows
    }

    /// Volume spanned by a (lower-triangular) box
    pub fn box_volume(b: &Matrix3<f64>) -> f64 {
        b[(0, 0)] * b[(1, 1)] * b[(2, 2)]
    }

    /// Lower-triangular inverse of a box matrix; `None` when a diagonal is zero
    pub fn invert_box(b: &Matrix3<f64>) -> Option<Matrix3<f64>> {
        let (xx, yy, zz) = (b[(0, 0)], b[(1, 1)], b[(2, 2)]);
        if xx == 0.0 || yy == 0.0 || zz == 0.0 {
            return None;
        }
        let mut inv = Matrix3::zeros();
        inv[(0, 0)] = 1.0 / xx;
        inv[(1, 1)] = 1.0 / yy;
        inv[(2, 2)] = 1.0 / zz;
        inv[(2, 0)] = (b[(1, 0)] * b[(2, 1)] * inv[(1, 1)] - b[(2, 0)]) * inv[(0, 0)] * inv[(2, 2)];
        inv[(1, 0)] = -b[(1, 0)] * inv[(0, 0)] * inv[(1, 1)];
        inv[(2, 1)] = -b[(2, 1)] * inv[(1, 1)] * inv[(2, 2)];
        Some(inv)
    }

    /// Keep only the lower triangle (including diagonal)
    pub fn lower_triangle(m: &Matrix3<f64>) -> Matrix3<f64> {
        let mut out = *m;
        out[(0, 1)] = 0.0;
        out[(0, 2)] = 0.0;
        out[(1, 2)] = 0.0;
        out
    }

    /// Outer product a b^T scaled by `factor`
    pub fn scaled_outer(a: &nalgebra::Vector3<f64>, b: &nalgebra::Vector3<f64>, factor: f64) -> Matrix3<f64> {
        a * b.transpose() * factor
    }
}

pub mod periodic_boundary_conditions {

    /*
    Box-shape bookkeeping for pressure coupling.

    With isotropic or semi-isotropic coupling the box may only change size,
    not shape. `box_rel` holds every constrained component relative to the
    first box vector length and is re-imposed after each update.
     */
    use nalgebra::Matrix3;

    use crate::ensembles::{PressureCoupling, PressureCouplingType};

    pub fn preserves_shape(pcoupl: PressureCoupling, pcoupl_type: PressureCouplingType) -> bool {
        pcoupl != PressureCoupling::No
            && matches!(pcoupl_type, PressureCouplingType::Isotropic | PressureCouplingType::SemiIsotropic)
    }

    fn constrained_dims(pcoupl_type: PressureCouplingType) -> usize {
        if pcoupl_type == PressureCouplingType::SemiIsotropic {
            2
        } else {
            3
        }
    }

    /// Reference shape of `b` relative to its first box vector
    pub fn init_box_rel(pcoupl_type: PressureCouplingType, b: &Matrix3<f64>) -> Matrix3<f64> {
        let mut box_rel = Matrix3::zeros();
        if b[(0, 0)] == 0.0 {
            return box_rel;
        }
        let ndim = constrained_dims(pcoupl_type);
        for d in 1..3 {
            for d2 in 0..ndim {
                box_rel[(d, d2)] = b[(d, d2)] / b[(0, 0)];
            }
        }
        box_rel
    }

    pub fn preserve_box_shape(
        pcoupl: PressureCoupling,
        pcoupl_type: PressureCouplingType,
        box_rel: &Matrix3<f64>,
        b: &mut Matrix3<f64>,
    ) {
        if !preserves_shape(pcoupl, pcoupl_type) {
            return;
        }
        let ndim = constrained_dims(pcoupl_type);
        for d in 1..3 {
            for d2 in 0..ndim {
                b[(d, d2)] = b[(0, 0)] * box_rel[(d, d2)];
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use crate::ensembles::{PressureCoupling, PressureCouplingType};
    use nalgebra::Matrix3;

    fn triclinic() -> Matrix3<f64> {
        Matrix3::new(3.0, 0.0, 0.0, 0.5, 3.5, 0.0, -0.4, 0.7, 4.0)
    }

    #[test]
    fn box_inverse_matches_general_inverse() {
        let b = triclinic();
        let inv = tensors::invert_box(&b).expect("non-singular box");
        let general = b.try_inverse().expect("invertible");
        assert_relative_eq!(inv, general, epsilon = 1e-12);
    }

    #[test]
    fn singular_box_has_no_inverse() {
        let mut b = triclinic();
        b[(1, 1)] = 0.0;
        assert!(tensors::invert_box(&b).is_none());
    }

    #[test]
    fn rows_round_trip() {
        let b = triclinic();
        assert_eq!(tensors::from_rows(&tensors::to_rows(&b)), b);
    }

    #[test]
    fn isotropic_shape_is_restored_after_distortion() {
        let b = triclinic();
        let box_rel = periodic_boundary_conditions::init_box_rel(PressureCouplingType::Isotropic, &b);

        // scale x only, then let the constraint drag the other vectors along
        let mut scaled = b;
        scaled[(0, 0)] *= 1.1;
        scaled[(1, 1)] += 0.3;
        periodic_boundary_conditions::preserve_box_shape(
            PressureCoupling::ParrinelloRahman,
            PressureCouplingType::Isotropic,
            &box_rel,
            &mut scaled,
        );
        assert_relative_eq!(scaled, b * 1.1, epsilon = 1e-12);
    }

    #[test]
    fn anisotropic_shape_is_left_alone() {
        let b = triclinic();
        let box_rel = periodic_boundary_conditions::init_box_rel(PressureCouplingType::Anisotropic, &b);
        let mut moved = b;
        moved[(2, 1)] = 1.5;
        periodic_boundary_conditions::preserve_box_shape(
            PressureCoupling::ParrinelloRahman,
            PressureCouplingType::Anisotropic,
            &box_rel,
            &mut moved,
        );
        assert_eq!(moved[(2, 1)], 1.5);
    }
}
