/*
Extended-system barostats.

MTTK: the isotropic log-volume velocity veta is kicked by the difference
between the instantaneous and the reference pressure. Only the velocity is
propagated here; the Trotter scheduler places the kicks around the force
evaluation and the host integrates the volume.

Parrinello-Rahman: the box matrix has its own equation of motion. This step
advances the box velocity and derives the coupling tensor M entering the
particle equations of motion, plus the coordinate scaling mu that takes the
current box to the next one.
*/

use log::{debug, warn};
use nalgebra::Matrix3;

use crate::config::CouplingConfig;
use crate::constants::{DIM, MAX_BOX_SCALING_DEVIATION, PRESFAC, TWO_PI};
use crate::ensembles::PressureCouplingType;
use crate::error::{CouplingError, CouplingResult};
use crate::observables::calc_pres;
use crate::periodic_boundary_conditions;
use crate::state::{BarostatState, ExtendedMasses, KineticEnergyData};
use crate::tensors;

const XX: usize = 0;
const YY: usize = 1;
const ZZ: usize = 2;

/// Number of walls used to evaluate the barostat pressure
fn barostat_nwall(pcoupl_type: PressureCouplingType) -> usize {
    if pcoupl_type == PressureCouplingType::SemiIsotropic {
        2
    } else {
        3
    }
}

/*
Half kick of the MTTK barostat velocity:

    GW = V Winv/PRESFAC (D P - trace(P_ref)),  veta += dt/2 GW

The kinetic part of the pressure is corrected by (1 + D/Ndf) for the
barostat coupling to the particle momenta and by the pending chain scaling of
the first group. `pcorr` is the long-range dispersion correction to the
pressure.
 */
pub fn boxv_trotter(
    config: &CouplingConfig,
    veta: &mut f64,
    dt: f64,
    b: &Matrix3<f64>,
    ekind: &KineticEnergyData,
    vir: &Matrix3<f64>,
    pcorr: f64,
    masses: &ExtendedMasses,
) -> CouplingResult<()> {
    let nwall = barostat_nwall(config.pcoupl_type);
    let nrdf0 = config.groups[0].nrdf;
    if nrdf0 == 0.0 {
        return Err(CouplingError::ZeroDegreesOfFreedom { group: 0 });
    }

    let alpha = (1.0 + DIM as f64 / nrdf0) * ekind.groups[0].ekinscalef_nhc;
    let ekinmod = ekind.ekin * alpha;

    let (pscal, _) = calc_pres(config.pbc, nwall, b, &ekinmod, vir);
    let pscal = pscal + pcorr;

    let vol = tensors::box_volume(b);
    let gw = (vol * (masses.winv / PRESFAC)) * (DIM as f64 * pscal - config.ref_p_matrix().trace());

    *veta += 0.5 * dt * gw;
    debug!("MTTK: P = {:.4} bar, GW = {:.6e}, veta = {:.6e}", pscal, gw, veta);
    Ok(())
}

/// Anisotropic inverse mass of the Parrinello-Rahman box
fn parrinello_rahman_inverse_mass(config: &CouplingConfig, b: &Matrix3<f64>) -> Matrix3<f64> {
    let max_box_length = b[(XX, XX)].max(b[(YY, YY)]).max(b[(ZZ, ZZ)]);
    // 4 pi^2 / 3
    let prefactor = TWO_PI * TWO_PI / 3.0;
    config.compress_matrix() * (prefactor / (config.tau_p * config.tau_p * max_box_length))
}

/*
One Parrinello-Rahman step over `dt`.

The box velocity is not advanced on the first step so that a continued run
starts from the stored box velocity. Pressure and compressibility always
appear as a product, so PRESFAC drops out of the box acceleration.
 */
pub fn parrinello_rahman_pcoupl(
    config: &CouplingConfig,
    step: i64,
    dt: f64,
    pres: &Matrix3<f64>,
    barostat: &mut BarostatState,
    first_step: bool,
) -> CouplingResult<()> {
    let b = barostat.box_matrix;
    let vol = tensors::box_volume(&b);
    let invbox = tensors::invert_box(&b).ok_or(CouplingError::SingularBox)?;

    if !first_step {
        let winv = parrinello_rahman_inverse_mass(config, &b);
        let ref_p = config.ref_p_matrix();
        let mut pdiff = pres - ref_p;

        if config.pcoupl_type == PressureCouplingType::SurfaceTension {
            let xy_pressure = 0.5 * (pres[(XX, XX)] + pres[(YY, YY)]);
            for d in 0..ZZ {
                pdiff[(d, d)] = xy_pressure - (pres[(ZZ, ZZ)] - ref_p[(d, d)] / b[(d, d)]);
            }
        }

        let mut t1 = invbox.transpose() * pdiff;
        // the box constraints only allow a lower-triangular force
        for d in 0..DIM {
            for n in 0..d {
                t1[(d, n)] += t1[(n, d)];
                t1[(n, d)] = 0.0;
            }
        }

        match config.pcoupl_type {
            PressureCouplingType::Anisotropic => {
                for d in 0..DIM {
                    for n in 0..=d {
                        t1[(d, n)] *= winv[(d, n)] * vol;
                    }
                }
            }
            PressureCouplingType::Isotropic => {
                // equal relative acceleration in every direction, same total volume acceleration
                let atot = b[(XX, XX)] * b[(YY, YY)] * t1[(ZZ, ZZ)]
                    + b[(XX, XX)] * t1[(YY, YY)] * b[(ZZ, ZZ)]
                    + t1[(XX, XX)] * b[(YY, YY)] * b[(ZZ, ZZ)];
                let arel = atot / (3.0 * vol);
                for d in 0..DIM {
                    for n in 0..=d {
                        t1[(d, n)] = winv[(XX, XX)] * vol * arel * b[(d, n)];
                    }
                }
            }
            PressureCouplingType::SemiIsotropic | PressureCouplingType::SurfaceTension => {
                let atot = b[(XX, XX)] * t1[(YY, YY)] + t1[(XX, XX)] * b[(YY, YY)];
                let arel = atot / (2.0 * b[(XX, XX)] * b[(YY, YY)]);
                for d in 0..ZZ {
                    for n in 0..=d {
                        t1[(d, n)] = winv[(d, n)] * vol * arel * b[(d, n)];
                    }
                }
                for n in 0..DIM {
                    t1[(ZZ, n)] *= winv[(ZZ, n)] * vol;
                }
            }
        }

        let mut maxchange: f64 = 0.0;
        for d in 0..DIM {
            for n in 0..=d {
                barostat.boxv[(d, n)] += dt * t1[(d, n)];
                // off-diagonal elements may well be zero, so compare to the diagonal
                let change = (dt * barostat.boxv[(d, n)] / b[(d, d)]).abs();
                maxchange = maxchange.max(change);
            }
        }

        if maxchange > MAX_BOX_SCALING_DEVIATION {
            warn!(
                "Step {}  Warning: Pressure scaling more than 1%. The coupling constant may be too small for the pressure fluctuations.",
                step
            );
        }
    }

    periodic_boundary_conditions::preserve_box_shape(
        config.pcoupl,
        config.pcoupl_type,
        &barostat.box_rel,
        &mut barostat.boxv,
    );

    barostat.m_coupling = invbox * (barostat.boxv * b.transpose()) * invbox.transpose();

    let mut next_box = tensors::lower_triangle(&(b + barostat.boxv * dt));
    periodic_boundary_conditions::preserve_box_shape(config.pcoupl, config.pcoupl_type, &barostat.box_rel, &mut next_box);
    barostat.mu = invbox * next_box;

    debug!("PR: boxv {:?}, mu {:?}", barostat.boxv, barostat.mu);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GroupOptions;
    use crate::ensembles::{PressureCoupling, TemperatureCoupling};
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    fn mttk_config() -> CouplingConfig {
        CouplingConfig {
            tcoupl: TemperatureCoupling::NoseHoover,
            pcoupl: PressureCoupling::Mttk,
            groups: vec![GroupOptions::new(300.0, 0.1, 100.0)],
            ..CouplingConfig::default()
        }
    }

    fn pr_config(pcoupl_type: PressureCouplingType) -> CouplingConfig {
        CouplingConfig {
            pcoupl: PressureCoupling::ParrinelloRahman,
            pcoupl_type,
            compress: [[4.5e-5; 3]; 3],
            ..CouplingConfig::default()
        }
    }

    fn sample_ekind() -> KineticEnergyData {
        let mut ekind = KineticEnergyData::new(1);
        ekind.ekin = Matrix3::new(120.0, 3.0, 0.0, 3.0, 110.0, -1.0, 0.0, -1.0, 130.0);
        ekind
    }

    #[test]
    fn veta_is_unchanged_at_reference_pressure() {
        let mut config = mttk_config();
        let b = Matrix3::identity() * 3.0;
        let ekind = sample_ekind();
        let vir = Matrix3::identity() * 40.0;
        let alpha = 1.0 + 3.0 / 100.0;
        let (p, _) = calc_pres(config.pbc, 3, &b, &(ekind.ekin * alpha), &vir);
        config.ref_p = [[p, 0.0, 0.0], [0.0, p, 0.0], [0.0, 0.0, p]];
        let masses = ExtendedMasses::compute(&config, 27.0);

        let mut veta = 0.0;
        boxv_trotter(&config, &mut veta, 0.002, &b, &ekind, &vir, 0.0, &masses).expect("barostat kick");
        assert_abs_diff_eq!(veta, 0.0, epsilon = 1e-10);
    }

    #[test]
    fn overpressure_accelerates_expansion() {
        let config = mttk_config();
        let b = Matrix3::identity() * 3.0;
        let masses = ExtendedMasses::compute(&config, 27.0);
        let mut veta = 0.0;
        boxv_trotter(&config, &mut veta, 0.002, &b, &sample_ekind(), &Matrix3::zeros(), 0.0, &masses)
            .expect("barostat kick");
        assert!(veta > 0.0);
    }

    #[test]
    fn dispersion_correction_enters_pressure() {
        let config = mttk_config();
        let b = Matrix3::identity() * 3.0;
        let masses = ExtendedMasses::compute(&config, 27.0);
        let ekind = KineticEnergyData::new(1);
        let mut veta = 0.0;
        boxv_trotter(&config, &mut veta, 0.002, &b, &ekind, &Matrix3::zeros(), -10.0, &masses).expect("barostat kick");
        let expected = 0.5 * 0.002 * 27.0 * (masses.winv / PRESFAC) * (3.0 * -10.0 - 3.0);
        assert_relative_eq!(veta, expected, epsilon = 1e-15);
    }

    #[test]
    fn zero_dof_in_first_group_is_fatal() {
        let mut config = mttk_config();
        config.groups[0].nrdf = 0.0;
        let masses = ExtendedMasses::compute(&config, 27.0);
        let mut veta = 0.0;
        let err = boxv_trotter(&config, &mut veta, 0.002, &Matrix3::identity(), &sample_ekind(), &Matrix3::zeros(), 0.0, &masses)
            .expect_err("no degrees of freedom");
        assert!(matches!(err, CouplingError::ZeroDegreesOfFreedom { group: 0 }));
    }

    #[test]
    fn parrinello_rahman_at_reference_pressure_is_stationary() {
        let config = pr_config(PressureCouplingType::Anisotropic);
        let b = Matrix3::new(3.0, 0.0, 0.0, 0.2, 3.0, 0.0, 0.1, -0.3, 3.5);
        let mut barostat = BarostatState::new(b, config.pcoupl_type);
        let pres = config.ref_p_matrix();
        parrinello_rahman_pcoupl(&config, 10, 0.002, &pres, &mut barostat, false).expect("pr step");
        assert_eq!(barostat.boxv, Matrix3::zeros());
        assert_eq!(barostat.m_coupling, Matrix3::zeros());
        assert_relative_eq!(barostat.mu, Matrix3::identity(), epsilon = 1e-14);
    }

    #[test]
    fn isotropic_box_accelerates_uniformly() {
        let config = pr_config(PressureCouplingType::Isotropic);
        let b = Matrix3::new(3.0, 0.0, 0.0, 0.0, 4.0, 0.0, 0.0, 0.0, 5.0);
        let mut barostat = BarostatState::new(b, config.pcoupl_type);
        let pres = Matrix3::new(300.0, 0.0, 0.0, 0.0, 100.0, 0.0, 0.0, 0.0, 50.0);
        parrinello_rahman_pcoupl(&config, 1, 0.002, &pres, &mut barostat, false).expect("pr step");
        let rel: Vec<f64> = (0..3).map(|d| barostat.boxv[(d, d)] / b[(d, d)]).collect();
        assert!(rel[0] > 0.0);
        assert_relative_eq!(rel[0], rel[1], epsilon = 1e-14);
        assert_relative_eq!(rel[1], rel[2], epsilon = 1e-14);
        assert!(barostat.mu[(0, 0)] > 1.0);
    }

    #[test]
    fn first_step_keeps_box_velocity() {
        let config = pr_config(PressureCouplingType::Anisotropic);
        let b = Matrix3::identity() * 3.0;
        let mut barostat = BarostatState::new(b, config.pcoupl_type);
        barostat.boxv[(1, 1)] = 0.01;
        let pres = Matrix3::identity() * 1000.0;
        parrinello_rahman_pcoupl(&config, 0, 0.002, &pres, &mut barostat, true).expect("pr step");
        assert_eq!(barostat.boxv[(1, 1)], 0.01);
        assert_relative_eq!(barostat.m_coupling[(1, 1)], 0.01 / 3.0, epsilon = 1e-14);
        assert_relative_eq!(barostat.mu[(1, 1)], 1.0 + 0.002 * 0.01 / 3.0, epsilon = 1e-14);
    }

    #[test]
    fn singular_box_is_rejected() {
        let config = pr_config(PressureCouplingType::Isotropic);
        let mut barostat = BarostatState::new(Matrix3::zeros(), config.pcoupl_type);
        let err = parrinello_rahman_pcoupl(&config, 0, 0.002, &Matrix3::zeros(), &mut barostat, false)
            .expect_err("zero box");
        assert!(matches!(err, CouplingError::SingularBox));
    }
}
