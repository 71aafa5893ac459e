/*
Berendsen weak coupling for temperature and pressure.

Both schemes relax exponentially toward the reference with time constant tau
and do not sample a proper ensemble. The thermostat produces one velocity
scale factor per group; the barostat produces a lower-triangular coordinate
scaling matrix mu that is then applied to positions and box.
*/

use log::{debug, warn};
use nalgebra::{Matrix3, Vector3};
use rayon::prelude::*;

use crate::config::CouplingConfig;
use crate::constants::{BERENDSEN_LAMBDA_MAX, BERENDSEN_LAMBDA_MIN, DIM, MAX_BOX_SCALING_DEVIATION};
use crate::ensembles::PressureCouplingType;
use crate::periodic_boundary_conditions;
use crate::state::KineticEnergyData;

const XX: usize = 0;
const YY: usize = 1;
const ZZ: usize = 2;

/*
lambda = sqrt(1 + dt/tau (T_ref/T - 1)) per group, clamped to
[0.8, 1.25]. Velocity Verlet couples to the full-step temperature, leap-frog
to the half-step one.
 */
pub fn berendsen_tcoupl(config: &CouplingConfig, ekind: &mut KineticEnergyData, dt: f64) {
    let full_step = config.integrator.uses_full_step_ekin();
    for (i, (opts, stats)) in config.groups.iter().zip(ekind.groups.iter_mut()).enumerate() {
        let t = if full_step { stats.t } else { stats.th };

        stats.lambda = if opts.tau_t > 0.0 && t > 0.0 {
            let reft = opts.ref_t.max(0.0);
            let lll = (1.0 + (dt / opts.tau_t) * (reft / t - 1.0)).max(0.0).sqrt();
            lll.clamp(BERENDSEN_LAMBDA_MIN, BERENDSEN_LAMBDA_MAX)
        } else {
            1.0
        };

        debug!("TC: group {}: T: {}, Lambda: {}", i, t, stats.lambda);
    }
}

/*
Scaling matrix for one Berendsen pressure-coupling step. `pres` is the
pressure tensor in bar, `b` the current box. The returned matrix is lower
triangular: the upper off-diagonal corrections are folded into the lower
triangle to first order so that the box keeps its orientation.
 */
pub fn berendsen_pcoupl(
    config: &CouplingConfig,
    step: i64,
    dt: f64,
    pres: &Matrix3<f64>,
    b: &Matrix3<f64>,
) -> Matrix3<f64> {
    let ref_p = config.ref_p_matrix();
    let compress = config.compress_matrix();
    let factor = |d: usize, m: usize| compress[(d, m)] * dt / config.tau_p;
    let ndim = DIM as f64;

    let scalar_pressure = pres.trace() / ndim;
    let xy_pressure = (pres[(XX, XX)] + pres[(YY, YY)]) / (ndim - 1.0);

    let mut mu = Matrix3::zeros();
    match config.pcoupl_type {
        PressureCouplingType::Isotropic => {
            for d in 0..DIM {
                mu[(d, d)] = 1.0 - factor(d, d) * (ref_p[(d, d)] - scalar_pressure) / ndim;
            }
        }
        PressureCouplingType::SemiIsotropic => {
            for d in 0..ZZ {
                mu[(d, d)] = 1.0 - factor(d, d) * (ref_p[(d, d)] - xy_pressure) / ndim;
            }
            mu[(ZZ, ZZ)] = 1.0 - factor(ZZ, ZZ) * (ref_p[(ZZ, ZZ)] - pres[(ZZ, ZZ)]) / ndim;
        }
        PressureCouplingType::Anisotropic => {
            for d in 0..DIM {
                for n in 0..DIM {
                    let unit = if d == n { 1.0 } else { 0.0 };
                    mu[(d, n)] = unit - factor(d, n) * (ref_p[(d, n)] - pres[(d, n)]) / ndim;
                }
            }
        }
        PressureCouplingType::SurfaceTension => {
            /*
            ref_p xx/yy hold the reference surface tension times the number
            of surfaces. Without z compressibility the z correction vanishes
            so that the surface tension comes out right.
             */
            let p_corr_z = if compress[(ZZ, ZZ)] != 0.0 {
                dt / config.tau_p * (ref_p[(ZZ, ZZ)] - pres[(ZZ, ZZ)])
            } else {
                0.0
            };
            mu[(ZZ, ZZ)] = 1.0 - compress[(ZZ, ZZ)] * p_corr_z;
            for d in 0..DIM - 1 {
                mu[(d, d)] = 1.0
                    + factor(d, d)
                        * (ref_p[(d, d)] / (mu[(ZZ, ZZ)] * b[(ZZ, ZZ)])
                            - (pres[(ZZ, ZZ)] + p_corr_z - xy_pressure))
                        / (ndim - 1.0);
            }
        }
    }

    mu[(YY, XX)] += mu[(XX, YY)];
    mu[(ZZ, XX)] += mu[(XX, ZZ)];
    mu[(ZZ, YY)] += mu[(YY, ZZ)];
    mu[(XX, YY)] = 0.0;
    mu[(XX, ZZ)] = 0.0;
    mu[(YY, ZZ)] = 0.0;

    debug!("PC: pres {:?}, mu {:?}", pres, mu);

    let out_of_range = (0..DIM).any(|d| (mu[(d, d)] - 1.0).abs() > MAX_BOX_SCALING_DEVIATION);
    if out_of_range {
        warn!(
            "Step {}  Warning: pressure scaling more than 1%, mu: {} {} {}",
            step,
            mu[(XX, XX)],
            mu[(YY, YY)],
            mu[(ZZ, ZZ)]
        );
    }
    mu
}

/// Row-vector transform by a lower-triangular mu
fn scale_vector(mu: &Matrix3<f64>, x: &Vector3<f64>) -> Vector3<f64> {
    Vector3::new(
        mu[(XX, XX)] * x[XX] + mu[(YY, XX)] * x[YY] + mu[(ZZ, XX)] * x[ZZ],
        mu[(YY, YY)] * x[YY] + mu[(ZZ, YY)] * x[ZZ],
        mu[(ZZ, ZZ)] * x[ZZ],
    )
}

/// Scale positions and box by mu, then restore the reference box shape
pub fn berendsen_pscale(
    config: &CouplingConfig,
    mu: &Matrix3<f64>,
    b: &mut Matrix3<f64>,
    box_rel: &Matrix3<f64>,
    x: &mut [Vector3<f64>],
) {
    x.par_iter_mut().for_each(|xi| *xi = scale_vector(mu, xi));

    for d in 0..DIM {
        let row = Vector3::new(b[(d, XX)], b[(d, YY)], b[(d, ZZ)]);
        let scaled = scale_vector(mu, &row);
        for m in 0..DIM {
            b[(d, m)] = scaled[m];
        }
    }

    periodic_boundary_conditions::preserve_box_shape(config.pcoupl, config.pcoupl_type, box_rel, b);
}
