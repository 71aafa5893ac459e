/*
Inverse masses of the extended degrees of freedom.

Chain masses follow from the coupling period: a chain link with inverse mass
Qinv = 1/((tau/2pi)^2 Nf kT) oscillates with period tau when the system is at
the reference temperature. A group without a positive coupling time or
reference temperature gets zero inverse masses, which freezes its chain.
*/

use log::info;
use nalgebra::Matrix3;

use crate::config::CouplingConfig;
use crate::constants::{BOLTZ, DIM, PRESFAC, TWO_PI};
use crate::ensembles::Integrator;
use crate::state::{ExtendedMasses, NUM_BAROSTAT_CHAINS};

/// Mass factor of the first barostat chain link (isotropic barostat)
const BAROSTAT_CHAIN_MASS_FACTOR: f64 = (DIM * DIM) as f64;

impl ExtendedMasses {
    /*
    `vol0` is the reference volume the compressibility refers to; the host
    keeps it fixed for the whole run so that recomputing masses after an
    annealing update only reflects the temperature change.
     */
    pub fn compute(config: &CouplingConfig, vol0: f64) -> Self {
        let ngtc = config.ngtc();
        let nh = config.nhchainlength;
        let mut qinv = vec![vec![0.0; nh]; ngtc];
        let mut winv = 0.0;
        let mut winvm = Matrix3::zeros();

        if config.integrator == Integrator::Md {
            for (i, g) in config.groups.iter().enumerate() {
                if g.tau_t > 0.0 && g.ref_t > 0.0 {
                    qinv[i][0] = 1.0 / ((g.tau_t / TWO_PI).powi(2) * g.ref_t);
                }
            }
        } else {
            let ref_t0 = config.groups[0].ref_t;
            let period = (config.tau_p / TWO_PI).powi(2);
            if vol0 > 0.0 && config.tau_p > 0.0 {
                let compress = config.compress_matrix();
                winv = (PRESFAC * compress.trace() * BOLTZ * ref_t0) / (DIM as f64 * vol0 * period);
                winvm = compress * (PRESFAC / (vol0 * period));
            }

            for (i, g) in config.groups.iter().enumerate() {
                if g.tau_t > 0.0 && g.ref_t > 0.0 {
                    let kt = BOLTZ * g.ref_t;
                    for (j, q) in qinv[i].iter_mut().enumerate() {
                        // the first link drives all particle degrees of freedom
                        let ndj = if j == 0 { g.nrdf } else { 1.0 };
                        *q = 1.0 / ((g.tau_t / TWO_PI).powi(2) * ndj * kt);
                    }
                }
            }
        }

        let mut qpinv = vec![vec![0.0; nh]; NUM_BAROSTAT_CHAINS];
        let g0 = &config.groups[0];
        if config.tau_p > 0.0 && g0.ref_t > 0.0 {
            let kt = BOLTZ * g0.ref_t;
            for chain in qpinv.iter_mut() {
                for (j, q) in chain.iter_mut().enumerate() {
                    let qmass = if j == 0 { BAROSTAT_CHAIN_MASS_FACTOR } else { 1.0 };
                    *q = 1.0 / ((g0.tau_t / TWO_PI).powi(2) * qmass * kt);
                }
            }
        }

        info!(
            "extended masses: {} groups x {} links, Winv = {:.6e}",
            ngtc, nh, winv
        );

        Self {
            qinv,
            qpinv,
            winv,
            winvm,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GroupOptions;
    use crate::ensembles::{PressureCoupling, TemperatureCoupling};
    use approx::assert_relative_eq;

    fn vv_config() -> CouplingConfig {
        CouplingConfig {
            integrator: Integrator::VelocityVerlet,
            tcoupl: TemperatureCoupling::NoseHoover,
            pcoupl: PressureCoupling::Mttk,
            nhchainlength: 3,
            groups: vec![GroupOptions::new(300.0, 0.1, 100.0), GroupOptions::new(0.0, 0.1, 10.0)],
            ..CouplingConfig::default()
        }
    }

    #[test]
    fn first_link_carries_all_degrees_of_freedom() {
        let masses = ExtendedMasses::compute(&vv_config(), 27.0);
        let q = &masses.qinv[0];
        assert_relative_eq!(q[0] * 100.0, q[1], epsilon = 1e-12);
        assert_eq!(q[1], q[2]);
        let kt = BOLTZ * 300.0;
        assert_relative_eq!(q[1], 1.0 / ((0.1 / TWO_PI).powi(2) * kt), epsilon = 1e-9);
    }

    #[test]
    fn zero_reference_temperature_freezes_chain() {
        let masses = ExtendedMasses::compute(&vv_config(), 27.0);
        assert!(masses.qinv[1].iter().all(|&q| q == 0.0));
    }

    #[test]
    fn barostat_mass_scales_with_compressibility() {
        let config = vv_config();
        let masses = ExtendedMasses::compute(&config, 27.0);
        let period = (config.tau_p / TWO_PI).powi(2);
        let expected = PRESFAC * 3.0 * 4.5e-5 * BOLTZ * 300.0 / (3.0 * 27.0 * period);
        assert_relative_eq!(masses.winv, expected, epsilon = 1e-12);
        assert_relative_eq!(masses.winvm[(0, 0)], PRESFAC * 4.5e-5 / (27.0 * period), epsilon = 1e-12);
        assert_eq!(masses.winvm[(0, 1)], 0.0);
    }

    #[test]
    fn barostat_chain_first_link_is_heavier() {
        let masses = ExtendedMasses::compute(&vv_config(), 27.0);
        let qp = &masses.qpinv[0];
        assert_relative_eq!(qp[0] * 9.0, qp[1], epsilon = 1e-12);
    }

    #[test]
    fn leapfrog_uses_single_link() {
        let config = CouplingConfig {
            integrator: Integrator::Md,
            nhchainlength: 1,
            ..vv_config()
        };
        let masses = ExtendedMasses::compute(&config, 27.0);
        assert_relative_eq!(masses.qinv[0][0], 1.0 / ((0.1 / TWO_PI).powi(2) * 300.0), epsilon = 1e-9);
        assert_eq!(masses.winv, 0.0);
    }
}
