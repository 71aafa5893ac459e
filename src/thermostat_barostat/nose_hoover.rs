/*
Nose-Hoover chains.

The chain propagator is shared by the particle thermostat (one chain per
temperature group) and the barostat thermostat (one chain acting on the
barostat velocity). Each call integrates the chain over `dtfull` with a
5-term Suzuki-Yoshida factorization, repeated 5 times, and returns the
velocity scale factor the chain applied to whatever it thermostats.

Link j > 0 is driven by the kinetic energy of link j-1:

    G_0 = Qinv_0 (2K - Nf kT)
    G_j = Qinv_j (vxi_{j-1}^2 / Qinv_{j-1} - kT)

A link with non-positive inverse mass feels no force.
*/

use log::debug;

use crate::config::GroupOptions;
use crate::constants::{BOLTZ, SUZUKI_YOSHIDA_5, SUZUKI_YOSHIDA_NUM};
use crate::state::{KineticEnergyData, NhChainState};

/// What the chains act on
pub enum NhcTarget<'a> {
    /// Particle groups; `scalefac[i]` is multiplied by chain i's scaling
    Thermostat { scalefac: &'a mut [f64] },
    /// The MTTK barostat velocity, scaled in place
    Barostat { veta: &'a mut f64, winv: f64 },
}

/// Thermal forces on all links for the current chain state
fn thermal_forces(gq: &mut [f64], vxi: &[f64], qinv: &[f64], ekin: f64, nd: f64, kt: f64) {
    let nh = vxi.len();
    gq[0] = qinv[0] * (ekin - nd * kt);
    for j in 0..nh - 1 {
        gq[j + 1] = link_force(vxi[j], qinv[j], qinv[j + 1], kt);
    }
}

fn link_force(vxi_inner: f64, qinv_inner: f64, qinv_outer: f64, kt: f64) -> f64 {
    if qinv_outer > 0.0 {
        qinv_outer * ((vxi_inner * vxi_inner / qinv_inner) - kt)
    } else {
        0.0
    }
}

/*
Propagate a single chain over `dtfull`.

ekin is twice the kinetic energy of the thermostatted degrees of freedom.
Returns the product of all velocity scale factors applied during the step;
the thermostatted kinetic energy is tracked internally so later sub-steps see
the already-scaled value.
 */
pub(crate) fn propagate_chain(
    xi: &mut [f64],
    vxi: &mut [f64],
    qinv: &[f64],
    mut ekin: f64,
    nd: f64,
    kt: f64,
    dtfull: f64,
    update_xi: bool,
) -> f64 {
    let nh = vxi.len();
    let ns = SUZUKI_YOSHIDA_NUM;
    let mut gq = vec![0.0; nh];
    let mut scale = 1.0;

    for _mi in 0..ns {
        for w in SUZUKI_YOSHIDA_5.iter() {
            let dt = w * dtfull / ns as f64;

            thermal_forces(&mut gq, vxi, qinv, ekin, nd, kt);

            // outermost link first, then inward
            vxi[nh - 1] += 0.25 * dt * gq[nh - 1];
            for j in (1..nh).rev() {
                let efac = (-0.125 * dt * vxi[j]).exp();
                vxi[j - 1] = efac * (vxi[j - 1] * efac + 0.25 * dt * gq[j - 1]);
            }

            let efac = (-0.5 * dt * vxi[0]).exp();
            scale *= efac;
            ekin *= efac * efac;

            gq[0] = qinv[0] * (ekin - nd * kt);

            if update_xi {
                for (x, v) in xi.iter_mut().zip(vxi.iter()) {
                    *x += 0.5 * dt * v;
                }
            }

            // innermost link first, then outward
            for j in 0..nh - 1 {
                let efac = (-0.125 * dt * vxi[j + 1]).exp();
                vxi[j] = efac * (vxi[j] * efac + 0.25 * dt * gq[j]);
                gq[j + 1] = link_force(vxi[j], qinv[j], qinv[j + 1], kt);
            }
            vxi[nh - 1] += 0.25 * dt * gq[nh - 1];
        }
    }
    scale
}

/// Twice the kinetic energy a particle chain sees, including pending chain scaling
pub fn chain_kinetic_energy(ekind: &KineticEnergyData, group: usize, ekin_ave_vel: bool) -> f64 {
    let stats = &ekind.groups[group];
    if ekin_ave_vel {
        2.0 * stats.ekinf.trace() * stats.ekinscalef_nhc
    } else {
        2.0 * stats.ekinh.trace() * stats.ekinscaleh_nhc
    }
}

/*
Propagate `chains` over `dtfull`.

Thermostat mode reads the kinetic energy of every group from `ekind` and
multiplies `scalefac[i]`; callers start from 1 and may call repeatedly to
compose nested operations. Barostat mode thermostats the single barostat
degree of freedom at the reference temperature of the first group.
 */
pub fn nhc_trotter(
    groups: &[GroupOptions],
    ekind: &KineticEnergyData,
    dtfull: f64,
    chains: &mut NhChainState,
    qinv: &[Vec<f64>],
    target: NhcTarget<'_>,
    ekin_ave_vel: bool,
    update_xi: bool,
) {
    match target {
        NhcTarget::Thermostat { scalefac } => {
            for (i, scale) in scalefac.iter_mut().enumerate() {
                let g = &groups[i];
                let kt = BOLTZ * g.ref_t.max(0.0);
                let ekin = chain_kinetic_energy(ekind, i, ekin_ave_vel);
                let (xi, vxi) = chains.chain_mut(i);
                *scale *= propagate_chain(xi, vxi, &qinv[i], ekin, g.nrdf, kt, dtfull, update_xi);
                debug!("NHC group {}: scalefac = {:.10}, vxi[0] = {:.6e}", i, scale, vxi[0]);
            }
        }
        NhcTarget::Barostat { veta, winv } => {
            let kt = BOLTZ * groups[0].ref_t.max(0.0);
            for i in 0..chains.num_chains() {
                let ekin = if winv > 0.0 { *veta * *veta / winv } else { 0.0 };
                let (xi, vxi) = chains.chain_mut(i);
                // one barostat degree of freedom for an isotropic barostat
                *veta *= propagate_chain(xi, vxi, &qinv[i], ekin, 1.0, kt, dtfull, update_xi);
                debug!("NHC barostat chain {}: veta = {:.6e}", i, veta);
            }
        }
    }
}

/*
Leap-frog Nose-Hoover without chains: a single friction variable per group,
driven by the half-step temperature.
 */
pub fn nosehoover_tcoupl(
    groups: &[GroupOptions],
    ekind: &KineticEnergyData,
    dt: f64,
    chains: &mut NhChainState,
    qinv: &[Vec<f64>],
) {
    for (i, g) in groups.iter().enumerate() {
        let reft = g.ref_t.max(0.0);
        let (xi, vxi) = chains.chain_mut(i);
        let oldvxi = vxi[0];
        vxi[0] += dt * qinv[i][0] * (ekind.groups[i].th - reft);
        xi[0] += dt * (oldvxi + vxi[0]) * 0.5;
    }
}
