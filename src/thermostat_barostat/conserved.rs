/*
Extended-system contributions to the conserved energy.

Nothing here feeds back into the dynamics; the sum is only reported so that
drift of the extended Hamiltonian can be monitored.
*/

use crate::config::CouplingConfig;
use crate::constants::{BOLTZ, DIM, PRESFAC};
use crate::ensembles::{PressureCoupling, PressureCouplingType, TemperatureCoupling, TrotterEnsemble};
use crate::state::{ExtendedMasses, ExtendedSystemState};
use crate::tensors;

use super::vrescale::vrescale_energy;

/// Kinetic energy of the MTTK barostat plus the PV term
fn barostat_energy(config: &CouplingConfig, state: &ExtendedSystemState, masses: &ExtendedMasses) -> f64 {
    if config.pcoupl != PressureCoupling::Mttk || config.pcoupl_type != PressureCouplingType::Isotropic {
        return 0.0;
    }
    let mut energy = 0.0;
    if masses.winv > 0.0 {
        energy += 0.5 * state.barostat.veta * state.barostat.veta / masses.winv;
    }
    let vol = tensors::box_volume(&state.barostat.box_matrix);
    energy + vol * config.ref_p_matrix().trace() / (DIM as f64 * PRESFAC)
}

/// Chains thermostatting the barostat; one degree of freedom each
fn barostat_chain_energy(config: &CouplingConfig, state: &ExtendedSystemState, masses: &ExtendedMasses) -> f64 {
    let kt = BOLTZ * config.groups[0].ref_t.max(0.0);
    let chains = &state.barostat_chains;
    let mut energy = 0.0;
    for i in 0..chains.num_chains() {
        let (xi, vxi) = chains.chain(i);
        for ((x, v), &qinv) in xi.iter().zip(vxi.iter()).zip(masses.qpinv[i].iter()) {
            if qinv > 0.0 {
                energy += 0.5 * v * v / qinv + x * kt;
            }
        }
    }
    energy
}

fn nose_hoover_energy(config: &CouplingConfig, state: &ExtendedSystemState, masses: &ExtendedMasses) -> f64 {
    let chained = matches!(config.trotter_ensemble(), Some(TrotterEnsemble::Nvt | TrotterEnsemble::Npt));
    let mut energy = 0.0;

    for (i, g) in config.groups.iter().enumerate() {
        let nd = g.nrdf;
        if nd <= 0.0 {
            continue;
        }
        let kt = BOLTZ * g.ref_t.max(0.0);
        let (xi, vxi) = state.thermostat_chains.chain(i);
        let qinv = &masses.qinv[i];

        if chained {
            for (j, ((x, v), &q)) in xi.iter().zip(vxi.iter()).zip(qinv.iter()).enumerate() {
                if q > 0.0 {
                    let ndj = if j == 0 { nd } else { 1.0 };
                    energy += 0.5 * v * v / q + ndj * x * kt;
                }
            }
        } else if qinv[0] > 0.0 {
            // leap-frog: a single link with mass in units of kB
            energy += 0.5 * BOLTZ * nd * vxi[0] * vxi[0] / qinv[0] + nd * xi[0] * kt;
        }
    }
    energy
}

/// Total extended-system energy for the conserved-energy report
pub fn npt_energy(config: &CouplingConfig, state: &ExtendedSystemState, masses: &ExtendedMasses) -> f64 {
    let mut energy = barostat_energy(config, state, masses);

    if matches!(config.trotter_ensemble(), Some(TrotterEnsemble::Npt | TrotterEnsemble::Nph)) {
        energy += barostat_chain_energy(config, state, masses);
    }

    match config.tcoupl {
        TemperatureCoupling::No => {}
        TemperatureCoupling::NoseHoover => energy += nose_hoover_energy(config, state, masses),
        TemperatureCoupling::VRescale => energy += vrescale_energy(&state.therm_integral),
        // neither has a conserved extended energy
        TemperatureCoupling::Berendsen | TemperatureCoupling::Andersen | TemperatureCoupling::AndersenMassive => {}
    }
    energy
}
