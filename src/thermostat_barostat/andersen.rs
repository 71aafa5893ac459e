/*
Andersen thermostat.

Selected particles get a fresh velocity from the Maxwell-Boltzmann
distribution of their group's reference temperature. Selection and the new
velocity are both keyed on the global particle index and the step, so the
outcome does not depend on how particles are distributed over ranks or
threads. The selection draw uses stream step*2, the velocity draw step*2+1.
*/

use log::debug;
use nalgebra::Vector3;
use rayon::prelude::*;

use crate::config::CouplingConfig;
use crate::constants::BOLTZ;
use crate::ensembles::TemperatureCoupling;
use crate::random::{gaussian_triple, uniform_pair, RandomStream};
use crate::state::AtomData;

/// Per-group Andersen parameters derived from the configuration
#[derive(Clone, Debug, PartialEq)]
pub struct AndersenSettings {
    pub massive: bool,
    /// Groups with a positive coupling time take part
    pub randomize: Vec<bool>,
    /// kT of each group
    pub boltzfac: Vec<f64>,
    /// Per-particle collision probability per coupling step
    pub rate: Vec<f64>,
    /// Massive randomization happens every this many steps
    pub massive_interval: i64,
    pub seed: i64,
}

impl AndersenSettings {
    pub fn new(config: &CouplingConfig) -> Self {
        let dtc = config.tcouple_dt();
        let randomize = config.groups.iter().map(|g| g.tau_t > 0.0).collect();
        let boltzfac = config.groups.iter().map(|g| BOLTZ * g.ref_t).collect();
        let rate = config
            .groups
            .iter()
            .map(|g| if g.tau_t > 0.0 { dtc / g.tau_t } else { 0.0 })
            .collect();
        let massive_interval = if config.groups[0].tau_t > 0.0 {
            ((config.groups[0].tau_t / dtc).round() as i64).max(1)
        } else {
            1
        };
        Self {
            massive: config.tcoupl == TemperatureCoupling::AndersenMassive,
            randomize,
            boltzfac,
            rate,
            massive_interval,
            seed: config.andersen_seed,
        }
    }

    /// Reference temperatures changed, e.g. by annealing
    pub fn update_temperatures(&mut self, config: &CouplingConfig) {
        for (fac, g) in self.boltzfac.iter_mut().zip(config.groups.iter()) {
            *fac = BOLTZ * g.ref_t;
        }
    }

    /// Whether `step` randomizes at all
    pub fn is_randomization_step(&self, step: i64) -> bool {
        !self.massive || step % self.massive_interval == 0
    }
}

/*
Randomize the velocities of the selected local particles. Returns whether
this step randomized, in which case the host has to recompute kinetic
energies and constraints.
 */
pub fn andersen_tcoupl(
    settings: &AndersenSettings,
    step: i64,
    atoms: &AtomData,
    v: &mut [Vector3<f64>],
) -> bool {
    if !settings.is_randomization_step(step) {
        return false;
    }

    v.par_iter_mut().enumerate().for_each(|(i, vi)| {
        let gc = atoms.tc_group[i];
        if !settings.randomize[gc] {
            return;
        }
        let ng = atoms.global(i) as i64;
        let selected = settings.massive
            || uniform_pair(step * 2, ng, settings.seed, RandomStream::Andersen)[0] < settings.rate[gc];
        if selected {
            let scal = (settings.boltzfac[gc] * atoms.inv_mass[i]).sqrt();
            let gauss = gaussian_triple(step * 2 + 1, ng, settings.seed, RandomStream::Andersen);
            *vi = Vector3::new(gauss[0], gauss[1], gauss[2]) * scal;
        }
    });

    debug!("Andersen randomization at step {}", step);
    true
}
