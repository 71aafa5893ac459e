/*
Per-particle velocity scaling.

Every particle is scaled by a factor belonging to its temperature group.
Particles are independent, so the loops run on the rayon pool; the factors
themselves must already be final (reduced over all ranks) when these are
called.
*/

use nalgebra::Vector3;
use rayon::prelude::*;

use crate::state::{AtomData, KineticEnergyData};

/// Multiply every velocity by `factors[group of the particle]`
pub fn scale_by_group(atoms: &AtomData, v: &mut [Vector3<f64>], factors: &[f64]) {
    v.par_iter_mut()
        .zip(atoms.tc_group.par_iter())
        .for_each(|(vi, &g)| *vi *= factors[g]);
}

/// Apply the Berendsen or v-rescale `lambda` of each group to the velocities
pub fn rescale_velocities(ekind: &KineticEnergyData, atoms: &AtomData, v: &mut [Vector3<f64>]) {
    let lambdas: Vec<f64> = ekind.groups.iter().map(|g| g.lambda).collect();
    scale_by_group(atoms, v, &lambdas);
}
