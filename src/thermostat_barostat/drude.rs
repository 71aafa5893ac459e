/*
Nose-Hoover thermostat for polarizable (Drude) systems.

Each heavy atom and its Drude particle are thermostatted in the frame of the
pair: the center-of-mass motion couples to the chain of the atom's group g,
the internal (relative) motion to the chain of group g + 1, which is
normally kept much colder. Non-polarizable atoms couple to their own group.

A coupling operation is split into `tsteps` sub-steps. Every sub-step
removes the global center-of-mass drift, measures pair kinetic energies,
propagates the chains, scales COM and internal velocities with separate
factors and puts the drift back.
*/

use itertools::izip;
use log::{debug, warn};
use nalgebra::{Matrix3, Vector3};

use crate::comm::GroupReduction;
use crate::config::GroupOptions;
use crate::constants::DIM;
use crate::error::{CouplingError, CouplingResult};
use crate::state::{AtomData, DrudePair, ExtendedMasses, KineticEnergyData, NhChainState, ParticleType};
use crate::tensors;

use super::nose_hoover::{nhc_trotter, NhcTarget};

/// Global center-of-mass velocity removed by [`DrudeAdapter::subtract_drift`]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ComDrift(pub Vector3<f64>);

#[derive(Clone, Debug, PartialEq)]
pub struct DrudeAdapter {
    pairs: Vec<DrudePair>,
    /// Local indices of atoms without a Drude partner
    plain: Vec<usize>,
    /// Total (global) mass of every temperature group
    group_masses: Vec<f64>,
    tsteps: usize,
}

impl DrudeAdapter {
    /*
    Check the pair list against the group layout. The internal motion of a
    pair is thermostatted by the group following the atom's group, so that
    group has to exist.
     */
    pub fn new(
        atoms: &AtomData,
        pairs: Vec<DrudePair>,
        group_masses: Vec<f64>,
        tsteps: usize,
    ) -> CouplingResult<Self> {
        let ngtc = group_masses.len();
        let mut in_pair = vec![false; atoms.len()];

        for pair in pairs.iter() {
            if pair.atom >= atoms.len() || pair.drude >= atoms.len() {
                return Err(CouplingError::config(format!(
                    "Drude pair ({}, {}) refers to a particle that is not present",
                    pair.atom, pair.drude
                )));
            }
            let g = atoms.tc_group[pair.atom];
            if g + 1 >= ngtc {
                return Err(CouplingError::config(format!(
                    "atom {} is in temperature group {}, but its Drude particle needs group {} for internal motion and only {} groups exist",
                    atoms.global(pair.atom),
                    g,
                    g + 1,
                    ngtc
                )));
            }
            if atoms.tc_group[pair.drude] != g + 1 {
                warn!(
                    "Drude particle {} is in temperature group {}, its internal motion is coupled to group {}",
                    atoms.global(pair.drude),
                    atoms.tc_group[pair.drude],
                    g + 1
                );
            }
            in_pair[pair.atom] = true;
            in_pair[pair.drude] = true;
        }

        let plain = (0..atoms.len())
            .filter(|&i| !in_pair[i] && atoms.ptype[i] == ParticleType::Atom)
            .collect();

        if group_masses.iter().sum::<f64>() <= 0.0 {
            return Err(CouplingError::config("Drude thermostat needs a positive total mass"));
        }
        if tsteps == 0 {
            return Err(CouplingError::config("Drude thermostat needs at least one sub-step"));
        }

        Ok(Self {
            pairs,
            plain,
            group_masses,
            tsteps,
        })
    }

    pub fn pairs(&self) -> &[DrudePair] {
        &self.pairs
    }

    pub fn plain_atoms(&self) -> &[usize] {
        &self.plain
    }

    /*
    Remove the center-of-mass velocity of all thermostatted particles.
    Momenta are accumulated per group of the heavy atom and reduced over
    all ranks before the drift is formed.
     */
    pub fn subtract_drift(
        &self,
        atoms: &AtomData,
        v: &mut [Vector3<f64>],
        reduction: &dyn GroupReduction,
    ) -> ComDrift {
        let ngtc = self.group_masses.len();
        let mut momentum = vec![0.0; DIM * ngtc];

        for pair in self.pairs.iter() {
            let g = atoms.tc_group[pair.atom];
            let p = v[pair.atom] * pair.atom_mass + v[pair.drude] * pair.drude_mass;
            for d in 0..DIM {
                momentum[g * DIM + d] += p[d];
            }
        }
        for &i in self.plain.iter() {
            let g = atoms.tc_group[i];
            let p = v[i] * atoms.mass[i];
            for d in 0..DIM {
                momentum[g * DIM + d] += p[d];
            }
        }

        reduction.sum(&mut momentum);

        let mtot: f64 = self.group_masses.iter().sum();
        let mut absv = Vector3::zeros();
        for g in 0..ngtc {
            absv += Vector3::new(momentum[g * DIM], momentum[g * DIM + 1], momentum[g * DIM + 2]);
        }
        absv /= mtot;

        self.shift(v, -absv);
        debug!("Drude: removed COM drift {:?}", absv);
        ComDrift(absv)
    }

    /// Put back a drift removed by [`DrudeAdapter::subtract_drift`]
    pub fn restore_drift(&self, v: &mut [Vector3<f64>], drift: ComDrift) {
        self.shift(v, drift.0);
    }

    fn shift(&self, v: &mut [Vector3<f64>], dv: Vector3<f64>) {
        for pair in self.pairs.iter() {
            v[pair.atom] += dv;
            v[pair.drude] += dv;
        }
        for &i in self.plain.iter() {
            v[i] += dv;
        }
    }

    /*
    Full-step kinetic energies seen by the chains: COM motion of each pair
    in the atom's group, relative motion with the reduced mass in the next
    group, plain atoms in their own group. Pending chain scaling is reset
    because the tensors are rebuilt from the current velocities. Velocities
    are left as they were.
     */
    pub fn nosehoover_ke(
        &self,
        atoms: &AtomData,
        v: &mut [Vector3<f64>],
        ekind: &mut KineticEnergyData,
        reduction: &dyn GroupReduction,
    ) {
        let ngtc = ekind.groups.len();
        for stats in ekind.groups.iter_mut() {
            stats.ekinh_old = stats.ekinh;
            stats.ekinf = Matrix3::zeros();
            stats.ekinscalef_nhc = 1.0;
        }

        let drift = self.subtract_drift(atoms, v, reduction);

        let mut total = Matrix3::zeros();
        for (&m, &ptype, vi) in izip!(&atoms.mass, &atoms.ptype, v.iter()) {
            if ptype != ParticleType::VirtualSite {
                total += tensors::scaled_outer(vi, vi, 0.5 * m);
            }
        }

        let mut group_ekin = vec![Matrix3::zeros(); ngtc];
        for pair in self.pairs.iter() {
            let g = atoms.tc_group[pair.atom];
            let (va, vb) = (v[pair.atom], v[pair.drude]);
            let mtot = pair.total_mass();
            let vcom = (va * pair.atom_mass + vb * pair.drude_mass) / mtot;
            group_ekin[g] += tensors::scaled_outer(&vcom, &vcom, 0.5 * mtot);

            let vrel = vb - va;
            group_ekin[g + 1] += tensors::scaled_outer(&vrel, &vrel, 0.5 * pair.reduced_mass());
        }
        for &i in self.plain.iter() {
            let g = atoms.tc_group[i];
            group_ekin[g] += tensors::scaled_outer(&v[i], &v[i], 0.5 * atoms.mass[i]);
        }

        self.restore_drift(v, drift);

        // group tensors followed by the total tensor
        let mut buffer: Vec<f64> = group_ekin
            .iter()
            .chain(std::iter::once(&total))
            .flat_map(|m| tensors::to_rows(m).into_iter().flatten())
            .collect();
        reduction.sum(&mut buffer);

        for (g, stats) in ekind.groups.iter_mut().enumerate() {
            stats.ekinf = Matrix3::from_row_slice(&buffer[g * 9..(g + 1) * 9]);
        }
        ekind.ekin = Matrix3::from_row_slice(&buffer[ngtc * 9..(ngtc + 1) * 9]);
    }

    /*
    One particle-chain operation over `dt`. The chains are advanced in
    `tsteps` sub-steps; the first half of each sub-step only updates chain
    velocities, the second half also the chain positions. Velocities are
    scaled here, so the caller must not scale them again.
     */
    pub fn thermostat(
        &self,
        groups: &[GroupOptions],
        masses: &ExtendedMasses,
        chains: &mut NhChainState,
        ekind: &mut KineticEnergyData,
        atoms: &AtomData,
        v: &mut [Vector3<f64>],
        reduction: &dyn GroupReduction,
        dt: f64,
    ) {
        let ngtc = groups.len();
        let nh = chains.chain_length();
        let dtsy = dt / self.tsteps as f64;
        let mut scalefac = vec![1.0; ngtc];

        for n in 0..self.tsteps {
            self.nosehoover_ke(atoms, v, ekind, reduction);
            nhc_trotter(groups, ekind, dtsy, chains, &masses.qinv, NhcTarget::Thermostat { scalefac: &mut scalefac }, true, false);

            let expfac: Vec<f64> = (0..ngtc).map(|i| (-chains.vxi[i * nh] * 0.5 * dtsy).exp()).collect();

            let drift = self.subtract_drift(atoms, v, reduction);

            for pair in self.pairs.iter() {
                let g = atoms.tc_group[pair.atom];
                let fac_ext = expfac[g];
                let fac_int = expfac[g + 1];
                let (va, vb) = (v[pair.atom], v[pair.drude]);
                let vcom = (va * pair.atom_mass + vb * pair.drude_mass) / pair.total_mass();

                v[pair.atom] = vcom * fac_ext + (va - vcom) * fac_int;
                v[pair.drude] = vcom * fac_ext + (vb - vcom) * fac_int;
            }
            for &i in self.plain.iter() {
                v[i] *= expfac[atoms.tc_group[i]];
            }

            self.restore_drift(v, drift);

            self.nosehoover_ke(atoms, v, ekind, reduction);
            nhc_trotter(groups, ekind, dtsy, chains, &masses.qinv, NhcTarget::Thermostat { scalefac: &mut scalefac }, true, true);

            debug!("Drude sub-step {}: expfac {:?}", n, expfac);
        }
    }
}
