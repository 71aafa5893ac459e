/*
Kinetic energy, temperature and pressure.

Pure functions from kinetic-energy tensors and the virial to scalar
temperature and pressure, plus the per-group kinetic-energy accumulation the
host runs before every coupling step.
*/

use log::debug;
use nalgebra::{Matrix3, Vector3};

use crate::comm::GroupReduction;
use crate::config::GroupOptions;
use crate::constants::{BOLTZ, DIM, PRESFAC};
use crate::ensembles::PbcType;
use crate::state::{AtomData, KineticEnergyData, ParticleType};
use crate::tensors;

/// Temperature from a kinetic energy and degrees of freedom; 0 without DOF
pub fn calc_temp(ekin: f64, nrdf: f64) -> f64 {
    if nrdf > 0.0 {
        (2.0 * ekin) / (nrdf * BOLTZ)
    } else {
        0.0
    }
}

/*
Pressure tensor P = 2/V (Ekin - Xi) in bar, with Xi the virial. Returns the
scalar pressure trace(P)/3 together with the tensor. Without periodicity, or
with xy periodicity and no pair of walls, pressure is undefined and zero.
 */
pub fn calc_pres(
    pbc: PbcType,
    nwall: usize,
    box_matrix: &Matrix3<f64>,
    ekin: &Matrix3<f64>,
    vir: &Matrix3<f64>,
) -> (f64, Matrix3<f64>) {
    if pbc == PbcType::No || (pbc == PbcType::Xy && nwall != 2) {
        return (0.0, Matrix3::zeros());
    }
    let fac = PRESFAC * 2.0 / tensors::box_volume(box_matrix);
    let pres = (ekin - vir) * fac;
    (pres.trace() / DIM as f64, pres)
}

/*
Accumulate per-group kinetic energy tensors from the local velocities and
reduce them over all ranks. Half-step accumulation shifts the previous
half-step tensor into `ekinh_old` first. Virtual sites carry no kinetic
energy.
 */
pub fn group_kinetic_energy(
    atoms: &AtomData,
    v: &[Vector3<f64>],
    ekind: &mut KineticEnergyData,
    half_step: bool,
    reduction: &dyn GroupReduction,
) {
    let ngtc = ekind.groups.len();
    let mut buffer = vec![0.0; 9 * ngtc];
    for (i, vi) in v.iter().enumerate() {
        if atoms.ptype[i] == ParticleType::VirtualSite {
            continue;
        }
        let g = atoms.tc_group[i];
        let hm = 0.5 * atoms.mass[i];
        for d in 0..DIM {
            for m in 0..DIM {
                buffer[g * 9 + d * 3 + m] += hm * vi[d] * vi[m];
            }
        }
    }

    // every group tensor has to be complete before temperatures are derived
    reduction.sum(&mut buffer);

    for (g, stats) in ekind.groups.iter_mut().enumerate() {
        let tensor = Matrix3::from_row_slice(&buffer[g * 9..(g + 1) * 9]);
        if half_step {
            stats.ekinh_old = stats.ekinh;
            stats.ekinh = tensor;
        } else {
            stats.ekinf = tensor;
        }
    }
}

/*
Fold the chain scale caches into the full-step tensors, update group
temperatures and the total kinetic energy tensor. Returns the
degrees-of-freedom weighted temperature of the whole system.

ekin_ave_vel: kinetic energy from full-step velocities (velocity Verlet);
otherwise the full step is the average of the two half steps.
scale_ekin: the full-step tensor was already computed from scaled
velocities, so the cache must not be applied again.
 */
pub fn sum_ekin(
    groups: &[GroupOptions],
    ekind: &mut KineticEnergyData,
    ekin_ave_vel: bool,
    scale_ekin: bool,
) -> f64 {
    let mut total = Matrix3::zeros();
    let mut t_sum = 0.0;
    let mut nrdf_sum = 0.0;

    for (opts, stats) in groups.iter().zip(ekind.groups.iter_mut()) {
        let nd = opts.nrdf;
        if nd <= 0.0 {
            stats.t = 0.0;
            stats.th = 0.0;
            continue;
        }
        if ekin_ave_vel {
            if !scale_ekin {
                stats.ekinf *= stats.ekinscalef_nhc;
            }
        } else {
            stats.ekinf = 0.5 * (stats.ekinh_old * stats.ekinscaleh_nhc + stats.ekinh);
        }
        total += stats.ekinf;
        stats.th = calc_temp(stats.ekinh.trace(), nd);
        stats.t = calc_temp(stats.ekinf.trace(), nd);

        // the cached factor is now part of the tensor
        if ekin_ave_vel {
            stats.ekinscalef_nhc = 1.0;
        } else {
            stats.ekinscaleh_nhc = 1.0;
        }

        t_sum += nd * stats.t;
        nrdf_sum += nd;
    }
    ekind.ekin = total;

    let t = if nrdf_sum > 0.0 { t_sum / nrdf_sum } else { 0.0 };
    debug!("sum_ekin: T = {:.4} over {} degrees of freedom", t, nrdf_sum);
    t
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::testing::OffsetReduction;
    use crate::comm::LocalReduction;
    use approx::assert_relative_eq;

    #[test]
    fn temperature_of_zero_dof_is_zero() {
        assert_eq!(calc_temp(10.0, 0.0), 0.0);
    }

    #[test]
    fn equipartition_round_trip() {
        let nrdf = 100.0;
        let ekin = 0.5 * nrdf * BOLTZ * 300.0;
        assert_relative_eq!(calc_temp(ekin, nrdf), 300.0, epsilon = 1e-10);
    }

    #[test]
    fn pressure_is_zero_without_pbc() {
        let b = Matrix3::identity() * 3.0;
        let ekin = Matrix3::identity();
        let (p, tensor) = calc_pres(PbcType::No, 3, &b, &ekin, &Matrix3::zeros());
        assert_eq!(p, 0.0);
        assert_eq!(tensor, Matrix3::zeros());
        let (p, _) = calc_pres(PbcType::Xy, 3, &b, &ekin, &Matrix3::zeros());
        assert_eq!(p, 0.0);
    }

    #[test]
    fn pressure_of_ideal_gas_tensor() {
        let b = Matrix3::identity() * 2.0;
        let ekin = Matrix3::identity() * 4.0;
        let vir = Matrix3::identity() * 1.0;
        let (p, tensor) = calc_pres(PbcType::Xyz, 3, &b, &ekin, &vir);
        let expected = PRESFAC * 2.0 / 8.0 * 3.0;
        assert_relative_eq!(p, expected, epsilon = 1e-12);
        assert_relative_eq!(tensor[(1, 1)], expected, epsilon = 1e-12);
    }

    #[test]
    fn kinetic_energy_per_group() {
        let atoms = AtomData::new(vec![2.0, 1.0, 4.0], vec![0, 1, 0]);
        let v = vec![
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(0.0, 2.0, 0.0),
            Vector3::new(0.0, 0.0, 0.5),
        ];
        let mut ekind = KineticEnergyData::new(2);
        group_kinetic_energy(&atoms, &v, &mut ekind, false, &LocalReduction);
        assert_relative_eq!(ekind.groups[0].ekinf.trace(), 1.0 + 0.5, epsilon = 1e-14);
        assert_relative_eq!(ekind.groups[1].ekinf[(1, 1)], 2.0, epsilon = 1e-14);
    }

    #[test]
    fn kinetic_energy_is_reduced_before_use() {
        let atoms = AtomData::new(vec![1.0], vec![0]);
        let v = vec![Vector3::new(1.0, 0.0, 0.0)];
        let mut remote = vec![0.0; 9];
        remote[0] = 1.5;
        let reduction = OffsetReduction::new(remote);
        let mut ekind = KineticEnergyData::new(1);
        group_kinetic_energy(&atoms, &v, &mut ekind, true, &reduction);
        assert_relative_eq!(ekind.groups[0].ekinh[(0, 0)], 2.0, epsilon = 1e-14);
    }

    #[test]
    fn virtual_sites_carry_no_kinetic_energy() {
        let atoms = AtomData::new(vec![1.0, 1.0], vec![0, 0])
            .with_ptype(vec![ParticleType::Atom, ParticleType::VirtualSite]);
        let v = vec![Vector3::new(1.0, 0.0, 0.0), Vector3::new(10.0, 0.0, 0.0)];
        let mut ekind = KineticEnergyData::new(1);
        group_kinetic_energy(&atoms, &v, &mut ekind, false, &LocalReduction);
        assert_relative_eq!(ekind.groups[0].ekinf.trace(), 0.5, epsilon = 1e-14);
    }

    #[test]
    fn sum_ekin_applies_and_resets_scale_cache() {
        let groups = vec![GroupOptions::new(300.0, 0.1, 3.0)];
        let mut ekind = KineticEnergyData::new(1);
        ekind.groups[0].ekinf = Matrix3::identity();
        ekind.groups[0].ekinscalef_nhc = 0.25;
        let t = sum_ekin(&groups, &mut ekind, true, false);
        assert_relative_eq!(ekind.groups[0].ekinf.trace(), 0.75, epsilon = 1e-14);
        assert_eq!(ekind.groups[0].ekinscalef_nhc, 1.0);
        assert_relative_eq!(t, calc_temp(0.75, 3.0), epsilon = 1e-12);
        assert_relative_eq!(ekind.ekin.trace(), 0.75, epsilon = 1e-14);
    }

    #[test]
    fn leapfrog_full_step_is_half_step_average() {
        let groups = vec![GroupOptions::new(300.0, 0.1, 3.0)];
        let mut ekind = KineticEnergyData::new(1);
        ekind.groups[0].ekinh_old = Matrix3::identity() * 2.0;
        ekind.groups[0].ekinh = Matrix3::identity() * 4.0;
        sum_ekin(&groups, &mut ekind, false, false);
        assert_relative_eq!(ekind.groups[0].ekinf[(0, 0)], 3.0, epsilon = 1e-14);
        assert_relative_eq!(ekind.groups[0].th, calc_temp(12.0, 3.0), epsilon = 1e-10);
    }
}
