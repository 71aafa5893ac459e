//! Named state containers shared by the coupling algorithms.
//!
//! The host owns one `ExtendedSystemState` (chain variables, barostat, thermostat
//! integrals) and one `KineticEnergyData` (per-group kinetic energy tensors and
//! scale caches) and passes them by reference into every coupling operation.

use nalgebra::Matrix3;
use serde::{Deserialize, Serialize};

use crate::config::CouplingConfig;
use crate::ensembles::PressureCouplingType;
use crate::periodic_boundary_conditions;
use crate::tensors;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParticleType {
    Atom,
    /// Drude or shell particle
    Shell,
    VirtualSite,
}

/// Per-particle data for the particles local to this process
#[derive(Clone, Debug, Default)]
pub struct AtomData {
    pub mass: Vec<f64>,
    pub inv_mass: Vec<f64>,
    /// Temperature-coupling group of each particle
    pub tc_group: Vec<usize>,
    pub ptype: Vec<ParticleType>,
    /// Global particle index; `None` when local and global numbering coincide
    pub global_index: Option<Vec<usize>>,
}

impl AtomData {
    pub fn new(mass: Vec<f64>, tc_group: Vec<usize>) -> Self {
        let inv_mass = mass.iter().map(|&m| if m > 0.0 { 1.0 / m } else { 0.0 }).collect();
        let ptype = vec![ParticleType::Atom; mass.len()];
        Self {
            mass,
            inv_mass,
            tc_group,
            ptype,
            global_index: None,
        }
    }

    pub fn with_ptype(mut self, ptype: Vec<ParticleType>) -> Self {
        self.ptype = ptype;
        self
    }

    pub fn with_global_index(mut self, global_index: Vec<usize>) -> Self {
        self.global_index = Some(global_index);
        self
    }

    pub fn len(&self) -> usize {
        self.mass.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mass.is_empty()
    }

    pub fn global(&self, local: usize) -> usize {
        match &self.global_index {
            Some(map) => map[local],
            None => local,
        }
    }

    /// Total mass per temperature group, for a single-process run
    pub fn group_masses(&self, ngtc: usize) -> Vec<f64> {
        let mut masses = vec![0.0; ngtc];
        for (&m, &g) in self.mass.iter().zip(self.tc_group.iter()) {
            masses[g] += m;
        }
        masses
    }
}

/// Heavy atom bonded to its Drude particle
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DrudePair {
    pub atom: usize,
    pub drude: usize,
    pub atom_mass: f64,
    pub drude_mass: f64,
}

impl DrudePair {
    pub fn total_mass(&self) -> f64 {
        self.atom_mass + self.drude_mass
    }

    pub fn reduced_mass(&self) -> f64 {
        self.atom_mass * self.drude_mass / self.total_mass()
    }
}

/// Kinetic-energy statistics and scale factors of one temperature group
#[derive(Clone, Debug, PartialEq)]
pub struct GroupCouplingStats {
    /// Half-step kinetic energy tensor (H-type)
    pub ekinh: Matrix3<f64>,
    pub ekinh_old: Matrix3<f64>,
    /// Full-step kinetic energy tensor (F-type)
    pub ekinf: Matrix3<f64>,
    /// Full-step temperature
    pub t: f64,
    /// Half-step temperature
    pub th: f64,
    /// Velocity scale factor of weak and stochastic thermostats
    pub lambda: f64,
    /// Chain scale factor of the last particle-chain operation
    pub vscale_nhc: f64,
    /// Accumulated squared chain scaling not yet folded into `ekinf`
    pub ekinscalef_nhc: f64,
    /// Accumulated squared chain scaling not yet folded into `ekinh`
    pub ekinscaleh_nhc: f64,
}

impl Default for GroupCouplingStats {
    fn default() -> Self {
        Self {
            ekinh: Matrix3::zeros(),
            ekinh_old: Matrix3::zeros(),
            ekinf: Matrix3::zeros(),
            t: 0.0,
            th: 0.0,
            lambda: 1.0,
            vscale_nhc: 1.0,
            ekinscalef_nhc: 1.0,
            ekinscaleh_nhc: 1.0,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct KineticEnergyData {
    pub groups: Vec<GroupCouplingStats>,
    /// Total kinetic energy tensor
    pub ekin: Matrix3<f64>,
}

impl KineticEnergyData {
    pub fn new(ngtc: usize) -> Self {
        Self {
            groups: vec![GroupCouplingStats::default(); ngtc],
            ekin: Matrix3::zeros(),
        }
    }
}

/// Chain positions and velocities for `nvar` chains of length `nh`, stored flat
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NhChainState {
    nh: usize,
    pub xi: Vec<f64>,
    pub vxi: Vec<f64>,
}

impl NhChainState {
    pub fn new(nvar: usize, nh: usize) -> Self {
        Self {
            nh,
            xi: vec![0.0; nvar * nh],
            vxi: vec![0.0; nvar * nh],
        }
    }

    pub fn chain_length(&self) -> usize {
        self.nh
    }

    pub fn num_chains(&self) -> usize {
        if self.nh == 0 {
            0
        } else {
            self.xi.len() / self.nh
        }
    }

    pub fn chain(&self, i: usize) -> (&[f64], &[f64]) {
        let range = i * self.nh..(i + 1) * self.nh;
        (&self.xi[range.clone()], &self.vxi[range])
    }

    pub fn chain_mut(&mut self, i: usize) -> (&mut [f64], &mut [f64]) {
        let range = i * self.nh..(i + 1) * self.nh;
        (&mut self.xi[range.clone()], &mut self.vxi[range])
    }
}

/// Inverse masses of the extended degrees of freedom
#[derive(Clone, Debug, PartialEq)]
pub struct ExtendedMasses {
    /// Particle chains, `qinv[group][link]`
    pub qinv: Vec<Vec<f64>>,
    /// Barostat chains, `qpinv[chain][link]`
    pub qpinv: Vec<Vec<f64>>,
    /// Isotropic barostat inverse mass
    pub winv: f64,
    /// Tensorial barostat inverse mass
    pub winvm: Matrix3<f64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BarostatState {
    pub box_matrix: Matrix3<f64>,
    /// Reference shape used when the coupling preserves box shape
    pub box_rel: Matrix3<f64>,
    /// Parrinello-Rahman box velocity
    pub boxv: Matrix3<f64>,
    /// MTTK log-volume velocity
    pub veta: f64,
    /// Reference volume for the barostat mass
    pub vol0: f64,
    /// Parrinello-Rahman coupling tensor for the particle equations of motion
    pub m_coupling: Matrix3<f64>,
    /// Provisional coordinate scaling matrix for the next box
    pub mu: Matrix3<f64>,
}

impl BarostatState {
    pub fn new(box_matrix: Matrix3<f64>, pcoupl_type: PressureCouplingType) -> Self {
        Self {
            box_matrix,
            box_rel: periodic_boundary_conditions::init_box_rel(pcoupl_type, &box_matrix),
            boxv: Matrix3::zeros(),
            veta: 0.0,
            vol0: 0.0,
            m_coupling: Matrix3::zeros(),
            mu: Matrix3::identity(),
        }
    }

    pub fn volume(&self) -> f64 {
        tensors::box_volume(&self.box_matrix)
    }
}

/// All extended-system variables mutated by the coupling step
#[derive(Clone, Debug, PartialEq)]
pub struct ExtendedSystemState {
    pub thermostat_chains: NhChainState,
    pub barostat_chains: NhChainState,
    pub barostat: BarostatState,
    /// Energy removed by stochastic rescaling, per group
    pub therm_integral: Vec<f64>,
}

/// Number of barostat chains (one isotropic barostat)
pub const NUM_BAROSTAT_CHAINS: usize = 1;

impl ExtendedSystemState {
    pub fn new(config: &CouplingConfig, box_matrix: Matrix3<f64>) -> Self {
        let nh = config.nhchainlength;
        let mut barostat = BarostatState::new(box_matrix, config.pcoupl_type);
        barostat.vol0 = barostat.volume();
        Self {
            thermostat_chains: NhChainState::new(config.ngtc(), nh),
            barostat_chains: NhChainState::new(NUM_BAROSTAT_CHAINS, nh),
            barostat,
            therm_integral: vec![0.0; config.ngtc()],
        }
    }
}
