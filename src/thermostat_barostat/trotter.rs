/*
Trotter decomposition of the extended-system propagator.

Velocity Verlet splits every step into two velocity half steps around the
force evaluation. The thermostat and barostat operators are placed into five
slots:

    slot 0  initial barostat velocity estimate
    slot 1  before the first half-step kinetic energy (half-step averaged KE only)
    slot 2  end of the first velocity half step
    slot 3  start of the second velocity half step
    slot 4  after the second half step (half-step averaged KE only)

Each slot holds up to three operations that run in order. The table is built
once from integrator and ensemble and never changes during a run.
*/

use log::debug;
use nalgebra::{Matrix3, Vector3};

use crate::comm::GroupReduction;
use crate::config::CouplingConfig;
use crate::constants::{TROTTER_PARTS, TROTTER_SLOTS};
use crate::ensembles::{Integrator, TrotterEnsemble};
use crate::error::CouplingResult;
use crate::state::{AtomData, ExtendedMasses, ExtendedSystemState, KineticEnergyData};

use super::barostat::boxv_trotter;
use super::drude::DrudeAdapter;
use super::nose_hoover::{nhc_trotter, NhcTarget};
use super::scaling::scale_by_group;

/// `true` every `nstep` steps, never when `nstep` is 0
pub fn do_per_step(step: i64, nstep: i64) -> bool {
    nstep != 0 && step % nstep == 0
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrotterSlot {
    InitialBarostat,
    FirstHalfStart,
    FirstHalfEnd,
    SecondHalfStart,
    SecondHalfEnd,
}

impl TrotterSlot {
    pub const ALL: [TrotterSlot; TROTTER_SLOTS] = [
        TrotterSlot::InitialBarostat,
        TrotterSlot::FirstHalfStart,
        TrotterSlot::FirstHalfEnd,
        TrotterSlot::SecondHalfStart,
        TrotterSlot::SecondHalfEnd,
    ];

    pub fn index(self) -> usize {
        match self {
            TrotterSlot::InitialBarostat => 0,
            TrotterSlot::FirstHalfStart => 1,
            TrotterSlot::FirstHalfEnd => 2,
            TrotterSlot::SecondHalfStart => 3,
            TrotterSlot::SecondHalfEnd => 4,
        }
    }

    /*
    The first half step of velocity Verlet completes the previous step, so
    the coupling stride is evaluated on step - 1 there.
     */
    pub fn effective_step(self, step: i64) -> i64 {
        if self.index() <= TrotterSlot::FirstHalfEnd.index() {
            step - 1
        } else {
            step
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrotterOp {
    /// Marks a slot without any operation
    SkipAll,
    /// Unused position in a row
    Empty,
    BarostatVelocity { doubled: bool },
    BarostatChain { doubled: bool },
    ParticleChain { doubled: bool },
}

/// Signature shared by all operation handlers; `scalefac` collects the particle chain scaling
pub type TrotterHandler =
    fn(&TrotterContext<'_>, &mut TrotterStep<'_>, f64, &mut [f64]) -> CouplingResult<()>;

impl TrotterOp {
    pub const BARO_V: TrotterOp = TrotterOp::BarostatVelocity { doubled: false };
    pub const BARO_NHC: TrotterOp = TrotterOp::BarostatChain { doubled: false };
    pub const NHC: TrotterOp = TrotterOp::ParticleChain { doubled: false };

    fn is_doubled(self) -> bool {
        matches!(
            self,
            TrotterOp::BarostatVelocity { doubled: true }
                | TrotterOp::BarostatChain { doubled: true }
                | TrotterOp::ParticleChain { doubled: true }
        )
    }

    /// Doubled operations merge two adjacent half-step operations into one call
    pub fn timestep(self, dtc: f64) -> f64 {
        if self.is_doubled() {
            2.0 * dtc
        } else {
            dtc
        }
    }

    pub fn handler(self) -> Option<TrotterHandler> {
        match self {
            TrotterOp::SkipAll | TrotterOp::Empty => None,
            TrotterOp::BarostatVelocity { .. } => Some(barostat_velocity),
            TrotterOp::BarostatChain { .. } => Some(barostat_chain),
            TrotterOp::ParticleChain { .. } => Some(particle_chain),
        }
    }
}

type TrotterRow = [TrotterOp; TROTTER_PARTS];

const SKIP_ROW: TrotterRow = [TrotterOp::SkipAll, TrotterOp::Empty, TrotterOp::Empty];

fn row(ops: &[TrotterOp]) -> TrotterRow {
    let mut r = [TrotterOp::Empty; TROTTER_PARTS];
    r[..ops.len()].copy_from_slice(ops);
    r
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrotterSequence {
    rows: [TrotterRow; TROTTER_SLOTS],
}

impl TrotterSequence {
    pub fn new(integrator: Integrator, ensemble: Option<TrotterEnsemble>) -> Self {
        use TrotterOp as Op;
        let mut rows = [SKIP_ROW; TROTTER_SLOTS];

        match (integrator, ensemble) {
            (Integrator::VelocityVerlet, Some(TrotterEnsemble::Npt)) => {
                rows[0] = row(&[Op::BARO_V]);
                rows[2] = row(&[Op::BARO_V, Op::NHC, Op::BARO_NHC]);
                rows[3] = row(&[Op::BARO_NHC, Op::NHC, Op::BARO_V]);
            }
            (Integrator::VelocityVerlet, Some(TrotterEnsemble::Nvt)) => {
                rows[2] = row(&[Op::NHC]);
                rows[3] = row(&[Op::NHC]);
            }
            (Integrator::VelocityVerlet, Some(TrotterEnsemble::Nph)) => {
                rows[0] = row(&[Op::BARO_V]);
                rows[2] = row(&[Op::BARO_V, Op::BARO_NHC]);
                rows[3] = row(&[Op::BARO_NHC, Op::BARO_V]);
            }
            // the particle chains commute with the half-step kinetic energy, so they move outward
            (Integrator::VelocityVerletAveK, Some(TrotterEnsemble::Npt)) => {
                rows[0] = row(&[Op::BARO_V]);
                rows[1] = row(&[Op::NHC]);
                rows[2] = row(&[Op::BARO_V, Op::BARO_NHC]);
                rows[3] = row(&[Op::BARO_NHC, Op::BARO_V]);
                rows[4] = row(&[Op::NHC]);
            }
            (Integrator::VelocityVerletAveK, Some(TrotterEnsemble::Nvt)) => {
                rows[1] = row(&[Op::NHC]);
                rows[4] = row(&[Op::NHC]);
            }
            (Integrator::VelocityVerletAveK, Some(TrotterEnsemble::Nph)) => {
                rows[0] = row(&[Op::BARO_V]);
                rows[2] = row(&[Op::BARO_V, Op::BARO_NHC]);
                rows[3] = row(&[Op::BARO_NHC, Op::BARO_V]);
            }
            _ => {}
        }
        Self { rows }
    }

    pub fn row(&self, slot: TrotterSlot) -> &[TrotterOp] {
        &self.rows[slot.index()]
    }

    pub fn is_empty(&self) -> bool {
        self.rows.iter().all(|r| r[0] == TrotterOp::SkipAll)
    }
}

/// How particle chains act on the velocities
#[derive(Clone, Debug, PartialEq)]
pub enum ThermostatKind {
    /// Every particle scaled by its group's chain
    Standard,
    /// Heavy atom / Drude pairs thermostatted in their COM and internal frames
    PolarizablePair(DrudeAdapter),
}

impl ThermostatKind {
    /// Whether the scheduler still has to scale the velocities after the chains ran
    pub fn scales_velocities(&self) -> bool {
        matches!(self, ThermostatKind::Standard)
    }

    fn propagate_particle_chains(
        &self,
        ctx: &TrotterContext<'_>,
        data: &mut TrotterStep<'_>,
        dt: f64,
        scalefac: &mut [f64],
    ) {
        let config = ctx.config;
        match self {
            ThermostatKind::Standard => nhc_trotter(
                &config.groups,
                data.ekind,
                dt,
                &mut data.state.thermostat_chains,
                &ctx.masses.qinv,
                NhcTarget::Thermostat { scalefac },
                config.integrator == Integrator::VelocityVerlet,
                true,
            ),
            // velocities are scaled inside; scalefac stays at 1
            ThermostatKind::PolarizablePair(adapter) => adapter.thermostat(
                &config.groups,
                ctx.masses,
                &mut data.state.thermostat_chains,
                data.ekind,
                data.atoms,
                data.v,
                data.reduction,
                dt,
            ),
        }
    }
}

/// Run-constant inputs of a Trotter update
pub struct TrotterContext<'a> {
    pub config: &'a CouplingConfig,
    pub masses: &'a ExtendedMasses,
    pub kind: &'a ThermostatKind,
}

/// Per-step data the host hands to a Trotter update
pub struct TrotterStep<'a> {
    pub state: &'a mut ExtendedSystemState,
    pub ekind: &'a mut KineticEnergyData,
    /// Total virial
    pub vir: &'a Matrix3<f64>,
    /// Dispersion correction to the pressure in bar
    pub pcorr: f64,
    pub atoms: &'a AtomData,
    pub v: &'a mut [Vector3<f64>],
    pub reduction: &'a dyn GroupReduction,
}

fn barostat_velocity(
    ctx: &TrotterContext<'_>,
    data: &mut TrotterStep<'_>,
    dt: f64,
    _scalefac: &mut [f64],
) -> CouplingResult<()> {
    let barostat = &mut data.state.barostat;
    boxv_trotter(
        ctx.config,
        &mut barostat.veta,
        dt,
        &barostat.box_matrix,
        data.ekind,
        data.vir,
        data.pcorr,
        ctx.masses,
    )
}

fn barostat_chain(
    ctx: &TrotterContext<'_>,
    data: &mut TrotterStep<'_>,
    dt: f64,
    _scalefac: &mut [f64],
) -> CouplingResult<()> {
    let state = &mut *data.state;
    nhc_trotter(
        &ctx.config.groups,
        data.ekind,
        dt,
        &mut state.barostat_chains,
        &ctx.masses.qpinv,
        NhcTarget::Barostat {
            veta: &mut state.barostat.veta,
            winv: ctx.masses.winv,
        },
        false,
        true,
    );
    Ok(())
}

fn particle_chain(
    ctx: &TrotterContext<'_>,
    data: &mut TrotterStep<'_>,
    dt: f64,
    scalefac: &mut [f64],
) -> CouplingResult<()> {
    ctx.kind.propagate_particle_chains(ctx, data, dt, scalefac);

    for (stats, &sf) in data.ekind.groups.iter_mut().zip(scalefac.iter()) {
        stats.vscale_nhc = sf;
        stats.ekinscaleh_nhc *= sf * sf;
        stats.ekinscalef_nhc *= sf * sf;
    }

    if ctx.kind.scales_velocities() {
        scale_by_group(data.atoms, data.v, scalefac);
    }
    Ok(())
}

/*
Run the operations of `slot` for `step`. Nothing happens off the coupling
stride or for an empty slot. The stride is shared with pressure coupling,
which MTTK forces to be equal.
 */
pub fn trotter_update(
    ctx: &TrotterContext<'_>,
    sequence: &TrotterSequence,
    step: i64,
    slot: TrotterSlot,
    data: &mut TrotterStep<'_>,
) -> CouplingResult<()> {
    let nst = ctx.config.nsttcouple;
    let step_eff = slot.effective_step(step);
    let couple = nst == 1 || do_per_step(step_eff + nst, nst);

    let ops = sequence.row(slot);
    if ops[0] == TrotterOp::SkipAll || !couple {
        return Ok(());
    }

    let dtc = ctx.config.tcouple_dt();
    let mut scalefac = vec![1.0; ctx.config.ngtc()];

    for op in ops.iter() {
        if let Some(handler) = op.handler() {
            debug!("TROTTER: step {} slot {:?}: {:?}", step, slot, op);
            handler(ctx, data, op.timestep(dtc), &mut scalefac)?;
        }
    }
    Ok(())
}
