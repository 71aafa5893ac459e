/*
Coupling-step drivers.

`ExtendedSystem` bundles everything that is fixed for a run (configuration,
extended masses, Trotter table, thermostat kind, Andersen settings) and
exposes one entry point per place in the MD step where coupling happens. The
mutable extended variables live in the `ExtendedSystemState` the host owns
and passes back in on every call.

A velocity Verlet step calls, in order:

    trotter_update(FirstHalfEnd)    after the first velocity half step
    trotter_update(SecondHalfStart) before the second velocity half step
    andersen_step                   after the second half step

A leap-frog step calls temperature_coupling and parrinello_rahman_step
before the update and berendsen_pressure_step after it.
*/

use log::info;
use nalgebra::{Matrix3, Vector3};

use crate::config::CouplingConfig;
use crate::ensembles::{PressureCoupling, TemperatureCoupling};
use crate::error::{CouplingError, CouplingResult};
use crate::state::{AtomData, DrudePair, ExtendedMasses, ExtendedSystemState, KineticEnergyData};
use crate::thermostat_barostat::andersen::{andersen_tcoupl, AndersenSettings};
use crate::thermostat_barostat::annealing::update_annealing_target_temp;
use crate::thermostat_barostat::barostat::parrinello_rahman_pcoupl;
use crate::thermostat_barostat::berendsen::{berendsen_pcoupl, berendsen_pscale, berendsen_tcoupl};
use crate::thermostat_barostat::conserved::npt_energy;
use crate::thermostat_barostat::drude::DrudeAdapter;
use crate::thermostat_barostat::nose_hoover::nosehoover_tcoupl;
use crate::thermostat_barostat::scaling::rescale_velocities;
use crate::thermostat_barostat::trotter::{
    do_per_step, trotter_update, ThermostatKind, TrotterContext, TrotterSequence, TrotterSlot, TrotterStep,
};
use crate::thermostat_barostat::vrescale::vrescale_tcoupl;

#[derive(Clone, Debug)]
pub struct ExtendedSystem {
    config: CouplingConfig,
    masses: ExtendedMasses,
    sequence: TrotterSequence,
    kind: ThermostatKind,
    andersen: Option<AndersenSettings>,
    /// Reference volume of the barostat masses
    vol0: f64,
}

impl ExtendedSystem {
    /// Set up a run without polarizable particles
    pub fn new(config: CouplingConfig, box_matrix: Matrix3<f64>) -> CouplingResult<(Self, ExtendedSystemState)> {
        if config.uses_drude() {
            return Err(CouplingError::config(
                "Drude options are set, the pair list has to be supplied with ExtendedSystem::with_drude",
            ));
        }
        Self::build(config, box_matrix, ThermostatKind::Standard)
    }

    /*
    Set up a polarizable run. `group_masses` are the total masses of the
    temperature groups over all ranks; `atoms` are the local particles the
    pair indices refer to.
     */
    pub fn with_drude(
        config: CouplingConfig,
        box_matrix: Matrix3<f64>,
        atoms: &AtomData,
        pairs: Vec<DrudePair>,
        group_masses: Vec<f64>,
    ) -> CouplingResult<(Self, ExtendedSystemState)> {
        let tsteps = match &config.drude {
            Some(drude) => drude.tsteps,
            None => return Err(CouplingError::config("Drude pairs given but no Drude options set")),
        };
        if group_masses.len() != config.ngtc() {
            return Err(CouplingError::config(format!(
                "{} group masses for {} temperature groups",
                group_masses.len(),
                config.ngtc()
            )));
        }
        let adapter = DrudeAdapter::new(atoms, pairs, group_masses, tsteps)?;
        Self::build(config, box_matrix, ThermostatKind::PolarizablePair(adapter))
    }

    fn build(
        mut config: CouplingConfig,
        box_matrix: Matrix3<f64>,
        kind: ThermostatKind,
    ) -> CouplingResult<(Self, ExtendedSystemState)> {
        config.validate()?;
        config.resolve_seeds();

        let state = ExtendedSystemState::new(&config, box_matrix);
        let vol0 = state.barostat.vol0;
        let masses = ExtendedMasses::compute(&config, vol0);
        let sequence = TrotterSequence::new(config.integrator, config.trotter_ensemble());
        let andersen = config.tcoupl.is_andersen().then(|| AndersenSettings::new(&config));

        info!(
            "coupling: integrator {:?}, T-coupling {:?}, P-coupling {:?} ({:?}), {} groups, Trotter ensemble {:?}",
            config.integrator,
            config.tcoupl,
            config.pcoupl,
            config.pcoupl_type,
            config.ngtc(),
            config.trotter_ensemble()
        );
        if let ThermostatKind::PolarizablePair(adapter) = &kind {
            info!("Drude thermostat on {} pairs", adapter.pairs().len());
        }

        let system = Self {
            config,
            masses,
            sequence,
            kind,
            andersen,
            vol0,
        };
        Ok((system, state))
    }

    pub fn config(&self) -> &CouplingConfig {
        &self.config
    }

    pub fn masses(&self) -> &ExtendedMasses {
        &self.masses
    }

    pub fn sequence(&self) -> &TrotterSequence {
        &self.sequence
    }

    pub fn kind(&self) -> &ThermostatKind {
        &self.kind
    }

    pub fn trotter_update(&self, step: i64, slot: TrotterSlot, data: &mut TrotterStep<'_>) -> CouplingResult<()> {
        let ctx = TrotterContext {
            config: &self.config,
            masses: &self.masses,
            kind: &self.kind,
        };
        trotter_update(&ctx, &self.sequence, step, slot, data)
    }

    /*
    Non-Trotter temperature coupling. Sets lambda of every group; velocity
    Verlet applies it to the velocities right away, leap-frog leaves that to
    the update. Returns whether this step coupled.
     */
    pub fn temperature_coupling(
        &self,
        step: i64,
        state: &mut ExtendedSystemState,
        ekind: &mut KineticEnergyData,
        atoms: &AtomData,
        v: &mut [Vector3<f64>],
    ) -> CouplingResult<bool> {
        let config = &self.config;
        let nst = config.nsttcouple;
        let weak_or_leapfrog = matches!(
            config.tcoupl,
            TemperatureCoupling::Berendsen | TemperatureCoupling::NoseHoover | TemperatureCoupling::VRescale
        );
        let couple = weak_or_leapfrog
            && config.trotter_ensemble().is_none()
            && do_per_step(step + nst - 1, nst);

        if !couple {
            for stats in ekind.groups.iter_mut() {
                stats.lambda = 1.0;
            }
            return Ok(false);
        }

        let dttc = config.tcouple_dt();
        match config.tcoupl {
            TemperatureCoupling::Berendsen => berendsen_tcoupl(config, ekind, dttc),
            TemperatureCoupling::NoseHoover => {
                nosehoover_tcoupl(&config.groups, ekind, dttc, &mut state.thermostat_chains, &self.masses.qinv)
            }
            TemperatureCoupling::VRescale => vrescale_tcoupl(config, step, ekind, dttc, &mut state.therm_integral)?,
            // Andersen randomizes in andersen_step
            TemperatureCoupling::No | TemperatureCoupling::Andersen | TemperatureCoupling::AndersenMassive => {}
        }

        if config.integrator.is_velocity_verlet() {
            rescale_velocities(ekind, atoms, v);
        }
        Ok(true)
    }

    /// Andersen randomization; returns whether velocities were redrawn
    pub fn andersen_step(&self, step: i64, atoms: &AtomData, v: &mut [Vector3<f64>]) -> bool {
        match &self.andersen {
            Some(settings) if do_per_step(step, self.config.nsttcouple) => andersen_tcoupl(settings, step, atoms, v),
            _ => false,
        }
    }

    /// Parrinello-Rahman box update on pressure-coupling steps
    pub fn parrinello_rahman_step(
        &self,
        step: i64,
        pres: &Matrix3<f64>,
        state: &mut ExtendedSystemState,
        first_step: bool,
    ) -> CouplingResult<bool> {
        let nst = self.config.nstpcouple;
        if self.config.pcoupl != PressureCoupling::ParrinelloRahman || !do_per_step(step + nst - 1, nst) {
            return Ok(false);
        }
        parrinello_rahman_pcoupl(&self.config, step, self.config.pcouple_dt(), pres, &mut state.barostat, first_step)?;
        Ok(true)
    }

    /// Berendsen scaling of positions and box on pressure-coupling steps
    pub fn berendsen_pressure_step(
        &self,
        step: i64,
        pres: &Matrix3<f64>,
        state: &mut ExtendedSystemState,
        x: &mut [Vector3<f64>],
    ) -> bool {
        let nst = self.config.nstpcouple;
        if self.config.pcoupl != PressureCoupling::Berendsen || !do_per_step(step + nst - 1, nst) {
            return false;
        }
        let barostat = &mut state.barostat;
        let mu = berendsen_pcoupl(&self.config, step, self.config.pcouple_dt(), pres, &barostat.box_matrix);
        berendsen_pscale(&self.config, &mu, &mut barostat.box_matrix, &barostat.box_rel, x);
        barostat.mu = mu;
        true
    }

    pub fn conserved_energy(&self, state: &ExtendedSystemState) -> f64 {
        npt_energy(&self.config, state, &self.masses)
    }

    /*
    Move annealed reference temperatures to time `t` and refresh everything
    derived from them. Returns whether any temperature changed.
     */
    pub fn update_annealing(&mut self, t: f64) -> bool {
        if !update_annealing_target_temp(&mut self.config, t) {
            return false;
        }
        self.masses = ExtendedMasses::compute(&self.config, self.vol0);
        if let Some(settings) = self.andersen.as_mut() {
            settings.update_temperatures(&self.config);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AnnealingKind, AnnealingSchedule, DrudeOptions, GroupOptions};
    use crate::constants::BOLTZ;
    use crate::ensembles::Integrator;
    use crate::observables::calc_temp;
    use crate::state::ParticleType;
    use approx::assert_relative_eq;

    fn cubic_box() -> Matrix3<f64> {
        Matrix3::identity() * 3.0
    }

    fn group(ref_t: f64, tau_t: f64, nrdf: f64) -> GroupOptions {
        GroupOptions::new(ref_t, tau_t, nrdf)
    }

    #[test]
    fn drude_options_need_pairs() {
        let config = CouplingConfig {
            tcoupl: TemperatureCoupling::NoseHoover,
            drude: Some(DrudeOptions::default()),
            groups: vec![group(300.0, 0.1, 6.0), group(1.0, 0.1, 3.0)],
            ..CouplingConfig::default()
        };
        let err = ExtendedSystem::new(config, cubic_box()).expect_err("pairs missing");
        assert!(matches!(err, CouplingError::Config(_)));
    }

    #[test]
    fn drude_setup_selects_polarizable_kind() {
        let config = CouplingConfig {
            tcoupl: TemperatureCoupling::NoseHoover,
            drude: Some(DrudeOptions { tsteps: 2 }),
            groups: vec![group(300.0, 0.1, 6.0), group(1.0, 0.1, 3.0)],
            ..CouplingConfig::default()
        };
        let atoms = AtomData::new(vec![15.6, 0.4], vec![0, 1]).with_ptype(vec![ParticleType::Atom, ParticleType::Shell]);
        let pairs = vec![DrudePair { atom: 0, drude: 1, atom_mass: 15.6, drude_mass: 0.4 }];
        let (system, _) =
            ExtendedSystem::with_drude(config, cubic_box(), &atoms, pairs, atoms.group_masses(2)).expect("valid");
        assert!(!system.kind().scales_velocities());
    }

    #[test]
    fn seeds_are_drawn_at_setup() {
        let config = CouplingConfig {
            tcoupl: TemperatureCoupling::VRescale,
            groups: vec![group(300.0, 0.1, 30.0)],
            ..CouplingConfig::default()
        };
        let (system, _) = ExtendedSystem::new(config, cubic_box()).expect("valid");
        assert!(system.config().ld_seed >= 0);
    }

    #[test]
    fn leapfrog_berendsen_sets_lambda_without_touching_velocities() {
        let config = CouplingConfig {
            integrator: Integrator::Md,
            tcoupl: TemperatureCoupling::Berendsen,
            nsttcouple: 10,
            groups: vec![group(300.0, 0.1, 3.0)],
            ..CouplingConfig::default()
        };
        let (system, mut state) = ExtendedSystem::new(config, cubic_box()).expect("valid");
        let atoms = AtomData::new(vec![1.0], vec![0]);
        let mut v = vec![Vector3::new(1.0, 0.0, 0.0)];
        let mut ekind = KineticEnergyData::new(1);
        ekind.groups[0].th = 600.0;

        // step 1 couples: 1 + 10 - 1 is a multiple of 10
        assert!(system.temperature_coupling(1, &mut state, &mut ekind, &atoms, &mut v).expect("coupling"));
        assert!(ekind.groups[0].lambda < 1.0);
        assert_eq!(v[0], Vector3::new(1.0, 0.0, 0.0));

        assert!(!system.temperature_coupling(2, &mut state, &mut ekind, &atoms, &mut v).expect("coupling"));
        assert_eq!(ekind.groups[0].lambda, 1.0);
    }

    #[test]
    fn velocity_verlet_vrescale_scales_in_place() {
        let config = CouplingConfig {
            tcoupl: TemperatureCoupling::VRescale,
            ld_seed: 5,
            groups: vec![group(300.0, 0.1, 3.0)],
            ..CouplingConfig::default()
        };
        let (system, mut state) = ExtendedSystem::new(config, cubic_box()).expect("valid");
        let atoms = AtomData::new(vec![2.0], vec![0]);
        let mut v = vec![Vector3::new(1.0, 2.0, 3.0)];
        let mut ekind = KineticEnergyData::new(1);
        ekind.groups[0].ekinf = Matrix3::from_diagonal(&nalgebra::Vector3::new(1.0, 4.0, 9.0));

        system.temperature_coupling(0, &mut state, &mut ekind, &atoms, &mut v).expect("coupling");
        let lambda = ekind.groups[0].lambda;
        assert_relative_eq!(v[0], Vector3::new(1.0, 2.0, 3.0) * lambda, epsilon = 1e-14);
        assert_relative_eq!(system.conserved_energy(&state), 14.0 * (1.0 - lambda * lambda), epsilon = 1e-9);
    }

    #[test]
    fn parrinello_rahman_only_on_its_stride() {
        let config = CouplingConfig {
            integrator: Integrator::Md,
            pcoupl: PressureCoupling::ParrinelloRahman,
            nstpcouple: 5,
            ..CouplingConfig::default()
        };
        let (system, mut state) = ExtendedSystem::new(config, cubic_box()).expect("valid");
        let pres = Matrix3::identity() * 500.0;
        assert!(!system.parrinello_rahman_step(3, &pres, &mut state, false).expect("pr"));
        assert_eq!(state.barostat.boxv, Matrix3::zeros());
        assert!(system.parrinello_rahman_step(6, &pres, &mut state, false).expect("pr"));
        assert!(state.barostat.boxv[(0, 0)] > 0.0);
    }

    #[test]
    fn berendsen_pressure_step_expands_box_under_pressure() {
        let config = CouplingConfig {
            integrator: Integrator::Md,
            pcoupl: PressureCoupling::Berendsen,
            ..CouplingConfig::default()
        };
        let (system, mut state) = ExtendedSystem::new(config, cubic_box()).expect("valid");
        let mut x = vec![Vector3::new(1.0, 1.0, 1.0)];
        let pres = Matrix3::identity() * 100.0;
        assert!(system.berendsen_pressure_step(0, &pres, &mut state, &mut x));
        assert!(state.barostat.box_matrix[(0, 0)] > 3.0);
        assert_relative_eq!(x[0].x, state.barostat.mu[(0, 0)], epsilon = 1e-14);
    }

    #[test]
    fn annealing_refreshes_masses_and_andersen_temperatures() {
        let mut annealed = group(300.0, 0.1, 30.0);
        annealed.annealing = AnnealingSchedule {
            kind: AnnealingKind::Single,
            times: vec![0.0, 10.0],
            temperatures: vec![300.0, 400.0],
        };
        let config = CouplingConfig {
            tcoupl: TemperatureCoupling::Andersen,
            andersen_seed: 3,
            groups: vec![annealed],
            ..CouplingConfig::default()
        };
        let (mut system, _) = ExtendedSystem::new(config, cubic_box()).expect("valid");
        let q_before = system.masses().qinv[0][0];

        assert!(system.update_annealing(10.0));
        assert_eq!(system.config().groups[0].ref_t, 400.0);
        assert_relative_eq!(system.masses().qinv[0][0], q_before * 0.75, epsilon = 1e-12);
        let settings = system.andersen.as_ref().expect("andersen settings");
        assert_relative_eq!(settings.boltzfac[0], BOLTZ * 400.0, epsilon = 1e-12);
        assert!(!system.update_annealing(10.0));
    }

    #[test]
    fn andersen_step_respects_stride() {
        let config = CouplingConfig {
            tcoupl: TemperatureCoupling::AndersenMassive,
            nsttcouple: 2,
            andersen_seed: 11,
            groups: vec![group(300.0, 0.004, 3.0)],
            ..CouplingConfig::default()
        };
        let (system, _) = ExtendedSystem::new(config, cubic_box()).expect("valid");
        let atoms = AtomData::new(vec![1.0], vec![0]);
        let mut v = vec![Vector3::zeros()];
        assert!(!system.andersen_step(3, &atoms, &mut v));
        assert_eq!(v[0], Vector3::zeros());
        assert!(system.andersen_step(4, &atoms, &mut v));
        assert!(calc_temp(0.5 * v[0].norm_squared(), 3.0) > 0.0);
    }
}
