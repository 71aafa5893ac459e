//! ----------------------
//! Author: Sang Young Noh
//! ----------------------
//!
//! ------------------------
//! Last Updated: 16/10/2026
//! ------------------------
//!

/*

Demo driver for the coupling engine.

Runs velocity Verlet on a set of independent 3D harmonic oscillators with the
Trotter-decomposed Nose-Hoover chain thermostat and logs temperature and the
conserved energy. Pass a JSON configuration file as the first argument to
run with other coupling settings; the group degrees of freedom have to match
the oscillator count (3 per particle).
*/

use std::io::Write;

use chrono::Local;
use env_logger::Env;
use log::{error, info};
use nalgebra::{Matrix3, Vector3};
use rand::Rng;
use rand_distr::Normal;

use ext_coupling::comm::LocalReduction;
use ext_coupling::config::GroupOptions;
use ext_coupling::constants::BOLTZ;
use ext_coupling::ensembles::{Integrator, TemperatureCoupling};
use ext_coupling::observables::{group_kinetic_energy, sum_ekin};
use ext_coupling::state::{AtomData, KineticEnergyData};
use ext_coupling::thermostat_barostat::trotter::{TrotterSlot, TrotterStep};
use ext_coupling::{CouplingConfig, CouplingError, CouplingResult, ExtendedSystem};

const NUM_PARTICLES: usize = 64;
const MASS: f64 = 12.0; // amu
const SPRING: f64 = 500.0; // kJ/(mol nm^2)
const INITIAL_TEMPERATURE: f64 = 600.0;
const NUM_STEPS: i64 = 2000;
const REPORT_EVERY: i64 = 100;

fn demo_config() -> CouplingConfig {
    CouplingConfig {
        integrator: Integrator::VelocityVerlet,
        tcoupl: TemperatureCoupling::NoseHoover,
        nhchainlength: 10,
        groups: vec![GroupOptions::new(300.0, 0.1, (3 * NUM_PARTICLES) as f64)],
        ..CouplingConfig::default()
    }
}

fn forces(x: &[Vector3<f64>], f: &mut [Vector3<f64>]) -> f64 {
    let mut potential = 0.0;
    for (xi, fi) in x.iter().zip(f.iter_mut()) {
        *fi = -SPRING * xi;
        potential += 0.5 * SPRING * xi.norm_squared();
    }
    potential
}

fn kinetic_temperature(system: &ExtendedSystem, atoms: &AtomData, v: &[Vector3<f64>], ekind: &mut KineticEnergyData) -> f64 {
    group_kinetic_energy(atoms, v, ekind, false, &LocalReduction);
    sum_ekin(&system.config().groups, ekind, true, true)
}

fn run() -> CouplingResult<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => CouplingConfig::from_json_file(path)?,
        None => demo_config(),
    };
    let (system, mut state) = ExtendedSystem::new(config, Matrix3::identity() * 3.0)?;
    let dt = system.config().delta_t;

    let atoms = AtomData::new(vec![MASS; NUM_PARTICLES], vec![0; NUM_PARTICLES]);
    let mut rng = rand::rng();
    let maxwell = Normal::new(0.0, (BOLTZ * INITIAL_TEMPERATURE / MASS).sqrt())
        .map_err(|e| CouplingError::config(e.to_string()))?;

    let mut x: Vec<Vector3<f64>> = (0..NUM_PARTICLES)
        .map(|_| Vector3::new(rng.random_range(-0.05..0.05), rng.random_range(-0.05..0.05), rng.random_range(-0.05..0.05)))
        .collect();
    let mut v: Vec<Vector3<f64>> = (0..NUM_PARTICLES)
        .map(|_| Vector3::new(rng.sample(maxwell), rng.sample(maxwell), rng.sample(maxwell)))
        .collect();
    let mut f = vec![Vector3::zeros(); NUM_PARTICLES];
    let mut ekind = KineticEnergyData::new(system.config().ngtc());
    let vir = Matrix3::zeros();

    info!("Starting NVT demo: {} oscillators, {} steps of {} ps", NUM_PARTICLES, NUM_STEPS, dt);

    for step in 0..=NUM_STEPS {
        let potential = forces(&x, &mut f);

        // the first half kick finishes the previous step
        if step > 0 {
            for ((vi, fi), &inv_m) in v.iter_mut().zip(f.iter()).zip(atoms.inv_mass.iter()) {
                *vi += fi * (0.5 * dt * inv_m);
            }
        }

        kinetic_temperature(&system, &atoms, &v, &mut ekind);
        system.trotter_update(
            step,
            TrotterSlot::FirstHalfEnd,
            &mut TrotterStep {
                state: &mut state,
                ekind: &mut ekind,
                vir: &vir,
                pcorr: 0.0,
                atoms: &atoms,
                v: &mut v,
                reduction: &LocalReduction,
            },
        )?;
        let temperature = kinetic_temperature(&system, &atoms, &v, &mut ekind);

        if step % REPORT_EVERY == 0 {
            let kinetic = ekind.ekin.trace();
            let conserved = kinetic + potential + system.conserved_energy(&state);
            info!(
                "step {:>6}  T = {:8.3} K  Epot = {:10.4}  Ekin = {:10.4}  Conserved = {:12.6}",
                step, temperature, potential, kinetic, conserved
            );
        }

        system.trotter_update(
            step,
            TrotterSlot::SecondHalfStart,
            &mut TrotterStep {
                state: &mut state,
                ekind: &mut ekind,
                vir: &vir,
                pcorr: 0.0,
                atoms: &atoms,
                v: &mut v,
                reduction: &LocalReduction,
            },
        )?;

        for (((xi, vi), fi), &inv_m) in x.iter_mut().zip(v.iter_mut()).zip(f.iter()).zip(atoms.inv_mass.iter()) {
            *vi += fi * (0.5 * dt * inv_m);
            *xi += *vi * dt;
        }
    }

    info!("Finished after {} steps", NUM_STEPS);
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] {}",
                Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.args()
            )
        })
        .init();

    if let Err(e) = run() {
        error!("{}", e);
        std::process::exit(1);
    }
}
