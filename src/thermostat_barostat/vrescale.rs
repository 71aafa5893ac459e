/*
Stochastic velocity rescaling (Bussi, Donadio, Parrinello, JCP 126, 014101).

The kinetic energy of each group is resampled from its canonical
distribution with an exponential memory of the current value. Each group
draws from its own counter range so that groups get independent noise while
the draw stays a pure function of (step, counter, seed).
*/

use log::debug;

use crate::config::CouplingConfig;
use crate::constants::BOLTZ;
use crate::error::{CouplingError, CouplingResult};
use crate::random::{gaussian_count, uniform_pair, RandomStream};
use crate::state::KineticEnergyData;

const STREAM: RandomStream = RandomStream::VRescale;

/// Degrees of freedom closer than this to an integer count as integer
const NDEG_TOL: f64 = 0.0001;

/// First counter value of a group; leaves room for every rejection a draw may need
fn group_counter_base(group: usize) -> i64 {
    (group as i64) << 32
}

/*
Gamma deviate of integer or real order ia > 1 with unit scale, by
rejection from a Lorentzian (Numerical Recipes).
 */
fn gamdev(ia: f64, step: i64, count: &mut i64, seed: i64) -> f64 {
    debug_assert!(ia > 1.0);
    let am = ia - 1.0;
    let s = (2.0 * am + 1.0).sqrt();
    loop {
        let (x, y) = loop {
            let (v1, v2) = loop {
                let rnd = uniform_pair(step, *count, seed, STREAM);
                *count += 1;
                let v1 = rnd[0];
                let v2 = 2.0 * rnd[1] - 1.0;
                // keeps x and the prefactor of e finite
                if v1 * v1 + v2 * v2 <= 1.0 && v1 * v1 * f64::MAX >= 3.0 * ia {
                    break (v1, v2);
                }
            };
            let y = v2 / v1;
            let x = s * y + am;
            if x > 0.0 {
                break (x, y);
            }
        };

        let e = (1.0 + y * y) * (am * (x / am).ln() - s * y).exp();
        let rnd = uniform_pair(step, *count, seed, STREAM);
        *count += 1;
        if rnd[0] <= e {
            return x;
        }
    }
}

/*
Sum of nn squared standard normal deviates. Small counts are summed
explicitly and must be integral; larger ones use the equivalent chi-squared
(gamma) variate.
 */
pub fn sumnoises(nn: f64, step: i64, count: &mut i64, seed: i64) -> CouplingResult<f64> {
    if nn < 2.0 + NDEG_TOL {
        let nn_int = (nn + 0.5) as i64;
        if (nn - nn_int as f64).abs() > NDEG_TOL {
            return Err(CouplingError::NonIntegerDof(nn + 1.0));
        }
        let mut r = 0.0;
        for _ in 0..nn_int {
            let gauss = gaussian_count(step, count, seed, STREAM);
            r += gauss * gauss;
        }
        Ok(r)
    } else {
        Ok(2.0 * gamdev(0.5 * nn, step, count, seed))
    }
}

/*
New kinetic energy for one group.

kk: current kinetic energy
sigma: target kinetic energy Ndf kT/2
ndeg: degrees of freedom
taut: relaxation time in units of the coupling interval
 */
pub fn resamplekin(
    kk: f64,
    sigma: f64,
    ndeg: f64,
    taut: f64,
    step: i64,
    seed: i64,
    group: usize,
) -> CouplingResult<f64> {
    let mut count = group_counter_base(group);
    let factor = if taut > 0.1 { (-1.0 / taut).exp() } else { 0.0 };

    let rr = gaussian_count(step, &mut count, seed, STREAM);
    let noises = sumnoises(ndeg - 1.0, step, &mut count, seed)?;

    Ok(kk
        + (1.0 - factor) * (sigma * (noises + rr * rr) / ndeg - kk)
        + 2.0 * rr * (kk * sigma / ndeg * (1.0 - factor) * factor).sqrt())
}

/*
Set lambda of every group and book the removed energy in `therm_integral`
for the conserved-energy report. Groups without coupling time, degrees of
freedom or kinetic energy keep lambda = 1.
 */
pub fn vrescale_tcoupl(
    config: &CouplingConfig,
    step: i64,
    ekind: &mut KineticEnergyData,
    dt: f64,
    therm_integral: &mut [f64],
) -> CouplingResult<()> {
    let full_step = config.integrator.uses_full_step_ekin();

    for (i, (opts, stats)) in config.groups.iter().zip(ekind.groups.iter_mut()).enumerate() {
        let ek = if full_step { stats.ekinf.trace() } else { stats.ekinh.trace() };

        if opts.tau_t >= 0.0 && opts.nrdf > 0.0 && ek > 0.0 {
            let ek_ref = 0.5 * opts.ref_t * BOLTZ * opts.nrdf;
            let ek_new = resamplekin(ek, ek_ref, opts.nrdf, opts.tau_t / dt, step, config.ld_seed, i)?;

            // analytically non-negative, but not after rounding
            stats.lambda = if ek_new <= 0.0 { 0.0 } else { (ek_new / ek).sqrt() };
            therm_integral[i] -= ek_new - ek;

            debug!(
                "TC: group {}: Ekr {}, Ek {}, Ek_new {}, Lambda: {}",
                i, ek_ref, ek, ek_new, stats.lambda
            );
        } else {
            stats.lambda = 1.0;
        }
    }
    Ok(())
}

/// Energy the stochastic thermostat has exchanged with the system
pub fn vrescale_energy(therm_integral: &[f64]) -> f64 {
    therm_integral.iter().sum()
}
