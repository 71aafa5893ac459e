/*
Simulated annealing: piecewise-linear reference temperatures.
*/

use log::debug;

use crate::config::{AnnealingKind, AnnealingSchedule, CouplingConfig};

/// Rounding tolerance on annealing times
const TIME_TOLERANCE: f64 = 100.0 * f64::EPSILON;

/// Reference temperature of `schedule` at time `t`; `None` without annealing
pub fn annealing_target(schedule: &AnnealingSchedule, t: f64) -> Option<f64> {
    let times = &schedule.times;
    let temps = &schedule.temperatures;
    let npoints = times.len();
    if npoints == 0 {
        return None;
    }

    let thist = match schedule.kind {
        AnnealingKind::No => return None,
        AnnealingKind::Single => t,
        AnnealingKind::Periodic => {
            let pert = times[npoints - 1];
            if pert <= 0.0 {
                t
            } else {
                let n = (t / pert).floor();
                let modulo = t - n * pert;
                // rounding must not leave the interval
                if (modulo - pert).abs() < TIME_TOLERANCE {
                    0.0
                } else {
                    modulo
                }
            }
        }
    };

    let mut j = 0;
    while j < npoints - 1 && thist > times[j + 1] {
        j += 1;
    }

    let target = if j < npoints - 1 {
        let span = times[j + 1] - times[j];
        if span < TIME_TOLERANCE {
            // coinciding times are a jump
            temps[j + 1]
        } else {
            let x = (thist - times[j]) / span;
            x * temps[j + 1] + (1.0 - x) * temps[j]
        }
    } else {
        temps[npoints - 1]
    };
    Some(target)
}

/// Rewrite `ref_t` of every annealed group for time `t`. Returns whether anything changed.
pub fn update_annealing_target_temp(config: &mut CouplingConfig, t: f64) -> bool {
    let mut changed = false;
    for (i, group) in config.groups.iter_mut().enumerate() {
        if let Some(target) = annealing_target(&group.annealing, t) {
            if target != group.ref_t {
                debug!("annealing group {} at t = {}: T_ref {} -> {}", i, t, group.ref_t, target);
                group.ref_t = target;
                changed = true;
            }
        }
    }
    changed
}
