/*
Physical constants and integration weights shared by every coupling algorithm.

Units: nm, ps, K, kJ/mol, bar, amu.
*/

/// Number of spatial dimensions
pub const DIM: usize = 3;

/// Boltzmann constant in kJ/(mol K)
pub const BOLTZ: f64 = 0.0083144598;

/// Conversion from kJ/(mol nm^3) to bar
pub const PRESFAC: f64 = 16.6054;

pub const TWO_PI: f64 = 2.0 * std::f64::consts::PI;

/// Number of operation slots in one Trotter row
pub const TROTTER_PARTS: usize = 3;

/// Number of Trotter rows (slots around the force evaluation)
pub const TROTTER_SLOTS: usize = 5;

/*
Suzuki-Yoshida weights for symmetric higher-order factorization of the
chain propagator.

    n = 1: w0 = 1
    n = 3: w0 = w2 = 1/(2 - 2^(1/3)), w1 = 1 - 2 w0
    n = 5: w0 = w1 = w3 = w4 = 1/(4 - 4^(1/3)), w2 = 1 - 4 w0
*/
pub const SUZUKI_YOSHIDA_1: [f64; 1] = [1.0];

pub const SUZUKI_YOSHIDA_3: [f64; 3] = [0.828981543588751, -0.657963087177502, 0.828981543588751];

pub const SUZUKI_YOSHIDA_5: [f64; 5] = [
    0.2967324292201065,
    0.2967324292201065,
    -0.186929716880426,
    0.2967324292201065,
    0.2967324292201065,
];

/// Order used by the chain propagator
pub const SUZUKI_YOSHIDA_NUM: usize = 5;

/// Ratio between maximum and per-step box change that triggers a warning
pub const MAX_BOX_SCALING_DEVIATION: f64 = 0.01;

/// Berendsen lambda is clamped to this window
pub const BERENDSEN_LAMBDA_MIN: f64 = 0.8;
pub const BERENDSEN_LAMBDA_MAX: f64 = 1.25;
