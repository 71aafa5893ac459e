/*
Thermostat and barostat algorithms, one file per scheme.

The Trotter scheduler (`trotter`) composes the Nose-Hoover chain propagator
(`nose_hoover`) and the MTTK barostat velocity update (`barostat`) around the
force evaluation. The weak and stochastic thermostats (`berendsen`,
`vrescale`, `andersen`) and the box propagators in `barostat` are called
directly by the host on their coupling steps.
*/

pub mod andersen;
pub mod annealing;
pub mod barostat;
pub mod berendsen;
pub mod conserved;
pub mod drude;
pub mod masses;
pub mod nose_hoover;
pub mod scaling;
pub mod trotter;
pub mod vrescale;
