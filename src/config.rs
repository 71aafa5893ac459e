//! Run configuration consumed by the coupling engine.
//!
//! Everything here is fixed for the duration of a run, except `ref_t` which
//! the annealing schedule may rewrite between coupling steps.

use std::path::Path;

use log::info;
use nalgebra::Matrix3;
use serde::{Deserialize, Serialize};

use crate::ensembles::{
    Integrator, PbcType, PressureCoupling, PressureCouplingType, TemperatureCoupling,
    TrotterEnsemble,
};
use crate::error::{CouplingError, CouplingResult};
use crate::tensors;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnnealingKind {
    #[default]
    No,
    Single,
    Periodic,
}

/// Piecewise-linear reference temperature schedule for one group
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnealingSchedule {
    pub kind: AnnealingKind,
    /// Times in ps, non-decreasing
    pub times: Vec<f64>,
    /// Temperatures in K, same length as `times`
    pub temperatures: Vec<f64>,
}

/// Per temperature-coupling group options
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GroupOptions {
    pub ref_t: f64,
    pub tau_t: f64,
    pub nrdf: f64,
    #[serde(default)]
    pub annealing: AnnealingSchedule,
}

impl GroupOptions {
    pub fn new(ref_t: f64, tau_t: f64, nrdf: f64) -> Self {
        Self {
            ref_t,
            tau_t,
            nrdf,
            annealing: AnnealingSchedule::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DrudeOptions {
    /// Number of thermostat sub-steps per coupling operation
    pub tsteps: usize,
}

impl Default for DrudeOptions {
    fn default() -> Self {
        Self { tsteps: 20 }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CouplingConfig {
    pub integrator: Integrator,
    /// Integration timestep in ps
    pub delta_t: f64,
    pub nsttcouple: i64,
    pub nstpcouple: i64,
    pub tcoupl: TemperatureCoupling,
    pub pcoupl: PressureCoupling,
    pub pcoupl_type: PressureCouplingType,
    pub pbc: PbcType,
    /// Pressure coupling time constant in ps
    pub tau_p: f64,
    /// Reference pressure tensor in bar
    pub ref_p: [[f64; 3]; 3],
    /// Compressibility tensor in 1/bar
    pub compress: [[f64; 3]; 3],
    pub nhchainlength: usize,
    pub groups: Vec<GroupOptions>,
    /// Seed for v-rescale; -1 draws one at setup
    #[serde(default = "default_seed")]
    pub ld_seed: i64,
    /// Seed for Andersen; -1 draws one at setup
    #[serde(default = "default_seed")]
    pub andersen_seed: i64,
    #[serde(default)]
    pub drude: Option<DrudeOptions>,
}

fn default_seed() -> i64 {
    -1
}

impl Default for CouplingConfig {
    fn default() -> Self {
        Self {
            integrator: Integrator::VelocityVerlet,
            delta_t: 0.002,
            nsttcouple: 1,
            nstpcouple: 1,
            tcoupl: TemperatureCoupling::No,
            pcoupl: PressureCoupling::No,
            pcoupl_type: PressureCouplingType::Isotropic,
            pbc: PbcType::Xyz,
            tau_p: 1.0,
            ref_p: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            compress: [[4.5e-5, 0.0, 0.0], [0.0, 4.5e-5, 0.0], [0.0, 0.0, 4.5e-5]],
            nhchainlength: 10,
            groups: vec![GroupOptions::new(300.0, 0.1, 0.0)],
            ld_seed: default_seed(),
            andersen_seed: default_seed(),
            drude: None,
        }
    }
}

impl CouplingConfig {
    pub fn from_json_str(json: &str) -> CouplingResult<Self> {
        let config: CouplingConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> CouplingResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn to_json(&self) -> CouplingResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn ngtc(&self) -> usize {
        self.groups.len()
    }

    pub fn ref_p_matrix(&self) -> Matrix3<f64> {
        tensors::from_rows(&self.ref_p)
    }

    pub fn compress_matrix(&self) -> Matrix3<f64> {
        tensors::from_rows(&self.compress)
    }

    pub fn trotter_ensemble(&self) -> Option<TrotterEnsemble> {
        TrotterEnsemble::classify(self.integrator, self.tcoupl, self.pcoupl)
    }

    /// Temperature coupling operates on `nsttcouple * delta_t`
    pub fn tcouple_dt(&self) -> f64 {
        self.nsttcouple as f64 * self.delta_t
    }

    pub fn pcouple_dt(&self) -> f64 {
        self.nstpcouple as f64 * self.delta_t
    }

    pub fn uses_drude(&self) -> bool {
        self.drude.is_some()
    }

    /*
    Reject every combination the engine cannot integrate. All the fatal
    configuration errors live here so that a run fails before its first
    step instead of in the middle of one.
     */
    pub fn validate(&self) -> CouplingResult<()> {
        if self.groups.is_empty() {
            return Err(CouplingError::config("at least one temperature-coupling group is required"));
        }
        if self.delta_t <= 0.0 {
            return Err(CouplingError::config("delta_t must be positive"));
        }
        if self.nsttcouple < 1 || self.nstpcouple < 1 {
            return Err(CouplingError::config("coupling strides must be at least 1"));
        }
        if self.nhchainlength < 1 {
            return Err(CouplingError::config("Nose-Hoover chain length must be at least 1"));
        }
        for (i, g) in self.groups.iter().enumerate() {
            if g.nrdf < 0.0 {
                return Err(CouplingError::config(format!("group {} has negative degrees of freedom", i)));
            }
            let a = &g.annealing;
            if a.kind != AnnealingKind::No {
                if a.times.is_empty() || a.times.len() != a.temperatures.len() {
                    return Err(CouplingError::config(format!(
                        "group {} annealing needs matching, non-empty time and temperature lists",
                        i
                    )));
                }
                if a.times.windows(2).any(|w| w[1] < w[0]) {
                    return Err(CouplingError::config(format!("group {} annealing times must not decrease", i)));
                }
            }
        }

        if self.integrator == Integrator::Md && self.nhchainlength > 1 && self.tcoupl == TemperatureCoupling::NoseHoover {
            return Err(CouplingError::unsupported(
                "leap-frog only supports Nose-Hoover chains of length 1",
            ));
        }

        if self.pcoupl == PressureCoupling::Mttk {
            if !self.integrator.is_velocity_verlet() {
                return Err(CouplingError::unsupported("MTTK pressure coupling requires a velocity Verlet integrator"));
            }
            if self.tcoupl != TemperatureCoupling::NoseHoover && self.tcoupl != TemperatureCoupling::No {
                return Err(CouplingError::unsupported(
                    "cannot do MTTK pressure coupling without Nose-Hoover temperature control",
                ));
            }
            if self.pcoupl_type != PressureCouplingType::Isotropic {
                return Err(CouplingError::unsupported("MTTK pressure coupling is only implemented for isotropic coupling"));
            }
            if self.nsttcouple != self.nstpcouple {
                return Err(CouplingError::config("MTTK requires nsttcouple == nstpcouple"));
            }
        }

        if self.pcoupl != PressureCoupling::No && self.tau_p <= 0.0 {
            return Err(CouplingError::config("tau_p must be positive when pressure coupling is on"));
        }

        if self.tcoupl.is_andersen() && !self.integrator.is_velocity_verlet() {
            return Err(CouplingError::unsupported("Andersen temperature coupling requires velocity Verlet"));
        }

        if let Some(drude) = &self.drude {
            if drude.tsteps < 1 {
                return Err(CouplingError::config("Drude thermostat needs at least one sub-step"));
            }
            if self.trotter_ensemble() != Some(TrotterEnsemble::Nvt) {
                return Err(CouplingError::unsupported(
                    "the Drude thermostat requires velocity Verlet with Nose-Hoover chains and no pressure coupling",
                ));
            }
            if self.ngtc() < 2 {
                return Err(CouplingError::config(
                    "the Drude thermostat needs separate groups for center-of-mass and internal motion",
                ));
            }
        }
        Ok(())
    }

    /// Replace `-1` seeds by freshly drawn ones
    pub fn resolve_seeds(&mut self) {
        if self.ld_seed == -1 {
            self.ld_seed = (rand::random::<u32>() >> 1) as i64;
            info!("Setting the v-rescale random seed to {}", self.ld_seed);
        }
        if self.andersen_seed == -1 {
            self.andersen_seed = (rand::random::<u32>() >> 1) as i64;
            info!("Setting the Andersen random seed to {}", self.andersen_seed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nvt() -> CouplingConfig {
        CouplingConfig {
            tcoupl: TemperatureCoupling::NoseHoover,
            ..CouplingConfig::default()
        }
    }

    #[test]
    fn default_nvt_validates() {
        nvt().validate().expect("plain NVT should be accepted");
    }

    #[test]
    fn rejects_mttk_with_berendsen() {
        let config = CouplingConfig {
            tcoupl: TemperatureCoupling::Berendsen,
            pcoupl: PressureCoupling::Mttk,
            ..CouplingConfig::default()
        };
        let err = config.validate().expect_err("MTTK needs NH");
        assert!(matches!(err, CouplingError::UnsupportedEnsemble(_)));
    }

    #[test]
    fn rejects_drude_with_pressure_coupling() {
        let config = CouplingConfig {
            pcoupl: PressureCoupling::Mttk,
            drude: Some(DrudeOptions::default()),
            groups: vec![GroupOptions::new(300.0, 0.1, 10.0), GroupOptions::new(1.0, 0.1, 3.0)],
            ..nvt()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn json_round_trip_keeps_groups() {
        let mut config = nvt();
        config.groups = vec![GroupOptions::new(310.0, 0.5, 99.0)];
        let text = config.to_json().expect("serialize");
        let back = CouplingConfig::from_json_str(&text).expect("parse");
        assert_eq!(back.groups, config.groups);
        assert_eq!(back.tcoupl, TemperatureCoupling::NoseHoover);
    }

    #[test]
    fn seeds_are_resolved_once() {
        let mut config = nvt();
        config.resolve_seeds();
        assert!(config.ld_seed >= 0);
        assert!(config.andersen_seed >= 0);
        let seed = config.ld_seed;
        config.resolve_seeds();
        assert_eq!(seed, config.ld_seed);
    }
}
