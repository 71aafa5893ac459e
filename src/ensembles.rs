/*
Ensemble, integrator and coupling-scheme identities.

The Trotter-decomposed ensembles only exist for the velocity Verlet family:

    NVT: Nose-Hoover particle chains, no MTTK barostat
    NPT: Nose-Hoover particle chains plus MTTK barostat
    NPH: MTTK barostat without particle thermostat
*/

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Integrator {
    /// Leap-frog; kinetic energy is the average of two half steps
    Md,
    /// Velocity Verlet, full-step kinetic energy
    VelocityVerlet,
    /// Velocity Verlet with half-step averaged kinetic energy
    VelocityVerletAveK,
}

impl Integrator {
    pub fn is_velocity_verlet(self) -> bool {
        matches!(self, Integrator::VelocityVerlet | Integrator::VelocityVerletAveK)
    }

    /// Whether thermostats read the full-step (F-type) kinetic energy
    pub fn uses_full_step_ekin(self) -> bool {
        self == Integrator::VelocityVerlet
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TemperatureCoupling {
    No,
    Berendsen,
    NoseHoover,
    VRescale,
    Andersen,
    AndersenMassive,
}

impl TemperatureCoupling {
    pub fn is_andersen(self) -> bool {
        matches!(self, TemperatureCoupling::Andersen | TemperatureCoupling::AndersenMassive)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PressureCoupling {
    No,
    Berendsen,
    ParrinelloRahman,
    /// Martyna-Tuckerman-Tobias-Klein, Trotter decomposed
    Mttk,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PressureCouplingType {
    Isotropic,
    SemiIsotropic,
    Anisotropic,
    SurfaceTension,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PbcType {
    Xyz,
    Xy,
    No,
}

/// Ensemble selected for Trotter decomposition
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrotterEnsemble {
    Nvt,
    Npt,
    Nph,
}

impl TrotterEnsemble {
    pub fn classify(
        integrator: Integrator,
        tcoupl: TemperatureCoupling,
        pcoupl: PressureCoupling,
    ) -> Option<TrotterEnsemble> {
        if !integrator.is_velocity_verlet() {
            return None;
        }
        let nose_hoover = tcoupl == TemperatureCoupling::NoseHoover;
        match (pcoupl == PressureCoupling::Mttk, nose_hoover) {
            (true, true) => Some(TrotterEnsemble::Npt),
            (true, false) => Some(TrotterEnsemble::Nph),
            (false, true) => Some(TrotterEnsemble::Nvt),
            (false, false) => None,
        }
    }

    pub fn has_barostat(self) -> bool {
        matches!(self, TrotterEnsemble::Npt | TrotterEnsemble::Nph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leapfrog_never_uses_trotter() {
        let e = TrotterEnsemble::classify(
            Integrator::Md,
            TemperatureCoupling::NoseHoover,
            PressureCoupling::Mttk,
        );
        assert_eq!(e, None);
    }

    #[test]
    fn classifies_velocity_verlet_ensembles() {
        use TemperatureCoupling as T;
        let vv = Integrator::VelocityVerlet;
        assert_eq!(
            TrotterEnsemble::classify(vv, T::NoseHoover, PressureCoupling::No),
            Some(TrotterEnsemble::Nvt)
        );
        assert_eq!(
            TrotterEnsemble::classify(vv, T::NoseHoover, PressureCoupling::Mttk),
            Some(TrotterEnsemble::Npt)
        );
        assert_eq!(
            TrotterEnsemble::classify(vv, T::No, PressureCoupling::Mttk),
            Some(TrotterEnsemble::Nph)
        );
        assert_eq!(TrotterEnsemble::classify(vv, T::Berendsen, PressureCoupling::No), None);
    }

    #[test]
    fn serde_names_are_kebab_case() {
        let json = serde_json::to_string(&Integrator::VelocityVerletAveK).expect("serialize");
        assert_eq!(json, "\"velocity-verlet-ave-k\"");
        let back: TemperatureCoupling = serde_json::from_str("\"v-rescale\"").expect("parse");
        assert_eq!(back, TemperatureCoupling::VRescale);
    }
}
