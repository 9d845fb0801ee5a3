//! Particle-type hypotheses keyed by PDG Monte Carlo particle code.
//!
//! The estimator needs two numbers from the hypothesis: the charge (in units
//! of the elementary charge), which fixes the sense of bending in the field,
//! and the mass, which enters the velocity used for multiple-scattering noise.

/// Atomic mass unit in GeV/c², as used by the detector simulation for ions.
pub const ATOMIC_MASS_UNIT_GEV: f64 = 0.9314940954;

/// Mass and charge assumed for a track during fitting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParticleHypothesis {
    /// PDG particle code the hypothesis was derived from.
    pub pdg_code: i32,
    /// Charge in units of e.
    pub charge: f64,
    /// Rest mass in GeV/c².
    pub mass_gev: f64,
}

impl ParticleHypothesis {
    /// Resolve a PDG code into charge and mass.
    ///
    /// Covers the charged leptons, light charged hadrons and nuclear codes of
    /// the form `10LZZZAAAI`. Returns `None` for unknown or neutral codes,
    /// which cannot be fitted in a magnetic field.
    pub fn from_pdg(pdg_code: i32) -> Option<Self> {
        let (charge, mass_gev) = match pdg_code {
            11 => (-1.0, 0.000510998950),
            -11 => (1.0, 0.000510998950),
            13 => (-1.0, 0.1056583755),
            -13 => (1.0, 0.1056583755),
            211 => (1.0, 0.13957039),
            -211 => (-1.0, 0.13957039),
            321 => (1.0, 0.493677),
            -321 => (-1.0, 0.493677),
            2212 => (1.0, 0.93827208816),
            -2212 => (-1.0, 0.93827208816),
            code if code > 1_000_000_000 => {
                let z = (code / 10_000) % 1000;
                let a = (code / 10) % 1000;
                if z == 0 || a == 0 {
                    return None;
                }
                (z as f64, a as f64 * ATOMIC_MASS_UNIT_GEV)
            }
            _ => return None,
        };
        Some(Self {
            pdg_code,
            charge,
            mass_gev,
        })
    }

    /// Velocity β = p / E for a momentum magnitude in GeV/c.
    pub fn beta(&self, momentum_gev: f64) -> f64 {
        let e = (momentum_gev * momentum_gev + self.mass_gev * self.mass_gev).sqrt();
        if e > 0.0 {
            momentum_gev / e
        } else {
            0.0
        }
    }
}
