//! Magnetic-field and material models consumed by the propagator.
//!
//! Both are plain values handed to the fitter through
//! [`FitConfig`](crate::FitConfig); nothing here is process-global, so two
//! fitters with different fields can run side by side.

use crate::units::FieldUnit;
use crate::Vector3;

/// Curvature constant κ in GeV/(c·T·cm): `dp/ds = κ · q · (t × B)`.
pub const CURVATURE_CONSTANT: f64 = 0.299792458e-2;

/// Highland-formula scale, GeV.
const HIGHLAND_SCALE_GEV: f64 = 0.0136;

/// Uniform magnetic field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldModel {
    /// Field vector in tesla.
    b_tesla: Vector3,
}

impl FieldModel {
    /// Uniform field given in any supported unit.
    pub fn uniform(bx: f64, by: f64, bz: f64, unit: FieldUnit) -> Self {
        let f = unit.to_tesla();
        Self {
            b_tesla: Vector3::new(bx * f, by * f, bz * f),
        }
    }

    pub fn uniform_tesla(bx: f64, by: f64, bz: f64) -> Self {
        Self::uniform(bx, by, bz, FieldUnit::Tesla)
    }

    pub fn zero() -> Self {
        Self {
            b_tesla: Vector3::zeros(),
        }
    }

    /// Field vector in tesla at a position (cm). Uniform, so position is unused.
    #[inline]
    pub fn field_at(&self, _position: &Vector3) -> Vector3 {
        self.b_tesla
    }

    /// Field vector in tesla.
    pub fn vector(&self) -> Vector3 {
        self.b_tesla
    }

    pub fn is_zero(&self) -> bool {
        self.b_tesla.norm_squared() == 0.0
    }
}

impl Default for FieldModel {
    /// The GLAD-TPC reference field: 5 kG along +y.
    fn default() -> Self {
        Self::uniform(0.0, 5.0, 0.0, FieldUnit::KiloGauss)
    }
}

/// Material traversed between measurements.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Material {
    /// No material effects.
    #[default]
    Vacuum,
    /// A homogeneous medium that adds multiple-scattering noise.
    Homogeneous {
        /// Radiation length X₀ in cm.
        radiation_length_cm: f64,
    },
}

impl Material {
    /// RMS plane scattering angle θ₀ (radians) after a path `length_cm`.
    ///
    /// Highland formula:
    /// `θ₀ = 13.6 MeV / (β p) · |z| · √(x/X₀) · (1 + 0.038 ln(x z² / (X₀ β²)))`.
    /// The logarithmic correction is clamped so θ₀ never goes negative for
    /// very thin layers.
    pub fn scattering_angle(&self, length_cm: f64, momentum_gev: f64, beta: f64, charge: f64) -> f64 {
        match *self {
            Material::Vacuum => 0.0,
            Material::Homogeneous {
                radiation_length_cm,
            } => {
                let length = length_cm.abs();
                if length == 0.0 || radiation_length_cm <= 0.0 || momentum_gev <= 0.0 || beta <= 0.0 {
                    return 0.0;
                }
                let t = length / radiation_length_cm;
                let z = charge.abs();
                let log_term = 1.0 + 0.038 * (t * z * z / (beta * beta)).ln();
                HIGHLAND_SCALE_GEV / (beta * momentum_gev) * z * t.sqrt() * log_term.max(0.0)
            }
        }
    }
}
