//! Unit conventions shared by every stage of the fit.
//!
//! The estimator works internally in **centimetres** for length, **GeV/c** for
//! momentum and **tesla** for magnetic field. Clusters may arrive in whatever
//! length unit the clustering stage produced; [`UnitSystem`] is the single
//! place that knows how to bring them into the internal convention, so the
//! measurement adapter and the seed builder never carry their own factors.

/// Length unit used by an external producer of cluster positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LengthUnit {
    Millimetre,
    #[default]
    Centimetre,
    Metre,
}

impl LengthUnit {
    /// Multiplicative factor converting this unit to centimetres.
    pub fn to_cm(self) -> f64 {
        match self {
            LengthUnit::Millimetre => 0.1,
            LengthUnit::Centimetre => 1.0,
            LengthUnit::Metre => 100.0,
        }
    }
}

/// Magnetic-field unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldUnit {
    Gauss,
    /// The unit used by the detector simulation's field maps.
    KiloGauss,
    #[default]
    Tesla,
}

impl FieldUnit {
    /// Multiplicative factor converting this unit to tesla.
    pub fn to_tesla(self) -> f64 {
        match self {
            FieldUnit::Gauss => 1e-4,
            FieldUnit::KiloGauss => 0.1,
            FieldUnit::Tesla => 1.0,
        }
    }
}

/// Unit convention of incoming cluster data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UnitSystem {
    /// Unit of cluster positions (covariances are in the same unit squared).
    pub length: LengthUnit,
}

impl UnitSystem {
    pub fn new(length: LengthUnit) -> Self {
        Self { length }
    }

    /// Convert a position component to centimetres.
    #[inline]
    pub fn length_to_cm(&self, value: f64) -> f64 {
        value * self.length.to_cm()
    }

    /// Convert a covariance entry (length²) to cm².
    #[inline]
    pub fn variance_to_cm2(&self, value: f64) -> f64 {
        let f = self.length.to_cm();
        value * f * f
    }
}
