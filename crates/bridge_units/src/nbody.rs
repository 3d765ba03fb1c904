//! Conversion between generic n-body units and SI.
//!
//! N-body workers compute with G = 1. Fixing a reference mass and a
//! reference length pins the generic time unit to
//! `sqrt(length^3 / (G * mass))`, after which any generic quantity of
//! mass/length/time dimension maps to SI by a single factor.

use crate::error::UnitError;
use crate::unit::{Dimension, Unit, UnitSystem};
use crate::value::UnitValue;

/// Newton's gravitational constant in m^3 kg^-1 s^-2.
pub const G: f64 = 6.674_28e-11;

/// Converts between generic units and SI given reference scales.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NbodyConverter {
    mass: f64,
    length: f64,
    time: f64,
}

impl NbodyConverter {
    /// Build a converter from a reference mass and a reference length.
    ///
    /// # Errors
    ///
    /// Returns [`UnitError::InvalidReference`] if either reference is not a
    /// positive scalar, or [`UnitError::Incompatible`] if they are not a
    /// mass and a length in SI-convertible units.
    pub fn new(mass: &UnitValue, length: &UnitValue) -> Result<Self, UnitError> {
        let mass = reference_scalar(mass, &Unit::coherent_si(Dimension::MASS))?;
        let length = reference_scalar(length, &Unit::coherent_si(Dimension::LENGTH))?;
        let time = (length.powi(3) / (G * mass)).sqrt();
        Ok(Self { mass, length, time })
    }

    /// The generic time unit expressed in seconds.
    #[must_use]
    pub fn time_unit_seconds(&self) -> f64 {
        self.time
    }

    fn factor(&self, unit: &Unit) -> Result<f64, UnitError> {
        let dim = unit.dimension();
        if dim.temperature != 0 {
            return Err(UnitError::NotConvertible(unit.symbol().to_string()));
        }
        Ok(self.mass.powi(i32::from(dim.mass))
            * self.length.powi(i32::from(dim.length))
            * self.time.powi(i32::from(dim.time)))
    }

    /// Express a generic quantity in the coherent SI unit of its dimension.
    ///
    /// # Errors
    ///
    /// Returns [`UnitError::NotConvertible`] if the value is not in generic
    /// units or involves temperature.
    pub fn to_si(&self, value: &UnitValue) -> Result<UnitValue, UnitError> {
        let unit = value.unit();
        if unit.system() != UnitSystem::Generic {
            return Err(UnitError::NotConvertible(unit.symbol().to_string()));
        }
        let factor = unit.factor() * self.factor(unit)?;
        Ok(UnitValue::new(
            value.magnitude().map(|x| x * factor),
            Unit::coherent_si(unit.dimension()),
        ))
    }

    /// Express an SI quantity in the given generic unit.
    ///
    /// # Errors
    ///
    /// Returns [`UnitError::NotConvertible`] if `target` is not generic, or
    /// [`UnitError::Incompatible`] if the dimensions differ.
    pub fn from_si(&self, value: &UnitValue, target: &Unit) -> Result<UnitValue, UnitError> {
        if target.system() != UnitSystem::Generic || value.unit().system() != UnitSystem::Si {
            return Err(UnitError::NotConvertible(target.symbol().to_string()));
        }
        if value.unit().dimension() != target.dimension() {
            return Err(UnitError::Incompatible {
                from: value.unit().symbol().to_string(),
                to: target.symbol().to_string(),
            });
        }
        let factor = value.unit().factor() / (self.factor(target)? * target.factor());
        Ok(UnitValue::new(
            value.magnitude().map(|x| x * factor),
            target.clone(),
        ))
    }
}

fn reference_scalar(value: &UnitValue, base: &Unit) -> Result<f64, UnitError> {
    let x = value
        .to(base)?
        .as_scalar()
        .ok_or_else(|| UnitError::InvalidReference(value.to_string()))?;
    if x <= 0.0 || !x.is_finite() {
        return Err(UnitError::InvalidReference(value.to_string()));
    }
    Ok(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{generic, si};

    fn sun_au() -> NbodyConverter {
        NbodyConverter::new(
            &UnitValue::scalar(1.0, si::msun()),
            &UnitValue::scalar(1.0, si::au()),
        )
        .unwrap()
    }

    #[test]
    fn test_time_unit_is_year_over_two_pi() {
        // One generic time unit for (1 MSun, 1 AU) is close to 1/(2 pi) yr.
        let years = sun_au().time_unit_seconds() / si::yr().factor();
        assert!((years * std::f64::consts::TAU - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_mass_round_trip() {
        let converter = sun_au();
        let m = UnitValue::sequence(vec![0.5, 2.0], generic::mass());
        let si_mass = converter.to_si(&m).unwrap();
        assert_eq!(si_mass.unit().dimension(), Dimension::MASS);
        let back = converter.from_si(&si_mass, &generic::mass()).unwrap();
        let values = back.magnitude().to_vec();
        assert!((values[0] - 0.5).abs() < 1e-12);
        assert!((values[1] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_from_si_accepts_scaled_units() {
        let converter = sun_au();
        let v = converter
            .from_si(&UnitValue::scalar(2.0, si::msun()), &generic::mass())
            .unwrap();
        assert!((v.as_scalar().unwrap() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_rejects_si_input_to_to_si() {
        let err = sun_au()
            .to_si(&UnitValue::scalar(1.0, si::kg()))
            .unwrap_err();
        assert!(matches!(err, UnitError::NotConvertible(_)));
    }

    #[test]
    fn test_rejects_non_positive_reference() {
        let err = NbodyConverter::new(
            &UnitValue::scalar(0.0, si::msun()),
            &UnitValue::scalar(1.0, si::au()),
        )
        .unwrap_err();
        assert!(matches!(err, UnitError::InvalidReference(_)));
    }
}
