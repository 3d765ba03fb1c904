//! Unit-tagged magnitudes.
//!
//! A [`UnitValue`] never changes its unit implicitly: conversion happens only
//! through [`UnitValue::to`] / [`UnitValue::value_in`], which check
//! dimensional compatibility first.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::UnitError;
use crate::unit::Unit;

/// A scalar or an ordered sequence of scalars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Magnitude {
    /// A single number.
    Scalar(f64),
    /// A homogeneous ordered sequence, as used by vectorised calls.
    Sequence(Vec<f64>),
}

impl Magnitude {
    /// Returns `None` for a scalar, or the sequence length.
    #[must_use]
    pub fn len(&self) -> Option<usize> {
        match self {
            Self::Scalar(_) => None,
            Self::Sequence(values) => Some(values.len()),
        }
    }

    /// Returns `true` for a scalar magnitude.
    #[must_use]
    pub fn is_scalar(&self) -> bool {
        matches!(self, Self::Scalar(_))
    }

    /// The magnitude as a flat vector (one element for a scalar).
    #[must_use]
    pub fn to_vec(&self) -> Vec<f64> {
        match self {
            Self::Scalar(x) => vec![*x],
            Self::Sequence(values) => values.clone(),
        }
    }

    /// Apply `f` element-wise.
    #[must_use]
    pub fn map(&self, f: impl Fn(f64) -> f64) -> Self {
        match self {
            Self::Scalar(x) => Self::Scalar(f(*x)),
            Self::Sequence(values) => Self::Sequence(values.iter().map(|&x| f(x)).collect()),
        }
    }

    /// Combine two magnitudes element-wise. A scalar broadcasts against a
    /// sequence.
    ///
    /// # Errors
    ///
    /// Returns [`UnitError::LengthMismatch`] for sequences of different
    /// length.
    pub fn zip_with(&self, other: &Self, f: impl Fn(f64, f64) -> f64) -> Result<Self, UnitError> {
        match (self, other) {
            (Self::Scalar(a), Self::Scalar(b)) => Ok(Self::Scalar(f(*a, *b))),
            (Self::Scalar(a), Self::Sequence(bs)) => {
                Ok(Self::Sequence(bs.iter().map(|&b| f(*a, b)).collect()))
            }
            (Self::Sequence(a_values), Self::Scalar(b)) => {
                Ok(Self::Sequence(a_values.iter().map(|&a| f(a, *b)).collect()))
            }
            (Self::Sequence(a_values), Self::Sequence(b_values)) => {
                if a_values.len() != b_values.len() {
                    return Err(UnitError::LengthMismatch {
                        left: a_values.len(),
                        right: b_values.len(),
                    });
                }
                Ok(Self::Sequence(
                    a_values
                        .iter()
                        .zip(b_values)
                        .map(|(&a, &b)| f(a, b))
                        .collect(),
                ))
            }
        }
    }
}

impl From<f64> for Magnitude {
    fn from(value: f64) -> Self {
        Self::Scalar(value)
    }
}

impl From<Vec<f64>> for Magnitude {
    fn from(values: Vec<f64>) -> Self {
        Self::Sequence(values)
    }
}

/// A magnitude paired with a physical unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitValue {
    magnitude: Magnitude,
    unit: Unit,
}

impl UnitValue {
    /// Pair a magnitude with a unit.
    #[must_use]
    pub fn new(magnitude: impl Into<Magnitude>, unit: Unit) -> Self {
        Self {
            magnitude: magnitude.into(),
            unit,
        }
    }

    /// A scalar quantity.
    #[must_use]
    pub fn scalar(value: f64, unit: Unit) -> Self {
        Self::new(Magnitude::Scalar(value), unit)
    }

    /// A sequence quantity.
    #[must_use]
    pub fn sequence(values: Vec<f64>, unit: Unit) -> Self {
        Self::new(Magnitude::Sequence(values), unit)
    }

    /// The raw magnitude, expressed in [`UnitValue::unit`].
    #[must_use]
    pub fn magnitude(&self) -> &Magnitude {
        &self.magnitude
    }

    /// The unit of this value.
    #[must_use]
    pub fn unit(&self) -> &Unit {
        &self.unit
    }

    /// Split into magnitude and unit.
    #[must_use]
    pub fn into_parts(self) -> (Magnitude, Unit) {
        (self.magnitude, self.unit)
    }

    /// Returns `None` for a scalar, or the sequence length.
    #[must_use]
    pub fn len(&self) -> Option<usize> {
        self.magnitude.len()
    }

    /// Returns `true` if the magnitude is a scalar.
    #[must_use]
    pub fn is_scalar(&self) -> bool {
        self.magnitude.is_scalar()
    }

    /// The scalar magnitude, if this is a scalar.
    #[must_use]
    pub fn as_scalar(&self) -> Option<f64> {
        match self.magnitude {
            Magnitude::Scalar(x) => Some(x),
            Magnitude::Sequence(_) => None,
        }
    }

    /// The magnitude expressed in `unit`.
    ///
    /// # Errors
    ///
    /// Returns [`UnitError::Incompatible`] if `unit` measures a different
    /// dimension or belongs to another unit system.
    pub fn value_in(&self, unit: &Unit) -> Result<Magnitude, UnitError> {
        let factor = self.unit.conversion_factor(unit)?;
        if factor == 1.0 {
            return Ok(self.magnitude.clone());
        }
        Ok(self.magnitude.map(|x| x * factor))
    }

    /// Convert to `unit`.
    ///
    /// # Errors
    ///
    /// Returns [`UnitError::Incompatible`] for incompatible units.
    pub fn to(&self, unit: &Unit) -> Result<Self, UnitError> {
        Ok(Self {
            magnitude: self.value_in(unit)?,
            unit: unit.clone(),
        })
    }

    /// Add a compatible quantity; the result is in `self`'s unit.
    ///
    /// # Errors
    ///
    /// Returns [`UnitError`] for incompatible units or mismatched sequence
    /// lengths.
    pub fn checked_add(&self, other: &Self) -> Result<Self, UnitError> {
        let rhs = other.value_in(&self.unit)?;
        Ok(Self {
            magnitude: self.magnitude.zip_with(&rhs, |a, b| a + b)?,
            unit: self.unit.clone(),
        })
    }

    /// Subtract a compatible quantity; the result is in `self`'s unit.
    ///
    /// # Errors
    ///
    /// Returns [`UnitError`] for incompatible units or mismatched sequence
    /// lengths.
    pub fn checked_sub(&self, other: &Self) -> Result<Self, UnitError> {
        let rhs = other.value_in(&self.unit)?;
        Ok(Self {
            magnitude: self.magnitude.zip_with(&rhs, |a, b| a - b)?,
            unit: self.unit.clone(),
        })
    }

    /// Multiply the magnitude by a dimensionless factor.
    #[must_use]
    pub fn scale(&self, factor: f64) -> Self {
        Self {
            magnitude: self.magnitude.map(|x| x * factor),
            unit: self.unit.clone(),
        }
    }

    /// The product of two quantities, in the product unit.
    ///
    /// # Errors
    ///
    /// Returns [`UnitError::LengthMismatch`] for sequences of different
    /// length.
    pub fn checked_mul(&self, other: &Self) -> Result<Self, UnitError> {
        Ok(Self {
            magnitude: self.magnitude.zip_with(&other.magnitude, |a, b| a * b)?,
            unit: &self.unit * &other.unit,
        })
    }

    /// The quotient of two quantities, in the quotient unit.
    ///
    /// # Errors
    ///
    /// Returns [`UnitError::LengthMismatch`] for sequences of different
    /// length.
    pub fn checked_div(&self, other: &Self) -> Result<Self, UnitError> {
        Ok(Self {
            magnitude: self.magnitude.zip_with(&other.magnitude, |a, b| a / b)?,
            unit: &self.unit / &other.unit,
        })
    }
}

impl fmt::Display for UnitValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.magnitude {
            Magnitude::Scalar(x) => write!(f, "{x} {}", self.unit),
            Magnitude::Sequence(values) => write!(f, "{values:?} {}", self.unit),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{generic, si};

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() <= 1e-9 * a.abs().max(b.abs())
    }

    #[test]
    fn test_mass_loss_rate_conversion() {
        let rate = UnitValue::scalar(1.0e-6, si::msun() / si::yr());
        let kg_per_s = si::kg() / si::s();
        let converted = rate.to(&kg_per_s).unwrap();
        let expected = 1.0e-6 * 1.988_92e30 / (365.242_199 * 86_400.0);
        assert!(close(converted.as_scalar().unwrap(), expected));
        assert_eq!(converted.unit(), &kg_per_s);
    }

    #[test]
    fn test_sequence_conversion_keeps_order() {
        let masses = UnitValue::sequence(vec![1.0, 2.0, 3.0], si::g());
        let Magnitude::Sequence(kg) = masses.value_in(&si::kg()).unwrap() else {
            panic!("expected a sequence");
        };
        assert!(close(kg[0], 1.0e-3));
        assert!(close(kg[2], 3.0e-3));
    }

    #[test]
    fn test_value_in_rejects_wrong_dimension() {
        let t = UnitValue::scalar(1.0, si::yr());
        assert!(matches!(
            t.value_in(&si::msun()),
            Err(UnitError::Incompatible { .. })
        ));
    }

    #[test]
    fn test_unit_unchanged_without_conversion() {
        let v = UnitValue::scalar(5.0, generic::time());
        let same = v.to(&generic::time()).unwrap();
        assert_eq!(same, v);
    }

    #[test]
    fn test_checked_add_uses_left_unit() {
        let a = UnitValue::scalar(1.0, si::km());
        let b = UnitValue::scalar(500.0, si::m());
        let sum = a.checked_add(&b).unwrap();
        assert_eq!(sum.unit(), &si::km());
        assert!(close(sum.as_scalar().unwrap(), 1.5));
    }

    #[test]
    fn test_checked_sub_length_mismatch() {
        let a = UnitValue::sequence(vec![1.0, 2.0], si::m());
        let b = UnitValue::sequence(vec![1.0], si::m());
        assert_eq!(
            a.checked_sub(&b),
            Err(UnitError::LengthMismatch { left: 2, right: 1 })
        );
    }

    #[test]
    fn test_product_unit() {
        let mass = UnitValue::scalar(2.0, generic::mass());
        let speed = UnitValue::scalar(3.0, generic::speed());
        let momentum = mass.checked_mul(&speed).unwrap();
        assert!(momentum.unit().is_compatible(&generic::momentum()));
        assert!(close(momentum.as_scalar().unwrap(), 6.0));
    }

    #[test]
    fn test_serialises_with_unit() {
        let v = UnitValue::scalar(1.0e12, si::yr());
        let json = serde_json::to_value(&v).unwrap();
        assert_eq!(json["unit"]["symbol"], "yr");
        assert_eq!(json["magnitude"], 1.0e12);
    }
}
