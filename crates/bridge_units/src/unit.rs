//! Unit descriptors and unit algebra.
//!
//! A [`Unit`] is a symbol, a [`Dimension`] (exponents over the base
//! quantities), a scale factor relative to the coherent base unit of its
//! [`UnitSystem`], and the system tag itself. Two units are compatible when
//! they measure the same dimension within the same system.

use std::fmt;
use std::ops::{Div, Mul};

use serde::{Deserialize, Serialize};

use crate::error::UnitError;

/// Exponents of the base quantities mass, length, time and temperature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Dimension {
    /// Mass exponent.
    pub mass: i8,
    /// Length exponent.
    pub length: i8,
    /// Time exponent.
    pub time: i8,
    /// Temperature exponent.
    pub temperature: i8,
}

impl Dimension {
    /// The dimensionless dimension.
    pub const NONE: Self = Self::new(0, 0, 0, 0);
    /// Pure mass.
    pub const MASS: Self = Self::new(1, 0, 0, 0);
    /// Pure length.
    pub const LENGTH: Self = Self::new(0, 1, 0, 0);
    /// Pure time.
    pub const TIME: Self = Self::new(0, 0, 1, 0);
    /// Pure temperature.
    pub const TEMPERATURE: Self = Self::new(0, 0, 0, 1);

    /// Create a dimension from its exponents.
    #[must_use]
    pub const fn new(mass: i8, length: i8, time: i8, temperature: i8) -> Self {
        Self {
            mass,
            length,
            time,
            temperature,
        }
    }

    /// Returns `true` if every exponent is zero.
    #[must_use]
    pub const fn is_dimensionless(self) -> bool {
        self.mass == 0 && self.length == 0 && self.time == 0 && self.temperature == 0
    }

    /// Raise the dimension to an integer power.
    #[must_use]
    pub const fn powi(self, n: i8) -> Self {
        Self::new(
            self.mass * n,
            self.length * n,
            self.time * n,
            self.temperature * n,
        )
    }
}

impl Mul for Dimension {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        Self::new(
            self.mass + rhs.mass,
            self.length + rhs.length,
            self.time + rhs.time,
            self.temperature + rhs.temperature,
        )
    }
}

impl Div for Dimension {
    type Output = Self;

    fn div(self, rhs: Self) -> Self {
        Self::new(
            self.mass - rhs.mass,
            self.length - rhs.length,
            self.time - rhs.time,
            self.temperature - rhs.temperature,
        )
    }
}

/// The system a unit's scale factor is expressed in.
///
/// SI units convert among each other by their factors. Generic units
/// (n-body units, the dimensionless code units of grid solvers) only convert
/// among themselves; crossing to SI needs an explicit converter such as
/// [`NbodyConverter`](crate::NbodyConverter).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnitSystem {
    /// Factor relative to kg, m, s, K.
    Si,
    /// Factor relative to the generic mass, length and time units.
    Generic,
}

/// A physical unit descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    symbol: String,
    dimension: Dimension,
    factor: f64,
    system: UnitSystem,
}

impl Unit {
    /// Create an SI unit with the given scale factor relative to the
    /// coherent SI unit of its dimension.
    #[must_use]
    pub fn si(symbol: impl Into<String>, dimension: Dimension, factor: f64) -> Self {
        Self {
            symbol: symbol.into(),
            dimension,
            factor,
            system: UnitSystem::Si,
        }
    }

    /// Create a generic (code) unit.
    #[must_use]
    pub fn generic(symbol: impl Into<String>, dimension: Dimension, factor: f64) -> Self {
        Self {
            symbol: symbol.into(),
            dimension,
            factor,
            system: UnitSystem::Generic,
        }
    }

    /// The dimensionless unit (`none`).
    #[must_use]
    pub fn none() -> Self {
        Self::si("none", Dimension::NONE, 1.0)
    }

    /// The coherent SI unit of a dimension, e.g. `kg * m**2 * s**-2`.
    #[must_use]
    pub fn coherent_si(dimension: Dimension) -> Self {
        let parts: Vec<String> = [
            ("kg", dimension.mass),
            ("m", dimension.length),
            ("s", dimension.time),
            ("K", dimension.temperature),
        ]
        .iter()
        .filter(|(_, exp)| *exp != 0)
        .map(|(sym, exp)| {
            if *exp == 1 {
                (*sym).to_string()
            } else {
                format!("{sym}**{exp}")
            }
        })
        .collect();
        let symbol = if parts.is_empty() {
            "none".to_string()
        } else {
            parts.join(" * ")
        };
        Self::si(symbol, dimension, 1.0)
    }

    /// Rename this unit, keeping dimension, factor and system.
    #[must_use]
    pub fn named(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = symbol.into();
        self
    }

    /// The unit's symbol.
    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// The unit's dimension.
    #[must_use]
    pub fn dimension(&self) -> Dimension {
        self.dimension
    }

    /// Scale factor relative to the coherent unit of its system.
    #[must_use]
    pub fn factor(&self) -> f64 {
        self.factor
    }

    /// The unit system.
    #[must_use]
    pub fn system(&self) -> UnitSystem {
        self.system
    }

    /// Returns `true` for the dimensionless unit family.
    #[must_use]
    pub fn is_none(&self) -> bool {
        self.dimension.is_dimensionless()
    }

    /// Returns `true` if values in `self` can be expressed in `other`.
    #[must_use]
    pub fn is_compatible(&self, other: &Unit) -> bool {
        self.dimension == other.dimension
            && (self.system == other.system || self.dimension.is_dimensionless())
    }

    /// The multiplier taking a magnitude in `self` to a magnitude in `to`.
    ///
    /// # Errors
    ///
    /// Returns [`UnitError::Incompatible`] if the units differ in dimension
    /// or system.
    pub fn conversion_factor(&self, to: &Unit) -> Result<f64, UnitError> {
        if !self.is_compatible(to) {
            return Err(UnitError::Incompatible {
                from: self.symbol.clone(),
                to: to.symbol.clone(),
            });
        }
        Ok(self.factor / to.factor)
    }

    /// Raise the unit to an integer power.
    #[must_use]
    pub fn powi(&self, n: i8) -> Self {
        Self {
            symbol: format!("{}**{n}", wrap(&self.symbol)),
            dimension: self.dimension.powi(n),
            factor: self.factor.powi(i32::from(n)),
            system: self.system,
        }
    }

    fn combine(&self, rhs: &Unit, op: &str, dimension: Dimension, factor: f64) -> Self {
        let system = if self.system == rhs.system || rhs.is_none() {
            self.system
        } else if self.is_none() {
            rhs.system
        } else {
            UnitSystem::Generic
        };
        Self {
            symbol: format!("{} {op} {}", wrap(&self.symbol), wrap(&rhs.symbol)),
            dimension,
            factor,
            system,
        }
    }
}

fn wrap(symbol: &str) -> String {
    if symbol.contains(' ') {
        format!("({symbol})")
    } else {
        symbol.to_string()
    }
}

impl Mul for &Unit {
    type Output = Unit;

    fn mul(self, rhs: &Unit) -> Unit {
        if rhs.symbol == "none" {
            return self.clone();
        }
        if self.symbol == "none" {
            return rhs.clone();
        }
        self.combine(
            rhs,
            "*",
            self.dimension * rhs.dimension,
            self.factor * rhs.factor,
        )
    }
}

impl Div for &Unit {
    type Output = Unit;

    fn div(self, rhs: &Unit) -> Unit {
        if rhs.symbol == "none" {
            return self.clone();
        }
        self.combine(
            rhs,
            "/",
            self.dimension / rhs.dimension,
            self.factor / rhs.factor,
        )
    }
}

impl Mul for Unit {
    type Output = Unit;

    fn mul(self, rhs: Unit) -> Unit {
        &self * &rhs
    }
}

impl Div for Unit {
    type Output = Unit;

    fn div(self, rhs: Unit) -> Unit {
        &self / &rhs
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{generic, si};

    #[test]
    fn test_dimension_algebra() {
        let velocity = Dimension::LENGTH / Dimension::TIME;
        assert_eq!(velocity, Dimension::new(0, 1, -1, 0));
        assert_eq!(velocity.powi(2), Dimension::new(0, 2, -2, 0));
        assert!((velocity / velocity).is_dimensionless());
    }

    #[test]
    fn test_composite_symbol_and_factor() {
        let rate = si::msun() / si::yr();
        assert_eq!(rate.symbol(), "MSun / yr");
        assert_eq!(rate.dimension(), Dimension::new(1, 0, -1, 0));
        let expected = si::msun().factor() / si::yr().factor();
        assert!((rate.factor() - expected).abs() / expected < 1e-12);
    }

    #[test]
    fn test_density_symbol_is_parenthesised() {
        let density = si::g() / si::cm().powi(3);
        assert_eq!(density.symbol(), "g / cm**3");
        let nested = &density * &si::cm();
        assert_eq!(nested.symbol(), "(g / cm**3) * cm");
    }

    #[test]
    fn test_conversion_factor_between_compatible_units() {
        let factor = si::km().conversion_factor(&si::m()).unwrap();
        assert!((factor - 1000.0).abs() < 1e-9);
    }

    #[test]
    fn test_incompatible_dimensions() {
        let err = si::kg().conversion_factor(&si::s()).unwrap_err();
        assert!(matches!(err, UnitError::Incompatible { .. }));
    }

    #[test]
    fn test_generic_and_si_do_not_mix() {
        assert!(!generic::mass().is_compatible(&si::kg()));
        assert!(generic::mass().is_compatible(&generic::mass()));
    }

    #[test]
    fn test_none_is_neutral() {
        let unit = &si::kg() * &Unit::none();
        assert_eq!(unit, si::kg());
        assert!(Unit::none().is_compatible(&Unit::none().named("1")));
    }

    #[test]
    fn test_coherent_si_symbol() {
        let unit = Unit::coherent_si(Dimension::new(1, 2, -2, 0));
        assert_eq!(unit.symbol(), "kg * m**2 * s**-2");
        assert_eq!(Unit::coherent_si(Dimension::NONE).symbol(), "none");
    }
}
