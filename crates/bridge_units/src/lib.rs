//! # bridge_units
//!
//! Runtime physical units for values that cross the worker boundary.
//!
//! Every numeric argument or result of a remote function may carry a unit.
//! Units are runtime descriptors rather than compile-time types because the
//! unit of a parameter is declared per function at registry build time, not
//! per Rust type.
//!
//! This crate provides:
//!
//! - [`Unit`] and [`Dimension`]: Unit descriptors and their algebra.
//! - [`UnitValue`]: A scalar or sequence magnitude paired with a unit.
//! - [`si`] and [`generic`]: The fixed registry of named units.
//! - [`NbodyConverter`]: Conversion between generic (n-body) and SI units.
//! - [`UnitError`]: Unit-layer error types.

pub mod error;
pub mod nbody;
pub mod registry;
pub mod unit;
pub mod value;

pub use error::UnitError;
pub use nbody::NbodyConverter;
pub use registry::{generic, lookup, si};
pub use unit::{Dimension, Unit, UnitSystem};
pub use value::{Magnitude, UnitValue};
