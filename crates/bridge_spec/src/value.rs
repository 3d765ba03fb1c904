//! Values exchanged with a worker.
//!
//! [`Scalar`] and [`Column`] are the untyped-unit wire representation: one
//! typed element, or one typed homogeneous column. [`Value`] is what callers
//! pass and receive; it may additionally carry a unit through
//! [`Value::Quantity`].

use bridge_units::{Magnitude, UnitValue};
use serde::{Deserialize, Serialize};

use crate::function::ScalarType;
use crate::handle::EntityHandle;

/// A single typed element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Scalar {
    /// 32-bit signed integer.
    Int32(i32),
    /// 64-bit signed integer.
    Int64(i64),
    /// 32-bit float.
    Float32(f32),
    /// 64-bit float.
    Float64(f64),
    /// Boolean.
    Bool(bool),
    /// String.
    String(String),
}

impl Scalar {
    /// The element type.
    #[must_use]
    pub fn scalar_type(&self) -> ScalarType {
        match self {
            Self::Int32(_) => ScalarType::Int32,
            Self::Int64(_) => ScalarType::Int64,
            Self::Float32(_) => ScalarType::Float32,
            Self::Float64(_) => ScalarType::Float64,
            Self::Bool(_) => ScalarType::Bool,
            Self::String(_) => ScalarType::String,
        }
    }

    /// The zero value of a type.
    #[must_use]
    pub fn zero(ty: ScalarType) -> Self {
        match ty {
            ScalarType::Int32 => Self::Int32(0),
            ScalarType::Int64 => Self::Int64(0),
            ScalarType::Float32 => Self::Float32(0.0),
            ScalarType::Float64 => Self::Float64(0.0),
            ScalarType::Bool => Self::Bool(false),
            ScalarType::String => Self::String(String::new()),
        }
    }

    /// Convert to `ty` where no information is lost in the usual sense:
    /// integer widening, integer to float, and between float widths.
    /// Narrowing int64 to int32 succeeds only when the value fits.
    #[must_use]
    pub fn coerce(&self, ty: ScalarType) -> Option<Self> {
        if self.scalar_type() == ty {
            return Some(self.clone());
        }
        match (self, ty) {
            (Self::Int32(x), ScalarType::Int64) => Some(Self::Int64(i64::from(*x))),
            (Self::Int64(x), ScalarType::Int32) => i32::try_from(*x).ok().map(Self::Int32),
            (Self::Int32(x), ScalarType::Float64) => Some(Self::Float64(f64::from(*x))),
            (Self::Int64(x), ScalarType::Float64) => Some(Self::Float64(*x as f64)),
            (Self::Int32(x), ScalarType::Float32) => Some(Self::Float32(*x as f32)),
            (Self::Int64(x), ScalarType::Float32) => Some(Self::Float32(*x as f32)),
            (Self::Float32(x), ScalarType::Float64) => Some(Self::Float64(f64::from(*x))),
            (Self::Float64(x), ScalarType::Float32) => Some(Self::Float32(*x as f32)),
            _ => None,
        }
    }

    /// The value as `f64`, for numeric scalars.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int32(x) => Some(f64::from(*x)),
            Self::Int64(x) => Some(*x as f64),
            Self::Float32(x) => Some(f64::from(*x)),
            Self::Float64(x) => Some(*x),
            Self::Bool(_) | Self::String(_) => None,
        }
    }

    /// The value as `i32`, for int32 scalars.
    #[must_use]
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Self::Int32(x) => Some(*x),
            Self::Int64(x) => i32::try_from(*x).ok(),
            _ => None,
        }
    }

    /// The value as `bool`, for boolean scalars.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The value as a string slice, for string scalars.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

/// A typed homogeneous column of elements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Column {
    /// int32 elements.
    Int32(Vec<i32>),
    /// int64 elements.
    Int64(Vec<i64>),
    /// float32 elements.
    Float32(Vec<f32>),
    /// float64 elements.
    Float64(Vec<f64>),
    /// bool elements.
    Bool(Vec<bool>),
    /// string elements.
    String(Vec<String>),
}

impl Column {
    /// An empty column of the given type.
    #[must_use]
    pub fn empty(ty: ScalarType) -> Self {
        match ty {
            ScalarType::Int32 => Self::Int32(Vec::new()),
            ScalarType::Int64 => Self::Int64(Vec::new()),
            ScalarType::Float32 => Self::Float32(Vec::new()),
            ScalarType::Float64 => Self::Float64(Vec::new()),
            ScalarType::Bool => Self::Bool(Vec::new()),
            ScalarType::String => Self::String(Vec::new()),
        }
    }

    /// A column of `n` copies of `value`.
    #[must_use]
    pub fn repeat(value: &Scalar, n: usize) -> Self {
        let mut column = Self::empty(value.scalar_type());
        for _ in 0..n {
            column.push(value.clone());
        }
        column
    }

    /// Build a column of type `ty`, coercing every element.
    ///
    /// Returns `None` if an element cannot be coerced.
    #[must_use]
    pub fn from_scalars(ty: ScalarType, values: impl IntoIterator<Item = Scalar>) -> Option<Self> {
        let mut column = Self::empty(ty);
        for value in values {
            if !column.push(value.coerce(ty)?) {
                return None;
            }
        }
        Some(column)
    }

    /// Build a numeric column from `f64`s.
    ///
    /// Returns `None` for non-numeric types, and for integer types unless
    /// every value is a finite whole number in range.
    #[must_use]
    pub fn from_f64(ty: ScalarType, values: &[f64]) -> Option<Self> {
        match ty {
            ScalarType::Float64 => Some(Self::Float64(values.to_vec())),
            ScalarType::Float32 => Some(Self::Float32(values.iter().map(|&x| x as f32).collect())),
            ScalarType::Int32 => values
                .iter()
                .map(|&x| whole(x, 32).map(|x| x as i32))
                .collect::<Option<_>>()
                .map(Self::Int32),
            ScalarType::Int64 => values
                .iter()
                .map(|&x| whole(x, 64).map(|x| x as i64))
                .collect::<Option<_>>()
                .map(Self::Int64),
            ScalarType::Bool | ScalarType::String => None,
        }
    }

    /// A column of entity handles.
    #[must_use]
    pub fn from_handles(handles: &[EntityHandle]) -> Self {
        Self::Int32(handles.iter().map(|h| h.id()).collect())
    }

    /// The element type.
    #[must_use]
    pub fn scalar_type(&self) -> ScalarType {
        match self {
            Self::Int32(_) => ScalarType::Int32,
            Self::Int64(_) => ScalarType::Int64,
            Self::Float32(_) => ScalarType::Float32,
            Self::Float64(_) => ScalarType::Float64,
            Self::Bool(_) => ScalarType::Bool,
            Self::String(_) => ScalarType::String,
        }
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Int32(v) => v.len(),
            Self::Int64(v) => v.len(),
            Self::Float32(v) => v.len(),
            Self::Float64(v) => v.len(),
            Self::Bool(v) => v.len(),
            Self::String(v) => v.len(),
        }
    }

    /// Returns `true` if the column has no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The element at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<Scalar> {
        match self {
            Self::Int32(v) => v.get(index).copied().map(Scalar::Int32),
            Self::Int64(v) => v.get(index).copied().map(Scalar::Int64),
            Self::Float32(v) => v.get(index).copied().map(Scalar::Float32),
            Self::Float64(v) => v.get(index).copied().map(Scalar::Float64),
            Self::Bool(v) => v.get(index).copied().map(Scalar::Bool),
            Self::String(v) => v.get(index).cloned().map(Scalar::String),
        }
    }

    /// Append an element of the column's type. Returns `false` (and leaves
    /// the column unchanged) on a type mismatch.
    pub fn push(&mut self, value: Scalar) -> bool {
        match (self, value) {
            (Self::Int32(v), Scalar::Int32(x)) => v.push(x),
            (Self::Int64(v), Scalar::Int64(x)) => v.push(x),
            (Self::Float32(v), Scalar::Float32(x)) => v.push(x),
            (Self::Float64(v), Scalar::Float64(x)) => v.push(x),
            (Self::Bool(v), Scalar::Bool(x)) => v.push(x),
            (Self::String(v), Scalar::String(x)) => v.push(x),
            _ => return false,
        }
        true
    }

    /// Replace the element at `index`. Returns `false` on a type mismatch or
    /// an out-of-bounds index.
    pub fn set(&mut self, index: usize, value: Scalar) -> bool {
        if index >= self.len() {
            return false;
        }
        match (self, value) {
            (Self::Int32(v), Scalar::Int32(x)) => v[index] = x,
            (Self::Int64(v), Scalar::Int64(x)) => v[index] = x,
            (Self::Float32(v), Scalar::Float32(x)) => v[index] = x,
            (Self::Float64(v), Scalar::Float64(x)) => v[index] = x,
            (Self::Bool(v), Scalar::Bool(x)) => v[index] = x,
            (Self::String(v), Scalar::String(x)) => v[index] = x,
            _ => return false,
        }
        true
    }

    /// All elements as scalars, in order.
    #[must_use]
    pub fn to_scalars(&self) -> Vec<Scalar> {
        (0..self.len()).filter_map(|i| self.get(i)).collect()
    }

    /// Numeric columns as `f64`s.
    #[must_use]
    pub fn to_f64(&self) -> Option<Vec<f64>> {
        match self {
            Self::Int32(v) => Some(v.iter().map(|&x| f64::from(x)).collect()),
            Self::Int64(v) => Some(v.iter().map(|&x| x as f64).collect()),
            Self::Float32(v) => Some(v.iter().map(|&x| f64::from(x)).collect()),
            Self::Float64(v) => Some(v.clone()),
            Self::Bool(_) | Self::String(_) => None,
        }
    }

    /// Int32 columns as entity handles.
    #[must_use]
    pub fn to_handles(&self) -> Option<Vec<EntityHandle>> {
        match self {
            Self::Int32(v) => Some(v.iter().copied().map(EntityHandle).collect()),
            _ => None,
        }
    }
}

/// A caller-facing value: a plain scalar, a plain sequence, or a quantity
/// with a physical unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// A single element without a unit.
    Scalar(Scalar),
    /// A sequence of elements without a unit.
    Sequence(Column),
    /// A scalar or sequence magnitude with a unit.
    Quantity(UnitValue),
}

/// `x` if it is a whole number representable in a signed integer of `bits`.
fn whole(x: f64, bits: i32) -> Option<f64> {
    let bound = 2f64.powi(bits - 1);
    (x.fract() == 0.0 && x >= -bound && x < bound).then_some(x)
}

impl Value {
    /// Returns `None` for a scalar, or the sequence length.
    #[must_use]
    pub fn len(&self) -> Option<usize> {
        match self {
            Self::Scalar(_) => None,
            Self::Sequence(column) => Some(column.len()),
            Self::Quantity(q) => q.len(),
        }
    }

    /// Returns `true` for scalar values (with or without a unit).
    #[must_use]
    pub fn is_scalar(&self) -> bool {
        self.len().is_none()
    }

    /// A sequence of entity handles.
    #[must_use]
    pub fn handles(handles: &[EntityHandle]) -> Self {
        Self::Sequence(Column::from_handles(handles))
    }

    /// The row at `index` of a sequence, as a scalar value. Scalars return
    /// themselves for any index.
    #[must_use]
    pub fn row(&self, index: usize) -> Option<Self> {
        match self {
            Self::Scalar(_) => Some(self.clone()),
            Self::Sequence(column) => column.get(index).map(Self::Scalar),
            Self::Quantity(q) => match q.magnitude() {
                Magnitude::Scalar(_) => Some(self.clone()),
                Magnitude::Sequence(values) => values
                    .get(index)
                    .map(|&x| Self::Quantity(UnitValue::scalar(x, q.unit().clone()))),
            },
        }
    }

    /// The unit-carrying quantity, if any.
    #[must_use]
    pub fn as_quantity(&self) -> Option<&UnitValue> {
        match self {
            Self::Quantity(q) => Some(q),
            _ => None,
        }
    }

    /// The plain scalar, if any.
    #[must_use]
    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Self::Scalar(s) => Some(s),
            _ => None,
        }
    }

    /// The plain sequence, if any.
    #[must_use]
    pub fn as_column(&self) -> Option<&Column> {
        match self {
            Self::Sequence(c) => Some(c),
            _ => None,
        }
    }
}

impl From<Scalar> for Value {
    fn from(value: Scalar) -> Self {
        Self::Scalar(value)
    }
}

impl From<Column> for Value {
    fn from(value: Column) -> Self {
        Self::Sequence(value)
    }
}

impl From<UnitValue> for Value {
    fn from(value: UnitValue) -> Self {
        Self::Quantity(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Scalar(Scalar::Float64(value))
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Scalar(Scalar::Int32(value))
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Scalar(Scalar::Int64(value))
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Scalar(Scalar::Bool(value))
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Scalar(Scalar::String(value.to_string()))
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Scalar(Scalar::String(value))
    }
}

impl From<Vec<f64>> for Value {
    fn from(values: Vec<f64>) -> Self {
        Self::Sequence(Column::Float64(values))
    }
}

impl From<Vec<i32>> for Value {
    fn from(values: Vec<i32>) -> Self {
        Self::Sequence(Column::Int32(values))
    }
}

impl From<Vec<String>> for Value {
    fn from(values: Vec<String>) -> Self {
        Self::Sequence(Column::String(values))
    }
}

#[cfg(test)]
mod tests {
    use bridge_units::si;

    use super::*;

    #[test]
    fn test_scalar_widening() {
        assert_eq!(
            Scalar::Int32(3).coerce(ScalarType::Float64),
            Some(Scalar::Float64(3.0))
        );
        assert_eq!(
            Scalar::Int32(3).coerce(ScalarType::Int64),
            Some(Scalar::Int64(3))
        );
    }

    #[test]
    fn test_scalar_narrowing_checks_range() {
        assert_eq!(
            Scalar::Int64(7).coerce(ScalarType::Int32),
            Some(Scalar::Int32(7))
        );
        assert_eq!(Scalar::Int64(i64::MAX).coerce(ScalarType::Int32), None);
    }

    #[test]
    fn test_no_coercion_between_strings_and_numbers() {
        assert_eq!(Scalar::String("1".into()).coerce(ScalarType::Int32), None);
        assert_eq!(Scalar::Float64(1.0).coerce(ScalarType::Int32), None);
        assert_eq!(Scalar::Bool(true).coerce(ScalarType::Int32), None);
    }

    #[test]
    fn test_column_from_scalars_coerces() {
        let column = Column::from_scalars(
            ScalarType::Float64,
            vec![Scalar::Int32(1), Scalar::Float64(2.5)],
        )
        .unwrap();
        assert_eq!(column, Column::Float64(vec![1.0, 2.5]));
    }

    #[test]
    fn test_column_push_type_mismatch() {
        let mut column = Column::empty(ScalarType::Int32);
        assert!(column.push(Scalar::Int32(1)));
        assert!(!column.push(Scalar::Float64(1.0)));
        assert_eq!(column.len(), 1);
    }

    #[test]
    fn test_integer_column_from_f64_needs_whole_numbers() {
        assert_eq!(
            Column::from_f64(ScalarType::Int32, &[3.0, -4.0]),
            Some(Column::Int32(vec![3, -4]))
        );
        assert_eq!(Column::from_f64(ScalarType::Int32, &[2.5]), None);
        assert_eq!(Column::from_f64(ScalarType::Int64, &[f64::NAN]), None);
        assert_eq!(Column::from_f64(ScalarType::Int32, &[3.0e9]), None);
        assert_eq!(
            Column::from_f64(ScalarType::Int64, &[3.0e9]),
            Some(Column::Int64(vec![3_000_000_000]))
        );
    }

    #[test]
    fn test_column_set_bounds() {
        let mut column = Column::Float64(vec![0.0, 0.0]);
        assert!(column.set(1, Scalar::Float64(4.0)));
        assert!(!column.set(2, Scalar::Float64(4.0)));
        assert_eq!(column, Column::Float64(vec![0.0, 4.0]));
    }

    #[test]
    fn test_value_row_of_quantity() {
        let v = Value::Quantity(UnitValue::sequence(vec![1.0, 2.0], si::msun()));
        let row = v.row(1).unwrap();
        assert_eq!(
            row,
            Value::Quantity(UnitValue::scalar(2.0, si::msun()))
        );
        assert!(v.row(2).is_none());
    }

    #[test]
    fn test_value_cardinality() {
        assert!(Value::from(1.0).is_scalar());
        assert_eq!(Value::from(vec![1, 2, 3]).len(), Some(3));
        let handles = Value::handles(&[EntityHandle(1), EntityHandle(2)]);
        assert_eq!(handles, Value::Sequence(Column::Int32(vec![1, 2])));
    }
}
