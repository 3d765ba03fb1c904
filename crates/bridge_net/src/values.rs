//! Unit-tagged value codec.
//!
//! Maps caller [`Value`]s onto wire [`Column`]s for one declared parameter,
//! converting quantities into the parameter's declared unit, and attaches
//! the declared unit to columns coming back. Units never cross the wire.

use bridge_spec::{Column, ParameterSpec, Scalar, ScalarType, Value};
use bridge_units::{Magnitude, Unit, UnitValue};

use crate::error::CodecError;

/// Shape of a call: all-scalar, or sequences of a common length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    /// Every argument is a scalar; the wire carries one row.
    Scalar,
    /// Every argument is a sequence of this length.
    Rows(usize),
}

impl Cardinality {
    /// Number of wire rows.
    #[must_use]
    pub fn rows(self) -> usize {
        match self {
            Self::Scalar => 1,
            Self::Rows(n) => n,
        }
    }

    /// Infer the cardinality of a single value.
    #[must_use]
    pub fn of(value: &Value) -> Self {
        value.len().map_or(Self::Scalar, Self::Rows)
    }
}

impl std::fmt::Display for Cardinality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Scalar => f.write_str("a scalar"),
            Self::Rows(n) => write!(f, "a sequence of length {n}"),
        }
    }
}

/// Encode one argument for `param`.
///
/// # Errors
///
/// - [`CodecError::ArityMismatch`] if the value's shape disagrees with
///   `cardinality`.
/// - [`CodecError::MissingUnit`] / [`CodecError::UnexpectedUnit`] /
///   [`CodecError::Unit`] on unit disagreements.
/// - [`CodecError::TypeMismatch`] if elements cannot be converted to the
///   declared type.
pub fn encode(
    value: &Value,
    param: &ParameterSpec,
    cardinality: Cardinality,
) -> Result<Column, CodecError> {
    let found = Cardinality::of(value);
    if found != cardinality {
        return Err(CodecError::ArityMismatch {
            parameter: param.name.clone(),
            expected: cardinality.to_string(),
            found: found.to_string(),
        });
    }

    match (value, &param.unit) {
        (Value::Quantity(q), Some(unit)) => {
            let magnitude = q.value_in(unit).map_err(|source| CodecError::Unit {
                parameter: param.name.clone(),
                source,
            })?;
            numeric_column(param, &magnitude.to_vec())
        }
        (Value::Quantity(q), None) => {
            if !q.unit().is_none() {
                return Err(CodecError::UnexpectedUnit {
                    parameter: param.name.clone(),
                    unit: q.unit().symbol().to_string(),
                });
            }
            let magnitude = q
                .value_in(&Unit::none())
                .map_err(|source| CodecError::Unit {
                    parameter: param.name.clone(),
                    source,
                })?;
            numeric_column(param, &magnitude.to_vec())
        }
        (Value::Scalar(_) | Value::Sequence(_), Some(unit)) if !unit.is_none() => {
            Err(CodecError::MissingUnit {
                parameter: param.name.clone(),
                unit: unit.symbol().to_string(),
            })
        }
        (Value::Scalar(s), _) => {
            let coerced = coerce(param, s)?;
            Ok(Column::repeat(&coerced, 1))
        }
        (Value::Sequence(column), _) => {
            if column.scalar_type() == param.ty {
                return Ok(column.clone());
            }
            let mut out = Column::empty(param.ty);
            for s in column.to_scalars() {
                out.push(coerce(param, &s)?);
            }
            Ok(out)
        }
    }
}

/// Decode one returned column for `param`, attaching its declared unit.
///
/// # Errors
///
/// Returns [`CodecError::ArityMismatch`] if the column length disagrees
/// with `cardinality`, or [`CodecError::TypeMismatch`] if the column type
/// differs from the declared one.
pub fn decode(
    column: Column,
    param: &ParameterSpec,
    cardinality: Cardinality,
) -> Result<Value, CodecError> {
    decode_typed(column, &param.name, param.ty, param.unit.as_ref(), cardinality)
}

/// Decode a column against an explicit name, type and unit. Used for
/// function results, which are not parameters.
///
/// # Errors
///
/// Same as [`decode`].
pub fn decode_typed(
    column: Column,
    name: &str,
    ty: ScalarType,
    unit: Option<&Unit>,
    cardinality: Cardinality,
) -> Result<Value, CodecError> {
    if column.len() != cardinality.rows() {
        return Err(CodecError::ArityMismatch {
            parameter: name.to_string(),
            expected: cardinality.to_string(),
            found: format!("{} rows", column.len()),
        });
    }
    if column.scalar_type() != ty {
        return Err(CodecError::TypeMismatch {
            parameter: name.to_string(),
            expected: ty,
            found: column.scalar_type(),
        });
    }

    match unit {
        Some(unit) => {
            let values = column.to_f64().ok_or_else(|| CodecError::TypeMismatch {
                parameter: name.to_string(),
                expected: ScalarType::Float64,
                found: ty,
            })?;
            let magnitude = match cardinality {
                Cardinality::Scalar => Magnitude::Scalar(values[0]),
                Cardinality::Rows(_) => Magnitude::Sequence(values),
            };
            Ok(Value::Quantity(UnitValue::new(magnitude, unit.clone())))
        }
        None => match cardinality {
            Cardinality::Scalar => column.get(0).map(Value::Scalar).ok_or_else(|| {
                CodecError::ArityMismatch {
                    parameter: name.to_string(),
                    expected: cardinality.to_string(),
                    found: "an empty column".to_string(),
                }
            }),
            Cardinality::Rows(_) => Ok(Value::Sequence(column)),
        },
    }
}

fn numeric_column(param: &ParameterSpec, values: &[f64]) -> Result<Column, CodecError> {
    Column::from_f64(param.ty, values).ok_or_else(|| CodecError::TypeMismatch {
        parameter: param.name.clone(),
        expected: param.ty,
        found: ScalarType::Float64,
    })
}

fn coerce(param: &ParameterSpec, value: &Scalar) -> Result<Scalar, CodecError> {
    value.coerce(param.ty).ok_or_else(|| CodecError::TypeMismatch {
        parameter: param.name.clone(),
        expected: param.ty,
        found: value.scalar_type(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_spec::{Direction, RemoteFunctionSpec};
    use bridge_units::{UnitError, generic, si};

    fn param(name: &str, ty: ScalarType, unit: Option<Unit>) -> ParameterSpec {
        ParameterSpec {
            name: name.to_string(),
            ty,
            direction: Direction::In,
            unit,
            description: None,
        }
    }

    #[test]
    fn test_quantity_converted_to_declared_unit() {
        let mass = param("mass", ScalarType::Float64, Some(si::msun()));
        let value = Value::Quantity(UnitValue::sequence(
            vec![si::msun().factor(), 2.0 * si::msun().factor()],
            si::kg(),
        ));
        let column = encode(&value, &mass, Cardinality::Rows(2)).unwrap();
        let Column::Float64(values) = column else {
            panic!("expected float64 column");
        };
        assert!((values[0] - 1.0).abs() < 1e-12);
        assert!((values[1] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_bare_number_for_unit_parameter_rejected() {
        let mass = param("mass", ScalarType::Float64, Some(si::msun()));
        let err = encode(&Value::from(1.0), &mass, Cardinality::Scalar).unwrap_err();
        assert!(matches!(err, CodecError::MissingUnit { .. }));
    }

    #[test]
    fn test_incompatible_unit_rejected() {
        let mass = param("mass", ScalarType::Float64, Some(generic::mass()));
        let value = Value::Quantity(UnitValue::scalar(1.0, si::kg()));
        let err = encode(&value, &mass, Cardinality::Scalar).unwrap_err();
        assert!(matches!(
            err,
            CodecError::Unit {
                source: UnitError::Incompatible { .. },
                ..
            }
        ));
    }

    #[test]
    fn test_quantity_for_unitless_parameter_rejected() {
        let index = param("index", ScalarType::Int32, None);
        let value = Value::Quantity(UnitValue::scalar(1.0, si::m()));
        let err = encode(&value, &index, Cardinality::Scalar).unwrap_err();
        assert!(matches!(err, CodecError::UnexpectedUnit { .. }));
    }

    #[test]
    fn test_length_mismatch_is_arity_error() {
        let x = param("x", ScalarType::Float64, None);
        let err = encode(&Value::from(vec![1.0, 2.0]), &x, Cardinality::Rows(3)).unwrap_err();
        assert!(matches!(err, CodecError::ArityMismatch { .. }));
    }

    #[test]
    fn test_scalar_in_sequence_call_rejected() {
        let x = param("x", ScalarType::Float64, None);
        let err = encode(&Value::from(1.0), &x, Cardinality::Rows(1)).unwrap_err();
        assert!(matches!(err, CodecError::ArityMismatch { .. }));
    }

    #[test]
    fn test_int_widened_to_float() {
        let x = param("x", ScalarType::Float64, None);
        let column = encode(&Value::from(vec![1, 2]), &x, Cardinality::Rows(2)).unwrap();
        assert_eq!(column, Column::Float64(vec![1.0, 2.0]));
    }

    #[test]
    fn test_fractional_quantity_for_int_parameter_rejected() {
        let days = param("days", ScalarType::Int32, Some(si::day()));
        let whole = Value::Quantity(UnitValue::scalar(172_800.0, si::s()));
        assert_eq!(
            encode(&whole, &days, Cardinality::Scalar).unwrap(),
            Column::Int32(vec![2])
        );

        let partial = Value::Quantity(UnitValue::scalar(129_600.0, si::s()));
        let err = encode(&partial, &days, Cardinality::Scalar).unwrap_err();
        assert!(matches!(
            err,
            CodecError::TypeMismatch { expected: ScalarType::Int32, found: ScalarType::Float64, .. }
        ));
    }

    #[test]
    fn test_decode_attaches_declared_unit() {
        let spec = RemoteFunctionSpec::builder("get_mass")
            .input("index_of_the_particle", ScalarType::Int32)
            .output_with_unit("mass", ScalarType::Float64, generic::mass())
            .returns_error_code()
            .build()
            .unwrap();
        let mass = spec.parameter("mass").unwrap();
        let value = decode(Column::Float64(vec![0.5]), mass, Cardinality::Scalar).unwrap();
        let q = value.as_quantity().unwrap();
        assert_eq!(q.as_scalar(), Some(0.5));
        assert_eq!(q.unit(), &generic::mass());
    }

    #[test]
    fn test_decode_without_unit_stays_plain() {
        let name = param("name", ScalarType::String, None);
        let value = decode(
            Column::String(vec!["a".into(), "b".into()]),
            &name,
            Cardinality::Rows(2),
        )
        .unwrap();
        assert_eq!(value.as_column().map(Column::len), Some(2));
    }

    #[test]
    fn test_decode_wrong_row_count() {
        let x = param("x", ScalarType::Float64, None);
        let err = decode(Column::Float64(vec![1.0]), &x, Cardinality::Rows(2)).unwrap_err();
        assert!(matches!(err, CodecError::ArityMismatch { .. }));
    }
}
