//! Remote function declarations.
//!
//! A [`RemoteFunctionSpec`] describes one callable operation of a worker:
//! its ordered parameters (name, scalar type, direction, optional unit), how
//! it treats arrays, and what it returns. Specs are created once, when a
//! code definition is built, and never mutated afterwards.
//!
//! ## Function Identity
//!
//! [`FunctionId`] is derived from the function's **name** with FNV-1a
//! 64-bit, so a worker written in any language can compute the id of a
//! declared function without sharing a numbering scheme.

use std::fmt;

use bridge_units::Unit;
use serde::{Deserialize, Serialize};

use crate::error::SpecError;

/// A unique identifier for a remote function, derived from its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FunctionId(pub u64);

impl FunctionId {
    /// FNV-1a 64-bit offset basis.
    const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;

    /// FNV-1a 64-bit prime.
    const FNV_PRIME: u64 = 0x0100_0000_01b3;

    /// Compute the [`FunctionId`] of a function name.
    ///
    /// ```text
    /// hash = 0xcbf29ce484222325
    /// for each byte in name.as_bytes():
    ///     hash = (hash XOR byte) * 0x00000100000001b3
    /// ```
    #[must_use]
    pub const fn from_name(name: &str) -> Self {
        let bytes = name.as_bytes();
        let mut hash = Self::FNV_OFFSET_BASIS;
        let mut i = 0;
        while i < bytes.len() {
            hash ^= bytes[i] as u64;
            hash = hash.wrapping_mul(Self::FNV_PRIME);
            i += 1;
        }
        Self(hash)
    }
}

/// The element type of a parameter on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarType {
    /// 32-bit signed integer (`'i'`, `int32`).
    Int32,
    /// 64-bit signed integer.
    Int64,
    /// 32-bit float.
    Float32,
    /// 64-bit float (`'d'`, `float64`).
    Float64,
    /// Boolean.
    Bool,
    /// UTF-8 string (`'s'`).
    String,
}

impl ScalarType {
    /// Returns `true` for types that may carry a physical unit.
    #[must_use]
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            Self::Int32 | Self::Int64 | Self::Float32 | Self::Float64
        )
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
            Self::Bool => "bool",
            Self::String => "string",
        };
        f.write_str(name)
    }
}

/// Data flow direction of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Sent to the worker.
    In,
    /// Returned by the worker.
    Out,
    /// Sent and returned.
    InOut,
    /// The row count of an array call. Filled in by the marshaller, never
    /// supplied by the caller.
    Length,
}

impl Direction {
    /// Returns `true` if the caller supplies a value for this parameter.
    #[must_use]
    pub fn is_input(self) -> bool {
        matches!(self, Self::In | Self::InOut)
    }

    /// Returns `true` if the worker returns a value for this parameter.
    #[must_use]
    pub fn is_output(self) -> bool {
        matches!(self, Self::Out | Self::InOut)
    }
}

/// How a function treats array arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ArrayMode {
    /// Only scalar calls are allowed.
    #[default]
    Scalar,
    /// Either all-scalar or all-sequence arguments (`can_handle_array`).
    CanHandle,
    /// The worker always receives arrays; scalar calls are sent as one-row
    /// arrays and their outputs returned as scalars (`must_handle_array`).
    MustHandle,
}

impl ArrayMode {
    /// Returns `true` if sequence arguments are accepted.
    #[must_use]
    pub fn accepts_arrays(self) -> bool {
        !matches!(self, Self::Scalar)
    }
}

/// What a remote function returns besides its OUT parameters.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum ResultKind {
    /// Nothing.
    #[default]
    None,
    /// An int32 status per row; nonzero means failure.
    ErrorCode,
    /// A typed value, optionally with a unit.
    Value {
        /// Element type of the result.
        ty: ScalarType,
        /// Unit of the result, if any.
        unit: Option<Unit>,
    },
}

/// One declared parameter of a remote function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    /// Parameter name, unique within its function.
    pub name: String,
    /// Wire element type.
    pub ty: ScalarType,
    /// Data flow direction.
    pub direction: Direction,
    /// Physical unit of the parameter, if any.
    pub unit: Option<Unit>,
    /// Free-form description.
    pub description: Option<String>,
}

/// An immutable remote function declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteFunctionSpec {
    id: FunctionId,
    name: String,
    parameters: Vec<ParameterSpec>,
    result: ResultKind,
    array_mode: ArrayMode,
    description: Option<String>,
}

impl RemoteFunctionSpec {
    /// Start declaring a function.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> FunctionSpecBuilder {
        FunctionSpecBuilder::new(name)
    }

    /// The function id.
    #[must_use]
    pub fn id(&self) -> FunctionId {
        self.id
    }

    /// The function name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// All parameters in declaration order.
    #[must_use]
    pub fn parameters(&self) -> &[ParameterSpec] {
        &self.parameters
    }

    /// Look up a parameter by name.
    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&ParameterSpec> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Parameters the caller supplies (IN and INOUT), in order.
    pub fn inputs(&self) -> impl Iterator<Item = &ParameterSpec> {
        self.parameters.iter().filter(|p| p.direction.is_input())
    }

    /// Parameters the worker returns (OUT and INOUT), in order.
    pub fn outputs(&self) -> impl Iterator<Item = &ParameterSpec> {
        self.parameters.iter().filter(|p| p.direction.is_output())
    }

    /// Parameters sent on the wire (IN, INOUT and LENGTH), in order.
    pub fn wire_inputs(&self) -> impl Iterator<Item = &ParameterSpec> {
        self.parameters
            .iter()
            .filter(|p| p.direction.is_input() || p.direction == Direction::Length)
    }

    /// Number of caller-supplied arguments.
    #[must_use]
    pub fn input_count(&self) -> usize {
        self.inputs().count()
    }

    /// Number of returned parameters.
    #[must_use]
    pub fn output_count(&self) -> usize {
        self.outputs().count()
    }

    /// The result kind.
    #[must_use]
    pub fn result(&self) -> &ResultKind {
        &self.result
    }

    /// How the function treats arrays.
    #[must_use]
    pub fn array_mode(&self) -> ArrayMode {
        self.array_mode
    }

    /// Free-form description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

/// Builder for [`RemoteFunctionSpec`].
///
/// ```rust
/// use bridge_spec::{RemoteFunctionSpec, ScalarType};
/// use bridge_units::si;
///
/// let spec = RemoteFunctionSpec::builder("new_zams_star")
///     .can_handle_array()
///     .output("index_of_the_star", ScalarType::Int32)
///     .input_with_unit("mass", ScalarType::Float64, si::msun())
///     .returns_error_code()
///     .build()
///     .unwrap();
/// assert_eq!(spec.input_count(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct FunctionSpecBuilder {
    name: String,
    parameters: Vec<ParameterSpec>,
    result: ResultKind,
    array_mode: ArrayMode,
    description: Option<String>,
}

impl FunctionSpecBuilder {
    /// Start a declaration with no parameters and no result.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: Vec::new(),
            result: ResultKind::None,
            array_mode: ArrayMode::Scalar,
            description: None,
        }
    }

    fn parameter(
        mut self,
        name: impl Into<String>,
        ty: ScalarType,
        direction: Direction,
        unit: Option<Unit>,
    ) -> Self {
        self.parameters.push(ParameterSpec {
            name: name.into(),
            ty,
            direction,
            unit,
            description: None,
        });
        self
    }

    /// Add an IN parameter.
    #[must_use]
    pub fn input(self, name: impl Into<String>, ty: ScalarType) -> Self {
        self.parameter(name, ty, Direction::In, None)
    }

    /// Add an IN parameter with a unit.
    #[must_use]
    pub fn input_with_unit(self, name: impl Into<String>, ty: ScalarType, unit: Unit) -> Self {
        self.parameter(name, ty, Direction::In, Some(unit))
    }

    /// Add an OUT parameter.
    #[must_use]
    pub fn output(self, name: impl Into<String>, ty: ScalarType) -> Self {
        self.parameter(name, ty, Direction::Out, None)
    }

    /// Add an OUT parameter with a unit.
    #[must_use]
    pub fn output_with_unit(self, name: impl Into<String>, ty: ScalarType, unit: Unit) -> Self {
        self.parameter(name, ty, Direction::Out, Some(unit))
    }

    /// Add an INOUT parameter, optionally with a unit.
    #[must_use]
    pub fn inout(self, name: impl Into<String>, ty: ScalarType, unit: Option<Unit>) -> Self {
        self.parameter(name, ty, Direction::InOut, unit)
    }

    /// Add the LENGTH parameter carrying the row count of an array call.
    #[must_use]
    pub fn length(self, name: impl Into<String>) -> Self {
        self.parameter(name, ScalarType::Int32, Direction::Length, None)
    }

    /// Attach a description to the most recently added parameter.
    #[must_use]
    pub fn describe(mut self, text: impl Into<String>) -> Self {
        if let Some(last) = self.parameters.last_mut() {
            last.description = Some(text.into());
        }
        self
    }

    /// Describe the function itself.
    #[must_use]
    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    /// Accept all-scalar or all-sequence arguments.
    #[must_use]
    pub fn can_handle_array(mut self) -> Self {
        self.array_mode = ArrayMode::CanHandle;
        self
    }

    /// Always send arrays to the worker.
    #[must_use]
    pub fn must_handle_array(mut self) -> Self {
        self.array_mode = ArrayMode::MustHandle;
        self
    }

    /// Return an int32 error code per row.
    #[must_use]
    pub fn returns_error_code(mut self) -> Self {
        self.result = ResultKind::ErrorCode;
        self
    }

    /// Return a typed value.
    #[must_use]
    pub fn returns(mut self, ty: ScalarType) -> Self {
        self.result = ResultKind::Value { ty, unit: None };
        self
    }

    /// Return a typed value with a unit.
    #[must_use]
    pub fn returns_with_unit(mut self, ty: ScalarType, unit: Unit) -> Self {
        self.result = ResultKind::Value {
            ty,
            unit: Some(unit),
        };
        self
    }

    /// Validate and freeze the declaration.
    ///
    /// # Errors
    ///
    /// - [`SpecError::DuplicateParameter`] if two parameters share a name.
    /// - [`SpecError::UnitOnNonNumeric`] if a bool or string parameter (or
    ///   result) carries a unit.
    /// - [`SpecError::InvalidLengthParameter`] if a LENGTH parameter is
    ///   declared on a scalar-only function, or declared twice.
    pub fn build(self) -> Result<RemoteFunctionSpec, SpecError> {
        let mut length_seen = false;
        for (i, p) in self.parameters.iter().enumerate() {
            if self.parameters[..i].iter().any(|q| q.name == p.name) {
                return Err(SpecError::DuplicateParameter {
                    function: self.name.clone(),
                    parameter: p.name.clone(),
                });
            }
            if p.unit.is_some() && !p.ty.is_numeric() {
                return Err(SpecError::UnitOnNonNumeric {
                    function: self.name.clone(),
                    parameter: p.name.clone(),
                    ty: p.ty.to_string(),
                });
            }
            if p.direction == Direction::Length {
                if length_seen || !self.array_mode.accepts_arrays() {
                    return Err(SpecError::InvalidLengthParameter {
                        function: self.name.clone(),
                        parameter: p.name.clone(),
                    });
                }
                length_seen = true;
            }
        }
        if let ResultKind::Value { ty, unit: Some(_) } = &self.result
            && !ty.is_numeric()
        {
            return Err(SpecError::UnitOnNonNumeric {
                function: self.name.clone(),
                parameter: "__result__".to_string(),
                ty: ty.to_string(),
            });
        }

        Ok(RemoteFunctionSpec {
            id: FunctionId::from_name(&self.name),
            name: self.name,
            parameters: self.parameters,
            result: self.result,
            array_mode: self.array_mode,
            description: self.description,
        })
    }
}
