//! The capability a worker exposes to its dispatcher.

use bridge_spec::{Column, Direction, RemoteFunctionSpec, Scalar};

use crate::error::KernelError;

/// One validated call, as seen by a kernel.
///
/// `inputs` holds one column per IN and INOUT parameter, in declaration
/// order, each exactly `rows` long. LENGTH columns are stripped.
#[derive(Debug)]
pub struct Invocation<'a> {
    /// The function being called.
    pub spec: &'a RemoteFunctionSpec,
    /// Number of rows in every column.
    pub rows: usize,
    /// Input columns.
    pub inputs: Vec<&'a Column>,
}

impl<'a> Invocation<'a> {
    /// Pair `columns` (all wire inputs, LENGTH included) with `spec`.
    #[must_use]
    pub fn new(spec: &'a RemoteFunctionSpec, rows: usize, columns: &'a [Column]) -> Self {
        let inputs = spec
            .wire_inputs()
            .zip(columns)
            .filter(|(param, _)| param.direction != Direction::Length)
            .map(|(_, column)| column)
            .collect();
        Self { spec, rows, inputs }
    }

    /// The input column for parameter `name`.
    #[must_use]
    pub fn input(&self, name: &str) -> Option<&'a Column> {
        self.spec
            .inputs()
            .position(|p| p.name == name)
            .and_then(|i| self.inputs.get(i).copied())
    }

    /// The value of input `index` at `row`.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::BadInput`] if either index is out of range.
    pub fn scalar(&self, index: usize, row: usize) -> Result<Scalar, KernelError> {
        self.inputs
            .get(index)
            .and_then(|column| column.get(row))
            .ok_or_else(|| KernelError::BadInput {
                function: self.spec.name().to_string(),
                parameter: format!("#{index}"),
                reason: format!("no row {row}"),
            })
    }
}

/// A kernel's answer to one [`Invocation`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Outcome {
    /// The per-row result column, for functions that declare one.
    pub result: Option<Column>,
    /// One column per OUT and INOUT parameter, in declaration order.
    pub outputs: Vec<Column>,
}

impl Outcome {
    /// An outcome carrying per-row error codes.
    #[must_use]
    pub fn with_codes(codes: Vec<i32>, outputs: Vec<Column>) -> Self {
        Self {
            result: Some(Column::Int32(codes)),
            outputs,
        }
    }
}

/// The scientific code behind a worker.
///
/// Implementations execute one call at a time; the dispatcher has already
/// checked that every column matches the declaration.
pub trait Kernel: Send {
    /// Execute `call`.
    ///
    /// # Errors
    ///
    /// Returns a [`KernelError`] if the call cannot be executed at all.
    fn invoke(&mut self, call: &Invocation<'_>) -> Result<Outcome, KernelError>;

    /// Release resources. Called once, on a stop request.
    fn stop(&mut self) {}
}
