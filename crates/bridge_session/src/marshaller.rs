//! Function call marshaller.
//!
//! Packs caller arguments into a [`CallFrame`], sends it through a
//! [`Transport`], and unpacks the [`ResultFrame`] into typed, unit-tagged
//! outputs. Every check that can be made locally is made before the frame
//! leaves the process.

use std::sync::Arc;

use bridge_net::values::{self, Cardinality};
use bridge_net::{CallFrame, NetError, Reply, Request, ResultFrame, Transport};
use bridge_spec::{
    ArrayMode, Column, Direction, FunctionTable, RemoteFunctionSpec, ResultKind, Value,
};
use tracing::{debug, warn};

use crate::error::SessionError;

/// The decoded outcome of one remote call.
#[derive(Debug, Clone, PartialEq)]
pub struct CallOutput {
    function: String,
    cardinality: Cardinality,
    names: Vec<String>,
    values: Vec<Value>,
    result: Option<Value>,
    error_codes: Vec<i32>,
}

impl CallOutput {
    /// The function that produced this output.
    #[must_use]
    pub fn function(&self) -> &str {
        &self.function
    }

    /// Returns `true` if the call was made with scalar arguments.
    #[must_use]
    pub fn is_scalar(&self) -> bool {
        self.cardinality == Cardinality::Scalar
    }

    /// The shape the outputs were returned in.
    #[must_use]
    pub fn cardinality(&self) -> Cardinality {
        self.cardinality
    }

    /// Output value by parameter name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| &self.values[i])
    }

    /// Output value by position among the OUT/INOUT parameters.
    #[must_use]
    pub fn output(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// All outputs, in declaration order.
    #[must_use]
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// The typed result, for functions that return a value.
    #[must_use]
    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    /// Per-row error codes, for functions that return them. Empty otherwise.
    #[must_use]
    pub fn error_codes(&self) -> &[i32] {
        &self.error_codes
    }

    /// The first failing row and its code.
    #[must_use]
    pub fn first_error(&self) -> Option<(usize, i32)> {
        self.error_codes
            .iter()
            .enumerate()
            .find(|&(_, &code)| code != 0)
            .map(|(row, &code)| (row, code))
    }
}

/// Sends typed calls to one worker.
pub struct Marshaller {
    table: Arc<FunctionTable>,
    transport: Box<dyn Transport>,
    next_call_id: u64,
    poisoned: bool,
}

impl std::fmt::Debug for Marshaller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Marshaller")
            .field("functions", &self.table.len())
            .field("next_call_id", &self.next_call_id)
            .field("poisoned", &self.poisoned)
            .finish_non_exhaustive()
    }
}

impl Marshaller {
    /// Create a marshaller for the functions in `table` over `transport`.
    #[must_use]
    pub fn new(table: Arc<FunctionTable>, transport: Box<dyn Transport>) -> Self {
        Self {
            table,
            transport,
            next_call_id: 1,
            poisoned: false,
        }
    }

    /// The function table calls are checked against.
    #[must_use]
    pub fn table(&self) -> &Arc<FunctionTable> {
        &self.table
    }

    /// Returns `true` once the transport has failed or been closed.
    #[must_use]
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Call `function` with positional IN/INOUT arguments.
    ///
    /// Arguments must be all scalars or all sequences of one length; the
    /// outputs come back in the same shape. A nonzero error code fails the
    /// call.
    ///
    /// # Errors
    ///
    /// - [`SessionError::UnknownFunction`] if `function` is not declared.
    /// - [`SessionError::ArityMismatch`] on argument count or shape errors.
    /// - [`SessionError::RemoteError`] on a nonzero error code.
    /// - [`SessionError::WorkerUnresponsive`] if the transport fails.
    pub fn call(&mut self, function: &str, args: &[Value]) -> Result<CallOutput, SessionError> {
        let output = self.call_unchecked(function, args)?;
        if let Some((row, code)) = output.first_error() {
            return Err(SessionError::RemoteError {
                function: function.to_string(),
                code,
                row,
            });
        }
        Ok(output)
    }

    /// Like [`Marshaller::call`], but nonzero error codes are returned in
    /// the output instead of failing the call.
    ///
    /// # Errors
    ///
    /// Same as [`Marshaller::call`], except [`SessionError::RemoteError`].
    pub fn call_unchecked(
        &mut self,
        function: &str,
        args: &[Value],
    ) -> Result<CallOutput, SessionError> {
        if self.poisoned {
            return Err(SessionError::WorkerUnresponsive(NetError::Closed));
        }
        let spec = Arc::clone(self.table.require(function)?);
        let cardinality = cardinality_of(&spec, args)?;
        let frame = self.pack(&spec, args, cardinality)?;
        let call_id = frame.call_id;
        debug!(
            function,
            call_id,
            rows = frame.count,
            "sending call"
        );

        match self.exchange(&Request::Call(frame))? {
            Reply::Result(result) => unpack(&spec, call_id, cardinality, result),
            Reply::Failed { call_id: id, message } if id == call_id => {
                Err(SessionError::WorkerFailed {
                    function: function.to_string(),
                    message,
                })
            }
            other => Err(SessionError::Protocol(format!(
                "unexpected reply to call {call_id} of '{function}': {other:?}"
            ))),
        }
    }

    /// Ask the worker to stop and close the transport.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::WorkerUnresponsive`] if the worker cannot be
    /// reached; the transport is closed either way.
    pub fn stop(&mut self) -> Result<(), SessionError> {
        if self.poisoned {
            return Ok(());
        }
        let reply = self.exchange(&Request::Stop);
        self.transport.close();
        self.poisoned = true;
        match reply? {
            Reply::Stopped => Ok(()),
            other => Err(SessionError::Protocol(format!(
                "unexpected reply to stop: {other:?}"
            ))),
        }
    }

    fn pack(
        &mut self,
        spec: &RemoteFunctionSpec,
        args: &[Value],
        cardinality: Cardinality,
    ) -> Result<CallFrame, SessionError> {
        let rows = cardinality.rows();
        let mut args = args.iter();
        let mut columns = Vec::with_capacity(spec.parameters().len());
        for param in spec.wire_inputs() {
            if param.direction == Direction::Length {
                let n = i32::try_from(rows).map_err(|_| {
                    SessionError::ArityMismatch(format!("{rows} rows exceed the int32 range"))
                })?;
                columns.push(Column::Int32(vec![n]));
                continue;
            }
            let Some(arg) = args.next() else {
                return Err(SessionError::ArityMismatch(format!(
                    "'{}' is missing argument '{}'",
                    spec.name(),
                    param.name
                )));
            };
            columns.push(values::encode(arg, param, cardinality)?);
        }

        let call_id = self.next_call_id;
        self.next_call_id += 1;
        Ok(CallFrame {
            call_id,
            function_id: spec.id(),
            function: spec.name().to_string(),
            count: rows,
            columns,
        })
    }

    fn exchange(&mut self, request: &Request) -> Result<Reply, SessionError> {
        let bytes = bridge_net::encode(request).map_err(|e| SessionError::Protocol(e.to_string()))?;
        let reply = match self.transport.send(&bytes) {
            Ok(reply) => reply,
            Err(e) if e.is_unresponsive() => {
                warn!(error = %e, "worker unresponsive");
                self.poisoned = true;
                self.transport.close();
                return Err(SessionError::WorkerUnresponsive(e));
            }
            Err(e) => return Err(SessionError::Protocol(e.to_string())),
        };
        bridge_net::decode(&reply).map_err(|e| SessionError::Protocol(e.to_string()))
    }
}

/// Determine the shape of a call and check it against the declaration.
fn cardinality_of(spec: &RemoteFunctionSpec, args: &[Value]) -> Result<Cardinality, SessionError> {
    if args.len() != spec.input_count() {
        return Err(SessionError::ArityMismatch(format!(
            "'{}' takes {} arguments, got {}",
            spec.name(),
            spec.input_count(),
            args.len()
        )));
    }

    let mut shape: Option<(Cardinality, &str)> = None;
    for (param, arg) in spec.inputs().zip(args) {
        let this = Cardinality::of(arg);
        match shape {
            None => shape = Some((this, param.name.as_str())),
            Some((first, first_name)) if first != this => {
                return Err(SessionError::ArityMismatch(format!(
                    "'{}': '{}' is {this} but '{first_name}' is {first}",
                    spec.name(),
                    param.name
                )));
            }
            Some(_) => {}
        }
    }

    let shape = shape.map_or(Cardinality::Scalar, |(c, _)| c);
    if matches!(shape, Cardinality::Rows(_)) && spec.array_mode() == ArrayMode::Scalar {
        return Err(SessionError::ArityMismatch(format!(
            "'{}' does not accept sequences",
            spec.name()
        )));
    }
    Ok(shape)
}

fn unpack(
    spec: &RemoteFunctionSpec,
    call_id: u64,
    cardinality: Cardinality,
    frame: ResultFrame,
) -> Result<CallOutput, SessionError> {
    let rows = cardinality.rows();
    if frame.call_id != call_id || frame.count != rows {
        return Err(SessionError::Protocol(format!(
            "reply ({}, {} rows) does not match call ({call_id}, {rows} rows)",
            frame.call_id, frame.count
        )));
    }
    if frame.outputs.len() != spec.output_count() {
        return Err(SessionError::Protocol(format!(
            "'{}' returned {} outputs, expected {}",
            spec.name(),
            frame.outputs.len(),
            spec.output_count()
        )));
    }

    let mut error_codes = Vec::new();
    let mut result = None;
    match (spec.result(), frame.result) {
        (ResultKind::None, _) => {}
        (ResultKind::ErrorCode, Some(Column::Int32(codes))) if codes.len() == rows => {
            error_codes = codes;
        }
        (ResultKind::Value { ty, unit }, Some(column)) => {
            result = Some(values::decode_typed(
                column,
                spec.name(),
                *ty,
                unit.as_ref(),
                cardinality,
            )?);
        }
        (kind, column) => {
            return Err(SessionError::Protocol(format!(
                "'{}' declares {kind:?} but returned {column:?}",
                spec.name()
            )));
        }
    }

    let mut names = Vec::with_capacity(frame.outputs.len());
    let mut decoded = Vec::with_capacity(frame.outputs.len());
    for (param, column) in spec.outputs().zip(frame.outputs) {
        decoded.push(values::decode(column, param, cardinality)?);
        names.push(param.name.clone());
    }

    Ok(CallOutput {
        function: spec.name().to_string(),
        cardinality,
        names,
        values: decoded,
        result,
        error_codes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_spec::{Scalar, ScalarType};
    use bridge_units::{UnitValue, si};

    /// Answers every call through a closure.
    struct Scripted<F>(F);

    impl<F> Transport for Scripted<F>
    where
        F: FnMut(CallFrame) -> Reply + Send,
    {
        fn send(&mut self, frame: &[u8]) -> Result<Vec<u8>, NetError> {
            let reply = match bridge_net::decode::<Request>(frame)? {
                Request::Call(call) => (self.0)(call),
                Request::Stop => Reply::Stopped,
            };
            bridge_net::encode(&reply)
        }
    }

    struct Dead;

    impl Transport for Dead {
        fn send(&mut self, _frame: &[u8]) -> Result<Vec<u8>, NetError> {
            Err(NetError::Closed)
        }
    }

    fn table() -> Arc<FunctionTable> {
        let mut table = FunctionTable::new();
        table
            .register_all([
                RemoteFunctionSpec::builder("get_mass")
                    .can_handle_array()
                    .input("index_of_the_star", ScalarType::Int32)
                    .output_with_unit("mass", ScalarType::Float64, si::msun())
                    .returns_error_code()
                    .build()
                    .unwrap(),
                RemoteFunctionSpec::builder("get_time")
                    .output_with_unit("time", ScalarType::Float64, si::yr())
                    .returns_error_code()
                    .build()
                    .unwrap(),
                RemoteFunctionSpec::builder("get_potential")
                    .must_handle_array()
                    .input("i", ScalarType::Int32)
                    .output("potential", ScalarType::Float64)
                    .length("number_of_points")
                    .returns_error_code()
                    .build()
                    .unwrap(),
                RemoteFunctionSpec::builder("par_geti")
                    .input("block", ScalarType::String)
                    .input("name", ScalarType::String)
                    .returns(ScalarType::Int32)
                    .build()
                    .unwrap(),
            ])
            .unwrap();
        Arc::new(table)
    }

    fn echo_masses(call: CallFrame) -> Reply {
        let Column::Int32(ids) = &call.columns[0] else {
            return Reply::Failed {
                call_id: call.call_id,
                message: "bad column".into(),
            };
        };
        Reply::Result(ResultFrame {
            call_id: call.call_id,
            count: call.count,
            result: Some(Column::Int32(
                ids.iter().map(|&id| if id > 0 { 0 } else { -1 }).collect(),
            )),
            outputs: vec![Column::Float64(ids.iter().map(|&id| f64::from(id)).collect())],
        })
    }

    #[test]
    fn test_scalar_call_returns_scalar() {
        let mut m = Marshaller::new(table(), Box::new(Scripted(echo_masses)));
        let out = m.call("get_mass", &[Value::from(2)]).unwrap();
        assert!(out.is_scalar());
        let mass = out.get("mass").unwrap().as_quantity().unwrap();
        assert_eq!(mass.as_scalar(), Some(2.0));
        assert_eq!(mass.unit(), &si::msun());
    }

    #[test]
    fn test_sequence_call_preserves_order() {
        let mut m = Marshaller::new(table(), Box::new(Scripted(echo_masses)));
        let out = m.call("get_mass", &[Value::from(vec![3, 1, 2])]).unwrap();
        let mass = out.get("mass").unwrap().as_quantity().unwrap();
        assert_eq!(mass.magnitude().to_vec(), vec![3.0, 1.0, 2.0]);
    }

    #[test]
    fn test_nonzero_code_surfaces() {
        let mut m = Marshaller::new(table(), Box::new(Scripted(echo_masses)));
        let err = m.call("get_mass", &[Value::from(vec![1, -4])]).unwrap_err();
        assert!(matches!(
            err,
            SessionError::RemoteError { code: -1, row: 1, .. }
        ));

        let out = m
            .call_unchecked("get_mass", &[Value::from(vec![1, -4])])
            .unwrap();
        assert_eq!(out.error_codes(), &[0, -1]);
    }

    #[test]
    fn test_argument_count_checked_locally() {
        let mut m = Marshaller::new(
            table(),
            Box::new(Scripted(|_: CallFrame| -> Reply { panic!("must not be sent") })),
        );
        assert!(matches!(
            m.call("get_mass", &[]),
            Err(SessionError::ArityMismatch(_))
        ));
        assert!(matches!(
            m.call("get_time", &[Value::from(1)]),
            Err(SessionError::ArityMismatch(_))
        ));
    }

    #[test]
    fn test_sequence_to_scalar_function_rejected() {
        let mut m = Marshaller::new(
            table(),
            Box::new(Scripted(|_: CallFrame| -> Reply { panic!("must not be sent") })),
        );
        let err = m
            .call(
                "par_geti",
                &[Value::from(vec!["grid".to_string()]), Value::from(vec!["Nx1".to_string()])],
            )
            .unwrap_err();
        assert!(matches!(err, SessionError::ArityMismatch(_)));
    }

    #[test]
    fn test_must_handle_promotes_scalar_and_fills_length() {
        let mut m = Marshaller::new(
            table(),
            Box::new(Scripted(|call: CallFrame| {
                assert_eq!(call.count, 1);
                assert_eq!(call.columns[1], Column::Int32(vec![1]));
                Reply::Result(ResultFrame {
                    call_id: call.call_id,
                    count: 1,
                    result: Some(Column::Int32(vec![0])),
                    outputs: vec![Column::Float64(vec![-0.5])],
                })
            })),
        );
        let out = m.call("get_potential", &[Value::from(4)]).unwrap();
        assert_eq!(
            out.get("potential"),
            Some(&Value::Scalar(Scalar::Float64(-0.5)))
        );
    }

    #[test]
    fn test_typed_result() {
        let mut m = Marshaller::new(
            table(),
            Box::new(Scripted(|call: CallFrame| {
                Reply::Result(ResultFrame {
                    call_id: call.call_id,
                    count: 1,
                    result: Some(Column::Int32(vec![64])),
                    outputs: vec![],
                })
            })),
        );
        let out = m
            .call("par_geti", &[Value::from("grid"), Value::from("Nx1")])
            .unwrap();
        assert_eq!(out.result(), Some(&Value::Scalar(Scalar::Int32(64))));
    }

    #[test]
    fn test_unit_converted_before_sending() {
        let mut table = FunctionTable::new();
        table
            .register(
                RemoteFunctionSpec::builder("evolve_model")
                    .input_with_unit("time_end", ScalarType::Float64, si::yr())
                    .returns_error_code()
                    .build()
                    .unwrap(),
            )
            .unwrap();
        let mut m = Marshaller::new(
            Arc::new(table),
            Box::new(Scripted(|call: CallFrame| {
                let Column::Float64(t) = &call.columns[0] else {
                    panic!("expected float64");
                };
                assert!((t[0] - 2.0).abs() < 1e-9);
                Reply::Result(ResultFrame {
                    call_id: call.call_id,
                    count: 1,
                    result: Some(Column::Int32(vec![0])),
                    outputs: vec![],
                })
            })),
        );
        let two_years = UnitValue::scalar(2.0 * 365.242_199, si::day());
        m.call("evolve_model", &[Value::from(two_years)]).unwrap();
    }

    #[test]
    fn test_dead_transport_poisons() {
        let mut m = Marshaller::new(table(), Box::new(Dead));
        let err = m.call("get_time", &[]).unwrap_err();
        assert!(err.is_fatal());
        assert!(m.is_poisoned());
        assert!(matches!(
            m.call("get_time", &[]),
            Err(SessionError::WorkerUnresponsive(NetError::Closed))
        ));
    }

    #[test]
    fn test_stop_closes() {
        let mut m = Marshaller::new(table(), Box::new(Scripted(echo_masses)));
        m.stop().unwrap();
        assert!(m.is_poisoned());
    }
}
