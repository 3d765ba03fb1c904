//! Frame validation and dispatch to a [`Kernel`].

use std::sync::Arc;

use bridge_net::{CallFrame, NetError, Reply, Request, ResultFrame};
use bridge_spec::{
    ArrayMode, Column, Direction, FunctionTable, RemoteFunctionSpec, ResultKind, ScalarType,
};
use tracing::{debug, info, warn};

use crate::kernel::{Invocation, Kernel};

/// Checks incoming frames against the function table, runs them on a
/// kernel and checks what comes back.
#[derive(Debug)]
pub struct Dispatcher<K> {
    table: Arc<FunctionTable>,
    kernel: K,
    stopped: bool,
}

impl<K: Kernel> Dispatcher<K> {
    /// Create a dispatcher over `table`.
    #[must_use]
    pub fn new(table: Arc<FunctionTable>, kernel: K) -> Self {
        Self {
            table,
            kernel,
            stopped: false,
        }
    }

    /// The function table.
    #[must_use]
    pub fn table(&self) -> &Arc<FunctionTable> {
        &self.table
    }

    /// Returns `true` once a stop request has been handled.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Decode one request, handle it and encode the reply.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::Decode`] or [`NetError::Encode`] on malformed
    /// frames.
    pub fn handle(&mut self, frame: &[u8]) -> Result<Vec<u8>, NetError> {
        let request: Request = bridge_net::decode(frame)?;
        bridge_net::encode(&self.dispatch(request))
    }

    /// Handle one request.
    pub fn dispatch(&mut self, request: Request) -> Reply {
        match request {
            Request::Call(frame) => self.call(frame),
            Request::Stop => {
                if !self.stopped {
                    info!("worker stopping");
                    self.kernel.stop();
                    self.stopped = true;
                }
                Reply::Stopped
            }
        }
    }

    fn call(&mut self, frame: CallFrame) -> Reply {
        let call_id = frame.call_id;
        match self.execute(&frame) {
            Ok(result) => Reply::Result(result),
            Err(message) => {
                warn!(function = %frame.function, call_id, %message, "call failed");
                Reply::Failed { call_id, message }
            }
        }
    }

    fn execute(&mut self, frame: &CallFrame) -> Result<ResultFrame, String> {
        if self.stopped {
            return Err("worker has stopped".to_string());
        }
        let spec = self
            .table
            .get_by_id(frame.function_id)
            .ok_or_else(|| format!("unknown function '{}'", frame.function))?;
        if spec.name() != frame.function {
            return Err(format!(
                "function id of '{}' resolves to '{}'",
                frame.function,
                spec.name()
            ));
        }
        check_inputs(spec, frame)?;

        debug!(function = spec.name(), call_id = frame.call_id, rows = frame.count, "dispatching");
        let call = Invocation::new(spec, frame.count, &frame.columns);
        let outcome = self.kernel.invoke(&call).map_err(|e| e.to_string())?;
        check_outputs(spec, frame.count, outcome.result.as_ref(), &outcome.outputs)?;

        Ok(ResultFrame {
            call_id: frame.call_id,
            count: frame.count,
            result: outcome.result,
            outputs: outcome.outputs,
        })
    }
}

fn check_inputs(spec: &RemoteFunctionSpec, frame: &CallFrame) -> Result<(), String> {
    if spec.array_mode() == ArrayMode::Scalar && frame.count != 1 {
        return Err(format!(
            "'{}' takes one row per call, got {}",
            spec.name(),
            frame.count
        ));
    }
    let expected = spec.wire_inputs().count();
    if frame.columns.len() != expected {
        return Err(format!(
            "'{}' expects {expected} input columns, got {}",
            spec.name(),
            frame.columns.len()
        ));
    }
    for (param, column) in spec.wire_inputs().zip(&frame.columns) {
        if param.direction == Direction::Length {
            let declared = usize::try_from(column_length(column)).ok();
            if declared != Some(frame.count) {
                return Err(format!(
                    "length column '{}' does not match {} rows",
                    param.name, frame.count
                ));
            }
            continue;
        }
        check_column(&param.name, param.ty, frame.count, column)?;
    }
    Ok(())
}

fn check_outputs(
    spec: &RemoteFunctionSpec,
    rows: usize,
    result: Option<&Column>,
    outputs: &[Column],
) -> Result<(), String> {
    if outputs.len() != spec.output_count() {
        return Err(format!(
            "kernel returned {} outputs for '{}', expected {}",
            outputs.len(),
            spec.name(),
            spec.output_count()
        ));
    }
    for (param, column) in spec.outputs().zip(outputs) {
        check_column(&param.name, param.ty, rows, column)?;
    }
    match (spec.result(), result) {
        (ResultKind::None, None) => Ok(()),
        (ResultKind::ErrorCode, Some(column)) => {
            check_column("result", ScalarType::Int32, rows, column)
        }
        (ResultKind::Value { ty, .. }, Some(column)) => check_column("result", *ty, rows, column),
        (kind, got) => Err(format!(
            "kernel result for '{}' does not match {kind:?}: {got:?}",
            spec.name()
        )),
    }
}

fn check_column(
    name: &str,
    ty: ScalarType,
    rows: usize,
    column: &Column,
) -> Result<(), String> {
    if column.scalar_type() != ty {
        return Err(format!(
            "column '{name}' is {}, expected {ty}",
            column.scalar_type()
        ));
    }
    if column.len() != rows {
        return Err(format!(
            "column '{name}' has {} rows, expected {rows}",
            column.len()
        ));
    }
    Ok(())
}

fn column_length(column: &Column) -> i64 {
    match column {
        Column::Int32(v) if v.len() == 1 => i64::from(v[0]),
        _ => -1,
    }
}

#[cfg(test)]
mod tests {
    use bridge_spec::FunctionId;

    use super::*;
    use crate::error::KernelError;
    use crate::kernel::Outcome;

    struct Doubler;

    impl Kernel for Doubler {
        fn invoke(&mut self, call: &Invocation<'_>) -> Result<Outcome, KernelError> {
            let values = call.inputs[0].to_f64().unwrap_or_default();
            let doubled = values.iter().map(|x| x * 2.0).collect();
            Ok(Outcome::with_codes(
                vec![0; call.rows],
                vec![Column::Float64(doubled)],
            ))
        }
    }

    struct Broken;

    impl Kernel for Broken {
        fn invoke(&mut self, _call: &Invocation<'_>) -> Result<Outcome, KernelError> {
            Ok(Outcome::default())
        }
    }

    fn table() -> Arc<FunctionTable> {
        let mut table = FunctionTable::new();
        table
            .register(
                RemoteFunctionSpec::builder("double")
                    .input("x", ScalarType::Float64)
                    .output("y", ScalarType::Float64)
                    .length("n")
                    .must_handle_array()
                    .returns_error_code()
                    .build()
                    .unwrap(),
            )
            .unwrap();
        Arc::new(table)
    }

    fn frame(columns: Vec<Column>, count: usize) -> Request {
        Request::Call(CallFrame {
            call_id: 9,
            function_id: FunctionId::from_name("double"),
            function: "double".to_string(),
            count,
            columns,
        })
    }

    #[test]
    fn test_dispatch_runs_kernel() {
        let mut dispatcher = Dispatcher::new(table(), Doubler);
        let reply = dispatcher.dispatch(frame(
            vec![Column::Float64(vec![1.0, 2.5]), Column::Int32(vec![2])],
            2,
        ));
        let Reply::Result(result) = reply else {
            panic!("expected a result, got {reply:?}");
        };
        assert_eq!(result.call_id, 9);
        assert_eq!(result.outputs, vec![Column::Float64(vec![2.0, 5.0])]);
        assert_eq!(result.result, Some(Column::Int32(vec![0, 0])));
    }

    #[test]
    fn test_wrong_length_column_fails() {
        let mut dispatcher = Dispatcher::new(table(), Doubler);
        let reply = dispatcher.dispatch(frame(
            vec![Column::Float64(vec![1.0, 2.5]), Column::Int32(vec![3])],
            2,
        ));
        assert!(matches!(reply, Reply::Failed { call_id: 9, .. }));
    }

    #[test]
    fn test_wrong_type_fails() {
        let mut dispatcher = Dispatcher::new(table(), Doubler);
        let reply = dispatcher.dispatch(frame(
            vec![Column::Int32(vec![1]), Column::Int32(vec![1])],
            1,
        ));
        assert!(matches!(reply, Reply::Failed { .. }));
    }

    #[test]
    fn test_unknown_function_fails() {
        let mut dispatcher = Dispatcher::new(table(), Doubler);
        let reply = dispatcher.dispatch(Request::Call(CallFrame {
            call_id: 1,
            function_id: FunctionId::from_name("evolve_model"),
            function: "evolve_model".to_string(),
            count: 1,
            columns: vec![],
        }));
        let Reply::Failed { message, .. } = reply else {
            panic!("expected failure");
        };
        assert!(message.contains("evolve_model"));
    }

    #[test]
    fn test_malformed_kernel_output_fails() {
        let mut dispatcher = Dispatcher::new(table(), Broken);
        let reply = dispatcher.dispatch(frame(
            vec![Column::Float64(vec![1.0]), Column::Int32(vec![1])],
            1,
        ));
        assert!(matches!(reply, Reply::Failed { .. }));
    }

    #[test]
    fn test_stop_then_calls_fail() {
        let mut dispatcher = Dispatcher::new(table(), Doubler);
        assert_eq!(dispatcher.dispatch(Request::Stop), Reply::Stopped);
        assert!(dispatcher.is_stopped());
        let reply = dispatcher.dispatch(frame(
            vec![Column::Float64(vec![1.0]), Column::Int32(vec![1])],
            1,
        ));
        assert!(matches!(reply, Reply::Failed { .. }));
    }

    #[test]
    fn test_handle_round_trips_bytes() {
        let mut dispatcher = Dispatcher::new(table(), Doubler);
        let bytes = bridge_net::encode(&Request::Stop).unwrap();
        let reply: Reply = bridge_net::decode(&dispatcher.handle(&bytes).unwrap()).unwrap();
        assert_eq!(reply, Reply::Stopped);
    }
}
