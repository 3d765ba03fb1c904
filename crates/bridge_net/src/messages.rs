//! Frames exchanged between a session and its worker.
//!
//! A call is one request frame answered by exactly one reply frame. Columns
//! travel in declaration order; units never travel, both sides agree on
//! them through the function table.

use bridge_spec::{Column, FunctionId};
use serde::{Deserialize, Serialize};

/// One invocation of a remote function over `count` rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallFrame {
    /// Correlates the reply with this request.
    pub call_id: u64,
    /// Id derived from the function name.
    pub function_id: FunctionId,
    /// Function name, for diagnostics on the worker side.
    pub function: String,
    /// Number of rows in every column.
    pub count: usize,
    /// One column per IN, INOUT and LENGTH parameter, in declaration order.
    pub columns: Vec<Column>,
}

/// The worker's answer to a [`CallFrame`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultFrame {
    /// Echo of [`CallFrame::call_id`].
    pub call_id: u64,
    /// Echo of [`CallFrame::count`].
    pub count: usize,
    /// The per-row result column, for functions that declare one.
    pub result: Option<Column>,
    /// One column per OUT and INOUT parameter, in declaration order.
    pub outputs: Vec<Column>,
}

/// A message from a session to a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Request {
    /// Invoke a function.
    Call(CallFrame),
    /// Release all worker resources and stop serving.
    Stop,
}

/// A message from a worker to a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Reply {
    /// The call completed; per-row error codes may still report failures.
    Result(ResultFrame),
    /// The worker could not execute the call at all.
    Failed {
        /// Echo of [`CallFrame::call_id`].
        call_id: u64,
        /// Human-readable reason.
        message: String,
    },
    /// Acknowledges [`Request::Stop`].
    Stopped,
}

/// Published once by a worker when it starts serving.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerAnnounce {
    /// Worker name, as used in its call subject.
    pub name: String,
    /// Unique id of this worker process.
    pub instance_id: String,
    /// Number of functions the worker can dispatch.
    pub functions: usize,
}
