//! Session error types.

use bridge_net::{CodecError, NetError};
use bridge_spec::{EntityHandle, SpecError};
use glam::IVec3;

use crate::grid::IndexRange;
use crate::lifecycle::LifecycleState;

/// Errors surfaced by a [`Session`](crate::Session) and its parts.
///
/// Local validation failures (arity, handles, ranges, state) are raised
/// before anything is sent to the worker.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Scalar/sequence cardinality or argument count disagrees with the
    /// declaration.
    #[error("arity mismatch: {0}")]
    ArityMismatch(String),

    /// The handle was deleted, or never belonged to the set.
    #[error("invalid handle {handle} in set '{set}'")]
    InvalidHandle {
        /// The entity set addressed.
        set: String,
        /// The offending handle.
        handle: EntityHandle,
    },

    /// A grid index lies outside the grid's inclusive range.
    #[error("index {index} is outside {range} of grid '{grid}'")]
    IndexOutOfRange {
        /// The grid addressed.
        grid: String,
        /// The offending index.
        index: IVec3,
        /// The grid's range.
        range: IndexRange,
    },

    /// The operation is not legal in the current lifecycle state.
    #[error("'{operation}' is not legal in state {state}")]
    IllegalStateTransition {
        /// The rejected operation.
        operation: String,
        /// The state the session was in.
        state: LifecycleState,
    },

    /// A mutation was rejected because of the current lifecycle state.
    #[error("'{name}' cannot be changed in state {state}")]
    ParameterLocked {
        /// Parameter or attribute name.
        name: String,
        /// The state the session was in.
        state: LifecycleState,
    },

    /// The parameter has a getter but no setter.
    #[error("parameter '{0}' is read-only")]
    ReadOnlyParameter(String),

    /// The transport failed; the session is stopped.
    #[error("worker unresponsive: {0}")]
    WorkerUnresponsive(#[source] NetError),

    /// A remote call returned a nonzero error code.
    #[error("'{function}' failed with error code {code} (row {row})")]
    RemoteError {
        /// The function called.
        function: String,
        /// The raw error code.
        code: i32,
        /// The first failing row.
        row: usize,
    },

    /// The worker rejected the call without executing it.
    #[error("worker could not execute '{function}': {message}")]
    WorkerFailed {
        /// The function called.
        function: String,
        /// The worker's reason.
        message: String,
    },

    /// No such function is declared.
    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    /// No such parameter is registered.
    #[error("unknown parameter '{0}'")]
    UnknownParameter(String),

    /// No such entity set or grid is defined.
    #[error("unknown set '{0}'")]
    UnknownSet(String),

    /// The set has no getter or setter for the attribute.
    #[error("set '{set}' has no accessor for '{attribute}'")]
    UnknownAttribute {
        /// The set addressed.
        set: String,
        /// The unknown attribute.
        attribute: String,
    },

    /// The grid's index range has not been established yet.
    #[error("index range of grid '{0}' is not known")]
    GridRangeUnset(String),

    /// The worker's reply does not match the request.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A value could not be encoded or decoded.
    #[error(transparent)]
    Codec(CodecError),

    /// A declaration is invalid.
    #[error(transparent)]
    Spec(SpecError),
}

impl SessionError {
    /// Returns `true` if the error ended the session.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::WorkerUnresponsive(_))
    }
}

impl From<CodecError> for SessionError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::ArityMismatch { .. } => Self::ArityMismatch(err.to_string()),
            other => Self::Codec(other),
        }
    }
}

impl From<SpecError> for SessionError {
    fn from(err: SpecError) -> Self {
        match err {
            SpecError::UnknownFunction(name) => Self::UnknownFunction(name),
            other => Self::Spec(other),
        }
    }
}
