//! Transport and codec error types.

use std::time::Duration;

use bridge_spec::ScalarType;
use bridge_units::UnitError;

/// Errors that can occur while moving frames to and from a worker.
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    /// Failed to encode a frame to MessagePack.
    #[error("failed to encode frame: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// Failed to decode a frame from MessagePack.
    #[error("failed to decode frame: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    /// NATS connection error.
    #[error("NATS connection error: {0}")]
    Connect(#[from] async_nats::ConnectError),

    /// NATS request error.
    #[error("NATS request error: {0}")]
    Request(#[from] async_nats::RequestError),

    /// NATS subscription error.
    #[error("NATS subscribe error: {0}")]
    Subscribe(#[from] async_nats::SubscribeError),

    /// NATS publish error.
    #[error("NATS publish error: {0}")]
    Publish(#[from] async_nats::PublishError),

    /// The runtime driving the transport could not be started.
    #[error("transport runtime error: {0}")]
    Runtime(#[from] std::io::Error),

    /// The worker did not answer in time.
    #[error("no reply on '{subject}' within {after:?}")]
    Timeout {
        /// The subject or channel that was waited on.
        subject: String,
        /// How long the transport waited.
        after: Duration,
    },

    /// The transport was closed, or the worker went away.
    #[error("transport closed")]
    Closed,
}

impl NetError {
    /// Returns `true` if the error means the worker can no longer be
    /// reached, as opposed to a malformed frame.
    #[must_use]
    pub fn is_unresponsive(&self) -> bool {
        !matches!(self, Self::Encode(_) | Self::Decode(_))
    }
}

/// Errors raised while mapping values to wire columns and back.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CodecError {
    /// Scalar/sequence cardinality or sequence length disagrees with the
    /// call.
    #[error("parameter '{parameter}': expected {expected}, got {found}")]
    ArityMismatch {
        /// The parameter being encoded or decoded.
        parameter: String,
        /// What the call required.
        expected: String,
        /// What was supplied.
        found: String,
    },

    /// The element type cannot be converted to the declared type.
    #[error("parameter '{parameter}': expected {expected}, got {found}")]
    TypeMismatch {
        /// The parameter being encoded or decoded.
        parameter: String,
        /// The declared type.
        expected: ScalarType,
        /// The supplied type.
        found: ScalarType,
    },

    /// A bare number was passed for a parameter that requires a unit.
    #[error("parameter '{parameter}' requires a value in units of '{unit}'")]
    MissingUnit {
        /// The parameter being encoded.
        parameter: String,
        /// Symbol of the declared unit.
        unit: String,
    },

    /// A quantity with a unit was passed for a unitless parameter.
    #[error("parameter '{parameter}' takes no unit, got '{unit}'")]
    UnexpectedUnit {
        /// The parameter being encoded.
        parameter: String,
        /// Symbol of the supplied unit.
        unit: String,
    },

    /// The supplied unit cannot be converted to the declared one.
    #[error("parameter '{parameter}': {source}")]
    Unit {
        /// The parameter being encoded.
        parameter: String,
        /// The underlying conversion failure.
        #[source]
        source: UnitError,
    },
}
