//! Kernel error type.

/// Reasons a kernel could not execute a call at all.
///
/// Per-row failures are reported through error codes instead; a
/// `KernelError` turns into a [`Reply::Failed`](bridge_net::Reply::Failed)
/// frame.
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    /// The kernel does not implement the function.
    #[error("function '{0}' is not implemented by this worker")]
    Unsupported(String),

    /// An input column did not have the expected shape.
    #[error("bad input '{parameter}' to '{function}': {reason}")]
    BadInput {
        /// The function being executed.
        function: String,
        /// The offending parameter.
        parameter: String,
        /// What was wrong with it.
        reason: String,
    },

    /// The kernel has been stopped.
    #[error("worker has stopped")]
    Stopped,
}
