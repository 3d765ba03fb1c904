//! The byte-level channel to one worker.

use crate::error::NetError;

/// A request/reply channel carrying encoded frames to a single worker.
///
/// Calls on one transport are strictly sequential: `send` returns only once
/// the matching reply has arrived, or the transport has given up.
pub trait Transport: Send {
    /// Send one encoded request and wait for its encoded reply.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::Timeout`] or [`NetError::Closed`] if the worker
    /// cannot be reached.
    fn send(&mut self, frame: &[u8]) -> Result<Vec<u8>, NetError>;

    /// Release the channel. Later sends fail with [`NetError::Closed`].
    fn close(&mut self) {}
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&mut self, frame: &[u8]) -> Result<Vec<u8>, NetError> {
        (**self).send(frame)
    }

    fn close(&mut self) {
        (**self).close();
    }
}
