//! In-process transport: a dispatcher behind the [`Transport`] interface.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bridge_net::{NetError, Transport};
use bridge_spec::FunctionTable;

use crate::dispatcher::Dispatcher;
use crate::kernel::Kernel;

/// Subject reported in timeouts from a killed loopback worker.
const LOOPBACK_SUBJECT: &str = "loopback";

/// Simulates the death of a loopback worker.
///
/// Once killed, every send times out as a vanished process would.
#[derive(Debug, Clone, Default)]
pub struct KillSwitch(Arc<AtomicBool>);

impl KillSwitch {
    /// Kill the worker.
    pub fn kill(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns `true` once the worker has been killed.
    #[must_use]
    pub fn is_killed(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A [`Transport`] that hands frames straight to a [`Dispatcher`] in the
/// same process.
#[derive(Debug)]
pub struct LoopbackTransport<K> {
    dispatcher: Dispatcher<K>,
    kill_switch: KillSwitch,
    closed: bool,
}

impl<K: Kernel> LoopbackTransport<K> {
    /// Serve `kernel` over `table` in-process.
    #[must_use]
    pub fn new(table: Arc<FunctionTable>, kernel: K) -> Self {
        Self {
            dispatcher: Dispatcher::new(table, kernel),
            kill_switch: KillSwitch::default(),
            closed: false,
        }
    }

    /// A handle that can kill this worker from elsewhere.
    #[must_use]
    pub fn kill_switch(&self) -> KillSwitch {
        self.kill_switch.clone()
    }
}

impl<K: Kernel> Transport for LoopbackTransport<K> {
    fn send(&mut self, frame: &[u8]) -> Result<Vec<u8>, NetError> {
        if self.closed {
            return Err(NetError::Closed);
        }
        if self.kill_switch.is_killed() {
            return Err(NetError::Timeout {
                subject: LOOPBACK_SUBJECT.to_string(),
                after: Duration::ZERO,
            });
        }
        self.dispatcher.handle(frame)
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

#[cfg(test)]
mod tests {
    use bridge_net::{Reply, Request};

    use super::*;
    use crate::memory::MemoryKernel;

    #[test]
    fn test_stop_round_trip() {
        let mut transport = LoopbackTransport::new(Arc::new(FunctionTable::new()), MemoryKernel::new());
        let bytes = bridge_net::encode(&Request::Stop).unwrap();
        let reply: Reply = bridge_net::decode(&transport.send(&bytes).unwrap()).unwrap();
        assert_eq!(reply, Reply::Stopped);
    }

    #[test]
    fn test_killed_worker_times_out() {
        let mut transport = LoopbackTransport::new(Arc::new(FunctionTable::new()), MemoryKernel::new());
        transport.kill_switch().kill();
        let bytes = bridge_net::encode(&Request::Stop).unwrap();
        let err = transport.send(&bytes).unwrap_err();
        assert!(matches!(err, NetError::Timeout { .. }));
        assert!(err.is_unresponsive());
    }

    #[test]
    fn test_closed_transport_rejects_sends() {
        let mut transport = LoopbackTransport::new(Arc::new(FunctionTable::new()), MemoryKernel::new());
        transport.close();
        assert!(matches!(transport.send(&[]), Err(NetError::Closed)));
    }
}
