//! NATS subject hierarchy.
//!
//! All bridge subjects are prefixed with `bridge.` to namespace within a
//! shared NATS cluster.

/// Root prefix for all bridge NATS subjects.
pub const PREFIX: &str = "bridge";

/// Workers announce themselves here on startup. Worker → *.
pub const WORKER_ANNOUNCE: &str = "bridge.worker.announce";

/// Build the subject a worker serves calls on.
///
/// `bridge.worker.<worker_name>.call`
#[must_use]
pub fn worker_call(worker_name: &str) -> String {
    format!("{PREFIX}.worker.{worker_name}.call")
}

/// Build the queue group name for a worker's instances.
///
/// `q.<worker_name>`
#[must_use]
pub fn queue_group(worker_name: &str) -> String {
    format!("q.{worker_name}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_call_subject() {
        assert_eq!(worker_call("evtwin"), "bridge.worker.evtwin.call");
    }

    #[test]
    fn test_queue_group_name() {
        assert_eq!(queue_group("huayno_worker"), "q.huayno_worker");
    }
}
