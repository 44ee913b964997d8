//! Request/response correlation.
//!
//! Every dispatched command registers a pending entry keyed by a fresh
//! correlation id; the session socket resolves it when the matching response
//! arrives. Responses are matched strictly by id, so out-of-order delivery
//! still wakes the correct waiter. An id with no pending entry (late response
//! after a timeout, or a duplicate) resolves nothing and is dropped by the
//! caller.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use molv_protocol::CorrelationId;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::error::Result;
use crate::snapshot::Snapshot;

type Waiter = oneshot::Sender<Result<Snapshot>>;

/// Maps in-flight correlation ids to their pending waiters.
///
/// Ids are drawn from an atomic counter, so they are unique among pending
/// calls for the lifetime of the table. Each entry is resolved at most once.
pub struct CorrelationTable {
    next_id: AtomicU64,
    pending: Mutex<HashMap<CorrelationId, Waiter>>,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Register a new pending call.
    ///
    /// Returns the fresh id, the receiver the dispatcher blocks on, and an
    /// RAII guard that removes the entry if the waiting future is dropped
    /// before resolution.
    pub fn register(
        self: &Arc<Self>,
    ) -> (CorrelationId, oneshot::Receiver<Result<Snapshot>>, PendingGuard) {
        let id = CorrelationId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);
        (id, rx, PendingGuard::new(id, Arc::clone(self)))
    }

    /// Resolve the pending call for `id`, delivering `outcome` to its waiter.
    ///
    /// Returns false when no entry exists, which is how a late or duplicate
    /// response is detected; the caller logs and drops it.
    pub fn resolve(&self, id: CorrelationId, outcome: Result<Snapshot>) -> bool {
        match self.pending.lock().remove(&id) {
            Some(waiter) => {
                // A dropped receiver means the dispatcher gave up between
                // removal and send; the outcome is discarded either way.
                let _ = waiter.send(outcome);
                true
            }
            None => false,
        }
    }

    /// Remove the pending call for `id` without resolving it (timeout path).
    pub fn discard(&self, id: CorrelationId) -> bool {
        self.pending.lock().remove(&id).is_some()
    }

    /// Number of calls currently in flight.
    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }
}

impl Default for CorrelationTable {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard ensuring a pending entry is removed when its waiter is dropped
/// without resolving.
pub struct PendingGuard {
    id: CorrelationId,
    table: Arc<CorrelationTable>,
    completed: bool,
}

impl PendingGuard {
    fn new(id: CorrelationId, table: Arc<CorrelationTable>) -> Self {
        Self {
            id,
            table,
            completed: false,
        }
    }

    /// Mark the call as terminally handled; the drop cleanup becomes a no-op.
    pub fn complete(&mut self) {
        self.completed = true;
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        if self.table.discard(self.id) {
            tracing::debug!(target: "molv", id = %self.id, "removed orphaned pending call");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::Snapshot;

    fn snapshot() -> Snapshot {
        Snapshot::new(vec![1, 2, 3])
    }

    #[test]
    fn ids_are_unique_and_increasing() {
        let table = Arc::new(CorrelationTable::new());
        let (a, _rx_a, mut ga) = table.register();
        let (b, _rx_b, mut gb) = table.register();
        assert_ne!(a, b);
        assert!(b.0 > a.0);
        ga.complete();
        gb.complete();
    }

    #[tokio::test]
    async fn resolve_delivers_to_the_matching_waiter() {
        let table = Arc::new(CorrelationTable::new());
        let (id_a, rx_a, mut ga) = table.register();
        let (id_b, rx_b, mut gb) = table.register();

        // Out-of-order resolution still wakes the right waiter.
        assert!(table.resolve(id_b, Ok(snapshot())));
        assert!(table.resolve(id_a, Ok(Snapshot::new(vec![9]))));

        assert_eq!(rx_a.await.unwrap().unwrap().bytes, vec![9]);
        assert_eq!(rx_b.await.unwrap().unwrap().bytes, vec![1, 2, 3]);
        ga.complete();
        gb.complete();
    }

    #[test]
    fn late_response_resolves_nothing() {
        let table = Arc::new(CorrelationTable::new());
        let (id, _rx, mut guard) = table.register();
        assert!(table.discard(id));
        // Simulated late arrival after the timeout removed the entry.
        assert!(!table.resolve(id, Ok(snapshot())));
        assert_eq!(table.pending_len(), 0);
        guard.complete();
    }

    #[test]
    fn dropped_guard_removes_orphaned_entry() {
        let table = Arc::new(CorrelationTable::new());
        let id = {
            let (id, _rx, _guard) = table.register();
            assert_eq!(table.pending_len(), 1);
            id
        };
        assert_eq!(table.pending_len(), 0);
        assert!(!table.resolve(id, Ok(snapshot())));
    }

    #[tokio::test]
    async fn entry_is_resolved_exactly_once() {
        let table = Arc::new(CorrelationTable::new());
        let (id, rx, mut guard) = table.register();
        assert!(table.resolve(id, Ok(snapshot())));
        assert!(!table.resolve(id, Ok(snapshot())));
        assert!(rx.await.unwrap().is_ok());
        guard.complete();
    }
}
