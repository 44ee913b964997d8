//! The command dispatcher: blocking request/response semantics over the
//! fire-and-forget session transport.
//!
//! Dispatch calls against the one primary session are serialized: a single
//! async mutex admits one in-flight call at a time, so two pending calls can
//! never race for render-state mutation. The calling task suspends between
//! sending the command and receiving its matched response or hitting the
//! deadline; cancellation on timeout is an explicit removal from the
//! correlation table, and a response arriving afterwards resolves nothing.

use std::sync::Arc;
use std::time::Duration;

use molv_protocol::{Command, CommandEnvelope};
use tokio::sync::Mutex;

use crate::correlate::CorrelationTable;
use crate::error::{Error, Result};
use crate::registry::SessionRegistry;
use crate::render::validate_args;
use crate::snapshot::Snapshot;

/// Default per-call deadline.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

pub struct Dispatcher {
    registry: Arc<SessionRegistry>,
    table: Arc<CorrelationTable>,
    call_gate: Mutex<()>,
    default_timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<SessionRegistry>,
        table: Arc<CorrelationTable>,
        default_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            table,
            call_gate: Mutex::new(()),
            default_timeout,
        }
    }

    /// Dispatch `command` to the primary session and block until its
    /// snapshot arrives, an error is reported, or the default deadline
    /// elapses.
    pub async fn dispatch(&self, command: Command) -> Result<Snapshot> {
        self.dispatch_with_timeout(command, self.default_timeout)
            .await
    }

    /// [`dispatch`](Self::dispatch) with an explicit per-call deadline.
    pub async fn dispatch_with_timeout(
        &self,
        command: Command,
        timeout: Duration,
    ) -> Result<Snapshot> {
        // Invalid argument shapes never cost a round trip.
        validate_args(&command)?;

        // Queue concurrent callers rather than interleaving their calls.
        let _gate = self.call_gate.lock().await;

        // Fail fast with no network round trip when no primary exists.
        let session = self
            .registry
            .current_primary()
            .ok_or(Error::ConnectionUnavailable)?;

        let (id, receiver, mut guard) = self.table.register();
        let envelope = CommandEnvelope {
            command,
            correlation_id: id,
        };
        tracing::debug!(
            target: "molv",
            id = %id,
            session = %session.id,
            command = envelope.command.name(),
            "dispatching command"
        );

        let frame = serde_json::to_string(&envelope)?;
        session.send(frame)?;

        match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(outcome)) => {
                guard.complete();
                outcome
            }
            // The waiter sender was dropped without resolving; the entry is
            // already gone from the table.
            Ok(Err(_)) => {
                guard.complete();
                Err(Error::ChannelClosed)
            }
            Err(_) => {
                if self.table.discard(id) {
                    tracing::warn!(
                        target: "molv",
                        id = %id,
                        "call timed out; a late response for this id will be dropped"
                    );
                }
                guard.complete();
                Err(Error::Timeout {
                    ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Calls currently awaiting a response (0 or 1 by the serialization
    /// discipline).
    pub fn in_flight(&self) -> usize {
        self.table.pending_len()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use molv_protocol::{CommandEnvelope, ResponseOutcome, decode_image};
    use tokio::sync::mpsc;

    use super::*;
    use crate::executor::Executor;
    use crate::registry::RegistryPolicy;

    fn dispatcher() -> (Arc<SessionRegistry>, Arc<CorrelationTable>, Dispatcher) {
        let registry = Arc::new(SessionRegistry::new(RegistryPolicy::PromoteObserver));
        let table = Arc::new(CorrelationTable::new());
        let dispatcher = Dispatcher::new(Arc::clone(&registry), Arc::clone(&table), DEFAULT_TIMEOUT);
        (registry, table, dispatcher)
    }

    /// Wires a real executor to the registry the way the server socket task
    /// does: reads frames, applies them, resolves the correlation table.
    fn attach_executor(registry: &Arc<SessionRegistry>, table: &Arc<CorrelationTable>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        registry.register(tx).unwrap();
        let table = Arc::clone(table);
        tokio::spawn(async move {
            let mut executor = Executor::new();
            while let Some(frame) = rx.recv().await {
                let envelope: CommandEnvelope = serde_json::from_str(&frame).unwrap();
                let response = executor.handle(envelope);
                let outcome = match response.outcome {
                    ResponseOutcome::Ok { image } => {
                        Ok(Snapshot::new(decode_image(&image).unwrap()))
                    }
                    ResponseOutcome::Error { message } => {
                        Err(Error::RemoteExecution { message })
                    }
                };
                table.resolve(response.correlation_id, outcome);
            }
        });
    }

    #[tokio::test]
    async fn no_primary_fails_fast_with_connection_unavailable() {
        let (_registry, table, dispatcher) = dispatcher();
        let started = Instant::now();
        let err = dispatcher
            .dispatch(Command::ResetView)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ConnectionUnavailable));
        // Fail-fast, not a timeout: nothing was registered or sent.
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(table.pending_len(), 0);
    }

    #[tokio::test]
    async fn dispatch_round_trips_a_snapshot() {
        let (registry, table, dispatcher) = dispatcher();
        attach_executor(&registry, &table);

        let snapshot = dispatcher
            .dispatch(Command::LoadPdb {
                pdb_id: "1CRN".into(),
            })
            .await
            .unwrap();
        assert!(snapshot.bytes.len() > 1000);
        assert_eq!(dispatcher.in_flight(), 0);
    }

    #[tokio::test]
    async fn invalid_arguments_fail_as_protocol_errors_without_a_round_trip() {
        let (registry, table, dispatcher) = dispatcher();
        // A session that would panic if anything reached it.
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        registry.register(tx).unwrap();

        let err = dispatcher
            .dispatch(Command::Zoom { factor: 0.0 })
            .await
            .unwrap_err();
        assert!(err.is_protocol());
        assert_eq!(table.pending_len(), 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn remote_error_surfaces_as_remote_execution() {
        let (registry, table, dispatcher) = dispatcher();
        attach_executor(&registry, &table);

        let err = dispatcher
            .dispatch(Command::HighlightHetero)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RemoteExecution { .. }));
    }

    #[tokio::test]
    async fn unresponsive_session_times_out_and_clears_the_pending_call() {
        let (registry, table, dispatcher) = dispatcher();
        // Session that never answers.
        let (tx, _rx) = mpsc::unbounded_channel::<String>();
        registry.register(tx).unwrap();

        let err = dispatcher
            .dispatch_with_timeout(Command::ResetView, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(table.pending_len(), 0);
    }

    #[tokio::test]
    async fn late_response_after_timeout_is_dropped() {
        let (registry, table, dispatcher) = dispatcher();
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        registry.register(tx).unwrap();

        let err = dispatcher
            .dispatch_with_timeout(Command::ResetView, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(err.is_timeout());

        // The command reached the session; its answer arrives too late.
        let frame = rx.recv().await.unwrap();
        let envelope: CommandEnvelope = serde_json::from_str(&frame).unwrap();
        assert!(!table.resolve(envelope.correlation_id, Ok(Snapshot::new(vec![0]))));
    }

    #[tokio::test]
    async fn concurrent_callers_are_queued_not_interleaved() {
        let (registry, table, dispatcher) = dispatcher();
        attach_executor(&registry, &table);
        let dispatcher = Arc::new(dispatcher);

        let mut handles = Vec::new();
        for _ in 0..4 {
            let dispatcher = Arc::clone(&dispatcher);
            handles.push(tokio::spawn(async move {
                dispatcher
                    .dispatch(Command::LoadPdb {
                        pdb_id: "1HSG".into(),
                    })
                    .await
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }
        assert_eq!(table.pending_len(), 0);
    }
}
