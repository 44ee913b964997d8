//! Session registry and role arbitration.
//!
//! At most one connected session holds the primary role at any instant. The
//! first registration claims it; later registrations are either admitted as
//! observers or rejected outright, depending on the configured policy.
//! Observers never receive dispatched commands. When the primary disconnects
//! the oldest observer is promoted and re-welcomed as primary.

use std::fmt;

use molv_protocol::Role;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::{Error, Result};

/// Identifies one connected session for the lifetime of its socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// How to treat a registration while a primary session exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegistryPolicy {
    /// Admit the session as a read-only observer.
    #[default]
    PromoteObserver,
    /// Refuse the registration with [`Error::SessionConflict`].
    Reject,
}

/// Outbound handle to a session: serialized JSON frames pushed here are
/// written to its socket by the connection task.
pub type SessionSender = mpsc::UnboundedSender<String>;

#[derive(Clone)]
struct SessionRecord {
    id: SessionId,
    role: Role,
    outbound: SessionSender,
}

/// Handle to the current primary session, as seen by the dispatcher.
#[derive(Clone)]
pub struct PrimaryHandle {
    pub id: SessionId,
    outbound: SessionSender,
}

impl PrimaryHandle {
    /// Queue a serialized frame for delivery to the primary session.
    pub fn send(&self, frame: String) -> Result<()> {
        self.outbound
            .send(frame)
            .map_err(|_| Error::ChannelClosed)
    }
}

struct Inner {
    // Insertion order doubles as promotion order.
    sessions: Vec<SessionRecord>,
    next_id: u64,
}

/// Arbitrates connect/disconnect and role assignment.
pub struct SessionRegistry {
    policy: RegistryPolicy,
    inner: Mutex<Inner>,
}

impl SessionRegistry {
    pub fn new(policy: RegistryPolicy) -> Self {
        Self {
            policy,
            inner: Mutex::new(Inner {
                sessions: Vec::new(),
                next_id: 1,
            }),
        }
    }

    /// Register a connecting session and assign its role.
    pub fn register(&self, outbound: SessionSender) -> Result<(SessionId, Role)> {
        let mut inner = self.inner.lock();
        let has_primary = inner.sessions.iter().any(|s| s.role == Role::Primary);
        let role = if has_primary {
            match self.policy {
                RegistryPolicy::PromoteObserver => Role::Observer,
                RegistryPolicy::Reject => return Err(Error::SessionConflict),
            }
        } else {
            Role::Primary
        };

        let id = SessionId(inner.next_id);
        inner.next_id += 1;
        inner.sessions.push(SessionRecord {
            id,
            role,
            outbound,
        });
        tracing::info!(target: "molv", session = %id, ?role, "session registered");
        Ok((id, role))
    }

    /// Remove a disconnected session.
    ///
    /// If it held the primary role, the oldest observer (if any) is promoted
    /// and returned so the caller can re-welcome it.
    pub fn disconnect(&self, id: SessionId) -> Option<PrimaryHandle> {
        let mut inner = self.inner.lock();
        let position = inner.sessions.iter().position(|s| s.id == id)?;
        let removed = inner.sessions.remove(position);
        tracing::info!(target: "molv", session = %id, role = ?removed.role, "session disconnected");

        if removed.role != Role::Primary {
            return None;
        }
        let promoted = inner.sessions.first_mut()?;
        promoted.role = Role::Primary;
        tracing::info!(target: "molv", session = %promoted.id, "observer promoted to primary");
        Some(PrimaryHandle {
            id: promoted.id,
            outbound: promoted.outbound.clone(),
        })
    }

    /// Current primary session, if one is connected.
    pub fn current_primary(&self) -> Option<PrimaryHandle> {
        let inner = self.inner.lock();
        inner
            .sessions
            .iter()
            .find(|s| s.role == Role::Primary)
            .map(|s| PrimaryHandle {
                id: s.id,
                outbound: s.outbound.clone(),
            })
    }

    /// Number of sessions currently holding the primary role (0 or 1).
    pub fn primary_count(&self) -> usize {
        self.inner
            .lock()
            .sessions
            .iter()
            .filter(|s| s.role == Role::Primary)
            .count()
    }

    /// Total connected sessions.
    pub fn session_count(&self) -> usize {
        self.inner.lock().sessions.len()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(RegistryPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sender() -> SessionSender {
        mpsc::unbounded_channel().0
    }

    #[test]
    fn first_registration_claims_primary() {
        let registry = SessionRegistry::default();
        let (_, role) = registry.register(sender()).unwrap();
        assert_eq!(role, Role::Primary);
        assert_eq!(registry.primary_count(), 1);
    }

    #[test]
    fn second_registration_becomes_observer() {
        let registry = SessionRegistry::default();
        registry.register(sender()).unwrap();
        let (_, role) = registry.register(sender()).unwrap();
        assert_eq!(role, Role::Observer);
        assert_eq!(registry.primary_count(), 1);
    }

    #[test]
    fn reject_policy_signals_session_conflict() {
        let registry = SessionRegistry::new(RegistryPolicy::Reject);
        registry.register(sender()).unwrap();
        let err = registry.register(sender()).unwrap_err();
        assert!(matches!(err, Error::SessionConflict));
        assert_eq!(registry.session_count(), 1);
    }

    #[test]
    fn primary_disconnect_promotes_oldest_observer() {
        let registry = SessionRegistry::default();
        let (primary, _) = registry.register(sender()).unwrap();
        let (first_observer, _) = registry.register(sender()).unwrap();
        registry.register(sender()).unwrap();

        let promoted = registry.disconnect(primary).unwrap();
        assert_eq!(promoted.id, first_observer);
        assert_eq!(registry.primary_count(), 1);
        assert_eq!(registry.current_primary().unwrap().id, first_observer);
    }

    #[test]
    fn observer_disconnect_promotes_nobody() {
        let registry = SessionRegistry::default();
        let (primary, _) = registry.register(sender()).unwrap();
        let (observer, _) = registry.register(sender()).unwrap();
        assert!(registry.disconnect(observer).is_none());
        assert_eq!(registry.current_primary().unwrap().id, primary);
    }

    #[test]
    fn last_disconnect_clears_the_primary_slot() {
        let registry = SessionRegistry::default();
        let (primary, _) = registry.register(sender()).unwrap();
        assert!(registry.disconnect(primary).is_none());
        assert!(registry.current_primary().is_none());
        assert_eq!(registry.primary_count(), 0);

        // A new registration may then claim the slot.
        let (_, role) = registry.register(sender()).unwrap();
        assert_eq!(role, Role::Primary);
    }

    #[test]
    fn at_most_one_primary_across_interleavings() {
        let registry = SessionRegistry::default();
        let mut live = Vec::new();
        for round in 0..20 {
            let (id, _) = registry.register(sender()).unwrap();
            live.push(id);
            if round % 3 == 0 {
                let victim = live.remove(0);
                registry.disconnect(victim);
            }
            assert!(registry.primary_count() <= 1);
        }
    }
}
