//! Subscription management
//!
//! In-memory table of trigger registrations. Keys are node-assigned
//! subscriber ids; each entry remembers the session that registered it so
//! removal is owner-checked and a dropped session can sweep its own
//! entries and nothing else.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

use tether_core::{CredentialIdentity, TriggerFilter};

use crate::session::SessionId;

/// One trigger registration
#[derive(Debug, Clone)]
pub struct Subscriber {
    /// Opaque id assigned by the node process
    pub id: String,
    /// Reply address that registered this subscriber
    pub session_id: SessionId,
    /// Which connection's events this subscriber wants
    pub identity: CredentialIdentity,
    pub filter: TriggerFilter,
    /// Registration order; evaluation for one event follows it
    pub seq: u64,
}

/// All live subscriptions
pub struct SubscriptionTable {
    entries: DashMap<String, Subscriber>,
    next_seq: AtomicU64,
}

impl SubscriptionTable {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            next_seq: AtomicU64::new(1),
        }
    }

    /// Register a subscriber, replacing any earlier registration under the
    /// same id.
    pub fn register(
        &self,
        id: String,
        session_id: SessionId,
        identity: CredentialIdentity,
        filter: TriggerFilter,
    ) {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        info!("registering subscriber {} for {}", id, identity);
        self.entries.insert(
            id.clone(),
            Subscriber {
                id,
                session_id,
                identity,
                filter,
                seq,
            },
        );
    }

    /// Remove a subscriber by id, but only at the request of the session
    /// that registered it. A stale unregister from another process is
    /// logged and ignored.
    pub fn unregister(&self, id: &str, session_id: &SessionId) -> bool {
        match self.entries.get(id) {
            Some(entry) if entry.session_id == *session_id => {
                drop(entry);
                self.entries.remove(id);
                info!("unregistered subscriber {}", id);
                true
            }
            Some(_) => {
                warn!(
                    "ignoring unregister for subscriber {} from non-owning session",
                    id
                );
                false
            }
            None => {
                debug!("unregister for unknown subscriber {}", id);
                false
            }
        }
    }

    /// Remove every subscriber registered by a session. Collect first,
    /// then delete, so the table is not mutated mid-iteration.
    pub fn remove_session(&self, session_id: &SessionId) -> usize {
        let doomed: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.session_id == *session_id)
            .map(|entry| entry.key().clone())
            .collect();
        let count = doomed.len();
        for id in doomed {
            self.entries.remove(&id);
        }
        if count > 0 {
            info!("removed {} subscribers of dropped session {}", count, session_id);
        }
        count
    }

    /// Subscribers interested in one connection's events, in registration
    /// order.
    pub fn for_identity(&self, identity: &CredentialIdentity) -> Vec<Subscriber> {
        let mut matching: Vec<Subscriber> = self
            .entries
            .iter()
            .filter(|entry| entry.identity == *identity)
            .map(|entry| entry.value().clone())
            .collect();
        matching.sort_by_key(|s| s.seq);
        matching
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for SubscriptionTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_core::{Credentials, MessageFilter};

    fn identity(client_id: &str) -> CredentialIdentity {
        CredentialIdentity::derive(&Credentials::new(client_id, "t"))
    }

    fn filter() -> TriggerFilter {
        TriggerFilter::Message(MessageFilter::match_all())
    }

    #[test]
    fn registration_order_is_preserved() {
        let table = SubscriptionTable::new();
        table.register("b".into(), "s1".into(), identity("A"), filter());
        table.register("a".into(), "s1".into(), identity("A"), filter());
        table.register("c".into(), "s2".into(), identity("A"), filter());

        let order: Vec<String> = table
            .for_identity(&identity("A"))
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(order, vec!["b", "a", "c"]);
    }

    #[test]
    fn unregister_requires_the_owning_session() {
        let table = SubscriptionTable::new();
        table.register("sub".into(), "s1".into(), identity("A"), filter());

        assert!(!table.unregister("sub", &"s2".to_string()));
        assert_eq!(table.len(), 1);

        assert!(table.unregister("sub", &"s1".to_string()));
        assert!(table.is_empty());
    }

    #[test]
    fn session_cleanup_removes_exactly_its_entries() {
        let table = SubscriptionTable::new();
        table.register("a1".into(), "s1".into(), identity("A"), filter());
        table.register("a2".into(), "s1".into(), identity("A"), filter());
        table.register("b1".into(), "s2".into(), identity("A"), filter());

        assert_eq!(table.remove_session(&"s1".to_string()), 2);
        assert_eq!(table.len(), 1);
        assert_eq!(table.for_identity(&identity("A"))[0].id, "b1");
    }

    #[test]
    fn re_registration_replaces_the_entry() {
        let table = SubscriptionTable::new();
        table.register("sub".into(), "s1".into(), identity("A"), filter());
        table.register("sub".into(), "s2".into(), identity("B"), filter());

        assert_eq!(table.len(), 1);
        assert!(table.for_identity(&identity("A")).is_empty());
        assert_eq!(table.for_identity(&identity("B"))[0].session_id, "s2");
    }
}
