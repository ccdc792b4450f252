// src/agent/pending.rs
//! Pending proxy entries
//!
//! Bookkeeping correlating in-flight intercepted calls to their eventual
//! responses. Entries are keyed by request id and grouped by the intercept
//! event that spawned them, so one timeout evicts every entry belonging to
//! the same intercepted call.

use crate::codec::ResponseDescriptor;
use crate::wire::{EventId, RequestId};
use dashmap::DashMap;
use tokio::sync::oneshot;
use tracing::debug;

struct PendingEntry {
    event: EventId,
    resolver: oneshot::Sender<ResponseDescriptor>,
}

/// Registry of in-flight proxied requests, owned by one agent instance
#[derive(Default)]
pub struct PendingRegistry {
    entries: DashMap<RequestId, PendingEntry>,
    events: DashMap<EventId, Vec<RequestId>>,
}

impl PendingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entry for `id` under `event`, returning its resolution
    pub fn insert(&self, id: RequestId, event: EventId) -> oneshot::Receiver<ResponseDescriptor> {
        let (resolver, resolution) = oneshot::channel();
        self.entries.insert(id, PendingEntry { event, resolver });
        self.events.entry(event).or_default().push(id);
        resolution
    }

    /// Resolve the entry matching `descriptor.id`.
    ///
    /// Returns false when no entry matches (already resolved, evicted, or
    /// foreign) — the caller logs and drops such responses.
    pub fn resolve(&self, descriptor: ResponseDescriptor) -> bool {
        let Some((id, entry)) = self.entries.remove(&descriptor.id) else {
            return false;
        };
        self.forget_event_member(entry.event, id);
        if entry.resolver.send(descriptor).is_err() {
            // The racing side gave up between removal and send; the response
            // is dropped, exactly as an unmatched one would be.
            debug!(%id, "resolution arrived after the race was abandoned");
        }
        true
    }

    /// Drop every entry belonging to `event`, returning how many were evicted
    pub fn evict_event(&self, event: EventId) -> usize {
        let Some((_, ids)) = self.events.remove(&event) else {
            return 0;
        };
        let mut evicted = 0;
        for id in ids {
            if self.entries.remove(&id).is_some() {
                evicted += 1;
            }
        }
        evicted
    }

    /// Drop everything (disarm teardown)
    pub fn clear(&self) {
        self.entries.clear();
        self.events.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &RequestId) -> bool {
        self.entries.contains_key(id)
    }

    fn forget_event_member(&self, event: EventId, id: RequestId) {
        if let Some(mut ids) = self.events.get_mut(&event) {
            ids.retain(|member| *member != id);
            if ids.is_empty() {
                drop(ids);
                self.events.remove(&event);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(id: RequestId) -> ResponseDescriptor {
        ResponseDescriptor {
            id,
            status: 200,
            status_text: "OK".into(),
            headers: vec![],
            body: None,
        }
    }

    #[tokio::test]
    async fn test_resolve_matched_entry() {
        let registry = PendingRegistry::new();
        let id = RequestId::fresh();
        let resolution = registry.insert(id, EventId::fresh());

        assert!(registry.resolve(response(id)));
        assert_eq!(resolution.await.unwrap().id, id);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_unmatched_response_is_reported() {
        let registry = PendingRegistry::new();
        assert!(!registry.resolve(response(RequestId::fresh())));
    }

    #[tokio::test]
    async fn test_evict_event_removes_all_members() {
        let registry = PendingRegistry::new();
        let event = EventId::fresh();
        let a = RequestId::fresh();
        let b = RequestId::fresh();
        let _ra = registry.insert(a, event);
        let _rb = registry.insert(b, event);

        assert_eq!(registry.evict_event(event), 2);
        assert!(registry.is_empty());

        // A late answer for an evicted entry is unmatched, not misapplied.
        assert!(!registry.resolve(response(a)));
    }

    #[tokio::test]
    async fn test_eviction_is_scoped_to_one_event() {
        let registry = PendingRegistry::new();
        let victim = EventId::fresh();
        let survivor = EventId::fresh();
        let a = RequestId::fresh();
        let b = RequestId::fresh();
        let _ra = registry.insert(a, victim);
        let _rb = registry.insert(b, survivor);

        registry.evict_event(victim);
        assert!(!registry.contains(&a));
        assert!(registry.contains(&b));
    }

    #[tokio::test]
    async fn test_distinct_ids_never_cross_match() {
        let registry = PendingRegistry::new();
        let a = RequestId::fresh();
        let b = RequestId::fresh();
        let ra = registry.insert(a, EventId::fresh());
        let rb = registry.insert(b, EventId::fresh());

        // Interleaved arrival order.
        assert!(registry.resolve(response(b)));
        assert!(registry.resolve(response(a)));

        assert_eq!(ra.await.unwrap().id, a);
        assert_eq!(rb.await.unwrap().id, b);
    }
}
