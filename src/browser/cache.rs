//! Remote object side table.
//!
//! Node handles carry only a stable [`NodeId`]. The ephemeral remote object
//! id a node resolves to lives here, keyed by node id and stamped with the
//! time it was resolved. Entries older than the TTL are treated as absent.
//!
//! Every object id that leaves the table (expired, invalidated, replaced or
//! cleared) is queued for release; the owner drains the queue with
//! [`ObjectCache::drain_evicted`] and frees the objects in the page.

use std::mem;
use std::time::Duration;

use rustc_hash::FxHashMap;
use tokio::time::Instant;

use crate::identifiers::{NodeId, RemoteObjectId};

// ============================================================================
// ObjectCache
// ============================================================================

/// Short-lived `NodeId → RemoteObjectId` cache.
#[derive(Debug)]
pub(crate) struct ObjectCache {
    ttl: Duration,
    entries: FxHashMap<NodeId, (RemoteObjectId, Instant)>,
    /// Object ids dropped from the table, not yet released.
    evicted: Vec<RemoteObjectId>,
}

impl ObjectCache {
    /// Creates an empty cache. A zero TTL disables caching.
    pub(crate) fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: FxHashMap::default(),
            evicted: Vec::new(),
        }
    }

    /// Returns the cached object id if it is younger than the TTL.
    ///
    /// An expired entry is evicted.
    pub(crate) fn get(&mut self, node_id: NodeId, now: Instant) -> Option<RemoteObjectId> {
        let (object_id, cached_at) = self.entries.get(&node_id)?;

        if now.saturating_duration_since(*cached_at) < self.ttl {
            return Some(object_id.clone());
        }

        self.invalidate(node_id);
        None
    }

    /// Caches `object_id` for `node_id`, evicting every expired entry.
    pub(crate) fn insert(&mut self, node_id: NodeId, object_id: RemoteObjectId, now: Instant) {
        if self.ttl.is_zero() {
            self.evicted.push(object_id);
            return;
        }

        let ttl = self.ttl;
        let evicted = &mut self.evicted;
        self.entries.retain(|_, (cached, cached_at)| {
            let live = now.saturating_duration_since(*cached_at) < ttl;
            if !live {
                evicted.push(cached.clone());
            }
            live
        });

        if let Some((previous, _)) = self.entries.insert(node_id, (object_id.clone(), now))
            && previous != object_id
        {
            self.evicted.push(previous);
        }
    }

    pub(crate) fn invalidate(&mut self, node_id: NodeId) {
        if let Some((object_id, _)) = self.entries.remove(&node_id) {
            self.evicted.push(object_id);
        }
    }

    pub(crate) fn clear(&mut self) {
        self.evicted
            .extend(self.entries.drain().map(|(_, (object_id, _))| object_id));
    }

    /// Takes the object ids waiting to be released.
    pub(crate) fn drain_evicted(&mut self) -> Vec<RemoteObjectId> {
        mem::take(&mut self.evicted)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: i64) -> NodeId {
        NodeId::new(id).expect("valid node id")
    }

    #[test]
    fn test_hit_within_ttl() {
        let mut cache = ObjectCache::new(Duration::from_millis(500));
        let t0 = Instant::now();
        cache.insert(node(1), RemoteObjectId::new("obj-1"), t0);

        let hit = cache.get(node(1), t0 + Duration::from_millis(499));
        assert_eq!(hit, Some(RemoteObjectId::new("obj-1")));
    }

    #[test]
    fn test_miss_after_ttl_evicts() {
        let mut cache = ObjectCache::new(Duration::from_millis(500));
        let t0 = Instant::now();
        cache.insert(node(1), RemoteObjectId::new("obj-1"), t0);

        assert!(cache.get(node(1), t0 + Duration::from_millis(500)).is_none());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_invalidate() {
        let mut cache = ObjectCache::new(Duration::from_secs(5));
        let t0 = Instant::now();
        cache.insert(node(1), RemoteObjectId::new("a"), t0);
        cache.insert(node(2), RemoteObjectId::new("b"), t0);

        cache.invalidate(node(1));
        assert!(cache.get(node(1), t0).is_none());
        assert!(cache.get(node(2), t0).is_some());

        cache.clear();
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_zero_ttl_never_caches() {
        let mut cache = ObjectCache::new(Duration::ZERO);
        let t0 = Instant::now();
        cache.insert(node(1), RemoteObjectId::new("a"), t0);
        assert!(cache.get(node(1), t0).is_none());
        assert_eq!(cache.drain_evicted(), vec![RemoteObjectId::new("a")]);
    }

    #[test]
    fn test_insert_prunes_expired_entries() {
        let mut cache = ObjectCache::new(Duration::from_millis(500));
        let t0 = Instant::now();
        for id in 1..=50 {
            cache.insert(node(id), RemoteObjectId::new(format!("obj-{id}")), t0);
        }
        assert_eq!(cache.len(), 50);

        cache.insert(node(99), RemoteObjectId::new("obj-99"), t0 + Duration::from_secs(1));

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.drain_evicted().len(), 50);
        assert!(cache.drain_evicted().is_empty());
    }

    #[test]
    fn test_evictions_are_queued_for_release() {
        let mut cache = ObjectCache::new(Duration::from_secs(5));
        let t0 = Instant::now();
        cache.insert(node(1), RemoteObjectId::new("a"), t0);
        cache.insert(node(1), RemoteObjectId::new("b"), t0);
        cache.insert(node(2), RemoteObjectId::new("c"), t0);

        cache.invalidate(node(2));
        cache.invalidate(node(2));
        assert_eq!(
            cache.drain_evicted(),
            vec![RemoteObjectId::new("a"), RemoteObjectId::new("c")]
        );

        cache.clear();
        assert_eq!(cache.drain_evicted(), vec![RemoteObjectId::new("b")]);
    }
}
