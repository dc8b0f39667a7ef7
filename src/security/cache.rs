//! Route decision caches.
//!
//! # Responsibilities
//! - Provide the `Cache` capability injected into matchers and handlers
//! - Partition route-behavior decisions by matcher kind
//! - Hold resolved post-logout URIs by route id
//!
//! # Design Decisions
//! - Backed by `DashMap`: concurrent first computations of the same key may
//!   race, the last write wins; decisions are pure so both writers agree
//! - No per-entry invalidation: a namespace is only ever cleared in full
//! - Post-logout entries store `Option<Url>`, so a lookup distinguishes
//!   "not computed" (`None`) from "computed, no override" (`Some(None)`)

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use url::Url;

use crate::observability::metrics;

/// Minimal cache capability: lookup, insert, wholesale clear.
pub trait Cache<K, V>: Send + Sync {
    fn get(&self, key: &K) -> Option<V>;
    fn put(&self, key: K, value: V);
    fn clear_all(&self);
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// `Cache` over a concurrent hash map.
#[derive(Debug)]
pub struct ConcurrentCache<K: Eq + Hash, V> {
    name: &'static str,
    inner: DashMap<K, V>,
}

impl<K: Eq + Hash, V> ConcurrentCache<K, V> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            inner: DashMap::new(),
        }
    }
}

impl<K, V> Cache<K, V> for ConcurrentCache<K, V>
where
    K: Eq + Hash + Send + Sync,
    V: Clone + Send + Sync,
{
    fn get(&self, key: &K) -> Option<V> {
        self.inner.get(key).map(|r| r.value().clone())
    }

    fn put(&self, key: K, value: V) {
        self.inner.insert(key, value);
    }

    fn clear_all(&self) {
        self.inner.clear();
        metrics::record_cache_clear(self.name);
    }

    fn len(&self) -> usize {
        self.inner.len()
    }
}

/// Identity of a concrete matcher; partitions the behavior cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatcherKind {
    Csrf,
    Logout,
    Public,
}

impl MatcherKind {
    pub const ALL: [MatcherKind; 3] = [MatcherKind::Csrf, MatcherKind::Logout, MatcherKind::Public];

    pub fn as_str(&self) -> &'static str {
        match self {
            MatcherKind::Csrf => "csrf",
            MatcherKind::Logout => "logout",
            MatcherKind::Public => "public",
        }
    }
}

pub type BehaviorCache = Arc<dyn Cache<String, bool>>;
pub type PostLogoutCache = Arc<dyn Cache<String, Option<Url>>>;

/// Per-kind namespaces of route id → boolean decision.
pub struct RouteBehaviorCache {
    namespaces: HashMap<MatcherKind, BehaviorCache>,
}

impl RouteBehaviorCache {
    pub fn new() -> Self {
        let namespaces = MatcherKind::ALL
            .iter()
            .map(|kind| {
                let cache: BehaviorCache = Arc::new(ConcurrentCache::new(kind.as_str()));
                (*kind, cache)
            })
            .collect();
        Self { namespaces }
    }

    /// The namespace owned by matchers of `kind`.
    pub fn namespace(&self, kind: MatcherKind) -> BehaviorCache {
        self.namespaces
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| Arc::new(ConcurrentCache::new(kind.as_str())))
    }

    pub fn clear(&self, kind: MatcherKind) {
        if let Some(cache) = self.namespaces.get(&kind) {
            cache.clear_all();
        }
    }
}

impl Default for RouteBehaviorCache {
    fn default() -> Self {
        Self::new()
    }
}

pub fn post_logout_cache() -> PostLogoutCache {
    Arc::new(ConcurrentCache::new("post_logout"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespaces_are_independent() {
        let cache = RouteBehaviorCache::new();
        let csrf = cache.namespace(MatcherKind::Csrf);
        let logout = cache.namespace(MatcherKind::Logout);

        csrf.put("r1".into(), true);
        logout.put("r1".into(), false);

        assert_eq!(csrf.get(&"r1".to_string()), Some(true));
        assert_eq!(logout.get(&"r1".to_string()), Some(false));

        cache.clear(MatcherKind::Csrf);
        assert!(csrf.is_empty());
        assert_eq!(logout.get(&"r1".to_string()), Some(false));
    }

    #[test]
    fn test_namespace_is_shared_per_kind() {
        let cache = RouteBehaviorCache::new();
        cache.namespace(MatcherKind::Public).put("r1".into(), true);
        assert_eq!(cache.namespace(MatcherKind::Public).get(&"r1".to_string()), Some(true));
    }

    #[test]
    fn test_post_logout_tri_state() {
        let cache = post_logout_cache();
        let key = "r5".to_string();

        assert_eq!(cache.get(&key), None);
        cache.put(key.clone(), None);
        assert_eq!(cache.get(&key), Some(None));

        cache.clear_all();
        assert_eq!(cache.get(&key), None);
    }
}
