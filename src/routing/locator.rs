//! Route source and lookup.
//!
//! # Responsibilities
//! - Expose the current route table as an ordered async sequence
//! - Expose the route descriptors backing the table
//! - Swap in a new table on refresh and broadcast the refresh event
//! - Find the first route whose predicate matches a request
//!
//! # Design Decisions
//! - The table is an immutable snapshot behind `ArcSwap`; readers never lock
//! - Routes are sorted by `order` (stable), descriptors keep source order
//! - The refresh event carries no payload; listeners re-read what they need
//! - A failing predicate only disqualifies its own route

use std::sync::Arc;

use arc_swap::ArcSwap;
use axum::http::request::Parts;
use futures_util::stream::{self, BoxStream, StreamExt};
use tokio::sync::broadcast;

use crate::config::schema::RouteConfig;
use crate::routing::route::Route;
use crate::routing::weight::WeightGroups;

/// Notification that the active route set has changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshRoutesEvent;

/// Supplies the configured routes and their descriptors.
pub trait RouteSource: Send + Sync {
    /// Current routes, in evaluation order.
    fn routes(&self) -> BoxStream<'static, Arc<Route>>;

    /// Current route descriptors.
    fn definitions(&self) -> Arc<Vec<Arc<RouteConfig>>>;

    fn definition(&self, id: &str) -> Option<Arc<RouteConfig>> {
        self.definitions().iter().find(|d| d.key == id).cloned()
    }
}

/// Evaluate `routes` in order against the request, returning the first match.
pub async fn lookup_route(
    mut routes: BoxStream<'static, Arc<Route>>,
    exchange: &Parts,
) -> Option<Arc<Route>> {
    while let Some(route) = routes.next().await {
        match route.predicate().test(exchange).await {
            Ok(true) => return Some(route),
            Ok(false) => {}
            Err(e) => {
                tracing::error!(
                    route_id = %route.id(),
                    error = %e,
                    "Error applying predicate for route"
                );
            }
        }
    }
    None
}

#[derive(Debug, Default)]
struct RouteTable {
    routes: Vec<Arc<Route>>,
    definitions: Arc<Vec<Arc<RouteConfig>>>,
}

/// In-memory route source refreshed from configuration.
pub struct RouteRegistry {
    table: ArcSwap<RouteTable>,
    refresh_tx: broadcast::Sender<RefreshRoutesEvent>,
}

impl RouteRegistry {
    pub fn new() -> Self {
        let (refresh_tx, _) = broadcast::channel(16);
        Self {
            table: ArcSwap::from_pointee(RouteTable::default()),
            refresh_tx,
        }
    }

    /// Build a registry already holding `configs`, without emitting an event.
    pub fn from_configs(configs: &[RouteConfig]) -> Self {
        let registry = Self::new();
        registry.store(configs);
        registry
    }

    /// Compile `configs`, swap them in and notify subscribers.
    pub fn refresh(&self, configs: &[RouteConfig]) {
        self.store(configs);
        self.publish();
    }

    /// Swap in pre-built routes and descriptors and notify subscribers.
    pub fn replace(&self, routes: Vec<Route>, definitions: Vec<RouteConfig>) {
        let mut routes: Vec<Arc<Route>> = routes.into_iter().map(Arc::new).collect();
        routes.sort_by_key(|r| r.order());
        self.table.store(Arc::new(RouteTable {
            routes,
            definitions: Arc::new(definitions.into_iter().map(Arc::new).collect()),
        }));
        self.publish();
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RefreshRoutesEvent> {
        self.refresh_tx.subscribe()
    }

    /// Route by id in the current table.
    pub fn route(&self, id: &str) -> Option<Arc<Route>> {
        self.table.load().routes.iter().find(|r| r.id() == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.table.load().routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn store(&self, configs: &[RouteConfig]) {
        let weights = WeightGroups::from_configs(configs);
        let mut routes: Vec<Arc<Route>> = configs
            .iter()
            .filter_map(|config| Route::from_config(config, &weights))
            .map(Arc::new)
            .collect();
        routes.sort_by_key(|r| r.order());

        tracing::info!(routes = routes.len(), descriptors = configs.len(), "Route table loaded");
        self.table.store(Arc::new(RouteTable {
            routes,
            definitions: Arc::new(configs.iter().cloned().map(Arc::new).collect()),
        }));
    }

    fn publish(&self) {
        // no subscribers yet is fine: there is nothing cached to invalidate
        let receivers = self.refresh_tx.send(RefreshRoutesEvent).unwrap_or(0);
        tracing::debug!(receivers, "Routes refreshed");
    }
}

impl Default for RouteRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RouteSource for RouteRegistry {
    fn routes(&self) -> BoxStream<'static, Arc<Route>> {
        stream::iter(self.table.load().routes.clone()).boxed()
    }

    fn definitions(&self) -> Arc<Vec<Arc<RouteConfig>>> {
        self.table.load().definitions.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{PredicateConfig, PredicateFactory};
    use crate::routing::predicate::{AsyncPredicate, PredicateError};
    use async_trait::async_trait;
    use axum::http::Request;
    use url::Url;

    #[derive(Debug)]
    struct Failing;

    #[async_trait]
    impl AsyncPredicate for Failing {
        async fn test(&self, _exchange: &Parts) -> Result<bool, PredicateError> {
            Err(PredicateError::MissingRemoteAddress)
        }
    }

    fn route_config(key: &str, order: i32, path: &str) -> RouteConfig {
        let mut config = RouteConfig::new(key, Url::parse("http://localhost:9000").unwrap());
        config.order = order;
        config.predicates = vec![PredicateConfig::new(PredicateFactory::Path, path)];
        config
    }

    fn parts(uri: &str) -> Parts {
        Request::builder().uri(uri).body(()).unwrap().into_parts().0
    }

    #[tokio::test]
    async fn test_first_match_by_order_wins() {
        let registry = RouteRegistry::from_configs(&[
            route_config("catch-all", 10, "/**"),
            route_config("api", 1, "/api/**"),
        ]);

        let matched = lookup_route(registry.routes(), &parts("/api/users")).await.unwrap();
        assert_eq!(matched.id(), "api");

        let matched = lookup_route(registry.routes(), &parts("/other")).await.unwrap();
        assert_eq!(matched.id(), "catch-all");
    }

    #[tokio::test]
    async fn test_no_match() {
        let registry = RouteRegistry::from_configs(&[route_config("api", 0, "/api/**")]);
        assert!(lookup_route(registry.routes(), &parts("/other")).await.is_none());

        let empty = RouteRegistry::new();
        assert!(empty.is_empty());
        assert!(lookup_route(empty.routes(), &parts("/")).await.is_none());
    }

    #[tokio::test]
    async fn test_failing_predicate_does_not_block_others() {
        let registry = RouteRegistry::new();
        let target = Url::parse("http://localhost:9000").unwrap();
        registry.replace(
            vec![
                Route::new("broken", 0, target.clone(), Arc::new(Failing)),
                Route::from_config(&route_config("healthy", 1, "/**"), &WeightGroups::default())
                    .unwrap(),
            ],
            vec![],
        );

        let matched = lookup_route(registry.routes(), &parts("/x")).await.unwrap();
        assert_eq!(matched.id(), "healthy");
    }

    #[tokio::test]
    async fn test_refresh_swaps_and_notifies() {
        let registry = RouteRegistry::from_configs(&[route_config("r1", 0, "/one")]);
        let mut rx = registry.subscribe();

        registry.refresh(&[route_config("r2", 0, "/two")]);

        assert_eq!(rx.recv().await.unwrap(), RefreshRoutesEvent);
        assert!(registry.route("r1").is_none());
        assert!(registry.route("r2").is_some());
        assert!(registry.definition("r2").is_some());
        assert!(registry.definition("r1").is_none());
    }
}
