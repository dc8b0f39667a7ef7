//! Route-aware request matching with cached per-route decisions.
//!
//! # Responsibilities
//! - Resolve the route serving a request (first match wins)
//! - Record the matched route id on the request for downstream consumers
//! - Turn the route's descriptor into a boolean decision, once per refresh
//!
//! # Design Decisions
//! - Behaviors are pure functions of the route descriptor; matchers add the
//!   lookup and the cache around them
//! - Each matcher owns one cache namespace, injected at construction
//! - No matched route means no match, whatever the behavior
//! - A missing descriptor is handed to the behavior as `None`; behaviors
//!   must answer the restrictive way

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::request::Parts;

use crate::config::schema::RouteConfig;
use crate::observability::metrics;
use crate::routing::{lookup_route, RouteSource};
use crate::security::cache::{BehaviorCache, MatcherKind};
use crate::security::refresh::RefreshListener;

/// Outcome of a matcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchResult {
    Match,
    NoMatch,
}

impl MatchResult {
    pub fn is_match(&self) -> bool {
        matches!(self, MatchResult::Match)
    }
}

impl From<bool> for MatchResult {
    fn from(matched: bool) -> Self {
        if matched {
            MatchResult::Match
        } else {
            MatchResult::NoMatch
        }
    }
}

/// Request extension holding the id of the route matched for this request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayRouteId(pub String);

impl GatewayRouteId {
    /// The matched route id, if present and not blank.
    pub fn of(exchange: &Parts) -> Option<&str> {
        exchange
            .extensions
            .get::<GatewayRouteId>()
            .map(|id| id.0.as_str())
            .filter(|id| !id.trim().is_empty())
    }
}

#[async_trait]
pub trait ExchangeMatcher: Send + Sync {
    async fn matches(&self, exchange: &mut Parts) -> MatchResult;
}

/// Per-route decision of a concrete matcher.
pub trait RouteBehavior: Send + Sync {
    fn kind(&self) -> MatcherKind;

    fn route_behavior(&self, definition: Option<&RouteConfig>) -> bool;
}

/// Matches requests whose route satisfies `B`, caching `B`'s decision by route id.
pub struct RouteMatcher<B> {
    source: Arc<dyn RouteSource>,
    behavior: B,
    cache: BehaviorCache,
}

impl<B: RouteBehavior> RouteMatcher<B> {
    pub fn new(source: Arc<dyn RouteSource>, behavior: B, cache: BehaviorCache) -> Self {
        Self { source, behavior, cache }
    }

    pub fn behavior(&self) -> &B {
        &self.behavior
    }

    fn resolve(&self, route_id: &str) -> bool {
        let kind = self.behavior.kind().as_str();
        let key = route_id.to_string();

        if let Some(decision) = self.cache.get(&key) {
            metrics::record_cache_lookup(kind, true);
            return decision;
        }

        metrics::record_cache_lookup(kind, false);
        let definition = self.source.definition(route_id);
        let decision = self.behavior.route_behavior(definition.as_deref());
        tracing::debug!(matcher = kind, route_id, decision, "Route behavior computed");
        self.cache.put(key, decision);
        decision
    }
}

#[async_trait]
impl<B: RouteBehavior> ExchangeMatcher for RouteMatcher<B> {
    async fn matches(&self, exchange: &mut Parts) -> MatchResult {
        let kind = self.behavior.kind().as_str();

        let Some(route) = lookup_route(self.source.routes(), exchange).await else {
            metrics::record_route_match(kind, false);
            return MatchResult::NoMatch;
        };

        exchange.extensions.insert(GatewayRouteId(route.id().to_string()));

        let result = MatchResult::from(self.resolve(route.id()));
        metrics::record_route_match(kind, result.is_match());
        result
    }
}

impl<B: RouteBehavior> RefreshListener for RouteMatcher<B> {
    fn name(&self) -> &'static str {
        self.behavior.kind().as_str()
    }

    fn on_refresh(&self) {
        self.cache.clear_all();
    }
}
