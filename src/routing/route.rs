//! Compiled gateway routes.
//!
//! # Responsibilities
//! - Compile a route descriptor into an evaluable route
//! - Fold the descriptor's predicates into a single async predicate
//! - Translate the descriptor's filters
//!
//! # Design Decisions
//! - Predicates fold left: `((p1 cond2 p2) cond3 p3) ...`
//! - Untranslatable predicates and filters are logged and skipped, never fatal
//! - A route whose predicates all fail to translate is dropped; matching
//!   everything instead would widen exposure

use std::collections::HashMap;
use std::sync::Arc;

use regex::Regex;
use url::Url;

use crate::config::schema::{PredicateCond, PredicateConfig, PredicateFactory, RouteConfig};
use crate::routing::filter::{to_filter, FilterError, RouteFilter};
use crate::routing::predicate::{
    path_pattern, path_variables, to_route_predicate, Always, And, AsyncPredicate, Or,
};
use crate::routing::weight::WeightGroups;

/// A route as seen by the matching layer.
#[derive(Debug, Clone)]
pub struct Route {
    id: String,
    order: i32,
    uri: Url,
    predicate: Arc<dyn AsyncPredicate>,
    filters: Arc<[RouteFilter]>,
    paths: Arc<[Regex]>,
}

impl Route {
    pub fn new(
        id: impl Into<String>,
        order: i32,
        uri: Url,
        predicate: Arc<dyn AsyncPredicate>,
    ) -> Self {
        Self {
            id: id.into(),
            order,
            uri,
            predicate,
            filters: Arc::from(Vec::new()),
            paths: Arc::from(Vec::new()),
        }
    }

    /// Compile a route descriptor, placing its WEIGHT predicates within
    /// `weights`. Returns `None` if none of its declared predicates could be
    /// translated.
    pub fn from_config(config: &RouteConfig, weights: &WeightGroups) -> Option<Self> {
        let predicate = match config.predicates.as_slice() {
            [] => Arc::new(Always) as Arc<dyn AsyncPredicate>,
            predicates => match combine(&config.key, predicates, weights) {
                Some(p) => p,
                None => {
                    tracing::error!(
                        route_id = %config.key,
                        "No predicate could be translated, skipping route"
                    );
                    return None;
                }
            },
        };

        let mut route = Self::new(
            config.key.clone(),
            config.order,
            config.target.clone(),
            predicate,
        );
        route.filters = translate_filters(config).into();
        route.paths = path_patterns(&config.predicates).into();
        Some(route)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn order(&self) -> i32 {
        self.order
    }

    /// Upstream base URI.
    pub fn uri(&self) -> &Url {
        &self.uri
    }

    pub fn predicate(&self) -> &Arc<dyn AsyncPredicate> {
        &self.predicate
    }

    /// Request and response filters, in declaration order.
    pub fn filters(&self) -> &[RouteFilter] {
        &self.filters
    }

    /// Variables the route's PATH patterns capture from `path`.
    pub fn path_variables(&self, path: &str) -> HashMap<String, String> {
        path_variables(&self.paths, path)
    }
}

fn combine(
    route_id: &str,
    predicates: &[PredicateConfig],
    weights: &WeightGroups,
) -> Option<Arc<dyn AsyncPredicate>> {
    let mut combined: Option<Arc<dyn AsyncPredicate>> = None;

    for config in predicates {
        let next = match to_route_predicate(config, route_id, weights) {
            Ok(p) => p,
            Err(e) => {
                tracing::error!(
                    route_id = %route_id,
                    error = %e,
                    "Could not translate predicate, skipping"
                );
                continue;
            }
        };

        combined = Some(match combined {
            None => next,
            Some(current) => match config.cond {
                PredicateCond::And => Arc::new(And(current, next)),
                PredicateCond::Or => Arc::new(Or(current, next)),
            },
        });
    }

    combined
}

fn translate_filters(config: &RouteConfig) -> Vec<RouteFilter> {
    config
        .filters
        .iter()
        .filter_map(|filter| match to_filter(filter) {
            Ok(f) => Some(f),
            Err(e @ FilterError::Unsupported(_)) => {
                tracing::warn!(route_id = %config.key, error = %e, "Skipping filter");
                None
            }
            Err(e) => {
                tracing::error!(
                    route_id = %config.key,
                    error = %e,
                    "Could not translate filter, skipping"
                );
                None
            }
        })
        .collect()
}

/// Plain (not negated) PATH patterns, the source of SET_PATH variables.
fn path_patterns(predicates: &[PredicateConfig]) -> Vec<Regex> {
    predicates
        .iter()
        .filter(|p| p.factory == PredicateFactory::Path && !p.negate)
        .flat_map(|p| p.args.split(',').map(str::trim).filter(|a| !a.is_empty()))
        .filter_map(|pattern| path_pattern(pattern).ok())
        .collect()
}
