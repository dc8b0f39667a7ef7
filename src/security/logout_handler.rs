//! Post-logout redirection.
//!
//! # Responsibilities
//! - Compute where to send the browser after a successful logout
//! - Cache per-route overrides until the next route refresh
//!
//! # Design Decisions
//! - The global URI applies unless the matched route carries an override
//! - "No override" is cached too, so it is computed once per refresh
//! - Route lookups hit the in-memory descriptors only; no I/O

use std::sync::Arc;

use axum::body::Body;
use axum::http::header::LOCATION;
use axum::http::request::Parts;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use url::Url;

use crate::routing::RouteSource;
use crate::security::cache::PostLogoutCache;
use crate::security::matcher::GatewayRouteId;
use crate::security::refresh::RefreshListener;

pub struct LogoutSuccessHandler {
    default_post_logout: Url,
    source: Arc<dyn RouteSource>,
    cache: PostLogoutCache,
}

impl LogoutSuccessHandler {
    pub fn new(
        default_post_logout: Url,
        source: Arc<dyn RouteSource>,
        cache: PostLogoutCache,
    ) -> Self {
        Self {
            default_post_logout,
            source,
            cache,
        }
    }

    /// Redirect target for the request, honoring the matched route's override.
    pub fn post_logout(&self, exchange: &Parts) -> Url {
        let Some(route_id) = GatewayRouteId::of(exchange) else {
            return self.default_post_logout.clone();
        };

        let key = route_id.to_string();
        let route_override = match self.cache.get(&key) {
            Some(cached) => cached,
            None => {
                let resolved = self.source.definition(route_id).and_then(|d| d.post_logout.clone());
                self.cache.put(key, resolved.clone());
                resolved
            }
        };

        route_override.unwrap_or_else(|| self.default_post_logout.clone())
    }

    /// `302 Found` to the post-logout URI.
    pub fn on_logout_success(&self, exchange: &Parts) -> Response {
        let location = self.post_logout(exchange);
        tracing::info!(
            route_id = GatewayRouteId::of(exchange).unwrap_or("-"),
            location = %location,
            "Logout succeeded, redirecting"
        );

        match HeaderValue::from_str(location.as_str()) {
            Ok(value) => {
                let mut response = Response::new(Body::empty());
                *response.status_mut() = StatusCode::FOUND;
                response.headers_mut().insert(LOCATION, value);
                response
            }
            Err(e) => {
                tracing::error!(error = %e, "Post-logout URI is not a valid header value");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

impl RefreshListener for LogoutSuccessHandler {
    fn name(&self) -> &'static str {
        "post_logout"
    }

    fn on_refresh(&self) {
        self.cache.clear_all();
    }
}
