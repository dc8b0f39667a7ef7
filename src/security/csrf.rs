//! CSRF exemption matching and double-submit tokens.
//!
//! # Responsibilities
//! - Decide whether an unsafe request targets a CSRF-exempt route
//! - Issue and verify double-submit CSRF tokens (cookie + header)
//!
//! # Design Decisions
//! - Safe methods never match, and are rejected before any route lookup
//! - Exempt = route disables CSRF and is not public; the public check reuses
//!   `PublicBehavior` directly, so it never touches the public cache
//! - Unknown routes are not exempt

use async_trait::async_trait;
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue, Method};
use cookie::{Cookie, SameSite};

use crate::config::schema::{CsrfConfig, RouteConfig};
use crate::security::cache::MatcherKind;
use crate::security::matcher::{ExchangeMatcher, MatchResult, RouteBehavior, RouteMatcher};
use crate::security::public::PublicBehavior;
use crate::security::refresh::RefreshListener;

/// GET, HEAD, TRACE and OPTIONS.
pub fn is_safe_method(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::TRACE | Method::OPTIONS)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CsrfBehavior {
    public: PublicBehavior,
}

impl RouteBehavior for CsrfBehavior {
    fn kind(&self) -> MatcherKind {
        MatcherKind::Csrf
    }

    fn route_behavior(&self, definition: Option<&RouteConfig>) -> bool {
        definition.is_some_and(|d| !d.csrf) && !self.public.route_behavior(definition)
    }
}

/// Matches unsafe requests to routes exempt from CSRF protection.
pub struct CsrfRouteMatcher {
    inner: RouteMatcher<CsrfBehavior>,
}

impl CsrfRouteMatcher {
    pub fn new(inner: RouteMatcher<CsrfBehavior>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl ExchangeMatcher for CsrfRouteMatcher {
    async fn matches(&self, exchange: &mut Parts) -> MatchResult {
        if is_safe_method(&exchange.method) {
            return MatchResult::NoMatch;
        }
        self.inner.matches(exchange).await
    }
}

impl RefreshListener for CsrfRouteMatcher {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn on_refresh(&self) {
        self.inner.on_refresh();
    }
}

/// Cookie-backed token repository: the browser echoes the cookie in a header.
#[derive(Debug, Clone)]
pub struct CsrfTokenRepository {
    config: CsrfConfig,
}

impl CsrfTokenRepository {
    pub fn new(config: CsrfConfig) -> Self {
        Self { config }
    }

    /// Token currently held by the client, from its cookie.
    pub fn load(&self, headers: &HeaderMap) -> Option<String> {
        headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| Cookie::split_parse(v))
            .filter_map(Result::ok)
            .find(|c| c.name() == self.config.cookie_name && !c.value().is_empty())
            .map(|c| c.value().to_string())
    }

    /// Whether the request echoes its cookie token in the CSRF header.
    pub fn verify(&self, headers: &HeaderMap) -> bool {
        let Some(expected) = self.load(headers) else {
            return false;
        };
        headers
            .get(self.config.header_name.as_str())
            .and_then(|v| v.to_str().ok())
            .is_some_and(|actual| constant_time_eq(actual.as_bytes(), expected.as_bytes()))
    }

    pub fn generate(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }

    /// Attach a fresh token cookie to `headers`.
    pub fn save(&self, headers: &mut HeaderMap, token: &str) {
        let cookie = Cookie::build((self.config.cookie_name.clone(), token.to_string()))
            .path("/")
            .same_site(SameSite::Lax)
            .build();
        match HeaderValue::from_str(&cookie.to_string()) {
            Ok(value) => {
                headers.append(SET_COOKIE, value);
            }
            Err(e) => tracing::warn!(error = %e, "Could not encode CSRF cookie"),
        }
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
