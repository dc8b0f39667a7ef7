//! Security web filter.
//!
//! # Responsibilities
//! - Wire the matchers, their caches and the logout handler together
//! - Answer logout requests with the post-logout redirect
//! - Tag every request with the access level of its route
//! - Enforce double-submit CSRF tokens on unsafe requests to non-exempt routes
//!
//! # Design Decisions
//! - Order: logout, public, CSRF; each matcher re-resolves the route so it
//!   only ever sees its own cache namespace
//! - Safe requests are never CSRF-checked; they receive a token cookie if
//!   they lack one
//! - Fail closed: missing or mismatching tokens are rejected with 403

use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use url::Url;

use crate::config::schema::CsrfConfig;
use crate::routing::RouteRegistry;
use crate::security::cache::{post_logout_cache, MatcherKind, RouteBehaviorCache};
use crate::security::csrf::{
    is_safe_method, CsrfBehavior, CsrfRouteMatcher, CsrfTokenRepository,
};
use crate::security::logout::{LogoutBehavior, LogoutRouteMatcher};
use crate::security::logout_handler::LogoutSuccessHandler;
use crate::security::matcher::{ExchangeMatcher, RouteMatcher};
use crate::security::public::{PublicBehavior, PublicRouteMatcher};
use crate::security::refresh::{spawn_refresh_listener, RefreshListener};

/// Access level of the route serving a request, set by the security filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteAccess {
    Public,
    Protected,
}

impl RouteAccess {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Protected => "protected",
        }
    }
}

/// Matchers and handlers shared by every request.
pub struct SecurityContext {
    registry: Arc<RouteRegistry>,
    logout: Arc<LogoutRouteMatcher>,
    public: Arc<PublicRouteMatcher>,
    csrf: Arc<CsrfRouteMatcher>,
    logout_success: Arc<LogoutSuccessHandler>,
    tokens: CsrfTokenRepository,
}

impl SecurityContext {
    pub fn new(registry: Arc<RouteRegistry>, post_logout_uri: Url, csrf: CsrfConfig) -> Self {
        let behaviors = RouteBehaviorCache::new();

        let logout = RouteMatcher::new(
            registry.clone(),
            LogoutBehavior,
            behaviors.namespace(MatcherKind::Logout),
        );
        let public = RouteMatcher::new(
            registry.clone(),
            PublicBehavior,
            behaviors.namespace(MatcherKind::Public),
        );
        let csrf_matcher = CsrfRouteMatcher::new(RouteMatcher::new(
            registry.clone(),
            CsrfBehavior::default(),
            behaviors.namespace(MatcherKind::Csrf),
        ));
        let logout_success =
            LogoutSuccessHandler::new(post_logout_uri, registry.clone(), post_logout_cache());

        Self {
            registry,
            logout: Arc::new(logout),
            public: Arc::new(public),
            csrf: Arc::new(csrf_matcher),
            logout_success: Arc::new(logout_success),
            tokens: CsrfTokenRepository::new(csrf),
        }
    }

    pub fn registry(&self) -> &Arc<RouteRegistry> {
        &self.registry
    }

    /// Everything to clear when the route table changes.
    pub fn refresh_listeners(&self) -> Vec<Arc<dyn RefreshListener>> {
        vec![
            self.logout.clone() as Arc<dyn RefreshListener>,
            self.public.clone() as Arc<dyn RefreshListener>,
            self.csrf.clone() as Arc<dyn RefreshListener>,
            self.logout_success.clone() as Arc<dyn RefreshListener>,
        ]
    }

    /// Start clearing caches on every refresh of the registry.
    pub fn spawn_refresh_listener(&self, shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        spawn_refresh_listener(self.registry.subscribe(), self.refresh_listeners(), shutdown)
    }
}

/// Axum middleware applying logout, public-route and CSRF handling.
pub async fn security_filter(
    State(security): State<Arc<SecurityContext>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let (mut parts, body) = request.into_parts();

    if security.logout.matches(&mut parts).await.is_match() {
        return security.logout_success.on_logout_success(&parts);
    }

    let access = if security.public.matches(&mut parts).await.is_match() {
        RouteAccess::Public
    } else {
        RouteAccess::Protected
    };
    parts.extensions.insert(access);

    let safe = is_safe_method(&parts.method);
    let exempt = security.csrf.matches(&mut parts).await.is_match();
    if !safe && !exempt && !security.tokens.verify(&parts.headers) {
        tracing::warn!(
            method = %parts.method,
            path = %parts.uri.path(),
            "An expected CSRF token cannot be found"
        );
        return (StatusCode::FORBIDDEN, "An expected CSRF token cannot be found").into_response();
    }

    let issue_token = safe && security.tokens.load(&parts.headers).is_none();
    let mut response = next.run(Request::from_parts(parts, body)).await;
    if issue_token {
        let token = security.tokens.generate();
        security.tokens.save(response.headers_mut(), &token);
    }
    response
}
