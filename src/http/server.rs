//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the security filter and proxy handler
//! - Wire up middleware (tracing, timeout, concurrency limit, request ID)
//! - Apply configuration updates to the route registry
//! - Forward requests to the matched route's target through its filters
//! - Tell upstreams whether the route is public or protected
//! - Observability (metrics, correlation IDs)

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header, HeaderName, HeaderValue, Request, StatusCode, Uri},
    middleware,
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use hyper::body::Incoming;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use url::{Position, Url};

use crate::config::SraConfig;
use crate::observability::metrics;
use crate::routing::filter::{filter_request, filter_response};
use crate::routing::{lookup_route, Forward, Route, RouteRegistry, RouteSource};
use crate::security::filter::{security_filter, RouteAccess, SecurityContext};
use crate::security::matcher::GatewayRouteId;

const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<RouteRegistry>,
    pub client: Client<HttpConnector, Body>,
    /// Header carrying the route's access level upstream.
    pub access_header: Option<HeaderName>,
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
    registry: Arc<RouteRegistry>,
    security: Arc<SecurityContext>,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: SraConfig) -> Self {
        let registry = Arc::new(RouteRegistry::from_configs(&config.routes));
        let security = Arc::new(SecurityContext::new(
            registry.clone(),
            config.security.post_logout_uri.clone(),
            config.security.csrf.clone(),
        ));

        let access_header = config.security.access_header.as_deref();
        let access_header = access_header.filter(|name| !name.is_empty()).and_then(|name| {
            HeaderName::from_bytes(name.as_bytes())
                .inspect_err(|e| {
                    tracing::warn!(header = name, error = %e, "Ignoring access header");
                })
                .ok()
        });

        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        let state = AppState {
            registry: registry.clone(),
            client,
            access_header,
        };

        let router = Self::build_router(&config, state, security.clone());
        Self {
            router,
            registry,
            security,
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &SraConfig, state: AppState, security: Arc<SecurityContext>) -> Router {
        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(middleware::from_fn_with_state(security, security_filter))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(GlobalConcurrencyLimitLayer::new(config.listener.max_connections))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// The fully layered router, for serving or driving in tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn registry(&self) -> &Arc<RouteRegistry> {
        &self.registry
    }

    pub fn security(&self) -> &Arc<SecurityContext> {
        &self.security
    }

    /// Run the server until shutdown, applying route updates as they arrive.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<SraConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, routes = self.registry.len(), "HTTP server starting");

        let refresh = self.security.spawn_refresh_listener(shutdown.resubscribe());

        let registry = self.registry.clone();
        let mut updates_shutdown = shutdown.resubscribe();
        let updates = tokio::spawn(async move {
            loop {
                tokio::select! {
                    update = config_updates.recv() => match update {
                        Some(config) => {
                            registry.refresh(&config.routes);
                            tracing::info!(routes = registry.len(), "Route table refreshed");
                        }
                        None => break,
                    },
                    _ = updates_shutdown.recv() => break,
                }
            }
        });

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        updates.abort();
        let _ = refresh.await;
        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Main proxy handler.
/// Resolves the route, runs its filters and forwards the request to its target.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start_time = Instant::now();
    let (mut parts, body) = request.into_parts();
    let method = parts.method.to_string();

    let route = match resolve_route(&state.registry, &parts).await {
        Some(route) => route,
        None => {
            tracing::warn!(method = %parts.method, path = %parts.uri.path(), "No route matched");
            metrics::record_request(&method, 404, start_time);
            return (StatusCode::NOT_FOUND, "No matching route found").into_response();
        }
    };

    let path_variables = route.path_variables(parts.uri.path());
    let mut forward = Forward::new(&mut parts, path_variables);
    if let Some(mut response) = filter_request(route.filters(), &mut forward) {
        filter_response(route.filters(), &mut response);
        metrics::record_request(&method, response.status().as_u16(), start_time);
        return response;
    }
    let preserve_host = forward.preserve_host;
    let upstream = forward.upstream.take();

    let uri = match upstream {
        Some(url) => url.as_str().parse::<Uri>().map_err(axum::http::Error::from),
        None => upstream_uri(route.uri(), &parts.uri),
    };
    let uri = match uri {
        Ok(uri) => uri,
        Err(e) => {
            tracing::error!(route_id = route.id(), error = %e, "Cannot build upstream URI");
            metrics::record_request(&method, 502, start_time);
            return (StatusCode::BAD_GATEWAY, "Invalid upstream URI").into_response();
        }
    };

    let client_ip = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let access = parts
        .extensions
        .get::<RouteAccess>()
        .copied()
        .unwrap_or(RouteAccess::Protected);

    parts.uri = uri;
    if !preserve_host {
        parts.headers.remove(header::HOST);
    }
    parts.headers.remove(header::CONNECTION);
    if let Some(value) = client_ip.and_then(|ip| HeaderValue::from_str(&ip.to_string()).ok()) {
        parts.headers.append(X_FORWARDED_FOR, value);
    }
    if let Some(name) = &state.access_header {
        // replaces anything the client sent under the same name
        parts
            .headers
            .insert(name.clone(), HeaderValue::from_static(access.as_str()));
    }

    tracing::debug!(
        route_id = route.id(),
        upstream = %parts.uri,
        access = access.as_str(),
        "Proxying request"
    );

    match state.client.request(Request::from_parts(parts, body)).await {
        Ok(response) => {
            let mut response = into_response(response);
            filter_response(route.filters(), &mut response);
            metrics::record_request(&method, response.status().as_u16(), start_time);
            response
        }
        Err(e) => {
            tracing::error!(route_id = route.id(), error = %e, "Upstream error");
            metrics::record_request(&method, 502, start_time);
            (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response()
        }
    }
}

fn into_response(upstream: Response<Incoming>) -> Response {
    let (parts, body) = upstream.into_parts();
    Response::from_parts(parts, Body::new(body))
}

/// Route already matched by the security filter, or a fresh lookup.
async fn resolve_route(
    registry: &RouteRegistry,
    parts: &axum::http::request::Parts,
) -> Option<Arc<Route>> {
    if let Some(route) = GatewayRouteId::of(parts).and_then(|id| registry.route(id)) {
        return Some(route);
    }
    lookup_route(registry.routes(), parts).await
}

/// Scheme and authority of `target`, path and query of the incoming request.
fn upstream_uri(target: &Url, incoming: &Uri) -> Result<Uri, axum::http::Error> {
    let path_and_query = match incoming.query() {
        Some(query) => format!("{}?{}", incoming.path(), query),
        None => incoming.path().to_string(),
    };
    Uri::builder()
        .scheme(target.scheme())
        .authority(&target[Position::BeforeHost..Position::AfterPort])
        .path_and_query(path_and_query)
        .build()
}
