//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use url::Url;

/// Root configuration for the secure access gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct SraConfig {
    /// Listener configuration (bind address, connection limit).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Logout and CSRF settings.
    pub security: SecurityConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Route descriptors, in the order the route source provides them.
    pub routes: Vec<RouteConfig>,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum concurrent in-flight requests (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_connections: 10_000,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Logout and CSRF configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Global post-logout redirect, used when the logout route has no override.
    pub post_logout_uri: Url,

    /// Double-submit CSRF token settings.
    pub csrf: CsrfConfig,

    /// Header telling upstreams whether the route is public or protected,
    /// overwriting any client-supplied value. `None` or `""` disables it.
    pub access_header: Option<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            post_logout_uri: default_post_logout_uri(),
            csrf: CsrfConfig::default(),
            access_header: Some("X-Route-Access".to_string()),
        }
    }
}

fn default_post_logout_uri() -> Url {
    Url::parse("http://localhost:8080/").expect("static default URI is valid")
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CsrfConfig {
    /// Cookie carrying the token issued to the browser.
    pub cookie_name: String,

    /// Header the client must echo the token in on unsafe requests.
    pub header_name: String,
}

impl Default for CsrfConfig {
    fn default() -> Self {
        Self {
            cookie_name: "XSRF-TOKEN".to_string(),
            header_name: "X-XSRF-TOKEN".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Compact,
}

/// Whether a route requires an authenticated principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RouteType {
    Public,
    #[default]
    Protected,
}

/// Route descriptor: the policy flags and predicates of one configured route.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Stable route identifier, also used as cache key.
    pub key: String,

    /// Upstream base URI.
    pub target: Url,

    #[serde(default, rename = "type")]
    pub route_type: RouteType,

    /// Whether this route is a logout endpoint.
    #[serde(default)]
    pub logout: bool,

    /// Per-route post-logout redirect, overriding the global one.
    #[serde(default)]
    pub post_logout: Option<Url>,

    /// Whether CSRF protection applies to this route.
    #[serde(default = "default_csrf")]
    pub csrf: bool,

    /// Route priority (lower = checked first).
    #[serde(default)]
    pub order: i32,

    #[serde(default)]
    pub predicates: Vec<PredicateConfig>,

    /// Request and response transformations, applied in declaration order.
    #[serde(default)]
    pub filters: Vec<FilterConfig>,
}

fn default_csrf() -> bool {
    true
}

impl RouteConfig {
    /// A protected, CSRF-checked route with no predicates.
    pub fn new(key: impl Into<String>, target: Url) -> Self {
        Self {
            key: key.into(),
            target,
            route_type: RouteType::default(),
            logout: false,
            post_logout: None,
            csrf: true,
            order: 0,
            predicates: Vec::new(),
            filters: Vec::new(),
        }
    }
}

/// Built-in predicate factories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PredicateFactory {
    After,
    Before,
    Between,
    Cookie,
    Header,
    Host,
    Method,
    Path,
    Query,
    RemoteAddr,
    Weight,
}

/// How a predicate joins the ones declared before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PredicateCond {
    #[default]
    And,
    Or,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PredicateConfig {
    pub factory: PredicateFactory,

    /// Comma separated factory arguments.
    #[serde(default)]
    pub args: String,

    #[serde(default)]
    pub cond: PredicateCond,

    #[serde(default)]
    pub negate: bool,
}

impl PredicateConfig {
    pub fn new(factory: PredicateFactory, args: impl Into<String>) -> Self {
        Self {
            factory,
            args: args.into(),
            cond: PredicateCond::And,
            negate: false,
        }
    }

    pub fn cond(mut self, cond: PredicateCond) -> Self {
        self.cond = cond;
        self
    }

    pub fn negate(mut self) -> Self {
        self.negate = true;
        self
    }
}

/// Route filter factories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FilterFactory {
    AddRequestHeader,
    AddRequestParameter,
    AddResponseHeader,
    DedupeResponseHeader,
    FallbackHeaders,
    MapRequestHeader,
    PrefixPath,
    PreserveHostHeader,
    RedirectTo,
    RemoveRequestHeader,
    RemoveResponseHeader,
    RequestRateLimiter,
    RewritePath,
    RewriteLocation,
    RewriteResponseHeader,
    Retry,
    SaveSession,
    SecureHeaders,
    SetPath,
    SetRequestHeader,
    SetResponseHeader,
    SetStatus,
    StripPrefix,
    RequestHeaderToRequestUri,
    SetRequestSize,
    SetRequestHost,
    LinkRewrite,
    ClientCertsToRequestHeader,
    QueryParamToRequestHeader,
    PrincipalToRequestHeader,
    Custom,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FilterConfig {
    pub factory: FilterFactory,

    /// Comma separated factory arguments.
    #[serde(default)]
    pub args: String,
}

impl FilterConfig {
    pub fn new(factory: FilterFactory, args: impl Into<String>) -> Self {
        Self {
            factory,
            args: args.into(),
        }
    }
}
