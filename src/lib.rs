//! Secure access gateway: route-aware logout, public-route and CSRF handling
//! in front of proxied upstreams.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod routing;
pub mod security;

pub use config::schema::SraConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
