//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → filter.rs (security_filter middleware)
//!         → logout.rs (logout route? → logout_handler.rs redirect)
//!         → public.rs (public route? → RouteAccess::Public)
//!         → csrf.rs (unsafe method on non-exempt route? → token check)
//!     → Pass to proxy handler
//!
//! Route refresh:
//!     → refresh.rs (clear every matcher and post-logout cache)
//! ```
//!
//! # Design Decisions
//! - Matchers share one lookup/cache skeleton (matcher.rs); only the
//!   per-route rule differs
//! - Decisions are cached by route id until the next route refresh
//! - Fail closed: reject on CSRF failure

pub mod cache;
pub mod csrf;
pub mod filter;
pub mod logout;
pub mod logout_handler;
pub mod matcher;
pub mod public;
pub mod refresh;

pub use filter::{security_filter, RouteAccess, SecurityContext};
pub use matcher::{ExchangeMatcher, GatewayRouteId, MatchResult};
