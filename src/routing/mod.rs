//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Route Compilation (startup and every refresh):
//!     RouteConfig[]
//!     → weight.rs (collect weight groups across the table)
//!     → route.rs (translate predicates and filters, fold AND/OR)
//!     → locator.rs (sort by order, swap snapshot, broadcast refresh)
//!
//! Incoming Request (method, host, path, headers, remote address)
//!     → locator.rs (evaluate route predicates in order)
//!     → predicate.rs (async predicate evaluation)
//!     → Return: first matched Route or None
//!
//! Proxying (http/server.rs):
//!     → filter.rs (request filters, upstream call, response filters)
//! ```
//!
//! # Design Decisions
//! - Route tables are immutable snapshots, replaced wholesale on refresh
//! - First match wins (ordered by `order`)
//! - Predicate errors disqualify one route, never the whole lookup

pub mod filter;
pub mod locator;
pub mod predicate;
pub mod route;
pub mod weight;

pub use filter::{FilterError, Forward, RouteFilter};
pub use locator::{lookup_route, RefreshRoutesEvent, RouteRegistry, RouteSource};
pub use predicate::{AsyncPredicate, PredicateError};
pub use route::Route;
