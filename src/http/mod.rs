//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, trace, timeout, concurrency limit)
//!     → security filter (logout redirect, public tagging, CSRF)
//!     → proxy handler (route lookup, forward to target)
//!     → Send to client
//! ```

pub mod server;

pub use server::{AppState, HttpServer};
