//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Drain in-flight requests → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//!     SIGHUP → Trigger config reload
//! ```
//!
//! # Design Decisions
//! - One broadcast channel reaches every long-running task
//! - Reload never interrupts traffic; only the route table is swapped

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
