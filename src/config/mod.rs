//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → SraConfig (validated, immutable)
//!
//! On file change or SIGHUP:
//!     watcher.rs reloads and validates
//!     → new SraConfig sent to the server
//!     → route registry refreshed, caches cleared
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - An invalid reload is logged and discarded

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{PredicateConfig, RouteConfig, SraConfig};
pub use validation::ValidationError;
pub use watcher::ConfigWatcher;
