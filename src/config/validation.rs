//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Reject duplicate or blank route keys
//! - Check that every predicate and filter translates and every target is proxyable
//! - Validate value ranges (timeouts > 0, addresses parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: SraConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use axum::http::HeaderName;
use thiserror::Error;

use crate::config::schema::SraConfig;
use crate::routing::filter::{to_filter, FilterError};
use crate::routing::predicate::{to_predicate, PredicateError};

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("route #{index} has a blank key")]
    BlankRouteKey { index: usize },

    #[error("route key '{0}' is declared more than once")]
    DuplicateRouteKey(String),

    #[error("route '{key}': target '{target}' must use the http scheme")]
    UnsupportedTarget { key: String, target: String },

    #[error("route '{key}': {source}")]
    InvalidPredicate {
        key: String,
        #[source]
        source: PredicateError,
    },

    #[error("route '{key}': {source}")]
    InvalidFilter {
        key: String,
        #[source]
        source: FilterError,
    },

    #[error("{field}: '{value}' is not a socket address")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{field}: '{value}' is not a valid header name")]
    InvalidHeaderName { field: &'static str, value: String },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

pub fn validate_config(config: &SraConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::Zero("listener.max_connections"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::Zero("timeouts.request_secs"));
    }
    if let Some(name) = &config.security.access_header {
        if !name.is_empty() && HeaderName::from_bytes(name.as_bytes()).is_err() {
            errors.push(ValidationError::InvalidHeaderName {
                field: "security.access_header",
                value: name.clone(),
            });
        }
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }

    let mut keys = HashSet::new();
    for (index, route) in config.routes.iter().enumerate() {
        if route.key.trim().is_empty() {
            errors.push(ValidationError::BlankRouteKey { index });
        } else if !keys.insert(route.key.as_str()) {
            errors.push(ValidationError::DuplicateRouteKey(route.key.clone()));
        }

        if route.target.scheme() != "http" || route.target.host_str().is_none() {
            errors.push(ValidationError::UnsupportedTarget {
                key: route.key.clone(),
                target: route.target.to_string(),
            });
        }

        for predicate in &route.predicates {
            if let Err(source) = to_predicate(predicate) {
                errors.push(ValidationError::InvalidPredicate {
                    key: route.key.clone(),
                    source,
                });
            }
        }

        // unsupported factories are skipped at route build, not rejected
        for filter in &route.filters {
            match to_filter(filter) {
                Ok(_) | Err(FilterError::Unsupported(_)) => {}
                Err(source) => errors.push(ValidationError::InvalidFilter {
                    key: route.key.clone(),
                    source,
                }),
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
