//! Logout route detection.

use crate::config::schema::RouteConfig;
use crate::security::cache::MatcherKind;
use crate::security::matcher::{RouteBehavior, RouteMatcher};

/// A route is a logout endpoint only if explicitly flagged.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogoutBehavior;

impl RouteBehavior for LogoutBehavior {
    fn kind(&self) -> MatcherKind {
        MatcherKind::Logout
    }

    fn route_behavior(&self, definition: Option<&RouteConfig>) -> bool {
        definition.is_some_and(|d| d.logout)
    }
}

pub type LogoutRouteMatcher = RouteMatcher<LogoutBehavior>;
