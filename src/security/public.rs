//! Public route classification.

use crate::config::schema::{RouteConfig, RouteType};
use crate::security::cache::MatcherKind;
use crate::security::matcher::{RouteBehavior, RouteMatcher};

/// A route is public only if its descriptor says so.
#[derive(Debug, Clone, Copy, Default)]
pub struct PublicBehavior;

impl RouteBehavior for PublicBehavior {
    fn kind(&self) -> MatcherKind {
        MatcherKind::Public
    }

    fn route_behavior(&self, definition: Option<&RouteConfig>) -> bool {
        definition.is_some_and(|d| d.route_type == RouteType::Public)
    }
}

pub type PublicRouteMatcher = RouteMatcher<PublicBehavior>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::matcher::tests::route;

    #[test]
    fn test_public_behavior() {
        let mut public = route("p", "/**");
        public.route_type = RouteType::Public;

        assert!(PublicBehavior.route_behavior(Some(&public)));
        assert!(!PublicBehavior.route_behavior(Some(&route("r", "/**"))));
        assert!(!PublicBehavior.route_behavior(None));
    }
}
