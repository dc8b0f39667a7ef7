//! Weighted route groups.
//!
//! Routes declaring `WEIGHT(group, weight)` split the traffic of their group:
//! each request lands in exactly one member, with probability proportional
//! to its weight. The draw is derived from the request id, so every lookup
//! made for the same request agrees on the member.

use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};

use axum::http::request::Parts;

use crate::config::schema::{PredicateFactory, RouteConfig};

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Parse `group, weight`. An unparsable weight counts as zero.
pub fn parse_weight(args: &str) -> Option<(String, u32)> {
    let (group, weight) = args.split_once(',')?;
    let group = group.trim();
    if group.is_empty() {
        return None;
    }
    let weight = weight.trim().parse::<u32>().unwrap_or_else(|e| {
        tracing::error!(args = %args, error = %e, "Unexpected weight value, using 0");
        0
    });
    Some((group.to_string(), weight))
}

/// Share of the unit interval owned by one group member.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightShare {
    pub group: String,
    pub lower: f64,
    pub upper: f64,
}

impl WeightShare {
    /// The whole interval: a member alone in its group.
    pub fn whole(group: impl Into<String>, weight: u32) -> Self {
        Self {
            group: group.into(),
            lower: 0.0,
            upper: if weight == 0 { 0.0 } else { 1.0 },
        }
    }

    pub fn contains(&self, draw: f64) -> bool {
        draw >= self.lower && draw < self.upper
    }
}

/// Members of every weight group in a route table, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct WeightGroups {
    groups: HashMap<String, Vec<(String, u32)>>,
}

impl WeightGroups {
    pub fn from_configs(configs: &[RouteConfig]) -> Self {
        let mut groups: HashMap<String, Vec<(String, u32)>> = HashMap::new();
        for config in configs {
            let weights = config
                .predicates
                .iter()
                .filter(|p| p.factory == PredicateFactory::Weight)
                .filter_map(|p| parse_weight(&p.args));
            for (group, weight) in weights {
                groups.entry(group).or_default().push((config.key.clone(), weight));
            }
        }
        Self { groups }
    }

    /// Interval owned by route `key` within `group`, if it is a member.
    pub fn share(&self, group: &str, key: &str) -> Option<WeightShare> {
        let members = self.groups.get(group)?;
        let total: u64 = members.iter().map(|(_, w)| u64::from(*w)).sum();
        if total == 0 {
            return Some(WeightShare::whole(group, 0));
        }

        let mut lower = 0u64;
        for (member, weight) in members {
            let upper = lower + u64::from(*weight);
            if member == key {
                return Some(WeightShare {
                    group: group.to_string(),
                    lower: lower as f64 / total as f64,
                    upper: upper as f64 / total as f64,
                });
            }
            lower = upper;
        }
        None
    }
}

/// Uniform draw in `[0, 1)` for this request and group.
pub fn request_draw(exchange: &Parts, group: &str) -> Option<f64> {
    let id = exchange.headers.get(REQUEST_ID_HEADER)?.as_bytes();
    let mut hasher = DefaultHasher::new();
    id.hash(&mut hasher);
    group.hash(&mut hasher);
    Some((hasher.finish() >> 11) as f64 / (1u64 << 53) as f64)
}
