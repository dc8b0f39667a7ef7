//! Route predicates.
//!
//! # Responsibilities
//! - Translate predicate descriptors into evaluable predicates
//! - Evaluate a predicate against the request head asynchronously
//! - Compose predicates (AND / OR / negation)
//!
//! # Design Decisions
//! - Predicates see only the request head (`Parts`), never the body
//! - Regexes are anchored: a pattern has to match the whole value
//! - Host matching is case-insensitive, path matching is case-sensitive
//! - A predicate that cannot decide (e.g. no remote address) returns an
//!   error; callers decide how to treat it

use std::collections::HashMap;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::ConnectInfo;
use axum::http::header::{COOKIE, HOST};
use axum::http::request::Parts;
use axum::http::{HeaderName, Method};
use chrono::{DateTime, Utc};
use cookie::Cookie;
use regex::Regex;
use thiserror::Error;

use crate::config::schema::{PredicateConfig, PredicateFactory};
use crate::routing::weight::{parse_weight, request_draw, WeightGroups, WeightShare};

/// Errors raised while translating or evaluating a predicate.
#[derive(Debug, Error)]
pub enum PredicateError {
    #[error("invalid {factory:?} arguments '{args}': {reason}")]
    InvalidArgs {
        factory: PredicateFactory,
        args: String,
        reason: String,
    },

    #[error("remote address not available on the request")]
    MissingRemoteAddress,

    #[error("request id not available for weight group '{0}'")]
    MissingRequestId(String),
}

fn invalid(factory: PredicateFactory, args: &str, reason: impl fmt::Display) -> PredicateError {
    PredicateError::InvalidArgs {
        factory,
        args: args.to_string(),
        reason: reason.to_string(),
    }
}

/// Asynchronous test of a request against a route condition.
#[async_trait]
pub trait AsyncPredicate: Send + Sync + fmt::Debug {
    async fn test(&self, exchange: &Parts) -> Result<bool, PredicateError>;
}

/// Matches every request. Used for routes declaring no predicates.
#[derive(Debug, Clone, Copy)]
pub struct Always;

#[async_trait]
impl AsyncPredicate for Always {
    async fn test(&self, _exchange: &Parts) -> Result<bool, PredicateError> {
        Ok(true)
    }
}

/// Both sides must match; the right side is not evaluated if the left fails.
#[derive(Debug)]
pub struct And(pub Arc<dyn AsyncPredicate>, pub Arc<dyn AsyncPredicate>);

#[async_trait]
impl AsyncPredicate for And {
    async fn test(&self, exchange: &Parts) -> Result<bool, PredicateError> {
        if !self.0.test(exchange).await? {
            return Ok(false);
        }
        self.1.test(exchange).await
    }
}

/// Either side must match; the right side is not evaluated if the left matches.
#[derive(Debug)]
pub struct Or(pub Arc<dyn AsyncPredicate>, pub Arc<dyn AsyncPredicate>);

#[async_trait]
impl AsyncPredicate for Or {
    async fn test(&self, exchange: &Parts) -> Result<bool, PredicateError> {
        if self.0.test(exchange).await? {
            return Ok(true);
        }
        self.1.test(exchange).await
    }
}

#[derive(Debug)]
pub struct Negate(pub Arc<dyn AsyncPredicate>);

#[async_trait]
impl AsyncPredicate for Negate {
    async fn test(&self, exchange: &Parts) -> Result<bool, PredicateError> {
        Ok(!self.0.test(exchange).await?)
    }
}

/// An IP network a remote address may belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressSource {
    network: IpAddr,
    prefix: u8,
}

impl AddressSource {
    /// Parse `ip`, `ip/prefix` or `localhost` (which expands to both loopbacks).
    pub fn parse(raw: &str) -> Result<Vec<Self>, String> {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case("localhost") {
            return Ok(vec![
                Self {
                    network: IpAddr::V4(Ipv4Addr::LOCALHOST),
                    prefix: 8,
                },
                Self {
                    network: IpAddr::V6(Ipv6Addr::LOCALHOST),
                    prefix: 128,
                },
            ]);
        }

        let (ip, prefix) = match raw.split_once('/') {
            Some((ip, prefix)) => (ip, Some(prefix)),
            None => (raw, None),
        };
        let network: IpAddr = ip.parse().map_err(|e| format!("'{ip}': {e}"))?;
        let max = if network.is_ipv4() { 32 } else { 128 };
        let prefix = match prefix {
            Some(p) => p.parse::<u8>().map_err(|e| format!("'{p}': {e}"))?,
            None => max,
        };
        if prefix > max {
            return Err(format!("prefix /{prefix} exceeds {max} bits"));
        }
        Ok(vec![Self { network, prefix }])
    }

    pub fn contains(&self, ip: IpAddr) -> bool {
        match (self.network, ip.to_canonical()) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                let mask = if self.prefix == 0 { 0 } else { u32::MAX << (32 - self.prefix) };
                u32::from(net) & mask == u32::from(ip) & mask
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                let mask = if self.prefix == 0 { 0 } else { u128::MAX << (128 - self.prefix) };
                u128::from(net) & mask == u128::from(ip) & mask
            }
            _ => false,
        }
    }
}

/// The predicate kinds a route descriptor can declare.
#[derive(Debug)]
pub enum BuiltinPredicate {
    After(DateTime<Utc>),
    Before(DateTime<Utc>),
    Between(DateTime<Utc>, DateTime<Utc>),
    Cookie { name: String, regex: Regex },
    Header { name: HeaderName, regex: Option<Regex> },
    Host(Vec<Regex>),
    Method(Vec<Method>),
    Path(Vec<Regex>),
    Query { param: String, regex: Option<Regex> },
    RemoteAddr(Vec<AddressSource>),
    Weight(WeightShare),
}

impl BuiltinPredicate {
    pub fn from_config(config: &PredicateConfig) -> Result<Self, PredicateError> {
        let factory = config.factory;
        let raw = config.args.as_str();
        let args: Vec<&str> = raw.split(',').map(str::trim).collect();
        let arg = |i: usize| {
            args.get(i)
                .copied()
                .filter(|a| !a.is_empty())
                .ok_or_else(|| invalid(factory, raw, format!("missing argument #{}", i + 1)))
        };
        let regex = |pattern: &str| {
            Regex::new(&format!("^(?:{pattern})$")).map_err(|e| invalid(factory, raw, e))
        };

        let predicate = match factory {
            PredicateFactory::After => Self::After(parse_datetime(factory, arg(0)?)?),
            PredicateFactory::Before => Self::Before(parse_datetime(factory, arg(0)?)?),
            PredicateFactory::Between => {
                let start = parse_datetime(factory, arg(0)?)?;
                let end = parse_datetime(factory, arg(1)?)?;
                if start >= end {
                    return Err(invalid(factory, raw, "first datetime must precede the second"));
                }
                Self::Between(start, end)
            }
            PredicateFactory::Cookie => Self::Cookie {
                name: arg(0)?.to_string(),
                regex: regex(arg(1)?)?,
            },
            PredicateFactory::Header => Self::Header {
                name: HeaderName::from_bytes(arg(0)?.as_bytes())
                    .map_err(|e| invalid(factory, raw, e))?,
                regex: arg(1).ok().map(regex).transpose()?,
            },
            PredicateFactory::Host => Self::Host(
                args.iter()
                    .filter(|a| !a.is_empty())
                    .map(|p| host_pattern(p).map_err(|e| invalid(factory, raw, e)))
                    .collect::<Result<_, _>>()?,
            ),
            PredicateFactory::Method => Self::Method(
                args.iter()
                    .filter(|a| !a.is_empty())
                    .map(|m| {
                        Method::from_bytes(m.to_ascii_uppercase().as_bytes())
                            .map_err(|e| invalid(factory, raw, e))
                    })
                    .collect::<Result<_, _>>()?,
            ),
            PredicateFactory::Path => Self::Path(
                args.iter()
                    .filter(|a| !a.is_empty())
                    .map(|p| path_pattern(p).map_err(|e| invalid(factory, raw, e)))
                    .collect::<Result<_, _>>()?,
            ),
            PredicateFactory::Query => Self::Query {
                param: arg(0)?.to_string(),
                regex: arg(1).ok().map(regex).transpose()?,
            },
            PredicateFactory::RemoteAddr => {
                let mut sources = Vec::new();
                for source in args.iter().filter(|a| !a.is_empty()) {
                    let parsed =
                        AddressSource::parse(source).map_err(|e| invalid(factory, raw, e))?;
                    sources.extend(parsed);
                }
                Self::RemoteAddr(sources)
            }
            PredicateFactory::Weight => {
                let (group, weight) = parse_weight(raw)
                    .ok_or_else(|| invalid(factory, raw, "expected 'group, weight'"))?;
                Self::Weight(WeightShare::whole(group, weight))
            }
        };

        let empty = match &predicate {
            Self::Host(v) | Self::Path(v) => v.is_empty(),
            Self::Method(v) => v.is_empty(),
            Self::RemoteAddr(v) => v.is_empty(),
            _ => false,
        };
        if empty {
            return Err(invalid(factory, raw, "at least one value is required"));
        }
        Ok(predicate)
    }

    fn evaluate(&self, exchange: &Parts) -> Result<bool, PredicateError> {
        let matched = match self {
            Self::After(at) => Utc::now() > *at,
            Self::Before(at) => Utc::now() < *at,
            Self::Between(start, end) => {
                let now = Utc::now();
                now > *start && now < *end
            }
            Self::Cookie { name, regex } => exchange
                .headers
                .get_all(COOKIE)
                .iter()
                .filter_map(|v| v.to_str().ok())
                .flat_map(|v| Cookie::split_parse(v))
                .filter_map(Result::ok)
                .any(|c| c.name() == name && regex.is_match(c.value())),
            Self::Header { name, regex: None } => exchange.headers.contains_key(name),
            Self::Header { name, regex: Some(regex) } => exchange
                .headers
                .get_all(name)
                .iter()
                .filter_map(|v| v.to_str().ok())
                .any(|v| regex.is_match(v)),
            Self::Host(patterns) => request_host(exchange)
                .map(|host| patterns.iter().any(|p| p.is_match(host)))
                .unwrap_or(false),
            Self::Method(methods) => methods.contains(&exchange.method),
            Self::Path(patterns) => {
                let path = exchange.uri.path();
                patterns.iter().any(|p| p.is_match(path))
            }
            Self::Query { param, regex } => match exchange.uri.query() {
                Some(query) => url::form_urlencoded::parse(query.as_bytes()).any(|(k, v)| {
                    k == param.as_str() && regex.as_ref().map_or(true, |r| r.is_match(&v))
                }),
                None => false,
            },
            Self::RemoteAddr(sources) => {
                let ip = exchange
                    .extensions
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| addr.ip())
                    .ok_or(PredicateError::MissingRemoteAddress)?;
                sources.iter().any(|s| s.contains(ip))
            }
            Self::Weight(share) => {
                let draw = request_draw(exchange, &share.group)
                    .ok_or_else(|| PredicateError::MissingRequestId(share.group.clone()))?;
                share.contains(draw)
            }
        };
        Ok(matched)
    }
}

#[async_trait]
impl AsyncPredicate for BuiltinPredicate {
    async fn test(&self, exchange: &Parts) -> Result<bool, PredicateError> {
        self.evaluate(exchange)
    }
}

/// Translate one predicate descriptor, applying its negation flag.
pub fn to_predicate(config: &PredicateConfig) -> Result<Arc<dyn AsyncPredicate>, PredicateError> {
    to_route_predicate(config, "", &WeightGroups::default())
}

/// Like [`to_predicate`], placing WEIGHT predicates of route `key` within
/// the groups of the whole route table.
pub fn to_route_predicate(
    config: &PredicateConfig,
    key: &str,
    weights: &WeightGroups,
) -> Result<Arc<dyn AsyncPredicate>, PredicateError> {
    let mut builtin = BuiltinPredicate::from_config(config)?;
    if let BuiltinPredicate::Weight(share) = &mut builtin {
        if let Some(placed) = weights.share(&share.group, key) {
            *share = placed;
        }
    }

    let predicate: Arc<dyn AsyncPredicate> = Arc::new(builtin);
    Ok(if config.negate {
        Arc::new(Negate(predicate))
    } else {
        predicate
    })
}

fn parse_datetime(factory: PredicateFactory, raw: &str) -> Result<DateTime<Utc>, PredicateError> {
    // zone ids such as "[Europe/Rome]" carry no extra information over the offset
    let value = raw.split('[').next().unwrap_or(raw).trim();
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| invalid(factory, raw, e))
}

fn request_host(exchange: &Parts) -> Option<&str> {
    exchange.uri.host().or_else(|| {
        exchange
            .headers
            .get(HOST)
            .and_then(|h| h.to_str().ok())
            .map(strip_port)
    })
}

fn strip_port(host: &str) -> &str {
    if let Some(rest) = host.strip_prefix('[') {
        return rest.split(']').next().unwrap_or(rest);
    }
    match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    }
}

/// Ant-style host pattern: `*` within a label, `**` across labels, `{var}` one label.
fn host_pattern(pattern: &str) -> Result<Regex, String> {
    let mut re = String::from("(?i)^");
    let mut chars = pattern.trim().chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                re.push_str(".*");
            }
            '*' => re.push_str("[^.]*"),
            '?' => re.push_str("[^.]"),
            '{' => {
                let mut depth = 1;
                for c in chars.by_ref() {
                    match c {
                        '{' => depth += 1,
                        '}' => depth -= 1,
                        _ => {}
                    }
                    if depth == 0 {
                        break;
                    }
                }
                if depth != 0 {
                    return Err(format!("unclosed variable in '{pattern}'"));
                }
                re.push_str("[^.]+");
            }
            c => re.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
        }
    }
    re.push('$');
    Regex::new(&re).map_err(|e| e.to_string())
}

/// Path pattern: `*`/`?` within a segment, `{var}` or `{var:regex}` one segment,
/// trailing `**` or `{*var}` any remainder (including none).
///
/// Variables become named capture groups, see [`path_variables`].
pub fn path_pattern(pattern: &str) -> Result<Regex, String> {
    let Some(rest) = pattern.trim().strip_prefix('/') else {
        return Err(format!("'{pattern}' must start with '/'"));
    };

    let segments: Vec<&str> = rest.split('/').collect();
    let mut re = String::from("^");
    for (i, segment) in segments.iter().enumerate() {
        let capture_rest =
            *segment == "**" || (segment.starts_with("{*") && segment.ends_with('}'));
        if capture_rest {
            if i + 1 != segments.len() {
                return Err(format!("'{segment}' is only allowed at the end of '{pattern}'"));
            }
            match segment.strip_prefix("{*").and_then(|s| s.strip_suffix('}')) {
                Some(name) if is_group_name(name) => {
                    re.push_str(&format!("(?P<{name}>/.*)?"));
                }
                _ => re.push_str("(?:/.*)?"),
            }
        } else {
            re.push('/');
            push_path_segment(&mut re, segment)?;
        }
    }
    re.push('$');
    Regex::new(&re).map_err(|e| e.to_string())
}

fn push_path_segment(re: &mut String, segment: &str) -> Result<(), String> {
    let mut chars = segment.chars();
    while let Some(c) = chars.next() {
        match c {
            '*' => re.push_str("[^/]*"),
            '?' => re.push_str("[^/]"),
            '{' => {
                // constraints may hold their own braces, e.g. `{id:\d{3}}`
                let mut variable = String::new();
                let mut depth = 1;
                for c in chars.by_ref() {
                    match c {
                        '{' => depth += 1,
                        '}' => depth -= 1,
                        _ => {}
                    }
                    if depth == 0 {
                        break;
                    }
                    variable.push(c);
                }
                if depth != 0 {
                    return Err(format!("unclosed variable in '{segment}'"));
                }
                let (name, constraint) = match variable.split_once(':') {
                    Some((name, constraint)) => (name, constraint),
                    None => (variable.as_str(), "[^/]+"),
                };
                if is_group_name(name) {
                    re.push_str(&format!("(?P<{name}>{constraint})"));
                } else {
                    re.push_str(&format!("(?:{constraint})"));
                }
            }
            c => re.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
        }
    }
    Ok(())
}

fn is_group_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Variables captured by the first of `patterns` matching `path`.
pub fn path_variables(patterns: &[Regex], path: &str) -> HashMap<String, String> {
    let Some((pattern, captures)) = patterns
        .iter()
        .find_map(|p| p.captures(path).map(|c| (p, c)))
    else {
        return HashMap::new();
    };

    pattern
        .capture_names()
        .flatten()
        .filter_map(|name| {
            let value = captures.name(name)?.as_str();
            let value = value.strip_prefix('/').unwrap_or(value);
            Some((name.to_string(), value.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn exchange(builder: axum::http::request::Builder) -> Parts {
        builder.body(()).unwrap().into_parts().0
    }

    fn predicate(factory: PredicateFactory, args: &str) -> Arc<dyn AsyncPredicate> {
        to_predicate(&PredicateConfig::new(factory, args)).unwrap()
    }

    #[derive(Debug, Default)]
    struct Counting(AtomicUsize);

    #[async_trait]
    impl AsyncPredicate for Counting {
        async fn test(&self, _exchange: &Parts) -> Result<bool, PredicateError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(true)
        }
    }

    #[tokio::test]
    async fn test_path_patterns() {
        let p = predicate(PredicateFactory::Path, "/remove/{segment}, /static/**");

        assert!(p.test(&exchange(Request::builder().uri("/remove/rewrite"))).await.unwrap());
        assert!(p.test(&exchange(Request::builder().uri("/static"))).await.unwrap());
        assert!(p.test(&exchange(Request::builder().uri("/static/css/app.css"))).await.unwrap());
        assert!(!p.test(&exchange(Request::builder().uri("/remove/a/b"))).await.unwrap());
        assert!(!p.test(&exchange(Request::builder().uri("/Remove/x"))).await.unwrap());
    }

    #[test]
    fn test_path_pattern_regex() {
        assert!(path_pattern("/").unwrap().is_match("/"));
        assert!(path_pattern("/**").unwrap().is_match("/anything/at/all"));
        assert!(path_pattern("/api/v?/*.json").unwrap().is_match("/api/v1/users.json"));
        assert!(path_pattern("/users/{id:[0-9]+}").unwrap().is_match("/users/42"));
        assert!(!path_pattern("/users/{id:[0-9]+}").unwrap().is_match("/users/abc"));
        assert!(path_pattern("/files/{*rest}").unwrap().is_match("/files/a/b"));
        assert!(path_pattern("/a/**/b").is_err());
        assert!(path_pattern("relative").is_err());
        assert!(path_pattern("/{open").is_err());
    }

    #[test]
    fn test_path_variable_constraint_with_braces() {
        let re = path_pattern(r"/users/{id:\d{3}}").unwrap();
        assert!(re.is_match("/users/123"));
        assert!(!re.is_match("/users/12"));
        assert!(!re.is_match("/users/1234"));
        assert!(path_pattern(r"/users/{id:\d{3}").is_err());
    }

    #[test]
    fn test_path_variables() {
        let patterns = vec![
            path_pattern("/static/**").unwrap(),
            path_pattern("/remove/{segment}").unwrap(),
            path_pattern("/files/{*rest}").unwrap(),
        ];
        let vars = path_variables(&patterns, "/remove/get");
        assert_eq!(vars.get("segment").map(String::as_str), Some("get"));

        let vars = path_variables(&patterns, "/files/a/b");
        assert_eq!(vars.get("rest").map(String::as_str), Some("a/b"));

        assert!(path_variables(&patterns, "/static/x").is_empty());
        assert!(path_variables(&patterns, "/nowhere").is_empty());
    }

    #[tokio::test]
    async fn test_host_patterns() {
        let p = predicate(PredicateFactory::Host, "**.example.org,{sub}.myhost.org");

        let req = exchange(Request::builder().header("Host", "www.EXAMPLE.org:8443"));
        assert!(p.test(&req).await.unwrap());

        let req = exchange(Request::builder().header("Host", "beta.myhost.org"));
        assert!(p.test(&req).await.unwrap());

        let req = exchange(Request::builder().header("Host", "a.b.myhost.org"));
        assert!(!p.test(&req).await.unwrap());

        let req = exchange(Request::builder());
        assert!(!p.test(&req).await.unwrap());
    }

    #[tokio::test]
    async fn test_method_header_query() {
        let method = predicate(PredicateFactory::Method, "get, post");
        assert!(method.test(&exchange(Request::builder().method("POST"))).await.unwrap());
        assert!(!method.test(&exchange(Request::builder().method("DELETE"))).await.unwrap());

        let header = predicate(PredicateFactory::Header, "X-Request-Id, \\d+");
        let numeric = exchange(Request::builder().header("x-request-id", "123"));
        assert!(header.test(&numeric).await.unwrap());
        let mixed = exchange(Request::builder().header("x-request-id", "12a"));
        assert!(!header.test(&mixed).await.unwrap());

        let present = predicate(PredicateFactory::Header, "X-Tenant");
        let tenant = exchange(Request::builder().header("x-tenant", "t1"));
        assert!(present.test(&tenant).await.unwrap());
        assert!(!present.test(&exchange(Request::builder())).await.unwrap());

        let query = predicate(PredicateFactory::Query, "Hello,Wor.d");
        assert!(query.test(&exchange(Request::builder().uri("/q?Hello=World"))).await.unwrap());
        assert!(!query.test(&exchange(Request::builder().uri("/q?Hello=Mondo"))).await.unwrap());
        assert!(!query.test(&exchange(Request::builder().uri("/q"))).await.unwrap());
    }

    #[tokio::test]
    async fn test_cookie() {
        let p = predicate(PredicateFactory::Cookie, "session,abc.*");
        let req = exchange(Request::builder().header("Cookie", "theme=dark; session=abc123"));
        assert!(p.test(&req).await.unwrap());

        let req = exchange(Request::builder().header("Cookie", "session=xyz"));
        assert!(!p.test(&req).await.unwrap());
    }

    #[tokio::test]
    async fn test_remote_addr() {
        let p = predicate(PredicateFactory::RemoteAddr, "10.0.0.0/8, localhost");

        let mut req = exchange(Request::builder());
        req.extensions.insert(ConnectInfo::<SocketAddr>("10.1.2.3:5555".parse().unwrap()));
        assert!(p.test(&req).await.unwrap());

        let mut req = exchange(Request::builder());
        req.extensions.insert(ConnectInfo::<SocketAddr>("[::1]:5555".parse().unwrap()));
        assert!(p.test(&req).await.unwrap());

        let mut req = exchange(Request::builder());
        req.extensions.insert(ConnectInfo::<SocketAddr>("192.168.1.1:5555".parse().unwrap()));
        assert!(!p.test(&req).await.unwrap());

        let req = exchange(Request::builder());
        assert!(matches!(p.test(&req).await, Err(PredicateError::MissingRemoteAddress)));
    }

    #[tokio::test]
    async fn test_datetimes() {
        let after = predicate(
            PredicateFactory::After,
            "2017-01-20T17:42:47.789-07:00[America/Denver]",
        );
        let before = predicate(PredicateFactory::Before, "2017-01-20T17:42:47+01:00");
        let between = predicate(
            PredicateFactory::Between,
            "2000-01-01T00:00:00Z, 2999-01-01T00:00:00Z",
        );

        let req = exchange(Request::builder());
        assert!(after.test(&req).await.unwrap());
        assert!(!before.test(&req).await.unwrap());
        assert!(between.test(&req).await.unwrap());

        let reversed = PredicateConfig::new(
            PredicateFactory::Between,
            "2999-01-01T00:00:00Z,2000-01-01T00:00:00Z",
        );
        assert!(to_predicate(&reversed).is_err());
    }

    #[tokio::test]
    async fn test_negate() {
        let config = PredicateConfig::new(PredicateFactory::Method, "GET").negate();
        let p = to_predicate(&config).unwrap();
        assert!(!p.test(&exchange(Request::builder().method("GET"))).await.unwrap());
        assert!(p.test(&exchange(Request::builder().method("PUT"))).await.unwrap());
    }

    #[tokio::test]
    async fn test_composition_short_circuits() {
        let right = Arc::new(Counting::default());
        let req = exchange(Request::builder().method("GET"));

        let and = And(predicate(PredicateFactory::Method, "POST"), right.clone());
        assert!(!and.test(&req).await.unwrap());
        assert_eq!(right.0.load(Ordering::SeqCst), 0);

        let or = Or(predicate(PredicateFactory::Method, "GET"), right.clone());
        assert!(or.test(&req).await.unwrap());
        assert_eq!(right.0.load(Ordering::SeqCst), 0);

        let or = Or(predicate(PredicateFactory::Method, "POST"), right.clone());
        assert!(or.test(&req).await.unwrap());
        assert_eq!(right.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_invalid_args() {
        let cases = [
            PredicateConfig::new(PredicateFactory::After, "yesterday"),
            PredicateConfig::new(PredicateFactory::Cookie, "only-a-name"),
            PredicateConfig::new(PredicateFactory::Method, ""),
            PredicateConfig::new(PredicateFactory::RemoteAddr, "10.0.0.0/33"),
            PredicateConfig::new(PredicateFactory::Header, "X-A,(unclosed"),
        ];
        for case in cases {
            assert!(
                matches!(to_predicate(&case), Err(PredicateError::InvalidArgs { .. })),
                "{case:?} should be rejected"
            );
        }
    }
}
