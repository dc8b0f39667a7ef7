//! Route filters.
//!
//! # Responsibilities
//! - Translate filter descriptors into request and response transformations
//! - Rewrite the request head before it is proxied
//! - Rewrite the upstream response before it reaches the client
//!
//! # Design Decisions
//! - Filters run in declaration order
//! - REDIRECT_TO and SET_REQUEST_SIZE may answer without contacting upstream;
//!   response filters still run on such answers
//! - Factories that need sessions, rate limiters, principals or plugin code
//!   translate to `FilterError::Unsupported` and are skipped by routes

use std::collections::HashMap;

use axum::body::Body;
use axum::http::header::{CONTENT_LENGTH, HOST, LOCATION};
use axum::http::request::Parts;
use axum::http::uri::PathAndQuery;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Response, StatusCode, Uri};
use regex::Regex;
use thiserror::Error;
use url::Url;

use crate::config::schema::{FilterConfig, FilterFactory};

/// Headers set by SECURE_HEADERS unless the upstream already sent them.
const SECURE_HEADERS: [(&str, &str); 8] = [
    ("x-xss-protection", "1 ; mode=block"),
    ("strict-transport-security", "max-age=631138519"),
    ("x-frame-options", "DENY"),
    ("x-content-type-options", "nosniff"),
    ("referrer-policy", "no-referrer"),
    (
        "content-security-policy",
        "default-src 'self' https:; font-src 'self' https: data:; img-src 'self' https: data:; \
         object-src 'none'; script-src https:; style-src 'self' https: 'unsafe-inline'",
    ),
    ("x-download-options", "noopen"),
    ("x-permitted-cross-domain-policies", "none"),
];

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("invalid {factory:?} arguments '{args}': {reason}")]
    InvalidArgs {
        factory: FilterFactory,
        args: String,
        reason: String,
    },

    #[error("{0:?} filters are not supported")]
    Unsupported(FilterFactory),
}

fn invalid(factory: FilterFactory, args: &str, reason: impl std::fmt::Display) -> FilterError {
    FilterError::InvalidArgs {
        factory,
        args: args.to_string(),
        reason: reason.to_string(),
    }
}

/// Which of several values of a response header DEDUPE_RESPONSE_HEADER keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DedupeStrategy {
    #[default]
    RetainFirst,
    RetainLast,
    RetainUnique,
}

#[derive(Debug, Clone)]
pub enum RouteFilter {
    AddRequestHeader(HeaderName, HeaderValue),
    AddRequestParameter(String, String),
    MapRequestHeader { from: HeaderName, to: HeaderName },
    RemoveRequestHeader(HeaderName),
    SetRequestHeader(HeaderName, HeaderValue),
    SetRequestHost(HeaderValue),
    PreserveHostHeader,
    QueryParamToRequestHeader(HeaderName),
    RequestHeaderToRequestUri(HeaderName),
    PrefixPath(String),
    SetPath(String),
    StripPrefix(usize),
    RewritePath { regex: Regex, replacement: String },
    SetRequestSize(u64),
    RedirectTo { status: StatusCode, location: HeaderValue },
    AddResponseHeader(HeaderName, HeaderValue),
    SetResponseHeader(HeaderName, HeaderValue),
    RemoveResponseHeader(HeaderName),
    DedupeResponseHeader { names: Vec<HeaderName>, strategy: DedupeStrategy },
    RewriteResponseHeader { name: HeaderName, regex: Regex, replacement: String },
    SetStatus(StatusCode),
    SecureHeaders,
}

/// Request head on its way upstream.
#[derive(Debug)]
pub struct Forward<'a> {
    pub parts: &'a mut Parts,

    /// Variables captured by the route's PATH patterns, for SET_PATH.
    pub path_variables: HashMap<String, String>,

    /// Keep the client's Host header instead of the upstream authority.
    pub preserve_host: bool,

    /// Full upstream URL replacing the route target.
    pub upstream: Option<Url>,
}

impl<'a> Forward<'a> {
    pub fn new(parts: &'a mut Parts, path_variables: HashMap<String, String>) -> Self {
        Self {
            parts,
            path_variables,
            preserve_host: false,
            upstream: None,
        }
    }
}

/// Translate one filter descriptor.
pub fn to_filter(config: &FilterConfig) -> Result<RouteFilter, FilterError> {
    let factory = config.factory;
    let raw = config.args.as_str();
    let args: Vec<&str> = raw.split(',').map(str::trim).collect();
    let arg = |i: usize| {
        args.get(i)
            .copied()
            .filter(|a| !a.is_empty())
            .ok_or_else(|| invalid(factory, raw, format!("missing argument #{}", i + 1)))
    };
    let name = |value: &str| {
        HeaderName::from_bytes(value.as_bytes()).map_err(|e| invalid(factory, raw, e))
    };
    let value = |value: &str| HeaderValue::from_str(value).map_err(|e| invalid(factory, raw, e));
    let regex = |pattern: &str| Regex::new(pattern).map_err(|e| invalid(factory, raw, e));

    let filter = match factory {
        FilterFactory::AddRequestHeader => {
            RouteFilter::AddRequestHeader(name(arg(0)?)?, value(arg(1)?)?)
        }
        FilterFactory::AddRequestParameter => {
            RouteFilter::AddRequestParameter(arg(0)?.to_string(), arg(1)?.to_string())
        }
        FilterFactory::AddResponseHeader => {
            RouteFilter::AddResponseHeader(name(arg(0)?)?, value(arg(1)?)?)
        }
        FilterFactory::DedupeResponseHeader => {
            let names = arg(0)?
                .split_whitespace()
                .map(name)
                .collect::<Result<Vec<_>, _>>()?;
            let strategy = match args.get(1).copied().unwrap_or_default() {
                "" | "RETAIN_FIRST" => DedupeStrategy::RetainFirst,
                "RETAIN_LAST" => DedupeStrategy::RetainLast,
                "RETAIN_UNIQUE" => DedupeStrategy::RetainUnique,
                other => return Err(invalid(factory, raw, format!("unknown strategy '{other}'"))),
            };
            RouteFilter::DedupeResponseHeader { names, strategy }
        }
        FilterFactory::MapRequestHeader => RouteFilter::MapRequestHeader {
            from: name(arg(0)?)?,
            to: name(arg(1)?)?,
        },
        FilterFactory::PrefixPath => {
            let prefix = raw.trim();
            if !prefix.starts_with('/') {
                return Err(invalid(factory, raw, "prefix must start with '/'"));
            }
            RouteFilter::PrefixPath(prefix.trim_end_matches('/').to_string())
        }
        FilterFactory::PreserveHostHeader => RouteFilter::PreserveHostHeader,
        FilterFactory::RedirectTo => {
            let status = parse_status(arg(0)?)
                .filter(StatusCode::is_redirection)
                .ok_or_else(|| invalid(factory, raw, "status must be a 3xx code"))?;
            let location = Url::parse(arg(1)?).map_err(|e| invalid(factory, raw, e))?;
            RouteFilter::RedirectTo {
                status,
                location: value(location.as_str())?,
            }
        }
        FilterFactory::RemoveRequestHeader => RouteFilter::RemoveRequestHeader(name(raw.trim())?),
        FilterFactory::RemoveResponseHeader => RouteFilter::RemoveResponseHeader(name(raw.trim())?),
        FilterFactory::RewritePath => RouteFilter::RewritePath {
            regex: regex(arg(0)?)?,
            replacement: arg(1)?.replace("$\\", "$"),
        },
        FilterFactory::RewriteResponseHeader => RouteFilter::RewriteResponseHeader {
            name: name(arg(0)?)?,
            regex: regex(arg(1)?)?,
            replacement: args.get(2).copied().unwrap_or_default().replace("$\\", "$"),
        },
        FilterFactory::SecureHeaders => RouteFilter::SecureHeaders,
        FilterFactory::SetPath => {
            let template = raw.trim();
            if !template.starts_with('/') {
                return Err(invalid(factory, raw, "template must start with '/'"));
            }
            RouteFilter::SetPath(template.to_string())
        }
        FilterFactory::SetRequestHeader => {
            RouteFilter::SetRequestHeader(name(arg(0)?)?, value(arg(1)?)?)
        }
        FilterFactory::SetResponseHeader => {
            RouteFilter::SetResponseHeader(name(arg(0)?)?, value(arg(1)?)?)
        }
        FilterFactory::SetStatus => RouteFilter::SetStatus(
            parse_status(raw.trim()).ok_or_else(|| invalid(factory, raw, "unknown status"))?,
        ),
        FilterFactory::StripPrefix => {
            let parts = raw.trim().parse::<usize>().unwrap_or_else(|e| {
                tracing::error!(args = %raw, error = %e, "Unexpected argument value, using 0");
                0
            });
            RouteFilter::StripPrefix(parts)
        }
        FilterFactory::RequestHeaderToRequestUri => {
            RouteFilter::RequestHeaderToRequestUri(name(raw.trim())?)
        }
        FilterFactory::SetRequestSize => RouteFilter::SetRequestSize(
            raw.trim().parse::<u64>().map_err(|e| invalid(factory, raw, e))?,
        ),
        FilterFactory::SetRequestHost => RouteFilter::SetRequestHost(value(arg(0)?)?),
        FilterFactory::QueryParamToRequestHeader => {
            RouteFilter::QueryParamToRequestHeader(name(raw.trim())?)
        }
        FilterFactory::FallbackHeaders
        | FilterFactory::RequestRateLimiter
        | FilterFactory::RewriteLocation
        | FilterFactory::Retry
        | FilterFactory::SaveSession
        | FilterFactory::LinkRewrite
        | FilterFactory::ClientCertsToRequestHeader
        | FilterFactory::PrincipalToRequestHeader
        | FilterFactory::Custom => return Err(FilterError::Unsupported(factory)),
    };
    Ok(filter)
}

/// Numeric code or constant name, e.g. `404` or `NOT_FOUND`.
fn parse_status(raw: &str) -> Option<StatusCode> {
    if let Ok(code) = raw.parse::<u16>() {
        return StatusCode::from_u16(code).ok();
    }
    let wanted = raw.to_ascii_uppercase();
    (100u16..600)
        .filter_map(|code| StatusCode::from_u16(code).ok())
        .find(|status| {
            status
                .canonical_reason()
                .is_some_and(|reason| {
                    reason.to_ascii_uppercase().replace([' ', '-'], "_") == wanted
                })
        })
}

impl RouteFilter {
    /// Whether this filter acts on the request rather than the response.
    pub fn is_request_filter(&self) -> bool {
        !matches!(
            self,
            Self::AddResponseHeader(..)
                | Self::SetResponseHeader(..)
                | Self::RemoveResponseHeader(..)
                | Self::DedupeResponseHeader { .. }
                | Self::RewriteResponseHeader { .. }
                | Self::SetStatus(..)
                | Self::SecureHeaders
        )
    }

    /// Rewrite the request, or answer it directly.
    pub fn apply_request(&self, forward: &mut Forward<'_>) -> Option<Response<Body>> {
        let headers = &mut forward.parts.headers;
        match self {
            Self::AddRequestHeader(name, value) => {
                headers.append(name.clone(), value.clone());
            }
            Self::SetRequestHeader(name, value) => {
                headers.insert(name.clone(), value.clone());
            }
            Self::RemoveRequestHeader(name) => {
                headers.remove(name);
            }
            Self::MapRequestHeader { from, to } => {
                let values: Vec<HeaderValue> = headers.get_all(from).iter().cloned().collect();
                for value in values {
                    headers.append(to.clone(), value);
                }
            }
            Self::SetRequestHost(host) => {
                headers.insert(HOST, host.clone());
                forward.preserve_host = true;
            }
            Self::PreserveHostHeader => forward.preserve_host = true,
            Self::QueryParamToRequestHeader(name) => {
                let value = forward.parts.uri.query().and_then(|query| {
                    url::form_urlencoded::parse(query.as_bytes())
                        .find(|(k, _)| k == name.as_str())
                        .map(|(_, v)| v.into_owned())
                });
                if let Some(value) = value.and_then(|v| HeaderValue::from_str(&v).ok()) {
                    forward.parts.headers.insert(name.clone(), value);
                }
            }
            Self::RequestHeaderToRequestUri(name) => {
                let url = headers
                    .get(name)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| Url::parse(v).ok());
                match url {
                    Some(url) if url.scheme() == "http" => forward.upstream = Some(url),
                    Some(url) => tracing::warn!(upstream = %url, "Ignoring non-http request URI"),
                    None => {}
                }
            }
            Self::AddRequestParameter(name, value) => {
                let pair = url::form_urlencoded::Serializer::new(String::new())
                    .append_pair(name, value)
                    .finish();
                let query = match forward.parts.uri.query() {
                    Some(query) if !query.is_empty() => format!("{query}&{pair}"),
                    _ => pair,
                };
                let path = forward.parts.uri.path().to_string();
                set_path_and_query(forward.parts, &path, Some(&query));
            }
            Self::PrefixPath(prefix) => {
                let path = format!("{prefix}{}", forward.parts.uri.path());
                set_path(forward.parts, &path);
            }
            Self::SetPath(template) => {
                let path = expand_template(template, &forward.path_variables);
                set_path(forward.parts, &path);
            }
            Self::StripPrefix(count) => {
                let path = strip_prefix(forward.parts.uri.path(), *count);
                set_path(forward.parts, &path);
            }
            Self::RewritePath { regex, replacement } => {
                let path = regex
                    .replace_all(forward.parts.uri.path(), replacement.as_str())
                    .into_owned();
                set_path(forward.parts, &path);
            }
            Self::SetRequestSize(max) => {
                let size = headers
                    .get(CONTENT_LENGTH)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok());
                if let Some(size) = size.filter(|size| size > max) {
                    let message = format!(
                        "Request size is larger than permissible limit. \
                         Request size is {size}B where permissible limit is {max}B"
                    );
                    tracing::debug!(size, max, "Request too large");
                    let mut response = Response::new(Body::empty());
                    *response.status_mut() = StatusCode::PAYLOAD_TOO_LARGE;
                    if let Ok(value) = HeaderValue::from_str(&message) {
                        response.headers_mut().insert("errormessage", value);
                    }
                    return Some(response);
                }
            }
            Self::RedirectTo { status, location } => {
                let mut response = Response::new(Body::empty());
                *response.status_mut() = *status;
                response.headers_mut().insert(LOCATION, location.clone());
                return Some(response);
            }
            _ => {}
        }
        None
    }

    /// Rewrite the response on its way back to the client.
    pub fn apply_response(&self, response: &mut Response<Body>) {
        let headers = response.headers_mut();
        match self {
            Self::AddResponseHeader(name, value) => {
                headers.append(name.clone(), value.clone());
            }
            Self::SetResponseHeader(name, value) => {
                headers.insert(name.clone(), value.clone());
            }
            Self::RemoveResponseHeader(name) => {
                headers.remove(name);
            }
            Self::DedupeResponseHeader { names, strategy } => {
                for name in names {
                    dedupe(headers, name, *strategy);
                }
            }
            Self::RewriteResponseHeader { name, regex, replacement } => {
                let values: Vec<HeaderValue> = headers
                    .get_all(name)
                    .iter()
                    .map(|value| match value.to_str() {
                        Ok(text) => {
                            let rewritten = regex.replace_all(text, replacement.as_str());
                            HeaderValue::from_str(&rewritten).unwrap_or_else(|_| value.clone())
                        }
                        Err(_) => value.clone(),
                    })
                    .collect();
                headers.remove(name);
                for value in values {
                    headers.append(name.clone(), value);
                }
            }
            Self::SetStatus(status) => *response.status_mut() = *status,
            Self::SecureHeaders => {
                for (name, value) in SECURE_HEADERS {
                    if !headers.contains_key(name) {
                        headers.insert(name, HeaderValue::from_static(value));
                    }
                }
            }
            _ => {}
        }
    }
}

/// Run the request filters in order; the first direct answer wins.
pub fn filter_request(
    filters: &[RouteFilter],
    forward: &mut Forward<'_>,
) -> Option<Response<Body>> {
    filters
        .iter()
        .filter(|f| f.is_request_filter())
        .find_map(|f| f.apply_request(forward))
}

pub fn filter_response(filters: &[RouteFilter], response: &mut Response<Body>) {
    for filter in filters.iter().filter(|f| !f.is_request_filter()) {
        filter.apply_response(response);
    }
}

fn dedupe(headers: &mut HeaderMap, name: &HeaderName, strategy: DedupeStrategy) {
    let values: Vec<HeaderValue> = headers.get_all(name).iter().cloned().collect();
    if values.len() < 2 {
        return;
    }

    let kept = match strategy {
        DedupeStrategy::RetainFirst => values[..1].to_vec(),
        DedupeStrategy::RetainLast => values[values.len() - 1..].to_vec(),
        DedupeStrategy::RetainUnique => {
            let mut unique: Vec<HeaderValue> = Vec::with_capacity(values.len());
            for value in values {
                if !unique.contains(&value) {
                    unique.push(value);
                }
            }
            unique
        }
    };
    headers.remove(name);
    for value in kept {
        headers.append(name.clone(), value);
    }
}

/// Replace `{var}` placeholders; unknown variables expand to nothing.
fn expand_template(template: &str, variables: &HashMap<String, String>) -> String {
    let mut path = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        path.push_str(&rest[..start]);
        let Some(len) = rest[start..].find('}') else {
            path.push_str(&rest[start..]);
            return path;
        };
        let name = &rest[start + 1..start + len];
        if let Some(value) = variables.get(name) {
            path.push_str(value);
        }
        rest = &rest[start + len + 1..];
    }
    path.push_str(rest);
    path
}

fn strip_prefix(path: &str, count: usize) -> String {
    let kept: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).skip(count).collect();
    let mut stripped = format!("/{}", kept.join("/"));
    if path.ends_with('/') && !stripped.ends_with('/') {
        stripped.push('/');
    }
    stripped
}

fn set_path(parts: &mut Parts, path: &str) {
    let query = parts.uri.query().map(str::to_string);
    set_path_and_query(parts, path, query.as_deref());
}

fn set_path_and_query(parts: &mut Parts, path: &str, query: Option<&str>) {
    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    };
    let path_and_query = match query {
        Some(query) => format!("{path}?{query}"),
        None => path,
    };

    let mut uri_parts = parts.uri.clone().into_parts();
    let rebuilt = PathAndQuery::try_from(path_and_query.as_str())
        .map_err(axum::http::Error::from)
        .and_then(|pq| {
            uri_parts.path_and_query = Some(pq);
            Uri::from_parts(uri_parts).map_err(axum::http::Error::from)
        });
    match rebuilt {
        Ok(uri) => parts.uri = uri,
        Err(e) => tracing::warn!(path = %path_and_query, error = %e, "Cannot rewrite request path"),
    }
}
