//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;

use axum::body::Body;
use axum::http::{Request, Response};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use url::Url;

use sra_gateway::config::schema::{
    FilterConfig, FilterFactory, PredicateConfig, PredicateFactory, RouteConfig,
};

/// Start a mock backend on an ephemeral port that answers every request
/// with `200 OK` and the body `"<METHOD> <request-target>"`. Every request
/// header `Name: value` comes back as response header `Echo-Name: value`.
pub async fn start_echo_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            tokio::spawn(echo(socket));
        }
    });

    addr
}

async fn echo(mut socket: TcpStream) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    let head_end = loop {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let content_length = head
        .lines()
        .filter_map(|l| l.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);
    while buf.len() < head_end + content_length {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }

    let request_line = head.lines().next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();
    let body = format!("{} {}", parts.next().unwrap_or("-"), parts.next().unwrap_or("-"));

    let echoed: String = head
        .lines()
        .skip(1)
        .filter_map(|line| line.split_once(':'))
        .map(|(name, value)| format!("Echo-{}: {}\r\n", name.trim(), value.trim()))
        .collect();

    let response = format!(
        "HTTP/1.1 200 OK\r\n{}Content-Length: {}\r\nConnection: close\r\n\r\n{}",
        echoed,
        body.len(),
        body
    );
    let _ = socket.write_all(response.as_bytes()).await;
    let _ = socket.shutdown().await;
}

/// An address nothing listens on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Protected, CSRF-checked route forwarding `path` to `backend`.
pub fn route(key: &str, path: &str, backend: SocketAddr) -> RouteConfig {
    let mut route = RouteConfig::new(key, Url::parse(&format!("http://{backend}")).unwrap());
    route.predicates = vec![PredicateConfig::new(PredicateFactory::Path, path)];
    route
}

/// `route` with the given filters appended.
pub fn filtered_route(
    key: &str,
    path: &str,
    backend: SocketAddr,
    filters: &[(FilterFactory, &str)],
) -> RouteConfig {
    let mut route = route(key, path, backend);
    route.filters = filters
        .iter()
        .map(|(factory, args)| FilterConfig::new(*factory, *args))
        .collect();
    route
}

pub fn request(method: &str, uri: &str) -> Request<Body> {
    Request::builder().method(method).uri(uri).body(Body::empty()).unwrap()
}

pub async fn body_string(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}
