//! End-to-end behavior of the security filter in front of the proxy.

use std::time::Duration;

use axum::http::header::{COOKIE, LOCATION, SET_COOKIE};
use axum::http::StatusCode;
use tokio::sync::mpsc;
use tower::ServiceExt;
use url::Url;

use sra_gateway::config::schema::RouteType;
use sra_gateway::config::SraConfig;
use sra_gateway::{HttpServer, Shutdown};

mod common;

fn config(routes: Vec<sra_gateway::config::RouteConfig>) -> SraConfig {
    let mut config = SraConfig::default();
    config.security.post_logout_uri = Url::parse("https://app/default").unwrap();
    config.routes = routes;
    config
}

#[tokio::test]
async fn test_logout_route_redirects_to_override() {
    let backend = common::start_echo_backend().await;
    let mut r4 = common::route("r4", "/r4/logout", backend);
    r4.logout = true;
    r4.post_logout = Some(Url::parse("https://app/r4-logout").unwrap());
    let mut r5 = common::route("r5", "/r5/logout", backend);
    r5.logout = true;

    let server = HttpServer::new(config(vec![r4, r5]));

    let response = server.router().oneshot(common::request("POST", "/r4/logout")).await.unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(response.headers()[LOCATION], "https://app/r4-logout");

    let response = server.router().oneshot(common::request("GET", "/r5/logout")).await.unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(response.headers()[LOCATION], "https://app/default");
}

#[tokio::test]
async fn test_protected_post_without_token_is_forbidden() {
    let backend = common::start_echo_backend().await;
    let server = HttpServer::new(config(vec![common::route("api", "/api/**", backend)]));

    let response = server.router().oneshot(common::request("POST", "/api/items")).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_post_with_matching_token_reaches_upstream() {
    let backend = common::start_echo_backend().await;
    let server = HttpServer::new(config(vec![common::route("api", "/api/**", backend)]));

    let request = axum::http::Request::builder()
        .method("POST")
        .uri("/api/items?draft=true")
        .header(COOKIE, "XSRF-TOKEN=abc123")
        .header("X-XSRF-TOKEN", "abc123")
        .body(axum::body::Body::from("{}"))
        .unwrap();
    let response = server.router().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(common::body_string(response).await, "POST /api/items?draft=true");
}

#[tokio::test]
async fn test_mismatched_token_is_forbidden() {
    let backend = common::start_echo_backend().await;
    let server = HttpServer::new(config(vec![common::route("api", "/api/**", backend)]));

    let request = axum::http::Request::builder()
        .method("DELETE")
        .uri("/api/items/1")
        .header(COOKIE, "XSRF-TOKEN=abc123")
        .header("X-XSRF-TOKEN", "other")
        .body(axum::body::Body::empty())
        .unwrap();
    let response = server.router().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_csrf_exempt_route_needs_no_token() {
    let backend = common::start_echo_backend().await;
    let mut hooks = common::route("hooks", "/hooks/**", backend);
    hooks.csrf = false;
    let server = HttpServer::new(config(vec![hooks]));

    let response = server.router().oneshot(common::request("POST", "/hooks/push")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(common::body_string(response).await, "POST /hooks/push");
}

#[tokio::test]
async fn test_public_route_is_never_csrf_exempt() {
    let backend = common::start_echo_backend().await;
    let mut public = common::route("public", "/public/**", backend);
    public.route_type = RouteType::Public;
    public.csrf = false;
    let server = HttpServer::new(config(vec![public]));

    let response = server.router().oneshot(common::request("GET", "/public/page")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = server.router().oneshot(common::request("POST", "/public/form")).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_upstream_sees_route_access_level() {
    let backend = common::start_echo_backend().await;
    let mut public = common::route("public", "/public/**", backend);
    public.route_type = RouteType::Public;
    let protected = common::route("protected", "/protected/**", backend);
    let server = HttpServer::new(config(vec![public, protected]));

    let spoofed = |uri: &str| {
        axum::http::Request::builder()
            .uri(uri)
            .header("X-Route-Access", "public")
            .body(axum::body::Body::empty())
            .unwrap()
    };

    let response = server.router().oneshot(spoofed("/public/page")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["Echo-x-route-access"], "public");

    // the client cannot claim public access to a protected route
    let response = server.router().oneshot(spoofed("/protected/page")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let echoed: Vec<_> = response.headers().get_all("Echo-x-route-access").iter().collect();
    assert_eq!(echoed, vec!["protected"]);
}

#[tokio::test]
async fn test_access_header_can_be_disabled() {
    let backend = common::start_echo_backend().await;
    let mut config = config(vec![common::route("api", "/api/**", backend)]);
    config.security.access_header = Some(String::new());
    let server = HttpServer::new(config);

    let response = server.router().oneshot(common::request("GET", "/api/items")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get("Echo-x-route-access").is_none());
}

#[tokio::test]
async fn test_safe_request_receives_token_cookie() {
    let backend = common::start_echo_backend().await;
    let server = HttpServer::new(config(vec![common::route("api", "/api/**", backend)]));

    let response = server.router().oneshot(common::request("GET", "/api/items")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = response.headers()[SET_COOKIE].to_str().unwrap();
    assert!(cookie.starts_with("XSRF-TOKEN="));

    // a client already holding a token is not issued another one
    let request = axum::http::Request::builder()
        .uri("/api/items")
        .header(COOKIE, "XSRF-TOKEN=abc123")
        .body(axum::body::Body::empty())
        .unwrap();
    let response = server.router().oneshot(request).await.unwrap();
    assert!(response.headers().get(SET_COOKIE).is_none());
}

#[tokio::test]
async fn test_unmatched_request_is_not_found() {
    let backend = common::start_echo_backend().await;
    let server = HttpServer::new(config(vec![common::route("api", "/api/**", backend)]));

    let response = server.router().oneshot(common::request("GET", "/elsewhere")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unreachable_upstream_is_bad_gateway() {
    let dead = common::closed_port().await;
    let server = HttpServer::new(config(vec![common::route("api", "/api/**", dead)]));

    let response = server.router().oneshot(common::request("GET", "/api/items")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_lower_order_route_wins() {
    let first = common::start_echo_backend().await;
    let dead = common::closed_port().await;
    let mut catch_all = common::route("catch-all", "/**", dead);
    catch_all.order = 10;
    let mut api = common::route("api", "/api/**", first);
    api.order = 1;
    let server = HttpServer::new(config(vec![catch_all, api]));

    let response = server.router().oneshot(common::request("GET", "/api/items")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_config_update_refreshes_routes_and_caches() {
    let backend = common::start_echo_backend().await;
    let gateway = common::closed_port().await;
    let mut account = common::route("account", "/account/**", backend);

    let server = HttpServer::new(config(vec![account.clone()]));
    let listener = tokio::net::TcpListener::bind(gateway).await.unwrap();
    let shutdown = Shutdown::new();
    let (updates_tx, updates_rx) = mpsc::unbounded_channel();
    let server_shutdown = shutdown.subscribe();
    let handle =
        tokio::spawn(async move { server.run(listener, updates_rx, server_shutdown).await });

    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .no_proxy()
        .build()
        .unwrap();
    let url = format!("http://{gateway}/account/logout");

    let mut response = None;
    for _ in 0..50 {
        match client.get(&url).send().await {
            Ok(r) => {
                response = Some(r);
                break;
            }
            Err(_) => tokio::time::sleep(Duration::from_millis(20)).await,
        }
    }
    let response = response.expect("gateway unreachable");
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "GET /account/logout");

    // the cached "not a logout route" decision must not survive the refresh
    account.logout = true;
    let mut updated = config(vec![account]);
    updated.routes[0].post_logout = Some(Url::parse("https://app/bye").unwrap());
    updates_tx.send(updated).unwrap();

    let mut redirected = false;
    for _ in 0..50 {
        let response = client.get(&url).send().await.unwrap();
        if response.status() == reqwest::StatusCode::FOUND {
            assert_eq!(response.headers()["location"], "https://app/bye");
            redirected = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(redirected);

    shutdown.trigger();
    handle.await.unwrap().unwrap();
}
