use std::net::SocketAddr;

use anyhow::Context;
use axum::http::{header, HeaderValue, Method};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

pub mod error;
pub mod reports;
pub mod users;

/// `*` anywhere in `origins` allows every origin.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE]);

    if origins.iter().any(|origin| origin == "*") {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();
    layer.allow_origin(origins)
}

pub fn with_middleware(router: Router, origins: &[String]) -> Router {
    router
        .layer(cors_layer(origins))
        .layer(TraceLayer::new_for_http())
}

pub async fn serve(name: &str, addr: SocketAddr, app: Router) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {name} to {addr}"))?;
    info!(service = name, %addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .with_context(|| format!("{name} stopped unexpectedly"))?;

    info!(service = name, "shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use super::*;
    use crate::db::memory::MemoryUserStore;
    use crate::intake::{IntakeConfig, UserService};

    fn app(origins: &[&str]) -> Router {
        let origins: Vec<String> = origins.iter().map(|origin| origin.to_string()).collect();
        let service = Arc::new(UserService::new(
            Arc::new(MemoryUserStore::default()),
            IntakeConfig::default(),
        ));
        with_middleware(users::router(service), &origins)
    }

    fn preflight(origin: &str) -> Request<Body> {
        Request::builder()
            .method("OPTIONS")
            .uri("/api/submit-user")
            .header("origin", origin)
            .header("access-control-request-method", "POST")
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn wildcard_allows_any_origin() {
        let response = app(&["*"])
            .oneshot(preflight("http://localhost:3000"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["access-control-allow-origin"],
            HeaderValue::from_static("*")
        );
    }

    #[tokio::test]
    async fn listed_origins_are_echoed() {
        let response = app(&["http://localhost:3000"])
            .oneshot(preflight("http://localhost:3000"))
            .await
            .unwrap();
        assert_eq!(
            response.headers()["access-control-allow-origin"],
            HeaderValue::from_static("http://localhost:3000")
        );

        let response = app(&["http://localhost:3000"])
            .oneshot(preflight("http://evil.example"))
            .await
            .unwrap();
        assert!(response.headers().get("access-control-allow-origin").is_none());
    }
}
