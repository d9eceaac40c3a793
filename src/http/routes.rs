//! Axum router configuration

use axum::{
    http::{header, Method},
    middleware,
    routing::get,
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::limits::{connection_limit_middleware, rate_limit_middleware};
use crate::state::AppState;

use super::handlers::{health_check, master_playlist, metrics, serve_path};

/// Create the Axum router with all routes (§6).
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::ACCEPT, header::RANGE, header::CONTENT_TYPE, header::ORIGIN])
        .max_age(Duration::from_secs(86_400));

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .route("/master.m3u8", get(master_playlist))
        .route("/{*path}", get(serve_path))
        .layer(middleware::from_fn_with_state(
            state.rate_limiter.clone(),
            rate_limit_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            state.connection_limiter.clone(),
            connection_limit_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn test_create_router() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            output_dir: dir.path().to_string_lossy().to_string(),
            ..Default::default()
        };
        let state = Arc::new(AppState::new(config));
        let _router = create_router(state);
    }

    #[tokio::test]
    async fn test_cors_options() {
        use axum::body::Body;
        use axum::http::{Request, StatusCode};
        use tower::util::ServiceExt;

        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            output_dir: dir.path().to_string_lossy().to_string(),
            ..Default::default()
        };
        let state = Arc::new(AppState::new(config));
        let app = create_router(state);

        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/video/segment0.ts")
            .header(header::ORIGIN, "http://localhost:8080")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "*"
        );
    }

    #[tokio::test]
    async fn test_health_always_ok() {
        use axum::body::Body;
        use axum::http::Request;
        use tower::util::ServiceExt;

        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            output_dir: dir.path().to_string_lossy().to_string(),
            ..Default::default()
        };
        let state = Arc::new(AppState::new(config));
        let app = create_router(state);

        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
    }
}
