//! HTTP API surface: registration, login, presence, health.

pub mod routes;

use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use courier_relay::ConnectionRegistry;

use crate::auth::{TokenService, UserStore};

/// Shared state for the HTTP handlers.
pub struct AppState {
    /// Credential storage
    pub users: UserStore,
    /// Token issuance and verification
    pub tokens: Arc<TokenService>,
    /// Relay connection registry, for presence reporting
    pub registry: Arc<ConnectionRegistry>,
}

/// Assemble the application router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(routes::auth::router())
        .merge(routes::presence::router())
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health_handler() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    async fn test_router() -> (Router, Arc<AppState>) {
        let pool = db::connect(":memory:").await.unwrap();
        db::migrate(&pool).await.unwrap();

        let state = Arc::new(AppState {
            users: UserStore::new(pool),
            tokens: Arc::new(TokenService::new("test-secret", 3600)),
            registry: Arc::new(ConnectionRegistry::new()),
        });

        (router(Arc::clone(&state)), state)
    }

    fn json_post(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_register_returns_valid_token() {
        let (app, state) = test_router().await;

        let response = app
            .oneshot(json_post(
                "/v1/auth/register",
                r#"{"username":"alice","password":"correct horse"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await;
        let token = body["token"].as_str().unwrap();
        let user = state.tokens.verify_token(token).unwrap();
        assert_eq!(user.as_str(), "alice");
    }

    #[tokio::test]
    async fn test_register_missing_fields_is_bad_request() {
        let (app, _state) = test_router().await;

        let response = app
            .oneshot(json_post("/v1/auth/register", r#"{"username":"alice"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_register_duplicate_is_conflict() {
        let (app, _state) = test_router().await;
        let body = r#"{"username":"alice","password":"pw"}"#;

        let first = app
            .clone()
            .oneshot(json_post("/v1/auth/register", body))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::CREATED);

        let second = app
            .oneshot(json_post("/v1/auth/register", body))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_login_round_trip() {
        let (app, _state) = test_router().await;

        app.clone()
            .oneshot(json_post(
                "/v1/auth/register",
                r#"{"username":"alice","password":"correct horse"}"#,
            ))
            .await
            .unwrap();

        let ok = app
            .clone()
            .oneshot(json_post(
                "/v1/auth/login",
                r#"{"username":"alice","password":"correct horse"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(ok.status(), StatusCode::OK);
        assert!(body_json(ok).await["token"].is_string());

        let bad = app
            .oneshot(json_post(
                "/v1/auth/login",
                r#"{"username":"alice","password":"wrong"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(bad.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_active_users_reflects_registry() {
        let (app, state) = test_router().await;

        let empty = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/v1/presence/active")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(body_json(empty).await["activeUsers"], serde_json::json!([]));

        let (tx, _rx) = tokio::sync::mpsc::channel(1);
        state.registry.register(
            courier_relay::UserId::from("alice"),
            courier_relay::ConnectionHandle::new(
                courier_relay::ConnectionId::next(),
                tx,
                tokio_util::sync::CancellationToken::new(),
            ),
        );

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/v1/presence/active")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            body_json(response).await["activeUsers"],
            serde_json::json!(["alice"])
        );
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _state) = test_router().await;

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
