//! Axum router construction.
//!
//! [`build`] assembles the complete application router, including:
//! - Middleware layers (trace-ID injection, identity resolution, CORS, request deadline)
//! - Optional Swagger UI / OpenAPI spec endpoint (disable with `EDU_ENABLE_SWAGGER=false`)
//! - Health / heartbeat route
//! - `/v1/edu` callable and history routes

pub mod doc;
mod health;
mod v1;

use axum::{
    middleware::{self},
    Router,
};
use crate::middleware::{auth, cors, trace};
use crate::state::AppState;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::timeout::TimeoutLayer;
use utoipa_swagger_ui::SwaggerUi;

// ── Router builder ────────────────────────────────────────────────────────────

/// Build the complete Axum [`Router`] for the application.
pub fn build(state: Arc<AppState>) -> Router {
    let api_router = Router::new()
        .merge(health::router())
        .nest("/v1", v1::router());

    let mut app = Router::new().merge(api_router);

    if state.config.enable_swagger {
        app = app.merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", doc::get_docs()));
    }

    app
        // Outermost layers execute first on the way in.
        .layer(
            ServiceBuilder::new()
                .layer(cors::cors_layer(&state))
                .layer(TimeoutLayer::new(state.config.request_timeout())),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::resolve_identity,
        ))
        .layer(middleware::from_fn(trace::trace_middleware))
        .with_state(state)
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::Config;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use eduguard_core::error::{ClassificationError, ModelError};
    use eduguard_core::pipeline::{AUTH_REQUIRED_MESSAGE, UNAVAILABLE_MESSAGE};
    use eduguard_core::{
        ClassificationResult, Classifier, Generation, ModelAdapters, ModerationPipeline, ReplyGenerator,
        SqliteStore, Turn,
    };
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    struct EchoModel;

    #[async_trait]
    impl Classifier for EchoModel {
        async fn classify(&self, _text: &str) -> Result<ClassificationResult, ClassificationError> {
            Ok(ClassificationResult {
                is_educational: true,
                category: "math".into(),
            })
        }
    }

    #[async_trait]
    impl ReplyGenerator for EchoModel {
        async fn generate(&self, conversation: &[Turn]) -> Result<Generation, ModelError> {
            let last = conversation.last().map(|t| t.text.as_str()).unwrap_or_default();
            Ok(Generation {
                text: format!("answer to: {last}"),
                model: "echo".into(),
                tokens: Some(7),
            })
        }
    }

    async fn app_with(adapters: ModelAdapters, vars: &[(&str, &str)]) -> Router {
        let vars: Vec<(String, String)> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        let config = Config::from_lookup(|key| vars.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone()));
        let store = SqliteStore::connect("sqlite::memory:").await.expect("store");
        let pipeline = ModerationPipeline::new(Arc::new(store), adapters, config.pipeline_config());
        build(Arc::new(AppState {
            config: Arc::new(config),
            pipeline: Arc::new(pipeline),
        }))
    }

    async fn app() -> Router {
        app_with(
            ModelAdapters::from_shared(Arc::new(EchoModel)),
            &[("EDU_API_TOKENS", "tok-1:alice")],
        )
        .await
    }

    fn post_reply(token: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::post("/v1/edu/reply").header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn json_body(resp: axum::response::Response) -> Value {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_route_responds() {
        let resp = app()
            .await
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(resp.headers().contains_key(trace::X_TRACE_ID));
        let body = json_body(resp).await;
        assert_eq!(body["database"], "ok");
        assert_eq!(body["model_configured"], true);
    }

    #[tokio::test]
    async fn trace_id_is_propagated() {
        let id = "2f1c6c1e-9d7a-4a5e-8d43-6b1a0c6f9e11";
        let resp = app()
            .await
            .oneshot(Request::get("/health").header(trace::X_TRACE_ID, id).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.headers()[trace::X_TRACE_ID], id);
    }

    #[tokio::test]
    async fn anonymous_reply_gets_sign_in_notice() {
        let resp = app()
            .await
            .oneshot(post_reply(None, json!({ "data": { "chatId": "c1", "message": "what is algebra?" } })))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            json_body(resp).await,
            json!({ "result": { "text": AUTH_REQUIRED_MESSAGE, "refused": true, "persisted": false } })
        );
    }

    #[tokio::test]
    async fn authenticated_reply_round_trip() {
        let app = app().await;

        let resp = app
            .clone()
            .oneshot(post_reply(Some("tok-1"), json!({ "data": { "chatId": "c1", "message": "what is algebra?" } })))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            json_body(resp).await,
            json!({ "result": {
                "text": "answer to: what is algebra?",
                "refused": false,
                "tokens": 7,
                "model": "echo",
                "persisted": true,
            } })
        );

        let resp = app
            .oneshot(
                Request::get("/v1/edu/chats/c1/messages")
                    .header("authorization", "Bearer tok-1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        let messages = body.as_array().expect("array");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "user");
        assert_eq!(messages[1]["role"], "model");
        assert_eq!(messages[1]["model"], "echo");
    }

    #[tokio::test]
    async fn unconfigured_model_answers_unavailable() {
        let app = app_with(ModelAdapters::unconfigured(), &[("EDU_API_TOKENS", "tok-1:alice")]).await;
        let resp = app
            .oneshot(post_reply(Some("tok-1"), json!({ "data": { "chatId": "c1", "message": "what is algebra?" } })))
            .await
            .unwrap();
        let body = json_body(resp).await;
        assert_eq!(body["result"]["text"], UNAVAILABLE_MESSAGE);
        assert_eq!(body["result"]["persisted"], true);
    }

    #[tokio::test]
    async fn malformed_envelope_is_a_bad_request() {
        let req = Request::post("/v1/edu/reply")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let resp = app().await.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn history_requires_identity() {
        let resp = app()
            .await
            .oneshot(Request::get("/v1/edu/chats/c1/messages").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn swagger_can_be_disabled() {
        let resp = app()
            .await
            .oneshot(Request::get("/api-docs/openapi.json").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let app = app_with(ModelAdapters::unconfigured(), &[("EDU_ENABLE_SWAGGER", "false")]).await;
        let resp = app
            .oneshot(Request::get("/api-docs/openapi.json").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
