pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::editing::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Edit API
        .route("/api/v1/edits", post(handlers::handle_generate_edits))
        .route("/api/v1/edits/stream", post(handlers::handle_stream_edits))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
        response::Response,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::config::EditPolicy;
    use crate::editing::EditOrchestrator;
    use crate::llm_client::scripted::ScriptedGenerator;

    const PLAN_CHAT: &str = r#"{"needs_questions":false,"changes_needed":false,"reasoning":"chat"}"#;
    const CHAT: &str = r#"{"action":"chat","assistant_message":"Looks good to me."}"#;

    fn router(llm: ScriptedGenerator) -> Router {
        let orchestrator = EditOrchestrator::new(Arc::new(llm), EditPolicy::default());
        build_router(AppState {
            orchestrator: Arc::new(orchestrator),
        })
    }

    async fn post_json(app: Router, uri: &str, body: Value) -> Response {
        app.oneshot(
            Request::post(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = router(ScriptedGenerator::default())
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("resume-edit-api"));
    }

    #[tokio::test]
    async fn test_edit_returns_result() {
        let app = router(ScriptedGenerator::new([PLAN_CHAT, CHAT]));
        let response = post_json(
            app,
            "/api/v1/edits",
            json!({"resume_text": "Summary\nRust engineer", "message": "thoughts?"}),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body["assistant_message"], "Looks good to me.");
        assert_eq!(body["cancelled"], false);
        assert_eq!(body["patches"], json!([]));
    }

    #[tokio::test]
    async fn test_edit_with_empty_message_is_bad_request() {
        let app = router(ScriptedGenerator::default());
        let response = post_json(
            app,
            "/api/v1/edits",
            json!({"resume_text": "Summary", "message": ""}),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_stream_emits_chunks_then_result() {
        let app = router(ScriptedGenerator::new([PLAN_CHAT, CHAT]).streaming(6));
        let response = post_json(
            app,
            "/api/v1/edits/stream",
            json!({"resume_text": "Summary\nRust engineer", "message": "thoughts?"}),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/event-stream"));

        let text = body_text(response).await;
        let first_chunk = text.find("event: chunk").unwrap();
        let result = text.find("event: result").unwrap();
        assert!(first_chunk < result);
        assert!(!text.contains("event: error"));
    }

    #[tokio::test]
    async fn test_stream_reports_errors_as_events() {
        let app = router(
            ScriptedGenerator::default()
                .then_fail("overloaded")
                .then_fail("overloaded")
                .then_fail("overloaded"),
        );
        let response = post_json(
            app,
            "/api/v1/edits/stream",
            json!({"resume_text": "Summary", "message": "fix it"}),
        )
        .await;
        let text = body_text(response).await;
        assert!(text.contains("event: error"));
        assert!(text.contains("LLM_ERROR"));
        assert!(!text.contains("event: result"));
    }
}
