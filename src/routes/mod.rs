//! Router assembly: HTTP endpoints, WebSocket upgrade, static files, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

pub mod http;
pub mod ws;

/// Build the application router with:
/// - WebSocket at `/ws`
/// - REST-ish API under `/api/v1/...`
/// - Static SPA from `./static` with index fallback
/// - CORS (allow any origin/method/headers); tighten for production if needed
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
    // Static files with SPA fallback
    let static_service = ServeDir::new("./static")
        .append_index_html_on_directories(true)
        .not_found_service(ServeFile::new("./static/index.html"));

    Router::new()
        // WebSocket
        .route("/ws", get(ws::ws_upgrade))
        // HTTP API: learner paths
        .route("/api/v1/health", get(http::http_health))
        .route("/api/v1/paths", post(http::http_create_path))
        .route("/api/v1/paths/generate", post(http::http_generate_path))
        .route("/api/v1/users/:owner_id/paths", get(http::http_list_paths))
        .route("/api/v1/paths/:path_id", get(http::http_get_path))
        .route("/api/v1/paths/:path_id/extend", post(http::http_extend_path))
        .route(
            "/api/v1/paths/:path_id/gate",
            get(http::http_get_gate).post(http::http_attempt_gate),
        )
        .route("/api/v1/paths/:path_id/nodes/:node_id", axum::routing::delete(http::http_delete_node))
        .route("/api/v1/paths/:path_id/nodes/:node_id/complete", post(http::http_complete_node))
        .route("/api/v1/paths/:path_id/nodes/:node_id/secret", post(http::http_solve_secret))
        .route("/api/v1/paths/:path_id/nodes/:node_id/regenerate", post(http::http_regenerate_node))
        .route("/api/v1/paths/:path_id/nodes/:node_id/click", post(http::http_click_node))
        .route("/api/v1/paths/:path_id/nodes/:node_id/flashcards", get(http::http_flashcards))
        // HTTP API: teacher side
        .route("/api/v1/courses/:course_id", put(http::http_put_course))
        .route("/api/v1/courses/:course_id/mastery", get(http::http_course_mastery))
        .route("/api/v1/courses/:course_id/progress/:student_id", put(http::http_put_progress))
        // State + CORS + HTTP tracing
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        // Frontend fallback
        .fallback_service(static_service)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let req = match body {
            Some(v) => builder
                .header("content-type", "application/json")
                .body(Body::from(v.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn app() -> Router {
        build_router(Arc::new(AppState::for_tests().await))
    }

    fn three_nodes() -> Value {
        json!({
            "ownerId": "learner-1",
            "topic": "Graphs",
            "nodes": [
                {"title": "A", "description": "a", "kind": "theory"},
                {"title": "B", "description": "b", "kind": "practice"},
                {"title": "C", "description": "c", "kind": "challenge"}
            ]
        })
    }

    #[tokio::test]
    async fn health_reports_ai_disabled() {
        let app = app().await;
        let (status, body) = call(&app, "GET", "/api/v1/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"ok": true, "ai_enabled": false}));
    }

    #[tokio::test]
    async fn create_complete_and_read_back() {
        let app = app().await;
        let (status, created) = call(&app, "POST", "/api/v1/paths", Some(three_nodes())).await;
        assert_eq!(status, StatusCode::OK);
        let path_id = created["path"]["id"].as_str().unwrap().to_string();
        let first = created["path"]["nodes"][0]["id"].as_str().unwrap().to_string();
        let last = created["path"]["nodes"][2]["id"].as_str().unwrap().to_string();

        let (status, body) =
            call(&app, "POST", &format!("/api/v1/paths/{path_id}/nodes/{last}/complete"), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation_error");

        let (status, body) =
            call(&app, "POST", &format!("/api/v1/paths/{path_id}/nodes/{first}/complete"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["accessStates"], json!(["DONE", "AVAILABLE", "LOCKED"]));

        let (_, listed) = call(&app, "GET", "/api/v1/users/learner-1/paths", None).await;
        assert_eq!(listed[0]["completed"], 1);
    }

    #[tokio::test]
    async fn empty_path_is_a_bad_request() {
        let app = app().await;
        let body = json!({"ownerId": "learner-1", "topic": "x", "nodes": []});
        let (status, _) = call(&app, "POST", "/api/v1/paths", Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn deleting_below_three_nodes_conflicts() {
        let app = app().await;
        let (_, created) = call(&app, "POST", "/api/v1/paths", Some(three_nodes())).await;
        let path_id = created["path"]["id"].as_str().unwrap();
        let node_id = created["path"]["nodes"][1]["id"].as_str().unwrap();
        let (status, body) =
            call(&app, "DELETE", &format!("/api/v1/paths/{path_id}/nodes/{node_id}"), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "invariant_violation");
    }

    #[tokio::test]
    async fn path_reads_never_carry_answer_keys() {
        let app = app().await;
        let body = json!({"ownerId": "learner-1", "topic": "Rust"});
        let (status, created) = call(&app, "POST", "/api/v1/paths/generate", Some(body)).await;
        assert_eq!(status, StatusCode::OK);
        let path_id = created["path"]["id"].as_str().unwrap().to_string();

        let (status, _) = call(&app, "GET", &format!("/api/v1/paths/{path_id}/gate"), None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, fetched) = call(&app, "GET", &format!("/api/v1/paths/{path_id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        for body in [created, fetched] {
            let text = body.to_string();
            assert!(!text.contains("a hole"));
            assert!(!text.contains("answerIndex"));
        }
    }

    #[tokio::test]
    async fn unknown_path_is_not_found() {
        let app = app().await;
        let (status, body) = call(&app, "GET", "/api/v1/paths/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "path not found: nope");
    }

    #[tokio::test]
    async fn extend_without_body_uses_the_default_batch() {
        let app = app().await;
        let (_, created) = call(&app, "POST", "/api/v1/paths", Some(three_nodes())).await;
        let path_id = created["path"]["id"].as_str().unwrap();
        let (status, body) = call(&app, "POST", &format!("/api/v1/paths/{path_id}/extend"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["path"]["nodes"].as_array().unwrap().len(), 6);
    }

    #[tokio::test]
    async fn course_mastery_for_demo_course() {
        let app = app().await;
        let (status, body) = call(&app, "GET", "/api/v1/courses/demo-course/mastery", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["view"]["totalStudents"], 3);
        assert_eq!(body["nodes"][2]["visualKind"], "challenge");
        assert_eq!(body["nodes"][2]["weakSpot"], true);
        assert_eq!(body["nodes"][0]["visualState"], "DONE");
    }

    #[tokio::test]
    async fn progress_put_must_match_url_student() {
        let app = app().await;
        let body = json!({"studentId": "someone", "completedLessons": ["l1"]});
        let (status, _) =
            call(&app, "PUT", "/api/v1/courses/demo-course/progress/student-9", Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
