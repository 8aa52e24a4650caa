//! Router assembly: HTTP endpoints, WebSocket upgrade, static files, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

pub mod http;
pub mod ws;

/// Room for multipart framing around the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Build the application router with:
/// - WebSocket at `/ws`
/// - REST-ish API under `/api/v1/...`
/// - Static SPA from `./static` with index fallback
/// - CORS (allow any origin/method/headers), adjust for production if needed
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
    // Static files with SPA fallback
    let static_service = ServeDir::new("./static")
        .append_index_html_on_directories(true)
        .not_found_service(ServeFile::new("./static/index.html"));

    let upload_limit = state.generator.max_upload_bytes + MULTIPART_OVERHEAD;

    Router::new()
        // WebSocket
        .route("/ws", get(ws::ws_upgrade))
        // HTTP API
        .route("/api/v1/health", get(http::http_health))
        .route("/api/v1/quizzes", get(http::http_list_quizzes).post(http::http_post_quiz))
        .route("/api/v1/quizzes/:id", get(http::http_get_quiz))
        .route("/api/v1/sessions", post(http::http_start_session))
        .route("/api/v1/sessions/:id", get(http::http_get_session).delete(http::http_delete_session))
        .route("/api/v1/sessions/:id/select", post(http::http_post_select))
        .route("/api/v1/sessions/:id/next", post(http::http_post_next))
        .route("/api/v1/sessions/:id/skip", post(http::http_post_skip))
        .route("/api/v1/sessions/:id/finish", post(http::http_post_finish))
        .route("/api/v1/users/:id", get(http::http_get_user))
        .route("/api/v1/leaderboard", get(http::http_get_leaderboard))
        .route("/api/v1/ranks/refresh", post(http::http_post_rank_refresh))
        .route(
            "/api/v1/quiz/generate",
            post(http::http_post_generate).layer(DefaultBodyLimit::max(upload_limit)),
        )
        // State + CORS + HTTP tracing
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                        .on_request(DefaultOnRequest::new().level(Level::INFO))
                        .on_response(DefaultOnResponse::new().level(Level::INFO)),
                )
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                ),
        )
        // Frontend fallback
        .fallback_service(static_service)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::{header, Method, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::session::tests::sample_quiz;
    use crate::state::tests::test_state;

    async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(v) => {
                req = req.header(header::CONTENT_TYPE, "application/json");
                Body::from(v.to_string())
            }
            None => Body::empty(),
        };
        let resp = app.clone().oneshot(req.body(body).unwrap()).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
        (status, value)
    }

    fn multipart(field: &str, content_type: &str, data: &[u8]) -> Request<Body> {
        let boundary = "quizforge-boundary";
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{field}\"; filename=\"notes.pdf\"\r\n").as_bytes(),
        );
        body.extend_from_slice(format!("Content-Type: {content_type}\r\n\r\n").as_bytes());
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
        Request::builder()
            .method(Method::POST)
            .uri("/api/v1/quiz/generate")
            .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={boundary}"))
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn health_reports_inventory() {
        let app = build_router(Arc::new(test_state().await));
        let (status, body) = call(&app, Method::GET, "/api/v1/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
        assert_eq!(body["quizzes"], 2);
        assert_eq!(body["generationEnabled"], false);
    }

    #[tokio::test]
    async fn quiz_listing_filters_and_hides_questions() {
        let app = build_router(Arc::new(test_state().await));
        let (status, body) = call(&app, Method::GET, "/api/v1/quizzes?category=science", None).await;
        assert_eq!(status, StatusCode::OK);
        let list = body.as_array().unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0]["id"], "seed-science");
        assert_eq!(list[0]["questionCount"], 3);
        assert!(list[0].get("questions").is_none());

        let (status, body) = call(&app, Method::GET, "/api/v1/quizzes/seed-math", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["questions"].as_array().unwrap().len(), 4);

        let (status, body) = call(&app, Method::GET, "/api/v1/quizzes/missing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("missing"));
    }

    #[tokio::test]
    async fn manual_quiz_creation() {
        let app = build_router(Arc::new(test_state().await));
        let quiz = json!({
            "title": "Capitals",
            "category": "Geography",
            "questions": [
                { "questionText": "Capital of France?", "options": ["Paris", "Rome", "Madrid", "Berlin"], "correctOption": 0 }
            ]
        });
        let (status, body) = call(&app, Method::POST, "/api/v1/quizzes", Some(quiz)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["timeEstimate"], "2 min");

        let bad = json!({
            "title": "Broken",
            "questions": [ { "questionText": "?", "options": ["a", "b", "c", "d"], "correctOption": 9 } ]
        });
        let (status, _) = call(&app, Method::POST, "/api/v1/quizzes", Some(bad)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn full_attempt_over_http() {
        let app = build_router(Arc::new(test_state().await));

        let (status, session) = call(
            &app,
            Method::POST,
            "/api/v1/sessions",
            Some(json!({ "quizId": "seed-science", "userId": "alice" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(session["questionIndex"], 0);
        assert!(session["question"].get("correctOption").is_none());
        let id = session["sessionId"].as_str().unwrap().to_string();

        // Correct, then a skip, then wrong.
        let (_, sel) = call(&app, Method::POST, &format!("/api/v1/sessions/{id}/select"), Some(json!({ "option": 2 }))).await;
        assert_eq!(sel["correct"], true);
        assert_eq!(sel["session"]["question"]["correctOption"], 2);

        let (status, _) = call(&app, Method::POST, &format!("/api/v1/sessions/{id}/select"), Some(json!({ "option": 9 }))).await;
        assert_eq!(status, StatusCode::OK, "revealed question ignores further selections");

        call(&app, Method::POST, &format!("/api/v1/sessions/{id}/next"), None).await;
        let (_, skipped) = call(&app, Method::POST, &format!("/api/v1/sessions/{id}/skip"), None).await;
        assert_eq!(skipped["questionIndex"], 2);

        let (status, _) = call(&app, Method::POST, &format!("/api/v1/sessions/{id}/select"), Some(json!({ "option": 9 }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (_, sel) = call(&app, Method::POST, &format!("/api/v1/sessions/{id}/select"), Some(json!({ "option": 0 }))).await;
        assert_eq!(sel["correct"], false);

        let (status, result) = call(&app, Method::POST, &format!("/api/v1/sessions/{id}/finish"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(result["score"], 1);
        assert_eq!(result["totalQuestions"], 3);
        assert_eq!(result["percentage"], 33);
        assert_eq!(result["xpEarned"], 100);
        assert_eq!(result["totalXP"], 100);
        assert_eq!(result["level"], 1);
        assert_eq!(result["rank"], 1);
        assert_eq!(result["rankChange"], "same");

        let (status, _) = call(&app, Method::POST, &format!("/api/v1/sessions/{id}/finish"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, profile) = call(&app, Method::GET, "/api/v1/users/alice", None).await;
        assert_eq!(profile["quizzesCompleted"], 1);
        assert_eq!(profile["quizPerformance"][0]["quizId"], "seed-science");
    }

    #[tokio::test]
    async fn empty_quiz_and_unknown_session() {
        let state = test_state().await;
        let mut empty = sample_quiz(0);
        empty.id = "empty".into();
        state.store.insert_quiz(empty).await.unwrap();
        let app = build_router(Arc::new(state));

        let (status, _) = call(
            &app,
            Method::POST,
            "/api/v1/sessions",
            Some(json!({ "quizId": "empty", "userId": "u1" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, _) = call(&app, Method::GET, "/api/v1/sessions/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = call(&app, Method::DELETE, "/api/v1/sessions/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unknown_user_gets_baseline_profile() {
        let app = build_router(Arc::new(test_state().await));
        let (status, profile) = call(&app, Method::GET, "/api/v1/users/ghost", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(profile["level"], 1);
        assert_eq!(profile["totalXP"], 0);
    }

    #[tokio::test]
    async fn leaderboard_and_rank_refresh() {
        let state = Arc::new(test_state().await);
        let app = build_router(state.clone());

        for (user, answers) in [("alice", vec![2, 2, 1]), ("bob", vec![2, 0, 0])] {
            let shared = state.start_session("seed-science", user).await.unwrap();
            let id = {
                let mut s = shared.lock().await;
                for a in answers {
                    s.select_option(a).unwrap();
                    s.advance();
                }
                s.id.clone()
            };
            state.finish_session(&id).await.unwrap();
        }

        let (status, body) = call(&app, Method::GET, "/api/v1/leaderboard?range=all", None).await;
        assert_eq!(status, StatusCode::OK);
        let entries = body["entries"].as_array().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["userId"], "alice");
        assert_eq!(entries[0]["points"], 300);
        assert_eq!(entries[1]["rank"], 2);

        let (_, body) = call(&app, Method::GET, "/api/v1/leaderboard?range=week&limit=1", None).await;
        assert_eq!(body["entries"].as_array().unwrap().len(), 1);

        let (status, body) = call(&app, Method::POST, "/api/v1/ranks/refresh", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["updated"], 2);
        assert_eq!(body["failed"], json!([]));
    }

    #[tokio::test]
    async fn generate_rejects_bad_uploads_before_model() {
        let app = build_router(Arc::new(test_state().await));

        let resp = app.clone().oneshot(multipart("file", "application/pdf", b"%PDF-1.4")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = app.clone().oneshot(multipart("pdf", "text/plain", b"hello")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["success"], false);

        // Valid upload, but no model configured.
        let resp = app.clone().oneshot(multipart("pdf", "application/pdf", b"%PDF-1.4")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
