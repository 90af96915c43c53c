//! REST API server for the assistant relay
//!
//! Exposes registration, token issuance, the streaming query endpoint, and
//! end-of-conversation summarization over HTTP.

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Form, Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::auth::{auth_middleware, AuthState, AuthUser};
use crate::error::AssistantError;
use crate::memory::{ContextWindow, SummaryPipeline};
use crate::models::Turn;
use crate::relay::CompletionRelay;
use crate::users::UserStore;

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub user_message: Option<String>,
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub window: Arc<ContextWindow>,
    pub relay: Arc<CompletionRelay>,
    pub summarizer: Arc<SummaryPipeline>,
    pub users: Arc<UserStore>,
    pub auth: AuthState,
}

/// =============================
/// Error Mapping
/// =============================

fn status_for(error: &AssistantError) -> StatusCode {
    match error {
        AssistantError::CallerInput(_) | AssistantError::EmptyContext => StatusCode::BAD_REQUEST,
        AssistantError::Auth(_) => StatusCode::UNAUTHORIZED,
        AssistantError::Upstream(_)
        | AssistantError::Store(_)
        | AssistantError::Internal(_)
        | AssistantError::Serialization(_)
        | AssistantError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_reply(error: &AssistantError) -> (StatusCode, Json<serde_json::Value>) {
    (
        status_for(error),
        Json(serde_json::json!({ "error": error.to_string() })),
    )
}

/// =============================
/// Health Endpoint
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Account Endpoints
/// =============================

async fn register(
    State(state): State<ApiState>,
    Json(req): Json<RegisterRequest>,
) -> (StatusCode, Json<serde_json::Value>) {
    match state.users.create(&req.username, &req.password).await {
        Ok(user) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "message": "User registered successfully",
                "user_id": user.id,
            })),
        ),
        Err(e) => error_reply(&e),
    }
}

async fn issue_token(
    State(state): State<ApiState>,
    Form(req): Form<TokenRequest>,
) -> (StatusCode, Json<serde_json::Value>) {
    match state.users.verify(&req.username, &req.password).await {
        Ok(Some(user)) => match state.auth.generate_token(&user.username) {
            Ok(token) => (
                StatusCode::OK,
                Json(serde_json::json!({
                    "access_token": token,
                    "token_type": "bearer",
                })),
            ),
            Err(e) => error_reply(&e),
        },
        Ok(None) => error_reply(&AssistantError::Auth(
            "Incorrect username or password".to_string(),
        )),
        Err(e) => error_reply(&e),
    }
}

/// =============================
/// Conversation Endpoints
/// =============================

async fn send_query(
    State(state): State<ApiState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<QueryRequest>,
) -> Response {
    let (Some(model), Some(user_message)) = (
        req.model.filter(|m| !m.trim().is_empty()),
        req.user_message.filter(|m| !m.trim().is_empty()),
    ) else {
        return error_reply(&AssistantError::CallerInput(
            "Model and user_message must be provided.".to_string(),
        ))
        .into_response();
    };

    info!(username = %user.username, model = %model, "Received query");

    state.window.append(Turn::user(user_message)).await;
    let snapshot = state.window.snapshot().await;

    match state.relay.stream(&model, snapshot).await {
        Ok(fragments) => (
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            Body::from_stream(ReceiverStream::new(fragments)),
        )
            .into_response(),
        Err(e) => error_reply(&e).into_response(),
    }
}

async fn end_conversation(
    State(state): State<ApiState>,
    Extension(user): Extension<AuthUser>,
) -> (StatusCode, Json<serde_json::Value>) {
    let snapshot = state.window.snapshot().await;

    match state.summarizer.finish(&snapshot).await {
        Ok((id, summary)) => {
            info!(username = %user.username, %id, "Conversation ended");
            state.window.clear().await;

            (
                StatusCode::OK,
                Json(serde_json::json!({
                    "message": "Summary saved successfully",
                    "id": id,
                    "summary": summary,
                })),
            )
        }
        Err(e) => error_reply(&e),
    }
}

/// =============================
/// Router
/// =============================

pub fn create_router(state: ApiState) -> Router {
    let protected = Router::new()
        .route("/sendquery", post(send_query))
        .route("/endconversation", post(end_conversation))
        .route_layer(middleware::from_fn_with_state(
            state.auth.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/health", get(health))
        .route("/register", post(register))
        .route("/token", post(issue_token))
        .merge(protected)
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    state: ApiState,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::store::InMemorySummaryStore;
    use crate::provider::{CompletionProvider, FragmentReceiver};
    use async_trait::async_trait;
    use axum::http::Request;
    use futures::StreamExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;
    use tower::ServiceExt;

    #[derive(Clone)]
    enum Fragment {
        Text(&'static str),
        Fail(&'static str),
    }

    /// Emits a canned fragment script and counts upstream calls
    struct ScriptedProvider {
        fragments: Vec<Fragment>,
        summary: &'static str,
        complete_calls: AtomicUsize,
        stream_calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn new(fragments: Vec<Fragment>) -> Self {
            Self {
                fragments,
                summary: "Mluvili jsme o počasí a fotbale.",
                complete_calls: AtomicUsize::new(0),
                stream_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl CompletionProvider for ScriptedProvider {
        async fn complete(&self, _model: &str, _turns: &[Turn]) -> crate::Result<String> {
            self.complete_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.summary.to_string())
        }

        async fn stream(&self, _model: &str, _turns: &[Turn]) -> crate::Result<FragmentReceiver> {
            self.stream_calls.fetch_add(1, Ordering::SeqCst);

            let (tx, rx) = mpsc::channel(self.fragments.len().max(1));
            for fragment in &self.fragments {
                match fragment {
                    Fragment::Text(text) => tx.send(Ok(text.to_string())).await.unwrap(),
                    Fragment::Fail(message) => tx
                        .send(Err(AssistantError::Upstream(message.to_string())))
                        .await
                        .unwrap(),
                }
            }
            Ok(rx)
        }
    }

    struct TestHarness {
        router: Router,
        state: ApiState,
        provider: Arc<ScriptedProvider>,
        store: Arc<InMemorySummaryStore>,
    }

    fn harness(fragments: Vec<Fragment>) -> TestHarness {
        let provider = Arc::new(ScriptedProvider::new(fragments));
        let store = Arc::new(InMemorySummaryStore::new());

        let state = ApiState {
            window: Arc::new(ContextWindow::new()),
            relay: Arc::new(CompletionRelay::new(provider.clone())),
            summarizer: Arc::new(SummaryPipeline::new(provider.clone(), store.clone())),
            users: Arc::new(UserStore::in_memory()),
            auth: AuthState::new("test-secret-key-32-bytes-long!!", 3600),
        };

        TestHarness {
            router: create_router(state.clone()),
            state,
            provider,
            store,
        }
    }

    fn bearer(state: &ApiState) -> String {
        format!("Bearer {}", state.auth.generate_token("tester").unwrap())
    }

    fn query_request(auth: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/sendquery")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::AUTHORIZATION, auth)
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn end_request(auth: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/endconversation")
            .header(header::AUTHORIZATION, auth)
            .body(Body::empty())
            .unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let harness = harness(vec![]);
        let response = harness
            .router
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

    #[tokio::test]
    async fn test_send_query_requires_auth() {
        let harness = harness(vec![Fragment::Text("Ahoj")]);

        let request = Request::builder()
            .method("POST")
            .uri("/sendquery")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"model":"m1","user_message":"ahoj"}"#))
            .unwrap();
        let response = harness.router.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(harness.provider.stream_calls.load(Ordering::SeqCst), 0);
        assert!(harness.state.window.is_empty().await);
    }

    #[tokio::test]
    async fn test_send_query_missing_fields_rejected_before_upstream() {
        let harness = harness(vec![Fragment::Text("Ahoj")]);
        let auth = bearer(&harness.state);

        for body in [r#"{}"#, r#"{"model":"m1"}"#, r#"{"model":"","user_message":"x"}"#] {
            let response = harness
                .router
                .clone()
                .oneshot(query_request(&auth, body))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        }

        assert_eq!(harness.provider.stream_calls.load(Ordering::SeqCst), 0);
        assert!(harness.state.window.is_empty().await);
    }

    #[tokio::test]
    async fn test_send_query_streams_all_fragments_in_order() {
        let harness = harness(vec![
            Fragment::Text("Ahoj"),
            Fragment::Text(", "),
            Fragment::Text("jak se máš?"),
        ]);
        let auth = bearer(&harness.state);

        let response = harness
            .router
            .oneshot(query_request(
                &auth,
                r#"{"model":"m1","user_message":"hello"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok()),
            Some("text/plain; charset=utf-8")
        );

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], "Ahoj, jak se máš?".as_bytes());
        assert_eq!(harness.provider.stream_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_window_keeps_last_three_queries() {
        let harness = harness(vec![Fragment::Text("ok")]);
        let auth = bearer(&harness.state);

        for message in ["1", "2", "3", "4"] {
            let body = format!(r#"{{"model":"m1","user_message":"{}"}}"#, message);
            let response = harness
                .router
                .clone()
                .oneshot(query_request(&auth, &body))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let snapshot = harness.state.window.snapshot().await;
        let contents: Vec<&str> = snapshot.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["2", "3", "4"]);
    }

    #[tokio::test]
    async fn test_midstream_failure_keeps_flushed_fragments() {
        let harness = harness(vec![
            Fragment::Text("Ahoj"),
            Fragment::Fail("connection reset"),
        ]);
        let auth = bearer(&harness.state);

        let response = harness
            .router
            .oneshot(query_request(
                &auth,
                r#"{"model":"m1","user_message":"hello"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let mut frames = response.into_body().into_data_stream();
        let first = frames.next().await.unwrap().unwrap();
        assert_eq!(&first[..], b"Ahoj");

        let second = frames.next().await.unwrap();
        assert!(second.is_err());
    }

    #[tokio::test]
    async fn test_end_conversation_empty_window_no_calls() {
        let harness = harness(vec![]);
        let auth = bearer(&harness.state);

        let response = harness.router.oneshot(end_request(&auth)).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(harness.provider.complete_calls.load(Ordering::SeqCst), 0);
        assert_eq!(harness.store.len().await, 0);
    }

    #[tokio::test]
    async fn test_end_conversation_persists_and_clears_window() {
        let harness = harness(vec![Fragment::Text("ok")]);
        let auth = bearer(&harness.state);

        for message in ["počasí", "fotbal"] {
            let body = format!(r#"{{"model":"m1","user_message":"{}"}}"#, message);
            harness
                .router
                .clone()
                .oneshot(query_request(&auth, &body))
                .await
                .unwrap();
        }

        let response = harness
            .router
            .clone()
            .oneshot(end_request(&auth))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["message"], "Summary saved successfully");
        assert_eq!(json["summary"], "Mluvili jsme o počasí a fotbale.");
        assert!(json["id"].as_str().is_some());

        assert_eq!(harness.store.len().await, 1);
        assert!(harness.state.window.is_empty().await);

        // A second call right away finds nothing to summarize
        let repeat = harness.router.oneshot(end_request(&auth)).await.unwrap();
        assert_eq!(repeat.status(), StatusCode::BAD_REQUEST);
        assert_eq!(harness.provider.complete_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_register_then_token_then_authorized_call() {
        let harness = harness(vec![]);

        let response = harness
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/register")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(
                        r#"{"username":"operator","password":"tajne-heslo"}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = harness
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/token")
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from("username=operator&password=tajne-heslo"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["token_type"], "bearer");
        let token = json["access_token"].as_str().unwrap().to_string();

        // The issued token passes the gate; the empty window is a 400, not a 401
        let response = harness
            .router
            .oneshot(end_request(&format!("Bearer {}", token)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_token_with_wrong_password_rejected() {
        let harness = harness(vec![]);

        harness
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/register")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(
                        r#"{"username":"operator","password":"tajne-heslo"}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();

        let response = harness
            .router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/token")
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from("username=operator&password=spatne"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
