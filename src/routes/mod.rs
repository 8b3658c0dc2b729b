//! API routes

use std::convert::Infallible;

use axum::{
    body::Body,
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
    Router,
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::core::{
    ChatError, ChatLogError, ChatRecord, Exchange, ExchangeRequest, Fragment, ANONYMOUS_SENDER,
};
use crate::AppState;

const DEFAULT_CHAT_LIMIT: u32 = 50;
const MAX_CHAT_LIMIT: u32 = 500;
const MAX_THREAD_ID_LEN: usize = 128;

const X_ACCEL_BUFFERING: &str = "x-accel-buffering";
const X_THREAD_ID: &str = "x-thread-id";
const X_TOPIC: &str = "x-topic";
const X_MODEL_TIER: &str = "x-model-tier";

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    provider: String,
    active_threads: usize,
}

/// Body of `POST /agent/chat`
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default)]
    pub thread_id: Option<String>,
}

/// Body of `POST /agents/chat`, where the sender is mandatory
#[derive(Debug, Deserialize)]
pub struct SenderChatRequest {
    pub sender: String,
    pub message: String,
    #[serde(default)]
    pub thread_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChatsQuery {
    pub limit: Option<u32>,
}

/// Errors returned as `{"detail": "..."}`
#[derive(Debug)]
pub enum ApiError {
    Validation(String),
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            ApiError::Validation(detail) => (StatusCode::UNPROCESSABLE_ENTITY, detail),
            ApiError::NotFound(detail) => (StatusCode::NOT_FOUND, detail),
            ApiError::Conflict(detail) => (StatusCode::CONFLICT, detail),
            ApiError::Internal(detail) => (StatusCode::INTERNAL_SERVER_ERROR, detail),
        };
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::EmptyMessage => ApiError::Validation(err.to_string()),
            ChatError::Session(_) => {
                tracing::error!("Exchange setup failed: {}", err);
                ApiError::Internal(err.to_string())
            }
        }
    }
}

impl From<ChatLogError> for ApiError {
    fn from(err: ChatLogError) -> Self {
        tracing::error!("Chat log read failed: {}", err);
        ApiError::Internal(err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        provider: state.chat_engine.provider_name().to_string(),
        active_threads: state.chat_engine.sessions().len().await,
    })
}

async fn agent_chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload?;
    let sender = request
        .sender
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| ANONYMOUS_SENDER.to_string());

    start(&state, request.message, sender, request.thread_id).await
}

async fn agents_chat(
    State(state): State<AppState>,
    payload: Result<Json<SenderChatRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload?;
    if request.sender.trim().is_empty() {
        return Err(ApiError::Validation("sender must not be empty".into()));
    }

    start(&state, request.message, request.sender, request.thread_id).await
}

async fn start(
    state: &AppState,
    message: String,
    sender: String,
    thread_id: Option<String>,
) -> Result<Response, ApiError> {
    if message.is_empty() {
        return Err(ApiError::Validation("message must not be empty".into()));
    }
    if let Some(ref id) = thread_id {
        validate_thread_id(id)?;
    }

    let exchange = state
        .chat_engine
        .start_exchange(ExchangeRequest {
            message,
            sender,
            thread_id,
        })
        .await?;

    Ok(stream_response(exchange))
}

/// Thread ids are echoed in a response header, so they must be header-safe
fn validate_thread_id(id: &str) -> Result<(), ApiError> {
    let valid = !id.is_empty()
        && id.len() <= MAX_THREAD_ID_LEN
        && id.bytes().all(|b| b.is_ascii_graphic());
    if valid {
        Ok(())
    } else {
        Err(ApiError::Validation(format!(
            "thread_id must be 1-{} visible ASCII characters",
            MAX_THREAD_ID_LEN
        )))
    }
}

/// Plain-text body, one write per fragment, with intermediary buffering disabled
fn stream_response(exchange: Exchange) -> Response {
    let Exchange {
        thread_id,
        classification,
        tier,
        fragments,
        ..
    } = exchange;

    let body = Body::from_stream(
        fragments.map(|fragment: Fragment| Ok::<_, Infallible>(fragment.into_text())),
    );

    let mut response = Response::new(body);
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(HeaderName::from_static(X_ACCEL_BUFFERING), HeaderValue::from_static("no"));
    headers.insert(
        HeaderName::from_static(X_TOPIC),
        HeaderValue::from_static(classification.topic.as_str()),
    );
    headers.insert(HeaderName::from_static(X_MODEL_TIER), HeaderValue::from_static(tier.as_str()));
    if let Ok(value) = HeaderValue::from_str(&thread_id) {
        headers.insert(HeaderName::from_static(X_THREAD_ID), value);
    }
    response
}

async fn list_chats(
    State(state): State<AppState>,
    query: Result<Query<ChatsQuery>, QueryRejection>,
) -> Result<Json<Vec<ChatRecord>>, ApiError> {
    let Query(query) = query?;
    let limit = query.limit.unwrap_or(DEFAULT_CHAT_LIMIT);
    if !(1..=MAX_CHAT_LIMIT).contains(&limit) {
        return Err(ApiError::Validation(format!(
            "limit must be between 1 and {}",
            MAX_CHAT_LIMIT
        )));
    }

    Ok(Json(state.chat_log.recent(limit).await?))
}

async fn evict_thread(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    match state.chat_engine.sessions().evict(&thread_id).await {
        Ok(true) => Ok(StatusCode::NO_CONTENT),
        Ok(false) => Err(ApiError::NotFound(format!("Unknown thread {}", thread_id))),
        Err(e) => Err(ApiError::Conflict(e.to_string())),
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/agent/chat", post(agent_chat))
        .route("/agents/chat", post(agents_chat))
        .route("/agents/chats", get(list_chats))
        .route("/agent/threads/:thread_id", delete(evict_thread))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::to_bytes;
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::conversation::SessionStore;
    use crate::core::{ChatEngine, ChatLog, StreamingResponder, TierModels};
    use crate::providers::scripted::ScriptedProvider;

    async fn app(provider: ScriptedProvider) -> (Router, AppState) {
        let chat_log = Arc::new(ChatLog::new_in_memory().await.unwrap());
        let engine = ChatEngine::new(
            StreamingResponder::new(Arc::new(provider), Duration::from_secs(5)),
            Arc::new(SessionStore::new()),
            chat_log.clone(),
            TierModels::default(),
            "You are a mentor.",
        )
        .with_session_wait(Duration::from_millis(50));

        let state = AppState {
            chat_engine: Arc::new(engine),
            chat_log,
        };
        (router().with_state(state.clone()), state)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_string(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn body_json(response: Response) -> Value {
        serde_json::from_str(&body_string(response).await).unwrap()
    }

    /// The log write happens after the body is finished, so poll for it
    async fn wait_for_records(state: &AppState, count: usize) -> Vec<ChatRecord> {
        for _ in 0..100 {
            let records = state.chat_log.recent(MAX_CHAT_LIMIT).await.unwrap();
            if records.len() >= count {
                return records;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("chat log never reached {} records", count);
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _) = app(ScriptedProvider::new(["unused"])).await;
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["provider"], "scripted");
        assert_eq!(body["active_threads"], 0);
    }

    #[tokio::test]
    async fn test_chat_streams_plain_text() {
        let (app, state) = app(ScriptedProvider::new(["AI is ", "a broad field."])).await;

        let response = app
            .oneshot(post_json(
                "/agent/chat",
                json!({ "message": "What is AI?", "thread_id": "web-1" }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers[header::CONTENT_TYPE], "text/plain; charset=utf-8");
        assert_eq!(headers[header::CACHE_CONTROL], "no-cache");
        assert_eq!(headers["x-accel-buffering"], "no");
        assert_eq!(headers["x-thread-id"], "web-1");
        assert_eq!(headers["x-topic"], "ai_ml");
        assert_eq!(headers["x-model-tier"], "capable");

        assert_eq!(body_string(response).await, "AI is a broad field.");

        let records = wait_for_records(&state, 1).await;
        assert_eq!(records[0].sender, ANONYMOUS_SENDER);
        assert_eq!(records[0].bot_message.as_deref(), Some("AI is a broad field."));
    }

    #[tokio::test]
    async fn test_mid_stream_failure_is_in_body_and_log() {
        let (app, state) = app(
            ScriptedProvider::new(["first ", "second "]).failing_with("upstream closed"),
        )
        .await;

        let response = app
            .oneshot(post_json(
                "/agents/chat",
                json!({ "sender": "maria", "message": "How does quicksort work?" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-model-tier"], "fast");

        let body = body_string(response).await;
        assert_eq!(body, "first second Error: Invalid response: upstream closed");

        let records = wait_for_records(&state, 1).await;
        assert_eq!(records[0].sender, "maria");
        assert_eq!(records[0].bot_message.as_deref(), Some(body.as_str()));
    }

    #[tokio::test]
    async fn test_empty_message_rejected() {
        let (app, state) = app(ScriptedProvider::new(["unused"])).await;

        let response = app
            .oneshot(post_json("/agent/chat", json!({ "message": "" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body_json(response).await["detail"], "message must not be empty");
        assert!(state.chat_log.recent(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_bodies_rejected() {
        let (app, _) = app(ScriptedProvider::new(["unused"])).await;

        let response = app
            .clone()
            .oneshot(post_json("/agents/chat", json!({ "message": "hi" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body_json(response).await["detail"].is_string());

        let request = Request::post("/agent/chat")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let response = app
            .oneshot(post_json(
                "/agent/chat",
                json!({ "message": "hi", "thread_id": "has spaces" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_busy_thread_returns_500() {
        let (app, state) = app(ScriptedProvider::new(["unused"])).await;
        let _held = state
            .chat_engine
            .sessions()
            .acquire("locked", Duration::from_secs(1))
            .await
            .unwrap();

        let response = app
            .oneshot(post_json(
                "/agent/chat",
                json!({ "message": "hello", "thread_id": "locked" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body_json(response).await["detail"]
            .as_str()
            .unwrap()
            .contains("busy"));
    }

    #[tokio::test]
    async fn test_list_chats_newest_first() {
        let (app, state) = app(ScriptedProvider::new(["unused"])).await;
        for i in 0..3 {
            state
                .chat_log
                .record("sam", &format!("q{}", i), Some("a"))
                .await
                .unwrap();
        }

        let response = app
            .clone()
            .oneshot(Request::get("/agents/chats?limit=2").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let chats = body_json(response).await;
        let chats = chats.as_array().unwrap();
        assert_eq!(chats.len(), 2);
        assert_eq!(chats[0]["user_message"], "q2");
        assert_eq!(chats[1]["user_message"], "q1");

        let response = app
            .oneshot(Request::get("/agents/chats?limit=0").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_evict_thread() {
        let (app, state) = app(ScriptedProvider::new(["unused"])).await;
        state.chat_engine.sessions().create("old").await;

        let evict = || {
            Request::delete("/agent/threads/old")
                .body(Body::empty())
                .unwrap()
        };

        let response = app.clone().oneshot(evict()).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app.oneshot(evict()).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_evict_busy_thread_conflicts() {
        let (app, state) = app(ScriptedProvider::new(["unused"])).await;
        let held = state
            .chat_engine
            .sessions()
            .acquire("live", Duration::from_secs(1))
            .await
            .unwrap();

        let response = app
            .clone()
            .oneshot(
                Request::delete("/agent/threads/live")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert!(body_json(response).await["detail"]
            .as_str()
            .unwrap()
            .contains("in progress"));

        // Still serialized: a new exchange on the thread waits and gives up
        let response = app
            .oneshot(post_json(
                "/agent/chat",
                json!({ "message": "hello", "thread_id": "live" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        drop(held);
    }

    #[tokio::test]
    async fn test_whitespace_message_accepted() {
        let (app, _) = app(ScriptedProvider::new(["Ask away."])).await;

        let response = app
            .oneshot(post_json("/agent/chat", json!({ "message": "   " })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-topic"], "general");
        assert_eq!(body_string(response).await, "Ask away.");
    }
}
