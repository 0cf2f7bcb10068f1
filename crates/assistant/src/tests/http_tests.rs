use super::*;
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};
use shared::{domain::SlideId, error::ProviderErrorKind};
use std::sync::Arc;
use tokio::{net::TcpListener, sync::Mutex};

#[derive(Clone, Default)]
struct ServerState {
    requests: Arc<Mutex<Vec<(String, Option<String>, Value)>>>,
}

async fn record(state: &ServerState, path: &str, headers: &HeaderMap, body: Value) {
    let auth = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    state
        .requests
        .lock()
        .await
        .push((path.to_string(), auth, body));
}

async fn handle_rewrite(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    record(&state, "rewrite", &headers, body.clone()).await;
    let instruction = body["instruction"].as_str().unwrap_or_default();
    Json(json!({ "content": format!("rewritten ({instruction})") }))
}

async fn handle_analyze() -> (StatusCode, Json<Value>) {
    (
        StatusCode::TOO_MANY_REQUESTS,
        Json(json!({ "error": { "code": "rate_limited", "message": "slow down" } })),
    )
}

async fn handle_headlines() -> (StatusCode, &'static str) {
    (StatusCode::OK, "not json at all")
}

async fn handle_suggestions(Json(body): Json<Value>) -> Json<Value> {
    let title = body["slide"]["title"].as_str().unwrap_or_default();
    Json(json!({
        "copilot": [format!("Tighten the {title} message")],
        "image": ["city skyline at dusk"],
        "research": []
    }))
}

async fn handle_slow_layout() -> Json<Value> {
    tokio::time::sleep(std::time::Duration::from_millis(500)).await;
    Json(json!({ "template": "split", "rationale": "" }))
}

async fn spawn_assistant_server() -> anyhow::Result<(String, ServerState)> {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let state = ServerState::default();
    let app = Router::new()
        .route("/api/v1/rewrite", post(handle_rewrite))
        .route("/api/v1/analyze", post(handle_analyze))
        .route("/api/v1/generate-headlines", post(handle_headlines))
        .route("/api/v1/suggestions", post(handle_suggestions))
        .route("/api/v1/suggest-layout", post(handle_slow_layout))
        .with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((format!("http://{addr}/api"), state))
}

fn slide() -> SlideContext {
    SlideContext {
        slide_id: SlideId::new(),
        title: "Welcome".into(),
        content: "We build decks".into(),
    }
}

#[test]
fn config_normalizes_base_path() {
    let config = AssistantConfig::new("http://localhost:9000/api").expect("config");
    assert_eq!(config.base_url.as_str(), "http://localhost:9000/api/");
    assert!(AssistantConfig::new("not a url").is_err());
}

#[tokio::test]
async fn rewrite_posts_slide_and_instruction_with_bearer_token() {
    let (base_url, state) = spawn_assistant_server().await.expect("spawn server");
    let assistant = HttpAssistant::new(
        AssistantConfig::new(&base_url)
            .expect("config")
            .with_api_key("secret-key"),
    )
    .expect("client");

    let content = assistant
        .rewrite(&slide(), "make it shorter")
        .await
        .expect("rewrite");
    assert_eq!(content, "rewritten (make it shorter)");

    let requests = state.requests.lock().await;
    assert_eq!(requests.len(), 1);
    let (path, auth, body) = &requests[0];
    assert_eq!(path, "rewrite");
    assert_eq!(auth.as_deref(), Some("Bearer secret-key"));
    assert_eq!(body["slide"]["title"], "Welcome");
    assert_eq!(body["instruction"], "make it shorter");
}

#[tokio::test]
async fn rejected_request_carries_status_and_provider_code() {
    let (base_url, _) = spawn_assistant_server().await.expect("spawn server");
    let assistant =
        HttpAssistant::new(AssistantConfig::new(&base_url).expect("config")).expect("client");

    let err = assistant.analyze(&slide()).await.expect_err("must fail");
    match err.downcast_ref::<AssistantError>() {
        Some(AssistantError::Rejected {
            status,
            code,
            message,
        }) => {
            assert_eq!(*status, 429);
            assert_eq!(code.as_deref(), Some("rate_limited"));
            assert_eq!(message, "slow down");
            assert_eq!(
                ProviderErrorKind::from_code(code.as_deref().unwrap_or_default()),
                Some(ProviderErrorKind::RateLimited)
            );
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn undecodable_body_is_reported_as_malformed() {
    let (base_url, _) = spawn_assistant_server().await.expect("spawn server");
    let assistant =
        HttpAssistant::new(AssistantConfig::new(&base_url).expect("config")).expect("client");

    let err = assistant
        .generate_headlines(&slide())
        .await
        .expect_err("must fail");
    assert!(matches!(
        err.downcast_ref::<AssistantError>(),
        Some(AssistantError::Malformed(_))
    ));
}

#[tokio::test]
async fn slow_response_times_out() {
    let (base_url, _) = spawn_assistant_server().await.expect("spawn server");
    let assistant = HttpAssistant::new(
        AssistantConfig::new(&base_url)
            .expect("config")
            .with_timeout(std::time::Duration::from_millis(50)),
    )
    .expect("client");

    let err = assistant
        .suggest_layout(&slide())
        .await
        .expect_err("must time out");
    assert!(matches!(
        err.downcast_ref::<AssistantError>(),
        Some(AssistantError::Timeout)
    ));
}

#[tokio::test]
async fn suggestions_come_back_as_three_lists() {
    let (base_url, _) = spawn_assistant_server().await.expect("spawn server");
    let assistant =
        HttpAssistant::new(AssistantConfig::new(&base_url).expect("config")).expect("client");

    let set = assistant
        .fetch_all_suggestions(&slide())
        .await
        .expect("suggestions");
    assert_eq!(set.copilot, vec!["Tighten the Welcome message".to_string()]);
    assert_eq!(set.image.len(), 1);
    assert!(set.research.is_empty());
}
