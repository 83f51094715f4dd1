//! Integration tests: run the gateway against a local stand-in for the OpenAI,
//! LINE reply and version registry APIs, then drive it over HTTP.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use lib::channels::signature;
use lib::config::Config;
use lib::gateway::{self, GatewayState};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

const SECRET: &str = "channel-secret";

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Completion {
        prompt: String,
        model: String,
        max_tokens: u64,
        auth: String,
    },
    Reply {
        token: String,
        messages: Value,
        auth: String,
    },
}

#[derive(Clone, Default)]
struct Upstream {
    calls: Arc<Mutex<Vec<Call>>>,
    /// Completion requests with this prompt get a 429.
    fail_prompt: Option<String>,
    registry_down: bool,
}

fn auth(headers: &HeaderMap) -> String {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string()
}

async fn completions(
    State(up): State<Upstream>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let prompt = body["prompt"].as_str().unwrap_or_default().to_string();
    up.calls.lock().await.push(Call::Completion {
        prompt: prompt.clone(),
        model: body["model"].as_str().unwrap_or_default().to_string(),
        max_tokens: body["max_tokens"].as_u64().unwrap_or_default(),
        auth: auth(&headers),
    });
    if up.fail_prompt.as_deref() == Some(prompt.as_str()) {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({"error": {"message": "You exceeded your current quota"}})),
        )
            .into_response();
    }
    Json(json!({
        "object": "text_completion",
        "choices": [{"text": format!("\n\n {} back \n", prompt), "index": 0}]
    }))
    .into_response()
}

async fn reply(
    State(up): State<Upstream>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    up.calls.lock().await.push(Call::Reply {
        token: body["replyToken"].as_str().unwrap_or_default().to_string(),
        messages: body["messages"].clone(),
        auth: auth(&headers),
    });
    Json(json!({}))
}

async fn registry(State(up): State<Upstream>) -> Response {
    if up.registry_down {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    Json(json!({"crate": {"id": "linegpt", "max_stable_version": "9.9.9"}})).into_response()
}

async fn spawn(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("local_addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

async fn spawn_upstream(up: Upstream) -> SocketAddr {
    let app = Router::new()
        .route("/v1/completions", post(completions))
        .route("/v2/bot/message/reply", post(reply))
        .route("/registry", get(registry))
        .with_state(up);
    spawn(app).await
}

fn config_for(upstream: SocketAddr) -> Config {
    let mut config = Config::default();
    config.line.channel_secret = Some(SECRET.to_string());
    config.line.channel_access_token = Some("line-token".to_string());
    config.line.api_base = Some(format!("http://{}", upstream));
    config.openai.api_key = Some("sk-test".to_string());
    config.openai.model = Some("ft:davinci-002:acme".to_string());
    config.openai.base_url = Some(format!("http://{}/v1", upstream));
    config.version.registry_url = Some(format!("http://{}/registry", upstream));
    config
}

async fn spawn_gateway(config: Config) -> SocketAddr {
    let state = GatewayState::from_config(config).expect("state");
    spawn(gateway::router(state).expect("router")).await
}

fn text_event(token: &str, text: &str) -> Value {
    json!({
        "type": "message",
        "mode": "active",
        "timestamp": 1700000000000i64,
        "replyToken": token,
        "source": {"type": "user", "userId": "U123"},
        "message": {"id": "1", "type": "text", "text": text}
    })
}

async fn post_webhook(
    gateway: SocketAddr,
    path: &str,
    body: &str,
    signature: Option<String>,
) -> reqwest::Response {
    let mut req = reqwest::Client::new()
        .post(format!("http://{}{}", gateway, path))
        .header("content-type", "application/json")
        .body(body.to_string());
    if let Some(sig) = signature {
        req = req.header("x-line-signature", sig);
    }
    req.send().await.expect("send webhook")
}

#[tokio::test]
async fn text_message_is_completed_and_answered() {
    let up = Upstream::default();
    let upstream = spawn_upstream(up.clone()).await;
    let gw = spawn_gateway(config_for(upstream)).await;

    let body = json!({"destination": "U0", "events": [text_event("tok1", "Hello")]}).to_string();
    let sig = signature::sign(SECRET, body.as_bytes());
    let res = post_webhook(gw, "/webhook", &body, Some(sig)).await;
    assert_eq!(res.status(), 200);

    let calls = up.calls.lock().await.clone();
    assert_eq!(
        calls,
        vec![
            Call::Completion {
                prompt: "Hello".to_string(),
                model: "ft:davinci-002:acme".to_string(),
                max_tokens: 150,
                auth: "Bearer sk-test".to_string(),
            },
            Call::Reply {
                token: "tok1".to_string(),
                messages: json!([{"type": "text", "text": "Hello back"}]),
                auth: "Bearer line-token".to_string(),
            },
        ]
    );
}

#[tokio::test]
async fn missing_or_wrong_signature_is_rejected_without_outbound_calls() {
    let up = Upstream::default();
    let upstream = spawn_upstream(up.clone()).await;
    let gw = spawn_gateway(config_for(upstream)).await;

    let body = json!({"events": [text_event("tok1", "Hello")]}).to_string();
    let res = post_webhook(gw, "/webhook", &body, None).await;
    assert_eq!(res.status(), 401);

    let forged = signature::sign("not-the-secret", body.as_bytes());
    let res = post_webhook(gw, "/webhook", &body, Some(forged)).await;
    assert_eq!(res.status(), 401);

    assert!(up.calls.lock().await.is_empty());
}

#[tokio::test]
async fn signature_covers_the_raw_bytes() {
    let up = Upstream::default();
    let upstream = spawn_upstream(up.clone()).await;
    let gw = spawn_gateway(config_for(upstream)).await;

    // Same JSON, different layout: signed compact, sent pretty.
    let value = json!({"events": [text_event("tok1", "Hello")]});
    let sig = signature::sign(SECRET, value.to_string().as_bytes());
    let pretty = serde_json::to_string_pretty(&value).expect("pretty");
    let res = post_webhook(gw, "/webhook", &pretty, Some(sig)).await;
    assert_eq!(res.status(), 401);
    assert!(up.calls.lock().await.is_empty());
}

#[tokio::test]
async fn non_text_events_are_skipped() {
    let up = Upstream::default();
    let upstream = spawn_upstream(up.clone()).await;
    let gw = spawn_gateway(config_for(upstream)).await;

    let body = json!({"events": [
        {"type": "follow", "replyToken": "f1", "source": {"type": "user", "userId": "U1"}},
        {"type": "message", "replyToken": "s1", "message": {"id": "2", "type": "sticker", "packageId": "1", "stickerId": "2"}},
        text_event("tok2", "Hi")
    ]})
    .to_string();
    let sig = signature::sign(SECRET, body.as_bytes());
    let res = post_webhook(gw, "/webhook", &body, Some(sig)).await;
    assert_eq!(res.status(), 200);

    let calls = up.calls.lock().await.clone();
    assert_eq!(calls.len(), 2);
    assert!(matches!(&calls[1], Call::Reply { token, .. } if token == "tok2"));
}

#[tokio::test]
async fn empty_batch_is_ok() {
    let up = Upstream::default();
    let upstream = spawn_upstream(up.clone()).await;
    let gw = spawn_gateway(config_for(upstream)).await;

    let body = r#"{"destination":"U0","events":[]}"#;
    let sig = signature::sign(SECRET, body.as_bytes());
    let res = post_webhook(gw, "/webhook", body, Some(sig)).await;
    assert_eq!(res.status(), 200);
    assert!(up.calls.lock().await.is_empty());
}

#[tokio::test]
async fn completion_failure_fails_the_batch_after_earlier_replies() {
    let up = Upstream {
        fail_prompt: Some("second".to_string()),
        ..Default::default()
    };
    let upstream = spawn_upstream(up.clone()).await;
    let gw = spawn_gateway(config_for(upstream)).await;

    let body = json!({"events": [
        text_event("tok1", "first"),
        text_event("tok2", "second"),
        text_event("tok3", "third")
    ]})
    .to_string();
    let sig = signature::sign(SECRET, body.as_bytes());
    let res = post_webhook(gw, "/webhook", &body, Some(sig)).await;
    assert_eq!(res.status(), 500);

    let calls = up.calls.lock().await.clone();
    assert_eq!(calls.len(), 3);
    assert!(matches!(&calls[0], Call::Completion { prompt, .. } if prompt == "first"));
    assert!(matches!(&calls[1], Call::Reply { token, .. } if token == "tok1"));
    assert!(matches!(&calls[2], Call::Completion { prompt, .. } if prompt == "second"));
}

#[tokio::test]
async fn malformed_body_with_valid_signature_is_bad_request() {
    let up = Upstream::default();
    let upstream = spawn_upstream(up.clone()).await;
    let gw = spawn_gateway(config_for(upstream)).await;

    let body = r#"{"events": "#;
    let sig = signature::sign(SECRET, body.as_bytes());
    let res = post_webhook(gw, "/webhook", body, Some(sig)).await;
    assert_eq!(res.status(), 400);
    assert!(up.calls.lock().await.is_empty());
}

#[tokio::test]
async fn custom_webhook_path() {
    let up = Upstream::default();
    let upstream = spawn_upstream(up.clone()).await;
    let mut config = config_for(upstream);
    config.app.webhook_path = "callback".to_string();
    let gw = spawn_gateway(config).await;

    let body = json!({"events": [text_event("tok1", "Hello")]}).to_string();
    let sig = signature::sign(SECRET, body.as_bytes());
    let res = post_webhook(gw, "/callback", &body, Some(sig.clone())).await;
    assert_eq!(res.status(), 200);
    let res = post_webhook(gw, "/webhook", &body, Some(sig)).await;
    assert_eq!(res.status(), 404);
    assert_eq!(up.calls.lock().await.len(), 2);
}

#[tokio::test]
async fn debug_mode_still_answers() {
    let up = Upstream::default();
    let upstream = spawn_upstream(up.clone()).await;
    let mut config = config_for(upstream);
    config.app.debug = true;
    let state = GatewayState::from_config(config).expect("state");
    let prompt_log = state.prompt_log.clone();
    let gw = spawn(gateway::router(state).expect("router")).await;

    let body = json!({"events": [text_event("tok1", "Hello")]}).to_string();
    let sig = signature::sign(SECRET, body.as_bytes());
    let res = post_webhook(gw, "/webhook", &body, Some(sig)).await;
    assert_eq!(res.status(), 200);

    let records = prompt_log.records().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].prompt, "Hello");
    assert_eq!(records[0].completion.as_deref(), Some("Hello back"));
}

#[tokio::test]
async fn debug_mode_keeps_the_failure_status_and_logs_the_error() {
    let up = Upstream {
        fail_prompt: Some("second".to_string()),
        ..Default::default()
    };
    let upstream = spawn_upstream(up.clone()).await;
    let mut config = config_for(upstream);
    config.app.debug = true;
    let state = GatewayState::from_config(config).expect("state");
    let prompt_log = state.prompt_log.clone();
    let gw = spawn(gateway::router(state).expect("router")).await;

    let body = json!({"events": [
        text_event("tok1", "first"),
        text_event("tok2", "second")
    ]})
    .to_string();
    let sig = signature::sign(SECRET, body.as_bytes());
    let res = post_webhook(gw, "/webhook", &body, Some(sig)).await;
    assert_eq!(res.status(), 500);

    // The print task runs detached; give it a moment, then check what it printed from.
    let mut transcript = String::new();
    for _ in 0..20 {
        transcript = prompt_log.render().await;
        if transcript.contains("Human: second") {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(transcript.contains("Human: first\nAI: first back\n"));
    assert!(transcript.contains("Human: second\nError: "));
    assert_eq!(prompt_log.print().await, transcript);
    assert_eq!(up.calls.lock().await.len(), 3);
}

#[tokio::test]
async fn info_reports_current_and_latest_version() {
    let up = Upstream::default();
    let upstream = spawn_upstream(up).await;
    let gw = spawn_gateway(config_for(upstream)).await;

    let res = reqwest::get(format!("http://{}/info", gw)).await.expect("get");
    assert_eq!(res.status(), 200);
    let json: Value = res.json().await.expect("json");
    assert_eq!(json["currentVersion"], env!("CARGO_PKG_VERSION"));
    assert_eq!(json["latestVersion"], "9.9.9");
}

#[tokio::test]
async fn info_falls_back_when_registry_fails() {
    let up = Upstream {
        registry_down: true,
        ..Default::default()
    };
    let upstream = spawn_upstream(up).await;
    let gw = spawn_gateway(config_for(upstream)).await;

    let res = reqwest::get(format!("http://{}/info", gw)).await.expect("get");
    assert_eq!(res.status(), 200);
    let json: Value = res.json().await.expect("json");
    assert!(json["currentVersion"].is_string());
    assert_eq!(json["latestVersion"], "unknown");
}

#[tokio::test]
async fn root_redirects_when_app_url_is_set() {
    let upstream = spawn_upstream(Upstream::default()).await;
    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .expect("client");

    let gw = spawn_gateway(config_for(upstream)).await;
    let res = client.get(format!("http://{}/", gw)).send().await.expect("get");
    assert_eq!(res.status(), 200);

    let mut config = config_for(upstream);
    config.app.url = Some("https://example.com/bot".to_string());
    let gw = spawn_gateway(config).await;
    let res = client.get(format!("http://{}/", gw)).send().await.expect("get");
    assert_eq!(res.status(), 302);
    assert_eq!(
        res.headers().get("location").and_then(|v| v.to_str().ok()),
        Some("https://example.com/bot")
    );
}

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind free port");
    listener.local_addr().expect("local_addr").port()
}

#[tokio::test]
async fn run_gateway_serves_on_configured_port() {
    let upstream = spawn_upstream(Upstream::default()).await;
    let port = free_port();
    let mut config = config_for(upstream);
    config.gateway.port = port;
    config.gateway.bind = "127.0.0.1".to_string();

    let gateway_handle = tokio::spawn(async move {
        let _ = gateway::run_gateway(config).await;
    });

    let url = format!("http://127.0.0.1:{}/", port);
    let client = reqwest::Client::new();
    let mut last_err = None;
    for _ in 0..100 {
        match client.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => {
                gateway_handle.abort();
                return;
            }
            Ok(_) => {}
            Err(e) => last_err = Some(e),
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    gateway_handle.abort();
    panic!(
        "GET {} did not return 200 within 5s; last error: {:?}",
        url, last_err
    );
}

#[tokio::test]
async fn run_gateway_refuses_to_start_without_credentials() {
    let err = gateway::run_gateway(Config::default())
        .await
        .expect_err("missing credentials");
    assert!(err.to_string().contains("missing required settings"));
}
