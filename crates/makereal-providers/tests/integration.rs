//! Provider integration tests against a local stand-in for the OpenAI API.
//!
//! Run with: `cargo test -p makereal-providers --test integration`

use axum::Json;
use axum::Router;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use makereal_providers::{CompletionRequest, Credentials, LlmProvider, OpenAiProvider};
use serde_json::{Value, json};

/// Serve `app` on a free local port and return its base URL.
async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn request() -> CompletionRequest {
    CompletionRequest {
        model: "gpt-4o".into(),
        messages: vec![json!({"role": "user", "content": "hello"})],
        max_tokens: 64,
        temperature: Some(0.0),
    }
}

#[tokio::test]
async fn test_completion_round_trip() {
    let app = Router::new().route(
        "/v1/chat/completions",
        post(|headers: HeaderMap, Json(body): Json<Value>| async move {
            let auth = headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            Json(json!({
                "choices": [{
                    "index": 0,
                    "message": {
                        "role": "assistant",
                        "content": format!("{auth} {} {}", body["model"].as_str().unwrap_or(""), body["max_tokens"])
                    },
                    "finish_reason": "stop"
                }]
            }))
        }),
    );
    let base = serve(app).await;

    let provider = OpenAiProvider::openai(Some(&base));
    let completion = provider
        .complete(&request(), &Credentials::api_key("sk-test"))
        .await
        .unwrap();
    assert!(completion.error.is_none());
    assert_eq!(completion.message(), "Bearer sk-test gpt-4o 64");
}

#[tokio::test]
async fn test_error_payload_is_a_completion() {
    let app = Router::new().route(
        "/v1/chat/completions",
        post(|| async {
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({"error": {"message": "Incorrect API key provided", "type": "invalid_request_error"}})),
            )
        }),
    );
    let base = serve(app).await;

    let provider = OpenAiProvider::openai(Some(&base));
    let completion = provider
        .complete(&request(), &Credentials::api_key("bad"))
        .await
        .unwrap();
    let error = completion.error.unwrap();
    assert_eq!(error.message.as_deref(), Some("Incorrect API key provided"));
}

#[tokio::test]
async fn test_non_json_failure_is_an_error() {
    let app = Router::new().route(
        "/v1/chat/completions",
        post(|| async { (StatusCode::BAD_GATEWAY, "upstream down") }),
    );
    let base = serve(app).await;

    let provider = OpenAiProvider::openai(Some(&base));
    let err = provider
        .complete(&request(), &Credentials::api_key("sk"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("502"), "{err}");
}

#[tokio::test]
async fn test_unreachable_endpoint_is_an_error() {
    // Bind and drop to get a port nothing listens on.
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let provider = OpenAiProvider::openai(Some(&format!("http://127.0.0.1:{port}")));
    assert!(
        provider
            .complete(&request(), &Credentials::api_key("sk"))
            .await
            .is_err()
    );
}

/// Real API call, skipped unless `OPENAI_API_KEY` is set.
#[tokio::test]
async fn test_openai_live() {
    let Some(api_key) = std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty()) else {
        eprintln!("Skipping: OPENAI_API_KEY not set");
        return;
    };
    let provider = OpenAiProvider::openai(None);
    let mut req = request();
    req.messages = vec![json!({"role": "user", "content": "Reply with exactly the word 'hello'."})];
    let completion = provider
        .complete(&req, &Credentials::api_key(api_key))
        .await
        .unwrap();
    assert!(completion.error.is_none(), "{:?}", completion.error);
    assert!(completion.message().to_lowercase().contains("hello"));
}
