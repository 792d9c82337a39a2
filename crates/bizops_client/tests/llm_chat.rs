use std::time::Duration;

use bizops_client::BizError;
use bizops_client::llm::{ChatMessage, OllamaClient};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> OllamaClient {
    OllamaClient::new(&server.uri(), "llama3.1", Duration::from_secs(5))
}

#[tokio::test]
async fn chat_sends_model_and_reads_single_object() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(serde_json::json!({"model": "llama3.1", "stream": false})))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "message": {"role": "assistant", "content": "{\"items\":[]}"},
            "done": true
        })))
        .expect(1)
        .mount(&server)
        .await;

    let reply = client(&server)
        .chat(&[ChatMessage::user("hola")], None)
        .await
        .expect("chat");
    assert_eq!(reply, "{\"items\":[]}");
}

#[tokio::test]
async fn chat_streamed_concatenates_ndjson_chunks() {
    let server = MockServer::start().await;
    let body = concat!(
        "{\"message\":{\"role\":\"assistant\",\"content\":\"Hel\"},\"done\":false}\n",
        "{\"message\":{\"role\":\"assistant\",\"content\":\"lo\"},\"done\":false}\n",
        "{\"done\":true}\n"
    );
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(serde_json::json!({"stream": true})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(body.as_bytes().to_vec(), "application/x-ndjson"),
        )
        .mount(&server)
        .await;

    let reply = client(&server)
        .chat_streamed(&[ChatMessage::user("hi")], Some(&serde_json::json!({"temperature": 0.2})))
        .await
        .expect("chat");
    assert_eq!(reply, "Hello");
}

#[tokio::test]
async fn chat_surfaces_http_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(500).set_body_string("model crashed"))
        .mount(&server)
        .await;

    let err = client(&server)
        .chat(&[ChatMessage::user("hi")], None)
        .await
        .unwrap_err();
    assert!(matches!(err, BizError::Status { status: 500, .. }));
}

#[tokio::test]
async fn chat_times_out_on_slow_model() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"message": {"content": "late"}}))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let slow = OllamaClient::new(&server.uri(), "llama3.1", Duration::from_millis(50));
    let err = slow.chat(&[ChatMessage::user("hi")], None).await.unwrap_err();
    assert!(matches!(err, BizError::Http(_)));
}
