//! HTTP backend behaviour against a local mock of the generateContent endpoint.

use gemini_pdf_batch::pipeline::gemini::GeminiBackend;
use gemini_pdf_batch::pipeline::llm::{ApiClient, Attachment, Part, Turn};
use gemini_pdf_batch::pipeline::retry::RetryPolicy;
use gemini_pdf_batch::{
    run_batch, BatchConfig, CallError, Credential, GenerateRequest, GenerativeBackend, RunStatus,
};
use serde_json::json;
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ENDPOINT: &str = "/v1beta/models/gemini-test:generateContent";

fn config(server: &MockServer) -> BatchConfig {
    BatchConfig::builder()
        .model("gemini-test")
        .api_base_url(server.uri())
        .credential(Credential::ApiKey("test-key".into()))
        .build()
        .unwrap()
}

fn reply(text: &str) -> serde_json::Value {
    json!({
        "candidates": [{
            "content": {"role": "model", "parts": [{"text": text}]},
            "finishReason": "STOP"
        }]
    })
}

fn ask(text: &str) -> GenerateRequest {
    GenerateRequest {
        turns: vec![Turn::user(vec![Part::Text(text.into())])],
    }
}

#[tokio::test]
async fn request_carries_key_parts_and_generation_config() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .and(header("x-goog-api-key", "test-key"))
        .and(body_partial_json(json!({
            "contents": [{
                "role": "user",
                "parts": [
                    {"text": "Resuma."},
                    {"inlineData": {"mimeType": "application/pdf", "data": "JVBERi0xLjQ="}}
                ]
            }],
            "systemInstruction": {"parts": [{"text": "Seja breve."}]},
            "generationConfig": {"topK": 40, "maxOutputTokens": 8192}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(reply("Resumo.")))
        .expect(1)
        .mount(&server)
        .await;

    let backend = GeminiBackend::from_config(&config(&server), Some("Seja breve.".into())).unwrap();
    let request = GenerateRequest {
        turns: vec![Turn::user(vec![
            Part::Text("Resuma.".into()),
            Part::Attachment(Attachment::new("application/pdf", b"%PDF-1.4".to_vec())),
        ])],
    };

    assert_eq!(backend.generate(&request).await.unwrap(), "Resumo.");
}

#[tokio::test]
async fn overloaded_server_is_retryable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({
            "error": {"code": 503, "message": "The model is overloaded.", "status": "UNAVAILABLE"}
        })))
        .mount(&server)
        .await;

    let backend = GeminiBackend::from_config(&config(&server), None).unwrap();
    let err = backend.generate(&ask("x")).await.unwrap_err();

    assert_eq!(
        err,
        CallError::Server {
            status: 503,
            message: "UNAVAILABLE: The model is overloaded.".into()
        }
    );
    assert!(err.is_retryable());
}

#[tokio::test]
async fn rate_limit_reports_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "7"))
        .mount(&server)
        .await;

    let backend = GeminiBackend::from_config(&config(&server), None).unwrap();
    assert_eq!(
        backend.generate(&ask("x")).await.unwrap_err(),
        CallError::RateLimited {
            retry_after_secs: Some(7)
        }
    );
}

#[tokio::test]
async fn bad_request_is_rejected_and_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {"code": 400, "message": "API key not valid.", "status": "INVALID_ARGUMENT"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let backend = GeminiBackend::from_config(&config(&server), None).unwrap();
    let client = ApiClient::new(Arc::new(backend), RetryPolicy::new(3, Duration::ZERO));
    let err = client.call("doc · p", &ask("x")).await.unwrap_err();

    assert!(matches!(err, CallError::Rejected { status: 400, .. }), "got: {err:?}");
}

#[tokio::test]
async fn unauthorized_api_key_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
        .mount(&server)
        .await;

    let backend = GeminiBackend::from_config(&config(&server), None).unwrap();
    assert!(matches!(
        backend.generate(&ask("x")).await.unwrap_err(),
        CallError::Rejected { status: 401, .. }
    ));
}

#[tokio::test]
async fn blocked_prompt_is_an_empty_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"promptFeedback": {"blockReason": "SAFETY"}})),
        )
        .mount(&server)
        .await;

    let backend = GeminiBackend::from_config(&config(&server), None).unwrap();
    assert_eq!(
        backend.generate(&ask("x")).await.unwrap_err(),
        CallError::EmptyResponse {
            reason: Some("SAFETY".into())
        }
    );
}

#[tokio::test]
async fn client_retries_until_the_server_recovers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(200).set_body_json(reply("enfim")))
        .mount(&server)
        .await;

    let backend = GeminiBackend::from_config(&config(&server), None).unwrap();
    let client = ApiClient::new(Arc::new(backend), RetryPolicy::new(3, Duration::ZERO));

    assert_eq!(client.call("doc · p", &ask("x")).await.unwrap(), "enfim");
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn static_bearer_token_is_sent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .and(header("authorization", "Bearer ya29.token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(reply("ok")))
        .expect(1)
        .mount(&server)
        .await;

    let config = BatchConfig::builder()
        .model("gemini-test")
        .api_base_url(server.uri())
        .credential(Credential::BearerToken("ya29.token".into()))
        .build()
        .unwrap();
    let backend = GeminiBackend::from_config(&config, None).unwrap();

    assert_eq!(backend.generate(&ask("x")).await.unwrap(), "ok");
}

#[cfg(unix)]
#[tokio::test]
async fn rejected_command_token_is_refreshed_and_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(401))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .and(header("authorization", "Bearer from-command"))
        .respond_with(ResponseTemplate::new(200).set_body_json(reply("ok")))
        .mount(&server)
        .await;

    let config = BatchConfig::builder()
        .model("gemini-test")
        .api_base_url(server.uri())
        .credential(Credential::TokenCommand {
            program: "echo".into(),
            args: vec!["from-command".into()],
        })
        .build()
        .unwrap();
    let backend = GeminiBackend::from_config(&config, None).unwrap();
    let client = ApiClient::new(Arc::new(backend), RetryPolicy::new(2, Duration::ZERO));

    assert_eq!(client.call("doc · p", &ask("x")).await.unwrap(), "ok");
}

#[tokio::test]
async fn run_batch_end_to_end() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .and(body_partial_json(json!({
            "systemInstruction": {"parts": [{"text": "Responda em português."}]}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(reply("resposta")))
        .expect(2)
        .mount(&server)
        .await;

    let root = tempfile::tempdir().unwrap();
    let input = root.path().join("input");
    let prompts = root.path().join("prompts");
    let system = root.path().join("system");
    let output = root.path().join("output");
    for dir in [&input, &prompts, &system] {
        fs::create_dir(dir).unwrap();
    }
    fs::write(input.join("contrato.pdf"), b"%PDF-1.4 contract").unwrap();
    fs::write(prompts.join("01.txt"), "Resuma.").unwrap();
    fs::write(prompts.join("02.txt"), "Liste as partes.").unwrap();
    fs::write(system.join("instrucoes.txt"), "Responda em português.").unwrap();

    let config = BatchConfig::builder()
        .input_dir(&input)
        .output_dir(&output)
        .prompt_dir(&prompts)
        .system_instruction_dir(&system)
        .model("gemini-test")
        .api_base_url(server.uri())
        .credential(Credential::ApiKey("test-key".into()))
        .retry_base_delay_ms(0)
        .build()
        .unwrap();

    let report = run_batch(&config).await.unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.written(), 1);
    assert_eq!(
        fs::read_to_string(output.join("contrato_RESPOSTA.txt")).unwrap(),
        "resposta\n\n\n\nresposta\n\n\n\n"
    );
}

#[tokio::test]
async fn missing_system_instruction_is_fatal() {
    let root = tempfile::tempdir().unwrap();
    let prompts = root.path().join("prompts");
    let system = root.path().join("system");
    fs::create_dir(&prompts).unwrap();
    fs::create_dir(&system).unwrap();
    fs::write(prompts.join("01.txt"), "Resuma.").unwrap();

    let config = BatchConfig::builder()
        .prompt_dir(&prompts)
        .system_instruction_dir(&system)
        .credential(Credential::ApiKey("k".into()))
        .build()
        .unwrap();

    let err = run_batch(&config).await.unwrap_err();
    assert!(
        err.to_string().contains("No system instructions"),
        "got: {err}"
    );
}
