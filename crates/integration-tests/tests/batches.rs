mod harness;

use std::collections::HashMap;

use harness::config::ConfigBuilder;
use harness::mock_providers::{IMAGE_BYTES, MockProviders};
use harness::server::TestServer;
use imagebatch_config::BatchSettings;
use serde_json::{Value, json};

async fn start_all() -> (MockProviders, TestServer) {
    let mock = MockProviders::start().await.unwrap();
    let config = ConfigBuilder::new()
        .with_openai_provider("openai", &mock.openai_url())
        .with_google_provider("google", &mock.google_url())
        .build();

    let server = TestServer::start(config).await.unwrap();
    (mock, server)
}

fn by_id(body: &Value) -> HashMap<String, Value> {
    body["results"]
        .as_array()
        .expect("results array")
        .iter()
        .map(|r| (r["correlation_id"].as_str().unwrap().to_owned(), r.clone()))
        .collect()
}

#[tokio::test]
async fn mixed_batch_completes_once() {
    let (mock, server) = start_all().await;

    let job_id = server
        .create_job(json!([
            {"correlation_id": "sync", "input": "A red fox", "model": "imagen-4.0-ultra-generate-001"},
            {"correlation_id": "gpt", "input": "A blue whale", "model": "gpt-image-1"},
            {"correlation_id": "gemini", "input": "A green frog", "model": "gemini-3-pro-image-preview"},
        ]))
        .await;

    assert_eq!(mock.prediction_count(), 1);
    assert_eq!(mock.batch_count(), 2);

    let (status, body) = server.poll(&job_id).await;
    assert_eq!(status, 200);
    assert_eq!(body, json!({"status": "processing"}));

    mock.set_complete(true);

    let (status, body) = server.poll(&job_id).await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "completed");

    let results = by_id(&body);
    assert_eq!(results.len(), 3);
    assert_eq!(results["sync"]["success"]["provider_label"], "Imagen 4 Ultra");
    assert_eq!(results["gpt"]["success"]["provider_label"], "GPT Image 1");
    assert_eq!(results["gemini"]["success"]["provider_label"], "Gemini 3 Pro");
    assert!(results.values().all(|r| r.get("error").is_none()));

    let (status, body) = server.poll(&job_id).await;
    assert_eq!(status, 404);
    assert_eq!(body["error"]["type"], "not_found_error");
    assert_eq!(body["error"]["code"], 404);
}

#[tokio::test]
async fn missing_provider_output_is_reported_per_item() {
    let (mock, server) = start_all().await;
    mock.drop_result("b");
    mock.drop_result("d");
    mock.set_complete(true);

    let job_id = server
        .create_job(json!([
            {"correlation_id": "a", "input": "A cat", "model": "gpt-image-1"},
            {"correlation_id": "b", "input": "A dog", "model": "gpt-image-1.5"},
            {"correlation_id": "c", "input": "A cow", "model": "gemini-3-pro-image-preview"},
            {"correlation_id": "d", "input": "A pig", "model": "gemini-3-pro-image-preview"},
        ]))
        .await;

    let (status, body) = server.poll(&job_id).await;
    assert_eq!(status, 200);

    let ids: Vec<_> = body["results"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["correlation_id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, ["a", "b", "c", "d"]);

    let results = by_id(&body);
    assert!(results["a"].get("success").is_some());
    assert!(results["c"].get("success").is_some());
    assert_eq!(results["b"]["error"], "no result returned by provider");
    assert_eq!(results["d"]["error"], "no result returned by provider");
}

#[tokio::test]
async fn item_failures_do_not_affect_siblings() {
    let (mock, server) = start_all().await;
    mock.set_complete(true);

    let job_id = server
        .create_job(json!([
            {"correlation_id": "s1", "input": "please fail", "model": "imagen-4.0-ultra-generate-001"},
            {"correlation_id": "s2", "input": "A kettle", "model": "imagen-4.0-ultra-generate-001"},
            {"correlation_id": "o1", "input": "fail this one", "model": "gpt-image-1"},
            {"correlation_id": "o2", "input": "A teapot", "model": "gpt-image-1"},
            {"correlation_id": "g1", "input": "fail again", "model": "gemini-3-pro-image-preview"},
            {"correlation_id": "g2", "input": "A mug", "model": "gemini-3-pro-image-preview"},
        ]))
        .await;

    let (_, body) = server.poll(&job_id).await;
    let results = by_id(&body);

    assert_eq!(results.len(), 6);
    for ok in ["s2", "o2", "g2"] {
        assert!(results[ok].get("success").is_some(), "{ok} should succeed");
    }

    let sync_error = results["s1"]["error"].as_str().unwrap();
    assert!(sync_error.starts_with("Imagen 4 Ultra generation failed:"), "{sync_error}");
    assert!(results["o1"]["error"].as_str().unwrap().contains("rejected"));
    assert_eq!(results["g1"]["error"], "blocked by safety filters");
}

#[tokio::test]
async fn invalid_batches_are_rejected() {
    let (mock, server) = start_all().await;

    for (requests, expected) in [
        (json!([]), "Invalid request"),
        (
            json!([{"correlation_id": "a", "input": "x", "model": "dall-e-3"}]),
            "Unknown image generation model",
        ),
        (
            json!([
                {"correlation_id": "a", "input": "x", "model": "gpt-image-1"},
                {"correlation_id": "a", "input": "y", "model": "gpt-image-1"},
            ]),
            "duplicate correlation_id",
        ),
        (
            json!([{"correlation_id": "a", "input": "  ", "model": "gpt-image-1"}]),
            "must not be blank",
        ),
    ] {
        let resp = server.create_batch(requests).await;
        assert_eq!(resp.status(), 400);

        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["error"]["type"], "invalid_request_error");
        let message = body["error"]["message"].as_str().unwrap();
        assert!(message.contains(expected), "{message}");
    }

    assert_eq!(mock.batch_count(), 0);
}

#[tokio::test]
async fn unconfigured_provider_is_rejected() {
    let mock = MockProviders::start().await.unwrap();
    let config = ConfigBuilder::new()
        .with_openai_provider("openai", &mock.openai_url())
        .build();
    let server = TestServer::start(config).await.unwrap();

    let resp = server
        .create_batch(json!([
            {"correlation_id": "a", "input": "A fern", "model": "imagen-4.0-ultra-generate-001"}
        ]))
        .await;

    assert_eq!(resp.status(), 400);
    assert_eq!(mock.prediction_count(), 0);
}

#[tokio::test]
async fn failed_submission_creates_no_job() {
    let (mock, server) = start_all().await;
    mock.reject_submissions();

    let resp = server
        .create_batch(json!([
            {"correlation_id": "a", "input": "A comet", "model": "gemini-3-pro-image-preview"}
        ]))
        .await;

    assert_eq!(resp.status(), 502);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["type"], "api_error");
}

#[tokio::test]
async fn status_outage_is_bounded() {
    let mock = MockProviders::start().await.unwrap();
    let config = ConfigBuilder::new()
        .with_openai_provider("openai", &mock.openai_url())
        .with_batch_settings(BatchSettings {
            probe_attempts: 2,
            probe_backoff: "1ms".to_owned(),
            max_probe_failures: 2,
            ..BatchSettings::default()
        })
        .build();
    let server = TestServer::start(config).await.unwrap();

    let job_id = server
        .create_job(json!([{"correlation_id": "a", "input": "A bell", "model": "gpt-image-1"}]))
        .await;

    mock.set_status_down(true);

    let (_, body) = server.poll(&job_id).await;
    assert_eq!(body["status"], "processing");
    assert_eq!(mock.status_checks(), 2);

    let (_, body) = server.poll(&job_id).await;
    assert_eq!(body["status"], "completed");
    let error = body["results"][0]["error"].as_str().unwrap();
    assert!(error.starts_with("provider status unavailable:"), "{error}");
}

#[tokio::test]
async fn brief_status_outage_recovers() {
    let (mock, server) = start_all().await;

    let job_id = server
        .create_job(json!([{"correlation_id": "a", "input": "A drum", "model": "gpt-image-1"}]))
        .await;

    mock.set_status_down(true);
    let (_, body) = server.poll(&job_id).await;
    assert_eq!(body["status"], "processing");

    mock.set_status_down(false);
    mock.set_complete(true);
    let (_, body) = server.poll(&job_id).await;
    assert!(body["results"][0].get("success").is_some());
}

#[tokio::test]
async fn concurrent_polls_deliver_once() {
    let (mock, server) = start_all().await;
    mock.set_complete(true);

    let job_id = server
        .create_job(json!([
            {"correlation_id": "a", "input": "A harp", "model": "gpt-image-1"},
            {"correlation_id": "b", "input": "A lute", "model": "gemini-3-pro-image-preview"},
        ]))
        .await;

    let (first, second) = tokio::join!(server.poll(&job_id), server.poll(&job_id));

    let mut statuses = [first.0, second.0];
    statuses.sort_unstable();
    assert_eq!(statuses, [200, 404]);

    let completed = if first.0 == 200 { first.1 } else { second.1 };
    assert_eq!(by_id(&completed).len(), 2);
}

#[tokio::test]
async fn unknown_job_is_not_found() {
    let (_mock, server) = start_all().await;

    let (status, body) = server.poll("does-not-exist").await;
    assert_eq!(status, 404);
    assert_eq!(body["error"]["type"], "not_found_error");
}

#[tokio::test]
async fn filesystem_storage_writes_images() {
    let dir = tempfile::tempdir().unwrap();
    let mock = MockProviders::start().await.unwrap();
    let config = ConfigBuilder::new()
        .with_google_provider("google", &mock.google_url())
        .with_filesystem_storage(dir.path().to_path_buf())
        .build();
    let server = TestServer::start(config).await.unwrap();

    let job_id = server
        .create_job(json!([
            {"correlation_id": "a", "input": "A lamp", "model": "imagen-4.0-ultra-generate-001"},
            {"correlation_id": "b", "input": "A desk", "model": "gemini-3-pro-image-preview"},
        ]))
        .await;
    mock.set_complete(true);

    let (_, body) = server.poll(&job_id).await;
    let results = by_id(&body);

    for id in ["a", "b"] {
        let artifact = results[id]["success"]["artifact_ref"].as_str().unwrap();
        let path = dir.path().join("images").join(format!("{artifact}.jpg"));
        assert_eq!(std::fs::read(&path).unwrap(), IMAGE_BYTES, "{}", path.display());
    }
}
