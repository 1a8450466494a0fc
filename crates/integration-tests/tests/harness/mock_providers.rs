//! Mock image provider backends for integration tests
//!
//! One server speaks both the `OpenAI` Files/Batches API (under `/v1`) and
//! the Gemini batch plus Imagen predict API (under `/v1beta`). Batches stay
//! in progress until the test flips them to complete.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

/// Base64 of the bytes every mock image contains
pub const IMAGE_B64: &str = "aW1hZ2U=";
pub const IMAGE_BYTES: &[u8] = b"image";

/// Mock provider backend with switchable batch state
pub struct MockProviders {
    addr: SocketAddr,
    shutdown: CancellationToken,
    state: Arc<MockState>,
}

#[derive(Clone)]
struct PendingItem {
    custom_id: String,
    prompt: String,
}

#[derive(Default)]
struct MockState {
    next_id: AtomicU32,
    complete: AtomicBool,
    status_down: AtomicBool,
    reject_submissions: AtomicBool,
    dropped: Mutex<HashSet<String>>,
    files: Mutex<HashMap<String, Vec<PendingItem>>>,
    batches: Mutex<HashMap<String, Vec<PendingItem>>>,
    status_checks: AtomicU32,
    predictions: AtomicU32,
}

impl MockState {
    fn next_id(&self) -> u32 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn delivered(&self, items: &[PendingItem]) -> Vec<PendingItem> {
        let dropped = self.dropped.lock().unwrap();
        items
            .iter()
            .filter(|item| !dropped.contains(&item.custom_id))
            .cloned()
            .collect()
    }
}

impl MockProviders {
    /// Start the mock server, returning immediately
    pub async fn start() -> anyhow::Result<Self> {
        let state = Arc::new(MockState::default());

        let app = Router::new()
            .route("/v1/files", routing::post(upload_file))
            .route("/v1/files/{file_id}/content", routing::get(file_content))
            .route("/v1/batches", routing::post(create_openai_batch))
            .route("/v1/batches/{batch_id}", routing::get(get_openai_batch))
            .route("/v1beta/models/{action}", routing::post(google_model_action))
            .route("/v1beta/batches/{batch_id}", routing::get(get_google_batch))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown_clone.cancelled().await;
                })
                .await
                .ok();
        });

        Ok(Self { addr, shutdown, state })
    }

    /// Base URL for an `openai` provider
    pub fn openai_url(&self) -> String {
        format!("http://{}/v1", self.addr)
    }

    /// Base URL for a `google` provider
    pub fn google_url(&self) -> String {
        format!("http://{}/v1beta", self.addr)
    }

    /// Finish (or un-finish) every batch
    pub fn set_complete(&self, complete: bool) {
        self.state.complete.store(complete, Ordering::SeqCst);
    }

    /// Make batch status lookups answer 503
    pub fn set_status_down(&self, down: bool) {
        self.state.status_down.store(down, Ordering::SeqCst);
    }

    /// Make batch submissions answer 500
    pub fn reject_submissions(&self) {
        self.state.reject_submissions.store(true, Ordering::SeqCst);
    }

    /// Leave this correlation id out of every batch output
    pub fn drop_result(&self, correlation_id: &str) {
        self.state.dropped.lock().unwrap().insert(correlation_id.to_owned());
    }

    pub fn batch_count(&self) -> usize {
        self.state.batches.lock().unwrap().len()
    }

    pub fn status_checks(&self) -> u32 {
        self.state.status_checks.load(Ordering::Relaxed)
    }

    pub fn prediction_count(&self) -> u32 {
        self.state.predictions.load(Ordering::Relaxed)
    }
}

impl Drop for MockProviders {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({"error": {"message": message}}))).into_response()
}

// -- OpenAI --

/// Pull the JSONL request lines back out of the multipart upload
async fn upload_file(State(state): State<Arc<MockState>>, body: String) -> Response {
    let items: Vec<PendingItem> = body
        .lines()
        .filter_map(|line| serde_json::from_str::<Value>(line.trim_end_matches('\r')).ok())
        .filter_map(|line| {
            Some(PendingItem {
                custom_id: line["custom_id"].as_str()?.to_owned(),
                prompt: line["body"]["input"].as_str()?.to_owned(),
            })
        })
        .collect();

    if items.is_empty() {
        return error(StatusCode::BAD_REQUEST, "no batch lines in upload");
    }

    let file_id = format!("file-{}", state.next_id());
    state.files.lock().unwrap().insert(file_id.clone(), items);

    Json(json!({"id": file_id, "object": "file", "purpose": "batch"})).into_response()
}

async fn create_openai_batch(State(state): State<Arc<MockState>>, Json(body): Json<Value>) -> Response {
    if state.reject_submissions.load(Ordering::SeqCst) {
        return error(StatusCode::INTERNAL_SERVER_ERROR, "batch creation failed");
    }

    let Some(items) = body["input_file_id"]
        .as_str()
        .and_then(|id| state.files.lock().unwrap().get(id).cloned())
    else {
        return error(StatusCode::BAD_REQUEST, "unknown input file");
    };

    let batch_id = format!("batch_{}", state.next_id());
    state.batches.lock().unwrap().insert(batch_id.clone(), items);

    Json(json!({"id": batch_id, "object": "batch", "status": "validating"})).into_response()
}

async fn get_openai_batch(State(state): State<Arc<MockState>>, Path(batch_id): Path<String>) -> Response {
    state.status_checks.fetch_add(1, Ordering::Relaxed);

    if state.status_down.load(Ordering::SeqCst) {
        return error(StatusCode::SERVICE_UNAVAILABLE, "status temporarily unavailable");
    }

    if !state.batches.lock().unwrap().contains_key(&batch_id) {
        return error(StatusCode::NOT_FOUND, "no such batch");
    }

    if state.complete.load(Ordering::SeqCst) {
        Json(json!({
            "id": batch_id,
            "status": "completed",
            "output_file_id": format!("{batch_id}-output"),
        }))
        .into_response()
    } else {
        Json(json!({"id": batch_id, "status": "in_progress"})).into_response()
    }
}

async fn file_content(State(state): State<Arc<MockState>>, Path(file_id): Path<String>) -> Response {
    let Some(items) = file_id
        .strip_suffix("-output")
        .and_then(|batch_id| state.batches.lock().unwrap().get(batch_id).cloned())
    else {
        return error(StatusCode::NOT_FOUND, "no such file");
    };

    let lines: Vec<String> = state
        .delivered(&items)
        .iter()
        .map(|item| {
            let line = if item.prompt.contains("fail") {
                json!({
                    "custom_id": item.custom_id,
                    "error": {"code": "content_policy_violation", "message": "rejected"},
                    "response": null,
                })
            } else {
                json!({
                    "custom_id": item.custom_id,
                    "error": null,
                    "response": {"status_code": 200, "body": {"output": [
                        {"type": "reasoning", "summary": []},
                        {"type": "image_generation_call", "status": "completed", "result": IMAGE_B64},
                    ]}},
                })
            };
            line.to_string()
        })
        .collect();

    lines.join("\n").into_response()
}

// -- Google --

async fn google_model_action(
    State(state): State<Arc<MockState>>,
    Path(action): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    if action.ends_with(":batchGenerateContent") {
        create_google_batch(&state, &body)
    } else if action.ends_with(":predict") {
        predict(&state, &body)
    } else {
        error(StatusCode::NOT_FOUND, "unknown model action")
    }
}

fn create_google_batch(state: &MockState, body: &Value) -> Response {
    if state.reject_submissions.load(Ordering::SeqCst) {
        return error(StatusCode::INTERNAL_SERVER_ERROR, "batch creation failed");
    }

    let items: Vec<PendingItem> = body
        .pointer("/batch/inputConfig/requests/requests")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|entry| {
            Some(PendingItem {
                custom_id: entry.pointer("/metadata/customId")?.as_str()?.to_owned(),
                prompt: entry.pointer("/request/contents/0/parts/0/text")?.as_str()?.to_owned(),
            })
        })
        .collect();

    let batch_id = state.next_id().to_string();
    state.batches.lock().unwrap().insert(batch_id.clone(), items);

    Json(json!({
        "name": format!("batches/{batch_id}"),
        "metadata": {"state": "BATCH_STATE_PENDING"},
    }))
    .into_response()
}

async fn get_google_batch(State(state): State<Arc<MockState>>, Path(batch_id): Path<String>) -> Response {
    state.status_checks.fetch_add(1, Ordering::Relaxed);

    if state.status_down.load(Ordering::SeqCst) {
        return error(StatusCode::SERVICE_UNAVAILABLE, "status temporarily unavailable");
    }

    let Some(items) = state.batches.lock().unwrap().get(&batch_id).cloned() else {
        return error(StatusCode::NOT_FOUND, "no such batch");
    };

    let name = format!("batches/{batch_id}");

    if !state.complete.load(Ordering::SeqCst) {
        return Json(json!({"name": name, "metadata": {"state": "BATCH_STATE_RUNNING"}})).into_response();
    }

    let responses: Vec<Value> = state
        .delivered(&items)
        .iter()
        .map(|item| {
            if item.prompt.contains("fail") {
                json!({
                    "metadata": {"customId": item.custom_id},
                    "error": {"code": 3, "message": "blocked by safety filters"},
                })
            } else {
                json!({
                    "metadata": {"customId": item.custom_id},
                    "response": {"candidates": [{"content": {"parts": [
                        {"text": "Here is your image"},
                        {"inlineData": {"mimeType": "image/jpeg", "data": IMAGE_B64}},
                    ]}}]},
                })
            }
        })
        .collect();

    Json(json!({
        "name": name,
        "done": true,
        "metadata": {"state": "BATCH_STATE_SUCCEEDED"},
        "response": {"inlinedResponses": {"inlinedResponses": responses}},
    }))
    .into_response()
}

fn predict(state: &MockState, body: &Value) -> Response {
    state.predictions.fetch_add(1, Ordering::Relaxed);

    let prompt = body.pointer("/instances/0/prompt").and_then(Value::as_str).unwrap_or_default();

    if prompt.contains("fail") {
        return error(StatusCode::INTERNAL_SERVER_ERROR, "prediction failed");
    }

    Json(json!({"predictions": [{"bytesBase64Encoded": IMAGE_B64, "mimeType": "image/jpeg"}]})).into_response()
}
