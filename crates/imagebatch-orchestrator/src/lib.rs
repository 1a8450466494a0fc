#![allow(
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_const_for_fn,
    clippy::module_name_repetitions
)]

pub mod artifact;
mod builder;
mod error;
mod http_client;
pub mod model;
mod orchestrator;
mod partition;
pub mod provider;
pub mod store;
mod sync_exec;
mod types;

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};

pub use error::{BatchError, Result};
pub use orchestrator::{BatchOrchestrator, NO_RESULT, PollPolicy, merge_results};
pub use partition::{Partition, partition};
pub use types::{
    CreateBatchRequest, CreateBatchResponse, GeneratedImage, JobStatus, Outcome, RequestItem, ResultItem, RoutedItem,
};

use builder::BatchOrchestratorBuilder;

/// Build the batch orchestrator from configuration
///
/// # Errors
///
/// Returns an error if a provider is misconfigured
pub fn build_orchestrator(config: &imagebatch_config::Config) -> anyhow::Result<Arc<BatchOrchestrator>> {
    let orchestrator = Arc::new(
        BatchOrchestratorBuilder::new(config)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to initialize batch orchestrator: {e}"))?,
    );
    Ok(orchestrator)
}

/// Create the endpoint router for batch image generation
pub fn endpoint_router() -> Router<Arc<BatchOrchestrator>> {
    Router::new()
        .route("/v1/images/batches", post(create_batch))
        .route("/v1/images/batches/{job_id}", get(get_status))
}

/// Start a batch and return its job id
async fn create_batch(
    State(orchestrator): State<Arc<BatchOrchestrator>>,
    Json(request): Json<CreateBatchRequest>,
) -> Result<(StatusCode, Json<CreateBatchResponse>)> {
    tracing::debug!("Batch creation handler called with {} item(s)", request.requests.len());

    let job_id = orchestrator.create_batch(request.requests).await?;

    Ok((StatusCode::ACCEPTED, Json(CreateBatchResponse { job_id })))
}

/// Poll a batch; the completed result list is only ever returned once
async fn get_status(
    State(orchestrator): State<Arc<BatchOrchestrator>>,
    Path(job_id): Path<String>,
) -> Result<Json<JobStatus>> {
    let status = orchestrator.get_status(&job_id).await?;

    Ok(Json(status))
}
