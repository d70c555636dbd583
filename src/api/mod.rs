use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use crate::error::{JobRunnerError, Result};
use crate::store::{JobRecord, JobStore};

const DEFAULT_PAGE_SIZE: usize = 100;
const MAX_PAGE_SIZE: usize = 1000;

#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<RwLock<JobStore>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListJobsQuery {
    pub page_size: Option<usize>,
    pub page_token: Option<String>,
}

#[derive(Debug, Serialize)]
struct ListJobsResponse {
    jobs: Vec<JobRecord>,
    next_page_token: Option<String>,
    total_count: usize,
}

#[derive(Debug, Deserialize)]
pub struct CreateJobRequest {
    pub command: String,
    pub run_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateJobRequest {
    pub command: Option<String>,
    pub run_at: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for JobRunnerError {
    fn into_response(self) -> Response {
        let status = match &self {
            JobRunnerError::JobNotFound(_) => StatusCode::NOT_FOUND,
            JobRunnerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            JobRunnerError::Conflict(_) => StatusCode::CONFLICT,
            JobRunnerError::StoreFull => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

/// Routes for the `/jobs` resource.
pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/jobs", get(list_jobs_handler).post(create_job_handler))
        .route(
            "/jobs/:id",
            get(get_job_handler)
                .put(update_job_handler)
                .delete(delete_job_handler),
        )
        .layer(cors)
        .with_state(state)
}

/// Serve the jobs API until `shutdown` is cancelled.
pub async fn run_api(addr: SocketAddr, state: ApiState, shutdown: CancellationToken) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %addr, "Starting jobs API server");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    tracing::info!("Jobs API server stopped");
    Ok(())
}

fn parse_job_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw)
        .map_err(|_| JobRunnerError::InvalidRequest(format!("invalid job id: {}", raw)))
}

async fn list_jobs_handler(
    State(state): State<ApiState>,
    Query(query): Query<ListJobsQuery>,
) -> Result<impl IntoResponse> {
    let page_size = match query.page_size {
        None | Some(0) => DEFAULT_PAGE_SIZE,
        Some(size) => size.min(MAX_PAGE_SIZE),
    };

    // Offset-based: the token is the index of the first record on the page.
    let offset: usize = match query.page_token.as_deref() {
        None | Some("") => 0,
        Some(token) => token
            .parse()
            .map_err(|_| JobRunnerError::InvalidRequest("invalid page token".to_string()))?,
    };

    let store = state.store.read().await;
    let (page, total_count) = store.list(offset, page_size);
    let jobs: Vec<JobRecord> = page.into_iter().cloned().collect();

    let next_offset = offset + jobs.len();
    let next_page_token = if next_offset < total_count {
        Some(next_offset.to_string())
    } else {
        None
    };

    Ok(Json(ListJobsResponse {
        jobs,
        next_page_token,
        total_count,
    }))
}

async fn get_job_handler(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<JobRecord>> {
    let id = parse_job_id(&id)?;
    let store = state.store.read().await;
    store
        .get(&id)
        .cloned()
        .map(Json)
        .ok_or_else(|| JobRunnerError::JobNotFound(id.to_string()))
}

async fn create_job_handler(
    State(state): State<ApiState>,
    Json(payload): Json<CreateJobRequest>,
) -> Result<impl IntoResponse> {
    if payload.command.trim().is_empty() {
        return Err(JobRunnerError::InvalidRequest(
            "command must not be empty".to_string(),
        ));
    }

    let record = JobRecord::new(payload.command, payload.run_at);
    state.store.write().await.add(record.clone())?;
    tracing::info!(job_id = %record.id, run_at = %record.run_at, "Job record created");

    Ok((StatusCode::CREATED, Json(record)))
}

async fn update_job_handler(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateJobRequest>,
) -> Result<Json<JobRecord>> {
    let id = parse_job_id(&id)?;
    let mut store = state.store.write().await;
    let record = store.update(&id, payload.command, payload.run_at)?;
    tracing::info!(job_id = %id, "Job record updated");
    Ok(Json(record.clone()))
}

async fn delete_job_handler(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    let id = parse_job_id(&id)?;
    match state.store.write().await.remove(&id) {
        Some(_) => {
            tracing::info!(job_id = %id, "Job record deleted");
            Ok(StatusCode::NO_CONTENT)
        }
        None => Err(JobRunnerError::JobNotFound(id.to_string())),
    }
}
