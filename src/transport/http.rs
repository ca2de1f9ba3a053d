//! HTTP API over [`JobService`]
//!
//! Routes:
//! - `GET /` - service banner
//! - `POST /API/upload` - multipart upload, field `file`
//! - `GET /API/download/{id}` - processed CSV of a completed job
//! - `GET /API/status/{id}` - job snapshot
//! - `GET /health` - liveness and job counts
//! - `GET /metrics` - metrics snapshot

use crate::error::ResultError;
use crate::jobs::{JobService, StatusCounts};
use crate::observability::metrics;
use bytes::Buf;
use futures::{Future, TryStreamExt};
use serde::Serialize;
use std::convert::Infallible;
use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};
use warp::http::header::{HeaderValue, CONTENT_DISPOSITION, CONTENT_TYPE};
use warp::http::StatusCode;
use warp::multipart::{FormData, Part};
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

/// Multipart field carrying the uploaded file
const UPLOAD_FIELD: &str = "file";

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug, Serialize)]
struct UploadResponse {
    id: String,
}

#[derive(Debug, Serialize)]
struct RootResponse {
    message: &'static str,
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    storage_backend: &'static str,
    jobs: StatusCounts,
    timestamp: u64,
}

fn json_error(status: StatusCode, message: impl Into<String>) -> Response {
    warp::reply::with_status(
        warp::reply::json(&ErrorResponse {
            error: message.into(),
        }),
        status,
    )
    .into_response()
}

fn with_service(
    service: Arc<JobService>,
) -> impl Filter<Extract = (Arc<JobService>,), Error = Infallible> + Clone {
    warp::any().map(move || Arc::clone(&service))
}

/// Build the complete route tree
pub fn routes(
    service: Arc<JobService>,
    max_upload_bytes: u64,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    // GET / - banner
    let root_route = warp::path::end().and(warp::get()).map(|| {
        warp::reply::json(&RootResponse {
            message: "CSV processing service is running",
            status: "ok",
        })
    });

    // POST /API/upload
    let upload_route = warp::path!("API" / "upload")
        .and(warp::post())
        .and(warp::multipart::form().max_length(max_upload_bytes))
        .and(with_service(Arc::clone(&service)))
        .and_then(handle_upload);

    // GET /API/download/{id}
    let download_route = warp::path!("API" / "download" / String)
        .and(warp::get())
        .and(with_service(Arc::clone(&service)))
        .and_then(handle_download);

    // GET /API/status/{id}
    let status_route = warp::path!("API" / "status" / String)
        .and(warp::get())
        .and(with_service(Arc::clone(&service)))
        .and_then(handle_status);

    // GET /health
    let health_route = warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_service(service))
        .map(|service: Arc<JobService>| {
            warp::reply::json(&HealthResponse {
                status: "healthy",
                storage_backend: service.backend_name(),
                jobs: service.jobs().count_by_status(),
                timestamp: current_timestamp(),
            })
        });

    // GET /metrics
    let metrics_route = warp::path("metrics")
        .and(warp::path::end())
        .and(warp::get())
        .map(|| warp::reply::json(&metrics().get_metrics()));

    root_route
        .or(upload_route)
        .or(download_route)
        .or(status_route)
        .or(health_route)
        .or(metrics_route)
        .with(warp::cors().allow_any_origin().allow_methods(vec!["GET", "POST"]))
        .recover(handle_rejection)
}

/// Serve `routes` on `port` until `shutdown` resolves
pub async fn serve<F>(service: Arc<JobService>, port: u16, max_upload_bytes: u64, shutdown: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    let (address, server) = warp::serve(routes(service, max_upload_bytes))
        .bind_with_graceful_shutdown(SocketAddr::from(([0, 0, 0, 0], port)), shutdown);

    info!(%address, "HTTP server listening");
    server.await;
    info!("HTTP server stopped");
}

async fn handle_upload(
    mut form: FormData,
    service: Arc<JobService>,
) -> Result<Response, Infallible> {
    // Each part must be consumed before the next one is pulled from the stream
    let (file_name, content) = loop {
        let part = match form.try_next().await {
            Ok(Some(part)) => part,
            Ok(None) => {
                warn!("Upload request without a file field");
                return Ok(json_error(StatusCode::BAD_REQUEST, "No file provided"));
            }
            Err(e) => {
                warn!(error = %e, "Malformed multipart upload");
                return Ok(json_error(StatusCode::BAD_REQUEST, "Invalid multipart body"));
            }
        };

        if part.name() != UPLOAD_FIELD {
            debug!(field = part.name(), "Skipping multipart field");
            continue;
        }

        let file_name = part.filename().unwrap_or_default().to_string();
        match read_part(part).await {
            Ok(content) => break (file_name, content),
            Err(e) => {
                warn!(file_name = %file_name, error = %e, "Failed to read uploaded file");
                return Ok(json_error(StatusCode::BAD_REQUEST, "Failed to read uploaded file"));
            }
        }
    };

    let size = content.len() as u64;
    match service.submit(&file_name, size, Cursor::new(content)) {
        Ok(job_id) => {
            debug!(job_id = %job_id, file_name = %file_name, size, "Upload accepted");
            Ok(warp::reply::json(&UploadResponse {
                id: job_id.to_string(),
            })
            .into_response())
        }
        Err(e) => Ok(json_error(StatusCode::BAD_REQUEST, e.to_string())),
    }
}

async fn read_part(part: Part) -> Result<Vec<u8>, warp::Error> {
    part.stream()
        .try_fold(Vec::new(), |mut content, chunk| async move {
            content.extend_from_slice(chunk.chunk());
            Ok::<_, warp::Error>(content)
        })
        .await
}

async fn handle_download(id: String, service: Arc<JobService>) -> Result<Response, Infallible> {
    let result = service.fetch_result(&id).await;

    let response = match result {
        Ok(content) => {
            let file_name = service
                .status(&id)
                .map(|job| processed_file_name(job.original_file_name()))
                .unwrap_or_else(|| format!("{id}_processed.csv"));

            let mut response = Response::new(content.into());
            let headers = response.headers_mut();
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/csv"));
            let disposition =
                HeaderValue::from_str(&format!("attachment; filename=\"{file_name}\""))
                    .unwrap_or_else(|_| HeaderValue::from_static("attachment"));
            headers.insert(CONTENT_DISPOSITION, disposition);
            response
        }
        Err(ResultError::NotReady) => json_error(StatusCode::LOCKED, "Job is still in progress"),
        Err(ResultError::Failed) => json_error(StatusCode::BAD_REQUEST, "Job failed to process"),
        Err(ResultError::NotFound) => json_error(StatusCode::BAD_REQUEST, "Invalid job ID"),
        Err(ResultError::Internal { .. }) => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Processed file could not be read",
        ),
    };

    debug!(job_id = %id, status = response.status().as_u16(), "Download request served");
    Ok(response)
}

async fn handle_status(id: String, service: Arc<JobService>) -> Result<Response, Infallible> {
    Ok(match service.status(&id) {
        Some(job) => warp::reply::json(&job).into_response(),
        None => json_error(StatusCode::NOT_FOUND, "Job not found"),
    })
}

async fn handle_rejection(rejection: Rejection) -> Result<Response, Infallible> {
    if rejection.is_not_found() {
        return Ok(json_error(StatusCode::NOT_FOUND, "Not found"));
    }
    if rejection.find::<warp::reject::PayloadTooLarge>().is_some() {
        return Ok(json_error(StatusCode::PAYLOAD_TOO_LARGE, "Upload is too large"));
    }
    if rejection.find::<warp::reject::MethodNotAllowed>().is_some() {
        return Ok(json_error(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed"));
    }

    debug!(?rejection, "Request rejected");
    Ok(json_error(StatusCode::BAD_REQUEST, "Invalid request"))
}

/// `people.csv` becomes `people_processed.csv`
fn processed_file_name(original: &str) -> String {
    let stem = if original.to_ascii_lowercase().ends_with(".csv") {
        &original[..original.len() - 4]
    } else {
        original
    };
    let stem: String = stem.chars().filter(|c| *c != '"' && !c.is_control()).collect();
    format!("{stem}_processed.csv")
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
