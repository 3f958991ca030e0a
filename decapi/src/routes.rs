//! HTTP route handlers.

use axum::Router;
use axum::extract::multipart::MultipartError;
use axum::extract::{DefaultBodyLimit, Multipart, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::decompile::{DecompileResponse, OutputEncoding, StagedUpload, run_decompiler};
use crate::state::AppState;

/// Multipart field carrying the uploaded binary.
pub const FILE_FIELD: &str = "file";

/// Build the service router.
pub fn router(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes;
    Router::new()
        .route("/health", get(health))
        .route("/decompile/", post(decompile))
        .route("/decompile", post(decompile))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Debug, Default, Deserialize)]
struct DecompileParams {
    #[serde(default)]
    encoding: OutputEncoding,
}

/// POST /decompile/ - stage the `file` field, run the decompiler, return its output.
///
/// Responds 200 whenever the decompiler ran to completion, whatever its exit code. When
/// the configured timeout kills it, responds 504 with the output captured so far.
async fn decompile(
    State(state): State<AppState>,
    Query(params): Query<DecompileParams>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<DecompileResponse>), StatusCode> {
    let config = &state.config;

    let staged = loop {
        let Some(mut field) = multipart.next_field().await.map_err(multipart_status)? else {
            warn!(field = FILE_FIELD, "upload is missing the file field");
            return Err(StatusCode::UNPROCESSABLE_ENTITY);
        };
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        let mut upload = StagedUpload::create(&config.temp_dir)
            .await
            .map_err(internal)?;
        while let Some(chunk) = field.chunk().await.map_err(multipart_status)? {
            upload.write_chunk(&chunk).await.map_err(internal)?;
        }
        let staged = upload.finish().await.map_err(internal)?;
        info!(
            filename = %filename,
            size = staged.size(),
            path = %staged.path().display(),
            "upload staged"
        );
        break staged;
    };

    let output = run_decompiler(&config.decompiler, staged.path(), config.timeout)
        .await
        .map_err(internal)?;

    if let Err(err) = staged.remove().await {
        warn!("failed to remove staged upload: {err:#}");
    }

    let body = Json(DecompileResponse::encode(&output, params.encoding));
    if output.timed_out {
        return Ok((StatusCode::GATEWAY_TIMEOUT, body));
    }

    info!(
        exit_code = ?output.status.code(),
        stdout_bytes = output.stdout.len(),
        stderr_bytes = output.stderr.len(),
        "decompile finished"
    );
    Ok((StatusCode::OK, body))
}

fn multipart_status(err: MultipartError) -> StatusCode {
    warn!(err = %err, "failed to read multipart upload");
    err.status()
}

fn internal(err: anyhow::Error) -> StatusCode {
    error!("decompile request failed: {err:#}");
    StatusCode::INTERNAL_SERVER_ERROR
}
