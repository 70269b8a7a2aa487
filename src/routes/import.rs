use axum::extract::Multipart;
use axum::{extract::State, routing::post, Json, Router};

use crate::error::AppError;
use crate::pipeline::import::BatchReport;
use crate::pipeline::parse::FileFormat;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/import", post(import))
}

async fn import(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<BatchReport>, AppError> {
    let mut files: Vec<(String, Vec<u8>)> = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        AppError::BadRequest(format!("Failed to read multipart field: {}", e))
    })? {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field
            .file_name()
            .map(|s| s.to_string())
            .ok_or_else(|| AppError::BadRequest("No filename provided".to_string()))?;

        if FileFormat::from_filename(&filename).is_none() {
            return Err(AppError::BadRequest(format!(
                "Unsupported file format: {}",
                filename
            )));
        }

        let bytes = field.bytes().await.map_err(|e| {
            AppError::BadRequest(format!("Failed to read file bytes: {}", e))
        })?;

        files.push((filename, bytes.to_vec()));
    }

    if files.is_empty() {
        return Err(AppError::BadRequest("No file provided".to_string()));
    }

    tracing::info!("Importing {} file(s)", files.len());

    let report = tokio::task::spawn_blocking(move || state.import_files(&files))
        .await
        .map_err(|e| AppError::Internal(format!("Import task failed: {}", e)))?;

    Ok(Json(report))
}
