//! Media endpoints
//!
//! POST /media, GET /media, GET /media/:id, GET /media/:id/transcript,
//! POST /media/batches/:id/cancel

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::media::MediaFilter;
use crate::error::{ApiError, ApiResult};
use crate::export::TranscriptFormat;
use crate::library::MediaDetail;
use crate::models::{MediaItem, MediaStatus, SourceKind};
use crate::AppState;

/// POST /media request
#[derive(Debug, Deserialize)]
pub struct AddMediaRequest {
    pub sources: Vec<String>,
    /// Run the batch inline and return its summary
    #[serde(default)]
    pub wait: bool,
}

/// POST /media response when the batch runs in the background
#[derive(Debug, Serialize)]
pub struct AddMediaAccepted {
    pub batch_id: Uuid,
    pub source_count: usize,
    /// Where progress is streamed
    pub events: String,
}

/// GET /media query
#[derive(Debug, Default, Deserialize)]
pub struct ListMediaParams {
    pub title: Option<String>,
    pub source_kind: Option<String>,
    pub status: Option<String>,
    pub limit: Option<u32>,
}

impl ListMediaParams {
    fn into_filter(self) -> ApiResult<MediaFilter> {
        let source_kind = self
            .source_kind
            .map(|s| s.parse::<SourceKind>())
            .transpose()
            .map_err(|e| ApiError::BadRequest(e.to_string()))?;
        let status = self
            .status
            .map(|s| s.parse::<MediaStatus>())
            .transpose()
            .map_err(|e| ApiError::BadRequest(e.to_string()))?;
        Ok(MediaFilter {
            title: self.title.filter(|t| !t.trim().is_empty()),
            source_kind,
            status,
            limit: self.limit,
        })
    }
}

/// GET /media/:id/transcript query
#[derive(Debug, Default, Deserialize)]
pub struct TranscriptParams {
    pub format: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ListMediaResponse {
    pub count: usize,
    pub media: Vec<MediaItem>,
}

#[derive(Debug, Serialize)]
pub struct CancelBatchResponse {
    pub batch_id: Uuid,
    pub cancelled: bool,
}

/// POST /media
///
/// With `wait` the summary is returned (200). Otherwise the batch runs in
/// the background and 202 Accepted carries its id.
pub async fn add_media(
    State(state): State<AppState>,
    Json(request): Json<AddMediaRequest>,
) -> ApiResult<Response> {
    let sources: Vec<String> = request
        .sources
        .into_iter()
        .map(|s| s.trim().to_string())
        .collect();
    if sources.is_empty() {
        return Err(ApiError::BadRequest("sources must not be empty".to_string()));
    }

    let batch_id = Uuid::new_v4();
    let cancel = CancellationToken::new();
    state
        .cancellation_tokens
        .write()
        .await
        .insert(batch_id, cancel.clone());

    if request.wait {
        let summary = state.library.add_batch(batch_id, &sources, cancel).await;
        state.cancellation_tokens.write().await.remove(&batch_id);
        return Ok(Json(summary).into_response());
    }

    let source_count = sources.len();
    let background = state.clone();
    tokio::spawn(async move {
        let summary = background.library.add_batch(batch_id, &sources, cancel).await;
        background.cancellation_tokens.write().await.remove(&batch_id);
        if summary.failed() > 0 {
            let message = format!(
                "Batch {}: {} of {} items failed",
                batch_id,
                summary.failed(),
                summary.outcomes.len()
            );
            warn!("{}", message);
            *background.last_error.write().await = Some(message);
        }
    });

    info!(batch_id = %batch_id, sources = source_count, "Add batch accepted");
    Ok((
        StatusCode::ACCEPTED,
        Json(AddMediaAccepted {
            batch_id,
            source_count,
            events: "/events".to_string(),
        }),
    )
        .into_response())
}

/// GET /media
pub async fn list_media(
    State(state): State<AppState>,
    Query(params): Query<ListMediaParams>,
) -> ApiResult<Json<ListMediaResponse>> {
    let filter = params.into_filter()?;
    let media = state.library.list_media(&filter).await?;
    Ok(Json(ListMediaResponse {
        count: media.len(),
        media,
    }))
}

/// GET /media/:id
pub async fn get_media(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<MediaDetail>> {
    Ok(Json(state.library.media_detail(&id).await?))
}

/// GET /media/:id/transcript?format=vtt|srt|json
///
/// Defaults to WebVTT.
pub async fn get_transcript(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<TranscriptParams>,
) -> ApiResult<Response> {
    let format = match params.format.as_deref() {
        Some(name) => name
            .parse::<TranscriptFormat>()
            .map_err(|e| ApiError::BadRequest(e.to_string()))?,
        None => TranscriptFormat::default(),
    };
    let body = state.library.export_transcript(&id, format).await?;
    Ok(([(header::CONTENT_TYPE, format.content_type())], body).into_response())
}

/// POST /media/batches/:batch_id/cancel
///
/// Items already in progress finish; the rest are reported `cancelled`.
pub async fn cancel_batch(
    State(state): State<AppState>,
    Path(batch_id): Path<Uuid>,
) -> ApiResult<Json<CancelBatchResponse>> {
    let token = state.cancellation_tokens.read().await.get(&batch_id).cloned();
    match token {
        Some(token) => {
            token.cancel();
            info!(batch_id = %batch_id, "Add batch cancellation requested");
            Ok(Json(CancelBatchResponse {
                batch_id,
                cancelled: true,
            }))
        }
        None => Err(ApiError::NotFound(format!("Batch {} is not running", batch_id))),
    }
}

pub fn media_routes() -> Router<AppState> {
    Router::new()
        .route("/media", post(add_media).get(list_media))
        .route("/media/:id", get(get_media))
        .route("/media/:id/transcript", get(get_transcript))
        .route("/media/batches/:batch_id/cancel", post(cancel_batch))
}
