//! Download routes.
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | GET | `/api/downloads` | List every task in the registry |
//! | POST | `/api/downloads` | Enqueue an episode download |
//! | GET | `/api/downloads/events` | Server-sent progress events |
//! | POST | `/api/downloads/clear` | Drop terminal tasks from the registry |
//! | GET | `/api/downloads/{episode_id}` | Progress of one task |
//! | DELETE | `/api/downloads/{episode_id}` | Cancel a pending or running task |

use std::convert::Infallible;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use ferry_engine::{Anime, Cookies, Episode, TaskSnapshot};
use futures::{Stream, StreamExt};
use serde::Deserialize;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::warn;

use crate::api::error::ApiResult;
use crate::api::server::AppState;

#[derive(Debug, Deserialize)]
pub struct EnqueueRequest {
    pub anime: Anime,
    pub episode: Episode,
    pub source_url: String,
    #[serde(default)]
    pub cookies: Cookies,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_downloads).post(enqueue_download))
        .route("/events", get(download_events))
        .route("/clear", post(clear_completed))
        .route("/{episode_id}", get(get_download).delete(cancel_download))
}

async fn list_downloads(State(state): State<AppState>) -> Json<Vec<TaskSnapshot>> {
    Json(state.gateway.get_all_downloads())
}

async fn enqueue_download(
    State(state): State<AppState>,
    Json(request): Json<EnqueueRequest>,
) -> ApiResult<(StatusCode, Json<TaskSnapshot>)> {
    let snapshot = state.gateway.enqueue_download_with_cookies(
        &request.anime,
        &request.episode,
        &request.source_url,
        request.cookies,
    )?;
    Ok((StatusCode::CREATED, Json(snapshot)))
}

async fn get_download(
    State(state): State<AppState>,
    Path(episode_id): Path<String>,
) -> ApiResult<Json<TaskSnapshot>> {
    Ok(Json(state.gateway.get_download_progress(&episode_id)?))
}

async fn cancel_download(
    State(state): State<AppState>,
    Path(episode_id): Path<String>,
) -> ApiResult<StatusCode> {
    state.gateway.cancel_download(&episode_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn clear_completed(State(state): State<AppState>) -> Json<serde_json::Value> {
    let removed = state.gateway.clear_completed_downloads();
    Json(serde_json::json!({ "removed": removed }))
}

async fn download_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = BroadcastStream::new(state.gateway.subscribe()).filter_map(|item| async move {
        match item {
            Ok(event) => match Event::default().event(event.name()).json_data(&event) {
                Ok(sse) => Some(Ok(sse)),
                Err(e) => {
                    warn!("Failed to encode download event: {}", e);
                    None
                }
            },
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                warn!(skipped, "Event subscriber lagged behind");
                None
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
