use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tokio_stream::StreamExt;

use crate::errors::AppError;
use crate::models::reversal::{ReversalResponse, StatusSnapshot};
use crate::state::AppState;

#[utoipa::path(
    get,
    path = "/reversal",
    responses(
        (status = 200, description = "Latest reversal monitor status", body = ReversalResponse)
    )
)]
pub async fn get_reversal_status(
    State(state): State<AppState>,
) -> Result<Json<ReversalResponse>, AppError> {
    let status = state.status.status.read().await.clone();
    Ok(Json(ReversalResponse { status }))
}

#[utoipa::path(
    get,
    path = "/reversal/stream",
    responses(
        (status = 200, description = "SSE stream of monitor status snapshots", content_type = "text/event-stream")
    )
)]
pub async fn get_reversal_stream(
    State(state): State<AppState>,
) -> Result<Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>>, AppError> {
    // Subscribe first so a cycle finishing in between is not lost
    let rx = state.status.broadcaster.subscribe();

    let initial_events: Vec<Result<Event, Infallible>> = match state.status.status.read().await.clone() {
        Some(status) => {
            let snapshot = StatusSnapshot {
                as_of_ms: chrono::Utc::now().timestamp_millis() as u64,
                status,
            };
            snapshot_event(snapshot).map(Ok).into_iter().collect()
        }
        None => Vec::new(),
    };
    let initial_stream = tokio_stream::iter(initial_events);

    let broadcast_stream = BroadcastStream::new(rx).filter_map(|message| match message {
        Ok(snapshot) => snapshot_event(snapshot).map(Ok),
        Err(BroadcastStreamRecvError::Lagged(_)) => None,
    });

    let stream = initial_stream.chain(broadcast_stream);

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}

fn snapshot_event(snapshot: StatusSnapshot) -> Option<Event> {
    let data = serde_json::to_string(&snapshot).ok()?;
    Some(
        Event::default()
            .event("status")
            .id(snapshot.as_of_ms.to_string())
            .data(data),
    )
}
