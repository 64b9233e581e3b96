use std::convert::Infallible;

use axum::{
    extract::{Path, State},
    response::{
        sse::{Event, KeepAlive},
        Sse,
    },
};
use encore_collab::QueueEvent;
use futures_util::{Stream, StreamExt};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{context::ServerContext, errors::ServerResult};

/// The envelope sent over a room's event stream. It carries only the change
/// kind: clients refetch the queue on every signal instead of trusting
/// event payloads.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ServerEvent {
    #[serde(rename = "type")]
    kind: EventKind,
}

#[derive(Debug, Clone, Copy, Serialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    SongRequested,
    SongVoted,
    SongStatusChanged,
    /// Terminal: the stream ends after this
    RoomClosed,
}

impl From<QueueEvent> for EventKind {
    fn from(value: QueueEvent) -> Self {
        match value {
            QueueEvent::SongRequested => Self::SongRequested,
            QueueEvent::SongVoted => Self::SongVoted,
            QueueEvent::SongStatusChanged => Self::SongStatusChanged,
            QueueEvent::RoomClosed => Self::RoomClosed,
        }
    }
}

#[utoipa::path(
    get,
    path = "/v1/rooms/{code}/events",
    tag = "rooms",
    responses(
        (
            status = 200,
            content_type = "text/event-stream",
            description = "A stream of change signals for the room, until it closes",
            body = ServerEvent
        ),
        (status = 404, description = "No open room with that code")
    )
)]
pub async fn room_events(
    State(context): State<ServerContext>,
    Path(code): Path<String>,
) -> ServerResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    context.encore.rooms.room_by_code(&code).await?;

    let stream = context.encore.bus().subscribe(&code).map(|event| {
        let payload = serde_json::to_string(&ServerEvent { kind: event.into() })
            .expect("serializes properly");

        Ok(Event::default().data(payload))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
