use axum::{
    extract::{Path, State},
    routing::{delete, get, post},
    Json,
};
use encore_collab::{QueueView, Submitter, TrackCandidate};

use crate::{
    auth::{MaybeSession, Session},
    context::ServerContext,
    errors::ServerResult,
    schemas::{NewSongSchema, ValidatedJson},
    serialized::{Room, SongRequest, ToSerialized},
    sse,
    Router,
};

#[utoipa::path(
    post,
    path = "/v1/rooms",
    tag = "rooms",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Room)
    )
)]
async fn create_room(
    session: Session,
    State(context): State<ServerContext>,
) -> ServerResult<Json<Room>> {
    let host = session.user();
    let room = context.encore.rooms.create_room(host.id).await?;

    Ok(Json(Room::new(&room, &host)))
}

#[utoipa::path(
    get,
    path = "/v1/rooms/{code}",
    tag = "rooms",
    responses(
        (status = 200, body = Room),
        (status = 404, description = "No open room with that code")
    )
)]
async fn room(
    State(context): State<ServerContext>,
    Path(code): Path<String>,
) -> ServerResult<Json<Room>> {
    let room = context.encore.rooms.room_by_code(&code).await?;
    let host = context.encore.auth.user_by_id(room.host_id).await?;

    Ok(Json(Room::new(&room, &host)))
}

#[utoipa::path(
    delete,
    path = "/v1/rooms/{code}",
    tag = "rooms",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, description = "The room was closed and its code released")
    )
)]
async fn close_room(
    session: Session,
    State(context): State<ServerContext>,
    Path(code): Path<String>,
) -> ServerResult<()> {
    context
        .encore
        .rooms
        .close_room(&code, session.user().id)
        .await?;

    Ok(())
}

#[utoipa::path(
    get,
    path = "/v1/rooms/{code}/songs",
    tag = "rooms",
    responses(
        (status = 200, body = Vec<SongRequest>)
    )
)]
async fn songs(
    maybe_session: MaybeSession,
    State(context): State<ServerContext>,
    Path(code): Path<String>,
) -> ServerResult<Json<Vec<SongRequest>>> {
    let room = context.encore.rooms.room_by_code(&code).await?;

    // Only the owning host gets the unfiltered view
    let view = match &maybe_session.0 {
        Some(session) if session.user.id == room.host_id => QueueView::Host,
        _ => QueueView::Attendee,
    };

    let songs = context.encore.queue.list_songs(&code, view).await?;

    Ok(Json(songs.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/rooms/{code}/songs",
    tag = "rooms",
    request_body = NewSongSchema,
    responses(
        (status = 200, body = SongRequest),
        (status = 404, description = "The room is absent or closed")
    )
)]
async fn request_song(
    State(context): State<ServerContext>,
    Path(code): Path<String>,
    ValidatedJson(body): ValidatedJson<NewSongSchema>,
) -> ServerResult<Json<SongRequest>> {
    let submitter = match body.submitter.filter(|s| !s.trim().is_empty()) {
        Some(name) => Submitter::Named(name),
        None => Submitter::Guest,
    };

    let track = TrackCandidate {
        track_id: body.track_id,
        title: body.title,
        thumbnail: body.thumbnail,
        url: body.url,
    };

    let song = context
        .encore
        .queue
        .request_song(&code, track, submitter)
        .await?;

    Ok(Json(song.to_serialized()))
}

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_room))
        .route("/:code", get(room))
        .route("/:code", delete(close_room))
        .route("/:code/songs", get(songs))
        .route("/:code/songs", post(request_song))
        .route("/:code/events", get(sse::room_events))
}
