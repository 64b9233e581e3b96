use axum::{
    extract::{Path, State},
    routing::{post, put},
    Json,
};

use crate::{
    auth::Session,
    context::ServerContext,
    errors::ServerResult,
    schemas::{SetStatusSchema, ValidatedJson, VoteSchema},
    serialized::{SongRequest, ToSerialized},
    Router,
};

#[utoipa::path(
    post,
    path = "/v1/songs/{id}/votes",
    tag = "songs",
    request_body = VoteSchema,
    responses(
        (status = 200, body = SongRequest),
        (status = 404, description = "The song is absent or its room closed"),
        (status = 409, description = "The song is terminal and accepts no votes")
    )
)]
async fn vote(
    State(context): State<ServerContext>,
    Path(song_id): Path<i32>,
    ValidatedJson(body): ValidatedJson<VoteSchema>,
) -> ServerResult<Json<SongRequest>> {
    let song = context
        .encore
        .queue
        .vote(song_id, &body.session_token)
        .await?;

    Ok(Json(song.to_serialized()))
}

#[utoipa::path(
    put,
    path = "/v1/songs/{id}/status",
    tag = "songs",
    request_body = SetStatusSchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = SongRequest),
        (status = 403, description = "The acting host does not own the song's room"),
        (status = 409, description = "The transition is not allowed")
    )
)]
async fn set_status(
    session: Session,
    State(context): State<ServerContext>,
    Path(song_id): Path<i32>,
    ValidatedJson(body): ValidatedJson<SetStatusSchema>,
) -> ServerResult<Json<SongRequest>> {
    let song = context
        .encore
        .queue
        .set_status(song_id, session.user().id, body.status.into())
        .await?;

    Ok(Json(song.to_serialized()))
}

pub fn router() -> Router {
    Router::new()
        .route("/:id/votes", post(vote))
        .route("/:id/status", put(set_status))
}
