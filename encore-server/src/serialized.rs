//! All schemas that are exposed from endpoints are defined here
//! along with the conversion impls

use chrono::{DateTime, Utc};
use encore_collab::{RoomData, SessionData, SongData, SongStatus, TrackCandidate, UserData};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct User {
    id: i32,
    username: String,
    display_name: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResult {
    token: String,
    user: User,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    code: String,
    /// The display name of the owning host
    host: String,
    created_at: DateTime<Utc>,
}

/// Mirror of the collab song status for the wire
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum Status {
    Pending,
    Approved,
    Played,
    Rejected,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SongRequest {
    id: i32,
    room_code: String,
    track_id: String,
    title: String,
    thumbnail: String,
    url: String,
    submitter: String,
    status: Status,
    vote_count: i32,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    track_id: String,
    title: String,
    thumbnail: String,
    url: String,
}

impl Room {
    pub fn new(room: &RoomData, host: &UserData) -> Self {
        Self {
            code: room.code.clone(),
            host: host.display_name.clone(),
            created_at: room.created_at,
        }
    }
}

impl From<SongStatus> for Status {
    fn from(value: SongStatus) -> Self {
        match value {
            SongStatus::Pending => Self::Pending,
            SongStatus::Approved => Self::Approved,
            SongStatus::Played => Self::Played,
            SongStatus::Rejected => Self::Rejected,
        }
    }
}

impl From<Status> for SongStatus {
    fn from(value: Status) -> Self {
        match value {
            Status::Pending => Self::Pending,
            Status::Approved => Self::Approved,
            Status::Played => Self::Played,
            Status::Rejected => Self::Rejected,
        }
    }
}

/// Helper trait to convert any type into a serialized version
pub trait ToSerialized<T>
where
    T: Serialize,
{
    fn to_serialized(&self) -> T;
}

impl<I, O> ToSerialized<Vec<O>> for Vec<I>
where
    I: ToSerialized<O>,
    O: Serialize,
{
    fn to_serialized(&self) -> Vec<O> {
        self.iter().map(|x| x.to_serialized()).collect()
    }
}

impl ToSerialized<User> for UserData {
    fn to_serialized(&self) -> User {
        User {
            id: self.id,
            username: self.username.clone(),
            display_name: self.display_name.clone(),
        }
    }
}

impl ToSerialized<LoginResult> for SessionData {
    fn to_serialized(&self) -> LoginResult {
        LoginResult {
            token: self.token.clone(),
            user: self.user.to_serialized(),
        }
    }
}

impl ToSerialized<SongRequest> for SongData {
    fn to_serialized(&self) -> SongRequest {
        SongRequest {
            id: self.id,
            room_code: self.room_code.clone(),
            track_id: self.track_id.clone(),
            title: self.title.clone(),
            thumbnail: self.thumbnail.clone(),
            url: self.url.clone(),
            submitter: self.submitter.clone(),
            status: self.status.into(),
            vote_count: self.vote_count,
        }
    }
}

impl ToSerialized<Track> for TrackCandidate {
    fn to_serialized(&self) -> Track {
        Track {
            track_id: self.track_id.clone(),
            title: self.title.clone(),
            thumbnail: self.thumbnail.clone(),
            url: self.url.clone(),
        }
    }
}
