use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The type used for primary keys in the database.
pub type PrimaryKey = i32;

/// A host account
#[derive(Debug, Clone)]
pub struct UserData {
    pub id: PrimaryKey,
    pub username: String,
    pub password: String,
    pub display_name: String,
}

/// Login session data for host authentication
#[derive(Debug, Clone)]
pub struct SessionData {
    pub id: PrimaryKey,
    /// The session token, or key if you will
    pub token: String,
    /// The host that is logged in
    pub user: UserData,
    pub expires_at: DateTime<Utc>,
}

/// Whether a room is still joinable.
///
/// Rooms are created `Open` and become `Closed` exactly once. A closed room
/// is no longer resolvable by code and its code may be handed to a new room
/// immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RoomState {
    Open,
    Closed,
}

/// A request session, identified by its shareable 4-digit code
#[derive(Debug, Clone)]
pub struct RoomData {
    pub id: PrimaryKey,
    /// The code attendees use to find the room. Unique among open rooms only.
    pub code: String,
    /// The host that owns and moderates the room
    pub host_id: PrimaryKey,
    pub state: RoomState,
    pub created_at: DateTime<Utc>,
}

/// Where a song request sits in its moderation lifecycle.
///
/// `Played` and `Rejected` are terminal. Items are never deleted while their
/// room is open, only transitioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SongStatus {
    Pending,
    Approved,
    Played,
    Rejected,
}

impl SongStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Played | Self::Rejected)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Played => "played",
            Self::Rejected => "rejected",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "played" => Some(Self::Played),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

/// An attendee-submitted song request
#[derive(Debug, Clone)]
pub struct SongData {
    pub id: PrimaryKey,
    /// The code of the owning room. Items never outlive their room.
    pub room_code: String,
    /// The id of the track at the catalog provider
    pub track_id: String,
    pub title: String,
    pub thumbnail: String,
    pub url: String,
    /// The display label of whoever submitted the request
    pub submitter: String,
    pub status: SongStatus,
    pub vote_count: i32,
    pub created_at: DateTime<Utc>,
}

/// The result of an atomic vote write.
///
/// The voter-set insert and the counter increment happen in one critical
/// section, which is what keeps `vote_count` equal to the voter set size
/// under concurrent votes.
#[derive(Debug)]
pub enum VoteOutcome {
    /// The token was new, the vote was counted
    Counted(SongData),
    /// The token already voted on this song. No state changed.
    Duplicate(SongData),
    /// The song is in a terminal status and cannot be voted on
    NotVotable(SongData),
}

/// The result of a checked status write.
#[derive(Debug)]
pub enum TransitionOutcome {
    Applied(SongData),
    /// The song was not in any of the allowed source statuses. Carries the
    /// untouched current state.
    Refused(SongData),
}

#[derive(Debug)]
pub struct NewUser {
    pub username: String,
    pub password: String,
    pub display_name: String,
}

#[derive(Debug)]
pub struct NewSession {
    pub token: String,
    pub user_id: PrimaryKey,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct NewRoom {
    pub code: String,
    /// The host that will own the new room
    pub host_id: PrimaryKey,
}

#[derive(Debug)]
pub struct NewSong {
    pub room_code: String,
    pub track_id: String,
    pub title: String,
    pub thumbnail: String,
    pub url: String,
    pub submitter: String,
}
