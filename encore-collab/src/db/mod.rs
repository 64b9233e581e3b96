use async_trait::async_trait;
use thiserror::Error;

mod data;
pub use data::*;

mod memory;
pub use memory::*;

mod pg;
pub use pg::*;

pub type Result<T> = std::result::Result<T, DatabaseError>;

#[derive(Debug, Error)]
pub enum DatabaseError {
    /// An unknown or internal error happened with the database
    #[error(transparent)]
    Internal(Box<dyn std::error::Error + Send + Sync>),
    /// A resource already exists
    #[error("{resource} with {field} of value {value} already exists")]
    Conflict {
        /// The resource in question
        resource: &'static str,
        /// The field that is conflicting
        field: &'static str,
        /// The conflicting value
        value: String,
    },
    /// A resource in the database doesn't exist
    #[error("{resource}:{identifier} doesn't exist")]
    NotFound {
        resource: &'static str,
        identifier: &'static str,
    },
}

/// Helper trait to reduce boilerplate
pub trait IntoDatabaseError {
    fn not_found_or(self, resource: &'static str, identifier: &'static str) -> DatabaseError;
    fn any(self) -> DatabaseError;
}

/// Represents a type that can durably hold encore's rooms and queues.
///
/// Mutating operations are atomic primitives. The engines never read, decide
/// and write back in separate calls, because that loses votes and lets
/// illegal transitions slip through under concurrency. The store is expected
/// to serialize `add_vote` and `transition_song` per song, and `create_song`
/// and `close_room` per room.
#[async_trait]
pub trait Database: Send + Sync + 'static {
    async fn user_by_id(&self, user_id: PrimaryKey) -> Result<UserData>;
    async fn user_by_username(&self, username: &str) -> Result<UserData>;
    async fn create_user(&self, new_user: NewUser) -> Result<UserData>;

    async fn session_by_token(&self, token: &str) -> Result<SessionData>;
    async fn create_session(&self, new_session: NewSession) -> Result<SessionData>;
    async fn delete_session_by_token(&self, token: &str) -> Result<()>;
    async fn clear_expired_sessions(&self) -> Result<()>;

    /// Creates a room, failing with [DatabaseError::Conflict] if the code is
    /// already held by an open room.
    async fn create_room(&self, new_room: NewRoom) -> Result<RoomData>;
    /// Resolves an open room by code. Closed rooms are not resolvable.
    async fn room_by_code(&self, code: &str) -> Result<RoomData>;
    /// Returns the open room owned by the given host, if any.
    async fn open_room_by_host(&self, host_id: PrimaryKey) -> Result<Option<RoomData>>;
    async fn open_room_count(&self) -> Result<usize>;
    /// Retires an open room, releasing its code for reuse and invalidating
    /// all of its songs.
    async fn close_room(&self, code: &str) -> Result<()>;

    /// Creates a song in the given room. The room's openness is re-checked
    /// in the same critical section, so requests racing a close either fail
    /// or land before it, never after.
    async fn create_song(&self, new_song: NewSong) -> Result<SongData>;
    /// Resolves a song whose room is still open.
    async fn song_by_id(&self, song_id: PrimaryKey) -> Result<SongData>;
    /// All songs of an open room, in creation order.
    async fn songs_by_room(&self, code: &str) -> Result<Vec<SongData>>;
    /// Records a vote: inserts the token into the song's voter set and bumps
    /// the count, atomically. Duplicate tokens change nothing.
    async fn add_vote(&self, song_id: PrimaryKey, token: &str) -> Result<VoteOutcome>;
    /// Moves a song to `to` only if its current status is one of `from`,
    /// as a single checked write.
    async fn transition_song(
        &self,
        song_id: PrimaryKey,
        from: &[SongStatus],
        to: SongStatus,
    ) -> Result<TransitionOutcome>;
}
