use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, Error as SqlxError, PgPool};

use super::{
    Database, DatabaseError, IntoDatabaseError, NewRoom, NewSession, NewSong, NewUser, PrimaryKey,
    Result, RoomData, RoomState, SessionData, SongData, SongStatus, TransitionOutcome, UserData,
    VoteOutcome,
};

/// A postgres database implementation for encore
pub struct PgDatabase {
    pool: PgPool,
}

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS users (
        id SERIAL PRIMARY KEY,
        username TEXT NOT NULL UNIQUE,
        password TEXT NOT NULL,
        display_name TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS sessions (
        id SERIAL PRIMARY KEY,
        token TEXT NOT NULL UNIQUE,
        user_id INT NOT NULL REFERENCES users (id) ON DELETE CASCADE,
        expires_at TIMESTAMPTZ NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS rooms (
        id SERIAL PRIMARY KEY,
        code TEXT NOT NULL,
        host_id INT NOT NULL REFERENCES users (id),
        state TEXT NOT NULL DEFAULT 'open',
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    // Uniqueness is scoped to open rooms, so a code frees up the moment its
    // room closes
    "CREATE UNIQUE INDEX IF NOT EXISTS rooms_open_code ON rooms (code) WHERE state = 'open'",
    "CREATE TABLE IF NOT EXISTS songs (
        id SERIAL PRIMARY KEY,
        room_id INT NOT NULL REFERENCES rooms (id) ON DELETE CASCADE,
        track_id TEXT NOT NULL,
        title TEXT NOT NULL,
        thumbnail TEXT NOT NULL,
        url TEXT NOT NULL,
        submitter TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'pending',
        vote_count INT NOT NULL DEFAULT 0,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    "CREATE TABLE IF NOT EXISTS song_votes (
        song_id INT NOT NULL REFERENCES songs (id) ON DELETE CASCADE,
        token TEXT NOT NULL,
        PRIMARY KEY (song_id, token)
    )",
];

/// Songs are always selected through their room so that a reused code can
/// never resolve into a previous occupant's queue.
const SELECT_SONG: &str = "SELECT
        songs.id, rooms.code AS room_code, songs.track_id, songs.title,
        songs.thumbnail, songs.url, songs.submitter, songs.status,
        songs.vote_count, songs.created_at
    FROM songs
        INNER JOIN rooms ON rooms.id = songs.room_id
    WHERE rooms.state = 'open'";

#[derive(sqlx::FromRow)]
struct UserRow {
    id: PrimaryKey,
    username: String,
    password: String,
    display_name: String,
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: PrimaryKey,
    token: String,
    expires_at: DateTime<Utc>,
    user_id: PrimaryKey,
    username: String,
    password: String,
    display_name: String,
}

#[derive(sqlx::FromRow)]
struct RoomRow {
    id: PrimaryKey,
    code: String,
    host_id: PrimaryKey,
    state: String,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct SongRow {
    id: PrimaryKey,
    room_code: String,
    track_id: String,
    title: String,
    thumbnail: String,
    url: String,
    submitter: String,
    status: String,
    vote_count: i32,
    created_at: DateTime<Utc>,
}

impl PgDatabase {
    pub async fn new(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(5))
            .connect(url)
            .await
            .map_err(|e| DatabaseError::Internal(Box::new(e)))?;

        Ok(Self { pool })
    }

    /// Brings the schema up to date. Run once at startup.
    pub async fn migrate(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| e.any())?;
        }

        Ok(())
    }
}

impl IntoDatabaseError for SqlxError {
    fn not_found_or(self, resource: &'static str, identifier: &'static str) -> DatabaseError {
        match self {
            SqlxError::RowNotFound => DatabaseError::NotFound {
                resource,
                identifier,
            },
            e => DatabaseError::Internal(Box::new(e)),
        }
    }

    fn any(self) -> DatabaseError {
        DatabaseError::Internal(Box::new(self))
    }
}

/// Maps a unique index violation to [DatabaseError::Conflict]
fn conflict_or_any(
    error: SqlxError,
    resource: &'static str,
    field: &'static str,
    value: &str,
) -> DatabaseError {
    if let SqlxError::Database(ref db_error) = error {
        if db_error.is_unique_violation() {
            return DatabaseError::Conflict {
                resource,
                field,
                value: value.to_string(),
            };
        }
    }

    error.any()
}

impl From<UserRow> for UserData {
    fn from(row: UserRow) -> Self {
        UserData {
            id: row.id,
            username: row.username,
            password: row.password,
            display_name: row.display_name,
        }
    }
}

impl From<SessionRow> for SessionData {
    fn from(row: SessionRow) -> Self {
        SessionData {
            id: row.id,
            token: row.token,
            expires_at: row.expires_at,
            user: UserData {
                id: row.user_id,
                username: row.username,
                password: row.password,
                display_name: row.display_name,
            },
        }
    }
}

fn into_room(row: RoomRow) -> Result<RoomData> {
    let state = match row.state.as_str() {
        "open" => RoomState::Open,
        "closed" => RoomState::Closed,
        other => {
            return Err(DatabaseError::Internal(
                format!("unknown room state {other:?}").into(),
            ))
        }
    };

    Ok(RoomData {
        id: row.id,
        code: row.code,
        host_id: row.host_id,
        state,
        created_at: row.created_at,
    })
}

fn into_song(row: SongRow) -> Result<SongData> {
    let status = SongStatus::from_str(&row.status).ok_or_else(|| {
        DatabaseError::Internal(format!("unknown song status {:?}", row.status).into())
    })?;

    Ok(SongData {
        id: row.id,
        room_code: row.room_code,
        track_id: row.track_id,
        title: row.title,
        thumbnail: row.thumbnail,
        url: row.url,
        submitter: row.submitter,
        status,
        vote_count: row.vote_count,
        created_at: row.created_at,
    })
}

#[async_trait]
impl Database for PgDatabase {
    async fn user_by_id(&self, user_id: PrimaryKey) -> Result<UserData> {
        sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map(Into::into)
            .map_err(|e| e.not_found_or("user", "id"))
    }

    async fn user_by_username(&self, username: &str) -> Result<UserData> {
        sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE username = $1")
            .bind(username)
            .fetch_one(&self.pool)
            .await
            .map(Into::into)
            .map_err(|e| e.not_found_or("user", "username"))
    }

    async fn create_user(&self, new_user: NewUser) -> Result<UserData> {
        sqlx::query_as::<_, UserRow>(
            "INSERT INTO users (username, password, display_name) VALUES ($1, $2, $3) RETURNING *",
        )
        .bind(&new_user.username)
        .bind(&new_user.password)
        .bind(&new_user.display_name)
        .fetch_one(&self.pool)
        .await
        .map(Into::into)
        .map_err(|e| conflict_or_any(e, "user", "username", &new_user.username))
    }

    async fn session_by_token(&self, token: &str) -> Result<SessionData> {
        sqlx::query_as::<_, SessionRow>(
            "SELECT
                sessions.id, sessions.token, sessions.expires_at,
                users.id AS user_id, users.username, users.password, users.display_name
            FROM sessions
                INNER JOIN users ON users.id = sessions.user_id
            WHERE token = $1",
        )
        .bind(token)
        .fetch_one(&self.pool)
        .await
        .map(Into::into)
        .map_err(|e| e.not_found_or("session", "token"))
    }

    async fn create_session(&self, new_session: NewSession) -> Result<SessionData> {
        sqlx::query("INSERT INTO sessions (token, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(&new_session.token)
            .bind(new_session.user_id)
            .bind(new_session.expires_at)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())?;

        self.session_by_token(&new_session.token).await
    }

    async fn delete_session_by_token(&self, token: &str) -> Result<()> {
        sqlx::query("DELETE FROM sessions WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|_| ())
    }

    async fn clear_expired_sessions(&self) -> Result<()> {
        sqlx::query("DELETE FROM sessions WHERE expires_at < now()")
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|_| ())
    }

    async fn create_room(&self, new_room: NewRoom) -> Result<RoomData> {
        sqlx::query_as::<_, RoomRow>(
            "INSERT INTO rooms (code, host_id, state) VALUES ($1, $2, 'open') RETURNING *",
        )
        .bind(&new_room.code)
        .bind(new_room.host_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_or_any(e, "room", "code", &new_room.code))
        .and_then(into_room)
    }

    async fn room_by_code(&self, code: &str) -> Result<RoomData> {
        sqlx::query_as::<_, RoomRow>("SELECT * FROM rooms WHERE code = $1 AND state = 'open'")
            .bind(code)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("room", "code"))
            .and_then(into_room)
    }

    async fn open_room_by_host(&self, host_id: PrimaryKey) -> Result<Option<RoomData>> {
        sqlx::query_as::<_, RoomRow>(
            "SELECT * FROM rooms WHERE host_id = $1 AND state = 'open' LIMIT 1",
        )
        .bind(host_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| e.any())?
        .map(into_room)
        .transpose()
    }

    async fn open_room_count(&self) -> Result<usize> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM rooms WHERE state = 'open'")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.any())?;

        Ok(count as usize)
    }

    async fn close_room(&self, code: &str) -> Result<()> {
        let result = sqlx::query("UPDATE rooms SET state = 'closed' WHERE code = $1 AND state = 'open'")
            .bind(code)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound {
                resource: "room",
                identifier: "code",
            });
        }

        Ok(())
    }

    async fn create_song(&self, new_song: NewSong) -> Result<SongData> {
        let mut tx = self.pool.begin().await.map_err(|e| e.any())?;

        // Locking the room row serializes the insert against a racing close
        let room: Option<(PrimaryKey,)> =
            sqlx::query_as("SELECT id FROM rooms WHERE code = $1 AND state = 'open' FOR UPDATE")
                .bind(&new_song.room_code)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| e.any())?;

        let (room_id,) = room.ok_or(DatabaseError::NotFound {
            resource: "room",
            identifier: "code",
        })?;

        let (song_id,): (PrimaryKey,) = sqlx::query_as(
            "INSERT INTO songs (room_id, track_id, title, thumbnail, url, submitter)
                VALUES ($1, $2, $3, $4, $5, $6) RETURNING id",
        )
        .bind(room_id)
        .bind(&new_song.track_id)
        .bind(&new_song.title)
        .bind(&new_song.thumbnail)
        .bind(&new_song.url)
        .bind(&new_song.submitter)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| e.any())?;

        let row = sqlx::query_as::<_, SongRow>(&format!("{SELECT_SONG} AND songs.id = $1"))
            .bind(song_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| e.any())?;

        tx.commit().await.map_err(|e| e.any())?;
        into_song(row)
    }

    async fn song_by_id(&self, song_id: PrimaryKey) -> Result<SongData> {
        sqlx::query_as::<_, SongRow>(&format!("{SELECT_SONG} AND songs.id = $1"))
            .bind(song_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("song", "id"))
            .and_then(into_song)
    }

    async fn songs_by_room(&self, code: &str) -> Result<Vec<SongData>> {
        // Resolve the room first so an unknown or closed code is an error,
        // not an empty list
        let _ = self.room_by_code(code).await?;

        sqlx::query_as::<_, SongRow>(&format!(
            "{SELECT_SONG} AND rooms.code = $1 ORDER BY songs.id"
        ))
        .bind(code)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())?
        .into_iter()
        .map(into_song)
        .collect()
    }

    async fn add_vote(&self, song_id: PrimaryKey, token: &str) -> Result<VoteOutcome> {
        let mut tx = self.pool.begin().await.map_err(|e| e.any())?;

        let row = sqlx::query_as::<_, SongRow>(&format!(
            "{SELECT_SONG} AND songs.id = $1 FOR UPDATE OF songs"
        ))
        .bind(song_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| e.not_found_or("song", "id"))?;

        let mut song = into_song(row)?;

        if song.status.is_terminal() {
            tx.commit().await.map_err(|e| e.any())?;
            return Ok(VoteOutcome::NotVotable(song));
        }

        let inserted =
            sqlx::query("INSERT INTO song_votes (song_id, token) VALUES ($1, $2) ON CONFLICT DO NOTHING")
                .bind(song_id)
                .bind(token)
                .execute(&mut *tx)
                .await
                .map_err(|e| e.any())?
                .rows_affected();

        if inserted == 0 {
            tx.commit().await.map_err(|e| e.any())?;
            return Ok(VoteOutcome::Duplicate(song));
        }

        sqlx::query("UPDATE songs SET vote_count = vote_count + 1 WHERE id = $1")
            .bind(song_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| e.any())?;

        tx.commit().await.map_err(|e| e.any())?;

        song.vote_count += 1;
        Ok(VoteOutcome::Counted(song))
    }

    async fn transition_song(
        &self,
        song_id: PrimaryKey,
        from: &[SongStatus],
        to: SongStatus,
    ) -> Result<TransitionOutcome> {
        let mut tx = self.pool.begin().await.map_err(|e| e.any())?;

        let row = sqlx::query_as::<_, SongRow>(&format!(
            "{SELECT_SONG} AND songs.id = $1 FOR UPDATE OF songs"
        ))
        .bind(song_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| e.not_found_or("song", "id"))?;

        let mut song = into_song(row)?;

        if !from.contains(&song.status) {
            tx.commit().await.map_err(|e| e.any())?;
            return Ok(TransitionOutcome::Refused(song));
        }

        sqlx::query("UPDATE songs SET status = $1 WHERE id = $2")
            .bind(to.as_str())
            .bind(song_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| e.any())?;

        tx.commit().await.map_err(|e| e.any())?;

        song.status = to;
        Ok(TransitionOutcome::Applied(song))
    }
}
