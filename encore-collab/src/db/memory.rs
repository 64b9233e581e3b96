use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use super::{
    Database, DatabaseError, NewRoom, NewSession, NewSong, NewUser, PrimaryKey, Result, RoomData,
    RoomState, SessionData, SongData, SongStatus, TransitionOutcome, UserData, VoteOutcome,
};

/// An in-memory database implementation for encore.
///
/// Every operation runs under one lock, which trivially gives the per-entity
/// serialization the [Database] contract asks for. Useful for tests and
/// single-process deployments that don't need durability.
#[derive(Default)]
pub struct MemoryDatabase {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    next_id: PrimaryKey,
    users: HashMap<PrimaryKey, UserData>,
    sessions: HashMap<String, SessionData>,
    /// Open rooms only, keyed by code. Closing removes the entry, which is
    /// what frees the code.
    rooms: HashMap<String, RoomData>,
    /// Keyed by id, so iteration yields creation order.
    songs: BTreeMap<PrimaryKey, StoredSong>,
}

struct StoredSong {
    data: SongData,
    voters: HashSet<String>,
}

impl State {
    fn allocate_id(&mut self) -> PrimaryKey {
        self.next_id += 1;
        self.next_id
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn user_by_id(&self, user_id: PrimaryKey) -> Result<UserData> {
        self.state
            .lock()
            .users
            .get(&user_id)
            .cloned()
            .ok_or(DatabaseError::NotFound {
                resource: "user",
                identifier: "id",
            })
    }

    async fn user_by_username(&self, username: &str) -> Result<UserData> {
        self.state
            .lock()
            .users
            .values()
            .find(|u| u.username == username)
            .cloned()
            .ok_or(DatabaseError::NotFound {
                resource: "user",
                identifier: "username",
            })
    }

    async fn create_user(&self, new_user: NewUser) -> Result<UserData> {
        let mut state = self.state.lock();

        if state.users.values().any(|u| u.username == new_user.username) {
            return Err(DatabaseError::Conflict {
                resource: "user",
                field: "username",
                value: new_user.username,
            });
        }

        let user = UserData {
            id: state.allocate_id(),
            username: new_user.username,
            password: new_user.password,
            display_name: new_user.display_name,
        };

        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn session_by_token(&self, token: &str) -> Result<SessionData> {
        self.state
            .lock()
            .sessions
            .get(token)
            .cloned()
            .ok_or(DatabaseError::NotFound {
                resource: "session",
                identifier: "token",
            })
    }

    async fn create_session(&self, new_session: NewSession) -> Result<SessionData> {
        let mut state = self.state.lock();

        let user = state
            .users
            .get(&new_session.user_id)
            .cloned()
            .ok_or(DatabaseError::NotFound {
                resource: "user",
                identifier: "id",
            })?;

        let session = SessionData {
            id: state.allocate_id(),
            token: new_session.token.clone(),
            user,
            expires_at: new_session.expires_at,
        };

        state.sessions.insert(new_session.token, session.clone());
        Ok(session)
    }

    async fn delete_session_by_token(&self, token: &str) -> Result<()> {
        self.state.lock().sessions.remove(token);
        Ok(())
    }

    async fn clear_expired_sessions(&self) -> Result<()> {
        let now = Utc::now();
        self.state.lock().sessions.retain(|_, s| s.expires_at > now);
        Ok(())
    }

    async fn create_room(&self, new_room: NewRoom) -> Result<RoomData> {
        let mut state = self.state.lock();

        if state.rooms.contains_key(&new_room.code) {
            return Err(DatabaseError::Conflict {
                resource: "room",
                field: "code",
                value: new_room.code,
            });
        }

        let room = RoomData {
            id: state.allocate_id(),
            code: new_room.code.clone(),
            host_id: new_room.host_id,
            state: RoomState::Open,
            created_at: Utc::now(),
        };

        state.rooms.insert(new_room.code, room.clone());
        Ok(room)
    }

    async fn room_by_code(&self, code: &str) -> Result<RoomData> {
        self.state
            .lock()
            .rooms
            .get(code)
            .cloned()
            .ok_or(DatabaseError::NotFound {
                resource: "room",
                identifier: "code",
            })
    }

    async fn open_room_by_host(&self, host_id: PrimaryKey) -> Result<Option<RoomData>> {
        Ok(self
            .state
            .lock()
            .rooms
            .values()
            .find(|r| r.host_id == host_id)
            .cloned())
    }

    async fn open_room_count(&self) -> Result<usize> {
        Ok(self.state.lock().rooms.len())
    }

    async fn close_room(&self, code: &str) -> Result<()> {
        let mut state = self.state.lock();

        state.rooms.remove(code).ok_or(DatabaseError::NotFound {
            resource: "room",
            identifier: "code",
        })?;

        // Songs never outlive their room. Dropping them here also keeps a
        // reused code from resolving into the previous occupant's queue.
        state.songs.retain(|_, s| s.data.room_code != code);
        Ok(())
    }

    async fn create_song(&self, new_song: NewSong) -> Result<SongData> {
        let mut state = self.state.lock();

        if !state.rooms.contains_key(&new_song.room_code) {
            return Err(DatabaseError::NotFound {
                resource: "room",
                identifier: "code",
            });
        }

        let song = SongData {
            id: state.allocate_id(),
            room_code: new_song.room_code,
            track_id: new_song.track_id,
            title: new_song.title,
            thumbnail: new_song.thumbnail,
            url: new_song.url,
            submitter: new_song.submitter,
            status: SongStatus::Pending,
            vote_count: 0,
            created_at: Utc::now(),
        };

        state.songs.insert(
            song.id,
            StoredSong {
                data: song.clone(),
                voters: HashSet::new(),
            },
        );

        Ok(song)
    }

    async fn song_by_id(&self, song_id: PrimaryKey) -> Result<SongData> {
        self.state
            .lock()
            .songs
            .get(&song_id)
            .map(|s| s.data.clone())
            .ok_or(DatabaseError::NotFound {
                resource: "song",
                identifier: "id",
            })
    }

    async fn songs_by_room(&self, code: &str) -> Result<Vec<SongData>> {
        let state = self.state.lock();

        if !state.rooms.contains_key(code) {
            return Err(DatabaseError::NotFound {
                resource: "room",
                identifier: "code",
            });
        }

        Ok(state
            .songs
            .values()
            .filter(|s| s.data.room_code == code)
            .map(|s| s.data.clone())
            .collect())
    }

    async fn add_vote(&self, song_id: PrimaryKey, token: &str) -> Result<VoteOutcome> {
        let mut state = self.state.lock();

        let song = state
            .songs
            .get_mut(&song_id)
            .ok_or(DatabaseError::NotFound {
                resource: "song",
                identifier: "id",
            })?;

        if song.data.status.is_terminal() {
            return Ok(VoteOutcome::NotVotable(song.data.clone()));
        }

        if !song.voters.insert(token.to_string()) {
            return Ok(VoteOutcome::Duplicate(song.data.clone()));
        }

        song.data.vote_count += 1;
        debug_assert_eq!(song.data.vote_count as usize, song.voters.len());

        Ok(VoteOutcome::Counted(song.data.clone()))
    }

    async fn transition_song(
        &self,
        song_id: PrimaryKey,
        from: &[SongStatus],
        to: SongStatus,
    ) -> Result<TransitionOutcome> {
        let mut state = self.state.lock();

        let song = state
            .songs
            .get_mut(&song_id)
            .ok_or(DatabaseError::NotFound {
                resource: "song",
                identifier: "id",
            })?;

        if !from.contains(&song.data.status) {
            return Ok(TransitionOutcome::Refused(song.data.clone()));
        }

        song.data.status = to;
        Ok(TransitionOutcome::Applied(song.data.clone()))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn song(room_code: &str) -> NewSong {
        NewSong {
            room_code: room_code.to_string(),
            track_id: "t-1".to_string(),
            title: "strawberries".to_string(),
            thumbnail: "thumb".to_string(),
            url: "url".to_string(),
            submitter: "Guest".to_string(),
        }
    }

    #[tokio::test]
    async fn open_code_conflicts() {
        let db = MemoryDatabase::default();

        db.create_room(NewRoom {
            code: "4821".to_string(),
            host_id: 1,
        })
        .await
        .unwrap();

        let second = db
            .create_room(NewRoom {
                code: "4821".to_string(),
                host_id: 2,
            })
            .await;

        assert!(matches!(second, Err(DatabaseError::Conflict { .. })));

        db.close_room("4821").await.unwrap();

        // The code is free again once the first occupant closed
        db.create_room(NewRoom {
            code: "4821".to_string(),
            host_id: 2,
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn votes_are_atomic_per_token() {
        let db = MemoryDatabase::default();

        db.create_room(NewRoom {
            code: "1000".to_string(),
            host_id: 1,
        })
        .await
        .unwrap();

        let song = db.create_song(song("1000")).await.unwrap();

        let first = db.add_vote(song.id, "tok-a").await.unwrap();
        assert!(matches!(first, VoteOutcome::Counted(ref s) if s.vote_count == 1));

        let second = db.add_vote(song.id, "tok-a").await.unwrap();
        assert!(matches!(second, VoteOutcome::Duplicate(ref s) if s.vote_count == 1));
    }

    #[tokio::test]
    async fn closing_a_room_invalidates_its_songs() {
        let db = MemoryDatabase::default();

        db.create_room(NewRoom {
            code: "2000".to_string(),
            host_id: 1,
        })
        .await
        .unwrap();

        let created = db.create_song(song("2000")).await.unwrap();
        db.close_room("2000").await.unwrap();

        assert!(matches!(
            db.song_by_id(created.id).await,
            Err(DatabaseError::NotFound { .. })
        ));
    }
}
