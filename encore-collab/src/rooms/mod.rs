use log::info;
use rand::{thread_rng, Rng};
use thiserror::Error;

use crate::{Database, DatabaseError, EncoreContext, NewRoom, PrimaryKey, RoomData};

/// Every combination of 4 digits
const CODE_SPACE: usize = 10_000;

/// How many random draws to attempt before falling back to a linear walk.
/// Random draws resolve almost immediately while the code space is sparse;
/// the walk guarantees termination when it is dense.
const RANDOM_TRIES: usize = 8;

/// Creates, resolves and closes rooms, and owns the code allocation
/// invariant: a code points to at most one open room at a time.
pub struct RoomRegistry<Db> {
    context: EncoreContext<Db>,
}

#[derive(Debug, Error)]
pub enum RoomError {
    /// No open room holds this code. Closed rooms are indistinguishable
    /// from rooms that never existed.
    #[error("No open room with that code")]
    NotFound,
    /// The acting host does not own the room
    #[error("Only the host of the room may do this")]
    Forbidden,
    /// Every 4-digit code is currently held by an open room
    #[error("All room codes are currently in use")]
    CapacityExhausted,
    #[error(transparent)]
    Db(DatabaseError),
}

impl<Db> RoomRegistry<Db>
where
    Db: Database,
{
    pub fn new(context: &EncoreContext<Db>) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Opens a room for the given host under a freshly allocated code.
    ///
    /// When the instance is configured with a single active room per host, a
    /// host that still has an open room is handed that room back instead.
    pub async fn create_room(&self, host_id: PrimaryKey) -> Result<RoomData, RoomError> {
        if self.context.config.single_active_room_per_host {
            let existing = self
                .context
                .database
                .open_room_by_host(host_id)
                .await
                .map_err(RoomError::Db)?;

            if let Some(room) = existing {
                return Ok(room);
            }
        }

        let room = self.allocate(host_id).await?;
        info!("Room {} opened", room.code);

        Ok(room)
    }

    /// Resolves an open room by its code
    pub async fn room_by_code(&self, code: &str) -> Result<RoomData, RoomError> {
        self.context
            .database
            .room_by_code(code)
            .await
            .map_err(|e| match e {
                DatabaseError::NotFound { .. } => RoomError::NotFound,
                err => RoomError::Db(err),
            })
    }

    /// Closes a room, releasing its code and evicting its subscribers.
    ///
    /// The store retires the room first, then the room's channel delivers
    /// its terminal event and is torn down. Subscribers that refetch after
    /// the event observe the room as gone.
    pub async fn close_room(&self, code: &str, host_id: PrimaryKey) -> Result<(), RoomError> {
        let room = self.room_by_code(code).await?;

        if room.host_id != host_id {
            return Err(RoomError::Forbidden);
        }

        self.context
            .database
            .close_room(code)
            .await
            .map_err(|e| match e {
                // Lost a race against another close of the same room
                DatabaseError::NotFound { .. } => RoomError::NotFound,
                err => RoomError::Db(err),
            })?;

        self.context.bus.close(code);
        info!("Room {code} closed");

        Ok(())
    }

    async fn allocate(&self, host_id: PrimaryKey) -> Result<RoomData, RoomError> {
        let open_rooms = self
            .context
            .database
            .open_room_count()
            .await
            .map_err(RoomError::Db)?;

        if open_rooms >= CODE_SPACE {
            return Err(RoomError::CapacityExhausted);
        }

        for _ in 0..RANDOM_TRIES {
            match self.try_code(draw_code(), host_id).await? {
                Some(room) => return Ok(room),
                None => continue,
            }
        }

        // The space is dense, walk every code once from a random offset
        let offset = thread_rng().gen_range(0..CODE_SPACE);

        for step in 0..CODE_SPACE {
            let code = format!("{:04}", (offset + step) % CODE_SPACE);

            if let Some(room) = self.try_code(code, host_id).await? {
                return Ok(room);
            }
        }

        Err(RoomError::CapacityExhausted)
    }

    async fn try_code(
        &self,
        code: String,
        host_id: PrimaryKey,
    ) -> Result<Option<RoomData>, RoomError> {
        let created = self
            .context
            .database
            .create_room(NewRoom { code, host_id })
            .await;

        match created {
            Ok(room) => Ok(Some(room)),
            Err(DatabaseError::Conflict { .. }) => Ok(None),
            Err(e) => Err(RoomError::Db(e)),
        }
    }
}

fn draw_code() -> String {
    format!("{:04}", thread_rng().gen_range(0..CODE_SPACE))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{Config, Encore, MemoryDatabase, NewHost, QueueEvent};
    use futures_util::StreamExt;

    async fn host_id(encore: &Encore<MemoryDatabase>, username: &str) -> PrimaryKey {
        encore
            .auth
            .register(NewHost {
                username: username.to_string(),
                password: "hunter2hunter2".to_string(),
                display_name: username.to_string(),
            })
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn codes_are_four_digits_and_resolvable() {
        let encore = Encore::new(Config::default(), MemoryDatabase::default());
        let host = host_id(&encore, "venue").await;

        let room = encore.rooms.create_room(host).await.unwrap();

        assert_eq!(room.code.len(), 4);
        assert!(room.code.chars().all(|c| c.is_ascii_digit()));

        let resolved = encore.rooms.room_by_code(&room.code).await.unwrap();
        assert_eq!(resolved.id, room.id);
    }

    #[tokio::test]
    async fn closed_rooms_are_not_resolvable() {
        let encore = Encore::new(Config::default(), MemoryDatabase::default());
        let host = host_id(&encore, "venue").await;

        let room = encore.rooms.create_room(host).await.unwrap();
        encore.rooms.close_room(&room.code, host).await.unwrap();

        assert!(matches!(
            encore.rooms.room_by_code(&room.code).await,
            Err(RoomError::NotFound)
        ));
    }

    #[tokio::test]
    async fn only_the_owner_can_close() {
        let encore = Encore::new(Config::default(), MemoryDatabase::default());
        let owner = host_id(&encore, "venue").await;
        let other = host_id(&encore, "impostor").await;

        let room = encore.rooms.create_room(owner).await.unwrap();

        assert!(matches!(
            encore.rooms.close_room(&room.code, other).await,
            Err(RoomError::Forbidden)
        ));

        // The failed close changed nothing
        assert!(encore.rooms.room_by_code(&room.code).await.is_ok());
    }

    #[tokio::test]
    async fn closing_broadcasts_the_terminal_event() {
        let encore = Encore::new(Config::default(), MemoryDatabase::default());
        let host = host_id(&encore, "venue").await;

        let room = encore.rooms.create_room(host).await.unwrap();
        let mut subscription = encore.bus().subscribe(&room.code);

        encore.rooms.close_room(&room.code, host).await.unwrap();

        assert_eq!(subscription.next().await, Some(QueueEvent::RoomClosed));
        assert_eq!(subscription.next().await, None);
    }

    #[tokio::test]
    async fn single_active_room_policy_returns_the_existing_room() {
        let encore = Encore::new(Config::default(), MemoryDatabase::default());
        let host = host_id(&encore, "venue").await;

        let first = encore.rooms.create_room(host).await.unwrap();
        let second = encore.rooms.create_room(host).await.unwrap();

        assert_eq!(first.code, second.code);
    }

    #[tokio::test]
    async fn multiple_rooms_per_host_when_policy_is_off() {
        let config = Config {
            single_active_room_per_host: false,
            ..Default::default()
        };

        let encore = Encore::new(config, MemoryDatabase::default());
        let host = host_id(&encore, "venue").await;

        let first = encore.rooms.create_room(host).await.unwrap();
        let second = encore.rooms.create_room(host).await.unwrap();

        assert_ne!(first.code, second.code);
    }

    #[tokio::test]
    async fn exhausting_the_code_space_and_recovering() {
        let config = Config {
            single_active_room_per_host: false,
            ..Default::default()
        };

        let encore = Encore::new(config, MemoryDatabase::default());
        let host = host_id(&encore, "venue").await;

        let mut last_code = String::new();

        for _ in 0..CODE_SPACE {
            last_code = encore.rooms.create_room(host).await.unwrap().code;
        }

        assert!(matches!(
            encore.rooms.create_room(host).await,
            Err(RoomError::CapacityExhausted)
        ));

        // Closing any room frees its code for the next allocation
        encore.rooms.close_room(&last_code, host).await.unwrap();

        let reused = encore.rooms.create_room(host).await.unwrap();
        assert_eq!(reused.code, last_code);
    }
}
