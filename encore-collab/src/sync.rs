use std::sync::Arc;

use crossbeam::atomic::AtomicCell;
use futures_util::StreamExt;
use log::warn;
use parking_lot::RwLock;
use thiserror::Error;
use tokio::{task::JoinHandle, time::timeout};

use crate::{Database, EncoreContext, QueueEngine, QueueError, QueueView, SongData};

#[derive(Debug, Error)]
pub enum SyncError {
    /// The room could not be resolved, which is terminal for the
    /// participant trying to join it
    #[error("No open room with that code")]
    NotFound,
    /// The initial fetch did not complete within the configured bound
    #[error("Fetching the queue timed out")]
    Timeout,
    #[error(transparent)]
    Queue(QueueError),
}

/// Keeps one participant's local view of a room's queue in step with the
/// store.
///
/// The bus only says that something changed, so every signal triggers a full
/// refetch that replaces the snapshot wholesale. That makes missed,
/// reordered, or duplicated signals harmless: the next one converges the
/// view again. A failed or timed-out refetch is logged and skipped for the
/// same reason.
pub struct RoomSync {
    code: String,
    snapshot: Arc<RwLock<Vec<SongData>>>,
    closed: Arc<AtomicCell<bool>>,
    task: JoinHandle<()>,
}

impl RoomSync {
    /// Subscribes to the room and primes the snapshot with one full fetch.
    /// Subscription happens before the fetch, so no change can fall between
    /// the two.
    pub async fn start<Db>(
        context: &EncoreContext<Db>,
        code: &str,
        view: QueueView,
    ) -> Result<Self, SyncError>
    where
        Db: Database,
    {
        context
            .database
            .room_by_code(code)
            .await
            .map_err(|_| SyncError::NotFound)?;

        let subscription = context.bus.subscribe(code);
        let engine = QueueEngine::new(context);

        let initial = timeout(context.config.fetch_timeout, engine.list_songs(code, view))
            .await
            .map_err(|_| SyncError::Timeout)?
            .map_err(SyncError::Queue)?;

        let snapshot = Arc::new(RwLock::new(initial));
        let closed = Arc::new(AtomicCell::new(false));

        let task = {
            let code = code.to_string();
            let snapshot = snapshot.clone();
            let closed = closed.clone();
            let fetch_timeout = context.config.fetch_timeout;
            let mut subscription = subscription;

            tokio::spawn(async move {
                while let Some(event) = subscription.next().await {
                    if event.is_terminal() {
                        break;
                    }

                    match timeout(fetch_timeout, engine.list_songs(&code, view)).await {
                        Ok(Ok(songs)) => *snapshot.write() = songs,
                        // The room vanished under us; the terminal signal
                        // either follows or was dropped, stop either way
                        Ok(Err(QueueError::NotFound)) => break,
                        Ok(Err(e)) => warn!("Refetch of room {code} failed: {e}"),
                        Err(_) => warn!("Refetch of room {code} timed out"),
                    }
                }

                closed.store(true);
            })
        };

        Ok(Self {
            code: code.to_string(),
            snapshot,
            closed,
            task,
        })
    }

    /// The participant's current view of the queue
    pub fn songs(&self) -> Vec<SongData> {
        self.snapshot.read().clone()
    }

    /// True once the room closed and reconciliation stopped
    pub fn is_closed(&self) -> bool {
        self.closed.load()
    }

    pub fn code(&self) -> &str {
        &self.code
    }
}

impl Drop for RoomSync {
    fn drop(&mut self) {
        // Aborting the task drops the subscription, which deregisters it
        self.task.abort()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{Config, Encore, MemoryDatabase, NewHost, RoomData, SongStatus, Submitter, TrackCandidate};
    use std::time::Duration;

    async fn encore_with_room() -> (Encore<MemoryDatabase>, RoomData) {
        let encore = Encore::new(Config::default(), MemoryDatabase::default());

        let host = encore
            .auth
            .register(NewHost {
                username: "venue".to_string(),
                password: "hunter2hunter2".to_string(),
                display_name: "The Venue".to_string(),
            })
            .await
            .unwrap();

        let room = encore.rooms.create_room(host.id).await.unwrap();
        (encore, room)
    }

    fn track(title: &str) -> TrackCandidate {
        TrackCandidate {
            track_id: format!("track-{title}"),
            title: title.to_string(),
            thumbnail: String::new(),
            url: String::new(),
        }
    }

    async fn eventually(mut condition: impl FnMut() -> bool) {
        for _ in 0..400 {
            if condition() {
                return;
            }

            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        panic!("Condition was not met in time");
    }

    #[tokio::test]
    async fn snapshot_converges_after_every_signal() {
        let (encore, room) = encore_with_room().await;

        // A request made before the synchronizer starts is picked up by the
        // initial fetch
        encore
            .queue
            .request_song(&room.code, track("first"), Submitter::Guest)
            .await
            .unwrap();

        let sync = encore
            .sync_room(&room.code, QueueView::Attendee)
            .await
            .unwrap();
        assert_eq!(sync.songs().len(), 1);

        let second = encore
            .queue
            .request_song(&room.code, track("second"), Submitter::Guest)
            .await
            .unwrap();
        eventually(|| sync.songs().len() == 2).await;

        encore.queue.vote(second.id, "tok-a").await.unwrap();
        eventually(|| sync.songs().iter().any(|s| s.vote_count == 1)).await;

        encore
            .queue
            .set_status(second.id, room.host_id, SongStatus::Approved)
            .await
            .unwrap();
        eventually(|| {
            sync.songs()
                .iter()
                .any(|s| s.status == SongStatus::Approved)
        })
        .await;
    }

    #[tokio::test]
    async fn attendee_snapshots_drop_rejected_songs() {
        let (encore, room) = encore_with_room().await;

        let song = encore
            .queue
            .request_song(&room.code, track("first"), Submitter::Guest)
            .await
            .unwrap();

        let sync = encore
            .sync_room(&room.code, QueueView::Attendee)
            .await
            .unwrap();
        assert_eq!(sync.songs().len(), 1);

        encore
            .queue
            .set_status(song.id, room.host_id, SongStatus::Rejected)
            .await
            .unwrap();

        eventually(|| sync.songs().is_empty()).await;
    }

    #[tokio::test]
    async fn closing_the_room_halts_reconciliation() {
        let (encore, room) = encore_with_room().await;

        let sync = encore
            .sync_room(&room.code, QueueView::Attendee)
            .await
            .unwrap();
        assert!(!sync.is_closed());

        encore
            .rooms
            .close_room(&room.code, room.host_id)
            .await
            .unwrap();

        eventually(|| sync.is_closed()).await;
    }

    #[tokio::test]
    async fn unknown_rooms_cannot_be_joined() {
        let encore = Encore::new(Config::default(), MemoryDatabase::default());

        let result = encore.sync_room("0000", QueueView::Attendee).await;
        assert!(matches!(result, Err(SyncError::NotFound)));
    }
}
