use thiserror::Error;

use crate::{
    Database, DatabaseError, EncoreContext, NewSong, PrimaryKey, QueueEvent, SongData, SongStatus,
    TrackCandidate, TransitionOutcome, VoteOutcome,
};

/// Who is looking at the queue. Hosts see everything; attendees don't see
/// what the host rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueView {
    Host,
    Attendee,
}

/// How a request introduces its submitter
#[derive(Debug, Clone)]
pub enum Submitter {
    /// A free-text display name
    Named(String),
    /// The fixed anonymous placeholder
    Guest,
}

impl Submitter {
    pub const GUEST_LABEL: &'static str = "Guest";

    pub fn label(self) -> String {
        match self {
            Self::Named(name) => name,
            Self::Guest => Self::GUEST_LABEL.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum QueueError {
    /// The song or its room is absent, closed, or not visible
    #[error("Song or room does not exist")]
    NotFound,
    /// The acting host does not own the song's room
    #[error("Only the host of the room may do this")]
    Forbidden,
    /// The requested status change is not allowed from the song's current
    /// status, or the song is terminal and cannot be voted on
    #[error("Transition is not allowed from the song's current status")]
    InvalidTransition,
    #[error(transparent)]
    Db(DatabaseError),
}

/// The queue engine owns song requests: their creation, their vote tallies,
/// and the status machine the host drives them through.
///
/// ```text
/// Pending --approve--> Approved --mark played--> Played   (terminal)
/// Pending --reject--->  Rejected                          (terminal)
/// Approved --reject-->  Rejected          (behind a policy flag)
/// ```
pub struct QueueEngine<Db> {
    context: EncoreContext<Db>,
}

impl<Db> QueueEngine<Db>
where
    Db: Database,
{
    pub fn new(context: &EncoreContext<Db>) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Submits a track into a room's queue. The new item starts Pending
    /// with no votes.
    pub async fn request_song(
        &self,
        room_code: &str,
        track: TrackCandidate,
        submitter: Submitter,
    ) -> Result<SongData, QueueError> {
        let song = self
            .context
            .database
            .create_song(NewSong {
                room_code: room_code.to_string(),
                track_id: track.track_id,
                title: track.title,
                thumbnail: track.thumbnail,
                url: track.url,
                submitter: submitter.label(),
            })
            .await
            .map_err(map_not_found)?;

        self.context.bus.publish(room_code, QueueEvent::SongRequested);
        Ok(song)
    }

    /// Returns a room's queue in creation order, filtered for the viewer.
    ///
    /// The list is flat; grouping by status for display is the caller's
    /// concern. The only guarantee is that statuses and tallies are current
    /// as of the read.
    pub async fn list_songs(
        &self,
        room_code: &str,
        view: QueueView,
    ) -> Result<Vec<SongData>, QueueError> {
        let songs = self
            .context
            .database
            .songs_by_room(room_code)
            .await
            .map_err(map_not_found)?;

        let songs = match view {
            QueueView::Host => songs,
            QueueView::Attendee => songs
                .into_iter()
                .filter(|s| s.status != SongStatus::Rejected)
                .collect(),
        };

        Ok(songs)
    }

    /// Counts a vote for a song, keyed by the attendee's session token.
    ///
    /// Voting twice with the same token is a no-op that returns the current
    /// item, so retried or double-clicked votes never double-count. Only
    /// Pending and Approved songs accept votes.
    pub async fn vote(
        &self,
        song_id: PrimaryKey,
        session_token: &str,
    ) -> Result<SongData, QueueError> {
        let outcome = self
            .context
            .database
            .add_vote(song_id, session_token)
            .await
            .map_err(map_not_found)?;

        match outcome {
            VoteOutcome::Counted(song) => {
                self.context
                    .bus
                    .publish(&song.room_code, QueueEvent::SongVoted);
                Ok(song)
            }
            VoteOutcome::Duplicate(song) => Ok(song),
            VoteOutcome::NotVotable(_) => Err(QueueError::InvalidTransition),
        }
    }

    /// Drives a song through the status machine on behalf of its room's
    /// host. The write is a checked swap in the store, so two racing hosts
    /// cannot push a song through an illegal path.
    pub async fn set_status(
        &self,
        song_id: PrimaryKey,
        host_id: PrimaryKey,
        new_status: SongStatus,
    ) -> Result<SongData, QueueError> {
        let song = self
            .context
            .database
            .song_by_id(song_id)
            .await
            .map_err(map_not_found)?;

        let room = self
            .context
            .database
            .room_by_code(&song.room_code)
            .await
            .map_err(map_not_found)?;

        if room.host_id != host_id {
            return Err(QueueError::Forbidden);
        }

        let from = self.transition_sources(new_status);

        let outcome = self
            .context
            .database
            .transition_song(song_id, &from, new_status)
            .await
            .map_err(map_not_found)?;

        match outcome {
            TransitionOutcome::Applied(song) => {
                self.context
                    .bus
                    .publish(&song.room_code, QueueEvent::SongStatusChanged);
                Ok(song)
            }
            TransitionOutcome::Refused(_) => Err(QueueError::InvalidTransition),
        }
    }

    /// Which statuses may move to the given target
    fn transition_sources(&self, target: SongStatus) -> Vec<SongStatus> {
        match target {
            SongStatus::Approved => vec![SongStatus::Pending],
            SongStatus::Played => vec![SongStatus::Approved],
            SongStatus::Rejected => {
                if self.context.config.allow_approved_reject {
                    vec![SongStatus::Pending, SongStatus::Approved]
                } else {
                    vec![SongStatus::Pending]
                }
            }
            // Nothing transitions back to Pending
            SongStatus::Pending => vec![],
        }
    }
}

fn map_not_found(error: DatabaseError) -> QueueError {
    match error {
        DatabaseError::NotFound { .. } => QueueError::NotFound,
        err => QueueError::Db(err),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{Config, Encore, MemoryDatabase, NewHost, RoomData};

    async fn encore_with_room(config: Config) -> (Encore<MemoryDatabase>, RoomData) {
        let encore = Encore::new(config, MemoryDatabase::default());

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
            thumbnail: format!("https://example.com/{title}.jpg"),
            url: format!("https://example.com/{title}"),
        }
    }

    #[tokio::test]
    async fn request_vote_approve_play_lifecycle() {
        let (encore, room) = encore_with_room(Config::default()).await;
        let host_id = room.host_id;

        let song = encore
            .queue
            .request_song(&room.code, track("strawberries"), Submitter::Guest)
            .await
            .unwrap();

        assert_eq!(song.status, SongStatus::Pending);
        assert_eq!(song.vote_count, 0);
        assert_eq!(song.submitter, Submitter::GUEST_LABEL);

        let voted = encore.queue.vote(song.id, "tok-b").await.unwrap();
        assert_eq!(voted.vote_count, 1);

        // A second vote from the same identity changes nothing
        let revoted = encore.queue.vote(song.id, "tok-b").await.unwrap();
        assert_eq!(revoted.vote_count, 1);

        let approved = encore
            .queue
            .set_status(song.id, host_id, SongStatus::Approved)
            .await
            .unwrap();
        assert_eq!(approved.status, SongStatus::Approved);

        let played = encore
            .queue
            .set_status(song.id, host_id, SongStatus::Played)
            .await
            .unwrap();
        assert_eq!(played.status, SongStatus::Played);

        // Terminal items accept no further votes
        assert!(matches!(
            encore.queue.vote(song.id, "tok-c").await,
            Err(QueueError::InvalidTransition)
        ));
    }

    #[tokio::test]
    async fn vote_count_tracks_distinct_identities() {
        let (encore, room) = encore_with_room(Config::default()).await;

        let song = encore
            .queue
            .request_song(&room.code, track("bananas"), Submitter::Guest)
            .await
            .unwrap();

        for i in 0..5 {
            encore.queue.vote(song.id, &format!("tok-{i}")).await.unwrap();
        }

        // Replaying every identity leaves the tally untouched
        for i in 0..5 {
            let song = encore.queue.vote(song.id, &format!("tok-{i}")).await.unwrap();
            assert_eq!(song.vote_count, 5);
        }
    }

    #[tokio::test]
    async fn transitions_follow_the_table() {
        let (encore, room) = encore_with_room(Config::default()).await;
        let host_id = room.host_id;

        let song = encore
            .queue
            .request_song(&room.code, track("apples"), Submitter::Guest)
            .await
            .unwrap();

        // Pending cannot be marked played directly
        assert!(matches!(
            encore
                .queue
                .set_status(song.id, host_id, SongStatus::Played)
                .await,
            Err(QueueError::InvalidTransition)
        ));

        encore
            .queue
            .set_status(song.id, host_id, SongStatus::Rejected)
            .await
            .unwrap();

        // Rejected is terminal
        for target in [SongStatus::Approved, SongStatus::Played, SongStatus::Pending] {
            assert!(matches!(
                encore.queue.set_status(song.id, host_id, target).await,
                Err(QueueError::InvalidTransition)
            ));
        }

        let current = encore
            .queue
            .list_songs(&room.code, QueueView::Host)
            .await
            .unwrap();
        assert_eq!(current[0].status, SongStatus::Rejected);
    }

    #[tokio::test]
    async fn approved_reject_is_a_policy_choice() {
        for (allowed, expected_ok) in [(true, true), (false, false)] {
            let config = Config {
                allow_approved_reject: allowed,
                ..Default::default()
            };

            let (encore, room) = encore_with_room(config).await;
            let host_id = room.host_id;

            let song = encore
                .queue
                .request_song(&room.code, track("windows"), Submitter::Guest)
                .await
                .unwrap();

            encore
                .queue
                .set_status(song.id, host_id, SongStatus::Approved)
                .await
                .unwrap();

            let result = encore
                .queue
                .set_status(song.id, host_id, SongStatus::Rejected)
                .await;

            assert_eq!(result.is_ok(), expected_ok);
        }
    }

    #[tokio::test]
    async fn attendees_do_not_see_rejected_songs() {
        let (encore, room) = encore_with_room(Config::default()).await;
        let host_id = room.host_id;

        let kept = encore
            .queue
            .request_song(&room.code, track("linux"), Submitter::Named("mary".to_string()))
            .await
            .unwrap();

        let rejected = encore
            .queue
            .request_song(&room.code, track("windows"), Submitter::Guest)
            .await
            .unwrap();

        encore
            .queue
            .set_status(rejected.id, host_id, SongStatus::Rejected)
            .await
            .unwrap();

        let host_view = encore
            .queue
            .list_songs(&room.code, QueueView::Host)
            .await
            .unwrap();
        let attendee_view = encore
            .queue
            .list_songs(&room.code, QueueView::Attendee)
            .await
            .unwrap();

        assert_eq!(host_view.len(), 2);
        assert_eq!(attendee_view.len(), 1);
        assert_eq!(attendee_view[0].id, kept.id);
        assert_eq!(attendee_view[0].submitter, "mary");
    }

    #[tokio::test]
    async fn songs_keep_creation_order() {
        let (encore, room) = encore_with_room(Config::default()).await;

        for title in ["first", "second", "third"] {
            encore
                .queue
                .request_song(&room.code, track(title), Submitter::Guest)
                .await
                .unwrap();
        }

        let titles: Vec<_> = encore
            .queue
            .list_songs(&room.code, QueueView::Attendee)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.title)
            .collect();

        assert_eq!(titles, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn requests_into_a_closed_room_fail() {
        let (encore, room) = encore_with_room(Config::default()).await;

        encore
            .rooms
            .close_room(&room.code, room.host_id)
            .await
            .unwrap();

        assert!(matches!(
            encore
                .queue
                .request_song(&room.code, track("late"), Submitter::Guest)
                .await,
            Err(QueueError::NotFound)
        ));
    }

    #[tokio::test]
    async fn only_the_owning_host_may_moderate() {
        let (encore, room) = encore_with_room(Config::default()).await;

        let other = encore
            .auth
            .register(NewHost {
                username: "impostor".to_string(),
                password: "hunter2hunter2".to_string(),
                display_name: "Impostor".to_string(),
            })
            .await
            .unwrap();

        let song = encore
            .queue
            .request_song(&room.code, track("strawberries"), Submitter::Guest)
            .await
            .unwrap();

        assert!(matches!(
            encore
                .queue
                .set_status(song.id, other.id, SongStatus::Approved)
                .await,
            Err(QueueError::Forbidden)
        ));
    }

    #[tokio::test]
    async fn voting_on_an_unknown_song_fails() {
        let (encore, _) = encore_with_room(Config::default()).await;

        assert!(matches!(
            encore.queue.vote(999, "tok-a").await,
            Err(QueueError::NotFound)
        ));
    }
}
