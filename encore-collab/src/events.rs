use serde::Serialize;

/// A change signal delivered to everyone subscribed to a room.
///
/// Events deliberately carry no payload. They only invalidate whatever a
/// subscriber has cached, forcing a full refetch of the queue from the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueueEvent {
    /// An attendee submitted a new song request
    SongRequested,
    /// A vote was counted on a pending or approved request
    SongVoted,
    /// The host moved a request through its status machine
    SongStatusChanged,
    /// The room was closed by its host. Terminal: the subscription ends
    /// after delivering this.
    RoomClosed,
}

impl QueueEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::RoomClosed)
    }
}
