use std::time::Duration;

/// The configuration of an encore instance
#[derive(Debug, Clone)]
pub struct Config {
    /// If this is true, a host that already owns an open room is handed that
    /// room back instead of a second one
    pub single_active_room_per_host: bool,
    /// Whether a host can reject a request it previously approved
    pub allow_approved_reject: bool,
    /// How long a synchronizer waits for a queue refetch before giving up
    pub fetch_timeout: Duration,
    /// How long a catalog lookup may take before it is reported as unavailable
    pub catalog_timeout: Duration,
    /// The default amount of candidates returned by a catalog search
    pub catalog_limit: usize,
    /// How long a host login session stays valid
    pub session_duration_in_days: i64,
    /// How many undelivered events a room subscriber may accumulate.
    /// Older events are dropped first, which is harmless since every event
    /// triggers the same full refetch.
    pub subscriber_buffer: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            single_active_room_per_host: true,
            allow_approved_reject: true,
            fetch_timeout: Duration::from_secs(5),
            catalog_timeout: Duration::from_secs(10),
            catalog_limit: 12,
            session_duration_in_days: 7,
            subscriber_buffer: 64,
        }
    }
}
