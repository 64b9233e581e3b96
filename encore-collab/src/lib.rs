mod auth;
mod bus;
mod catalog;
mod config;
mod db;
mod events;
mod identity;
mod queue;
mod rooms;
mod sync;
mod util;

use std::sync::Arc;

pub use auth::*;
pub use bus::*;
pub use catalog::*;
pub use config::*;
pub use db::*;
pub use events::*;
pub use identity::*;
pub use queue::*;
pub use rooms::*;
pub use sync::*;
pub use util::*;

/// The encore collab system, facilitating rooms, request queues, host
/// authentication, and the change notifications that keep every participant
/// looking at the same queue.
pub struct Encore<Db> {
    context: EncoreContext<Db>,

    pub auth: Auth<Db>,
    pub rooms: RoomRegistry<Db>,
    pub queue: QueueEngine<Db>,
}

/// A type passed to the components of the system, to access the store,
/// the configuration, and the notification bus.
pub struct EncoreContext<Db> {
    pub config: Config,
    pub database: Arc<Db>,
    pub bus: Arc<NotificationBus>,
}

impl<Db> Encore<Db>
where
    Db: Database,
{
    pub fn new(config: Config, database: Db) -> Self {
        let database = Arc::new(database);
        let bus = NotificationBus::new(&config);

        let context = EncoreContext {
            config,
            database,
            bus,
        };

        Self {
            auth: Auth::new(&context),
            rooms: RoomRegistry::new(&context),
            queue: QueueEngine::new(&context),
            context,
        }
    }

    pub fn config(&self) -> &Config {
        &self.context.config
    }

    pub fn bus(&self) -> &Arc<NotificationBus> {
        &self.context.bus
    }

    /// Starts a synchronizer for one participant of the given room
    pub async fn sync_room(
        &self,
        code: &str,
        view: QueueView,
    ) -> std::result::Result<RoomSync, SyncError> {
        RoomSync::start(&self.context, code, view).await
    }
}

impl<Db> Clone for EncoreContext<Db> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            database: self.database.clone(),
            bus: self.bus.clone(),
        }
    }
}
