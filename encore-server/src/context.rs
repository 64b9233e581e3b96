use std::sync::Arc;

use encore_collab::{Encore, ItunesCatalog, PgDatabase};

/// Shared state available to every route handler
#[derive(Clone)]
pub struct ServerContext {
    pub encore: Arc<Encore<PgDatabase>>,
    pub catalog: Arc<ItunesCatalog>,
}
