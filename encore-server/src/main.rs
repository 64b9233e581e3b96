use std::{env, sync::Arc};

use encore_collab::{Config, DatabaseError, Encore, ItunesCatalog, PgDatabase};
use encore_server::{init_logger, run_server, ServerContext};
use log::{error, info};
use thiserror::Error;

#[derive(Debug, Error)]
enum StartError {
    #[error("Could not initialize database: {0}")]
    Database(#[from] DatabaseError),
    #[error("DATABASE_URL must be set")]
    MissingDatabaseUrl,
}

impl StartError {
    fn hint(&self) -> &'static str {
        match self {
            StartError::Database(_) => {
                "Make sure the postgres instance is running and DATABASE_URL points at it, then try again."
            }
            StartError::MissingDatabaseUrl => "Set DATABASE_URL to a postgres connection string.",
        }
    }
}

#[tokio::main]
async fn main() {
    init_logger();

    if let Err(error) = start().await {
        error!("Encore failed to start!");
        error!("{error}");
        error!("Hint: {}", error.hint());
        std::process::exit(1);
    }
}

async fn start() -> Result<(), StartError> {
    let url = env::var("DATABASE_URL").map_err(|_| StartError::MissingDatabaseUrl)?;

    info!("Connecting to database...");
    let database = PgDatabase::new(&url).await?;
    database.migrate().await?;

    let encore = Arc::new(Encore::new(Config::default(), database));
    let catalog = Arc::new(ItunesCatalog::new(encore.config()));

    run_server(ServerContext { encore, catalog }).await;
    Ok(())
}
