mod auth;
mod catalog;
mod context;
mod errors;
mod logging;
mod rooms;
mod schemas;
mod serialized;
mod songs;
mod sse;

use std::{
    env,
    net::{Ipv6Addr, SocketAddr},
};

use log::info;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

pub use context::ServerContext;
pub use logging::init_logger;

/// The default port the server will listen on.
pub const DEFAULT_PORT: u16 = 9072;

pub type Router = axum::Router<ServerContext>;

/// Starts the encore server
pub async fn run_server(context: ServerContext) {
    let port = env::var("ENCORE_SERVER_PORT")
        .map(|x| x.parse::<u16>().expect("Port must be a number"))
        .unwrap_or(DEFAULT_PORT);

    let addr: SocketAddr = (Ipv6Addr::UNSPECIFIED, port).into();

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let version_one_router = Router::new()
        .nest("/auth", auth::router())
        .nest("/rooms", rooms::router())
        .nest("/songs", songs::router())
        .nest("/catalog", catalog::router());

    let root_router = Router::new()
        .nest("/v1", version_one_router)
        .with_state(context)
        .layer(cors);

    let listener = TcpListener::bind(&addr).await.expect("listens on address");

    info!("Listening on port {port}");

    axum::serve(listener, root_router.into_make_service())
        .await
        .unwrap();
}
