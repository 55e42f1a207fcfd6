#![doc = include_str!("../Readme.md")]
#![warn(clippy::all, clippy::pedantic, clippy::cargo, clippy::nursery)]
#![cfg_attr(any(test, feature = "bench"), allow(clippy::wildcard_imports))]
// TODO: These lints
#![allow(clippy::cargo_common_metadata)]
#![allow(clippy::multiple_crate_versions)]
#![allow(clippy::module_name_repetitions)]

use std::sync::Arc;

use axum::{
    extract::Extension,
    response::Html,
    routing::{get, IntoMakeService},
    Router, Server,
};
use clap::Parser;
use cli_batteries::await_shutdown;
use eyre::Result as EyreResult;
use hyper::server::conn::AddrIncoming;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use url::Url;

use crate::{
    auth_external::{DevTokenIssuer, LoggingOtpGateway},
    core_context::CoreContext,
    event_store::EventStore,
    question_store::QuestionStore,
    storage::storage_client,
    user_store::UserStore,
    util::parse_url,
};

mod api;
mod auth_external;
mod broadcast;
pub mod constants;
mod context;
mod core_context;
mod event_store;
mod lobby;
mod models;
mod question_store;
mod quiz;
mod scheduler;
mod sessions;
mod storage;
#[cfg(test)]
pub mod test_util;
mod transport;
mod user_store;
mod util;
mod wire_error;

#[derive(Clone, Debug, PartialEq, Eq, Parser)]
pub struct Options {
    /// API Server url to bind
    #[clap(long, env, default_value = "http://127.0.0.1:3000/")]
    pub server: Url,

    #[clap(flatten)]
    pub lobby: lobby::Options,

    #[clap(flatten)]
    pub scheduler: scheduler::Options,

    #[clap(flatten)]
    pub sessions: sessions::Options,

    #[clap(flatten)]
    pub storage: storage::Options,
}

#[allow(clippy::missing_errors_doc)]
pub async fn async_main(options: Options) -> EyreResult<()> {
    let addr = options.server.clone();
    let server = start_server(options).await?;
    info!("Listening on http://{}{}", server.local_addr(), addr.path());
    server.with_graceful_shutdown(await_shutdown()).await?;
    Ok(())
}

#[allow(clippy::missing_errors_doc)]
pub async fn start_server(
    options: Options,
) -> EyreResult<Server<AddrIncoming, IntoMakeService<Router>>> {
    info!("Starting trivia realtime core.");

    let storage = storage_client(&options.storage).await?;
    let event_store = Arc::new(EventStore::new(storage.clone()));
    let question_store = Arc::new(QuestionStore::new(storage.clone()));
    let user_store = Arc::new(UserStore::new(storage));

    let ctx = CoreContext::new(
        event_store,
        question_store,
        user_store,
        Arc::new(LoggingOtpGateway::default()),
        Arc::new(DevTokenIssuer::default()),
    );

    ctx.scheduler.spawn_all(&options.scheduler);
    tokio::spawn(sessions::heartbeat_loop(
        ctx.sessions.clone(),
        ctx.hub.clone(),
        std::time::Duration::from_secs(options.sessions.heartbeat_interval_secs),
    ));
    tokio::spawn(sessions::system_check_loop(
        ctx.sessions.clone(),
        ctx.lobby.clone(),
        std::time::Duration::from_secs(options.sessions.system_check_interval_secs),
        std::time::Duration::from_secs(options.sessions.idle_eviction_secs),
    ));

    let app = Router::new()
        .route("/hello_world", get(hello_world))
        .route("/ws", get(transport::ws::ws_handler))
        .nest("/api", api::router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(Extension(ctx));

    let (addr, prefix) = parse_url(&options.server)?;
    let app = Router::new().nest(prefix, app);
    let server = Server::try_bind(&addr)?.serve(app.into_make_service());
    Ok(server)
}

#[allow(clippy::unused_async)] // Required for axum function signature
async fn hello_world() -> Html<&'static str> {
    Html("<h1>Server is Running</h1>")
}
