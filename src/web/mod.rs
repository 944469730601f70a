//! sociable-web: HTTP and WebSocket server over the social storage.
//!
//! Exposes profiles, friendships, chats, complaints and account settings as a
//! JSON API, streams each user's chat list over a WebSocket, and persists
//! everything in SQLite.

pub mod config;
pub mod handlers;
pub mod router;
pub mod state;
pub mod utils;

use clap::Parser;

use crate::storage::{db_path, Storage};

use config::{Cli, Config};
use state::AppState;

/// Entry point: parse CLI, open storage, start server.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = Config::from_cli_and_env(cli);

    crate::logging::init();

    crate::slog!("sociable-web starting");
    crate::slog!("  data directory: {}", config.data_dir.display());

    let db = db_path(&config.data_dir);
    let storage = Storage::open(&db)?;
    crate::slog!("  database: {}", db.display());
    crate::slog!("  chat list settle: {} ms", config.settle.as_millis());

    let state = AppState::new(storage, config.settle);
    let app = router::build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    crate::slog!("sociable-web listening on http://{}", config.bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}
