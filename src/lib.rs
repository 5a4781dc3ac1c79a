// src/lib.rs

pub mod cli;
pub mod client;
pub mod commands;
pub mod db;
pub mod error;
pub mod parser;
pub mod render;
pub mod repl;
pub mod server;
pub mod settings;
pub mod sse;
pub mod state;
pub mod storage;
pub mod store;
pub mod types;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command};
use crate::db::{resolve_data_dir, resolve_db_path, SqliteStore};
use crate::error::AppError;
use crate::repl::Repl;
use crate::state::{lock, AppState};
use crate::storage::{KeyValueStore, MemoryStore};

const DEFAULT_LOG_FILTER: &str = "parley_lib=info";

fn init_logging() -> Result<(), AppError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(DEFAULT_LOG_FILTER))
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| AppError::Logging(e.to_string()))
}

fn open_storage(cli: &Cli) -> Result<Arc<dyn KeyValueStore>, AppError> {
    if cli.ephemeral {
        tracing::info!("[app] ephemeral session, nothing will be saved");
        return Ok(Arc::new(MemoryStore::new()));
    }

    let data_dir = resolve_data_dir(cli.data_dir.as_deref())?;
    let db_path = resolve_db_path(&data_dir);
    tracing::info!("[app] data: {}", db_path.display());
    Ok(Arc::new(SqliteStore::open(&db_path)?))
}

/// Flag and env values win over what was saved, and are saved in turn.
fn apply_overrides(state: &AppState, cli: &Cli) -> Result<(), AppError> {
    if cli.base_url.is_some() || cli.api_key.is_some() {
        let current = commands::get_config(state);
        let base_url = cli.base_url.as_deref().unwrap_or(&current.base_url);
        let api_key = cli.api_key.as_deref().unwrap_or(&current.api_key);
        commands::save_config(state, base_url, api_key)?;
    }
    if let Some(model) = cli.model.as_deref() {
        lock(&state.api_config).select_model(model)?;
    }
    Ok(())
}

fn find_chat(state: &AppState, prefix: &str) -> Option<String> {
    let history = lock(&state.history);
    let mut matches = history.list().iter().filter(|c| c.id.starts_with(prefix));
    let first = matches.next()?;
    matches.next().is_none().then(|| first.id.clone())
}

async fn dispatch(cli: Cli) -> Result<(), AppError> {
    if let Some(Command::ServeEcho { port, delay_ms }) = &cli.command {
        let listener = server::bind(*port).await?;
        return Ok(server::serve(listener, Duration::from_millis(*delay_ms)).await?);
    }

    let state = AppState::hydrate(open_storage(&cli)?)?;
    commands::ensure_user_id(&state)?;
    apply_overrides(&state, &cli)?;

    match cli.command {
        None => Repl::new(state, None).run().await,
        Some(Command::Chat { chat }) => {
            let chat = chat.map(|c| find_chat(&state, &c).unwrap_or(c));
            Repl::new(state, chat).run().await
        }
        Some(Command::Models) => {
            let models = commands::check_models(&state).await?;
            let selected = commands::get_config(&state).selected_model;
            for model in models {
                let marker = if model.id == selected { '*' } else { ' ' };
                println!("{marker} {}", model.id);
            }
            Ok(())
        }
        Some(Command::Export { chat, output }) => {
            let chat_id = find_chat(&state, &chat).unwrap_or(chat);
            let Some(html) = commands::export_chat(&state, &chat_id) else {
                eprintln!("No chat '{chat_id}'.");
                return Ok(());
            };
            match output {
                Some(path) => write_export(&path, &html)?,
                None => print!("{html}"),
            }
            Ok(())
        }
        Some(Command::ServeEcho { .. }) => Ok(()),
    }
}

fn write_export(path: &Path, html: &str) -> Result<(), AppError> {
    std::fs::write(path, html)?;
    tracing::info!("[app] wrote {}", path.display());
    Ok(())
}

pub fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    init_logging()?;

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(dispatch(cli))
}
