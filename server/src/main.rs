//! `quire` - serves the notes agent API on the configured address.

use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use quire_config::{QuireConfig, RecentFiles, SettingsStore, quire_home};
use quire_server::{AppState, ConfiguredModels, router};

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (log_file, init_warnings) = open_log_file();

    if let Some((log_path, file)) = log_file {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .with(env_filter)
            .init();
        tracing::info!(path = %log_path.display(), "Logging initialized");
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(env_filter)
            .init();
    }
    for warning in init_warnings {
        tracing::warn!("{warning}");
    }
}

fn open_log_file() -> (Option<(PathBuf, fs::File)>, Vec<String>) {
    let mut warnings = Vec::new();
    for candidate in log_file_candidates() {
        if let Some(parent) = candidate.parent()
            && let Err(e) = fs::create_dir_all(parent)
        {
            warnings.push(format!("Failed to create log dir {}: {e}", parent.display()));
            continue;
        }
        match OpenOptions::new().create(true).append(true).open(&candidate) {
            Ok(file) => return (Some((candidate, file)), warnings),
            Err(e) => warnings.push(format!(
                "Failed to open log file {}: {e}",
                candidate.display()
            )),
        }
    }
    (None, warnings)
}

fn log_file_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(home) = quire_home() {
        candidates.push(home.join("logs").join("quire.log"));
    }
    candidates.push(PathBuf::from(".quire").join("logs").join("quire.log"));
    candidates
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = match QuireConfig::load() {
        Ok(config) => config.unwrap_or_default(),
        Err(e) => {
            tracing::warn!("Ignoring unreadable config: {e}");
            QuireConfig::default()
        }
    };
    let home = quire_home().unwrap_or_else(|| PathBuf::from(".quire"));
    let settings = SettingsStore::load_or_default(
        SettingsStore::default_path().unwrap_or_else(|| home.join("settings.json")),
    )
    .context("Failed to load settings")?;
    let recent = RecentFiles::load(
        RecentFiles::default_path().unwrap_or_else(|| home.join("recent.json")),
    );
    tracing::info!(
        root = %settings.settings().root_directory.display(),
        "Notes root ready"
    );

    let bind = config.bind_address();
    let state = AppState::new(settings, recent, Arc::new(ConfiguredModels::new(config)));
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind {bind}"))?;
    tracing::info!(address = %bind, "Quire listening");

    axum::serve(listener, router(state))
        .await
        .context("Server stopped with an error")
}
