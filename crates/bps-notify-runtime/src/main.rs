//! bps-notify: terminal client for BPS IT inventory notifications.

use std::sync::Arc;

use clap::Parser;

use bps_notify_runtime::settings_store::default_settings_path;
use bps_notify_runtime::{HttpNotificationApi, JsonFileStore, SettingsStore};

mod cli;
mod cmd_check;
mod cmd_read;
mod cmd_settings;
mod cmd_watch;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    let filter = std::env::var("BPS_NOTIFY_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    let settings_path = args.settings_path.unwrap_or_else(default_settings_path);
    let store: Arc<dyn SettingsStore> = Arc::new(JsonFileStore::new(settings_path));

    let mut api = HttpNotificationApi::new(&args.base_url)?;
    if let Some(session) = args.session {
        api = api.with_session(session);
    }

    match args.command {
        cli::Command::Watch(opts) => {
            tracing::info!("watching {} for notifications", args.base_url);
            cmd_watch::cmd_watch(api, store, &opts).await?;
        }
        cli::Command::Check => {
            cmd_check::cmd_check(api, store).await?;
        }
        cli::Command::MarkRead(opts) => {
            cmd_read::cmd_mark_read(api, store, &opts.id).await?;
        }
        cli::Command::MarkAllRead => {
            cmd_read::cmd_mark_all_read(api, store).await?;
        }
        cli::Command::Settings(opts) => {
            cmd_settings::cmd_settings(store.as_ref(), &opts)?;
        }
    }

    Ok(())
}
