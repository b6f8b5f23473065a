//! CLI definition using clap derive.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";

#[derive(Parser)]
#[command(name = "bps-notify", about = "BPS IT inventory notification client")]
pub struct Cli {
    /// Inventory server base URL
    #[arg(long, global = true, env = "BPS_NOTIFY_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Django session cookie value (sessionid)
    #[arg(long, global = true, env = "BPS_NOTIFY_SESSION", hide_env_values = true)]
    pub session: Option<String>,

    /// Settings file (default: $XDG_CONFIG_HOME/bps-notify/settings.json)
    #[arg(long, global = true)]
    pub settings_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Poll for notifications until interrupted
    Watch(WatchOpts),
    /// Fetch once and print the notification dropdown
    Check,
    /// Mark one notification as read
    MarkRead(MarkReadOpts),
    /// Mark every notification as read
    MarkAllRead,
    /// Show or update persisted settings
    Settings(SettingsOpts),
}

#[derive(clap::Args, Default)]
pub struct WatchOpts {
    /// Check interval in milliseconds (default: persisted setting)
    #[arg(long)]
    pub interval_ms: Option<u64>,

    /// Do not ring the terminal bell
    #[arg(long)]
    pub no_sound: bool,

    /// Do not send desktop notifications
    #[arg(long)]
    pub no_desktop: bool,

    /// Skip the warranty and overdue-assignment alert feeds
    #[arg(long)]
    pub no_alerts: bool,
}

#[derive(clap::Args)]
pub struct MarkReadOpts {
    /// Notification id
    pub id: String,
}

#[derive(clap::Args, Default)]
pub struct SettingsOpts {
    /// Turn notification sounds on or off
    #[arg(long, value_enum)]
    pub sound: Option<Toggle>,

    /// Check interval in milliseconds
    #[arg(long)]
    pub interval_ms: Option<u64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Toggle {
    On,
    Off,
}

impl Toggle {
    pub fn enabled(self) -> bool {
        self == Self::On
    }
}
