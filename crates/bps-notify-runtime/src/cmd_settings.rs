//! `bps-notify settings`: show or update persisted notification settings.

use bps_notify_core::NotifySettings;
use bps_notify_runtime::SettingsStore;
use bps_notify_runtime::settings_store::load_or_default;

use crate::cli::SettingsOpts;

/// Entry point for `bps-notify settings`.
pub fn cmd_settings(store: &dyn SettingsStore, opts: &SettingsOpts) -> anyhow::Result<()> {
    let settings = apply(store, opts)?;
    print!("{}", format_settings(&settings));
    Ok(())
}

fn apply(store: &dyn SettingsStore, opts: &SettingsOpts) -> anyhow::Result<NotifySettings> {
    let mut settings = load_or_default(store);
    if opts.sound.is_none() && opts.interval_ms.is_none() {
        return Ok(settings);
    }

    if let Some(toggle) = opts.sound {
        settings.sound_enabled = toggle.enabled();
    }
    if let Some(interval_ms) = opts.interval_ms {
        anyhow::ensure!(interval_ms > 0, "check interval must be greater than zero");
        settings.check_interval_ms = interval_ms;
    }
    store.save(&settings)?;
    tracing::info!("notification settings saved");
    Ok(settings)
}

fn format_settings(settings: &NotifySettings) -> String {
    format!(
        "sound: {}\ncheck interval: {}ms\n",
        if settings.sound_enabled { "on" } else { "off" },
        settings.check_interval_ms
    )
}
