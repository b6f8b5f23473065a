//! Key-value persistence for [`NotifySettings`]: a JSON file on disk, or an
//! in-memory store for tests and one-shot commands.

use std::path::{Path, PathBuf};

use bps_notify_core::{NotifySettings, SettingsError};
use parking_lot::Mutex;

pub trait SettingsStore: Send + Sync {
    /// `Ok(None)` when nothing has been stored yet.
    fn load(&self) -> Result<Option<NotifySettings>, SettingsError>;

    fn save(&self, settings: &NotifySettings) -> Result<(), SettingsError>;
}

/// Load settings, falling back to defaults when absent or unreadable.
pub fn load_or_default(store: &dyn SettingsStore) -> NotifySettings {
    match store.load() {
        Ok(Some(settings)) => settings,
        Ok(None) => NotifySettings::default(),
        Err(e) => {
            tracing::warn!("failed to load notification settings: {e}");
            NotifySettings::default()
        }
    }
}

/// Default settings path: `$XDG_CONFIG_HOME/bps-notify/settings.json`,
/// else `~/.config/bps-notify/settings.json`.
pub fn default_settings_path() -> PathBuf {
    if let Some(dir) = std::env::var_os("XDG_CONFIG_HOME") {
        return PathBuf::from(dir).join("bps-notify/settings.json");
    }
    let home = std::env::var_os("HOME").unwrap_or_else(|| ".".into());
    PathBuf::from(home).join(".config/bps-notify/settings.json")
}

pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsStore for JsonFileStore {
    fn load(&self) -> Result<Option<NotifySettings>, SettingsError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(NotifySettings::from_json(&raw)?))
    }

    fn save(&self, settings: &NotifySettings) -> Result<(), SettingsError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        // Atomic replace via temp file.
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, settings.to_json()?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryStore {
    slot: Mutex<Option<NotifySettings>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(settings: NotifySettings) -> Self {
        Self {
            slot: Mutex::new(Some(settings)),
        }
    }

    pub fn stored(&self) -> Option<NotifySettings> {
        *self.slot.lock()
    }
}

impl SettingsStore for MemoryStore {
    fn load(&self) -> Result<Option<NotifySettings>, SettingsError> {
        Ok(*self.slot.lock())
    }

    fn save(&self, settings: &NotifySettings) -> Result<(), SettingsError> {
        *self.slot.lock() = Some(*settings);
        Ok(())
    }
}
