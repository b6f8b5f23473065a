//! User-tunable notification settings and their persisted JSON shape.

use serde::{Deserialize, Serialize};

pub const DEFAULT_CHECK_INTERVAL_MS: u64 = 30_000;

/// Persisted settings. Field names match the stored JSON document
/// (`{"soundEnabled": true, "checkInterval": 30000}`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifySettings {
    #[serde(rename = "soundEnabled")]
    pub sound_enabled: bool,
    #[serde(rename = "checkInterval")]
    pub check_interval_ms: u64,
}

impl Default for NotifySettings {
    fn default() -> Self {
        Self {
            sound_enabled: true,
            check_interval_ms: DEFAULT_CHECK_INTERVAL_MS,
        }
    }
}

impl NotifySettings {
    /// Parse a stored document. Missing fields take their defaults and a
    /// zero interval is treated as unset.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        let parsed: Self = serde_json::from_str(raw)?;
        Ok(parsed.normalized())
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    #[must_use]
    pub fn normalized(mut self) -> Self {
        if self.check_interval_ms == 0 {
            self.check_interval_ms = DEFAULT_CHECK_INTERVAL_MS;
        }
        self
    }
}
