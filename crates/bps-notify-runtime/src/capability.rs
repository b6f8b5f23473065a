//! Optional side-effect capabilities: alert sounds and native desktop
//! notifications. Either may be missing or denied at runtime, in which case
//! the poller skips that side effect.

use std::ffi::OsStr;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bps_notify_core::{Notification, Priority};
use thiserror::Error;

/// Non-high-priority desktop notifications close themselves after this long.
pub const DESKTOP_AUTO_CLOSE: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum CapabilityError {
    #[error("capability unavailable: {0}")]
    Unavailable(String),

    #[error("capability io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Desktop notification permission, mirroring the browser permission model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    /// Not decided yet; a request may still be granted.
    Default,
    Granted,
    Denied,
    Unsupported,
}

pub trait SoundPlayer: Send + Sync {
    fn play(&self, sound: &str) -> Result<(), CapabilityError>;
}

pub trait DesktopNotifier: Send + Sync {
    fn permission(&self) -> Permission;

    /// Ask for permission. Returns the resulting permission.
    fn request_permission(&self) -> Permission;

    fn show(&self, alert: &DesktopAlert) -> Result<(), CapabilityError>;
}

/// Native notification payload derived from a [`Notification`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesktopAlert {
    pub title: String,
    pub body: String,
    /// Replacement tag, `bps-{id}`.
    pub tag: String,
    pub url: Option<String>,
    pub require_interaction: bool,
    pub auto_close: Option<Duration>,
}

impl From<&Notification> for DesktopAlert {
    fn from(n: &Notification) -> Self {
        let high = n.priority == Priority::High;
        Self {
            title: n.title.clone(),
            body: n.message.clone(),
            tag: format!("bps-{}", n.id),
            url: n.url.clone(),
            require_interaction: high,
            auto_close: (!high).then_some(DESKTOP_AUTO_CLOSE),
        }
    }
}

/// The set of optional capabilities handed to the poller.
#[derive(Clone, Default)]
pub struct Capabilities {
    pub sound: Option<Arc<dyn SoundPlayer>>,
    pub desktop: Option<Arc<dyn DesktopNotifier>>,
}

impl Capabilities {
    pub fn none() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_sound(mut self, player: Arc<dyn SoundPlayer>) -> Self {
        self.sound = Some(player);
        self
    }

    #[must_use]
    pub fn with_desktop(mut self, notifier: Arc<dyn DesktopNotifier>) -> Self {
        self.desktop = Some(notifier);
        self
    }
}

// ─── Terminal bell ────────────────────────────────────────────────

/// Rings the terminal bell on stderr. The kind's sound file is only logged.
pub struct TerminalBell;

impl SoundPlayer for TerminalBell {
    fn play(&self, sound: &str) -> Result<(), CapabilityError> {
        tracing::debug!("bell for {sound}");
        let mut stderr = std::io::stderr();
        stderr.write_all(b"\x07")?;
        stderr.flush()?;
        Ok(())
    }
}

// ─── notify-send ──────────────────────────────────────────────────

/// Desktop notifier backed by the freedesktop `notify-send` tool.
pub struct NotifySend {
    bin: PathBuf,
    permission: Permission,
}

impl NotifySend {
    /// Look for `notify-send` on `PATH`. Without it the permission is
    /// `Unsupported` and every `show` fails.
    pub fn probe() -> Self {
        let path = std::env::var_os("PATH").unwrap_or_default();
        match find_in_path("notify-send", &path) {
            Some(bin) => Self {
                bin,
                permission: Permission::Granted,
            },
            None => Self {
                bin: PathBuf::from("notify-send"),
                permission: Permission::Unsupported,
            },
        }
    }
}

impl DesktopNotifier for NotifySend {
    fn permission(&self) -> Permission {
        self.permission
    }

    fn request_permission(&self) -> Permission {
        self.permission
    }

    fn show(&self, alert: &DesktopAlert) -> Result<(), CapabilityError> {
        if self.permission != Permission::Granted {
            return Err(CapabilityError::Unavailable(
                "notify-send not found on PATH".to_string(),
            ));
        }
        let (urgency, expire_ms) = if alert.require_interaction {
            ("critical", 0)
        } else {
            (
                "normal",
                alert.auto_close.map_or(0, |d| d.as_millis() as u64),
            )
        };
        let mut body = alert.body.clone();
        if let Some(ref url) = alert.url {
            body.push('\n');
            body.push_str(url);
        }

        // Reaped by tokio in the background; we never wait on it.
        tokio::process::Command::new(&self.bin)
            .arg("--app-name=bps-notify")
            .args(["-u", urgency])
            .arg("-t")
            .arg(expire_ms.to_string())
            .arg("-h")
            .arg(format!("string:x-dunst-stack-tag:{}", alert.tag))
            .arg(&alert.title)
            .arg(body)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()?;
        Ok(())
    }
}

fn find_in_path(bin: &str, path: &OsStr) -> Option<PathBuf> {
    std::env::split_paths(path)
        .map(|dir| dir.join(bin))
        .find(|candidate| candidate.is_file())
}
