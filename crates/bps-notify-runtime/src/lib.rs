//! bps-notify-runtime: async notification poller for the BPS IT inventory
//! server, plus its HTTP transport, settings persistence and local
//! notification capabilities.

pub mod api;
pub mod capability;
pub mod poller;
pub mod settings_store;
pub mod sink;

pub use api::{HttpNotificationApi, NotificationApi};
pub use capability::{
    Capabilities, CapabilityError, DesktopAlert, DesktopNotifier, NotifySend, Permission,
    SoundPlayer, TerminalBell,
};
pub use poller::{CycleOutcome, NotificationPoller, PollerSnapshot, PollerStatus};
pub use settings_store::{JsonFileStore, MemoryStore, SettingsStore};
pub use sink::{ConsoleSink, NotificationSink, NullSink};
