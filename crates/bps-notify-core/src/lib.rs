//! bps-notify-core: data model and pure state for the inventory notification
//! client. No async, no IO: the runtime crate owns timers and transport.

pub mod display;
pub mod error;
pub mod ledger;
pub mod settings;
pub mod style;
pub mod types;

pub use error::{FetchError, FetchErrorKind, PollerError, SettingsError};
pub use ledger::{Batch, Ingested, NotificationLedger};
pub use settings::{DEFAULT_CHECK_INTERVAL_MS, NotifySettings};
pub use style::{KindStyle, Tone};
pub use types::{
    AlertFeed, AssignmentAlertsResponse, FetchResponse, Notification, NotificationKind,
    OverdueAssignment, Priority, WarrantyAlert, WarrantyAlertsResponse,
};
