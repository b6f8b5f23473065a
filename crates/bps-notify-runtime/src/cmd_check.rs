//! `bps-notify check`: one fetch, then the title, badge and dropdown.

use std::sync::Arc;

use bps_notify_core::display::{badge, format_dropdown, page_title};
use bps_notify_core::{FetchErrorKind, Notification};
use bps_notify_runtime::{
    Capabilities, CycleOutcome, HttpNotificationApi, NotificationPoller, NotificationSink,
    SettingsStore,
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

/// Keeps every delivered notification for rendering after the cycle.
#[derive(Default)]
struct CollectingSink {
    delivered: Mutex<Vec<Notification>>,
}

impl NotificationSink for CollectingSink {
    fn on_new_notification(&self, notification: &Notification) {
        self.delivered.lock().push(notification.clone());
    }

    fn on_count_changed(&self, _unread: u32) {}
}

/// Entry point for `bps-notify check`.
pub async fn cmd_check(
    api: HttpNotificationApi,
    store: Arc<dyn SettingsStore>,
) -> anyhow::Result<()> {
    let sink = Arc::new(CollectingSink::default());
    let poller = NotificationPoller::new(api, Arc::clone(&sink), Capabilities::none(), store);

    match poller.check_now().await {
        CycleOutcome::Delivered { unread, .. } => {
            let delivered = std::mem::take(&mut *sink.delivered.lock());
            println!("{}", render_check(&delivered, unread, Utc::now()));
            Ok(())
        }
        CycleOutcome::Failed(kind) => anyhow::bail!("notification check failed: {}", describe(kind)),
        CycleOutcome::Aborted | CycleOutcome::Stopped => {
            anyhow::bail!("notification check did not complete")
        }
    }
}

fn render_check(notifications: &[Notification], unread: u32, now: DateTime<Utc>) -> String {
    let mut out = page_title(unread);
    out.push('\n');
    match badge(unread) {
        Some(b) => out.push_str(&format!("[{b}] unread\n")),
        None => out.push_str("no unread notifications\n"),
    }
    out.push('\n');
    out.push_str(&format_dropdown(notifications, now));
    out
}

fn describe(kind: FetchErrorKind) -> String {
    match kind {
        FetchErrorKind::Network => "server unreachable".to_string(),
        FetchErrorKind::Server { status: Some(status) } => format!("server returned {status}"),
        FetchErrorKind::Server { status: None } => "unexpected response from server".to_string(),
    }
}
