//! `bps-notify mark-read` and `bps-notify mark-all-read`.

use std::sync::Arc;

use bps_notify_runtime::{
    Capabilities, HttpNotificationApi, NotificationPoller, NullSink, SettingsStore,
};

pub async fn cmd_mark_read(
    api: HttpNotificationApi,
    store: Arc<dyn SettingsStore>,
    id: &str,
) -> anyhow::Result<()> {
    let poller = NotificationPoller::new(api, NullSink, Capabilities::none(), store);
    poller.mark_read(id).await?;
    println!("notification {id} marked as read");
    Ok(())
}

pub async fn cmd_mark_all_read(
    api: HttpNotificationApi,
    store: Arc<dyn SettingsStore>,
) -> anyhow::Result<()> {
    let poller = NotificationPoller::new(api, NullSink, Capabilities::none(), store);
    poller.mark_all_read().await?;
    println!("all notifications marked as read");
    Ok(())
}
