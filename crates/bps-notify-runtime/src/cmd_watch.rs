//! `bps-notify watch`: run the poller and alert feeds until interrupted.

use std::sync::Arc;

use bps_notify_core::AlertFeed;
use bps_notify_runtime::{
    Capabilities, ConsoleSink, HttpNotificationApi, NotificationPoller, NotifySend, SettingsStore,
    TerminalBell,
};

use crate::cli::WatchOpts;

/// Entry point for `bps-notify watch`.
pub async fn cmd_watch(
    api: HttpNotificationApi,
    store: Arc<dyn SettingsStore>,
    opts: &WatchOpts,
) -> anyhow::Result<()> {
    let poller = NotificationPoller::new(api, ConsoleSink, capabilities(opts), store);

    match opts.interval_ms {
        Some(interval_ms) => poller.start(interval_ms)?,
        None => poller.start_with_settings()?,
    }
    if !opts.no_alerts {
        for feed in AlertFeed::ALL {
            poller.start_alert_feed(feed, feed.default_period_ms())?;
        }
    }

    let result = wait_for_shutdown().await;
    poller.stop();

    let snapshot = poller.snapshot();
    tracing::info!(
        "notification watch ended ({} unread, last check: {})",
        snapshot.unread_count,
        snapshot
            .last_check
            .map_or_else(|| "never".to_string(), |t| t.to_rfc3339())
    );
    result
}

fn capabilities(opts: &WatchOpts) -> Capabilities {
    let mut caps = Capabilities::none();
    if !opts.no_sound {
        caps = caps.with_sound(Arc::new(TerminalBell));
    }
    if !opts.no_desktop {
        caps = caps.with_desktop(Arc::new(NotifySend::probe()));
    }
    caps
}

/// Resolve on ctrl-c or SIGTERM.
async fn wait_for_shutdown() -> anyhow::Result<()> {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            _ = ctrl_c => tracing::info!("received ctrl-c, shutting down"),
            _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await?;
        tracing::info!("received ctrl-c, shutting down");
    }

    Ok(())
}
