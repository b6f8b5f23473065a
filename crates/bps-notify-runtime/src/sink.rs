//! Presentation collaborators notified by the poller.

use std::sync::Arc;

use bps_notify_core::display::{format_toast, page_title};
use bps_notify_core::{FetchErrorKind, Notification};

/// Callbacks invoked synchronously from the fetch cycle, in delivery order.
pub trait NotificationSink: Send + Sync + 'static {
    /// Called exactly once per newly seen notification.
    fn on_new_notification(&self, notification: &Notification);

    /// Called whenever the unread count changes.
    fn on_count_changed(&self, unread: u32);

    /// Diagnostic hook for a failed cycle. Never fatal.
    fn on_fetch_error(&self, _kind: FetchErrorKind) {}
}

impl<T: NotificationSink + ?Sized> NotificationSink for Arc<T> {
    fn on_new_notification(&self, notification: &Notification) {
        (**self).on_new_notification(notification);
    }

    fn on_count_changed(&self, unread: u32) {
        (**self).on_count_changed(unread);
    }

    fn on_fetch_error(&self, kind: FetchErrorKind) {
        (**self).on_fetch_error(kind);
    }
}

/// Prints toasts and title updates to stdout.
pub struct ConsoleSink;

impl NotificationSink for ConsoleSink {
    fn on_new_notification(&self, notification: &Notification) {
        println!("{}", format_toast(notification));
    }

    fn on_count_changed(&self, unread: u32) {
        println!("{}", page_title(unread));
    }

    fn on_fetch_error(&self, kind: FetchErrorKind) {
        tracing::debug!("fetch error reported to console sink: {kind:?}");
    }
}

/// Discards everything. Used by one-shot commands that render afterwards.
pub struct NullSink;

impl NotificationSink for NullSink {
    fn on_new_notification(&self, _notification: &Notification) {}

    fn on_count_changed(&self, _unread: u32) {}
}
