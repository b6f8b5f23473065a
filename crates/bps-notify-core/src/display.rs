//! Text rendering for the unread badge, page title, dropdown list and toasts.

use chrono::{DateTime, Utc};

use crate::types::{Notification, Priority};

/// The dropdown never lists more than this many items.
pub const MAX_DROPDOWN_ITEMS: usize = 10;

const TITLE_BASE: &str = "BPS IT Inventory";
const TITLE_IDLE: &str = "BPS IT Inventory Management System";

pub fn page_title(unread: u32) -> String {
    if unread > 0 {
        format!("({unread}) {TITLE_BASE}")
    } else {
        TITLE_IDLE.to_string()
    }
}

/// Badge text; `None` hides the badge.
pub fn badge(unread: u32) -> Option<String> {
    (unread > 0).then(|| unread.to_string())
}

/// Relative-time helper: seconds -> human string.
pub fn relative_time(seconds: i64) -> String {
    let s = seconds.unsigned_abs();
    if s < 60 {
        "just now".to_string()
    } else if s < 3600 {
        format!("{}m", s / 60)
    } else if s < 86400 {
        format!("{}h", s / 3600)
    } else if s < 86400 * 30 {
        format!("{}d", s / 86400)
    } else {
        format!("{}w", s / (86400 * 7))
    }
}

/// Server label if present, else derived from `created_at`.
pub fn time_label(notification: &Notification, now: DateTime<Utc>) -> Option<String> {
    if let Some(label) = &notification.time_ago {
        return Some(label.clone());
    }
    notification
        .created_at
        .map(|ts| relative_time((now - ts).num_seconds()))
}

/// Render the dropdown: up to [`MAX_DROPDOWN_ITEMS`] lines, unread first marker.
pub fn format_dropdown(notifications: &[Notification], now: DateTime<Utc>) -> String {
    if notifications.is_empty() {
        return "No notifications".to_string();
    }

    notifications
        .iter()
        .take(MAX_DROPDOWN_ITEMS)
        .map(|n| {
            let marker = if n.is_read { ' ' } else { '*' };
            let mut line = format!("{marker} [{}] {}", n.kind.style().icon, n.title);
            if !n.message.is_empty() {
                line.push_str(": ");
                line.push_str(&n.message);
            }
            if let Some(label) = time_label(n, now) {
                line.push_str(&format!(" ({label})"));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// One-line toast for a newly delivered notification.
pub fn format_toast(notification: &Notification) -> String {
    let style = notification.kind.style();
    let urgent = if notification.priority == Priority::High {
        "!"
    } else {
        ""
    };
    let mut out = format!(
        "[{}{urgent}] {}",
        style.tone.as_str(),
        notification.title
    );
    if !notification.message.is_empty() {
        out.push_str(" - ");
        out.push_str(&notification.message);
    }
    if let Some(url) = &notification.url {
        out.push_str(&format!(" <{url}>"));
    }
    out
}
