use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

// ─── Kind & Priority ──────────────────────────────────────────────

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum NotificationKind {
    AssignmentDue,
    WarrantyExpiring,
    MaintenanceDue,
    DeviceMissing,
    NewAssignment,
    #[default]
    SystemUpdate,
}

impl NotificationKind {
    pub const ALL: [Self; 6] = [
        Self::AssignmentDue,
        Self::WarrantyExpiring,
        Self::MaintenanceDue,
        Self::DeviceMissing,
        Self::NewAssignment,
        Self::SystemUpdate,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::AssignmentDue => "assignment_due",
            Self::WarrantyExpiring => "warranty_expiring",
            Self::MaintenanceDue => "maintenance_due",
            Self::DeviceMissing => "device_missing",
            Self::NewAssignment => "new_assignment",
            Self::SystemUpdate => "system_update",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown notification type: {s}"))
    }
}

/// Unknown types render like a system update.
impl From<String> for NotificationKind {
    fn from(raw: String) -> Self {
        raw.parse().unwrap_or_default()
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Priority {
    #[default]
    Normal,
    High,
}

impl From<String> for Priority {
    fn from(raw: String) -> Self {
        if raw.eq_ignore_ascii_case("high") {
            Self::High
        } else {
            Self::Normal
        }
    }
}

// ─── Notification ─────────────────────────────────────────────────

/// A single notification as delivered by the inventory server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Unique identifier. Integer ids on the wire are normalised to strings.
    #[serde(deserialize_with = "de_identifier")]
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: NotificationKind,
    pub title: String,
    #[serde(default)]
    pub message: String,
    #[serde(rename = "is_read", alias = "read", default)]
    pub is_read: bool,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(
        default,
        deserialize_with = "de_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<DateTime<Utc>>,
    /// Server-rendered relative label ("3 hours ago").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_ago: Option<String>,
}

impl Notification {
    pub fn new(id: impl Into<String>, kind: NotificationKind, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            title: title.into(),
            message: String::new(),
            is_read: false,
            priority: Priority::Normal,
            url: None,
            created_at: None,
            time_ago: None,
        }
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    #[must_use]
    pub fn read(mut self) -> Self {
        self.is_read = true;
        self
    }
}

/// Body of `GET /api/notifications/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchResponse {
    pub notifications: Vec<Notification>,
    /// Authoritative unread count. Older endpoints call it `count`.
    #[serde(alias = "count")]
    pub unread_count: u32,
}

// ─── Alert feeds ──────────────────────────────────────────────────

/// Secondary endpoints whose items are surfaced as notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlertFeed {
    Warranty,
    Assignment,
}

impl AlertFeed {
    pub const ALL: [Self; 2] = [Self::Warranty, Self::Assignment];

    pub fn path(self) -> &'static str {
        match self {
            Self::Warranty => "/api/warranty-alerts/",
            Self::Assignment => "/api/assignment-alerts/",
        }
    }

    /// Default polling period in milliseconds.
    pub fn default_period_ms(self) -> u64 {
        match self {
            Self::Warranty => 3_600_000,
            Self::Assignment => 1_800_000,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Warranty => "warranty",
            Self::Assignment => "assignment",
        }
    }
}

impl fmt::Display for AlertFeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WarrantyAlert {
    #[serde(deserialize_with = "de_identifier")]
    pub device_id: String,
    pub device_name: String,
    pub days_remaining: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OverdueAssignment {
    #[serde(deserialize_with = "de_identifier")]
    pub id: String,
    pub device_name: String,
    pub days_overdue: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WarrantyAlertsResponse {
    #[serde(default)]
    pub critical_alerts: Vec<WarrantyAlert>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssignmentAlertsResponse {
    #[serde(default)]
    pub overdue: Vec<OverdueAssignment>,
}

impl From<&WarrantyAlert> for Notification {
    fn from(alert: &WarrantyAlert) -> Self {
        Notification::new(
            format!("warranty_{}", alert.device_id),
            NotificationKind::WarrantyExpiring,
            "Warranty Expiring",
        )
        .with_message(format!(
            "{} warranty expires in {} days",
            alert.device_name, alert.days_remaining
        ))
        .with_priority(Priority::High)
    }
}

impl From<&OverdueAssignment> for Notification {
    fn from(assignment: &OverdueAssignment) -> Self {
        Notification::new(
            format!("assignment_{}", assignment.id),
            NotificationKind::AssignmentDue,
            "Assignment Overdue",
        )
        .with_message(format!(
            "{} return is overdue by {} days",
            assignment.device_name, assignment.days_overdue
        ))
        .with_priority(Priority::High)
        .with_url(format!("/inventory/assignments/{}/", assignment.id))
    }
}

// ─── Wire helpers ─────────────────────────────────────────────────

fn de_identifier<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(i64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(s) => s,
        RawId::Number(n) => n.to_string(),
    })
}

/// Accepts RFC 3339 timestamps and bare `YYYY-MM-DD` dates (midnight UTC).
/// Anything else is dropped rather than failing the whole payload.
fn de_timestamp<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error> {
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(parse_timestamp))
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}
