//! Per-kind presentation: icon, color class, and alert sound.

use crate::types::NotificationKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Info,
    Success,
    Warning,
    Danger,
}

impl Tone {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Danger => "danger",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindStyle {
    pub icon: &'static str,
    pub tone: Tone,
    /// Sound file name, relative to the sounds directory.
    pub sound: &'static str,
}

impl NotificationKind {
    pub fn style(self) -> KindStyle {
        let (icon, tone, sound) = match self {
            Self::AssignmentDue => ("clock", Tone::Warning, "notification.mp3"),
            Self::WarrantyExpiring => ("exclamation-triangle", Tone::Warning, "alert.mp3"),
            Self::MaintenanceDue => ("tools", Tone::Info, "notification.mp3"),
            Self::DeviceMissing => ("exclamation-circle", Tone::Danger, "error.mp3"),
            Self::NewAssignment => ("user-plus", Tone::Success, "success.mp3"),
            Self::SystemUpdate => ("info-circle", Tone::Info, "notification.mp3"),
        };
        KindStyle { icon, tone, sound }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_missing_is_danger_with_error_sound() {
        let style = NotificationKind::DeviceMissing.style();
        assert_eq!(style.tone, Tone::Danger);
        assert_eq!(style.sound, "error.mp3");
    }

    #[test]
    fn every_kind_has_a_sound() {
        for kind in NotificationKind::ALL {
            assert!(kind.style().sound.ends_with(".mp3"), "{kind}");
        }
    }
}
