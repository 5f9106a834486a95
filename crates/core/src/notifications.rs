//! Notification types and per-user delivery preferences.

use chrono::{Datelike, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

use crate::alerts::HIGH_VALUE_THRESHOLD_CENTS;
use crate::error::CoreError;
use crate::types::{Cents, Timestamp};

// ---------------------------------------------------------------------------
// NotificationType
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    StageChange,
    ProjectStuck,
    PaymentReceived,
    ProjectCreated,
    ApprovalReceived,
    DeadlineApproaching,
    AutomationTriggered,
    SystemAlert,
}

impl NotificationType {
    pub const ALL: [NotificationType; 8] = [
        NotificationType::StageChange,
        NotificationType::ProjectStuck,
        NotificationType::PaymentReceived,
        NotificationType::ProjectCreated,
        NotificationType::ApprovalReceived,
        NotificationType::DeadlineApproaching,
        NotificationType::AutomationTriggered,
        NotificationType::SystemAlert,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StageChange => "stage_change",
            Self::ProjectStuck => "project_stuck",
            Self::PaymentReceived => "payment_received",
            Self::ProjectCreated => "project_created",
            Self::ApprovalReceived => "approval_received",
            Self::DeadlineApproaching => "deadline_approaching",
            Self::AutomationTriggered => "automation_triggered",
            Self::SystemAlert => "system_alert",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, CoreError> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| CoreError::Validation(format!("Invalid notification type: '{s}'")))
    }
}

impl std::fmt::Display for NotificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Preferences
// ---------------------------------------------------------------------------

/// Per-type toggles. Everything is on except automation notices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationToggles {
    pub stage_change: bool,
    pub project_stuck: bool,
    pub payment_received: bool,
    pub project_created: bool,
    pub approval_received: bool,
    pub deadline_approaching: bool,
    pub automation_triggered: bool,
    pub system_alert: bool,
}

impl Default for NotificationToggles {
    fn default() -> Self {
        Self {
            stage_change: true,
            project_stuck: true,
            payment_received: true,
            project_created: true,
            approval_received: true,
            deadline_approaching: true,
            automation_triggered: false,
            system_alert: true,
        }
    }
}

impl NotificationToggles {
    pub fn is_enabled(&self, kind: NotificationType) -> bool {
        match kind {
            NotificationType::StageChange => self.stage_change,
            NotificationType::ProjectStuck => self.project_stuck,
            NotificationType::PaymentReceived => self.payment_received,
            NotificationType::ProjectCreated => self.project_created,
            NotificationType::ApprovalReceived => self.approval_received,
            NotificationType::DeadlineApproaching => self.deadline_approaching,
            NotificationType::AutomationTriggered => self.automation_triggered,
            NotificationType::SystemAlert => self.system_alert,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertPreferences {
    pub high_value_threshold_cents: Cents,
    pub weekend_alerts: bool,
    /// `HH:MM`, UTC.
    pub quiet_hours_start: Option<String>,
    /// `HH:MM`, UTC. A range whose end is before its start wraps midnight.
    pub quiet_hours_end: Option<String>,
}

impl Default for AlertPreferences {
    fn default() -> Self {
        Self {
            high_value_threshold_cents: HIGH_VALUE_THRESHOLD_CENTS,
            weekend_alerts: false,
            quiet_hours_start: None,
            quiet_hours_end: None,
        }
    }
}

/// Complete preference record for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserPreferences {
    pub notifications_enabled: bool,
    pub email_notifications: bool,
    pub automation_enabled: bool,
    pub stuck_project_threshold_days: i64,
    pub toggles: NotificationToggles,
    pub alerts: AlertPreferences,
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            notifications_enabled: true,
            email_notifications: true,
            automation_enabled: true,
            stuck_project_threshold_days: 7,
            toggles: NotificationToggles::default(),
            alerts: AlertPreferences::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Delivery decision
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Suppression {
    Disabled,
    TypeDisabled,
    QuietHours,
    Weekend,
}

impl Suppression {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disabled => "notifications_disabled",
            Self::TypeDisabled => "type_disabled",
            Self::QuietHours => "quiet_hours",
            Self::Weekend => "weekend",
        }
    }
}

/// Parse an `HH:MM` clock time.
pub fn parse_clock(raw: &str) -> Result<NaiveTime, CoreError> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M")
        .map_err(|_| CoreError::Validation(format!("Invalid time '{raw}', expected HH:MM")))
}

/// Whether `at` falls inside the quiet window. Unparseable or missing bounds
/// mean no quiet hours.
pub fn is_quiet_hours(prefs: &AlertPreferences, at: Timestamp) -> bool {
    let (Some(start), Some(end)) = (&prefs.quiet_hours_start, &prefs.quiet_hours_end) else {
        return false;
    };
    let (Ok(start), Ok(end)) = (parse_clock(start), parse_clock(end)) else {
        return false;
    };
    let now = at.time();
    if start <= end {
        now >= start && now < end
    } else {
        now >= start || now < end
    }
}

fn is_weekend(at: Timestamp) -> bool {
    matches!(at.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Decide whether a notification of `kind` may be delivered at `at`.
pub fn check_delivery(
    prefs: &UserPreferences,
    kind: NotificationType,
    at: Timestamp,
) -> Result<(), Suppression> {
    if !prefs.notifications_enabled {
        return Err(Suppression::Disabled);
    }
    if !prefs.toggles.is_enabled(kind) {
        return Err(Suppression::TypeDisabled);
    }
    if is_quiet_hours(&prefs.alerts, at) {
        return Err(Suppression::QuietHours);
    }
    if !prefs.alerts.weekend_alerts && is_weekend(at) {
        return Err(Suppression::Weekend);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
