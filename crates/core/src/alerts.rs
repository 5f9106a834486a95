//! Project alert types and the detection rules behind the alert scanner.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::project::{format_cents, ProjectState};
use crate::stages;
use crate::types::{Cents, DbId, Timestamp};

// ---------------------------------------------------------------------------
// AlertType
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    StuckInStage,
    PaymentDelay,
    DeadlineApproaching,
    HighValue,
    MultipleProjectsSameClient,
    Custom,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StuckInStage => "stuck_in_stage",
            Self::PaymentDelay => "payment_delay",
            Self::DeadlineApproaching => "deadline_approaching",
            Self::HighValue => "high_value",
            Self::MultipleProjectsSameClient => "multiple_projects_same_client",
            Self::Custom => "custom",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, CoreError> {
        match s {
            "stuck_in_stage" => Ok(Self::StuckInStage),
            "payment_delay" => Ok(Self::PaymentDelay),
            "deadline_approaching" => Ok(Self::DeadlineApproaching),
            "high_value" => Ok(Self::HighValue),
            "multiple_projects_same_client" => Ok(Self::MultipleProjectsSameClient),
            "custom" => Ok(Self::Custom),
            _ => Err(CoreError::Validation(format!("Invalid alert type: '{s}'"))),
        }
    }
}

impl std::fmt::Display for AlertType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Severity
// ---------------------------------------------------------------------------

/// Ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, CoreError> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            _ => Err(CoreError::Validation(format!(
                "Invalid severity: '{s}'. Must be one of: low, medium, high, critical"
            ))),
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Thresholds
// ---------------------------------------------------------------------------

/// Default number of days without a transition before a project is stuck.
pub const DEFAULT_STUCK_THRESHOLD_DAYS: i64 = 7;

/// Days waiting in a payment stage before a payment delay is raised.
pub const PAYMENT_DELAY_DAYS: i64 = 14;

/// Budget at or above which a project is high value (10,000.00).
pub const HIGH_VALUE_THRESHOLD_CENTS: Cents = 1_000_000;

/// Active projects per client at which every one of them is flagged.
pub const CLIENT_ACTIVE_PROJECTS_THRESHOLD: usize = 3;

/// Days before the deadline at which the deadline alert opens.
pub const DEADLINE_WINDOW_DAYS: i64 = 3;

/// Tunables for one scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertThresholds {
    pub stuck_days: i64,
    pub high_value_cents: Cents,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            stuck_days: DEFAULT_STUCK_THRESHOLD_DAYS,
            high_value_cents: HIGH_VALUE_THRESHOLD_CENTS,
        }
    }
}

// ---------------------------------------------------------------------------
// Detection
// ---------------------------------------------------------------------------

/// An alert the scanner wants open. The scanner drops candidates that
/// already have an unresolved alert of the same type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlertCandidate {
    pub project_id: DbId,
    pub alert_type: AlertType,
    pub severity: Severity,
    pub message: String,
}

/// Severity of a stuck project, `None` below the threshold.
pub fn stuck_severity(days: i64, threshold_days: i64) -> Option<Severity> {
    if days < threshold_days {
        return None;
    }
    Some(match days {
        d if d >= 30 => Severity::Critical,
        d if d >= 14 => Severity::High,
        d if d >= 10 => Severity::Medium,
        _ => Severity::Low,
    })
}

/// Per-project alert checks. Completed projects never raise alerts.
pub fn detect_project_alerts(
    project: &ProjectState,
    now: Timestamp,
    thresholds: &AlertThresholds,
) -> Vec<AlertCandidate> {
    let mut out = Vec::new();
    if project.is_completed() {
        return out;
    }
    let days = project.days_in_stage(now);

    if let Some(severity) = stuck_severity(days, thresholds.stuck_days) {
        out.push(AlertCandidate {
            project_id: project.id,
            alert_type: AlertType::StuckInStage,
            severity,
            message: format!(
                "Project \"{}\" has been in stage \"{}\" for {days} days",
                project.title, project.current_stage
            ),
        });
    }

    if stages::is_payment_stage(project.stage_number) && days >= PAYMENT_DELAY_DAYS {
        out.push(AlertCandidate {
            project_id: project.id,
            alert_type: AlertType::PaymentDelay,
            severity: Severity::High,
            message: format!(
                "Payment for \"{}\" has been pending for {days} days",
                project.title
            ),
        });
    }

    if let Some(budget) = project.budget_cents {
        if budget >= thresholds.high_value_cents {
            out.push(AlertCandidate {
                project_id: project.id,
                alert_type: AlertType::HighValue,
                severity: Severity::Medium,
                message: format!(
                    "High value project \"{}\" ({})",
                    project.title,
                    format_cents(budget)
                ),
            });
        }
    }

    if let Some(candidate) = deadline_alert(project, now.date_naive()) {
        out.push(candidate);
    }

    out
}

fn deadline_alert(project: &ProjectState, today: NaiveDate) -> Option<AlertCandidate> {
    let deadline = project.deadline?;
    let days_left = (deadline - today).num_days();
    if days_left > DEADLINE_WINDOW_DAYS {
        return None;
    }
    let (severity, message) = if days_left < 0 {
        (
            Severity::Critical,
            format!("Project \"{}\" is {} days overdue", project.title, -days_left),
        )
    } else {
        (
            Severity::High,
            format!("Project \"{}\" is due in {days_left} days", project.title),
        )
    };
    Some(AlertCandidate {
        project_id: project.id,
        alert_type: AlertType::DeadlineApproaching,
        severity,
        message,
    })
}

/// Flag every active project of a client that has too many active projects.
pub fn detect_client_overload(projects: &[ProjectState]) -> Vec<AlertCandidate> {
    let mut by_client: HashMap<DbId, Vec<&ProjectState>> = HashMap::new();
    for p in projects.iter().filter(|p| !p.is_completed()) {
        if let Some(client_id) = p.client_id {
            by_client.entry(client_id).or_default().push(p);
        }
    }

    let mut out: Vec<AlertCandidate> = by_client
        .into_values()
        .filter(|active| active.len() >= CLIENT_ACTIVE_PROJECTS_THRESHOLD)
        .flat_map(|active| {
            let count = active.len();
            active.into_iter().map(move |p| AlertCandidate {
                project_id: p.id,
                alert_type: AlertType::MultipleProjectsSameClient,
                severity: Severity::Low,
                message: format!(
                    "Client {} has {count} active projects",
                    p.client_name.as_deref().unwrap_or("(unnamed)")
                ),
            })
        })
        .collect();
    out.sort_by_key(|c| c.project_id);
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
