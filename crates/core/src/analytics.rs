//! Client and portfolio metrics derived from project snapshots.
//!
//! All functions are pure; callers load the projects.

use std::collections::BTreeMap;

use chrono::NaiveTime;
use serde::Serialize;

use crate::project::ProjectState;
use crate::stages;
use crate::types::{Cents, DbId, StageNumber, Timestamp};

/// Days since the last transition after which a project counts towards the
/// "most frequent stuck stage" statistic. Strictly greater than.
pub const STUCK_STAGE_ANALYTICS_DAYS: i64 = 14;

// ---------------------------------------------------------------------------
// Client analytics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientAnalytics {
    pub client_id: DbId,
    pub total_projects: usize,
    pub completed_projects: usize,
    pub projects_in_payment: usize,
    pub total_budget_cents: Cents,
    pub total_paid_cents: Cents,
    /// Percentage of projects that reached full payment.
    pub payment_punctuality_score: f64,
    /// Mean days from start to completion, over completed projects that have
    /// both dates. `None` when no project qualifies.
    pub avg_project_duration_days: Option<f64>,
}

/// Compute analytics for one client from that client's projects.
pub fn client_analytics(client_id: DbId, projects: &[ProjectState]) -> ClientAnalytics {
    let total = projects.len();
    let fully_paid = projects.iter().filter(|p| p.is_fully_paid()).count();

    let durations: Vec<i64> = projects
        .iter()
        .filter(|p| p.is_completed())
        .filter_map(|p| Some((p.completion_date? - p.start_date?).num_days()))
        .collect();

    ClientAnalytics {
        client_id,
        total_projects: total,
        completed_projects: projects.iter().filter(|p| p.is_completed()).count(),
        projects_in_payment: projects
            .iter()
            .filter(|p| stages::is_payment_stage(p.stage_number))
            .count(),
        total_budget_cents: projects.iter().filter_map(|p| p.budget_cents).sum(),
        total_paid_cents: projects.iter().map(|p| p.paid_cents).sum(),
        payment_punctuality_score: percentage(fully_paid, total),
        avg_project_duration_days: mean(&durations),
    }
}

fn percentage(part: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    part as f64 / total as f64 * 100.0
}

fn mean(values: &[i64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<i64>() as f64 / values.len() as f64)
}

// ---------------------------------------------------------------------------
// Stuck stage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StuckStage {
    pub stage_number: StageNumber,
    pub stage_name: String,
    pub project_count: usize,
}

/// The stage holding the most projects whose last transition is older than
/// [`STUCK_STAGE_ANALYTICS_DAYS`]. Ties go to the earlier stage.
pub fn most_frequent_stuck_stage(projects: &[ProjectState], now: Timestamp) -> Option<StuckStage> {
    let mut counts: BTreeMap<StageNumber, (usize, &str)> = BTreeMap::new();
    for p in projects {
        if p.days_in_stage(now) > STUCK_STAGE_ANALYTICS_DAYS {
            let entry = counts
                .entry(p.stage_number)
                .or_insert((0, p.current_stage.as_str()));
            entry.0 += 1;
        }
    }

    let mut best: Option<(StageNumber, usize, &str)> = None;
    for (number, (count, name)) in counts {
        if best.map_or(true, |(_, c, _)| count > c) {
            best = Some((number, count, name));
        }
    }

    best.map(|(stage_number, project_count, name)| StuckStage {
        stage_number,
        stage_name: stages::by_number(stage_number)
            .map(|s| s.name.to_string())
            .unwrap_or_else(|| name.to_string()),
        project_count,
    })
}

// ---------------------------------------------------------------------------
// Portfolio summary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioSummary {
    pub client_count: usize,
    pub total_projects: usize,
    pub completed_projects: usize,
    pub total_budget_cents: Cents,
    pub total_paid_cents: Cents,
    /// Completed projects as a percentage of all projects.
    pub success_rate: f64,
    pub avg_punctuality: f64,
    /// Mean of the per-client durations, over clients that have one.
    pub avg_duration_days: Option<f64>,
}

pub fn portfolio_summary(clients: &[ClientAnalytics]) -> PortfolioSummary {
    let total_projects: usize = clients.iter().map(|c| c.total_projects).sum();
    let completed_projects: usize = clients.iter().map(|c| c.completed_projects).sum();

    let avg_punctuality = if clients.is_empty() {
        0.0
    } else {
        clients
            .iter()
            .map(|c| c.payment_punctuality_score)
            .sum::<f64>()
            / clients.len() as f64
    };

    let durations: Vec<f64> = clients
        .iter()
        .filter_map(|c| c.avg_project_duration_days)
        .collect();
    let avg_duration_days = if durations.is_empty() {
        None
    } else {
        Some(durations.iter().sum::<f64>() / durations.len() as f64)
    };

    PortfolioSummary {
        client_count: clients.len(),
        total_projects,
        completed_projects,
        total_budget_cents: clients.iter().map(|c| c.total_budget_cents).sum(),
        total_paid_cents: clients.iter().map(|c| c.total_paid_cents).sum(),
        success_rate: percentage(completed_projects, total_projects),
        avg_punctuality,
        avg_duration_days,
    }
}

// ---------------------------------------------------------------------------
// Automation dashboard
// ---------------------------------------------------------------------------

/// Counters shown on the automation overview.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct AutomationDashboard {
    pub active_rules: i64,
    pub open_alerts: i64,
    pub stuck_projects: i64,
    pub executions_today: i64,
}

/// Midnight UTC of the day containing `now`.
pub fn start_of_utc_day(now: Timestamp) -> Timestamp {
    now.date_naive().and_time(NaiveTime::MIN).and_utc()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::tests::sample;
    use chrono::{Duration, NaiveDate, TimeZone, Utc};

    fn now() -> Timestamp {
        Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap()
    }

    fn with_money(id: DbId, budget: Option<Cents>, paid: Cents) -> ProjectState {
        let mut p = sample(6);
        p.id = id;
        p.budget_cents = budget;
        p.paid_cents = paid;
        p
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn punctuality_is_share_of_fully_paid() {
        let projects = vec![
            with_money(1, Some(1000), 1000),
            with_money(2, Some(2000), 1000),
        ];
        let a = client_analytics(10, &projects);
        assert_eq!(a.payment_punctuality_score, 50.0);
        assert_eq!(a.total_budget_cents, 3000);
        assert_eq!(a.total_paid_cents, 2000);
    }

    #[test]
    fn project_without_budget_is_never_fully_paid() {
        let projects = vec![with_money(1, None, 500)];
        assert_eq!(client_analytics(10, &projects).payment_punctuality_score, 0.0);
    }

    #[test]
    fn empty_client_reports_zero_and_null() {
        let a = client_analytics(10, &[]);
        assert_eq!(a.total_projects, 0);
        assert_eq!(a.payment_punctuality_score, 0.0);
        assert_eq!(a.avg_project_duration_days, None);
    }

    #[test]
    fn duration_only_over_completed_with_both_dates() {
        let mut done = sample(18);
        done.start_date = Some(date(2026, 1, 1));
        done.completion_date = Some(date(2026, 1, 31));

        let mut done_no_start = sample(18);
        done_no_start.completion_date = Some(date(2026, 2, 1));

        let mut open = sample(9);
        open.start_date = Some(date(2025, 1, 1));
        open.completion_date = Some(date(2026, 1, 1));

        let a = client_analytics(10, &[done, done_no_start, open]);
        assert_eq!(a.completed_projects, 2);
        assert_eq!(a.avg_project_duration_days, Some(30.0));
    }

    #[test]
    fn payment_stage_count() {
        let a = client_analytics(10, &[sample(14), sample(16), sample(17)]);
        assert_eq!(a.projects_in_payment, 2);
    }

    #[test]
    fn stuck_stage_frequency() {
        let mut projects = Vec::new();
        for (stage, days) in [(9, 20), (9, 16), (4, 30), (4, 10), (12, 15)] {
            let mut p = sample(stage);
            p.stage_entered_at = now() - Duration::days(days);
            projects.push(p);
        }
        let stuck = most_frequent_stuck_stage(&projects, now()).unwrap();
        assert_eq!(stuck.stage_number, 9);
        assert_eq!(stuck.project_count, 2);
    }

    #[test]
    fn stuck_stage_threshold_is_exclusive() {
        let mut p = sample(5);
        p.stage_entered_at = now() - Duration::days(14);
        assert!(most_frequent_stuck_stage(&[p], now()).is_none());
    }

    #[test]
    fn portfolio_rolls_up_clients() {
        let a = client_analytics(1, &[with_money(1, Some(1000), 1000)]);
        let mut done = sample(18);
        done.start_date = Some(date(2026, 1, 1));
        done.completion_date = Some(date(2026, 1, 11));
        let b = client_analytics(2, &[done, with_money(3, Some(500), 0)]);

        let s = portfolio_summary(&[a, b]);
        assert_eq!(s.client_count, 2);
        assert_eq!(s.total_projects, 3);
        assert_eq!(s.completed_projects, 1);
        assert_eq!(s.avg_duration_days, Some(10.0));
        assert!((s.success_rate - 100.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn start_of_day_truncates() {
        assert_eq!(
            start_of_utc_day(now()),
            Utc.with_ymd_and_hms(2026, 3, 10, 0, 0, 0).unwrap()
        );
    }
}
