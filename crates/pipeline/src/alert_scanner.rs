//! Periodic smart detection over active projects.

use serde::Serialize;
use stageflow_core::alerts::{detect_client_overload, detect_project_alerts, AlertThresholds};
use stageflow_core::types::Timestamp;
use stageflow_db::models::alert::NewAlert;

use crate::error::PipelineError;
use crate::store::PipelineContext;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AlertScanReport {
    pub projects: usize,
    pub candidates: usize,
    /// Candidates without an unresolved alert of the same type.
    pub opened: usize,
}

pub struct AlertScanner {
    ctx: PipelineContext,
    thresholds: AlertThresholds,
}

impl AlertScanner {
    pub fn new(ctx: PipelineContext, thresholds: AlertThresholds) -> Self {
        Self { ctx, thresholds }
    }

    pub fn thresholds(&self) -> &AlertThresholds {
        &self.thresholds
    }

    /// Run every detector and open the alerts that are not already open.
    pub async fn scan(&self, now: Timestamp) -> Result<AlertScanReport, PipelineError> {
        let projects = self.ctx.store.project_states(false).await?;

        let mut candidates: Vec<_> = projects
            .iter()
            .flat_map(|p| detect_project_alerts(p, now, &self.thresholds))
            .collect();
        candidates.extend(detect_client_overload(&projects));

        let mut report = AlertScanReport {
            projects: projects.len(),
            candidates: candidates.len(),
            opened: 0,
        };
        for candidate in &candidates {
            if let Some(alert) = self.ctx.store.open_alert(&NewAlert::from(candidate)).await? {
                report.opened += 1;
                tracing::info!(
                    alert_id = alert.id,
                    project_id = alert.project_id,
                    alert_type = %alert.alert_type,
                    severity = %alert.severity,
                    "Alert opened"
                );
            }
        }

        tracing::info!(
            projects = report.projects,
            candidates = report.candidates,
            opened = report.opened,
            "Alert scan finished"
        );
        Ok(report)
    }
}
