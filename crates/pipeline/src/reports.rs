//! Read-only analytics over the current project set.

use std::collections::BTreeMap;

use stageflow_core::analytics::{
    client_analytics, most_frequent_stuck_stage, portfolio_summary, start_of_utc_day,
    AutomationDashboard, ClientAnalytics, PortfolioSummary, StuckStage,
};
use stageflow_core::error::CoreError;
use stageflow_core::project::ProjectState;
use stageflow_core::types::{DbId, Timestamp};

use crate::error::PipelineError;
use crate::store::PipelineContext;

pub struct Reports {
    ctx: PipelineContext,
}

impl Reports {
    pub fn new(ctx: PipelineContext) -> Self {
        Self { ctx }
    }

    pub async fn client_report(&self, client_id: DbId) -> Result<ClientAnalytics, PipelineError> {
        if self.ctx.store.client(client_id).await?.is_none() {
            return Err(CoreError::NotFound {
                entity: "Client",
                id: client_id,
            }
            .into());
        }
        let projects = self.ctx.store.client_project_states(client_id).await?;
        Ok(client_analytics(client_id, &projects))
    }

    /// Summary over every client that has at least one project.
    pub async fn portfolio(&self) -> Result<PortfolioSummary, PipelineError> {
        let projects = self.ctx.store.project_states(true).await?;
        let mut by_client: BTreeMap<DbId, Vec<ProjectState>> = BTreeMap::new();
        for p in projects {
            if let Some(client_id) = p.client_id {
                by_client.entry(client_id).or_default().push(p);
            }
        }
        let clients: Vec<ClientAnalytics> = by_client
            .iter()
            .map(|(id, projects)| client_analytics(*id, projects))
            .collect();
        Ok(portfolio_summary(&clients))
    }

    pub async fn stuck_stage(&self, now: Timestamp) -> Result<Option<StuckStage>, PipelineError> {
        let projects = self.ctx.store.project_states(true).await?;
        Ok(most_frequent_stuck_stage(&projects, now))
    }

    /// Automation overview counters. A project is stuck once it has spent
    /// `stuck_days` in its current stage without being completed.
    pub async fn dashboard(
        &self,
        now: Timestamp,
        stuck_days: i64,
    ) -> Result<AutomationDashboard, PipelineError> {
        let store = &self.ctx.store;
        let stuck_projects = store
            .project_states(false)
            .await?
            .iter()
            .filter(|p| p.days_in_stage(now) >= stuck_days)
            .count();

        Ok(AutomationDashboard {
            active_rules: store.count_active_rules().await?,
            open_alerts: store.count_open_alerts().await?,
            stuck_projects: i64::try_from(stuck_projects).unwrap_or(i64::MAX),
            executions_today: store.count_executions_since(start_of_utc_day(now)).await?,
        })
    }
}
