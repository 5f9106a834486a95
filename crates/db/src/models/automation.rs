//! Automation rule, claim, and execution models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use stageflow_core::automation::RuleDefinition;
use stageflow_core::types::{DbId, Timestamp};

/// A row from the `automation_rules` table.
///
/// Configs stay raw JSON here; the engine parses them into typed triggers
/// and actions and skips rows that do not parse.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AutomationRule {
    pub id: DbId,
    pub name: String,
    pub description: Option<String>,
    pub trigger_type: String,
    pub trigger_config: serde_json::Value,
    pub action_type: String,
    pub action_config: serde_json::Value,
    pub is_active: bool,
    pub dry_run: bool,
    pub created_by: Option<DbId>,
    pub last_triggered_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for inserting a validated rule.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateAutomationRule {
    pub name: String,
    pub description: Option<String>,
    pub trigger_type: String,
    pub trigger_config: serde_json::Value,
    pub action_type: String,
    pub action_config: serde_json::Value,
    pub is_active: bool,
    pub dry_run: bool,
    pub created_by: Option<DbId>,
}

impl CreateAutomationRule {
    pub fn from_definition(def: &RuleDefinition, created_by: Option<DbId>) -> Self {
        Self {
            name: def.name.clone(),
            description: def.description.clone(),
            trigger_type: def.trigger.trigger_type().as_str().to_string(),
            trigger_config: def.trigger.to_config(),
            action_type: def.action.action_type().as_str().to_string(),
            action_config: def.action.to_config(),
            is_active: def.is_active,
            dry_run: def.dry_run,
            created_by,
        }
    }
}

/// A row from the `automation_executions` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AutomationExecution {
    pub id: DbId,
    pub rule_id: DbId,
    pub project_id: Option<DbId>,
    pub dedup_key: String,
    pub status: String,
    pub dry_run: bool,
    pub details: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub executed_at: Timestamp,
}

/// DTO for appending to the execution log.
#[derive(Debug, Clone)]
pub struct NewExecution {
    pub rule_id: DbId,
    pub project_id: Option<DbId>,
    pub dedup_key: String,
    pub status: String,
    pub dry_run: bool,
    pub details: Option<serde_json::Value>,
    pub error_message: Option<String>,
}
