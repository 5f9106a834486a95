//! Automation rule model: trigger and action kinds with typed configs.
//!
//! Rules are stored with a `trigger_type`/`action_type` string and a JSON
//! config each. [`parse_trigger`] and [`parse_action`] turn those into the
//! typed [`Trigger`] and [`Action`] sum types. A rule whose config does not
//! match its declared kind is rejected at creation and skipped at
//! evaluation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::alerts::Severity;
use crate::condition::Condition;
use crate::error::CoreError;
use crate::schedule::Schedule;
use crate::transition::validate_stage_number;
use crate::types::{DbId, StageNumber};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Maximum length of a rule name.
pub const MAX_RULE_NAME_LENGTH: usize = 200;

/// Upper bound for any `*_days` config value.
pub const MAX_CONFIG_DAYS: i64 = 3650;

// ---------------------------------------------------------------------------
// TriggerType
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    StageEnter,
    StageDuration,
    TimeScheduled,
    ProjectCreated,
    PaymentReceived,
    ConditionMet,
}

impl TriggerType {
    pub const ALL: [TriggerType; 6] = [
        TriggerType::StageEnter,
        TriggerType::StageDuration,
        TriggerType::TimeScheduled,
        TriggerType::ProjectCreated,
        TriggerType::PaymentReceived,
        TriggerType::ConditionMet,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StageEnter => "stage_enter",
            Self::StageDuration => "stage_duration",
            Self::TimeScheduled => "time_scheduled",
            Self::ProjectCreated => "project_created",
            Self::PaymentReceived => "payment_received",
            Self::ConditionMet => "condition_met",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, CoreError> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| CoreError::Validation(format!("Invalid trigger type: '{s}'")))
    }

    /// Evaluated against committed change events. Level triggers are
    /// checked here too, so they can fire before the next sweep.
    pub fn on_change(&self) -> bool {
        !self.is_scheduled()
    }

    /// Level triggers, re-checked against every project by the sweep.
    pub fn is_swept(&self) -> bool {
        matches!(self, Self::StageDuration | Self::ConditionMet)
    }

    /// Project-less triggers evaluated by the schedule ticker.
    pub fn is_scheduled(&self) -> bool {
        matches!(self, Self::TimeScheduled)
    }
}

impl std::fmt::Display for TriggerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ActionType
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    SendNotification,
    SendEmail,
    CreateTask,
    AssignTeam,
    MoveStage,
    FlagProject,
    GenerateInvoice,
    CreateReminder,
}

impl ActionType {
    pub const ALL: [ActionType; 8] = [
        ActionType::SendNotification,
        ActionType::SendEmail,
        ActionType::CreateTask,
        ActionType::AssignTeam,
        ActionType::MoveStage,
        ActionType::FlagProject,
        ActionType::GenerateInvoice,
        ActionType::CreateReminder,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SendNotification => "send_notification",
            Self::SendEmail => "send_email",
            Self::CreateTask => "create_task",
            Self::AssignTeam => "assign_team",
            Self::MoveStage => "move_stage",
            Self::FlagProject => "flag_project",
            Self::GenerateInvoice => "generate_invoice",
            Self::CreateReminder => "create_reminder",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, CoreError> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| CoreError::Validation(format!("Invalid action type: '{s}'")))
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ExecutionStatus
// ---------------------------------------------------------------------------

/// Outcome recorded in the execution log for one fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Success,
    Failed,
    /// Dry-run fire: matched, nothing executed.
    Skipped,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, CoreError> {
        match s {
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            "skipped" => Ok(Self::Skipped),
            _ => Err(CoreError::Validation(format!(
                "Invalid execution status: '{s}'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Trigger configs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageEnterConfig {
    pub stage_number: StageNumber,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDurationConfig {
    pub stage_number: StageNumber,
    pub duration_days: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeScheduledConfig {
    pub schedule: String,
}

/// Typed trigger, one variant per [`TriggerType`].
#[derive(Debug, Clone, PartialEq)]
pub enum Trigger {
    StageEnter(StageEnterConfig),
    StageDuration(StageDurationConfig),
    TimeScheduled(Schedule),
    ProjectCreated,
    PaymentReceived,
    ConditionMet(Condition),
}

impl Trigger {
    pub fn trigger_type(&self) -> TriggerType {
        match self {
            Self::StageEnter(_) => TriggerType::StageEnter,
            Self::StageDuration(_) => TriggerType::StageDuration,
            Self::TimeScheduled(_) => TriggerType::TimeScheduled,
            Self::ProjectCreated => TriggerType::ProjectCreated,
            Self::PaymentReceived => TriggerType::PaymentReceived,
            Self::ConditionMet(_) => TriggerType::ConditionMet,
        }
    }

    /// JSON config as stored in `automation_rules.trigger_config`.
    pub fn to_config(&self) -> Value {
        match self {
            Self::StageEnter(c) => serde_json::json!({ "stage_number": c.stage_number }),
            Self::StageDuration(c) => serde_json::json!({
                "stage_number": c.stage_number,
                "duration_days": c.duration_days,
            }),
            Self::TimeScheduled(s) => serde_json::json!({ "schedule": s.as_str() }),
            Self::ProjectCreated | Self::PaymentReceived => serde_json::json!({}),
            Self::ConditionMet(c) => serde_json::json!({
                "field": c.field,
                "operator": c.operator,
                "value": c.value,
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Action configs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendNotificationConfig {
    pub title: String,
    pub message: String,
    /// Explicit recipient; defaults to the project's assignee, then creator.
    #[serde(default)]
    pub user_id: Option<DbId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendEmailConfig {
    pub template_id: DbId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTaskConfig {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub due_in_days: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignTeamConfig {
    pub user_id: DbId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveStageConfig {
    pub target_stage: StageNumber,
    /// Explicit override needed for an automated backward move.
    #[serde(default)]
    pub allow_backward: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlagType {
    Urgent,
    Attention,
    Review,
}

impl FlagType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Urgent => "urgent",
            Self::Attention => "attention",
            Self::Review => "review",
        }
    }

    /// Severity of the `custom` alert a flag opens.
    pub fn severity(&self) -> Severity {
        match self {
            Self::Urgent => Severity::Critical,
            Self::Attention => Severity::Medium,
            Self::Review => Severity::Low,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagProjectConfig {
    pub flag_type: FlagType,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GenerateInvoiceConfig {
    #[serde(default)]
    pub due_in_days: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateReminderConfig {
    pub message: String,
    pub remind_in_days: i64,
}

/// Typed action, one variant per [`ActionType`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    SendNotification(SendNotificationConfig),
    SendEmail(SendEmailConfig),
    CreateTask(CreateTaskConfig),
    AssignTeam(AssignTeamConfig),
    MoveStage(MoveStageConfig),
    FlagProject(FlagProjectConfig),
    GenerateInvoice(GenerateInvoiceConfig),
    CreateReminder(CreateReminderConfig),
}

impl Action {
    pub fn action_type(&self) -> ActionType {
        match self {
            Self::SendNotification(_) => ActionType::SendNotification,
            Self::SendEmail(_) => ActionType::SendEmail,
            Self::CreateTask(_) => ActionType::CreateTask,
            Self::AssignTeam(_) => ActionType::AssignTeam,
            Self::MoveStage(_) => ActionType::MoveStage,
            Self::FlagProject(_) => ActionType::FlagProject,
            Self::GenerateInvoice(_) => ActionType::GenerateInvoice,
            Self::CreateReminder(_) => ActionType::CreateReminder,
        }
    }

    /// JSON config as stored in `automation_rules.action_config`.
    pub fn to_config(&self) -> Value {
        let serialized = match self {
            Self::SendNotification(c) => serde_json::to_value(c),
            Self::SendEmail(c) => serde_json::to_value(c),
            Self::CreateTask(c) => serde_json::to_value(c),
            Self::AssignTeam(c) => serde_json::to_value(c),
            Self::MoveStage(c) => serde_json::to_value(c),
            Self::FlagProject(c) => serde_json::to_value(c),
            Self::GenerateInvoice(c) => serde_json::to_value(c),
            Self::CreateReminder(c) => serde_json::to_value(c),
        };
        // Plain structs of strings and integers always serialize.
        serialized.unwrap_or(Value::Null)
    }

    /// Whether the action needs a project to act on.
    pub fn needs_project(&self) -> bool {
        !matches!(self, Self::SendNotification(c) if c.user_id.is_some())
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

fn decode<T: serde::de::DeserializeOwned>(kind: &str, config: &Value) -> Result<T, CoreError> {
    let config = if config.is_null() {
        Value::Object(Default::default())
    } else {
        config.clone()
    };
    serde_json::from_value(config)
        .map_err(|e| CoreError::Validation(format!("Invalid {kind} config: {e}")))
}

fn validate_days(field: &str, days: i64, min: i64) -> Result<(), CoreError> {
    if days < min || days > MAX_CONFIG_DAYS {
        return Err(CoreError::Validation(format!(
            "{field} must be between {min} and {MAX_CONFIG_DAYS} (got {days})"
        )));
    }
    Ok(())
}

fn validate_non_empty(field: &str, value: &str) -> Result<(), CoreError> {
    if value.trim().is_empty() {
        return Err(CoreError::Validation(format!("{field} must not be empty")));
    }
    Ok(())
}

/// Parse and validate a trigger config against its declared type.
pub fn parse_trigger(trigger_type: &str, config: &Value) -> Result<Trigger, CoreError> {
    let kind = TriggerType::from_str(trigger_type)?;
    let name = kind.as_str();
    Ok(match kind {
        TriggerType::StageEnter => {
            let c: StageEnterConfig = decode(name, config)?;
            validate_stage_number(c.stage_number)?;
            Trigger::StageEnter(c)
        }
        TriggerType::StageDuration => {
            let c: StageDurationConfig = decode(name, config)?;
            validate_stage_number(c.stage_number)?;
            validate_days("duration_days", c.duration_days, 1)?;
            Trigger::StageDuration(c)
        }
        TriggerType::TimeScheduled => {
            let c: TimeScheduledConfig = decode(name, config)?;
            Trigger::TimeScheduled(Schedule::parse(&c.schedule)?)
        }
        TriggerType::ProjectCreated => Trigger::ProjectCreated,
        TriggerType::PaymentReceived => Trigger::PaymentReceived,
        TriggerType::ConditionMet => {
            let c: Condition = decode(name, config)?;
            c.validate()?;
            Trigger::ConditionMet(c)
        }
    })
}

/// Parse and validate an action config against its declared type.
pub fn parse_action(action_type: &str, config: &Value) -> Result<Action, CoreError> {
    let kind = ActionType::from_str(action_type)?;
    let name = kind.as_str();
    Ok(match kind {
        ActionType::SendNotification => {
            let c: SendNotificationConfig = decode(name, config)?;
            validate_non_empty("title", &c.title)?;
            Action::SendNotification(c)
        }
        ActionType::SendEmail => Action::SendEmail(decode(name, config)?),
        ActionType::CreateTask => {
            let c: CreateTaskConfig = decode(name, config)?;
            validate_non_empty("title", &c.title)?;
            if let Some(days) = c.due_in_days {
                validate_days("due_in_days", days, 0)?;
            }
            Action::CreateTask(c)
        }
        ActionType::AssignTeam => Action::AssignTeam(decode(name, config)?),
        ActionType::MoveStage => {
            let c: MoveStageConfig = decode(name, config)?;
            validate_stage_number(c.target_stage)?;
            Action::MoveStage(c)
        }
        ActionType::FlagProject => Action::FlagProject(decode(name, config)?),
        ActionType::GenerateInvoice => {
            let c: GenerateInvoiceConfig = decode(name, config)?;
            if let Some(days) = c.due_in_days {
                validate_days("due_in_days", days, 0)?;
            }
            Action::GenerateInvoice(c)
        }
        ActionType::CreateReminder => {
            let c: CreateReminderConfig = decode(name, config)?;
            validate_non_empty("message", &c.message)?;
            validate_days("remind_in_days", c.remind_in_days, 0)?;
            Action::CreateReminder(c)
        }
    })
}

// ---------------------------------------------------------------------------
// Rule definition
// ---------------------------------------------------------------------------

/// Validate a rule name: non-empty and at most [`MAX_RULE_NAME_LENGTH`]
/// characters.
pub fn validate_rule_name(name: &str) -> Result<(), CoreError> {
    validate_non_empty("Rule name", name)?;
    let len = name.chars().count();
    if len > MAX_RULE_NAME_LENGTH {
        return Err(CoreError::Validation(format!(
            "Rule name exceeds maximum length of {MAX_RULE_NAME_LENGTH} characters (got {len})"
        )));
    }
    Ok(())
}

/// A fully validated rule, ready to be persisted or evaluated.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleDefinition {
    pub name: String,
    pub description: Option<String>,
    pub trigger: Trigger,
    pub action: Action,
    pub is_active: bool,
    pub dry_run: bool,
}

impl RuleDefinition {
    /// Validate raw rule fields, failing on the first problem.
    pub fn parse(
        name: &str,
        description: Option<String>,
        trigger_type: &str,
        trigger_config: &Value,
        action_type: &str,
        action_config: &Value,
    ) -> Result<Self, CoreError> {
        validate_rule_name(name)?;
        Ok(Self {
            name: name.trim().to_string(),
            description,
            trigger: parse_trigger(trigger_type, trigger_config)?,
            action: parse_action(action_type, action_config)?,
            is_active: true,
            dry_run: false,
        })
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_active(mut self, is_active: bool) -> Self {
        self.is_active = is_active;
        self
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
