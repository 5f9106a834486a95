//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` as the first argument.

pub mod audit_log_repo;
pub mod automation_execution_repo;
pub mod automation_rule_repo;
pub mod automation_trigger_repo;
pub mod client_repo;
pub mod email_queue_repo;
pub mod email_template_repo;
pub mod notification_repo;
pub mod pipeline_event_repo;
pub mod project_alert_repo;
pub mod project_repo;
pub mod project_task_repo;
pub mod stage_history_repo;
pub mod user_preference_repo;

pub use audit_log_repo::AuditLogRepo;
pub use automation_execution_repo::AutomationExecutionRepo;
pub use automation_rule_repo::AutomationRuleRepo;
pub use automation_trigger_repo::AutomationTriggerRepo;
pub use client_repo::ClientRepo;
pub use email_queue_repo::EmailQueueRepo;
pub use email_template_repo::EmailTemplateRepo;
pub use notification_repo::NotificationRepo;
pub use pipeline_event_repo::PipelineEventRepo;
pub use project_alert_repo::ProjectAlertRepo;
pub use project_repo::ProjectRepo;
pub use project_task_repo::ProjectTaskRepo;
pub use stage_history_repo::StageHistoryRepo;
pub use user_preference_repo::UserPreferenceRepo;
