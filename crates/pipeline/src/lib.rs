//! Stage pipeline services and the automation evaluation engine.
//!
//! Everything here talks to persistence through the collaborator traits in
//! [`store`], so the same code runs against PostgreSQL ([`PgStore`]) and the
//! in-memory store used by tests ([`MemoryStore`]).

pub mod actions;
pub mod alert_scanner;
pub mod engine;
pub mod error;
pub mod relay;
pub mod reports;
pub mod stage_service;
pub mod store;

pub use actions::{ActionError, ActionExecutor};
pub use alert_scanner::{AlertScanReport, AlertScanner};
pub use engine::{AutomationEngine, EngineConfig, EvaluationReport, LoadedRule};
pub use error::{PipelineError, StoreError};
pub use relay::{OutboxRelay, RelayReport};
pub use reports::Reports;
pub use stage_service::{StageChange, StageService, TransitionRequest};
pub use store::memory::MemoryStore;
pub use store::postgres::PgStore;
pub use store::{AuditSink, NotificationSink, PipelineContext, PipelineStore};
