//! Pure domain logic for the stage pipeline: the 18-stage catalog, transition
//! rules, the automation rule model and trigger matching, alert detection,
//! and analytics. No I/O lives here.

pub mod alerts;
pub mod analytics;
pub mod audit;
pub mod automation;
pub mod condition;
pub mod error;
pub mod evaluation;
pub mod notifications;
pub mod project;
pub mod schedule;
pub mod stages;
pub mod templates;
pub mod transition;
pub mod types;
