//! Domain model structs and DTOs.
//!
//! Each submodule contains a `FromRow` + `Serialize` entity struct matching
//! the database row and, where the table is written from outside, the DTO
//! used for the insert.

pub mod alert;
pub mod audit;
pub mod automation;
pub mod client;
pub mod email;
pub mod notification;
pub mod pipeline_event;
pub mod preferences;
pub mod project;
pub mod stage_history;
pub mod task;
