//! Background worker for the stage pipeline: evaluates automation rules,
//! drains the outbox, scans for alerts, and delivers queued email.

pub mod background;
pub mod config;
