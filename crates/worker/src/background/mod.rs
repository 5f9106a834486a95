//! Background loops run by the worker.
//!
//! Each submodule provides a long-running async function intended to be
//! spawned via `tokio::spawn`. All loops accept a [`CancellationToken`]
//! for graceful shutdown and keep running after a failed iteration.
//!
//! [`CancellationToken`]: tokio_util::sync::CancellationToken

pub mod alert_scan;
pub mod bus_listener;
pub mod email_delivery;
pub mod outbox;
pub mod rule_sweep;
pub mod schedule;
