//! Pipeline change events and their delivery channels.
//!
//! - [`PipelineEvent`]: a committed project change, decoded from the
//!   `pipeline_events` outbox or built in-process.
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`delivery`]: outbound channels (SMTP email).

pub mod bus;
pub mod delivery;
pub mod event;

pub use bus::EventBus;
pub use delivery::email::{EmailConfig, EmailDelivery, EmailError};
pub use event::{EventDecodeError, PipelineEvent};
