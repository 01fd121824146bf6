//! Alerting System
//!
//! Escalates repeated severe drowsiness events into an SOS state with a
//! timed cooldown and manual acknowledgement.

mod sos;

pub use sos::{SosConfig, SosEvent, SosTrigger};

use thiserror::Error;

/// Alerting error types
#[derive(Error, Debug, PartialEq, Eq)]
pub enum AlertError {
    #[error("Invalid SOS configuration: {0}")]
    InvalidConfig(String),
}
