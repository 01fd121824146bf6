//! Detection Mode Coordinator
//!
//! Runs the drowsiness pipeline either in-process against camera frames
//! (local) or by polling the Sensor Data Service (backend), delivers one
//! `DetectionResult` per tick to a registered listener, escalates repeated
//! severe events to SOS, and fails over between modes on repeated errors.

mod client;
mod config;
mod coordinator;
mod error;
mod listener;
mod local;
mod remote;
mod scheduler;
mod strategy;

#[cfg(test)]
mod testing;

pub use client::{DrowsinessReading, HeadPoseReading, SensorClient, ServiceStatus};
pub use self::config::{CoordinatorConfig, DEFAULT_BACKEND_URL, ENV_PREFIX};
pub use coordinator::{CoordinatorBuilder, CoordinatorState, DetectionCoordinator, TickOutcome};
pub use error::{CoordinatorError, SensorError};
pub use listener::{Alarm, DetectionListener, LogAlarm};
pub use local::LocalStrategy;
pub use remote::RemoteStrategy;
pub use scheduler::{DelayScheduler, ManualScheduler, TickScheduler};
pub use strategy::{DetectionStrategy, Strategy, TickReport};
