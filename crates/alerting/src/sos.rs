//! SOS escalation trigger

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::AlertError;

/// SOS configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SosConfig {
    /// Severe events needed to activate SOS (default: 5)
    pub trigger_threshold: u32,
    /// How long SOS stays active without acknowledgement (ms)
    pub cooldown_ms: u64,
    /// Events forgiven when SOS expires on its own
    pub cooldown_decrement: u32,
}

impl Default for SosConfig {
    fn default() -> Self {
        Self {
            trigger_threshold: 5,
            cooldown_ms: 10_000,
            cooldown_decrement: 2,
        }
    }
}

impl SosConfig {
    pub fn validate(&self) -> Result<(), AlertError> {
        if self.trigger_threshold == 0 {
            return Err(AlertError::InvalidConfig(
                "trigger_threshold must be at least 1".into(),
            ));
        }
        if self.cooldown_ms == 0 {
            return Err(AlertError::InvalidConfig("cooldown_ms must be positive".into()));
        }
        Ok(())
    }
}

/// SOS state transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SosEvent {
    /// Threshold reached, SOS is now active
    Activated { event_count: u32 },
    /// Cooldown elapsed without acknowledgement
    Expired { event_count: u32 },
}

/// Counts severe events and raises SOS at the threshold.
///
/// Time is passed in by the caller as milliseconds on a monotonic clock.
#[derive(Debug, Clone)]
pub struct SosTrigger {
    config: SosConfig,
    event_count: u32,
    active_since: Option<u64>,
}

impl SosTrigger {
    pub fn new(config: SosConfig) -> Self {
        info!(
            threshold = config.trigger_threshold,
            cooldown_ms = config.cooldown_ms,
            "Creating SOS trigger"
        );
        Self {
            config,
            event_count: 0,
            active_since: None,
        }
    }

    /// Record one severe event.
    ///
    /// An elapsed cooldown is applied first, so an `Expired` may precede
    /// a fresh `Activated` in the returned transitions.
    pub fn on_severe_event(&mut self, now_ms: u64) -> Vec<SosEvent> {
        let mut transitions: Vec<SosEvent> = self.poll(now_ms).into_iter().collect();

        self.event_count = self.event_count.saturating_add(1);
        if self.active_since.is_none() && self.event_count >= self.config.trigger_threshold {
            self.active_since = Some(now_ms);
            warn!(events = self.event_count, "SOS activated");
            transitions.push(SosEvent::Activated {
                event_count: self.event_count,
            });
        }
        transitions
    }

    /// Expire an active SOS whose cooldown has elapsed
    pub fn poll(&mut self, now_ms: u64) -> Option<SosEvent> {
        let since = self.active_since?;
        if now_ms.saturating_sub(since) < self.config.cooldown_ms {
            return None;
        }

        self.active_since = None;
        self.event_count = self
            .event_count
            .saturating_sub(self.config.cooldown_decrement);
        info!(events = self.event_count, "SOS expired without acknowledgement");
        Some(SosEvent::Expired {
            event_count: self.event_count,
        })
    }

    /// Driver acknowledged the alarm
    pub fn acknowledge(&mut self) {
        if self.active_since.take().is_some() {
            info!("SOS acknowledged");
        }
        self.event_count = 0;
    }

    pub fn is_active(&self) -> bool {
        self.active_since.is_some()
    }

    pub fn event_count(&self) -> u32 {
        self.event_count
    }

    pub fn config(&self) -> &SosConfig {
        &self.config
    }

    pub fn reset(&mut self) {
        self.event_count = 0;
        self.active_since = None;
    }
}

impl Default for SosTrigger {
    fn default() -> Self {
        Self::new(SosConfig::default())
    }
}
