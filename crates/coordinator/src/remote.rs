//! Remote detection: poll the Sensor Data Service

use camera_capture::FrameSource;
use dms::{AlertStatus, DetectionMode};
use tracing::info;

use crate::client::SensorClient;
use crate::strategy::{DetectionStrategy, TickReport};
use crate::CoordinatorError;

pub struct RemoteStrategy {
    client: SensorClient,
    ready: bool,
    last_status: AlertStatus,
}

impl RemoteStrategy {
    pub fn new(client: SensorClient) -> Self {
        Self {
            client,
            ready: false,
            last_status: AlertStatus::Normal,
        }
    }

    pub fn client(&self) -> &SensorClient {
        &self.client
    }
}

impl DetectionStrategy for RemoteStrategy {
    fn mode(&self) -> DetectionMode {
        DetectionMode::Backend
    }

    async fn initialize(&mut self) -> Result<(), CoordinatorError> {
        self.ready = false;
        let status = self.client.health_check().await?;
        self.ready = true;
        info!(
            url = %self.client.base_url(),
            components = status.components.len(),
            "Backend detector ready"
        );
        Ok(())
    }

    async fn process_tick(
        &mut self,
        _source: Option<&mut dyn FrameSource>,
        _now_ms: u64,
    ) -> Result<TickReport, CoordinatorError> {
        if !self.ready {
            return Err(CoordinatorError::StrategyNotReady(DetectionMode::Backend));
        }

        let reading = self.client.fetch_drowsiness().await?;

        // Entering high alert counts as one severe event
        let severe_events = u32::from(
            reading.alert_status == AlertStatus::High && self.last_status != AlertStatus::High,
        );
        self.last_status = reading.alert_status;

        Ok(TickReport {
            result: reading.into_result(),
            severe_events,
        })
    }

    fn reset(&mut self) {
        self.last_status = AlertStatus::Normal;
    }

    fn is_ready(&self) -> bool {
        self.ready
    }
}
