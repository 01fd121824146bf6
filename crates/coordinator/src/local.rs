//! In-process detection: camera frame -> landmarks -> drowsiness session

use std::sync::Arc;

use camera_capture::FrameSource;
use dms::{DetectionMode, DmsConfig, DrowsinessSession, LandmarkModel, ModelLoader};
use tracing::{debug, info};

use crate::strategy::{DetectionStrategy, TickReport};
use crate::CoordinatorError;

pub struct LocalStrategy {
    model_path: String,
    loader: Arc<dyn ModelLoader>,
    model: Option<Box<dyn LandmarkModel>>,
    session: DrowsinessSession,
}

impl LocalStrategy {
    pub fn new(model_path: impl Into<String>, loader: Arc<dyn ModelLoader>, config: DmsConfig) -> Self {
        Self {
            model_path: model_path.into(),
            loader,
            model: None,
            session: DrowsinessSession::new(config),
        }
    }

    pub fn session(&self) -> &DrowsinessSession {
        &self.session
    }
}

impl DetectionStrategy for LocalStrategy {
    fn mode(&self) -> DetectionMode {
        DetectionMode::Local
    }

    async fn initialize(&mut self) -> Result<(), CoordinatorError> {
        let model = self.loader.load(&self.model_path)?;
        self.model = Some(model);
        info!(path = %self.model_path, "Local detector ready");
        Ok(())
    }

    async fn process_tick(
        &mut self,
        source: Option<&mut dyn FrameSource>,
        now_ms: u64,
    ) -> Result<TickReport, CoordinatorError> {
        let model = self
            .model
            .as_mut()
            .ok_or(CoordinatorError::StrategyNotReady(DetectionMode::Local))?;
        let source = source.ok_or(CoordinatorError::NoFrameSource)?;

        let frame = source.next_frame()?;
        let landmarks = model.detect(&frame)?;
        if landmarks.is_none() {
            debug!(sequence = frame.sequence, "No face in frame");
        }

        let analysis = self.session.process(landmarks.as_ref(), now_ms);
        Ok(TickReport {
            severe_events: analysis.severe_events(),
            result: analysis.result,
        })
    }

    fn reset(&mut self) {
        self.session.reset();
    }

    fn is_ready(&self) -> bool {
        self.model.is_some()
    }
}
