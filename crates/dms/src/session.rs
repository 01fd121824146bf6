//! Drowsiness session: temporal smoothing, event detection and level
//! aggregation for one monitoring session.
//!
//! Per face frame:
//! 1. EAR is pushed into a fixed window and averaged
//! 2. The average is classified open/closed against `blink_threshold`
//! 3. Eye-state transitions yield blink or prolonged-closure events
//! 4. Head position feeds the nod tracker
//! 5. The drowsiness level rises or decays against `ear_threshold`

use ring_buffer::RingBuffer;
use tracing::{debug, warn};

use crate::analysis::{DetectionMode, DetectionResult, DmsAlert};
use crate::config::DmsConfig;
use crate::ear::{compute_ear, FALLBACK_EAR};
use crate::head_pose::{HeadPose, NodSample, NodTracker};
use crate::landmarks::Landmarks;
use crate::state::{AlertStatus, DriverState, DrowsinessLevel, EyeState};

/// Discrete events detected on a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrowsinessEvent {
    /// Short closure followed by reopening
    Blink { closed_frames: u32 },
    /// Eyes closed longer than the drowsy-time threshold
    ProlongedClosure { duration_ms: u64 },
    /// Head dropped sharply
    HeadNod,
}

impl DrowsinessEvent {
    /// Severe events feed SOS escalation
    pub fn is_severe(&self) -> bool {
        matches!(
            self,
            DrowsinessEvent::ProlongedClosure { .. } | DrowsinessEvent::HeadNod
        )
    }
}

/// Outcome of processing one frame
#[derive(Debug, Clone)]
pub struct FrameAnalysis {
    pub result: DetectionResult,
    pub events: Vec<DrowsinessEvent>,
}

impl FrameAnalysis {
    /// Number of severe events on this frame
    pub fn severe_events(&self) -> u32 {
        self.events.iter().filter(|e| e.is_severe()).count() as u32
    }
}

/// State of one monitoring session
#[derive(Debug, Clone)]
pub struct DrowsinessSession {
    config: DmsConfig,
    ear_buffer: RingBuffer<f32>,
    nod_tracker: NodTracker,
    state: DriverState,
    level: DrowsinessLevel,
    smoothed_ear: f32,
}

impl DrowsinessSession {
    pub fn new(config: DmsConfig) -> Self {
        Self {
            ear_buffer: RingBuffer::new(config.ear_buffer_capacity),
            nod_tracker: NodTracker::new(&config),
            state: DriverState::default(),
            level: DrowsinessLevel::new(config.initial_level),
            smoothed_ear: FALLBACK_EAR,
            config,
        }
    }

    pub fn config(&self) -> &DmsConfig {
        &self.config
    }

    /// Process one frame's detection (`None` when no face was found)
    pub fn process(&mut self, landmarks: Option<&Landmarks>, now_ms: u64) -> FrameAnalysis {
        let Some(landmarks) = landmarks else {
            return self.process_face_absent();
        };

        self.state.face_absent_frames = 0;

        let ear = compute_ear(landmarks);
        self.ear_buffer.push(ear);
        let avg_ear = self.ear_buffer.mean().unwrap_or(ear);
        self.smoothed_ear = avg_ear;

        let mut events = Vec::new();
        if let Some(event) = self.track_eye_state(avg_ear, now_ms) {
            events.push(event);
        }

        if let Some(sample) = NodSample::from_landmarks(landmarks) {
            if self.nod_tracker.update(sample, now_ms) {
                debug!(nods = self.nod_tracker.nod_count(), "Head nod detected");
                self.level.raise(self.config.nod_event_jump);
                events.push(DrowsinessEvent::HeadNod);
            }
        }

        let low_ear = avg_ear < self.config.ear_threshold;
        if low_ear {
            self.level.raise(self.config.level_rise_step);
        } else {
            self.level.lower(self.config.level_decay_step);
        }

        let pose = HeadPose::from_landmarks(landmarks);
        let result = self.build_result(true, pose, low_ear, &events);
        FrameAnalysis { result, events }
    }

    fn process_face_absent(&mut self) -> FrameAnalysis {
        self.state.face_absent_frames = self.state.face_absent_frames.saturating_add(1);
        if self.state.face_absent_frames == self.config.face_absent_alert_frames {
            warn!(
                frames = self.state.face_absent_frames,
                "Face not visible, camera may be blocked"
            );
        }
        let result = self.build_result(false, None, false, &[]);
        FrameAnalysis {
            result,
            events: Vec::new(),
        }
    }

    /// Eye-state machine. Returns at most one event per frame.
    fn track_eye_state(&mut self, avg_ear: f32, now_ms: u64) -> Option<DrowsinessEvent> {
        let current = if avg_ear < self.config.blink_threshold {
            EyeState::Closed
        } else {
            EyeState::Open
        };
        let previous = self.state.previous_eye_state;
        self.state.previous_eye_state = current;

        match (previous, current) {
            (EyeState::Open, EyeState::Closed) => {
                self.state.closed_eye_frames = 1;
                self.state.eye_closure_start_ms = Some(now_ms);
                None
            }
            (EyeState::Closed, EyeState::Closed) => {
                self.state.closed_eye_frames = self.state.closed_eye_frames.saturating_add(1);
                let start = *self.state.eye_closure_start_ms.get_or_insert(now_ms);
                let duration_ms = now_ms.saturating_sub(start);
                if duration_ms > self.config.drowsy_time_threshold_ms {
                    // Re-arm so the same closure fires again only after another full period
                    self.state.eye_closure_start_ms = Some(now_ms);
                    self.state.closure_event_count += 1;
                    self.level.raise(self.config.closure_event_jump);
                    warn!(
                        duration_ms,
                        events = self.state.closure_event_count,
                        "Prolonged eye closure"
                    );
                    Some(DrowsinessEvent::ProlongedClosure { duration_ms })
                } else {
                    None
                }
            }
            (EyeState::Closed, EyeState::Open) => {
                let closed_frames = self.state.closed_eye_frames;
                self.state.closed_eye_frames = 0;
                self.state.eye_closure_start_ms = None;

                let in_window = (self.config.blink_min_frames..=self.config.blink_max_frames)
                    .contains(&closed_frames);
                let debounced = self.state.last_blink_ms.map_or(true, |last| {
                    now_ms.saturating_sub(last) > self.config.blink_debounce_ms
                });

                if in_window && debounced {
                    self.state.blink_count += 1;
                    self.state.last_blink_ms = Some(now_ms);
                    debug!(closed_frames, total = self.state.blink_count, "Blink detected");
                    Some(DrowsinessEvent::Blink { closed_frames })
                } else {
                    None
                }
            }
            (EyeState::Open, EyeState::Open) => None,
        }
    }

    fn build_result(
        &self,
        face_detected: bool,
        head_pose: Option<HeadPose>,
        low_ear: bool,
        events: &[DrowsinessEvent],
    ) -> DetectionResult {
        let alert_status = self.level.status();

        let mut alerts = Vec::new();
        if alert_status == AlertStatus::High {
            alerts.push(DmsAlert::Drowsiness);
        }
        if events.contains(&DrowsinessEvent::HeadNod) {
            alerts.push(DmsAlert::HeadNod);
        }
        if low_ear {
            alerts.push(DmsAlert::LowEar);
        }
        if self.state.face_absent_frames >= self.config.face_absent_alert_frames {
            alerts.push(DmsAlert::FaceNotVisible);
        }

        let mut result = DetectionResult::idle(DetectionMode::Local);
        result.is_drowsy = low_ear || alert_status == AlertStatus::High;
        result.confidence = self.level.as_confidence();
        result.ear_value = self.smoothed_ear;
        result.blink_count = self.state.blink_count;
        result.face_detected = face_detected;
        result.head_pose = head_pose;
        result.drowsiness_level = self.level.value();
        result.alert_status = alert_status;
        result.nod_count = self.nod_tracker.nod_count();
        result.alerts = alerts;
        result
    }

    /// Reset to a fresh session (buffers, counters and level)
    pub fn reset(&mut self) {
        self.ear_buffer.clear();
        self.nod_tracker.reset();
        self.state.reset();
        self.level = DrowsinessLevel::new(self.config.initial_level);
        self.smoothed_ear = FALLBACK_EAR;
    }

    pub fn blink_count(&self) -> u32 {
        self.state.blink_count
    }

    pub fn nod_count(&self) -> u32 {
        self.nod_tracker.nod_count()
    }

    pub fn closure_event_count(&self) -> u32 {
        self.state.closure_event_count
    }

    pub fn drowsiness_level(&self) -> u8 {
        self.level.value()
    }

    pub fn eye_state(&self) -> EyeState {
        self.state.previous_eye_state
    }

    pub fn closed_eye_frames(&self) -> u32 {
        self.state.closed_eye_frames
    }

    pub fn smoothed_ear(&self) -> f32 {
        self.smoothed_ear
    }

    /// Samples currently in the EAR window
    pub fn ear_samples(&self) -> usize {
        self.ear_buffer.len()
    }

    /// Samples currently in the head-position window
    pub fn head_samples(&self) -> usize {
        self.nod_tracker.buffered()
    }

    pub fn face_absent_frames(&self) -> u32 {
        self.state.face_absent_frames
    }
}
