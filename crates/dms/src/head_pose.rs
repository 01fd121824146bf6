//! Head pose estimation and head-nod detection

use ring_buffer::RingBuffer;
use serde::{Deserialize, Serialize};

use crate::config::DmsConfig;
use crate::landmarks::{centroid, Landmarks};

/// Head pose (Euler angles, degrees)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HeadPose {
    /// Yaw (left-right rotation)
    pub yaw: f32,
    /// Pitch (up-down tilt), positive when looking down
    pub pitch: f32,
    /// Roll (side tilt)
    pub roll: f32,
}

/// Nose tip sits roughly this far from the eye line to the chin on a
/// level head.
const NEUTRAL_NOSE_RATIO: f32 = 0.4;

impl HeadPose {
    /// Coarse pose from landmark geometry alone (no camera model).
    ///
    /// Roll is the tilt of the jaw line, yaw the nose offset from the jaw
    /// midline, pitch the nose height between eye line and chin.
    pub fn from_landmarks(landmarks: &Landmarks) -> Option<HeadPose> {
        let jaw = landmarks.jaw_outline()?;
        let nose = landmarks.nose_tip()?;
        let left_eye = centroid(landmarks.left_eye()?)?;
        let right_eye = centroid(landmarks.right_eye()?)?;

        let (jaw_left, jaw_right, chin) = (jaw[0], jaw[16], jaw[8]);
        let face_width = jaw_left.distance(&jaw_right);
        if face_width <= f32::EPSILON {
            return None;
        }

        let roll = (jaw_right.y - jaw_left.y)
            .atan2(jaw_right.x - jaw_left.x)
            .to_degrees();

        let midline = jaw_left.midpoint(&jaw_right);
        let offset = ((nose.x - midline.x) / (face_width / 2.0)).clamp(-1.0, 1.0);
        let yaw = offset.asin().to_degrees();

        let eye_line_y = (left_eye.y + right_eye.y) / 2.0;
        let span = chin.y - eye_line_y;
        let pitch = if span.abs() <= f32::EPSILON {
            0.0
        } else {
            let ratio = (nose.y - eye_line_y) / span;
            ((ratio - NEUTRAL_NOSE_RATIO) * 90.0).clamp(-60.0, 60.0)
        };

        Some(HeadPose { yaw, pitch, roll })
    }
}

/// One head-position sample for nod tracking
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NodSample {
    /// Nose tip height in face widths (grows as the head drops)
    pub vertical: f32,
    /// Jaw-line tilt in degrees
    pub roll: f32,
}

impl NodSample {
    pub fn from_landmarks(landmarks: &Landmarks) -> Option<NodSample> {
        let jaw = landmarks.jaw_outline()?;
        let nose = landmarks.nose_tip()?;
        let (jaw_left, jaw_right) = (jaw[0], jaw[16]);
        let face_width = jaw_left.distance(&jaw_right);
        if face_width <= f32::EPSILON {
            return None;
        }
        let roll = (jaw_right.y - jaw_left.y)
            .atan2(jaw_right.x - jaw_left.x)
            .to_degrees();
        Some(NodSample {
            vertical: nose.y / face_width,
            roll,
        })
    }
}

/// Detects head nods from a sliding window of head positions.
///
/// A nod needs both a sharp frame-to-frame drop and a sustained shift of
/// the recent average away from the window average.
#[derive(Debug, Clone)]
pub struct NodTracker {
    buffer: RingBuffer<NodSample>,
    threshold: f32,
    min_samples: usize,
    recent_samples: usize,
    rearm_ms: u64,
    last_nod_ms: Option<u64>,
    nod_count: u32,
}

impl NodTracker {
    pub fn new(config: &DmsConfig) -> Self {
        Self {
            buffer: RingBuffer::new(config.head_buffer_capacity),
            threshold: config.head_nod_threshold,
            min_samples: config.nod_min_samples,
            recent_samples: config.nod_recent_samples,
            rearm_ms: config.nod_rearm_ms,
            last_nod_ms: None,
            nod_count: 0,
        }
    }

    /// Add a sample; returns true when it completes a new nod
    pub fn update(&mut self, sample: NodSample, now_ms: u64) -> bool {
        self.buffer.push(sample);

        if self.buffer.len() < self.min_samples {
            return false;
        }

        let max_drop = self
            .buffer
            .iter()
            .zip(self.buffer.iter().skip(1))
            .map(|(prev, next)| next.vertical - prev.vertical)
            .fold(0.0f32, f32::max);

        let window_avg = mean_vertical(self.buffer.iter());
        let recent_avg = mean_vertical(self.buffer.last_n(self.recent_samples));
        let deviation = (recent_avg - window_avg).abs();

        if max_drop <= self.threshold || deviation <= self.threshold {
            return false;
        }

        let armed = self
            .last_nod_ms
            .map_or(true, |last| now_ms.saturating_sub(last) > self.rearm_ms);
        if !armed {
            return false;
        }

        self.last_nod_ms = Some(now_ms);
        self.nod_count += 1;
        true
    }

    pub fn nod_count(&self) -> u32 {
        self.nod_count
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.last_nod_ms = None;
        self.nod_count = 0;
    }
}

fn mean_vertical<'a>(samples: impl Iterator<Item = &'a NodSample>) -> f32 {
    let (sum, n) = samples.fold((0.0f32, 0usize), |(s, n), p| (s + p.vertical, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f32
    }
}
