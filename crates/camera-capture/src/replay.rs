//! Replay source for recorded sessions and headless hosts

use crate::{CameraError, FrameSource, VideoFrame};
use tracing::debug;

/// Replays a fixed list of frames in a loop.
///
/// Tracks how often the device was acquired and released so hosts can
/// verify the pipeline hands the camera back.
#[derive(Debug, Default)]
pub struct ReplaySource {
    frames: Vec<VideoFrame>,
    cursor: usize,
    open: bool,
    open_count: u32,
    release_count: u32,
}

impl ReplaySource {
    pub fn new(frames: Vec<VideoFrame>) -> Self {
        Self {
            frames,
            ..Default::default()
        }
    }

    /// Replay `count` blank frames of the given size
    pub fn blank(width: u32, height: u32, count: u32) -> Self {
        Self::new((0..count).map(|i| VideoFrame::blank(width, height, i)).collect())
    }

    /// Number of times `open` succeeded
    pub fn open_count(&self) -> u32 {
        self.open_count
    }

    /// Number of times an open device was released
    pub fn release_count(&self) -> u32 {
        self.release_count
    }
}

impl FrameSource for ReplaySource {
    fn open(&mut self) -> Result<(), CameraError> {
        if self.frames.is_empty() {
            return Err(CameraError::Open("replay source has no frames".into()));
        }
        if !self.open {
            self.open = true;
            self.open_count += 1;
            debug!("Replay source opened ({} frames)", self.frames.len());
        }
        Ok(())
    }

    fn next_frame(&mut self) -> Result<VideoFrame, CameraError> {
        if !self.open {
            return Err(CameraError::NotOpened);
        }
        let frame = self.frames[self.cursor].clone();
        self.cursor = (self.cursor + 1) % self.frames.len();
        Ok(frame)
    }

    fn release(&mut self) {
        if self.open {
            self.open = false;
            self.release_count += 1;
            debug!("Replay source released");
        }
    }

    fn is_open(&self) -> bool {
        self.open
    }
}
