//! Camera Capture Library for Driver Monitoring
//!
//! Frame-source abstraction over the cabin camera. The capture device is
//! owned by the host; the detection pipeline acquires and returns it
//! through this trait:
//! - `FrameSource::open` acquires the device
//! - `FrameSource::next_frame` pulls one decoded RGB frame
//! - `FrameSource::release` returns the device (idempotent)

pub mod frame;
pub mod replay;

pub use frame::VideoFrame;
pub use replay::ReplaySource;

use thiserror::Error;

/// Camera error types
#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Failed to open camera: {0}")]
    Open(String),

    #[error("Camera not opened")]
    NotOpened,
}

/// A capture device that yields video frames.
///
/// Implementations must tolerate `release` being called more than once
/// and on a source that was never opened.
pub trait FrameSource: Send {
    /// Acquire the underlying device
    fn open(&mut self) -> Result<(), CameraError>;

    /// Grab the next frame
    fn next_frame(&mut self) -> Result<VideoFrame, CameraError>;

    /// Release the underlying device
    fn release(&mut self);

    /// Whether the device is currently held
    fn is_open(&self) -> bool;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn open(&mut self) -> Result<(), CameraError> {
        (**self).open()
    }

    fn next_frame(&mut self) -> Result<VideoFrame, CameraError> {
        (**self).next_frame()
    }

    fn release(&mut self) {
        (**self).release()
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }
}
