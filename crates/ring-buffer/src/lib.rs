//! Fixed-Capacity Ring Buffer
//!
//! Sliding sample windows for per-frame signals (EAR values, head
//! positions). The oldest sample is evicted when a new one arrives at
//! capacity, so a window never grows past the size it was created with.

mod buffer;

pub use buffer::{RingBuffer, DEFAULT_CAPACITY};
