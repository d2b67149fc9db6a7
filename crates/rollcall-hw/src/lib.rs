//! rollcall-hw — Capture source and frame sampling.
//!
//! Provides V4L2-based camera access and the per-tick sampler that turns
//! the current frame into a JPEG payload.

pub mod camera;
pub mod frame;
pub mod sampler;

pub use camera::{Camera, CameraError, DeviceInfo, FrameSource, PixelFormat};
pub use frame::{Frame, PixelLayout};
pub use sampler::{FrameSampler, SampleError};
