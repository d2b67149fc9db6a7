//! rollcall — Attendance client controllers.
//!
//! Ties the camera, the attendance server and a [`Surface`] together:
//! - [`CaptureController`] runs the capture/recognize loop for one session at a time
//! - [`TrainingMonitor`] triggers a training run and follows its progress
//! - [`ChartRefresher`] keeps the attendance chart current

pub mod capture;
pub mod chart;
pub mod config;
pub mod source;
pub mod surface;
pub mod training;

pub use capture::{CaptureController, CaptureError};
pub use chart::{ChartRefresher, RefreshError};
pub use config::{Config, ConfigError, FileConfig};
pub use source::{CameraSource, DeviceAcquirer, FrameProvider, V4lAcquirer};
pub use surface::{Surface, UiEvent};
pub use training::{TrainingError, TrainingMonitor};
