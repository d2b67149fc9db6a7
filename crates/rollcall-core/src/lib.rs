//! rollcall-core — Attendance capture and training-monitor domain logic.
//!
//! Wire types for the attendance server, the deduplicating roster, the
//! capture and training-job state machines, and the chart model. Pure
//! logic only; I/O lives in `rollcall-hw`, `rollcall-client` and `rollcall`.

pub mod capture;
pub mod chart;
pub mod date;
pub mod job;
pub mod roster;
pub mod types;

pub use capture::{CaptureState, SessionToken};
pub use chart::AttendanceChart;
pub use date::{selected_date, DateError};
pub use job::{JobError, JobPoller, JobState, Observation};
pub use roster::{Roster, RosterEntry};
pub use types::{
    AttendanceStats, JobPhase, Recognition, RecognitionResult, StatsError, StudentId,
    TrainingJobStatus,
};
