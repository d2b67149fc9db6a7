//! Training job state machine.
//!
//! `NotStarted → Requesting → Polling → {Completed | Failed | Stopped | TimedOut}`.
//! Transitions are driven by injected snapshots so the machine can be exercised
//! without timers or a network.

use crate::types::{JobPhase, TrainingJobStatus};
use serde::Serialize;
use thiserror::Error;

/// Substrings (matched case-insensitively) that mark a stopped job as failed.
const FAILURE_PATTERNS: [&str; 3] = ["error", "no training", "not found"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum JobState {
    NotStarted,
    Requesting,
    Polling,
    Completed,
    Failed { message: String },
    /// Job ended without reaching 100%. `failed` is set when the message reads as an error.
    Stopped { message: String, failed: bool },
    /// Poll budget exhausted without a terminal snapshot.
    TimedOut { polls: u32 },
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed
                | JobState::Failed { .. }
                | JobState::Stopped { .. }
                | JobState::TimedOut { .. }
        )
    }

    /// Whether a new job may be requested from this state.
    pub fn can_begin(&self) -> bool {
        matches!(self, JobState::NotStarted) || self.is_terminal()
    }

    /// User-facing notice raised on entering this state, if any.
    pub fn notice(&self) -> Option<String> {
        match self {
            JobState::Completed => Some("Training completed successfully!".to_string()),
            JobState::Failed { message } => Some(format!("Training failed: {message}")),
            JobState::Stopped {
                message,
                failed: true,
            } => Some(format!("Training stopped: {message}")),
            JobState::TimedOut { polls } => Some(format!(
                "Training status still unresolved after {polls} polls; stopped watching"
            )),
            _ => None,
        }
    }
}

pub fn message_indicates_failure(message: &str) -> bool {
    let lower = message.to_lowercase();
    FAILURE_PATTERNS.iter().any(|p| lower.contains(p))
}

fn message_has_error(message: &str) -> bool {
    message.to_lowercase().contains("error")
}

/// Pure transition from `Polling` given the latest snapshot.
///
/// Terminal states are absorbing; any other non-polling state is returned unchanged.
pub fn transition(state: &JobState, snapshot: &TrainingJobStatus) -> JobState {
    if *state != JobState::Polling {
        return state.clone();
    }

    if let Some(phase) = snapshot.state {
        return match phase {
            JobPhase::Running => JobState::Polling,
            JobPhase::Completed => JobState::Completed,
            JobPhase::Failed => JobState::Failed {
                message: snapshot.message.clone(),
            },
            JobPhase::Stopped => JobState::Stopped {
                message: snapshot.message.clone(),
                failed: message_indicates_failure(&snapshot.message),
            },
        };
    }

    if snapshot.progress >= 100 {
        JobState::Completed
    } else if !snapshot.running && snapshot.progress > 0 {
        JobState::Stopped {
            message: snapshot.message.clone(),
            failed: message_indicates_failure(&snapshot.message),
        }
    } else if !snapshot.running && message_has_error(&snapshot.message) {
        JobState::Failed {
            message: snapshot.message.clone(),
        }
    } else {
        JobState::Polling
    }
}

/// Whether a trigger response status code means the job was started.
/// The server answers 202 both for a fresh start and for a job already running.
pub fn start_accepted(status: u16) -> bool {
    (200..300).contains(&status)
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum JobError {
    #[error("a training job is already being watched")]
    AlreadyActive,
    #[error("training service rejected the start request (status {0})")]
    StartRejected(u16),
    #[error("training start request failed: {0}")]
    StartUnreachable(String),
    #[error("no start request outstanding")]
    NotRequesting,
}

/// Effect of one poll on the machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// Snapshot arrived after a terminal state; ignored.
    Discarded,
    /// Still polling.
    Progress(u8),
    /// Entered a terminal state.
    Finished(JobState),
}

/// Stateful wrapper around [`transition`] that also enforces the poll budget.
#[derive(Debug)]
pub struct JobPoller {
    state: JobState,
    polls: u32,
    max_polls: Option<u32>,
}

impl JobPoller {
    /// `max_polls = None` polls until a terminal snapshot arrives.
    pub fn new(max_polls: Option<u32>) -> Self {
        Self {
            state: JobState::NotStarted,
            polls: 0,
            max_polls: max_polls.filter(|&n| n > 0),
        }
    }

    pub fn state(&self) -> &JobState {
        &self.state
    }

    pub fn polls(&self) -> u32 {
        self.polls
    }

    /// Enter `Requesting`. Refused while a job is in flight.
    pub fn begin(&mut self) -> Result<(), JobError> {
        if !self.state.can_begin() {
            return Err(JobError::AlreadyActive);
        }
        self.state = JobState::Requesting;
        self.polls = 0;
        Ok(())
    }

    /// Apply the trigger response: `Polling` if accepted, otherwise back to `NotStarted`.
    pub fn start_response(&mut self, status: u16) -> Result<(), JobError> {
        if self.state != JobState::Requesting {
            return Err(JobError::NotRequesting);
        }
        if start_accepted(status) {
            self.state = JobState::Polling;
            Ok(())
        } else {
            self.state = JobState::NotStarted;
            Err(JobError::StartRejected(status))
        }
    }

    /// The trigger request never got a response.
    pub fn start_unreachable(&mut self, reason: impl Into<String>) -> JobError {
        if self.state == JobState::Requesting {
            self.state = JobState::NotStarted;
        }
        JobError::StartUnreachable(reason.into())
    }

    /// Account for one poll tick. Returns `TimedOut` once the budget is spent.
    pub fn tick(&mut self) -> Option<JobState> {
        if self.state != JobState::Polling {
            return None;
        }
        self.polls += 1;
        match self.max_polls {
            Some(max) if self.polls > max => {
                tracing::warn!(max, "training poll budget exhausted");
                self.state = JobState::TimedOut { polls: max };
                Some(self.state.clone())
            }
            _ => None,
        }
    }

    pub fn observe(&mut self, snapshot: &TrainingJobStatus) -> Observation {
        if self.state != JobState::Polling {
            return Observation::Discarded;
        }
        self.state = transition(&self.state, snapshot);
        if self.state.is_terminal() {
            tracing::info!(state = ?self.state, polls = self.polls, "training job reached terminal state");
            Observation::Finished(self.state.clone())
        } else {
            Observation::Progress(snapshot.progress)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn polling() -> JobPoller {
        let mut p = JobPoller::new(None);
        p.begin().unwrap();
        p.start_response(202).unwrap();
        p
    }

    #[test]
    fn test_completes_at_hundred() {
        let mut p = polling();
        assert_eq!(
            p.observe(&TrainingJobStatus::new(true, 10, "")),
            Observation::Progress(10)
        );
        assert_eq!(
            p.observe(&TrainingJobStatus::new(true, 55, "")),
            Observation::Progress(55)
        );
        assert_eq!(
            p.observe(&TrainingJobStatus::new(true, 100, "")),
            Observation::Finished(JobState::Completed)
        );
        assert_eq!(p.state(), &JobState::Completed);
    }

    #[test]
    fn test_error_at_zero_fails_and_stays_failed() {
        let mut p = polling();
        let obs = p.observe(&TrainingJobStatus::new(false, 0, "training error: no data"));
        assert_eq!(
            obs,
            Observation::Finished(JobState::Failed {
                message: "training error: no data".into()
            })
        );
        assert_eq!(
            p.observe(&TrainingJobStatus::new(true, 30, "")),
            Observation::Discarded
        );
        assert!(matches!(p.state(), JobState::Failed { .. }));
    }

    #[test]
    fn test_stopped_benign_and_failed() {
        let s = transition(
            &JobState::Polling,
            &TrainingJobStatus::new(false, 40, "cancelled by operator"),
        );
        assert_eq!(
            s,
            JobState::Stopped {
                message: "cancelled by operator".into(),
                failed: false
            }
        );
        let s = transition(
            &JobState::Polling,
            &TrainingJobStatus::new(false, 40, "No training images found"),
        );
        assert!(matches!(s, JobState::Stopped { failed: true, .. }));
        assert!(s.notice().unwrap().starts_with("Training stopped:"));
    }

    #[test]
    fn test_idle_snapshot_keeps_polling() {
        let s = transition(&JobState::Polling, &TrainingJobStatus::new(false, 0, "No training yet."));
        assert_eq!(s, JobState::Polling);
    }

    #[test]
    fn test_terminal_states_absorb() {
        let done = TrainingJobStatus::new(true, 100, "");
        for state in [
            JobState::Completed,
            JobState::Failed { message: "x".into() },
            JobState::TimedOut { polls: 3 },
            JobState::NotStarted,
        ] {
            assert_eq!(transition(&state, &done), state);
        }
    }

    #[test]
    fn test_structured_phase_wins() {
        let mut snap = TrainingJobStatus::new(true, 100, "all good");
        snap.state = Some(JobPhase::Failed);
        assert_eq!(
            transition(&JobState::Polling, &snap),
            JobState::Failed {
                message: "all good".into()
            }
        );
    }

    #[test]
    fn test_start_rejection_returns_to_not_started() {
        let mut p = JobPoller::new(None);
        p.begin().unwrap();
        assert_eq!(p.start_response(500), Err(JobError::StartRejected(500)));
        assert_eq!(p.state(), &JobState::NotStarted);
        assert!(p.begin().is_ok());
    }

    #[test]
    fn test_begin_refused_while_polling() {
        let mut p = polling();
        assert_eq!(p.begin(), Err(JobError::AlreadyActive));
    }

    #[test]
    fn test_poll_budget() {
        let mut p = JobPoller::new(Some(2));
        p.begin().unwrap();
        p.start_response(200).unwrap();
        assert_eq!(p.tick(), None);
        assert_eq!(p.tick(), None);
        assert_eq!(p.tick(), Some(JobState::TimedOut { polls: 2 }));
        assert_eq!(
            p.observe(&TrainingJobStatus::new(true, 100, "")),
            Observation::Discarded
        );
    }

    #[test]
    fn test_start_codes() {
        assert!(start_accepted(200));
        assert!(start_accepted(202));
        assert!(!start_accepted(409));
        assert!(!start_accepted(500));
    }
}
