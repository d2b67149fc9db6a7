//! Capture session lifecycle states and the status text they show.

use crate::types::Recognition;
use serde::Serialize;

pub const STATUS_SCANNING: &str = "Scanning...";
pub const STATUS_STOPPED: &str = "Stopped";

/// `Idle → Starting → Scanning → Idle`, with `Starting → Idle` on acquisition failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum CaptureState {
    #[default]
    Idle,
    Starting,
    Scanning,
}

impl CaptureState {
    pub fn can_start(self) -> bool {
        self == CaptureState::Idle
    }

    pub fn can_stop(self) -> bool {
        matches!(self, CaptureState::Starting | CaptureState::Scanning)
    }

    /// Enablement of the (start, stop) controls while in this state.
    pub fn controls(self) -> (bool, bool) {
        match self {
            CaptureState::Idle => (true, false),
            CaptureState::Starting | CaptureState::Scanning => (false, true),
        }
    }
}

/// Opaque per-session token; responses carrying a stale token are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionToken(u64);

impl SessionToken {
    pub fn first() -> Self {
        SessionToken(1)
    }

    pub fn next(self) -> Self {
        SessionToken(self.0.wrapping_add(1))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

/// Confidence as a rounded percentage.
pub fn confidence_percent(confidence: f64) -> i64 {
    (confidence * 100.0).round() as i64
}

/// Status line for one recognition outcome.
pub fn status_line(recognition: &Recognition<'_>) -> String {
    match recognition {
        Recognition::Recognized {
            name,
            confidence: Some(c),
            ..
        } => format!("Recognized: {name} (conf {}%)", confidence_percent(*c)),
        Recognition::Recognized { name, .. } => format!("Recognized: {name}"),
        Recognition::Declined { reason: Some(r) } => format!("Not recognized: {r}"),
        Recognition::Declined { reason: None } => "Not recognized".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RecognitionResult;

    #[test]
    fn test_state_guards() {
        assert!(CaptureState::Idle.can_start());
        assert!(!CaptureState::Scanning.can_start());
        assert!(!CaptureState::Starting.can_start());
        assert!(CaptureState::Starting.can_stop());
        assert!(!CaptureState::Idle.can_stop());
        assert_eq!(CaptureState::Scanning.controls(), (false, true));
    }

    #[test]
    fn test_recognized_status_shows_percentage() {
        let r = RecognitionResult::recognized("S1", "Ana", 0.93);
        let line = status_line(&r.interpret().unwrap());
        assert_eq!(line, "Recognized: Ana (conf 93%)");
    }

    #[test]
    fn test_declined_status() {
        let r = RecognitionResult::declined(Some("unclear"));
        assert_eq!(status_line(&r.interpret().unwrap()), "Not recognized: unclear");
        let r = RecognitionResult::declined(None);
        assert_eq!(status_line(&r.interpret().unwrap()), "Not recognized");
    }

    #[test]
    fn test_token_advances() {
        let t = SessionToken::first();
        assert_ne!(t, t.next());
        assert_eq!(t.next().get(), 2);
    }
}
