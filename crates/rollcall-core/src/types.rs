use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use thiserror::Error;

/// Identifier of an enrolled student.
///
/// The recognition service emits integer ids; other deployments send strings.
/// Both forms normalise to the same textual id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct StudentId(String);

impl StudentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StudentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for StudentId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Signed(i64),
            Unsigned(u64),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(s) => StudentId(s),
            Raw::Signed(n) => StudentId(n.to_string()),
            Raw::Unsigned(n) => StudentId(n.to_string()),
        })
    }
}

/// One recognition verdict for a submitted frame.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RecognitionResult {
    pub recognized: bool,
    #[serde(default)]
    pub student_id: Option<StudentId>,
    #[serde(default)]
    pub name: Option<String>,
    /// Match confidence in [0, 1].
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub error: Option<String>,
}

/// What a well-formed [`RecognitionResult`] means for the capture loop.
#[derive(Debug, Clone, PartialEq)]
pub enum Recognition<'a> {
    Recognized {
        student_id: &'a StudentId,
        name: &'a str,
        confidence: Option<f64>,
    },
    /// The service declined to recognise the frame. Not an error.
    Declined { reason: Option<&'a str> },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MalformedResponse {
    #[error("recognized response carries no student_id")]
    MissingStudentId,
}

impl RecognitionResult {
    pub fn recognized(student_id: impl Into<String>, name: impl Into<String>, confidence: f64) -> Self {
        Self {
            recognized: true,
            student_id: Some(StudentId::new(student_id)),
            name: Some(name.into()),
            confidence: Some(confidence),
            error: None,
        }
    }

    pub fn declined(error: Option<&str>) -> Self {
        Self {
            recognized: false,
            student_id: None,
            name: None,
            confidence: None,
            error: error.map(str::to_string),
        }
    }

    pub fn interpret(&self) -> Result<Recognition<'_>, MalformedResponse> {
        if !self.recognized {
            return Ok(Recognition::Declined {
                reason: self.error.as_deref().filter(|e| !e.is_empty()),
            });
        }
        let student_id = self
            .student_id
            .as_ref()
            .ok_or(MalformedResponse::MissingStudentId)?;
        let name = self.name.as_deref().unwrap_or(student_id.as_str());
        Ok(Recognition::Recognized {
            student_id,
            name,
            confidence: self.confidence,
        })
    }
}

/// Lifecycle phase reported by job services that expose one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    Running,
    Completed,
    Failed,
    Stopped,
}

/// Latest snapshot of the server-side training job.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TrainingJobStatus {
    pub running: bool,
    /// Percent complete, clamped to [0, 100].
    #[serde(deserialize_with = "de_progress")]
    pub progress: u8,
    #[serde(default, deserialize_with = "de_message")]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<JobPhase>,
}

impl TrainingJobStatus {
    pub fn new(running: bool, progress: u8, message: impl Into<String>) -> Self {
        Self {
            running,
            progress: progress.min(100),
            message: message.into(),
            state: None,
        }
    }
}

fn de_progress<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
    let raw = f64::deserialize(deserializer)?;
    if raw.is_nan() {
        return Ok(0);
    }
    Ok(raw.round().clamp(0.0, 100.0) as u8)
}

fn de_message<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Daily attendance counts, oldest date first.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AttendanceStats {
    pub dates: Vec<String>,
    pub counts: Vec<u64>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StatsError {
    #[error("stats arrays differ in length: {dates} dates, {counts} counts")]
    LengthMismatch { dates: usize, counts: usize },
}

impl AttendanceStats {
    pub fn validate(&self) -> Result<(), StatsError> {
        if self.dates.len() != self.counts.len() {
            return Err(StatsError::LengthMismatch {
                dates: self.dates.len(),
                counts: self.counts.len(),
            });
        }
        Ok(())
    }
}
