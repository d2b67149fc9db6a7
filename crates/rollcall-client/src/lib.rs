//! rollcall-client — Contracts with the attendance server.
//!
//! The controllers in `rollcall` are generic over the service traits below;
//! [`HttpClient`] implements all of them against the server's HTTP API.

pub mod http;

pub use http::HttpClient;

use chrono::NaiveDate;
use rollcall_core::{AttendanceStats, RecognitionResult, TrainingJobStatus};
use std::future::Future;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid server url: {0}")]
    BaseUrl(String),
}

/// Image → identity inference.
pub trait RecognitionService: Send + Sync {
    /// Submit one JPEG frame for the given attendance date.
    fn recognize(
        &self,
        image: Vec<u8>,
        date: NaiveDate,
    ) -> impl Future<Output = Result<RecognitionResult, ClientError>> + Send;
}

/// Server-side model training job.
pub trait TrainingService: Send + Sync {
    /// Trigger a training run; returns the HTTP status of the trigger response.
    fn start_training(&self) -> impl Future<Output = Result<u16, ClientError>> + Send;

    fn training_status(&self) -> impl Future<Output = Result<TrainingJobStatus, ClientError>> + Send;
}

/// Aggregate attendance counts per day.
pub trait StatsService: Send + Sync {
    fn attendance_stats(&self) -> impl Future<Output = Result<AttendanceStats, ClientError>> + Send;
}
