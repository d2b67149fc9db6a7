//! Training job trigger and progress monitor.

use crate::surface::{Surface, UiEvent};
use rollcall_client::TrainingService;
use rollcall_core::{JobPoller, JobState, Observation};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{self, Instant, MissedTickBehavior};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TrainingError {
    #[error("a training run is already being watched")]
    AlreadyRunning,
}

pub struct TrainingMonitor<T, S> {
    service: Arc<T>,
    surface: Arc<S>,
    poll_interval: Duration,
    max_polls: Option<u32>,
    active: AtomicBool,
}

/// Clears the trigger lock even if the monitoring future is dropped.
struct TriggerLock<'a>(&'a AtomicBool);

impl Drop for TriggerLock<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl<T, S> TrainingMonitor<T, S>
where
    T: TrainingService,
    S: Surface,
{
    pub fn new(service: Arc<T>, surface: Arc<S>, poll_interval: Duration, max_polls: Option<u32>) -> Self {
        Self {
            service,
            surface,
            poll_interval,
            max_polls,
            active: AtomicBool::new(false),
        }
    }

    /// Start a training run and follow it to a terminal state.
    ///
    /// Returns the final state; `NotStarted` means the service refused the start.
    pub async fn trigger(&self) -> Result<JobState, TrainingError> {
        if self.active.swap(true, Ordering::SeqCst) {
            return Err(TrainingError::AlreadyRunning);
        }
        let _lock = TriggerLock(&self.active);

        self.surface.emit(UiEvent::TrainControl { enabled: false });
        let state = self.drive().await;
        self.surface.emit(UiEvent::TrainControl { enabled: true });
        match state.notice() {
            Some(notice) => self.surface.emit(UiEvent::Alert(notice)),
            None if state.is_terminal() => {
                tracing::info!(state = ?state, "training ended without error");
            }
            None => {}
        }
        Ok(state)
    }

    async fn drive(&self) -> JobState {
        let mut poller = JobPoller::new(self.max_polls);
        if let Err(e) = poller.begin() {
            tracing::warn!(error = %e, "training: poller refused to begin");
            return poller.state().clone();
        }

        let started = match self.service.start_training().await {
            Ok(status) => poller.start_response(status),
            Err(e) => Err(poller.start_unreachable(e.to_string())),
        };
        if let Err(e) = started {
            tracing::warn!(error = %e, "training: start failed");
            self.surface
                .emit(UiEvent::Alert("Failed to start training".to_string()));
            return poller.state().clone();
        }

        tracing::info!(period_ms = self.poll_interval.as_millis() as u64, "training: polling");
        self.surface
            .emit(UiEvent::TrainMessage("Training started...".to_string()));

        let mut interval = time::interval_at(Instant::now() + self.poll_interval, self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            if let Some(timed_out) = poller.tick() {
                return timed_out;
            }

            let snapshot = match self.service.training_status().await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    tracing::warn!(poll = poller.polls(), error = %e, "training: status poll failed");
                    continue;
                }
            };

            self.surface.emit(UiEvent::TrainProgress {
                percent: snapshot.progress,
            });
            self.surface
                .emit(UiEvent::TrainMessage(snapshot.message.clone()));

            match poller.observe(&snapshot) {
                Observation::Finished(state) => return state,
                Observation::Progress(percent) => {
                    tracing::debug!(poll = poller.polls(), percent, "training: in progress");
                }
                Observation::Discarded => {}
            }
        }
    }
}
