//! Capture session controller.
//!
//! Owns at most one capture session at a time. While scanning, a
//! repeating tick samples a frame, submits it for recognition and folds the
//! verdict into the session roster. Every tick carries the session token; work
//! that completes after its session ended is dropped.

use crate::source::{DeviceAcquirer, FrameProvider};
use crate::surface::{Surface, UiEvent};
use chrono::{Local, NaiveDate};
use rollcall_client::RecognitionService;
use rollcall_core::capture::{status_line, STATUS_SCANNING, STATUS_STOPPED};
use rollcall_core::{CaptureState, Recognition, Roster, RosterEntry, SessionToken};
use rollcall_hw::CameraError;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("a capture session is already active")]
    AlreadyActive,
    #[error("camera error: {0}")]
    Acquisition(#[from] CameraError),
    #[error("capture was stopped before the camera was ready")]
    Cancelled,
}

struct ActiveSession<P> {
    token: SessionToken,
    date: NaiveDate,
    roster: Roster,
    provider: Arc<P>,
    cancel: CancellationToken,
    ticker: Option<JoinHandle<()>>,
    ticks: u64,
}

struct Shared<P> {
    state: CaptureState,
    next_token: SessionToken,
    /// Token of a start still waiting on the camera.
    pending: Option<SessionToken>,
    status: String,
    session: Option<ActiveSession<P>>,
}

impl<P> Shared<P> {
    fn is_current(&self, token: SessionToken) -> bool {
        self.session.as_ref().is_some_and(|s| s.token == token)
    }
}

pub struct CaptureController<A: DeviceAcquirer, R, S> {
    acquirer: A,
    recognizer: Arc<R>,
    surface: Arc<S>,
    tick_interval: Duration,
    shared: Arc<Mutex<Shared<A::Provider>>>,
}

impl<A, R, S> CaptureController<A, R, S>
where
    A: DeviceAcquirer,
    R: RecognitionService + 'static,
    S: Surface + 'static,
{
    pub fn new(acquirer: A, recognizer: Arc<R>, surface: Arc<S>, tick_interval: Duration) -> Self {
        Self {
            acquirer,
            recognizer,
            surface,
            tick_interval,
            shared: Arc::new(Mutex::new(Shared {
                state: CaptureState::Idle,
                next_token: SessionToken::first(),
                pending: None,
                status: String::new(),
                session: None,
            })),
        }
    }

    pub async fn state(&self) -> CaptureState {
        self.shared.lock().await.state
    }

    pub async fn status(&self) -> String {
        self.shared.lock().await.status.clone()
    }

    /// Roster of the active session, newest first. Empty when idle.
    pub async fn roster(&self) -> Vec<RosterEntry> {
        let shared = self.shared.lock().await;
        shared
            .session
            .as_ref()
            .map(|s| s.roster.entries().cloned().collect())
            .unwrap_or_default()
    }

    /// Acquire the camera and begin scanning for `date`.
    ///
    /// Only valid from `Idle`; a second start while active is refused without side effects.
    pub async fn start(&self, date: NaiveDate) -> Result<SessionToken, CaptureError> {
        let token = {
            let mut shared = self.shared.lock().await;
            if !shared.state.can_start() {
                tracing::debug!(state = ?shared.state, "capture: start ignored");
                return Err(CaptureError::AlreadyActive);
            }
            let token = shared.next_token;
            shared.next_token = token.next();
            shared.pending = Some(token);
            self.set_state(&mut shared, CaptureState::Starting);
            token
        };

        tracing::info!(session = token.get(), %date, "capture: acquiring camera");
        let acquired = self.acquirer.acquire().await;

        let mut shared = self.shared.lock().await;
        let still_wanted = shared.pending == Some(token);
        let provider = match acquired {
            Ok(provider) => provider,
            Err(e) => {
                tracing::warn!(session = token.get(), error = %e, "capture: camera acquisition failed");
                if still_wanted {
                    shared.pending = None;
                    self.surface.emit(UiEvent::Alert(format!("Camera error: {e}")));
                    self.set_state(&mut shared, CaptureState::Idle);
                }
                return Err(e.into());
            }
        };

        if !still_wanted {
            provider.release();
            tracing::info!(session = token.get(), "capture: start abandoned, camera released");
            return Err(CaptureError::Cancelled);
        }

        let cancel = CancellationToken::new();
        let provider = Arc::new(provider);
        shared.pending = None;
        shared.session = Some(ActiveSession {
            token,
            date,
            roster: Roster::new(),
            provider,
            cancel: cancel.clone(),
            ticker: None,
            ticks: 0,
        });
        self.set_state(&mut shared, CaptureState::Scanning);
        self.set_status(&mut shared, STATUS_SCANNING.to_string());

        let ticker = Ticker {
            shared: Arc::clone(&self.shared),
            recognizer: Arc::clone(&self.recognizer),
            surface: Arc::clone(&self.surface),
        };
        let handle = tokio::spawn(ticker.run(token, self.tick_interval, cancel));
        if let Some(session) = shared.session.as_mut() {
            session.ticker = Some(handle);
        }

        tracing::info!(session = token.get(), "capture: scanning");
        Ok(token)
    }

    /// Stop scanning: cancel the tick, release the camera, and hand back the roster.
    ///
    /// Once this returns the tick task is gone, so no further recognition request
    /// can be sent. Returns `None` if no session was running.
    pub async fn stop(&self) -> Option<Vec<RosterEntry>> {
        let session = {
            let mut shared = self.shared.lock().await;
            if !shared.state.can_stop() {
                tracing::debug!("capture: stop ignored while idle");
                return None;
            }

            shared.pending = None;
            let session = shared.session.take();
            self.set_state(&mut shared, CaptureState::Idle);
            self.set_status(&mut shared, STATUS_STOPPED.to_string());
            session
        }?;

        session.cancel.cancel();
        if let Some(ticker) = session.ticker {
            // A request future not yet polled has not gone out; dropping it here keeps it that way.
            ticker.abort();
            if let Err(e) = ticker.await {
                if !e.is_cancelled() {
                    tracing::warn!(session = session.token.get(), error = %e, "capture: tick task failed");
                }
            }
        }
        session.provider.release();
        tracing::info!(
            session = session.token.get(),
            ticks = session.ticks,
            recognized = session.roster.len(),
            "capture: session stopped"
        );
        Some(session.roster.into_entries())
    }

    fn set_state(&self, shared: &mut Shared<A::Provider>, state: CaptureState) {
        shared.state = state;
        let (start_enabled, stop_enabled) = state.controls();
        self.surface.emit(UiEvent::CaptureControls {
            start_enabled,
            stop_enabled,
        });
    }

    fn set_status(&self, shared: &mut Shared<A::Provider>, text: String) {
        shared.status = text.clone();
        self.surface.emit(UiEvent::CaptureStatus(text));
    }
}

/// State needed by the tick task, detached from the controller.
struct Ticker<P, R, S> {
    shared: Arc<Mutex<Shared<P>>>,
    recognizer: Arc<R>,
    surface: Arc<S>,
}

impl<P, R, S> Ticker<P, R, S>
where
    P: FrameProvider + 'static,
    R: RecognitionService + 'static,
    S: Surface + 'static,
{
    async fn run(self, token: SessionToken, period: Duration, cancel: CancellationToken) {
        let mut interval = time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }
            // Ticks run back to back: the next one waits for this one to resolve.
            self.step(token).await;
        }
        tracing::debug!(session = token.get(), "capture: tick loop ended");
    }

    async fn step(&self, token: SessionToken) {
        let (provider, date, tick) = {
            let mut shared = self.shared.lock().await;
            let Some(session) = shared.session.as_mut().filter(|s| s.token == token) else {
                return;
            };
            session.ticks += 1;
            (Arc::clone(&session.provider), session.date, session.ticks)
        };

        let payload = match provider.next_payload().await {
            Ok(payload) if !payload.is_empty() => payload,
            Ok(_) => {
                tracing::debug!(tick, "capture: empty payload, frame dropped");
                return;
            }
            Err(e) => {
                tracing::debug!(tick, error = %e, "capture: frame dropped");
                return;
            }
        };

        let pending = {
            let shared = self.shared.lock().await;
            if !shared.is_current(token) {
                return;
            }
            self.recognizer.recognize(payload, date)
        };

        let result = match pending.await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(tick, error = %e, "capture: recognition request failed");
                return;
            }
        };

        let recognition = match result.interpret() {
            Ok(recognition) => recognition,
            Err(e) => {
                tracing::warn!(tick, error = %e, "capture: malformed recognition response");
                return;
            }
        };

        let mut shared = self.shared.lock().await;
        if !shared.is_current(token) {
            tracing::debug!(tick, session = token.get(), "capture: stale response discarded");
            return;
        }

        let line = status_line(&recognition);
        shared.status = line.clone();
        self.surface.emit(UiEvent::CaptureStatus(line));

        if let (Recognition::Recognized { student_id, name, .. }, Some(session)) =
            (&recognition, shared.session.as_mut())
        {
            if let Some(entry) = session.roster.record(student_id, name, session.date, Local::now()) {
                self.surface.emit(UiEvent::RosterPrepended(entry.clone()));
            }
        }
    }
}
