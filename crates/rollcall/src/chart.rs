//! Periodic attendance chart refresh.

use crate::surface::{Surface, UiEvent};
use rollcall_client::{ClientError, StatsService};
use rollcall_core::{AttendanceChart, StatsError};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

#[derive(Error, Debug)]
pub enum RefreshError {
    #[error("failed to fetch attendance stats: {0}")]
    Fetch(#[from] ClientError),
    #[error(transparent)]
    Stats(#[from] StatsError),
}

pub struct ChartRefresher<St, S> {
    stats: Arc<St>,
    surface: Arc<S>,
    period: Duration,
    chart: Mutex<AttendanceChart>,
}

impl<St, S> ChartRefresher<St, S>
where
    St: StatsService,
    S: Surface,
{
    pub fn new(stats: Arc<St>, surface: Arc<S>, period: Duration) -> Self {
        Self {
            stats,
            surface,
            period,
            chart: Mutex::new(AttendanceChart::new()),
        }
    }

    /// Fetch once and redraw. Returns the new chart revision.
    pub async fn refresh(&self) -> Result<u64, RefreshError> {
        let stats = self.stats.attendance_stats().await?;

        let mut chart = self.chart.lock().await;
        let first_render = chart.is_empty();
        chart.replace(stats)?;

        self.surface.emit(UiEvent::ChartRedrawn {
            labels: chart.labels().to_vec(),
            counts: chart.data().to_vec(),
            first_render,
        });
        tracing::debug!(revision = chart.revision(), days = chart.labels().len(), "chart redrawn");
        Ok(chart.revision())
    }

    /// Copy of the chart as last drawn.
    pub async fn snapshot(&self) -> AttendanceChart {
        self.chart.lock().await.clone()
    }

    /// Refresh now and then every period until `cancel` fires.
    /// Failed refreshes leave the previous chart on screen.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut interval = time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(period_secs = self.period.as_secs(), "chart refresh started");
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    if let Err(e) = self.refresh().await {
                        tracing::warn!(error = %e, "chart refresh failed; keeping previous data");
                    }
                }
            }
        }
        tracing::info!("chart refresh stopped");
    }
}
