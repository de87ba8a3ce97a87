//! [`Scheduler`] – drives the pipeline at a fixed interval until stopped.
//!
//! The loop has two states, [`SchedulerState::Running`] and
//! [`SchedulerState::Stopped`].  A failed or panicking cycle is logged and
//! the loop waits the same interval as after a success; there is no backoff.
//! The stop signal is observed only between cycles, during the interval
//! wait, so an in-flight cycle always runs to completion.  The camera is
//! released on the way out.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use chrono::Utc;
use futures_util::FutureExt;
use tokio::sync::{broadcast, watch};
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;
use vigil_types::{CycleOutcome, ObservationEvent};

use crate::pipeline::ObservationPipeline;

/// Capacity of the observation-event channel.
const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Running,
    Stopped,
}

/// Totals over the lifetime of one [`Scheduler::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub completed: u64,
    pub failed: u64,
}

pub struct Scheduler {
    pipeline: ObservationPipeline,
    interval: Duration,
    events: broadcast::Sender<ObservationEvent>,
    state: SchedulerState,
}

impl Scheduler {
    pub fn new(pipeline: ObservationPipeline, interval: Duration) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            pipeline,
            interval,
            events,
            state: SchedulerState::Stopped,
        }
    }

    /// Sender side of the per-cycle event stream; clone it to hand out
    /// subscriptions (e.g. to the dashboard).
    pub fn events(&self) -> broadcast::Sender<ObservationEvent> {
        self.events.clone()
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Run one cycle inside its own span, converting any error or panic into
    /// a failed [`ObservationEvent`], and broadcast the result.
    pub async fn run_once(&mut self) -> ObservationEvent {
        let cycle_id = Uuid::new_v4();
        let span = info_span!("cycle", %cycle_id, camera = %self.pipeline.camera_id());

        let outcome = async {
            match AssertUnwindSafe(self.pipeline.run_cycle()).catch_unwind().await {
                Ok(Ok(report)) => report.to_outcome(),
                Ok(Err(e)) => {
                    warn!(stage = %e.stage(), error = %e, "cycle aborted");
                    e.to_outcome()
                }
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    error!(%message, "cycle panicked");
                    CycleOutcome::Failed {
                        stage: "cycle".into(),
                        message,
                    }
                }
            }
        }
        .instrument(span)
        .await;

        let event = ObservationEvent {
            cycle_id,
            finished_at: Utc::now(),
            outcome,
        };
        // No subscribers is not an error.
        let _ = self.events.send(event.clone());
        event
    }

    /// Run cycles until `shutdown` becomes `true` or its sender is dropped.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> RunSummary {
        self.state = SchedulerState::Running;
        let mut summary = RunSummary::default();
        info!(interval_secs = self.interval.as_secs_f64(), "scheduler running");

        while !*shutdown.borrow_and_update() {
            match self.run_once().await.outcome {
                CycleOutcome::Completed { .. } => summary.completed += 1,
                CycleOutcome::Failed { .. } => summary.failed += 1,
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        self.pipeline.release_camera();
        self.state = SchedulerState::Stopped;
        info!(completed = summary.completed, failed = summary.failed, "scheduler stopped");
        summary
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
