//! Frame-by-frame scan gate and the background scoring worker.
//!
//! The frame loop owns a [`ScanPipeline`] and calls [`ScanPipeline::on_frame`]
//! for every decoded frame. A new payload is handed to a single worker task
//! through a one-slot queue, so the frame loop never waits on the network and
//! at most one scoring job runs at a time. Results come back over a channel
//! and are published from [`ScanPipeline::poll_completions`], also on the
//! frame loop, which keeps every `ScanState` mutation on one thread.

use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::{self, Receiver, Sender, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

use super::scoring::Scorer;
use super::types::{DecodedFrame, ScanReport, ScanUpdate, ScoreResult};

const PAYLOAD_DISPLAY_CHARS: usize = 90;

#[derive(Debug, Clone, Default)]
pub struct ScanState {
    last_seen_payload: Option<String>,
    last_seen_at: Option<Instant>,
    in_flight: bool,
    generation: u64,
}

impl ScanState {
    pub fn last_seen_payload(&self) -> Option<&str> {
        self.last_seen_payload.as_deref()
    }

    pub fn is_scoring_in_flight(&self) -> bool {
        self.in_flight
    }
}

/// Why a frame did or did not start a scoring job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    NoCode,
    Duplicate,
    InFlight,
    CoolingDown,
    Dispatched,
    QueueFull,
    WorkerStopped,
}

#[derive(Debug)]
struct ScoreJob {
    generation: u64,
    payload: String,
}

#[derive(Debug)]
enum JobOutcome {
    Done {
        generation: u64,
        payload: String,
        result: ScoreResult,
    },
    Crashed {
        generation: u64,
        payload: String,
        error: String,
    },
}

impl JobOutcome {
    fn generation(&self) -> u64 {
        match self {
            JobOutcome::Done { generation, .. } | JobOutcome::Crashed { generation, .. } => {
                *generation
            }
        }
    }
}

pub struct ScanPipeline {
    state: ScanState,
    cooldown: Duration,
    jobs: Sender<ScoreJob>,
    completions: UnboundedReceiver<JobOutcome>,
    updates: UnboundedSender<ScanUpdate>,
    /// Payload last turned away by a full queue; warned about once.
    rejected_payload: Option<String>,
}

impl ScanPipeline {
    /// Spawn the scoring worker and return the pipeline that feeds it.
    /// Must be called from within a tokio runtime.
    pub fn start(
        scorer: Scorer,
        cooldown: Duration,
        updates: UnboundedSender<ScanUpdate>,
    ) -> (Self, JoinHandle<()>) {
        let (jobs_tx, jobs_rx) = mpsc::channel::<ScoreJob>(1);
        let (done_tx, done_rx) = mpsc::unbounded_channel::<JobOutcome>();
        let worker = tokio::spawn(run_score_worker(scorer, jobs_rx, done_tx));

        let pipeline = Self {
            state: ScanState::default(),
            cooldown,
            jobs: jobs_tx,
            completions: done_rx,
            updates,
            rejected_payload: None,
        };
        (pipeline, worker)
    }

    pub fn state(&self) -> &ScanState {
        &self.state
    }

    pub fn on_frame(&mut self, frame: &DecodedFrame, now: Instant) -> FrameOutcome {
        let Some(payload) = frame.text.as_deref().filter(|text| !text.is_empty()) else {
            return FrameOutcome::NoCode;
        };

        if self.state.last_seen_payload.as_deref() == Some(payload) {
            tracing::trace!(payload = %payload, "duplicate payload ignored");
            return FrameOutcome::Duplicate;
        }
        if self.state.in_flight {
            tracing::trace!(payload = %payload, "scoring in flight, payload ignored");
            return FrameOutcome::InFlight;
        }
        if let Some(last) = self.state.last_seen_at
            && now.saturating_duration_since(last) <= self.cooldown
        {
            tracing::trace!(payload = %payload, "cooling down, payload ignored");
            return FrameOutcome::CoolingDown;
        }

        let job = ScoreJob {
            generation: self.state.generation,
            payload: payload.to_string(),
        };
        match self.jobs.try_send(job) {
            Ok(()) => {
                self.state.last_seen_payload = Some(payload.to_string());
                self.state.last_seen_at = Some(now);
                self.state.in_flight = true;
                self.rejected_payload = None;
                tracing::debug!(
                    payload = %payload,
                    generation = self.state.generation,
                    "scoring dispatched"
                );
                self.publish(ScanUpdate::Detected {
                    payload: display_payload(payload),
                });
                FrameOutcome::Dispatched
            }
            Err(TrySendError::Full(_)) => {
                if self.rejected_payload.as_deref() != Some(payload) {
                    tracing::warn!(payload = %payload, "scoring queue full, job rejected");
                    self.rejected_payload = Some(payload.to_string());
                }
                FrameOutcome::QueueFull
            }
            Err(TrySendError::Closed(_)) => {
                tracing::error!("scoring worker has stopped");
                FrameOutcome::WorkerStopped
            }
        }
    }

    /// Publish every finished job. Results from before the last reset are
    /// dropped. Returns how many outcomes were drained.
    pub fn poll_completions(&mut self) -> usize {
        let mut drained = 0;
        while let Ok(outcome) = self.completions.try_recv() {
            drained += 1;
            if outcome.generation() != self.state.generation {
                tracing::debug!(
                    stale = outcome.generation(),
                    current = self.state.generation,
                    "discarding result from before reset"
                );
                continue;
            }

            self.state.in_flight = false;
            match outcome {
                JobOutcome::Done {
                    payload, result, ..
                } => {
                    tracing::info!(
                        payload = %payload,
                        score = result.score,
                        label = ?result.label,
                        "scan scored"
                    );
                    self.publish(ScanUpdate::Scored(ScanReport {
                        payload: display_payload(&payload),
                        result,
                        scored_at: Utc::now().to_rfc3339(),
                    }));
                }
                JobOutcome::Crashed { payload, error, .. } => {
                    self.publish(ScanUpdate::Failed {
                        payload: display_payload(&payload),
                        error,
                    });
                }
            }
        }
        drained
    }

    /// Forget the last payload and go back to idle. A job still running is
    /// left alone; its result is discarded when it lands.
    pub fn reset(&mut self) {
        let generation = self.state.generation.wrapping_add(1);
        self.state = ScanState {
            generation,
            ..ScanState::default()
        };
        tracing::info!(generation, "scan state reset");
        self.publish(ScanUpdate::Waiting);
    }

    fn publish(&self, update: ScanUpdate) {
        let _ = self.updates.send(update);
    }
}

async fn run_score_worker(
    scorer: Scorer,
    mut jobs: Receiver<ScoreJob>,
    done: UnboundedSender<JobOutcome>,
) {
    while let Some(ScoreJob {
        generation,
        payload,
    }) = jobs.recv().await
    {
        let job_scorer = scorer.clone();
        let job_payload = payload.clone();
        let joined = tokio::spawn(async move { job_scorer.score_url(&job_payload).await }).await;

        let outcome = match joined {
            Ok(result) => JobOutcome::Done {
                generation,
                payload,
                result,
            },
            Err(err) => {
                tracing::error!(
                    payload = %payload,
                    error = %err,
                    "scoring job terminated abnormally"
                );
                JobOutcome::Crashed {
                    generation,
                    payload,
                    error: format!("scoring worker failed: {err}"),
                }
            }
        };
        if done.send(outcome).is_err() {
            break;
        }
    }
}

/// Payload as shown to the user: first 90 characters, then `...`.
pub fn display_payload(payload: &str) -> String {
    let mut chars = payload.chars();
    let head = chars.by_ref().take(PAYLOAD_DISPLAY_CHARS).collect::<String>();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}
