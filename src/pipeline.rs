//! Sampling scheduler.
//!
//! This module drives the capture -> submit -> apply cycle on a fixed period
//! and owns all mutable pipeline state: the rolling trend buffer, the latest
//! value, the status, and the session clock.
//!
//! Concurrency model: one dedicated thread runs the tick loop; every state
//! mutation happens on that thread, so the pipeline state itself carries no
//! locks. The sole suspension point is the blocking endpoint exchange, and
//! the loop is strictly sequential, so at most one capture/request cycle is
//! outstanding at any time. Overlap is prevented structurally, not by
//! cancellation.
//!
//! Teardown: a shared closed flag is set by the handle and re-checked after
//! an in-flight request resolves, before any state mutation or subscriber
//! notification. A request that resolves after teardown is discarded.

use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::capture::FrameSource;
use crate::endpoint::{FailureKind, Outcome, PredictionEndpoint};
use crate::history::{Sample, TrendBuffer};
use crate::status::{classify, GlucoseRange, PipelineStatus, Thresholds};

/// User-facing reason when the endpoint cannot be reached or misbehaves.
pub const DEGRADED_BACKEND: &str = "Backend Offline";
/// User-facing reason when the capture source has no frame to give.
pub const DEGRADED_CAMERA: &str = "Camera Unavailable";

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);
const SHUTDOWN_POLL: Duration = Duration::from_millis(50);

/// Scheduler configuration.
#[derive(Clone, Debug)]
pub struct SamplingConfig {
    /// Fixed tick period.
    pub tick: Duration,
    /// Trend buffer capacity.
    pub capacity: usize,
    /// Classification thresholds.
    pub thresholds: Thresholds,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(1000),
            capacity: 20,
            thresholds: Thresholds::default(),
        }
    }
}

/// Immutable view delivered to subscribers after every tick outcome.
#[derive(Clone, Debug)]
pub struct PipelineSnapshot {
    pub status: PipelineStatus,
    /// Most recent successfully received value. Sticky: never reset by later
    /// `Pending` or `Failed` ticks.
    pub latest: Option<f64>,
    /// Classification derived from `latest`.
    pub range: GlucoseRange,
    /// Ordered trend contents, oldest first.
    pub history: Vec<Sample>,
}

/// What one tick did.
#[derive(Clone, Debug, PartialEq)]
pub enum TickReport {
    /// Prediction accepted into the trend.
    Sampled(f64),
    /// Endpoint still collecting; no state beyond status changed.
    Collecting,
    /// Capture failed; no request was issued.
    CaptureSkipped,
    /// Request failed; buffer and latest value untouched.
    RequestFailed(FailureKind),
    /// Outcome resolved after teardown and was discarded.
    Discarded,
}

pub type SnapshotObserver = Box<dyn Fn(&PipelineSnapshot) + Send>;

/// The sampling pipeline.
///
/// Construct with a frame source and an endpoint client, subscribe observers,
/// then either drive `tick` manually or hand the pipeline to a scheduler
/// thread with `spawn`.
pub struct SamplingPipeline {
    source: Box<dyn FrameSource>,
    endpoint: Box<dyn PredictionEndpoint>,
    tick_period: Duration,
    thresholds: Thresholds,
    buffer: TrendBuffer,
    latest: Option<f64>,
    status: PipelineStatus,
    started_at: Instant,
    observers: Vec<SnapshotObserver>,
    closed: Arc<AtomicBool>,
}

impl SamplingPipeline {
    pub fn new(
        config: SamplingConfig,
        source: Box<dyn FrameSource>,
        endpoint: Box<dyn PredictionEndpoint>,
    ) -> Self {
        Self {
            source,
            endpoint,
            tick_period: config.tick,
            thresholds: config.thresholds,
            buffer: TrendBuffer::new(config.capacity),
            latest: None,
            status: PipelineStatus::Initializing,
            started_at: Instant::now(),
            observers: Vec::new(),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Register an observer. Observers are invoked on the scheduler's thread
    /// after every tick outcome, including capture skips.
    pub fn subscribe(&mut self, observer: SnapshotObserver) {
        self.observers.push(observer);
    }

    /// Connect the capture source.
    pub fn connect(&mut self) -> Result<()> {
        self.source.connect()
    }

    /// Run one capture -> submit -> apply cycle.
    ///
    /// A failed tick degrades status but never corrupts the buffer: buffer
    /// mutation is all-or-nothing per tick.
    pub fn tick(&mut self) -> TickReport {
        let frame = match self.source.capture() {
            Ok(frame) => frame,
            Err(err) => {
                if self.closed.load(Ordering::SeqCst) {
                    return TickReport::Discarded;
                }
                log::warn!("frame capture failed: {:#}", err);
                self.status = PipelineStatus::Degraded(DEGRADED_CAMERA.to_string());
                self.notify();
                return TickReport::CaptureSkipped;
            }
        };

        let outcome = self.endpoint.submit(&frame);

        // An outcome resolving after teardown must not mutate state or
        // notify subscribers.
        if self.closed.load(Ordering::SeqCst) {
            log::debug!("discarding outcome resolved after teardown");
            return TickReport::Discarded;
        }

        let report = self.apply(outcome);
        self.notify();
        report
    }

    fn apply(&mut self, outcome: Outcome) -> TickReport {
        match outcome {
            Outcome::Predicted(value) => {
                let label = self.elapsed_label();
                self.buffer.append(Sample::new(label, value));
                self.latest = Some(value);
                self.status = PipelineStatus::Active;
                TickReport::Sampled(value)
            }
            Outcome::Pending(message) => {
                self.status = PipelineStatus::Collecting(message);
                TickReport::Collecting
            }
            Outcome::Failed(kind) => {
                self.status = PipelineStatus::Degraded(DEGRADED_BACKEND.to_string());
                TickReport::RequestFailed(kind)
            }
        }
    }

    /// Elapsed session time floored to whole seconds, e.g. "12s".
    fn elapsed_label(&self) -> String {
        format!("{}s", self.started_at.elapsed().as_secs())
    }

    /// Current state as delivered to subscribers.
    pub fn snapshot(&self) -> PipelineSnapshot {
        PipelineSnapshot {
            status: self.status.clone(),
            latest: self.latest,
            range: classify(self.latest, &self.thresholds),
            history: self.buffer.snapshot(),
        }
    }

    fn notify(&self) {
        let snapshot = self.snapshot();
        for observer in &self.observers {
            observer(&snapshot);
        }
    }

    /// Run the tick loop on a dedicated thread.
    ///
    /// The session clock restarts here: elapsed-time labels count from the
    /// moment sampling begins, not from construction.
    pub fn spawn(mut self) -> PipelineHandle {
        let closed = self.closed.clone();
        let join = std::thread::spawn(move || {
            self.run();
        });
        PipelineHandle {
            closed,
            join: Some(join),
        }
    }

    fn run(&mut self) {
        self.started_at = Instant::now();
        log::info!(
            "sampling pipeline running (period {}ms, capacity {})",
            self.tick_period.as_millis(),
            self.buffer.capacity()
        );

        let mut last_health_log = Instant::now();
        let mut next_tick = Instant::now() + self.tick_period;
        loop {
            sleep_until(next_tick, &self.closed);
            if self.closed.load(Ordering::SeqCst) {
                break;
            }

            self.tick();

            if last_health_log.elapsed() >= HEALTH_LOG_INTERVAL {
                let stats = self.source.stats();
                log::debug!(
                    "camera health: frames={} source={} trend={}/{}",
                    stats.frames_captured,
                    stats.source,
                    self.buffer.len(),
                    self.buffer.capacity()
                );
                last_health_log = Instant::now();
            }

            // A tick that overran the period fires the next one immediately;
            // missed ticks are not queued.
            next_tick += self.tick_period;
            let now = Instant::now();
            if next_tick < now {
                next_tick = now;
            }
        }
        log::info!("sampling pipeline stopped");
    }
}

/// Handle to a spawned pipeline.
#[derive(Debug)]
pub struct PipelineHandle {
    closed: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl PipelineHandle {
    /// Signal teardown without waiting for the scheduler thread.
    ///
    /// The pending timer is cancelled; an in-flight request is allowed to
    /// complete but its result is discarded.
    pub fn request_stop(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Signal teardown and wait for the scheduler thread to exit.
    pub fn stop(mut self) -> Result<()> {
        self.request_stop();
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("sampling pipeline thread panicked"))?;
        }
        Ok(())
    }
}

fn sleep_until(deadline: Instant, closed: &AtomicBool) {
    // Sleep in short slices so teardown stays prompt.
    while !closed.load(Ordering::SeqCst) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        std::thread::sleep((deadline - now).min(SHUTDOWN_POLL));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{CaptureStats, EncodedFrame};
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    /// Always-ready frame source.
    struct StubSource {
        frames: u64,
        ready: bool,
    }

    impl StubSource {
        fn new() -> Self {
            Self {
                frames: 0,
                ready: true,
            }
        }

        fn unready() -> Self {
            Self {
                frames: 0,
                ready: false,
            }
        }
    }

    impl FrameSource for StubSource {
        fn connect(&mut self) -> Result<()> {
            Ok(())
        }

        fn capture(&mut self) -> Result<EncodedFrame> {
            if !self.ready {
                return Err(anyhow!("no frame available"));
            }
            self.frames += 1;
            Ok(EncodedFrame::new(vec![0xFF, 0xD8, 0xFF, 0xD9]))
        }

        fn stats(&self) -> CaptureStats {
            CaptureStats {
                frames_captured: self.frames,
                source: "stub://test".to_string(),
            }
        }
    }

    /// Endpoint that replays a scripted outcome sequence and counts calls.
    struct ScriptedEndpoint {
        script: Mutex<VecDeque<Outcome>>,
        calls: Arc<AtomicUsize>,
    }

    impl ScriptedEndpoint {
        fn new(outcomes: Vec<Outcome>) -> Self {
            Self {
                script: Mutex::new(outcomes.into()),
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn call_counter(&self) -> Arc<AtomicUsize> {
            self.calls.clone()
        }
    }

    impl PredictionEndpoint for ScriptedEndpoint {
        fn submit(&self, _frame: &EncodedFrame) -> Outcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Outcome::Failed(FailureKind::Network))
        }
    }

    fn pipeline_with(
        capacity: usize,
        source: StubSource,
        outcomes: Vec<Outcome>,
    ) -> SamplingPipeline {
        let config = SamplingConfig {
            tick: Duration::from_millis(10),
            capacity,
            thresholds: Thresholds::default(),
        };
        SamplingPipeline::new(
            config,
            Box::new(source),
            Box::new(ScriptedEndpoint::new(outcomes)),
        )
    }

    #[test]
    fn predicted_outcomes_build_the_trend() {
        let mut pipeline = pipeline_with(
            20,
            StubSource::new(),
            vec![
                Outcome::Predicted(65.0),
                Outcome::Predicted(110.0),
                Outcome::Predicted(150.0),
            ],
        );

        assert_eq!(pipeline.tick(), TickReport::Sampled(65.0));
        assert_eq!(pipeline.tick(), TickReport::Sampled(110.0));
        assert_eq!(pipeline.tick(), TickReport::Sampled(150.0));

        let snap = pipeline.snapshot();
        assert_eq!(snap.status, PipelineStatus::Active);
        assert_eq!(snap.latest, Some(150.0));
        assert_eq!(snap.range, GlucoseRange::High);
        assert_eq!(
            snap.history.iter().map(|s| s.value).collect::<Vec<_>>(),
            vec![65.0, 110.0, 150.0]
        );
    }

    #[test]
    fn failed_first_tick_leaves_history_empty() {
        let mut pipeline = pipeline_with(
            20,
            StubSource::new(),
            vec![Outcome::Failed(FailureKind::Network)],
        );

        assert_eq!(
            pipeline.tick(),
            TickReport::RequestFailed(FailureKind::Network)
        );

        let snap = pipeline.snapshot();
        assert_eq!(
            snap.status,
            PipelineStatus::Degraded(DEGRADED_BACKEND.to_string())
        );
        assert_eq!(snap.latest, None);
        assert_eq!(snap.range, GlucoseRange::Waiting);
        assert!(snap.history.is_empty());
    }

    #[test]
    fn pending_keeps_latest_value_sticky() {
        let mut pipeline = pipeline_with(
            20,
            StubSource::new(),
            vec![
                Outcome::Predicted(95.0),
                Outcome::Pending("Collecting data...".to_string()),
                Outcome::Failed(FailureKind::Server(500)),
            ],
        );

        pipeline.tick();
        pipeline.tick();
        let snap = pipeline.snapshot();
        assert_eq!(
            snap.status,
            PipelineStatus::Collecting("Collecting data...".to_string())
        );
        assert_eq!(snap.latest, Some(95.0));
        assert_eq!(snap.history.len(), 1);

        pipeline.tick();
        let snap = pipeline.snapshot();
        assert_eq!(
            snap.status,
            PipelineStatus::Degraded(DEGRADED_BACKEND.to_string())
        );
        // Latest survives transient failures for display continuity.
        assert_eq!(snap.latest, Some(95.0));
        assert_eq!(snap.history.len(), 1);
    }

    #[test]
    fn capture_failure_skips_the_request() {
        let endpoint = ScriptedEndpoint::new(vec![Outcome::Predicted(100.0)]);
        let calls = endpoint.call_counter();
        let mut pipeline = SamplingPipeline::new(
            SamplingConfig::default(),
            Box::new(StubSource::unready()),
            Box::new(endpoint),
        );

        assert_eq!(pipeline.tick(), TickReport::CaptureSkipped);

        let snap = pipeline.snapshot();
        assert_eq!(
            snap.status,
            PipelineStatus::Degraded(DEGRADED_CAMERA.to_string())
        );
        assert!(snap.history.is_empty());
        // No request was issued for the skipped tick.
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn history_counts_only_predicted_outcomes() {
        let mut pipeline = pipeline_with(
            20,
            StubSource::new(),
            vec![
                Outcome::Predicted(80.0),
                Outcome::Pending("warming up".to_string()),
                Outcome::Failed(FailureKind::Network),
                Outcome::Predicted(85.0),
            ],
        );

        for _ in 0..4 {
            pipeline.tick();
        }

        let snap = pipeline.snapshot();
        assert_eq!(snap.history.len(), 2);
        assert_eq!(
            snap.history.iter().map(|s| s.value).collect::<Vec<_>>(),
            vec![80.0, 85.0]
        );
    }

    #[test]
    fn capacity_overflow_evicts_first_tick() {
        let outcomes = (1..=21).map(|i| Outcome::Predicted(i as f64)).collect();
        let mut pipeline = pipeline_with(20, StubSource::new(), outcomes);

        for _ in 0..21 {
            pipeline.tick();
        }

        let snap = pipeline.snapshot();
        assert_eq!(snap.history.len(), 20);
        assert_eq!(snap.history[0].value, 2.0);
        assert_eq!(snap.history[19].value, 21.0);
    }

    #[test]
    fn observers_fire_on_every_tick_outcome() {
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_obs = seen.clone();
        let mut pipeline = pipeline_with(
            20,
            StubSource::new(),
            vec![
                Outcome::Predicted(100.0),
                Outcome::Failed(FailureKind::Network),
            ],
        );
        pipeline.subscribe(Box::new(move |_snapshot| {
            seen_obs.fetch_add(1, Ordering::SeqCst);
        }));

        pipeline.tick();
        pipeline.tick();
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn snapshot_labels_and_values_stay_parallel() {
        let outcomes = (0..7).map(|i| Outcome::Predicted(60.0 + i as f64)).collect();
        let mut pipeline = pipeline_with(4, StubSource::new(), outcomes);

        for _ in 0..7 {
            pipeline.tick();
            let snap = pipeline.snapshot();
            let labels: Vec<_> = snap.history.iter().map(|s| &s.label).collect();
            let values: Vec<_> = snap.history.iter().map(|s| s.value).collect();
            assert_eq!(labels.len(), values.len());
            assert!(snap.history.len() <= 4);
        }
    }
}
