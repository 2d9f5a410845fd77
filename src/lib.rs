//! Glucowatch sampling pipeline.
//!
//! This crate implements the sampling/ingestion core of a contactless glucose
//! monitor: a fixed-period scheduler captures a frame from a camera source,
//! submits it to a remote prediction endpoint, and folds the outcome into a
//! bounded rolling trend plus a derived status and classification.
//!
//! # Architecture
//!
//! - `capture`: camera frame sources (HTTP snapshot, synthetic stub)
//! - `endpoint`: one-shot prediction exchange with typed outcomes
//! - `history`: bounded FIFO trend buffer with aligned time labels
//! - `status`: pipeline status and pure glucose classification
//! - `pipeline`: the scheduler, subscription surface, and teardown rules
//! - `config`: daemon configuration (file + env)
//!
//! State-consistency guarantees:
//!
//! 1. At most one capture/request cycle is outstanding at any time.
//! 2. Buffer mutation is all-or-nothing per tick; failed ticks mutate nothing.
//! 3. Samples are strictly chronologically ordered in the trend.
//! 4. After teardown, a resolving in-flight request cannot mutate state.

pub mod capture;
pub mod config;
pub mod endpoint;
pub mod history;
pub mod pipeline;
pub mod status;

pub use capture::{CameraConfig, CameraSource, CaptureStats, EncodedFrame, FrameSource};
pub use config::DaemonConfig;
pub use endpoint::{EndpointConfig, FailureKind, HttpEndpoint, Outcome, PredictionEndpoint};
pub use history::{Sample, TrendBuffer};
pub use pipeline::{
    PipelineHandle, PipelineSnapshot, SamplingConfig, SamplingPipeline, SnapshotObserver,
    TickReport, DEGRADED_BACKEND, DEGRADED_CAMERA,
};
pub use status::{classify, GlucoseRange, PipelineStatus, Thresholds};
