//! glucowatchd - contactless glucose sampling daemon
//!
//! This daemon:
//! 1. Connects to the configured camera source
//! 2. Samples a frame on a fixed period and submits it for prediction
//! 3. Maintains the rolling trend, latest value, and pipeline status
//! 4. Renders every snapshot to the log (the presentation sink)
//! 5. Tears down cleanly on Ctrl-C

use anyhow::Result;
use std::sync::mpsc;

use glucowatch::{
    CameraSource, DaemonConfig, HttpEndpoint, PipelineSnapshot, SamplingPipeline,
};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cfg = DaemonConfig::load()?;
    log::info!(
        "glucowatchd starting: endpoint={} camera={} period={}ms capacity={}",
        cfg.endpoint.url,
        cfg.camera.url,
        cfg.sampling.tick.as_millis(),
        cfg.sampling.capacity
    );

    let source = CameraSource::new(cfg.camera.clone())?;
    let endpoint = HttpEndpoint::new(cfg.endpoint.clone());

    let mut pipeline =
        SamplingPipeline::new(cfg.sampling.clone(), Box::new(source), Box::new(endpoint));
    pipeline.connect()?;
    pipeline.subscribe(Box::new(render_snapshot));
    let handle = pipeline.spawn();

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .expect("error setting Ctrl-C handler");

    log::info!("glucowatchd sampling (Ctrl-C to stop)...");
    let _ = rx.recv();
    log::info!("shutdown signal received, stopping pipeline...");
    handle.stop()?;

    Ok(())
}

/// Presentation sink: render one snapshot as log lines.
fn render_snapshot(snapshot: &PipelineSnapshot) {
    match snapshot.latest {
        Some(value) => log::info!(
            "glucose {:.1} mg/dL [{}] status: {}",
            value,
            snapshot.range,
            snapshot.status
        ),
        None => log::info!("glucose -- [{}] status: {}", snapshot.range, snapshot.status),
    }

    if !snapshot.history.is_empty() {
        let trend = snapshot
            .history
            .iter()
            .map(|sample| format!("{} {:.1}", sample.label, sample.value))
            .collect::<Vec<_>>()
            .join(" | ");
        log::debug!("trend: {}", trend);
    }
}
