use anyhow::{Context, Result};
use rollcall_core::Committer;
use rollcall_store::AttendanceDb;
use rollcall_stream::{redact_descriptor, ResilientSource, RetryPolicy, StopFlag, V4l2Source};
use tracing_subscriber::EnvFilter;

mod config;
mod encoder;
mod pipeline;
mod reporter;
mod snapshot;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cfg = config::Config::from_env();
    tracing::info!(
        source = %redact_descriptor(&cfg.source),
        camera = %cfg.camera_id,
        threshold = cfg.match_threshold,
        db = %cfg.db_path.display(),
        "rollcalld starting"
    );

    if let Some(parent) = cfg.db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let db = AttendanceDb::open(&cfg.db_path)
        .with_context(|| format!("failed to open database at {}", cfg.db_path.display()))?;

    let gallery = db.load_gallery().context("failed to load enrollment gallery")?;
    tracing::info!(subjects = gallery.len(), dim = ?gallery.dim(), "gallery loaded");
    if gallery.is_empty() {
        tracing::warn!("no subjects enrolled; every face will be unmatched");
    }

    let enc = encoder::build(&cfg.encoder_backend)?;

    // First-connection failure is fatal; once open, the source retries
    // forever.
    let source = ResilientSource::open(
        V4l2Source::new(cfg.source.clone()),
        RetryPolicy {
            backoff: cfg.reconnect_backoff,
        },
    )
    .context("failed to open video source")?;

    let committer = Committer::new(db, cfg.camera_id.clone());
    let options = pipeline::PipelineOptions {
        match_threshold: cfg.match_threshold,
        max_frame_width: cfg.max_frame_width,
        session_window: cfg.session_window,
        status_interval: cfg.status_interval,
        snapshot_dir: cfg.snapshot_dir.clone(),
    };

    let stop = StopFlag::new();
    let pipeline_stop = stop.clone();
    let handle = std::thread::Builder::new()
        .name("rollcall-pipeline".into())
        .spawn(move || pipeline::run(source, enc, gallery, committer, options, pipeline_stop))
        .context("failed to spawn pipeline thread")?;

    tracing::info!("rollcalld ready");
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested");
    stop.trigger();

    let summary = handle
        .join()
        .map_err(|_| anyhow::anyhow!("pipeline thread panicked"))?;
    tracing::info!(
        frames = summary.frames_processed,
        detections = summary.successful_detections,
        matches = summary.matches,
        commits = summary.commits,
        skips = summary.skips,
        reconnects = summary.reconnects,
        "rollcalld stopped"
    );

    Ok(())
}
