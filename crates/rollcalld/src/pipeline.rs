//! The per-camera attendance pipeline.
//!
//! One sequential stage per frame: acquire, normalize, detect/encode,
//! match, commit. Throughput is bounded by the source's frame rate and
//! detection cost, so there is no internal fan-out. Failures local to
//! one frame never halt the loop; only the stop flag ends it.

use crate::reporter::{PipelineSummary, StatusReporter};
use crate::snapshot;
use rollcall_core::{
    matcher, normalize, AttendanceStore, ColorOrder, CommitOutcome, Committer, FaceEncoder,
    Gallery, NormalizeParams, SessionWindow,
};
use rollcall_stream::{FrameSource, ResilientSource, StopFlag};
use std::path::PathBuf;
use std::time::Duration;

/// Channel order handed to detection backends.
const DETECTOR_COLOR_ORDER: ColorOrder = ColorOrder::Rgb;

pub struct PipelineOptions {
    pub match_threshold: f32,
    pub max_frame_width: u32,
    pub session_window: SessionWindow,
    pub status_interval: Duration,
    pub snapshot_dir: Option<PathBuf>,
}

/// Run the pipeline until the stop flag is raised. Returns the final
/// counters for the shutdown summary.
pub fn run<S, E, A>(
    mut source: ResilientSource<S>,
    mut encoder: E,
    gallery: Gallery,
    committer: Committer<A>,
    options: PipelineOptions,
    stop: StopFlag,
) -> PipelineSummary
where
    S: FrameSource,
    E: FaceEncoder,
    A: AttendanceStore,
{
    let mut reporter = StatusReporter::new(options.status_interval);
    let normalize_params = NormalizeParams {
        max_width: options.max_frame_width,
        order: DETECTOR_COLOR_ORDER,
    };
    let mut frame_index: u64 = 0;

    while let Some(frame) = source.next_frame(&stop) {
        frame_index += 1;
        reporter.note_frame();

        let state = source.state();
        reporter.sync_reconnects(state.reconnects, state.connected);

        let normalized = match normalize(&frame, &normalize_params) {
            Ok(n) => n,
            Err(err) => {
                tracing::warn!(frame = frame_index, error = %err, "frame discarded");
                continue;
            }
        };

        let detections = match encoder.detect_and_encode(&normalized) {
            Ok(d) => d,
            Err(err) => {
                tracing::warn!(
                    frame = frame_index,
                    error = %err,
                    "encoder failed; frame discarded"
                );
                continue;
            }
        };

        if !detections.is_empty() {
            reporter.note_detection_frame();
        }

        let decisions = matcher::match_detections(
            &detections,
            &gallery,
            options.match_threshold,
            frame.timestamp,
        );
        let session_key = options.session_window.key_for(&frame.timestamp);

        for decision in &decisions {
            let Some(subject_id) = decision.subject_id.as_deref() else {
                tracing::debug!(
                    frame = frame_index,
                    distance = ?decision.distance,
                    "face not recognized"
                );
                continue;
            };
            reporter.note_match();

            // Advisory fast path only: skips snapshot work for subjects
            // already present. Correctness rests on the conditional
            // insert inside commit().
            match committer.already_committed(subject_id, &session_key) {
                Ok(true) => {
                    tracing::debug!(
                        subject = subject_id,
                        session = %session_key,
                        "already committed this session"
                    );
                    reporter.note_skip();
                    continue;
                }
                Ok(false) => {}
                Err(err) => {
                    tracing::error!(
                        subject = subject_id,
                        frame = frame_index,
                        error = %err,
                        "attendance check failed"
                    );
                    continue;
                }
            }

            let snapshot_ref = options.snapshot_dir.as_deref().and_then(|dir| {
                match snapshot::save_frame(dir, subject_id, &session_key, &frame) {
                    Ok(path) => Some(path),
                    Err(err) => {
                        tracing::warn!(
                            subject = subject_id,
                            error = %err,
                            "snapshot failed; committing without one"
                        );
                        None
                    }
                }
            });

            match committer.commit(decision, &session_key, snapshot_ref) {
                Ok(CommitOutcome::Committed { timestamp }) => {
                    reporter.note_commit();
                    tracing::info!(
                        subject = subject_id,
                        distance = ?decision.distance,
                        session = %session_key,
                        timestamp = %timestamp,
                        "attendance committed"
                    );
                }
                Ok(CommitOutcome::Skipped) => {
                    reporter.note_skip();
                    tracing::debug!(
                        subject = subject_id,
                        session = %session_key,
                        "commit raced; record already present"
                    );
                }
                Err(err) => {
                    tracing::error!(
                        subject = subject_id,
                        frame = frame_index,
                        error = %err,
                        "commit failed; will retry on a later frame"
                    );
                }
            }
        }

        reporter.maybe_emit(source.state().connected);
    }

    reporter.summary()
}
