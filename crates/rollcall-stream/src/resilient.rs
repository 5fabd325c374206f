//! Reconnect-forever wrapper around a frame source.
//!
//! The adapter treats every read fault the same way: release the
//! connection, wait a fixed backoff, reconnect, resume. A stream that
//! ended and a stream that glitched are indistinguishable here, so it
//! never gives up on its own; it stops only when the caller's stop
//! flag is raised. Only the very first connection is allowed to fail
//! fast.

use crate::source::{FrameConnection, FrameSource, SourceError};
use rollcall_core::Frame;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Cooperative cancellation handle, checked once per frame iteration
/// and between backoff slices.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Reconnect policy: a fixed delay between attempts, no exponential
/// growth and no retry ceiling.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            backoff: Duration::from_secs(1),
        }
    }
}

/// Observable state of the adapter. Counters reset per instance, not
/// shared across pipelines.
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamState {
    pub connected: bool,
    /// Read faults since the last good frame.
    pub consecutive_failures: u32,
    /// Successful reconnections since the adapter was opened.
    pub reconnects: u64,
}

/// A frame source that recovers from every read fault by reconnecting.
pub struct ResilientSource<S: FrameSource> {
    source: S,
    conn: Option<S::Conn>,
    policy: RetryPolicy,
    state: StreamState,
}

impl<S: FrameSource> ResilientSource<S> {
    /// Establish the first connection. This is the only connection
    /// failure that propagates: once open, the adapter retries forever.
    pub fn open(source: S, policy: RetryPolicy) -> Result<Self, SourceError> {
        let conn = source.connect()?;
        Ok(Self {
            source,
            conn: Some(conn),
            policy,
            state: StreamState {
                connected: true,
                ..StreamState::default()
            },
        })
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Next valid frame, or `None` once the stop flag is raised.
    ///
    /// Invalid frames (empty, zero-sized, wrong buffer layout) are
    /// never returned; they trigger the same release-wait-reconnect
    /// path as a read fault.
    pub fn next_frame(&mut self, stop: &StopFlag) -> Option<Frame> {
        loop {
            if stop.is_triggered() {
                return None;
            }

            let Some(conn) = self.conn.as_mut() else {
                match self.source.connect() {
                    Ok(conn) => {
                        self.conn = Some(conn);
                        self.state.connected = true;
                        self.state.reconnects += 1;
                        tracing::info!(
                            reconnects = self.state.reconnects,
                            "source reconnected"
                        );
                    }
                    Err(err) => {
                        self.state.consecutive_failures += 1;
                        tracing::warn!(
                            error = %err,
                            consecutive_failures = self.state.consecutive_failures,
                            "reconnect attempt failed"
                        );
                        if !self.wait_backoff(stop) {
                            return None;
                        }
                    }
                }
                continue;
            };

            let result = conn
                .next_frame()
                .and_then(|frame| match frame.validate() {
                    Ok(()) => Ok(frame),
                    Err(err) => Err(SourceError::BadFrame(err.to_string())),
                });

            match result {
                Ok(frame) => {
                    self.state.consecutive_failures = 0;
                    return Some(frame);
                }
                Err(err) => {
                    self.state.consecutive_failures += 1;
                    self.state.connected = false;
                    self.conn = None;
                    tracing::warn!(
                        error = %err,
                        consecutive_failures = self.state.consecutive_failures,
                        "frame read failed, reconnecting"
                    );
                    if !self.wait_backoff(stop) {
                        return None;
                    }
                }
            }
        }
    }

    /// Sleep the fixed backoff in short slices so cancellation is
    /// honored promptly. Returns false when the stop flag was raised.
    fn wait_backoff(&self, stop: &StopFlag) -> bool {
        const SLICE: Duration = Duration::from_millis(20);
        let mut remaining = self.policy.backoff;
        while !remaining.is_zero() {
            if stop.is_triggered() {
                return false;
            }
            let nap = remaining.min(SLICE);
            std::thread::sleep(nap);
            remaining -= nap;
        }
        !stop.is_triggered()
    }
}
