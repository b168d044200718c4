// Copyright 2026 Gazette Contributors
// SPDX-License-Identifier: MIT

//! Progress event types and broadcast channel for pipeline telemetry.
//!
//! Stages emit `ProgressEvent`s through a `tokio::sync::broadcast` channel to
//! every subscriber (CLI renderer, tests). When no subscriber exists, events
//! are silently dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// A progress event emitted during a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// The run this event belongs to.
    pub run_id: String,
    /// Monotonically increasing sequence number within the run.
    pub seq: u64,
    /// The kind of progress event.
    pub event: ProgressEventKind,
}

/// The specific kind of progress event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProgressEventKind {
    /// A pipeline stage has started.
    StageStarted { stage: Stage, message: String },
    /// A pipeline stage finished.
    StageCompleted {
        stage: Stage,
        message: String,
        duration_ms: u64,
    },
    /// One period finished transferring.
    PeriodDownloaded {
        year: String,
        title: String,
        total: usize,
        success: usize,
        failed: usize,
        skipped: usize,
    },
    /// A non-fatal warning occurred.
    Warning { message: String },
}

/// Pipeline stages, in run order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Crawl,
    Download,
    Parse,
    Process,
    Index,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Crawl => "crawl",
            Self::Download => "download",
            Self::Parse => "parse",
            Self::Process => "process",
            Self::Index => "index",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sender handle for emitting progress events.
pub type ProgressSender = tokio::sync::broadcast::Sender<ProgressEvent>;

/// Receiver handle for consuming progress events.
pub type ProgressReceiver = tokio::sync::broadcast::Receiver<ProgressEvent>;

/// Create a new progress broadcast channel with a bounded buffer.
pub fn channel() -> (ProgressSender, ProgressReceiver) {
    tokio::sync::broadcast::channel(256)
}

/// Cheap, cloneable emitter bound to one run. Clones share the sequence
/// counter, so events from a blocking worker and the async driver interleave
/// with distinct numbers.
#[derive(Debug, Clone, Default)]
pub struct Progress {
    tx: Option<ProgressSender>,
    run_id: String,
    seq: Arc<AtomicU64>,
}

impl Progress {
    pub fn new(tx: ProgressSender, run_id: impl Into<String>) -> Self {
        Self {
            tx: Some(tx),
            run_id: run_id.into(),
            seq: Arc::new(AtomicU64::new(0)),
        }
    }

    /// An emitter that drops everything.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Emit an event, ignoring the error raised when nobody is listening.
    pub fn emit(&self, event: ProgressEventKind) {
        if let Some(sender) = &self.tx {
            let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
            let _ = sender.send(ProgressEvent {
                run_id: self.run_id.clone(),
                seq,
                event,
            });
        }
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.emit(ProgressEventKind::Warning {
            message: message.into(),
        });
    }
}
