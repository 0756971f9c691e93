use crate::backend::InferenceEngine;
use crate::error::ErrorKind;
use crate::pipeline::{FrameOutcome, FramePipeline};
use crate::processing::post::DetectionResult;
use serde::Serialize;
use std::any::Any;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

const FRAME_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// One compressed camera frame.
#[derive(Debug, Clone)]
pub struct Frame {
    pub number: u64,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FrameStatus {
    Completed { result: DetectionResult },
    Dropped,
    /// The renderer should clear any overlay from earlier frames.
    Failed { kind: ErrorKind, message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameReport {
    pub frame: u64,
    #[serde(flatten)]
    pub status: FrameStatus,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServiceStats {
    pub completed: u64,
    pub dropped: u64,
    pub failed: u64,
    pub detections: u64,
}

impl ServiceStats {
    fn record(&mut self, status: &FrameStatus) {
        match status {
            FrameStatus::Completed { result } => {
                self.completed += 1;
                self.detections += result.len() as u64;
            }
            FrameStatus::Dropped => self.dropped += 1,
            FrameStatus::Failed { .. } => self.failed += 1,
        }
    }
}

/// Feeds frames to a [`FramePipeline`] as they arrive.
///
/// Every frame is submitted from its own worker thread the moment it is
/// produced, so frames arriving while a forward pass is in flight are dropped
/// rather than queued. Reports are handed to the sink on the calling thread,
/// in the order the frames were produced.
pub struct FrameService<'a, E> {
    pipeline: &'a FramePipeline<E>,
}

impl<'a, E: InferenceEngine + Send> FrameService<'a, E> {
    pub fn new(pipeline: &'a FramePipeline<E>) -> Self {
        Self { pipeline }
    }

    pub fn run<I, F>(&self, source: I, mut sink: F) -> ServiceStats
    where
        I: IntoIterator<Item = Frame>,
        I::IntoIter: Send,
        F: FnMut(FrameReport),
    {
        tracing::info!(input_side = self.pipeline.input_side(), "Frame service starting");

        let frames = source.into_iter();
        let mut stats = ServiceStats::default();

        thread::scope(|scope| {
            let (tx, rx) = mpsc::channel::<(usize, FrameReport)>();

            scope.spawn(move || {
                for (seq, frame) in frames.enumerate() {
                    let tx = tx.clone();
                    scope.spawn(move || {
                        let report = self.submit_guarded(frame);
                        // The receiver outlives every worker inside the scope.
                        let _ = tx.send((seq, report));
                    });
                }
            });

            let mut pending = BTreeMap::new();
            let mut next = 0usize;
            for (seq, report) in rx {
                pending.insert(seq, report);
                while let Some(report) = pending.remove(&next) {
                    stats.record(&report.status);
                    sink(report);
                    next += 1;
                }
            }
        });

        tracing::info!(
            completed = stats.completed,
            dropped = stats.dropped,
            failed = stats.failed,
            detections = stats.detections,
            "Frame service finished"
        );

        stats
    }

    /// A panicking forward pass still yields a report, so the reorder buffer
    /// never waits on a sequence number that will not arrive.
    fn submit_guarded(&self, frame: Frame) -> FrameReport {
        let number = frame.number;
        panic::catch_unwind(AssertUnwindSafe(|| self.submit(frame))).unwrap_or_else(|payload| {
            let message = panic_message(payload.as_ref());
            tracing::error!(frame = number, panic = %message, "Frame worker panicked");
            FrameReport {
                frame: number,
                status: FrameStatus::Failed {
                    kind: ErrorKind::Inference,
                    message: format!("Inference panicked: {message}"),
                },
            }
        })
    }

    fn submit(&self, frame: Frame) -> FrameReport {
        let status = match self.pipeline.submit(&frame.bytes) {
            Ok(FrameOutcome::Completed(result)) => FrameStatus::Completed { result },
            Ok(FrameOutcome::Dropped) => FrameStatus::Dropped,
            Err(e) => {
                tracing::warn!(frame = frame.number, error = %e, "Failed to process frame");
                FrameStatus::Failed {
                    kind: e.kind(),
                    message: e.to_string(),
                }
            }
        };

        FrameReport {
            frame: frame.number,
            status,
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Image files from a directory, in lexical order, as a paced frame stream.
#[derive(Debug)]
pub struct DirectorySource {
    files: std::vec::IntoIter<PathBuf>,
    interval: Duration,
    next_number: u64,
}

impl DirectorySource {
    pub fn open(dir: &Path, interval: Duration) -> io::Result<Self> {
        let mut files = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() && is_frame_file(&path) {
                files.push(path);
            }
        }
        files.sort();

        tracing::info!(dir = %dir.display(), frames = files.len(), "Frame directory opened");

        Ok(Self {
            files: files.into_iter(),
            interval,
            next_number: 0,
        })
    }

    pub fn remaining(&self) -> usize {
        self.files.len()
    }
}

impl Iterator for DirectorySource {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        loop {
            let path = self.files.next()?;

            if self.next_number > 0 && !self.interval.is_zero() {
                thread::sleep(self.interval);
            }

            match fs::read(&path) {
                Ok(bytes) => {
                    let number = self.next_number;
                    self.next_number += 1;
                    return Some(Frame { number, bytes });
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable frame");
                }
            }
        }
    }
}

fn is_frame_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            FRAME_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}
