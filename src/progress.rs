// Copyright 2025 Yevhenii Reizner
//
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A pipeline stage.
///
/// Stages run strictly in the order they are declared here and never overlap:
/// a `progress = 1.0` event of one stage always precedes any event of the next.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
#[allow(missing_docs)]
pub enum Stage {
    Sample,
    Quantize,
    Regions,
    Contours,
    Triangulate,
    Extrude,
    Simplify,
    Validate,
}

impl Stage {
    /// Returns the stage name as it appears in progress events.
    pub fn name(self) -> &'static str {
        match self {
            Stage::Sample => "sample",
            Stage::Quantize => "quantize",
            Stage::Regions => "regions",
            Stage::Contours => "contours",
            Stage::Triangulate => "triangulate",
            Stage::Extrude => "extrude",
            Stage::Simplify => "simplify",
            Stage::Validate => "validate",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A progress report emitted by the pipeline.
#[derive(Clone, PartialEq, Debug)]
pub struct ProgressEvent {
    /// The stage this event belongs to.
    pub stage: Stage,
    /// Stage completion in the 0..=1 range, monotone per stage.
    pub progress: f32,
    /// A short human-readable status line.
    pub message: String,
    /// Iteration counter, currently only populated by the quantizer.
    pub iteration: Option<u32>,
}

/// A progress receiver provided by the host.
///
/// Progress is one-way and fire-and-forget; implementations must not block,
/// otherwise they will stall the whole pipeline.
pub trait ProgressSink {
    /// Delivers a single event.
    fn emit(&self, event: ProgressEvent);
}

/// A sink that discards all events.
#[derive(Copy, Clone, PartialEq, Debug, Default)]
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn emit(&self, _: ProgressEvent) {}
}

/// Why a job was stopped early.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum CancelReason {
    /// The host flipped the [`CancelSignal`].
    UserCancelled,
    /// The wall-clock budget ran out.
    TimedOut,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::UserCancelled => f.write_str("cancelled by the host"),
            CancelReason::TimedOut => f.write_str("wall-clock budget exceeded"),
        }
    }
}

/// A shareable cancellation flag.
///
/// The host keeps a clone and flips it from any thread; the pipeline observes
/// the flag at its suspension points and aborts the current stage.
#[derive(Clone, Debug, Default)]
pub struct CancelSignal(Arc<AtomicBool>);

impl CancelSignal {
    /// Creates a new, unset signal.
    pub fn new() -> Self {
        CancelSignal(Arc::new(AtomicBool::new(false)))
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Checks whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Per-job progress and cancellation plumbing handed down to every stage.
///
/// `check` is the pipeline's only suspension point: stages call it between
/// iterations and every few thousand pixels, and abort when the host either
/// flipped the cancel signal or the wall-clock budget ran out.
pub(crate) struct JobCtx<'a> {
    sink: &'a dyn ProgressSink,
    cancel: &'a CancelSignal,
    deadline: Option<std::time::Instant>,
}

impl<'a> JobCtx<'a> {
    pub fn new(
        sink: &'a dyn ProgressSink,
        cancel: &'a CancelSignal,
        deadline: Option<std::time::Instant>,
    ) -> Self {
        JobCtx {
            sink,
            cancel,
            deadline,
        }
    }

    pub fn check(&self) -> Result<(), crate::Error> {
        if self.cancel.is_cancelled() {
            return Err(crate::Error::Cancelled {
                reason: CancelReason::UserCancelled,
            });
        }

        if let Some(deadline) = self.deadline {
            if std::time::Instant::now() > deadline {
                return Err(crate::Error::Cancelled {
                    reason: CancelReason::TimedOut,
                });
            }
        }

        Ok(())
    }

    pub fn emit(&self, stage: Stage, progress: f32, message: impl Into<String>) {
        self.sink.emit(ProgressEvent {
            stage,
            progress,
            message: message.into(),
            iteration: None,
        });
    }

    pub fn emit_iteration(&self, stage: Stage, progress: f32, message: String, iteration: u32) {
        self.sink.emit(ProgressEvent {
            stage,
            progress,
            message,
            iteration: Some(iteration),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_signal_is_shared() {
        let a = CancelSignal::new();
        let b = a.clone();
        assert!(!b.is_cancelled());
        a.cancel();
        assert!(b.is_cancelled());
    }

    #[test]
    fn stage_names() {
        assert_eq!(Stage::Sample.name(), "sample");
        assert_eq!(Stage::Validate.to_string(), "validate");
    }
}
