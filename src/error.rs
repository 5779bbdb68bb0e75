// Copyright 2025 Yevhenii Reizner
//
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use crate::progress::CancelReason;

/// A list of pipeline failures.
///
/// Recoverable anomalies (an empty cluster, a degenerate triangle, a tiny
/// component) are handled inside the stages and reported as diagnostics.
/// Everything here aborts the job; no partial geometry is ever returned.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A parameter is outside its documented range.
    #[error("parameter `{name}` is {value}, allowed range is {range}")]
    InvalidParameter {
        /// The offending field name.
        name: &'static str,
        /// The provided value.
        value: f32,
        /// A human-readable description of the allowed range.
        range: &'static str,
    },

    /// The input image cannot be processed.
    ///
    /// Either its dimensions exceed the supported maximum
    /// or the pixel buffer length does not match them.
    #[error("unsupported image: {reason}")]
    UnsupportedImage {
        /// What exactly is wrong with the image.
        reason: String,
    },

    /// Downscaling could not bring the working set within the memory budget.
    #[error("memory budget exceeded: at least {required} bytes required, budget is {budget}")]
    MemoryExceeded {
        /// The smallest achievable working-set estimate in bytes.
        required: u64,
        /// The configured budget in bytes.
        budget: u64,
    },

    /// The job was cancelled by the host or timed out.
    ///
    /// Terminal, but expected. All intermediate buffers are released.
    #[error("the job was cancelled: {reason}")]
    Cancelled {
        /// Why the job was stopped.
        reason: CancelReason,
    },

    /// An assertion inside the pipeline failed.
    ///
    /// For example, triangulation of a self-intersecting polygon.
    #[error("geometry generation failed at the `{stage}` stage")]
    Geometry {
        /// Name of the failing stage.
        stage: &'static str,
    },

    /// The validator reported fatal issues.
    ///
    /// Only produced by [`PipelineOutput::into_printable`].
    /// `generate` itself returns the geometry together with the report.
    ///
    /// [`PipelineOutput::into_printable`]: crate::PipelineOutput::into_printable
    #[error("the generated geometry is not printable: {fatal} fatal issue(s)")]
    Unprintable {
        /// Number of fatal issues in the report.
        fatal: usize,
    },
}
