use std::fmt;

use thiserror::Error;

/// The count a kernel was allowed to report.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Expected {
    /// Update kernels may drop records but never add any.
    AtMost(u32),
    /// Creation kernels write exactly what they were asked for.
    Exactly(u32),
}

impl fmt::Display for Expected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expected::AtMost(n) => write!(f, "at most {}", n),
            Expected::Exactly(n) => write!(f, "exactly {}", n),
        }
    }
}

/// Failures surfaced by the emission/update cycle.
///
/// Running out of room for new records is not an error: it shows up as
/// `FrameReport::capacity_exhausted` and the deferred record count.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FountainError {
    #[error("write of {count} records at offset {offset} exceeds capacity {capacity}")]
    OutOfBounds { offset: u32, count: u32, capacity: u32 },

    #[error("{len} bytes is not a whole number of {stride} byte records")]
    StrideMismatch { len: usize, stride: u32 },

    /// The frame is abandoned. Records a finite source had already handed
    /// over stay with that source and go out on a later frame.
    #[error("kernel `{kernel}` reported {reported} records, expected {expected}")]
    KernelProtocolViolation {
        kernel: &'static str,
        reported: u32,
        expected: Expected,
    },

    #[error("could not allocate {requested_bytes} bytes: {reason}")]
    GrowthFailure { requested_bytes: u64, reason: String },

    #[error("device error: {0}")]
    Device(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

impl FountainError {
    /// Errors that end the current frame without a swap.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            FountainError::KernelProtocolViolation { .. } | FountainError::Device(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, FountainError>;
