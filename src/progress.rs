//! Per-call progress reporting shared by the writer and reader

use std::ops::ControlFlow;

/// Snapshot passed to progress callbacks after every chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// Total uncompressed bytes of the entry, when known up front
    pub total_bytes: Option<u64>,
    /// Uncompressed bytes processed so far; never decreases
    pub bytes_complete: u64,
    /// Bytes processed by the chunk that triggered this report
    pub bytes_this_pass: u64,
}

impl Progress {
    /// Completed fraction in `0.0..=1.0`, `None` when the total is unknown
    pub fn fraction(&self) -> Option<f64> {
        match self.total_bytes {
            Some(0) => Some(1.0),
            Some(total) => Some((self.bytes_complete as f64 / total as f64).min(1.0)),
            None => None,
        }
    }
}

/// Return [`ControlFlow::Break`] to cancel the operation
pub type ProgressControl = ControlFlow<()>;

pub(crate) fn no_progress(_: Progress) -> ProgressControl {
    ControlFlow::Continue(())
}
