//! Error type shared by every engine operation.

use std::io;

use thiserror::Error;

use crate::arena::CellIndex;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// The handle points past the end of the arena.
    #[error("cell index {0} is out of range")]
    IndexOutOfRange(CellIndex),

    /// The slot was removed, or recycled for a newer cell.
    #[error("cell index {0} refers to a removed or recycled cell")]
    DeadIndex(CellIndex),

    /// `remove_node` was called while edges still reference the cell.
    #[error("cell {index} still has {edges} incident edge(s)")]
    StillConnected { index: CellIndex, edges: usize },

    /// A tick is running; structural edits and further ticks are rejected.
    #[error("a tick is in flight")]
    TickInFlight,

    /// The tick worker went away without reporting a result.
    #[error("tick worker terminated before completing")]
    TickAborted,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The binary image is malformed or from an unknown format version.
    #[error("invalid network image: {0}")]
    Format(String),

    #[error("invalid simulation parameter: {0}")]
    InvalidParameter(String),
}

impl Error {
    /// True for the index class of errors (out of range, dead or stale handle).
    pub fn is_index_error(&self) -> bool {
        matches!(self, Error::IndexOutOfRange(_) | Error::DeadIndex(_))
    }

    pub(crate) fn format(msg: impl Into<String>) -> Self {
        Error::Format(msg.into())
    }

    /// Map a low-level read failure onto the load error taxonomy.
    ///
    /// Running out of bytes mid-image is a malformed image, not an I/O fault.
    pub(crate) fn from_read(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            Error::format("truncated image")
        } else {
            Error::Io(err)
        }
    }
}
