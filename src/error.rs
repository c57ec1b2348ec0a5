//! Error type shared by every algorithm in the crate.

use thiserror::Error;

/// Errors raised by the split-network algorithms.
///
/// Cancellation is reported through [`SplitNetError::Canceled`] so that it can
/// travel through `?` like any other failure, but callers should treat it as a
/// control-flow signal (see [`SplitNetError::is_canceled`]).
#[derive(Debug, Error)]
pub enum SplitNetError {
    /// Bad arguments: wrong lengths, out-of-range taxa, negative weights, ...
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A sequence symbol maps to no state, gap or missing symbol.
    #[error("invalid character '{symbol}' at site {site} in sequence {sequence}")]
    InvalidCharacter {
        site: usize,
        sequence: usize,
        symbol: char,
    },

    /// Maximum-likelihood search ran into the upper bound of its last interval.
    #[error("saturated distance between sequences {a} and {b}")]
    SaturatedDistance { a: usize, b: usize },

    /// The two sequences share no comparable site.
    #[error("undefined distance between sequences {a} and {b}")]
    UndefinedDistance { a: usize, b: usize },

    /// An algorithm invariant broke while building a graph.
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// The computation was canceled by its progress listener.
    #[error("canceled")]
    Canceled,

    /// Malformed input file content.
    #[error("parse error: {0}")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SplitNetError {
    pub fn is_canceled(&self) -> bool {
        matches!(self, SplitNetError::Canceled)
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SplitNetError>;
