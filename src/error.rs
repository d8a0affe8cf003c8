use std::io;

use thiserror::Error;

/// Errors surfaced during a translation session. All of them are fatal:
/// the driver stops at the first one, and any partially written output
/// must not be treated as valid.
#[derive(Debug, Error)]
pub enum TranslateError {
    /// Unrecognized command keyword, bad segment name, malformed integer,
    /// wrong argument count, or trailing junk on the line.
    #[error("line {line}: syntax error: {message}")]
    Syntax { line: usize, message: String },

    /// `pop constant n` is never a valid stack operation.
    #[error("cannot pop into the constant segment")]
    PopConstant,

    /// The pointer segment has exactly two slots.
    #[error("pointer index {0} out of range (must be 0 or 1)")]
    PointerIndex(u16),

    /// The temp segment spans R5..R12.
    #[error("temp index {0} out of range (must be < 8)")]
    TempIndex(u16),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, TranslateError>;
