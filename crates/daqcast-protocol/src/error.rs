//! Wire format errors.

use thiserror::Error;

/// Errors raised while building a format or decoding a field.
#[derive(Error, Debug)]
pub enum FrameError {
    /// The requested width cannot hold a decimal field.
    #[error("Invalid message width {width} (expected {min}..={max})")]
    InvalidWidth { width: usize, min: usize, max: usize },

    /// A field did not have the configured length.
    #[error("Field is {actual} bytes, expected {expected}")]
    WidthMismatch { expected: usize, actual: usize },

    /// A field contained non-ASCII bytes.
    #[error("Field is not ASCII text")]
    InvalidEncoding,

    /// A field was not a decimal number.
    #[error("Field {field:?} is not a number")]
    InvalidNumber { field: String },

    /// Transport failure while reading or writing fields.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
