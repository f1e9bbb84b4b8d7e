//! daqcast Protocol - Fixed-width wire format
//!
//! The daemon writes an endless concatenation of fixed-width ASCII fields to
//! every client, one field per tick. There is no header, delimiter or
//! handshake. This crate provides:
//! - [`MessageFormat`] - formatting and parsing of a single field
//! - [`FixedWidthCodec`] - a tokio-util codec that reassembles fields from a
//!   byte stream regardless of how TCP segments it

pub mod codec;
pub mod error;
pub mod format;

pub use codec::FixedWidthCodec;
pub use error::FrameError;
pub use format::MessageFormat;
