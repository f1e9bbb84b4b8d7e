//! daqcast stream client.
//!
//! Connects to a daqcast daemon, splits the byte stream into fixed-width
//! messages and forwards each decoded sample as a [`StreamEvent`]. Lost
//! connections are retried with exponential backoff until cancelled.
//!
//! **Panic-Free Policy:** No `.unwrap()`, `.expect()`, `panic!()`,
//! `unreachable!()`, or `todo!()` outside tests.

pub mod client;
pub mod error;

pub use client::{Reading, StreamClient, StreamConfig, StreamEvent};
pub use error::{ClientError, Result};
