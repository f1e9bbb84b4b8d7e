//! daqcast Daemon - Client registry and fixed-rate broadcast server
//!
//! This crate provides the core infrastructure for the daqcast daemon:
//! - `channel` - bounded drop-oldest conduit from producer to broadcaster
//! - `registry` - client registry actor owning every connected socket
//! - `server` - TCP listener, broadcast loop and their orchestration
//! - `producer` - task driving a sample source at a fixed rate
//! - `monitor` - periodic resource and throughput reporting
//! - `stats` - counters written by the server and read by the monitor
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  SampleChannel  ┌────────────────┐  Broadcast  ┌───────────────┐
//! │   Producer   │────────────────▶│ BroadcastLoop  │────────────▶│ RegistryActor │──▶ clients
//! │ (source task)│  (drop-oldest)  │ (fixed period) │  (mpsc)     │ (owns sockets)│
//! └──────────────┘                 └────────────────┘             └───────▲───────┘
//!                                                                         │ Register
//!                                                                 ┌───────┴───────┐
//!                                                                 │   Listener    │
//!                                                                 │ (TcpListener) │
//!                                                                 └───────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

pub mod channel;
pub mod monitor;
pub mod producer;
pub mod registry;
pub mod server;
pub mod stats;
