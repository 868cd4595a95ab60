//! Session lifecycle core of a remote-desktop host.
//!
//! [`host::ChromotingHost`] admits inbound sessions, enforces a single
//! authenticated client, throttles failed logins and reports lifecycle
//! events to registered observers. Transport, desktop capture and
//! signalling are supplied by the embedder through the traits in
//! [`protocol`] and [`host`].

pub mod audit;
pub mod cli;
pub mod config;
pub mod context;
pub mod host;
pub mod logging;
pub mod metrics;
pub mod protocol;
pub mod security;
pub mod utils;

pub use context::HostContext;
pub use host::ChromotingHost;
