//! TLS heartbeat endpoint.
//!
//! A controller connects over TLS and exchanges framed requests with this
//! agent: host information queries, command execution with live stdio
//! relaying, and keep-alives. A low-frequency probe task independently
//! resolves a rendezvous DNS TXT record.
//!
//! The [`Supervisor`] owns the shutdown signal and runs the listener and
//! the probe as a unit; the listener spawns one session task per accepted
//! connection.

pub mod config;
pub mod error;
pub mod supervisor;

mod listener;
mod probe;
mod relay;
mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{
    AgentConfig, AgentConfigBuilder, HostInfoProvider, Timing, TxtNameProvider, TxtResolver,
};
pub use error::{AgentError, Result};
pub use supervisor::Supervisor;
