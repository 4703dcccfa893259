//! Governance core for multi-agent AI coordination: thermodynamic
//! state dynamics, verdicts, identity resolution, locking, dialectic
//! peer review, a knowledge graph, and calibration/telemetry, wired
//! together behind a dispatchable tool registry.
//!
//! `GovernanceCore` is the facade a transport layer (MCP, HTTP, or a
//! test harness) drives; it owns every store and in-process structure
//! the domain modules need and exposes one method per tool in the
//! catalog.

pub mod agent;
pub mod audit;
pub mod calibration;
pub mod config;
pub mod dialectic;
pub mod dispatch;
pub mod dynamics;
pub mod error;
pub mod governance;
pub mod ids;
pub mod identity;
pub mod knowledge;
pub mod persistence;

mod core;

pub use core::GovernanceCore;

/// Install a `tracing-subscriber` `EnvFilter` subscriber as the global
/// default, reading the filter from `RUST_LOG` (falling back to
/// `info`). A library exposes this rather than initializing logging
/// itself, since the embedding transport owns process-wide setup.
pub fn init_logging() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
