//! Agent monitor: the stateful wrapper around the dynamics kernel
//!. One instance per `identity_id`.

mod monitor;
mod snapshot;

pub use monitor::{AgentMonitor, AgentReport, MetricsEnvelope, MonitorThresholds};
pub use snapshot::{AgentHistory, AgentStateSnapshot, HistoryEntry};
