//! The thermodynamic dynamics kernel: pure functions over a
//! per-agent EISV state vector. Nothing in this module performs I/O or
//! holds any shared state — `agent::AgentMonitor` is the stateful
//! wrapper around it.

mod control;
mod kernel;
mod phase;

pub use control::{PiController, PiControllerState};
pub use kernel::{
    clamp_state, coherence, objective, parameter_coherence, step, Derivatives, DynamicsParams,
    EthicalDrift, ObjectiveWeights, ParameterFingerprint, RiskBand, StateVector, Theta,
};
pub use phase::{check_basin, detect_phase, Basin, Phase, PhaseSample};
