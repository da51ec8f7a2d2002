//! Exact per-agent credit assignment.
//!
//! The environment reports a team scalar reward plus an auxiliary per-agent
//! reward channel. This module recovers one trajectory per agent from the
//! joint step records and runs advantage estimation independently per
//! agent, so each agent's policy gradient is driven by its own reward
//! stream rather than the team scalar.

pub mod gae;
pub mod recovery;

pub use gae::{compute_agent_gae, normalize_advantages};
pub use recovery::{recover_agent_trajectories, AgentTrajectory, RecoveredBatch};
