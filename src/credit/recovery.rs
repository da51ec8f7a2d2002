//! Recovery of per-agent trajectories from joint step records.
//!
//! Recovery is exact or it fails: a missing entry in the auxiliary reward
//! channel, a wrong agent count, or a malformed joint buffer is a
//! [`DataIntegrityError`], never a substituted default. Handing an agent
//! the wrong reward stream would silently corrupt credit assignment, which
//! is strictly worse than dropping the batch.

use crate::error::DataIntegrityError;
use crate::joint::{JointLayout, JointStepRecord};

/// One agent's view of a rollout, in step order.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentTrajectory {
    /// Agent index in the joint layout.
    pub agent: usize,
    /// This agent's observation slice per step.
    pub observations: Vec<Vec<f32>>,
    /// This agent's action slice per step.
    pub actions: Vec<Vec<f32>>,
    /// This agent's rewards from the auxiliary channel.
    pub rewards: Vec<f32>,
    /// Behavior policy value estimates for this agent.
    pub values: Vec<f32>,
    /// Behavior policy log probabilities for this agent.
    pub log_probs: Vec<f32>,
}

impl AgentTrajectory {
    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }
}

/// Per-agent trajectories plus the episode-boundary flags they share.
///
/// Terminal and truncation flags are team-level events, so they are stored
/// once rather than duplicated into every trajectory.
#[derive(Debug, Clone, PartialEq)]
pub struct RecoveredBatch {
    pub trajectories: Vec<AgentTrajectory>,
    pub terminals: Vec<bool>,
    pub truncations: Vec<bool>,
}

impl RecoveredBatch {
    /// Number of steps in the batch.
    pub fn len(&self) -> usize {
        self.terminals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terminals.is_empty()
    }
}

/// Split a batch of joint step records into one trajectory per agent.
///
/// Validates every record against the layout before splitting anything:
/// joint buffer lengths, per-agent vector lengths, and completeness of the
/// auxiliary reward channel. Agent `i`'s observation slice, action slice,
/// and reward entry in the result always refer to the same physical agent.
pub fn recover_agent_trajectories(
    layout: &JointLayout,
    records: &[JointStepRecord],
) -> Result<RecoveredBatch, DataIntegrityError> {
    if records.is_empty() {
        return Err(DataIntegrityError::EmptyBatch);
    }

    let n = layout.n_agents;
    let steps = records.len();

    for (step, record) in records.iter().enumerate() {
        if record.observations.len() != layout.joint_obs_len() {
            return Err(DataIntegrityError::JointLengthMismatch {
                step,
                field: "observation",
                expected: layout.joint_obs_len(),
                got: record.observations.len(),
            });
        }
        if record.actions.len() != layout.joint_act_len() {
            return Err(DataIntegrityError::JointLengthMismatch {
                step,
                field: "action",
                expected: layout.joint_act_len(),
                got: record.actions.len(),
            });
        }
        if record.log_probs.len() != n {
            return Err(DataIntegrityError::JointLengthMismatch {
                step,
                field: "log_probs",
                expected: n,
                got: record.log_probs.len(),
            });
        }
        if record.values.len() != n {
            return Err(DataIntegrityError::JointLengthMismatch {
                step,
                field: "values",
                expected: n,
                got: record.values.len(),
            });
        }
        if record.agent_rewards.len() != n {
            return Err(DataIntegrityError::AgentCountMismatch {
                step,
                expected: n,
                got: record.agent_rewards.len(),
            });
        }
        for agent in 0..n {
            if !record.agent_rewards.contains_key(&agent) {
                return Err(DataIntegrityError::MissingAgentReward { agent, step });
            }
        }
    }

    let mut trajectories: Vec<AgentTrajectory> = (0..n)
        .map(|agent| AgentTrajectory {
            agent,
            observations: Vec::with_capacity(steps),
            actions: Vec::with_capacity(steps),
            rewards: Vec::with_capacity(steps),
            values: Vec::with_capacity(steps),
            log_probs: Vec::with_capacity(steps),
        })
        .collect();

    for record in records {
        for (agent, trajectory) in trajectories.iter_mut().enumerate() {
            trajectory
                .observations
                .push(record.observations[layout.obs_range(agent)].to_vec());
            trajectory
                .actions
                .push(record.actions[layout.act_range(agent)].to_vec());
            trajectory.rewards.push(record.agent_rewards[&agent]);
            trajectory.values.push(record.values[agent]);
            trajectory.log_probs.push(record.log_probs[agent]);
        }
    }

    Ok(RecoveredBatch {
        trajectories,
        terminals: records.iter().map(|r| r.terminal).collect(),
        truncations: records.iter().map(|r| r.truncated).collect(),
    })
}
