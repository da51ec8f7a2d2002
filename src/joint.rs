//! Agent-indexed layout for flattened joint observations and actions.
//!
//! The environment API concatenates all agents' observations, actions, and
//! rewards into flat buffers. [`JointLayout`] makes the slice/agent
//! correspondence an enforced invariant instead of an implicit convention:
//! agent `i`'s observation slice, action slice, and reward entry always
//! refer to the same physical agent, and every split goes through the
//! layout rather than ad hoc indexing.

use std::collections::HashMap;
use std::ops::Range;

use crate::error::DataIntegrityError;

/// Fixed per-run layout of the joint observation/action buffers.
///
/// Agent ordering is fixed for the lifetime of a training run; index `i`
/// identifies the same agent across observations, actions, and the
/// auxiliary reward channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JointLayout {
    /// Number of agents N.
    pub n_agents: usize,
    /// Per-agent observation vector size.
    pub obs_dim: usize,
    /// Per-agent action slice width (1 for a discrete index, action_dim
    /// for a continuous vector).
    pub act_width: usize,
}

impl JointLayout {
    /// Create a new layout.
    pub fn new(n_agents: usize, obs_dim: usize, act_width: usize) -> Self {
        Self {
            n_agents,
            obs_dim,
            act_width,
        }
    }

    /// Length of a flattened joint observation.
    pub fn joint_obs_len(&self) -> usize {
        self.n_agents * self.obs_dim
    }

    /// Length of a flattened joint action.
    pub fn joint_act_len(&self) -> usize {
        self.n_agents * self.act_width
    }

    /// Index range of agent `i`'s observation slice.
    pub fn obs_range(&self, agent: usize) -> Range<usize> {
        debug_assert!(agent < self.n_agents);
        agent * self.obs_dim..(agent + 1) * self.obs_dim
    }

    /// Index range of agent `i`'s action slice.
    pub fn act_range(&self, agent: usize) -> Range<usize> {
        debug_assert!(agent < self.n_agents);
        agent * self.act_width..(agent + 1) * self.act_width
    }

    /// Split a flattened joint observation into N per-agent slices.
    pub fn split_obs<'a>(
        &self,
        joint: &'a [f32],
    ) -> Result<Vec<&'a [f32]>, DataIntegrityError> {
        if joint.len() != self.joint_obs_len() {
            return Err(DataIntegrityError::LengthMismatch {
                field: "observation",
                expected: self.joint_obs_len(),
                got: joint.len(),
            });
        }
        Ok((0..self.n_agents)
            .map(|i| &joint[self.obs_range(i)])
            .collect())
    }

    /// Split a flattened joint action into N per-agent slices.
    pub fn split_actions<'a>(
        &self,
        joint: &'a [f32],
    ) -> Result<Vec<&'a [f32]>, DataIntegrityError> {
        if joint.len() != self.joint_act_len() {
            return Err(DataIntegrityError::LengthMismatch {
                field: "action",
                expected: self.joint_act_len(),
                got: joint.len(),
            });
        }
        Ok((0..self.n_agents)
            .map(|i| &joint[self.act_range(i)])
            .collect())
    }

    /// Re-concatenate per-agent observation slices in agent order.
    ///
    /// Inverse of [`split_obs`](Self::split_obs): concatenating the split
    /// output reproduces the original joint buffer exactly.
    pub fn concat_obs(&self, slices: &[&[f32]]) -> Vec<f32> {
        debug_assert_eq!(slices.len(), self.n_agents);
        let mut joint = Vec::with_capacity(self.joint_obs_len());
        for slice in slices {
            joint.extend_from_slice(slice);
        }
        joint
    }
}

/// One environment transition for the whole team.
///
/// Created once per environment step during rollout collection, owned by
/// the rollout buffer until post-processing consumes it, immutable after
/// creation. The team scalar reward is carried for diagnostics but unused
/// by the core once per-agent rewards are recovered.
#[derive(Debug, Clone)]
pub struct JointStepRecord {
    /// Flattened joint observation, `n_agents * obs_dim`.
    pub observations: Vec<f32>,
    /// Flattened joint action, `n_agents * act_width`. Discrete actions
    /// are stored as their index cast to f32.
    pub actions: Vec<f32>,
    /// Team scalar reward as reported by the environment.
    pub team_reward: f32,
    /// Auxiliary per-agent reward channel: agent index → reward.
    pub agent_rewards: HashMap<usize, f32>,
    /// Episode ended at this step (goal reached, failure).
    pub terminal: bool,
    /// Episode cut at this step (time limit), episode ongoing.
    pub truncated: bool,
    /// Behavior policy log-probabilities, one per agent.
    pub log_probs: Vec<f32>,
    /// Behavior policy value estimates, one per agent.
    pub values: Vec<f32>,
}

impl JointStepRecord {
    /// Whether the episode ended here for any reason.
    pub fn done(&self) -> bool {
        self.terminal || self.truncated
    }
}
