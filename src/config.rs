//! Configuration surface consumed by the multi-agent training core.
//!
//! Only values live here; loading (CLI, files) is the harness's concern.
//! Validation follows the same fail-at-startup policy as the rest of the
//! crate: a bad count or range is a [`ConfigurationError`], never a
//! runtime fallback.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ConfigurationError;
use crate::joint::JointLayout;

/// Action-space kind shared between model and environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionSpaceKind {
    /// Categorical distribution over `n_actions` discrete moves.
    Discrete { n_actions: usize },
    /// Diagonal Gaussian over an `action_dim`-dimensional displacement.
    Continuous { action_dim: usize },
}

impl ActionSpaceKind {
    /// Width of one agent's slice in the flattened joint action.
    pub fn act_width(&self) -> usize {
        match self {
            ActionSpaceKind::Discrete { .. } => 1,
            ActionSpaceKind::Continuous { action_dim } => *action_dim,
        }
    }

    /// Output width of one agent's policy head.
    pub fn head_width(&self) -> usize {
        match self {
            ActionSpaceKind::Discrete { n_actions } => *n_actions,
            ActionSpaceKind::Continuous { action_dim } => 2 * action_dim,
        }
    }
}

impl fmt::Display for ActionSpaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionSpaceKind::Discrete { n_actions } => {
                write!(f, "discrete({})", n_actions)
            }
            ActionSpaceKind::Continuous { action_dim } => {
                write!(f, "continuous({})", action_dim)
            }
        }
    }
}

/// Configuration for multi-agent PPO with a shared communication channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiPpoConfig {
    /// Number of agents N (fixed for the lifetime of a run).
    pub n_agents: usize,
    /// Per-agent observation vector size.
    pub obs_dim: usize,
    /// Action-space kind, shared by all agents.
    pub action: ActionSpaceKind,

    // Model settings
    /// Per-agent encoder latent size.
    pub hidden_dim: usize,
    /// Width of the shared communication bottleneck.
    pub comm_dim: usize,
    /// Ablation baseline: remove the communication step entirely, leaving
    /// N independent agent-local policies with no cross-agent gradients.
    pub disable_sharing: bool,

    // Advantage estimation
    /// Discount factor.
    pub gamma: f32,
    /// GAE smoothing factor.
    pub gae_lambda: f32,
    /// Whether to normalize each agent's advantages before the loss.
    pub normalize_advantages: bool,

    // Loss settings
    /// PPO clipping ratio.
    pub clip_ratio: f32,
    /// Value function loss coefficient.
    pub vf_coef: f32,
    /// Entropy bonus coefficient.
    pub entropy_coef: f32,
    /// Optional value-loss clipping range (PPO2 style).
    pub clip_value: Option<f32>,

    // Rollout collection
    /// Steps per rollout per worker.
    pub rollout_length: usize,
    /// Number of parallel rollout workers.
    pub n_workers: usize,
}

impl Default for MultiPpoConfig {
    fn default() -> Self {
        Self {
            n_agents: 3,
            obs_dim: 4,
            action: ActionSpaceKind::Discrete { n_actions: 4 },

            hidden_dim: 64,
            comm_dim: 64,
            disable_sharing: false,

            gamma: 0.99,
            gae_lambda: 0.95,
            normalize_advantages: true,

            clip_ratio: 0.2,
            vf_coef: 0.5,
            entropy_coef: 0.01,
            clip_value: Some(0.2),

            rollout_length: 64,
            n_workers: 1,
        }
    }
}

impl MultiPpoConfig {
    /// Create a configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// The joint buffer layout implied by this configuration.
    pub fn layout(&self) -> JointLayout {
        JointLayout::new(self.n_agents, self.obs_dim, self.action.act_width())
    }

    /// Validate all parameters.
    ///
    /// # Validation Rules
    /// - Count parameters (n_agents, obs_dim, dims, rollout_length,
    ///   n_workers, action sizes) must be > 0
    /// - gamma and gae_lambda must be in [0.0, 1.0]
    /// - clip_ratio must be in (0.0, 1.0]
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let counts: [(&'static str, usize); 6] = [
            ("n_agents", self.n_agents),
            ("obs_dim", self.obs_dim),
            ("hidden_dim", self.hidden_dim),
            ("comm_dim", self.comm_dim),
            ("rollout_length", self.rollout_length),
            ("n_workers", self.n_workers),
        ];
        for (field, value) in counts {
            if value == 0 {
                return Err(ConfigurationError::InvalidCount { field, value });
            }
        }
        match self.action {
            ActionSpaceKind::Discrete { n_actions } if n_actions == 0 => {
                return Err(ConfigurationError::InvalidCount {
                    field: "n_actions",
                    value: 0,
                });
            }
            ActionSpaceKind::Continuous { action_dim } if action_dim == 0 => {
                return Err(ConfigurationError::InvalidCount {
                    field: "action_dim",
                    value: 0,
                });
            }
            _ => {}
        }

        if self.gamma < 0.0 || self.gamma > 1.0 {
            return Err(ConfigurationError::OutOfRange {
                field: "gamma",
                value: self.gamma,
                min: 0.0,
                max: 1.0,
            });
        }
        if self.gae_lambda < 0.0 || self.gae_lambda > 1.0 {
            return Err(ConfigurationError::OutOfRange {
                field: "gae_lambda",
                value: self.gae_lambda,
                min: 0.0,
                max: 1.0,
            });
        }
        if self.clip_ratio <= 0.0 || self.clip_ratio > 1.0 {
            return Err(ConfigurationError::OutOfRange {
                field: "clip_ratio",
                value: self.clip_ratio,
                min: 0.0,
                max: 1.0,
            });
        }

        Ok(())
    }

    /// Build and validate the configuration.
    pub fn build(self) -> Result<Self, ConfigurationError> {
        self.validate()?;
        Ok(self)
    }

    // Builder methods

    /// Set the number of agents.
    pub fn with_n_agents(mut self, n_agents: usize) -> Self {
        self.n_agents = n_agents;
        self
    }

    /// Set the per-agent observation size.
    pub fn with_obs_dim(mut self, obs_dim: usize) -> Self {
        self.obs_dim = obs_dim;
        self
    }

    /// Set the action-space kind.
    pub fn with_action(mut self, action: ActionSpaceKind) -> Self {
        self.action = action;
        self
    }

    /// Set the per-agent encoder latent size.
    pub fn with_hidden_dim(mut self, hidden_dim: usize) -> Self {
        self.hidden_dim = hidden_dim;
        self
    }

    /// Set the communication bottleneck width.
    pub fn with_comm_dim(mut self, comm_dim: usize) -> Self {
        self.comm_dim = comm_dim;
        self
    }

    /// Disable the communication step (ablation baseline).
    pub fn with_disable_sharing(mut self, disable: bool) -> Self {
        self.disable_sharing = disable;
        self
    }

    /// Set the discount factor.
    pub fn with_gamma(mut self, gamma: f32) -> Self {
        self.gamma = gamma;
        self
    }

    /// Set the GAE smoothing factor.
    pub fn with_gae_lambda(mut self, lambda: f32) -> Self {
        self.gae_lambda = lambda;
        self
    }

    /// Set whether to normalize advantages.
    pub fn with_normalize_advantages(mut self, normalize: bool) -> Self {
        self.normalize_advantages = normalize;
        self
    }

    /// Set the PPO clipping ratio.
    pub fn with_clip_ratio(mut self, ratio: f32) -> Self {
        self.clip_ratio = ratio;
        self
    }

    /// Set the value function coefficient.
    pub fn with_vf_coef(mut self, coef: f32) -> Self {
        self.vf_coef = coef;
        self
    }

    /// Set the entropy coefficient.
    pub fn with_entropy_coef(mut self, coef: f32) -> Self {
        self.entropy_coef = coef;
        self
    }

    /// Set the optional value-loss clipping range.
    pub fn with_clip_value(mut self, clip: Option<f32>) -> Self {
        self.clip_value = clip;
        self
    }

    /// Set steps per rollout per worker.
    pub fn with_rollout_length(mut self, length: usize) -> Self {
        self.rollout_length = length;
        self
    }

    /// Set the number of parallel rollout workers.
    pub fn with_n_workers(mut self, n_workers: usize) -> Self {
        self.n_workers = n_workers;
        self
    }
}
