//! # comm-ppo: Multi-Agent PPO with a Differentiable Communication Channel
//!
//! Training core for cooperative multi-agent PPO where one centralized
//! model covers the whole team: per-agent encoders feed a shared
//! communication bottleneck, and per-agent policy/value heads read the
//! mixed latents. Credit assignment is exact per agent via an auxiliary
//! reward channel, and the combined objective is the sum of per-agent
//! clipped-surrogate terms, backpropagated in a single pass.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │  Worker 1         Worker 2         Worker N                      │
//! │  ┌─────────┐      ┌─────────┐      ┌─────────┐                   │
//! │  │ env +   │      │ env +   │      │ env +   │                   │
//! │  │ frozen  │      │ frozen  │      │ frozen  │                   │
//! │  │ CommNet │      │ CommNet │      │ CommNet │                   │
//! │  └────┬────┘      └────┬────┘      └────┬────┘                   │
//! │       │ rollouts       │                │                        │
//! │       └────────────────┼────────────────┘                        │
//! │                        ▼                                         │
//! │     recovery ──► per-agent GAE ──► joint forward ──► Σ losses    │
//! │                        ▲                                         │
//! │                  ModelSlot (snapshot swap, per worker)           │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Gradient Topology
//!
//! Agent `i`'s loss term reaches agent `j`'s encoder (i ≠ j) only through
//! the communication channel. With `disable_sharing` the channel is
//! structurally absent and cross-agent gradients are exactly zero, which
//! makes the ablation baseline a genuine independent-learners setup.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use comm_ppo::{
//!     compute_batch_loss, CommNetConfig, DiscretePolicy, MultiPpoConfig,
//!     RolloutWorkerPool,
//! };
//!
//! let config = MultiPpoConfig::new()
//!     .with_n_agents(3)
//!     .with_obs_dim(4)
//!     .build()?;
//! let model = CommNetConfig::from(&config).init(&device);
//! let policy = DiscretePolicy::new(4);
//!
//! let pool = RolloutWorkerPool::spawn(&config, envs, &model.valid(), &policy, &device)?;
//! let rollout = pool.recv_timeout(timeout).unwrap().rollout;
//! let loss = compute_batch_loss(
//!     &model, &policy, &rollout.records, &rollout.last_values, &config, &device,
//! )?;
//! let grads = loss.total.backward();
//! ```

pub mod config;
pub mod credit;
pub mod error;
pub mod joint;
pub mod loss;
pub mod model;
pub mod policy;
pub mod rollout;
pub mod slot;
pub mod trainer;

pub use config::{ActionSpaceKind, MultiPpoConfig};
pub use credit::{
    compute_agent_gae, normalize_advantages, recover_agent_trajectories, AgentTrajectory,
    RecoveredBatch,
};
pub use error::{
    ConfigurationError, DataIntegrityError, NumericInstabilityError, PostprocessError,
};
pub use joint::{JointLayout, JointStepRecord};
pub use loss::{
    agent_ppo_loss, combine_agent_losses, ppo_clip_loss, value_loss, AgentLossTerms,
    MultiAgentLoss,
};
pub use model::{
    AgentEncoder, CommChannel, CommChannelConfig, CommNet, CommNetConfig, JointForwardOutput,
};
pub use policy::{
    ActionPolicy, ActionValue, ContinuousAction, ContinuousPolicy, ContinuousPolicyOutput,
    DiscreteAction, DiscretePolicy, DiscretePolicyOutput, PolicyOutput,
};
pub use rollout::{
    check_env_compat, collect_rollout, EnvStep, MultiAgentEnv, Rollout, RolloutWorkerPool,
    WorkerRollout,
};
pub use slot::{model_slot, model_slot_with, ModelSlot, SharedModelSlot};
pub use trainer::compute_batch_loss;

#[cfg(test)]
mod tests;
