//! Centralized multi-agent model: per-agent encoders, an optional shared
//! communication channel, and per-agent policy/value heads.
//!
//! One forward pass covers the whole team. Each agent keeps its own encoder
//! and heads (no weight tying); the communication step is the only place
//! where information, and therefore gradient, crosses agent boundaries.
//! With sharing disabled the channel is structurally absent and the model
//! degenerates to N independent agent-local networks evaluated together.
//!
//! The network itself is action-space agnostic: heads emit raw parameter
//! tensors sized by [`ActionSpaceKind::head_width`], and the caller's
//! [`ActionPolicy`] interprets them at forward time.

pub mod comm;

pub use comm::{CommChannel, CommChannelConfig};

use burn::module::Module;
use burn::nn::{Linear, LinearConfig};
use burn::tensor::activation::relu;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use crate::config::{ActionSpaceKind, MultiPpoConfig};
use crate::error::ConfigurationError;
use crate::joint::JointLayout;
use crate::policy::{ActionPolicy, PolicyOutput};

// ============================================================================
// AgentEncoder
// ============================================================================

/// Two-layer MLP encoder owned by a single agent.
#[derive(Module, Debug)]
pub struct AgentEncoder<B: Backend> {
    pub(crate) fc1: Linear<B>,
    pub(crate) fc2: Linear<B>,
}

impl<B: Backend> AgentEncoder<B> {
    fn new(obs_dim: usize, hidden_dim: usize, device: &B::Device) -> Self {
        Self {
            fc1: LinearConfig::new(obs_dim, hidden_dim).init(device),
            fc2: LinearConfig::new(hidden_dim, hidden_dim).init(device),
        }
    }

    fn forward(&self, obs: Tensor<B, 2>) -> Tensor<B, 2> {
        relu(self.fc2.forward(relu(self.fc1.forward(obs))))
    }
}

// ============================================================================
// CommNet
// ============================================================================

/// Configuration for [`CommNet`].
#[derive(Debug, Clone, Copy)]
pub struct CommNetConfig {
    pub n_agents: usize,
    pub obs_dim: usize,
    pub hidden_dim: usize,
    pub comm_dim: usize,
    pub action: ActionSpaceKind,
    /// When true, build without the communication channel.
    pub disable_sharing: bool,
}

impl CommNetConfig {
    pub fn new(
        n_agents: usize,
        obs_dim: usize,
        hidden_dim: usize,
        comm_dim: usize,
        action: ActionSpaceKind,
    ) -> Self {
        Self {
            n_agents,
            obs_dim,
            hidden_dim,
            comm_dim,
            action,
            disable_sharing: false,
        }
    }

    pub fn with_disable_sharing(mut self, disable: bool) -> Self {
        self.disable_sharing = disable;
        self
    }

    /// Initialize the full model on the given device.
    pub fn init<B: Backend>(&self, device: &B::Device) -> CommNet<B> {
        let encoders = (0..self.n_agents)
            .map(|_| AgentEncoder::new(self.obs_dim, self.hidden_dim, device))
            .collect();
        let comm = if self.disable_sharing {
            None
        } else {
            Some(
                CommChannelConfig::new(self.n_agents, self.hidden_dim, self.comm_dim)
                    .init(device),
            )
        };
        let policy_heads = (0..self.n_agents)
            .map(|_| LinearConfig::new(self.hidden_dim, self.action.head_width()).init(device))
            .collect();
        let value_heads = (0..self.n_agents)
            .map(|_| LinearConfig::new(self.hidden_dim, 1).init(device))
            .collect();

        CommNet {
            encoders,
            comm,
            policy_heads,
            value_heads,
            n_agents: self.n_agents,
            obs_dim: self.obs_dim,
            act_width: self.action.act_width(),
            head_width: self.action.head_width(),
        }
    }
}

impl From<&MultiPpoConfig> for CommNetConfig {
    fn from(config: &MultiPpoConfig) -> Self {
        CommNetConfig::new(
            config.n_agents,
            config.obs_dim,
            config.hidden_dim,
            config.comm_dim,
            config.action,
        )
        .with_disable_sharing(config.disable_sharing)
    }
}

/// The centralized team model.
///
/// The comm channel is an `Option` so that the ablation baseline removes
/// the cross-agent parameters entirely rather than zeroing them out.
#[derive(Module, Debug)]
pub struct CommNet<B: Backend> {
    pub(crate) encoders: Vec<AgentEncoder<B>>,
    pub(crate) comm: Option<CommChannel<B>>,
    pub(crate) policy_heads: Vec<Linear<B>>,
    pub(crate) value_heads: Vec<Linear<B>>,
    #[module(skip)]
    n_agents: usize,
    #[module(skip)]
    obs_dim: usize,
    #[module(skip)]
    act_width: usize,
    #[module(skip)]
    head_width: usize,
}

/// Output of a joint forward pass.
#[derive(Clone)]
pub struct JointForwardOutput<B: Backend, A: ActionPolicy<B>> {
    /// One distribution per agent, each over [batch] samples.
    pub policies: Vec<A::Output>,
    /// Value estimates [batch, n_agents]; column `i` belongs to agent `i`.
    pub values: Tensor<B, 2>,
}

impl<B: Backend, A: ActionPolicy<B>> JointForwardOutput<B, A> {
    /// Agent `i`'s value estimates as a 1D tensor [batch].
    pub fn agent_values(&self, agent: usize) -> Tensor<B, 1> {
        let batch = self.values.dims()[0];
        self.values
            .clone()
            .slice([0..batch, agent..agent + 1])
            .flatten(0, 1)
    }

    /// Sample one action per agent per batch row (detached).
    ///
    /// Returns per-agent pairs of (actions, log_probs), outer index is
    /// the agent.
    pub fn sample_actions(&self, device: &B::Device) -> Vec<(Vec<A::Action>, Vec<f32>)> {
        self.policies.iter().map(|p| p.sample(device)).collect()
    }
}

impl<B: Backend> CommNet<B> {
    /// The buffer layout this model was built for.
    pub fn layout(&self) -> JointLayout {
        JointLayout::new(self.n_agents, self.obs_dim, self.act_width)
    }

    pub fn n_agents(&self) -> usize {
        self.n_agents
    }

    /// Whether the communication channel is present.
    pub fn sharing_enabled(&self) -> bool {
        self.comm.is_some()
    }

    /// Fail fast when the supplied policy does not match the heads this
    /// model was built with.
    ///
    /// Head widths alone can collide across kinds (four logits vs a 2-D
    /// mean/log-std pair), so the action width is checked as well.
    pub fn check_policy_compat<A: ActionPolicy<B>>(
        &self,
        policy: &A,
    ) -> Result<(), ConfigurationError> {
        if policy.act_width() != self.act_width || policy.head_width() != self.head_width {
            return Err(ConfigurationError::PolicyWidthMismatch {
                model_act: self.act_width,
                model_head: self.head_width,
                policy_act: policy.act_width(),
                policy_head: policy.head_width(),
            });
        }
        Ok(())
    }

    /// Joint forward pass.
    ///
    /// `obs` is [batch, n_agents * obs_dim], agents in layout order.
    /// `policy` interprets the raw head outputs; its head width must
    /// match the kind the model was built with.
    pub fn forward<A: ActionPolicy<B>>(
        &self,
        policy: &A,
        obs: Tensor<B, 2>,
    ) -> JointForwardOutput<B, A> {
        let layout = self.layout();
        let batch = obs.dims()[0];
        debug_assert_eq!(obs.dims()[1], layout.joint_obs_len());
        debug_assert_eq!(policy.head_width(), self.head_width);

        let latents: Vec<Tensor<B, 2>> = (0..self.n_agents)
            .map(|i| {
                let range = layout.obs_range(i);
                let agent_obs = obs.clone().slice([0..batch, range]);
                self.encoders[i].forward(agent_obs)
            })
            .collect();

        // Residual mixing: each head sees its own latent plus the shared
        // channel's view of the whole team. The residual keeps the
        // agent-local path intact while the channel is still untrained.
        let head_inputs: Vec<Tensor<B, 2>> = match &self.comm {
            Some(comm) => {
                let mixed = comm.forward(latents.clone());
                latents
                    .into_iter()
                    .zip(mixed)
                    .map(|(latent, m)| latent + m)
                    .collect()
            }
            None => latents,
        };

        let policies = head_inputs
            .iter()
            .enumerate()
            .map(|(i, h)| {
                let params = self.policy_heads[i].forward(h.clone());
                policy.create_output(params)
            })
            .collect();

        let value_columns: Vec<Tensor<B, 2>> = head_inputs
            .iter()
            .enumerate()
            .map(|(i, h)| self.value_heads[i].forward(h.clone()))
            .collect();
        let values = Tensor::cat(value_columns, 1);

        JointForwardOutput { policies, values }
    }

    /// Single-step inference for rollout collection.
    ///
    /// Returns (per-agent actions, per-agent log_probs, per-agent values),
    /// all detached scalars.
    pub fn act<A: ActionPolicy<B>>(
        &self,
        policy: &A,
        joint_obs: &[f32],
        device: &B::Device,
    ) -> (Vec<A::Action>, Vec<f32>, Vec<f32>) {
        let joint_obs_len = self.n_agents * self.obs_dim;
        debug_assert_eq!(joint_obs.len(), joint_obs_len);

        let obs: Tensor<B, 2> =
            Tensor::<B, 1>::from_floats(joint_obs, device).reshape([1, joint_obs_len]);
        let output = self.forward(policy, obs);

        let mut actions = Vec::with_capacity(self.n_agents);
        let mut log_probs = Vec::with_capacity(self.n_agents);
        for (mut agent_actions, mut agent_lps) in output.sample_actions(device) {
            actions.push(agent_actions.remove(0));
            log_probs.push(agent_lps.remove(0));
        }

        let values_data = output.values.into_data();
        let values = values_data
            .as_slice::<f32>()
            .expect("values slice")
            .to_vec();

        (actions, log_probs, values)
    }
}
