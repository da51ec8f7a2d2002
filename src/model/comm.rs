//! Differentiable inter-agent communication channel.
//!
//! A two-layer bottleneck over the concatenation of all agents' latents:
//! every agent's mixed latent depends on every agent's encoder output, so
//! gradients of one agent's loss reach the other agents' encoders through
//! this module and nowhere else.

use burn::module::Module;
use burn::nn::{Linear, LinearConfig};
use burn::tensor::activation::relu;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// Configuration for [`CommChannel`].
#[derive(Debug, Clone, Copy)]
pub struct CommChannelConfig {
    /// Number of agents whose latents are mixed.
    pub n_agents: usize,
    /// Per-agent latent size.
    pub hidden_dim: usize,
    /// Width of the shared bottleneck.
    pub comm_dim: usize,
}

impl CommChannelConfig {
    pub fn new(n_agents: usize, hidden_dim: usize, comm_dim: usize) -> Self {
        Self {
            n_agents,
            hidden_dim,
            comm_dim,
        }
    }

    /// Initialize the channel on the given device.
    pub fn init<B: Backend>(&self, device: &B::Device) -> CommChannel<B> {
        let joint_dim = self.n_agents * self.hidden_dim;
        CommChannel {
            fc_in: LinearConfig::new(joint_dim, self.comm_dim).init(device),
            fc_out: LinearConfig::new(self.comm_dim, joint_dim).init(device),
            n_agents: self.n_agents,
            hidden_dim: self.hidden_dim,
        }
    }
}

/// The mixing step: concat latents, compress through the bottleneck,
/// expand back, split per agent.
#[derive(Module, Debug)]
pub struct CommChannel<B: Backend> {
    fc_in: Linear<B>,
    fc_out: Linear<B>,
    #[module(skip)]
    n_agents: usize,
    #[module(skip)]
    hidden_dim: usize,
}

impl<B: Backend> CommChannel<B> {
    /// Mix per-agent latents through the shared bottleneck.
    ///
    /// Input and output are both `n_agents` tensors of shape
    /// [batch, hidden_dim]. Output slice `i` is a function of ALL input
    /// slices, which is the entire point.
    pub fn forward(&self, latents: Vec<Tensor<B, 2>>) -> Vec<Tensor<B, 2>> {
        debug_assert_eq!(latents.len(), self.n_agents);
        let batch = latents[0].dims()[0];

        let joint = Tensor::cat(latents, 1);
        let mixed = relu(self.fc_out.forward(relu(self.fc_in.forward(joint))));

        (0..self.n_agents)
            .map(|i| {
                mixed.clone().slice([
                    0..batch,
                    i * self.hidden_dim..(i + 1) * self.hidden_dim,
                ])
            })
            .collect()
    }
}
