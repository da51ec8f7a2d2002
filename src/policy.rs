//! Per-agent action policy abstractions.
//!
//! Two parameterizations, one interface:
//! - [`DiscretePolicy`] / [`DiscretePolicyOutput`]: categorical logits over
//!   a fixed set of moves (4 grid directions by default).
//! - [`ContinuousPolicy`] / [`ContinuousPolicyOutput`]: diagonal Gaussian
//!   over an unbounded displacement vector, with a reparameterized sample
//!   and an exact log-density (both are required by the clipped-ratio
//!   policy loss).
//!
//! Outputs cover both uses of the model: detached sampling during rollout
//! collection and log-prob/entropy evaluation with gradient flow during
//! the update.

use burn::tensor::backend::Backend;
use burn::tensor::{activation::softmax, Distribution, Int, Tensor};
use std::fmt::Debug;

// Clamp bounds on log standard deviation to keep exp() well-behaved.
const LOG_STD_MIN: f32 = -20.0;
const LOG_STD_MAX: f32 = 2.0;

// ============================================================================
// ActionValue - scalar action representation
// ============================================================================

/// Action value in a form suitable for buffers and environment stepping.
pub trait ActionValue: Clone + Send + Sync + Debug + 'static {
    /// Number of floats in the flattened representation.
    fn width(&self) -> usize;

    /// Flatten for environment stepping and storage.
    fn as_floats(&self) -> Vec<f32>;

    /// Rebuild from a stored float slice.
    fn from_floats(data: &[f32]) -> Self;
}

/// Discrete action (single index).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscreteAction(pub u32);

impl ActionValue for DiscreteAction {
    fn width(&self) -> usize {
        1
    }

    fn as_floats(&self) -> Vec<f32> {
        vec![self.0 as f32]
    }

    fn from_floats(data: &[f32]) -> Self {
        Self(data[0] as u32)
    }
}

/// Continuous action (displacement vector).
#[derive(Debug, Clone, PartialEq)]
pub struct ContinuousAction(pub Vec<f32>);

impl ActionValue for ContinuousAction {
    fn width(&self) -> usize {
        self.0.len()
    }

    fn as_floats(&self) -> Vec<f32> {
        self.0.clone()
    }

    fn from_floats(data: &[f32]) -> Self {
        Self(data.to_vec())
    }
}

// ============================================================================
// PolicyOutput - model output for sampling and log prob
// ============================================================================

/// Distribution parameterization produced by one agent's policy head.
pub trait PolicyOutput<B: Backend>: Clone + Send + 'static {
    /// Action value type produced by sampling.
    type Action: ActionValue;

    /// Sample actions and their log probabilities (detached, for rollout
    /// collection).
    fn sample(&self, device: &B::Device) -> (Vec<Self::Action>, Vec<f32>);

    /// Exact log probability of given realized actions, with gradient
    /// flow back into the distribution parameters.
    fn log_prob(&self, actions: &[Self::Action], device: &B::Device) -> Tensor<B, 1>;

    /// Per-sample entropy, with gradient flow.
    fn entropy(&self) -> Tensor<B, 1>;
}

// ============================================================================
// Discrete policy output
// ============================================================================

/// Categorical distribution parameterized by unnormalized logits.
#[derive(Clone)]
pub struct DiscretePolicyOutput<B: Backend> {
    /// Unnormalized log probabilities: [batch, n_actions].
    pub logits: Tensor<B, 2>,
}

impl<B: Backend> DiscretePolicyOutput<B> {
    pub fn new(logits: Tensor<B, 2>) -> Self {
        Self { logits }
    }

    /// Probabilities (softmax of logits).
    pub fn probs(&self) -> Tensor<B, 2> {
        softmax(self.logits.clone(), 1)
    }

    pub fn n_actions(&self) -> usize {
        self.logits.dims()[1]
    }

    pub fn batch_size(&self) -> usize {
        self.logits.dims()[0]
    }
}

impl<B: Backend> PolicyOutput<B> for DiscretePolicyOutput<B> {
    type Action = DiscreteAction;

    fn sample(&self, _device: &B::Device) -> (Vec<Self::Action>, Vec<f32>) {
        let probs = self.probs();
        let probs_data = probs.to_data();
        let probs_slice: &[f32] = probs_data.as_slice().expect("probs slice");

        let batch_size = self.batch_size();
        let n_actions = self.n_actions();

        let mut actions = Vec::with_capacity(batch_size);
        let mut log_probs = Vec::with_capacity(batch_size);

        for i in 0..batch_size {
            // Inverse-CDF sampling over the categorical. The last action is
            // a fallback when float rounding leaves cumsum short of 1.
            let rand_val = fastrand::f32();
            let mut cumsum = 0.0;
            let mut selected = (n_actions - 1) as u32;

            for a in 0..n_actions {
                cumsum += probs_slice[i * n_actions + a];
                if rand_val < cumsum || a == n_actions - 1 {
                    selected = a as u32;
                    break;
                }
            }

            let prob = probs_slice[i * n_actions + selected as usize];
            actions.push(DiscreteAction(selected));
            log_probs.push((prob + 1e-8).ln());
        }

        (actions, log_probs)
    }

    fn log_prob(&self, actions: &[Self::Action], device: &B::Device) -> Tensor<B, 1> {
        let batch_size = actions.len();
        let probs = self.probs();

        let action_indices: Vec<i32> = actions.iter().map(|a| a.0 as i32).collect();
        let actions_tensor: Tensor<B, 1, Int> =
            Tensor::from_ints(action_indices.as_slice(), device);
        let actions_2d: Tensor<B, 2, Int> = actions_tensor.reshape([batch_size, 1]);

        let selected_probs = probs.gather(1, actions_2d);
        let selected_probs_1d: Tensor<B, 1> = selected_probs.flatten(0, 1);

        (selected_probs_1d + 1e-8).log()
    }

    fn entropy(&self) -> Tensor<B, 1> {
        let probs = self.probs();
        let log_probs = (probs.clone() + 1e-8).log();
        // H = -sum(p * log(p))
        let neg_entropy: Tensor<B, 2> = (probs * log_probs).sum_dim(1);
        -neg_entropy.flatten(0, 1)
    }
}

// ============================================================================
// Continuous policy output
// ============================================================================

/// Diagonal Gaussian over an unbounded displacement.
///
/// No squashing: grid displacements are unbounded in the policy
/// parameterization, so the Gaussian log-density is exact without a
/// change-of-variables correction.
#[derive(Clone)]
pub struct ContinuousPolicyOutput<B: Backend> {
    /// Mean: [batch, action_dim].
    pub mean: Tensor<B, 2>,
    /// Log standard deviation: [batch, action_dim].
    pub log_std: Tensor<B, 2>,
}

impl<B: Backend> ContinuousPolicyOutput<B> {
    pub fn new(mean: Tensor<B, 2>, log_std: Tensor<B, 2>) -> Self {
        Self { mean, log_std }
    }

    pub fn action_dim(&self) -> usize {
        self.mean.dims()[1]
    }

    pub fn batch_size(&self) -> usize {
        self.mean.dims()[0]
    }
}

/// Reparameterized sample from a diagonal Gaussian.
///
/// Returns `(samples, log_probs)`:
/// - samples: [batch, action_dim], `mean + std * noise`
/// - log_probs: [batch], exact density, summed over dimensions
pub fn sample_gaussian<B: Backend>(
    mean: Tensor<B, 2>,
    log_std: Tensor<B, 2>,
) -> (Tensor<B, 2>, Tensor<B, 1>) {
    let device = mean.device();
    let dims = mean.dims();

    let log_std = log_std.clamp(LOG_STD_MIN, LOG_STD_MAX);
    let std = log_std.clone().exp();

    let noise: Tensor<B, 2> =
        Tensor::random([dims[0], dims[1]], Distribution::Normal(0.0, 1.0), &device);

    // Reparameterization: sample = mean + std * noise
    let samples = mean.clone() + std * noise.clone();

    // log N(x; mu, sigma) = -0.5 * ((x - mu)/sigma)^2 - log(sigma) - 0.5 * log(2*pi)
    let log_2pi = (2.0 * std::f32::consts::PI).ln();
    let log_prob_per_dim: Tensor<B, 2> =
        -(noise.powf_scalar(2.0) * 0.5) - log_std - 0.5 * log_2pi;
    let log_probs: Tensor<B, 1> = log_prob_per_dim.sum_dim(1).flatten(0, 1);

    (samples, log_probs)
}

/// Exact log density of `actions` under a diagonal Gaussian.
pub fn log_prob_gaussian<B: Backend>(
    actions: Tensor<B, 2>,
    mean: Tensor<B, 2>,
    log_std: Tensor<B, 2>,
) -> Tensor<B, 1> {
    let log_std = log_std.clamp(LOG_STD_MIN, LOG_STD_MAX);
    let std = log_std.clone().exp();

    let normalized = (actions - mean) / std;
    let log_2pi = (2.0 * std::f32::consts::PI).ln();
    let log_prob_per_dim: Tensor<B, 2> =
        -(normalized.powf_scalar(2.0) * 0.5) - log_std - 0.5 * log_2pi;
    log_prob_per_dim.sum_dim(1).flatten(0, 1)
}

/// Analytical entropy of a diagonal Gaussian.
///
/// H = 0.5 * D * (1 + log(2*pi)) + sum(log_std)
pub fn entropy_gaussian<B: Backend>(log_std: Tensor<B, 2>) -> Tensor<B, 1> {
    let action_dim = log_std.dims()[1] as f32;
    let log_2pi = (2.0 * std::f32::consts::PI).ln();
    let constant = 0.5 * action_dim * (1.0 + log_2pi);

    let log_std = log_std.clamp(LOG_STD_MIN, LOG_STD_MAX);
    let sum_log_std: Tensor<B, 1> = log_std.sum_dim(1).flatten(0, 1);

    sum_log_std.add_scalar(constant)
}

impl<B: Backend> PolicyOutput<B> for ContinuousPolicyOutput<B> {
    type Action = ContinuousAction;

    fn sample(&self, _device: &B::Device) -> (Vec<Self::Action>, Vec<f32>) {
        let (samples, log_probs_tensor) =
            sample_gaussian(self.mean.clone(), self.log_std.clone());

        let samples_data = samples.to_data();
        let samples_slice: &[f32] = samples_data.as_slice().expect("samples slice");
        let log_probs_data = log_probs_tensor.to_data();
        let log_probs_slice: &[f32] = log_probs_data.as_slice().expect("log_probs slice");

        let batch_size = self.batch_size();
        let action_dim = self.action_dim();

        let mut actions = Vec::with_capacity(batch_size);
        let mut log_probs = Vec::with_capacity(batch_size);

        for i in 0..batch_size {
            let action_vec: Vec<f32> = (0..action_dim)
                .map(|j| samples_slice[i * action_dim + j])
                .collect();
            actions.push(ContinuousAction(action_vec));
            log_probs.push(log_probs_slice[i]);
        }

        (actions, log_probs)
    }

    fn log_prob(&self, actions: &[Self::Action], device: &B::Device) -> Tensor<B, 1> {
        let batch_size = actions.len();
        let action_dim = self.action_dim();

        let mut action_floats = Vec::with_capacity(batch_size * action_dim);
        for action in actions {
            action_floats.extend_from_slice(&action.0);
        }

        let action_tensor: Tensor<B, 2> =
            Tensor::<B, 1>::from_floats(action_floats.as_slice(), device)
                .reshape([batch_size, action_dim]);

        log_prob_gaussian(action_tensor, self.mean.clone(), self.log_std.clone())
    }

    fn entropy(&self) -> Tensor<B, 1> {
        entropy_gaussian(self.log_std.clone())
    }
}

// ============================================================================
// ActionPolicy - main abstraction
// ============================================================================

/// Action policy configuration shared by all agents.
///
/// Bridges the model's raw head output (one parameter tensor per agent)
/// and the distribution objects above.
pub trait ActionPolicy<B: Backend>: Clone + Send + Sync + Debug + 'static {
    /// Action value type for environment interaction.
    type Action: ActionValue;

    /// Distribution type produced from head parameters.
    type Output: PolicyOutput<B, Action = Self::Action>;

    /// Width of one agent's slice in the flattened joint action.
    fn act_width(&self) -> usize;

    /// Output width of one agent's policy head.
    /// - Discrete: n_actions (logits)
    /// - Continuous: 2 * action_dim (mean then log_std)
    fn head_width(&self) -> usize;

    /// Interpret a head output tensor [batch, head_width] as a
    /// distribution.
    fn create_output(&self, params: Tensor<B, 2>) -> Self::Output;

    /// Rebuild typed actions from one agent's stored slices.
    fn actions_from_slices(&self, slices: &[Vec<f32>]) -> Vec<Self::Action> {
        slices
            .iter()
            .map(|s| Self::Action::from_floats(s))
            .collect()
    }
}

/// Categorical policy over `n_actions` discrete moves.
#[derive(Debug, Clone, Copy)]
pub struct DiscretePolicy {
    pub n_actions: usize,
}

impl DiscretePolicy {
    pub fn new(n_actions: usize) -> Self {
        Self { n_actions }
    }
}

impl<B: Backend> ActionPolicy<B> for DiscretePolicy {
    type Action = DiscreteAction;
    type Output = DiscretePolicyOutput<B>;

    fn act_width(&self) -> usize {
        1
    }

    fn head_width(&self) -> usize {
        self.n_actions
    }

    fn create_output(&self, params: Tensor<B, 2>) -> Self::Output {
        DiscretePolicyOutput::new(params)
    }
}

/// Diagonal Gaussian policy over an `action_dim`-dimensional displacement.
#[derive(Debug, Clone, Copy)]
pub struct ContinuousPolicy {
    pub action_dim: usize,
}

impl ContinuousPolicy {
    pub fn new(action_dim: usize) -> Self {
        Self { action_dim }
    }
}

impl<B: Backend> ActionPolicy<B> for ContinuousPolicy {
    type Action = ContinuousAction;
    type Output = ContinuousPolicyOutput<B>;

    fn act_width(&self) -> usize {
        self.action_dim
    }

    fn head_width(&self) -> usize {
        2 * self.action_dim
    }

    fn create_output(&self, params: Tensor<B, 2>) -> Self::Output {
        let batch = params.dims()[0];
        let mean = params.clone().slice([0..batch, 0..self.action_dim]);
        let log_std = params.slice([0..batch, self.action_dim..2 * self.action_dim]);
        ContinuousPolicyOutput::new(mean, log_std)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type B = NdArray<f32>;

    #[test]
    fn test_discrete_action_round_trip() {
        let action = DiscreteAction(3);
        assert_eq!(action.width(), 1);
        assert_eq!(action.as_floats(), vec![3.0]);
        assert_eq!(DiscreteAction::from_floats(&[3.0]), action);
    }

    #[test]
    fn test_continuous_action_round_trip() {
        let action = ContinuousAction(vec![0.5, -0.3]);
        assert_eq!(action.width(), 2);
        assert_eq!(ContinuousAction::from_floats(&[0.5, -0.3]), action);
    }

    #[test]
    fn test_discrete_sample_in_range() {
        let device = Default::default();
        let logits: Tensor<B, 2> =
            Tensor::from_floats([[1.0, 2.0, 3.0, 0.5], [0.5, 3.0, 2.0, 1.0]], &device);
        let output = DiscretePolicyOutput::new(logits);

        let (actions, log_probs) = output.sample(&device);
        assert_eq!(actions.len(), 2);
        assert_eq!(log_probs.len(), 2);
        for action in &actions {
            assert!(action.0 < 4);
        }
        for lp in &log_probs {
            assert!(*lp <= 0.0);
        }
    }

    #[test]
    fn test_discrete_log_prob_matches_softmax() {
        let device = Default::default();
        // Uniform logits: log prob of any action is ln(1/4).
        let logits: Tensor<B, 2> = Tensor::from_floats([[0.0, 0.0, 0.0, 0.0]], &device);
        let output = DiscretePolicyOutput::new(logits);

        let lp = output.log_prob(&[DiscreteAction(2)], &device);
        let lp_val = lp.into_data().as_slice::<f32>().unwrap()[0];
        assert!((lp_val - (0.25f32).ln()).abs() < 1e-4);
    }

    #[test]
    fn test_discrete_entropy_ordering() {
        let device = Default::default();
        let uniform = DiscretePolicyOutput::<B>::new(Tensor::from_floats(
            [[1.0, 1.0, 1.0, 1.0]],
            &device,
        ));
        let peaked = DiscretePolicyOutput::<B>::new(Tensor::from_floats(
            [[10.0, 0.0, 0.0, 0.0]],
            &device,
        ));

        let h_uniform = uniform.entropy().into_data().as_slice::<f32>().unwrap()[0];
        let h_peaked = peaked.entropy().into_data().as_slice::<f32>().unwrap()[0];
        assert!(h_uniform > h_peaked);
    }

    #[test]
    fn test_gaussian_log_prob_at_mean() {
        let device = Default::default();
        // At the mean with sigma = 1: log density = -0.5 * log(2*pi) per dim.
        let mean: Tensor<B, 2> = Tensor::from_floats([[0.0, 0.0]], &device);
        let log_std: Tensor<B, 2> = Tensor::from_floats([[0.0, 0.0]], &device);
        let actions: Tensor<B, 2> = Tensor::from_floats([[0.0, 0.0]], &device);

        let lp = log_prob_gaussian(actions, mean, log_std);
        let lp_val = lp.into_data().as_slice::<f32>().unwrap()[0];
        let expected = -(2.0 * std::f32::consts::PI).ln();
        assert!((lp_val - expected).abs() < 1e-4);
    }

    #[test]
    fn test_gaussian_sample_log_prob_consistency() {
        let device = Default::default();
        let mean: Tensor<B, 2> = Tensor::from_floats([[0.5, -0.5]], &device);
        let log_std: Tensor<B, 2> = Tensor::from_floats([[-1.0, -1.0]], &device);
        let output = ContinuousPolicyOutput::new(mean, log_std);

        let (actions, sampled_lp) = output.sample(&device);
        let evaluated_lp = output.log_prob(&actions, &device);
        let evaluated = evaluated_lp.into_data().as_slice::<f32>().unwrap()[0];
        assert!((sampled_lp[0] - evaluated).abs() < 1e-3);
    }

    #[test]
    fn test_continuous_create_output_splits_params() {
        let device = Default::default();
        let policy = ContinuousPolicy::new(2);
        let params: Tensor<B, 2> =
            Tensor::from_floats([[1.0, 2.0, -0.5, -0.6]], &device);

        let output = <ContinuousPolicy as ActionPolicy<B>>::create_output(&policy, params);
        let mean: Vec<f32> = output
            .mean
            .into_data()
            .as_slice::<f32>()
            .unwrap()
            .to_vec();
        let log_std: Vec<f32> = output
            .log_std
            .into_data()
            .as_slice::<f32>()
            .unwrap()
            .to_vec();
        assert_eq!(mean, vec![1.0, 2.0]);
        assert_eq!(log_std, vec![-0.5, -0.6]);
    }

    #[test]
    fn test_head_widths() {
        let d = DiscretePolicy::new(4);
        assert_eq!(<DiscretePolicy as ActionPolicy<B>>::head_width(&d), 4);
        assert_eq!(<DiscretePolicy as ActionPolicy<B>>::act_width(&d), 1);

        let c = ContinuousPolicy::new(2);
        assert_eq!(<ContinuousPolicy as ActionPolicy<B>>::head_width(&c), 4);
        assert_eq!(<ContinuousPolicy as ActionPolicy<B>>::act_width(&c), 2);
    }
}
