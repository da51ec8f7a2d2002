//! PPO loss terms and the multi-agent combiner.
//!
//! Each agent contributes one clipped-surrogate term built from its own
//! advantages; the combined objective is the SUM of the per-agent terms,
//! not the mean. Summing keeps each agent's gradient magnitude independent
//! of the team size, and one backward pass over the sum routes each
//! agent's term through the shared communication channel into every other
//! agent's encoder.
//!
//! # Numerical Stability
//!
//! Importance ratios go through exp(log_ratio); the log ratio is clamped
//! to [-20, 20] first, limiting ratios to roughly [2e-9, 5e8].

use burn::tensor::{backend::AutodiffBackend, Tensor};

/// Maximum log ratio before exp() to prevent overflow.
const MAX_LOG_RATIO: f32 = 20.0;

/// PPO clipped surrogate loss for one agent.
///
/// L^CLIP = -E[min(r_t A_t, clip(r_t, 1-ε, 1+ε) A_t)]
/// with r_t = exp(log π(a|s) - log π_old(a|s)).
///
/// All inputs are [T]; `old_log_probs` and `advantages` are detached.
pub fn ppo_clip_loss<B: AutodiffBackend>(
    log_probs: Tensor<B, 1>,
    old_log_probs: Tensor<B, 1>,
    advantages: Tensor<B, 1>,
    clip_ratio: f32,
) -> Tensor<B, 1> {
    let log_ratio = log_probs - old_log_probs;
    let ratio = log_ratio.clamp(-MAX_LOG_RATIO, MAX_LOG_RATIO).exp();

    let clipped_ratio = ratio.clone().clamp(1.0 - clip_ratio, 1.0 + clip_ratio);

    let surr1 = ratio * advantages.clone();
    let surr2 = clipped_ratio * advantages;

    // Pessimistic bound, negated for minimization.
    -surr1.min_pair(surr2).mean()
}

/// Value function loss for one agent, optionally clipped (PPO2 style).
pub fn value_loss<B: AutodiffBackend>(
    values: Tensor<B, 1>,
    old_values: Tensor<B, 1>,
    returns: Tensor<B, 1>,
    clip_value: Option<f32>,
) -> Tensor<B, 1> {
    match clip_value {
        Some(clip) => {
            let values_clipped =
                old_values.clone() + (values.clone() - old_values).clamp(-clip, clip);

            let loss1 = (values - returns.clone()).powf_scalar(2.0);
            let loss2 = (values_clipped - returns).powf_scalar(2.0);

            // Conservative update: take the larger error.
            loss1.max_pair(loss2).mean()
        }
        None => (values - returns).powf_scalar(2.0).mean(),
    }
}

/// Scalar components of one agent's loss, extracted for logging.
#[derive(Debug, Clone, Copy)]
pub struct AgentLossTerms {
    pub agent: usize,
    pub policy_loss: f32,
    pub value_loss: f32,
    pub entropy: f32,
    pub total: f32,
}

/// One agent's complete PPO term:
/// policy_loss + vf_coef * value_loss - entropy_coef * entropy.
///
/// `entropy` is the per-sample entropy [T] from the agent's policy output.
/// Returns the differentiable term plus its scalar components.
#[allow(clippy::too_many_arguments)]
pub fn agent_ppo_loss<B: AutodiffBackend>(
    agent: usize,
    log_probs: Tensor<B, 1>,
    old_log_probs: Tensor<B, 1>,
    values: Tensor<B, 1>,
    old_values: Tensor<B, 1>,
    advantages: Tensor<B, 1>,
    returns: Tensor<B, 1>,
    entropy: Tensor<B, 1>,
    clip_ratio: f32,
    vf_coef: f32,
    entropy_coef: f32,
    clip_value: Option<f32>,
) -> (Tensor<B, 1>, AgentLossTerms) {
    let policy = ppo_clip_loss(log_probs, old_log_probs, advantages, clip_ratio);
    let vf = value_loss(values, old_values, returns, clip_value);
    let ent = entropy.mean();

    let policy_val = scalar(&policy);
    let vf_val = scalar(&vf);
    let ent_val = scalar(&ent);

    let total = policy + vf.mul_scalar(vf_coef) - ent.mul_scalar(entropy_coef);
    let total_val = scalar(&total);

    let terms = AgentLossTerms {
        agent,
        policy_loss: policy_val,
        value_loss: vf_val,
        entropy: ent_val,
        total: total_val,
    };

    (total, terms)
}

/// Combined multi-agent loss: the sum of per-agent terms, still attached
/// to the computation graph, plus per-agent scalars for logging.
#[derive(Debug)]
pub struct MultiAgentLoss<B: AutodiffBackend> {
    /// Sum of all agents' terms. One backward() on this covers the team.
    pub total: Tensor<B, 1>,
    /// Per-agent components in agent order.
    pub per_agent: Vec<AgentLossTerms>,
}

impl<B: AutodiffBackend> MultiAgentLoss<B> {
    /// The combined loss as an f32 (for logging).
    pub fn total_scalar(&self) -> f32 {
        scalar(&self.total)
    }
}

/// Sum per-agent loss terms into the team objective.
///
/// Panics on an empty slice; the trainer rejects empty batches before
/// any loss is built.
pub fn combine_agent_losses<B: AutodiffBackend>(
    losses: Vec<Tensor<B, 1>>,
    terms: Vec<AgentLossTerms>,
) -> MultiAgentLoss<B> {
    debug_assert_eq!(losses.len(), terms.len());
    let mut iter = losses.into_iter();
    let first = iter.next().expect("at least one agent loss");
    let total = iter.fold(first, |acc, loss| acc + loss);

    MultiAgentLoss {
        total,
        per_agent: terms,
    }
}

fn scalar<B: AutodiffBackend>(t: &Tensor<B, 1>) -> f32 {
    t.clone().into_data().as_slice::<f32>().expect("scalar loss")[0]
}
