//! Per-agent Generalized Advantage Estimation.
//!
//! A_t = δ_t + γλ A_{t+1}, with δ_t = r_t + γ V(s_{t+1}) - V(s_t).
//!
//! Episode boundaries differ by kind:
//! - terminal: the episode truly ended, bootstrap value is zero
//! - truncation / horizon cut: the episode would have continued, so the
//!   agent bootstraps from its own value estimate at the cut
//!
//! Every advantage and return is checked for finiteness; a NaN or infinity
//! poisons the whole batch, so estimation fails loudly instead.

use crate::error::NumericInstabilityError;

/// Compute GAE advantages and returns for one agent's trajectory.
///
/// `terminals` and `truncations` are team-level flags shared by all
/// agents; `last_value` is this agent's value estimate past the final
/// step, used only when the rollout ends mid-episode without a flag.
///
/// Returns `(advantages, returns)`, both [T].
pub fn compute_agent_gae(
    rewards: &[f32],
    values: &[f32],
    terminals: &[bool],
    truncations: &[bool],
    last_value: f32,
    gamma: f32,
    gae_lambda: f32,
) -> Result<(Vec<f32>, Vec<f32>), NumericInstabilityError> {
    let n = rewards.len();
    debug_assert_eq!(values.len(), n);
    debug_assert_eq!(terminals.len(), n);
    debug_assert_eq!(truncations.len(), n);

    let mut advantages = vec![0.0f32; n];
    let mut returns = vec![0.0f32; n];

    let mut gae = 0.0f32;
    let mut next_value = last_value;

    for t in (0..n).rev() {
        if !rewards[t].is_finite() {
            return Err(NumericInstabilityError::new(t, rewards[t], "reward"));
        }
        if !values[t].is_finite() {
            return Err(NumericInstabilityError::new(t, values[t], "value"));
        }

        // Episode boundaries stop the recursion: nothing after the
        // boundary may leak into this step's advantage.
        let bootstrap = if terminals[t] {
            gae = 0.0;
            0.0
        } else if truncations[t] {
            gae = 0.0;
            values[t]
        } else {
            next_value
        };

        let delta = rewards[t] + gamma * bootstrap - values[t];
        gae = delta + gamma * gae_lambda * gae;

        if !gae.is_finite() {
            return Err(NumericInstabilityError::new(t, gae, "advantage"));
        }

        advantages[t] = gae;
        returns[t] = gae + values[t];
        if !returns[t].is_finite() {
            return Err(NumericInstabilityError::new(t, returns[t], "return"));
        }

        next_value = values[t];
    }

    Ok((advantages, returns))
}

/// Normalize one agent's advantages to zero mean and unit variance.
///
/// # Edge Cases
///
/// - Empty slice: no-op
/// - Single element: sets to 0.0 (no meaningful variance)
/// - Near-zero variance: all values collapse to ~0; logged, since a
///   constant-advantage batch usually means a degenerate reward stream
pub fn normalize_advantages(advantages: &mut [f32]) {
    if advantages.is_empty() {
        return;
    }

    if advantages.len() == 1 {
        advantages[0] = 0.0;
        return;
    }

    let n = advantages.len() as f32;
    let mean = advantages.iter().sum::<f32>() / n;
    // Population variance with epsilon for stability
    let variance = advantages.iter().map(|a| (a - mean).powi(2)).sum::<f32>() / n;

    if variance < 1e-12 {
        log::warn!(
            "advantage batch has near-zero variance (mean {:.4}, {} steps)",
            mean,
            advantages.len()
        );
    }

    let std = (variance + 1e-8).sqrt();
    for a in advantages.iter_mut() {
        *a = (*a - mean) / std;
    }
}
