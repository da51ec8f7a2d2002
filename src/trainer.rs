//! Batch post-processing: from joint step records to a single
//! differentiable team loss.
//!
//! The pipeline is recovery → per-agent GAE → one joint forward pass →
//! per-agent PPO terms → sum. All agents are evaluated in the same
//! forward pass so that the communication channel sits in every agent's
//! computation graph; the returned loss needs exactly one backward().

use burn::tensor::backend::AutodiffBackend;
use burn::tensor::Tensor;

use crate::config::MultiPpoConfig;
use crate::credit::{compute_agent_gae, normalize_advantages, recover_agent_trajectories};
use crate::error::{DataIntegrityError, PostprocessError};
use crate::joint::JointStepRecord;
use crate::loss::{agent_ppo_loss, combine_agent_losses, MultiAgentLoss};
use crate::model::CommNet;
use crate::policy::{ActionPolicy, PolicyOutput};

/// Compute the combined team loss for one batch of joint step records.
///
/// `last_values` holds each agent's bootstrap value estimate past the
/// final step, one entry per agent; it is only consulted when the batch
/// ends mid-episode without a terminal or truncation flag (horizon cut).
///
/// Fails on any contract violation in the batch and on non-finite
/// advantages; the caller drops the batch in either case.
pub fn compute_batch_loss<B, A>(
    model: &CommNet<B>,
    policy: &A,
    records: &[JointStepRecord],
    last_values: &[f32],
    config: &MultiPpoConfig,
    device: &B::Device,
) -> Result<MultiAgentLoss<B>, PostprocessError>
where
    B: AutodiffBackend,
    A: ActionPolicy<B>,
{
    model.check_policy_compat(policy)?;

    let layout = model.layout();
    // One bootstrap value per agent, always; a short slice would silently
    // turn a horizon cut into a terminal for the missing agents.
    if last_values.len() != layout.n_agents {
        return Err(DataIntegrityError::LengthMismatch {
            field: "last_values",
            expected: layout.n_agents,
            got: last_values.len(),
        }
        .into());
    }

    let batch = recover_agent_trajectories(&layout, records)?;
    let steps = batch.len();

    // Advantage estimation runs per agent on its own reward stream.
    let mut all_advantages = Vec::with_capacity(layout.n_agents);
    let mut all_returns = Vec::with_capacity(layout.n_agents);
    for trajectory in &batch.trajectories {
        let last_value = last_values[trajectory.agent];
        let (mut advantages, returns) = compute_agent_gae(
            &trajectory.rewards,
            &trajectory.values,
            &batch.terminals,
            &batch.truncations,
            last_value,
            config.gamma,
            config.gae_lambda,
        )
        .map_err(|e| e.with_agent(trajectory.agent))?;

        if config.normalize_advantages {
            normalize_advantages(&mut advantages);
        }
        all_advantages.push(advantages);
        all_returns.push(returns);
    }

    // One joint forward pass over the whole batch.
    let mut joint_obs = Vec::with_capacity(steps * layout.joint_obs_len());
    for record in records {
        joint_obs.extend_from_slice(&record.observations);
    }
    let obs: Tensor<B, 2> = Tensor::<B, 1>::from_floats(joint_obs.as_slice(), device)
        .reshape([steps, layout.joint_obs_len()]);
    let output = model.forward(policy, obs);

    let mut losses = Vec::with_capacity(layout.n_agents);
    let mut terms = Vec::with_capacity(layout.n_agents);

    for trajectory in &batch.trajectories {
        let agent = trajectory.agent;
        let actions = policy.actions_from_slices(&trajectory.actions);

        let log_probs = output.policies[agent].log_prob(&actions, device);
        let entropy = output.policies[agent].entropy();
        let values = output.agent_values(agent);

        let old_log_probs: Tensor<B, 1> =
            Tensor::from_floats(trajectory.log_probs.as_slice(), device);
        let old_values: Tensor<B, 1> =
            Tensor::from_floats(trajectory.values.as_slice(), device);
        let advantages: Tensor<B, 1> =
            Tensor::from_floats(all_advantages[agent].as_slice(), device);
        let returns: Tensor<B, 1> =
            Tensor::from_floats(all_returns[agent].as_slice(), device);

        let (loss, term) = agent_ppo_loss(
            agent,
            log_probs,
            old_log_probs,
            values,
            old_values,
            advantages,
            returns,
            entropy,
            config.clip_ratio,
            config.vf_coef,
            config.entropy_coef,
            config.clip_value,
        );
        losses.push(loss);
        terms.push(term);
    }

    Ok(combine_agent_losses(losses, terms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ActionSpaceKind;
    use crate::error::ConfigurationError;
    use crate::model::CommNetConfig;
    use crate::policy::{ContinuousPolicy, DiscretePolicy};
    use burn::backend::{Autodiff, NdArray};
    use std::collections::HashMap;

    type B = Autodiff<NdArray<f32>>;

    fn test_config() -> MultiPpoConfig {
        MultiPpoConfig::new()
            .with_n_agents(3)
            .with_obs_dim(4)
            .with_action(ActionSpaceKind::Discrete { n_actions: 4 })
            .with_hidden_dim(8)
            .with_comm_dim(6)
    }

    fn test_model(config: &MultiPpoConfig) -> CommNet<B> {
        CommNetConfig::from(config).init(&Default::default())
    }

    fn test_policy() -> DiscretePolicy {
        DiscretePolicy::new(4)
    }

    fn make_record(config: &MultiPpoConfig, rewards: &[(usize, f32)], terminal: bool) -> JointStepRecord {
        let layout = config.layout();
        JointStepRecord {
            observations: (0..layout.joint_obs_len()).map(|i| i as f32 * 0.1).collect(),
            actions: vec![1.0; layout.joint_act_len()],
            team_reward: rewards.iter().map(|(_, r)| r).sum(),
            agent_rewards: rewards.iter().copied().collect(),
            terminal,
            truncated: false,
            log_probs: vec![-1.4; layout.n_agents],
            values: vec![0.1; layout.n_agents],
        }
    }

    #[test]
    fn test_batch_loss_is_finite() {
        let config = test_config();
        let model = test_model(&config);
        let device = Default::default();

        let records = vec![
            make_record(&config, &[(0, 0.5), (1, -0.2), (2, 1.0)], false),
            make_record(&config, &[(0, -1.0), (1, 0.0), (2, -2.0)], true),
        ];

        let loss =
            compute_batch_loss(&model, &test_policy(), &records, &[0.0; 3], &config, &device).unwrap();
        assert!(loss.total_scalar().is_finite());
        assert_eq!(loss.per_agent.len(), 3);
        for term in &loss.per_agent {
            assert!(term.total.is_finite());
        }
    }

    #[test]
    fn test_batch_loss_is_differentiable() {
        let config = test_config();
        let model = test_model(&config);
        let device = Default::default();

        let records =
            vec![make_record(&config, &[(0, 1.0), (1, 0.5), (2, -0.5)], true)];
        let loss =
            compute_batch_loss(&model, &test_policy(), &records, &[0.0; 3], &config, &device).unwrap();

        // One backward pass over the summed loss must succeed.
        let _grads = loss.total.backward();
    }

    #[test]
    fn test_malformed_reward_channel_rejected() {
        let config = test_config();
        let model = test_model(&config);
        let device = Default::default();

        // Agent 1 missing from the channel.
        let bad = make_record(&config, &[(0, 1.0), (2, -0.5)], false);
        let err = compute_batch_loss(&model, &test_policy(), &[bad], &[0.0; 3], &config, &device)
            .unwrap_err();
        assert!(matches!(err, PostprocessError::Data(_)));
    }

    #[test]
    fn test_empty_batch_rejected() {
        let config = test_config();
        let model = test_model(&config);
        let device = Default::default();

        let err =
            compute_batch_loss(&model, &test_policy(), &[], &[0.0; 3], &config, &device).unwrap_err();
        assert!(matches!(
            err,
            PostprocessError::Data(crate::error::DataIntegrityError::EmptyBatch)
        ));
    }

    #[test]
    fn test_short_last_values_rejected() {
        let config = test_config();
        let model = test_model(&config);
        let device = Default::default();

        // Horizon cut: no terminal or truncation flag on the final step,
        // so the bootstrap values are load-bearing and must be complete.
        let records = vec![make_record(&config, &[(0, 1.0), (1, 0.0), (2, -1.0)], false)];
        let err = compute_batch_loss(&model, &test_policy(), &records, &[], &config, &device)
            .unwrap_err();
        assert!(matches!(
            err,
            PostprocessError::Data(DataIntegrityError::LengthMismatch {
                field: "last_values",
                expected: 3,
                got: 0,
            })
        ));
    }

    #[test]
    fn test_mismatched_policy_rejected() {
        let config = test_config();
        let model = test_model(&config);
        let device = Default::default();

        // Four discrete logits and a 2-D mean/log-std pair have the same
        // head width; the kind mismatch must still fail before the
        // forward pass.
        let records = vec![make_record(&config, &[(0, 0.0), (1, 0.0), (2, 0.0)], true)];
        let err = compute_batch_loss(
            &model,
            &ContinuousPolicy::new(2),
            &records,
            &[0.0; 3],
            &config,
            &device,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            PostprocessError::Config(ConfigurationError::PolicyWidthMismatch { .. })
        ));
    }

    #[test]
    fn test_nan_value_rejected_with_agent_index() {
        let config = test_config();
        let model = test_model(&config);
        let device = Default::default();

        let mut bad = make_record(&config, &[(0, 0.0), (1, 0.0), (2, 0.0)], false);
        bad.values[1] = f32::NAN;

        let err = compute_batch_loss(&model, &test_policy(), &[bad], &[0.0; 3], &config, &device)
            .unwrap_err();
        match err {
            PostprocessError::Numeric(e) => assert_eq!(e.agent, Some(1)),
            other => panic!("expected numeric error, got {:?}", other),
        }
    }

    #[test]
    fn test_agent_rewards_map_preserved() {
        // HashMap literal ordering must not matter.
        let config = test_config();
        let layout = config.layout();
        let mut rewards = HashMap::new();
        rewards.insert(2, -2.0);
        rewards.insert(0, -1.0);
        rewards.insert(1, 0.0);

        let record = JointStepRecord {
            observations: vec![0.0; layout.joint_obs_len()],
            actions: vec![0.0; layout.joint_act_len()],
            team_reward: -3.0,
            agent_rewards: rewards,
            terminal: true,
            truncated: false,
            log_probs: vec![-1.4; 3],
            values: vec![0.0; 3],
        };

        let batch = recover_agent_trajectories(&layout, &[record]).unwrap();
        assert_eq!(batch.trajectories[0].rewards, vec![-1.0]);
        assert_eq!(batch.trajectories[1].rewards, vec![0.0]);
        assert_eq!(batch.trajectories[2].rewards, vec![-2.0]);
    }
}
