//! End-to-end tests over the full pipeline: rollout records through
//! recovery, advantage estimation, the joint forward pass, and one
//! backward pass on the summed loss.

use std::collections::HashMap;

use burn::backend::{Autodiff, NdArray};
use burn::module::AutodiffModule;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::tensor::Tensor;

use crate::config::{ActionSpaceKind, MultiPpoConfig};
use crate::credit::{compute_agent_gae, recover_agent_trajectories};
use crate::joint::JointStepRecord;
use crate::model::{CommNet, CommNetConfig};
use crate::policy::{DiscreteAction, DiscretePolicy, PolicyOutput};
use crate::trainer::compute_batch_loss;

type B = Autodiff<NdArray<f32>>;

const GAMMA: f32 = 0.99;
const LAMBDA: f32 = 0.95;

fn three_agent_config() -> MultiPpoConfig {
    MultiPpoConfig::new()
        .with_n_agents(3)
        .with_obs_dim(4)
        .with_action(ActionSpaceKind::Discrete { n_actions: 4 })
        .with_hidden_dim(8)
        .with_comm_dim(6)
        .with_gamma(GAMMA)
        .with_gae_lambda(LAMBDA)
}

fn make_model(config: &MultiPpoConfig, disable_sharing: bool) -> CommNet<B> {
    CommNetConfig::from(config)
        .with_disable_sharing(disable_sharing)
        .init(&Default::default())
}

fn make_policy() -> DiscretePolicy {
    DiscretePolicy::new(4)
}

fn step_record(
    config: &MultiPpoConfig,
    rewards: [f32; 3],
    values: [f32; 3],
    terminal: bool,
) -> JointStepRecord {
    let layout = config.layout();
    let agent_rewards: HashMap<usize, f32> =
        rewards.iter().copied().enumerate().collect();
    JointStepRecord {
        observations: (0..layout.joint_obs_len()).map(|i| i as f32 * 0.1).collect(),
        actions: vec![2.0; layout.joint_act_len()],
        team_reward: rewards.iter().sum(),
        agent_rewards,
        terminal,
        truncated: false,
        log_probs: vec![-1.4; 3],
        values: values.to_vec(),
    }
}

// Three agents, one terminal step, distinct rewards: each agent's return
// must equal its own reward regardless of the team scalar, and the
// advantage must be reward minus that agent's own value estimate.
#[test]
fn test_terminal_step_returns_are_per_agent() {
    let config = three_agent_config();
    let layout = config.layout();
    let record = step_record(&config, [-1.0, 0.0, -2.0], [0.3, 0.1, 0.5], true);

    let batch = recover_agent_trajectories(&layout, &[record]).unwrap();

    let expected_rewards = [-1.0f32, 0.0, -2.0];
    let behavior_values = [0.3f32, 0.1, 0.5];
    for agent in 0..3 {
        let trajectory = &batch.trajectories[agent];
        let (advantages, returns) = compute_agent_gae(
            &trajectory.rewards,
            &trajectory.values,
            &batch.terminals,
            &batch.truncations,
            0.0,
            GAMMA,
            LAMBDA,
        )
        .unwrap();

        assert!((returns[0] - expected_rewards[agent]).abs() < 1e-6);
        assert!(
            (advantages[0] - (expected_rewards[agent] - behavior_values[agent])).abs() < 1e-6
        );
    }
}

// Multi-step trajectory ending in a terminal: the per-agent recursion
// must match a hand-computed rollup of each agent's own reward stream.
#[test]
fn test_multi_step_per_agent_recursion() {
    let config = three_agent_config();
    let layout = config.layout();
    let records = vec![
        step_record(&config, [1.0, -0.5, 0.2], [0.4, 0.2, 0.0], false),
        step_record(&config, [-1.0, 0.0, -2.0], [0.1, 0.3, 0.2], true),
    ];

    let batch = recover_agent_trajectories(&layout, &records).unwrap();
    for trajectory in &batch.trajectories {
        let (advantages, _) = compute_agent_gae(
            &trajectory.rewards,
            &trajectory.values,
            &batch.terminals,
            &batch.truncations,
            0.0,
            GAMMA,
            LAMBDA,
        )
        .unwrap();

        let delta1 = trajectory.rewards[1] - trajectory.values[1];
        let delta0 =
            trajectory.rewards[0] + GAMMA * trajectory.values[1] - trajectory.values[0];
        assert!((advantages[1] - delta1).abs() < 1e-5);
        assert!((advantages[0] - (delta0 + GAMMA * LAMBDA * delta1)).abs() < 1e-5);
    }
}

fn agent_zero_loss(model: &CommNet<B>, config: &MultiPpoConfig) -> Tensor<B, 1> {
    let device = Default::default();
    let layout = config.layout();
    let obs: Tensor<B, 2> = Tensor::<B, 1>::from_floats(
        (0..2 * layout.joint_obs_len())
            .map(|i| 0.1 + i as f32 * 0.05)
            .collect::<Vec<f32>>()
            .as_slice(),
        &device,
    )
    .reshape([2, layout.joint_obs_len()]);

    let output = model.forward(&make_policy(), obs);
    let actions = [DiscreteAction(1), DiscreteAction(2)];
    output.policies[0].log_prob(&actions, &device).sum() + output.agent_values(0).sum()
}

// With the channel present, agent 0's loss must produce gradient in
// agent 1's encoder; with it absent, that gradient must not exist.
#[test]
fn test_cross_agent_gradients_flow_through_channel() {
    let config = three_agent_config();

    let shared = make_model(&config, false);
    let grads = agent_zero_loss(&shared, &config).backward();

    let own = shared.encoders[0]
        .fc1
        .weight
        .grad(&grads)
        .expect("own encoder gradient");
    let own_mag: f32 = own.abs().sum().into_data().as_slice::<f32>().unwrap()[0];
    assert!(own_mag > 0.0);

    let cross_fc1 = shared.encoders[1].fc1.weight.grad(&grads);
    let cross_fc2 = shared.encoders[1].fc2.weight.grad(&grads);
    let cross_mag: f32 = [cross_fc1, cross_fc2]
        .into_iter()
        .flatten()
        .map(|g| g.abs().sum().into_data().as_slice::<f32>().unwrap()[0])
        .sum();
    assert!(
        cross_mag > 0.0,
        "agent 0's loss should reach agent 1's encoder via the channel"
    );
}

#[test]
fn test_disable_sharing_zeroes_cross_agent_gradients() {
    let config = three_agent_config();

    let isolated = make_model(&config, true);
    let grads = agent_zero_loss(&isolated, &config).backward();

    // Agent 0 still trains itself.
    assert!(isolated.encoders[0].fc1.weight.grad(&grads).is_some());

    // No path exists to the other agents' encoders.
    for other in 1..3 {
        for grad in [
            isolated.encoders[other].fc1.weight.grad(&grads),
            isolated.encoders[other].fc2.weight.grad(&grads),
        ]
        .into_iter()
        .flatten()
        {
            let mag: f32 = grad.abs().sum().into_data().as_slice::<f32>().unwrap()[0];
            assert!(
                mag < 1e-12,
                "agent {}'s encoder received gradient with sharing disabled",
                other
            );
        }
    }
}

// The trained model must project onto the inner backend for rollout
// workers, and the projection must preserve the layout metadata.
#[test]
fn test_model_projects_to_inner_backend() {
    let config = three_agent_config();
    let model = make_model(&config, false);

    let inner = model.valid();
    assert_eq!(inner.n_agents(), 3);
    assert_eq!(inner.layout(), config.layout());
    assert!(inner.sharing_enabled());

    let device = Default::default();
    let obs = vec![0.2; config.layout().joint_obs_len()];
    let (actions, log_probs, values) = inner.act(&make_policy(), &obs, &device);
    assert_eq!(actions.len(), 3);
    assert_eq!(log_probs.len(), 3);
    assert_eq!(values.len(), 3);
}

// The combined loss from the full pipeline equals the sum of the
// per-agent terms it reports.
#[test]
fn test_pipeline_combined_loss_is_sum() {
    let config = three_agent_config();
    let model = make_model(&config, false);
    let device = Default::default();

    let records = vec![
        step_record(&config, [0.5, -0.2, 1.0], [0.1, 0.1, 0.1], false),
        step_record(&config, [-1.0, 0.0, -2.0], [0.2, 0.0, 0.3], true),
    ];

    let loss = compute_batch_loss(&model, &make_policy(), &records, &[0.0; 3], &config, &device).unwrap();
    let sum: f32 = loss.per_agent.iter().map(|t| t.total).sum();
    assert!((loss.total_scalar() - sum).abs() < 1e-4);
}

// One full optimization step: loss, backward, optimizer update. The
// updated model must still produce finite losses.
#[test]
fn test_optimizer_step_end_to_end() {
    let config = three_agent_config();
    let model = make_model(&config, false);
    let device = Default::default();

    let records = vec![
        step_record(&config, [1.0, 0.5, -0.5], [0.0, 0.0, 0.0], false),
        step_record(&config, [0.0, 1.0, 0.0], [0.1, 0.1, 0.1], true),
    ];

    let loss = compute_batch_loss(&model, &make_policy(), &records, &[0.0; 3], &config, &device).unwrap();
    let before = loss.total_scalar();
    assert!(before.is_finite());

    let grads = loss.total.backward();
    let grads = GradientsParams::from_grads(grads, &model);
    let mut optim = AdamConfig::new()
        .with_epsilon(1e-5)
        .init::<B, CommNet<B>>();
    let model = optim.step(1e-3, model, grads);

    let loss = compute_batch_loss(&model, &make_policy(), &records, &[0.0; 3], &config, &device).unwrap();
    assert!(loss.total_scalar().is_finite());
    for term in &loss.per_agent {
        assert!(term.total.is_finite());
        assert!(term.policy_loss.is_finite());
        assert!(term.value_loss.is_finite());
        assert!(term.entropy.is_finite());
    }
}

// A reward channel missing one agent must fail the whole batch, end to
// end, rather than substituting a default.
#[test]
fn test_pipeline_rejects_incomplete_reward_channel() {
    let config = three_agent_config();
    let model = make_model(&config, false);
    let device = Default::default();

    let mut bad = step_record(&config, [1.0, 0.0, -1.0], [0.0, 0.0, 0.0], false);
    bad.agent_rewards.remove(&2);

    let err = compute_batch_loss(&model, &make_policy(), &[bad], &[0.0; 3], &config, &device).unwrap_err();
    assert!(matches!(err, crate::error::PostprocessError::Data(_)));
}
