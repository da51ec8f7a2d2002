//! Rollout collection against multi-agent environments.
//!
//! The collector runs a frozen policy snapshot against an environment for
//! a fixed number of steps, recording everything the post-processing
//! pipeline needs: joint observations and actions, the auxiliary per-agent
//! reward channel, episode flags, and the behavior policy's log-probs and
//! value estimates. Workers run collectors on their own threads and ship
//! finished rollouts back over a channel.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use burn::tensor::backend::Backend;
use crossbeam_channel::{bounded, Receiver, Sender};

use crate::config::{ActionSpaceKind, MultiPpoConfig};
use crate::error::ConfigurationError;
use crate::joint::JointStepRecord;
use crate::model::CommNet;
use crate::policy::{ActionPolicy, ActionValue};
use crate::slot::{model_slot, SharedModelSlot};

// ============================================================================
// Environment abstraction
// ============================================================================

/// Result of stepping a multi-agent environment.
#[derive(Debug, Clone)]
pub struct EnvStep {
    /// Flattened joint observation after the step, `n_agents * obs_dim`.
    pub observations: Vec<f32>,
    /// Team scalar reward.
    pub team_reward: f32,
    /// Auxiliary per-agent reward channel: agent index → reward.
    pub agent_rewards: HashMap<usize, f32>,
    /// Episode truly ended (goal reached, failure).
    pub terminal: bool,
    /// Episode cut by a time limit.
    pub truncated: bool,
}

/// A cooperative multi-agent environment with a fixed team.
///
/// The environment owns the agent ordering: slice `i` of the joint
/// observation, slice `i` of the joint action, and key `i` of the reward
/// channel all refer to the same agent, for the lifetime of the run.
pub trait MultiAgentEnv: Send {
    /// Number of agents in the team.
    fn n_agents(&self) -> usize;

    /// Per-agent observation vector size.
    fn obs_dim(&self) -> usize;

    /// Action space shared by all agents.
    fn action_space(&self) -> ActionSpaceKind;

    /// Reset all agents; returns the initial joint observation.
    fn reset(&mut self, seed: u64) -> Vec<f32>;

    /// Step with a flattened joint action.
    fn step(&mut self, actions: &[f32]) -> EnvStep;
}

/// Fail fast when model configuration and environment disagree.
///
/// Runs once at startup; a mismatch here would otherwise surface as
/// garbage slicing deep inside the forward pass.
pub fn check_env_compat<E: MultiAgentEnv>(
    config: &MultiPpoConfig,
    env: &E,
) -> Result<(), ConfigurationError> {
    if config.n_agents != env.n_agents() {
        return Err(ConfigurationError::AgentCountMismatch {
            model: config.n_agents,
            env: env.n_agents(),
        });
    }
    if config.obs_dim != env.obs_dim() {
        return Err(ConfigurationError::ObsDimMismatch {
            model: config.obs_dim,
            env: env.obs_dim(),
        });
    }
    if config.action != env.action_space() {
        return Err(ConfigurationError::ActionKindMismatch {
            model: config.action.to_string(),
            env: env.action_space().to_string(),
        });
    }
    Ok(())
}

// ============================================================================
// Collector
// ============================================================================

/// One collected rollout, ready for post-processing.
#[derive(Debug, Clone)]
pub struct Rollout {
    pub records: Vec<JointStepRecord>,
    /// Per-agent bootstrap values for a horizon cut; all zero when the
    /// rollout ended on an episode boundary.
    pub last_values: Vec<f32>,
}

/// Collect `n_steps` transitions with a frozen policy.
///
/// `obs` is the current joint observation and is left pointing at the
/// observation after the final step, so consecutive calls continue the
/// same episode. Finished episodes are reset in place with a fresh seed.
pub fn collect_rollout<B, A, E>(
    model: &CommNet<B>,
    policy: &A,
    env: &mut E,
    obs: &mut Vec<f32>,
    n_steps: usize,
    device: &B::Device,
) -> Rollout
where
    B: Backend,
    A: ActionPolicy<B>,
    E: MultiAgentEnv,
{
    let n_agents = model.n_agents();
    let mut records = Vec::with_capacity(n_steps);
    let mut ended_on_boundary = false;

    for _ in 0..n_steps {
        let (actions, log_probs, values) = model.act(policy, obs, device);

        let mut joint_action = Vec::with_capacity(model.layout().joint_act_len());
        for action in &actions {
            joint_action.extend_from_slice(&action.as_floats());
        }

        let step = env.step(&joint_action);
        records.push(JointStepRecord {
            observations: std::mem::take(obs),
            actions: joint_action,
            team_reward: step.team_reward,
            agent_rewards: step.agent_rewards,
            terminal: step.terminal,
            truncated: step.truncated,
            log_probs,
            values,
        });

        ended_on_boundary = step.terminal || step.truncated;
        *obs = if ended_on_boundary {
            env.reset(fastrand::u64(..))
        } else {
            step.observations
        };
    }

    // Horizon cut: each agent bootstraps from its own value estimate at
    // the observation past the final step.
    let last_values = if ended_on_boundary {
        vec![0.0; n_agents]
    } else {
        let (_, _, values) = model.act(policy, obs, device);
        values
    };

    Rollout {
        records,
        last_values,
    }
}

// ============================================================================
// Worker pool
// ============================================================================

/// A rollout paired with the worker that collected it.
#[derive(Debug)]
pub struct WorkerRollout {
    pub worker_id: usize,
    pub rollout: Rollout,
}

/// Pool of rollout worker threads.
///
/// Each worker owns one environment and one snapshot slot. The trainer
/// publishes updated snapshots to every slot after each optimization
/// step; workers pick up the latest snapshot between rollouts, so a
/// rollout is always collected with a single consistent policy.
pub struct RolloutWorkerPool<B: Backend> {
    handles: Vec<JoinHandle<()>>,
    slots: Vec<SharedModelSlot<CommNet<B>>>,
    rollout_rx: Receiver<WorkerRollout>,
    stop: Arc<AtomicBool>,
}

impl<B: Backend> RolloutWorkerPool<B> {
    /// Spawn one worker per environment.
    ///
    /// The policy and every environment are checked against the model and
    /// configuration before any thread starts. The initial model snapshot
    /// seeds every slot, so workers begin collecting immediately.
    pub fn spawn<A, E>(
        config: &MultiPpoConfig,
        envs: Vec<E>,
        model: &CommNet<B>,
        policy: &A,
        device: &B::Device,
    ) -> Result<Self, ConfigurationError>
    where
        A: ActionPolicy<B>,
        E: MultiAgentEnv + 'static,
    {
        model.check_policy_compat(policy)?;
        for env in &envs {
            check_env_compat(config, env)?;
        }

        let (rollout_tx, rollout_rx) = bounded::<WorkerRollout>(envs.len() * 2);
        let stop = Arc::new(AtomicBool::new(false));
        let rollout_length = config.rollout_length;

        let mut handles = Vec::with_capacity(envs.len());
        let mut slots = Vec::with_capacity(envs.len());

        for (worker_id, mut env) in envs.into_iter().enumerate() {
            let slot = model_slot::<CommNet<B>>();
            slot.publish(model.clone());
            slots.push(Arc::clone(&slot));

            let tx: Sender<WorkerRollout> = rollout_tx.clone();
            let stop_flag = Arc::clone(&stop);
            let worker_device = device.clone();
            let worker_policy = policy.clone();

            let handle = std::thread::Builder::new()
                .name(format!("rollout-worker-{}", worker_id))
                .spawn(move || {
                    let mut current = match slot.take() {
                        Some(m) => m,
                        None => return,
                    };
                    let mut obs = env.reset(fastrand::u64(..));

                    while !stop_flag.load(Ordering::Relaxed) {
                        if let Some(updated) = slot.take() {
                            current = updated;
                        }

                        let rollout = collect_rollout(
                            &current,
                            &worker_policy,
                            &mut env,
                            &mut obs,
                            rollout_length,
                            &worker_device,
                        );
                        log::debug!(
                            "worker {} collected {} steps",
                            worker_id,
                            rollout.records.len()
                        );

                        if tx.send(WorkerRollout { worker_id, rollout }).is_err() {
                            break;
                        }
                    }
                })
                .expect("spawn rollout worker");
            handles.push(handle);
        }

        Ok(Self {
            handles,
            slots,
            rollout_rx,
            stop,
        })
    }

    /// Number of workers.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Publish an updated snapshot to every worker.
    pub fn publish(&self, model: &CommNet<B>) {
        for slot in &self.slots {
            slot.publish(model.clone());
        }
    }

    /// Receive the next finished rollout, waiting up to `timeout`.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<WorkerRollout> {
        self.rollout_rx.recv_timeout(timeout).ok()
    }

    /// Stop all workers and join their threads.
    pub fn shutdown(self) {
        self.stop.store(true, Ordering::Relaxed);
        // Drain so no worker stays blocked on a full channel.
        while self.rollout_rx.try_recv().is_ok() {}
        for handle in self.handles {
            let _ = handle.join();
        }
    }
}
