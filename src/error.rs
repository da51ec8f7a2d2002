//! Error taxonomy for the multi-agent training core.
//!
//! Three classes of failure, with deliberately different recovery stories:
//!
//! - [`DataIntegrityError`]: the environment/model contract was violated
//!   (missing per-agent reward, agent-count mismatch). Fatal for the batch,
//!   never retried. Credit assignment is exact or invalid; the core never
//!   substitutes defaults for missing per-agent data.
//! - [`NumericInstabilityError`]: a non-finite value appeared during
//!   advantage/return computation. The batch is discarded; the training
//!   loop decides whether to retry with a fresh rollout.
//! - [`ConfigurationError`]: agent count or action-space kind mismatched
//!   between model, config, and environment at construction time. Fatal at
//!   startup, never recoverable at runtime.

use std::fmt;

/// Environment/model contract violation in the per-agent reward channel
/// or the joint tensor layout.
#[derive(Debug, Clone, PartialEq)]
pub enum DataIntegrityError {
    /// The auxiliary reward channel is missing an expected agent index.
    MissingAgentReward { agent: usize, step: usize },
    /// Number of entries in the auxiliary reward channel does not match
    /// the number of agents in the joint observation.
    AgentCountMismatch {
        step: usize,
        expected: usize,
        got: usize,
    },
    /// A flattened joint buffer has the wrong length for the layout.
    JointLengthMismatch {
        step: usize,
        field: &'static str,
        expected: usize,
        got: usize,
    },
    /// A per-batch buffer (not tied to any step) has the wrong length.
    LengthMismatch {
        field: &'static str,
        expected: usize,
        got: usize,
    },
    /// A batch with no step records was submitted for post-processing.
    EmptyBatch,
}

impl fmt::Display for DataIntegrityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataIntegrityError::MissingAgentReward { agent, step } => {
                write!(
                    f,
                    "auxiliary reward channel at step {} has no entry for agent {}",
                    step, agent
                )
            }
            DataIntegrityError::AgentCountMismatch {
                step,
                expected,
                got,
            } => {
                write!(
                    f,
                    "step {}: expected per-agent data for {} agents, got {}",
                    step, expected, got
                )
            }
            DataIntegrityError::JointLengthMismatch {
                step,
                field,
                expected,
                got,
            } => {
                write!(
                    f,
                    "step {}: joint {} buffer has length {}, layout requires {}",
                    step, field, got, expected
                )
            }
            DataIntegrityError::LengthMismatch {
                field,
                expected,
                got,
            } => {
                write!(
                    f,
                    "{} buffer has length {}, layout requires {}",
                    field, got, expected
                )
            }
            DataIntegrityError::EmptyBatch => {
                write!(f, "cannot post-process an empty batch of step records")
            }
        }
    }
}

impl std::error::Error for DataIntegrityError {}

/// Non-finite value produced during advantage/return estimation.
#[derive(Debug, Clone, PartialEq)]
pub struct NumericInstabilityError {
    /// Agent whose trajectory produced the value, when known.
    pub agent: Option<usize>,
    /// Timestep within the trajectory.
    pub step: usize,
    /// The offending value (NaN or infinite).
    pub value: f32,
    /// Which quantity went non-finite.
    pub quantity: &'static str,
}

impl NumericInstabilityError {
    pub(crate) fn new(step: usize, value: f32, quantity: &'static str) -> Self {
        Self {
            agent: None,
            step,
            value,
            quantity,
        }
    }

    /// Attach the agent index once the caller knows it.
    pub(crate) fn with_agent(mut self, agent: usize) -> Self {
        self.agent = Some(agent);
        self
    }
}

impl fmt::Display for NumericInstabilityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.agent {
            Some(agent) => write!(
                f,
                "non-finite {} ({}) at step {} for agent {}",
                self.quantity, self.value, self.step, agent
            ),
            None => write!(
                f,
                "non-finite {} ({}) at step {}",
                self.quantity, self.value, self.step
            ),
        }
    }
}

impl std::error::Error for NumericInstabilityError {}

/// Invalid or inconsistent construction-time configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    /// A count parameter (n_agents, obs_dim, etc.) must be positive.
    InvalidCount { field: &'static str, value: usize },
    /// A parameter is outside its valid range.
    OutOfRange {
        field: &'static str,
        value: f32,
        min: f32,
        max: f32,
    },
    /// Model and environment disagree on the number of agents.
    AgentCountMismatch { model: usize, env: usize },
    /// Model and environment disagree on the per-agent observation size.
    ObsDimMismatch { model: usize, env: usize },
    /// Model and environment disagree on the action-space kind.
    ActionKindMismatch { model: String, env: String },
    /// Model heads and the supplied action policy disagree on widths.
    PolicyWidthMismatch {
        model_act: usize,
        model_head: usize,
        policy_act: usize,
        policy_head: usize,
    },
}

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigurationError::InvalidCount { field, value } => {
                write!(f, "{} must be > 0, got {}", field, value)
            }
            ConfigurationError::OutOfRange {
                field,
                value,
                min,
                max,
            } => {
                write!(f, "{} must be in [{}, {}], got {}", field, min, max, value)
            }
            ConfigurationError::AgentCountMismatch { model, env } => {
                write!(
                    f,
                    "model is built for {} agents but environment has {}",
                    model, env
                )
            }
            ConfigurationError::ObsDimMismatch { model, env } => {
                write!(
                    f,
                    "model expects per-agent observations of size {} but environment produces {}",
                    model, env
                )
            }
            ConfigurationError::ActionKindMismatch { model, env } => {
                write!(
                    f,
                    "model action space is {} but environment action space is {}",
                    model, env
                )
            }
            ConfigurationError::PolicyWidthMismatch {
                model_act,
                model_head,
                policy_act,
                policy_head,
            } => {
                write!(
                    f,
                    "model heads are sized for action width {} / head width {}, \
                     policy produces {} / {}",
                    model_act, model_head, policy_act, policy_head
                )
            }
        }
    }
}

impl std::error::Error for ConfigurationError {}

/// Failure during trajectory post-processing (recovery + advantage
/// estimation + loss assembly).
#[derive(Debug, Clone, PartialEq)]
pub enum PostprocessError {
    /// Contract violation in the batch data.
    Data(DataIntegrityError),
    /// Non-finite value during estimation.
    Numeric(NumericInstabilityError),
    /// Model and supplied policy disagree on the action space.
    Config(ConfigurationError),
}

impl fmt::Display for PostprocessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PostprocessError::Data(e) => write!(f, "data integrity: {}", e),
            PostprocessError::Numeric(e) => write!(f, "numeric instability: {}", e),
            PostprocessError::Config(e) => write!(f, "configuration: {}", e),
        }
    }
}

impl std::error::Error for PostprocessError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PostprocessError::Data(e) => Some(e),
            PostprocessError::Numeric(e) => Some(e),
            PostprocessError::Config(e) => Some(e),
        }
    }
}

impl From<DataIntegrityError> for PostprocessError {
    fn from(e: DataIntegrityError) -> Self {
        PostprocessError::Data(e)
    }
}

impl From<NumericInstabilityError> for PostprocessError {
    fn from(e: NumericInstabilityError) -> Self {
        PostprocessError::Numeric(e)
    }
}

impl From<ConfigurationError> for PostprocessError {
    fn from(e: ConfigurationError) -> Self {
        PostprocessError::Config(e)
    }
}
