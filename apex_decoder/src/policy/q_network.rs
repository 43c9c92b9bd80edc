//! Burn Q-network implementing both policy capability traits.
//!
//! Parameters move between learner and actors as `BinBytesRecorder` bytes,
//! which are `Send + Sync` for every backend:
//!
//! ```text
//! Learner (Autodiff<B>)                     Actor (B)
//! ┌──────────────────────┐                  ┌──────────────────────┐
//! │ online.into_record() │                  │ model.load_record()  │
//! │ recorder.record()    │ ── Vec<u8> ───►  │ recorder.load()      │
//! └──────────────────────┘                  └──────────────────────┘
//! ```
//!
//! The target network lives on the inner (non-autodiff) backend, so it is
//! frozen between syncs by construction.

use crate::core::transition::StateHistory;
use crate::error::PolicyError;
use crate::policy::{PolicyReplica, TrainOutput, TrainablePolicy, TrainingBatch};
use burn::grad_clipping::GradientClippingConfig;
use burn::module::{AutodiffModule, Module};
use burn::nn::{Linear, LinearConfig};
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::record::{BinBytesRecorder, FullPrecisionSettings, Recorder};
use burn::tensor::activation::relu;
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::{Int, Tensor};
use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};

/// Serialized network parameters.
pub type SnapshotBytes = Vec<u8>;

/// Bound on `|r + γ max Q'|` to keep early targets from exploding.
pub const TD_TARGET_CLAMP: f32 = 200.0;

/// Default gradient-norm clip.
pub const DEFAULT_GRAD_CLIP: f32 = 100.0;

/// Network shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QNetworkConfig {
    /// Flattened state history length (`stack_depth * frame_len`)
    pub state_len: usize,
    pub hidden_size: usize,
    pub n_actions: usize,
}

impl QNetworkConfig {
    pub fn new(state_len: usize, n_actions: usize) -> Self {
        Self {
            state_len,
            hidden_size: 128,
            n_actions,
        }
    }

    pub fn with_hidden_size(mut self, hidden_size: usize) -> Self {
        self.hidden_size = hidden_size;
        self
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> QNetwork<B> {
        QNetwork {
            input: LinearConfig::new(self.state_len, self.hidden_size).init(device),
            hidden: LinearConfig::new(self.hidden_size, self.hidden_size).init(device),
            output: LinearConfig::new(self.hidden_size, self.n_actions).init(device),
        }
    }
}

/// Two hidden-layer MLP over the flattened syndrome history.
#[derive(Module, Debug)]
pub struct QNetwork<B: Backend> {
    input: Linear<B>,
    hidden: Linear<B>,
    output: Linear<B>,
}

impl<B: Backend> QNetwork<B> {
    /// `[batch, state_len]` -> `[batch, n_actions]`
    pub fn forward(&self, states: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = relu(self.input.forward(states));
        let x = relu(self.hidden.forward(x));
        self.output.forward(x)
    }
}

fn record_bytes<B: Backend>(model: &QNetwork<B>) -> Result<SnapshotBytes, PolicyError> {
    BinBytesRecorder::<FullPrecisionSettings>::default()
        .record(model.clone().into_record(), ())
        .map_err(|e| PolicyError::Training(format!("snapshot export failed: {:?}", e)))
}

fn load_bytes<B: Backend>(
    model: QNetwork<B>,
    bytes: &SnapshotBytes,
    device: &B::Device,
) -> Result<QNetwork<B>, PolicyError> {
    // The recorder and `load_record` panic on truncated or mis-shaped records.
    let loaded = panic::catch_unwind(AssertUnwindSafe(|| {
        BinBytesRecorder::<FullPrecisionSettings>::default()
            .load(bytes.clone(), device)
            .map(|record| model.load_record(record))
    }));
    match loaded {
        Ok(Ok(model)) => Ok(model),
        Ok(Err(e)) => Err(PolicyError::Load(format!("{:?}", e))),
        Err(payload) => {
            let msg = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "malformed record".to_string());
            Err(PolicyError::Load(msg))
        }
    }
}

fn single_forward<B: Backend>(
    model: &QNetwork<B>,
    config: &QNetworkConfig,
    state: &StateHistory,
    device: &B::Device,
) -> Result<Vec<f32>, PolicyError> {
    if state.len() != config.state_len {
        return Err(PolicyError::ShapeMismatch {
            expected: config.state_len,
            actual: state.len(),
        });
    }
    let input = Tensor::<B, 1>::from_floats(state.as_slice(), device).reshape([1, config.state_len]);
    let values = model
        .forward(input)
        .into_data()
        .to_vec::<f32>()
        .map_err(|e| PolicyError::Inference(format!("{:?}", e)))?;
    if values.len() != config.n_actions {
        return Err(PolicyError::ShapeMismatch {
            expected: config.n_actions,
            actual: values.len(),
        });
    }
    Ok(values)
}

// ============================================================================
// Actor Replica
// ============================================================================

/// Inference-only replica held by an actor.
pub struct BurnReplica<B: Backend> {
    model: QNetwork<B>,
    config: QNetworkConfig,
    device: B::Device,
}

impl<B: Backend> BurnReplica<B> {
    /// Randomly initialized replica; replaced by the first snapshot.
    pub fn new(config: QNetworkConfig, device: B::Device) -> Self {
        Self {
            model: config.init(&device),
            config,
            device,
        }
    }
}

impl<B: Backend> PolicyReplica for BurnReplica<B> {
    type Params = SnapshotBytes;

    fn load(&mut self, params: &SnapshotBytes) -> Result<(), PolicyError> {
        // Load into a copy; a failed load leaves the current model untouched
        self.model = load_bytes(self.model.clone(), params, &self.device)?;
        Ok(())
    }

    fn action_values(&self, state: &StateHistory) -> Result<Vec<f32>, PolicyError> {
        single_forward(&self.model, &self.config, state, &self.device)
    }
}

// ============================================================================
// Learner Policy
// ============================================================================

/// Adam with gradient-norm clipping, the default learner optimizer.
pub fn clipped_adam<B: AutodiffBackend>(max_grad_norm: f32) -> impl Optimizer<QNetwork<B>, B> {
    AdamConfig::new()
        .with_grad_clipping(Some(GradientClippingConfig::Norm(max_grad_norm)))
        .init::<B, QNetwork<B>>()
}

/// Online network, frozen target network and optimizer.
pub struct BurnLearnerPolicy<B: AutodiffBackend, O> {
    online: QNetwork<B>,
    target: QNetwork<B::InnerBackend>,
    optimizer: O,
    learning_rate: f64,
    config: QNetworkConfig,
    device: B::Device,
}

impl<B, O> BurnLearnerPolicy<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<QNetwork<B>, B>,
{
    pub fn new(config: QNetworkConfig, optimizer: O, learning_rate: f64, device: B::Device) -> Self {
        let online: QNetwork<B> = config.init(&device);
        let target = online.valid();
        Self {
            online,
            target,
            optimizer,
            learning_rate,
            config,
            device,
        }
    }

    pub fn config(&self) -> &QNetworkConfig {
        &self.config
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    /// Target network action values (for tests and diagnostics).
    pub fn target_values(&self, state: &StateHistory) -> Result<Vec<f32>, PolicyError> {
        let inner_device = <B::InnerBackend as Backend>::Device::default();
        single_forward(&self.target, &self.config, state, &inner_device)
    }
}

impl<B, O> TrainablePolicy for BurnLearnerPolicy<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<QNetwork<B>, B> + Send,
{
    type Params = SnapshotBytes;

    fn train_step(&mut self, batch: &TrainingBatch) -> Result<TrainOutput, PolicyError> {
        let n = batch.len();
        let len = batch.state_len;
        if n == 0 || len != self.config.state_len {
            return Err(PolicyError::ShapeMismatch {
                expected: self.config.state_len,
                actual: len,
            });
        }
        let device = &self.device;
        let inner_device = <B::InnerBackend as Backend>::Device::default();

        // TD target from the frozen network: r + γ max Q'(s') (1 - done)
        let next_states = Tensor::<B::InnerBackend, 1>::from_floats(batch.next_states.as_slice(), &inner_device)
            .reshape([n, len]);
        let next_max: Tensor<B::InnerBackend, 1> = self.target.forward(next_states).max_dim(1).flatten(0, 1);
        let rewards = Tensor::<B::InnerBackend, 1>::from_floats(batch.rewards.as_slice(), &inner_device);
        let not_done: Vec<f32> = batch.terminals.iter().map(|&t| if t { 0.0 } else { 1.0 }).collect();
        let not_done = Tensor::<B::InnerBackend, 1>::from_floats(not_done.as_slice(), &inner_device);
        let targets = (rewards + next_max * not_done * batch.gamma).clamp(-TD_TARGET_CLAMP, TD_TARGET_CLAMP);
        let targets = Tensor::<B, 1>::from_inner(targets);

        // Q(s, a) from the online network
        let states = Tensor::<B, 1>::from_floats(batch.states.as_slice(), device).reshape([n, len]);
        let action_indices: Vec<i32> = batch.actions.iter().map(|&a| a as i32).collect();
        let indices = Tensor::<B, 1, Int>::from_ints(action_indices.as_slice(), device).reshape([n, 1]);
        let q_taken: Tensor<B, 1> = self.online.forward(states).gather(1, indices).flatten(0, 1);

        let td = targets - q_taken;
        let weights = Tensor::<B, 1>::from_floats(batch.weights.as_slice(), device);
        let loss = (td.clone().powf_scalar(2.0) * weights).mean();

        let loss_value = loss
            .clone()
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| PolicyError::Training(format!("{:?}", e)))?
            .first()
            .copied()
            .unwrap_or(f32::NAN);
        let td_errors = td
            .inner()
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| PolicyError::Training(format!("{:?}", e)))?;

        // Non-finite losses are reported but never applied
        if loss_value.is_finite() {
            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &self.online);
            self.online = self.optimizer.step(self.learning_rate, self.online.clone(), grads);
        }

        Ok(TrainOutput {
            loss: loss_value,
            td_errors,
        })
    }

    fn sync_target(&mut self) {
        self.target = self.online.valid();
    }

    fn export(&self) -> Result<SnapshotBytes, PolicyError> {
        record_bytes(&self.online)
    }

    fn action_values(&self, state: &StateHistory) -> Result<Vec<f32>, PolicyError> {
        let inner_device = <B::InnerBackend as Backend>::Device::default();
        single_forward(&self.online.valid(), &self.config, state, &inner_device)
    }
}
