//! Training loop for the sequence model
//!
//! Mini-batch Adam on mean squared error with global gradient-norm clipping,
//! a chronological train/validation split, and early stopping that restores
//! the best weights seen.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::gru::GruParams;
use crate::config::TrainingConfig;
use crate::error::{Error, Result};

/// One training example: a window of encoded months and the scaled vector
/// of the month that followed
#[derive(Debug, Clone)]
pub struct Sample {
    pub inputs: Vec<Vec<f64>>,
    pub target: Vec<f64>,
}

/// Summary of a training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub epochs_run: usize,
    /// Epoch whose weights were kept (1-based)
    pub best_epoch: usize,
    pub train_loss: f64,
    /// None when there were too few windows to hold any out
    pub validation_loss: Option<f64>,
    pub train_windows: usize,
    pub validation_windows: usize,
    pub stopped_early: bool,
}

const BETA1: f64 = 0.9;
const BETA2: f64 = 0.999;
const EPSILON: f64 = 1e-8;

/// Adam optimizer state
struct Adam {
    learning_rate: f64,
    m: GruParams,
    v: GruParams,
    t: i32,
}

impl Adam {
    fn new(params: &GruParams, learning_rate: f64) -> Self {
        Self {
            learning_rate,
            m: params.zeros_like(),
            v: params.zeros_like(),
            t: 0,
        }
    }

    fn step(&mut self, params: &mut GruParams, grads: &GruParams) {
        self.t += 1;
        let bias1 = 1.0 - BETA1.powi(self.t);
        let bias2 = 1.0 - BETA2.powi(self.t);
        let lr = self.learning_rate;

        for (((p, g), m), v) in params
            .tensors_mut()
            .into_iter()
            .zip(grads.tensors())
            .zip(self.m.tensors_mut())
            .zip(self.v.tensors_mut())
        {
            for k in 0..p.len() {
                m[k] = BETA1 * m[k] + (1.0 - BETA1) * g[k];
                v[k] = BETA2 * v[k] + (1.0 - BETA2) * g[k] * g[k];
                let m_hat = m[k] / bias1;
                let v_hat = v[k] / bias2;
                p[k] -= lr * m_hat / (v_hat.sqrt() + EPSILON);
            }
        }
    }
}

/// Mean squared error of one prediction
fn sample_loss(output: &[f64], target: &[f64]) -> f64 {
    output
        .iter()
        .zip(target)
        .map(|(y, t)| (y - t) * (y - t))
        .sum::<f64>()
        / target.len().max(1) as f64
}

/// Average loss over a set of samples
pub fn evaluate(params: &GruParams, samples: &[Sample]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    samples
        .iter()
        .map(|s| sample_loss(&params.forward(&s.inputs).output, &s.target))
        .sum::<f64>()
        / samples.len() as f64
}

/// Split samples chronologically: the oldest go to training
pub fn split_samples(samples: &[Sample], validation_split: f64) -> (&[Sample], &[Sample]) {
    let n = samples.len();
    let train = (((1.0 - validation_split) * n as f64).floor() as usize).clamp(n.min(1), n);
    samples.split_at(train)
}

/// Fit `params` on `samples`, returning the best weights found
pub fn train(
    mut params: GruParams,
    samples: &[Sample],
    config: &TrainingConfig,
    seed: u64,
) -> Result<(GruParams, TrainingReport)> {
    if samples.is_empty() {
        return Err(Error::InsufficientTrainingData(
            "no training windows".into(),
        ));
    }

    let (train_set, validation_set) = split_samples(samples, config.validation_split);
    let mut rng = StdRng::seed_from_u64(seed);
    let mut optimizer = Adam::new(&params, config.learning_rate);
    let mut order: Vec<usize> = (0..train_set.len()).collect();

    let mut best_params = params.clone();
    let mut best_monitor = f64::INFINITY;
    let mut best_epoch = 0;
    let mut best_train = f64::INFINITY;
    let mut best_validation = None;
    let mut since_improvement = 0;
    let mut epochs_run = 0;
    let mut stopped_early = false;

    for epoch in 1..=config.max_epochs {
        epochs_run = epoch;
        order.shuffle(&mut rng);

        for batch in order.chunks(config.batch_size) {
            let mut grads = params.zeros_like();
            let scale = 2.0 / (batch.len() as f64 * params.output_size as f64);

            for &i in batch {
                let sample = &train_set[i];
                let pass = params.forward(&sample.inputs);
                let d_output: Vec<f64> = pass
                    .output
                    .iter()
                    .zip(&sample.target)
                    .map(|(y, t)| scale * (y - t))
                    .collect();
                params.backward(&pass, &d_output, &mut grads);
            }

            let norm = grads.norm();
            if !norm.is_finite() {
                return Err(Error::TrainingDivergence(format!(
                    "non-finite gradient at epoch {}",
                    epoch
                )));
            }
            if norm > config.clip_norm {
                grads.scale(config.clip_norm / norm);
            }
            optimizer.step(&mut params, &grads);
        }

        let train_loss = evaluate(&params, train_set);
        let validation_loss =
            (!validation_set.is_empty()).then(|| evaluate(&params, validation_set));
        let monitor = validation_loss.unwrap_or(train_loss);

        if !train_loss.is_finite() || !monitor.is_finite() {
            return Err(Error::TrainingDivergence(format!(
                "non-finite loss at epoch {}",
                epoch
            )));
        }

        debug!(epoch, train_loss, ?validation_loss, "Training epoch");

        if monitor < best_monitor {
            best_monitor = monitor;
            best_params = params.clone();
            best_epoch = epoch;
            best_train = train_loss;
            best_validation = validation_loss;
            since_improvement = 0;
        } else {
            since_improvement += 1;
            if since_improvement >= config.patience {
                stopped_early = true;
                break;
            }
        }
    }

    Ok((
        best_params,
        TrainingReport {
            epochs_run,
            best_epoch,
            train_loss: best_train,
            validation_loss: best_validation,
            train_windows: train_set.len(),
            validation_windows: validation_set.len(),
            stopped_early,
        },
    ))
}
