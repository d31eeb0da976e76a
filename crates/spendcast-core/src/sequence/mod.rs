//! Recurrent sequence forecaster
//!
//! Maps a fixed window of past monthly vectors to the next month's vector.
//! Each timestep is the month's scaled category values followed by two
//! auxiliary features: the month of year and the calendar year, both scaled
//! into the fitted range.

mod bootstrap;
mod gru;
mod train;

use std::collections::VecDeque;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub use bootstrap::synthetic_history;
pub use gru::GruParams;
pub use train::{Sample, TrainingReport};

use crate::aggregate::MonthlyMatrix;
use crate::config::ForecastConfig;
use crate::error::{Error, Result};
use crate::forecast::{History, Predictor, PredictorOutput};
use crate::models::{ForecastMethod, YearMonth};
use crate::scaler::{scale_month, ScalerState};
use crate::vocabulary::Vocabulary;

/// Auxiliary features appended to each timestep (month, year)
const AUX_FEATURES: usize = 2;

/// A trained GRU tagged with the window and vocabulary it was fitted on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceModel {
    window: usize,
    categories: Vec<String>,
    params: GruParams,
}

impl SequenceModel {
    pub fn new(window: usize, categories: Vec<String>, params: GruParams) -> Self {
        Self {
            window,
            categories,
            params,
        }
    }

    /// Fit a fresh model on `matrix`
    ///
    /// Returns the model together with the scaler fitted on the training data
    /// and a summary of the run. Needs at least `window + 1` months.
    pub fn fit(
        matrix: &MonthlyMatrix,
        vocabulary: &Vocabulary,
        config: &ForecastConfig,
    ) -> Result<(Self, ScalerState, TrainingReport)> {
        let window = config.model.window;
        if matrix.len() < window + 1 {
            return Err(Error::InsufficientTrainingData(format!(
                "need at least {} months, have {}",
                window + 1,
                matrix.len()
            )));
        }
        if matrix.width() != vocabulary.len() {
            return Err(Error::MalformedInput(format!(
                "matrix has {} categories, vocabulary has {}",
                matrix.width(),
                vocabulary.len()
            )));
        }

        let scaler = ScalerState::fit(matrix);
        let samples = build_samples(matrix, &scaler, window);
        let width = vocabulary.len();

        let mut rng = StdRng::seed_from_u64(config.model.seed);
        let initial = GruParams::init(
            width + AUX_FEATURES,
            config.model.hidden_size,
            width,
            &mut rng,
        );

        info!(
            months = matrix.len(),
            windows = samples.len(),
            hidden_size = config.model.hidden_size,
            "Training sequence model"
        );
        let (params, report) = train::train(initial, &samples, &config.training, config.model.seed)?;
        info!(
            epochs = report.epochs_run,
            best_epoch = report.best_epoch,
            train_loss = report.train_loss,
            validation_loss = ?report.validation_loss,
            "Sequence model trained"
        );

        let model = Self::new(window, vocabulary.categories().to_vec(), params);
        Ok((model, scaler, report))
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn hidden_size(&self) -> usize {
        self.params.hidden_size
    }

    /// Run one window of encoded timesteps through the network
    pub fn predict_scaled(&self, inputs: &[Vec<f64>]) -> Vec<f64> {
        self.params.forward(inputs).output
    }

    /// Check the model is usable with `vocabulary` under `config`
    pub fn validate(&self, vocabulary: &Vocabulary, config: &ForecastConfig) -> Result<()> {
        if self.window != config.model.window {
            return Err(Error::ModelLoad(format!(
                "model window {} does not match configured window {}",
                self.window, config.model.window
            )));
        }
        if self.categories != vocabulary.categories() {
            return Err(Error::ModelLoad(
                "model categories do not match the vocabulary".into(),
            ));
        }
        let p = &self.params;
        if p.hidden_size != config.model.hidden_size {
            return Err(Error::ModelLoad(format!(
                "model hidden size {} does not match configured size {}",
                p.hidden_size, config.model.hidden_size
            )));
        }
        if p.output_size != vocabulary.len() || p.input_size != vocabulary.len() + AUX_FEATURES {
            return Err(Error::ModelLoad("model layer sizes do not match the vocabulary".into()));
        }
        if !p.shapes_valid() {
            return Err(Error::ModelLoad("model tensors have inconsistent shapes".into()));
        }
        if !p.all_finite() {
            return Err(Error::ModelLoad("model weights contain non-finite values".into()));
        }
        Ok(())
    }
}

/// Encode one month as a network input vector
pub fn encode_step(scaled: &[f64], month: YearMonth, scaler: &ScalerState) -> Vec<f64> {
    let mut step = Vec::with_capacity(scaled.len() + AUX_FEATURES);
    step.extend_from_slice(scaled);
    step.push(scale_month(month.month));
    step.push(scaler.scale_year(month.year));
    step
}

/// Every sliding window of `window` months paired with the month after it
pub fn build_samples(matrix: &MonthlyMatrix, scaler: &ScalerState, window: usize) -> Vec<Sample> {
    let scaled = scaler.transform(matrix);
    let months = matrix.months();
    let encoded: Vec<Vec<f64>> = scaled
        .iter()
        .zip(&months)
        .map(|(row, &month)| encode_step(row, month, scaler))
        .collect();

    (window..encoded.len())
        .map(|t| Sample {
            inputs: encoded[t - window..t].to_vec(),
            target: scaled[t].clone(),
        })
        .collect()
}

/// Predictor backed by a trained [`SequenceModel`]
pub struct SequencePredictor<'a> {
    model: &'a SequenceModel,
    horizon: usize,
}

impl<'a> SequencePredictor<'a> {
    pub fn new(model: &'a SequenceModel, horizon: usize) -> Self {
        Self {
            model,
            horizon: horizon.max(1),
        }
    }

    /// Autoregressive steps needed to reach `target` from `last`
    ///
    /// At least one step and at most `horizon` steps are taken.
    fn steps_to(&self, last: YearMonth, target: YearMonth) -> usize {
        last.months_until(target).clamp(1, self.horizon as i64) as usize
    }
}

impl Predictor for SequencePredictor<'_> {
    fn method(&self) -> ForecastMethod {
        ForecastMethod::SequenceModel
    }

    /// The month `steps_to` actually reaches from the last observed month
    fn predicted_month(&self, history: &History<'_>, target: YearMonth) -> YearMonth {
        match history.matrix.last_month() {
            Some(last) => (0..self.steps_to(last, target)).fold(last, |m, _| m.succ()),
            None => target,
        }
    }

    fn predict(&self, history: &History<'_>, target: YearMonth) -> Result<PredictorOutput> {
        let window = self.model.window;
        let matrix = history.matrix;
        if matrix.width() != self.model.categories.len() {
            return Err(Error::MalformedInput(format!(
                "history has {} categories, model expects {}",
                matrix.width(),
                self.model.categories.len()
            )));
        }
        let last = match matrix.last_month() {
            Some(last) if matrix.len() >= window => last,
            _ => {
                return Err(Error::InsufficientTrainingData(format!(
                    "sequence model needs {} months, have {}",
                    window,
                    matrix.len()
                )))
            }
        };

        let steps = self.steps_to(last, target);
        let distance = last.months_until(target);
        if distance > self.horizon as i64 {
            warn!(
                distance,
                horizon = self.horizon,
                "Forecast target beyond horizon, capping rollout"
            );
        } else if distance < 1 {
            warn!(
                last = %last,
                target = %target,
                "Forecast target inside the supplied history, predicting the next month"
            );
        }
        let scaled = history.scaler.transform(matrix);
        let months = matrix.months();
        let start = scaled.len() - window;
        let mut recent: VecDeque<Vec<f64>> = scaled[start..]
            .iter()
            .zip(&months[start..])
            .map(|(row, &month)| encode_step(row, month, history.scaler))
            .collect();

        let mut month = last;
        let mut output = Vec::new();
        for step in 0..steps {
            let inputs: Vec<Vec<f64>> = recent.iter().cloned().collect();
            output = self.model.predict_scaled(&inputs);
            month = month.succ();
            if step + 1 < steps {
                let fed: Vec<f64> = output.iter().map(|v| v.clamp(0.0, 1.0)).collect();
                recent.pop_front();
                recent.push_back(encode_step(&fed, month, history.scaler));
            }
        }
        debug!(steps, last = %last, target = %target, "Sequence forecast");

        Ok(PredictorOutput::Scaled(output))
    }
}
