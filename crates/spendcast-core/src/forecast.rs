//! Forecast orchestration
//!
//! Per request: aggregate the caller's transactions, fit a request-local
//! scaler, pick a predictor from the amount of history available, and turn
//! its output into one non-negative amount per vocabulary category.

use tracing::info;

use crate::aggregate::{aggregate, MonthlyMatrix};
use crate::config::{ConfidenceConfig, ForecastConfig};
use crate::error::Result;
use crate::models::{CategoryForecast, ForecastMethod, ForecastResult, TransactionRecord, YearMonth};
use crate::scaler::ScalerState;
use crate::sequence::SequencePredictor;
use crate::store::ForecastContext;
use crate::trend::TrendFallback;
use crate::vocabulary::Vocabulary;

/// A caller's aggregated history together with the scaler fitted on it
pub struct History<'a> {
    pub matrix: &'a MonthlyMatrix,
    pub scaler: &'a ScalerState,
    pub vocabulary: &'a Vocabulary,
}

impl<'a> History<'a> {
    pub fn new(matrix: &'a MonthlyMatrix, scaler: &'a ScalerState, vocabulary: &'a Vocabulary) -> Self {
        Self {
            matrix,
            scaler,
            vocabulary,
        }
    }
}

/// Raw predictor output, before denormalization
#[derive(Debug, Clone, PartialEq)]
pub enum PredictorOutput {
    /// Values in the scaler's [0, 1] space, one per category
    Scaled(Vec<f64>),
    /// Currency amounts, one per category
    Amounts(Vec<f64>),
}

/// A strategy that predicts next-month spend from history
pub trait Predictor {
    fn method(&self) -> ForecastMethod;

    /// Month the output of `predict` describes for a requested `target`
    fn predicted_month(&self, _history: &History<'_>, target: YearMonth) -> YearMonth {
        target
    }

    fn predict(&self, history: &History<'_>, target: YearMonth) -> Result<PredictorOutput>;
}

/// Which predictor serves a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForecastMode {
    Sequence,
    Fallback,
}

impl ForecastMode {
    /// Sequence mode needs at least one full window of months
    pub fn for_history(months: usize, window: usize) -> Self {
        if months >= window {
            Self::Sequence
        } else {
            Self::Fallback
        }
    }
}

/// Stateless orchestrator; all trained state arrives through a
/// [`ForecastContext`]
#[derive(Debug, Clone)]
pub struct Forecaster {
    confidence: ConfidenceConfig,
    fallback: TrendFallback,
    horizon: usize,
}

impl Forecaster {
    pub fn new(config: &ForecastConfig) -> Self {
        Self {
            confidence: config.confidence.clone(),
            fallback: TrendFallback::new(config.seasonality.clone()),
            horizon: config.model.horizon,
        }
    }

    pub fn forecast(
        &self,
        context: &ForecastContext,
        transactions: &[TransactionRecord],
        target_year: i32,
        target_month: u32,
    ) -> Result<ForecastResult> {
        let target = YearMonth::new(target_year, target_month)?;
        let vocabulary = &context.vocabulary;
        let matrix = aggregate(transactions, vocabulary)?;
        let scaler = ScalerState::fit(&matrix);
        let history = History::new(&matrix, &scaler, vocabulary);

        let sequence;
        let predictor: &dyn Predictor = match ForecastMode::for_history(matrix.len(), context.model.window()) {
            ForecastMode::Sequence => {
                sequence = SequencePredictor::new(&context.model, self.horizon);
                &sequence
            }
            ForecastMode::Fallback => &self.fallback,
        };
        let method = predictor.method();
        let predicted = predictor.predicted_month(&history, target);
        let output = predictor.predict(&history, target)?;

        let amounts: Vec<f64> = match output {
            PredictorOutput::Scaled(values) => values
                .iter()
                .enumerate()
                .map(|(c, &v)| scaler.inverse_transform(v, c))
                .collect(),
            PredictorOutput::Amounts(values) => values,
        };

        let confidence = self.confidence_for(method);
        let predictions = vocabulary
            .iter()
            .zip(amounts)
            .map(|(category, amount)| CategoryForecast {
                category: category.to_string(),
                // f64::max also maps NaN to zero
                predicted_amount: amount.max(0.0),
                confidence,
                method,
            })
            .collect();

        info!(
            method = %method,
            months = matrix.len(),
            transactions = transactions.len(),
            target = %target,
            predicted = %predicted,
            generation = context.generation,
            "Forecast computed"
        );

        Ok(ForecastResult {
            predictions,
            method,
            target_year,
            target_month,
            predicted_year: predicted.year,
            predicted_month: predicted.month,
        })
    }

    fn confidence_for(&self, method: ForecastMethod) -> f64 {
        match method {
            ForecastMethod::SequenceModel => self.confidence.sequence_model,
            ForecastMethod::TrendFallback => self.confidence.trend_fallback,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn context() -> ForecastContext {
        let mut config = ForecastConfig::default();
        config.model.hidden_size = 6;
        config.training.max_epochs = 10;
        ForecastContext::bootstrap(&config, YearMonth::new(2025, 1).unwrap(), 1).unwrap()
    }

    fn forecaster() -> Forecaster {
        Forecaster::new(&ForecastConfig::default())
    }

    fn monthly(category: &str, amount: f64, months: &[(i32, u32)]) -> Vec<TransactionRecord> {
        months
            .iter()
            .map(|&(y, m)| TransactionRecord::new(category, -amount, &format!("{}-{:02}-15", y, m)))
            .collect()
    }

    #[test]
    fn test_empty_history_falls_back_to_zero() {
        let result = forecaster().forecast(&context(), &[], 2024, 12).unwrap();
        assert_eq!(result.method, ForecastMethod::TrendFallback);
        assert_eq!(result.predictions.len(), 10);
        for p in &result.predictions {
            assert_eq!(p.predicted_amount, 0.0);
            assert_eq!(p.confidence, 0.6);
            assert_eq!(p.method, ForecastMethod::TrendFallback);
        }
    }

    #[test]
    fn test_constant_food_tracks_history() {
        let months: Vec<(i32, u32)> = (1..=12).map(|m| (2024, m)).collect();
        let txns = monthly("food", 100.0, &months);

        let result = forecaster().forecast(&context(), &txns, 2025, 1).unwrap();
        assert_eq!(result.method, ForecastMethod::SequenceModel);
        let food = result.amount_for("food").unwrap();
        assert!((food - 100.0).abs() < 1.0, "food {}", food);
        for p in result.predictions.iter().filter(|p| p.category != "food") {
            assert!(p.predicted_amount < 1.0, "{} {}", p.category, p.predicted_amount);
            assert_eq!(p.confidence, 0.8);
        }
    }

    #[test]
    fn test_predicted_month_matches_target_for_next_month() {
        let months: Vec<(i32, u32)> = (1..=12).map(|m| (2024, m)).collect();
        let txns = monthly("food", 100.0, &months);

        let result = forecaster().forecast(&context(), &txns, 2025, 3).unwrap();
        assert_eq!((result.predicted_year, result.predicted_month), (2025, 3));
        assert!(!result.is_clamped());
    }

    #[test]
    fn test_target_inside_history_reports_next_month() {
        let months: Vec<(i32, u32)> = (1..=12).map(|m| (2024, m)).collect();
        let txns = monthly("food", 100.0, &months);

        let result = forecaster().forecast(&context(), &txns, 2024, 6).unwrap();
        assert_eq!((result.target_year, result.target_month), (2024, 6));
        assert_eq!(result.predicted(), YearMonth::new(2025, 1).unwrap());
        assert!(result.is_clamped());
    }

    #[test]
    fn test_target_beyond_horizon_reports_horizon_month() {
        let months: Vec<(i32, u32)> = (1..=12).map(|m| (2024, m)).collect();
        let txns = monthly("food", 100.0, &months);

        let result = forecaster().forecast(&context(), &txns, 2030, 1).unwrap();
        assert_eq!(result.predicted(), YearMonth::new(2026, 12).unwrap());
        assert!(result.is_clamped());
    }

    #[test]
    fn test_fallback_predicts_requested_month() {
        let txns = monthly("shopping", 200.0, &[(2024, 8)]);
        let result = forecaster().forecast(&context(), &txns, 2023, 2).unwrap();
        assert_eq!(result.predicted(), YearMonth::new(2023, 2).unwrap());
        assert!(!result.is_clamped());
    }

    #[test]
    fn test_short_history_applies_seasonality() {
        let txns = monthly("shopping", 200.0, &[(2024, 8), (2024, 9), (2024, 10)]);
        let result = forecaster().forecast(&context(), &txns, 2024, 12).unwrap();
        assert_eq!(result.method, ForecastMethod::TrendFallback);
        let shopping = result.amount_for("shopping").unwrap();
        assert!((shopping - 360.0).abs() < 1e-9);
        assert_eq!(result.amount_for("food"), Some(0.0));
    }

    #[test]
    fn test_output_order_matches_vocabulary() {
        let ctx = context();
        let txns = monthly("travel", 50.0, &[(2024, 5)]);
        let result = forecaster().forecast(&ctx, &txns, 2024, 7).unwrap();
        let names: Vec<&str> = result.predictions.iter().map(|p| p.category.as_str()).collect();
        let expected: Vec<&str> = ctx.vocabulary.iter().collect();
        assert_eq!(names, expected);
        assert!((result.amount_for("travel").unwrap() - 70.0).abs() < 1e-9);
    }

    #[test]
    fn test_gap_months_count_toward_sequence_mode() {
        let txns = monthly("food", 80.0, &[(2024, 1), (2024, 12)]);
        let result = forecaster().forecast(&context(), &txns, 2025, 1).unwrap();
        assert_eq!(result.method, ForecastMethod::SequenceModel);
        assert!(result.predictions.iter().all(|p| p.predicted_amount >= 0.0));
    }

    #[test]
    fn test_income_rows_ignored() {
        let mut txns = monthly("food", 40.0, &[(2024, 3)]);
        txns.push(TransactionRecord::new("food", 5000.0, "2024-03-01"));
        let result = forecaster().forecast(&context(), &txns, 2024, 4).unwrap();
        assert!((result.amount_for("food").unwrap() - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_target_month_rejected() {
        let err = forecaster().forecast(&context(), &[], 2024, 13).unwrap_err();
        assert!(matches!(err, Error::MalformedInput(_)));
    }

    #[test]
    fn test_malformed_date_rejected() {
        let txns = vec![TransactionRecord::new("food", -10.0, "not-a-date")];
        let err = forecaster().forecast(&context(), &txns, 2024, 4).unwrap_err();
        assert!(matches!(err, Error::MalformedInput(_)));
    }

    #[test]
    fn test_mode_selection() {
        assert_eq!(ForecastMode::for_history(0, 12), ForecastMode::Fallback);
        assert_eq!(ForecastMode::for_history(11, 12), ForecastMode::Fallback);
        assert_eq!(ForecastMode::for_history(12, 12), ForecastMode::Sequence);
        assert_eq!(ForecastMode::for_history(40, 12), ForecastMode::Sequence);
    }
}
