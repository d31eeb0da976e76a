//! Trend fallback estimator
//!
//! Closed-form predictor for users with less history than the sequence
//! model's window: each category's mean monthly spend, scaled by a seasonal
//! multiplier for the target month. Needs no trained state.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::forecast::{History, Predictor, PredictorOutput};
use crate::models::{ForecastMethod, YearMonth};

/// Seasonal multipliers keyed by category and month
///
/// Categories or months without an entry use 1.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonalTable {
    factors: BTreeMap<String, [f64; 12]>,
}

impl SeasonalTable {
    /// A table where every multiplier is 1.0
    pub fn flat() -> Self {
        Self {
            factors: BTreeMap::new(),
        }
    }

    /// Set the multiplier for a category in a month (1-12)
    pub fn set(&mut self, category: &str, month: u32, multiplier: f64) {
        debug_assert!((1..=12).contains(&month));
        self.factors
            .entry(category.to_lowercase())
            .or_insert([1.0; 12])[(month - 1) as usize] = multiplier;
    }

    pub fn with(mut self, category: &str, months: &[u32], multiplier: f64) -> Self {
        for &month in months {
            self.set(category, month, multiplier);
        }
        self
    }

    pub fn multiplier(&self, category: &str, month: u32) -> f64 {
        if !(1..=12).contains(&month) {
            return 1.0;
        }
        self.factors
            .get(category)
            .map(|f| f[(month - 1) as usize])
            .unwrap_or(1.0)
    }
}

impl Default for SeasonalTable {
    fn default() -> Self {
        Self::flat()
            .with("shopping", &[11], 1.5)
            .with("shopping", &[12], 1.8)
            .with("travel", &[6, 7, 8], 1.4)
            .with("utilities", &[12, 1, 2], 1.2)
    }
}

/// Mean x seasonal multiplier predictor
#[derive(Debug, Clone, Default)]
pub struct TrendFallback {
    table: SeasonalTable,
}

impl TrendFallback {
    pub fn new(table: SeasonalTable) -> Self {
        Self { table }
    }
}

impl Predictor for TrendFallback {
    fn method(&self) -> ForecastMethod {
        ForecastMethod::TrendFallback
    }

    fn predict(&self, history: &History<'_>, target: YearMonth) -> Result<PredictorOutput> {
        let matrix = history.matrix;
        let months = matrix.len();

        let amounts = history
            .vocabulary
            .iter()
            .enumerate()
            .map(|(c, category)| {
                let mean = if months == 0 {
                    0.0
                } else {
                    matrix.column(c).sum::<f64>() / months as f64
                };
                mean * self.table.multiplier(category, target.month)
            })
            .collect();

        Ok(PredictorOutput::Amounts(amounts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::MonthlyMatrix;
    use crate::scaler::ScalerState;
    use crate::vocabulary::Vocabulary;

    fn ym(year: i32, month: u32) -> YearMonth {
        YearMonth::new(year, month).unwrap()
    }

    fn amounts(output: PredictorOutput) -> Vec<f64> {
        match output {
            PredictorOutput::Amounts(a) => a,
            PredictorOutput::Scaled(_) => panic!("trend fallback returns amounts"),
        }
    }

    #[test]
    fn test_default_table() {
        let table = SeasonalTable::default();
        assert_eq!(table.multiplier("shopping", 11), 1.5);
        assert_eq!(table.multiplier("shopping", 12), 1.8);
        assert_eq!(table.multiplier("shopping", 1), 1.0);
        assert_eq!(table.multiplier("travel", 7), 1.4);
        assert_eq!(table.multiplier("utilities", 1), 1.2);
        assert_eq!(table.multiplier("utilities", 6), 1.0);
        assert_eq!(table.multiplier("food", 12), 1.0);
        assert_eq!(table.multiplier("shopping", 13), 1.0);
    }

    #[test]
    fn test_empty_history_predicts_zero() {
        let vocab = Vocabulary::default();
        let matrix = MonthlyMatrix::empty(vocab.len());
        let scaler = ScalerState::fit(&matrix);
        let history = History::new(&matrix, &scaler, &vocab);

        let out = amounts(TrendFallback::default().predict(&history, ym(2024, 12)).unwrap());
        assert_eq!(out, vec![0.0; 10]);
    }

    #[test]
    fn test_mean_times_seasonal_multiplier() {
        let vocab = Vocabulary::default();
        let mut rows = vec![vec![0.0; 10]; 3];
        rows[0][2] = 150.0;
        rows[1][2] = 250.0;
        rows[2][2] = 200.0;
        rows[0][0] = 90.0;
        let matrix = MonthlyMatrix::from_rows(ym(2024, 7), 10, rows).unwrap();
        let scaler = ScalerState::fit(&matrix);
        let history = History::new(&matrix, &scaler, &vocab);

        let out = amounts(TrendFallback::default().predict(&history, ym(2024, 12)).unwrap());
        assert!((out[2] - 360.0).abs() < 1e-9);
        assert!((out[0] - 30.0).abs() < 1e-9);
        assert_eq!(out[7], 0.0);
    }

    #[test]
    fn test_custom_table() {
        let table = SeasonalTable::flat().with("food", &[3], 2.0);
        let vocab = Vocabulary::default();
        let mut rows = vec![vec![0.0; 10]; 2];
        rows[0][0] = 10.0;
        rows[1][0] = 30.0;
        let matrix = MonthlyMatrix::from_rows(ym(2024, 1), 10, rows).unwrap();
        let scaler = ScalerState::fit(&matrix);
        let history = History::new(&matrix, &scaler, &vocab);

        let fallback = TrendFallback::new(table);
        let out = amounts(fallback.predict(&history, ym(2024, 3)).unwrap());
        assert_eq!(out[0], 40.0);
        assert_eq!(fallback.method(), ForecastMethod::TrendFallback);
    }
}
