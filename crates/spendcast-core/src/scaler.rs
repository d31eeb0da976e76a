//! Min-max feature scaling
//!
//! Maps each category's monthly amounts into [0, 1] using the range observed
//! when fitting, and maps model output back to currency. A category whose
//! observed range is a single value has no usable scale: every value maps to
//! 0.5 and the inverse returns that single value.

use serde::{Deserialize, Serialize};

use crate::aggregate::MonthlyMatrix;

/// Value used for every input of a category with zero observed range
pub const DEGENERATE_SCALE: f64 = 0.5;

/// Fitted per-category ranges
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalerState {
    pub mins: Vec<f64>,
    pub maxs: Vec<f64>,
    /// Calendar year range, used for the year auxiliary feature
    pub year_min: i32,
    pub year_max: i32,
}

impl ScalerState {
    /// Fit per-category (min, max) over every month of the matrix
    pub fn fit(matrix: &MonthlyMatrix) -> Self {
        let width = matrix.width();
        let mut mins = vec![0.0; width];
        let mut maxs = vec![0.0; width];

        for (i, row) in matrix.rows().iter().enumerate() {
            for (c, &v) in row.iter().enumerate() {
                if i == 0 || v < mins[c] {
                    mins[c] = v;
                }
                if i == 0 || v > maxs[c] {
                    maxs[c] = v;
                }
            }
        }

        let (year_min, year_max) = match (matrix.first_month(), matrix.last_month()) {
            (Some(first), Some(last)) => (first.year, last.year),
            _ => (0, 0),
        };

        Self {
            mins,
            maxs,
            year_min,
            year_max,
        }
    }

    /// Number of categories this state was fitted on
    pub fn width(&self) -> usize {
        self.mins.len()
    }

    fn is_degenerate(&self, category: usize) -> bool {
        self.maxs[category] <= self.mins[category]
    }

    /// Scale one value of a category into [0, 1]
    pub fn transform_value(&self, value: f64, category: usize) -> f64 {
        if self.is_degenerate(category) {
            return DEGENERATE_SCALE;
        }
        let (min, max) = (self.mins[category], self.maxs[category]);
        ((value - min) / (max - min)).clamp(0.0, 1.0)
    }

    /// Scale a whole matrix
    pub fn transform(&self, matrix: &MonthlyMatrix) -> Vec<Vec<f64>> {
        matrix
            .rows()
            .iter()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .map(|(c, &v)| self.transform_value(v, c))
                    .collect()
            })
            .collect()
    }

    /// Map a scaled value back to an amount, floored at zero
    pub fn inverse_transform(&self, value: f64, category: usize) -> f64 {
        let raw = if self.is_degenerate(category) {
            self.mins[category]
        } else {
            let (min, max) = (self.mins[category], self.maxs[category]);
            value * (max - min) + min
        };
        raw.max(0.0)
    }

    /// Scale a calendar year into the fitted range
    ///
    /// Not clamped: forecasts past the last observed year land above 1.
    pub fn scale_year(&self, year: i32) -> f64 {
        if self.year_max <= self.year_min {
            return DEGENERATE_SCALE;
        }
        (year - self.year_min) as f64 / (self.year_max - self.year_min) as f64
    }
}

/// Encode a month number (1-12) into [0, 1]
pub fn scale_month(month: u32) -> f64 {
    (month.saturating_sub(1)) as f64 / 11.0
}
