//! Domain models for Spendcast

use std::ops::RangeInclusive;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Years accepted in transaction dates and forecast targets
pub const YEAR_RANGE: RangeInclusive<i32> = 1900..=2200;

/// Largest accepted transaction magnitude
pub const MAX_AMOUNT: f64 = 1e12;

/// A calendar month, ordered chronologically
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    /// Create a year-month, rejecting months outside 1..=12 and years
    /// outside [`YEAR_RANGE`]
    pub fn new(year: i32, month: u32) -> Result<Self> {
        if !(1..=12).contains(&month) {
            return Err(Error::MalformedInput(format!(
                "month must be between 1 and 12, got {}",
                month
            )));
        }
        check_year(year)?;
        Ok(Self { year, month })
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// The following month
    pub fn succ(self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    /// The preceding month
    pub fn pred(self) -> Self {
        if self.month == 1 {
            Self {
                year: self.year - 1,
                month: 12,
            }
        } else {
            Self {
                year: self.year,
                month: self.month - 1,
            }
        }
    }

    /// Signed number of months from `self` to `other`
    pub fn months_until(self, other: YearMonth) -> i64 {
        (other.year as i64 - self.year as i64) * 12 + (other.month as i64 - self.month as i64)
    }
}

impl std::fmt::Display for YearMonth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Transaction amount as supplied by the caller
///
/// Upstream stores sometimes serialize decimals as strings, so both forms are
/// accepted and validated during aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Amount {
    Number(f64),
    Text(String),
}

impl Amount {
    /// Parse into a finite float no larger than [`MAX_AMOUNT`] in magnitude
    pub fn value(&self) -> Result<f64> {
        let value = match self {
            Self::Number(n) => *n,
            Self::Text(s) => s.trim().parse::<f64>().map_err(|_| {
                Error::MalformedInput(format!("unparseable amount: {:?}", s))
            })?,
        };
        if !value.is_finite() {
            return Err(Error::MalformedInput(format!(
                "amount is not a finite number: {}",
                value
            )));
        }
        if value.abs() > MAX_AMOUNT {
            return Err(Error::MalformedInput(format!(
                "amount {} exceeds the supported magnitude of {}",
                value, MAX_AMOUNT
            )));
        }
        Ok(value)
    }
}

impl From<f64> for Amount {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

/// A raw transaction row supplied by the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    #[serde(default)]
    pub category: Option<String>,
    pub amount: Amount,
    pub date: String,
}

impl TransactionRecord {
    pub fn new(category: &str, amount: f64, date: &str) -> Self {
        Self {
            category: Some(category.to_string()),
            amount: Amount::Number(amount),
            date: date.to_string(),
        }
    }

    /// The calendar month this transaction falls in
    pub fn year_month(&self) -> Result<YearMonth> {
        parse_date(&self.date).map(YearMonth::from_date)
    }
}

fn check_year(year: i32) -> Result<()> {
    if !YEAR_RANGE.contains(&year) {
        return Err(Error::MalformedInput(format!(
            "year {} is outside {}..={}",
            year,
            YEAR_RANGE.start(),
            YEAR_RANGE.end()
        )));
    }
    Ok(())
}

/// Parse a transaction date
///
/// Accepts plain dates, naive datetimes (`T` or space separated) and RFC 3339
/// timestamps with a year in [`YEAR_RANGE`]. Anything else is rejected rather
/// than coerced.
pub fn parse_date(raw: &str) -> Result<NaiveDate> {
    let date = parse_any_date(raw.trim())
        .ok_or_else(|| Error::MalformedInput(format!("unparseable date: {:?}", raw)))?;
    check_year(date.year())?;
    Ok(date)
}

fn parse_any_date(s: &str) -> Option<NaiveDate> {
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
        .map(|dt| dt.date())
}

/// Which predictor produced a forecast
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForecastMethod {
    SequenceModel,
    TrendFallback,
}

impl ForecastMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SequenceModel => "sequence_model",
            Self::TrendFallback => "trend_fallback",
        }
    }
}

impl std::str::FromStr for ForecastMethod {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "sequence_model" => Ok(Self::SequenceModel),
            "trend_fallback" => Ok(Self::TrendFallback),
            _ => Err(format!("Unknown forecast method: {}", s)),
        }
    }
}

impl std::fmt::Display for ForecastMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Predicted spend for one category
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryForecast {
    pub category: String,
    /// Always non-negative
    pub predicted_amount: f64,
    pub confidence: f64,
    pub method: ForecastMethod,
}

/// Forecast for a target month, one entry per vocabulary category in
/// vocabulary order
///
/// `target_*` echo the request. `predicted_*` name the month the amounts
/// actually describe, which differs when the sequence model clamps a target
/// inside the observed history or beyond its horizon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastResult {
    pub predictions: Vec<CategoryForecast>,
    pub method: ForecastMethod,
    pub target_year: i32,
    pub target_month: u32,
    pub predicted_year: i32,
    pub predicted_month: u32,
}

impl ForecastResult {
    /// The month the predictions describe
    pub fn predicted(&self) -> YearMonth {
        YearMonth {
            year: self.predicted_year,
            month: self.predicted_month,
        }
    }

    /// Whether the predicted month differs from the requested target
    pub fn is_clamped(&self) -> bool {
        self.predicted_year != self.target_year || self.predicted_month != self.target_month
    }

    /// Predicted amount for a category, if it is in the vocabulary
    pub fn amount_for(&self, category: &str) -> Option<f64> {
        self.predictions
            .iter()
            .find(|p| p.category == category)
            .map(|p| p.predicted_amount)
    }

    /// Sum of all category predictions
    pub fn total(&self) -> f64 {
        self.predictions.iter().map(|p| p.predicted_amount).sum()
    }
}
