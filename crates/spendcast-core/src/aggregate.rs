//! Monthly spending aggregation
//!
//! Turns an unordered list of transactions into a gap-free monthly x category
//! matrix. Only expenses (negative amounts) contribute; their magnitudes are
//! summed per month and category. Months between the first and last observed
//! month that have no expenses become explicit zero rows so that fixed-length
//! windows over the matrix always span consecutive months.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::{TransactionRecord, YearMonth};
use crate::vocabulary::Vocabulary;

/// Gap-free monthly spending matrix
///
/// Row `i` holds the month `start + i`; each row has one column per
/// vocabulary category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawMatrix", into = "RawMatrix")]
pub struct MonthlyMatrix {
    start: Option<YearMonth>,
    width: usize,
    rows: Vec<Vec<f64>>,
}

#[derive(Serialize, Deserialize)]
struct RawMatrix {
    start: Option<YearMonth>,
    width: usize,
    rows: Vec<Vec<f64>>,
}

impl TryFrom<RawMatrix> for MonthlyMatrix {
    type Error = Error;

    fn try_from(raw: RawMatrix) -> Result<Self> {
        if raw.start.is_none() != raw.rows.is_empty() {
            return Err(Error::ModelLoad(
                "matrix start month and rows disagree".into(),
            ));
        }
        if raw.rows.iter().any(|r| r.len() != raw.width) {
            return Err(Error::ModelLoad("matrix row width mismatch".into()));
        }
        if raw.rows.iter().flatten().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(Error::ModelLoad(
                "matrix contains negative or non-finite values".into(),
            ));
        }
        Ok(Self {
            start: raw.start,
            width: raw.width,
            rows: raw.rows,
        })
    }
}

impl From<MonthlyMatrix> for RawMatrix {
    fn from(m: MonthlyMatrix) -> Self {
        Self {
            start: m.start,
            width: m.width,
            rows: m.rows,
        }
    }
}

impl MonthlyMatrix {
    pub fn empty(width: usize) -> Self {
        Self {
            start: None,
            width,
            rows: Vec::new(),
        }
    }

    /// Build from consecutive rows beginning at `start`
    pub fn from_rows(start: YearMonth, width: usize, rows: Vec<Vec<f64>>) -> Result<Self> {
        if rows.is_empty() {
            return Ok(Self::empty(width));
        }
        if let Some(bad) = rows.iter().find(|r| r.len() != width) {
            return Err(Error::MalformedInput(format!(
                "row has {} columns, expected {}",
                bad.len(),
                width
            )));
        }
        Ok(Self {
            start: Some(start),
            width,
            rows,
        })
    }

    /// Build from a sparse month map, filling skipped months with zero rows
    fn from_sparse(width: usize, sparse: BTreeMap<YearMonth, Vec<f64>>) -> Self {
        let (first, last) = match (sparse.keys().next(), sparse.keys().next_back()) {
            (Some(first), Some(last)) => (*first, *last),
            _ => return Self::empty(width),
        };

        let mut rows = Vec::with_capacity(first.months_until(last) as usize + 1);
        let mut month = first;
        loop {
            rows.push(
                sparse
                    .get(&month)
                    .cloned()
                    .unwrap_or_else(|| vec![0.0; width]),
            );
            if month == last {
                break;
            }
            month = month.succ();
        }

        Self {
            start: Some(first),
            width,
            rows,
        }
    }

    /// Number of months covered
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of category columns
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn first_month(&self) -> Option<YearMonth> {
        self.start
    }

    pub fn last_month(&self) -> Option<YearMonth> {
        self.start
            .map(|s| (1..self.rows.len()).fold(s, |m, _| m.succ()))
    }

    /// Months in chronological order
    pub fn months(&self) -> Vec<YearMonth> {
        let mut months = Vec::with_capacity(self.rows.len());
        if let Some(mut month) = self.start {
            for _ in 0..self.rows.len() {
                months.push(month);
                month = month.succ();
            }
        }
        months
    }

    /// Values of one category across all months
    pub fn column(&self, index: usize) -> impl Iterator<Item = f64> + '_ {
        self.rows.iter().map(move |r| r[index])
    }

    /// Keep only the most recent `n` months
    pub fn tail(&self, n: usize) -> Self {
        if n >= self.rows.len() {
            return self.clone();
        }
        if n == 0 {
            return Self::empty(self.width);
        }
        let skip = self.rows.len() - n;
        let start = self
            .start
            .map(|s| (0..skip).fold(s, |m, _| m.succ()));
        Self {
            start,
            width: self.width,
            rows: self.rows[skip..].to_vec(),
        }
    }

    /// Split into the months up to and including `month` and the months after
    pub fn split_after(&self, month: YearMonth) -> (Self, Self) {
        let Some(start) = self.start else {
            return (self.clone(), self.clone());
        };
        let cut = (start.months_until(month) + 1).clamp(0, self.rows.len() as i64) as usize;
        let later_start = (0..cut).fold(start, |m, _| m.succ());

        let head = if cut == 0 {
            Self::empty(self.width)
        } else {
            Self {
                start: Some(start),
                width: self.width,
                rows: self.rows[..cut].to_vec(),
            }
        };
        let rest = if cut == self.rows.len() {
            Self::empty(self.width)
        } else {
            Self {
                start: Some(later_start),
                width: self.width,
                rows: self.rows[cut..].to_vec(),
            }
        };
        (head, rest)
    }

    /// Merge newer observations into this matrix
    ///
    /// Months present in `newer` replace the same months here; months only in
    /// one side are kept. The result is gap-filled again.
    pub fn merge(&self, newer: &MonthlyMatrix) -> Result<Self> {
        if self.width != newer.width {
            return Err(Error::MalformedInput(format!(
                "cannot merge matrices of width {} and {}",
                self.width, newer.width
            )));
        }

        let mut sparse: BTreeMap<YearMonth, Vec<f64>> =
            self.months().into_iter().zip(self.rows.iter().cloned()).collect();
        for (month, row) in newer.months().into_iter().zip(newer.rows.iter()) {
            sparse.insert(month, row.clone());
        }

        Ok(Self::from_sparse(self.width, sparse))
    }
}

/// Aggregate transactions into a monthly spending matrix
///
/// Income rows (amount >= 0) are ignored, but every row's date and amount
/// must still parse: malformed rows fail the whole call.
pub fn aggregate(transactions: &[TransactionRecord], vocabulary: &Vocabulary) -> Result<MonthlyMatrix> {
    let width = vocabulary.len();
    let mut sparse: BTreeMap<YearMonth, Vec<f64>> = BTreeMap::new();

    for tx in transactions {
        let month = tx.year_month()?;
        let amount = tx.amount.value()?;
        if amount >= 0.0 {
            continue;
        }

        let column = vocabulary.index_of(tx.category.as_deref());
        let cell = &mut sparse.entry(month).or_insert_with(|| vec![0.0; width])[column];
        *cell += amount.abs();
        if !cell.is_finite() {
            return Err(Error::MalformedInput(format!(
                "spending for {} in {} overflows",
                vocabulary.name(column),
                month
            )));
        }
    }

    Ok(MonthlyMatrix::from_sparse(width, sparse))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ym(year: i32, month: u32) -> YearMonth {
        YearMonth::new(year, month).unwrap()
    }

    #[test]
    fn test_aggregate_sums_expenses_per_month_and_category() {
        let vocab = Vocabulary::default();
        let txs = vec![
            TransactionRecord::new("food", -10.0, "2024-01-03"),
            TransactionRecord::new("food", -15.5, "2024-01-20"),
            TransactionRecord::new("travel", -100.0, "2024-01-21"),
            TransactionRecord::new("food", -7.0, "2024-02-01"),
        ];

        let matrix = aggregate(&txs, &vocab).unwrap();
        assert_eq!(matrix.len(), 2);
        assert_eq!(matrix.first_month(), Some(ym(2024, 1)));
        assert_eq!(matrix.rows()[0][0], 25.5);
        assert_eq!(matrix.rows()[0][7], 100.0);
        assert_eq!(matrix.rows()[1][0], 7.0);
    }

    #[test]
    fn test_aggregate_ignores_income() {
        let vocab = Vocabulary::default();
        let txs = vec![
            TransactionRecord::new("food", 500.0, "2024-01-03"),
            TransactionRecord::new("food", -20.0, "2024-01-04"),
        ];
        let matrix = aggregate(&txs, &vocab).unwrap();
        assert_eq!(matrix.rows()[0][0], 20.0);
    }

    #[test]
    fn test_aggregate_income_only_is_empty() {
        let vocab = Vocabulary::default();
        let txs = vec![TransactionRecord::new("food", 500.0, "2024-01-03")];
        assert!(aggregate(&txs, &vocab).unwrap().is_empty());
    }

    #[test]
    fn test_aggregate_fills_gaps_with_zero_rows() {
        let vocab = Vocabulary::default();
        let txs = vec![
            TransactionRecord::new("food", -10.0, "2023-11-15"),
            TransactionRecord::new("food", -30.0, "2024-03-02"),
        ];

        let matrix = aggregate(&txs, &vocab).unwrap();
        assert_eq!(matrix.len(), 5);
        let months = matrix.months();
        for pair in months.windows(2) {
            assert_eq!(pair[0].succ(), pair[1]);
        }
        assert_eq!(months.last(), Some(&ym(2024, 3)));
        assert_eq!(matrix.last_month(), Some(ym(2024, 3)));
        for row in &matrix.rows()[1..4] {
            assert!(row.iter().all(|v| *v == 0.0));
        }
    }

    #[test]
    fn test_aggregate_unordered_input() {
        let vocab = Vocabulary::default();
        let txs = vec![
            TransactionRecord::new("food", -30.0, "2024-03-02"),
            TransactionRecord::new("food", -10.0, "2024-01-15"),
        ];
        let matrix = aggregate(&txs, &vocab).unwrap();
        assert_eq!(matrix.first_month(), Some(ym(2024, 1)));
        assert_eq!(matrix.column(0).collect::<Vec<_>>(), vec![10.0, 0.0, 30.0]);
    }

    #[test]
    fn test_unknown_category_goes_to_other() {
        let vocab = Vocabulary::default();
        let mut missing = TransactionRecord::new("", -4.0, "2024-01-01");
        missing.category = None;
        let txs = vec![
            TransactionRecord::new("Groceries", -10.0, "2024-01-01"),
            TransactionRecord::new("", -5.0, "2024-01-01"),
            missing,
        ];
        let matrix = aggregate(&txs, &vocab).unwrap();
        assert_eq!(matrix.rows()[0][9], 19.0);
    }

    #[test]
    fn test_malformed_date_is_rejected() {
        let vocab = Vocabulary::default();
        let txs = vec![
            TransactionRecord::new("food", -10.0, "2024-01-01"),
            TransactionRecord::new("food", -10.0, "01/15/2024"),
        ];
        assert!(matches!(
            aggregate(&txs, &vocab),
            Err(Error::MalformedInput(_))
        ));
    }

    #[test]
    fn test_extreme_year_is_rejected() {
        let vocab = Vocabulary::default();
        let txs = vec![
            TransactionRecord::new("food", -10.0, "2024-01-01"),
            TransactionRecord::new("food", -10.0, "+100000-01-01"),
        ];
        assert!(matches!(
            aggregate(&txs, &vocab),
            Err(Error::MalformedInput(_))
        ));
    }

    #[test]
    fn test_huge_amounts_are_rejected() {
        let vocab = Vocabulary::default();
        let txs = vec![
            TransactionRecord::new("food", -1e308, "2024-01-01"),
            TransactionRecord::new("food", -1e308, "2024-01-02"),
        ];
        assert!(matches!(
            aggregate(&txs, &vocab),
            Err(Error::MalformedInput(_))
        ));
    }

    #[test]
    fn test_large_amounts_sum_to_finite_cells() {
        let vocab = Vocabulary::default();
        let txs: Vec<_> = (1..=28)
            .map(|day| TransactionRecord::new("food", -1e12, &format!("2024-01-{:02}", day)))
            .collect();
        let matrix = aggregate(&txs, &vocab).unwrap();
        assert_eq!(matrix.rows()[0][0], 2.8e13);
        assert!(matrix.rows().iter().flatten().all(|v| v.is_finite()));
    }

    #[test]
    fn test_empty_input_is_empty_matrix() {
        let matrix = aggregate(&[], &Vocabulary::default()).unwrap();
        assert!(matrix.is_empty());
        assert_eq!(matrix.width(), 10);
        assert_eq!(matrix.last_month(), None);
    }

    #[test]
    fn test_tail_keeps_recent_months() {
        let rows = (0..5).map(|i| vec![i as f64]).collect();
        let matrix = MonthlyMatrix::from_rows(ym(2023, 11), 1, rows).unwrap();

        let tail = matrix.tail(2);
        assert_eq!(tail.len(), 2);
        assert_eq!(tail.first_month(), Some(ym(2024, 2)));
        assert_eq!(tail.column(0).collect::<Vec<_>>(), vec![3.0, 4.0]);
        assert_eq!(matrix.tail(10), matrix);
        assert!(matrix.tail(0).is_empty());
    }

    #[test]
    fn test_merge_newer_months_win_and_gaps_fill() {
        let old = MonthlyMatrix::from_rows(ym(2024, 1), 1, vec![vec![1.0], vec![2.0]]).unwrap();
        let newer = MonthlyMatrix::from_rows(ym(2024, 2), 1, vec![vec![20.0]]).unwrap();
        let later = MonthlyMatrix::from_rows(ym(2024, 5), 1, vec![vec![50.0]]).unwrap();

        let merged = old.merge(&newer).unwrap().merge(&later).unwrap();
        assert_eq!(merged.first_month(), Some(ym(2024, 1)));
        assert_eq!(
            merged.column(0).collect::<Vec<_>>(),
            vec![1.0, 20.0, 0.0, 0.0, 50.0]
        );
    }

    #[test]
    fn test_split_after() {
        let rows = (0..4).map(|i| vec![i as f64]).collect();
        let matrix = MonthlyMatrix::from_rows(ym(2024, 11), 1, rows).unwrap();

        let (head, rest) = matrix.split_after(ym(2024, 12));
        assert_eq!(head.last_month(), Some(ym(2024, 12)));
        assert_eq!(rest.first_month(), Some(ym(2025, 1)));
        assert_eq!(rest.column(0).collect::<Vec<_>>(), vec![2.0, 3.0]);

        let (head, rest) = matrix.split_after(ym(2020, 1));
        assert!(head.is_empty());
        assert_eq!(rest, matrix);

        let (head, rest) = matrix.split_after(ym(2030, 1));
        assert_eq!(head, matrix);
        assert!(rest.is_empty());
    }

    #[test]
    fn test_merge_width_mismatch() {
        let a = MonthlyMatrix::empty(2);
        let b = MonthlyMatrix::empty(3);
        assert!(a.merge(&b).is_err());
    }

    #[test]
    fn test_matrix_deserialize_rejects_ragged_rows() {
        let json = r#"{"start": {"year": 2024, "month": 1}, "width": 2, "rows": [[1.0, 2.0], [1.0]]}"#;
        let parsed: std::result::Result<MonthlyMatrix, _> = serde_json::from_str(json);
        assert!(parsed.is_err());
    }
}
