//! Transaction file readers
//!
//! Two formats are accepted, chosen by file extension:
//! - CSV with a header row naming `category`, `amount` and `date` columns
//!   (any order, case-insensitive, extra columns ignored)
//! - JSON: an array of `{category, amount, date}` objects

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use csv::{ReaderBuilder, StringRecord};
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::{Amount, TransactionRecord};

/// Supported transaction file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionFormat {
    Csv,
    Json,
}

impl TransactionFormat {
    /// Detect the format from a file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "csv" => Some(Self::Csv),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Read every transaction from a CSV or JSON file
pub fn read_transactions_file(path: &Path) -> Result<Vec<TransactionRecord>> {
    let format = TransactionFormat::from_path(path).ok_or_else(|| {
        Error::MalformedInput(format!(
            "{}: expected a .csv or .json transaction file",
            path.display()
        ))
    })?;
    let reader = BufReader::new(File::open(path)?);

    let transactions = match format {
        TransactionFormat::Csv => parse_csv(reader)?,
        TransactionFormat::Json => parse_json(reader)?,
    };
    debug!(path = %path.display(), count = transactions.len(), "Read transaction file");
    Ok(transactions)
}

/// Parse a JSON array of transactions
pub fn parse_json<R: Read>(reader: R) -> Result<Vec<TransactionRecord>> {
    serde_json::from_reader(reader)
        .map_err(|e| Error::MalformedInput(format!("invalid transaction JSON: {}", e)))
}

fn column(headers: &StringRecord, name: &str) -> Option<usize> {
    headers
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case(name))
}

/// Parse CSV transactions with a `category,amount,date` header
pub fn parse_csv<R: Read>(reader: R) -> Result<Vec<TransactionRecord>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    let amount_col = column(&headers, "amount")
        .ok_or_else(|| Error::MalformedInput("CSV is missing an 'amount' column".into()))?;
    let date_col = column(&headers, "date")
        .ok_or_else(|| Error::MalformedInput("CSV is missing a 'date' column".into()))?;
    let category_col = column(&headers, "category");

    let mut transactions = Vec::new();
    for (i, result) in rdr.records().enumerate() {
        let record = result?;
        // Header is line 1
        let line = i + 2;

        let date = record
            .get(date_col)
            .filter(|d| !d.is_empty())
            .ok_or_else(|| Error::MalformedInput(format!("line {}: missing date", line)))?;
        let raw_amount = record
            .get(amount_col)
            .ok_or_else(|| Error::MalformedInput(format!("line {}: missing amount", line)))?;
        let category = category_col
            .and_then(|c| record.get(c))
            .filter(|c| !c.is_empty())
            .map(str::to_string);

        transactions.push(TransactionRecord {
            category,
            amount: parse_amount(raw_amount)
                .map_err(|e| Error::MalformedInput(format!("line {}: {}", line, e)))?,
            date: date.to_string(),
        });
    }

    Ok(transactions)
}

/// Parse an amount cell, tolerating currency symbols, thousands separators
/// and accounting-style parentheses for negatives
fn parse_amount(s: &str) -> Result<Amount> {
    let cleaned: String = s
        .trim()
        .replace(['$', ',', ' '], "")
        .replace('(', "-")
        .replace(')', "");

    let amount = Amount::Text(cleaned);
    let value = amount
        .value()
        .map_err(|_| Error::MalformedInput(format!("unparseable amount: {:?}", s)))?;
    Ok(Amount::Number(value))
}
