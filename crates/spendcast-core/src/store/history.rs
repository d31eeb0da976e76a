//! Training history maintenance
//!
//! A persisted history is an optional run of synthetic bootstrap months
//! followed by a run of observed months. New observations are spliced into
//! the observed run; synthetic months only survive as a prefix that ends
//! exactly where the observed run begins, so no zero rows are ever invented
//! between the two.

use tracing::{debug, warn};

use crate::aggregate::MonthlyMatrix;
use crate::error::{Error, Result};
use crate::models::YearMonth;

/// History after absorbing a batch of observations
#[derive(Debug, Clone, PartialEq)]
pub struct Spliced {
    pub history: MonthlyMatrix,
    /// Last synthetic month still present, if any
    pub synthetic_until: Option<YearMonth>,
}

/// Splice `observed` into `history`, keeping at most `max_months` months
///
/// - Observations overlapping or adjacent to the observed run are merged,
///   with newer values replacing older ones.
/// - Observations that start after a gap begin a new observed run and the
///   old one is dropped.
/// - Observations that end before the observed run begins, or that would
///   not fit in the `max_months` window, are rejected.
pub fn splice(
    history: &MonthlyMatrix,
    synthetic_until: Option<YearMonth>,
    observed: &MonthlyMatrix,
    max_months: usize,
) -> Result<Spliced> {
    let (obs_first, obs_last) = match (observed.first_month(), observed.last_month()) {
        (Some(first), Some(last)) => (first, last),
        _ => {
            return Err(Error::MalformedInput(
                "no expense transactions to learn from".into(),
            ))
        }
    };
    if observed.len() > max_months {
        return Err(Error::MalformedInput(format!(
            "observations span {} months, more than the {} months of history kept",
            observed.len(),
            max_months
        )));
    }

    let (synthetic, real) = match synthetic_until {
        Some(month) => history.split_after(month),
        None => (MonthlyMatrix::empty(history.width()), history.clone()),
    };

    let real = match (real.first_month(), real.last_month()) {
        (Some(first), Some(last)) if obs_first <= last.succ() && first <= obs_last.succ() => {
            real.merge(observed)?
        }
        (Some(first), Some(_)) if obs_last < first => {
            return Err(Error::MalformedInput(format!(
                "observations end at {} but recorded history starts at {}",
                obs_last, first
            )));
        }
        (Some(_), Some(last)) => {
            warn!(
                recorded_until = %last,
                observed_from = %obs_first,
                "Observations start after a gap, discarding older observed history"
            );
            observed.clone()
        }
        _ => observed.clone(),
    };

    let real = real.tail(max_months);
    if real.first_month().is_some_and(|first| obs_first < first) {
        return Err(Error::MalformedInput(format!(
            "observations from {} fall outside the {} most recent months",
            obs_first, max_months
        )));
    }

    let prefix = match real.first_month() {
        Some(first) => {
            let (before, _) = synthetic.split_after(first.pred());
            if before.last_month() == Some(first.pred()) {
                before.tail(max_months - real.len())
            } else {
                MonthlyMatrix::empty(history.width())
            }
        }
        None => MonthlyMatrix::empty(history.width()),
    };
    let synthetic_until = prefix.last_month();
    debug!(
        synthetic_months = prefix.len(),
        observed_months = real.len(),
        "Spliced training history"
    );

    Ok(Spliced {
        history: prefix.merge(&real)?,
        synthetic_until,
    })
}
