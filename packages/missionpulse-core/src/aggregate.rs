//! Windowed aggregation over a table.
//!
//! The aggregator reads at most `window` rows and folds them into a
//! [`Summary`]. The window is a bound, not a sample: on larger tables the
//! counts describe the first `window` rows only. Missing and null values
//! never fail the fold; they count as zero (numbers) or `"unknown"` (groups).

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CoreError, StoreError};
use crate::record::Record;
use crate::store::{FetchQuery, RowStore};

/// Group key used for rows without a group value.
pub const UNKNOWN_GROUP: &str = "unknown";

/// Default number of rows folded by the pipeline statistics.
pub const DEFAULT_WINDOW: usize = 200;

/// What to summarize.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummarySpec {
    pub table: String,
    pub sum_field: String,
    pub group_field: String,
    pub average_field: String,
    pub window: usize,
}

impl SummarySpec {
    /// Opportunity pipeline: value sum, phase counts, average win probability.
    pub fn pipeline(window: usize) -> Self {
        Self {
            table: "opportunities".to_string(),
            sum_field: "estimated_value".to_string(),
            group_field: "phase".to_string(),
            average_field: "pwin".to_string(),
            window,
        }
    }
}

/// Derived summary of a window of rows.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Summary {
    pub count: usize,
    pub total: f64,
    pub by_group: BTreeMap<String, u64>,
    /// Mean of the average field, one decimal place
    pub average: f64,
}

/// Pipeline statistics as served over HTTP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineStats {
    pub total_opportunities: usize,
    pub total_pipeline_value: f64,
    pub by_phase: BTreeMap<String, u64>,
    pub avg_pwin: f64,
    /// Row bound the numbers were computed over
    pub window: usize,
}

impl PipelineStats {
    pub fn from_summary(summary: Summary, window: usize) -> Self {
        Self {
            total_opportunities: summary.count,
            total_pipeline_value: summary.total,
            by_phase: summary.by_group,
            avg_pwin: summary.average,
            window,
        }
    }
}

/// Reads a numeric field, treating missing, null and non-numeric values as 0.
/// Numeric strings are parsed; `NaN`, infinities and overflowing values
/// count as 0.
fn numeric(record: &Record, field: &str) -> f64 {
    let value = match record.get(field) {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    value.filter(|v| v.is_finite()).unwrap_or(0.0)
}

fn group_key(record: &Record, field: &str) -> String {
    match record.get(field) {
        None => UNKNOWN_GROUP.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Rounds to one decimal place, halves away from zero.
pub fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Folds rows into a summary. Pure and deterministic.
pub fn fold_rows(rows: &[Record], spec: &SummarySpec) -> Summary {
    let mut summary = Summary {
        count: rows.len(),
        ..Summary::default()
    };
    let mut average_sum = 0.0;

    for row in rows {
        summary.total += numeric(row, &spec.sum_field);
        average_sum += numeric(row, &spec.average_field);
        *summary
            .by_group
            .entry(group_key(row, &spec.group_field))
            .or_insert(0) += 1;
    }

    if summary.count > 0 {
        summary.average = round_one_decimal(average_sum / summary.count as f64);
    }
    summary
}

/// Computes summaries by reading a bounded window from a row store.
pub struct Aggregator {
    store: Arc<dyn RowStore>,
    store_timeout: Duration,
}

impl Aggregator {
    pub fn new(store: Arc<dyn RowStore>, store_timeout: Duration) -> Self {
        Self {
            store,
            store_timeout,
        }
    }

    /// Reads up to `spec.window` rows and folds them.
    ///
    /// # Errors
    /// `CoreError::Store` if the bulk read fails or times out.
    pub async fn summarize(&self, spec: &SummarySpec) -> Result<Summary, CoreError> {
        let query = FetchQuery::new(spec.window);
        let rows = tokio::time::timeout(self.store_timeout, self.store.fetch_all(&spec.table, &query))
            .await
            .map_err(|_| StoreError::Timeout)
            .and_then(|r| r)
            .map_err(|e| {
                tracing::error!("Summary read of {} failed: {}", spec.table, e);
                CoreError::Store(e)
            })?;
        Ok(fold_rows(&rows, spec))
    }

    /// Opportunity pipeline statistics over `window` rows.
    pub async fn pipeline_stats(&self, window: usize) -> Result<PipelineStats, CoreError> {
        let summary = self.summarize(&SummarySpec::pipeline(window)).await?;
        Ok(PipelineStats::from_summary(summary, window))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rows(values: Vec<Value>) -> Vec<Record> {
        values
            .into_iter()
            .enumerate()
            .map(|(i, mut v)| {
                v["id"] = json!(format!("r{}", i));
                Record::from_row(v).unwrap()
            })
            .collect()
    }

    #[test]
    fn test_empty_window() {
        let summary = fold_rows(&[], &SummarySpec::pipeline(DEFAULT_WINDOW));
        assert_eq!(summary.count, 0);
        assert_eq!(summary.total, 0.0);
        assert_eq!(summary.average, 0.0);
        assert!(summary.by_group.is_empty());
    }

    #[test]
    fn test_missing_values_count_as_zero() {
        let rows = rows(vec![
            json!({"phase": "qualify", "pwin": 40}),
            json!({"phase": "negotiate", "pwin": null}),
        ]);
        let summary = fold_rows(&rows, &SummarySpec::pipeline(DEFAULT_WINDOW));
        assert_eq!(summary.count, 2);
        assert_eq!(summary.average, 20.0);
        assert_eq!(summary.by_group.get("qualify"), Some(&1));
        assert_eq!(summary.by_group.get("negotiate"), Some(&1));
        assert_eq!(summary.total, 0.0);
    }

    #[test]
    fn test_sums_and_groups() {
        let rows = rows(vec![
            json!({"phase": "qualify", "estimated_value": 1000000, "pwin": 35}),
            json!({"phase": "qualify", "estimated_value": "250000.5", "pwin": 50}),
            json!({"estimated_value": "n/a", "pwin": 27}),
            json!({"phase": 3, "estimated_value": 10}),
        ]);
        let summary = fold_rows(&rows, &SummarySpec::pipeline(DEFAULT_WINDOW));
        assert_eq!(summary.total, 1_250_010.5);
        assert_eq!(summary.by_group.get("qualify"), Some(&2));
        assert_eq!(summary.by_group.get(UNKNOWN_GROUP), Some(&1));
        assert_eq!(summary.by_group.get("3"), Some(&1));
        // (35 + 50 + 27 + 0) / 4 = 28.0
        assert_eq!(summary.average, 28.0);
    }

    #[test]
    fn test_non_finite_strings_count_as_zero() {
        let rows = rows(vec![
            json!({"phase": "qualify", "estimated_value": 1000, "pwin": 40}),
            json!({"phase": "qualify", "estimated_value": "NaN", "pwin": "inf"}),
            json!({"phase": "qualify", "estimated_value": "1e400", "pwin": "-Infinity"}),
        ]);
        let summary = fold_rows(&rows, &SummarySpec::pipeline(DEFAULT_WINDOW));
        assert_eq!(summary.total, 1000.0);
        assert_eq!(summary.average, 13.3);

        let stats = PipelineStats::from_summary(summary, DEFAULT_WINDOW);
        let value = serde_json::to_value(&stats).unwrap();
        assert_eq!(value["total_pipeline_value"], json!(1000.0));
        assert_eq!(value["avg_pwin"], json!(13.3));
    }

    #[test]
    fn test_round_one_decimal() {
        assert_eq!(round_one_decimal(33.333), 33.3);
        assert_eq!(round_one_decimal(0.25), 0.3);
        assert_eq!(round_one_decimal(-0.25), -0.3);
        assert_eq!(round_one_decimal(12.0), 12.0);
    }

    #[test]
    fn test_pipeline_stats_serialization() {
        let rows = rows(vec![json!({"phase": "qualify", "pwin": 40})]);
        let stats = PipelineStats::from_summary(fold_rows(&rows, &SummarySpec::pipeline(200)), 200);
        let value = serde_json::to_value(&stats).unwrap();
        assert_eq!(value["total_opportunities"], json!(1));
        assert_eq!(value["by_phase"], json!({"qualify": 1}));
        assert_eq!(value["avg_pwin"], json!(40.0));
        assert_eq!(value["window"], json!(200));
    }
}
