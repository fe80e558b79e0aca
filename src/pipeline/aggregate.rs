//! 四半期パーティションからトレンド表を組み立てる。
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::model::{QuarterKey, Sentiment, TrendRow, YearRange};
use crate::store::{LABEL_COLUMN, StoreError, Table, TableStore};

/// Percentage of each class among `labels`.
///
/// Labels are trimmed and case-folded before matching. Labels outside the three classes
/// still count toward the total. An empty input yields zeros.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn class_percentages<'a, I>(labels: I) -> [f64; 3]
where
    I: IntoIterator<Item = &'a str>,
{
    let mut counts = [0usize; 3];
    let mut total = 0usize;
    for label in labels {
        total += 1;
        let folded = label.trim().to_lowercase();
        if let Some(idx) = Sentiment::ALL.iter().position(|s| s.key() == folded) {
            counts[idx] += 1;
        }
    }

    if total == 0 {
        return [0.0; 3];
    }

    counts.map(|count| 100.0 * count as f64 / total as f64)
}

/// Builds the trend row for one partition table.
///
/// # Errors
/// Returns [`StoreError::MissingColumn`] when the table has no label column.
pub fn trend_row(key: QuarterKey, table: &Table) -> Result<TrendRow, StoreError> {
    let resource = key.resource_key();
    let label_idx = table.require_column(&resource, LABEL_COLUMN)?;
    let [positive_pct, negative_pct, neutral_pct] =
        class_percentages(table.column_values(label_idx));

    Ok(TrendRow {
        quarter_id: resource,
        positive_pct,
        negative_pct,
        neutral_pct,
    })
}

/// Mean percentage per class across the produced rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendSummary {
    pub quarters: usize,
    pub mean_positive: f64,
    pub mean_negative: f64,
    pub mean_neutral: f64,
}

impl TrendSummary {
    /// `None` for an empty trend table.
    #[must_use]
    pub fn from_rows(rows: &[TrendRow]) -> Option<Self> {
        if rows.is_empty() {
            return None;
        }
        #[allow(clippy::cast_precision_loss)]
        let n = rows.len() as f64;
        let mean = |sentiment: Sentiment| rows.iter().map(|row| row.pct(sentiment)).sum::<f64>() / n;

        Some(Self {
            quarters: rows.len(),
            mean_positive: mean(Sentiment::Positive),
            mean_negative: mean(Sentiment::Negative),
            mean_neutral: mean(Sentiment::Neutral),
        })
    }
}

pub struct TrendAggregator {
    store: Arc<dyn TableStore>,
}

impl TrendAggregator {
    pub fn new(store: Arc<dyn TableStore>) -> Self {
        Self { store }
    }

    /// One row per persisted quarter in `range`, chronologically ordered.
    ///
    /// Absent, unreadable or label-less partitions are logged and omitted.
    pub fn aggregate(&self, range: YearRange) -> Vec<TrendRow> {
        let mut rows = Vec::new();

        for key in range.quarter_keys() {
            let resource = key.resource_key();
            let table = match self.store.read(&resource) {
                Ok(Some(table)) => table,
                Ok(None) => {
                    warn!(partition = %key, "partition not found, quarter omitted");
                    continue;
                }
                Err(error) => {
                    warn!(partition = %key, error = %error, "failed to read partition, quarter omitted");
                    continue;
                }
            };

            match trend_row(key, &table) {
                Ok(row) => {
                    debug!(
                        partition = %key,
                        records = table.len(),
                        positive = row.positive_pct,
                        negative = row.negative_pct,
                        neutral = row.neutral_pct,
                        "aggregated partition"
                    );
                    rows.push(row);
                }
                Err(error) => {
                    warn!(partition = %key, error = %error, "partition unusable, quarter omitted");
                }
            }
        }

        info!(range = %range, quarters = rows.len(), "aggregation finished");
        rows
    }
}
