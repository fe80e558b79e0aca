//! 四半期パーティション分割とマージ。
//!
//! ラベル付きレコードを (年, 四半期) ごとにまとめ、既存パーティションの末尾へ追記して
//! 全体を書き戻す。重複排除は行わない（同じ入力を 2 回流すと件数も 2 倍になる）。
use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Datelike;
use tracing::{info, warn};

use crate::model::{LabeledRecord, PartitionYear, Quarter, QuarterKey};
use crate::store::{StoreError, TableStore};

use super::tables::labeled_to_table;

/// What happened to one partition during a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Records appended by this run.
    pub merged: usize,
    /// Partition size after the merge.
    pub partition_size: usize,
    /// `true` when no partition existed before.
    pub created: bool,
}

#[derive(Debug)]
pub struct PartitionFailure {
    pub key: QuarterKey,
    pub error: StoreError,
}

#[derive(Debug)]
pub struct PartitionReport {
    pub year: PartitionYear,
    pub outcomes: BTreeMap<QuarterKey, MergeOutcome>,
    /// Records excluded for lacking a usable timestamp.
    pub skipped: usize,
    pub failures: Vec<PartitionFailure>,
}

impl PartitionReport {
    /// Records merged per partition.
    #[must_use]
    pub fn merged_counts(&self) -> BTreeMap<QuarterKey, usize> {
        self.outcomes
            .iter()
            .map(|(key, outcome)| (*key, outcome.merged))
            .collect()
    }

    #[must_use]
    pub fn total_merged(&self) -> usize {
        self.outcomes.values().map(|outcome| outcome.merged).sum()
    }
}

/// Last `_`-separated segment of a resource key, e.g. `2024` for `filtered_tweets_2024`.
#[must_use]
pub fn year_hint_from_source(key: &str) -> &str {
    key.rsplit('_').next().unwrap_or(key)
}

/// Resolves the partition year for a batch of records.
///
/// A purely numeric hint wins; otherwise the most common timestamp year (ties go to the
/// earliest year); otherwise [`PartitionYear::Unknown`].
#[must_use]
pub fn resolve_year(records: &[LabeledRecord], source_year_hint: Option<&str>) -> PartitionYear {
    if let Some(year) = source_year_hint
        .map(str::trim)
        .filter(|hint| !hint.is_empty() && hint.chars().all(|c| c.is_ascii_digit()))
        .and_then(|hint| hint.parse::<i32>().ok())
    {
        return PartitionYear::Known(year);
    }

    let mut counts: BTreeMap<i32, usize> = BTreeMap::new();
    for ts in records.iter().filter_map(LabeledRecord::timestamp) {
        *counts.entry(ts.year()).or_insert(0) += 1;
    }

    // BTreeMap iterates ascending, and max_by_key keeps the last maximum, so walk in reverse
    counts
        .into_iter()
        .rev()
        .max_by_key(|(_, count)| *count)
        .map_or(PartitionYear::Unknown, |(year, _)| PartitionYear::Known(year))
}

/// Groups records by quarter, preserving input order inside each bucket.
///
/// Returns the buckets and the number of records without a timestamp.
#[must_use]
pub fn bucket_by_quarter(records: &[LabeledRecord]) -> (BTreeMap<Quarter, Vec<&LabeledRecord>>, usize) {
    let mut buckets: BTreeMap<Quarter, Vec<&LabeledRecord>> = BTreeMap::new();
    let mut skipped = 0;
    for record in records {
        match record.timestamp() {
            Some(ts) => buckets.entry(Quarter::of(ts)).or_default().push(record),
            None => skipped += 1,
        }
    }
    (buckets, skipped)
}

pub struct QuarterPartitioner {
    store: Arc<dyn TableStore>,
}

impl QuarterPartitioner {
    pub fn new(store: Arc<dyn TableStore>) -> Self {
        Self { store }
    }

    /// Buckets `records` by quarter and merges each bucket into its persisted partition.
    ///
    /// A partition that cannot be read or written is reported in
    /// [`PartitionReport::failures`]; the remaining partitions are still processed.
    pub fn partition(
        &self,
        records: &[LabeledRecord],
        source_year_hint: Option<&str>,
    ) -> PartitionReport {
        let year = resolve_year(records, source_year_hint);
        let (buckets, skipped) = bucket_by_quarter(records);

        info!(
            year = %year,
            processed = records.len() - skipped,
            skipped,
            "bucketed records by quarter"
        );

        let mut outcomes = BTreeMap::new();
        let mut failures = Vec::new();

        for (quarter, bucket) in buckets {
            let key = QuarterKey::new(year, quarter);
            match self.merge(key, &bucket) {
                Ok(outcome) => {
                    outcomes.insert(key, outcome);
                }
                Err(error) => {
                    warn!(partition = %key, error = %error, "failed to merge partition, skipping");
                    failures.push(PartitionFailure { key, error });
                }
            }
        }

        PartitionReport {
            year,
            outcomes,
            skipped,
            failures,
        }
    }

    fn merge(&self, key: QuarterKey, bucket: &[&LabeledRecord]) -> Result<MergeOutcome, StoreError> {
        let resource = key.resource_key();
        let incoming = labeled_to_table(bucket.iter().copied());

        let (table, created) = match self.store.read(&resource)? {
            Some(mut existing) => {
                existing.append(&incoming);
                (existing, false)
            }
            None => (incoming, true),
        };

        self.store.write(&resource, &table)?;

        info!(
            partition = %key,
            merged = bucket.len(),
            partition_size = table.len(),
            created,
            "persisted quarterly partition"
        );

        Ok(MergeOutcome {
            merged: bucket.len(),
            partition_size: table.len(),
            created,
        })
    }
}
