//! バッチ感情分類エンジン。
//!
//! 入力レコードをチャンクに分割して順番に分類器へ送り、
//! 出力件数と順序が入力と常に一致するよう整列・フォールバックを行う。
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::classifier::{ClassificationRequest, SentimentClassifier};
use crate::model::{LabeledRecord, Record, Sentiment};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSettings {
    pub batch_size: NonZeroUsize,
    pub inter_batch_delay: Duration,
}

/// How a chunk's returned labels were reconciled with its size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alignment {
    Exact,
    Padded { missing: usize },
    Truncated { excess: usize },
    /// The classifier call failed; every record got the fallback label.
    Fallback,
}

/// Per-run counters, logged once classification ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClassificationStats {
    pub chunks: usize,
    pub exact_chunks: usize,
    pub padded_chunks: usize,
    pub truncated_chunks: usize,
    pub fallback_chunks: usize,
    pub unrecognized_labels: usize,
    pub final_padding: usize,
}

impl ClassificationStats {
    fn record(&mut self, outcome: &ChunkOutcome) {
        self.chunks += 1;
        self.unrecognized_labels += outcome.unrecognized;
        match outcome.alignment {
            Alignment::Exact => self.exact_chunks += 1,
            Alignment::Padded { .. } => self.padded_chunks += 1,
            Alignment::Truncated { .. } => self.truncated_chunks += 1,
            Alignment::Fallback => self.fallback_chunks += 1,
        }
    }
}

#[derive(Debug)]
struct ChunkOutcome {
    labels: Vec<Sentiment>,
    alignment: Alignment,
    unrecognized: usize,
}

/// Result of one classification run: one label per input record, same order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationRun {
    pub records: Vec<LabeledRecord>,
    pub stats: ClassificationStats,
}

/// Forces a label list to exactly `expected` entries.
///
/// Shortfalls are filled with [`Sentiment::FALLBACK`] at the tail; extras are dropped.
#[must_use]
pub fn align_labels(mut labels: Vec<Sentiment>, expected: usize) -> (Vec<Sentiment>, Alignment) {
    let returned = labels.len();
    let alignment = match returned.cmp(&expected) {
        std::cmp::Ordering::Equal => Alignment::Exact,
        std::cmp::Ordering::Less => {
            labels.resize(expected, Sentiment::FALLBACK);
            Alignment::Padded {
                missing: expected - returned,
            }
        }
        std::cmp::Ordering::Greater => {
            labels.truncate(expected);
            Alignment::Truncated {
                excess: returned - expected,
            }
        }
    };
    (labels, alignment)
}

/// Pads `labeled` up to `inputs.len()` from the matching original records.
///
/// Returns the number of records that had to be padded.
fn ensure_complete(inputs: &[Record], labeled: &mut Vec<LabeledRecord>) -> usize {
    let shortfall = inputs.len().saturating_sub(labeled.len());
    if shortfall > 0 {
        let start = labeled.len();
        labeled.extend(
            inputs[start..]
                .iter()
                .cloned()
                .map(|record| LabeledRecord::new(record, Sentiment::FALLBACK)),
        );
    }
    shortfall
}

pub struct BatchClassifier {
    classifier: Arc<dyn SentimentClassifier>,
    settings: BatchSettings,
}

impl BatchClassifier {
    pub fn new(classifier: Arc<dyn SentimentClassifier>, settings: BatchSettings) -> Self {
        Self {
            classifier,
            settings,
        }
    }

    #[must_use]
    pub fn settings(&self) -> BatchSettings {
        self.settings
    }

    /// Labels every record. Never fails and never drops a record.
    pub async fn classify(&self, topic: &str, records: &[Record]) -> ClassificationRun {
        let batch_size = self.settings.batch_size.get();
        let total_chunks = records.len().div_ceil(batch_size);

        info!(
            topic,
            record_count = records.len(),
            batch_size,
            total_chunks,
            "starting batch sentiment classification"
        );

        // strictly sequential: chunk order carries the label alignment
        let outcomes: Vec<(&[Record], ChunkOutcome)> =
            stream::iter(records.chunks(batch_size).enumerate())
                .then(move |(chunk_idx, chunk)| async move {
                    let outcome = self
                        .classify_chunk(topic, chunk, chunk_idx, total_chunks)
                        .await;
                    sleep(self.settings.inter_batch_delay).await;
                    (chunk, outcome)
                })
                .collect()
                .await;

        let mut stats = ClassificationStats::default();
        for (_, outcome) in &outcomes {
            stats.record(outcome);
        }

        let mut labeled: Vec<LabeledRecord> = outcomes
            .into_iter()
            .flat_map(|(chunk, outcome)| {
                chunk
                    .iter()
                    .cloned()
                    .zip(outcome.labels)
                    .map(|(record, label)| LabeledRecord::new(record, label))
            })
            .collect();

        stats.final_padding = ensure_complete(records, &mut labeled);
        if stats.final_padding > 0 {
            warn!(
                input = records.len(),
                padded = stats.final_padding,
                "final count check padded missing records with fallback label"
            );
        }

        info!(
            labeled = labeled.len(),
            chunks = stats.chunks,
            padded_chunks = stats.padded_chunks,
            truncated_chunks = stats.truncated_chunks,
            fallback_chunks = stats.fallback_chunks,
            unrecognized_labels = stats.unrecognized_labels,
            "batch sentiment classification completed"
        );

        ClassificationRun {
            records: labeled,
            stats,
        }
    }

    async fn classify_chunk(
        &self,
        topic: &str,
        chunk: &[Record],
        chunk_idx: usize,
        total_chunks: usize,
    ) -> ChunkOutcome {
        let expected = chunk.len();
        debug!(
            chunk = chunk_idx + 1,
            total_chunks,
            size = expected,
            "classifying chunk"
        );

        let request = ClassificationRequest::new(
            topic,
            chunk.iter().map(|record| record.text.clone()).collect(),
        );

        let raw_labels = match self.classifier.classify(&request).await {
            Ok(response) => response.labels,
            Err(error) => {
                warn!(
                    chunk = chunk_idx + 1,
                    total_chunks,
                    size = expected,
                    error = %error,
                    "chunk classification failed, assigning fallback label to whole chunk"
                );
                return ChunkOutcome {
                    labels: vec![Sentiment::FALLBACK; expected],
                    alignment: Alignment::Fallback,
                    unrecognized: 0,
                };
            }
        };

        let unrecognized = raw_labels
            .iter()
            .filter(|label| Sentiment::parse(label).is_none())
            .count();
        let parsed = raw_labels
            .iter()
            .map(|label| Sentiment::parse_or_fallback(label))
            .collect();

        let (labels, alignment) = align_labels(parsed, expected);
        if alignment != Alignment::Exact {
            warn!(
                chunk = chunk_idx + 1,
                expected,
                returned = raw_labels.len(),
                alignment = ?alignment,
                "label count mismatch"
            );
        }
        if unrecognized > 0 {
            warn!(
                chunk = chunk_idx + 1,
                unrecognized,
                "classifier returned labels outside the known classes"
            );
        }

        ChunkOutcome {
            labels,
            alignment,
            unrecognized,
        }
    }
}
