use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::ValueEnum;
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use crate::chart::{ChartRenderer, chart_file_name};
use crate::classifier::SentimentClassifier;
use crate::config::Config;
use crate::error::{ErrorKind, PipelineError};
use crate::model::{Record, TrendRow};
use crate::store::{TableStore, input_key, results_key};

pub mod aggregate;
pub mod classify;
pub mod partition;
pub mod tables;

use aggregate::{TrendAggregator, TrendSummary};
use classify::BatchClassifier;
use partition::{QuarterPartitioner, year_hint_from_source};
use tables::{labeled_from_table, labeled_to_table, records_from_input};

/// Subset of stages selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RunMode {
    /// Sentiment classification only.
    Classify,
    /// Quarterly partitioning only.
    Partition,
    /// Trend aggregation and chart only.
    Aggregate,
    /// classify -> partition -> aggregate
    Full,
    /// partition -> aggregate
    PartitionAggregate,
}

impl RunMode {
    #[must_use]
    pub fn stages(self) -> &'static [Stage] {
        match self {
            Self::Classify => &[Stage::Classify],
            Self::Partition => &[Stage::Partition],
            Self::Aggregate => &[Stage::Aggregate],
            Self::Full => &[Stage::Classify, Stage::Partition, Stage::Aggregate],
            Self::PartitionAggregate => &[Stage::Partition, Stage::Aggregate],
        }
    }

    /// Whether the mode needs classifier credentials.
    #[must_use]
    pub fn classifies(self) -> bool {
        self.stages().contains(&Stage::Classify)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Classify,
    Partition,
    Aggregate,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Classify => "classify",
            Self::Partition => "partition",
            Self::Aggregate => "aggregate",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StageSummary {
    Classified {
        files: usize,
        records: usize,
        fallback_chunks: usize,
    },
    Partitioned {
        files: usize,
        merged: usize,
        skipped: usize,
        failed_partitions: usize,
    },
    Aggregated {
        rows: Vec<TrendRow>,
        summary: Option<TrendSummary>,
        chart: Option<PathBuf>,
    },
}

#[derive(Debug)]
pub struct StageFailure {
    pub stage: Stage,
    pub error: PipelineError,
}

#[derive(Debug)]
pub struct RunReport {
    pub run_id: Uuid,
    pub mode: RunMode,
    pub completed: Vec<(Stage, StageSummary)>,
    pub failure: Option<StageFailure>,
}

impl RunReport {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    #[must_use]
    pub fn summary(&self, stage: Stage) -> Option<&StageSummary> {
        self.completed
            .iter()
            .find(|(done, _)| *done == stage)
            .map(|(_, summary)| summary)
    }
}

pub struct PipelineOrchestrator {
    config: Arc<Config>,
    store: Arc<dyn TableStore>,
    renderer: Arc<dyn ChartRenderer>,
    classifier: Option<Arc<dyn SentimentClassifier>>,
    output_dir: PathBuf,
}

impl PipelineOrchestrator {
    pub fn new(
        config: Arc<Config>,
        store: Arc<dyn TableStore>,
        renderer: Arc<dyn ChartRenderer>,
    ) -> Self {
        let output_dir = config
            .data_root()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        Self {
            config,
            store,
            renderer,
            classifier: None,
            output_dir,
        }
    }

    #[must_use]
    pub fn with_classifier(mut self, classifier: Arc<dyn SentimentClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Directory the chart is written to. Defaults to the data root.
    #[must_use]
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Runs the stages of `mode` in order, stopping at the first failed stage.
    pub async fn run(&self, mode: RunMode) -> RunReport {
        let run_id = Uuid::new_v4();
        let span = info_span!("pipeline_run", %run_id, ?mode);
        self.run_stages(run_id, mode).instrument(span).await
    }

    async fn run_stages(&self, run_id: Uuid, mode: RunMode) -> RunReport {
        info!(topic = self.config.topic(), years = ?self.config.years(), "pipeline started");
        let mut report = RunReport {
            run_id,
            mode,
            completed: Vec::new(),
            failure: None,
        };

        for &stage in mode.stages() {
            info!(%stage, "stage started");
            let result = match stage {
                Stage::Classify => self.classify_stage().await,
                Stage::Partition => self.partition_stage(),
                Stage::Aggregate => self.aggregate_stage(),
            };
            match result {
                Ok(summary) => {
                    info!(%stage, "stage completed");
                    report.completed.push((stage, summary));
                }
                Err(error) => {
                    error!(%stage, error = %error, cause = ?error, "stage failed");
                    report.failure = Some(StageFailure { stage, error });
                    break;
                }
            }
        }

        if report.is_success() {
            info!("all selected stages completed");
        }
        report
    }

    async fn classify_stage(&self) -> Result<StageSummary, PipelineError> {
        let classifier = self
            .classifier
            .clone()
            .ok_or(PipelineError::ClassifierUnavailable)?;
        let engine = BatchClassifier::new(classifier, self.config.batch_settings());

        let mut files = 0;
        let mut records_total = 0;
        let mut fallback_chunks = 0;

        for &year in self.config.years() {
            let key = input_key(year);
            let records = match self.load_input(&key) {
                Ok(Some(records)) => records,
                Ok(None) => {
                    warn!(resource = %key, "input not found, skipping year");
                    continue;
                }
                Err(error) => {
                    skip_or_abort(&key, error)?;
                    continue;
                }
            };

            if records.is_empty() {
                warn!(resource = %key, "no valid text data found, skipping year");
                continue;
            }

            info!(resource = %key, records = records.len(), "classifying input");
            let run = engine.classify(self.config.topic(), &records).await;

            let output = results_key(year);
            self.store.write(&output, &labeled_to_table(&run.records))?;
            info!(
                resource = %output,
                records = run.records.len(),
                fallback_chunks = run.stats.fallback_chunks,
                "wrote classification results"
            );

            files += 1;
            records_total += run.records.len();
            fallback_chunks += run.stats.fallback_chunks;
        }

        Ok(StageSummary::Classified {
            files,
            records: records_total,
            fallback_chunks,
        })
    }

    fn load_input(&self, key: &str) -> Result<Option<Vec<Record>>, PipelineError> {
        let Some(table) = self.store.read(key)? else {
            return Ok(None);
        };
        Ok(Some(records_from_input(key, &table)?))
    }

    fn partition_stage(&self) -> Result<StageSummary, PipelineError> {
        let partitioner = QuarterPartitioner::new(Arc::clone(&self.store));

        let mut files = 0;
        let mut available = 0;
        let mut written = 0;
        let mut merged = 0;
        let mut skipped = 0;
        let mut failed_partitions = 0;

        for &year in self.config.years() {
            let key = results_key(year);
            let table = match self.store.read(&key) {
                Ok(Some(table)) => table,
                Ok(None) => {
                    warn!(resource = %key, "results not found, skipping year");
                    continue;
                }
                Err(error) => {
                    skip_or_abort(&key, error.into())?;
                    continue;
                }
            };
            let records = match labeled_from_table(&key, &table) {
                Ok(records) => records,
                Err(error) => {
                    skip_or_abort(&key, error.into())?;
                    continue;
                }
            };

            let report = partitioner.partition(&records, Some(year_hint_from_source(&key)));

            files += 1;
            available += records.len() - report.skipped;
            written += report.outcomes.len();
            merged += report.total_merged();
            skipped += report.skipped;
            failed_partitions += report.failures.len();
        }

        if available > 0 && written == 0 {
            return Err(PipelineError::NoPartitionsWritten { available });
        }

        info!(files, merged, skipped, failed_partitions, "partitioning finished");
        Ok(StageSummary::Partitioned {
            files,
            merged,
            skipped,
            failed_partitions,
        })
    }

    fn aggregate_stage(&self) -> Result<StageSummary, PipelineError> {
        let range = self.config.year_range();
        let rows = TrendAggregator::new(Arc::clone(&self.store)).aggregate(range);

        if rows.is_empty() {
            warn!(range = %range, "no data available, chart not generated");
            return Ok(StageSummary::Aggregated {
                rows,
                summary: None,
                chart: None,
            });
        }

        let summary = TrendSummary::from_rows(&rows);
        if let Some(summary) = &summary {
            info!(
                quarters = summary.quarters,
                mean_positive = summary.mean_positive,
                mean_negative = summary.mean_negative,
                mean_neutral = summary.mean_neutral,
                "trend summary"
            );
        }

        let topic = self.config.topic();
        let chart = self.config.chart();
        let path = self.output_dir.join(chart_file_name(topic, range));
        self.renderer
            .render(&rows, chart, &chart.title(topic, range), &path)
            .map_err(PipelineError::Chart)?;
        info!(path = %path.display(), "trend chart saved");

        Ok(StageSummary::Aggregated {
            rows,
            summary,
            chart: Some(path),
        })
    }
}

/// Logs and swallows file-level errors; propagates anything that aborts the stage.
fn skip_or_abort(key: &str, error: PipelineError) -> Result<(), PipelineError> {
    match error.kind() {
        ErrorKind::SkipFile | ErrorKind::Recoverable => {
            warn!(resource = %key, error = %error, cause = ?error, "skipping resource");
            Ok(())
        }
        ErrorKind::AbortRun => Err(error),
    }
}
