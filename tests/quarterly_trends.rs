use std::sync::Arc;

use sentiment_trend::chart::SvgChartRenderer;
use sentiment_trend::config::{Config, ConfigOverrides};
use sentiment_trend::model::{
    LabeledRecord, PartitionYear, Quarter, QuarterKey, Record, Sentiment, YearRange,
};
use sentiment_trend::pipeline::aggregate::TrendAggregator;
use sentiment_trend::pipeline::partition::QuarterPartitioner;
use sentiment_trend::pipeline::{PipelineOrchestrator, RunMode, Stage, StageSummary};
use sentiment_trend::store::{
    CsvTableStore, LABEL_COLUMN, MemoryTableStore, TEXT_COLUMN, TIMESTAMP_COLUMN, Table,
    TableStore,
};
use sentiment_trend::util::time::parse_timestamp;

fn labeled(text: &str, ts: &str, label: Sentiment) -> LabeledRecord {
    LabeledRecord::new(Record::new(text, parse_timestamp(ts)), label)
}

#[test]
fn one_record_per_quarter_lands_in_four_partitions() {
    let store = Arc::new(MemoryTableStore::new());
    let partitioner = QuarterPartitioner::new(store.clone());
    let records = vec![
        labeled("jan", "2024-01-10 12:00:00", Sentiment::Positive),
        labeled("apr", "2024-04-10 12:00:00", Sentiment::Negative),
        labeled("jul", "2024-07-10 12:00:00", Sentiment::Neutral),
        labeled("oct", "2024-10-10 12:00:00", Sentiment::Positive),
    ];

    let report = partitioner.partition(&records, None);

    assert_eq!(report.year, PartitionYear::Known(2024));
    let counts = report.merged_counts();
    assert_eq!(counts.len(), 4);
    for quarter in Quarter::ALL {
        let key = QuarterKey::known(2024, quarter);
        assert_eq!(counts[&key], 1);
        assert_eq!(store.get(&key.resource_key()).expect("partition").len(), 1);
    }
}

#[test]
fn merging_the_same_batch_twice_appends_both_copies() {
    let store = Arc::new(MemoryTableStore::new());
    let partitioner = QuarterPartitioner::new(store.clone());

    let existing: Vec<_> = (0..3)
        .map(|idx| labeled(&format!("old {idx}"), "2024-02-01 00:00:00", Sentiment::Neutral))
        .collect();
    partitioner.partition(&existing, Some("2024"));

    let batch: Vec<_> = (0..2)
        .map(|idx| labeled(&format!("new {idx}"), "2024-03-01 00:00:00", Sentiment::Positive))
        .collect();
    partitioner.partition(&batch, Some("2024"));
    let report = partitioner.partition(&batch, Some("2024"));

    // M + 2N: no deduplication
    let partition = store.get("2024_Q1").expect("partition");
    assert_eq!(partition.len(), 3 + 2 * 2);
    assert_eq!(
        report.outcomes[&QuarterKey::known(2024, Quarter::Q1)].partition_size,
        7
    );
    let texts: Vec<_> = partition.rows().iter().map(|row| row[0].as_str()).collect();
    assert_eq!(
        texts,
        vec!["old 0", "old 1", "old 2", "new 0", "new 1", "new 0", "new 1"]
    );
}

#[test]
fn missing_quarter_is_absent_from_trend_table() {
    let store = Arc::new(MemoryTableStore::new());
    let partitioner = QuarterPartitioner::new(store.clone());
    partitioner.partition(
        &[
            labeled("a", "2024-01-05 00:00:00", Sentiment::Positive),
            labeled("b", "2024-02-05 00:00:00", Sentiment::Negative),
            labeled("c", "2024-08-05 00:00:00", Sentiment::Neutral),
            labeled("d", "2024-11-05 00:00:00", Sentiment::Positive),
        ],
        Some("2024"),
    );

    let rows = TrendAggregator::new(store).aggregate(YearRange::new(2024, 2024).expect("range"));

    let ids: Vec<_> = rows.iter().map(|row| row.quarter_id.as_str()).collect();
    assert_eq!(ids, vec!["2024_Q1", "2024_Q3", "2024_Q4"]);
    assert!((rows[0].positive_pct - 50.0).abs() < 1e-9);
    assert!((rows[0].negative_pct - 50.0).abs() < 1e-9);
    assert!(rows[0].neutral_pct.abs() < f64::EPSILON);
    for row in &rows {
        let total = row.positive_pct + row.negative_pct + row.neutral_pct;
        assert!((total - 100.0).abs() < 1e-6);
    }
}

#[tokio::test]
async fn partition_and_aggregate_against_csv_files() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(CsvTableStore::new(dir.path()));

    let mut results = Table::new([TEXT_COLUMN, LABEL_COLUMN, TIMESTAMP_COLUMN]);
    results.push_row(["great plant", "positive", "2024-01-02 03:04:05"]);
    results.push_row(["bad idea", "Negative", "2024-05-02 03:04:05"]);
    results.push_row(["no date", "Neutral", ""]);
    store
        .write("results_2024_sentiment", &results)
        .expect("seed results");

    let config = temp_env::with_vars(
        [
            ("ANALYSIS_YEARS", Some("2024")),
            ("ANALYSIS_TOPIC", Some("nuclear power")),
            ("CHART_DPI", Some("50")),
        ],
        Config::from_env,
    )
    .expect("config")
    .with_overrides(&ConfigOverrides {
        data_root: Some(dir.path().to_path_buf()),
        ..ConfigOverrides::default()
    })
    .expect("overrides");
    config.validate(RunMode::PartitionAggregate).expect("valid");

    let report = PipelineOrchestrator::new(Arc::new(config), store.clone(), Arc::new(SvgChartRenderer))
        .run(RunMode::PartitionAggregate)
        .await;

    assert!(report.is_success(), "{:?}", report.failure);
    assert_eq!(
        report.summary(Stage::Partition),
        Some(&StageSummary::Partitioned {
            files: 1,
            merged: 2,
            skipped: 1,
            failed_partitions: 0,
        })
    );
    assert!(dir.path().join("2024_Q1.csv").exists());
    assert!(dir.path().join("2024_Q2.csv").exists());

    let chart = dir
        .path()
        .join("nuclear_power_sentiment_trend_2024_2024_by_quarter.svg");
    let svg = std::fs::read_to_string(&chart).expect("chart written");
    assert!(svg.contains("Nuclear Power Sentiment Trends (2024-2024)"));
    assert!(svg.contains(r#"width="700" height="400""#));
}
