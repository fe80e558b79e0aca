use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

use sentiment_trend::{
    chart::SvgChartRenderer,
    clients::ChatCompletionClassifier,
    config::{Config, ConfigOverrides},
    observability,
    pipeline::{PipelineOrchestrator, RunMode},
    store::CsvTableStore,
};

/// Social-media sentiment trend pipeline.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Stages to run
    #[arg(value_enum, default_value_t = RunMode::Full)]
    mode: RunMode,

    /// First year of the analysis range (overrides ANALYSIS_YEARS)
    #[arg(long)]
    start_year: Option<i32>,

    /// Last year of the analysis range (overrides ANALYSIS_YEARS)
    #[arg(long)]
    end_year: Option<i32>,

    /// Data directory (overrides SENTIMENT_DATA_ROOT)
    #[arg(long)]
    data_root: Option<PathBuf>,

    /// Analysis topic (overrides ANALYSIS_TOPIC)
    #[arg(long)]
    topic: Option<String>,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            start_year: self.start_year,
            end_year: self.end_year,
            data_root: self.data_root.clone(),
            topic: self.topic.clone(),
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    std::panic::set_hook(Box::new(|panic_info| {
        let message = panic_info
            .payload()
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| {
                panic_info
                    .payload()
                    .downcast_ref::<String>()
                    .map(String::as_str)
            })
            .unwrap_or("unknown panic payload");

        if let Some(location) = panic_info.location() {
            error!(
                file = location.file(),
                line = location.line(),
                column = location.column(),
                message,
                "panic occurred"
            );
        } else {
            error!(message, "panic occurred without location information");
        }
    }));

    if let Err(err) = observability::init() {
        eprintln!("failed to initialize tracing: {err:#}");
        return ExitCode::FAILURE;
    }

    let cli = Cli::parse();
    match run(&cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            error!(error = %format!("{err:#}"), "pipeline aborted");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli) -> anyhow::Result<bool> {
    let config = Config::from_env()
        .and_then(|config| config.with_overrides(&cli.overrides()))
        .context("failed to load configuration")?;
    config
        .validate(cli.mode)
        .context("configuration validation failed")?;
    info!(?config, mode = ?cli.mode, "configuration loaded");

    let data_root = config
        .data_root()
        .context("data root is not configured")?
        .to_path_buf();
    let store = Arc::new(CsvTableStore::new(data_root));

    let mut orchestrator = PipelineOrchestrator::new(
        Arc::new(config.clone()),
        store,
        Arc::new(SvgChartRenderer),
    );
    if cli.mode.classifies() {
        let classifier = ChatCompletionClassifier::new(config.chat_completion()?)
            .context("failed to build classifier client")?;
        orchestrator = orchestrator.with_classifier(Arc::new(classifier));
    }

    let report = orchestrator.run(cli.mode).await;
    if let Some(failure) = &report.failure {
        error!(run_id = %report.run_id, stage = %failure.stage, "pipeline finished with errors");
    } else {
        info!(run_id = %report.run_id, stages = report.completed.len(), "pipeline finished");
    }
    Ok(report.is_success())
}
