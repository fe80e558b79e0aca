use std::{
    collections::BTreeMap,
    env, fmt,
    num::NonZeroUsize,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use thiserror::Error;

use crate::chart::{ChartConfig, Marker};
use crate::clients::ChatCompletionConfig;
use crate::model::{Sentiment, YearRange};
use crate::pipeline::RunMode;
use crate::pipeline::classify::BatchSettings;
use crate::util::redact::redact;

pub const API_KEY_PLACEHOLDER: &str = "your_api_key_here";

const DATA_ROOT: &str = "SENTIMENT_DATA_ROOT";
const API_KEY: &str = "AZURE_API_KEY";
const ENDPOINT: &str = "AZURE_OPENAI_ENDPOINT";

#[derive(Clone, PartialEq)]
pub struct Config {
    data_root: Option<PathBuf>,
    api_key: Option<String>,
    endpoint: Option<String>,
    deployment: String,
    api_version: String,
    classifier_timeout: Duration,
    topic: String,
    years: Vec<i32>,
    year_range: YearRange,
    batch_size: NonZeroUsize,
    classify_delay: Duration,
    chart: ChartConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable: {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {source}")]
    Invalid {
        name: &'static str,
        #[source]
        source: anyhow::Error,
    },
    #[error("data root does not exist or is not a directory: {}", .0.display())]
    DataRootNotFound(PathBuf),
    #[error("AZURE_API_KEY still holds the placeholder value")]
    PlaceholderApiKey,
    #[error("start year {start} is after end year {end}")]
    InvalidYearRange { start: i32, end: i32 },
}

/// Command-line values that take precedence over the environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub start_year: Option<i32>,
    pub end_year: Option<i32>,
    pub data_root: Option<PathBuf>,
    pub topic: Option<String>,
}

impl Config {
    /// 環境変数からパイプラインの設定値を読み込む。
    ///
    /// 認証情報とデータディレクトリの存在確認は実行モードに依存するため
    /// [`Config::validate`] で行う。
    ///
    /// # Errors
    /// 数値・年リスト・チャート設定のパースに失敗した場合は [`ConfigError`] を返す。
    pub fn from_env() -> Result<Self, ConfigError> {
        let data_root = optional_var(DATA_ROOT).map(PathBuf::from);
        let api_key = optional_var(API_KEY);
        let endpoint = optional_var(ENDPOINT);
        let deployment =
            env::var("AZURE_DEPLOYMENT_NAME").unwrap_or_else(|_| "o4-mini".to_string());
        let api_version =
            env::var("AZURE_API_VERSION").unwrap_or_else(|_| "2025-01-01-preview".to_string());
        let classifier_timeout = parse_duration_secs("CLASSIFIER_TIMEOUT_SECS", 120)?;
        let topic = env::var("ANALYSIS_TOPIC").unwrap_or_else(|_| "nuclear power".to_string());
        let years = parse_years("ANALYSIS_YEARS", "2024,2025")?;
        let year_range = span_of(&years)?;
        let batch_size = parse_non_zero_usize("CLASSIFY_BATCH_SIZE", 30)?;
        let classify_delay = parse_duration_ms("CLASSIFY_DELAY_MS", 1000)?;
        let chart = chart_from_env()?;

        Ok(Self {
            data_root,
            api_key,
            endpoint,
            deployment,
            api_version,
            classifier_timeout,
            topic,
            years,
            year_range,
            batch_size,
            classify_delay,
            chart,
        })
    }

    /// Applies command-line overrides. Overriding either year bound replaces the
    /// processed year list with the resulting range.
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidYearRange`] when the start year ends up after the end year.
    pub fn with_overrides(mut self, overrides: &ConfigOverrides) -> Result<Self, ConfigError> {
        if let Some(root) = &overrides.data_root {
            self.data_root = Some(root.clone());
        }
        if let Some(topic) = &overrides.topic {
            self.topic.clone_from(topic);
        }
        if overrides.start_year.is_some() || overrides.end_year.is_some() {
            let start = overrides.start_year.unwrap_or(self.year_range.start);
            let end = overrides.end_year.unwrap_or(self.year_range.end);
            self.year_range =
                YearRange::new(start, end).ok_or(ConfigError::InvalidYearRange { start, end })?;
            self.years = (start..=end).collect();
        }
        Ok(self)
    }

    /// Checks the settings `mode` depends on.
    ///
    /// # Errors
    /// Fails when the data root is missing, or when a classifying mode lacks credentials.
    pub fn validate(&self, mode: RunMode) -> Result<(), ConfigError> {
        let root = self.data_root.as_ref().ok_or(ConfigError::Missing(DATA_ROOT))?;
        if !root.is_dir() {
            return Err(ConfigError::DataRootNotFound(root.clone()));
        }

        if mode.classifies() {
            let key = self.api_key.as_deref().ok_or(ConfigError::Missing(API_KEY))?;
            if key.trim().is_empty() || key == API_KEY_PLACEHOLDER {
                return Err(ConfigError::PlaceholderApiKey);
            }
            if self.endpoint.is_none() {
                return Err(ConfigError::Missing(ENDPOINT));
            }
        }
        Ok(())
    }

    /// # Errors
    /// Returns [`ConfigError::Missing`] when the endpoint or API key is unset.
    pub fn chat_completion(&self) -> Result<ChatCompletionConfig, ConfigError> {
        Ok(ChatCompletionConfig {
            endpoint: self.endpoint.clone().ok_or(ConfigError::Missing(ENDPOINT))?,
            deployment: self.deployment.clone(),
            api_version: self.api_version.clone(),
            api_key: self.api_key.clone().ok_or(ConfigError::Missing(API_KEY))?,
            timeout: self.classifier_timeout,
        })
    }

    #[must_use]
    pub fn batch_settings(&self) -> BatchSettings {
        BatchSettings {
            batch_size: self.batch_size,
            inter_batch_delay: self.classify_delay,
        }
    }

    #[must_use]
    pub fn data_root(&self) -> Option<&Path> {
        self.data_root.as_deref()
    }

    #[must_use]
    pub fn deployment(&self) -> &str {
        &self.deployment
    }

    #[must_use]
    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    #[must_use]
    pub fn classifier_timeout(&self) -> Duration {
        self.classifier_timeout
    }

    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    #[must_use]
    pub fn years(&self) -> &[i32] {
        &self.years
    }

    #[must_use]
    pub fn year_range(&self) -> YearRange {
        self.year_range
    }

    #[must_use]
    pub fn batch_size(&self) -> NonZeroUsize {
        self.batch_size
    }

    #[must_use]
    pub fn classify_delay(&self) -> Duration {
        self.classify_delay
    }

    #[must_use]
    pub fn chart(&self) -> &ChartConfig {
        &self.chart
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("data_root", &self.data_root)
            .field("api_key", &self.api_key.as_deref().map(redact))
            .field("endpoint", &self.endpoint)
            .field("deployment", &self.deployment)
            .field("api_version", &self.api_version)
            .field("classifier_timeout", &self.classifier_timeout)
            .field("topic", &self.topic)
            .field("years", &self.years)
            .field("year_range", &self.year_range)
            .field("batch_size", &self.batch_size)
            .field("classify_delay", &self.classify_delay)
            .field("chart", &self.chart)
            .finish()
    }
}

fn optional_var(name: &'static str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn parse_non_zero_usize(name: &'static str, default: usize) -> Result<NonZeroUsize, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    let parsed = raw.trim().parse::<usize>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })?;
    NonZeroUsize::new(parsed).ok_or_else(|| ConfigError::Invalid {
        name,
        source: anyhow::anyhow!("must be greater than zero"),
    })
}

fn parse_duration_secs(name: &'static str, default_secs: u64) -> Result<Duration, ConfigError> {
    parse_u64(name, default_secs).map(Duration::from_secs)
}

fn parse_duration_ms(name: &'static str, default_ms: u64) -> Result<Duration, ConfigError> {
    parse_u64(name, default_ms).map(Duration::from_millis)
}

fn parse_u64(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.trim().parse::<u64>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}

fn parse_u32(name: &'static str, default: u32) -> Result<u32, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.trim().parse::<u32>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}

fn parse_positive_f64(name: &'static str, default: f64) -> Result<f64, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    let value = raw.trim().parse::<f64>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })?;
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(ConfigError::Invalid {
            name,
            source: anyhow::anyhow!("must be a positive number"),
        })
    }
}

fn parse_csv(name: &'static str, default: &str) -> Vec<String> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_years(name: &'static str, default: &str) -> Result<Vec<i32>, ConfigError> {
    let years = parse_csv(name, default)
        .iter()
        .map(|raw| {
            raw.parse::<i32>().map_err(|error| ConfigError::Invalid {
                name,
                source: anyhow::Error::new(error),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    if years.is_empty() {
        return Err(ConfigError::Invalid {
            name,
            source: anyhow::anyhow!("at least one year is required"),
        });
    }
    Ok(years)
}

fn span_of(years: &[i32]) -> Result<YearRange, ConfigError> {
    let start = years.iter().copied().min();
    let end = years.iter().copied().max();
    start
        .zip(end)
        .and_then(|(start, end)| YearRange::new(start, end))
        .ok_or_else(|| ConfigError::Invalid {
            name: "ANALYSIS_YEARS",
            source: anyhow::anyhow!("at least one year is required"),
        })
}

/// Parses `class=value` pairs such as `positive=#00ff00,neutral=#999999`.
fn parse_class_map<T>(name: &'static str) -> Result<BTreeMap<Sentiment, T>, ConfigError>
where
    T: FromStr,
    T::Err: Into<anyhow::Error>,
{
    let mut map = BTreeMap::new();
    for pair in parse_csv(name, "") {
        let (class, value) = pair.split_once('=').ok_or_else(|| ConfigError::Invalid {
            name,
            source: anyhow::anyhow!("expected class=value, got {pair:?}"),
        })?;
        let sentiment = Sentiment::parse(class).ok_or_else(|| ConfigError::Invalid {
            name,
            source: anyhow::anyhow!("unknown sentiment class {class:?}"),
        })?;
        let value = value.trim().parse::<T>().map_err(|error| ConfigError::Invalid {
            name,
            source: error.into(),
        })?;
        map.insert(sentiment, value);
    }
    Ok(map)
}

fn chart_from_env() -> Result<ChartConfig, ConfigError> {
    let mut chart = ChartConfig::default();
    chart.width_in = parse_positive_f64("CHART_WIDTH_IN", chart.width_in)?;
    chart.height_in = parse_positive_f64("CHART_HEIGHT_IN", chart.height_in)?;
    chart.dpi = parse_u32("CHART_DPI", chart.dpi)?;
    if let Some(template) = optional_var("CHART_TITLE_TEMPLATE") {
        chart.title_template = template;
    }
    chart.colors.extend(parse_class_map::<String>("CHART_COLORS")?);
    chart.markers.extend(parse_class_map::<Marker>("CHART_MARKERS")?);
    Ok(chart)
}

#[cfg(test)]
mod tests {
    use super::*;

    const VARS: [&str; 17] = [
        DATA_ROOT,
        API_KEY,
        ENDPOINT,
        "AZURE_DEPLOYMENT_NAME",
        "AZURE_API_VERSION",
        "CLASSIFIER_TIMEOUT_SECS",
        "ANALYSIS_TOPIC",
        "ANALYSIS_YEARS",
        "CLASSIFY_BATCH_SIZE",
        "CLASSIFY_DELAY_MS",
        "CHART_WIDTH_IN",
        "CHART_HEIGHT_IN",
        "CHART_DPI",
        "CHART_TITLE_TEMPLATE",
        "CHART_COLORS",
        "CHART_MARKERS",
        "LOG_FORMAT",
    ];

    /// Clears every variable the loader reads, then applies `set`.
    fn with_env<R>(set: &[(&'static str, &str)], f: impl FnOnce() -> R) -> R {
        let mut vars: Vec<(&'static str, Option<String>)> =
            VARS.iter().map(|name| (*name, None)).collect();
        for (name, value) in set {
            vars.retain(|(existing, _)| existing != name);
            vars.push((*name, Some((*value).to_string())));
        }
        temp_env::with_vars(vars, f)
    }

    #[test]
    fn from_env_uses_defaults_when_optional_missing() {
        let config = with_env(&[], Config::from_env).expect("config should load");

        assert_eq!(config.data_root(), None);
        assert_eq!(config.deployment(), "o4-mini");
        assert_eq!(config.api_version(), "2025-01-01-preview");
        assert_eq!(config.classifier_timeout(), Duration::from_secs(120));
        assert_eq!(config.topic(), "nuclear power");
        assert_eq!(config.years(), &[2024, 2025]);
        assert_eq!(config.year_range(), YearRange::new(2024, 2025).expect("range"));
        assert_eq!(config.batch_size().get(), 30);
        assert_eq!(config.classify_delay(), Duration::from_millis(1000));
        assert_eq!(config.chart(), &ChartConfig::default());
    }

    #[test]
    fn from_env_overrides_values() {
        let config = with_env(
            &[
                ("ANALYSIS_TOPIC", "climate change"),
                ("ANALYSIS_YEARS", "2025, 2022 ,2023"),
                ("CLASSIFY_BATCH_SIZE", "10"),
                ("CLASSIFY_DELAY_MS", "250"),
                ("CHART_DPI", "100"),
                ("CHART_COLORS", "positive=#00ff00"),
                ("CHART_MARKERS", "neutral=o"),
            ],
            Config::from_env,
        )
        .expect("config should load");

        assert_eq!(config.topic(), "climate change");
        assert_eq!(config.years(), &[2025, 2022, 2023]);
        assert_eq!(config.year_range(), YearRange::new(2022, 2025).expect("range"));
        assert_eq!(config.batch_settings().batch_size.get(), 10);
        assert_eq!(config.batch_settings().inter_batch_delay, Duration::from_millis(250));
        assert_eq!(config.chart().dpi, 100);
        assert_eq!(config.chart().color(Sentiment::Positive), "#00ff00");
        assert_eq!(config.chart().color(Sentiment::Negative), "#DC143C");
        assert_eq!(config.chart().marker(Sentiment::Neutral), Marker::Circle);
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let error = with_env(&[("CLASSIFY_BATCH_SIZE", "0")], Config::from_env)
            .expect_err("zero batch size");
        assert!(matches!(error, ConfigError::Invalid { name: "CLASSIFY_BATCH_SIZE", .. }));
    }

    #[test]
    fn malformed_class_map_is_rejected() {
        let error = with_env(&[("CHART_MARKERS", "positive=x")], Config::from_env)
            .expect_err("bad marker");
        assert!(matches!(error, ConfigError::Invalid { name: "CHART_MARKERS", .. }));

        let error = with_env(&[("CHART_COLORS", "mixed=#fff")], Config::from_env)
            .expect_err("bad class");
        assert!(matches!(error, ConfigError::Invalid { name: "CHART_COLORS", .. }));
    }

    #[test]
    fn empty_year_list_is_rejected() {
        let error = with_env(&[("ANALYSIS_YEARS", " , ")], Config::from_env)
            .expect_err("no years");
        assert!(matches!(error, ConfigError::Invalid { name: "ANALYSIS_YEARS", .. }));
    }

    #[test]
    fn cli_overrides_take_precedence() {
        let config = with_env(&[("ANALYSIS_TOPIC", "env topic")], Config::from_env)
            .expect("config")
            .with_overrides(&ConfigOverrides {
                start_year: Some(2021),
                end_year: Some(2022),
                data_root: Some(PathBuf::from("/data")),
                topic: Some("cli topic".to_string()),
            })
            .expect("overrides");

        assert_eq!(config.topic(), "cli topic");
        assert_eq!(config.data_root(), Some(Path::new("/data")));
        assert_eq!(config.years(), &[2021, 2022]);
        assert_eq!(config.year_range(), YearRange::new(2021, 2022).expect("range"));
    }

    #[test]
    fn inverted_cli_range_is_rejected() {
        let error = with_env(&[], Config::from_env)
            .expect("config")
            .with_overrides(&ConfigOverrides {
                start_year: Some(2030),
                ..ConfigOverrides::default()
            })
            .expect_err("inverted");
        assert!(matches!(
            error,
            ConfigError::InvalidYearRange { start: 2030, end: 2025 }
        ));
    }

    #[test]
    fn validate_requires_existing_data_root() {
        let config = with_env(&[], Config::from_env).expect("config");
        assert!(matches!(
            config.validate(RunMode::Aggregate),
            Err(ConfigError::Missing(DATA_ROOT))
        ));

        let config = with_env(&[(DATA_ROOT, "/definitely/not/here")], Config::from_env)
            .expect("config");
        assert!(matches!(
            config.validate(RunMode::Aggregate),
            Err(ConfigError::DataRootNotFound(_))
        ));
    }

    #[test]
    fn validate_checks_credentials_only_for_classifying_modes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().to_string_lossy().into_owned();

        let config = with_env(
            &[(DATA_ROOT, root.as_str()), (API_KEY, API_KEY_PLACEHOLDER)],
            Config::from_env,
        )
        .expect("config");

        assert!(config.validate(RunMode::PartitionAggregate).is_ok());
        assert!(matches!(
            config.validate(RunMode::Full),
            Err(ConfigError::PlaceholderApiKey)
        ));

        let config = with_env(
            &[
                (DATA_ROOT, root.as_str()),
                (API_KEY, "real-key"),
                (ENDPOINT, "https://example.openai.azure.com/"),
            ],
            Config::from_env,
        )
        .expect("config");
        assert!(config.validate(RunMode::Classify).is_ok());
        assert_eq!(config.chat_completion().expect("client config").api_key, "real-key");
    }

    #[test]
    fn debug_output_redacts_api_key() {
        let config = with_env(&[(API_KEY, "sk-supersecret")], Config::from_env).expect("config");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("supersecret"));
        assert!(rendered.contains("sk-s***"));
    }
}
