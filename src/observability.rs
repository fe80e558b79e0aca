use anyhow::{Error, Result};
use once_cell::sync::OnceCell;
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

static TRACING_INIT: OnceCell<()> = OnceCell::new();

/// Output format of the fmt layer, chosen by `LOG_FORMAT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Plain,
}

impl LogFormat {
    /// `json` (default) or `plain`/`pretty`/`text`; anything else falls back to JSON.
    #[must_use]
    pub fn from_env_value(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("plain" | "pretty" | "text") => Self::Plain,
            _ => Self::Json,
        }
    }
}

/// Tracing サブスクライバを一度だけ初期化する。
///
/// `RUST_LOG` が未設定なら `info` レベル。2 回目以降の呼び出しは何もしない。
///
/// # Errors
/// サブスクライバの初期化に失敗した場合はエラーを返す。
pub fn init() -> Result<()> {
    TRACING_INIT.get_or_try_init(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let format = LogFormat::from_env_value(std::env::var("LOG_FORMAT").ok().as_deref());

        let json_layer =
            (format == LogFormat::Json).then(|| fmt::layer().with_target(false).json());
        let plain_layer = (format == LogFormat::Plain).then(|| fmt::layer().with_target(false));

        tracing_subscriber::registry()
            .with(env_filter)
            .with(json_layer)
            .with(plain_layer)
            .try_init()
            .map_err(|e: tracing_subscriber::util::TryInitError| Error::msg(e.to_string()))?;
        debug!(?format, "tracing initialized");

        Ok::<(), Error>(())
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(None, LogFormat::Json)]
    #[case(Some("json"), LogFormat::Json)]
    #[case(Some("PLAIN"), LogFormat::Plain)]
    #[case(Some(" pretty "), LogFormat::Plain)]
    #[case(Some("yaml"), LogFormat::Json)]
    fn log_format_is_parsed(#[case] raw: Option<&str>, #[case] expected: LogFormat) {
        assert_eq!(LogFormat::from_env_value(raw), expected);
    }
}
