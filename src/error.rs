//! パイプライン全体のエラー型と、その扱い方の分類。
use thiserror::Error;

use crate::classifier::ClassifierError;
use crate::config::ConfigError;
use crate::store::StoreError;

/// How the orchestrator reacts to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 実行全体（またはステージ）を中断する。
    AbortRun,
    /// 対象ファイルだけを飛ばして次へ進む。
    SkipFile,
    /// ログに残して処理を続ける。
    Recoverable,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
    #[error("classifier error: {0}")]
    Classifier(#[from] ClassifierError),
    #[error("no classifier configured for a classifying stage")]
    ClassifierUnavailable,
    #[error("no partition could be written although {available} records were available")]
    NoPartitionsWritten { available: usize },
    #[error("chart rendering failed: {0:#}")]
    Chart(#[source] anyhow::Error),
}

impl PipelineError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Store(StoreError::MissingColumn { .. } | StoreError::Ragged { .. }) => {
                ErrorKind::SkipFile
            }
            Self::Store(StoreError::Read { .. }) | Self::Classifier(_) => ErrorKind::Recoverable,
            Self::Config(_)
            | Self::Store(StoreError::Write { .. })
            | Self::ClassifierUnavailable
            | Self::NoPartitionsWritten { .. }
            | Self::Chart(_) => ErrorKind::AbortRun,
        }
    }
}
