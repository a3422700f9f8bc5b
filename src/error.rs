use serde::Serialize;
use strum::Display;

/// Failures that can end the processing of a single (metric, user) pair.
///
/// Internal helpers work with [`ohno::AppError`] and attach context as they go; the
/// error is classified into one of these variants at the point where its meaning is known.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Per-user secrets are missing or unusable.
    #[error("credential error: {0:#}")]
    Credential(ohno::AppError),

    /// The provider could not be reached, or kept failing after retries.
    #[error("transport error: {0:#}")]
    Transport(ohno::AppError),

    /// No integration is registered under the requested metric name.
    #[error("unknown metric: {0}")]
    UnknownMetric(String),

    /// Reading or writing the metrics or watermark tables failed.
    #[error("storage error: {0:#}")]
    Storage(ohno::AppError),

    /// Malformed input such as an unparseable date.
    #[error("validation error: {0:#}")]
    Validation(ohno::AppError),
}

/// Stable tag for each [`Error`] variant, as reported in batch summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Credential,
    Transport,
    UnknownMetric,
    Storage,
    Validation,
}

impl Error {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Credential(_) => ErrorKind::Credential,
            Self::Transport(_) => ErrorKind::Transport,
            Self::UnknownMetric(_) => ErrorKind::UnknownMetric,
            Self::Storage(_) => ErrorKind::Storage,
            Self::Validation(_) => ErrorKind::Validation,
        }
    }
}
