//! The outcome of one invocation, as decided by the dispatcher.

use std::error::Error;
use std::fmt::Write as _;

use thiserror::Error;

use crate::status;

/// Boxed application error.
pub type BoxError = Box<dyn Error + Send + Sync + 'static>;

/// A failed invocation, rendered as an error envelope.
///
/// `detail` is the short message every client sees. `source` is the
/// originating failure; its full text is only sent when the encoder is
/// told to include it.
#[derive(Debug, Error)]
#[error("{detail} (status {status_code})")]
pub struct InvocationError {
    pub status_code: i32,
    pub detail: String,
    #[source]
    pub source: Option<BoxError>,
}

impl InvocationError {
    pub fn new(status_code: i32, detail: impl Into<String>) -> Self {
        Self {
            status_code,
            detail: detail.into(),
            source: None,
        }
    }

    /// An `INTERNAL` error wrapping `source`.
    pub fn internal(detail: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::new(status::INTERNAL, detail).with_source(source)
    }

    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// The originating failure, if any.
    pub fn source_error(&self) -> Option<&(dyn Error + 'static)> {
        self.source.as_deref().map(|e| e as &(dyn Error + 'static))
    }
}

/// Result of a method invocation.
///
/// The dispatcher picks the variant at the call site, so the encoder never
/// inspects result types at runtime.
#[derive(Debug)]
pub enum InvocationResult<T> {
    /// The method returned a value.
    Success(T),
    /// The method completed with no return value.
    VoidSuccess,
    /// The method failed.
    Failure(InvocationError),
}

impl<T> From<std::result::Result<T, InvocationError>> for InvocationResult<T> {
    fn from(result: std::result::Result<T, InvocationError>) -> Self {
        match result {
            Ok(value) => Self::Success(value),
            Err(e) => Self::Failure(e),
        }
    }
}

impl<T> From<InvocationError> for InvocationResult<T> {
    fn from(e: InvocationError) -> Self {
        Self::Failure(e)
    }
}

/// Full text of an error: its message followed by its `source()` chain.
///
/// ```text
/// connection reset
///
/// Caused by:
///     0: socket closed
///     1: broken pipe
/// ```
pub fn error_report(error: &(dyn Error + 'static)) -> String {
    let mut report = error.to_string();

    let mut source = error.source();
    if source.is_some() {
        report.push_str("\n\nCaused by:");
    }

    let mut index = 0;
    while let Some(cause) = source {
        let _ = write!(report, "\n    {}: {}", index, cause);
        index += 1;
        source = cause.source();
    }

    report
}
