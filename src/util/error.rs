//! Error classification and retry decisions for platform calls.
use crate::clients::PlatformError;

/// How a failed platform call should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ErrorKind {
    /// Transient failure (timeout, connection reset, 5xx). Worth another attempt.
    Retryable,
    /// The request itself is wrong or the payload could not be read.
    NonRetryable,
    /// Quota or authorization failure. Ends the current discovery loop.
    Fatal,
}

#[must_use]
pub(crate) fn classify_error(error: &PlatformError) -> ErrorKind {
    match error {
        PlatformError::QuotaExceeded(_) | PlatformError::Forbidden(_) => ErrorKind::Fatal,
        PlatformError::Transport { retryable, .. } => {
            if *retryable {
                ErrorKind::Retryable
            } else {
                ErrorKind::NonRetryable
            }
        }
        PlatformError::Status { status, .. } if *status >= 500 => ErrorKind::Retryable,
        PlatformError::Status { .. } | PlatformError::Decode(_) => ErrorKind::NonRetryable,
    }
}

#[must_use]
pub(crate) fn is_retryable(error: &PlatformError) -> bool {
    matches!(classify_error(error), ErrorKind::Retryable)
}
