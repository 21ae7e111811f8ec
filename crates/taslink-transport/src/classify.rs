use std::io::ErrorKind;
use std::sync::{Mutex, PoisonError};

use tracing::{trace, warn};

/// Outcome of classifying a failed socket primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// The call made progress or the reported code is not an error.
    Success,
    /// Retry the same operation immediately; no state change.
    Transient,
    /// The connection is unusable and must be re-established.
    Fatal,
}

impl ErrorClass {
    pub fn is_fatal(self) -> bool {
        self == ErrorClass::Fatal
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorClass::Success => "success",
            ErrorClass::Transient => "transient",
            ErrorClass::Fatal => "fatal",
        }
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a socket error.
///
/// Timeouts, would-block, in-progress and interrupted calls are transient.
/// Refused, reset, aborted, not-connected, protocol and firewall errors are
/// fatal, as is anything unrecognised.
pub fn classify(err: &std::io::Error) -> ErrorClass {
    if let Some(code) = err.raw_os_error() {
        if code == 0 {
            return ErrorClass::Success;
        }
        if let Some(class) = classify_os_code(code) {
            return class;
        }
    }

    match err.kind() {
        ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted => {
            ErrorClass::Transient
        }
        // Refused, not-connected, aborted, reset, broken pipe, EOF, firewall
        // (permission denied) and everything else.
        _ => ErrorClass::Fatal,
    }
}

// Codes that `ErrorKind` has no stable variant for.
#[cfg(unix)]
fn classify_os_code(code: i32) -> Option<ErrorClass> {
    match code {
        libc::EINPROGRESS | libc::EALREADY => Some(ErrorClass::Transient),
        libc::EPROTO => Some(ErrorClass::Fatal),
        _ => None,
    }
}

#[cfg(not(unix))]
fn classify_os_code(_code: i32) -> Option<ErrorClass> {
    None
}

/// A classified error kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedError {
    pub class: ErrorClass,
    pub kind: ErrorKind,
    pub raw_os_error: Option<i32>,
    /// Which operation produced the error ("read", "write", "accept", ...).
    pub context: &'static str,
    pub message: String,
}

impl std::fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} error during {}: {}", self.class, self.context, self.message)
    }
}

/// Classifies socket errors and remembers the most recent one.
///
/// Shared between the tasks of a channel. Classification never fails.
#[derive(Debug, Default)]
pub struct ErrorClassifier {
    last: Mutex<Option<ClassifiedError>>,
}

impl ErrorClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify `err`, record it as the last error and return the class.
    pub fn classify(&self, err: &std::io::Error, context: &'static str) -> ErrorClass {
        let class = classify(err);
        match class {
            ErrorClass::Success | ErrorClass::Transient => {
                trace!(%class, context, error = %err, "retrying socket operation");
            }
            ErrorClass::Fatal => {
                warn!(context, error = %err, "fatal socket error");
            }
        }
        self.record(ClassifiedError {
            class,
            kind: err.kind(),
            raw_os_error: err.raw_os_error(),
            context,
            message: err.to_string(),
        });
        class
    }

    /// Record a fatal condition that did not originate from an OS error,
    /// such as an orderly peer close or an oversized frame header.
    pub fn record_fatal(&self, context: &'static str, message: impl Into<String>) {
        let message = message.into();
        warn!(context, %message, "fatal link condition");
        self.record(ClassifiedError {
            class: ErrorClass::Fatal,
            kind: ErrorKind::Other,
            raw_os_error: None,
            context,
            message,
        });
    }

    /// The most recently classified error, if any.
    pub fn last_error(&self) -> Option<ClassifiedError> {
        self.last
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, err: ClassifiedError) {
        *self.last.lock().unwrap_or_else(PoisonError::into_inner) = Some(err);
    }
}
