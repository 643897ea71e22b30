//! Exponential-backoff retry for transient S3 HTTP failures.

use std::fmt;
use std::time::Duration;

use gitvault_core::config::RetrySettings;

/// Unified error for operations that involve an HTTP request and possibly
/// a body read or local I/O.
#[derive(Debug)]
pub enum HttpRetryError {
    /// HTTP-level error (retryable on transport failures, 429, 5xx).
    Http(Box<ureq::Error>),
    /// I/O error while reading a body or a local file (retryable for
    /// connection-shaped failures).
    Io(std::io::Error),
    /// Application-level failure, never retried.
    Permanent(String),
}

impl HttpRetryError {
    pub fn http(e: ureq::Error) -> Self {
        HttpRetryError::Http(Box::new(e))
    }
}

impl fmt::Display for HttpRetryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpRetryError::Http(e) => write!(f, "{e}"),
            HttpRetryError::Io(e) => write!(f, "I/O error: {e}"),
            HttpRetryError::Permanent(msg) => write!(f, "{msg}"),
        }
    }
}

pub fn is_retryable_http(err: &ureq::Error) -> bool {
    match err {
        ureq::Error::Transport(_) => true,
        ureq::Error::Status(code, _) => *code == 429 || *code >= 500,
    }
}

pub fn is_retryable_io(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::TimedOut
            | std::io::ErrorKind::Interrupted
    )
}

fn is_retryable(err: &HttpRetryError) -> bool {
    match err {
        HttpRetryError::Http(e) => is_retryable_http(e.as_ref()),
        HttpRetryError::Io(e) => is_retryable_io(e),
        HttpRetryError::Permanent(_) => false,
    }
}

/// Retry a closure on transient errors with exponential backoff + jitter.
pub fn retry_call<T>(
    config: &RetrySettings,
    op_name: &str,
    f: impl Fn() -> Result<T, HttpRetryError>,
) -> Result<T, HttpRetryError> {
    let mut delay_ms = config.retry_delay_ms;
    let mut last_err = None;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let jitter = rand::random::<u64>() % delay_ms.max(1);
            std::thread::sleep(Duration::from_millis(delay_ms + jitter));
            delay_ms = (delay_ms * 2).min(config.retry_max_delay_ms);
        }
        match f() {
            Ok(val) => return Ok(val),
            Err(e) if is_retryable(&e) && attempt < config.max_retries => {
                tracing::warn!(
                    "S3 {op_name}: transient error (attempt {}/{}), retrying: {e}",
                    attempt + 1,
                    config.max_retries,
                );
                last_err = Some(e);
            }
            Err(e) => return Err(e),
        }
    }
    Err(last_err.unwrap())
}
