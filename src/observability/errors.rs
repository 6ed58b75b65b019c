//! Process-wide error reporting.
//!
//! Errors that are caught at a request boundary (controller failures,
//! gate failures, lazily discovered configuration errors) are handed to an
//! [`ErrorReporter`] instead of reaching the client.

use std::error::Error;
use std::sync::atomic::{AtomicU64, Ordering};

/// Sink for errors that were contained rather than propagated.
pub trait ErrorReporter: Send + Sync + 'static {
    fn report(&self, error: &(dyn Error + 'static));
}

/// Default reporter: logs the error chain at `error` level.
#[derive(Debug, Default)]
pub struct TracingReporter {
    reported: AtomicU64,
}

impl TracingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of errors reported since startup.
    pub fn reported(&self) -> u64 {
        self.reported.load(Ordering::Relaxed)
    }
}

impl ErrorReporter for TracingReporter {
    fn report(&self, error: &(dyn Error + 'static)) {
        self.reported.fetch_add(1, Ordering::Relaxed);

        let mut chain = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            chain.push(cause.to_string());
            source = cause.source();
        }

        tracing::error!(error = %error, causes = ?chain, "Request error");
    }
}
