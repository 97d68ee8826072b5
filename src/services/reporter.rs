use std::fmt;

/// Where a failure happened, attached to every report.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    pub queue: &'static str,
    pub url: String,
    pub podcast_id: Option<i64>,
    /// Enrichment job type, when relevant
    pub kind: Option<&'static str>,
}

/// Sink for failures that an operator should see.
pub trait ErrorReporter: Send + Sync {
    fn report(&self, error: &(dyn fmt::Display + Send + Sync), context: &ErrorContext);
}

/// Reports through `tracing` at error level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, error: &(dyn fmt::Display + Send + Sync), context: &ErrorContext) {
        tracing::error!(
            queue = context.queue,
            url = %context.url,
            podcast_id = ?context.podcast_id,
            kind = ?context.kind,
            error = %error,
            "Job error reported"
        );
    }
}
