//! Error and info reporting sinks injected into the stores.
//!
//! Stores never reach for a process-wide logger; whatever sink they were built
//! with receives background events such as reclamation results.

use std::sync::Arc;

/// Destination for events the stores emit outside of a caller's request
pub trait ReportSink: Send + Sync {
    /// Report a failure that was handled internally
    fn error(&self, table: &str, message: &str);

    /// Report routine progress
    fn info(&self, table: &str, message: &str);
}

/// Default sink that forwards events to `tracing`; without a subscriber they are dropped
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl ReportSink for TracingSink {
    fn error(&self, table: &str, message: &str) {
        tracing::error!(table, "{message}");
    }

    fn info(&self, table: &str, message: &str) {
        tracing::info!(table, "{message}");
    }
}

/// Shared handle to the default sink.
///
/// Events only reach stderr or stdout once the host installs a `tracing`
/// subscriber, as `credstore-admin` does with `tracing_subscriber::fmt`.
pub fn default_sink() -> Arc<dyn ReportSink> {
    Arc::new(TracingSink)
}
