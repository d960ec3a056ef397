//! Request logging and error formatting hooks.
//!
//! The hooks are plain traits so they can be swapped in tests; the
//! [`ObservabilityExtension`] adapts them to async-graphql's extension API.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use async_graphql::extensions::{
    Extension, ExtensionContext, ExtensionFactory, NextPrepareRequest, NextRequest,
};
use async_graphql::{Request, Response, ServerError, ServerResult};
use chrono::{SecondsFormat, Utc};

/// Destination for debug lines. Implementations must not fail.
pub trait LogSink: Send + Sync {
    fn debug(&self, message: &str);
}

/// Formats `[<timestamp>] [DEBUG]: <message>`.
pub fn format_debug_line(timestamp: &str, message: &str) -> String {
    format!("[{}] [DEBUG]: {}", timestamp, message)
}

/// Current UTC time as ISO-8601 with millisecond precision.
pub fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Sends timestamped debug lines through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogSink;

impl LogSink for TracingLogSink {
    fn debug(&self, message: &str) {
        tracing::debug!(target: "graph_gateway::request", "{}", format_debug_line(&timestamp(), message));
    }
}

/// Logs request payloads. Never fails the request it observes.
#[derive(Clone)]
pub struct RequestLogger {
    sink: Arc<dyn LogSink>,
}

impl RequestLogger {
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self { sink }
    }

    pub fn log(&self, payload: &dyn fmt::Display) {
        // A failing payload or a panicking sink loses the line, not the request.
        let _ = panic::catch_unwind(AssertUnwindSafe(|| {
            let mut message = String::new();
            if fmt::write(&mut message, format_args!("{}", payload)).is_ok() {
                self.sink.debug(&message);
            }
        }));
    }
}

impl fmt::Debug for RequestLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestLogger").finish_non_exhaustive()
    }
}

/// Hook applied to every error before it is returned to the client.
pub trait ErrorFormatter: Send + Sync {
    fn format_error(&self, error: ServerError) -> ServerError;
}

/// Logs the error message once and returns the error unchanged.
#[derive(Debug, Clone)]
pub struct LoggingErrorFormatter {
    logger: RequestLogger,
}

impl LoggingErrorFormatter {
    pub fn new(logger: RequestLogger) -> Self {
        Self { logger }
    }
}

impl ErrorFormatter for LoggingErrorFormatter {
    fn format_error(&self, error: ServerError) -> ServerError {
        self.logger.log(&error.message);
        error
    }
}

/// The pair of hooks installed on every executable schema.
#[derive(Clone)]
pub struct Observability {
    pub request_logger: RequestLogger,
    pub error_formatter: Arc<dyn ErrorFormatter>,
}

impl Observability {
    /// Both hooks writing to the same sink.
    pub fn with_sink(sink: Arc<dyn LogSink>) -> Self {
        let request_logger = RequestLogger::new(sink);
        let error_formatter = Arc::new(LoggingErrorFormatter::new(request_logger.clone()));
        Self {
            request_logger,
            error_formatter,
        }
    }
}

impl Default for Observability {
    fn default() -> Self {
        Self::with_sink(Arc::new(TracingLogSink))
    }
}

impl fmt::Debug for Observability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observability").finish_non_exhaustive()
    }
}

/// async-graphql extension running the observability hooks.
pub struct ObservabilityExtension {
    observability: Observability,
}

impl ObservabilityExtension {
    pub fn new(observability: Observability) -> Self {
        Self { observability }
    }
}

impl ExtensionFactory for ObservabilityExtension {
    fn create(&self) -> Arc<dyn Extension> {
        Arc::new(ObservabilityHooks {
            observability: self.observability.clone(),
        })
    }
}

struct ObservabilityHooks {
    observability: Observability,
}

struct RequestSummary<'a>(&'a Request);

impl fmt::Display for RequestSummary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let operation = self.0.operation_name.as_deref().unwrap_or("<unnamed>");
        let query = self.0.query.split_whitespace().collect::<Vec<_>>().join(" ");
        write!(f, "request operation={} query={}", operation, query)
    }
}

#[async_trait::async_trait]
impl Extension for ObservabilityHooks {
    async fn prepare_request(
        &self,
        ctx: &ExtensionContext<'_>,
        request: Request,
        next: NextPrepareRequest<'_>,
    ) -> ServerResult<Request> {
        self.observability
            .request_logger
            .log(&RequestSummary(&request));
        next.run(ctx, request).await
    }

    async fn request(&self, ctx: &ExtensionContext<'_>, next: NextRequest<'_>) -> Response {
        let mut response = next.run(ctx).await;
        let formatter = &self.observability.error_formatter;
        response.errors = response
            .errors
            .into_iter()
            .map(|error| formatter.format_error(error))
            .collect();
        self.observability.request_logger.log(&format_args!(
            "request completed with {} error(s)",
            response.errors.len()
        ));
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::RecordingSink;

    #[test]
    fn test_format_debug_line() {
        assert_eq!(
            format_debug_line("2024-01-02T03:04:05.678Z", "hello"),
            "[2024-01-02T03:04:05.678Z] [DEBUG]: hello"
        );
    }

    #[test]
    fn test_timestamp_is_iso8601_millis_utc() {
        let ts = timestamp();
        assert!(ts.ends_with('Z'), "{ts}");
        assert!(chrono::DateTime::parse_from_rfc3339(&ts).is_ok());
        let fraction = ts.rsplit('.').next().unwrap();
        assert_eq!(fraction.len(), "678Z".len());
    }

    #[test]
    fn test_request_logger_forwards_payload() {
        let sink = Arc::new(RecordingSink::default());
        let logger = RequestLogger::new(sink.clone());
        logger.log(&"query { ping }");
        assert_eq!(sink.lines(), vec!["query { ping }".to_string()]);
    }

    struct PanickingSink;

    impl LogSink for PanickingSink {
        fn debug(&self, _message: &str) {
            panic!("sink failure");
        }
    }

    struct UnprintablePayload;

    impl fmt::Display for UnprintablePayload {
        fn fmt(&self, _f: &mut fmt::Formatter<'_>) -> fmt::Result {
            Err(fmt::Error)
        }
    }

    struct PanickingPayload;

    impl fmt::Display for PanickingPayload {
        fn fmt(&self, _f: &mut fmt::Formatter<'_>) -> fmt::Result {
            panic!("display failure");
        }
    }

    #[test]
    fn test_request_logger_skips_unprintable_payloads() {
        let sink = Arc::new(RecordingSink::default());
        let logger = RequestLogger::new(sink.clone());

        logger.log(&UnprintablePayload);
        logger.log(&PanickingPayload);
        logger.log(&"after");

        assert_eq!(sink.lines(), vec!["after".to_string()]);
    }

    #[test]
    fn test_request_logger_swallows_sink_panics() {
        let logger = RequestLogger::new(Arc::new(PanickingSink));
        logger.log(&"still fine");
    }

    #[test]
    fn test_error_formatter_returns_error_unchanged_and_logs_once() {
        let sink = Arc::new(RecordingSink::default());
        let formatter = LoggingErrorFormatter::new(RequestLogger::new(sink.clone()));
        let error = ServerError::new("Cannot query field \"nope\" on type \"Query\".", None);

        let formatted = formatter.format_error(error.clone());

        assert_eq!(formatted, error);
        let lines = sink.lines();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("Cannot query field \"nope\""));
    }

    #[test]
    fn test_request_summary_collapses_whitespace() {
        let request = Request::new("query Ping {\n  ping\n}").operation_name("Ping");
        assert_eq!(
            RequestSummary(&request).to_string(),
            "request operation=Ping query=query Ping { ping }"
        );
    }
}
