use std::{io, sync::Arc};

use bytes::Bytes;
use tracing::debug;

use crate::{
    category::{Category, PerCategory},
    counter::{delta_counter_name, Counter, DeltaCounter},
    error::{EncodeError, FlushError, SendError},
    lines::{
        event_line, histogram_line, metric_line, span_line, span_logs_line, Centroid, EventOptions, Granularity,
        Span, SpanLog, Tags,
    },
    registry::{MetricRegistry, RegistryConfiguration},
    transport::sync::Transport,
    util::version_gauge_value,
};

/// The ability to submit metric points.
///
/// This is the only view of a sender that its internal metrics registry gets.
pub trait MetricSender: Send + Sync {
    /// Sends a metric point.
    ///
    /// The timestamp is in epoch seconds. An empty `source` uses the sender's default source.
    ///
    /// # Errors
    ///
    /// Fails if the metric category is not configured, the connection cannot be established, the point is malformed,
    /// or the sender has been closed.
    fn send_metric(
        &self,
        name: &str,
        value: f64,
        timestamp: Option<i64>,
        source: &str,
        tags: &Tags,
    ) -> Result<(), SendError>;

    /// Sends a delta counter increment.
    ///
    /// The name is given the delta marker if it does not already carry one. Values that are not strictly positive
    /// are discarded without error, as they carry no increment.
    ///
    /// # Errors
    ///
    /// Fails if the name is empty, or for any of the reasons [`MetricSender::send_metric`] fails.
    fn send_delta_counter(
        &self,
        name: &str,
        value: f64,
        timestamp: Option<i64>,
        source: &str,
        tags: &Tags,
    ) -> Result<(), SendError>;
}

/// Submission outcome counters for one family of records.
struct FamilyStats {
    valid: Arc<DeltaCounter>,
    invalid: Arc<DeltaCounter>,
    dropped: Arc<DeltaCounter>,
    report_errors: Arc<DeltaCounter>,
}

impl FamilyStats {
    fn new() -> Self {
        FamilyStats {
            valid: Arc::new(DeltaCounter::new()),
            invalid: Arc::new(DeltaCounter::new()),
            dropped: Arc::new(DeltaCounter::new()),
            report_errors: Arc::new(DeltaCounter::new()),
        }
    }

    fn register(&self, registry: &MetricRegistry, family: &str) {
        registry.register_delta_counter(&format!("{family}.valid"), Arc::clone(&self.valid));
        registry.register_delta_counter(&format!("{family}.invalid"), Arc::clone(&self.invalid));
        registry.register_delta_counter(&format!("{family}.dropped"), Arc::clone(&self.dropped));
        registry.register_delta_counter(&format!("{family}.report.errors"), Arc::clone(&self.report_errors));
    }
}

/// Operational counters for every family, tracked whether or not the family's category is configured.
struct SenderStats {
    points: FamilyStats,
    histograms: FamilyStats,
    spans: FamilyStats,
    span_logs: FamilyStats,
    events: FamilyStats,
}

impl SenderStats {
    fn new() -> Self {
        SenderStats {
            points: FamilyStats::new(),
            histograms: FamilyStats::new(),
            spans: FamilyStats::new(),
            span_logs: FamilyStats::new(),
            events: FamilyStats::new(),
        }
    }

    fn register(&self, registry: &MetricRegistry) {
        self.points.register(registry, "points");
        self.histograms.register(registry, "histograms");
        self.spans.register(registry, "spans");
        self.span_logs.register(registry, "span_logs");
        self.events.register(registry, "events");
    }
}

/// Routes records to their category's transport.
struct Router {
    transports: PerCategory<Arc<Transport>>,
    default_source: String,
    stats: SenderStats,
}

impl Router {
    fn transport(&self, category: Category) -> Result<&Transport, SendError> {
        self.transports.get(category).map(Arc::as_ref).ok_or(SendError::NotConfigured(category))
    }

    fn ensure_connected(transport: &Transport, stats: &FamilyStats) -> Result<(), SendError> {
        if transport.is_connected() {
            return Ok(());
        }
        transport.connect().inspect_err(|e| match e {
            SendError::Closed => stats.report_errors.increment(1.0),
            _ => stats.dropped.increment(1.0),
        })
    }

    fn send_line(
        transport: &Transport,
        stats: &FamilyStats,
        encoded: Result<Bytes, EncodeError>,
    ) -> Result<(), SendError> {
        let line = encoded.inspect_err(|_| stats.invalid.increment(1.0))?;
        transport.send(line).inspect_err(|_| stats.report_errors.increment(1.0))?;
        stats.valid.increment(1.0);
        Ok(())
    }

    fn submit<F>(&self, category: Category, stats: &FamilyStats, encode: F) -> Result<(), SendError>
    where
        F: FnOnce(&str) -> Result<Bytes, EncodeError>,
    {
        let transport = self.transport(category)?;
        Self::ensure_connected(transport, stats)?;
        Self::send_line(transport, stats, encode(&self.default_source))
    }

    fn send_distribution(
        &self,
        name: &str,
        centroids: &[Centroid],
        granularities: &[Granularity],
        timestamp: Option<i64>,
        source: &str,
        tags: &Tags,
    ) -> Result<(), SendError> {
        self.submit(Category::Histogram, &self.stats.histograms, |default_source| {
            histogram_line(name, centroids, granularities, timestamp, source, tags, default_source)
        })
    }

    fn send_span(&self, span: &Span<'_>, logs: &[SpanLog]) -> Result<(), SendError> {
        let has_logs = !logs.is_empty();
        self.submit(Category::Span, &self.stats.spans, |default_source| {
            span_line(span, has_logs, default_source)
        })?;

        // The span itself has been accepted at this point; a span log failure is still reported to the caller.
        if has_logs {
            let transport = self.transport(Category::Span)?;
            Self::send_line(transport, &self.stats.span_logs, span_logs_line(span.trace_id, span.span_id, logs))?;
        }
        Ok(())
    }

    fn send_event(
        &self,
        name: &str,
        start_millis: i64,
        end_millis: i64,
        source: &str,
        tags: &Tags,
        options: &EventOptions,
    ) -> Result<(), SendError> {
        self.submit(Category::Event, &self.stats.events, |default_source| {
            event_line(name, start_millis, end_millis, source, tags, options, default_source)
        })
    }

    fn flush(&self) -> Result<(), FlushError> {
        let mut errors = FlushError::default();
        for (_, transport) in self.transports.iter() {
            if let Err(e) = transport.flush() {
                errors.merge(e);
            }
        }
        errors.into_result()
    }

    fn failure_count(&self) -> u64 {
        self.transports.iter().map(|(_, transport)| transport.failure_count()).sum()
    }
}

impl MetricSender for Router {
    fn send_metric(
        &self,
        name: &str,
        value: f64,
        timestamp: Option<i64>,
        source: &str,
        tags: &Tags,
    ) -> Result<(), SendError> {
        self.submit(Category::Metric, &self.stats.points, |default_source| {
            metric_line(name, value, timestamp, source, tags, default_source)
        })
    }

    fn send_delta_counter(
        &self,
        name: &str,
        value: f64,
        timestamp: Option<i64>,
        source: &str,
        tags: &Tags,
    ) -> Result<(), SendError> {
        if name.is_empty() {
            return Err(SendError::EmptyName);
        }
        if value.is_nan() || value <= 0.0 {
            return Ok(());
        }

        self.send_metric(&delta_counter_name(name), value, timestamp, source, tags)
    }
}

/// Sends metrics, distributions, spans and events to a Wavefront proxy.
///
/// Each category of data has its own connection to the proxy, opened lazily by the first submission for that
/// category. Submissions only buffer the encoded record; buffered records are written out by a background thread per
/// category once [`ProxySender::start`] has been called, or on demand by [`ProxySender::flush`].
///
/// The sender also reports its own operational metrics, such as the number of valid and invalid points submitted,
/// under an internal prefix through its metrics connection.
///
/// Dropping the sender closes it.
pub struct ProxySender {
    router: Arc<Router>,
    registry: Arc<MetricRegistry>,
}

impl ProxySender {
    pub(crate) fn from_parts(
        transports: PerCategory<Arc<Transport>>,
        default_source: String,
        telemetry: RegistryConfiguration,
    ) -> Self {
        let router = Arc::new(Router { transports, default_source, stats: SenderStats::new() });

        let registry = Arc::new(MetricRegistry::new(
            Arc::clone(&router) as Arc<dyn MetricSender>,
            telemetry,
        ));
        if let Some(version) = version_gauge_value(env!("CARGO_PKG_VERSION")) {
            registry.new_gauge("version", move || version);
        }
        router.stats.register(&registry);
        {
            let router = Arc::clone(&router);
            registry.new_gauge("failures", move || router.failure_count() as f64);
        }

        ProxySender { router, registry }
    }

    /// Returns the source used for records submitted without one.
    pub fn default_source(&self) -> &str {
        &self.router.default_source
    }

    /// Returns `true` if the given category was configured with a port.
    pub fn is_configured(&self, category: Category) -> bool {
        self.router.transports.get(category).is_some()
    }

    /// Creates a delta counter reported alongside the sender's internal metrics, as `<prefix>.<name>.count`.
    pub fn new_internal_delta_counter(&self, name: &str) -> Arc<DeltaCounter> {
        self.registry.new_delta_counter(name)
    }

    /// Creates a cumulative counter reported alongside the sender's internal metrics, as `<prefix>.<name>.count`.
    pub fn new_internal_counter(&self, name: &str) -> Arc<Counter> {
        self.registry.new_counter(name)
    }

    /// Registers a gauge reported alongside the sender's internal metrics, as `<prefix>.<name>`.
    ///
    /// The value is computed by `f` every time the internal metrics are reported.
    pub fn new_internal_gauge<F>(&self, name: &str, f: F)
    where
        F: Fn() -> f64 + Send + Sync + 'static,
    {
        self.registry.new_gauge(name, f);
    }

    /// Starts the background flush thread of every configured transport, and the internal metrics reporter.
    ///
    /// Connections are not opened until the first submission for their category. Calling `start` more than once, or
    /// after [`ProxySender::close`], does nothing.
    ///
    /// # Errors
    ///
    /// If a background thread cannot be spawned, an error is returned.
    pub fn start(&self) -> io::Result<()> {
        for (_, transport) in self.router.transports.iter() {
            transport.start()?;
        }
        self.registry.start()
    }

    /// Sends a metric point.
    ///
    /// See [`MetricSender::send_metric`].
    ///
    /// # Errors
    ///
    /// Fails if the metric category is not configured, the connection cannot be established, the point is malformed,
    /// or the sender has been closed.
    pub fn send_metric(
        &self,
        name: &str,
        value: f64,
        timestamp: Option<i64>,
        source: &str,
        tags: &Tags,
    ) -> Result<(), SendError> {
        self.router.send_metric(name, value, timestamp, source, tags)
    }

    /// Sends a delta counter increment.
    ///
    /// See [`MetricSender::send_delta_counter`].
    ///
    /// # Errors
    ///
    /// Fails if the name is empty, or for any of the reasons [`ProxySender::send_metric`] fails.
    pub fn send_delta_counter(
        &self,
        name: &str,
        value: f64,
        timestamp: Option<i64>,
        source: &str,
        tags: &Tags,
    ) -> Result<(), SendError> {
        self.router.send_delta_counter(name, value, timestamp, source, tags)
    }

    /// Sends a distribution, aggregated by the proxy at each of the given granularities.
    ///
    /// # Errors
    ///
    /// Fails if the distribution category is not configured, the connection cannot be established, the distribution
    /// is malformed, or the sender has been closed.
    pub fn send_distribution(
        &self,
        name: &str,
        centroids: &[Centroid],
        granularities: &[Granularity],
        timestamp: Option<i64>,
        source: &str,
        tags: &Tags,
    ) -> Result<(), SendError> {
        self.router.send_distribution(name, centroids, granularities, timestamp, source, tags)
    }

    /// Sends a span, followed by its span logs if there are any.
    ///
    /// The span and its logs are two separate records. If the span is accepted but its logs are not, an error is
    /// returned even though the span itself will still be sent.
    ///
    /// # Errors
    ///
    /// Fails if the tracing category is not configured, the connection cannot be established, the span or its logs
    /// are malformed, or the sender has been closed.
    pub fn send_span(&self, span: &Span<'_>, logs: &[SpanLog]) -> Result<(), SendError> {
        self.router.send_span(span, logs)
    }

    /// Sends an event.
    ///
    /// # Errors
    ///
    /// Fails if the events category is not configured, the connection cannot be established, the event is
    /// malformed, or the sender has been closed.
    pub fn send_event(
        &self,
        name: &str,
        start_millis: i64,
        end_millis: i64,
        source: &str,
        tags: &Tags,
        options: &EventOptions,
    ) -> Result<(), SendError> {
        self.router.send_event(name, start_millis, end_millis, source, tags, options)
    }

    /// Flushes every configured transport.
    ///
    /// Every transport is flushed even if an earlier one fails.
    ///
    /// # Errors
    ///
    /// If any transport fails to flush, an error describing every failure is returned.
    pub fn flush(&self) -> Result<(), FlushError> {
        self.router.flush()
    }

    /// Returns the total number of failed flushes across every transport.
    pub fn failure_count(&self) -> u64 {
        self.router.failure_count()
    }

    /// Closes every transport, then stops the internal metrics reporter.
    ///
    /// Each transport is flushed one last time before its connection is closed. Closing is terminal: every
    /// subsequent submission fails with [`SendError::Closed`].
    pub fn close(&self) {
        for (category, transport) in self.router.transports.iter() {
            debug!(%category, address = transport.address(), "Closing transport.");
            transport.close();
        }
        self.registry.stop();
    }
}

impl MetricSender for ProxySender {
    fn send_metric(
        &self,
        name: &str,
        value: f64,
        timestamp: Option<i64>,
        source: &str,
        tags: &Tags,
    ) -> Result<(), SendError> {
        self.router.send_metric(name, value, timestamp, source, tags)
    }

    fn send_delta_counter(
        &self,
        name: &str,
        value: f64,
        timestamp: Option<i64>,
        source: &str,
        tags: &Tags,
    ) -> Result<(), SendError> {
        self.router.send_delta_counter(name, value, timestamp, source, tags)
    }
}

impl Drop for ProxySender {
    fn drop(&mut self) {
        self.close();
    }
}
