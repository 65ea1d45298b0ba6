use std::{sync::Arc, time::Duration};

use thiserror::Error;

use crate::{
    category::{Category, PerCategory},
    lines::Tags,
    registry::RegistryConfiguration,
    sender::ProxySender,
    transport::{sync::Transport, RemoteAddr, TcpDialer, TransportConfiguration},
    util,
};

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_TELEMETRY_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_TELEMETRY_PREFIX: &str = "~sdk.rust.core.sender.proxy";

/// Errors that could occur while building a proxy sender.
#[derive(Debug, Error)]
pub enum BuildError {
    /// No category was given a port, so there is nowhere to send anything.
    #[error("at least one proxy port should be enabled")]
    NoPortsEnabled,

    /// Failed to resolve the remote address for a category.
    #[error("invalid remote address for {category} port: {reason}")]
    InvalidRemoteAddress {
        /// The category whose address failed to resolve.
        category: Category,

        /// Details about the resolution failure.
        reason: String,
    },

    /// Failed to spawn a background thread.
    #[error("failed to spawn background thread for sender: {0}")]
    Backend(#[from] std::io::Error),
}

/// Builder for a [`ProxySender`].
pub struct ProxySenderBuilder {
    host: String,
    ports: [u16; 4],
    flush_interval: Duration,
    connect_timeout: Duration,
    write_timeout: Duration,
    source: Option<String>,
    telemetry_interval: Duration,
    telemetry_prefix: String,
}

impl ProxySenderBuilder {
    /// Creates a new `ProxySenderBuilder` with every category disabled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the host of the proxy.
    ///
    /// Defaults to `127.0.0.1`.
    #[must_use]
    pub fn with_host<H: Into<String>>(mut self, host: H) -> Self {
        self.host = host.into();
        self
    }

    fn with_port(mut self, category: Category, port: u16) -> Self {
        self.ports[category as usize] = port;
        self
    }

    /// Set the port the proxy listens on for metric points.
    ///
    /// A port of `0` disables metric points, including the sender's own internal metrics.
    ///
    /// Defaults to `0`.
    #[must_use]
    pub fn with_metrics_port(self, port: u16) -> Self {
        self.with_port(Category::Metric, port)
    }

    /// Set the port the proxy listens on for distributions.
    ///
    /// A port of `0` disables distributions.
    ///
    /// Defaults to `0`.
    #[must_use]
    pub fn with_distribution_port(self, port: u16) -> Self {
        self.with_port(Category::Histogram, port)
    }

    /// Set the port the proxy listens on for spans and span logs.
    ///
    /// A port of `0` disables tracing.
    ///
    /// Defaults to `0`.
    #[must_use]
    pub fn with_tracing_port(self, port: u16) -> Self {
        self.with_port(Category::Span, port)
    }

    /// Set the port the proxy listens on for events.
    ///
    /// A port of `0` disables events.
    ///
    /// Defaults to `0`.
    #[must_use]
    pub fn with_events_port(self, port: u16) -> Self {
        self.with_port(Category::Event, port)
    }

    /// Set how often buffered records are flushed to the proxy.
    ///
    /// The interval applies to every category. A zero interval is replaced with the default.
    ///
    /// Defaults to 1 second.
    #[must_use]
    pub fn with_flush_interval(mut self, flush_interval: Duration) -> Self {
        self.flush_interval = flush_interval;
        self
    }

    /// Set the timeout for establishing a connection to the proxy.
    ///
    /// Defaults to 5 seconds.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the write timeout for flushing records.
    ///
    /// When the write timeout is reached, the flush is aborted and the records that were not written stay buffered
    /// until the next flush.
    ///
    /// Defaults to 5 seconds.
    #[must_use]
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set the source used for records submitted without one.
    ///
    /// Defaults to the local host name.
    #[must_use]
    pub fn with_source<S: Into<String>>(mut self, source: S) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Set how often the sender reports its own internal metrics.
    ///
    /// Defaults to 60 seconds.
    #[must_use]
    pub fn with_telemetry_interval(mut self, interval: Duration) -> Self {
        self.telemetry_interval = interval;
        self
    }

    /// Set the prefix of the sender's own internal metrics.
    ///
    /// Defaults to `~sdk.rust.core.sender.proxy`.
    #[must_use]
    pub fn with_telemetry_prefix<P: Into<String>>(mut self, prefix: P) -> Self {
        self.telemetry_prefix = prefix.into();
        self
    }

    fn transport_config(&self) -> TransportConfiguration {
        let flush_interval =
            if self.flush_interval.is_zero() { DEFAULT_FLUSH_INTERVAL } else { self.flush_interval };
        TransportConfiguration {
            flush_interval,
            connect_timeout: self.connect_timeout,
            write_timeout: self.write_timeout,
        }
    }

    fn registry_config(&self) -> RegistryConfiguration {
        let interval =
            if self.telemetry_interval.is_zero() { DEFAULT_TELEMETRY_INTERVAL } else { self.telemetry_interval };
        RegistryConfiguration {
            prefix: self.telemetry_prefix.clone(),
            tags: Tags::from([("pid".to_string(), std::process::id().to_string())]),
            interval,
        }
    }

    /// Builds the sender.
    ///
    /// No connections are opened and no background threads are spawned until the sender is started or used.
    ///
    /// # Errors
    ///
    /// If every port is disabled, or the proxy address cannot be resolved for an enabled port, an error is returned.
    pub fn build(self) -> Result<ProxySender, BuildError> {
        let config = self.transport_config();

        let mut transports = PerCategory::default();
        for category in Category::ALL {
            let port = self.ports[category as usize];
            if port == 0 {
                continue;
            }

            let remote_addr = RemoteAddr::resolve(&self.host, port)
                .map_err(|reason| BuildError::InvalidRemoteAddress { category, reason })?;
            let dialer = TcpDialer::new(remote_addr, &config);
            transports.insert(category, Arc::new(Transport::new(category, config, Box::new(dialer))));
        }

        if transports.is_empty() {
            return Err(BuildError::NoPortsEnabled);
        }

        let default_source = self.source.clone().unwrap_or_else(util::default_source);
        Ok(ProxySender::from_parts(transports, default_source, self.registry_config()))
    }

    /// Builds and starts the sender.
    ///
    /// # Errors
    ///
    /// If the sender cannot be built, or its background threads cannot be spawned, an error is returned.
    pub fn build_and_start(self) -> Result<ProxySender, BuildError> {
        let sender = self.build()?;
        sender.start()?;
        Ok(sender)
    }
}

impl Default for ProxySenderBuilder {
    fn default() -> Self {
        ProxySenderBuilder {
            host: DEFAULT_HOST.to_string(),
            ports: [0; 4],
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            source: None,
            telemetry_interval: DEFAULT_TELEMETRY_INTERVAL,
            telemetry_prefix: DEFAULT_TELEMETRY_PREFIX.to_string(),
        }
    }
}
