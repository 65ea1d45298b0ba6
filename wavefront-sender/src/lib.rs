//! A client for sending metrics, distributions, spans and events to a [Wavefront proxy][proxy].
//!
//! [proxy]: https://docs.wavefront.com/proxies.html
//!
//! # Usage
//!
//! ```no_run
//! # use wavefront_sender::{ProxySenderBuilder, Tags};
//! // First, create a builder and enable the categories of data the proxy accepts. Each category listens on its own
//! // port, and a category without a port is disabled.
//! let sender = ProxySenderBuilder::default()
//!     .with_host("proxy.internal")
//!     .with_metrics_port(2878)
//!     .with_distribution_port(40000)
//!     .with_tracing_port(30000)
//!     .build_and_start()
//!     .expect("failed to build sender");
//!
//! // Submissions encode the record and buffer it; a background thread per category flushes the buffers.
//! let tags = Tags::from([("env".to_string(), "prod".to_string())]);
//! sender.send_metric("requests.latency", 12.5, None, "", &tags).expect("failed to send metric");
//! sender.send_delta_counter("requests.count", 1.0, None, "", &tags).expect("failed to send counter");
//!
//! // Closing flushes whatever is still buffered.
//! sender.close();
//! ```
//!
//! # Categories and connections
//!
//! Metric points (including delta counters), distributions, spans and events each go over their own TCP connection,
//! to their own port on the proxy. Categories are fully independent: a category that is disabled, down, or slow has
//! no effect on the others. Submitting to a disabled category fails immediately with
//! [`SendError::NotConfigured`].
//!
//! Connections are opened lazily by the first submission for their category, and are re-established by the next
//! flush after a failure.
//!
//! # Delivery
//!
//! Submissions never wait on the network: they encode the record into a line and queue it. Queued lines are written
//! in order when the category is flushed, either by its background thread or by an explicit call to
//! [`ProxySender::flush`]. Lines that fail to be written stay queued and are retried on the next flush, so a line may
//! occasionally be delivered twice. Lines still queued when the process exits are lost.
//!
//! Flush failures are counted, and the running total is available from [`ProxySender::failure_count`].
//!
//! # Telemetry
//!
//! The sender reports its own operational metrics through the metrics connection. These include per-family record
//! outcomes, the flush failure count and the crate version. They are named under the `~sdk.rust.core.sender.proxy`
//! namespace and tagged with the process ID.

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::too_many_arguments)]
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg), deny(rustdoc::broken_intra_doc_links))]

mod builder;
pub use self::builder::{BuildError, ProxySenderBuilder};

mod category;
pub use self::category::Category;

mod counter;
pub use self::counter::{delta_counter_name, has_delta_prefix, Counter, DeltaCounter, ALT_DELTA_PREFIX, DELTA_PREFIX};

mod error;
pub use self::error::{EncodeError, FlushError, SendError};

pub mod lines;
pub use self::lines::{Centroid, EventOptions, Granularity, Span, SpanLog, SpanTag, Tags};

mod registry;

mod sender;
pub use self::sender::{MetricSender, ProxySender};

mod transport;
mod util;
