use std::{fmt, io};

use thiserror::Error;

use crate::category::Category;

/// Errors that can occur while encoding a record into a wire line.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// The metric, distribution, span or event name was empty.
    #[error("{kind} name cannot be empty")]
    EmptyName {
        /// The kind of record being encoded.
        kind: &'static str,
    },

    /// A tag key or value was blank.
    #[error("{kind} tag keys and values cannot be blank (key: {key:?})")]
    BlankTag {
        /// The kind of record being encoded.
        kind: &'static str,

        /// The offending tag key.
        key: String,
    },

    /// A distribution was submitted without any centroids.
    #[error("distribution must contain at least one centroid")]
    EmptyCentroids,

    /// A distribution was submitted without any granularities.
    #[error("distribution must request at least one granularity")]
    EmptyGranularities,

    /// A span trace ID or span ID was empty.
    #[error("span {field} cannot be empty")]
    EmptySpanId {
        /// Which identifier was missing.
        field: &'static str,
    },

    /// A span log entry was malformed.
    #[error("span log at index {index} is malformed: {reason}")]
    MalformedSpanLog {
        /// Position of the entry in the submitted list.
        index: usize,

        /// Why the entry was rejected.
        reason: &'static str,
    },

    /// Span logs could not be serialized.
    #[error("failed to serialize span logs: {0}")]
    SpanLogs(#[from] serde_json::Error),
}

/// Errors that can occur while submitting a record.
#[derive(Debug, Error)]
pub enum SendError {
    /// The category was not given a port when the sender was built.
    #[error("proxy {0} port not provided, cannot send {0} data")]
    NotConfigured(Category),

    /// Connecting to the proxy failed.
    #[error("unable to connect to proxy at address {address}: {source}")]
    Connect {
        /// The address that was dialed.
        address: String,

        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The record could not be encoded.
    #[error(transparent)]
    Encode(#[from] EncodeError),

    /// The sender, or the category's transport, has been closed.
    #[error("transport is closed")]
    Closed,

    /// A delta counter was submitted with an empty name.
    #[error("empty metric name")]
    EmptyName,
}

/// Transmission failures collected across one or more transports during a flush.
#[derive(Debug, Default)]
pub struct FlushError {
    failures: Vec<(Category, io::Error)>,
}

impl FlushError {
    pub(crate) fn new(category: Category, error: io::Error) -> Self {
        FlushError { failures: vec![(category, error)] }
    }

    pub(crate) fn merge(&mut self, other: FlushError) {
        self.failures.extend(other.failures);
    }

    pub(crate) fn into_result(self) -> Result<(), FlushError> {
        if self.failures.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }

    /// Returns the individual failures, one per transport that failed.
    pub fn failures(&self) -> &[(Category, io::Error)] {
        &self.failures
    }
}

impl fmt::Display for FlushError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (category, error)) in self.failures.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            write!(f, "failed to flush {category} transport: {error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for FlushError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.failures.first().map(|(_, e)| e as &(dyn std::error::Error + 'static))
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::{FlushError, SendError};
    use crate::category::Category;

    #[test]
    fn flush_errors_are_joined_by_newline() {
        let mut error = FlushError::new(Category::Metric, io::Error::other("boom"));
        error.merge(FlushError::new(Category::Event, io::Error::other("bang")));

        assert_eq!(
            error.to_string(),
            "failed to flush metrics transport: boom\nfailed to flush events transport: bang"
        );
        assert_eq!(error.failures().len(), 2);
    }

    #[test]
    fn empty_flush_error_is_ok() {
        assert!(FlushError::default().into_result().is_ok());
    }

    #[test]
    fn not_configured_names_category() {
        let error = SendError::NotConfigured(Category::Histogram);
        assert_eq!(
            error.to_string(),
            "proxy distribution port not provided, cannot send distribution data"
        );
    }
}
