//! Line encoders for the Wavefront proxy wire format.
//!
//! Every encoder turns a typed record into one or more complete, newline-terminated lines, or fails without producing
//! any output. Encoders are pure: they never touch the network, and they are the only place where record contents are
//! validated.

use std::collections::BTreeMap;

mod event;
pub use self::event::{event_line, EventOptions};

mod histogram;
pub use self::histogram::{histogram_line, Centroid, Granularity};

mod metric;
pub use self::metric::metric_line;

mod sanitize;

mod span;
pub use self::span::{span_line, span_logs_line, Span, SpanLog, SpanTag};

use crate::error::EncodeError;

/// Point tags, keyed by tag name.
///
/// A sorted map is used so that encoded lines are deterministic.
pub type Tags = BTreeMap<String, String>;

/// Formats numeric values without allocating.
pub(crate) struct ValueFormatter {
    int_writer: itoa::Buffer,
    float_writer: ryu::Buffer,
}

impl ValueFormatter {
    pub fn new() -> Self {
        Self { int_writer: itoa::Buffer::new(), float_writer: ryu::Buffer::new() }
    }

    pub fn int(&mut self, value: i64) -> &str {
        self.int_writer.format(value)
    }

    pub fn float(&mut self, value: f64) -> &str {
        self.float_writer.format(value)
    }
}

/// Writes ` key=value` pairs for the given tags, rejecting blank keys or values.
pub(crate) fn write_tags(buf: &mut Vec<u8>, kind: &'static str, tags: &Tags) -> Result<(), EncodeError> {
    for (key, value) in tags {
        if key.is_empty() || value.is_empty() {
            return Err(EncodeError::BlankTag { kind, key: key.clone() });
        }
        buf.push(b' ');
        sanitize::write_internal(buf, key);
        buf.push(b'=');
        sanitize::write_value(buf, value);
    }
    Ok(())
}

/// Picks the caller's source when provided, falling back to the default source otherwise.
pub(crate) fn resolve_source<'a>(source: &'a str, default_source: &'a str) -> &'a str {
    if source.is_empty() {
        default_source
    } else {
        source
    }
}
