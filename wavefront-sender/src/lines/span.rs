use std::collections::BTreeMap;

use bytes::Bytes;
use serde::Serialize;

use super::{resolve_source, sanitize, ValueFormatter};
use crate::error::EncodeError;

/// A span tag.
///
/// Unlike point tags, span tags are an ordered list and may repeat a key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpanTag {
    /// Tag key.
    pub key: String,

    /// Tag value.
    pub value: String,
}

impl SpanTag {
    /// Creates a new `SpanTag`.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        SpanTag { key: key.into(), value: value.into() }
    }
}

/// A timestamped annotation attached to a span.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SpanLog {
    /// Epoch timestamp of the annotation, in microseconds.
    pub timestamp: i64,

    /// Annotation fields.
    pub fields: BTreeMap<String, String>,
}

/// A tracing span.
#[derive(Clone, Debug, Default)]
pub struct Span<'a> {
    /// Operation name.
    pub name: &'a str,

    /// Start time, in epoch milliseconds.
    pub start_millis: i64,

    /// Duration, in milliseconds.
    pub duration_millis: i64,

    /// Source of the span. The sender's default source is used when empty.
    pub source: &'a str,

    /// Trace the span belongs to.
    pub trace_id: &'a str,

    /// Identifier of the span itself.
    pub span_id: &'a str,

    /// Parent span identifiers.
    pub parents: &'a [String],

    /// Identifiers of spans this span follows from.
    pub follows_from: &'a [String],

    /// Span tags.
    pub tags: &'a [SpanTag],
}

/// Encodes a span.
///
/// When `has_logs` is `true`, the span is marked with `_spanLogs=true` so the proxy can correlate it with the span
/// logs record sent after it.
pub fn span_line(span: &Span<'_>, has_logs: bool, default_source: &str) -> Result<Bytes, EncodeError> {
    if span.name.is_empty() {
        return Err(EncodeError::EmptyName { kind: "span" });
    }
    if span.trace_id.is_empty() {
        return Err(EncodeError::EmptySpanId { field: "traceId" });
    }
    if span.span_id.is_empty() {
        return Err(EncodeError::EmptySpanId { field: "spanId" });
    }

    let mut formatter = ValueFormatter::new();
    let mut buf = Vec::with_capacity(span.name.len() + 128);

    sanitize::write_value(&mut buf, span.name);
    buf.extend_from_slice(b" source=");
    sanitize::write_value(&mut buf, resolve_source(span.source, default_source));
    buf.extend_from_slice(b" traceId=");
    buf.extend_from_slice(span.trace_id.as_bytes());
    buf.extend_from_slice(b" spanId=");
    buf.extend_from_slice(span.span_id.as_bytes());
    for parent in span.parents {
        buf.extend_from_slice(b" parent=");
        buf.extend_from_slice(parent.as_bytes());
    }
    for follows_from in span.follows_from {
        buf.extend_from_slice(b" followsFrom=");
        buf.extend_from_slice(follows_from.as_bytes());
    }
    for tag in span.tags {
        if tag.key.is_empty() || tag.value.is_empty() {
            return Err(EncodeError::BlankTag { kind: "span", key: tag.key.clone() });
        }
        buf.push(b' ');
        sanitize::write_internal(&mut buf, &tag.key);
        buf.push(b'=');
        sanitize::write_value(&mut buf, &tag.value);
    }
    if has_logs {
        buf.extend_from_slice(b" \"_spanLogs\"=\"true\"");
    }
    buf.push(b' ');
    buf.extend_from_slice(formatter.int(span.start_millis).as_bytes());
    buf.push(b' ');
    buf.extend_from_slice(formatter.int(span.duration_millis).as_bytes());
    buf.push(b'\n');

    Ok(Bytes::from(buf))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SpanLogs<'a> {
    trace_id: &'a str,
    span_id: &'a str,
    logs: &'a [SpanLog],
}

/// Encodes the span logs for the given span as a single JSON line.
pub fn span_logs_line(trace_id: &str, span_id: &str, logs: &[SpanLog]) -> Result<Bytes, EncodeError> {
    if trace_id.is_empty() {
        return Err(EncodeError::EmptySpanId { field: "traceId" });
    }
    if span_id.is_empty() {
        return Err(EncodeError::EmptySpanId { field: "spanId" });
    }
    for (index, log) in logs.iter().enumerate() {
        if log.fields.is_empty() {
            return Err(EncodeError::MalformedSpanLog { index, reason: "no fields" });
        }
        if log.fields.keys().any(String::is_empty) {
            return Err(EncodeError::MalformedSpanLog { index, reason: "blank field key" });
        }
    }

    let mut buf = serde_json::to_vec(&SpanLogs { trace_id, span_id, logs })?;
    buf.push(b'\n');
    Ok(Bytes::from(buf))
}
