use bytes::Bytes;

use super::{resolve_source, sanitize, write_tags, Tags, ValueFormatter};
use crate::error::EncodeError;

/// Encodes a metric point.
///
/// The line has the form `<name> <value> [<timestamp>] source=<source> [<tagKey>=<tagValue> ...]`. The timestamp is
/// in epoch seconds; when absent, the proxy assigns the time of receipt.
pub fn metric_line(
    name: &str,
    value: f64,
    timestamp: Option<i64>,
    source: &str,
    tags: &Tags,
    default_source: &str,
) -> Result<Bytes, EncodeError> {
    if name.is_empty() {
        return Err(EncodeError::EmptyName { kind: "metric" });
    }

    let mut formatter = ValueFormatter::new();
    let mut buf = Vec::with_capacity(name.len() + 64);

    sanitize::write_internal(&mut buf, name);
    buf.push(b' ');
    buf.extend_from_slice(formatter.float(value).as_bytes());
    if let Some(ts) = timestamp {
        buf.push(b' ');
        buf.extend_from_slice(formatter.int(ts).as_bytes());
    }
    buf.extend_from_slice(b" source=");
    sanitize::write_value(&mut buf, resolve_source(source, default_source));
    write_tags(&mut buf, "metric", tags)?;
    buf.push(b'\n');

    Ok(Bytes::from(buf))
}
