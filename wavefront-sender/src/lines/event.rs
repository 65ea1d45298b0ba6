use std::collections::BTreeMap;

use bytes::Bytes;

use super::{resolve_source, sanitize, Tags, ValueFormatter};
use crate::error::EncodeError;

// Anything at or below this is taken to be in epoch seconds rather than milliseconds.
const MAX_SECONDS_TIMESTAMP: i64 = 999_999_999_999;

/// Optional annotations attached to an event.
#[derive(Clone, Debug, Default)]
pub struct EventOptions {
    annotations: BTreeMap<String, String>,
}

impl EventOptions {
    /// Creates an empty set of event options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the event severity.
    #[must_use]
    pub fn severity(self, severity: impl Into<String>) -> Self {
        self.annotate("severity", severity)
    }

    /// Sets the event type.
    #[must_use]
    pub fn event_type(self, event_type: impl Into<String>) -> Self {
        self.annotate("type", event_type)
    }

    /// Sets the event details.
    #[must_use]
    pub fn details(self, details: impl Into<String>) -> Self {
        self.annotate("details", details)
    }

    /// Sets an arbitrary annotation, replacing any previous value for the same key.
    #[must_use]
    pub fn annotate(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }
}

fn adjust_start_end(start_millis: i64, end_millis: i64) -> (i64, i64) {
    let start_millis =
        if start_millis <= MAX_SECONDS_TIMESTAMP { start_millis.saturating_mul(1000) } else { start_millis };
    let end_millis = if end_millis == 0 {
        start_millis.saturating_add(1)
    } else if end_millis <= MAX_SECONDS_TIMESTAMP {
        end_millis.saturating_mul(1000)
    } else {
        end_millis
    };
    (start_millis, end_millis)
}

/// Encodes an event.
///
/// The line has the form `@Event <start> <end> "<name>" [<annotation>=<value> ...] host=<source> [tag="<k>: <v>" ...]`.
/// Start and end times given in epoch seconds are scaled to milliseconds, and an end time of zero marks the event as
/// instantaneous.
pub fn event_line(
    name: &str,
    start_millis: i64,
    end_millis: i64,
    source: &str,
    tags: &Tags,
    options: &EventOptions,
    default_source: &str,
) -> Result<Bytes, EncodeError> {
    if name.is_empty() {
        return Err(EncodeError::EmptyName { kind: "event" });
    }

    let (start_millis, end_millis) = adjust_start_end(start_millis, end_millis);
    let mut formatter = ValueFormatter::new();
    let mut buf = Vec::with_capacity(name.len() + 64);

    buf.extend_from_slice(b"@Event ");
    buf.extend_from_slice(formatter.int(start_millis).as_bytes());
    buf.push(b' ');
    buf.extend_from_slice(formatter.int(end_millis).as_bytes());
    buf.push(b' ');
    sanitize::write_value(&mut buf, name);

    for (key, value) in &options.annotations {
        if key.is_empty() || value.is_empty() {
            return Err(EncodeError::BlankTag { kind: "event annotation", key: key.clone() });
        }
        buf.push(b' ');
        sanitize::write_internal(&mut buf, key);
        buf.push(b'=');
        sanitize::write_value(&mut buf, value);
    }

    buf.extend_from_slice(b" host=");
    sanitize::write_value(&mut buf, resolve_source(source, default_source));

    for (key, value) in tags {
        if key.is_empty() || value.is_empty() {
            return Err(EncodeError::BlankTag { kind: "event", key: key.clone() });
        }
        buf.extend_from_slice(b" tag=");
        sanitize::write_value(&mut buf, &format!("{key}: {value}"));
    }
    buf.push(b'\n');

    Ok(Bytes::from(buf))
}

#[cfg(test)]
mod tests {
    use super::{adjust_start_end, event_line, EventOptions};
    use crate::{error::EncodeError, lines::Tags};

    #[test]
    fn event() {
        let tags = Tags::from([("env".to_string(), "prod".to_string())]);
        let options = EventOptions::new().severity("info").event_type("deploy").details("rolled out v2");
        let line =
            event_line("Deploy", 1590678089000, 1590679089000, "web-1", &tags, &options, "default").unwrap();

        assert_eq!(
            std::str::from_utf8(&line).unwrap(),
            "@Event 1590678089000 1590679089000 \"Deploy\" \"details\"=\"rolled out v2\" \"severity\"=\"info\" \
             \"type\"=\"deploy\" host=\"web-1\" tag=\"env: prod\"\n"
        );
    }

    #[test]
    fn instantaneous_event_from_seconds() {
        let line = event_line("Restart", 1590678089, 0, "", &Tags::new(), &EventOptions::new(), "box").unwrap();
        assert_eq!(
            std::str::from_utf8(&line).unwrap(),
            "@Event 1590678089000 1590678089001 \"Restart\" host=\"box\"\n"
        );
    }

    #[test]
    fn timestamp_adjustment() {
        // Cases are defined as: start, end, expected start, expected end.
        let cases = [
            (1_000, 2_000, 1_000_000, 2_000_000),
            (1_590_678_089_000, 0, 1_590_678_089_000, 1_590_678_089_001),
            (1_590_678_089_000, 1_590_678_090_000, 1_590_678_089_000, 1_590_678_090_000),
            (1_590_678_089, 1_590_678_090, 1_590_678_089_000, 1_590_678_090_000),
            (i64::MAX, 0, i64::MAX, i64::MAX),
        ];

        for (start, end, expected_start, expected_end) in cases {
            assert_eq!(adjust_start_end(start, end), (expected_start, expected_end));
        }
    }

    #[test]
    fn rejects_blank_annotations() {
        let options = EventOptions::new().annotate("owner", "");
        let result = event_line("e", 1, 0, "", &Tags::new(), &options, "d");
        assert!(matches!(result, Err(EncodeError::BlankTag { .. })));
    }
}
