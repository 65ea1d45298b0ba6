use crate::counter::{ALT_DELTA_PREFIX, DELTA_PREFIX};

/// Writes a metric name or tag key, quoted, replacing any disallowed characters with `-`.
///
/// Allowed characters are ASCII letters and digits, `,`, `.`, `_` and `-`. A leading delta marker, followed by an
/// optional leading `~` for internal metrics, is preserved as-is.
pub(crate) fn write_internal(buf: &mut Vec<u8>, s: &str) {
    buf.reserve(s.len() + 2);
    buf.push(b'"');

    let mut rest = s;
    for prefix in [DELTA_PREFIX, ALT_DELTA_PREFIX] {
        if let Some(stripped) = rest.strip_prefix(prefix) {
            buf.extend_from_slice(prefix.as_bytes());
            rest = stripped;
            break;
        }
    }
    if let Some(stripped) = rest.strip_prefix('~') {
        buf.push(b'~');
        rest = stripped;
    }

    for c in rest.chars() {
        if c.is_ascii_alphanumeric() || matches!(c, ',' | '-' | '.' | '_') {
            buf.push(c as u8);
        } else {
            buf.push(b'-');
        }
    }

    buf.push(b'"');
}

/// Writes a free-form value, quoted, escaping embedded quotes and newlines.
pub(crate) fn write_value(buf: &mut Vec<u8>, s: &str) {
    buf.reserve(s.len() + 2);
    buf.push(b'"');
    for c in s.chars() {
        match c {
            '"' => buf.extend_from_slice(b"\\\""),
            '\n' => buf.extend_from_slice(b"\\n"),
            c => {
                let mut tmp = [0u8; 4];
                buf.extend_from_slice(c.encode_utf8(&mut tmp).as_bytes());
            }
        }
    }
    buf.push(b'"');
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::{write_internal, write_value};

    fn internal(s: &str) -> String {
        let mut buf = Vec::new();
        write_internal(&mut buf, s);
        String::from_utf8(buf).unwrap()
    }

    fn value(s: &str) -> String {
        let mut buf = Vec::new();
        write_value(&mut buf, s);
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn internal_names() {
        // Cases are defined as: input, expected output.
        let cases = [
            ("requests.total", "\"requests.total\""),
            ("requests total", "\"requests-total\""),
            ("a/b:c", "\"a-b-c\""),
            ("~sdk.points", "\"~sdk.points\""),
            ("x~y", "\"x-y\""),
            ("\u{2206}count", "\"\u{2206}count\""),
            ("\u{2206}~sdk.count", "\"\u{2206}~sdk.count\""),
            ("\u{0394}count", "\"\u{0394}count\""),
            ("caf\u{e9}", "\"caf-\""),
            ("a,b_c-d", "\"a,b_c-d\""),
        ];

        for (input, expected) in cases {
            assert_eq!(internal(input), expected, "input: {input:?}");
        }
    }

    #[test]
    fn values() {
        let cases = [
            ("host-1", "\"host-1\""),
            ("say \"hi\"", "\"say \\\"hi\\\"\""),
            ("two\nlines", "\"two\\nlines\""),
            ("caf\u{e9}", "\"caf\u{e9}\""),
        ];

        for (input, expected) in cases {
            assert_eq!(value(input), expected, "input: {input:?}");
        }
    }

    proptest! {
        #[test]
        fn internal_output_is_always_quoted_and_clean(input in "\\PC*") {
            let output = internal(&input);
            prop_assert!(output.starts_with('"') && output.ends_with('"'));
            let inner = &output[1..output.len() - 1];
            let inner = inner.trim_start_matches(['\u{2206}', '\u{0394}']);
            let inner = inner.strip_prefix('~').unwrap_or(inner);
            prop_assert!(inner.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, ',' | '-' | '.' | '_')));
        }

        #[test]
        fn value_output_has_no_raw_newlines(input in "\\PC*|[a-z\"\n]{0,32}") {
            let output = value(&input);
            prop_assert!(!output.contains('\n'));
            prop_assert!(output.starts_with('"') && output.ends_with('"'));
        }
    }
}
