use bytes::Bytes;

use super::{resolve_source, sanitize, write_tags, Tags, ValueFormatter};
use crate::error::EncodeError;

/// The aggregation interval the proxy applies to a distribution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Granularity {
    /// Aggregate by minute.
    Minute,

    /// Aggregate by hour.
    Hour,

    /// Aggregate by day.
    Day,
}

impl Granularity {
    fn as_bytes(self) -> &'static [u8] {
        match self {
            Granularity::Minute => b"!M",
            Granularity::Hour => b"!H",
            Granularity::Day => b"!D",
        }
    }
}

/// A single value/weight pair approximating part of a distribution.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Centroid {
    /// The centroid value.
    pub value: f64,

    /// How many samples the centroid represents.
    pub count: u32,
}

impl Centroid {
    /// Creates a new `Centroid`.
    pub const fn new(value: f64, count: u32) -> Self {
        Centroid { value, count }
    }
}

/// Merges centroids sharing a value, returning them sorted by value.
fn compact(centroids: &[Centroid]) -> Vec<Centroid> {
    let mut sorted = centroids.to_vec();
    sorted.sort_by(|a, b| a.value.total_cmp(&b.value));

    let mut compacted: Vec<Centroid> = Vec::with_capacity(sorted.len());
    for centroid in sorted {
        match compacted.last_mut() {
            Some(last) if last.value == centroid.value => {
                last.count = last.count.saturating_add(centroid.count);
            }
            _ => compacted.push(centroid),
        }
    }
    compacted
}

/// Encodes a distribution.
///
/// One line is produced per requested granularity, in minute/hour/day order, each of the form
/// `<granularity> [<timestamp>] #<count> <value> ... <name> source=<source> [<tagKey>=<tagValue> ...]`.
pub fn histogram_line(
    name: &str,
    centroids: &[Centroid],
    granularities: &[Granularity],
    timestamp: Option<i64>,
    source: &str,
    tags: &Tags,
    default_source: &str,
) -> Result<Bytes, EncodeError> {
    if name.is_empty() {
        return Err(EncodeError::EmptyName { kind: "distribution" });
    }
    if centroids.is_empty() {
        return Err(EncodeError::EmptyCentroids);
    }

    let mut granularities = granularities.to_vec();
    granularities.sort_unstable();
    granularities.dedup();
    if granularities.is_empty() {
        return Err(EncodeError::EmptyGranularities);
    }

    let centroids = compact(centroids);
    let mut formatter = ValueFormatter::new();

    // Everything after the centroids is shared by every granularity's line.
    let mut trailer = Vec::with_capacity(name.len() + 64);
    trailer.push(b' ');
    sanitize::write_internal(&mut trailer, name);
    trailer.extend_from_slice(b" source=");
    sanitize::write_value(&mut trailer, resolve_source(source, default_source));
    write_tags(&mut trailer, "distribution", tags)?;
    trailer.push(b'\n');

    let mut buf = Vec::new();
    for granularity in granularities {
        buf.extend_from_slice(granularity.as_bytes());
        if let Some(ts) = timestamp {
            buf.push(b' ');
            buf.extend_from_slice(formatter.int(ts).as_bytes());
        }
        for centroid in &centroids {
            buf.extend_from_slice(b" #");
            buf.extend_from_slice(formatter.int(i64::from(centroid.count)).as_bytes());
            buf.push(b' ');
            buf.extend_from_slice(formatter.float(centroid.value).as_bytes());
        }
        buf.extend_from_slice(&trailer);
    }

    Ok(Bytes::from(buf))
}

#[cfg(test)]
mod tests {
    use super::{histogram_line, Centroid, Granularity};
    use crate::{error::EncodeError, lines::Tags};

    #[test]
    fn single_granularity() {
        let tags = Tags::from([("region".to_string(), "us-west".to_string())]);
        let line = histogram_line(
            "request.latency",
            &[Centroid::new(30.0, 20), Centroid::new(5.1, 10)],
            &[Granularity::Minute],
            Some(1493773500),
            "appServer1",
            &tags,
            "default",
        )
        .unwrap();

        assert_eq!(
            std::str::from_utf8(&line).unwrap(),
            "!M 1493773500 #10 5.1 #20 30.0 \"request.latency\" source=\"appServer1\" \"region\"=\"us-west\"\n"
        );
    }

    #[test]
    fn multiple_granularities_are_ordered_and_deduplicated() {
        let line = histogram_line(
            "latency",
            &[Centroid::new(1.0, 1), Centroid::new(1.0, 2), Centroid::new(0.5, 4)],
            &[Granularity::Day, Granularity::Minute, Granularity::Day, Granularity::Hour],
            None,
            "",
            &Tags::new(),
            "host",
        )
        .unwrap();

        let expected = [
            "!M #4 0.5 #3 1.0 \"latency\" source=\"host\"\n",
            "!H #4 0.5 #3 1.0 \"latency\" source=\"host\"\n",
            "!D #4 0.5 #3 1.0 \"latency\" source=\"host\"\n",
        ]
        .concat();
        assert_eq!(std::str::from_utf8(&line).unwrap(), expected);
    }

    #[test]
    fn rejects_malformed_input() {
        let tags = Tags::new();
        let centroids = [Centroid::new(1.0, 1)];

        assert!(matches!(
            histogram_line("h", &[], &[Granularity::Hour], None, "", &tags, "d"),
            Err(EncodeError::EmptyCentroids)
        ));
        assert!(matches!(
            histogram_line("h", &centroids, &[], None, "", &tags, "d"),
            Err(EncodeError::EmptyGranularities)
        ));
        assert!(matches!(
            histogram_line("", &centroids, &[Granularity::Hour], None, "", &tags, "d"),
            Err(EncodeError::EmptyName { .. })
        ));
    }
}
