//! Counters used for operational statistics.
//!
//! Both counter types are lock-free: they wrap a single atomic integer, so that per-category submission paths never
//! contend with each other when recording statistics.

use std::sync::atomic::{AtomicU64, Ordering};

/// Marker prepended to a metric name to identify it as a delta counter.
pub const DELTA_PREFIX: &str = "\u{2206}";

/// Alternative delta marker (Greek capital delta) that the proxy also accepts.
pub const ALT_DELTA_PREFIX: &str = "\u{0394}";

/// Returns `true` if the given metric name already carries a delta marker.
pub fn has_delta_prefix(name: &str) -> bool {
    name.starts_with(DELTA_PREFIX) || name.starts_with(ALT_DELTA_PREFIX)
}

/// Returns the delta counter form of the given metric name.
///
/// Names that already carry a delta marker are returned unchanged.
pub fn delta_counter_name(name: &str) -> String {
    if has_delta_prefix(name) {
        name.to_string()
    } else {
        let mut delta_name = String::with_capacity(DELTA_PREFIX.len() + name.len());
        delta_name.push_str(DELTA_PREFIX);
        delta_name.push_str(name);
        delta_name
    }
}

/// A counter that reports only the amount accumulated since it was last reported.
///
/// The accumulated delta is stored as the bit pattern of an `f64`, which allows fractional increments while still
/// allowing the report to read and reset the value in a single atomic step.
#[derive(Debug, Default)]
pub struct DeltaCounter {
    delta: AtomicU64,
}

impl DeltaCounter {
    /// Creates a `DeltaCounter` with no accumulated delta.
    pub const fn new() -> Self {
        // The bit pattern of `0.0f64` is all zeroes.
        DeltaCounter { delta: AtomicU64::new(0) }
    }

    /// Adds `amount` to the pending delta.
    pub fn increment(&self, amount: f64) {
        // The closure always returns `Some`, so the update cannot fail.
        let _ = self.delta.fetch_update(Ordering::AcqRel, Ordering::Relaxed, |curr| {
            Some((f64::from_bits(curr) + amount).to_bits())
        });
    }

    /// Returns the pending delta without resetting it.
    pub fn peek(&self) -> f64 {
        f64::from_bits(self.delta.load(Ordering::Acquire))
    }

    /// Returns the accumulated delta and resets it to zero.
    ///
    /// Increments racing with a report land either in the returned value or in the next one, never in neither.
    pub fn report_and_reset(&self) -> f64 {
        f64::from_bits(self.delta.swap(0f64.to_bits(), Ordering::AcqRel))
    }
}

/// A monotonically increasing counter that is never reset.
#[derive(Debug, Default)]
pub struct Counter {
    count: AtomicU64,
}

impl Counter {
    /// Creates a `Counter` starting at zero.
    pub const fn new() -> Self {
        Counter { count: AtomicU64::new(0) }
    }

    /// Increments the counter by `value`.
    pub fn increment(&self, value: u64) {
        self.count.fetch_add(value, Ordering::AcqRel);
    }

    /// Returns the current count.
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use super::{delta_counter_name, has_delta_prefix, Counter, DeltaCounter, ALT_DELTA_PREFIX};

    #[test]
    fn report_resets_delta() {
        let counter = DeltaCounter::new();
        counter.increment(2.0);
        counter.increment(0.5);

        assert_eq!(counter.report_and_reset(), 2.5);
        assert_eq!(counter.report_and_reset(), 0.0);

        counter.increment(1.0);
        assert_eq!(counter.peek(), 1.0);
        assert_eq!(counter.report_and_reset(), 1.0);
    }

    #[test]
    fn concurrent_increments_are_not_lost() {
        let counter = Arc::new(DeltaCounter::new());
        let handles = (0..8)
            .map(|_| {
                let counter = Arc::clone(&counter);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        counter.increment(1.0);
                    }
                })
            })
            .collect::<Vec<_>>();

        // Reports taken while the writers are running must add up with the final report.
        let mut reported = 0.0;
        for _ in 0..10 {
            reported += counter.report_and_reset();
        }
        for handle in handles {
            handle.join().unwrap();
        }
        reported += counter.report_and_reset();

        assert_eq!(reported, 8000.0);
    }

    #[test]
    fn delta_names() {
        let cases = [
            ("requests", "\u{2206}requests"),
            ("\u{2206}requests", "\u{2206}requests"),
            ("\u{0394}requests", "\u{0394}requests"),
            ("~sdk.points.valid.count", "\u{2206}~sdk.points.valid.count"),
        ];

        for (input, expected) in cases {
            assert_eq!(delta_counter_name(input), expected);
            assert!(has_delta_prefix(expected));
        }

        assert!(!has_delta_prefix("requests"));
        assert!(has_delta_prefix(&format!("{ALT_DELTA_PREFIX}x")));
    }

    #[test]
    fn cumulative_counter() {
        let counter = Counter::new();
        counter.increment(3);
        counter.increment(4);
        assert_eq!(counter.count(), 7);
        assert_eq!(counter.count(), 7);
    }
}
