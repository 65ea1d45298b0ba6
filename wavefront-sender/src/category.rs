use std::fmt;

/// A kind of telemetry data, each forwarded over its own connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    /// Metric points, including delta counters.
    Metric,

    /// Histogram distributions.
    Histogram,

    /// Tracing spans and their span logs.
    Span,

    /// Events.
    Event,
}

impl Category {
    /// All categories, in slot order.
    pub const ALL: [Category; 4] =
        [Category::Metric, Category::Histogram, Category::Span, Category::Event];

    /// Returns a short, stable identifier for the category.
    pub const fn as_str(self) -> &'static str {
        match self {
            Category::Metric => "metrics",
            Category::Histogram => "distribution",
            Category::Span => "tracing",
            Category::Event => "events",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fixed map holding at most one value per [`Category`].
#[derive(Debug)]
pub(crate) struct PerCategory<T> {
    metric: Option<T>,
    histogram: Option<T>,
    span: Option<T>,
    event: Option<T>,
}

impl<T> PerCategory<T> {
    pub fn get(&self, category: Category) -> Option<&T> {
        match category {
            Category::Metric => self.metric.as_ref(),
            Category::Histogram => self.histogram.as_ref(),
            Category::Span => self.span.as_ref(),
            Category::Event => self.event.as_ref(),
        }
    }

    pub fn insert(&mut self, category: Category, value: T) {
        let slot = match category {
            Category::Metric => &mut self.metric,
            Category::Histogram => &mut self.histogram,
            Category::Span => &mut self.span,
            Category::Event => &mut self.event,
        };
        *slot = Some(value);
    }

    /// Iterates over the occupied slots, in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (Category, &T)> {
        Category::ALL.into_iter().filter_map(|category| self.get(category).map(|v| (category, v)))
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }
}

impl<T> Default for PerCategory<T> {
    fn default() -> Self {
        PerCategory { metric: None, histogram: None, span: None, event: None }
    }
}

#[cfg(test)]
mod tests {
    use super::{Category, PerCategory};

    #[test]
    fn empty_map_has_no_slots() {
        let map = PerCategory::<u8>::default();
        assert!(map.is_empty());
        for category in Category::ALL {
            assert!(map.get(category).is_none());
        }
    }

    #[test]
    fn iterates_occupied_slots_in_order() {
        let mut map = PerCategory::default();
        map.insert(Category::Event, "e");
        map.insert(Category::Metric, "m");

        let slots = map.iter().collect::<Vec<_>>();
        assert_eq!(slots, vec![(Category::Metric, &"m"), (Category::Event, &"e")]);
        assert!(map.get(Category::Histogram).is_none());
    }
}
