use chrono::{DateTime, TimeDelta, Utc};

/// A span of time that lies within one UTC calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DaySpan {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DaySpan {
    /// Length of the span in hours, rounded to 2 decimal places.
    #[must_use]
    pub fn hours(&self) -> f64 {
        #[expect(clippy::cast_precision_loss, reason = "task spans are far below 2^52 ms")]
        let ms = (self.end - self.start).num_milliseconds() as f64;
        round_hours(ms / 3_600_000.0)
    }
}

/// Split `[start, end]` into one span per UTC calendar day it touches.
///
/// Every span but the last ends at 23:59:59.999 of its day; every span but the first
/// starts at midnight. An interval that ends before it starts yields nothing.
#[must_use]
pub fn split_by_day(start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<DaySpan> {
    if end < start {
        return Vec::new();
    }

    let mut spans = Vec::new();
    let mut current = start;
    loop {
        let day = current.date_naive();
        let Some(next_day) = day.succ_opt() else {
            spans.push(DaySpan { start: current, end });
            break;
        };

        let next_midnight = crate::date_range::start_of_day(next_day);
        if end < next_midnight {
            spans.push(DaySpan { start: current, end });
            break;
        }

        spans.push(DaySpan {
            start: current,
            end: next_midnight - TimeDelta::milliseconds(1),
        });
        current = next_midnight;
    }

    spans
}

/// Round to 2 decimal places.
#[must_use]
pub fn round_hours(hours: f64) -> f64 {
    (hours * 100.0).round() / 100.0
}

/// Metric type for a task category: lowercased, spaces replaced by underscores.
#[must_use]
pub fn category_metric_type(category: &str) -> String {
    category.to_lowercase().replace(' ', "_")
}
