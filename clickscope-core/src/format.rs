//! Display helpers shared by report renderers.

use crate::range::ValueRange;
use chrono::DateTime;

/// Format UNIX seconds as a UTC calendar date (`YYYY-MM-DD`).
///
/// Out-of-range timestamps fall back to the raw number.
pub fn format_date(epoch_secs: i64) -> String {
    DateTime::from_timestamp(epoch_secs, 0)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| epoch_secs.to_string())
}

/// Two decimal places.
pub fn format_decimal(value: f64) -> String {
    format!("{:.2}", value)
}

/// Whole numbers without a fractional part, everything else with two decimals.
pub fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format_decimal(value)
    }
}

/// `"min ~ max"` with both endpoints rendered by `fmt`.
pub fn format_range<T: Copy>(range: &ValueRange<T>, fmt: impl Fn(T) -> String) -> String {
    format!("{} ~ {}", fmt(range.min), fmt(range.max))
}

/// Time filter rendered as dates.
pub fn format_time_range(range: &ValueRange<i64>) -> String {
    format_range(range, format_date)
}

/// `"start-end"`, used for delay bin labels.
pub fn format_span(start: f64, end: f64) -> String {
    format!("{}-{}", format_number(start), format_number(end))
}

/// Histogram bucket label with rounded endpoints (`"10~35"`).
pub fn price_bucket_label(lower: f64, upper: f64) -> String {
    format!("{}~{}", lower.round(), upper.round())
}
