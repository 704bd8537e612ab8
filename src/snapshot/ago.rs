//! Compact relative times such as ` 3h12m ago` for listings.

use chrono::Duration;

const MINUTE: i64 = 60;
const HOUR: i64 = 60 * MINUTE;
const DAY: i64 = 24 * HOUR;
const WEEK: i64 = 7 * DAY;
const MONTH: i64 = 30 * DAY;
const YEAR: i64 = 365 * DAY;

/// `(below, unit size, suffix)`, first match wins, years otherwise.
const RANGES: [(i64, i64, &str); 6] = [
    (MINUTE, 1, "s"),
    (HOUR, MINUTE, "m"),
    (2 * DAY, HOUR, "h"),
    (MONTH, DAY, "d"),
    (3 * MONTH, WEEK, "w"),
    (2 * YEAR, MONTH, "mo"),
];

/// Formats `seconds` with at most `max_precision` units, largest first.
fn ago_seconds(seconds: i64, max_precision: usize) -> String {
    if max_precision == 0 {
        return String::new();
    }
    let (size, unit) = RANGES
        .iter()
        .find(|(below, _, _)| seconds < *below)
        .map(|(_, size, unit)| (*size, *unit))
        .unwrap_or((YEAR, "y"));
    let value = seconds / size;
    let rest = seconds - value * size;
    let tail = if rest > 1 {
        ago_seconds(rest, max_precision - 1)
    } else {
        String::new()
    };
    format!("{value:2}{unit:<2}{tail}")
}

/// Relative description of `d` without the "ago" / "in" framing.
pub fn ago_raw(d: Duration, max_precision: usize) -> String {
    ago_seconds(d.num_seconds().abs(), max_precision)
}

/// `d` in the past reads "… ago", in the future "in …".
pub fn ago(d: Duration, max_precision: usize) -> String {
    let s = ago_raw(d, max_precision);
    if d > Duration::zero() {
        format!("{s} ago")
    } else {
        format!("in {s}")
    }
}
