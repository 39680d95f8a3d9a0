//! Timestamp rendering

use crate::types::Timestamp;
use chrono::{TimeZone, Utc};

/// Render a nanosecond timestamp as RFC3339 in UTC with nanosecond precision.
///
/// Trailing zeros of the fractional part are trimmed and the fraction is
/// omitted entirely on whole seconds: `1970-01-01T00:00:01.000000002Z`,
/// `1970-01-01T00:00:01.5Z`, `1970-01-01T00:00:01Z`.
pub fn format_rfc3339_nano(ts: Timestamp) -> String {
    let dt = Utc.timestamp_nanos(ts);
    let mut out = dt.format("%Y-%m-%dT%H:%M:%S").to_string();

    let nanos = ts.rem_euclid(1_000_000_000);
    if nanos != 0 {
        let frac = format!("{:09}", nanos);
        out.push('.');
        out.push_str(frac.trim_end_matches('0'));
    }
    out.push('Z');
    out
}
