use chrono::{DateTime, NaiveDate, Utc};

pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Parses an RFC 3339 timestamp. Unparseable input yields `None`.
#[must_use]
pub fn parse_rfc3339(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(trimmed)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Fractional days elapsed from `from` until `as_of`, never negative.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn days_between(from: DateTime<Utc>, as_of: DateTime<Utc>) -> f64 {
    let seconds = (as_of - from).num_seconds().max(0);
    seconds as f64 / 86_400.0
}

/// Parses a `YYYY-MM-DD` file stem.
#[must_use]
pub fn parse_date_stem(stem: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(stem, "%Y-%m-%d").ok()
}
