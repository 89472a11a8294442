//! Lenient parsing helpers for platform payload fields.
//!
//! Every helper here degrades to zero/empty instead of failing, so a bad
//! field never aborts the row it belongs to.

use once_cell::sync::Lazy;
use regex::Regex;

static DURATION_RX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^P(?:(?P<days>\d+)D)?(?:T(?:(?P<hours>\d+)H)?(?:(?P<minutes>\d+)M)?(?:(?P<seconds>\d+)S)?)?$",
    )
    .expect("duration regex compiles")
});

/// Parses a platform count such as `"12,345"` or `"987"`. Anything else is 0.
#[must_use]
pub fn parse_count(raw: &str) -> u64 {
    let cleaned: String = raw.trim().chars().filter(|c| *c != ',').collect();
    cleaned.parse::<u64>().unwrap_or(0)
}

/// Converts an ISO-8601 duration (`PT5M12S`, `P1DT2H`) into seconds.
///
/// Returns 0 for empty or unrecognised input.
#[must_use]
pub fn parse_iso8601_duration(raw: &str) -> u64 {
    let Some(caps) = DURATION_RX.captures(raw.trim()) else {
        return 0;
    };
    let part = |name: &str| -> u64 {
        caps.name(name)
            .and_then(|m| m.as_str().parse::<u64>().ok())
            .unwrap_or(0)
    };

    part("days")
        .saturating_mul(86_400)
        .saturating_add(part("hours").saturating_mul(3_600))
        .saturating_add(part("minutes").saturating_mul(60))
        .saturating_add(part("seconds"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_count_handles_separators_and_garbage() {
        assert_eq!(parse_count("12,345"), 12_345);
        assert_eq!(parse_count(" 987 "), 987);
        assert_eq!(parse_count(""), 0);
        assert_eq!(parse_count("-5"), 0);
        assert_eq!(parse_count("n/a"), 0);
    }

    #[test]
    fn parse_duration_variants() {
        assert_eq!(parse_iso8601_duration("PT5M12S"), 312);
        assert_eq!(parse_iso8601_duration("PT1H"), 3600);
        assert_eq!(parse_iso8601_duration("P1DT2H3M4S"), 93_784);
        assert_eq!(parse_iso8601_duration("PT45S"), 45);
        assert_eq!(parse_iso8601_duration("P0D"), 0);
    }

    #[test]
    fn parse_duration_rejects_malformed_input() {
        assert_eq!(parse_iso8601_duration(""), 0);
        assert_eq!(parse_iso8601_duration("5 minutes"), 0);
        assert_eq!(parse_iso8601_duration("PT5X"), 0);
    }
}
