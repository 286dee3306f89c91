//! Change request identifiers
//!
//! Format: `CR-YYYY-MM-NNNNNN`. The sequence restarts every calendar month and
//! is derived from the highest sequence already stored under the month's
//! prefix, so allocation must be serialized per prefix.

use chrono::{DateTime, Datelike, Utc};

/// Zero-padded width of the sequence part
pub const SEQUENCE_WIDTH: usize = 6;

/// Parsed identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrId {
    pub prefix: String,
    pub year: i32,
    pub month: u32,
    pub sequence: u32,
}

/// Month prefix for an instant, e.g. `CR-2026-10`
pub fn period_prefix(prefix: &str, at: DateTime<Utc>) -> String {
    format!("{}-{}-{:02}", prefix, at.year(), at.month())
}

/// Format an identifier from its month prefix and sequence
pub fn format_cr_id(period: &str, sequence: u32) -> String {
    format!("{}-{:0width$}", period, sequence, width = SEQUENCE_WIDTH)
}

/// Next identifier after the highest sequence stored under `period`
pub fn next_cr_id(period: &str, max_sequence: Option<u32>) -> String {
    format_cr_id(period, max_sequence.unwrap_or(0) + 1)
}

/// Sequence number of `id` if it belongs to `period`
pub fn sequence_in(id: &str, period: &str) -> Option<u32> {
    let rest = id.strip_prefix(period)?.strip_prefix('-')?;
    if rest.len() < SEQUENCE_WIDTH || !rest.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    rest.parse().ok()
}

/// Parse a full identifier
pub fn parse_cr_id(id: &str) -> Option<CrId> {
    let mut parts = id.rsplitn(4, '-');
    let sequence = parts.next()?;
    let month = parts.next()?;
    let year = parts.next()?;
    let prefix = parts.next()?;

    if prefix.is_empty() || year.len() != 4 || month.len() != 2 || sequence.len() < SEQUENCE_WIDTH {
        return None;
    }

    let month: u32 = month.parse().ok()?;
    if !(1..=12).contains(&month) {
        return None;
    }

    Some(CrId {
        prefix: prefix.to_string(),
        year: year.parse().ok()?,
        month,
        sequence: sequence.parse().ok()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_period_prefix() {
        let at = Utc.with_ymd_and_hms(2026, 3, 9, 12, 0, 0).unwrap();
        assert_eq!(period_prefix("CR", at), "CR-2026-03");
    }

    #[test]
    fn test_next_cr_id() {
        assert_eq!(next_cr_id("CR-2026-10", None), "CR-2026-10-000001");
        assert_eq!(next_cr_id("CR-2026-10", Some(41)), "CR-2026-10-000042");
        assert_eq!(next_cr_id("CR-2026-10", Some(999_999)), "CR-2026-10-1000000");
    }

    #[test]
    fn test_sequence_in() {
        assert_eq!(sequence_in("CR-2026-10-000007", "CR-2026-10"), Some(7));
        assert_eq!(sequence_in("CR-2026-11-000007", "CR-2026-10"), None);
        assert_eq!(sequence_in("CR-2026-10-7", "CR-2026-10"), None);
        assert_eq!(sequence_in("CR-2026-100-000007", "CR-2026-10"), None);
    }

    #[test]
    fn test_parse_cr_id() {
        let parsed = parse_cr_id("CR-2026-10-000123").unwrap();
        assert_eq!(parsed.prefix, "CR");
        assert_eq!(parsed.year, 2026);
        assert_eq!(parsed.month, 10);
        assert_eq!(parsed.sequence, 123);

        assert!(parse_cr_id("CR-2026-13-000123").is_none());
        assert!(parse_cr_id("TICKET-abcd").is_none());
    }
}
