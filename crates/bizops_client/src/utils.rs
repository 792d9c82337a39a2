//! Date normalization shared by report queries and report rows.

/// Normalize a date-ish string to `YYYY-MM-DD`.
///
/// Accepts:
/// - YYYY-MM-DD, including unpadded months and days (`2025-1-5`)
/// - RFC3339 datetime (date part in its own offset)
/// - Naive datetime `YYYY-MM-DDTHH:MM:SS[.fff]` or with a space separator
pub fn normalize_report_date(s: &str) -> Option<String> {
    let s = s.trim();
    if let Ok(d) = chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(d.format("%Y-%m-%d").to_string());
    }
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive().format("%Y-%m-%d").to_string());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, fmt) {
            return Some(ndt.date().format("%Y-%m-%d").to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_report_date_accepts_date_only() {
        assert_eq!(normalize_report_date("2025-01-01").unwrap(), "2025-01-01");
    }

    #[test]
    fn normalize_report_date_pads_month_and_day() {
        assert_eq!(normalize_report_date("2025-1-5").unwrap(), "2025-01-05");
        assert_eq!(normalize_report_date(" 2025-10-5 ").unwrap(), "2025-10-05");
    }

    #[test]
    fn normalize_report_date_truncates_datetimes() {
        assert_eq!(
            normalize_report_date("2025-12-15T10:30:00").unwrap(),
            "2025-12-15"
        );
        assert_eq!(
            normalize_report_date("2025-12-15 23:59:59.123").unwrap(),
            "2025-12-15"
        );
        assert_eq!(
            normalize_report_date("2025-12-15T10:30:00-05:00").unwrap(),
            "2025-12-15"
        );
    }

    #[test]
    fn normalize_report_date_rejects_invalid() {
        assert!(normalize_report_date("not-a-date").is_none());
        assert!(normalize_report_date("2025-13-40").is_none());
    }
}
