//! Small helpers.

use chrono::{Datelike, Duration, NaiveDate};

pub fn sanitize_symbol(sym: &str) -> String {
    sym.trim().to_uppercase()
}

pub fn round_to(x: f64, places: i32) -> f64 {
    let m = 10f64.powi(places);
    (x * m).round() / m
}

/// Next Friday after `today`; a Friday rolls to the following week.
pub fn next_weekly_expiry(today: NaiveDate) -> NaiveDate {
    let wd = today.weekday().num_days_from_monday() as i64;
    let days_ahead = match (4 - wd).rem_euclid(7) {
        0 => 7,
        d => d,
    };
    today + Duration::days(days_ahead)
}

pub fn mmdd_digits(s: &str) -> Option<String> {
    // Convert "08/16" or "08-16" to "0816"
    let d: String = s.chars().filter(|c| c.is_ascii_digit()).collect();
    if d.len() == 4 {
        Some(d)
    } else {
        None
    }
}

/// Resolve "MM/DD" to the first such date on or after `today`, or parse "YYYY-MM-DD".
pub fn expiry_from_str(s: &str, today: NaiveDate) -> Option<NaiveDate> {
    if let Ok(d) = NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d") {
        return Some(d);
    }
    let mmdd = mmdd_digits(s)?;
    let month: u32 = mmdd[..2].parse().ok()?;
    let day: u32 = mmdd[2..].parse().ok()?;
    let this_year = NaiveDate::from_ymd_opt(today.year(), month, day)?;
    if this_year >= today {
        Some(this_year)
    } else {
        NaiveDate::from_ymd_opt(today.year() + 1, month, day)
    }
}

/// Namespace names double as directory names.
pub fn is_valid_user(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn weekly_expiry_is_next_friday() {
        // 2025-01-06 is a Monday.
        assert_eq!(next_weekly_expiry(d(2025, 1, 6)), d(2025, 1, 10));
        assert_eq!(next_weekly_expiry(d(2025, 1, 9)), d(2025, 1, 10));
        assert_eq!(next_weekly_expiry(d(2025, 1, 10)), d(2025, 1, 17));
        assert_eq!(next_weekly_expiry(d(2025, 1, 11)), d(2025, 1, 17));
    }

    #[test]
    fn expiry_parsing() {
        let today = d(2025, 11, 20);
        assert_eq!(expiry_from_str("11/21", today), Some(d(2025, 11, 21)));
        assert_eq!(expiry_from_str("01/09", today), Some(d(2026, 1, 9)));
        assert_eq!(expiry_from_str("2025-12-19", today), Some(d(2025, 12, 19)));
        assert_eq!(expiry_from_str("13/40", today), None);
        assert_eq!(expiry_from_str("1/9", today), None);
    }

    #[test]
    fn rounding_and_names() {
        assert_eq!(round_to(61.5999, 2), 61.6);
        assert_eq!(sanitize_symbol(" soxl "), "SOXL");
        assert!(is_valid_user("alice_01"));
        assert!(!is_valid_user("../etc"));
        assert!(!is_valid_user(""));
    }
}
