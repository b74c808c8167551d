use chrono::NaiveDate;

const MIN_YEAR: i32 = 1900;
const MAX_YEAR: i32 = 2100;

/// Strict `YYYY-MM-DD` calendar validation. Years outside 1900..=2100 are
/// rejected, and day-of-month is checked against the real month length
/// (leap-aware). Never panics; anything malformed is simply `false`.
pub fn is_valid_date(date: &str) -> bool {
    let bytes = date.as_bytes();
    if bytes.len() != 10 || bytes[4] != b'-' || bytes[7] != b'-' {
        return false;
    }
    let digits_ok = date
        .char_indices()
        .all(|(index, character)| matches!(index, 4 | 7) || character.is_ascii_digit());
    if !digits_ok {
        return false;
    }

    let Ok(year) = date[0..4].parse::<i32>() else {
        return false;
    };
    let Ok(month) = date[5..7].parse::<u32>() else {
        return false;
    };
    let Ok(day) = date[8..10].parse::<u32>() else {
        return false;
    };

    if !(MIN_YEAR..=MAX_YEAR).contains(&year) || !(1..=12).contains(&month) {
        return false;
    }
    (1..=days_in_month(month, year)).contains(&day)
}

/// Days in a 1-indexed month, applying the Gregorian leap rule for February.
pub fn days_in_month(month: u32, year: i32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 => {
            if is_leap_year(year) {
                29
            } else {
                28
            }
        }
        _ => 0,
    }
}

pub fn is_leap_year(year: i32) -> bool {
    year % 4 == 0 && (year % 100 != 0 || year % 400 == 0)
}

/// Render an ISO date as `DD/MM/YYYY` for display. Unparsable input is
/// returned unchanged, so feeding this its own output yields the same
/// `DD/MM/YYYY` text again rather than re-formatting it.
pub fn format_date_display(date: &str) -> String {
    match NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d") {
        Ok(parsed) => parsed.format("%d/%m/%Y").to_string(),
        Err(_) => date.to_string(),
    }
}

/// Has `end_date` passed as of `today`? Both are `YYYY-MM-DD` strings, so the
/// lexicographic comparison is the chronological one and no timezone can
/// shift the answer by a day. Status-agnostic: callers combine this with
/// `status == "active"` to label a rental overdue.
pub fn is_overdue(end_date: &str, today: &str) -> bool {
    end_date < today
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_real_calendar_dates() {
        assert!(is_valid_date("2024-01-31"));
        assert!(is_valid_date("1900-01-01"));
        assert!(is_valid_date("2100-12-31"));
    }

    #[test]
    fn rejects_malformed_strings() {
        assert!(!is_valid_date(""));
        assert!(!is_valid_date("2024/01/31"));
        assert!(!is_valid_date("2024-1-31"));
        assert!(!is_valid_date("24-01-31"));
        assert!(!is_valid_date("2024-01-31T00:00:00"));
        assert!(!is_valid_date("aaaa-bb-cc"));
    }

    #[test]
    fn rejects_out_of_range_components() {
        assert!(!is_valid_date("1899-12-31"));
        assert!(!is_valid_date("2101-01-01"));
        assert!(!is_valid_date("2024-00-10"));
        assert!(!is_valid_date("2024-13-10"));
        assert!(!is_valid_date("2024-04-31"));
        assert!(!is_valid_date("2024-01-00"));
    }

    #[test]
    fn applies_the_leap_year_rule() {
        assert!(is_valid_date("2024-02-29"));
        assert!(!is_valid_date("2023-02-29"));
        assert!(is_valid_date("2000-02-29")); // divisible by 400
        assert!(!is_valid_date("1900-02-29")); // divisible by 100, not 400
    }

    #[test]
    fn month_lengths() {
        assert_eq!(days_in_month(1, 2024), 31);
        assert_eq!(days_in_month(4, 2024), 30);
        assert_eq!(days_in_month(2, 2024), 29);
        assert_eq!(days_in_month(2, 2023), 28);
        assert_eq!(days_in_month(13, 2024), 0);
    }

    #[test]
    fn formats_iso_dates_for_display() {
        assert_eq!(format_date_display("2024-03-05"), "05/03/2024");
        assert_eq!(format_date_display(" 2024-12-01 "), "01/12/2024");
    }

    #[test]
    fn passes_unparsable_text_through() {
        assert_eq!(format_date_display("not a date"), "not a date");
        // Already-formatted output is not ISO, so a second pass is a no-op.
        assert_eq!(format_date_display("05/03/2024"), "05/03/2024");
    }

    #[test]
    fn overdue_is_a_strict_string_comparison() {
        assert!(is_overdue("2020-01-01", "2024-01-01"));
        assert!(!is_overdue("2099-01-01", "2024-01-01"));
        assert!(!is_overdue("2024-01-01", "2024-01-01"));
    }
}
