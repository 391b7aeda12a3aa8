use chrono::{Datelike, Duration, Local, NaiveDate, NaiveDateTime};

// Full names go first so that ENERO does not turn into "JanRO".
const SPANISH_FULL_MONTHS: &[(&str, &str)] = &[
    ("ENERO", "January"),
    ("FEBRERO", "February"),
    ("MARZO", "March"),
    ("ABRIL", "April"),
    ("MAYO", "May"),
    ("JUNIO", "June"),
    ("JULIO", "July"),
    ("AGOSTO", "August"),
    ("SEPTIEMBRE", "September"),
    ("OCTUBRE", "October"),
    ("NOVIEMBRE", "November"),
    ("DICIEMBRE", "December"),
];

const SPANISH_MONTH_ABBREVS: &[(&str, &str)] = &[
    ("ENE", "Jan"),
    ("FEB", "Feb"),
    ("MAR", "Mar"),
    ("ABR", "Apr"),
    ("MAY", "May"),
    ("JUN", "Jun"),
    ("JUL", "Jul"),
    ("AGO", "Aug"),
    ("SEP", "Sep"),
    ("OCT", "Oct"),
    ("NOV", "Nov"),
    ("DIC", "Dec"),
];

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%d/%m/%Y %H:%M:%S"];

// Day-first formats take priority: the planillas come from Argentina.
const DATE_FORMATS: &[&str] = &[
    "%d/%m/%Y",
    "%d-%m-%Y",
    "%Y-%m-%d",
    "%d/%m/%y",
    "%d-%m-%y",
    "%y-%m-%d",
    "%d.%m.%Y",
    "%d.%m.%y",
    "%Y/%m/%d",
    "%d-%b-%Y",
    "%d-%B-%Y",
];

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Parse a cell value into a calendar date. Returns None instead of failing:
/// the caller decides whether a missing date is a warning or a skip.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let text = raw.trim();
    if text.is_empty() {
        return None;
    }
    let lowered = text.to_lowercase();
    if lowered == "nan" || lowered == "none" {
        return None;
    }

    // Typed date cells arrive stringified as their Excel serial number.
    if let Ok(number) = text.parse::<f64>() {
        return excel_serial_to_date(number);
    }

    if let Some(date) = parse_with_formats(text) {
        return Some(fixup_missing_year(date));
    }

    // Spanish month names mapped to English so chrono's %b/%B apply.
    let mapped = map_spanish_months(&text.to_uppercase());
    if mapped != text.to_uppercase() {
        if let Some(date) = parse_with_formats(&mapped) {
            return Some(fixup_missing_year(date));
        }
    }

    parse_lenient_day_first(text).map(fixup_missing_year)
}

fn excel_serial_to_date(number: f64) -> Option<NaiveDate> {
    if !number.is_finite() || number <= 0.0 {
        return None;
    }
    let days = number.floor() as i64;
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    base.checked_add_signed(Duration::days(days))
}

fn map_spanish_months(text: &str) -> String {
    let mut mapped = text.to_string();
    for (es, en) in SPANISH_FULL_MONTHS {
        mapped = mapped.replace(es, en);
    }
    for (es, en) in SPANISH_MONTH_ABBREVS {
        mapped = mapped.replace(es, en);
    }
    mapped
}

fn parse_with_formats(text: &str) -> Option<NaiveDate> {
    for fmt in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(text, fmt) {
            return Some(parsed.date());
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(parsed) = NaiveDate::parse_from_str(text, fmt) {
            return Some(parsed);
        }
    }
    None
}

/// Last-resort parse: split on common separators and read the pieces
/// day-first. Tolerates degenerate inputs seen in real planillas such as
/// `14//6/2023` (doubled separator) and `22/8` (no year at all).
fn parse_lenient_day_first(text: &str) -> Option<NaiveDate> {
    let head = text.split(['T']).next().unwrap_or_default();
    let tokens = head
        .split(['/', '-', '.', ' '])
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>();
    if !tokens.iter().all(|t| t.chars().all(|c| c.is_ascii_digit())) {
        return None;
    }

    match tokens.len() {
        3 => {
            let a = tokens[0].parse::<i32>().ok()?;
            let b = tokens[1].parse::<i32>().ok()?;
            let c = tokens[2].parse::<i32>().ok()?;
            if let Some(date) =
                NaiveDate::from_ymd_opt(expand_two_digit_year(c, tokens[2].len()), b as u32, a as u32)
            {
                return Some(date);
            }
            if tokens[0].len() == 4 {
                return NaiveDate::from_ymd_opt(a, b as u32, c as u32);
            }
            None
        }
        2 => {
            // Day and month only: the year is taken from the calendar.
            let d = tokens[0].parse::<u32>().ok()?;
            let m = tokens[1].parse::<u32>().ok()?;
            NaiveDate::from_ymd_opt(today().year(), m, d)
        }
        _ => None,
    }
}

fn expand_two_digit_year(year: i32, token_len: usize) -> i32 {
    if token_len > 2 {
        return year;
    }
    if year <= 68 {
        2000 + year
    } else {
        1900 + year
    }
}

/// A parse landing exactly on 1900 means the source cell had no year
/// (formats like `%d/%m` resolve there); re-anchor it to the current year.
fn fixup_missing_year(date: NaiveDate) -> NaiveDate {
    if date.year() == 1900 {
        date.with_year(today().year()).unwrap_or(date)
    } else {
        date
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_date_across_supported_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        for raw in ["15/01/2024", "15-01-2024", "2024-01-15", "15.01.2024", "2024/01/15"] {
            assert_eq!(parse_date(raw), Some(expected), "formato: {raw}");
        }
    }

    #[test]
    fn spanish_month_abbreviation() {
        assert_eq!(
            parse_date("22-ENE-2024"),
            NaiveDate::from_ymd_opt(2024, 1, 22)
        );
        assert_eq!(
            parse_date("22-ene-2024"),
            NaiveDate::from_ymd_opt(2024, 1, 22)
        );
    }

    #[test]
    fn spanish_full_month_name() {
        assert_eq!(
            parse_date("3-MARZO-2023"),
            NaiveDate::from_ymd_opt(2023, 3, 3)
        );
    }

    #[test]
    fn two_digit_year_pivots_to_2000s() {
        assert_eq!(
            parse_date("29/05/23"),
            NaiveDate::from_ymd_opt(2023, 5, 29)
        );
        assert_eq!(
            parse_date("29-05-99"),
            NaiveDate::from_ymd_opt(1999, 5, 29)
        );
    }

    #[test]
    fn embedded_time_of_day_is_dropped() {
        assert_eq!(
            parse_date("2023-05-29 00:00:00"),
            NaiveDate::from_ymd_opt(2023, 5, 29)
        );
    }

    #[test]
    fn excel_serial_number() {
        // 45306 days after 1899-12-30.
        assert_eq!(parse_date("45306"), NaiveDate::from_ymd_opt(2024, 1, 15));
    }

    #[test]
    fn doubled_separator_is_tolerated() {
        assert_eq!(
            parse_date("14//6/2023"),
            NaiveDate::from_ymd_opt(2023, 6, 14)
        );
    }

    #[test]
    fn day_month_without_year_uses_current_year() {
        let parsed = parse_date("22/8").unwrap();
        assert_eq!(parsed.day(), 22);
        assert_eq!(parsed.month(), 8);
        assert_eq!(parsed.year(), today().year());
    }

    #[test]
    fn year_1900_is_treated_as_missing() {
        let parsed = parse_date("15/01/1900").unwrap();
        assert_eq!(parsed.year(), today().year());
        assert_eq!(parsed.month(), 1);
        assert_eq!(parsed.day(), 15);
    }

    #[test]
    fn garbage_returns_none() {
        assert_eq!(parse_date(""), None);
        assert_eq!(parse_date("nan"), None);
        assert_eq!(parse_date("cambio de filtro"), None);
        assert_eq!(parse_date("12/34/5678"), None);
    }
}
