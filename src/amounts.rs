use std::sync::OnceLock;

use regex::Regex;

fn currency_prefix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\s*(\d+(?:[.,]\d+)*)").expect("regex monto con $ adelante"))
}

fn currency_suffix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+(?:[.,]\d+)*)\s*\$").expect("regex monto con $ atrás"))
}

fn pesos_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(\d+(?:[.,]\d+)*)\s*pesos").expect("regex monto en pesos"))
}

fn total_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)total[:\s]*(\d+(?:[.,]\d+)*)").expect("regex total"))
}

fn costo_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)costo[:\s]*(\d+(?:[.,]\d+)*)").expect("regex costo"))
}

/// Scan free-form text for a money amount and return it in centavos.
/// Patterns are tried in priority order and the first hit wins; text with
/// no recognizable amount yields 0, which the import treats as "sin
/// presupuesto" rather than an error.
pub fn extract_amount_cents(text: &str) -> i64 {
    let patterns = [
        currency_prefix_re(),
        currency_suffix_re(),
        pesos_re(),
        total_re(),
        costo_re(),
    ];
    for re in patterns {
        if let Some(caps) = re.captures(text) {
            if let Some(cents) = normalize_number_to_cents(&caps[1]) {
                return cents;
            }
        }
    }
    0
}

/// Render centavos back as a plain decimal string ("1500" or "1500.50").
pub fn format_cents(cents: i64) -> String {
    if cents % 100 == 0 {
        format!("{}", cents / 100)
    } else {
        format!("{}.{:02}", cents / 100, (cents % 100).abs())
    }
}

/// Resolve the ambiguity between thousands separators and a decimal comma:
/// only a final group of one or two digits counts as decimals, every other
/// `.` or `,` is a thousands separator and is dropped. The LAST separator
/// decides, so "1.500,50" and "1,500.50" both read as 1500.50; treating the
/// first separator as decimal would misread every thousands-grouped amount.
fn normalize_number_to_cents(number: &str) -> Option<i64> {
    let (integer_part, fraction_part) = match number.rfind(['.', ',']) {
        Some(pos) => {
            let tail = &number[pos + 1..];
            if !tail.is_empty() && tail.len() <= 2 {
                (&number[..pos], tail)
            } else {
                (number, "")
            }
        }
        None => (number, ""),
    };
    let digits = integer_part
        .chars()
        .filter(|c| c.is_ascii_digit())
        .collect::<String>();
    let whole = digits.parse::<i64>().ok()?;
    let cents_fraction = match fraction_part.len() {
        0 => 0,
        1 => fraction_part.parse::<i64>().ok()? * 10,
        _ => fraction_part.parse::<i64>().ok()?,
    };
    whole.checked_mul(100)?.checked_add(cents_fraction)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn currency_sign_before_number() {
        assert_eq!(extract_amount_cents("cambio de aceite $1500"), 150000);
        assert_eq!(extract_amount_cents("$ 1500"), 150000);
    }

    #[test]
    fn currency_sign_after_number() {
        assert_eq!(extract_amount_cents("mano de obra 2500 $"), 250000);
    }

    #[test]
    fn pesos_word() {
        assert_eq!(extract_amount_cents("ajuste 1200 pesos"), 120000);
        assert_eq!(extract_amount_cents("ajuste 1200 PESOS"), 120000);
    }

    #[test]
    fn total_and_costo_labels() {
        assert_eq!(extract_amount_cents("TOTAL: 9800"), 980000);
        assert_eq!(extract_amount_cents("costo 450"), 45000);
    }

    #[test]
    fn thousands_separator_with_decimal_comma() {
        assert_eq!(extract_amount_cents("$1.500,50"), 150050);
        assert_eq!(extract_amount_cents("$1,500.50"), 150050);
    }

    #[test]
    fn three_digit_groups_are_thousands() {
        // 1.500 is fifteen hundred pesos, not 1.5.
        assert_eq!(extract_amount_cents("$1.500"), 150000);
        assert_eq!(extract_amount_cents("$12,000"), 1200000);
    }

    #[test]
    fn single_decimal_digit() {
        assert_eq!(extract_amount_cents("$99,5"), 9950);
    }

    #[test]
    fn priority_favors_currency_sign() {
        assert_eq!(extract_amount_cents("total: 100 y repuesto $250"), 25000);
    }

    #[test]
    fn no_amount_yields_zero() {
        assert_eq!(extract_amount_cents("cambio de filtro"), 0);
        assert_eq!(extract_amount_cents(""), 0);
    }

    #[test]
    fn format_round_trips_through_extract() {
        for cents in [0, 50, 150000, 150050, 9950] {
            let rendered = format!("${}", format_cents(cents));
            assert_eq!(extract_amount_cents(&rendered), cents, "monto: {rendered}");
        }
    }
}
