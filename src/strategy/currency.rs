//! Currency strings as the platform renders them.
//!
//! Balances and market prices arrive as display strings such as
//! `EUR1,234.56`, `0,05€` or `ARS$ 1.234,56`. Glyphs are canonicalised to
//! a letter code first, then the amount is read with either separator
//! convention: a trailing group of at most two digits is the fraction,
//! every other separator is a thousands mark.

use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

// ---------------------------------------------------------------------------
// Platform currency tables
// ---------------------------------------------------------------------------

/// Platform numeric currency ids used by the price-overview endpoint.
const CURRENCY_CODES: &[(&str, u32)] = &[("USD", 1), ("EUR", 3), ("TL", 17), ("ARS", 34)];

/// Search ceiling (`maxprice`) per wallet currency.
const MAX_PRICES: &[(&str, Decimal)] = &[("ARS", dec!(840)), ("TL", dec!(60)), ("EUR", dec!(60))];

/// Non-ASCII glyphs and their letter codes. The mojibake form shows up
/// when the page is decoded as Latin-1.
const GLYPHS: &[(&str, &str)] = &[("â‚¬", "EUR"), ("€", "EUR"), ("₺", "TL")];

static CODE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Z]+").expect("valid regex"));
static AMOUNT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d[\d.,]*").expect("valid regex"));

pub fn platform_currency_id(code: &str) -> Option<u32> {
    CURRENCY_CODES.iter().find(|(c, _)| *c == code).map(|(_, id)| *id)
}

pub fn max_search_price(code: &str) -> Option<Decimal> {
    MAX_PRICES.iter().find(|(c, _)| *c == code).map(|(_, p)| *p)
}

// ---------------------------------------------------------------------------
// Parsing & formatting
// ---------------------------------------------------------------------------

/// An amount tagged with its currency code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Money {
    pub currency: String,
    pub amount: Decimal,
}

/// Parse a display string into code and amount.
///
/// Returns `None` when either part is missing.
pub fn parse_currency_string(raw: &str) -> Option<Money> {
    let mut canonical = raw.to_string();
    for (glyph, code) in GLYPHS {
        canonical = canonical.replace(glyph, code);
    }

    let currency = match CODE_RE.find(&canonical) {
        Some(m) => m.as_str().to_string(),
        None if canonical.contains('$') => "USD".to_string(),
        None => return None,
    };

    let amount = parse_amount(AMOUNT_RE.find(&canonical)?.as_str())?;

    Some(Money { currency, amount })
}

/// Read a digit run with `.`/`,` separators.
fn parse_amount(raw: &str) -> Option<Decimal> {
    let raw = raw.trim_end_matches(['.', ',']);

    let (whole, fraction) = match raw.rfind(['.', ',']) {
        Some(pos) if raw.len() - pos - 1 <= 2 => (&raw[..pos], &raw[pos + 1..]),
        _ => (raw, ""),
    };

    let digits: String = whole.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return None;
    }

    let normalised = if fraction.is_empty() {
        digits
    } else {
        format!("{digits}.{fraction}")
    };

    Decimal::from_str(&normalised).ok()
}

/// Render `amount` as `<code><amount>` with comma thousands and a dot
/// decimal marker, two decimals.
pub fn format_currency_string(code: &str, amount: Decimal) -> String {
    let rounded = amount.round_dp(2);
    let text = format!("{:.2}", rounded.abs());
    let (whole, fraction) = text.split_once('.').unwrap_or((text.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if rounded.is_sign_negative() && !rounded.is_zero() { "-" } else { "" };
    format!("{code}{sign}{grouped}.{fraction}")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn parsed(raw: &str) -> (String, Decimal) {
        let m = parse_currency_string(raw).unwrap();
        (m.currency, m.amount)
    }

    #[test]
    fn test_parse_code_prefix() {
        assert_eq!(parsed("EUR1,234.56"), ("EUR".into(), dec!(1234.56)));
        assert_eq!(parsed("USD 0.05"), ("USD".into(), dec!(0.05)));
    }

    #[test]
    fn test_parse_euro_glyph() {
        assert_eq!(parsed("0,05€"), ("EUR".into(), dec!(0.05)));
        assert_eq!(parsed("12,--€"), ("EUR".into(), dec!(12)));
        assert_eq!(parsed("â‚¬3.10"), ("EUR".into(), dec!(3.10)));
    }

    #[test]
    fn test_parse_dot_thousands() {
        assert_eq!(parsed("ARS$ 1.234,56"), ("ARS".into(), dec!(1234.56)));
        assert_eq!(parsed("ARS$ 12.345"), ("ARS".into(), dec!(12345)));
    }

    #[test]
    fn test_parse_bare_dollar() {
        assert_eq!(parsed("$4.99"), ("USD".into(), dec!(4.99)));
    }

    #[test]
    fn test_parse_failures() {
        assert!(parse_currency_string("").is_none());
        assert!(parse_currency_string("EUR").is_none());
        assert!(parse_currency_string("12.00").is_none());
    }

    #[test]
    fn test_format() {
        assert_eq!(format_currency_string("EUR", dec!(1234.5)), "EUR1,234.50");
        assert_eq!(format_currency_string("ARS", dec!(1000000)), "ARS1,000,000.00");
        assert_eq!(format_currency_string("TL", dec!(0.05)), "TL0.05");
        assert_eq!(format_currency_string("USD", dec!(999)), "USD999.00");
    }

    #[test]
    fn test_format_parse_roundtrip() {
        let codes = ["EUR", "ARS", "TL", "USD"];
        let amounts = [dec!(0.01), dec!(0.99), dec!(12), dec!(999.99), dec!(1000), dec!(1234.56), dec!(987654.32)];

        for code in codes {
            for amount in amounts {
                let text = format_currency_string(code, amount);
                let money = parse_currency_string(&text).unwrap();
                assert_eq!(money.currency, code, "{text}");
                assert_eq!(money.amount, amount, "{text}");
            }
        }
    }

    #[test]
    fn test_currency_tables() {
        assert_eq!(platform_currency_id("EUR"), Some(3));
        assert_eq!(platform_currency_id("ARS"), Some(34));
        assert_eq!(platform_currency_id("XYZ"), None);
        assert_eq!(max_search_price("TL"), Some(dec!(60)));
        assert_eq!(max_search_price("USD"), None);
    }
}
