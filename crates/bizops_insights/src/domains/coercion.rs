//! Numeric coercion for report cells.
//!
//! Report values arrive as numbers, as strings carrying currency symbols and
//! thousands separators in either the `1,234.56` or the `1.234,56` convention,
//! or as null. Everything coerces to a finite `f64`, defaulting to `0`.

use serde_json::Value;

/// Coerce any report value to a finite number, `0` on failure.
pub fn to_num(value: &Value) -> f64 {
    to_num_opt(value).unwrap_or(0.0)
}

/// Like [`to_num`] but keeps "nothing numeric here" distinguishable from zero.
pub fn to_num_opt(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::String(s) => parse_numeric_str(s),
        _ => None,
    }
}

/// Parse a loosely formatted numeric string.
///
/// Only digits, `,`, `.` and `-` survive. When both separators are present the
/// rightmost one is the decimal separator; a lone `,` is a decimal comma;
/// otherwise `.` is decimal. The longest numeric prefix is parsed, so
/// `"1,234,567"` reads as `1.234`.
pub fn parse_numeric_str(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, ',' | '.' | '-'))
        .collect();

    let normalized = match (cleaned.rfind(','), cleaned.rfind('.')) {
        (Some(comma), Some(dot)) if comma > dot => cleaned.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => cleaned.replace(',', ""),
        (Some(_), None) => cleaned.replace(',', "."),
        (None, _) => cleaned,
    };

    parse_float_prefix(&normalized).filter(|f| f.is_finite())
}

fn parse_float_prefix(s: &str) -> Option<f64> {
    let bytes = s.as_bytes();
    let mut end = usize::from(bytes.first() == Some(&b'-'));
    let mut seen_digit = false;
    let mut seen_dot = false;
    while let Some(&b) = bytes.get(end) {
        match b {
            b'0'..=b'9' => seen_digit = true,
            b'.' if !seen_dot => seen_dot = true,
            _ => break,
        }
        end += 1;
    }
    if !seen_digit {
        return None;
    }
    s[..end].parse::<f64>().ok()
}

/// Round to two decimals, half-up on the scaled value.
///
/// `round2(1.005) == 1.0`: `1.005 * 100.0` is `100.49999999999999` in binary
/// floating point, so the scaled value is already below the half.
pub fn round2(x: f64) -> f64 {
    if !x.is_finite() {
        return 0.0;
    }
    (x * 100.0 + 0.5).floor() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn european_and_us_thousands_separators() {
        assert_eq!(to_num(&json!("1.234,56")), 1234.56);
        assert_eq!(to_num(&json!("1,234.56")), 1234.56);
    }

    #[test]
    fn lone_comma_is_decimal() {
        assert_eq!(to_num(&json!("1,5")), 1.5);
    }

    #[test]
    fn empty_null_and_garbage_are_zero() {
        assert_eq!(to_num(&json!("")), 0.0);
        assert_eq!(to_num(&Value::Null), 0.0);
        assert_eq!(to_num(&json!("abc")), 0.0);
        assert_eq!(to_num(&json!("-")), 0.0);
        assert_eq!(to_num(&json!(true)), 0.0);
        assert_eq!(to_num(&json!({"a": 1})), 0.0);
    }

    #[test]
    fn currency_symbols_and_negatives() {
        assert_eq!(to_num(&json!("$ 1,250.00")), 1250.0);
        assert_eq!(to_num(&json!("-45,10 €")), -45.1);
        assert_eq!(to_num(&json!(42)), 42.0);
        assert_eq!(to_num(&json!(-0.25)), -0.25);
    }

    #[test]
    fn repeated_commas_parse_the_numeric_prefix() {
        assert_eq!(to_num(&json!("1,234,567")), 1.234);
    }

    #[test]
    fn to_num_opt_distinguishes_missing() {
        assert_eq!(to_num_opt(&json!("n/a")), None);
        assert_eq!(to_num_opt(&json!("0")), Some(0.0));
        assert_eq!(to_num_opt(&Value::Null), None);
    }

    #[test]
    fn round2_is_half_up_on_scaled_value() {
        assert_eq!(round2(1.005), 1.0);
        assert_eq!(round2(0.125), 0.13);
        assert_eq!(round2(-0.125), -0.12);
        assert_eq!(round2(2.344), 2.34);
        assert_eq!(round2(f64::NAN), 0.0);
    }
}
