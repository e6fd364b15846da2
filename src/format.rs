//! Money and date presentation values.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Characters stripped from monetary strings before parsing.
const MONEY_NOISE: [char; 6] = ['R', '$', '€', '£', '¥', ','];

pub const NO_VALUE: &str = "-";

/// A monetary value as it arrives from the CRM: a bare number or a
/// currency-formatted string such as `"R 30,830"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawAmount {
    Number(f64),
    Text(String),
}

impl From<f64> for RawAmount {
    fn from(value: f64) -> Self {
        RawAmount::Number(value)
    }
}

impl From<&str> for RawAmount {
    fn from(value: &str) -> Self {
        RawAmount::Text(value.to_string())
    }
}

/// Parses an amount; `None` is the "no value" sentinel (unparsable or zero).
pub fn parse_amount(raw: &RawAmount) -> Option<f64> {
    let value = match raw {
        RawAmount::Number(n) => *n,
        RawAmount::Text(s) => parse_amount_text(s)?,
    };
    if !value.is_finite() || value == 0.0 {
        return None;
    }
    Some(value)
}

fn parse_amount_text(text: &str) -> Option<f64> {
    let cleaned: String = text
        .chars()
        .filter(|c| !c.is_whitespace() && !MONEY_NOISE.contains(c))
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok()
}

/// Renders `R 30,830` (two decimals only when the amount is fractional).
/// Amounts that whole cents cannot represent are printed at full precision
/// so they parse back to the same value.
pub fn format_amount(amount: Option<f64>) -> String {
    let value = match amount {
        Some(v) if v.is_finite() && v != 0.0 => v,
        _ => return NO_VALUE.to_string(),
    };
    let abs = value.abs();
    let cents = (abs * 100.0).round();
    let body = if cents < u64::MAX as f64 && cents / 100.0 == abs {
        let cents = cents as u64;
        let mut body = group_thousands(&(cents / 100).to_string());
        if cents % 100 != 0 {
            body.push_str(&format!(".{:02}", cents % 100));
        }
        body
    } else {
        let text = abs.to_string();
        match text.split_once('.') {
            Some((whole, fraction)) => format!("{}.{}", group_thousands(whole), fraction),
            None => group_thousands(&text),
        }
    };
    format!("{}{}", if value < 0.0 { "-R " } else { "R " }, body)
}

fn group_thousands(digits: &str) -> String {
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}

/// Sum of amounts where "no value" counts as zero.
pub fn total_value<I>(amounts: I) -> f64
where
    I: IntoIterator<Item = Option<f64>>,
{
    amounts.into_iter().flatten().sum()
}

/// `Jul 05, 2025`
pub fn format_date(date: NaiveDate) -> String {
    date.format("%b %d, %Y").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_amount_strips_symbols() {
        assert_eq!(parse_amount(&"R 30,830".into()), Some(30830.0));
        assert_eq!(parse_amount(&"$1,200.50".into()), Some(1200.5));
        assert_eq!(parse_amount(&"€ 99".into()), Some(99.0));
        assert_eq!(parse_amount(&30830.0.into()), Some(30830.0));
    }

    #[test]
    fn test_parse_amount_no_value_sentinel() {
        assert_eq!(parse_amount(&"".into()), None);
        assert_eq!(parse_amount(&"-".into()), None);
        assert_eq!(parse_amount(&"R 0".into()), None);
        assert_eq!(parse_amount(&0.0.into()), None);
        assert_eq!(parse_amount(&"call me".into()), None);
    }

    #[test]
    fn test_parse_format_parse_is_stable() {
        let inputs: Vec<RawAmount> = vec![
            "R 30,830".into(),
            30830.0.into(),
            "".into(),
            "-".into(),
            "1234567.25".into(),
            "0.004".into(),
            0.004.into(),
            "300000000000000000000".into(),
            1.5e19.into(),
            "R 19.99".into(),
        ];
        for input in inputs {
            let once = parse_amount(&input);
            let again = parse_amount(&RawAmount::Text(format_amount(once)));
            assert_eq!(again, once, "input {:?}", input);
        }
    }

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(Some(30830.0)), "R 30,830");
        assert_eq!(format_amount(Some(1234567.25)), "R 1,234,567.25");
        assert_eq!(format_amount(Some(999.0)), "R 999");
        assert_eq!(format_amount(None), "-");
        assert_eq!(format_amount(Some(0.0)), "-");
        assert_eq!(format_amount(Some(-42.5)), "-R 42.50");
        assert_eq!(format_amount(Some(0.004)), "R 0.004");
        assert_eq!(format_amount(Some(3e20)), "R 300,000,000,000,000,000,000");
    }

    #[test]
    fn test_total_value_ignores_missing() {
        assert_eq!(total_value([Some(10.0), None, Some(5.5)]), 15.5);
        assert_eq!(total_value(Vec::<Option<f64>>::new()), 0.0);
    }

    #[test]
    fn test_format_date() {
        let date = NaiveDate::from_ymd_opt(2025, 7, 5).unwrap();
        assert_eq!(format_date(date), "Jul 05, 2025");
    }
}
