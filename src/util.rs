// Parsing and formatting helpers.
//
// Everything that touches loosely-typed cell text lives here so the
// pipeline stages can work with plain `f64` counts.
use num_format::{Locale, ToFormattedString};
use std::cmp::Ordering;

/// Parse a string-like value into `f64` while being forgiving about
/// formatting issues that are common in sheet exports (commas, spaces, text).
///
/// - Trims whitespace.
/// - Rejects values that contain alphabetic characters.
/// - Strips thousands separators like `","` before parsing.
/// - Returns `None` for anything that cannot be safely parsed.
pub fn parse_f64_safe(s: Option<&str>) -> Option<f64> {
    let s = s?.trim();
    if s.is_empty() {
        return None;
    }
    if s.chars().any(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let s = s.replace(',', "");
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Longest leading float literal of `s` (sign, digits, fraction, exponent),
/// after thousands separators are stripped. `"12 replies"` reads as `12`.
pub fn parse_leading_f64(s: &str) -> Option<f64> {
    let s = s.trim().replace(',', "");
    let bytes = s.as_bytes();
    let digits_from = |mut i: usize| {
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        i
    };

    let mut end = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end = 1;
    }
    let int_end = digits_from(end);
    let mut mantissa_digits = int_end - end;
    end = int_end;
    if bytes.get(end) == Some(&b'.') {
        let frac_end = digits_from(end + 1);
        mantissa_digits += frac_end - end - 1;
        end = frac_end;
    }
    if mantissa_digits == 0 {
        return None;
    }
    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exp = end + 1;
        if matches!(bytes.get(exp), Some(b'+' | b'-')) {
            exp += 1;
        }
        let exp_end = digits_from(exp);
        if exp_end > exp {
            end = exp_end;
        }
    }
    s[..end].parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Count coercion used by the normalizer: unparsable means zero.
pub fn coerce_count(s: &str) -> f64 {
    parse_leading_f64(s).unwrap_or(0.0)
}

/// Shortest representation that parses back to the same `f64`; `150.0` becomes `150`.
pub fn format_plain(n: f64) -> String {
    if n == 0.0 {
        return "0".to_string();
    }
    format!("{}", n)
}

pub fn format_number(n: f64, decimals: usize) -> String {
    // Fixed decimals plus locale-aware thousands separators (`1,234,567.89`).
    let neg = n.is_sign_negative() && n != 0.0;
    let s = format!("{:.*}", decimals, n.abs());
    let mut parts = s.split('.');
    let int_part = parts.next().unwrap_or("0");
    let frac_part = parts.next();
    let int_val: i64 = int_part.parse().unwrap_or(0);
    let mut res = int_val.to_formatted_string(&Locale::en);
    if let Some(frac) = frac_part {
        if decimals > 0 {
            res.push('.');
            res.push_str(frac);
        }
    }
    if neg {
        format!("-{}", res)
    } else {
        res
    }
}

/// Grouped number with at most two fraction digits and no trailing zeros.
pub fn format_grouped(n: f64) -> String {
    let s = format_number(n, 2);
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        s
    }
}

pub fn format_int<T>(n: T) -> String
where
    T: ToFormattedString,
{
    n.to_formatted_string(&Locale::en)
}

pub fn format_percent(n: f64) -> String {
    format!("{:.2}%", n)
}

/// Display label for a column header.
pub fn format_column_name(column: &str) -> String {
    match column {
        "prr_vs_rr" => return "PRR vs RR".to_string(),
        "rr" => return "RR".to_string(),
        "bounce_rate" => return "Bounce".to_string(),
        "unique_leads_per_positive" => return "Unique Leads/Positive".to_string(),
        _ => {}
    }
    let spaced = column.replace('_', " ");
    let mut out = String::with_capacity(spaced.len());
    let mut at_word_start = true;
    for c in spaced.chars() {
        if at_word_start && c.is_alphanumeric() {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        at_word_start = !(c.is_alphanumeric() || c == '\'');
    }
    out
}

pub fn cmp_ignore_case(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_forgiving_about_separators_and_whitespace() {
        assert_eq!(parse_f64_safe(Some(" 1,234.5 ")), Some(1234.5));
        assert_eq!(parse_f64_safe(Some("42")), Some(42.0));
        assert_eq!(parse_f64_safe(Some("n/a")), None);
        assert_eq!(parse_f64_safe(Some("")), None);
        assert_eq!(parse_f64_safe(None), None);
    }

    #[test]
    fn coerce_count_defaults_to_zero() {
        assert_eq!(coerce_count("abc"), 0.0);
        assert_eq!(coerce_count("  "), 0.0);
        assert_eq!(coerce_count("."), 0.0);
        assert_eq!(coerce_count("-"), 0.0);
        assert_eq!(coerce_count("7"), 7.0);
    }

    #[test]
    fn coerce_count_reads_the_leading_number() {
        assert_eq!(coerce_count("1e3"), 1000.0);
        assert_eq!(coerce_count("12 replies"), 12.0);
        assert_eq!(coerce_count(" 2.5E-1x"), 0.25);
        assert_eq!(coerce_count("3e"), 3.0);
        assert_eq!(coerce_count("-4.5"), -4.5);
        assert_eq!(coerce_count(".5"), 0.5);
        assert_eq!(coerce_count("1,250 sent"), 1250.0);
        assert_eq!(parse_f64_safe(Some("12 replies")), None);
    }

    #[test]
    fn plain_format_drops_integer_fraction() {
        assert_eq!(format_plain(150.0), "150");
        assert_eq!(format_plain(0.5), "0.5");
        assert_eq!(format_plain(-0.0), "0");
    }

    #[test]
    fn grouped_format_matches_locale_style() {
        assert_eq!(format_number(1234567.891, 2), "1,234,567.89");
        assert_eq!(format_grouped(1500.0), "1,500");
        assert_eq!(format_grouped(13.3333), "13.33");
        assert_eq!(format_grouped(2.5), "2.5");
    }

    #[test]
    fn column_names_prettified() {
        assert_eq!(format_column_name("prr_vs_rr"), "PRR vs RR");
        assert_eq!(format_column_name("unique_sent_count"), "Unique Sent Count");
        assert_eq!(format_column_name("client_name"), "Client Name");
    }
}
