//! Number formatting for user-facing alert titles and insights.

/// Plain decimal rendering used when a number is embedded in a title:
/// integers print without a fractional part, everything else with the
/// shortest round-tripping representation.
pub fn format_number(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if value == 0.0 {
        return "0".to_string();
    }
    format!("{value}")
}

/// Thousands-separated rendering with at most three fraction digits,
/// e.g. `1234567.5` → `"1,234,567.5"`.
pub fn format_grouped(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "∞" } else { "-∞" }.to_string();
    }

    let fixed = format!("{:.3}", value.abs());
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), ""));
    let frac_part = frac_part.trim_end_matches('0');

    let digits: Vec<char> = int_part.chars().collect();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.iter().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(*ch);
    }

    let is_zero = int_part.chars().all(|c| c == '0') && frac_part.is_empty();
    let mut out = String::new();
    if value < 0.0 && !is_zero {
        out.push('-');
    }
    out.push_str(&grouped);
    if !frac_part.is_empty() {
        out.push('.');
        out.push_str(frac_part);
    }
    out
}

/// Fixed-point rendering with `digits` fraction digits. Exact ties round
/// away from zero, so `6.25` becomes `"6.3"` where `{:.1}` would give `"6.2"`.
pub fn format_fixed(value: f64, digits: usize) -> String {
    if !value.is_finite() {
        return format_number(value);
    }
    const GUARD: usize = 30;
    let magnitude = value.abs();
    let extended = format!("{:.*}", digits + GUARD, magnitude);
    let tail = &extended[extended.len() - GUARD..];
    let is_tie = tail.starts_with('5') && tail[1..].bytes().all(|b| b == b'0');
    let body = if is_tie {
        let nudge = 0.25 * 10f64.powi(-(digits as i32));
        format!("{:.*}", digits, magnitude + nudge)
    } else {
        format!("{:.*}", digits, magnitude)
    };
    if value < 0.0 {
        format!("-{body}")
    } else {
        body
    }
}

/// Yen amount as shown in segment insights.
pub fn format_currency(amount: f64) -> String {
    format!("¥{}", format_grouped(amount))
}
