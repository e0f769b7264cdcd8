use chrono::{Days, NaiveDate};

/// Tolerance used when comparing monetary sums.
pub const MONEY_EPSILON: f64 = 0.01;

/// Upper-cases a label and folds the Spanish accented vowels so that
/// "Depreciación" and "DEPRECIACION" compare equal.
pub fn normalize_label(label: &str) -> String {
    label
        .trim()
        .chars()
        .flat_map(char::to_uppercase)
        .map(|c| match c {
            'Á' | 'À' | 'Ä' | 'Â' => 'A',
            'É' | 'È' | 'Ë' | 'Ê' => 'E',
            'Í' | 'Ì' | 'Ï' | 'Î' => 'I',
            'Ó' | 'Ò' | 'Ö' | 'Ô' => 'O',
            'Ú' | 'Ù' | 'Ü' | 'Û' => 'U',
            'Ñ' => 'N',
            other => other,
        })
        .collect()
}

/// True if the normalized `haystack` contains any of the (already normalized) patterns.
pub fn contains_any(haystack: &str, patterns: &[String]) -> bool {
    let normalized = normalize_label(haystack);
    patterns.iter().any(|p| normalized.contains(p.as_str()))
}

pub fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let next_month = if month == 12 { 1 } else { month + 1 };
    let next_year = if month == 12 { year + 1 } else { year };

    NaiveDate::from_ymd_opt(next_year, next_month, 1)?.checked_sub_days(Days::new(1))
}

/// Rounds half away from zero to the given number of decimals.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Returns `None` when the denominator is zero or not finite.
pub fn safe_divide(numerator: f64, denominator: f64) -> Option<f64> {
    if denominator == 0.0 || !denominator.is_finite() || !numerator.is_finite() {
        return None;
    }
    Some(numerator / denominator)
}

/// Percentage change from `previous` to `current`, relative to |previous|.
pub fn percent_change(previous: f64, current: f64) -> Option<f64> {
    safe_divide((current - previous) * 100.0, previous.abs())
}

pub fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
    (a - b).abs() <= epsilon
}
