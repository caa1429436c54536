//! Shared arithmetic and formatting helpers for cost output

/// Average hours in a month (24 * 30.44)
pub const HOURS_PER_MONTH: f64 = 24.0 * 30.44;

/// Hours in a commitment year, used to amortize upfront fees
pub const HOURS_PER_YEAR: f64 = 24.0 * 365.0;

pub const MONTHS_PER_YEAR: f64 = 12.0;

/// Billable hours per month at a given utilization (0-100)
pub fn effective_monthly_hours(utilization_pct: f64) -> f64 {
    HOURS_PER_MONTH * (utilization_pct / 100.0)
}

/// Round to whole cents
pub fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

pub fn format_currency(amount: f64) -> String {
    let cents = (amount * 100.0).round() as i64;
    let negative = cents < 0;
    let cents = cents.abs();
    let whole = (cents / 100).to_string();

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    format!(
        "{}${}.{:02}",
        if negative { "-" } else { "" },
        grouped,
        cents % 100
    )
}

pub fn format_hourly_rate(rate: f64) -> String {
    format!("${:.4}/hr", rate)
}
