/// Polar amounts are integer minor units (cents).
pub fn to_cents(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

/// Two-decimal amount followed by the upper-cased currency code, e.g.
/// `15.00 USD`. No thousands separators.
pub fn plain_amount(cents: i64, currency: &str) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{sign}{}.{:02} {}", abs / 100, abs % 100, currency.to_uppercase())
}
