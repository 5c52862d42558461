//! Cost display helpers. Costs persist as integer US cents.

/// Render integer cents as a dollar string: 25 -> "$0.25".
pub fn format_usd_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{}${}.{:02}", sign, abs / 100, abs % 100)
}

#[cfg(test)]
mod tests {
    use super::format_usd_cents;

    #[test]
    fn formats_cents() {
        assert_eq!(format_usd_cents(25), "$0.25");
        assert_eq!(format_usd_cents(0), "$0.00");
        assert_eq!(format_usd_cents(5), "$0.05");
        assert_eq!(format_usd_cents(1234), "$12.34");
        assert_eq!(format_usd_cents(-150), "-$1.50");
    }
}
