//! Minor-unit money helpers

/// ISO 4217 currencies without a minor unit.
const ZERO_DECIMAL_CURRENCIES: &[&str] = &["bif", "clp", "jpy", "krw", "pyg", "vnd", "xaf", "xof"];

/// Number of decimal places for the given currency code.
pub fn currency_exponent(currency: &str) -> u32 {
    let lower = currency.to_ascii_lowercase();
    if ZERO_DECIMAL_CURRENCIES.contains(&lower.as_str()) {
        0
    } else {
        2
    }
}

/// Format an amount in minor units, e.g. `510, "usd"` → `"$5.10"`.
pub fn format_minor_units(amount: i64, currency: &str) -> String {
    let exponent = currency_exponent(currency);
    let sign = if amount < 0 { "-" } else { "" };
    let abs = amount.unsigned_abs();

    let number = if exponent == 0 {
        abs.to_string()
    } else {
        let factor = 10u64.pow(exponent);
        format!(
            "{}.{:0width$}",
            abs / factor,
            abs % factor,
            width = exponent as usize
        )
    };

    match currency.to_ascii_lowercase().as_str() {
        "usd" => format!("{}${}", sign, number),
        "eur" => format!("{}€{}", sign, number),
        "gbp" => format!("{}£{}", sign, number),
        other => format!("{}{} {}", sign, number, other.to_ascii_uppercase()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_two_decimal_currencies() {
        assert_eq!(format_minor_units(510, "usd"), "$5.10");
        assert_eq!(format_minor_units(1490, "USD"), "$14.90");
        assert_eq!(format_minor_units(5, "eur"), "€0.05");
        assert_eq!(format_minor_units(12345, "uzs"), "123.45 UZS");
    }

    #[test]
    fn formats_zero_decimal_currencies() {
        assert_eq!(currency_exponent("JPY"), 0);
        assert_eq!(format_minor_units(1500, "jpy"), "1500 JPY");
    }

    #[test]
    fn formats_negative_amounts() {
        assert_eq!(format_minor_units(-250, "usd"), "-$2.50");
    }
}
