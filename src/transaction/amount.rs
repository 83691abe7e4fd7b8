//! Decimal amounts, stored as signed 64-bit counts of the smallest unit

use crate::error::FriendbotError;

/// Number of fractional digits carried by an amount.
pub const AMOUNT_DECIMALS: usize = 7;

/// Smallest units per whole unit.
pub const UNITS_PER_WHOLE: i64 = 10_000_000;

/// Parses a positive decimal string such as `"10000.00"` into smallest units.
pub fn parse_amount(input: &str) -> Result<i64, FriendbotError> {
    let s = input.trim();
    if s.is_empty() {
        return Err(FriendbotError::InvalidAmount("amount is empty".to_string()));
    }
    if s.starts_with('-') {
        return Err(FriendbotError::InvalidAmount(format!(
            "amount must not be negative: {}",
            s
        )));
    }

    let (whole, frac) = match s.split_once('.') {
        Some((whole, frac)) => (whole, frac),
        None => (s, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return Err(FriendbotError::InvalidAmount(format!("not a number: {}", s)));
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
        return Err(FriendbotError::InvalidAmount(format!("not a number: {}", s)));
    }
    if frac.len() > AMOUNT_DECIMALS {
        return Err(FriendbotError::InvalidAmount(format!(
            "at most {} decimal places allowed: {}",
            AMOUNT_DECIMALS, s
        )));
    }

    let too_large = || FriendbotError::InvalidAmount(format!("amount too large: {}", s));

    let whole_units = if whole.is_empty() {
        0
    } else {
        whole.parse::<i64>().map_err(|_| too_large())?
    };
    let frac_units = if frac.is_empty() {
        0
    } else {
        let padded = format!("{:0<width$}", frac, width = AMOUNT_DECIMALS);
        padded.parse::<i64>().map_err(|_| too_large())?
    };

    whole_units
        .checked_mul(UNITS_PER_WHOLE)
        .and_then(|units| units.checked_add(frac_units))
        .ok_or_else(too_large)
}

/// Formats smallest units back to a fixed seven-decimal string.
pub fn format_amount(units: i64) -> String {
    let sign = if units < 0 { "-" } else { "" };
    let abs = units.unsigned_abs();
    let per_whole = UNITS_PER_WHOLE as u64;
    format!(
        "{}{}.{:0width$}",
        sign,
        abs / per_whole,
        abs % per_whole,
        width = AMOUNT_DECIMALS
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_whole_and_fraction() {
        assert_eq!(parse_amount("10000.00").unwrap(), 10_000 * UNITS_PER_WHOLE);
        assert_eq!(parse_amount("1").unwrap(), UNITS_PER_WHOLE);
        assert_eq!(parse_amount("0.0000001").unwrap(), 1);
        assert_eq!(parse_amount(".5").unwrap(), UNITS_PER_WHOLE / 2);
        assert_eq!(parse_amount(" 2.5 ").unwrap(), 25_000_000);
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(parse_amount("").is_err());
        assert!(parse_amount(".").is_err());
        assert!(parse_amount("-1").is_err());
        assert!(parse_amount("1.00000001").is_err());
        assert!(parse_amount("1e5").is_err());
        assert!(parse_amount("1.2.3").is_err());
        assert!(parse_amount("99999999999999999999").is_err());
    }

    #[test]
    fn test_format() {
        assert_eq!(format_amount(10_000 * UNITS_PER_WHOLE), "10000.0000000");
        assert_eq!(format_amount(1), "0.0000001");
        assert_eq!(format_amount(-15_000_000), "-1.5000000");
    }
}
