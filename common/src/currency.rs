use crate::error::ValidationError;

/// Prices are stored in sen (1/100 ringgit) and displayed in ringgit.
pub const CURRENCY_SYMBOL: &str = "RM";

/// Format an amount (stored in sen) for display, e.g. `RM 45.90`.
pub fn format_price(amount_sen: u64) -> String {
    format!("{CURRENCY_SYMBOL} {}.{:02}", amount_sen / 100, amount_sen % 100)
}

/// Parse a ringgit amount as typed by a seller (`"45"`, `"45.9"`, `"RM 45.90"`) into sen.
pub fn parse_price(raw: &str) -> Result<u64, ValidationError> {
    let trimmed = raw.trim();
    let digits = trimmed
        .strip_prefix(CURRENCY_SYMBOL)
        .unwrap_or(trimmed)
        .trim();
    let invalid = || ValidationError::InvalidPrice;

    let (whole, frac) = digits.split_once('.').unwrap_or((digits, ""));
    if whole.is_empty() || frac.len() > 2 {
        return Err(invalid());
    }
    let whole: u64 = whole.parse().map_err(|_| invalid())?;
    let frac: u64 = match frac.len() {
        0 => 0,
        1 => frac.parse::<u64>().map_err(|_| invalid())? * 10,
        _ => frac.parse().map_err(|_| invalid())?,
    };

    let sen = whole
        .checked_mul(100)
        .and_then(|w| w.checked_add(frac))
        .ok_or_else(invalid)?;
    if sen == 0 {
        return Err(invalid());
    }
    Ok(sen)
}
