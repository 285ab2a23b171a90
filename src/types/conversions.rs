use ethers::types::U256;
use rust_decimal::Decimal;
use std::str::FromStr;

// Raw token units to a human-readable decimal (display and CLI output)
pub fn u256_to_decimal(value: U256, decimals: u8) -> Result<Decimal, ConversionError> {
    let value_str = value.to_string();
    let decimal_value = Decimal::from_str(&value_str)
        .map_err(|e| ConversionError::InvalidDecimal(e.to_string()))?;

    let divisor = Decimal::from_str(&format!("1{}", "0".repeat(decimals as usize)))
        .map_err(|e| ConversionError::InvalidDecimal(e.to_string()))?;
    decimal_value
        .checked_div(divisor)
        .ok_or(ConversionError::Overflow)
}

// Human-readable decimal back to raw token units (CLI input)
pub fn decimal_to_u256(value: Decimal, decimals: u8) -> Result<U256, ConversionError> {
    if value.is_sign_negative() {
        return Err(ConversionError::InvalidDecimal(value.to_string()));
    }
    let raw = value.normalize().to_string();
    let (whole, frac) = raw.split_once('.').unwrap_or((raw.as_str(), ""));
    if frac.len() > decimals as usize {
        return Err(ConversionError::InvalidDecimal(raw.clone()));
    }
    let digits = format!("{}{}{}", whole, frac, "0".repeat(decimals as usize - frac.len()));
    U256::from_dec_str(&digits).map_err(|_| ConversionError::Overflow)
}

#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error("Invalid decimal: {0}")]
    InvalidDecimal(String),
    #[error("Overflow in conversion")]
    Overflow,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decimal_conversions() {
        let raw = U256::from(1_234_500_000u64);
        let human = u256_to_decimal(raw, 6).unwrap();
        assert_eq!(human, Decimal::from_str("1234.5").unwrap());
        assert_eq!(decimal_to_u256(human, 6).unwrap(), raw);
        assert!(decimal_to_u256(Decimal::from_str("0.0000001").unwrap(), 6).is_err());
    }
}
