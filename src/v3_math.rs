// Concentrated-liquidity math: exact TickMath port plus the liquidity/amount helpers
// used by allocation, close-side floors and the simulation backend.
use ethers::types::{U256, U512};

use crate::errors::{ZapError, ZapResult};

/// Tick domain
pub const MIN_TICK: i32 = -887272;
pub const MAX_TICK: i32 = 887272;
pub const MIN_SQRT_RATIO: U256 = U256([4295128739, 0, 0, 0]); // sqrt(1.0001^-887272) * 2^96
pub const MAX_SQRT_RATIO: U256 = U256([6743328256752651558, 17280870778742802505, 4294805859, 0]); // sqrt(1.0001^887272) * 2^96

/// Q96 fixed point constants
pub const Q96: U256 = U256([0, 4294967296, 0, 0]); // 2^96

/// Q128.128 factor for |tick| bit 0: 1/sqrt(1.0001)
const TICK_BIT0_RATIO: u128 = 0xfffcb933bd6fad37aa2d162d1a594001;

/// Q128.128 factors for |tick| bits 1..=19: 1/sqrt(1.0001)^(2^bit)
const TICK_BIT_RATIOS: [u128; 19] = [
    0xfff97272373d413259a46990580e213a,
    0xfff2e50f5f656932ef12357cf3c7fdcc,
    0xffe5caca7e10e4e61c3624eaa0941cd0,
    0xffcb9843d60f6159c9db58835c926644,
    0xff973b41fa98c081472e6896dfb254c0,
    0xff2ea16466c96a3843ec78b326b52861,
    0xfe5dee046a99a2a811c461f1969c3053,
    0xfcbe86c7900a88aedcffc83b479aa3a4,
    0xf987a7253ac413176f2b074cf7815e54,
    0xf3392b0822b70005940c7a398e4b70f3,
    0xe7159475a2c29b7443b29c7fa6e889d9,
    0xd097f3bdfd2022b8845ad8f792aa5825,
    0xa9f746462d870fdf8a65dc1f90e061e5,
    0x70d869a156d2a1b890bb3df62baf32f7,
    0x31be135f97d08fd981231505542fcfa6,
    0x9aa508b5b7a84e1c677de54f3e99bc9,
    0x5d6af8dedb81196699c329225ee604,
    0x2216e584f5fa1ea926041bedfe98,
    0x48a170391f7dc42444e8fa2,
];

/// Calculate sqrt price from tick (TickMath.getSqrtRatioAtTick, bit-exact).
///
/// Compounds one Q128.128 factor per set bit of `|tick|`, inverts for positive ticks and
/// converts to Q64.96 rounding up whenever the low 32 bits are non-zero.
pub fn get_sqrt_ratio_at_tick(tick: i32) -> ZapResult<U256> {
    let abs_tick = tick.unsigned_abs();
    if abs_tick > MAX_TICK as u32 {
        return Err(ZapError::TickOutOfRange(tick as i64));
    }

    let mut ratio = if abs_tick & 0x1 != 0 {
        U256::from(TICK_BIT0_RATIO)
    } else {
        U256::one() << 128
    };

    for (i, factor) in TICK_BIT_RATIOS.iter().enumerate() {
        if abs_tick & (1u32 << (i + 1)) != 0 {
            // both operands < 2^129, product fits in 256 bits
            ratio = (ratio * U256::from(*factor)) >> 128;
        }
    }

    if tick > 0 {
        ratio = U256::MAX / ratio;
    }

    let round_up = !(ratio % (U256::one() << 32)).is_zero();
    let sqrt_price_x96 = (ratio >> 32) + if round_up { U256::one() } else { U256::zero() };
    Ok(sqrt_price_x96)
}

/// Calculate tick from sqrt price (inverse of above).
///
/// Returns the greatest tick whose sqrt ratio is `<= sqrt_price_x96`. Exact on-grid:
/// `get_tick_at_sqrt_ratio(get_sqrt_ratio_at_tick(t)) == t`.
pub fn get_tick_at_sqrt_ratio(sqrt_price_x96: U256) -> ZapResult<i32> {
    if sqrt_price_x96 < MIN_SQRT_RATIO || sqrt_price_x96 > MAX_SQRT_RATIO {
        return Err(ZapError::Math("get_tick_at_sqrt_ratio: sqrt price out of range"));
    }

    let mut low = MIN_TICK;
    let mut high = MAX_TICK;
    while low < high {
        let mid = low + (high - low + 1) / 2;
        if get_sqrt_ratio_at_tick(mid)? <= sqrt_price_x96 {
            low = mid;
        } else {
            high = mid - 1;
        }
    }
    Ok(low)
}

/// Checks ordering, bounds and spacing alignment of a position range.
pub fn validate_tick_range(tick_lower: i32, tick_upper: i32, tick_spacing: i32) -> ZapResult<()> {
    let invalid = ZapError::InvalidRange {
        lower: tick_lower,
        upper: tick_upper,
        spacing: tick_spacing,
    };
    if tick_spacing <= 0
        || tick_lower >= tick_upper
        || tick_lower < MIN_TICK
        || tick_upper > MAX_TICK
        || tick_lower % tick_spacing != 0
        || tick_upper % tick_spacing != 0
    {
        return Err(invalid);
    }
    Ok(())
}

/// floor(a * b / denominator) with a 512-bit intermediate.
pub fn mul_div(a: U256, b: U256, denominator: U256) -> ZapResult<U256> {
    if denominator.is_zero() {
        return Err(ZapError::Math("mul_div: zero denominator"));
    }
    let quotient = a.full_mul(b) / U512::from(denominator);
    U256::try_from(quotient).map_err(|_| ZapError::Math("mul_div"))
}

/// ceil(a * b / denominator) with a 512-bit intermediate.
pub fn mul_div_rounding_up(a: U256, b: U256, denominator: U256) -> ZapResult<U256> {
    if denominator.is_zero() {
        return Err(ZapError::Math("mul_div_rounding_up: zero denominator"));
    }
    let product = a.full_mul(b);
    let denominator = U512::from(denominator);
    let mut quotient = product / denominator;
    if !(product % denominator).is_zero() {
        quotient = quotient + U512::one();
    }
    U256::try_from(quotient).map_err(|_| ZapError::Math("mul_div_rounding_up"))
}

fn sorted(sqrt_a: U256, sqrt_b: U256) -> (U256, U256) {
    if sqrt_a > sqrt_b {
        (sqrt_b, sqrt_a)
    } else {
        (sqrt_a, sqrt_b)
    }
}

/// Amount of token0 spanned by `liquidity` between two sqrt prices.
pub fn get_amount0_delta(
    sqrt_ratio_ax96: U256,
    sqrt_ratio_bx96: U256,
    liquidity: U256,
    round_up: bool,
) -> ZapResult<U256> {
    let (sqrt_a, sqrt_b) = sorted(sqrt_ratio_ax96, sqrt_ratio_bx96);
    if sqrt_a.is_zero() {
        return Err(ZapError::Math("get_amount0_delta: zero sqrt price"));
    }

    let numerator1 = liquidity
        .checked_mul(Q96)
        .ok_or(ZapError::Math("get_amount0_delta"))?;
    let numerator2 = sqrt_b - sqrt_a;

    if round_up {
        let step = mul_div_rounding_up(numerator1, numerator2, sqrt_b)?;
        let mut amount = step / sqrt_a;
        if !(step % sqrt_a).is_zero() {
            amount = amount + U256::one();
        }
        Ok(amount)
    } else {
        Ok(mul_div(numerator1, numerator2, sqrt_b)? / sqrt_a)
    }
}

/// Amount of token1 spanned by `liquidity` between two sqrt prices.
pub fn get_amount1_delta(
    sqrt_ratio_ax96: U256,
    sqrt_ratio_bx96: U256,
    liquidity: U256,
    round_up: bool,
) -> ZapResult<U256> {
    let (sqrt_a, sqrt_b) = sorted(sqrt_ratio_ax96, sqrt_ratio_bx96);
    if round_up {
        mul_div_rounding_up(liquidity, sqrt_b - sqrt_a, Q96)
    } else {
        mul_div(liquidity, sqrt_b - sqrt_a, Q96)
    }
}

/// Liquidity received for `amount0` over [sqrt_a, sqrt_b] (LiquidityAmounts.getLiquidityForAmount0).
pub fn get_liquidity_for_amount0(sqrt_a: U256, sqrt_b: U256, amount0: U256) -> ZapResult<U256> {
    let (sqrt_a, sqrt_b) = sorted(sqrt_a, sqrt_b);
    if sqrt_a == sqrt_b {
        return Ok(U256::zero());
    }
    let intermediate = mul_div(sqrt_a, sqrt_b, Q96)?;
    mul_div(amount0, intermediate, sqrt_b - sqrt_a)
}

/// Liquidity received for `amount1` over [sqrt_a, sqrt_b] (LiquidityAmounts.getLiquidityForAmount1).
pub fn get_liquidity_for_amount1(sqrt_a: U256, sqrt_b: U256, amount1: U256) -> ZapResult<U256> {
    let (sqrt_a, sqrt_b) = sorted(sqrt_a, sqrt_b);
    if sqrt_a == sqrt_b {
        return Ok(U256::zero());
    }
    mul_div(amount1, Q96, sqrt_b - sqrt_a)
}

/// Maximum liquidity mintable from the given amounts at the current price.
pub fn get_liquidity_for_amounts(
    sqrt_price_x96: U256,
    sqrt_a: U256,
    sqrt_b: U256,
    amount0: U256,
    amount1: U256,
) -> ZapResult<U256> {
    let (sqrt_a, sqrt_b) = sorted(sqrt_a, sqrt_b);

    if sqrt_price_x96 <= sqrt_a {
        get_liquidity_for_amount0(sqrt_a, sqrt_b, amount0)
    } else if sqrt_price_x96 < sqrt_b {
        let liquidity0 = get_liquidity_for_amount0(sqrt_price_x96, sqrt_b, amount0)?;
        let liquidity1 = get_liquidity_for_amount1(sqrt_a, sqrt_price_x96, amount1)?;
        Ok(liquidity0.min(liquidity1))
    } else {
        get_liquidity_for_amount1(sqrt_a, sqrt_b, amount1)
    }
}

/// Token amounts represented by `liquidity` at the current price.
pub fn get_amounts_for_liquidity(
    sqrt_price_x96: U256,
    sqrt_a: U256,
    sqrt_b: U256,
    liquidity: U256,
    round_up: bool,
) -> ZapResult<(U256, U256)> {
    let (sqrt_a, sqrt_b) = sorted(sqrt_a, sqrt_b);

    if sqrt_price_x96 <= sqrt_a {
        Ok((get_amount0_delta(sqrt_a, sqrt_b, liquidity, round_up)?, U256::zero()))
    } else if sqrt_price_x96 < sqrt_b {
        Ok((
            get_amount0_delta(sqrt_price_x96, sqrt_b, liquidity, round_up)?,
            get_amount1_delta(sqrt_a, sqrt_price_x96, liquidity, round_up)?,
        ))
    } else {
        Ok((U256::zero(), get_amount1_delta(sqrt_a, sqrt_b, liquidity, round_up)?))
    }
}

/// Converts `amount_in` across a pool at a fixed sqrt price, ignoring fees and depth.
///
/// zero_for_one: amount * P, otherwise amount / P, where P = (sqrt_price / 2^96)^2.
pub fn quote_at_sqrt_price(amount_in: U256, sqrt_price_x96: U256, zero_for_one: bool) -> ZapResult<U256> {
    if sqrt_price_x96.is_zero() {
        return Err(ZapError::Math("quote_at_sqrt_price: zero sqrt price"));
    }
    if zero_for_one {
        let step = mul_div(amount_in, sqrt_price_x96, Q96)?;
        mul_div(step, sqrt_price_x96, Q96)
    } else {
        let step = mul_div(amount_in, Q96, sqrt_price_x96)?;
        mul_div(step, Q96, sqrt_price_x96)
    }
}

/// Narrows a U256 liquidity value to the on-chain u128 width.
pub fn to_liquidity(value: U256) -> ZapResult<u128> {
    if value > U256::from(u128::MAX) {
        return Err(ZapError::Math("liquidity exceeds u128"));
    }
    Ok(value.as_u128())
}

/// Converts a tick to a (raw-unit) price of token0 in token1. Display only.
pub fn tick_to_price(tick: i32) -> f64 {
    let log_price = (tick as f64) * 1.0001f64.ln();
    log_price.exp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_zero_is_q96() {
        assert_eq!(get_sqrt_ratio_at_tick(0).unwrap(), Q96);
    }

    #[test]
    fn test_tick_bounds_match_constants() {
        assert_eq!(get_sqrt_ratio_at_tick(MIN_TICK).unwrap(), MIN_SQRT_RATIO);
        assert_eq!(get_sqrt_ratio_at_tick(MAX_TICK).unwrap(), MAX_SQRT_RATIO);
        assert_eq!(
            MAX_SQRT_RATIO,
            U256::from_dec_str("1461446703485210103287273052203988822378723970342").unwrap()
        );
    }

    #[test]
    fn test_tick_out_of_range() {
        assert_eq!(
            get_sqrt_ratio_at_tick(MAX_TICK + 1),
            Err(ZapError::TickOutOfRange(887273))
        );
        assert_eq!(
            get_sqrt_ratio_at_tick(MIN_TICK - 1),
            Err(ZapError::TickOutOfRange(-887273))
        );
    }

    #[test]
    fn test_tick_sqrt_conversion() {
        for tick in [-887272, -200000, -1000, -1, 0, 1, 60, 1000, 200000, 887271] {
            let sqrt_ratio = get_sqrt_ratio_at_tick(tick).unwrap();
            assert_eq!(get_tick_at_sqrt_ratio(sqrt_ratio).unwrap(), tick);
        }
    }

    #[test]
    fn test_validate_tick_range() {
        assert!(validate_tick_range(-1000, 1000, 10).is_ok());
        assert!(validate_tick_range(1000, -1000, 10).is_err());
        assert!(validate_tick_range(100, 100, 10).is_err());
        assert!(validate_tick_range(-1005, 1000, 10).is_err());
        assert!(validate_tick_range(-887280, 0, 10).is_err());
        assert!(validate_tick_range(-100, 100, 0).is_err());
    }

    #[test]
    fn test_symmetric_range_amounts() {
        let sqrt_a = get_sqrt_ratio_at_tick(-1000).unwrap();
        let sqrt_b = get_sqrt_ratio_at_tick(1000).unwrap();
        let liquidity = U256::from(10u128.pow(24));
        let (amount0, amount1) =
            get_amounts_for_liquidity(Q96, sqrt_a, sqrt_b, liquidity, false).unwrap();
        let diff = if amount0 > amount1 { amount0 - amount1 } else { amount1 - amount0 };
        assert!(diff <= U256::from(2), "diff = {}", diff);
    }

    #[test]
    fn test_liquidity_round_trip_never_exceeds_inputs() {
        let sqrt_a = get_sqrt_ratio_at_tick(-600).unwrap();
        let sqrt_b = get_sqrt_ratio_at_tick(1200).unwrap();
        let sqrt_p = get_sqrt_ratio_at_tick(150).unwrap();
        let amount0 = U256::from(5_000_000u64);
        let amount1 = U256::from(7_000_000u64);

        let liquidity = get_liquidity_for_amounts(sqrt_p, sqrt_a, sqrt_b, amount0, amount1).unwrap();
        let (used0, used1) =
            get_amounts_for_liquidity(sqrt_p, sqrt_a, sqrt_b, liquidity, true).unwrap();
        assert!(used0 <= amount0);
        assert!(used1 <= amount1);
    }

    #[test]
    fn test_quote_at_price_one() {
        let out = quote_at_sqrt_price(U256::from(1_000u64), Q96, true).unwrap();
        assert_eq!(out, U256::from(1_000u64));
        let back = quote_at_sqrt_price(U256::from(1_000u64), Q96, false).unwrap();
        assert_eq!(back, U256::from(1_000u64));
    }

    #[test]
    fn test_tick_to_price() {
        // Tick 0 should be price 1.0
        assert!((tick_to_price(0) - 1.0).abs() < 1e-9);
        let price_pos = tick_to_price(20000);
        let expected_pos = 1.0001f64.powi(20000);
        assert!((price_pos - expected_pos).abs() / expected_pos < 1e-9);
    }
}
