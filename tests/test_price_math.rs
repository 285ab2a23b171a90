//! Tick <-> sqrt-price conversion across the whole supported domain
//!
//! Checks the properties callers rely on: exact inversion on every tick, reciprocal symmetry
//! between `t` and `-t`, strict monotonicity and the domain bounds.

use ethers::types::{U256, U512};
use mig_zap_sdk::v3_math::{
    get_sqrt_ratio_at_tick, get_tick_at_sqrt_ratio, MAX_SQRT_RATIO, MAX_TICK, MIN_SQRT_RATIO,
    MIN_TICK, Q96,
};
use mig_zap_sdk::ZapError;

/// Ticks spread over the full domain, including both bounds and the area around zero.
fn sampled_ticks() -> Vec<i32> {
    let mut ticks: Vec<i32> = (MIN_TICK..=MAX_TICK).step_by(7919).collect();
    ticks.extend([MIN_TICK, MIN_TICK + 1, -1, 0, 1, MAX_TICK - 1, MAX_TICK]);
    ticks.sort_unstable();
    ticks.dedup();
    ticks
}

/// Domain bounds map to the published constants and tick 0 maps to exactly 2^96
#[test]
fn test_bounds_and_unit_price() {
    assert_eq!(get_sqrt_ratio_at_tick(MIN_TICK).unwrap(), MIN_SQRT_RATIO);
    assert_eq!(get_sqrt_ratio_at_tick(MAX_TICK).unwrap(), MAX_SQRT_RATIO);
    assert_eq!(get_sqrt_ratio_at_tick(0).unwrap(), Q96);
    assert_eq!(Q96, U256::one() << 96);
}

/// Ticks outside ±887272 are rejected, not clamped
#[test]
fn test_out_of_range_ticks_rejected() {
    assert_eq!(
        get_sqrt_ratio_at_tick(MAX_TICK + 1),
        Err(ZapError::TickOutOfRange(887273))
    );
    assert_eq!(
        get_sqrt_ratio_at_tick(MIN_TICK - 1),
        Err(ZapError::TickOutOfRange(-887273))
    );
    assert!(get_tick_at_sqrt_ratio(MIN_SQRT_RATIO - 1).is_err());
    assert!(get_tick_at_sqrt_ratio(MAX_SQRT_RATIO + 1).is_err());
}

/// get_tick_at_sqrt_ratio(get_sqrt_ratio_at_tick(t)) == t for every sampled tick
#[test]
fn test_inverse_on_grid() {
    for tick in sampled_ticks() {
        let sqrt_price = get_sqrt_ratio_at_tick(tick).unwrap();
        assert_eq!(
            get_tick_at_sqrt_ratio(sqrt_price).unwrap(),
            tick,
            "inverse failed at tick {}",
            tick
        );
    }
}

/// A price strictly between two ticks resolves to the lower one
#[test]
fn test_inverse_between_ticks_rounds_down() {
    for tick in [-200_000, -1, 0, 1, 123_456] {
        let sqrt_price = get_sqrt_ratio_at_tick(tick).unwrap();
        let next = get_sqrt_ratio_at_tick(tick + 1).unwrap();
        assert!(next > sqrt_price + 1);
        assert_eq!(get_tick_at_sqrt_ratio(sqrt_price + 1).unwrap(), tick);
        assert_eq!(get_tick_at_sqrt_ratio(next - 1).unwrap(), tick);
    }
}

/// sqrt(t) * sqrt(-t) ≈ 2^192 (the two prices are reciprocals)
#[test]
fn test_reciprocal_symmetry() {
    let target = U512::one() << 192;
    // relative tolerance 1e-8
    let tolerance_denominator = U512::from(100_000_000u64);

    for tick in sampled_ticks().into_iter().filter(|t| *t >= 0) {
        let up = get_sqrt_ratio_at_tick(tick).unwrap();
        let down = get_sqrt_ratio_at_tick(-tick).unwrap();
        let product = up.full_mul(down);
        let diff = if product > target {
            product - target
        } else {
            target - product
        };
        assert!(
            diff * tolerance_denominator <= target,
            "product for ±{} deviates from 2^192 by {}",
            tick,
            diff
        );
    }
}

/// Strictly increasing across the domain
#[test]
fn test_monotonic() {
    let ticks = sampled_ticks();
    for pair in ticks.windows(2) {
        let a = get_sqrt_ratio_at_tick(pair[0]).unwrap();
        let b = get_sqrt_ratio_at_tick(pair[1]).unwrap();
        assert!(a < b, "sqrt ratio not increasing between {} and {}", pair[0], pair[1]);
    }
    for tick in (-50..50).chain(MAX_TICK - 50..MAX_TICK) {
        assert!(get_sqrt_ratio_at_tick(tick).unwrap() < get_sqrt_ratio_at_tick(tick + 1).unwrap());
    }
}
