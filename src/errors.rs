//! # Zap Errors
//!
//! Every failure an open/close can surface. Any error aborts the whole invocation and the
//! backend checkpoint is reverted, so callers only ever see "fully applied" or "nothing happened".
//!
//! Variants are grouped by [`ErrorKind`]:
//!
//! - **Validation**: bad caller input, detected before any value moves
//! - **Authorization**: identity mismatch, detected before any value moves
//! - **Market**: external market state cannot satisfy the request
//! - **Bounds**: an argument outside the supported tick domain
//! - **Backend**: a collaborator call failed (RPC error, revert, injected fault)

use ethers::types::{Address, U256};

/// Coarse classification used for metrics labels and retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Authorization,
    Market,
    Bounds,
    Backend,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Authorization => "authorization",
            ErrorKind::Market => "market",
            ErrorKind::Bounds => "bounds",
            ErrorKind::Backend => "backend",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ZapError {
    // Validation
    #[error("Invalid tick range [{lower}, {upper}] for tick spacing {spacing}")]
    InvalidRange { lower: i32, upper: i32, spacing: i32 },
    #[error("Invalid route shape: {0}")]
    InvalidRouteShape(String),
    #[error("Amount must be non-zero")]
    ZeroAmount,
    #[error("Deadline {deadline} expired (now {now})")]
    ExpiredDeadline { deadline: u64, now: u64 },
    #[error("No incentive gauge registered for pool {0:?}")]
    NoGauge(Address),

    // Authorization
    #[error("Caller {caller:?} is not authorized to act on position {position_id}")]
    Unauthorized { caller: Address, position_id: U256 },
    #[error("Caller {caller:?} is not the beneficial owner of staked position {position_id}")]
    NotBeneficialOwner { caller: Address, position_id: U256 },

    // Market
    #[error("No USD price available for {0:?} through any connector")]
    PriceUnavailable(Address),
    #[error("No route from {from:?} to {to:?}")]
    NoRoute { from: Address, to: Address },
    #[error("Insufficient output: got {actual}, minimum {minimum}")]
    InsufficientOutput { actual: U256, minimum: U256 },

    // Bounds
    #[error("Tick {0} outside supported range [-887272, 887272]")]
    TickOutOfRange(i64),
    #[error("Math overflow in {0}")]
    Math(&'static str),

    // Reentrancy / backend
    /// Another open/close/claim is already running on this manager, nested or concurrent.
    #[error("Reentrant call into {0} rejected")]
    Reentrancy(&'static str),
    #[error("Backend call failed: {0}")]
    Backend(String),
}

impl ZapError {
    /// Wraps any displayable collaborator failure.
    pub fn backend(err: impl std::fmt::Display) -> Self {
        ZapError::Backend(err.to_string())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ZapError::InvalidRange { .. }
            | ZapError::InvalidRouteShape(_)
            | ZapError::ZeroAmount
            | ZapError::ExpiredDeadline { .. }
            | ZapError::NoGauge(_)
            | ZapError::Reentrancy(_) => ErrorKind::Validation,
            ZapError::Unauthorized { .. } | ZapError::NotBeneficialOwner { .. } => {
                ErrorKind::Authorization
            }
            ZapError::PriceUnavailable(_)
            | ZapError::NoRoute { .. }
            | ZapError::InsufficientOutput { .. } => ErrorKind::Market,
            ZapError::TickOutOfRange(_) | ZapError::Math(_) => ErrorKind::Bounds,
            ZapError::Backend(_) => ErrorKind::Backend,
        }
    }
}

pub type ZapResult<T> = std::result::Result<T, ZapError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert_eq!(ZapError::ZeroAmount.kind(), ErrorKind::Validation);
        assert_eq!(
            ZapError::NotBeneficialOwner {
                caller: Address::zero(),
                position_id: U256::one()
            }
            .kind(),
            ErrorKind::Authorization
        );
        assert_eq!(
            ZapError::NoRoute {
                from: Address::zero(),
                to: Address::zero()
            }
            .kind(),
            ErrorKind::Market
        );
        assert_eq!(ZapError::TickOutOfRange(900_000).kind(), ErrorKind::Bounds);
        assert_eq!(ZapError::backend("boom").kind(), ErrorKind::Backend);
        assert_eq!(ErrorKind::Market.as_str(), "market");
    }
}
