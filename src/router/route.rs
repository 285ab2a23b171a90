//! Route data structures and the multi-hop path codec.

use ethers::types::{Address, Bytes};
use serde::{Deserialize, Serialize};

use crate::errors::{ZapError, ZapResult};

const ADDRESS_LEN: usize = 20;
const TICK_SPACING_LEN: usize = 3;

/// Ordered hop list from `tokens[0]` to `tokens[last]`.
///
/// Shape invariant: `tokens.len() == pools.len() + 1` and
/// `tick_spacings.len() == pools.len()`, with at least one hop.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SwapRoute {
    pub tokens: Vec<Address>,
    pub pools: Vec<Address>,
    pub tick_spacings: Vec<i32>,
}

impl SwapRoute {
    /// Builds a route, rejecting inconsistent arrays.
    pub fn new(tokens: Vec<Address>, pools: Vec<Address>, tick_spacings: Vec<i32>) -> ZapResult<Self> {
        let route = Self {
            tokens,
            pools,
            tick_spacings,
        };
        route.validate_shape()?;
        Ok(route)
    }

    pub fn direct(token_in: Address, token_out: Address, pool: Address, tick_spacing: i32) -> Self {
        Self {
            tokens: vec![token_in, token_out],
            pools: vec![pool],
            tick_spacings: vec![tick_spacing],
        }
    }

    pub fn two_hop(
        token_in: Address,
        connector: Address,
        token_out: Address,
        first: (Address, i32),
        second: (Address, i32),
    ) -> Self {
        Self {
            tokens: vec![token_in, connector, token_out],
            pools: vec![first.0, second.0],
            tick_spacings: vec![first.1, second.1],
        }
    }

    pub fn validate_shape(&self) -> ZapResult<()> {
        if self.pools.is_empty() {
            return Err(ZapError::InvalidRouteShape("route has no hops".into()));
        }
        if self.tokens.len() != self.pools.len() + 1 {
            return Err(ZapError::InvalidRouteShape(format!(
                "{} tokens for {} pools",
                self.tokens.len(),
                self.pools.len()
            )));
        }
        if self.tick_spacings.len() != self.pools.len() {
            return Err(ZapError::InvalidRouteShape(format!(
                "{} tick spacings for {} pools",
                self.tick_spacings.len(),
                self.pools.len()
            )));
        }
        if self.tick_spacings.iter().any(|s| *s <= 0 || *s >= 1 << 23) {
            return Err(ZapError::InvalidRouteShape("tick spacing outside int24".into()));
        }
        if self.tokens.windows(2).any(|w| w[0] == w[1]) {
            return Err(ZapError::InvalidRouteShape("hop swaps a token for itself".into()));
        }
        Ok(())
    }

    /// Shape check plus the expected endpoints.
    pub fn validate_endpoints(&self, token_in: Address, token_out: Address) -> ZapResult<()> {
        self.validate_shape()?;
        if self.token_in() != token_in || self.token_out() != token_out {
            return Err(ZapError::InvalidRouteShape(format!(
                "route runs {:?} -> {:?}, expected {:?} -> {:?}",
                self.token_in(),
                self.token_out(),
                token_in,
                token_out
            )));
        }
        Ok(())
    }

    pub fn hops(&self) -> usize {
        self.pools.len()
    }

    pub fn token_in(&self) -> Address {
        self.tokens.first().copied().unwrap_or_default()
    }

    pub fn token_out(&self) -> Address {
        self.tokens.last().copied().unwrap_or_default()
    }

    /// Same pools walked in the opposite direction.
    pub fn reversed(&self) -> Self {
        Self {
            tokens: self.tokens.iter().rev().copied().collect(),
            pools: self.pools.iter().rev().copied().collect(),
            tick_spacings: self.tick_spacings.iter().rev().copied().collect(),
        }
    }

    /// `token | tickSpacing (int24) | token | ...` as consumed by the swap router and quoter.
    pub fn encode_path(&self) -> ZapResult<Bytes> {
        self.validate_shape()?;
        let mut path =
            Vec::with_capacity(self.tokens.len() * ADDRESS_LEN + self.pools.len() * TICK_SPACING_LEN);
        for (i, token) in self.tokens.iter().enumerate() {
            path.extend_from_slice(token.as_bytes());
            if let Some(spacing) = self.tick_spacings.get(i) {
                path.extend_from_slice(&spacing.to_be_bytes()[1..]);
            }
        }
        Ok(Bytes::from(path))
    }

    /// Inverse of [`SwapRoute::encode_path`]: returns `(tokens, tick_spacings)`.
    pub fn decode_path(path: &[u8]) -> ZapResult<(Vec<Address>, Vec<i32>)> {
        let hop_len = ADDRESS_LEN + TICK_SPACING_LEN;
        if path.len() < ADDRESS_LEN + hop_len || (path.len() - ADDRESS_LEN) % hop_len != 0 {
            return Err(ZapError::InvalidRouteShape(format!(
                "encoded path of {} bytes",
                path.len()
            )));
        }

        let mut tokens = Vec::new();
        let mut tick_spacings = Vec::new();
        let mut offset = 0;
        loop {
            tokens.push(Address::from_slice(&path[offset..offset + ADDRESS_LEN]));
            offset += ADDRESS_LEN;
            if offset == path.len() {
                break;
            }
            let raw = &path[offset..offset + TICK_SPACING_LEN];
            // sign-extend int24
            let fill = if raw[0] & 0x80 != 0 { 0xff } else { 0x00 };
            tick_spacings.push(i32::from_be_bytes([fill, raw[0], raw[1], raw[2]]));
            offset += TICK_SPACING_LEN;
        }
        Ok((tokens, tick_spacings))
    }
}

/// Resolution of one leg of a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LegRoute {
    /// The leg asset is the deposit asset.
    NotRequired,
    Found(SwapRoute),
    Missing,
}

impl LegRoute {
    pub fn route(&self) -> Option<&SwapRoute> {
        match self {
            LegRoute::Found(route) => Some(route),
            _ => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, LegRoute::Missing)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RouteStatus {
    /// Every leg that needs a route has one.
    Success,
    /// Some but not all required legs resolved.
    PartialSuccess,
    /// No required leg resolved.
    NoRoute,
}

impl std::fmt::Display for RouteStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RouteStatus::Success => write!(f, "SUCCESS"),
            RouteStatus::PartialSuccess => write!(f, "PARTIAL_SUCCESS"),
            RouteStatus::NoRoute => write!(f, "NO_ROUTE"),
        }
    }
}

/// Routes for both position legs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutePlan {
    pub route0: LegRoute,
    pub route1: LegRoute,
    pub status: RouteStatus,
}

impl RoutePlan {
    pub fn new(route0: LegRoute, route1: LegRoute) -> Self {
        let required = [&route0, &route1]
            .iter()
            .filter(|l| !matches!(l, LegRoute::NotRequired))
            .count();
        let missing = [&route0, &route1].iter().filter(|l| l.is_missing()).count();
        let status = if missing == 0 {
            RouteStatus::Success
        } else if missing == required {
            RouteStatus::NoRoute
        } else {
            RouteStatus::PartialSuccess
        };
        Self {
            route0,
            route1,
            status,
        }
    }

    pub fn leg(&self, index: usize) -> &LegRoute {
        if index == 0 {
            &self.route0
        } else {
            &self.route1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u64) -> Address {
        Address::from_low_u64_be(n)
    }

    #[test]
    fn test_shape_invariant() {
        assert!(SwapRoute::new(vec![addr(1), addr(2)], vec![addr(9)], vec![10]).is_ok());
        assert!(SwapRoute::new(vec![addr(1)], vec![addr(9)], vec![10]).is_err());
        assert!(SwapRoute::new(vec![addr(1), addr(2)], vec![addr(9)], vec![]).is_err());
        assert!(SwapRoute::new(vec![addr(1)], vec![], vec![]).is_err());
        assert!(SwapRoute::new(vec![addr(1), addr(1)], vec![addr(9)], vec![10]).is_err());
    }

    #[test]
    fn test_path_encoding_layout() {
        let route = SwapRoute::two_hop(addr(1), addr(2), addr(3), (addr(8), 100), (addr(9), 1));
        let path = route.encode_path().unwrap();
        assert_eq!(path.len(), 20 * 3 + 3 * 2);
        assert_eq!(&path[20..23], &[0x00, 0x00, 0x64]);

        let (tokens, spacings) = SwapRoute::decode_path(&path).unwrap();
        assert_eq!(tokens, route.tokens);
        assert_eq!(spacings, route.tick_spacings);
    }

    #[test]
    fn test_decode_rejects_truncated_path() {
        let route = SwapRoute::direct(addr(1), addr(2), addr(9), 60);
        let path = route.encode_path().unwrap();
        assert!(SwapRoute::decode_path(&path[..path.len() - 1]).is_err());
        assert!(SwapRoute::decode_path(&path[..20]).is_err());
    }

    #[test]
    fn test_endpoints_and_reverse() {
        let route = SwapRoute::two_hop(addr(1), addr(2), addr(3), (addr(8), 100), (addr(9), 1));
        assert!(route.validate_endpoints(addr(1), addr(3)).is_ok());
        assert!(matches!(
            route.validate_endpoints(addr(3), addr(1)),
            Err(ZapError::InvalidRouteShape(_))
        ));
        let back = route.reversed();
        assert_eq!(back.tokens, vec![addr(3), addr(2), addr(1)]);
        assert_eq!(back.tick_spacings, vec![1, 100]);
    }

    #[test]
    fn test_plan_status() {
        let found = LegRoute::Found(SwapRoute::direct(addr(1), addr(2), addr(9), 10));
        assert_eq!(
            RoutePlan::new(LegRoute::NotRequired, found.clone()).status,
            RouteStatus::Success
        );
        assert_eq!(
            RoutePlan::new(found, LegRoute::Missing).status,
            RouteStatus::PartialSuccess
        );
        assert_eq!(
            RoutePlan::new(LegRoute::NotRequired, LegRoute::Missing).status,
            RouteStatus::NoRoute
        );
        assert_eq!(RouteStatus::NoRoute.to_string(), "NO_ROUTE");
    }
}
