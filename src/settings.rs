use config::{Config, ConfigError, File};
use ethers::types::Address;
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Zap {
    /// Stable-value unit of account for deposits and withdrawals
    pub deposit_asset: Address,
    /// Used when the caller passes 0
    #[serde(default = "default_slippage_bps")]
    pub default_slippage_bps: u32,
    #[serde(default = "default_max_slippage_bps")]
    pub max_slippage_bps: u32,
    /// Haircut applied to pool-price projections when no quoter is available
    #[serde(default = "default_projection_discount_bps")]
    pub projection_discount_bps: u32,
    #[serde(default = "default_oracle_threshold_filter")]
    pub oracle_threshold_filter: u32,
}

fn default_slippage_bps() -> u32 {
    100 // 1%
}
fn default_max_slippage_bps() -> u32 {
    1000 // 10%
}
fn default_projection_discount_bps() -> u32 {
    50
}
fn default_oracle_threshold_filter() -> u32 {
    10
}

impl Zap {
    pub fn with_deposit_asset(deposit_asset: Address) -> Self {
        Self {
            deposit_asset,
            default_slippage_bps: default_slippage_bps(),
            max_slippage_bps: default_max_slippage_bps(),
            projection_discount_bps: default_projection_discount_bps(),
            oracle_threshold_filter: default_oracle_threshold_filter(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Router {
    /// Probed in ascending order; first resolving spacing wins
    #[serde(default = "default_tick_spacings")]
    pub tick_spacings: Vec<i32>,
    /// Intermediate assets in priority order (two-hop routes and oracle fallback)
    #[serde(default)]
    pub connectors: Vec<Address>,
    #[serde(default = "default_route_cache_ttl_seconds")]
    pub cache_ttl_seconds: u64,
}

fn default_tick_spacings() -> Vec<i32> {
    vec![1, 10, 50, 100, 200, 2000]
}
fn default_route_cache_ttl_seconds() -> u64 {
    300 // 5 min
}

impl Default for Router {
    fn default() -> Self {
        Self {
            tick_spacings: default_tick_spacings(),
            connectors: Vec::new(),
            cache_ttl_seconds: default_route_cache_ttl_seconds(),
        }
    }
}

impl Router {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PoolCache {
    #[serde(default = "default_pool_cache_ttl_seconds")]
    pub ttl_seconds: u64,
}

fn default_pool_cache_ttl_seconds() -> u64 {
    300
}

impl Default for PoolCache {
    fn default() -> Self {
        Self {
            ttl_seconds: default_pool_cache_ttl_seconds(),
        }
    }
}

impl PoolCache {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Contracts {
    #[serde(default)]
    pub pool_factory: Address,
    #[serde(default)]
    pub position_manager: Address,
    #[serde(default)]
    pub swap_router: Address,
    /// Zero address disables quoting; expected outputs then come from pool-price projection
    #[serde(default)]
    pub quoter: Address,
    /// Gauge registry (`gauges(pool)`)
    #[serde(default)]
    pub voter: Address,
    #[serde(default)]
    pub price_oracle: Address,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Rpc {
    #[serde(default = "default_http_url")]
    pub http_url: String,
    /// Account the zap acts as
    #[serde(default)]
    pub operator: Address,
}

fn default_http_url() -> String {
    "http://localhost:8545".to_string()
}

impl Default for Rpc {
    fn default() -> Self {
        Self {
            http_url: default_http_url(),
            operator: Address::zero(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub zap: Zap,
    #[serde(default)]
    pub router: Router,
    #[serde(default)]
    pub pool_cache: PoolCache,
    #[serde(default)]
    pub contracts: Contracts,
    #[serde(default)]
    pub rpc: Rpc,
}

impl Settings {
    /// Loads `Config.toml` from the working directory, then applies `SDK_*` overrides.
    pub fn new() -> Result<Self, ConfigError> {
        Self::from_path("Config.toml")
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()?;

        let mut settings: Self = s.try_deserialize()?;
        apply_env_overrides(&mut settings)?;
        settings.router.tick_spacings.sort_unstable();
        settings.router.tick_spacings.dedup();
        Ok(settings)
    }
}

fn apply_env_overrides(settings: &mut Settings) -> Result<(), ConfigError> {
    if let Some(url) = env_value("SDK_RPC_HTTP_URL") {
        settings.rpc.http_url = url;
    }
    if let Some(raw) = env_value("SDK_RPC_OPERATOR") {
        settings.rpc.operator = parse_address("SDK_RPC_OPERATOR", &raw)?;
    }
    if let Some(raw) = env_value("SDK_ZAP_DEPOSIT_ASSET") {
        settings.zap.deposit_asset = parse_address("SDK_ZAP_DEPOSIT_ASSET", &raw)?;
    }
    if let Some(raw) = env_value("SDK_ZAP_DEFAULT_SLIPPAGE_BPS") {
        settings.zap.default_slippage_bps = raw
            .parse()
            .map_err(|e| ConfigError::Message(format!("SDK_ZAP_DEFAULT_SLIPPAGE_BPS: {}", e)))?;
    }
    if let Some(raw) = env_value("SDK_ROUTER_CONNECTORS") {
        settings.router.connectors = parse_list(&raw)
            .iter()
            .map(|s| parse_address("SDK_ROUTER_CONNECTORS", s))
            .collect::<Result<Vec<_>, _>>()?;
    }
    if let Some(raw) = env_value("SDK_ROUTER_CACHE_TTL_SECONDS") {
        settings.router.cache_ttl_seconds = raw
            .parse()
            .map_err(|e| ConfigError::Message(format!("SDK_ROUTER_CACHE_TTL_SECONDS: {}", e)))?;
    }
    Ok(())
}

fn env_value(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_address(key: &str, raw: &str) -> Result<Address, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|e| ConfigError::Message(format!("{}: invalid address {:?}: {}", key, raw, e)))
}

/// Accepts a JSON array or a plain comma-separated list.
fn parse_list(input: &str) -> Vec<String> {
    let trimmed = input.trim();
    if trimmed.starts_with('[') {
        if let Ok(v) = serde_json::from_str::<Vec<String>>(trimmed) {
            return v;
        }
    }
    trimmed
        .trim_start_matches('[')
        .trim_end_matches(']')
        .split(',')
        .map(|s| s.trim().trim_matches('"').trim_matches('\'').to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_list_formats() {
        assert_eq!(parse_list("[\"a\", \"b\"]"), vec!["a", "b"]);
        assert_eq!(parse_list("a, b,,c"), vec!["a", "b", "c"]);
        assert_eq!(parse_list("[a,b]"), vec!["a", "b"]);
        assert!(parse_list("  ").is_empty());
    }

    #[test]
    fn test_zap_defaults() {
        let zap = Zap::with_deposit_asset(Address::from_low_u64_be(1));
        assert_eq!(zap.default_slippage_bps, 100);
        assert_eq!(zap.max_slippage_bps, 1000);
    }
}
