//! # MIG Zap SDK
//!
//! Single-asset entry into, and exit from, concentrated-liquidity range positions.
//!
//! ## Overview
//!
//! A caller deposits one stable deposit asset. The SDK splits it between the two pool assets,
//! swaps into them, mints a range position and optionally stakes it in the pool's incentive
//! gauge. Closing reverses every step and pays the caller in the deposit asset. Both
//! directions are atomic: a failure at any step leaves no balance, position or stake change.
//!
//! ## Architecture
//!
//! ### Price Math
//! Bit-exact tick <-> sqrt-price conversion and liquidity/amount helpers (`v3_math`).
//!
//! ### Allocation
//! Optimal two-asset split of a deposit for a range and current price, priced through a
//! spot-rate oracle with ordered connector fallback (`allocation`, `price_feeds`).
//!
//! ### Routing & Execution
//! Cached pool discovery and one/two-hop path finding (`router`), and slippage-bounded swap
//! execution (`swap_executor`).
//!
//! ### Lifecycle
//! The open/close/claim state machine with checkpoint-based atomicity and a reentrancy lock
//! (`lifecycle`), plus the staked-position ownership ledger (`staking_ledger`).
//!
//! ### Backends
//! Every external system sits behind the traits in `collaborators`: `adapters::evm` talks to a
//! live (forked) chain through ethers, `simulation` is a complete in-memory chain for tests.

// Core Types
/// Collaborator contracts (pool/position registries, router, gauge, oracle, tokens)
pub mod collaborators;
/// Error taxonomy
pub mod errors;
/// Common types and data structures
pub mod types;

// Math & Pricing
/// Concentrated-liquidity math
pub mod v3_math;
/// Oracle USD pricing with connector fallback
pub mod price_feeds;
/// Deposit split between the two position assets
pub mod allocation;

// Routing & Execution
/// Route discovery and path encoding
pub mod router;
/// Slippage-bounded swap execution
pub mod swap_executor;
/// General TTL cache
pub mod cache;
/// Read-through cache of pool fields
pub mod pool_state_cache;

// Lifecycle
/// Atomic open/close orchestration
pub mod lifecycle;
/// Staked position ownership records
pub mod staking_ledger;

// Backends
/// Ethers-based live-chain backend
pub mod adapters;
/// Smart contract ABIs
pub mod contracts;
/// In-memory chain for tests and offline planning
pub mod simulation;

// Infrastructure
/// Metrics and observability
pub mod metrics;
/// Configuration management
pub mod settings;

// Re-exports for convenience
pub use collaborators::Collaborators;
pub use errors::{ErrorKind, ZapError, ZapResult};
pub use lifecycle::{CloseParams, CloseReceipt, OpenParams, OpenReceipt, PositionLifecycleManager};
pub use router::{RouteFinder, RouteStatus, SwapRoute};
pub use settings::Settings;
pub use simulation::SimulatedChain;
