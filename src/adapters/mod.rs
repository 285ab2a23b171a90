// Backend Adapters Module
// Live-chain implementation of the collaborator traits

pub mod evm;

pub use evm::EvmBackend;
