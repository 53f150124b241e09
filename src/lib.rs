//! Swap Bridge - cross-chain swap engine between a native platform and foreign chains
//!
//! The bridge watches foreign chains for deposits to its own addresses, settles
//! them on the native platform, delivers outbound swaps to foreign chains and
//! runs the deferred fee-settlement leg of every delivery.

pub mod api;
pub mod chain;
pub mod clock;
pub mod config;
pub mod error;
pub mod metrics;
pub mod native;
pub mod oracle;
pub mod retry;
pub mod signer;
pub mod state;
pub mod swap;
pub mod types;

#[cfg(test)]
mod testing;
