//! Swap settlement
//!
//! This module provides:
//! - The orchestrator resolving swaps between the native platform and foreign chains
//! - The in-memory index of detected swaps
//! - The deferred fee-settlement state machine

mod fees;
mod index;
mod orchestrator;

pub use fees::FeeSettler;
pub use index::SwapIndex;
pub use orchestrator::SwapOrchestrator;
