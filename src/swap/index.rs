//! In-memory index of detected, unresolved incoming swaps

use crate::types::{Hash, PendingSwap};

use std::collections::{BTreeSet, HashMap};

/// Swaps keyed by source hash, also reachable through both of their addresses
#[derive(Debug, Default)]
pub struct SwapIndex {
    swaps: HashMap<Hash, PendingSwap>,
    by_address: HashMap<String, BTreeSet<Hash>>,
}

impl SwapIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the hash is already indexed
    pub fn insert(&mut self, swap: PendingSwap) -> bool {
        if self.swaps.contains_key(&swap.source_hash) {
            return false;
        }
        for address in [&swap.source_address, &swap.destination_address] {
            self.by_address
                .entry(address.clone())
                .or_default()
                .insert(swap.source_hash);
        }
        self.swaps.insert(swap.source_hash, swap);
        true
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.swaps.contains_key(hash)
    }

    pub fn remove(&mut self, hash: &Hash) -> Option<PendingSwap> {
        let swap = self.swaps.remove(hash)?;
        for address in [&swap.source_address, &swap.destination_address] {
            if let Some(hashes) = self.by_address.get_mut(address) {
                hashes.remove(hash);
                if hashes.is_empty() {
                    self.by_address.remove(address);
                }
            }
        }
        Some(swap)
    }

    pub fn for_address(&self, address: &str) -> Vec<&PendingSwap> {
        self.by_address
            .get(address)
            .into_iter()
            .flatten()
            .filter_map(|hash| self.swaps.get(hash))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.swaps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.swaps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{test_hash, TokenAmount};
    use ethers::types::U256;

    fn swap(n: u8, from: &str, to: &str) -> PendingSwap {
        PendingSwap {
            platform: "neo".to_string(),
            source_hash: test_hash(n),
            source_address: from.to_string(),
            destination_address: to.to_string(),
            amount: TokenAmount::new("SOUL", U256::from(n), 8),
        }
    }

    #[test]
    fn test_both_addresses_find_the_swap() {
        let mut index = SwapIndex::new();
        assert!(index.insert(swap(1, "Aalice", "Pbob")));
        assert!(!index.insert(swap(1, "Aalice", "Pbob")));
        index.insert(swap(2, "Aalice", "Pcarol"));

        assert_eq!(index.for_address("Aalice").len(), 2);
        assert_eq!(index.for_address("Pbob").len(), 1);
        assert!(index.for_address("Pnobody").is_empty());
    }

    #[test]
    fn test_remove_clears_address_entries() {
        let mut index = SwapIndex::new();
        index.insert(swap(1, "Aalice", "Pbob"));

        assert!(index.remove(&test_hash(1)).is_some());
        assert!(index.remove(&test_hash(1)).is_none());
        assert!(index.for_address("Aalice").is_empty());
        assert!(index.is_empty());
    }
}
