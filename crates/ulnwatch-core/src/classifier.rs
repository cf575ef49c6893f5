//! Receive-library classification
//!
//! The resolver only understands the ULN configuration of one receive
//! library per chain (the tracked implementation). Any other non-null
//! library renders the ULN portion of a route meaningless.

use crate::error::Result;
use crate::ids::{is_zero_address, normalize_address, ChainId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Classification of an effective receive library.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum LibraryStatus {
    /// The per-chain tracked receive-library implementation.
    Tracked,
    /// A non-null library we do not understand.
    Unsupported,
    /// No library resolved at all.
    None,
}

impl LibraryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LibraryStatus::Tracked => "Tracked",
            LibraryStatus::Unsupported => "Unsupported",
            LibraryStatus::None => "None",
        }
    }
}

/// Per-chain map of tracked receive-library addresses.
///
/// Ships with the known deployment table; deployments can override or
/// extend it per chain without changing classification semantics.
#[derive(Clone, Debug, Default)]
pub struct LibraryRegistry {
    tracked: HashMap<ChainId, String>,
}

/// Known receive-library deployments, by native chain id.
const BUILTIN_TRACKED: &[(ChainId, &str)] = &[
    // Ethereum
    (1, "0xc02ab410f0734efa3f14628780e6e695156024c2"),
    // Optimism
    (10, "0x3c4962ff6258dcfcafd23a814237b7d6eb712063"),
    // BNB Chain
    (56, "0xb217266c3a98c8b2709ee26836c98cf12f6ccec1"),
    // Polygon
    (137, "0x1322871e4ab09bc7f5717189434f97bbd9546e95"),
    // Base
    (8453, "0xc02ab410f0734efa3f14628780e6e695156024c2"),
    // Arbitrum One
    (42161, "0x7b9e184e07a6ee1ac23eae0fe8d6be2f663f05e6"),
    // Avalanche
    (43114, "0xbf3521d309642fa9b1c91a08609505ba09752c61"),
];

impl LibraryRegistry {
    /// Registry preloaded with the known deployments.
    pub fn builtin() -> Self {
        let tracked = BUILTIN_TRACKED
            .iter()
            .map(|(chain, addr)| (*chain, (*addr).to_string()))
            .collect();
        Self { tracked }
    }

    /// Registry with no tracked libraries (tests, exotic deployments).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Set or replace the tracked library for a chain.
    pub fn set_tracked(&mut self, chain_id: ChainId, address: &str) -> Result<()> {
        self.tracked.insert(chain_id, normalize_address(address)?);
        Ok(())
    }

    /// The tracked library for a chain, if any.
    pub fn tracked(&self, chain_id: ChainId) -> Option<&str> {
        self.tracked.get(&chain_id).map(String::as_str)
    }

    /// Classify an effective library address for a chain.
    pub fn classify(&self, chain_id: ChainId, library: Option<&str>) -> LibraryStatus {
        match library {
            None => LibraryStatus::None,
            Some(address) if is_zero_address(address) => LibraryStatus::None,
            Some(address) => match self.tracked.get(&chain_id) {
                Some(tracked) if tracked == address => LibraryStatus::Tracked,
                _ => LibraryStatus::Unsupported,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIB: &str = "0x1111111111111111111111111111111111111111";
    const OTHER: &str = "0x2222222222222222222222222222222222222222";

    #[test]
    fn test_classify() {
        let mut registry = LibraryRegistry::empty();
        registry.set_tracked(1, LIB).unwrap();

        assert_eq!(registry.classify(1, Some(LIB)), LibraryStatus::Tracked);
        assert_eq!(registry.classify(1, Some(OTHER)), LibraryStatus::Unsupported);
        assert_eq!(registry.classify(1, None), LibraryStatus::None);
        // Unknown chain: any library is unsupported
        assert_eq!(registry.classify(2, Some(LIB)), LibraryStatus::Unsupported);
    }

    #[test]
    fn test_classify_normalizes_registration() {
        let mut registry = LibraryRegistry::empty();
        registry.set_tracked(1, &LIB.to_uppercase()).unwrap();
        assert_eq!(registry.classify(1, Some(LIB)), LibraryStatus::Tracked);
    }

    #[test]
    fn test_builtin_addresses_are_canonical() {
        let registry = LibraryRegistry::builtin();
        for (chain, _) in super::BUILTIN_TRACKED {
            let tracked = registry.tracked(*chain).unwrap();
            assert_eq!(tracked, tracked.to_ascii_lowercase());
            assert_eq!(tracked.len(), 42);
        }
    }
}
