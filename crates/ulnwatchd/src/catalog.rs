//! Bundled chain & DVN catalog
//!
//! A JSON document mapping chain names to deployment metadata, loaded once
//! at startup and immutable afterwards. Only three field groups
//! contribute: `chainDetails.nativeChainId`, `deployments[].eid`, and the
//! `dvns` name table. Malformed entries are skipped with a warning.

use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use tracing::warn;
use ulnwatch_core::ids::{normalize_address, ChainId, Eid};

/// Catalog errors
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("catalog is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("catalog root must be an object")]
    NotAnObject,
}

/// Immutable chain & verifier lookups derived from the catalog file.
#[derive(Debug, Default)]
pub struct ChainCatalog {
    /// `(chainId, canonical address)` -> display name
    dvn_names: HashMap<(ChainId, String), String>,
    /// endpoint id -> host chain
    eid_chains: HashMap<Eid, ChainId>,
}

impl ChainCatalog {
    /// Empty catalog (no name resolution, no eid mapping).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load and parse the catalog file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let raw = std::fs::read_to_string(path)?;
        let doc: Value = serde_json::from_str(&raw)?;
        Self::from_json(&doc)
    }

    /// Build the lookups from a parsed document, skipping malformed
    /// entries.
    pub fn from_json(doc: &Value) -> Result<Self, CatalogError> {
        let chains = doc.as_object().ok_or(CatalogError::NotAnObject)?;
        let mut catalog = Self::default();

        for (chain_name, entry) in chains {
            let chain_id = match entry
                .pointer("/chainDetails/nativeChainId")
                .and_then(Value::as_u64)
            {
                Some(id) => id,
                None => {
                    warn!(chain = %chain_name, "catalog entry has no nativeChainId; skipping");
                    continue;
                }
            };

            if let Some(deployments) = entry.get("deployments").and_then(Value::as_array) {
                for deployment in deployments {
                    match deployment.get("eid").and_then(Value::as_u64) {
                        Some(eid) if eid <= Eid::MAX as u64 => {
                            catalog.eid_chains.insert(eid as Eid, chain_id);
                        }
                        _ => {
                            warn!(chain = %chain_name, "deployment without usable eid; skipping");
                        }
                    }
                }
            }

            if let Some(dvns) = entry.get("dvns").and_then(Value::as_object) {
                for (address, meta) in dvns {
                    let canonical = match normalize_address(address) {
                        Ok(c) => c,
                        Err(_) => {
                            warn!(chain = %chain_name, address = %address,
                                "catalog DVN address does not normalize; skipping");
                            continue;
                        }
                    };
                    let name = ["canonicalName", "name", "id"]
                        .iter()
                        .find_map(|field| meta.get(*field).and_then(Value::as_str));
                    let Some(name) = name else {
                        warn!(chain = %chain_name, address = %address,
                            "catalog DVN entry has no name field; skipping");
                        continue;
                    };
                    catalog
                        .dvn_names
                        .insert((chain_id, canonical), name.to_string());
                }
            }
        }

        Ok(catalog)
    }

    /// Best-known display name for a verifier address.
    pub fn dvn_name(&self, chain_id: ChainId, address: &str) -> Option<&str> {
        self.dvn_names
            .get(&(chain_id, address.to_string()))
            .map(String::as_str)
    }

    /// Host chain of an endpoint id, when the catalog knows it.
    pub fn chain_for_eid(&self, eid: Eid) -> Option<ChainId> {
        self.eid_chains.get(&eid).copied()
    }

    pub fn dvn_count(&self) -> usize {
        self.dvn_names.len()
    }

    pub fn eid_count(&self) -> usize {
        self.eid_chains.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_catalog_parsing() {
        let doc = json!({
            "ethereum": {
                "chainDetails": { "nativeChainId": 1 },
                "deployments": [
                    { "eid": 30101, "stage": "mainnet" },
                    { "stage": "broken" }
                ],
                "dvns": {
                    "0xAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA": { "canonicalName": "Alpha" },
                    "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb": { "name": "Beta" },
                    "not-an-address": { "canonicalName": "Broken" }
                }
            },
            "broken-chain": { "deployments": [] }
        });

        let catalog = ChainCatalog::from_json(&doc).unwrap();
        assert_eq!(catalog.chain_for_eid(30101), Some(1));
        assert_eq!(catalog.eid_count(), 1);
        assert_eq!(
            catalog.dvn_name(1, "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"),
            Some("Alpha")
        );
        assert_eq!(
            catalog.dvn_name(1, "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb"),
            Some("Beta")
        );
        assert_eq!(catalog.dvn_count(), 2);
    }

    #[test]
    fn test_catalog_rejects_non_object() {
        assert!(matches!(
            ChainCatalog::from_json(&json!([1, 2, 3])),
            Err(CatalogError::NotAnObject)
        ));
    }

    #[test]
    fn test_name_resolution_order() {
        let doc = json!({
            "ethereum": {
                "chainDetails": { "nativeChainId": 1 },
                "dvns": {
                    "0xcccccccccccccccccccccccccccccccccccccccc": {
                        "id": "gamma-id",
                        "name": "Gamma",
                        "canonicalName": "Gamma Canonical"
                    }
                }
            }
        });
        let catalog = ChainCatalog::from_json(&doc).unwrap();
        assert_eq!(
            catalog.dvn_name(1, "0xcccccccccccccccccccccccccccccccccccccccc"),
            Some("Gamma Canonical")
        );
    }
}
