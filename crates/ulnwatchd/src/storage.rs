//! Persistent entity store using sled
//!
//! One tree per entity family, string composite keys, postcard values.
//! Version records live in a single tree under `"{kind}/{key}"` and are
//! append-only: an existing key is never overwritten.

use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::{Db, Tree};
use std::path::Path;
use thiserror::Error;
use ulnwatch_core::entities::*;
use ulnwatch_core::ids::ChainId;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] postcard::Error),
}

/// Entity store backend for ulnwatchd
pub struct Storage {
    db: Db,
    /// RouteKey -> DefaultReceiveLibrary
    default_libraries: Tree,
    /// RouteKey -> DefaultUlnConfig
    default_uln_configs: Tree,
    /// OAppRouteKey -> OAppReceiveLibrary
    oapp_libraries: Tree,
    /// OAppRouteKey -> OAppUlnConfig
    oapp_uln_configs: Tree,
    /// OAppRouteKey -> OAppPeer
    oapp_peers: Tree,
    /// OAppId -> OAppRateLimiter
    oapp_rate_limiters: Tree,
    /// "{OAppId}_{dstEid}" -> OAppRateLimit
    oapp_rate_limits: Tree,
    /// OAppRouteKey -> OAppSecurityConfig
    security_configs: Tree,
    /// EventId -> PacketDelivered
    packets: Tree,
    /// OAppId -> OAppStats
    oapp_stats: Tree,
    /// OAppRouteKey -> OAppRouteStats
    route_stats: Tree,
    /// "{chainId}_{address}" -> DvnMetadata
    dvn_metadata: Tree,
    /// "{kind}/{key}" -> VersionRecord, append-only
    versions: Tree,
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StorageError> {
    Ok(postcard::to_allocvec(value)?)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StorageError> {
    Ok(postcard::from_bytes(bytes)?)
}

fn get_typed<T: DeserializeOwned>(tree: &Tree, key: &str) -> Result<Option<T>, StorageError> {
    match tree.get(key)? {
        Some(bytes) => Ok(Some(decode(&bytes)?)),
        None => Ok(None),
    }
}

fn put_typed<T: Serialize>(tree: &Tree, key: &str, value: &T) -> Result<(), StorageError> {
    tree.insert(key, encode(value)?)?;
    Ok(())
}

impl Storage {
    /// Open storage at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let db = sled::open(path)?;
        Ok(Self {
            default_libraries: db.open_tree("default_libraries")?,
            default_uln_configs: db.open_tree("default_uln_configs")?,
            oapp_libraries: db.open_tree("oapp_libraries")?,
            oapp_uln_configs: db.open_tree("oapp_uln_configs")?,
            oapp_peers: db.open_tree("oapp_peers")?,
            oapp_rate_limiters: db.open_tree("oapp_rate_limiters")?,
            oapp_rate_limits: db.open_tree("oapp_rate_limits")?,
            security_configs: db.open_tree("security_configs")?,
            packets: db.open_tree("packets")?,
            oapp_stats: db.open_tree("oapp_stats")?,
            route_stats: db.open_tree("route_stats")?,
            dvn_metadata: db.open_tree("dvn_metadata")?,
            versions: db.open_tree("versions")?,
            db,
        })
    }

    pub fn get_default_library(
        &self,
        key: &str,
    ) -> Result<Option<DefaultReceiveLibrary>, StorageError> {
        get_typed(&self.default_libraries, key)
    }

    pub fn put_default_library(
        &self,
        row: &DefaultReceiveLibrary,
    ) -> Result<(), StorageError> {
        put_typed(&self.default_libraries, &row.id, row)
    }

    pub fn get_default_uln_config(
        &self,
        key: &str,
    ) -> Result<Option<DefaultUlnConfig>, StorageError> {
        get_typed(&self.default_uln_configs, key)
    }

    pub fn put_default_uln_config(&self, row: &DefaultUlnConfig) -> Result<(), StorageError> {
        put_typed(&self.default_uln_configs, &row.id, row)
    }

    pub fn get_oapp_library(
        &self,
        key: &str,
    ) -> Result<Option<OAppReceiveLibrary>, StorageError> {
        get_typed(&self.oapp_libraries, key)
    }

    pub fn put_oapp_library(&self, row: &OAppReceiveLibrary) -> Result<(), StorageError> {
        put_typed(&self.oapp_libraries, &row.id, row)
    }

    pub fn get_oapp_uln_config(&self, key: &str) -> Result<Option<OAppUlnConfig>, StorageError> {
        get_typed(&self.oapp_uln_configs, key)
    }

    pub fn put_oapp_uln_config(&self, row: &OAppUlnConfig) -> Result<(), StorageError> {
        put_typed(&self.oapp_uln_configs, &row.id, row)
    }

    pub fn get_oapp_peer(&self, key: &str) -> Result<Option<OAppPeer>, StorageError> {
        get_typed(&self.oapp_peers, key)
    }

    pub fn put_oapp_peer(&self, row: &OAppPeer) -> Result<(), StorageError> {
        put_typed(&self.oapp_peers, &row.id, row)
    }

    pub fn get_oapp_rate_limiter(
        &self,
        key: &str,
    ) -> Result<Option<OAppRateLimiter>, StorageError> {
        get_typed(&self.oapp_rate_limiters, key)
    }

    pub fn put_oapp_rate_limiter(&self, row: &OAppRateLimiter) -> Result<(), StorageError> {
        put_typed(&self.oapp_rate_limiters, &row.id, row)
    }

    pub fn get_oapp_rate_limit(&self, key: &str) -> Result<Option<OAppRateLimit>, StorageError> {
        get_typed(&self.oapp_rate_limits, key)
    }

    pub fn put_oapp_rate_limit(&self, row: &OAppRateLimit) -> Result<(), StorageError> {
        put_typed(&self.oapp_rate_limits, &row.id, row)
    }

    pub fn get_security_config(
        &self,
        key: &str,
    ) -> Result<Option<OAppSecurityConfig>, StorageError> {
        get_typed(&self.security_configs, key)
    }

    pub fn put_security_config(&self, row: &OAppSecurityConfig) -> Result<(), StorageError> {
        put_typed(&self.security_configs, &row.id, row)
    }

    /// All derived security configs on one chain. Keys are
    /// `"{chainId}_{address}_{eid}"`, so the chain prefix is a clean scan.
    pub fn security_configs_for_chain(
        &self,
        chain_id: ChainId,
    ) -> Result<Vec<OAppSecurityConfig>, StorageError> {
        let prefix = format!("{chain_id}_");
        let mut rows = Vec::new();
        for item in self.security_configs.scan_prefix(prefix.as_bytes()) {
            let (_, bytes) = item?;
            rows.push(decode(&bytes)?);
        }
        Ok(rows)
    }

    pub fn get_packet(&self, key: &str) -> Result<Option<PacketDelivered>, StorageError> {
        get_typed(&self.packets, key)
    }

    pub fn has_packet(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.packets.contains_key(key)?)
    }

    pub fn put_packet(&self, row: &PacketDelivered) -> Result<(), StorageError> {
        put_typed(&self.packets, &row.id, row)
    }

    /// Packets received by one application, in key order.
    pub fn packets_for_oapp(&self, oapp_id: &str) -> Result<Vec<PacketDelivered>, StorageError> {
        let mut rows = Vec::new();
        for item in self.packets.iter() {
            let (_, bytes) = item?;
            let packet: PacketDelivered = decode(&bytes)?;
            if packet.oapp_id == oapp_id {
                rows.push(packet);
            }
        }
        Ok(rows)
    }

    pub fn get_oapp_stats(&self, key: &str) -> Result<Option<OAppStats>, StorageError> {
        get_typed(&self.oapp_stats, key)
    }

    pub fn put_oapp_stats(&self, row: &OAppStats) -> Result<(), StorageError> {
        put_typed(&self.oapp_stats, &row.id, row)
    }

    pub fn get_route_stats(&self, key: &str) -> Result<Option<OAppRouteStats>, StorageError> {
        get_typed(&self.route_stats, key)
    }

    pub fn put_route_stats(&self, row: &OAppRouteStats) -> Result<(), StorageError> {
        put_typed(&self.route_stats, &row.id, row)
    }

    pub fn get_dvn_metadata(&self, key: &str) -> Result<Option<DvnMetadata>, StorageError> {
        get_typed(&self.dvn_metadata, key)
    }

    pub fn put_dvn_metadata(&self, row: &DvnMetadata) -> Result<(), StorageError> {
        put_typed(&self.dvn_metadata, &row.id, row)
    }

    /// Append a version record. Returns `false` without writing when the
    /// key already exists, which makes replay of an event id a no-op.
    pub fn append_version(&self, record: &VersionRecord) -> Result<bool, StorageError> {
        let key = format!("{}/{}", record.kind(), record.storage_key());
        if self.versions.contains_key(&key)? {
            return Ok(false);
        }
        self.versions.insert(key.as_bytes(), encode(record)?)?;
        Ok(true)
    }

    pub fn has_version(&self, kind: &str, key: &str) -> Result<bool, StorageError> {
        Ok(self.versions.contains_key(format!("{kind}/{key}"))?)
    }

    /// All version records of one kind, in key order.
    pub fn versions_of_kind(&self, kind: &str) -> Result<Vec<VersionRecord>, StorageError> {
        let prefix = format!("{kind}/");
        let mut rows = Vec::new();
        for item in self.versions.scan_prefix(prefix.as_bytes()) {
            let (_, bytes) = item?;
            rows.push(decode(&bytes)?);
        }
        Ok(rows)
    }

    pub fn version_count(&self) -> usize {
        self.versions.len()
    }

    /// Flush all pending writes
    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use ulnwatch_core::uln::UlnConfigInput;

    #[test]
    fn test_default_library_round_trip() {
        let dir = tempdir().unwrap();
        let storage = Storage::open(dir.path()).unwrap();

        let row = DefaultReceiveLibrary {
            id: "1_30101".to_string(),
            chain_id: 1,
            eid: 30101,
            library: "0x1111111111111111111111111111111111111111".to_string(),
            last_event_id: "1_100_0".to_string(),
            last_block: 100,
            last_timestamp: 1_700_000_000,
        };
        storage.put_default_library(&row).unwrap();

        let loaded = storage.get_default_library("1_30101").unwrap().unwrap();
        assert_eq!(loaded, row);
        assert!(storage.get_default_library("1_30102").unwrap().is_none());
    }

    #[test]
    fn test_version_append_only() {
        let dir = tempdir().unwrap();
        let storage = Storage::open(dir.path()).unwrap();

        let record = VersionRecord::DefaultReceiveLibrary(DefaultReceiveLibraryVersion {
            event_id: "1_100_0".to_string(),
            chain_id: 1,
            eid: 30101,
            library: "0x1111111111111111111111111111111111111111".to_string(),
            block_number: 100,
            block_timestamp: 1,
            transaction_hash: "0xabc".to_string(),
        });

        assert!(storage.append_version(&record).unwrap());
        // Replay of the same key writes nothing
        assert!(!storage.append_version(&record).unwrap());
        assert_eq!(storage.version_count(), 1);
        assert!(storage
            .has_version("DefaultReceiveLibraryVersion", "1_100_0")
            .unwrap());
    }

    #[test]
    fn test_uln_version_keyed_per_eid() {
        let dir = tempdir().unwrap();
        let storage = Storage::open(dir.path()).unwrap();

        for eid in [30101u32, 30102] {
            let record = VersionRecord::DefaultUlnConfig(DefaultUlnConfigVersion {
                event_id: "1_100_0".to_string(),
                chain_id: 1,
                eid,
                raw: UlnConfigInput::default(),
                block_number: 100,
                block_timestamp: 1,
                transaction_hash: "0xabc".to_string(),
            });
            assert!(storage.append_version(&record).unwrap());
        }
        assert_eq!(
            storage.versions_of_kind("DefaultUlnConfigVersion").unwrap().len(),
            2
        );
    }

    #[test]
    fn test_chain_prefix_scan() {
        let dir = tempdir().unwrap();
        let storage = Storage::open(dir.path()).unwrap();

        // Chain 1 and chain 12 must not shadow each other
        for (chain_id, key) in [
            (1u64, "1_0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa_30101"),
            (12u64, "12_0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa_30101"),
        ] {
            let row = OAppSecurityConfig {
                id: key.to_string(),
                oapp_id: format!("{chain_id}_0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"),
                chain_id,
                eid: 30101,
                resolved: empty_resolved(),
                peer: None,
                peer_state: PeerState::NotConfigured,
                peer_oapp_id: None,
                last_computed_block: 1,
                last_computed_timestamp: 1,
                last_computed_event_id: format!("{chain_id}_1_0"),
                last_computed_tx_hash: "0xabc".to_string(),
            };
            storage.put_security_config(&row).unwrap();
        }

        let chain1 = storage.security_configs_for_chain(1).unwrap();
        assert_eq!(chain1.len(), 1);
        assert_eq!(chain1[0].chain_id, 1);
    }

    fn empty_resolved() -> ulnwatch_core::resolve::ResolvedConfig {
        ulnwatch_core::resolve::ResolvedConfig {
            receive_library: None,
            library_status: ulnwatch_core::classifier::LibraryStatus::None,
            is_config_tracked: false,
            uses_default_library: false,
            uses_default_config: false,
            uses_required_dvn_sentinel: false,
            confirmations: 0,
            required_dvn_count: 0,
            optional_dvn_count: 0,
            optional_dvn_threshold: None,
            required_dvns: Vec::new(),
            optional_dvns: Vec::new(),
            fallback_fields: Vec::new(),
            default_library_version: None,
            override_library_version: None,
            default_uln_version: None,
            override_uln_version: None,
        }
    }
}
