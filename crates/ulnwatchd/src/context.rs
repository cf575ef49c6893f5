//! Handler context
//!
//! What a handler sees while processing one event: the entity store (all
//! reads and writes are async and may suspend), the tracked-library
//! registry, the immutable catalog, and the preload flag of the dry-pass
//! phase. The merge resolver itself never touches this.

use crate::catalog::ChainCatalog;
use crate::storage::{Storage, StorageError};
use std::sync::Arc;
use ulnwatch_core::classifier::LibraryRegistry;
use ulnwatch_core::entities::*;
use ulnwatch_core::ids::{ChainId, OAppId};

/// Shared per-run context handed to every handler.
pub struct HandlerContext {
    storage: Arc<Storage>,
    pub registry: LibraryRegistry,
    pub catalog: Arc<ChainCatalog>,
    /// Dry-pass phase: handlers must return without side effects.
    pub preload: bool,
}

impl HandlerContext {
    pub fn new(
        storage: Arc<Storage>,
        registry: LibraryRegistry,
        catalog: Arc<ChainCatalog>,
    ) -> Self {
        Self {
            storage,
            registry,
            catalog,
            preload: false,
        }
    }

    pub fn with_preload(mut self, preload: bool) -> Self {
        self.preload = preload;
        self
    }

    /// Direct store access for consistency checks and tests.
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub async fn get_default_library(
        &self,
        key: &str,
    ) -> Result<Option<DefaultReceiveLibrary>, StorageError> {
        self.storage.get_default_library(key)
    }

    pub async fn put_default_library(
        &self,
        row: &DefaultReceiveLibrary,
    ) -> Result<(), StorageError> {
        self.storage.put_default_library(row)
    }

    pub async fn get_default_uln_config(
        &self,
        key: &str,
    ) -> Result<Option<DefaultUlnConfig>, StorageError> {
        self.storage.get_default_uln_config(key)
    }

    pub async fn put_default_uln_config(
        &self,
        row: &DefaultUlnConfig,
    ) -> Result<(), StorageError> {
        self.storage.put_default_uln_config(row)
    }

    pub async fn get_oapp_library(
        &self,
        key: &str,
    ) -> Result<Option<OAppReceiveLibrary>, StorageError> {
        self.storage.get_oapp_library(key)
    }

    pub async fn put_oapp_library(&self, row: &OAppReceiveLibrary) -> Result<(), StorageError> {
        self.storage.put_oapp_library(row)
    }

    pub async fn get_oapp_uln_config(
        &self,
        key: &str,
    ) -> Result<Option<OAppUlnConfig>, StorageError> {
        self.storage.get_oapp_uln_config(key)
    }

    pub async fn put_oapp_uln_config(&self, row: &OAppUlnConfig) -> Result<(), StorageError> {
        self.storage.put_oapp_uln_config(row)
    }

    pub async fn get_oapp_peer(&self, key: &str) -> Result<Option<OAppPeer>, StorageError> {
        self.storage.get_oapp_peer(key)
    }

    pub async fn put_oapp_peer(&self, row: &OAppPeer) -> Result<(), StorageError> {
        self.storage.put_oapp_peer(row)
    }

    pub async fn put_oapp_rate_limiter(
        &self,
        row: &OAppRateLimiter,
    ) -> Result<(), StorageError> {
        self.storage.put_oapp_rate_limiter(row)
    }

    pub async fn put_oapp_rate_limit(&self, row: &OAppRateLimit) -> Result<(), StorageError> {
        self.storage.put_oapp_rate_limit(row)
    }

    pub async fn get_security_config(
        &self,
        key: &str,
    ) -> Result<Option<OAppSecurityConfig>, StorageError> {
        self.storage.get_security_config(key)
    }

    pub async fn put_security_config(
        &self,
        row: &OAppSecurityConfig,
    ) -> Result<(), StorageError> {
        self.storage.put_security_config(row)
    }

    pub async fn security_configs_for_chain(
        &self,
        chain_id: ChainId,
    ) -> Result<Vec<OAppSecurityConfig>, StorageError> {
        self.storage.security_configs_for_chain(chain_id)
    }

    pub async fn has_packet(&self, key: &str) -> Result<bool, StorageError> {
        self.storage.has_packet(key)
    }

    pub async fn put_packet(&self, row: &PacketDelivered) -> Result<(), StorageError> {
        self.storage.put_packet(row)
    }

    pub async fn get_route_stats(
        &self,
        key: &str,
    ) -> Result<Option<OAppRouteStats>, StorageError> {
        self.storage.get_route_stats(key)
    }

    pub async fn put_route_stats(&self, row: &OAppRouteStats) -> Result<(), StorageError> {
        self.storage.put_route_stats(row)
    }

    pub async fn get_dvn_metadata(&self, key: &str) -> Result<Option<DvnMetadata>, StorageError> {
        self.storage.get_dvn_metadata(key)
    }

    pub async fn put_dvn_metadata(&self, row: &DvnMetadata) -> Result<(), StorageError> {
        self.storage.put_dvn_metadata(row)
    }

    /// Append-only version write; replay of an existing key is a no-op.
    pub async fn append_version(&self, record: &VersionRecord) -> Result<bool, StorageError> {
        self.storage.append_version(record)
    }

    pub async fn get_oapp_stats(&self, key: &str) -> Result<Option<OAppStats>, StorageError> {
        self.storage.get_oapp_stats(key)
    }

    pub async fn put_oapp_stats(&self, row: &OAppStats) -> Result<(), StorageError> {
        self.storage.put_oapp_stats(row)
    }

    /// Fetch the stats row for an application, creating the zeroed parent
    /// row when it does not exist yet.
    pub async fn get_or_create_oapp_stats(
        &self,
        oapp: &OAppId,
    ) -> Result<OAppStats, StorageError> {
        let key = oapp.to_string();
        if let Some(row) = self.storage.get_oapp_stats(&key)? {
            return Ok(row);
        }
        let row = OAppStats::zeroed(key, oapp.chain_id, oapp.address.clone());
        self.storage.put_oapp_stats(&row)?;
        Ok(row)
    }
}
