//! Persisted entities
//!
//! Latest-state rows, the derived security configuration, packet records,
//! counters, and the append-only version records. Entity `id` fields hold
//! the composite string keys from [`crate::ids`] so rows round-trip
//! through prefix scans.

use crate::events::RateLimitParam;
use crate::ids::{is_zero_bytes32, ChainId, Eid};
use crate::resolve::ResolvedConfig;
use crate::uln::{UlnConfigInput, UlnConfigState};
use serde::{Deserialize, Serialize};

/// Current default receive library for `(chainId, eid)`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DefaultReceiveLibrary {
    /// RouteKey string.
    pub id: String,
    pub chain_id: ChainId,
    pub eid: Eid,
    /// Canonical lowercase address.
    pub library: String,
    pub last_event_id: String,
    pub last_block: u64,
    pub last_timestamp: u64,
}

/// Current default ULN config for `(chainId, eid)`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DefaultUlnConfig {
    /// RouteKey string.
    pub id: String,
    pub chain_id: ChainId,
    pub eid: Eid,
    pub config: UlnConfigState,
    pub last_event_id: String,
    pub last_block: u64,
    pub last_timestamp: u64,
}

/// Per-application receive-library override for one route.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct OAppReceiveLibrary {
    /// OAppRouteKey string.
    pub id: String,
    pub oapp_id: String,
    pub chain_id: ChainId,
    pub eid: Eid,
    /// `None` when the application set the zero address ("unset").
    pub library: Option<String>,
    pub last_event_id: String,
    pub last_block: u64,
    pub last_timestamp: u64,
}

/// Per-application ULN config override for one route.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct OAppUlnConfig {
    /// OAppRouteKey string.
    pub id: String,
    pub oapp_id: String,
    pub chain_id: ChainId,
    pub eid: Eid,
    pub config: UlnConfigState,
    pub last_event_id: String,
    pub last_block: u64,
    pub last_timestamp: u64,
}

/// Peer declared (or auto-discovered) for one application route.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct OAppPeer {
    /// OAppRouteKey string.
    pub id: String,
    pub oapp_id: String,
    pub chain_id: ChainId,
    pub eid: Eid,
    /// Canonical 32-byte peer value.
    pub peer: String,
    /// Counterpart application id when the peer maps onto a known chain.
    pub peer_oapp_id: Option<String>,
    /// Synthesized from a delivery rather than an explicit PeerSet.
    pub from_packet_delivered: bool,
    pub last_event_id: String,
    pub last_block: u64,
    pub last_timestamp: u64,
}

/// Routing classification of a peer record for downstream consumers.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum PeerState {
    NotConfigured,
    AutoDiscovered,
    ExplicitlySet,
    ExplicitlyBlocked,
}

impl PeerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeerState::NotConfigured => "NotConfigured",
            PeerState::AutoDiscovered => "AutoDiscovered",
            PeerState::ExplicitlySet => "ExplicitlySet",
            PeerState::ExplicitlyBlocked => "ExplicitlyBlocked",
        }
    }
}

/// Derive the peer routing state from the latest peer record.
pub fn peer_state(peer: Option<&OAppPeer>) -> PeerState {
    match peer {
        None => PeerState::NotConfigured,
        Some(p) if p.from_packet_delivered => PeerState::AutoDiscovered,
        Some(p) if is_zero_bytes32(&p.peer) => PeerState::ExplicitlyBlocked,
        Some(_) => PeerState::ExplicitlySet,
    }
}

/// Rate limiter contract attached to an application.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct OAppRateLimiter {
    /// OAppId string.
    pub id: String,
    pub chain_id: ChainId,
    pub rate_limiter: String,
    pub last_event_id: String,
    pub last_block: u64,
    pub last_timestamp: u64,
}

/// Per-destination rate limit of an application.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct OAppRateLimit {
    /// `"{OAppId}_{dstEid}"`.
    pub id: String,
    pub oapp_id: String,
    pub dst_eid: Eid,
    pub limit: u64,
    pub window: u64,
    pub last_event_id: String,
    pub last_block: u64,
    pub last_timestamp: u64,
}

/// The derived effective security configuration of one application route.
/// Owned by the resolver: nothing else writes these rows.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct OAppSecurityConfig {
    /// OAppRouteKey string.
    pub id: String,
    pub oapp_id: String,
    pub chain_id: ChainId,
    pub eid: Eid,
    pub resolved: ResolvedConfig,
    pub peer: Option<String>,
    pub peer_state: PeerState,
    pub peer_oapp_id: Option<String>,
    pub last_computed_block: u64,
    pub last_computed_timestamp: u64,
    pub last_computed_event_id: String,
    pub last_computed_tx_hash: String,
}

/// One observed inbound packet, embedding the effective security
/// configuration at delivery time. Never mutated after write.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PacketDelivered {
    /// EventId string.
    pub id: String,
    pub oapp_id: String,
    pub oapp_route_key: String,
    pub chain_id: ChainId,
    pub src_eid: Eid,
    /// Canonical 32-byte sender value.
    pub sender: String,
    pub nonce: u64,
    pub block_number: u64,
    pub block_timestamp: u64,
    pub transaction_hash: String,
    /// Complete copy of the resolved configuration at delivery time.
    pub security: OAppSecurityConfig,
}

/// Per-application delivery counters.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct OAppStats {
    /// OAppId string.
    pub id: String,
    pub chain_id: ChainId,
    pub address: String,
    pub total_packets_received: u64,
    pub last_packet_block: u64,
    pub last_packet_timestamp: u64,
}

impl OAppStats {
    /// Fresh row with zero counters.
    pub fn zeroed(id: String, chain_id: ChainId, address: String) -> Self {
        Self {
            id,
            chain_id,
            address,
            total_packets_received: 0,
            last_packet_block: 0,
            last_packet_timestamp: 0,
        }
    }
}

/// Per-route delivery counters.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct OAppRouteStats {
    /// OAppRouteKey string.
    pub id: String,
    pub oapp_id: String,
    pub src_eid: Eid,
    pub packets_received: u64,
    /// Security config id of the most recent delivery on this route.
    pub last_security_config_id: Option<String>,
}

/// Display-name row for a verifier referenced by any resolved config.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DvnMetadata {
    /// `"{chainId}_{address}"`.
    pub id: String,
    pub chain_id: ChainId,
    pub address: String,
    pub name: String,
}

// ---------------------------------------------------------------------------
// Append-only version records
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DefaultReceiveLibraryVersion {
    pub event_id: String,
    pub chain_id: ChainId,
    pub eid: Eid,
    pub library: String,
    pub block_number: u64,
    pub block_timestamp: u64,
    pub transaction_hash: String,
}

/// Keyed by `"{eventId}_{eid}"`: one event can set several eids.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DefaultUlnConfigVersion {
    pub event_id: String,
    pub chain_id: ChainId,
    pub eid: Eid,
    /// Raw wire tuple, sentinels intact.
    pub raw: UlnConfigInput,
    pub block_number: u64,
    pub block_timestamp: u64,
    pub transaction_hash: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct OAppReceiveLibraryVersion {
    pub event_id: String,
    pub oapp_route_key: String,
    pub library: Option<String>,
    pub block_number: u64,
    pub block_timestamp: u64,
    pub transaction_hash: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct OAppUlnConfigVersion {
    pub event_id: String,
    pub oapp_route_key: String,
    pub raw: UlnConfigInput,
    pub block_number: u64,
    pub block_timestamp: u64,
    pub transaction_hash: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct OAppPeerVersion {
    pub event_id: String,
    pub oapp_route_key: String,
    pub peer: String,
    pub from_packet_delivered: bool,
    pub block_number: u64,
    pub block_timestamp: u64,
    pub transaction_hash: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct OAppRateLimiterVersion {
    pub event_id: String,
    pub oapp_id: String,
    pub rate_limiter: String,
    pub block_number: u64,
    pub block_timestamp: u64,
    pub transaction_hash: String,
}

/// One row per event; the event's whole limit list travels together.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct OAppRateLimitVersion {
    pub event_id: String,
    pub oapp_id: String,
    pub limits: Vec<RateLimitParam>,
    pub block_number: u64,
    pub block_timestamp: u64,
    pub transaction_hash: String,
}

/// Union of all append-only version records. Stored under
/// `"{kind}/{key}"`; a key that already exists is never overwritten.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum VersionRecord {
    DefaultReceiveLibrary(DefaultReceiveLibraryVersion),
    DefaultUlnConfig(DefaultUlnConfigVersion),
    OAppReceiveLibrary(OAppReceiveLibraryVersion),
    OAppUlnConfig(OAppUlnConfigVersion),
    OAppPeer(OAppPeerVersion),
    OAppRateLimiter(OAppRateLimiterVersion),
    OAppRateLimit(OAppRateLimitVersion),
}

impl VersionRecord {
    pub fn kind(&self) -> &'static str {
        match self {
            VersionRecord::DefaultReceiveLibrary(_) => "DefaultReceiveLibraryVersion",
            VersionRecord::DefaultUlnConfig(_) => "DefaultUlnConfigVersion",
            VersionRecord::OAppReceiveLibrary(_) => "OAppReceiveLibraryVersion",
            VersionRecord::OAppUlnConfig(_) => "OAppUlnConfigVersion",
            VersionRecord::OAppPeer(_) => "OAppPeerVersion",
            VersionRecord::OAppRateLimiter(_) => "OAppRateLimiterVersion",
            VersionRecord::OAppRateLimit(_) => "OAppRateLimitVersion",
        }
    }

    /// Primary key within the kind. EventId alone, except for the default
    /// ULN config where one event fans out over several eids.
    pub fn storage_key(&self) -> String {
        match self {
            VersionRecord::DefaultReceiveLibrary(v) => v.event_id.clone(),
            VersionRecord::DefaultUlnConfig(v) => format!("{}_{}", v.event_id, v.eid),
            VersionRecord::OAppReceiveLibrary(v) => v.event_id.clone(),
            VersionRecord::OAppUlnConfig(v) => v.event_id.clone(),
            VersionRecord::OAppPeer(v) => v.event_id.clone(),
            VersionRecord::OAppRateLimiter(v) => v.event_id.clone(),
            VersionRecord::OAppRateLimit(v) => v.event_id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer_record(peer: &str, from_delivery: bool) -> OAppPeer {
        OAppPeer {
            id: "1_0xabc0000000000000000000000000000000000123_30101".to_string(),
            oapp_id: "1_0xabc0000000000000000000000000000000000123".to_string(),
            chain_id: 1,
            eid: 30101,
            peer: peer.to_string(),
            peer_oapp_id: None,
            from_packet_delivered: from_delivery,
            last_event_id: "1_1_0".to_string(),
            last_block: 1,
            last_timestamp: 1,
        }
    }

    #[test]
    fn test_peer_state_machine() {
        assert_eq!(peer_state(None), PeerState::NotConfigured);

        let auto = peer_record(
            "0x00000000000000000000000000000000000000000000000000000000000000aa",
            true,
        );
        assert_eq!(peer_state(Some(&auto)), PeerState::AutoDiscovered);

        let explicit = peer_record(
            "0x00000000000000000000000000000000000000000000000000000000000000aa",
            false,
        );
        assert_eq!(peer_state(Some(&explicit)), PeerState::ExplicitlySet);

        let blocked = peer_record(
            "0x0000000000000000000000000000000000000000000000000000000000000000",
            false,
        );
        assert_eq!(peer_state(Some(&blocked)), PeerState::ExplicitlyBlocked);
    }

    #[test]
    fn test_version_storage_keys() {
        let uln = VersionRecord::DefaultUlnConfig(DefaultUlnConfigVersion {
            event_id: "1_100_3".to_string(),
            chain_id: 1,
            eid: 30101,
            raw: UlnConfigInput::default(),
            block_number: 100,
            block_timestamp: 1,
            transaction_hash: "0xabc".to_string(),
        });
        assert_eq!(uln.storage_key(), "1_100_3_30101");

        let lib = VersionRecord::DefaultReceiveLibrary(DefaultReceiveLibraryVersion {
            event_id: "1_100_3".to_string(),
            chain_id: 1,
            eid: 30101,
            library: "0x1111111111111111111111111111111111111111".to_string(),
            block_number: 100,
            block_timestamp: 1,
            transaction_hash: "0xabc".to_string(),
        });
        assert_eq!(lib.storage_key(), "1_100_3");
    }
}
