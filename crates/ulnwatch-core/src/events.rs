//! On-chain event model
//!
//! One tagged union covers every event kind the projection consumes; the
//! daemon dispatches on it with a single function. `BlockCtx` carries the
//! per-log coordinates every handler needs.

use crate::ids::{ChainId, Eid, EventId};
use crate::uln::UlnConfigInput;
use serde::{Deserialize, Serialize};

/// Coordinates and context of one delivered log.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockCtx {
    pub chain_id: ChainId,
    pub block_number: u64,
    pub block_timestamp: u64,
    pub log_index: u32,
    pub transaction_hash: String,
}

impl BlockCtx {
    pub fn event_id(&self) -> EventId {
        EventId::new(self.chain_id, self.block_number, self.log_index)
    }
}

/// One `(eid, config)` tuple of a DefaultUlnConfigsSet event.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DefaultUlnConfigParam {
    pub eid: Eid,
    pub config: UlnConfigInput,
}

/// One per-destination rate limit of a RateLimitsChanged event.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RateLimitParam {
    pub dst_eid: Eid,
    pub limit: u64,
    pub window: u64,
}

/// Union of all consumed event kinds.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind")]
pub enum Event {
    /// Endpoint set the default receive library for an eid.
    DefaultReceiveLibrarySet { eid: Eid, new_lib: String },
    /// Endpoint set default ULN configs; one event may cover many eids.
    DefaultUlnConfigsSet { configs: Vec<DefaultUlnConfigParam> },
    /// An application overrode its receive library for one route.
    ReceiveLibrarySet {
        receiver: String,
        eid: Eid,
        new_lib: String,
    },
    /// An application overrode its ULN config for one route.
    UlnConfigSet {
        oapp: String,
        eid: Eid,
        config: UlnConfigInput,
    },
    /// An application declared its 32-byte peer on a remote endpoint.
    PeerSet { oapp: String, eid: Eid, peer: String },
    /// An application attached a rate limiter contract.
    RateLimiterSet { oapp: String, rate_limiter: String },
    /// Per-destination rate limits changed.
    RateLimitsChanged {
        oapp: String,
        limits: Vec<RateLimitParam>,
    },
    /// An inbound packet was delivered to a receiver.
    PacketDelivered {
        receiver: String,
        src_eid: Eid,
        sender: String,
        nonce: u64,
    },
}

impl Event {
    /// Stable kind name for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::DefaultReceiveLibrarySet { .. } => "DefaultReceiveLibrarySet",
            Event::DefaultUlnConfigsSet { .. } => "DefaultUlnConfigsSet",
            Event::ReceiveLibrarySet { .. } => "ReceiveLibrarySet",
            Event::UlnConfigSet { .. } => "UlnConfigSet",
            Event::PeerSet { .. } => "PeerSet",
            Event::RateLimiterSet { .. } => "RateLimiterSet",
            Event::RateLimitsChanged { .. } => "RateLimitsChanged",
            Event::PacketDelivered { .. } => "PacketDelivered",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_id_from_ctx() {
        let ctx = BlockCtx {
            chain_id: 1,
            block_number: 100,
            block_timestamp: 1_700_000_000,
            log_index: 7,
            transaction_hash: "0xabc".to_string(),
        };
        assert_eq!(ctx.event_id().to_string(), "1_100_7");
    }

    #[test]
    fn test_event_serde_round_trip() {
        let event = Event::PeerSet {
            oapp: "0xabc0000000000000000000000000000000000123".to_string(),
            eid: 30101,
            peer: "0x00000000000000000000000000000000000000000000000000000000000000aa"
                .to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"kind\":\"PeerSet\""));
        assert_eq!(serde_json::from_str::<Event>(&json).unwrap(), event);
    }
}
