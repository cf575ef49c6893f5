//! Packet delivery snapshots
//!
//! Every delivered packet gets a fresh resolution of its route and an
//! embedded copy of it, so the packet's security posture never changes
//! after the fact. Also maintains the per-application and per-route
//! counters and the peer auto-discovery state machine.

use crate::context::HandlerContext;
use crate::dvn;
use crate::handlers::{derive_peer_oapp_id, resolve_and_store, HandlerError};
use tracing::{debug, warn};
use ulnwatch_core::entities::*;
use ulnwatch_core::events::BlockCtx;
use ulnwatch_core::ids::{is_zero_bytes32, normalize_bytes32, Eid, OAppId, OAppRouteKey};

pub async fn on_packet_delivered(
    ctx: &HandlerContext,
    block: &BlockCtx,
    receiver: &str,
    src_eid: Eid,
    sender: &str,
    nonce: u64,
) -> Result<(), HandlerError> {
    let oapp = match OAppId::new(block.chain_id, receiver) {
        Ok(o) => o,
        Err(_) => {
            warn!(
                kind = "invalid_input",
                event = "PacketDelivered",
                field = "receiver",
                value = receiver,
                chain_id = block.chain_id,
                event_id = %block.event_id(),
                tx_hash = %block.transaction_hash,
                "address does not normalize; skipping event"
            );
            return Ok(());
        }
    };
    let sender = match normalize_bytes32(sender) {
        Ok(s) => s,
        Err(_) => {
            warn!(
                kind = "invalid_input",
                event = "PacketDelivered",
                field = "sender",
                value = sender,
                chain_id = block.chain_id,
                event_id = %block.event_id(),
                tx_hash = %block.transaction_hash,
                "sender does not normalize; skipping event"
            );
            return Ok(());
        }
    };

    let event_id = block.event_id().to_string();
    // Replay of an already-snapshotted delivery must not double count.
    if ctx.has_packet(&event_id).await? {
        debug!(
            chain_id = block.chain_id,
            event_id = %event_id,
            "packet already recorded; replay is a no-op"
        );
        return Ok(());
    }

    let key = OAppRouteKey::new(oapp.clone(), src_eid);
    let key_str = key.to_string();
    let oapp_id = oapp.to_string();

    // 1. Application counters.
    let mut stats = ctx.get_or_create_oapp_stats(&oapp).await?;
    stats.total_packets_received += 1;
    stats.last_packet_block = block.block_number;
    stats.last_packet_timestamp = block.block_timestamp;
    ctx.put_oapp_stats(&stats).await?;

    // 2. Peer state machine: synthesize on first delivery, otherwise
    // check the declared peer against the observed sender.
    match ctx.get_oapp_peer(&key_str).await? {
        None => {
            ctx.put_oapp_peer(&OAppPeer {
                id: key_str.clone(),
                oapp_id: oapp_id.clone(),
                chain_id: block.chain_id,
                eid: src_eid,
                peer: sender.clone(),
                peer_oapp_id: derive_peer_oapp_id(ctx, src_eid, &sender),
                from_packet_delivered: true,
                last_event_id: event_id.clone(),
                last_block: block.block_number,
                last_timestamp: block.block_timestamp,
            })
            .await?;
            ctx.append_version(&VersionRecord::OAppPeer(OAppPeerVersion {
                event_id: event_id.clone(),
                oapp_route_key: key_str.clone(),
                peer: sender.clone(),
                from_packet_delivered: true,
                block_number: block.block_number,
                block_timestamp: block.block_timestamp,
                transaction_hash: block.transaction_hash.clone(),
            }))
            .await?;
        }
        Some(peer) => {
            if !peer.from_packet_delivered && is_zero_bytes32(&peer.peer) {
                warn!(
                    kind = "blocked_but_delivered",
                    chain_id = block.chain_id,
                    eid = src_eid,
                    oapp_id = %oapp_id,
                    event_id = %event_id,
                    tx_hash = %block.transaction_hash,
                    "route explicitly blocked but packet delivered"
                );
            } else if peer.peer != sender {
                warn!(
                    kind = "peer_mismatch",
                    chain_id = block.chain_id,
                    eid = src_eid,
                    oapp_id = %oapp_id,
                    event_id = %event_id,
                    tx_hash = %block.transaction_hash,
                    expected = %peer.peer,
                    observed = %sender,
                    "sender does not match configured peer"
                );
            }
        }
    }

    // 3. Fresh resolution for this route; the derived row is persisted
    // and then embedded whole into the packet record.
    let security = resolve_and_store(ctx, &key, block).await?;

    ctx.put_packet(&PacketDelivered {
        id: event_id.clone(),
        oapp_id: oapp_id.clone(),
        oapp_route_key: key_str.clone(),
        chain_id: block.chain_id,
        src_eid,
        sender,
        nonce,
        block_number: block.block_number,
        block_timestamp: block.block_timestamp,
        transaction_hash: block.transaction_hash.clone(),
        security: security.clone(),
    })
    .await?;

    // 4. Route counters point at the config the packet was judged by.
    let mut route_stats = match ctx.get_route_stats(&key_str).await? {
        Some(row) => row,
        None => OAppRouteStats {
            id: key_str.clone(),
            oapp_id: oapp_id.clone(),
            src_eid,
            packets_received: 0,
            last_security_config_id: None,
        },
    };
    route_stats.packets_received += 1;
    route_stats.last_security_config_id = Some(security.id.clone());
    ctx.put_route_stats(&route_stats).await?;

    // 5. Every verifier referenced by the resolution gets a catalog row.
    dvn::ensure_dvn_metadata(
        ctx,
        block.chain_id,
        security
            .resolved
            .required_dvns
            .iter()
            .chain(security.resolved.optional_dvns.iter()),
    )
    .await?;

    Ok(())
}
