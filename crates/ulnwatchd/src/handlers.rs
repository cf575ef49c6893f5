//! Event handlers
//!
//! One handler per event kind, all following the same contract:
//! validate, persist the raw state, re-resolve the affected route(s),
//! persist the derived rows, fan out. A malformed address skips the event
//! with a warning instead of aborting the batch; store errors propagate
//! to the chain task.

use crate::context::HandlerContext;
use crate::recompute;
use crate::snapshot;
use crate::storage::StorageError;
use thiserror::Error;
use tracing::{debug, warn};
use ulnwatch_core::entities::*;
use ulnwatch_core::events::{BlockCtx, DefaultUlnConfigParam, Event, RateLimitParam};
use ulnwatch_core::ids::{
    bytes32_to_address, is_zero_address, normalize_address, normalize_bytes32, Eid, OAppId,
    OAppRouteKey, RouteKey,
};
use ulnwatch_core::resolve::{
    resolve_effective_config, OverrideLibrary, RouteDefaults, RouteOverrides,
};
use ulnwatch_core::uln::{decode_uln_config, ConfigIssue};

/// Handler errors. Anything surfacing here is fatal for the chain task;
/// recoverable findings are logged and swallowed inside the handlers.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Dispatch one event. Runs to completion before the caller hands over
/// the next event of the same chain.
pub async fn apply_event(
    ctx: &HandlerContext,
    block: &BlockCtx,
    event: &Event,
) -> Result<(), HandlerError> {
    if ctx.preload {
        return Ok(());
    }
    match event {
        Event::DefaultReceiveLibrarySet { eid, new_lib } => {
            on_default_receive_library_set(ctx, block, *eid, new_lib).await
        }
        Event::DefaultUlnConfigsSet { configs } => {
            on_default_uln_configs_set(ctx, block, configs).await
        }
        Event::ReceiveLibrarySet {
            receiver,
            eid,
            new_lib,
        } => on_receive_library_set(ctx, block, receiver, *eid, new_lib).await,
        Event::UlnConfigSet { oapp, eid, config } => {
            on_uln_config_set(ctx, block, oapp, *eid, config).await
        }
        Event::PeerSet { oapp, eid, peer } => on_peer_set(ctx, block, oapp, *eid, peer).await,
        Event::RateLimiterSet { oapp, rate_limiter } => {
            on_rate_limiter_set(ctx, block, oapp, rate_limiter).await
        }
        Event::RateLimitsChanged { oapp, limits } => {
            on_rate_limits_changed(ctx, block, oapp, limits).await
        }
        Event::PacketDelivered {
            receiver,
            src_eid,
            sender,
            nonce,
        } => snapshot::on_packet_delivered(ctx, block, receiver, *src_eid, sender, *nonce).await,
    }
}

fn warn_invalid_address(event_kind: &str, field: &'static str, value: &str, block: &BlockCtx) {
    warn!(
        kind = "invalid_input",
        event = event_kind,
        field,
        value,
        chain_id = block.chain_id,
        event_id = %block.event_id(),
        tx_hash = %block.transaction_hash,
        "address does not normalize; skipping event"
    );
}

/// Log decoder findings with uniform context fields.
pub(crate) fn log_config_issues(
    issues: &[ConfigIssue],
    block: &BlockCtx,
    eid: Eid,
    oapp_id: Option<&str>,
) {
    for issue in issues {
        if issue.is_debug() {
            debug!(
                kind = issue.kind(),
                chain_id = block.chain_id,
                eid,
                oapp_id,
                event_id = %block.event_id(),
                tx_hash = %block.transaction_hash,
                "{issue}"
            );
        } else {
            warn!(
                kind = issue.kind(),
                chain_id = block.chain_id,
                eid,
                oapp_id,
                event_id = %block.event_id(),
                tx_hash = %block.transaction_hash,
                "{issue}"
            );
        }
    }
}

/// Re-resolve one application route from fresh reads and persist the
/// derived row. The only writer of `OAppSecurityConfig`.
pub(crate) async fn resolve_and_store(
    ctx: &HandlerContext,
    key: &OAppRouteKey,
    block: &BlockCtx,
) -> Result<OAppSecurityConfig, HandlerError> {
    let route = RouteKey::new(key.oapp.chain_id, key.src_eid).to_string();
    let key_str = key.to_string();

    let default_lib = ctx.get_default_library(&route).await?;
    let default_uln = ctx.get_default_uln_config(&route).await?;
    let override_lib = ctx.get_oapp_library(&key_str).await?;
    let override_uln = ctx.get_oapp_uln_config(&key_str).await?;
    let peer = ctx.get_oapp_peer(&key_str).await?;

    let defaults = RouteDefaults {
        library: default_lib.as_ref().map(|r| r.library.clone()),
        library_version: default_lib.as_ref().map(|r| r.last_event_id.clone()),
        uln: default_uln.as_ref().map(|r| r.config.clone()),
        // DefaultUlnConfigVersion rows are keyed per eid
        uln_version: default_uln
            .as_ref()
            .map(|r| format!("{}_{}", r.last_event_id, r.eid)),
    };
    let overrides = RouteOverrides {
        library: override_lib.as_ref().map(|r| OverrideLibrary {
            address: r.library.clone(),
        }),
        library_version: override_lib.as_ref().map(|r| r.last_event_id.clone()),
        uln: override_uln.as_ref().map(|r| r.config.clone()),
        uln_version: override_uln.as_ref().map(|r| r.last_event_id.clone()),
    };

    let resolution =
        resolve_effective_config(key.oapp.chain_id, &defaults, &overrides, &ctx.registry);
    for issue in &resolution.issues {
        warn!(
            kind = issue.kind(),
            chain_id = key.oapp.chain_id,
            eid = key.src_eid,
            oapp_id = %key.oapp,
            event_id = %block.event_id(),
            tx_hash = %block.transaction_hash,
            "{issue}"
        );
    }

    let row = OAppSecurityConfig {
        id: key_str,
        oapp_id: key.oapp.to_string(),
        chain_id: key.oapp.chain_id,
        eid: key.src_eid,
        resolved: resolution.config,
        peer: peer.as_ref().map(|p| p.peer.clone()),
        peer_state: peer_state(peer.as_ref()),
        peer_oapp_id: peer.as_ref().and_then(|p| p.peer_oapp_id.clone()),
        last_computed_block: block.block_number,
        last_computed_timestamp: block.block_timestamp,
        last_computed_event_id: block.event_id().to_string(),
        last_computed_tx_hash: block.transaction_hash.clone(),
    };
    ctx.put_security_config(&row).await?;
    Ok(row)
}

async fn on_default_receive_library_set(
    ctx: &HandlerContext,
    block: &BlockCtx,
    eid: Eid,
    new_lib: &str,
) -> Result<(), HandlerError> {
    let library = match normalize_address(new_lib) {
        Ok(l) => l,
        Err(_) => {
            warn_invalid_address("DefaultReceiveLibrarySet", "new_lib", new_lib, block);
            return Ok(());
        }
    };
    if is_zero_address(&library) {
        warn!(
            kind = "zero_default_library",
            chain_id = block.chain_id,
            eid,
            event_id = %block.event_id(),
            tx_hash = %block.transaction_hash,
            "default receive library set to zero; skipping"
        );
        return Ok(());
    }

    let event_id = block.event_id().to_string();
    let route = RouteKey::new(block.chain_id, eid);
    ctx.put_default_library(&DefaultReceiveLibrary {
        id: route.to_string(),
        chain_id: block.chain_id,
        eid,
        library: library.clone(),
        last_event_id: event_id.clone(),
        last_block: block.block_number,
        last_timestamp: block.block_timestamp,
    })
    .await?;
    ctx.append_version(&VersionRecord::DefaultReceiveLibrary(
        DefaultReceiveLibraryVersion {
            event_id,
            chain_id: block.chain_id,
            eid,
            library,
            block_number: block.block_number,
            block_timestamp: block.block_timestamp,
            transaction_hash: block.transaction_hash.clone(),
        },
    ))
    .await?;

    recompute::recompute_route_scope(ctx, block, eid).await
}

async fn on_default_uln_configs_set(
    ctx: &HandlerContext,
    block: &BlockCtx,
    configs: &[DefaultUlnConfigParam],
) -> Result<(), HandlerError> {
    let event_id = block.event_id().to_string();
    for param in configs {
        let (state, issues) = decode_uln_config(&param.config);
        log_config_issues(&issues, block, param.eid, None);

        let route = RouteKey::new(block.chain_id, param.eid);
        ctx.put_default_uln_config(&DefaultUlnConfig {
            id: route.to_string(),
            chain_id: block.chain_id,
            eid: param.eid,
            config: state,
            last_event_id: event_id.clone(),
            last_block: block.block_number,
            last_timestamp: block.block_timestamp,
        })
        .await?;
        ctx.append_version(&VersionRecord::DefaultUlnConfig(DefaultUlnConfigVersion {
            event_id: event_id.clone(),
            chain_id: block.chain_id,
            eid: param.eid,
            raw: param.config.clone(),
            block_number: block.block_number,
            block_timestamp: block.block_timestamp,
            transaction_hash: block.transaction_hash.clone(),
        }))
        .await?;

        recompute::recompute_route_scope(ctx, block, param.eid).await?;
    }
    Ok(())
}

async fn on_receive_library_set(
    ctx: &HandlerContext,
    block: &BlockCtx,
    receiver: &str,
    eid: Eid,
    new_lib: &str,
) -> Result<(), HandlerError> {
    let oapp = match OAppId::new(block.chain_id, receiver) {
        Ok(o) => o,
        Err(_) => {
            warn_invalid_address("ReceiveLibrarySet", "receiver", receiver, block);
            return Ok(());
        }
    };
    // An explicit zero means "unset": the row exists but falls back.
    let library = match normalize_address(new_lib) {
        Ok(l) if is_zero_address(&l) => None,
        Ok(l) => Some(l),
        Err(_) => {
            warn_invalid_address("ReceiveLibrarySet", "new_lib", new_lib, block);
            return Ok(());
        }
    };

    ctx.get_or_create_oapp_stats(&oapp).await?;
    let key = OAppRouteKey::new(oapp, eid);
    let event_id = block.event_id().to_string();
    ctx.put_oapp_library(&OAppReceiveLibrary {
        id: key.to_string(),
        oapp_id: key.oapp.to_string(),
        chain_id: block.chain_id,
        eid,
        library: library.clone(),
        last_event_id: event_id.clone(),
        last_block: block.block_number,
        last_timestamp: block.block_timestamp,
    })
    .await?;
    ctx.append_version(&VersionRecord::OAppReceiveLibrary(
        OAppReceiveLibraryVersion {
            event_id,
            oapp_route_key: key.to_string(),
            library,
            block_number: block.block_number,
            block_timestamp: block.block_timestamp,
            transaction_hash: block.transaction_hash.clone(),
        },
    ))
    .await?;

    resolve_and_store(ctx, &key, block).await?;
    Ok(())
}

async fn on_uln_config_set(
    ctx: &HandlerContext,
    block: &BlockCtx,
    oapp: &str,
    eid: Eid,
    config: &ulnwatch_core::uln::UlnConfigInput,
) -> Result<(), HandlerError> {
    let oapp = match OAppId::new(block.chain_id, oapp) {
        Ok(o) => o,
        Err(_) => {
            warn_invalid_address("UlnConfigSet", "oapp", oapp, block);
            return Ok(());
        }
    };
    ctx.get_or_create_oapp_stats(&oapp).await?;

    let key = OAppRouteKey::new(oapp, eid);
    let oapp_id = key.oapp.to_string();
    let (state, issues) = decode_uln_config(config);
    log_config_issues(&issues, block, eid, Some(oapp_id.as_str()));

    let event_id = block.event_id().to_string();
    ctx.put_oapp_uln_config(&OAppUlnConfig {
        id: key.to_string(),
        oapp_id: key.oapp.to_string(),
        chain_id: block.chain_id,
        eid,
        config: state,
        last_event_id: event_id.clone(),
        last_block: block.block_number,
        last_timestamp: block.block_timestamp,
    })
    .await?;
    ctx.append_version(&VersionRecord::OAppUlnConfig(OAppUlnConfigVersion {
        event_id,
        oapp_route_key: key.to_string(),
        raw: config.clone(),
        block_number: block.block_number,
        block_timestamp: block.block_timestamp,
        transaction_hash: block.transaction_hash.clone(),
    }))
    .await?;

    resolve_and_store(ctx, &key, block).await?;
    Ok(())
}

/// Map a 32-byte peer onto its counterpart application id when the
/// catalog knows which chain hosts the source eid.
pub(crate) fn derive_peer_oapp_id(
    ctx: &HandlerContext,
    eid: Eid,
    peer: &str,
) -> Option<String> {
    let address = bytes32_to_address(peer).ok().flatten()?;
    let chain_id = ctx.catalog.chain_for_eid(eid)?;
    Some(
        OAppId {
            chain_id,
            address,
        }
        .to_string(),
    )
}

async fn on_peer_set(
    ctx: &HandlerContext,
    block: &BlockCtx,
    oapp: &str,
    eid: Eid,
    peer: &str,
) -> Result<(), HandlerError> {
    let oapp = match OAppId::new(block.chain_id, oapp) {
        Ok(o) => o,
        Err(_) => {
            warn_invalid_address("PeerSet", "oapp", oapp, block);
            return Ok(());
        }
    };
    let peer = match normalize_bytes32(peer) {
        Ok(p) => p,
        Err(_) => {
            warn_invalid_address("PeerSet", "peer", peer, block);
            return Ok(());
        }
    };

    ctx.get_or_create_oapp_stats(&oapp).await?;
    let key = OAppRouteKey::new(oapp, eid);
    let event_id = block.event_id().to_string();
    ctx.put_oapp_peer(&OAppPeer {
        id: key.to_string(),
        oapp_id: key.oapp.to_string(),
        chain_id: block.chain_id,
        eid,
        peer: peer.clone(),
        peer_oapp_id: derive_peer_oapp_id(ctx, eid, &peer),
        from_packet_delivered: false,
        last_event_id: event_id.clone(),
        last_block: block.block_number,
        last_timestamp: block.block_timestamp,
    })
    .await?;
    ctx.append_version(&VersionRecord::OAppPeer(OAppPeerVersion {
        event_id,
        oapp_route_key: key.to_string(),
        peer,
        from_packet_delivered: false,
        block_number: block.block_number,
        block_timestamp: block.block_timestamp,
        transaction_hash: block.transaction_hash.clone(),
    }))
    .await?;

    // Recompute so the derived row reflects the new peer fields.
    resolve_and_store(ctx, &key, block).await?;
    Ok(())
}

async fn on_rate_limiter_set(
    ctx: &HandlerContext,
    block: &BlockCtx,
    oapp: &str,
    rate_limiter: &str,
) -> Result<(), HandlerError> {
    let oapp = match OAppId::new(block.chain_id, oapp) {
        Ok(o) => o,
        Err(_) => {
            warn_invalid_address("RateLimiterSet", "oapp", oapp, block);
            return Ok(());
        }
    };
    let rate_limiter = match normalize_address(rate_limiter) {
        Ok(r) => r,
        Err(_) => {
            warn_invalid_address("RateLimiterSet", "rate_limiter", rate_limiter, block);
            return Ok(());
        }
    };

    ctx.get_or_create_oapp_stats(&oapp).await?;
    let event_id = block.event_id().to_string();
    ctx.put_oapp_rate_limiter(&OAppRateLimiter {
        id: oapp.to_string(),
        chain_id: block.chain_id,
        rate_limiter: rate_limiter.clone(),
        last_event_id: event_id.clone(),
        last_block: block.block_number,
        last_timestamp: block.block_timestamp,
    })
    .await?;
    ctx.append_version(&VersionRecord::OAppRateLimiter(OAppRateLimiterVersion {
        event_id,
        oapp_id: oapp.to_string(),
        rate_limiter,
        block_number: block.block_number,
        block_timestamp: block.block_timestamp,
        transaction_hash: block.transaction_hash.clone(),
    }))
    .await?;
    Ok(())
}

async fn on_rate_limits_changed(
    ctx: &HandlerContext,
    block: &BlockCtx,
    oapp: &str,
    limits: &[RateLimitParam],
) -> Result<(), HandlerError> {
    let oapp = match OAppId::new(block.chain_id, oapp) {
        Ok(o) => o,
        Err(_) => {
            warn_invalid_address("RateLimitsChanged", "oapp", oapp, block);
            return Ok(());
        }
    };
    ctx.get_or_create_oapp_stats(&oapp).await?;

    let event_id = block.event_id().to_string();
    for limit in limits {
        ctx.put_oapp_rate_limit(&OAppRateLimit {
            id: format!("{}_{}", oapp, limit.dst_eid),
            oapp_id: oapp.to_string(),
            dst_eid: limit.dst_eid,
            limit: limit.limit,
            window: limit.window,
            last_event_id: event_id.clone(),
            last_block: block.block_number,
            last_timestamp: block.block_timestamp,
        })
        .await?;
    }
    ctx.append_version(&VersionRecord::OAppRateLimit(OAppRateLimitVersion {
        event_id,
        oapp_id: oapp.to_string(),
        limits: limits.to_vec(),
        block_number: block.block_number,
        block_timestamp: block.block_timestamp,
        transaction_hash: block.transaction_hash.clone(),
    }))
    .await?;
    Ok(())
}
