//! Default-scope recomputation
//!
//! When a default library or default ULN config changes for
//! `(chainId, eid)`, every derived security config on that route must be
//! re-resolved. Runs inside the triggering handler, so the next event on
//! the chain observes fully cascaded state.

use crate::context::HandlerContext;
use crate::handlers::{resolve_and_store, HandlerError};
use tracing::{debug, warn};
use ulnwatch_core::events::BlockCtx;
use ulnwatch_core::ids::{Eid, OAppRouteKey};

/// Re-resolve every security config in scope for `(block.chain_id, eid)`.
///
/// The chain's rows are enumerated by key prefix and filtered by eid in
/// memory; fleets are small enough per chain for that to hold. A failure
/// on a single row is logged and skipped so one bad route cannot block
/// updates for the others; a store failure spanning the whole scope is
/// fatal.
pub async fn recompute_route_scope(
    ctx: &HandlerContext,
    block: &BlockCtx,
    eid: Eid,
) -> Result<(), HandlerError> {
    let rows = ctx.security_configs_for_chain(block.chain_id).await?;
    let mut recomputed = 0usize;

    for row in rows.into_iter().filter(|r| r.eid == eid) {
        let key: OAppRouteKey = match row.id.parse() {
            Ok(k) => k,
            Err(e) => {
                warn!(
                    kind = "merge_failure",
                    chain_id = block.chain_id,
                    eid,
                    oapp_id = %row.oapp_id,
                    row_id = %row.id,
                    error = %e,
                    "security config row key does not parse; skipping"
                );
                continue;
            }
        };
        if let Err(e) = resolve_and_store(ctx, &key, block).await {
            warn!(
                kind = "merge_failure",
                chain_id = block.chain_id,
                eid,
                oapp_id = %row.oapp_id,
                event_id = %block.event_id(),
                error = %e,
                "route recomputation failed; skipping row"
            );
            continue;
        }
        recomputed += 1;
    }

    if recomputed > 0 {
        debug!(
            chain_id = block.chain_id,
            eid,
            recomputed,
            event_id = %block.event_id(),
            "default change cascaded"
        );
    }
    Ok(())
}
