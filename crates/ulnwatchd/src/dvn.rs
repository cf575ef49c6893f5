//! DVN directory
//!
//! Keeps a display-name row for every verifier address referenced by any
//! resolved configuration. Names come from the bundled catalog when
//! known; a newer name replaces an older one.

use crate::context::HandlerContext;
use crate::handlers::HandlerError;
use tracing::debug;
use ulnwatch_core::entities::DvnMetadata;
use ulnwatch_core::ids::{is_zero_address, ChainId};

/// Ensure a metadata row exists for every given address. Zero addresses
/// are skipped; addresses arrive canonical from the resolver.
pub async fn ensure_dvn_metadata<'a>(
    ctx: &HandlerContext,
    chain_id: ChainId,
    addresses: impl Iterator<Item = &'a String>,
) -> Result<(), HandlerError> {
    for address in addresses {
        if is_zero_address(address) {
            continue;
        }
        let key = format!("{chain_id}_{address}");
        let name = ctx
            .catalog
            .dvn_name(chain_id, address)
            .unwrap_or(address.as_str())
            .to_string();

        match ctx.get_dvn_metadata(&key).await? {
            Some(existing) if existing.name == name => {}
            Some(mut existing) => {
                debug!(
                    chain_id,
                    address = %address,
                    old = %existing.name,
                    new = %name,
                    "updating DVN display name"
                );
                existing.name = name;
                ctx.put_dvn_metadata(&existing).await?;
            }
            None => {
                ctx.put_dvn_metadata(&DvnMetadata {
                    id: key,
                    chain_id,
                    address: address.clone(),
                    name,
                })
                .await?;
            }
        }
    }
    Ok(())
}
