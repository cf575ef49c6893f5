//! Event-journal ingestion
//!
//! Stand-in for the host indexing runtime: reads an NDJSON journal of
//! event envelopes, partitions it per chain, and drives one task per
//! chain that applies events strictly in journal order. Each handler runs
//! to completion before the next event of the same chain is dispatched;
//! chains proceed independently of each other.

use crate::context::HandlerContext;
use crate::handlers;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use ulnwatch_core::events::{BlockCtx, Event};
use ulnwatch_core::ids::ChainId;

/// Ingestion errors
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("chain task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// One journal line: block coordinates plus the event payload.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventEnvelope {
    pub chain_id: ChainId,
    pub block_number: u64,
    pub block_timestamp: u64,
    pub log_index: u32,
    pub transaction_hash: String,
    #[serde(flatten)]
    pub event: Event,
}

impl EventEnvelope {
    pub fn block_ctx(&self) -> BlockCtx {
        BlockCtx {
            chain_id: self.chain_id,
            block_number: self.block_number,
            block_timestamp: self.block_timestamp,
            log_index: self.log_index,
            transaction_hash: self.transaction_hash.clone(),
        }
    }
}

/// Counters reported after a run.
#[derive(Clone, Debug, Default)]
pub struct IngestStats {
    pub applied: u64,
    pub parse_skipped: u64,
    pub failed_chains: u64,
}

/// Ingest a journal file to completion.
pub async fn run_journal(
    ctx: Arc<HandlerContext>,
    path: impl AsRef<Path>,
) -> Result<IngestStats, IngestError> {
    let raw = tokio::fs::read_to_string(path).await?;
    let mut stats = IngestStats::default();

    let mut per_chain: BTreeMap<ChainId, Vec<EventEnvelope>> = BTreeMap::new();
    for (index, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<EventEnvelope>(line) {
            Ok(envelope) => per_chain
                .entry(envelope.chain_id)
                .or_default()
                .push(envelope),
            Err(e) => {
                warn!(
                    kind = "invalid_input",
                    line = index + 1,
                    error = %e,
                    "journal line does not parse; skipping"
                );
                stats.parse_skipped += 1;
            }
        }
    }

    let chain_count = per_chain.len();
    let shared = Arc::new(Mutex::new(stats));
    let mut tasks = JoinSet::new();
    for (chain_id, envelopes) in per_chain {
        let ctx = ctx.clone();
        let shared = shared.clone();
        tasks.spawn(async move {
            run_chain(ctx, chain_id, envelopes, shared).await;
        });
    }
    while let Some(result) = tasks.join_next().await {
        result?;
    }

    let stats = shared.lock().clone();
    info!(
        chains = chain_count,
        applied = stats.applied,
        parse_skipped = stats.parse_skipped,
        failed_chains = stats.failed_chains,
        "journal ingestion finished"
    );
    Ok(stats)
}

/// Apply one chain's events in order. A handler error is fatal for this
/// chain only.
async fn run_chain(
    ctx: Arc<HandlerContext>,
    chain_id: ChainId,
    envelopes: Vec<EventEnvelope>,
    stats: Arc<Mutex<IngestStats>>,
) {
    let mut last: Option<(u64, u32)> = None;
    for envelope in envelopes {
        let coord = (envelope.block_number, envelope.log_index);
        if let Some(prev) = last {
            if coord < prev {
                warn!(
                    chain_id,
                    block = coord.0,
                    log_index = coord.1,
                    "journal order regressed; applying as delivered"
                );
            }
        }
        last = Some(coord);

        let block = envelope.block_ctx();
        match handlers::apply_event(&ctx, &block, &envelope.event).await {
            Ok(()) => stats.lock().applied += 1,
            Err(e) => {
                error!(
                    kind = "fatal",
                    chain_id,
                    event = envelope.event.kind(),
                    event_id = %block.event_id(),
                    error = %e,
                    "handler aborted; stopping chain task"
                );
                stats.lock().failed_chains += 1;
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ChainCatalog;
    use crate::storage::Storage;
    use std::io::Write;
    use tempfile::tempdir;
    use ulnwatch_core::classifier::LibraryRegistry;

    const TRACKED_LIB: &str = "0x1111111111111111111111111111111111111111";
    const OAPP: &str = "0xabc0000000000000000000000000000000000123";

    fn test_ctx(dir: &std::path::Path) -> Arc<HandlerContext> {
        let storage = Arc::new(Storage::open(dir.join("db")).unwrap());
        let mut registry = LibraryRegistry::empty();
        registry.set_tracked(1, TRACKED_LIB).unwrap();
        Arc::new(HandlerContext::new(
            storage,
            registry,
            Arc::new(ChainCatalog::empty()),
        ))
    }

    #[tokio::test]
    async fn test_journal_round_trip() {
        let dir = tempdir().unwrap();
        let journal_path = dir.path().join("journal.ndjson");
        let mut file = std::fs::File::create(&journal_path).unwrap();

        let lines = [
            format!(
                r#"{{"chain_id":1,"block_number":100,"block_timestamp":1700000000,"log_index":0,"transaction_hash":"0x01","kind":"DefaultReceiveLibrarySet","eid":30101,"new_lib":"{TRACKED_LIB}"}}"#
            ),
            "not json at all".to_string(),
            format!(
                r#"{{"chain_id":1,"block_number":101,"block_timestamp":1700000012,"log_index":3,"transaction_hash":"0x02","kind":"ReceiveLibrarySet","receiver":"{OAPP}","eid":30101,"new_lib":"{TRACKED_LIB}"}}"#
            ),
        ];
        for line in &lines {
            writeln!(file, "{line}").unwrap();
        }
        drop(file);

        let ctx = test_ctx(dir.path());
        let stats = run_journal(ctx.clone(), &journal_path).await.unwrap();
        assert_eq!(stats.applied, 2);
        assert_eq!(stats.parse_skipped, 1);
        assert_eq!(stats.failed_chains, 0);

        // The override handler resolved the route
        let config = ctx
            .storage()
            .get_security_config(&format!("1_{OAPP}_30101"))
            .unwrap()
            .unwrap();
        assert_eq!(config.resolved.receive_library.as_deref(), Some(TRACKED_LIB));
    }

    #[test]
    fn test_envelope_round_trip() {
        let envelope = EventEnvelope {
            chain_id: 1,
            block_number: 100,
            block_timestamp: 1_700_000_000,
            log_index: 2,
            transaction_hash: "0xabc".to_string(),
            event: Event::DefaultReceiveLibrarySet {
                eid: 30101,
                new_lib: TRACKED_LIB.to_string(),
            },
        };
        let json = serde_json::to_string(&envelope).unwrap();
        assert_eq!(
            serde_json::from_str::<EventEnvelope>(&json).unwrap(),
            envelope
        );
    }
}
