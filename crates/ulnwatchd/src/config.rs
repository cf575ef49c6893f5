//! Configuration for ulnwatchd

use clap::Parser;
use std::path::PathBuf;
use ulnwatch_core::classifier::LibraryRegistry;
use ulnwatch_core::ids::ChainId;

/// ulnwatchd - security-configuration indexing daemon
#[derive(Parser, Debug, Clone)]
#[command(name = "ulnwatchd")]
#[command(about = "Indexes receive-side security configuration of cross-chain message routes")]
pub struct Config {
    /// Data directory for persistent storage
    #[arg(short, long, default_value = "./data/ulnwatchd")]
    pub data_dir: PathBuf,

    /// NDJSON event journal to ingest
    #[arg(short, long)]
    pub journal: PathBuf,

    /// Chain & DVN catalog file (JSON)
    #[arg(long, env = "ULNWATCH_CATALOG")]
    pub catalog: Option<PathBuf>,

    /// Tracked receive-library overrides as `chainId=address` pairs
    #[arg(long, value_delimiter = ',')]
    pub tracked_lib: Vec<String>,

    /// Dry pass: dispatch every event without side effects
    #[arg(long)]
    pub preload: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Log format (json or pretty)
    #[arg(long, default_value = "pretty")]
    pub log_format: String,
}

impl Config {
    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.journal.exists() {
            anyhow::bail!("journal file {} does not exist", self.journal.display());
        }
        if !matches!(self.log_format.as_str(), "json" | "pretty") {
            anyhow::bail!("log format must be json or pretty");
        }
        // Surfaces malformed tracked-library overrides before startup
        self.registry()?;
        Ok(())
    }

    /// The tracked-library registry: the built-in deployment table plus
    /// any per-chain overrides from the command line.
    pub fn registry(&self) -> anyhow::Result<LibraryRegistry> {
        let mut registry = LibraryRegistry::builtin();
        for entry in &self.tracked_lib {
            let (chain, address) = entry
                .split_once('=')
                .ok_or_else(|| anyhow::anyhow!("tracked-lib entry `{entry}` is not chainId=address"))?;
            let chain_id: ChainId = chain
                .parse()
                .map_err(|_| anyhow::anyhow!("tracked-lib chain id `{chain}` is not numeric"))?;
            registry
                .set_tracked(chain_id, address)
                .map_err(|e| anyhow::anyhow!("tracked-lib address for chain {chain_id}: {e}"))?;
        }
        Ok(registry)
    }
}
