//! Address normalization and composite identifiers
//!
//! Every entity key in the store is an underscore-delimited string composed
//! from these types, so all of them round-trip through `Display`/`FromStr`.
//! Address canonicalization is the identity rule for the whole system:
//! case differences and left-padding never change identity.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Numeric identifier of a source/destination chain.
pub type ChainId = u64;

/// Endpoint identifier: a logical address space within the protocol.
/// One chain may host several.
pub type Eid = u32;

/// Canonical form of the 20-byte zero address.
pub const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

/// Canonical form of the 32-byte zero value.
pub const ZERO_BYTES32: &str =
    "0x0000000000000000000000000000000000000000000000000000000000000000";

fn strip_hex_prefix(input: &str) -> &str {
    input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
        .unwrap_or(input)
}

/// Normalize a hex string to exactly `width` lowercase hex characters.
///
/// Shorter inputs are left-padded with zeros. Longer inputs are accepted
/// only when the excess leading run is all zeros.
fn normalize_hex(input: &str, width: usize) -> Option<String> {
    let hex_part = strip_hex_prefix(input);
    if hex_part.is_empty() || !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let trimmed = if hex_part.len() > width {
        let (lead, rest) = hex_part.split_at(hex_part.len() - width);
        if !lead.chars().all(|c| c == '0') {
            return None;
        }
        rest
    } else {
        hex_part
    };
    let mut out = String::with_capacity(width + 2);
    out.push_str("0x");
    for _ in trimmed.len()..width {
        out.push('0');
    }
    out.push_str(&trimmed.to_ascii_lowercase());
    Some(out)
}

/// Canonicalize an EVM address: lowercase hex, `0x` prefix, 40 hex chars.
///
/// Accepts unprefixed input, pads short input with leading zeros, and
/// tolerates longer input whose excess leading run is zeros (a left-padded
/// topic word). Anything else is an `InvalidAddress`.
pub fn normalize_address(input: &str) -> Result<String> {
    normalize_hex(input, 40).ok_or_else(|| Error::InvalidAddress(input.to_string()))
}

/// Canonicalize a 32-byte hex value (peer identifiers).
pub fn normalize_bytes32(input: &str) -> Result<String> {
    normalize_hex(input, 64).ok_or_else(|| Error::InvalidBytes32(input.to_string()))
}

/// Extract the trailing 20 bytes of a 32-byte value as an address.
/// Returns `None` when the extracted address is all zero.
pub fn bytes32_to_address(input: &str) -> Result<Option<String>> {
    let canonical = normalize_bytes32(input)?;
    let address = format!("0x{}", &canonical[canonical.len() - 40..]);
    if address == ZERO_ADDRESS {
        Ok(None)
    } else {
        Ok(Some(address))
    }
}

/// Zero test against the canonical 20-byte form.
pub fn is_zero_address(address: &str) -> bool {
    normalize_address(address)
        .map(|a| a == ZERO_ADDRESS)
        .unwrap_or(false)
}

/// Zero test against the canonical 32-byte form.
pub fn is_zero_bytes32(value: &str) -> bool {
    normalize_bytes32(value)
        .map(|v| v == ZERO_BYTES32)
        .unwrap_or(false)
}

/// An application instance deployed at a concrete address on a chain.
/// Serialized as `"{chainId}_{0x…40hex}"`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct OAppId {
    pub chain_id: ChainId,
    pub address: String,
}

impl OAppId {
    /// Build from a raw address, canonicalizing it first.
    pub fn new(chain_id: ChainId, address: &str) -> Result<Self> {
        Ok(Self {
            chain_id,
            address: normalize_address(address)?,
        })
    }
}

impl fmt::Display for OAppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.chain_id, self.address)
    }
}

impl FromStr for OAppId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (chain, address) = s
            .split_once('_')
            .ok_or_else(|| Error::MalformedId(s.to_string()))?;
        let chain_id = chain
            .parse()
            .map_err(|_| Error::MalformedId(s.to_string()))?;
        OAppId::new(chain_id, address)
    }
}

/// A directed receive route on a specific chain: `"{chainId}_{eid}"`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct RouteKey {
    pub chain_id: ChainId,
    pub eid: Eid,
}

impl RouteKey {
    pub fn new(chain_id: ChainId, eid: Eid) -> Self {
        Self { chain_id, eid }
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.chain_id, self.eid)
    }
}

impl FromStr for RouteKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (chain, eid) = s
            .split_once('_')
            .ok_or_else(|| Error::MalformedId(s.to_string()))?;
        Ok(Self {
            chain_id: chain
                .parse()
                .map_err(|_| Error::MalformedId(s.to_string()))?,
            eid: eid.parse().map_err(|_| Error::MalformedId(s.to_string()))?,
        })
    }
}

/// Per-application override scope of one inbound route:
/// `"{chainId}_{0x…40hex}_{eid}"`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct OAppRouteKey {
    pub oapp: OAppId,
    pub src_eid: Eid,
}

impl OAppRouteKey {
    pub fn new(oapp: OAppId, src_eid: Eid) -> Self {
        Self { oapp, src_eid }
    }
}

impl fmt::Display for OAppRouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.oapp, self.src_eid)
    }
}

impl FromStr for OAppRouteKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.split('_');
        let chain = parts.next().ok_or_else(|| Error::MalformedId(s.to_string()))?;
        let address = parts.next().ok_or_else(|| Error::MalformedId(s.to_string()))?;
        let eid = parts.next().ok_or_else(|| Error::MalformedId(s.to_string()))?;
        if parts.next().is_some() {
            return Err(Error::MalformedId(s.to_string()));
        }
        let chain_id = chain
            .parse()
            .map_err(|_| Error::MalformedId(s.to_string()))?;
        Ok(Self {
            oapp: OAppId::new(chain_id, address)?,
            src_eid: eid.parse().map_err(|_| Error::MalformedId(s.to_string()))?,
        })
    }
}

/// Coordinates of one observed on-chain log: `"{chainId}_{block}_{idx}"`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId {
    pub chain_id: ChainId,
    pub block_number: u64,
    pub log_index: u32,
}

impl EventId {
    pub fn new(chain_id: ChainId, block_number: u64, log_index: u32) -> Self {
        Self {
            chain_id,
            block_number,
            log_index,
        }
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{}", self.chain_id, self.block_number, self.log_index)
    }
}

impl FromStr for EventId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.split('_');
        let chain = parts.next().ok_or_else(|| Error::MalformedId(s.to_string()))?;
        let block = parts.next().ok_or_else(|| Error::MalformedId(s.to_string()))?;
        let idx = parts.next().ok_or_else(|| Error::MalformedId(s.to_string()))?;
        if parts.next().is_some() {
            return Err(Error::MalformedId(s.to_string()));
        }
        Ok(Self {
            chain_id: chain
                .parse()
                .map_err(|_| Error::MalformedId(s.to_string()))?,
            block_number: block
                .parse()
                .map_err(|_| Error::MalformedId(s.to_string()))?,
            log_index: idx.parse().map_err(|_| Error::MalformedId(s.to_string()))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_address_case_and_prefix() {
        let canonical = "0xdeadbeefdeadbeefdeadbeefdeadbeefdeadbeef";
        assert_eq!(
            normalize_address("0xDEADBEEFDEADBEEFDEADBEEFDEADBEEFDEADBEEF").unwrap(),
            canonical
        );
        assert_eq!(
            normalize_address("DeadBeefDeadBeefDeadBeefDeadBeefDeadBeef").unwrap(),
            canonical
        );
    }

    #[test]
    fn test_normalize_address_padding() {
        assert_eq!(
            normalize_address("0xabc").unwrap(),
            "0x0000000000000000000000000000000000000abc"
        );
        // Left-padded topic word: excess leading zeros are stripped
        assert_eq!(
            normalize_address(
                "0x000000000000000000000000deadbeefdeadbeefdeadbeefdeadbeefdeadbeef"
            )
            .unwrap(),
            "0xdeadbeefdeadbeefdeadbeefdeadbeefdeadbeef"
        );
    }

    #[test]
    fn test_normalize_address_rejects() {
        assert!(matches!(
            normalize_address("0xnothex"),
            Err(Error::InvalidAddress(_))
        ));
        // Excess leading run is non-zero
        assert!(normalize_address(
            "0x100000000000000000000000deadbeefdeadbeefdeadbeefdeadbeefdeadbeef"
        )
        .is_err());
        assert!(normalize_address("").is_err());
    }

    #[test]
    fn test_bytes32_to_address() {
        let sender =
            "0x000000000000000000000000DEADBEEFdeadbeefDEADBEEFdeadbeefDEADBEEF";
        assert_eq!(
            bytes32_to_address(sender).unwrap().unwrap(),
            "0xdeadbeefdeadbeefdeadbeefdeadbeefdeadbeef"
        );
        assert_eq!(bytes32_to_address(ZERO_BYTES32).unwrap(), None);
    }

    #[test]
    fn test_zero_tests() {
        assert!(is_zero_address("0x0"));
        assert!(is_zero_address(ZERO_ADDRESS));
        assert!(!is_zero_address("0x1"));
        assert!(is_zero_bytes32("0x0"));
        assert!(!is_zero_bytes32("0x1"));
    }

    #[test]
    fn test_id_round_trips() {
        let oapp = OAppId::new(1, "0xAbC0000000000000000000000000000000000123").unwrap();
        assert_eq!(oapp.to_string(), "1_0xabc0000000000000000000000000000000000123");
        assert_eq!(oapp.to_string().parse::<OAppId>().unwrap(), oapp);

        let route = RouteKey::new(1, 30101);
        assert_eq!(route.to_string(), "1_30101");
        assert_eq!("1_30101".parse::<RouteKey>().unwrap(), route);

        let key = OAppRouteKey::new(oapp.clone(), 30101);
        assert_eq!(
            key.to_string(),
            "1_0xabc0000000000000000000000000000000000123_30101"
        );
        assert_eq!(key.to_string().parse::<OAppRouteKey>().unwrap(), key);

        let event = EventId::new(1, 17_000_000, 42);
        assert_eq!(event.to_string(), "1_17000000_42");
        assert_eq!("1_17000000_42".parse::<EventId>().unwrap(), event);
    }

    #[test]
    fn test_malformed_ids() {
        assert!("not-an-id".parse::<OAppId>().is_err());
        assert!("1_0xzz".parse::<OAppId>().is_err());
        assert!("1_2_3_4".parse::<EventId>().is_err());
        assert!("1".parse::<RouteKey>().is_err());
    }
}
