//! Three-valued ULN configuration fields
//!
//! Each configurable field distinguishes three states: inherit the default
//! (wire zero), explicitly zero via the protocol sentinel (field max), or an
//! explicit value. A native nullable integer cannot express this, so every
//! field is carried as a [`FieldValue`].

use crate::ids::{is_zero_address, normalize_address};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Wire sentinel for "zero DVNs, do not inherit" on the u8 count fields.
pub const DVN_COUNT_SENTINEL: u8 = u8::MAX;

/// Wire sentinel for "zero confirmations, do not inherit".
pub const CONFIRMATIONS_SENTINEL: u64 = u64::MAX;

/// One configurable field: inherit, explicit-zero sentinel, or a real value.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum FieldValue<T> {
    /// Wire zero: take the default for this route.
    Inherit,
    /// Wire sentinel: explicit zero, overriding any default.
    Nil,
    /// A real value.
    Explicit(T),
}

impl<T> FieldValue<T> {
    pub fn is_inherit(&self) -> bool {
        matches!(self, FieldValue::Inherit)
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, FieldValue::Nil)
    }
}

impl FieldValue<u64> {
    /// Collapse to the stored effective value: the sentinel and the inherit
    /// marker both resolve to zero once a governing side has been chosen.
    pub fn collapse(self) -> u64 {
        match self {
            FieldValue::Explicit(v) => v,
            FieldValue::Inherit | FieldValue::Nil => 0,
        }
    }
}

impl FieldValue<u8> {
    pub fn collapse(self) -> u8 {
        match self {
            FieldValue::Explicit(v) => v,
            FieldValue::Inherit | FieldValue::Nil => 0,
        }
    }
}

/// Decode the confirmations wire value.
pub fn confirmations_field(raw: u64) -> FieldValue<u64> {
    match raw {
        0 => FieldValue::Inherit,
        CONFIRMATIONS_SENTINEL => FieldValue::Nil,
        v => FieldValue::Explicit(v),
    }
}

/// Decode a DVN count wire value.
pub fn dvn_count_field(raw: u8) -> FieldValue<u8> {
    match raw {
        0 => FieldValue::Inherit,
        DVN_COUNT_SENTINEL => FieldValue::Nil,
        v => FieldValue::Explicit(v),
    }
}

/// Decode the optional-DVN threshold. The threshold has no sentinel: zero
/// always inherits.
pub fn threshold_field(raw: u8) -> FieldValue<u8> {
    match raw {
        0 => FieldValue::Inherit,
        v => FieldValue::Explicit(v),
    }
}

/// Raw ULN config tuple exactly as emitted on the wire (6 fields).
/// Version records keep this form so history can reconstruct sentinels.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UlnConfigInput {
    pub confirmations: u64,
    pub required_dvn_count: u8,
    pub optional_dvn_count: u8,
    pub optional_dvn_threshold: u8,
    pub required_dvns: Vec<String>,
    pub optional_dvns: Vec<String>,
}

/// Decoded ULN config state: tagged field values plus hygienic address
/// arrays (lowercased, zero-filtered, deduplicated, order preserved).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct UlnConfigState {
    pub confirmations: FieldValue<u64>,
    pub required_dvn_count: FieldValue<u8>,
    pub optional_dvn_count: FieldValue<u8>,
    pub optional_dvn_threshold: FieldValue<u8>,
    pub required_dvns: Vec<String>,
    pub optional_dvns: Vec<String>,
}

impl UlnConfigState {
    /// A config "has values" if any field is non-inherit or any DVN array
    /// is non-empty.
    pub fn has_values(&self) -> bool {
        !self.confirmations.is_inherit()
            || !self.required_dvn_count.is_inherit()
            || !self.optional_dvn_count.is_inherit()
            || !self.optional_dvn_threshold.is_inherit()
            || !self.required_dvns.is_empty()
            || !self.optional_dvns.is_empty()
    }
}

/// Validation finding produced while decoding a config tuple.
///
/// Sentinel observations are informational; everything else is a
/// recoverable invariant warning (the decoded state is already normalized).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigIssue {
    SentinelObserved {
        field: &'static str,
    },
    ZeroAddressInArray {
        field: &'static str,
    },
    InvalidDvnAddress {
        field: &'static str,
        address: String,
    },
    DuplicateDvn {
        field: &'static str,
        address: String,
    },
    CountArrayMismatch {
        field: &'static str,
        count: u8,
        actual: usize,
    },
    ThresholdExceedsCount {
        threshold: u8,
        count: u8,
    },
}

impl ConfigIssue {
    /// Sentinel observations log at debug; the rest warn.
    pub fn is_debug(&self) -> bool {
        matches!(self, ConfigIssue::SentinelObserved { .. })
    }

    /// Stable diagnostic kind for structured logging.
    pub fn kind(&self) -> &'static str {
        match self {
            ConfigIssue::SentinelObserved { .. } => "sentinel_observed",
            ConfigIssue::ZeroAddressInArray { .. } => "zero_address_in_array",
            ConfigIssue::InvalidDvnAddress { .. } => "invalid_dvn_address",
            ConfigIssue::DuplicateDvn { .. } => "duplicate_dvn",
            ConfigIssue::CountArrayMismatch { .. } => "count_array_mismatch",
            ConfigIssue::ThresholdExceedsCount { .. } => "threshold_exceeds_count",
        }
    }
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigIssue::SentinelObserved { field } => {
                write!(f, "sentinel observed on {field}")
            }
            ConfigIssue::ZeroAddressInArray { field } => {
                write!(f, "zero address in {field}")
            }
            ConfigIssue::InvalidDvnAddress { field, address } => {
                write!(f, "invalid address in {field}: {address}")
            }
            ConfigIssue::DuplicateDvn { field, address } => {
                write!(f, "duplicate address in {field}: {address}")
            }
            ConfigIssue::CountArrayMismatch {
                field,
                count,
                actual,
            } => write!(f, "{field} declares {count} but carries {actual}"),
            ConfigIssue::ThresholdExceedsCount { threshold, count } => {
                write!(f, "threshold {threshold} exceeds optional count {count}")
            }
        }
    }
}

fn decode_dvn_array(
    raw: &[String],
    field: &'static str,
    issues: &mut Vec<ConfigIssue>,
) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(raw.len());
    for entry in raw {
        let canonical = match normalize_address(entry) {
            Ok(c) => c,
            Err(_) => {
                issues.push(ConfigIssue::InvalidDvnAddress {
                    field,
                    address: entry.clone(),
                });
                continue;
            }
        };
        if is_zero_address(&canonical) {
            issues.push(ConfigIssue::ZeroAddressInArray { field });
            continue;
        }
        if out.contains(&canonical) {
            issues.push(ConfigIssue::DuplicateDvn {
                field,
                address: canonical,
            });
            continue;
        }
        out.push(canonical);
    }
    out
}

/// Decode a raw wire tuple into normalized state, reporting every
/// validation finding. The returned state is safe to persist and to feed
/// into the resolver.
pub fn decode_uln_config(input: &UlnConfigInput) -> (UlnConfigState, Vec<ConfigIssue>) {
    let mut issues = Vec::new();

    let confirmations = confirmations_field(input.confirmations);
    if confirmations.is_nil() {
        issues.push(ConfigIssue::SentinelObserved {
            field: "confirmations",
        });
    }
    let required_dvn_count = dvn_count_field(input.required_dvn_count);
    if required_dvn_count.is_nil() {
        issues.push(ConfigIssue::SentinelObserved {
            field: "requiredDvnCount",
        });
    }
    let optional_dvn_count = dvn_count_field(input.optional_dvn_count);
    if optional_dvn_count.is_nil() {
        issues.push(ConfigIssue::SentinelObserved {
            field: "optionalDvnCount",
        });
    }

    let required_dvns = decode_dvn_array(&input.required_dvns, "requiredDvns", &mut issues);
    let optional_dvns = decode_dvn_array(&input.optional_dvns, "optionalDvns", &mut issues);

    if let FieldValue::Explicit(count) = required_dvn_count {
        if count as usize != required_dvns.len() {
            issues.push(ConfigIssue::CountArrayMismatch {
                field: "requiredDvns",
                count,
                actual: required_dvns.len(),
            });
        }
    }
    if let FieldValue::Explicit(count) = optional_dvn_count {
        if count as usize != optional_dvns.len() {
            issues.push(ConfigIssue::CountArrayMismatch {
                field: "optionalDvns",
                count,
                actual: optional_dvns.len(),
            });
        }
    }

    // Threshold can only be checked against an explicit count here; the
    // resolver re-checks against the effective count and caps again.
    let mut optional_dvn_threshold = threshold_field(input.optional_dvn_threshold);
    if let (FieldValue::Explicit(threshold), FieldValue::Explicit(count)) =
        (optional_dvn_threshold, optional_dvn_count)
    {
        if threshold > count {
            issues.push(ConfigIssue::ThresholdExceedsCount { threshold, count });
            optional_dvn_threshold = threshold_field(count);
        }
    }

    (
        UlnConfigState {
            confirmations,
            required_dvn_count,
            optional_dvn_count,
            optional_dvn_threshold,
            required_dvns,
            optional_dvns,
        },
        issues,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const DVN_A: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const DVN_B: &str = "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";

    #[test]
    fn test_field_decoding() {
        assert_eq!(confirmations_field(0), FieldValue::Inherit);
        assert_eq!(confirmations_field(u64::MAX), FieldValue::Nil);
        assert_eq!(confirmations_field(5), FieldValue::Explicit(5));

        assert_eq!(dvn_count_field(0), FieldValue::Inherit);
        assert_eq!(dvn_count_field(255), FieldValue::Nil);
        assert_eq!(dvn_count_field(2), FieldValue::Explicit(2));

        assert_eq!(threshold_field(0), FieldValue::Inherit);
        assert_eq!(threshold_field(3), FieldValue::Explicit(3));
    }

    #[test]
    fn test_collapse() {
        assert_eq!(FieldValue::<u64>::Nil.collapse(), 0);
        assert_eq!(FieldValue::<u64>::Inherit.collapse(), 0);
        assert_eq!(FieldValue::Explicit(7u64).collapse(), 7);
    }

    #[test]
    fn test_has_values() {
        let (empty, _) = decode_uln_config(&UlnConfigInput::default());
        assert!(!empty.has_values());

        let (with_array, _) = decode_uln_config(&UlnConfigInput {
            required_dvns: vec![DVN_A.to_string()],
            ..Default::default()
        });
        assert!(with_array.has_values());

        let (with_sentinel, _) = decode_uln_config(&UlnConfigInput {
            required_dvn_count: 255,
            ..Default::default()
        });
        assert!(with_sentinel.has_values());
    }

    #[test]
    fn test_array_hygiene() {
        let (state, issues) = decode_uln_config(&UlnConfigInput {
            required_dvns: vec![
                DVN_A.to_uppercase(),
                "0x0000000000000000000000000000000000000000".to_string(),
                DVN_A.to_string(),
                "garbage".to_string(),
                DVN_B.to_string(),
            ],
            ..Default::default()
        });
        assert_eq!(state.required_dvns, vec![DVN_A.to_string(), DVN_B.to_string()]);
        assert!(issues
            .iter()
            .any(|i| matches!(i, ConfigIssue::ZeroAddressInArray { .. })));
        assert!(issues
            .iter()
            .any(|i| matches!(i, ConfigIssue::DuplicateDvn { .. })));
        assert!(issues
            .iter()
            .any(|i| matches!(i, ConfigIssue::InvalidDvnAddress { .. })));
    }

    #[test]
    fn test_count_mismatch_warns() {
        let (_, issues) = decode_uln_config(&UlnConfigInput {
            required_dvn_count: 2,
            required_dvns: vec![DVN_A.to_string()],
            ..Default::default()
        });
        assert!(issues
            .iter()
            .any(|i| matches!(i, ConfigIssue::CountArrayMismatch { count: 2, actual: 1, .. })));
    }

    #[test]
    fn test_threshold_capped_at_decode() {
        let (state, issues) = decode_uln_config(&UlnConfigInput {
            optional_dvn_count: 2,
            optional_dvn_threshold: 5,
            optional_dvns: vec![DVN_A.to_string(), DVN_B.to_string()],
            ..Default::default()
        });
        assert_eq!(state.optional_dvn_threshold, FieldValue::Explicit(2));
        assert!(issues
            .iter()
            .any(|i| matches!(i, ConfigIssue::ThresholdExceedsCount { threshold: 5, count: 2 })));
    }

    #[test]
    fn test_sentinels_reported_as_debug() {
        let (state, issues) = decode_uln_config(&UlnConfigInput {
            confirmations: u64::MAX,
            required_dvn_count: 255,
            ..Default::default()
        });
        assert!(state.confirmations.is_nil());
        assert!(state.required_dvn_count.is_nil());
        assert_eq!(issues.len(), 2);
        assert!(issues.iter().all(|i| i.is_debug()));
    }
}
