//! Effective-configuration merge resolver
//!
//! Composes the per-route default configuration with the per-application
//! override into the effective security configuration, attributing every
//! field that fell back to the default. Pure and deterministic: identical
//! inputs produce byte-identical output.

use crate::classifier::{LibraryRegistry, LibraryStatus};
use crate::ids::{is_zero_address, ChainId};
use crate::uln::{FieldValue, UlnConfigState};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Effective-config fields that can fall back from override to default.
/// Variant order is the canonical `fallback_fields` ordering.
#[derive(
    Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub enum FallbackField {
    ReceiveLibrary,
    Confirmations,
    RequiredDvnCount,
    RequiredDvns,
    OptionalDvnCount,
    OptionalDvns,
    OptionalDvnThreshold,
}

impl FallbackField {
    pub fn as_str(&self) -> &'static str {
        match self {
            FallbackField::ReceiveLibrary => "receiveLibrary",
            FallbackField::Confirmations => "confirmations",
            FallbackField::RequiredDvnCount => "requiredDVNCount",
            FallbackField::RequiredDvns => "requiredDVNs",
            FallbackField::OptionalDvnCount => "optionalDVNCount",
            FallbackField::OptionalDvns => "optionalDVNs",
            FallbackField::OptionalDvnThreshold => "optionalDVNThreshold",
        }
    }
}

/// Current default state for a `(chainId, eid)` route, with pointers to
/// the version records that produced it.
#[derive(Clone, Debug, Default)]
pub struct RouteDefaults {
    /// Current default library (canonical, non-zero when present).
    pub library: Option<String>,
    pub library_version: Option<String>,
    pub uln: Option<UlnConfigState>,
    pub uln_version: Option<String>,
}

/// An override library row. `address` is `None` when the application
/// explicitly set the zero address ("unset", fall back to the default).
#[derive(Clone, Debug, Default)]
pub struct OverrideLibrary {
    pub address: Option<String>,
}

/// Current override state for an application route.
#[derive(Clone, Debug, Default)]
pub struct RouteOverrides {
    /// `Some` whenever an override row exists, even one holding zero.
    pub library: Option<OverrideLibrary>,
    pub library_version: Option<String>,
    pub uln: Option<UlnConfigState>,
    pub uln_version: Option<String>,
}

/// The resolved effective security configuration of one application route.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResolvedConfig {
    pub receive_library: Option<String>,
    pub library_status: LibraryStatus,
    /// ULN portion is meaningful only for the tracked library.
    pub is_config_tracked: bool,
    pub uses_default_library: bool,
    pub uses_default_config: bool,
    pub uses_required_dvn_sentinel: bool,
    pub confirmations: u64,
    pub required_dvn_count: u8,
    pub optional_dvn_count: u8,
    pub optional_dvn_threshold: Option<u8>,
    pub required_dvns: Vec<String>,
    pub optional_dvns: Vec<String>,
    pub fallback_fields: Vec<FallbackField>,
    pub default_library_version: Option<String>,
    pub override_library_version: Option<String>,
    pub default_uln_version: Option<String>,
    pub override_uln_version: Option<String>,
}

/// Normalization applied while resolving, to be logged by the caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResolveIssue {
    ThresholdCapped { from: u8, to: u8 },
}

impl ResolveIssue {
    pub fn kind(&self) -> &'static str {
        match self {
            ResolveIssue::ThresholdCapped { .. } => "threshold_auto_capped",
        }
    }
}

impl fmt::Display for ResolveIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolveIssue::ThresholdCapped { from, to } => {
                write!(f, "optional DVN threshold capped from {from} to {to}")
            }
        }
    }
}

/// Resolver output: the config payload plus diagnostics.
#[derive(Clone, Debug)]
pub struct Resolution {
    pub config: ResolvedConfig,
    pub issues: Vec<ResolveIssue>,
}

/// ULN portion of a resolution, before library gating.
struct UlnResolution {
    confirmations: u64,
    required_dvn_count: u8,
    optional_dvn_count: u8,
    optional_dvn_threshold: u8,
    required_dvns: Vec<String>,
    optional_dvns: Vec<String>,
    uses_required_dvn_sentinel: bool,
    fallback: Vec<FallbackField>,
    issues: Vec<ResolveIssue>,
}

impl UlnResolution {
    /// The tuple compared for default-equivalence.
    fn comparable(&self) -> (u64, u8, u8, u8, &[String], &[String], bool) {
        (
            self.confirmations,
            self.required_dvn_count,
            self.optional_dvn_count,
            self.optional_dvn_threshold,
            &self.required_dvns,
            &self.optional_dvns,
            self.uses_required_dvn_sentinel,
        )
    }
}

fn sorted(mut dvns: Vec<String>) -> Vec<String> {
    dvns.sort();
    dvns.dedup();
    dvns
}

/// Merge the ULN portion field by field. Fallback attribution applies only
/// when the override carries values of its own yet inherits this field
/// while a default record is present.
fn resolve_uln(
    defaults: Option<&UlnConfigState>,
    overrides: Option<&UlnConfigState>,
) -> UlnResolution {
    let has_values = overrides.map(UlnConfigState::has_values).unwrap_or(false);
    let mut fallback = Vec::new();
    let mut issues = Vec::new();

    let confirmations = match overrides.map(|o| o.confirmations) {
        Some(FieldValue::Explicit(v)) => v,
        Some(FieldValue::Nil) => 0,
        _ => match defaults {
            Some(d) => {
                if has_values {
                    fallback.push(FallbackField::Confirmations);
                }
                d.confirmations.collapse()
            }
            None => 0,
        },
    };

    let (required_governing, required_sentinel) = match overrides.map(|o| o.required_dvn_count) {
        Some(FieldValue::Explicit(n)) => (FieldValue::Explicit(n), false),
        Some(FieldValue::Nil) => (FieldValue::Nil, true),
        _ => match defaults.map(|d| d.required_dvn_count) {
            Some(field) => {
                if has_values {
                    fallback.push(FallbackField::RequiredDvnCount);
                }
                (field, field.is_nil())
            }
            None => (FieldValue::Inherit, false),
        },
    };

    let required_dvns = if required_sentinel {
        Vec::new()
    } else {
        match overrides.map(|o| &o.required_dvns).filter(|a| !a.is_empty()) {
            Some(dvns) => sorted(dvns.clone()),
            None => match defaults.map(|d| &d.required_dvns).filter(|a| !a.is_empty()) {
                Some(dvns) => {
                    if has_values {
                        fallback.push(FallbackField::RequiredDvns);
                    }
                    sorted(dvns.clone())
                }
                None => Vec::new(),
            },
        }
    };

    let optional_governing = match overrides.map(|o| o.optional_dvn_count) {
        Some(field @ (FieldValue::Explicit(_) | FieldValue::Nil)) => field,
        _ => match defaults.map(|d| d.optional_dvn_count) {
            Some(field) => {
                if has_values {
                    fallback.push(FallbackField::OptionalDvnCount);
                }
                field
            }
            None => FieldValue::Inherit,
        },
    };

    let optional_dvns = match overrides.map(|o| &o.optional_dvns).filter(|a| !a.is_empty()) {
        Some(dvns) => sorted(dvns.clone()),
        None => match defaults.map(|d| &d.optional_dvns).filter(|a| !a.is_empty()) {
            Some(dvns) => {
                if has_values {
                    fallback.push(FallbackField::OptionalDvns);
                }
                sorted(dvns.clone())
            }
            None => Vec::new(),
        },
    };

    let raw_threshold = match overrides.map(|o| o.optional_dvn_threshold) {
        Some(FieldValue::Explicit(v)) => v,
        _ => match defaults {
            Some(d) => {
                if has_values {
                    fallback.push(FallbackField::OptionalDvnThreshold);
                }
                d.optional_dvn_threshold.collapse()
            }
            None => 0,
        },
    };

    // Effective counts: the resolved array wins over the raw count.
    let required_dvn_count = if required_sentinel {
        0
    } else if !required_dvns.is_empty() {
        required_dvns.len() as u8
    } else {
        required_governing.collapse()
    };
    let optional_dvn_count = if !optional_dvns.is_empty() {
        optional_dvns.len() as u8
    } else {
        optional_governing.collapse()
    };

    let optional_dvn_threshold = if raw_threshold > optional_dvn_count {
        issues.push(ResolveIssue::ThresholdCapped {
            from: raw_threshold,
            to: optional_dvn_count,
        });
        optional_dvn_count
    } else {
        raw_threshold
    };

    fallback.sort();
    fallback.dedup();

    UlnResolution {
        confirmations,
        required_dvn_count,
        optional_dvn_count,
        optional_dvn_threshold,
        required_dvns,
        optional_dvns,
        uses_required_dvn_sentinel: required_sentinel,
        fallback,
        issues,
    }
}

/// Resolve the effective security configuration for one application route.
pub fn resolve_effective_config(
    chain_id: ChainId,
    defaults: &RouteDefaults,
    overrides: &RouteOverrides,
    registry: &LibraryRegistry,
) -> Resolution {
    let mut fallback = Vec::new();

    // Library: a non-zero override wins; otherwise the default applies.
    // An override row holding zero means "unset", which is itself a
    // fallback onto the default.
    let override_library = overrides
        .library
        .as_ref()
        .and_then(|o| o.address.as_ref())
        .filter(|a| !is_zero_address(a));
    let default_library = defaults.library.as_ref().filter(|a| !is_zero_address(a));

    let receive_library = match override_library {
        Some(lib) => Some(lib.clone()),
        None => match default_library {
            Some(lib) => {
                if overrides.library.is_some() {
                    fallback.push(FallbackField::ReceiveLibrary);
                }
                Some(lib.clone())
            }
            None => None,
        },
    };

    // True whenever the effective library coincides with the current
    // default, including an override that restates it.
    let uses_default_library = matches!(
        (receive_library.as_deref(), default_library),
        (Some(effective), Some(default)) if effective == default.as_str()
    );

    let library_status = registry.classify(chain_id, receive_library.as_deref());

    let versions = (
        defaults.library_version.clone(),
        overrides.library_version.clone(),
        defaults.uln_version.clone(),
        overrides.uln_version.clone(),
    );

    // Untracked library short-circuits the ULN portion entirely.
    if library_status != LibraryStatus::Tracked {
        return Resolution {
            config: ResolvedConfig {
                receive_library,
                library_status,
                is_config_tracked: false,
                uses_default_library,
                uses_default_config: false,
                uses_required_dvn_sentinel: false,
                confirmations: 0,
                required_dvn_count: 0,
                optional_dvn_count: 0,
                optional_dvn_threshold: None,
                required_dvns: Vec::new(),
                optional_dvns: Vec::new(),
                fallback_fields: fallback,
                default_library_version: versions.0,
                override_library_version: versions.1,
                default_uln_version: versions.2,
                override_uln_version: versions.3,
            },
            issues: Vec::new(),
        };
    }

    let merged = resolve_uln(defaults.uln.as_ref(), overrides.uln.as_ref());
    let defaults_only = resolve_uln(defaults.uln.as_ref(), None);
    let uses_default_config = merged.comparable() == defaults_only.comparable();

    fallback.extend(merged.fallback.iter().copied());
    fallback.sort();
    fallback.dedup();

    Resolution {
        config: ResolvedConfig {
            receive_library,
            library_status,
            is_config_tracked: true,
            uses_default_library,
            uses_default_config,
            uses_required_dvn_sentinel: merged.uses_required_dvn_sentinel,
            confirmations: merged.confirmations,
            required_dvn_count: merged.required_dvn_count,
            optional_dvn_count: merged.optional_dvn_count,
            optional_dvn_threshold: Some(merged.optional_dvn_threshold),
            required_dvns: merged.required_dvns,
            optional_dvns: merged.optional_dvns,
            fallback_fields: fallback,
            default_library_version: versions.0,
            override_library_version: versions.1,
            default_uln_version: versions.2,
            override_uln_version: versions.3,
        },
        issues: merged.issues,
    }
}
