//! Policy presets and snapshot resolution.
//!
//! A `PolicySnapshot` is the frozen configuration attached to one
//! orchestration: review strictness plus the model assigned to each agent
//! role. Presets are complete named snapshots; callers may override
//! individual fields one section at a time. Once attached to a run the
//! snapshot is immutable (see `launch::start_orchestration`).

use crate::error::{ConductorError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

pub const PRESET_NAMES: &[&str] = &["strict", "balanced", "fast"];

// ---------------------------------------------------------------------------
// ReviewPolicyConfig / ModelPolicyConfig / PolicySnapshot
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewEnforcement {
    TaskAndPhase,
    PhaseOnly,
}

impl fmt::Display for ReviewEnforcement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReviewEnforcement::TaskAndPhase => "task_and_phase",
            ReviewEnforcement::PhaseOnly => "phase_only",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchitectMode {
    Enabled,
    Disabled,
}

/// Review-side policy. `test_integrity_profile` and `detector_scope` are
/// open string sets; new profiles ship without a schema change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewPolicyConfig {
    pub enforcement: ReviewEnforcement,
    pub detector_scope: String,
    pub architect_mode: ArchitectMode,
    pub test_integrity_profile: String,
    pub hard_block_detectors: bool,
    pub allow_rare_override: bool,
    pub require_fix_first: bool,
}

/// Model identifier per agent role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelPolicyConfig {
    pub validator: String,
    pub planner: String,
    pub executor: String,
    pub reviewer: String,
}

/// The complete frozen policy for one orchestration.
///
/// Field order here is the canonical wire order; `hash_policy` depends on
/// it, so adding or removing a field is a breaking schema change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicySnapshot {
    pub review: ReviewPolicyConfig,
    pub model: ModelPolicyConfig,
}

// ---------------------------------------------------------------------------
// Built-in presets
// ---------------------------------------------------------------------------

fn preset_strict() -> PolicySnapshot {
    PolicySnapshot {
        review: ReviewPolicyConfig {
            enforcement: ReviewEnforcement::TaskAndPhase,
            detector_scope: "full".to_string(),
            architect_mode: ArchitectMode::Enabled,
            test_integrity_profile: "max_strict".to_string(),
            hard_block_detectors: true,
            allow_rare_override: false,
            require_fix_first: true,
        },
        model: ModelPolicyConfig {
            validator: "claude-opus-4-6".to_string(),
            planner: "claude-opus-4-6".to_string(),
            executor: "claude-sonnet-4-5".to_string(),
            reviewer: "claude-opus-4-6".to_string(),
        },
    }
}

fn preset_balanced() -> PolicySnapshot {
    PolicySnapshot {
        review: ReviewPolicyConfig {
            enforcement: ReviewEnforcement::TaskAndPhase,
            detector_scope: "changed_files".to_string(),
            architect_mode: ArchitectMode::Enabled,
            test_integrity_profile: "strict_baseline".to_string(),
            hard_block_detectors: true,
            allow_rare_override: true,
            require_fix_first: true,
        },
        model: ModelPolicyConfig {
            validator: "claude-sonnet-4-5".to_string(),
            planner: "claude-opus-4-6".to_string(),
            executor: "claude-sonnet-4-5".to_string(),
            reviewer: "claude-sonnet-4-5".to_string(),
        },
    }
}

fn preset_fast() -> PolicySnapshot {
    PolicySnapshot {
        review: ReviewPolicyConfig {
            enforcement: ReviewEnforcement::PhaseOnly,
            detector_scope: "changed_files".to_string(),
            architect_mode: ArchitectMode::Disabled,
            test_integrity_profile: "baseline".to_string(),
            hard_block_detectors: false,
            allow_rare_override: true,
            require_fix_first: false,
        },
        model: ModelPolicyConfig {
            validator: "claude-haiku-4-5".to_string(),
            planner: "claude-sonnet-4-5".to_string(),
            executor: "claude-sonnet-4-5".to_string(),
            reviewer: "claude-haiku-4-5".to_string(),
        },
    }
}

// ---------------------------------------------------------------------------
// Overrides
// ---------------------------------------------------------------------------

/// Partial override of a preset, one top-level section at a time.
///
/// A key present in a section replaces the base value; an absent key keeps
/// the preset's value. The merge is exactly one level deep.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review: Option<ReviewPolicyOverride>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelPolicyOverride>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewPolicyOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enforcement: Option<ReviewEnforcement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detector_scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub architect_mode: Option<ArchitectMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_integrity_profile: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hard_block_detectors: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_rare_override: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub require_fix_first: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelPolicyOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub planner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewer: Option<String>,
}

fn apply_review_override(base: &mut ReviewPolicyConfig, ov: &ReviewPolicyOverride) {
    if let Some(v) = ov.enforcement {
        base.enforcement = v;
    }
    if let Some(v) = &ov.detector_scope {
        base.detector_scope = v.clone();
    }
    if let Some(v) = ov.architect_mode {
        base.architect_mode = v;
    }
    if let Some(v) = &ov.test_integrity_profile {
        base.test_integrity_profile = v.clone();
    }
    if let Some(v) = ov.hard_block_detectors {
        base.hard_block_detectors = v;
    }
    if let Some(v) = ov.allow_rare_override {
        base.allow_rare_override = v;
    }
    if let Some(v) = ov.require_fix_first {
        base.require_fix_first = v;
    }
}

fn apply_model_override(base: &mut ModelPolicyConfig, ov: &ModelPolicyOverride) {
    if let Some(v) = &ov.validator {
        base.validator = v.clone();
    }
    if let Some(v) = &ov.planner {
        base.planner = v.clone();
    }
    if let Some(v) = &ov.executor {
        base.executor = v.clone();
    }
    if let Some(v) = &ov.reviewer {
        base.reviewer = v.clone();
    }
}

// ---------------------------------------------------------------------------
// Resolution and hashing
// ---------------------------------------------------------------------------

/// Resolve a preset name plus optional partial overrides into a complete
/// snapshot. The result is an owned copy; mutating it never touches the
/// canonical preset definitions.
///
/// Override values are trusted as-is so policy tuning at the edges (e.g.
/// a cheaper reviewer model) needs no preset redeploy.
pub fn resolve_policy(
    preset: &str,
    overrides: Option<&PolicyOverrides>,
) -> Result<PolicySnapshot> {
    let mut snapshot = match preset {
        "strict" => preset_strict(),
        "balanced" => preset_balanced(),
        "fast" => preset_fast(),
        _ => {
            return Err(ConductorError::UnknownPreset {
                name: preset.to_string(),
                valid: PRESET_NAMES.join(", "),
            })
        }
    };

    if let Some(ov) = overrides {
        if let Some(review) = &ov.review {
            apply_review_override(&mut snapshot.review, review);
        }
        if let Some(model) = &ov.model {
            apply_model_override(&mut snapshot.model, model);
        }
    }

    Ok(snapshot)
}

/// Parse caller-supplied override JSON. A parse failure surfaces as
/// `InvalidOverrides`; the raw serde error never leaks past this boundary.
pub fn parse_overrides(json: &str) -> Result<PolicyOverrides> {
    serde_json::from_str(json).map_err(|e| ConductorError::InvalidOverrides(e.to_string()))
}

/// Content fingerprint of a snapshot: `sha256-` + 64 lowercase hex chars.
///
/// Computed over the canonical JSON serialization. Struct field order is
/// fixed by declaration, so two structurally equal snapshots built through
/// different code paths hash identically. Identity/versioning only, not a
/// security control.
pub fn hash_policy(snapshot: &PolicySnapshot) -> String {
    // Serializing a fully typed struct cannot fail.
    let canonical = serde_json::to_string(snapshot).unwrap_or_default();
    format!("sha256-{}", hex::encode(Sha256::digest(canonical.as_bytes())))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
