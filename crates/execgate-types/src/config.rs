//! Exec engine configuration schema.
//!
//! All structs support both `snake_case` and `camelCase` field names in
//! JSON via `#[serde(alias)]`; unknown fields are ignored for forward
//! compatibility. Per-agent overrides fall back to the global defaults
//! through [`ExecConfig::resolve_policy`].

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::security::{AskMode, PolicyConfig, SafeBinProfile, SecurityMode};

// ── Execution host ──────────────────────────────────────────────────────

/// Where approved commands actually execute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecHost {
    /// The gateway's own process runner.
    #[default]
    Gateway,
    /// A paired remote companion node. Unreachable nodes deny with
    /// `companion-unavailable`; there is no silent local fallback.
    Node,
}

// ── Root exec config ────────────────────────────────────────────────────

/// Configuration for the exec command security engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecConfig {
    /// Default security mode for all agents.
    #[serde(default)]
    pub security: SecurityMode,

    /// Default ask mode for all agents.
    #[serde(default)]
    pub ask: AskMode,

    /// Whether skill-supplied binaries are pre-trusted by default.
    #[serde(default, alias = "autoAllowSkills")]
    pub auto_allow_skills: bool,

    /// Extra safe-bin names merged over the built-in curated set.
    #[serde(default, alias = "safeBins")]
    pub safe_bins: Vec<String>,

    /// Argument-shape profiles constraining individual safe bins.
    #[serde(default, alias = "safeBinProfiles")]
    pub safe_bin_profiles: Vec<SafeBinProfile>,

    /// Directories whose contents are pre-authorized for execution.
    /// `~` is expanded.
    #[serde(default, alias = "trustedDirs")]
    pub trusted_dirs: Vec<String>,

    /// Specific skill-supplied binary paths trusted when
    /// `auto_allow_skills` is on. `~` is expanded.
    #[serde(default, alias = "skillBins")]
    pub skill_bins: Vec<String>,

    /// Location of the persisted allowlist document. `~` is expanded;
    /// per-agent documents live next to it, suffixed with the agent id.
    #[serde(default = "default_allowlist_path", alias = "allowlistPath")]
    pub allowlist_path: String,

    /// Where approved commands run.
    #[serde(default)]
    pub host: ExecHost,

    /// Byte cap on each captured output stream.
    #[serde(default = "default_max_output_bytes", alias = "maxOutputBytes")]
    pub max_output_bytes: usize,

    /// Timeout applied when the request carries none.
    #[serde(default = "default_timeout_ms", alias = "defaultTimeoutMs")]
    pub default_timeout_ms: u64,

    /// Hard ceiling on any requested timeout.
    #[serde(default = "default_max_timeout_ms", alias = "maxTimeoutMs")]
    pub max_timeout_ms: u64,

    /// Per-agent policy overrides keyed by agent id.
    #[serde(default)]
    pub agents: HashMap<String, ExecPolicyOverride>,
}

fn default_allowlist_path() -> String {
    "~/.execgate/allowlist.json".into()
}
fn default_max_output_bytes() -> usize {
    200_000
}
fn default_timeout_ms() -> u64 {
    30_000
}
fn default_max_timeout_ms() -> u64 {
    300_000
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            security: SecurityMode::default(),
            ask: AskMode::default(),
            auto_allow_skills: false,
            safe_bins: Vec::new(),
            safe_bin_profiles: Vec::new(),
            trusted_dirs: Vec::new(),
            skill_bins: Vec::new(),
            allowlist_path: default_allowlist_path(),
            host: ExecHost::default(),
            max_output_bytes: default_max_output_bytes(),
            default_timeout_ms: default_timeout_ms(),
            max_timeout_ms: default_max_timeout_ms(),
            agents: HashMap::new(),
        }
    }
}

/// Per-agent overrides; unset fields fall back to the global defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecPolicyOverride {
    /// Security mode override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security: Option<SecurityMode>,

    /// Ask mode override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ask: Option<AskMode>,

    /// Skill-bin trust override.
    #[serde(
        default,
        alias = "autoAllowSkills",
        skip_serializing_if = "Option::is_none"
    )]
    pub auto_allow_skills: Option<bool>,
}

impl ExecConfig {
    /// Resolve the effective policy for an agent, falling back to the
    /// global defaults for every unset field.
    pub fn resolve_policy(&self, agent_id: Option<&str>) -> PolicyConfig {
        let overrides = agent_id.and_then(|id| self.agents.get(id));
        PolicyConfig {
            security: overrides
                .and_then(|o| o.security)
                .unwrap_or(self.security),
            ask: overrides.and_then(|o| o.ask).unwrap_or(self.ask),
            auto_allow_skills: overrides
                .and_then(|o| o.auto_allow_skills)
                .unwrap_or(self.auto_allow_skills),
        }
    }

    /// The allowlist document path for an agent: the configured path for
    /// the global store, or an agent-suffixed sibling.
    pub fn allowlist_path_for(&self, agent_id: Option<&str>) -> PathBuf {
        let base = expand_tilde(&self.allowlist_path);
        match agent_id {
            None => base,
            Some(id) => {
                let stem = base
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or("allowlist");
                let name = format!("{stem}-{id}.json");
                base.with_file_name(name)
            }
        }
    }

    /// Trusted directories with `~` expanded.
    pub fn trusted_dir_paths(&self) -> Vec<PathBuf> {
        self.trusted_dirs.iter().map(|d| expand_tilde(d)).collect()
    }

    /// Skill-bin paths with `~` expanded.
    pub fn skill_bin_paths(&self) -> Vec<PathBuf> {
        self.skill_bins.iter().map(|d| expand_tilde(d)).collect()
    }
}

/// Expand a leading `~` or `~/` against the platform home directory.
/// Anything else passes through untouched.
pub fn expand_tilde(raw: &str) -> PathBuf {
    if raw == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    if let Some(rest) = raw.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    PathBuf::from(raw)
}

// ── Tests ───────────────────────────────────────────────────────────────
