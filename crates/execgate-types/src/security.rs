//! Policy and approval types for command execution.
//!
//! Defines the tagged enums the approval engine is matched on --
//! [`SecurityMode`], [`AskMode`], [`ApprovalDecision`], [`DenyReason`] --
//! plus the persisted [`AllowlistEntry`] record and the per-invocation
//! [`PolicyConfig`] resolved from configuration by the caller.
//!
//! Denial reasons are plain data, not error types: every denial path in
//! the engine produces a [`DenyReason`] so callers can match exhaustively
//! instead of parsing strings.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

// ── Platform ────────────────────────────────────────────────────────────

/// Which shell grammar and filesystem conventions apply.
///
/// Passed explicitly through the parser and resolver; never read from a
/// process-global at arbitrary depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// POSIX-like shells (`sh`, `bash`): quoting, pipes, chains, heredocs.
    Posix,
    /// `cmd.exe`-style invocations: no chain/pipe support at all.
    Windows,
}

impl Platform {
    /// The platform this process is running on.
    pub fn current() -> Self {
        if cfg!(windows) {
            Self::Windows
        } else {
            Self::Posix
        }
    }
}

// ── Security / ask modes ────────────────────────────────────────────────

/// How restrictive the execution policy is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityMode {
    /// Reject every invocation unconditionally.
    Deny,
    /// Every invocation requires an explicit approval.
    Ask,
    /// Invocations must match the allowlist (or be approved when ask
    /// mode permits interaction).
    #[default]
    Allowlist,
}

/// When interactive approval may be requested.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AskMode {
    /// Never ask; allowlist misses are final.
    Off,
    /// Ask only when the allowlist does not cover the invocation.
    #[default]
    OnMiss,
    /// Always ask, regardless of the allowlist.
    Always,
}

impl AskMode {
    /// Whether this mode permits interactive approval at all.
    pub fn permits_approval(&self) -> bool {
        !matches!(self, Self::Off)
    }
}

/// The caller-supplied decision from an approval prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApprovalDecision {
    /// Allow this one invocation.
    AllowOnce,
    /// Allow and persist a new allowlist entry derived from the
    /// resolved executable path.
    AllowAlways,
}

/// Effective policy for one invocation, resolved by the caller from
/// per-agent and global configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Security mode (deny / ask / allowlist).
    #[serde(default)]
    pub security: SecurityMode,
    /// Ask mode gating interactive approval.
    #[serde(default)]
    pub ask: AskMode,
    /// Whether binaries supplied by installed skills are pre-trusted.
    #[serde(default, alias = "autoAllowSkills")]
    pub auto_allow_skills: bool,
}

// ── Denial reasons ──────────────────────────────────────────────────────

/// Why an invocation was denied.
///
/// These are reason codes, not exceptions: parse and resolution failures
/// are folded into denials before they reach the caller, and raw OS
/// errors are never forwarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    /// Malformed quoting/escaping/heredoc, or an empty command/segment.
    ParseError,
    /// Redirection, substitution, backticks, `||`/`|&`, bare `&`/`;`,
    /// raw newlines, or a Windows-disallowed metacharacter.
    UnsupportedConstruct,
    /// Executable not found or not executable. Surfaced only as an
    /// allowlist/ask denial, never as a raw filesystem error.
    ResolutionMiss,
    /// The security mode is `deny`.
    SecurityDeny,
    /// Ask mode requires an approval the caller did not supply.
    ApprovalRequired,
    /// No allowlist mechanism covered every segment.
    AllowlistMiss,
    /// The final execution plan could not be derived from what the
    /// allowlist authorized.
    ExecutionPlanMiss,
    /// A required OS capability is missing (e.g. screen recording).
    Permission(String),
    /// The configured external execution host is unreachable and no
    /// safe fallback is permitted.
    CompanionUnavailable,
}

impl DenyReason {
    /// The wire spelling of this reason code.
    pub fn code(&self) -> String {
        match self {
            Self::ParseError => "parse-error".into(),
            Self::UnsupportedConstruct => "unsupported-construct".into(),
            Self::ResolutionMiss => "resolution-miss".into(),
            Self::SecurityDeny => "security=deny".into(),
            Self::ApprovalRequired => "approval-required".into(),
            Self::AllowlistMiss => "allowlist-miss".into(),
            Self::ExecutionPlanMiss => "execution-plan-miss".into(),
            Self::Permission(capability) => format!("permission:{capability}"),
            Self::CompanionUnavailable => "companion-unavailable".into(),
        }
    }

    /// Parse a wire reason code back into a [`DenyReason`].
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "parse-error" => Some(Self::ParseError),
            "unsupported-construct" => Some(Self::UnsupportedConstruct),
            "resolution-miss" => Some(Self::ResolutionMiss),
            "security=deny" => Some(Self::SecurityDeny),
            "approval-required" => Some(Self::ApprovalRequired),
            "allowlist-miss" => Some(Self::AllowlistMiss),
            "execution-plan-miss" => Some(Self::ExecutionPlanMiss),
            "companion-unavailable" => Some(Self::CompanionUnavailable),
            other => other
                .strip_prefix("permission:")
                .map(|capability| Self::Permission(capability.to_string())),
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl Serialize for DenyReason {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.code())
    }
}

impl<'de> Deserialize<'de> for DenyReason {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = String::deserialize(deserializer)?;
        Self::from_code(&code)
            .ok_or_else(|| D::Error::custom(format!("unknown deny reason: {code}")))
    }
}

// ── Allowlist entries ───────────────────────────────────────────────────

/// A persisted allowlist record.
///
/// The pattern is a glob that may embed path separators or `~`. Entries
/// are created on allow-always approvals or explicit admin action,
/// touched (`last_used_at` / `usage_count`) on every successful match,
/// and never auto-deleted by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllowlistEntry {
    /// Glob pattern authorizing specific executables.
    pub pattern: String,

    /// When the entry was created.
    #[serde(alias = "createdAt")]
    pub created_at: DateTime<Utc>,

    /// When the entry last matched a permitted command.
    #[serde(default, alias = "lastUsedAt", skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,

    /// How many times the entry has matched.
    #[serde(default, alias = "usageCount")]
    pub usage_count: u64,
}

impl AllowlistEntry {
    /// Create a fresh entry for `pattern`, stamped now.
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            created_at: Utc::now(),
            last_used_at: None,
            usage_count: 0,
        }
    }

    /// Whether the pattern carries path semantics (contains a separator
    /// or `~`) as opposed to matching executable names only.
    pub fn is_path_pattern(&self) -> bool {
        self.pattern.contains('/') || self.pattern.contains('\\') || self.pattern.starts_with('~')
    }
}

/// Argument-shape constraints for a safe bin.
///
/// A safe bin with no profile is matched by name alone (weaker, flagged
/// as unprofiled); with a profile, every constraint present must hold.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SafeBinProfile {
    /// Executable basename the profile applies to.
    pub bin: String,

    /// When present, every argument must be one of these strings.
    #[serde(default, alias = "allowedArgs", skip_serializing_if = "Option::is_none")]
    pub allowed_args: Option<Vec<String>>,

    /// When present, at most this many arguments are accepted.
    #[serde(default, alias = "maxArgs", skip_serializing_if = "Option::is_none")]
    pub max_args: Option<usize>,
}

impl SafeBinProfile {
    /// Whether `args` (everything after the executable) satisfies the
    /// profile's argument shape.
    pub fn args_allowed(&self, args: &[String]) -> bool {
        if let Some(max) = self.max_args
            && args.len() > max
        {
            return false;
        }
        if let Some(allowed) = &self.allowed_args {
            return args.iter().all(|a| allowed.iter().any(|p| p == a));
        }
        true
    }
}

// ── Tests ───────────────────────────────────────────────────────────────
