//! Boundary types for the exec approval engine.
//!
//! These cross the tool-invocation layer as JSON: the inbound
//! [`ExecRequest`], the pre-execution [`GateDecision`] verdict, the
//! [`ExecutionPlan`] handed to the process runner, and the post-execution
//! [`RunResult`] fed back for audit and truncation annotation.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::security::{ApprovalDecision, DenyReason};

// ── Inbound request ─────────────────────────────────────────────────────

/// A command as submitted by the caller: either a raw shell string or an
/// explicit argv vector. An argv vector bypasses shell parsing entirely
/// but still flows through resolution and matching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandInput {
    /// Raw shell-like text to be parsed.
    Shell(String),
    /// Pre-split argv tokens; no grammar is applied.
    Argv(Vec<String>),
}

impl CommandInput {
    /// Whether this invocation arrived as a shell string.
    pub fn is_shell_string(&self) -> bool {
        matches!(self, Self::Shell(_))
    }
}

/// An inbound execution request from the tool-invocation/session layer.
///
/// Security and ask modes are resolved by the caller from per-agent and
/// global config and passed alongside as the effective `PolicyConfig`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecRequest {
    /// The command to evaluate.
    pub command: CommandInput,

    /// The original text as typed, when `command` was preprocessed.
    #[serde(default, alias = "rawCommand", skip_serializing_if = "Option::is_none")]
    pub raw_command: Option<String>,

    /// Working directory for relative-path resolution and execution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,

    /// Environment overrides consulted before the process environment
    /// (`PATH`, `PATHEXT`, `HOME`).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,

    /// Execution timeout in milliseconds.
    #[serde(default, alias = "timeoutMs", skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    /// Requesting agent, used for per-agent policy and allowlist scoping.
    #[serde(default, alias = "agentId", skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,

    /// Session the request originated from.
    #[serde(default, alias = "sessionKey", skip_serializing_if = "Option::is_none")]
    pub session_key: Option<String>,

    /// Decision from an approval prompt, when one was shown.
    #[serde(
        default,
        alias = "approvalDecision",
        skip_serializing_if = "Option::is_none"
    )]
    pub approval_decision: Option<ApprovalDecision>,

    /// Explicit out-of-band approval flag.
    #[serde(default)]
    pub approved: bool,

    /// Whether the command needs the screen-recording capability.
    #[serde(default, alias = "needsScreenRecording")]
    pub needs_screen_recording: bool,
}

impl ExecRequest {
    /// Build a request around a raw shell string.
    pub fn shell(command: impl Into<String>) -> Self {
        Self::new(CommandInput::Shell(command.into()))
    }

    /// Build a request around explicit argv tokens.
    pub fn argv(tokens: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self::new(CommandInput::Argv(
            tokens.into_iter().map(Into::into).collect(),
        ))
    }

    fn new(command: CommandInput) -> Self {
        Self {
            command,
            raw_command: None,
            cwd: None,
            env: HashMap::new(),
            timeout_ms: None,
            agent_id: None,
            session_key: None,
            approval_decision: None,
            approved: false,
            needs_screen_recording: false,
        }
    }
}

// ── Execution plan ──────────────────────────────────────────────────────

/// Where the plan's argv came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlanSource {
    /// The concrete, fully-resolved invocation the allowlist authorized.
    AllowlistResolved,
    /// The parsed raw tokens or the caller's explicit argv.
    Raw,
}

/// The final argv to hand to the process runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    /// Ordered tokens; `argv[0]` is the executable.
    pub argv: Vec<String>,
    /// Provenance of the tokens.
    pub source: PlanSource,
}

// ── Outbound verdict ────────────────────────────────────────────────────

/// The engine's pre-execution verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateDecision {
    /// Whether execution may proceed.
    pub ok: bool,

    /// Reason code on denial.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<DenyReason>,

    /// Short human-readable explanation. Never a stack trace or raw OS
    /// error.
    pub message: String,

    /// The plan to execute, present only when `ok`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<ExecutionPlan>,

    /// Whether approval came through the ask path rather than the
    /// allowlist.
    #[serde(default, alias = "approvedByAsk")]
    pub approved_by_ask: bool,

    /// Allowlist patterns that matched, recorded for audit.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matched_patterns: Vec<String>,
}

impl GateDecision {
    /// An allow verdict carrying the plan to execute.
    pub fn allow(plan: ExecutionPlan, approved_by_ask: bool, message: impl Into<String>) -> Self {
        Self {
            ok: true,
            reason: None,
            message: message.into(),
            plan: Some(plan),
            approved_by_ask,
            matched_patterns: Vec::new(),
        }
    }

    /// A denial with its reason code and human message.
    pub fn deny(reason: DenyReason, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            reason: Some(reason),
            message: message.into(),
            plan: None,
            approved_by_ask: false,
            matched_patterns: Vec::new(),
        }
    }
}

// ── Post-execution result ───────────────────────────────────────────────

/// What the external process runner reports back.
///
/// The engine only audits and annotates this; it never re-evaluates
/// policy against it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunResult {
    /// Captured standard output.
    #[serde(default)]
    pub stdout: String,

    /// Captured standard error.
    #[serde(default)]
    pub stderr: String,

    /// Process exit code; `-1` when the process never produced one.
    #[serde(default, alias = "exitCode")]
    pub exit_code: i32,

    /// Whether the process was signaled after exceeding its timeout.
    #[serde(default, alias = "timedOut")]
    pub timed_out: bool,

    /// Whether the run completed with a zero exit code.
    #[serde(default)]
    pub success: bool,

    /// Whether captured output was clipped to the byte limit.
    #[serde(default)]
    pub truncated: bool,

    /// Spawn or capture failure, when the process never ran to
    /// completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunResult {
    /// A result for a run that was cancelled or failed before spawn.
    pub fn not_executed(error: impl Into<String>) -> Self {
        Self {
            exit_code: -1,
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // -- command input --

    #[test]
    fn command_input_string_deserializes_as_shell() {
        let input: CommandInput = serde_json::from_str("\"ls -la\"").unwrap();
        assert_eq!(input, CommandInput::Shell("ls -la".into()));
        assert!(input.is_shell_string());
    }

    #[test]
    fn command_input_array_deserializes_as_argv() {
        let input: CommandInput = serde_json::from_str(r#"["ls","-la"]"#).unwrap();
        assert_eq!(input, CommandInput::Argv(vec!["ls".into(), "-la".into()]));
        assert!(!input.is_shell_string());
    }

    // -- exec request --

    #[test]
    fn request_from_wire_json() {
        let req: ExecRequest = serde_json::from_str(
            r#"{
                "command": "jq . file.json",
                "timeoutMs": 5000,
                "agentId": "main",
                "approvalDecision": "allow-always",
                "needsScreenRecording": false
            }"#,
        )
        .unwrap();
        assert!(req.command.is_shell_string());
        assert_eq!(req.timeout_ms, Some(5000));
        assert_eq!(req.agent_id.as_deref(), Some("main"));
        assert_eq!(req.approval_decision, Some(ApprovalDecision::AllowAlways));
        assert!(!req.approved);
    }

    #[test]
    fn request_builders() {
        let req = ExecRequest::shell("echo hi");
        assert!(req.command.is_shell_string());

        let req = ExecRequest::argv(["echo", "hi"]);
        assert_eq!(
            req.command,
            CommandInput::Argv(vec!["echo".into(), "hi".into()])
        );
    }

    // -- verdicts --

    #[test]
    fn allow_decision_carries_plan() {
        let plan = ExecutionPlan {
            argv: vec!["/bin/ls".into(), "-la".into()],
            source: PlanSource::AllowlistResolved,
        };
        let decision = GateDecision::allow(plan.clone(), false, "allowed");
        assert!(decision.ok);
        assert_eq!(decision.plan, Some(plan));
        assert!(decision.reason.is_none());
    }

    #[test]
    fn deny_decision_serializes_reason_code() {
        let decision = GateDecision::deny(DenyReason::AllowlistMiss, "not allowed");
        let json = serde_json::to_value(&decision).unwrap();
        assert_eq!(json["ok"], false);
        assert_eq!(json["reason"], "allowlist-miss");
        assert!(json.get("plan").is_none());
    }

    // -- run results --

    #[test]
    fn not_executed_result() {
        let result = RunResult::not_executed("cancelled before spawn");
        assert!(!result.success);
        assert_eq!(result.exit_code, -1);
        assert_eq!(result.error.as_deref(), Some("cancelled before spawn"));
    }

    #[test]
    fn run_result_accepts_camel_case() {
        let result: RunResult = serde_json::from_str(
            r#"{"stdout":"","stderr":"","exitCode":0,"timedOut":true,"success":false}"#,
        )
        .unwrap();
        assert!(result.timed_out);
        assert_eq!(result.exit_code, 0);
    }
}
