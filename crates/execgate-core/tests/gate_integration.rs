//! Integration tests for the full approval pipeline.
//!
//! Exercises `ExecGate` end to end: requests arrive as shell strings or
//! argv, flow through parsing, resolution, allowlist matching, and
//! policy evaluation, and come back as verdicts with execution plans.
//! Filesystem-backed scenarios build their own `PATH` with fake
//! executables so nothing depends on the host system.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use execgate_core::runner::{NativeRunner, ProcessRunner, RunOptions};
use execgate_core::{AllowlistStore, Capabilities, ExecGate, JsonFileStore, MemoryStore};
use execgate_types::{
    AllowlistEntry, ApprovalDecision, AskMode, DenyReason, ExecRequest, PlanSource, PolicyConfig,
    Platform, RunResult, SafeBinProfile, SecurityMode,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Create a fake executable in `dir` and return its path.
#[cfg(unix)]
fn make_executable(dir: &Path, name: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;
    let path = dir.join(name);
    std::fs::write(&path, "#!/bin/sh\nexit 0\n").unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

/// A PATH environment pointing only at `dir`.
fn path_env(dir: &Path) -> HashMap<String, String> {
    HashMap::from([("PATH".to_string(), dir.to_string_lossy().into_owned())])
}

fn allowlist_policy() -> PolicyConfig {
    PolicyConfig {
        security: SecurityMode::Allowlist,
        ask: AskMode::OnMiss,
        auto_allow_skills: false,
    }
}

fn shell_request(command: &str, env: HashMap<String, String>) -> ExecRequest {
    let mut request = ExecRequest::shell(command);
    request.env = env;
    request
}

fn gate_with(store: MemoryStore) -> ExecGate<MemoryStore> {
    ExecGate::new(store, Platform::Posix)
}

// ===========================================================================
// 1. Core approval scenarios
// ===========================================================================

/// A safe-bin command under allowlist mode is allowed.
#[cfg(unix)]
#[test]
fn safe_bin_command_allowed_in_allowlist_mode() {
    let dir = tempfile::tempdir().unwrap();
    make_executable(dir.path(), "jq");
    let gate = gate_with(MemoryStore::new());

    let decision = gate.evaluate(
        &shell_request("jq . file.json", path_env(dir.path())),
        &allowlist_policy(),
    );
    assert!(decision.ok, "message: {}", decision.message);
}

/// An unlisted destructive command misses the allowlist.
#[cfg(unix)]
#[test]
fn unlisted_destructive_command_denied() {
    let dir = tempfile::tempdir().unwrap();
    make_executable(dir.path(), "rm");
    let gate = gate_with(MemoryStore::new());

    let decision = gate.evaluate(
        &shell_request("rm -rf /", path_env(dir.path())),
        &allowlist_policy(),
    );
    assert!(!decision.ok);
    assert_eq!(decision.reason, Some(DenyReason::AllowlistMiss));
}

/// A chain is allowed only when every part is; a profile
/// excluding one argument denies the whole chain.
#[cfg(unix)]
#[test]
fn chain_allowed_only_when_every_part_is() {
    let dir = tempfile::tempdir().unwrap();
    make_executable(dir.path(), "echo");

    // Both chain parts satisfied.
    let gate = gate_with(MemoryStore::new());
    let decision = gate.evaluate(
        &shell_request("echo a && echo b", path_env(dir.path())),
        &allowlist_policy(),
    );
    assert!(decision.ok, "message: {}", decision.message);

    // A profile that only permits "a" sinks the second part, and with
    // it the entire chain.
    let config = execgate_types::ExecConfig {
        safe_bin_profiles: vec![SafeBinProfile {
            bin: "echo".into(),
            allowed_args: Some(vec!["a".into()]),
            max_args: None,
        }],
        ..Default::default()
    };
    let gate = ExecGate::from_config(&config, MemoryStore::new(), Platform::Posix);
    let decision = gate.evaluate(
        &shell_request("echo a && echo b", path_env(dir.path())),
        &allowlist_policy(),
    );
    assert!(!decision.ok);
    assert_eq!(decision.reason, Some(DenyReason::AllowlistMiss));
}

/// Backtick substitution is rejected with a reason that
/// names it.
#[test]
fn backtick_substitution_rejected() {
    let gate = gate_with(MemoryStore::new());
    let decision = gate.evaluate(&ExecRequest::shell("id `whoami`"), &allowlist_policy());
    assert!(!decision.ok);
    assert_eq!(decision.reason, Some(DenyReason::UnsupportedConstruct));
    assert!(decision.message.contains("backtick"));
}

/// Allow-always persists a pattern derived from the
/// resolved path, not the literal text.
#[cfg(unix)]
#[test]
fn allow_always_persists_pattern_from_resolved_path() {
    let dir = tempfile::tempdir().unwrap();
    let resolved = make_executable(dir.path(), "ls");
    let gate = gate_with(MemoryStore::new());

    let mut request = shell_request("ls -la /tmp", path_env(dir.path()));
    request.approval_decision = Some(ApprovalDecision::AllowAlways);
    let decision = gate.evaluate(&request, &allowlist_policy());
    assert!(decision.ok);

    let entries = gate.store().load().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].pattern, resolved.to_string_lossy());
    assert_ne!(entries[0].pattern, "ls");

    // The persisted entry now covers the command without any approval.
    let decision = gate.evaluate(
        &shell_request("ls -la /tmp", path_env(dir.path())),
        &allowlist_policy(),
    );
    assert!(decision.ok);
    assert!(!decision.approved_by_ask);
}

/// Bare `&` (background execution) is unsupported on both platforms.
#[test]
fn background_ampersand_rejected_on_both_platforms() {
    let posix = gate_with(MemoryStore::new());
    let decision = posix.evaluate(&ExecRequest::shell("a & b"), &allowlist_policy());
    assert!(!decision.ok);
    assert_eq!(decision.reason, Some(DenyReason::UnsupportedConstruct));

    let windows = ExecGate::new(MemoryStore::new(), Platform::Windows);
    let decision = windows.evaluate(&ExecRequest::shell("a & b"), &allowlist_policy());
    assert!(!decision.ok);
    assert_eq!(decision.reason, Some(DenyReason::UnsupportedConstruct));
}

// ===========================================================================
// 2. Trusted directories and skill bins
// ===========================================================================

/// A resolved path under a trusted directory satisfies the allowlist
/// with no explicit patterns at all.
#[cfg(unix)]
#[test]
fn trusted_dir_allows_without_patterns() {
    let dir = tempfile::tempdir().unwrap();
    make_executable(dir.path(), "deploy");
    let gate = gate_with(MemoryStore::new()).with_trusted_dirs(vec![dir.path().to_path_buf()]);

    let decision = gate.evaluate(
        &shell_request("deploy --prod", path_env(dir.path())),
        &allowlist_policy(),
    );
    assert!(decision.ok, "message: {}", decision.message);
}

#[cfg(unix)]
#[test]
fn skill_bins_honored_only_with_auto_allow() {
    let dir = tempfile::tempdir().unwrap();
    let bin = make_executable(dir.path(), "fetch");
    let gate = gate_with(MemoryStore::new()).with_skill_bins(vec![bin]);

    let off = gate.evaluate(
        &shell_request("fetch --city berlin", path_env(dir.path())),
        &allowlist_policy(),
    );
    assert!(!off.ok);

    let on = gate.evaluate(
        &shell_request("fetch --city berlin", path_env(dir.path())),
        &PolicyConfig {
            auto_allow_skills: true,
            ..allowlist_policy()
        },
    );
    assert!(on.ok, "message: {}", on.message);
}

// ===========================================================================
// 3. Execution plans
// ===========================================================================

/// The strict allowlist path substitutes the resolved argv.
#[cfg(unix)]
#[test]
fn plan_neutralizes_raw_tokens() {
    let dir = tempfile::tempdir().unwrap();
    let resolved = make_executable(dir.path(), "mytool");
    let store = MemoryStore::with_entries(vec![AllowlistEntry::new(
        resolved.to_string_lossy().into_owned(),
    )]);
    let gate = gate_with(store);

    let decision = gate.evaluate(
        &shell_request("mytool --flag", path_env(dir.path())),
        &allowlist_policy(),
    );
    assert!(decision.ok);
    let plan = decision.plan.unwrap();
    assert_eq!(plan.source, PlanSource::AllowlistResolved);
    assert_eq!(
        plan.argv,
        vec![resolved.to_string_lossy().into_owned(), "--flag".to_string()]
    );
}

/// Ask-approved commands keep their raw tokens.
#[test]
fn approved_plan_keeps_raw_tokens() {
    let gate = gate_with(MemoryStore::new());
    let mut request = ExecRequest::shell("sometool --x");
    request.approved = true;
    let decision = gate.evaluate(&request, &allowlist_policy());
    assert!(decision.ok);
    let plan = decision.plan.unwrap();
    assert_eq!(plan.source, PlanSource::Raw);
    assert_eq!(plan.argv, vec!["sometool", "--x"]);
}

/// Explicit argv input flows through without shell parsing.
#[test]
fn argv_request_bypasses_grammar() {
    let gate = gate_with(MemoryStore::new());
    // These tokens would be metacharacters in a shell string; as argv
    // they are inert data.
    let mut request = ExecRequest::argv(["printf", "a && b `x`"]);
    request.approved = true;
    let decision = gate.evaluate(
        &request,
        &PolicyConfig {
            security: SecurityMode::Ask,
            ..allowlist_policy()
        },
    );
    assert!(decision.ok, "message: {}", decision.message);
    assert_eq!(
        decision.plan.unwrap().argv,
        vec!["printf".to_string(), "a && b `x`".to_string()]
    );
}

// ===========================================================================
// 4. Persisted store wiring
// ===========================================================================

/// The JSON file store works end to end: allow-always writes survive a
/// reopen, and usage is recorded after a successful run.
#[cfg(unix)]
#[test]
fn file_store_roundtrip_with_audit() {
    let state = tempfile::tempdir().unwrap();
    let bin_dir = tempfile::tempdir().unwrap();
    make_executable(bin_dir.path(), "mytool");
    let store_path = state.path().join("allowlist.json");

    {
        let gate = ExecGate::new(JsonFileStore::new(&store_path), Platform::Posix);
        let mut request = shell_request("mytool run", path_env(bin_dir.path()));
        request.approval_decision = Some(ApprovalDecision::AllowAlways);
        assert!(gate.evaluate(&request, &allowlist_policy()).ok);
    }

    // Reopen: the entry must be there, and the command now passes on
    // the allowlist alone.
    let gate = ExecGate::new(JsonFileStore::new(&store_path), Platform::Posix);
    let decision = gate.evaluate(
        &shell_request("mytool run", path_env(bin_dir.path())),
        &allowlist_policy(),
    );
    assert!(decision.ok);
    assert!(!decision.approved_by_ask);
    assert_eq!(decision.matched_patterns.len(), 1);

    let mut result = RunResult {
        success: true,
        ..Default::default()
    };
    gate.complete_run(&decision, &mut result);

    let entries = gate.store().load().unwrap();
    assert_eq!(entries[0].usage_count, 1);
    assert!(entries[0].last_used_at.is_some());
}

// ===========================================================================
// 5. End-to-end with the native runner
// ===========================================================================

/// A full pass: evaluate, execute the plan, feed the result back.
#[cfg(unix)]
#[tokio::test]
async fn evaluate_then_run_then_audit() {
    let dir = tempfile::tempdir().unwrap();
    make_executable(dir.path(), "echo");
    let gate = gate_with(MemoryStore::new());
    let request = shell_request("echo hello", path_env(dir.path()));

    let decision = gate.evaluate(&request, &allowlist_policy());
    assert!(decision.ok, "message: {}", decision.message);
    let plan = decision.plan.clone().unwrap();

    let runner = NativeRunner::default();
    let mut result = runner
        .run(
            &plan,
            RunOptions {
                timeout_ms: gate.effective_timeout_ms(&request),
                ..Default::default()
            },
        )
        .await;
    assert!(result.success, "error: {:?}", result.error);

    gate.complete_run(&decision, &mut result);
    assert!(!result.truncated);
}

/// Timeouts are enforced by the runner, not re-judged by the engine.
#[tokio::test]
async fn runner_enforces_timeout() {
    let runner = NativeRunner::default();
    let plan = execgate_types::ExecutionPlan {
        argv: vec!["sleep".into(), "30".into()],
        source: PlanSource::Raw,
    };
    let result = runner
        .run(
            &plan,
            RunOptions {
                timeout_ms: 100,
                ..Default::default()
            },
        )
        .await;
    assert!(result.timed_out);
    assert!(!result.success);
}

// ===========================================================================
// 6. Policy modes and capabilities
// ===========================================================================

#[test]
fn deny_mode_wins_over_everything() {
    let gate = gate_with(MemoryStore::new());
    let mut request = ExecRequest::shell("echo hi");
    request.approved = true;
    request.approval_decision = Some(ApprovalDecision::AllowAlways);

    let decision = gate.evaluate(
        &request,
        &PolicyConfig {
            security: SecurityMode::Deny,
            ..allowlist_policy()
        },
    );
    assert!(!decision.ok);
    assert_eq!(decision.reason, Some(DenyReason::SecurityDeny));
}

#[test]
fn ask_off_makes_misses_final() {
    let gate = gate_with(MemoryStore::new());
    let mut request = ExecRequest::shell("sometool");
    request.approved = true;

    let decision = gate.evaluate(
        &request,
        &PolicyConfig {
            ask: AskMode::Off,
            ..allowlist_policy()
        },
    );
    assert!(!decision.ok);
    assert_eq!(decision.reason, Some(DenyReason::AllowlistMiss));
}

#[cfg(unix)]
#[test]
fn capability_gate_applies_to_allowed_commands() {
    let dir = tempfile::tempdir().unwrap();
    make_executable(dir.path(), "jq");
    let mut request = shell_request("jq .", path_env(dir.path()));
    request.needs_screen_recording = true;

    let denied = gate_with(MemoryStore::new()).evaluate(&request, &allowlist_policy());
    assert_eq!(
        denied.reason,
        Some(DenyReason::Permission("screen-recording".into()))
    );
    assert_eq!(denied.reason.unwrap().code(), "permission:screen-recording");

    let granted = gate_with(MemoryStore::new())
        .with_capabilities(Capabilities {
            screen_recording: true,
        })
        .evaluate(&request, &allowlist_policy());
    assert!(granted.ok);
}

// ===========================================================================
// 7. Wire formats
// ===========================================================================

/// A request arriving as gateway JSON evaluates like a built one.
#[cfg(unix)]
#[test]
fn wire_request_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    make_executable(dir.path(), "jq");
    let json = format!(
        r#"{{
            "command": "jq . data.json",
            "env": {{"PATH": "{}"}},
            "timeoutMs": 5000,
            "agentId": "main"
        }}"#,
        dir.path().to_string_lossy()
    );
    let request: ExecRequest = serde_json::from_str(&json).unwrap();

    let gate = gate_with(MemoryStore::new());
    let decision = gate.evaluate(&request, &allowlist_policy());
    assert!(decision.ok, "message: {}", decision.message);

    let wire = serde_json::to_value(&decision).unwrap();
    assert_eq!(wire["ok"], true);
    assert!(wire.get("reason").is_none());
    assert!(wire["plan"]["argv"].is_array());
}

#[test]
fn wire_denial_carries_reason_code() {
    let gate = gate_with(MemoryStore::new());
    let decision = gate.evaluate(&ExecRequest::shell("a || b"), &allowlist_policy());
    let wire = serde_json::to_value(&decision).unwrap();
    assert_eq!(wire["ok"], false);
    assert_eq!(wire["reason"], "unsupported-construct");
}
