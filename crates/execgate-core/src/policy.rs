//! Policy evaluation: the strict guard chain combining security mode,
//! ask mode, allowlist state, and the caller's approval.
//!
//! Rules are evaluated in order and the first denial wins -- there is
//! never an implicit fallthrough. An unparsed command can never be "in
//! the allowlist": a failed analysis downgrades `allowlist_satisfied`
//! before any mode-specific rule runs.

use tracing::debug;

use execgate_types::{ApprovalDecision, AskMode, DenyReason, Platform, SecurityMode};

/// Everything the evaluator needs for one invocation.
#[derive(Debug, Clone)]
pub struct PolicyInput {
    /// Effective security mode.
    pub security: SecurityMode,
    /// Effective ask mode.
    pub ask: AskMode,
    /// Whether analysis produced a complete segment list.
    pub analysis_ok: bool,
    /// Whether every segment matched an allowlist mechanism.
    pub allowlist_satisfied: bool,
    /// Decision from an approval prompt, when one was shown.
    pub approval_decision: Option<ApprovalDecision>,
    /// Explicit out-of-band approval flag.
    pub approved: bool,
    /// Which platform grammar analyzed the command.
    pub platform: Platform,
    /// Whether this is a `cmd.exe`-style invocation.
    pub is_cmd_invocation: bool,
    /// Whether the command arrived as a shell string rather than argv.
    pub is_shell_string: bool,
}

/// The evaluator's verdict. `analysis_ok` / `allowlist_satisfied` are
/// echoed back, possibly downgraded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyVerdict {
    /// Whether the invocation passed the guard chain.
    pub allowed: bool,
    /// Denial reason when not allowed.
    pub reason: Option<DenyReason>,
    /// Short human-readable explanation.
    pub message: String,
    /// True when approval came through the ask path rather than the
    /// allowlist.
    pub approved_by_ask: bool,
    /// Analysis state after downgrades.
    pub analysis_ok: bool,
    /// Allowlist state after downgrades.
    pub allowlist_satisfied: bool,
}

impl PolicyVerdict {
    fn allow(
        message: impl Into<String>,
        approved_by_ask: bool,
        analysis_ok: bool,
        allowlist_satisfied: bool,
    ) -> Self {
        Self {
            allowed: true,
            reason: None,
            message: message.into(),
            approved_by_ask,
            analysis_ok,
            allowlist_satisfied,
        }
    }

    fn deny(
        reason: DenyReason,
        message: impl Into<String>,
        analysis_ok: bool,
        allowlist_satisfied: bool,
    ) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
            message: message.into(),
            approved_by_ask: false,
            analysis_ok,
            allowlist_satisfied,
        }
    }
}

/// Run the guard chain.
pub fn evaluate(input: &PolicyInput) -> PolicyVerdict {
    let analysis_ok = input.analysis_ok;
    // An unparsed command can never be in the allowlist.
    let allowlist_satisfied = input.allowlist_satisfied && analysis_ok;
    let has_approval = input.approved || input.approval_decision.is_some();

    let verdict = match input.security {
        SecurityMode::Deny => PolicyVerdict::deny(
            DenyReason::SecurityDeny,
            "command execution is disabled by policy",
            analysis_ok,
            allowlist_satisfied,
        ),
        SecurityMode::Allowlist => {
            if allowlist_satisfied {
                PolicyVerdict::allow(
                    "command covered by the allowlist",
                    false,
                    analysis_ok,
                    allowlist_satisfied,
                )
            } else if input.ask.permits_approval() && has_approval {
                PolicyVerdict::allow(
                    "command approved interactively",
                    true,
                    analysis_ok,
                    allowlist_satisfied,
                )
            } else {
                PolicyVerdict::deny(
                    DenyReason::AllowlistMiss,
                    "command is not covered by the allowlist",
                    analysis_ok,
                    allowlist_satisfied,
                )
            }
        }
        SecurityMode::Ask => {
            if has_approval {
                PolicyVerdict::allow(
                    "command approved interactively",
                    true,
                    analysis_ok,
                    allowlist_satisfied,
                )
            } else {
                PolicyVerdict::deny(
                    DenyReason::ApprovalRequired,
                    "command requires approval",
                    analysis_ok,
                    allowlist_satisfied,
                )
            }
        }
    };

    debug!(
        security = ?input.security,
        ask = ?input.ask,
        allowed = verdict.allowed,
        approved_by_ask = verdict.approved_by_ask,
        reason = ?verdict.reason,
        "policy evaluated"
    );
    verdict
}

// ── Tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> PolicyInput {
        PolicyInput {
            security: SecurityMode::Allowlist,
            ask: AskMode::OnMiss,
            analysis_ok: true,
            allowlist_satisfied: false,
            approval_decision: None,
            approved: false,
            platform: Platform::Posix,
            is_cmd_invocation: false,
            is_shell_string: true,
        }
    }

    // -- deny mode --

    #[test]
    fn deny_mode_always_denies() {
        let verdict = evaluate(&PolicyInput {
            security: SecurityMode::Deny,
            allowlist_satisfied: true,
            approved: true,
            approval_decision: Some(ApprovalDecision::AllowAlways),
            ..input()
        });
        assert!(!verdict.allowed);
        assert_eq!(verdict.reason, Some(DenyReason::SecurityDeny));
    }

    // -- analysis downgrade --

    #[test]
    fn failed_analysis_forces_allowlist_miss() {
        let verdict = evaluate(&PolicyInput {
            analysis_ok: false,
            allowlist_satisfied: true,
            ..input()
        });
        assert!(!verdict.allowed);
        assert!(!verdict.allowlist_satisfied);
        assert_eq!(verdict.reason, Some(DenyReason::AllowlistMiss));
    }

    // -- allowlist mode --

    #[test]
    fn allowlist_satisfied_allows_without_ask() {
        let verdict = evaluate(&PolicyInput {
            allowlist_satisfied: true,
            ..input()
        });
        assert!(verdict.allowed);
        assert!(!verdict.approved_by_ask);
    }

    #[test]
    fn allowlist_miss_with_approval_allows_via_ask() {
        for decision in [ApprovalDecision::AllowOnce, ApprovalDecision::AllowAlways] {
            let verdict = evaluate(&PolicyInput {
                approval_decision: Some(decision),
                ..input()
            });
            assert!(verdict.allowed);
            assert!(verdict.approved_by_ask);
        }

        let verdict = evaluate(&PolicyInput {
            approved: true,
            ..input()
        });
        assert!(verdict.allowed);
        assert!(verdict.approved_by_ask);
    }

    #[test]
    fn allowlist_miss_without_approval_denies() {
        let verdict = evaluate(&input());
        assert!(!verdict.allowed);
        assert_eq!(verdict.reason, Some(DenyReason::AllowlistMiss));
    }

    #[test]
    fn ask_off_blocks_interactive_approval() {
        let verdict = evaluate(&PolicyInput {
            ask: AskMode::Off,
            approved: true,
            approval_decision: Some(ApprovalDecision::AllowOnce),
            ..input()
        });
        assert!(!verdict.allowed);
        assert_eq!(verdict.reason, Some(DenyReason::AllowlistMiss));
    }

    #[test]
    fn ask_off_still_allows_allowlisted_commands() {
        let verdict = evaluate(&PolicyInput {
            ask: AskMode::Off,
            allowlist_satisfied: true,
            ..input()
        });
        assert!(verdict.allowed);
    }

    // -- ask mode --

    #[test]
    fn ask_mode_requires_approval() {
        let verdict = evaluate(&PolicyInput {
            security: SecurityMode::Ask,
            allowlist_satisfied: true,
            ..input()
        });
        assert!(!verdict.allowed);
        assert_eq!(verdict.reason, Some(DenyReason::ApprovalRequired));
    }

    #[test]
    fn ask_mode_allows_with_approval() {
        let verdict = evaluate(&PolicyInput {
            security: SecurityMode::Ask,
            approval_decision: Some(ApprovalDecision::AllowOnce),
            ..input()
        });
        assert!(verdict.allowed);
        assert!(verdict.approved_by_ask);
    }

    // -- first denial wins --

    #[test]
    fn deny_wins_over_parse_failure() {
        let verdict = evaluate(&PolicyInput {
            security: SecurityMode::Deny,
            analysis_ok: false,
            ..input()
        });
        assert_eq!(verdict.reason, Some(DenyReason::SecurityDeny));
    }
}
