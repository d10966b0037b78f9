//! Execution planning: deriving the final argv, persisting allow-always
//! entries, and annotating truncated output.
//!
//! The strict path neutralizes any discrepancy between "what looked
//! safe" and "what will run": a single-segment command that passed on
//! the allowlist executes the matcher's resolved effective argv, never
//! the user-supplied tokens, and an absent effective argv is an
//! `execution-plan-miss` -- there is no silent fallback to raw tokens.

use tracing::debug;

use execgate_types::{
    AllowlistEntry, CommandInput, DenyReason, ExecutionPlan, Platform, PlanSource, RunResult,
    SecurityMode,
};

use crate::allowlist::MatchReport;
use crate::parse::AnalysisResult;

/// Marker appended to clipped output streams.
const TRUNCATION_MARKER: &str = "\n[output truncated]";

/// Everything the planner needs for one invocation.
#[derive(Debug)]
pub struct PlanInputs<'a> {
    pub security: SecurityMode,
    pub approved_by_ask: bool,
    pub platform: Platform,
    pub input: &'a CommandInput,
    pub analysis: &'a AnalysisResult,
    pub report: &'a MatchReport,
}

/// Derive the execution plan, or a denial.
pub fn build_plan(inputs: &PlanInputs<'_>) -> Result<ExecutionPlan, (DenyReason, String)> {
    let strict = inputs.security == SecurityMode::Allowlist
        && !inputs.approved_by_ask
        && inputs.analysis.is_single_segment();

    if strict {
        let effective = inputs
            .report
            .segments
            .first()
            .and_then(|s| s.effective_argv.clone());
        return match effective {
            Some(argv) if !argv.is_empty() => {
                debug!(?argv, "planned allowlist-resolved argv");
                Ok(ExecutionPlan {
                    argv,
                    source: PlanSource::AllowlistResolved,
                })
            }
            _ => Err((
                DenyReason::ExecutionPlanMiss,
                "allowlist match did not yield a concrete executable".into(),
            )),
        };
    }

    match inputs.input {
        CommandInput::Argv(tokens) => Ok(ExecutionPlan {
            argv: tokens.iter().filter(|t| !t.is_empty()).cloned().collect(),
            source: PlanSource::Raw,
        }),
        CommandInput::Shell(raw) => {
            if inputs.analysis.is_single_segment() {
                let argv = inputs
                    .analysis
                    .segments
                    .first()
                    .map(|s| s.argv.clone())
                    .unwrap_or_default();
                if argv.is_empty() {
                    return Err((
                        DenyReason::ExecutionPlanMiss,
                        "no tokens to execute".into(),
                    ));
                }
                Ok(ExecutionPlan {
                    argv,
                    source: PlanSource::Raw,
                })
            } else {
                // Chains and pipelines cannot be expressed as one argv;
                // they run through the platform shell, which is why the
                // evaluator re-checks shell strings before this point.
                Ok(ExecutionPlan {
                    argv: shell_wrap(raw, inputs.platform),
                    source: PlanSource::Raw,
                })
            }
        }
    }
}

fn shell_wrap(raw: &str, platform: Platform) -> Vec<String> {
    match platform {
        Platform::Posix => vec!["/bin/sh".into(), "-c".into(), raw.to_string()],
        Platform::Windows => vec!["cmd.exe".into(), "/C".into(), raw.to_string()],
    }
}

/// New allowlist entries for an allow-always approval: one pattern per
/// distinct resolved path. Patterns are derived from the resolved real
/// path, never the raw text; segments that did not resolve contribute
/// nothing.
pub fn derive_allow_always_entries(analysis: &AnalysisResult) -> Vec<AllowlistEntry> {
    let mut entries: Vec<AllowlistEntry> = Vec::new();
    for segment in &analysis.segments {
        let Some(path) = segment
            .resolution
            .as_ref()
            .and_then(|r| r.resolved_path.as_deref())
        else {
            continue;
        };
        let pattern = path.to_string_lossy().into_owned();
        if !entries.iter().any(|e| e.pattern == pattern) {
            entries.push(AllowlistEntry::new(pattern));
        }
    }
    entries
}

/// Re-annotate truncated captured output with a trailing marker on
/// whichever stream is non-empty (`stderr` preferred). Truncation is
/// never silently dropped.
pub fn annotate_truncation(result: &mut RunResult) {
    if !result.truncated {
        return;
    }
    if !result.stderr.is_empty() {
        result.stderr.push_str(TRUNCATION_MARKER);
    } else {
        result.stdout.push_str(TRUNCATION_MARKER);
    }
}

// ── Tests ───────────────────────────────────────────────────────────────
