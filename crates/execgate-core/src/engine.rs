//! The engine facade: parser -> resolver -> matcher -> evaluator ->
//! planner, wired behind one `evaluate` call.
//!
//! [`ExecGate`] owns the allowlist store handle, the safe-bin set,
//! trusted directories, skill-bin paths, and capability/companion state.
//! Parse and resolution failures fold into denials before reaching the
//! caller; raw OS errors are never forwarded. The engine performs no
//! retries -- it is purely a decision function.

use std::path::PathBuf;

use tracing::{debug, warn};

use execgate_types::{
    AllowlistEntry, ApprovalDecision, DenyReason, ExecConfig, ExecHost, ExecRequest, GateDecision,
    Platform, PolicyConfig, RunResult, SecurityMode,
};

use crate::allowlist::{AllowlistMatcher, AllowlistStore, MatchReport, SafeBinSet};
use crate::parse::{AnalysisFailure, AnalysisResult, analyze};
use crate::plan::{PlanInputs, annotate_truncation, build_plan, derive_allow_always_entries};
use crate::policy::{self, PolicyInput};
use crate::resolve::{ResolveContext, resolve_command};

/// OS capabilities granted to the gateway process.
#[derive(Debug, Clone, Copy, Default)]
pub struct Capabilities {
    /// Whether screen recording has been granted.
    pub screen_recording: bool,
}

/// The exec command security and approval engine.
pub struct ExecGate<S> {
    store: S,
    safe_bins: SafeBinSet,
    trusted_dirs: Vec<PathBuf>,
    skill_bins: Vec<PathBuf>,
    platform: Platform,
    capabilities: Capabilities,
    host: ExecHost,
    companion_online: bool,
    default_timeout_ms: u64,
    max_timeout_ms: u64,
}

impl<S: AllowlistStore> ExecGate<S> {
    /// An engine with the curated safe-bin set and no extra trust.
    pub fn new(store: S, platform: Platform) -> Self {
        Self {
            store,
            safe_bins: SafeBinSet::curated(),
            trusted_dirs: Vec::new(),
            skill_bins: Vec::new(),
            platform,
            capabilities: Capabilities::default(),
            host: ExecHost::Gateway,
            companion_online: false,
            default_timeout_ms: 30_000,
            max_timeout_ms: 300_000,
        }
    }

    /// An engine wired from configuration.
    pub fn from_config(config: &ExecConfig, store: S, platform: Platform) -> Self {
        Self {
            store,
            safe_bins: SafeBinSet::with_extras(&config.safe_bins, &config.safe_bin_profiles),
            trusted_dirs: config.trusted_dir_paths(),
            skill_bins: config.skill_bin_paths(),
            platform,
            capabilities: Capabilities::default(),
            host: config.host,
            companion_online: false,
            default_timeout_ms: config.default_timeout_ms,
            max_timeout_ms: config.max_timeout_ms,
        }
    }

    /// Replace the trusted directories.
    pub fn with_trusted_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.trusted_dirs = dirs;
        self
    }

    /// Replace the skill-supplied binary paths.
    pub fn with_skill_bins(mut self, bins: Vec<PathBuf>) -> Self {
        self.skill_bins = bins;
        self
    }

    /// Replace the granted capability set.
    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Route execution to a companion node instead of the gateway.
    pub fn with_host(mut self, host: ExecHost) -> Self {
        self.host = host;
        self
    }

    /// Report companion liveness; the gateway's transport layer owns
    /// the actual connection.
    pub fn set_companion_online(&mut self, online: bool) {
        self.companion_online = online;
    }

    /// The timeout the runner should enforce for this request.
    pub fn effective_timeout_ms(&self, request: &ExecRequest) -> u64 {
        request
            .timeout_ms
            .unwrap_or(self.default_timeout_ms)
            .min(self.max_timeout_ms)
    }

    /// Decide whether the request may execute, and with what argv.
    pub fn evaluate(&self, request: &ExecRequest, policy: &PolicyConfig) -> GateDecision {
        if self.host == ExecHost::Node && !self.companion_online {
            warn!("companion execution host is unreachable");
            return GateDecision::deny(
                DenyReason::CompanionUnavailable,
                "the configured execution host is unreachable",
            );
        }

        let analysis = self.analyze_and_resolve(request);
        let report = self.match_report(&analysis, policy);

        let verdict = policy::evaluate(&PolicyInput {
            security: policy.security,
            ask: policy.ask,
            analysis_ok: analysis.ok,
            allowlist_satisfied: report.satisfied,
            approval_decision: request.approval_decision,
            approved: request.approved,
            platform: self.platform,
            is_cmd_invocation: self.platform == Platform::Windows
                && request.command.is_shell_string(),
            is_shell_string: request.command.is_shell_string(),
        });

        if !verdict.allowed {
            // Surface the parse failure instead of a generic miss when
            // that is what actually sank the command.
            if !analysis.ok && verdict.reason == Some(DenyReason::AllowlistMiss) {
                return self.deny_for_analysis(&analysis);
            }
            warn!(reason = ?verdict.reason, "command denied");
            return GateDecision::deny(
                verdict.reason.unwrap_or(DenyReason::AllowlistMiss),
                verdict.message,
            );
        }

        // ok=false analysis is terminal: an unparseable command never
        // executes, not even with an approval in hand.
        if !analysis.ok {
            return self.deny_for_analysis(&analysis);
        }

        if request.needs_screen_recording && !self.capabilities.screen_recording {
            return GateDecision::deny(
                DenyReason::Permission("screen-recording".into()),
                "screen-recording permission has not been granted",
            );
        }

        // Fail-closed re-check: a shell string that passed only on the
        // allowlist is re-analyzed and re-matched so drift between
        // analysis time and execution time cannot reintroduce risk.
        let (analysis, report) = if policy.security == SecurityMode::Allowlist
            && request.command.is_shell_string()
            && !verdict.approved_by_ask
        {
            let fresh = self.analyze_and_resolve(request);
            let fresh_report = self.match_report(&fresh, policy);
            if !fresh.ok || !fresh_report.satisfied || !same_argvs(&analysis, &fresh) {
                warn!("command drifted between analysis and execution");
                return GateDecision::deny(
                    DenyReason::ExecutionPlanMiss,
                    "command changed between analysis and execution",
                );
            }
            (fresh, fresh_report)
        } else {
            (analysis, report)
        };

        let plan = match build_plan(&PlanInputs {
            security: policy.security,
            approved_by_ask: verdict.approved_by_ask,
            platform: self.platform,
            input: &request.command,
            analysis: &analysis,
            report: &report,
        }) {
            Ok(plan) => plan,
            Err((reason, message)) => return GateDecision::deny(reason, message),
        };

        if request.approval_decision == Some(ApprovalDecision::AllowAlways)
            && policy.security == SecurityMode::Allowlist
        {
            self.persist_allow_always(&analysis);
        }

        debug!(argv = ?plan.argv, source = ?plan.source, "command allowed");
        let mut decision = GateDecision::allow(plan, verdict.approved_by_ask, verdict.message);
        decision.matched_patterns = report.matched_patterns;
        decision
    }

    /// Record audit usage and annotate truncation after the external
    /// runner completes. Policy is never re-evaluated here.
    pub fn complete_run(&self, decision: &GateDecision, result: &mut RunResult) {
        if result.success && !decision.matched_patterns.is_empty() {
            if let Err(err) = self.store.touch(&decision.matched_patterns) {
                // Best-effort audit: a lost usage update is tolerable.
                warn!(error = %err, "failed to record allowlist usage");
            }
        }
        annotate_truncation(result);
    }

    /// Direct store access, for admin surfaces.
    pub fn store(&self) -> &S {
        &self.store
    }

    fn analyze_and_resolve(&self, request: &ExecRequest) -> AnalysisResult {
        let mut analysis = analyze(&request.command, self.platform);
        if !analysis.ok {
            return analysis;
        }
        let ctx = ResolveContext {
            cwd: request.cwd.as_deref(),
            env: &request.env,
            platform: self.platform,
        };
        for segment in &mut analysis.segments {
            let raw_executable = segment.argv[0].clone();
            segment.resolution = Some(resolve_command(&raw_executable, &ctx));
        }
        analysis
    }

    fn match_report(&self, analysis: &AnalysisResult, policy: &PolicyConfig) -> MatchReport {
        if !analysis.ok {
            return MatchReport::default();
        }
        let entries: Vec<AllowlistEntry> = match self.store.load() {
            Ok(entries) => entries,
            Err(err) => {
                // Fail closed: an unreadable store grants nothing.
                warn!(error = %err, "failed to load allowlist; treating as empty");
                Vec::new()
            }
        };
        AllowlistMatcher {
            entries: &entries,
            safe_bins: &self.safe_bins,
            trusted_dirs: &self.trusted_dirs,
            skill_bins: &self.skill_bins,
            auto_allow_skills: policy.auto_allow_skills,
            platform: self.platform,
        }
        .match_segments(&analysis.segments)
    }

    fn deny_for_analysis(&self, analysis: &AnalysisResult) -> GateDecision {
        let reason = match analysis.failure {
            Some(AnalysisFailure::Unsupported) => DenyReason::UnsupportedConstruct,
            _ => DenyReason::ParseError,
        };
        let message = analysis
            .reason
            .clone()
            .unwrap_or_else(|| "command could not be analyzed".into());
        warn!(%message, "command failed analysis");
        GateDecision::deny(reason, message)
    }

    fn persist_allow_always(&self, analysis: &AnalysisResult) {
        let entries = derive_allow_always_entries(analysis);
        if entries.is_empty() {
            return;
        }
        match self.store.append(&entries) {
            Ok(added) => debug!(added, "allow-always entries persisted"),
            // The approval itself stands; only the persistence failed.
            Err(err) => warn!(error = %err, "failed to persist allow-always entries"),
        }
    }
}

fn same_argvs(a: &AnalysisResult, b: &AnalysisResult) -> bool {
    a.segments.len() == b.segments.len()
        && a.segments
            .iter()
            .zip(&b.segments)
            .all(|(x, y)| x.argv == y.argv)
}

// ── Tests ───────────────────────────────────────────────────────────────
