//! # execgate-core
//!
//! The exec command security and approval engine: decides whether a
//! shell command or argv vector requested by an agent may run, with
//! what exact argv, and under what justification.
//!
//! Data flows parser -> resolver -> allowlist matcher -> policy
//! evaluator -> execution planner, with the audit recorder updating
//! allowlist usage after a successful run. Everything fails closed: any
//! ambiguity or unparseable input denies, never permits.
//!
//! - **[`parse`]** -- shell-string analysis without a real shell
//! - **[`resolve`]** -- executable resolution (PATH, PATHEXT, `~`, cwd)
//! - **[`allowlist`]** -- pattern/safe-bin/trusted-dir matching and the
//!   persisted store
//! - **[`policy`]** -- the allow/ask/deny guard chain
//! - **[`plan`]** -- final argv derivation and allow-always persistence
//! - **[`engine`]** -- the [`ExecGate`] facade wiring it all together
//! - **[`runner`]** -- the process-runner boundary and native impl

pub mod allowlist;
pub mod engine;
pub mod parse;
pub mod plan;
pub mod policy;
pub mod resolve;
pub mod runner;

pub use allowlist::{
    AllowlistMatcher, AllowlistStore, JsonFileStore, MatchKind, MatchReport, MemoryStore,
    SafeBinSet, SegmentMatch, is_interpreter,
};
pub use engine::{Capabilities, ExecGate};
pub use parse::{
    AnalysisFailure, AnalysisResult, CommandChain, CommandResolution, CommandSegment,
    SegmentGroup, analyze,
};
pub use plan::{PlanInputs, annotate_truncation, build_plan, derive_allow_always_entries};
pub use policy::{PolicyInput, PolicyVerdict};
pub use resolve::{ResolveContext, resolve_command};
pub use runner::{NativeRunner, ProcessRunner, RunOptions};
