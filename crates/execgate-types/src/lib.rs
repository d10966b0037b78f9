//! # execgate-types
//!
//! Shared type definitions for the execgate command approval engine.
//!
//! This crate is the foundation of the dependency graph -- the engine
//! crate depends on it, and gateway callers use it to build requests and
//! read verdicts. It contains:
//!
//! - **[`error`]** -- [`ExecGateError`] and [`StoreError`] infrastructure errors
//! - **[`config`]** -- Exec engine configuration schema with per-agent overrides
//! - **[`security`]** -- Policy modes, approval decisions, deny reasons,
//!   allowlist entries, and safe-bin profiles
//! - **[`request`]** -- Boundary types: requests, verdicts, plans, run results

pub mod config;
pub mod error;
pub mod request;
pub mod security;

pub use config::{ExecConfig, ExecHost, ExecPolicyOverride, expand_tilde};
pub use error::{ExecGateError, Result, StoreError};
pub use request::{
    CommandInput, ExecRequest, ExecutionPlan, GateDecision, PlanSource, RunResult,
};
pub use security::{
    AllowlistEntry, ApprovalDecision, AskMode, DenyReason, Platform, PolicyConfig, SafeBinProfile,
    SecurityMode,
};
