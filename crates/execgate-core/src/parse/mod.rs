//! Command analysis: chain splitting, tokenization, and the
//! [`AnalysisResult`] the rest of the engine consumes.
//!
//! `analyze` is the sole entry point. It dispatches to the POSIX or
//! Windows grammar by an explicit [`Platform`] parameter; explicit argv
//! input bypasses parsing entirely but still flows through resolution
//! and matching. A failure in any phase is total -- no partial segment
//! list is ever returned, and `ok = false` is terminal for the
//! invocation.

mod posix;
mod windows;

use std::path::PathBuf;

use execgate_types::{CommandInput, Platform};

/// Which error-taxonomy bucket an analysis failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisFailure {
    /// Malformed quoting/escaping/heredoc, or an empty command/segment.
    Parse,
    /// A shell construct the engine refuses to model.
    Unsupported,
}

/// An internal parse failure, folded into [`AnalysisResult`] by `analyze`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ParseFailure {
    pub kind: AnalysisFailure,
    pub message: String,
}

impl ParseFailure {
    pub(crate) fn parse(message: impl Into<String>) -> Self {
        Self {
            kind: AnalysisFailure::Parse,
            message: message.into(),
        }
    }

    pub(crate) fn unsupported(message: impl Into<String>) -> Self {
        Self {
            kind: AnalysisFailure::Unsupported,
            message: message.into(),
        }
    }
}

/// The resolution of one segment's executable token.
///
/// Owned by the segment that produced it; never shared mutable state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResolution {
    /// The executable token exactly as written.
    pub raw_executable: String,
    /// Absolute filesystem path when resolution succeeded.
    pub resolved_path: Option<PathBuf>,
    /// Basename of the resolved path, or the raw token when unresolved --
    /// the value name-based safe-bin matching uses.
    pub executable_name: String,
}

/// One executable with its arguments, as parsed from a pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSegment {
    /// The segment's source text, trimmed.
    pub raw: String,
    /// Ordered tokens; `argv[0]` is the executable.
    pub argv: Vec<String>,
    /// Filled in by the resolver after parsing.
    pub resolution: Option<CommandResolution>,
}

impl CommandSegment {
    fn new(raw: impl Into<String>, argv: Vec<String>) -> Self {
        Self {
            raw: raw.into(),
            argv,
            resolution: None,
        }
    }

    /// Arguments after the executable token.
    pub fn args(&self) -> &[String] {
        self.argv.get(1..).unwrap_or(&[])
    }
}

/// A contiguous run of segments forming one pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentGroup {
    /// Index of the group's first segment in `AnalysisResult::segments`.
    pub first: usize,
    /// Number of piped segments in the group.
    pub count: usize,
}

/// Ordered pipeline groups separated by chain operators.
///
/// A chain parse never yields an empty group; a dangling operator is a
/// parse failure, not an implicit no-op.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandChain {
    pub groups: Vec<SegmentGroup>,
}

/// The parser's sole output type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisResult {
    /// Whether the command parsed completely.
    pub ok: bool,
    /// Failure bucket when `ok` is false.
    pub failure: Option<AnalysisFailure>,
    /// Human-readable failure description.
    pub reason: Option<String>,
    /// All parsed segments across every pipeline group, in order.
    pub segments: Vec<CommandSegment>,
    /// Pipeline grouping; `None` on failure.
    pub chain: Option<CommandChain>,
}

impl AnalysisResult {
    fn success(segments: Vec<CommandSegment>, chain: CommandChain) -> Self {
        Self {
            ok: true,
            failure: None,
            reason: None,
            segments,
            chain: Some(chain),
        }
    }

    fn fail(failure: ParseFailure) -> Self {
        Self {
            ok: false,
            failure: Some(failure.kind),
            reason: Some(failure.message),
            segments: Vec::new(),
            chain: None,
        }
    }

    /// Whether the command is a single segment in a single chain group.
    pub fn is_single_segment(&self) -> bool {
        self.segments.len() == 1
            && self
                .chain
                .as_ref()
                .is_some_and(|chain| chain.groups.len() == 1)
    }
}

/// Analyze a command for policy evaluation.
///
/// Shell strings go through the platform grammar; explicit argv input
/// becomes a single one-segment, one-group chain and cannot fail on
/// grammar (an all-empty argv still fails as an empty command).
pub fn analyze(input: &CommandInput, platform: Platform) -> AnalysisResult {
    match input {
        CommandInput::Argv(tokens) => analyze_argv(tokens),
        CommandInput::Shell(raw) => match platform {
            Platform::Posix => analyze_posix(raw),
            Platform::Windows => analyze_windows(raw),
        },
    }
}

fn analyze_argv(tokens: &[String]) -> AnalysisResult {
    let argv: Vec<String> = tokens.iter().filter(|t| !t.is_empty()).cloned().collect();
    if argv.is_empty() {
        return AnalysisResult::fail(ParseFailure::parse("empty command"));
    }
    let raw = argv.join(" ");
    let segments = vec![CommandSegment::new(raw, argv)];
    let chain = CommandChain {
        groups: vec![SegmentGroup { first: 0, count: 1 }],
    };
    AnalysisResult::success(segments, chain)
}

fn analyze_posix(raw: &str) -> AnalysisResult {
    if raw.trim().is_empty() {
        return AnalysisResult::fail(ParseFailure::parse("empty command"));
    }

    let parts = match posix::split_chains(raw) {
        Ok(parts) => parts,
        Err(failure) => return AnalysisResult::fail(failure),
    };

    let mut segments = Vec::new();
    let mut groups = Vec::new();
    for part in &parts {
        let piped = match posix::split_pipeline(part) {
            Ok(piped) => piped,
            Err(failure) => return AnalysisResult::fail(failure),
        };
        let first = segments.len();
        for text in &piped {
            let argv = match posix::tokenize(text) {
                Ok(argv) => argv,
                Err(failure) => return AnalysisResult::fail(failure),
            };
            if argv.is_empty() {
                return AnalysisResult::fail(ParseFailure::parse("empty command"));
            }
            segments.push(CommandSegment::new(text.trim(), argv));
        }
        groups.push(SegmentGroup {
            first,
            count: segments.len() - first,
        });
    }

    AnalysisResult::success(segments, CommandChain { groups })
}

fn analyze_windows(raw: &str) -> AnalysisResult {
    if raw.trim().is_empty() {
        return AnalysisResult::fail(ParseFailure::parse("empty command"));
    }
    let argv = match windows::tokenize(raw) {
        Ok(argv) => argv,
        Err(failure) => return AnalysisResult::fail(failure),
    };
    if argv.is_empty() {
        return AnalysisResult::fail(ParseFailure::parse("empty command"));
    }
    let segments = vec![CommandSegment::new(raw.trim(), argv)];
    let chain = CommandChain {
        groups: vec![SegmentGroup { first: 0, count: 1 }],
    };
    AnalysisResult::success(segments, chain)
}

// ── Tests ───────────────────────────────────────────────────────────────
