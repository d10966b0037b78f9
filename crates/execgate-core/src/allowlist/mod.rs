//! Allowlist matching: persisted glob patterns, safe bins, trusted
//! directories, and skill-bin trust.
//!
//! Matching always runs against the resolved real path, never the raw
//! executable token -- except name-only matches (safe bins and
//! separator-free entries), which are explicitly name-based and weaker
//! by design. A command is fully satisfied only when every segment
//! matches via at least one mechanism; one unmatched segment fails the
//! whole command.

pub mod safe_bins;
pub mod store;

use std::path::{Path, PathBuf};

use regex::RegexBuilder;
use tracing::warn;

use execgate_types::{AllowlistEntry, Platform, expand_tilde};

use crate::parse::CommandSegment;

pub use safe_bins::{SAFE_BINS, SafeBinSet, is_interpreter};
pub use store::{AllowlistStore, JsonFileStore, MemoryStore};

// ── Match outcomes ──────────────────────────────────────────────────────

/// Which mechanism satisfied a segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchKind {
    /// A persisted path-pattern entry matched the resolved path.
    PathPattern,
    /// A persisted separator-free entry matched the executable name.
    NameEntry,
    /// The executable is in the safe-bin set. `unprofiled` flags a
    /// name-only match with no argument-shape profile.
    SafeBin { unprofiled: bool },
    /// The resolved path lies under a trusted directory.
    TrustedDir,
    /// The resolved path is a skill-supplied binary.
    SkillBin,
}

/// One segment's match outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentMatch {
    /// Whether any mechanism covered the segment.
    pub matched: bool,
    /// The mechanism that matched first.
    pub kind: Option<MatchKind>,
    /// The entry pattern that matched, for audit.
    pub entry_pattern: Option<String>,
    /// The concrete, fully-resolved argv the allowlist authorized:
    /// resolved path plus the segment's arguments. Absent when the
    /// executable did not resolve.
    pub effective_argv: Option<Vec<String>>,
}

/// The matcher's verdict over a whole command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchReport {
    /// Per-segment outcomes, in segment order.
    pub segments: Vec<SegmentMatch>,
    /// True only when every segment matched.
    pub satisfied: bool,
    /// Deduplicated entry patterns that matched, for usage recording.
    pub matched_patterns: Vec<String>,
}

// ── Matcher ─────────────────────────────────────────────────────────────

/// Evaluates segments against every configured trust mechanism.
///
/// Matching is a pure function of its inputs plus filesystem state read
/// during canonicalization: evaluating the same resolution against the
/// same allowlist state twice yields the same match set.
#[derive(Debug)]
pub struct AllowlistMatcher<'a> {
    pub entries: &'a [AllowlistEntry],
    pub safe_bins: &'a SafeBinSet,
    pub trusted_dirs: &'a [PathBuf],
    pub skill_bins: &'a [PathBuf],
    pub auto_allow_skills: bool,
    pub platform: Platform,
}

impl AllowlistMatcher<'_> {
    /// Match every segment; the report is satisfied only when all are.
    pub fn match_segments(&self, segments: &[CommandSegment]) -> MatchReport {
        let mut report = MatchReport::default();
        for segment in segments {
            let outcome = self.match_segment(segment);
            if let Some(pattern) = &outcome.entry_pattern
                && !report.matched_patterns.contains(pattern)
            {
                report.matched_patterns.push(pattern.clone());
            }
            report.segments.push(outcome);
        }
        report.satisfied = !report.segments.is_empty() && report.segments.iter().all(|s| s.matched);
        report
    }

    fn match_segment(&self, segment: &CommandSegment) -> SegmentMatch {
        let resolved = segment
            .resolution
            .as_ref()
            .and_then(|r| r.resolved_path.as_deref());
        let executable_name = segment
            .resolution
            .as_ref()
            .map(|r| r.executable_name.as_str())
            .unwrap_or_else(|| basename(segment.argv.first().map_or("", String::as_str)));

        let effective_argv = resolved.map(|path| {
            let mut argv = vec![path.to_string_lossy().into_owned()];
            argv.extend(segment.args().iter().cloned());
            argv
        });

        let kind = self.classify(segment, resolved, executable_name);
        let entry_pattern = match &kind {
            Some(MatchKind::PathPattern) | Some(MatchKind::NameEntry) => {
                self.matching_entry(resolved, executable_name)
            }
            _ => None,
        };

        SegmentMatch {
            matched: kind.is_some(),
            kind,
            entry_pattern,
            effective_argv,
        }
    }

    fn classify(
        &self,
        segment: &CommandSegment,
        resolved: Option<&Path>,
        executable_name: &str,
    ) -> Option<MatchKind> {
        if let Some(path) = resolved {
            if self.in_trusted_dir(path) {
                return Some(MatchKind::TrustedDir);
            }
            if self.auto_allow_skills && self.is_skill_bin(path) {
                return Some(MatchKind::SkillBin);
            }
            for entry in self.entries.iter().filter(|e| e.is_path_pattern()) {
                if match_path_pattern(&entry.pattern, path, self.platform) {
                    return Some(MatchKind::PathPattern);
                }
            }
        }
        for entry in self.entries.iter().filter(|e| !e.is_path_pattern()) {
            if match_name_pattern(&entry.pattern, executable_name, self.platform) {
                return Some(MatchKind::NameEntry);
            }
        }
        if self.safe_bins.contains(executable_name) {
            return match self.safe_bins.profile(executable_name) {
                Some(profile) => profile
                    .args_allowed(segment.args())
                    .then_some(MatchKind::SafeBin { unprofiled: false }),
                None => {
                    if is_interpreter(executable_name) {
                        warn!(
                            executable = executable_name,
                            "unprofiled interpreter matched by name; \
                             command-structure guarantees do not apply"
                        );
                    }
                    Some(MatchKind::SafeBin { unprofiled: true })
                }
            };
        }
        None
    }

    fn matching_entry(&self, resolved: Option<&Path>, executable_name: &str) -> Option<String> {
        for entry in self.entries {
            let hit = if entry.is_path_pattern() {
                resolved.is_some_and(|p| match_path_pattern(&entry.pattern, p, self.platform))
            } else {
                match_name_pattern(&entry.pattern, executable_name, self.platform)
            };
            if hit {
                return Some(entry.pattern.clone());
            }
        }
        None
    }

    fn in_trusted_dir(&self, resolved: &Path) -> bool {
        self.trusted_dirs.iter().any(|dir| resolved.starts_with(dir))
    }

    fn is_skill_bin(&self, resolved: &Path) -> bool {
        self.skill_bins.iter().any(|bin| bin.as_path() == resolved)
    }
}

/// Last path component of a token, for segments that carry no
/// resolution at all.
fn basename(token: &str) -> &str {
    Path::new(token)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(token)
}

// ── Glob matching ───────────────────────────────────────────────────────

fn has_wildcard(pattern: &str) -> bool {
    pattern.contains('*') || pattern.contains('?')
}

/// Convert a glob to an anchored regex: `**` matches any sequence
/// including separators, `*` any sequence excluding `/`, `?` one
/// character; everything else is literal.
fn glob_to_regex(pattern: &str, case_insensitive: bool) -> Option<regex::Regex> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut expr = String::with_capacity(pattern.len() * 2 + 2);
    expr.push('^');
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' => {
                if chars.get(i + 1) == Some(&'*') {
                    expr.push_str(".*");
                    i += 2;
                } else {
                    expr.push_str("[^/]*");
                    i += 1;
                }
            }
            '?' => {
                expr.push('.');
                i += 1;
            }
            c => {
                expr.push_str(&regex::escape(&c.to_string()));
                i += 1;
            }
        }
    }
    expr.push('$');

    match RegexBuilder::new(&expr)
        .case_insensitive(case_insensitive)
        .build()
    {
        Ok(re) => Some(re),
        Err(err) => {
            warn!(pattern, error = %err, "unusable allowlist pattern; treating as non-matching");
            None
        }
    }
}

/// Normalize separators so patterns written with `/` match Windows
/// paths.
fn normalize_separators(text: &str, platform: Platform) -> String {
    match platform {
        Platform::Windows => text.replace('\\', "/"),
        Platform::Posix => text.to_string(),
    }
}

/// Match a path-pattern entry against a resolved path.
///
/// Wildcard-free patterns on case-insensitive platforms canonicalize
/// both sides via realpath first, so symlinked/mounted equivalents
/// match; wildcard patterns match lexically. The asymmetry is
/// deliberate and pinned by tests.
fn match_path_pattern(pattern: &str, resolved: &Path, platform: Platform) -> bool {
    let expanded = if pattern.starts_with('~') {
        expand_tilde(pattern).to_string_lossy().into_owned()
    } else {
        pattern.to_string()
    };
    let case_insensitive = platform == Platform::Windows;

    if !has_wildcard(&expanded) && case_insensitive {
        let lhs = canonical_text(Path::new(&expanded), platform);
        let rhs = canonical_text(resolved, platform);
        return lhs.eq_ignore_ascii_case(&rhs);
    }

    let candidate = normalize_separators(&resolved.to_string_lossy(), platform);
    let pattern = normalize_separators(&expanded, platform);
    glob_to_regex(&pattern, case_insensitive)
        .map(|re| re.is_match(&candidate))
        .unwrap_or(false)
}

fn canonical_text(path: &Path, platform: Platform) -> String {
    let canonical = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    normalize_separators(&canonical.to_string_lossy(), platform)
}

/// Match a separator-free entry against the executable name.
fn match_name_pattern(pattern: &str, executable_name: &str, platform: Platform) -> bool {
    let case_insensitive = platform == Platform::Windows;
    glob_to_regex(pattern, case_insensitive)
        .map(|re| re.is_match(executable_name))
        .unwrap_or(false)
}

// ── Tests ───────────────────────────────────────────────────────────────
