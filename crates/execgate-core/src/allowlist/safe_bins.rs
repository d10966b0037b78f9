//! Curated safe-bin set and the interpreter classifier.
//!
//! Safe bins are interpreter-free utilities considered low-risk by name
//! alone when unprofiled, or constrained by an argument-shape profile
//! when one exists. Name-only matching is explicitly weaker than
//! resolution-based matching.

use std::collections::{HashMap, HashSet};

use execgate_types::SafeBinProfile;

/// Binaries trusted by name: they only read/transform stdin or produce
/// output.
pub const SAFE_BINS: &[&str] = &[
    "awk", "base64", "cat", "column", "cut", "diff", "echo", "env", "expand", "expr", "false",
    "fmt", "fold", "grep", "head", "jq", "less", "more", "nl", "od", "paste", "printf", "rev",
    "sed", "seq", "shuf", "sort", "strings", "tac", "tail", "tee", "tr", "true", "tsort", "uniq",
    "wc", "yes",
];

/// Shells and language runtimes. Safe-listing one of these without a
/// profile bypasses the command-structure guarantees the allowlist
/// otherwise provides, so operators are warned.
const INTERPRETER_BASES: &[&str] = &[
    "sh", "bash", "zsh", "dash", "ksh", "fish", "csh", "tcsh", "ash", "pwsh", "powershell", "cmd",
    "python", "node", "nodejs", "deno", "bun", "ruby", "perl", "php", "lua", "tclsh",
];

/// Windows executable extensions stripped before name comparison.
const WINDOWS_EXTENSIONS: &[&str] = &[".exe", ".cmd", ".bat", ".com"];

/// The configured safe-bin names plus any argument-shape profiles.
#[derive(Debug, Clone, Default)]
pub struct SafeBinSet {
    names: HashSet<String>,
    profiles: HashMap<String, SafeBinProfile>,
}

impl SafeBinSet {
    /// The built-in curated set, unprofiled.
    pub fn curated() -> Self {
        Self {
            names: SAFE_BINS.iter().map(|s| (*s).to_string()).collect(),
            profiles: HashMap::new(),
        }
    }

    /// The curated set merged with configured extras and profiles.
    /// A profile's bin is implicitly part of the set.
    pub fn with_extras(extra: &[String], profiles: &[SafeBinProfile]) -> Self {
        let mut set = Self::curated();
        for name in extra {
            set.names.insert(name.clone());
        }
        for profile in profiles {
            set.names.insert(profile.bin.clone());
            set.profiles.insert(profile.bin.clone(), profile.clone());
        }
        set
    }

    /// Whether `executable_name` is in the set.
    pub fn contains(&self, executable_name: &str) -> bool {
        self.names.contains(lookup_name(executable_name).as_ref())
    }

    /// The profile for `executable_name`, when one is registered.
    pub fn profile(&self, executable_name: &str) -> Option<&SafeBinProfile> {
        self.profiles.get(lookup_name(executable_name).as_ref())
    }

    /// Safe-listed interpreters without a profile, for operator warnings.
    pub fn unprofiled_interpreters(&self) -> Vec<&str> {
        let mut found: Vec<&str> = self
            .names
            .iter()
            .filter(|name| is_interpreter(name) && !self.profiles.contains_key(name.as_str()))
            .map(String::as_str)
            .collect();
        found.sort_unstable();
        found
    }
}

/// Strip a recognized Windows executable extension and lowercase, so
/// `JQ.EXE` matches a safe-bin entry for `jq`. Other names pass through
/// untouched (POSIX names stay case-sensitive).
fn lookup_name(name: &str) -> std::borrow::Cow<'_, str> {
    let lower = name.to_ascii_lowercase();
    for ext in WINDOWS_EXTENSIONS {
        if let Some(stem) = lower.strip_suffix(ext) {
            return std::borrow::Cow::Owned(stem.to_string());
        }
    }
    std::borrow::Cow::Borrowed(name)
}

/// Classify interpreter-like binaries by exact name or numeric-suffix
/// pattern (`python3`, `python3.12`, `node22`).
pub fn is_interpreter(executable_name: &str) -> bool {
    let name = lookup_name(executable_name);
    let name = name.as_ref();
    if INTERPRETER_BASES.contains(&name) {
        return true;
    }
    let stripped = name.trim_end_matches(|c: char| c.is_ascii_digit() || c == '.');
    stripped != name && INTERPRETER_BASES.contains(&stripped)
}

// ── Tests ───────────────────────────────────────────────────────────────
