//! Executable resolution: mapping a segment's first token to a concrete
//! filesystem path.
//!
//! Resolution defeats path spoofing by matching policy against what
//! would actually execute, not what the text claims. Tokens with a path
//! separator or leading `~` resolve directly (with an execute-bit check
//! on POSIX); bare names search `PATH`, with `PATHEXT` candidate
//! generation on Windows. Probing is synchronous stat/access only; no
//! result depends on timing.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use execgate_types::Platform;

use crate::parse::CommandResolution;

/// Default Windows executable extensions when `PATHEXT` is unset.
const DEFAULT_PATHEXT: &str = ".EXE;.CMD;.BAT;.COM";

/// Inputs for one resolution: caller env overrides are consulted before
/// the process environment.
#[derive(Debug, Clone, Copy)]
pub struct ResolveContext<'a> {
    /// Base for relative tokens; process cwd when unset.
    pub cwd: Option<&'a Path>,
    /// Overrides for `PATH`, `PATHEXT`, `HOME`.
    pub env: &'a HashMap<String, String>,
    /// Which filesystem conventions apply.
    pub platform: Platform,
}

/// Resolve a raw executable token.
///
/// `executable_name` falls back to the raw token when nothing resolved,
/// so an unresolved command still gets conservative name-based
/// consideration from the matcher.
pub fn resolve_command(raw: &str, ctx: &ResolveContext<'_>) -> CommandResolution {
    let resolved_path = resolve_path(raw, ctx);
    let executable_name = resolved_path
        .as_deref()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .map(String::from)
        .unwrap_or_else(|| raw.to_string());
    CommandResolution {
        raw_executable: raw.to_string(),
        resolved_path,
        executable_name,
    }
}

fn resolve_path(raw: &str, ctx: &ResolveContext<'_>) -> Option<PathBuf> {
    if raw.is_empty() {
        return None;
    }

    if raw.starts_with('~') || has_separator(raw, ctx.platform) {
        let expanded = expand_user(raw, ctx);
        let candidate = if is_absolute(&expanded, ctx.platform) {
            expanded
        } else {
            match ctx.cwd {
                Some(cwd) => cwd.join(&expanded),
                None => std::env::current_dir().ok()?.join(&expanded),
            }
        };
        return is_executable_file(&candidate, ctx.platform).then_some(candidate);
    }

    let path_var = env_path(ctx)?;
    let list_sep = match ctx.platform {
        Platform::Windows => ';',
        Platform::Posix => ':',
    };
    let pathext = match ctx.platform {
        Platform::Windows => pathext_list(ctx),
        Platform::Posix => Vec::new(),
    };

    for dir in path_var.split(list_sep).filter(|d| !d.is_empty()) {
        let dir = Path::new(dir);
        match ctx.platform {
            Platform::Posix => {
                let candidate = dir.join(raw);
                if is_executable_file(&candidate, Platform::Posix) {
                    return Some(candidate);
                }
            }
            Platform::Windows => {
                if has_recognized_extension(raw, &pathext) {
                    let candidate = dir.join(raw);
                    if is_executable_file(&candidate, Platform::Windows) {
                        return Some(candidate);
                    }
                } else {
                    for ext in &pathext {
                        let candidate = dir.join(format!("{raw}{ext}"));
                        if is_executable_file(&candidate, Platform::Windows) {
                            return Some(candidate);
                        }
                    }
                }
            }
        }
    }
    None
}

fn has_separator(raw: &str, platform: Platform) -> bool {
    raw.contains('/') || (platform == Platform::Windows && raw.contains('\\'))
}

fn is_absolute(path: &Path, platform: Platform) -> bool {
    if path.is_absolute() {
        return true;
    }
    if platform == Platform::Windows {
        let s = path.to_string_lossy();
        let bytes = s.as_bytes();
        return s.starts_with("\\\\")
            || (bytes.len() >= 3
                && bytes[0].is_ascii_alphabetic()
                && bytes[1] == b':'
                && (bytes[2] == b'\\' || bytes[2] == b'/'));
    }
    false
}

/// Expand a leading `~` against the caller's `HOME` override, falling
/// back to the platform home directory.
fn expand_user(raw: &str, ctx: &ResolveContext<'_>) -> PathBuf {
    let home = || {
        ctx.env
            .get("HOME")
            .or_else(|| ctx.env.get("USERPROFILE"))
            .map(PathBuf::from)
            .or_else(dirs::home_dir)
    };
    if raw == "~" {
        if let Some(home) = home() {
            return home;
        }
    }
    let rest = raw
        .strip_prefix("~/")
        .or_else(|| raw.strip_prefix("~\\").filter(|_| ctx.platform == Platform::Windows));
    if let Some(rest) = rest
        && let Some(home) = home()
    {
        return home.join(rest);
    }
    PathBuf::from(raw)
}

/// A regular file, with the execute bit set on POSIX. Windows has no
/// execute-bit check.
fn is_executable_file(path: &Path, platform: Platform) -> bool {
    let Ok(metadata) = std::fs::metadata(path) else {
        return false;
    };
    if !metadata.is_file() {
        return false;
    }
    if platform == Platform::Windows {
        return true;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}

fn env_path(ctx: &ResolveContext<'_>) -> Option<String> {
    ctx.env
        .get("PATH")
        .or_else(|| ctx.env.get("Path"))
        .cloned()
        .or_else(|| std::env::var("PATH").ok())
        .or_else(|| std::env::var("Path").ok())
}

fn pathext_list(ctx: &ResolveContext<'_>) -> Vec<String> {
    let raw = ctx
        .env
        .get("PATHEXT")
        .cloned()
        .or_else(|| std::env::var("PATHEXT").ok())
        .unwrap_or_else(|| DEFAULT_PATHEXT.to_string());
    raw.split(';')
        .filter(|e| !e.is_empty())
        .map(String::from)
        .collect()
}

fn has_recognized_extension(raw: &str, pathext: &[String]) -> bool {
    let Some(ext) = Path::new(raw).extension().and_then(|e| e.to_str()) else {
        return false;
    };
    let dotted = format!(".{ext}");
    pathext.iter().any(|e| e.eq_ignore_ascii_case(&dotted))
}

// ── Tests ───────────────────────────────────────────────────────────────
