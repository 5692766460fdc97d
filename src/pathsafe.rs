//! Filename normalization for tool-safe analysis.
//!
//! The Python tool chain chokes on Windows paths carrying reserved
//! characters or non-ASCII names. On that platform, offending files are
//! copied into a staging directory under a transliterated name and the copy
//! is analyzed instead. Unix paths pass through untouched.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use any_ascii::any_ascii;

use crate::events::{Event, EventSink};

/// Characters Windows forbids in file names, plus both separators.
pub const ILLEGAL_CHARS: &[char] = &['<', '>', ':', '"', '|', '?', '*', '/', '\\'];

/// Which platform's path rules to apply. Parameterized rather than read from
/// `cfg!` at the call sites so the Windows behavior is testable anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    Unix,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(windows) {
            Platform::Windows
        } else {
            Platform::Unix
        }
    }
}

/// Transliterate a base name to ASCII and strip reserved characters.
pub fn safe_base_name(name: &str) -> String {
    any_ascii(name)
        .chars()
        .filter(|c| !ILLEGAL_CHARS.contains(c))
        .collect()
}

/// Return a path that is safe to hand to the external tools.
///
/// On Unix this is the input, always. On Windows, a file whose base name
/// survives [`safe_base_name`] unchanged is also returned as-is; anything
/// else is copied into `staging_root` under the safe name and the staged
/// copy is returned. Re-normalizing an already safe path never copies.
pub fn normalize(
    path: &Path,
    platform: Platform,
    staging_root: &Path,
    events: &dyn EventSink,
) -> io::Result<PathBuf> {
    if platform == Platform::Unix {
        return Ok(path.to_path_buf());
    }
    let Some(base) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
        return Ok(path.to_path_buf());
    };
    let safe = safe_base_name(&base);
    if safe == base {
        return Ok(path.to_path_buf());
    }

    fs::create_dir_all(staging_root)?;
    let staged = staging_root.join(&safe);
    events.emit(Event::tool_output(format!(
        "Copying {} to {}...",
        path.display(),
        staged.display()
    )));
    fs::copy(path, &staged)?;
    Ok(staged)
}

/// Render a path as a command argument, rewriting separators to the
/// platform convention.
pub fn command_path(path: &Path, platform: Platform) -> String {
    let s = path.to_string_lossy();
    match platform {
        Platform::Windows => s.replace('/', "\\"),
        Platform::Unix => s.into_owned(),
    }
}
