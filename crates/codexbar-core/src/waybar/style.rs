//! Idempotent append of the module stylesheet fragment.

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use tracing::info;

use super::backup::write_backup;
use super::merge::{write_text, MergeError};

/// Result of appending a fragment to stylesheet text
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StyleOutcome {
    /// Marker selector already present; nothing changed
    AlreadyPresent,
    /// Fragment appended
    Appended(String),
}

/// Result of appending a fragment to a stylesheet file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StyleReport {
    AlreadyPresent,
    Appended { backup: PathBuf },
}

/// CSS selector Waybar assigns to a module, e.g. `custom/codex` -> `#custom-codex`
pub fn marker_for(module_id: &str) -> String {
    format!("#{}", module_id.replace('/', "-"))
}

/// Append `fragment` after a blank line unless `marker` already occurs in `css`
pub fn append_style(css: &str, fragment: &str, marker: &str) -> StyleOutcome {
    if css.contains(marker) {
        return StyleOutcome::AlreadyPresent;
    }

    let base = css.trim_end();
    let mut out = String::with_capacity(base.len() + fragment.len() + 3);
    if !base.is_empty() {
        out.push_str(base);
        out.push_str("\n\n");
    }
    out.push_str(fragment.trim_end());
    out.push('\n');
    StyleOutcome::Appended(out)
}

/// Append `fragment` to the stylesheet at `path`, backing it up first
pub fn apply_style(
    path: &Path,
    fragment: &str,
    marker: &str,
    stamp: NaiveDateTime,
) -> Result<StyleReport, MergeError> {
    let original = std::fs::read_to_string(path).map_err(|source| MergeError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let updated = match append_style(&original, fragment, marker) {
        StyleOutcome::AlreadyPresent => {
            info!("{} already styled in {}", marker, path.display());
            return Ok(StyleReport::AlreadyPresent);
        }
        StyleOutcome::Appended(text) => text,
    };

    let backup = write_backup(path, &original, stamp).map_err(|source| MergeError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    write_text(path, &updated)?;
    info!("Appended {} styles to {}", marker, path.display());

    Ok(StyleReport::Appended { backup })
}
