//! Find existing Waybar files by candidate name.

use std::path::{Path, PathBuf};

/// Waybar config file names in lookup order
pub const CONFIG_CANDIDATES: &[&str] = &["config.jsonc", "config", "config.json"];

/// Waybar stylesheet file names in lookup order
pub const STYLE_CANDIDATES: &[&str] = &["style.css"];

/// First existing regular file among `candidates` under `base`
pub fn locate(base: &Path, candidates: &[&str]) -> Option<PathBuf> {
    candidates
        .iter()
        .map(|name| base.join(name))
        .find(|path| path.is_file())
}
