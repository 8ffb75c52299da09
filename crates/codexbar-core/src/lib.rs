//! codexbar core: Waybar config merging and usage-limit polling.
//!
//! This crate holds everything that does not depend on the command line:
//! - `waybar`: locate and patch the user's Waybar config and stylesheet
//! - `usage`: fetch usage limits from Codex and Claude
//! - `status`: turn usage results into Waybar JSON payloads

pub mod status;
pub mod usage;
pub mod waybar;
