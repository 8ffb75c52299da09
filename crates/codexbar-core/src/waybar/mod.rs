//! Waybar configuration patching.
//!
//! Locates the user's Waybar config and stylesheet, then merges the module
//! definition and CSS fragment into them as text, keeping a backup of every
//! file it rewrites.

pub mod backup;
pub mod locate;
pub mod merge;
pub mod scanner;
pub mod style;

pub use locate::{locate, CONFIG_CANDIDATES, STYLE_CANDIDATES};
pub use merge::{
    apply_merge, merge_module, ArrayStatus, MergeError, MergeOutcome, MergeReport,
    ModuleDefinition, MODULES_RIGHT,
};
pub use style::{append_style, apply_style, marker_for, StyleOutcome, StyleReport};
