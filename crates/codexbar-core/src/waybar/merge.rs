//! Idempotent insertion of a custom module into a Waybar configuration.
//!
//! The document is patched as text so that comments, key order and the
//! user's formatting survive. Only two spots are touched: the last closing
//! brace of the document (module definition) and the `modules-right` array
//! (module reference).

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use super::backup::write_backup;
use super::scanner::{
    find_keyed_array, last_closing_brace, tokenize, ArrayLookup, TokenKind, Tokens,
};

/// Array that receives the module reference
pub const MODULES_RIGHT: &str = "modules-right";

/// Indentation used when it cannot be inferred from existing entries
const DEFAULT_INDENT: &str = "  ";

/// Errors from merging into a configuration or stylesheet
#[derive(Debug, Error)]
pub enum MergeError {
    /// The document has no closing brace to insert before
    #[error("malformed document: no closing brace found")]
    NoClosingBrace,

    /// The document ends inside a string or block comment
    #[error("malformed document: unterminated string or comment")]
    Unterminated,

    /// Reading the target file failed
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Writing the backup or the merged file failed
    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Custom module block inserted into the Waybar config
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleDefinition {
    /// Module identifier, e.g. `custom/codex`
    pub id: String,
    /// Command Waybar runs on every interval
    pub exec: String,
    /// Polling interval in seconds
    pub interval_secs: u64,
    /// Waybar format string
    pub format: String,
}

impl ModuleDefinition {
    /// Create a definition with the default format
    pub fn new(id: impl Into<String>, exec: impl Into<String>, interval_secs: u64) -> Self {
        Self {
            id: id.into(),
            exec: exec.into(),
            interval_secs,
            format: "{}".to_string(),
        }
    }

    /// Render as an object member, `indent` being one nesting level
    pub fn render(&self, indent: &str) -> String {
        let fields = [
            ("format", quote(&self.format)),
            ("return-type", quote("json")),
            ("interval", self.interval_secs.to_string()),
            ("exec", quote(&self.exec)),
            ("tooltip", "true".to_string()),
        ];
        let body = fields
            .iter()
            .map(|(key, value)| format!("{indent}{indent}\"{key}\": {value}"))
            .collect::<Vec<_>>()
            .join(",\n");
        format!("{indent}{id}: {{\n{body}\n{indent}}}", id = quote(&self.id))
    }
}

/// What happened to the module reference in the `modules-right` array
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayStatus {
    /// Reference appended to the array
    Appended,
    /// The array already contained the identifier
    AlreadyListed,
    /// No such array in the document
    Missing,
    /// Array opener found but its closing bracket was not
    Unclosed,
}

/// Result of merging a module into a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Identifier already occurs in the document; nothing changed
    AlreadyPresent,
    /// Module inserted
    Merged { text: String, array: ArrayStatus },
}

/// Result of merging a module into a file on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeReport {
    /// Identifier already occurs in the file; nothing written
    AlreadyPresent,
    /// File rewritten after backing up the original
    Merged { backup: PathBuf, array: ArrayStatus },
}

/// Insert `module` into `text` and reference it from the `array_key` array.
///
/// Returns [`MergeOutcome::AlreadyPresent`] without touching the text when the
/// identifier appears anywhere in the document.
pub fn merge_module(
    text: &str,
    module: &ModuleDefinition,
    array_key: &str,
) -> Result<MergeOutcome, MergeError> {
    if text.contains(&module.id) {
        return Ok(MergeOutcome::AlreadyPresent);
    }

    let with_module = insert_before_closing_brace(text, module)?;
    let (text, array) = reference_in_array(&with_module, &module.id, array_key);
    Ok(MergeOutcome::Merged { text, array })
}

/// Insert the module block before the document's last closing brace
fn insert_before_closing_brace(text: &str, module: &ModuleDefinition) -> Result<String, MergeError> {
    let scanned = tokenize(text);
    if !scanned.terminated {
        return Err(MergeError::Unterminated);
    }
    let member = module.render(&member_indent(text, &scanned));
    let brace_idx = last_closing_brace(&scanned).ok_or(MergeError::NoClosingBrace)?;
    let brace = scanned.tokens[brace_idx];

    let (head_end, needs_comma) = match brace_idx.checked_sub(1).map(|i| scanned.tokens[i]) {
        Some(prev) => (
            prev.end,
            !matches!(prev.kind, TokenKind::Punct(',') | TokenKind::Punct('{')),
        ),
        None => (brace.start, false),
    };

    // Comments between the last member and the brace stay where they are
    let between = text[head_end..brace.start].trim_end();

    let mut out = String::with_capacity(text.len() + member.len() + 4);
    out.push_str(&text[..head_end]);
    if needs_comma {
        out.push(',');
    }
    out.push_str(between);
    out.push('\n');
    out.push_str(&member);
    out.push('\n');
    out.push_str(&text[brace.start..]);
    Ok(out)
}

/// Append `"id"` to the array stored under `array_key`.
///
/// The document is returned unchanged unless the status is
/// [`ArrayStatus::Appended`].
pub fn reference_in_array(text: &str, id: &str, array_key: &str) -> (String, ArrayStatus) {
    let span = match find_keyed_array(text, array_key) {
        ArrayLookup::Found(span) => span,
        ArrayLookup::Missing => return (text.to_string(), ArrayStatus::Missing),
        ArrayLookup::Unclosed { open } => {
            debug!(open, "array `{}` is not closed", array_key);
            return (text.to_string(), ArrayStatus::Unclosed);
        }
    };

    let body = span.body(text);
    if body.contains(&quote(id)) {
        return (text.to_string(), ArrayStatus::AlreadyListed);
    }

    let entry = quote(id);
    let mut out = String::with_capacity(text.len() + entry.len() + 8);

    match span.last_value_end {
        None => {
            // Comments inside an otherwise empty array are kept
            let indent = entry_indent(body)
                .unwrap_or_else(|| format!("{}{}", line_indent(text, span.open), DEFAULT_INDENT));
            out.push_str(&text[..=span.open]);
            out.push_str(body.trim_end());
            out.push('\n');
            out.push_str(&indent);
            out.push_str(&entry);
            out.push('\n');
            out.push_str(&line_indent(text, span.open));
            out.push_str(&text[span.close..]);
        }
        Some(last_end) => {
            // Trailing comments after the last entry are kept before the new one
            let insert_at = span.open + 1 + body.trim_end().len();
            let multiline = body.contains('\n');

            out.push_str(&text[..last_end]);
            if !text[..last_end].ends_with(',') {
                out.push(',');
            }
            out.push_str(&text[last_end..insert_at]);
            if multiline {
                out.push('\n');
                out.push_str(&entry_indent(body).unwrap_or_else(|| DEFAULT_INDENT.to_string()));
            } else {
                out.push(' ');
            }
            out.push_str(&entry);
            out.push_str(&text[insert_at..]);
        }
    }

    (out, ArrayStatus::Appended)
}

/// Leading whitespace of the first entry that starts on its own line
fn entry_indent(body: &str) -> Option<String> {
    body.split('\n')
        .skip(1)
        .find(|line| !line.trim().is_empty())
        .map(|line| {
            line.chars()
                .take_while(|c| c.is_whitespace())
                .collect::<String>()
        })
}

/// Indentation of the first top-level member that starts its own line
fn member_indent(text: &str, scanned: &Tokens) -> String {
    let mut depth = 0usize;
    for token in &scanned.tokens {
        match token.kind {
            TokenKind::Punct('{') | TokenKind::Punct('[') => depth += 1,
            TokenKind::Punct('}') | TokenKind::Punct(']') => depth = depth.saturating_sub(1),
            TokenKind::Str if depth == 1 => {
                let line_start = text[..token.start].rfind('\n').map(|i| i + 1);
                if let Some(start) = line_start {
                    let lead = &text[start..token.start];
                    if !lead.is_empty() && lead.chars().all(|c| c == ' ' || c == '\t') {
                        return lead.to_string();
                    }
                }
            }
            _ => {}
        }
    }
    DEFAULT_INDENT.to_string()
}

/// Leading whitespace of the line containing byte `pos`
fn line_indent(text: &str, pos: usize) -> String {
    let line_start = text[..pos].rfind('\n').map(|i| i + 1).unwrap_or(0);
    text[line_start..pos]
        .chars()
        .take_while(|c| *c == ' ' || *c == '\t')
        .collect()
}

/// JSON string literal for `s`
fn quote(s: &str) -> String {
    Value::String(s.to_string()).to_string()
}

/// Merge `module` into the config file at `path`.
///
/// The original text is copied to a timestamped backup before the merged
/// document is written. Nothing is written when the module is already present.
pub fn apply_merge(
    path: &Path,
    module: &ModuleDefinition,
    array_key: &str,
    stamp: NaiveDateTime,
) -> Result<MergeReport, MergeError> {
    let original = std::fs::read_to_string(path).map_err(|source| MergeError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let (merged, array) = match merge_module(&original, module, array_key)? {
        MergeOutcome::AlreadyPresent => {
            info!("{} already present in {}", module.id, path.display());
            return Ok(MergeReport::AlreadyPresent);
        }
        MergeOutcome::Merged { text, array } => (text, array),
    };

    let backup = write_backup(path, &original, stamp).map_err(|source| MergeError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    debug!("Backed up {} to {}", path.display(), backup.display());

    write_text(path, &merged)?;
    info!("Merged {} into {} ({:?})", module.id, path.display(), array);

    Ok(MergeReport::Merged { backup, array })
}

/// Write `text` with exactly one trailing newline
pub(crate) fn write_text(path: &Path, text: &str) -> Result<(), MergeError> {
    let mut content = text.trim_end().to_string();
    content.push('\n');
    std::fs::write(path, content).map_err(|source| MergeError::Write {
        path: path.to_path_buf(),
        source,
    })
}
