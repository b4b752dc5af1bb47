//! Log excerpts for the per-unit log files

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

/// Default line count for the streaming variant
pub const STREAM_LINES: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogExcerpt {
    /// Lines with their terminators preserved
    pub logs: Vec<String>,
    /// Number of lines in `logs`
    pub total_lines: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
}

/// Read up to `lines` lines from the end (`tail`) or the start of `path`.
///
/// Invalid UTF-8 is replaced rather than rejected; child output is not ours to validate.
pub fn read_excerpt(path: &Path, lines: usize, tail: bool) -> Result<LogExcerpt> {
    let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let text = String::from_utf8_lossy(&bytes);
    let all: Vec<&str> = text.split_inclusive('\n').collect();

    let selected = if tail {
        &all[all.len().saturating_sub(lines)..]
    } else {
        &all[..lines.min(all.len())]
    };
    let logs: Vec<String> = selected.iter().map(|line| line.to_string()).collect();

    Ok(LogExcerpt {
        total_lines: logs.len(),
        logs,
        file_path: Some(path.display().to_string()),
    })
}

/// The last `lines` lines, without the file path
pub fn read_stream(path: &Path, lines: usize) -> Result<LogExcerpt> {
    let mut excerpt = read_excerpt(path, lines, true)?;
    excerpt.file_path = None;
    Ok(excerpt)
}
