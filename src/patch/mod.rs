use thiserror::Error;

use crate::{Hunk, LineKind};

/// Errors from applying a hunk in reverse against current file content.
#[derive(Debug, Error)]
pub enum PatchError {
    #[error("hunk new-side range {start}..{end} exceeds file length {len}")]
    RangeOutOfBounds {
        start: usize,
        end: usize,
        len: usize,
    },
}

pub type Result<T> = std::result::Result<T, PatchError>;

/// Reconstruct the pre-change lines of a file from a hunk and its current
/// lines.
///
/// Lines before the hunk's new-side range are copied unchanged; within the
/// range, context and removed body lines contribute their text while added
/// lines contribute nothing; lines after the range are copied unchanged.
/// Only the new-side range has to be accurate against `current` — the
/// old-side range may be stale.
pub fn undo_hunk<'a>(hunk: &'a Hunk, current: &[&'a str]) -> Result<Vec<&'a str>> {
    // A `+0,0` range is an insertion point before the first line.
    let begin = hunk.new_start.max(0) as usize;
    let end = begin + hunk.new_count.max(0) as usize;
    if end > current.len() {
        return Err(PatchError::RangeOutOfBounds {
            start: begin,
            end,
            len: current.len(),
        });
    }

    let mut out = Vec::with_capacity(current.len());
    out.extend_from_slice(&current[..begin]);
    for line in &hunk.lines {
        match line.kind {
            LineKind::Context | LineKind::Removed => out.push(line.text.as_str()),
            LineKind::Added => {}
        }
    }
    out.extend_from_slice(&current[end..]);
    Ok(out)
}

/// Undo a hunk's edit in whole-file content, reconciling the trailing
/// newline.
///
/// If the old side ended without a newline the result must too; otherwise,
/// if only the new side lacks one, the hunk sits at the end of the file and
/// the old content's final newline is restored.
pub fn revert_hunk(hunk: &Hunk, content: &str) -> Result<String> {
    let lines: Vec<&str> = content.split('\n').collect();
    let restored = undo_hunk(hunk, &lines)?;
    let mut out = restored.join("\n");
    if hunk.missing_newline_old {
        if out.ends_with('\n') {
            out.pop();
        }
    } else if hunk.missing_newline_new {
        out.push('\n');
    }
    Ok(out)
}

/// Insert a sentinel line just before the first line touched by the hunk's
/// new-side range (one line in from the range start, which holds context).
pub fn insert_mark(content: &str, hunk: &Hunk, mark: &str) -> String {
    let mut lines: Vec<&str> = content.split('\n').collect();
    let at = (hunk.new_start + 1).clamp(0, lines.len() as i32) as usize;
    lines.insert(at, mark);
    lines.join("\n")
}
