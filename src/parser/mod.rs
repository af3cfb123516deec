use log::debug;
use thiserror::Error;

use crate::{DiffLine, FileEntry, FileState, Hunk, LineKind};

const NO_NEWLINE_MARKER: &str = "\\ No newline at end of file";

/// Errors raised when the diff text violates the expected grammar.
///
/// All of these are fatal for the run: they mean the diff source produced
/// something outside the unified-diff grammar, and there is no recovery.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("expected file header at line {line}, found {text:?}")]
    ExpectedFileHeader { line: usize, text: String },
    #[error("unexpected end of diff (expected {expected})")]
    UnexpectedEnd { expected: &'static str },
    #[error("malformed path header at line {line}: {text:?}")]
    BadPathHeader { line: usize, text: String },
    #[error("path {path:?} at line {line} does not start with {prefix:?}")]
    BadPathPrefix {
        line: usize,
        path: String,
        prefix: &'static str,
    },
    #[error("malformed binary notice at line {line}: {text:?}")]
    BadBinaryNotice { line: usize, text: String },
    #[error("malformed hunk header at line {line}: {text:?}")]
    BadHunkHeader { line: usize, text: String },
    #[error("unknown backslash line at line {line}: {text:?}")]
    UnknownBackslashLine { line: usize, text: String },
    #[error("no-newline marker at line {line} with no removed or added line to attach to")]
    StrayNoNewlineMarker { line: usize },
    #[error("missing hunks for {path:?}")]
    MissingHunks { path: String },
}

pub type Result<T> = std::result::Result<T, ParseError>;

/// Parse raw `git diff` output into structured `FileEntry` records.
///
/// Fail-fast: the first structural violation aborts the parse. Empty input
/// yields an empty list.
pub fn parse_diff(input: &str) -> Result<Vec<FileEntry>> {
    let mut parser = Parser::new(input);
    let mut entries = Vec::new();
    while parser.peek().is_some() {
        entries.push(parser.parse_section()?);
    }
    Ok(entries)
}

/// Mutable per-section builder, discarded once the entry is assembled.
struct SectionBuilder {
    path: Option<String>,
    orig_path: Option<String>,
    mode: Option<String>,
    old_mode: Option<String>,
    state: FileState,
    hunks: Vec<Hunk>,
}

impl SectionBuilder {
    fn new() -> Self {
        Self {
            path: None,
            orig_path: None,
            mode: None,
            old_mode: None,
            state: FileState::Modified,
            hunks: Vec::new(),
        }
    }

    fn display_path(&self) -> &str {
        self.path
            .as_deref()
            .or(self.orig_path.as_deref())
            .unwrap_or("")
    }

    fn build(self) -> FileEntry {
        FileEntry {
            path: self.path,
            orig_path: self.orig_path,
            mode: self.mode,
            old_mode: self.old_mode,
            state: self.state,
            hunks: self.hunks,
        }
    }
}

struct Parser<'a> {
    lines: Vec<&'a str>,
    cursor: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            lines: input.lines().collect(),
            cursor: 0,
        }
    }

    fn peek(&self) -> Option<&'a str> {
        self.lines.get(self.cursor).copied()
    }

    /// 1-based line number of the line `peek` would return.
    fn line_number(&self) -> usize {
        self.cursor + 1
    }

    fn advance(&mut self) -> Option<&'a str> {
        let line = self.peek();
        if line.is_some() {
            self.cursor += 1;
        }
        line
    }

    fn expect_line(&mut self, expected: &'static str) -> Result<&'a str> {
        self.advance().ok_or(ParseError::UnexpectedEnd { expected })
    }

    fn parse_section(&mut self) -> Result<FileEntry> {
        let line = self.line_number();
        let header = self.expect_line("file header")?;
        if !header.starts_with("diff --git") {
            return Err(ParseError::ExpectedFileHeader {
                line,
                text: header.to_owned(),
            });
        }
        debug!("file section at line {line}");

        let mut section = SectionBuilder::new();
        self.read_extended_headers(&mut section);

        match self.peek() {
            // Pure rename or mode-only change: no hunks at all.
            None => {}
            Some(next) if next.starts_with("diff --git") => {}
            Some(next) if next.starts_with("Binary") => self.read_binary_notice(&mut section)?,
            Some(_) => {
                self.read_path_headers(&mut section)?;
                self.read_hunks(&mut section)?;
            }
        }

        Ok(section.build())
    }

    /// Consume extended header lines until the first unrecognized one.
    ///
    /// First-match-wins per line; a later state-setting line overrides an
    /// earlier one. See https://git-scm.com/docs/git-diff for the grammar.
    fn read_extended_headers(&mut self, section: &mut SectionBuilder) {
        while let Some(line) = self.peek() {
            if line.starts_with("index") || line.starts_with("similarity index ") {
                // consumed, nothing recorded
            } else if let Some(rest) = line.strip_prefix("old mode ") {
                section.old_mode = Some(rest.to_owned());
            } else if let Some(rest) = line.strip_prefix("new mode ") {
                section.mode = Some(rest.to_owned());
            } else if let Some(rest) = line.strip_prefix("deleted file mode ") {
                section.mode = Some(rest.to_owned());
                section.state = FileState::Deleted;
            } else if let Some(rest) = line.strip_prefix("new file mode ") {
                section.mode = Some(rest.to_owned());
                section.state = FileState::Added;
            } else if let Some(rest) = line.strip_prefix("copy from ") {
                section.orig_path = Some(rest.to_owned());
            } else if let Some(rest) = line.strip_prefix("copy to ") {
                section.path = Some(rest.to_owned());
            } else if let Some(rest) = line.strip_prefix("rename from ") {
                section.state = FileState::Renamed;
                section.orig_path = Some(rest.to_owned());
            } else if let Some(rest) = line.strip_prefix("rename to ") {
                section.state = FileState::Renamed;
                section.path = Some(rest.to_owned());
            } else {
                break;
            }
            self.advance();
        }
    }

    /// Strip the mandatory `a/` / `b/` prefix from a header path, keyed off
    /// the section state: an added file has no old side, a deleted file no
    /// new side.
    fn record_path_pair(
        &self,
        section: &mut SectionBuilder,
        line: usize,
        path_a: &str,
        path_b: &str,
    ) -> Result<()> {
        if section.state != FileState::Added {
            let stripped =
                path_a
                    .strip_prefix("a/")
                    .ok_or_else(|| ParseError::BadPathPrefix {
                        line,
                        path: path_a.to_owned(),
                        prefix: "a/",
                    })?;
            section.orig_path = Some(stripped.to_owned());
        }
        if section.state != FileState::Deleted {
            let stripped =
                path_b
                    .strip_prefix("b/")
                    .ok_or_else(|| ParseError::BadPathPrefix {
                        line,
                        path: path_b.to_owned(),
                        prefix: "b/",
                    })?;
            section.path = Some(stripped.to_owned());
        }
        Ok(())
    }

    fn read_path_headers(&mut self, section: &mut SectionBuilder) -> Result<()> {
        let line_a = self.line_number();
        let raw_a = self.expect_line("`---` path header")?;
        let path_a = raw_a
            .strip_prefix("--- ")
            .ok_or_else(|| ParseError::BadPathHeader {
                line: line_a,
                text: raw_a.to_owned(),
            })?;

        let line_b = self.line_number();
        let raw_b = self.expect_line("`+++` path header")?;
        let path_b = raw_b
            .strip_prefix("+++ ")
            .ok_or_else(|| ParseError::BadPathHeader {
                line: line_b,
                text: raw_b.to_owned(),
            })?;

        self.record_path_pair(section, line_a, path_a, path_b)
    }

    fn read_binary_notice(&mut self, section: &mut SectionBuilder) -> Result<()> {
        let line = self.line_number();
        let raw = self.expect_line("binary notice")?;
        let bad = || ParseError::BadBinaryNotice {
            line,
            text: raw.to_owned(),
        };
        let rest = raw.strip_prefix("Binary files ").ok_or_else(bad)?;
        let rest = rest.strip_suffix(" differ").ok_or_else(bad)?;
        let (path_a, path_b) = rest.split_once(" and ").ok_or_else(bad)?;
        self.record_path_pair(section, line, path_a, path_b)
    }

    fn read_hunks(&mut self, section: &mut SectionBuilder) -> Result<()> {
        while let Some(line) = self.peek() {
            if !line.starts_with("@@") {
                break;
            }
            let hunk = self.read_hunk(section.display_path())?;
            section.hunks.push(hunk);
        }
        if section.hunks.is_empty() {
            return Err(ParseError::MissingHunks {
                path: section.display_path().to_owned(),
            });
        }
        Ok(())
    }

    fn read_hunk(&mut self, file: &str) -> Result<Hunk> {
        let header_line = self.line_number();
        let header = self.expect_line("hunk header")?;
        let (orig_start, orig_count, new_start, new_count) =
            parse_range_header(header).ok_or_else(|| ParseError::BadHunkHeader {
                line: header_line,
                text: header.to_owned(),
            })?;

        let mut hunk = Hunk {
            file: file.to_owned(),
            orig_start,
            orig_count,
            new_start,
            new_count,
            lines: Vec::new(),
            missing_newline_old: false,
            missing_newline_new: false,
        };

        // Which side a no-newline marker attaches to: the most recently seen
        // removed or added line. Context lines do not reset it.
        let mut last_kind: Option<LineKind> = None;

        while let Some(raw) = self.peek() {
            let Some(first) = raw.as_bytes().first() else {
                break;
            };
            match *first {
                b' ' => hunk.lines.push(DiffLine::new(LineKind::Context, &raw[1..])),
                b'-' => {
                    last_kind = Some(LineKind::Removed);
                    hunk.lines.push(DiffLine::new(LineKind::Removed, &raw[1..]));
                }
                b'+' => {
                    last_kind = Some(LineKind::Added);
                    hunk.lines.push(DiffLine::new(LineKind::Added, &raw[1..]));
                }
                b'\\' => {
                    let line = self.line_number();
                    if raw != NO_NEWLINE_MARKER {
                        return Err(ParseError::UnknownBackslashLine {
                            line,
                            text: raw.to_owned(),
                        });
                    }
                    match last_kind {
                        Some(LineKind::Removed) => hunk.missing_newline_old = true,
                        Some(LineKind::Added) => hunk.missing_newline_new = true,
                        _ => return Err(ParseError::StrayNoNewlineMarker { line }),
                    }
                }
                _ => break,
            }
            self.advance();
        }

        Ok(hunk)
    }
}

/// Parse `@@ -L[,S] +L[,S] @@[ heading]` into 0-based starts and counts.
/// Counts default to 1 when omitted; the optional trailing heading is ignored.
fn parse_range_header(line: &str) -> Option<(i32, i32, i32, i32)> {
    let rest = line.strip_prefix("@@ -")?;
    let (orig_start, rest) = read_int(rest)?;
    let (orig_count, rest) = read_optional_count(rest)?;
    let rest = rest.strip_prefix(" +")?;
    let (new_start, rest) = read_int(rest)?;
    let (new_count, rest) = read_optional_count(rest)?;
    rest.strip_prefix(" @@")?;
    Some((orig_start - 1, orig_count, new_start - 1, new_count))
}

fn read_int(s: &str) -> Option<(i32, &str)> {
    let end = s
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(s.len());
    if end == 0 {
        return None;
    }
    Some((s[..end].parse().ok()?, &s[end..]))
}

fn read_optional_count(s: &str) -> Option<(i32, &str)> {
    match s.strip_prefix(',') {
        Some(rest) => read_int(rest),
        None => Some((1, s)),
    }
}
