use crate::term::{BLUE, RESET};
use crate::{FileEntry, FileState, Hunk, LineKind};

/// Hunks with more body rows than this render as head + elision + tail.
pub const MAX_BODY_ROWS: usize = 20;

const TAB_WIDTH: usize = 2;

// Cut indicators built from punctuation unlikely to appear in real source,
// so a truncated line is visibly distinct from one that happens to fit.
const CUT_PREFIX: &str = "\u{2056}\u{2058}\u{2059}\u{205c}\u{2055}";
const CUT_SUFFIX: &str = "\u{2055}\u{205c}\u{2059}\u{2058}\u{2056}";

/// Render a hunk as a fixed-width two-column view.
///
/// A removed line immediately followed by an added line is shown as a
/// side-by-side pair; the middle marker is `ww` when the two differ only in
/// whitespace, `++` otherwise. Unpaired removed lines show left-only (`+.`),
/// unpaired added lines right-only (`.+`), context mirrors on both sides.
/// `horizontal_offset` scrolls both columns; oversized hunks render a head
/// slice, an elision notice, and a tail slice.
pub fn render_hunk(
    entry: &FileEntry,
    hunk: &Hunk,
    terminal_width: usize,
    horizontal_offset: usize,
) -> String {
    let column_width = terminal_width.saturating_sub(8) / 2;

    let mut left: Vec<String> = Vec::new();
    let mut right: Vec<String> = Vec::new();
    let mut markers: Vec<&'static str> = Vec::new();

    let mut i = 0;
    while i < hunk.lines.len() {
        let line = &hunk.lines[i];
        let next = hunk.lines.get(i + 1);
        let text = scrolled(&line.text, horizontal_offset);

        if line.kind == LineKind::Removed && next.map(|n| n.kind) == Some(LineKind::Added) {
            let next_text = scrolled(&next.unwrap().text, horizontal_offset);
            markers.push(if expand_tabs(&text) == expand_tabs(&next_text) {
                "ww"
            } else {
                "++"
            });
            left.push(text);
            right.push(next_text);
            i += 1;
        } else {
            match line.kind {
                LineKind::Context => {
                    left.push(text.clone());
                    right.push(text);
                    markers.push("  ");
                }
                LineKind::Removed => {
                    left.push(text);
                    right.push(String::new());
                    markers.push("+.");
                }
                LineKind::Added => {
                    left.push(String::new());
                    right.push(text);
                    markers.push(".+");
                }
            }
        }
        i += 1;
    }

    let mut out = String::new();
    dashes(&mut out, terminal_width, None);
    out.push_str(BLUE);

    let rows = left.len();
    if rows <= MAX_BODY_ROWS {
        for row in 0..rows {
            push_row(&mut out, &left[row], markers[row], &right[row], column_width);
        }
    } else {
        let slice = MAX_BODY_ROWS / 2;
        for row in 0..slice {
            push_row(&mut out, &left[row], markers[row], &right[row], column_width);
        }
        out.push('\n');
        pad(&mut out, "", column_width);
        out.push_str("   :\n");
        pad(&mut out, "", column_width.saturating_sub(4));
        out.push('(');
        out.push_str(&(rows - MAX_BODY_ROWS).to_string());
        out.push_str(" lines)\n");
        pad(&mut out, "", column_width);
        out.push_str("   :\n");
        out.push('\n');
        for row in (rows - slice)..rows {
            push_row(&mut out, &left[row], markers[row], &right[row], column_width);
        }
    }
    out.push('\n');
    out.push_str(RESET);

    dashes(&mut out, terminal_width, Some(&file_summary(entry, terminal_width)));
    out
}

/// The trailer line's centered label: the file's relative path, prefixed for
/// added/deleted files, reduced to the basename when the path is very long.
fn file_summary(entry: &FileEntry, terminal_width: usize) -> String {
    let (prefix, mut name) = match entry.state {
        FileState::Deleted => ("Deleted", entry.display_path()),
        FileState::Added => ("New file", entry.display_path()),
        _ => ("", entry.display_path()),
    };
    if name.chars().count() as f32 > terminal_width as f32 * 0.8 {
        name = name.rsplit('/').next().unwrap_or(name);
    }
    if prefix.is_empty() {
        name.to_owned()
    } else {
        format!("*** {prefix}: {name} ***")
    }
}

fn push_row(out: &mut String, left: &str, marker: &str, right: &str, width: usize) {
    pad(out, &expand_tabs(left), width);
    out.push_str("   ");
    out.push_str(marker);
    out.push_str("   ");
    pad(out, &expand_tabs(right), width);
    out.push('\n');
}

/// Shift a line left by the scroll offset, flagging scrolled lines with the
/// cut prefix.
fn scrolled(text: &str, offset: usize) -> String {
    if offset == 0 {
        return text.to_owned();
    }
    let mut out = String::from(CUT_PREFIX);
    out.extend(text.chars().skip(offset));
    out
}

/// Trim trailing whitespace and expand tabs to the next tab stop.
fn expand_tabs(line: &str) -> String {
    let mut out = String::new();
    let mut column = 0;
    for c in line.trim_end().chars() {
        if c == '\t' {
            let target = (column + TAB_WIDTH) / TAB_WIDTH * TAB_WIDTH;
            while column < target {
                out.push(' ');
                column += 1;
            }
        } else {
            out.push(c);
            column += 1;
        }
    }
    out
}

/// Append `s` padded with spaces to `width` columns; content wider than the
/// column is truncated and capped with the cut suffix.
fn pad(out: &mut String, s: &str, width: usize) {
    let len = s.chars().count();
    if len > width {
        let keep = width.saturating_sub(CUT_SUFFIX.chars().count());
        out.extend(s.chars().take(keep));
        out.push_str(CUT_SUFFIX);
    } else {
        out.push_str(s);
        for _ in len..width {
            out.push(' ');
        }
    }
}

/// Append a full-width dash rule, optionally with a centered message.
fn dashes(out: &mut String, width: usize, msg: Option<&str>) {
    match msg {
        Some(msg) => {
            let msg = format!("   {msg}   ");
            let msg_len = msg.chars().count();
            if msg_len >= width {
                out.push_str(&msg);
            } else {
                let lead = (width - msg_len) / 2;
                for _ in 0..lead {
                    out.push('-');
                }
                out.push_str(&msg);
                for _ in 0..(width - lead - msg_len) {
                    out.push('-');
                }
            }
        }
        None => {
            for _ in 0..width {
                out.push('-');
            }
        }
    }
    out.push('\n');
}
