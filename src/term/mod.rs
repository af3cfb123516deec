use std::io;

use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal::{self, disable_raw_mode, enable_raw_mode};

pub const RED: &str = "\x1b[31m";
pub const BLUE: &str = "\x1b[34m";
pub const RESET: &str = "\x1b[0m";

/// Width used when the terminal cannot report one (pipes, some IDEs).
pub const FALLBACK_WIDTH: usize = 120;

/// Current terminal width in columns.
pub fn display_width() -> usize {
    match terminal::size() {
        Ok((cols, _)) if cols > 0 => cols as usize,
        _ => FALLBACK_WIDTH,
    }
}

/// Block for a single keypress, without line buffering.
///
/// Esc and Ctrl-C are reported as `q` so they quit like the command does.
pub fn read_key() -> io::Result<char> {
    enable_raw_mode()?;
    let key = read_key_raw();
    disable_raw_mode()?;
    key
}

fn read_key_raw() -> io::Result<char> {
    loop {
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }
        match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => return Ok('q'),
            KeyCode::Esc => return Ok('q'),
            KeyCode::Enter => return Ok('\n'),
            KeyCode::Char(c) => return Ok(c),
            _ => {}
        }
    }
}
