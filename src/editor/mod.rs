use std::env;
use std::io;
use std::path::Path;
use std::process::Command;

/// External-editor collaborator: an explicit suspension point in the review
/// loop. `open` blocks until the editor exits.
pub trait Editor {
    fn open(&mut self, path: &Path, line: usize) -> io::Result<()>;
}

/// Launches `$EDITOR` (falling back to `vi`) positioned at the given line.
pub struct ExternalEditor;

impl Editor for ExternalEditor {
    fn open(&mut self, path: &Path, line: usize) -> io::Result<()> {
        let editor = env::var("EDITOR").unwrap_or_else(|_| "vi".to_owned());
        let mut parts = editor.split_whitespace();
        let program = parts.next().unwrap_or("vi");
        let status = Command::new(program)
            .args(parts)
            .arg(format!("+{line}"))
            .arg(path)
            .status()?;
        if !status.success() {
            return Err(io::Error::other(format!("editor exited with {status}")));
        }
        Ok(())
    }
}
