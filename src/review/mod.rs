use std::collections::HashSet;
use std::fs;
use std::io::{self, Write};

use anyhow::{Context, Result, anyhow};
use log::debug;

use crate::editor::Editor;
use crate::fingerprint::{HunkFingerprint, fingerprint_hunk};
use crate::git::Repository;
use crate::parser::parse_diff;
use crate::patch::{insert_mark, revert_hunk};
use crate::render::render_hunk;
use crate::store::{DecisionStatus, DecisionStore};
use crate::term;
use crate::{FileEntry, FileState, Hunk};

/// Sentinel line inserted into the working file by the `mark` command.
pub const MARK_TEXT: &str = "<<<<<<<<<<<< MARK >>>>>>>>>>>>";

const SCROLL_STEP: usize = 20;
const MAX_SCROLL: usize = 250;

/// The parsed result of one diff generation, with fingerprints precomputed
/// per hunk. Discarded and rebuilt after any working-tree mutation.
pub struct Snapshot {
    pub entries: Vec<FileEntry>,
    fingerprints: Vec<Vec<HunkFingerprint>>,
}

impl Snapshot {
    pub fn from_diff_text(text: &str) -> crate::parser::Result<Self> {
        let entries = parse_diff(text)?;
        let fingerprints = entries
            .iter()
            .map(|entry| entry.hunks.iter().map(fingerprint_hunk).collect())
            .collect();
        Ok(Self {
            entries,
            fingerprints,
        })
    }

    pub fn fingerprint(&self, file: usize, hunk: usize) -> HunkFingerprint {
        self.fingerprints[file][hunk]
    }

    /// Position of a fingerprint in this snapshot, if it still exists.
    pub fn find(&self, target: HunkFingerprint) -> Option<(usize, usize)> {
        self.fingerprints.iter().enumerate().find_map(|(f, fps)| {
            fps.iter()
                .position(|&fp| fp == target)
                .map(|h| (f, h))
        })
    }

    pub fn live_fingerprints(&self) -> HashSet<HunkFingerprint> {
        self.fingerprints.iter().flatten().copied().collect()
    }

    pub fn hunk_count(&self) -> usize {
        self.fingerprints.iter().map(Vec::len).sum()
    }
}

/// Transient pointer into the current snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Cursor {
    file: usize,
    hunk: usize,
}

/// Cursor-driven review state machine.
///
/// Walks the snapshot file by file, hunk by hunk, silently passing hunks
/// that already carry a decision; records decisions in the persistent
/// store; regenerates the snapshot after anything touches the working tree.
pub struct ReviewEngine<R: Repository, E: Editor> {
    repo: R,
    editor: E,
    store: DecisionStore,
    snapshot: Option<Snapshot>,
    cursor: Cursor,
    skip_file: Option<usize>,
    accept_file: Option<usize>,
    target: Option<HunkFingerprint>,
}

impl<R: Repository, E: Editor> ReviewEngine<R, E> {
    pub fn new(repo: R, editor: E, store: DecisionStore) -> Self {
        Self {
            repo,
            editor,
            store,
            snapshot: None,
            cursor: Cursor::default(),
            skip_file: None,
            accept_file: None,
            target: None,
        }
    }

    pub fn decisions(&self) -> &DecisionStore {
        &self.store
    }

    pub fn repo(&self) -> &R {
        &self.repo
    }

    pub fn editor(&self) -> &E {
        &self.editor
    }

    /// Parse a fresh diff if the snapshot was invalidated, repositioning the
    /// cursor to the remembered fingerprint when it survived.
    fn ensure_snapshot(&mut self) -> Result<()> {
        if self.snapshot.is_some() {
            return Ok(());
        }
        let text = self.repo.diff_text().context("diff generation failed")?;
        let snapshot = Snapshot::from_diff_text(&text)?;
        debug!(
            "parsed snapshot: {} files, {} hunks",
            snapshot.entries.len(),
            snapshot.hunk_count()
        );
        self.cursor = match self.target.take().and_then(|fp| snapshot.find(fp)) {
            Some((file, hunk)) => Cursor { file, hunk },
            None => Cursor::default(),
        };
        self.snapshot = Some(snapshot);
        Ok(())
    }

    pub fn snapshot(&mut self) -> Result<&Snapshot> {
        self.ensure_snapshot()?;
        Ok(self.snapshot.as_ref().expect("snapshot just built"))
    }

    /// Throw the snapshot away. The next access re-parses and moves the
    /// cursor to `target` (or, by default, back to the current hunk) if it
    /// still exists, else to the first unresolved hunk.
    pub fn invalidate(&mut self, target: Option<HunkFingerprint>) {
        self.target = target.or_else(|| self.current_fingerprint());
        self.snapshot = None;
        // File indices mean nothing across snapshots.
        self.skip_file = None;
        self.accept_file = None;
    }

    /// Fingerprint under the cursor, if the cursor points at a hunk.
    pub fn current_fingerprint(&self) -> Option<HunkFingerprint> {
        let snapshot = self.snapshot.as_ref()?;
        snapshot
            .fingerprints
            .get(self.cursor.file)?
            .get(self.cursor.hunk)
            .copied()
    }

    /// Advance to the next hunk awaiting a decision, auto-resolving hunks
    /// in files flagged for whole-file skip or accept. Returns `None` when
    /// the review is complete.
    pub fn next_hunk(&mut self) -> Result<Option<(usize, usize)>> {
        loop {
            self.ensure_snapshot()?;
            let snapshot = self.snapshot.as_ref().expect("snapshot just built");
            if self.cursor.file >= snapshot.entries.len() {
                return Ok(None);
            }
            if self.cursor.hunk >= snapshot.entries[self.cursor.file].hunks.len() {
                self.cursor.file += 1;
                self.cursor.hunk = 0;
                continue;
            }
            let fp = snapshot.fingerprint(self.cursor.file, self.cursor.hunk);
            if self.store.status(fp)? != DecisionStatus::Unknown {
                self.cursor.hunk += 1;
                continue;
            }
            if self.skip_file == Some(self.cursor.file) {
                self.store.record(fp, DecisionStatus::Skipped)?;
                continue;
            }
            if self.accept_file == Some(self.cursor.file) {
                self.store.record(fp, DecisionStatus::Accepted)?;
                continue;
            }
            return Ok(Some((self.cursor.file, self.cursor.hunk)));
        }
    }

    fn require_current(&self) -> Result<HunkFingerprint> {
        self.current_fingerprint()
            .ok_or_else(|| anyhow!("no hunk under the review cursor"))
    }

    pub fn accept(&mut self) -> Result<()> {
        let fp = self.require_current()?;
        self.store.record(fp, DecisionStatus::Accepted)?;
        Ok(())
    }

    pub fn skip(&mut self) -> Result<()> {
        let fp = self.require_current()?;
        self.store.record(fp, DecisionStatus::Skipped)?;
        Ok(())
    }

    /// Accept the current hunk and auto-accept the rest of its file.
    pub fn accept_rest_of_file(&mut self) -> Result<()> {
        self.accept()?;
        self.accept_file = Some(self.cursor.file);
        Ok(())
    }

    /// Skip the current hunk and auto-skip the rest of its file.
    pub fn skip_rest_of_file(&mut self) -> Result<()> {
        self.skip()?;
        self.skip_file = Some(self.cursor.file);
        Ok(())
    }

    /// Clear the accepted decision with the latest timestamp among the
    /// hunks of the current snapshot. Returns its fingerprint, or `None`
    /// when nothing is accepted.
    pub fn unaccept(&mut self) -> Result<Option<HunkFingerprint>> {
        self.ensure_snapshot()?;
        let snapshot = self.snapshot.as_ref().expect("snapshot just built");
        let mut newest: Option<(i64, HunkFingerprint)> = None;
        for &fp in snapshot.fingerprints.iter().flatten() {
            let Some(decision) = self.store.decision(fp)? else {
                continue;
            };
            if decision.status != DecisionStatus::Accepted {
                continue;
            }
            if newest.is_none_or(|(t, _)| t < decision.timestamp) {
                newest = Some((decision.timestamp, fp));
            }
        }
        let Some((_, fp)) = newest else {
            return Ok(None);
        };
        self.store.clear(fp)?;
        Ok(Some(fp))
    }

    /// The `u` command: unaccept, then rebuild the snapshot with the cursor
    /// targeted at the cleared hunk.
    pub fn undo_latest_accept(&mut self) -> Result<Option<HunkFingerprint>> {
        let cleared = self.unaccept()?;
        self.invalidate(cleared);
        Ok(cleared)
    }

    /// Drop stored decisions for hunks no longer in the snapshot (accepted
    /// ones survive until `forget`).
    pub fn prune(&mut self) -> Result<()> {
        self.ensure_snapshot()?;
        let live = self
            .snapshot
            .as_ref()
            .expect("snapshot just built")
            .live_fingerprints();
        self.store.prune(&live)?;
        Ok(())
    }

    /// Clear every decision for the repository.
    pub fn forget(&mut self) -> Result<()> {
        self.store.forget_all()?;
        Ok(())
    }

    fn current_entry(&self) -> Result<&FileEntry> {
        let snapshot = self
            .snapshot
            .as_ref()
            .ok_or_else(|| anyhow!("no snapshot"))?;
        snapshot
            .entries
            .get(self.cursor.file)
            .ok_or_else(|| anyhow!("no hunk under the review cursor"))
    }

    fn current_hunk(&self) -> Result<&Hunk> {
        self.current_entry()?
            .hunks
            .get(self.cursor.hunk)
            .ok_or_else(|| anyhow!("no hunk under the review cursor"))
    }

    /// Undo the current hunk's edit in the working file, or restore a
    /// deleted file via checkout. Invalidates the snapshot.
    pub fn revert_current(&mut self) -> Result<()> {
        let entry = self.current_entry()?;
        if entry.state == FileState::Deleted {
            let path = entry
                .orig_path
                .clone()
                .ok_or_else(|| anyhow!("deleted file without an old-side path"))?;
            self.repo
                .checkout_path(&path)
                .with_context(|| format!("checkout of {path} failed"))?;
        } else {
            let hunk = self.current_hunk()?.clone();
            let path = self.repo.absolute_path(&hunk.file);
            let content = fs::read_to_string(&path)
                .with_context(|| format!("reading {} failed", path.display()))?;
            let restored = revert_hunk(&hunk, &content)?;
            fs::write(&path, restored)
                .with_context(|| format!("writing {} failed", path.display()))?;
        }
        self.invalidate(None);
        Ok(())
    }

    /// Insert the mark sentinel just above the current hunk's first changed
    /// line. Invalidates the snapshot.
    pub fn mark_current(&mut self) -> Result<()> {
        let hunk = self.current_hunk()?.clone();
        let path = self.repo.absolute_path(&hunk.file);
        let content = fs::read_to_string(&path)
            .with_context(|| format!("reading {} failed", path.display()))?;
        let marked = insert_mark(&content, &hunk, MARK_TEXT);
        fs::write(&path, marked)
            .with_context(|| format!("writing {} failed", path.display()))?;
        self.invalidate(None);
        Ok(())
    }

    /// Hand the current hunk's file and first new-side line to the editor,
    /// then invalidate the snapshot.
    pub fn edit_current(&mut self) -> Result<()> {
        let hunk = self.current_hunk()?;
        let line = hunk.new_start.max(0) as usize + 1;
        let path = self.repo.absolute_path(&hunk.file);
        self.editor
            .open(&path, line)
            .with_context(|| format!("editing {} failed", path.display()))?;
        self.invalidate(None);
        Ok(())
    }

    /// Interactive review loop: render, prompt, dispatch, repeat until the
    /// hunks run out or the reviewer quits.
    pub fn run(&mut self) -> Result<()> {
        self.report_unusual()?;

        let mut horizontal_offset = 0usize;
        let mut reset_scroll = true;
        let mut alternate = false;

        'review: loop {
            let Some((file, hunk)) = self.next_hunk()? else {
                break;
            };
            if reset_scroll {
                horizontal_offset = 0;
            }
            reset_scroll = true;

            // Spacer between hunks; alternate the count so a redisplay of
            // the same hunk still visibly moves the screen.
            print!("\n\n\n\n");
            if alternate {
                println!();
            }
            alternate = !alternate;

            let state = {
                let snapshot = self.snapshot.as_ref().expect("positioned by next_hunk");
                let entry = &snapshot.entries[file];
                let width = term::display_width().saturating_sub(1);
                println!(
                    "{}",
                    render_hunk(entry, &entry.hunks[hunk], width, horizontal_offset)
                );
                entry.state
            };

            loop {
                self.print_prompt()?;
                let key = term::read_key()?;
                println!();

                match key {
                    'q' => break 'review,
                    '-' => {
                        horizontal_offset = horizontal_offset.saturating_sub(SCROLL_STEP);
                        reset_scroll = false;
                        break;
                    }
                    '=' => {
                        horizontal_offset = (horizontal_offset + SCROLL_STEP).min(MAX_SCROLL);
                        reset_scroll = false;
                        break;
                    }
                    'a' => {
                        self.accept()?;
                        break;
                    }
                    'A' => {
                        self.accept_rest_of_file()?;
                        break;
                    }
                    's' => {
                        self.skip()?;
                        break;
                    }
                    'S' => {
                        self.skip_rest_of_file()?;
                        break;
                    }
                    'u' => {
                        self.undo_latest_accept()?;
                        break;
                    }
                    'R' => {
                        self.revert_current()?;
                        break;
                    }
                    'e' => {
                        if state == FileState::Deleted {
                            println!("File was deleted! Try reverting it first.");
                            continue;
                        }
                        self.edit_current()?;
                        break;
                    }
                    'm' => {
                        if state == FileState::Deleted {
                            println!("File was deleted! Try reverting it first.");
                            continue;
                        }
                        self.mark_current()?;
                        break;
                    }
                    // redisplay
                    'g' => break,
                    _ => println!("Invalid choice!"),
                }
            }
        }

        self.print_summary()?;
        self.report_unusual()?;
        Ok(())
    }

    fn print_prompt(&self) -> Result<()> {
        let mut prompt = String::new();
        let branch = self.repo.branch_name()?;
        if !branch.is_empty() && branch != "main" && branch != "master" {
            prompt.push_str(term::RED);
            prompt.push_str("*** Branch: ");
            prompt.push_str(&branch);
            prompt.push_str("*** ");
            prompt.push_str(term::RESET);
        }
        prompt.push_str(
            "a)ccept, A)ll in file, e)dit, R)evert, s)kip, S)kipfile, m)ark, q)uit, u)naccept, ag)ain: ",
        );
        print!("{prompt}");
        io::stdout().flush()?;
        Ok(())
    }

    fn print_summary(&mut self) -> Result<()> {
        self.ensure_snapshot()?;
        let snapshot = self.snapshot.as_ref().expect("snapshot just built");
        let entry_count = snapshot.entries.len();
        let mut changes = 0usize;
        let mut accepted = 0usize;
        let mut skipped = 0usize;
        for &fp in snapshot.fingerprints.iter().flatten() {
            changes += 1;
            match self.store.status(fp)? {
                DecisionStatus::Accepted => accepted += 1,
                DecisionStatus::Skipped => skipped += 1,
                DecisionStatus::Unknown => {}
            }
        }
        if changes == 0 && entry_count == 0 {
            println!("...no changes");
        } else if changes != 0 {
            println!("...changes: {changes}  accepted: {accepted}  skipped: {skipped}");
        } else {
            println!("...changes: {entry_count}");
        }
        Ok(())
    }

    /// Warn about files the diff does not cover: untracked files and merge
    /// conflicts.
    fn report_unusual(&self) -> Result<()> {
        let untracked = self.repo.untracked_files()?;
        if !untracked.is_empty() {
            println!();
            println!("*** Untracked files exist:");
            for file in &untracked {
                println!("  {file}");
            }
        }
        let unmerged = self.repo.unmerged_files()?;
        if !unmerged.is_empty() {
            println!();
            println!("*** Merge conflicts exist:");
            for file in &unmerged {
                println!("  {file}");
            }
        }
        Ok(())
    }
}
