use std::cell::RefCell;
use std::io;
use std::path::{Path, PathBuf};

use hunk_review::editor::Editor;
use hunk_review::fingerprint::HunkFingerprint;
use hunk_review::git::{self, Repository};
use hunk_review::review::{MARK_TEXT, ReviewEngine, Snapshot};
use hunk_review::store::{DecisionStatus, DecisionStore};

/// In-memory repository collaborator: serves canned diff text and records
/// checkout requests instead of touching git.
struct FakeRepo {
    root: PathBuf,
    diff: RefCell<String>,
    checkouts: RefCell<Vec<String>>,
}

impl FakeRepo {
    fn new(root: &Path, diff: &str) -> Self {
        Self {
            root: root.to_path_buf(),
            diff: RefCell::new(diff.to_owned()),
            checkouts: RefCell::new(Vec::new()),
        }
    }
}

impl Repository for FakeRepo {
    fn diff_text(&self) -> git::Result<String> {
        Ok(self.diff.borrow().clone())
    }

    fn branch_name(&self) -> git::Result<String> {
        Ok("main".to_owned())
    }

    fn absolute_path(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    fn checkout_path(&self, relative: &str) -> git::Result<()> {
        self.checkouts.borrow_mut().push(relative.to_owned());
        Ok(())
    }

    fn untracked_files(&self) -> git::Result<Vec<String>> {
        Ok(Vec::new())
    }

    fn unmerged_files(&self) -> git::Result<Vec<String>> {
        Ok(Vec::new())
    }
}

/// Editor collaborator that records launches instead of spawning anything.
#[derive(Default)]
struct RecordingEditor {
    launches: Vec<(PathBuf, usize)>,
}

impl Editor for RecordingEditor {
    fn open(&mut self, path: &Path, line: usize) -> io::Result<()> {
        self.launches.push((path.to_path_buf(), line));
        Ok(())
    }
}

const TWO_FILE_DIFF: &str = "\
diff --git a/alpha.txt b/alpha.txt
--- a/alpha.txt
+++ b/alpha.txt
@@ -1,2 +1,2 @@
 ctx1
-old1
+new1
@@ -10,2 +10,2 @@
 ctx2
-old2
+new2
@@ -20,2 +20,2 @@
 ctx3
-old3
+new3
diff --git a/beta.txt b/beta.txt
--- a/beta.txt
+++ b/beta.txt
@@ -1,1 +1,2 @@
 b1
+b2
";

fn engine_with(
    dir: &tempfile::TempDir,
    diff: &str,
) -> ReviewEngine<FakeRepo, RecordingEditor> {
    let store = DecisionStore::open(&dir.path().join("decisions.db")).unwrap();
    ReviewEngine::new(
        FakeRepo::new(dir.path(), diff),
        RecordingEditor::default(),
        store,
    )
}

fn fingerprints_of(diff: &str) -> Vec<Vec<HunkFingerprint>> {
    let snapshot = Snapshot::from_diff_text(diff).unwrap();
    (0..snapshot.entries.len())
        .map(|f| {
            (0..snapshot.entries[f].hunks.len())
                .map(|h| snapshot.fingerprint(f, h))
                .collect()
        })
        .collect()
}

#[test]
fn traversal_visits_undecided_hunks_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = engine_with(&dir, TWO_FILE_DIFF);

    assert_eq!(engine.next_hunk().unwrap(), Some((0, 0)));
    engine.accept().unwrap();
    assert_eq!(engine.next_hunk().unwrap(), Some((0, 1)));
    engine.skip().unwrap();
    assert_eq!(engine.next_hunk().unwrap(), Some((0, 2)));
    engine.accept().unwrap();
    assert_eq!(engine.next_hunk().unwrap(), Some((1, 0)));
    engine.accept().unwrap();
    assert_eq!(engine.next_hunk().unwrap(), None);
}

#[test]
fn decided_hunks_are_not_reprompted_by_a_later_session() {
    let dir = tempfile::tempdir().unwrap();
    {
        let mut engine = engine_with(&dir, TWO_FILE_DIFF);
        while engine.next_hunk().unwrap().is_some() {
            engine.accept().unwrap();
        }
    }

    // A fresh engine over the same store sees nothing left to review.
    let mut engine = engine_with(&dir, TWO_FILE_DIFF);
    engine.prune().unwrap();
    assert_eq!(engine.next_hunk().unwrap(), None);
}

#[test]
fn accept_rest_of_file_auto_resolves_remaining_hunks() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = engine_with(&dir, TWO_FILE_DIFF);
    let fps = fingerprints_of(TWO_FILE_DIFF);

    assert_eq!(engine.next_hunk().unwrap(), Some((0, 0)));
    engine.accept_rest_of_file().unwrap();

    // Hunks 2 and 3 of the first file resolve without prompting.
    assert_eq!(engine.next_hunk().unwrap(), Some((1, 0)));
    for &fp in &fps[0] {
        assert_eq!(
            engine.decisions().status(fp).unwrap(),
            DecisionStatus::Accepted
        );
    }
    assert_eq!(
        engine.decisions().status(fps[1][0]).unwrap(),
        DecisionStatus::Unknown
    );
}

#[test]
fn skip_rest_of_file_auto_resolves_remaining_hunks() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = engine_with(&dir, TWO_FILE_DIFF);
    let fps = fingerprints_of(TWO_FILE_DIFF);

    assert_eq!(engine.next_hunk().unwrap(), Some((0, 0)));
    engine.skip_rest_of_file().unwrap();

    assert_eq!(engine.next_hunk().unwrap(), Some((1, 0)));
    for &fp in &fps[0] {
        assert_eq!(
            engine.decisions().status(fp).unwrap(),
            DecisionStatus::Skipped
        );
    }
}

#[test]
fn unaccept_reverts_exactly_the_latest_decision_and_retargets_the_cursor() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = engine_with(&dir, TWO_FILE_DIFF);
    let fps = fingerprints_of(TWO_FILE_DIFF);

    assert_eq!(engine.next_hunk().unwrap(), Some((0, 0)));
    engine.accept_rest_of_file().unwrap();
    assert_eq!(engine.next_hunk().unwrap(), Some((1, 0)));

    // The last hunk of the first file carries the latest timestamp.
    let cleared = engine.undo_latest_accept().unwrap();
    assert_eq!(cleared, Some(fps[0][2]));

    assert_eq!(engine.next_hunk().unwrap(), Some((0, 2)));
    assert_eq!(engine.current_fingerprint(), Some(fps[0][2]));
    assert_eq!(
        engine.decisions().status(fps[0][0]).unwrap(),
        DecisionStatus::Accepted
    );
    assert_eq!(
        engine.decisions().status(fps[0][2]).unwrap(),
        DecisionStatus::Unknown
    );
}

#[test]
fn unaccept_with_nothing_accepted_returns_none() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = engine_with(&dir, TWO_FILE_DIFF);
    assert_eq!(engine.next_hunk().unwrap(), Some((0, 0)));
    engine.skip().unwrap();
    assert_eq!(engine.undo_latest_accept().unwrap(), None);
}

#[test]
fn pruning_drops_vanished_skips_and_keeps_vanished_accepts() {
    let replacement: &str = "\
diff --git a/gamma.txt b/gamma.txt
--- a/gamma.txt
+++ b/gamma.txt
@@ -1,1 +1,1 @@
-g1
+g2
";
    let dir = tempfile::tempdir().unwrap();
    let fps = fingerprints_of(TWO_FILE_DIFF);
    {
        let mut engine = engine_with(&dir, TWO_FILE_DIFF);
        engine.next_hunk().unwrap();
        engine.accept().unwrap();
        engine.next_hunk().unwrap();
        engine.skip().unwrap();
    }

    // The next run sees an unrelated diff: the skip is gone, the accept
    // survives until forget.
    let mut engine = engine_with(&dir, replacement);
    engine.prune().unwrap();
    assert_eq!(
        engine.decisions().status(fps[0][0]).unwrap(),
        DecisionStatus::Accepted
    );
    assert_eq!(
        engine.decisions().status(fps[0][1]).unwrap(),
        DecisionStatus::Unknown
    );

    engine.forget().unwrap();
    assert_eq!(
        engine.decisions().status(fps[0][0]).unwrap(),
        DecisionStatus::Unknown
    );
}

#[test]
fn revert_restores_the_working_file() {
    let dir = tempfile::tempdir().unwrap();
    let diff = "\
diff --git a/notes.txt b/notes.txt
--- a/notes.txt
+++ b/notes.txt
@@ -1,3 +1,3 @@
 first
-second
+patched
 third
";
    std::fs::write(dir.path().join("notes.txt"), "first\npatched\nthird\n").unwrap();

    let mut engine = engine_with(&dir, diff);
    assert_eq!(engine.next_hunk().unwrap(), Some((0, 0)));
    engine.revert_current().unwrap();

    let content = std::fs::read_to_string(dir.path().join("notes.txt")).unwrap();
    assert_eq!(content, "first\nsecond\nthird\n");
}

#[test]
fn revert_of_a_deleted_file_checks_it_out() {
    let dir = tempfile::tempdir().unwrap();
    let diff = "\
diff --git a/gone.txt b/gone.txt
deleted file mode 100644
--- a/gone.txt
+++ /dev/null
@@ -1,1 +0,0 @@
-contents
";
    let mut engine = engine_with(&dir, diff);
    assert_eq!(engine.next_hunk().unwrap(), Some((0, 0)));
    engine.revert_current().unwrap();

    // Restored via collaborator checkout, not line reconstruction.
    assert_eq!(
        engine.repo().checkouts.borrow().as_slice(),
        ["gone.txt".to_owned()]
    );
}

#[test]
fn mark_inserts_the_sentinel_before_the_changed_line() {
    let dir = tempfile::tempdir().unwrap();
    let diff = "\
diff --git a/notes.txt b/notes.txt
--- a/notes.txt
+++ b/notes.txt
@@ -1,3 +1,3 @@
 first
-second
+patched
 third
";
    std::fs::write(dir.path().join("notes.txt"), "first\npatched\nthird\n").unwrap();

    let mut engine = engine_with(&dir, diff);
    assert_eq!(engine.next_hunk().unwrap(), Some((0, 0)));
    engine.mark_current().unwrap();

    let content = std::fs::read_to_string(dir.path().join("notes.txt")).unwrap();
    assert_eq!(content, format!("first\n{MARK_TEXT}\npatched\nthird\n"));
}

#[test]
fn edit_hands_the_file_and_first_new_side_line_to_the_editor() {
    let dir = tempfile::tempdir().unwrap();
    let diff = "\
diff --git a/src/lib.rs b/src/lib.rs
--- a/src/lib.rs
+++ b/src/lib.rs
@@ -10,2 +10,3 @@
 ctx
-old
+new1
+new2
";
    let mut engine = engine_with(&dir, diff);
    assert_eq!(engine.next_hunk().unwrap(), Some((0, 0)));
    engine.edit_current().unwrap();

    let launches = &engine.editor().launches;
    assert_eq!(launches.len(), 1);
    assert_eq!(launches[0].0, dir.path().join("src/lib.rs"));
    assert_eq!(launches[0].1, 10);
}
