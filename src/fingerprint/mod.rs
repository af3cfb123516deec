use std::fmt;

use crc32fast::Hasher;

use crate::Hunk;

/// Content-derived identity of a hunk: a CRC32 over the owning path and the
/// canonical serialization of the hunk.
///
/// Stable across reordering of unrelated file entries; any change to a range
/// bound, body line, or newline flag produces a different value. The 32-bit
/// space means collisions are possible; they are an accepted risk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HunkFingerprint(pub u32);

impl fmt::Display for HunkFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Compute the fingerprint of a hunk. Pure function, no state.
pub fn fingerprint_hunk(hunk: &Hunk) -> HunkFingerprint {
    let mut hasher = Hasher::new();
    hasher.update(hunk.file.as_bytes());
    hasher.update(canonical_serialization(hunk).as_bytes());
    HunkFingerprint(hasher.finalize())
}

/// Deterministic textual form of a hunk: both ranges, then every body line
/// as marker+text in order, then the missing-newline flags.
fn canonical_serialization(hunk: &Hunk) -> String {
    let mut out = format!(
        "@@ -{},{} +{},{} @@\n",
        hunk.orig_start, hunk.orig_count, hunk.new_start, hunk.new_count
    );
    for line in &hunk.lines {
        out.push(line.marker());
        out.push_str(&line.text);
        out.push('\n');
    }
    if hunk.missing_newline_old {
        out.push_str("\\old\n");
    }
    if hunk.missing_newline_new {
        out.push_str("\\new\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_diff;

    const FIRST: &str = "\
diff --git a/one.txt b/one.txt
--- a/one.txt
+++ b/one.txt
@@ -3,2 +3,2 @@
 ctx
-old
+new
";
    const SECOND: &str = "\
diff --git a/two.txt b/two.txt
--- a/two.txt
+++ b/two.txt
@@ -8,1 +8,2 @@
 keep
+extra
";

    fn single_fingerprint(diff: &str) -> HunkFingerprint {
        let entries = parse_diff(diff).unwrap();
        fingerprint_hunk(&entries[0].hunks[0])
    }

    #[test]
    fn fingerprint_is_deterministic() {
        assert_eq!(single_fingerprint(FIRST), single_fingerprint(FIRST));
    }

    #[test]
    fn reordering_unrelated_entries_does_not_change_fingerprints() {
        let forward = parse_diff(&format!("{FIRST}{SECOND}")).unwrap();
        let backward = parse_diff(&format!("{SECOND}{FIRST}")).unwrap();

        assert_eq!(
            fingerprint_hunk(&forward[0].hunks[0]),
            fingerprint_hunk(&backward[1].hunks[0])
        );
        assert_eq!(
            fingerprint_hunk(&forward[1].hunks[0]),
            fingerprint_hunk(&backward[0].hunks[0])
        );
    }

    #[test]
    fn changing_a_body_line_changes_the_fingerprint() {
        let modified = FIRST.replace("+new", "+other");
        assert_ne!(single_fingerprint(FIRST), single_fingerprint(&modified));
    }

    #[test]
    fn changing_a_range_bound_changes_the_fingerprint() {
        let shifted = FIRST.replace("@@ -3,2 +3,2 @@", "@@ -4,2 +4,2 @@");
        assert_ne!(single_fingerprint(FIRST), single_fingerprint(&shifted));
    }

    #[test]
    fn changing_the_path_changes_the_fingerprint() {
        let moved = FIRST.replace("one.txt", "renamed.txt");
        assert_ne!(single_fingerprint(FIRST), single_fingerprint(&moved));
    }

    #[test]
    fn newline_flags_are_part_of_the_identity() {
        let flagged = format!("{}\\ No newline at end of file\n", FIRST);
        assert_ne!(single_fingerprint(FIRST), single_fingerprint(&flagged));
    }
}
