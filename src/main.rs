use anyhow::{Context, Result};

use hunk_review::cli;
use hunk_review::editor::ExternalEditor;
use hunk_review::git::GitRepo;
use hunk_review::review::ReviewEngine;
use hunk_review::store::DecisionStore;

fn main() -> Result<()> {
    env_logger::init();
    let args = cli::parse_args();

    let repo = GitRepo::discover(args.distance)?;

    let state_dir = repo.root().join(".git/hunk-review");
    std::fs::create_dir_all(&state_dir)
        .with_context(|| format!("creating {} failed", state_dir.display()))?;
    let store = DecisionStore::open(&state_dir.join("decisions.db"))?;

    let mut engine = ReviewEngine::new(repo, ExternalEditor, store);

    if args.forget {
        engine.forget()?;
    } else {
        engine.prune()?;
    }
    if args.unaccept {
        engine.unaccept()?;
    }

    engine.run()
}
