use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "hunk-review",
    about = "Interactively accept, skip, revert, or mark the hunks of a git diff"
)]
pub struct Cli {
    /// Forget all previously recorded hunk decisions before starting.
    #[arg(short, long)]
    pub forget: bool,

    /// Review against the commit this many steps behind HEAD.
    #[arg(short, long, default_value_t = 0)]
    pub distance: u32,

    /// Unaccept the most recently accepted hunk before starting.
    #[arg(short, long)]
    pub unaccept: bool,
}

/// Parse CLI arguments.
pub fn parse_args() -> Cli {
    Cli::parse()
}
