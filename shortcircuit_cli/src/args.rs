//! Command-line argument parsing.

use clap::Parser;

/// Runs a short-circuit board against a script of edit/control messages.
#[derive(Parser, Debug)]
#[command(name = "shortcircuit")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the initial board text (glyph rows, optionally followed by
    /// a blank line and a portal-annex JSON object).
    #[arg(short = 'b', long)]
    pub board: String,

    /// Path to a newline-delimited JSON file of messages to apply, in
    /// order. If omitted, the board is loaded and immediately re-printed
    /// with no edits applied.
    #[arg(short = 's', long)]
    pub script: Option<String>,

    /// Print the final board to stdout after the script finishes.
    #[arg(long, default_value_t = false)]
    pub print: bool,
}
