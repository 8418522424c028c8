//! Emit all patterns above a probability cutoff from a learned grammar.

use anyhow::{ensure, Context, Result};
use clap::Parser;
use guesscalc::Pcfg;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(about = "Generate patterns above a probability cutoff from a learned PCFG")]
struct Args {
    /// Only emit patterns with probability at or above this value.
    #[arg(long)]
    cutoff: f64,

    /// Structures file of the grammar.
    #[arg(long, default_value = "grammar/nonterminalRules.txt")]
    structures: PathBuf,

    /// Directory holding the terminals files.
    #[arg(long, default_value = "grammar/terminalRules")]
    terminals: PathBuf,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    ensure!(
        (0.0..=1.0).contains(&args.cutoff),
        "cutoff must fall within [0, 1]"
    );

    log::info!("loading grammar from {}", args.structures.display());
    let pcfg = Pcfg::load(&args.structures, &args.terminals).context("loading grammar")?;

    let stdout = io::stdout().lock();
    let mut out = BufWriter::new(stdout);
    pcfg.generate_patterns(args.cutoff, &mut out)
        .context("generating patterns")?;
    out.flush()?;
    Ok(())
}
