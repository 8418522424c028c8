//! Emit all strings above a probability cutoff from a learned grammar.

use anyhow::{ensure, Context, Result};
use clap::Parser;
use guesscalc::Pcfg;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(about = "Generate strings above a probability cutoff from a learned PCFG")]
struct Args {
    /// Only emit strings whose pattern probability is at or above this value.
    #[arg(long)]
    cutoff: f64,

    /// Look every string up across the whole grammar: emit its summed
    /// probability, and emit it from its home structure only.
    #[arg(long)]
    accurate: bool,

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
    pcfg.generate_strings(args.cutoff, args.accurate, &mut out)
        .context("generating strings")?;
    out.flush()?;
    Ok(())
}
