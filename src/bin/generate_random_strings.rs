//! Sample strings from a learned grammar's distribution (Monte Carlo).

use anyhow::{Context, Result};
use clap::Parser;
use guesscalc::Pcfg;
use rand::Rng;
use rand_mt::Mt64;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(about = "Sample strings from a learned PCFG for Monte Carlo estimation")]
struct Args {
    /// How many strings to draw.
    #[arg(long)]
    number: u64,

    /// Replace each sampled probability with the grammar-wide sum over all
    /// parses of the string.
    #[arg(long)]
    accurate: bool,

    /// Seed for the Mersenne Twister; drawn from the OS when absent.
    #[arg(long)]
    seed: Option<u64>,

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
    if args.number == 0 {
        log::warn!("asked to generate 0 strings");
    }

    log::info!("loading grammar from {}", args.structures.display());
    let pcfg = Pcfg::load(&args.structures, &args.terminals).context("loading grammar")?;

    let seed = args.seed.unwrap_or_else(|| rand::thread_rng().gen());
    log::info!("sampling {} strings with seed {seed}", args.number);
    let mut rng = Mt64::new(seed);

    let stdout = io::stdout().lock();
    let mut out = BufWriter::new(stdout);
    pcfg.generate_random_strings(args.number, args.accurate, &mut rng, &mut out)
        .context("sampling strings")?;
    out.flush()?;
    Ok(())
}
