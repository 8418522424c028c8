//! Determine the probability of each password in a file under a learned
//! grammar, without consulting a lookup table.

use anyhow::{bail, Context, Result};
use clap::Parser;
use guesscalc::grammar_io::format_hex_float;
use guesscalc::table::password_field;
use guesscalc::{ParseStatus, Pcfg};
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(about = "Look up password probabilities under a learned PCFG")]
struct Args {
    /// Password file in three-column, tab-separated format.
    #[arg(long)]
    passwords: PathBuf,

    /// Grammar directory holding nonterminalRules.txt and terminalRules/.
    #[arg(long, default_value = "grammar")]
    grammar: PathBuf,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    log::info!("loading grammar from {}", args.grammar.display());
    let pcfg = Pcfg::load(
        &args.grammar.join("nonterminalRules.txt"),
        &args.grammar.join("terminalRules"),
    )
    .context("loading grammar")?;

    let passwords = File::open(&args.passwords)
        .with_context(|| format!("opening {}", args.passwords.display()))?;
    let stdout = io::stdout().lock();
    let mut out = BufWriter::new(stdout);

    for line in BufReader::new(passwords).lines() {
        let line = line.context("reading password file")?;
        let Some(password) = password_field(&line) else {
            bail!("password line {line:?} does not have three tab-separated fields");
        };

        let data = pcfg.lookup(password);
        if data.status.contains(ParseStatus::TERMINAL_COLLISION)
            || data.status.contains(ParseStatus::UNEXPECTED_FAILURE)
        {
            bail!(
                "lookup of password {password:?} returned status {}, \
                 which the grammar should never produce",
                data.status
            );
        }

        // Unparseable passwords carry the status bitmask, negated, in the
        // probability column.
        let probability = if data.status.can_parse() {
            data.probability
        } else {
            -f64::from(data.status.bits())
        };
        let mut ids: Vec<&str> = data.source_ids.iter().map(String::as_str).collect();
        ids.sort_unstable();
        writeln!(
            out,
            "{line}\t{}\t{}\t{}",
            format_hex_float(probability),
            data.pattern_id,
            ids.join(",")
        )?;
    }
    out.flush()?;
    Ok(())
}
