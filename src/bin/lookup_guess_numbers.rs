//! Determine the guess number of each password in a file, or a diagnostic
//! code explaining why it has none.
//!
//! Each input line carries three tab-separated columns with the password
//! after the second tab. The grammar lookup yields the password's
//! probability, canonical pattern, and within-pattern rank; the sorted
//! lookup table then supplies the guess number of the pattern's first
//! string. Output lines append `probability`, `patternIdentifier`,
//! `guessNumber`, and the source ids to the input line; unparseable
//! passwords get a negative guess number encoding the parse-status bitmask
//! and a blank pattern identifier.

use anyhow::{bail, Context, Result};
use clap::Parser;
use guesscalc::grammar_io::format_hex_float;
use guesscalc::table::{password_field, Bias, GuessTable};
use guesscalc::{ParseStatus, Pcfg};
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(about = "Look up guess numbers for passwords against a PCFG and its lookup table")]
struct Args {
    /// Password file in three-column, tab-separated format.
    #[arg(long)]
    passwords: PathBuf,

    /// Sorted, aggregated-count lookup table file.
    #[arg(long)]
    table: PathBuf,

    /// Grammar directory holding nonterminalRules.txt and terminalRules/.
    #[arg(long, default_value = "grammar")]
    grammar: PathBuf,

    /// On probability ties, bias guess numbers away from zero.
    #[arg(long, conflicts_with = "bias_down")]
    bias_up: bool,

    /// On probability ties, bias guess numbers toward zero.
    #[arg(long)]
    bias_down: bool,
}

fn joined_source_ids(data: &guesscalc::LookupData) -> String {
    let mut ids: Vec<&str> = data.source_ids.iter().map(String::as_str).collect();
    ids.sort_unstable();
    ids.join(",")
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let bias = if args.bias_up {
        Bias::Up
    } else if args.bias_down {
        Bias::Down
    } else {
        Bias::None
    };

    log::info!("loading grammar from {}", args.grammar.display());
    let pcfg = Pcfg::load(
        &args.grammar.join("nonterminalRules.txt"),
        &args.grammar.join("terminalRules"),
    )
    .context("loading grammar")?;
    let table = GuessTable::open(&args.table).context("opening lookup table")?;

    let passwords = File::open(&args.passwords)
        .with_context(|| format!("opening {}", args.passwords.display()))?;
    let stdout = io::stdout().lock();
    let mut out = BufWriter::new(stdout);

    for line in BufReader::new(passwords).lines() {
        let line = line.context("reading password file")?;
        let Some(password) = password_field(&line) else {
            bail!("password line {line:?} does not have three tab-separated fields");
        };

        let mut data = pcfg.lookup(password);
        if data.status.can_parse() {
            let hit = table.lookup(data.probability, &data.pattern_id)?;
            if hit.status.can_parse() {
                data.index = hit.guess_number(bias, &data.index);
            } else if hit.status.contains(ParseStatus::BEYOND_CUTOFF) {
                data.status = ParseStatus::BEYOND_CUTOFF;
            } else {
                bail!(
                    "password {password:?} with probability {} and pattern {:?} \
                     was parseable but missing from the lookup table",
                    format_hex_float(data.probability),
                    data.pattern_id
                );
            }
        } else if data.status.contains(ParseStatus::TERMINAL_COLLISION)
            || data.status.contains(ParseStatus::UNEXPECTED_FAILURE)
        {
            bail!(
                "lookup of password {password:?} returned status {}, \
                 which the grammar should never produce",
                data.status
            );
        }

        if data.status.can_parse() {
            writeln!(
                out,
                "{line}\t{}\t{}\t{}\t{}",
                format_hex_float(data.probability),
                data.pattern_id,
                data.index,
                joined_source_ids(&data)
            )?;
        } else {
            writeln!(
                out,
                "{line}\t{}\t\t-{}\t{}",
                format_hex_float(data.probability),
                data.status.bits(),
                joined_source_ids(&data)
            )?;
        }
    }
    out.flush()?;
    Ok(())
}
