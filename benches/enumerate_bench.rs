//! Benchmarks for pattern enumeration and reverse lookup.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use guesscalc::grammar_io::format_hex_float;
use guesscalc::Pcfg;
use std::fs;
use std::io;
use tempfile::TempDir;

/// A grammar with two alphabetic nonterminals (16 groups each, plus an
/// unseen tail) and a digit nonterminal, arranged so repeated-nonterminal
/// structures exercise pattern compaction.
fn build_grammar() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let terminals = dir.path().join("terminalRules");
    fs::create_dir(&terminals).unwrap();

    let mut structures = String::from("S ->\n");
    for (representation, probability) in [
        ("LLL", 0.4),
        ("LLLEDD", 0.3),
        ("LLLELLL", 0.2),
        ("DDELLLEDD", 0.1),
    ] {
        structures.push_str(&format!(
            "{representation}\t{}\tbench\n",
            format_hex_float(probability)
        ));
    }
    structures.push('\n');
    fs::write(dir.path().join("nonterminalRules.txt"), structures).unwrap();

    // 16 singleton groups with halving probabilities, then an unseen tail
    // holding the remaining mass.
    let mut lll = String::new();
    let mut mass_left = 1.0f64;
    for index in 0..16 {
        let probability = 2f64.powi(-(index as i32 + 2));
        let terminal = format!(
            "{}{}{}",
            char::from(b'a' + (index % 26) as u8),
            char::from(b'a' + ((index * 7) % 26) as u8),
            char::from(b'a' + ((index * 3) % 26) as u8),
        );
        lll.push_str(&format!(
            "{terminal}\t{}\tbench\n",
            format_hex_float(probability)
        ));
        mass_left -= probability;
    }
    lll.push('\n');
    lll.push_str(&format!("*\t{}\tLLL\n", format_hex_float(mass_left)));
    fs::write(terminals.join("LLL.txt"), lll).unwrap();

    let mut dd = String::new();
    for index in 0..10 {
        dd.push_str(&format!(
            "{index}{index}\t{}\tbench\n",
            format_hex_float(0.1)
        ));
    }
    fs::write(terminals.join("DD.txt"), dd).unwrap();

    dir
}

fn bench_enumeration(c: &mut Criterion) {
    let dir = build_grammar();
    let pcfg = Pcfg::load(
        &dir.path().join("nonterminalRules.txt"),
        &dir.path().join("terminalRules"),
    )
    .unwrap();

    c.bench_function("generate_patterns_p20", |b| {
        b.iter(|| {
            pcfg.generate_patterns(black_box(2f64.powi(-20)), &mut io::sink())
                .unwrap();
        })
    });

    c.bench_function("count_strings", |b| {
        b.iter(|| black_box(pcfg.count_strings()))
    });
}

fn bench_lookup(c: &mut Criterion) {
    let dir = build_grammar();
    let pcfg = Pcfg::load(
        &dir.path().join("nonterminalRules.txt"),
        &dir.path().join("terminalRules"),
    )
    .unwrap();

    c.bench_function("lookup_seen", |b| {
        b.iter(|| black_box(pcfg.lookup(black_box("aaa"))))
    });

    c.bench_function("lookup_unseen", |b| {
        b.iter(|| black_box(pcfg.lookup(black_box("zzz"))))
    });

    c.bench_function("lookup_sum_compound", |b| {
        b.iter(|| black_box(pcfg.lookup_sum(black_box("aaa77"))))
    });
}

criterion_group!(benches, bench_enumeration, bench_lookup);
criterion_main!(benches);
