//! Helpers for building small on-disk grammars in tests.

use crate::grammar_io::format_hex_float;
use crate::pcfg::Pcfg;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// A grammar directory that lives for the duration of a test.
pub struct TestGrammar {
    dir: TempDir,
}

impl TestGrammar {
    pub fn structures(&self) -> PathBuf {
        self.dir.path().join("nonterminalRules.txt")
    }

    pub fn terminals(&self) -> PathBuf {
        self.dir.path().join("terminalRules")
    }

    pub fn load(&self) -> Pcfg {
        Pcfg::load(&self.structures(), &self.terminals()).expect("test grammar loads")
    }
}

/// Write a grammar directory: a structures file from `(representation,
/// probability)` pairs (source id `src1`), and one terminals file per
/// `(stem, body)` pair.
pub fn grammar(structures: &[(&str, f64)], terminal_files: &[(&str, &str)]) -> TestGrammar {
    let dir = tempfile::tempdir().expect("create temp grammar dir");
    let terminals_dir = dir.path().join("terminalRules");
    fs::create_dir(&terminals_dir).expect("create terminals dir");

    let mut body = String::from("S ->\n");
    for (representation, probability) in structures {
        body.push_str(&format!(
            "{representation}\t{}\tsrc1\n",
            format_hex_float(*probability)
        ));
    }
    body.push('\n');
    fs::write(dir.path().join("nonterminalRules.txt"), body).expect("write structures file");

    for (stem, content) in terminal_files {
        fs::write(terminals_dir.join(format!("{stem}.txt")), content)
            .expect("write terminals file");
    }
    TestGrammar { dir }
}
