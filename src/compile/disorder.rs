//! CheZOD disorder dataset: per-residue Z-scores, 999.0 marks residues
//! without a measurement.

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

use anyhow::{Context, Result, ensure};
use log::{info, warn};
use serde::Deserialize;

use super::{Expectations, SplitOptions};
use crate::data::check::expect_count;
use crate::data::error::require_exists;
use crate::data::fasta::read_sequences;
use crate::data::filter::{check_no_leakage, duplicated_sequences};
use crate::data::loader::{read_chezod_test_scores, read_chezod_training_scores};
use crate::data::model::{Mask, RecordBuilder, RecordSet, SequenceRecord, Split, Target};
use crate::data::split::random_split;
use crate::data::writer::{split_order, write_biotrainer};

/// Score written for residues without a CheZOD measurement.
pub const MISSING_SCORE: f64 = 999.0;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DisorderExpectations {
    pub training_sequences: Option<usize>,
    pub test_sequences: Option<usize>,
    pub written: Option<usize>,
}

impl Default for DisorderExpectations {
    fn default() -> Self {
        Self {
            training_sequences: Some(1174),
            test_sequences: Some(117),
            written: Some(1285),
        }
    }
}

impl Expectations for DisorderExpectations {
    fn unchecked() -> Self {
        Self {
            training_sequences: None,
            test_sequences: None,
            written: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DisorderConfig {
    pub data_dir: PathBuf,
    pub out: PathBuf,
    pub split: SplitOptions,
    pub expectations: DisorderExpectations,
}

impl DisorderConfig {
    fn training_scores(&self) -> PathBuf {
        self.data_dir.join("CheZOD1174_training_set_CheZOD_scores.txt")
    }

    fn training_sequences(&self) -> PathBuf {
        self.data_dir.join("CheZOD1174_training_set_sequences.fasta")
    }

    fn test_scores(&self) -> PathBuf {
        self.data_dir.join("CheZOD117_test_set_CheZOD_scores")
    }

    fn test_sequences(&self) -> PathBuf {
        self.data_dir.join("CheZOD117_test_set_sequences.fasta")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DisorderReport {
    pub out: PathBuf,
    pub train: usize,
    pub val: usize,
    pub test: usize,
    pub removed_duplicates: usize,
}

impl fmt::Display for DisorderReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Saved to {}", self.out.display())?;
        writeln!(f, "  train: {}", self.train)?;
        writeln!(f, "  val:   {}", self.val)?;
        writeln!(f, "  test:  {}", self.test)?;
        write!(f, "  removed duplicate sequences: {}", self.removed_duplicates)
    }
}

fn scored_record(id: &str, sequence: &str, scores: &[f64], split: Split) -> Result<SequenceRecord> {
    let mask = Mask::new(scores.iter().map(|&s| s != MISSING_SCORE).collect());
    RecordBuilder::new(id, sequence)
        .target(Target::Scores(scores.to_vec()))
        .mask(mask)
        .split(split)
        .build()
        .with_context(|| format!("building disorder record {id}"))
}

pub fn compile(config: &DisorderConfig) -> Result<DisorderReport> {
    for path in [
        config.training_scores(),
        config.training_sequences(),
        config.test_scores(),
        config.test_sequences(),
    ] {
        require_exists(&path)?;
    }
    let expected = &config.expectations;

    let training_scores = read_chezod_training_scores(&config.training_scores())?;
    let test_scored = read_chezod_test_scores(&config.test_scores())?;
    let training_seqs = read_sequences(&config.training_sequences())?;
    let test_seqs = read_sequences(&config.test_sequences())?;

    // Raw inputs must agree with each other before anything is merged.
    expect_count("training sequences", expected.training_sequences, training_seqs.len())?;
    ensure!(
        training_scores.len() == training_seqs.len(),
        "{} training score rows for {} training sequences",
        training_scores.len(),
        training_seqs.len()
    );
    expect_count("test sequences", expected.test_sequences, test_seqs.len())?;
    ensure!(
        test_scored.len() == test_seqs.len(),
        "{} test score files for {} test sequences",
        test_scored.len(),
        test_seqs.len()
    );
    for entry in &test_seqs {
        let scored = test_scored
            .get(&entry.id)
            .with_context(|| format!("no score file for test sequence {}", entry.id))?;
        ensure!(
            scored.sequence == entry.sequence,
            "{}: sequence in score file differs from FASTA",
            entry.id
        );
    }

    let ids: Vec<String> = training_seqs.iter().map(|e| e.id.clone()).collect();
    let partition = random_split(&ids, config.split.val_fraction, config.split.seed)?;
    let val_ids: BTreeSet<&str> = partition.val.iter().map(String::as_str).collect();

    let mut records = RecordSet::new();
    for entry in &training_seqs {
        let scores = training_scores
            .get(&entry.id)
            .with_context(|| format!("no scores for training sequence {}", entry.id))?;
        let split = if val_ids.contains(entry.id.as_str()) {
            Split::Val
        } else {
            Split::Train
        };
        records.insert(scored_record(&entry.id, &entry.sequence, scores, split)?)?;
    }
    for entry in &test_seqs {
        let scores = &test_scored[&entry.id].scores;
        records.insert(scored_record(&entry.id, &entry.sequence, scores, Split::Test)?)?;
    }
    info!("sanity checks passed for {} disorder records", records.len());

    // A sequence present more than once is ambiguous in every split: drop all copies.
    let duplicates = duplicated_sequences(records.iter().map(|r| r.sequence()));
    if !duplicates.is_empty() {
        warn!("found {} duplicate sequences to be removed", duplicates.len());
    }
    let before = records.len();
    records.retain(|r| !duplicates.contains_key(r.sequence()));
    let removed_duplicates = before - records.len();

    check_no_leakage(records.iter())?;
    expect_count("written records", expected.written, records.len())?;

    write_biotrainer(&config.out, records.iter(), &split_order(&[]))?;

    let counts = records.split_counts();
    let count = |s: Split| counts.get(&s).copied().unwrap_or(0);
    Ok(DisorderReport {
        out: config.out.clone(),
        train: count(Split::Train),
        val: count(Split::Val),
        test: count(Split::Test),
        removed_duplicates,
    })
}
