//! Membrane topology dataset from five cross-validation folds.
//!
//! Fold 0 becomes the test set, folds 1-4 are pooled and a seeded random
//! validation split is drawn from the pool.

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use log::{info, warn};
use serde::Deserialize;

use super::{Expectations, SplitOptions};
use crate::data::check::expect_count;
use crate::data::error::require_exists;
use crate::data::fasta::{CvEntry, read_cv_fasta};
use crate::data::filter::{apply_blacklist, check_no_leakage, deduplicate};
use crate::data::loader::read_blacklist;
use crate::data::model::{Mask, RecordBuilder, RecordSet, SequenceRecord, Split, Target};
use crate::data::split::random_split;
use crate::data::writer::{split_order, write_biotrainer};

pub const N_FOLDS: usize = 5;

/// Annotation character for residues with unknown topology.
pub const UNKNOWN_RESIDUE: char = 'U';

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MembraneExpectations {
    pub blacklisted: Option<usize>,
}

impl Default for MembraneExpectations {
    fn default() -> Self {
        Self {
            blacklisted: Some(235),
        }
    }
}

impl Expectations for MembraneExpectations {
    fn unchecked() -> Self {
        Self { blacklisted: None }
    }
}

#[derive(Debug, Clone)]
pub struct MembraneConfig {
    pub data_dir: PathBuf,
    pub out: PathBuf,
    pub split: SplitOptions,
    pub expectations: MembraneExpectations,
}

impl MembraneConfig {
    fn fold(&self, fold: usize) -> PathBuf {
        self.data_dir.join("cv").join(format!("cv_0{fold}_a.fasta"))
    }

    fn blacklist(&self) -> PathBuf {
        self.data_dir.join("predictions").join("blacklist.txt")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MembraneReport {
    pub out: PathBuf,
    pub train: usize,
    pub val: usize,
    pub test: usize,
    pub blacklisted: usize,
    /// Records removed by the blacklist from the pooled folds.
    pub blacklisted_train: usize,
    /// Records removed by the blacklist from fold 0.
    pub blacklisted_test: usize,
    /// Pooled records dropped because an earlier fold had the same identifier.
    pub repeated_ids: usize,
    pub val_fraction: f64,
}

impl fmt::Display for MembraneReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Wrote: {}", self.out.display())?;
        writeln!(f, "  train: {}", self.train)?;
        writeln!(f, "  val:   {} (val_fraction={})", self.val, self.val_fraction)?;
        writeln!(f, "  test:  {} (from CV0)", self.test)?;
        writeln!(
            f,
            "  blacklisted ids: {} (removed {} train, {} test)",
            self.blacklisted, self.blacklisted_train, self.blacklisted_test
        )?;
        write!(f, "  repeated ids dropped: {}", self.repeated_ids)
    }
}

fn cv_record(entry: &CvEntry, split: Split) -> Result<SequenceRecord> {
    let mask = Mask::new(entry.annotation.chars().map(|c| c != UNKNOWN_RESIDUE).collect());
    RecordBuilder::new(entry.id.clone(), entry.sequence.clone())
        .target(Target::Residues(entry.annotation.clone()))
        .mask(mask)
        .split(split)
        .build()
        .with_context(|| format!("building membrane record {}", entry.id))
}

pub fn compile(config: &MembraneConfig) -> Result<MembraneReport> {
    let mut folds = Vec::with_capacity(N_FOLDS);
    for fold in 0..N_FOLDS {
        let path = config.fold(fold);
        require_exists(&path)?;
        folds.push(read_cv_fasta(&path)?);
    }
    let blacklist_path = config.blacklist();
    require_exists(&blacklist_path)?;

    let mut folds = folds.into_iter();
    let test_entries = folds.next().context("fold 0 missing")?;
    let pool: Vec<CvEntry> = folds.flatten().collect();
    info!("Number of test sequences extracted: {}", test_entries.len());
    info!("Number of training sequences extracted: {}", pool.len());

    let test_ids: BTreeSet<&str> = test_entries.iter().map(|e| e.id.as_str()).collect();
    if let Some(shared) = pool.iter().find(|e| test_ids.contains(e.id.as_str())) {
        bail!("{} is in both the test fold and the training folds", shared.id);
    }

    let mut test = RecordSet::new();
    for entry in &test_entries {
        test.insert(cv_record(entry, Split::Test)?)?;
    }
    let mut train = RecordSet::new();
    let mut repeated_ids = 0;
    for entry in &pool {
        if train.contains_id(&entry.id) {
            repeated_ids += 1;
            continue;
        }
        train.insert(cv_record(entry, Split::Train)?)?;
    }
    if repeated_ids > 0 {
        info!("{repeated_ids} pooled records repeat an identifier, keeping the first");
    }

    let blacklist = read_blacklist(&blacklist_path)?;
    expect_count("blacklisted ids", config.expectations.blacklisted, blacklist.len())?;
    let blacklisted_test = apply_blacklist(&mut test, &blacklist);
    let blacklisted_train = apply_blacklist(&mut train, &blacklist);
    info!("blacklist removed {blacklisted_train} train and {blacklisted_test} test records");
    info!("train sequences after blacklist removal: {}", train.len());
    info!("test sequences after blacklist removal: {}", test.len());

    for (name, set) in [("train", &mut train), ("test", &mut test)] {
        let removed = deduplicate(set);
        if !removed.is_empty() {
            warn!("{name}: dropped {} records repeating a sequence: {removed:?}", removed.len());
        }
    }

    let ids: Vec<String> = train.ids().map(str::to_string).collect();
    let partition = random_split(&ids, config.split.val_fraction, config.split.seed)?;
    train.assign_split(&partition.val, &Split::Val);

    let all: Vec<&SequenceRecord> = train.iter().chain(test.iter()).collect();
    check_no_leakage(all.iter().copied())?;

    write_biotrainer(&config.out, all, &split_order(&[]))?;

    Ok(MembraneReport {
        out: config.out.clone(),
        train: partition.train.len(),
        val: partition.val.len(),
        test: test.len(),
        blacklisted: blacklist.len(),
        blacklisted_train,
        blacklisted_test,
        repeated_ids,
        val_fraction: config.split.val_fraction,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempdir::TempDir;

    fn write_fold(dir: &std::path::Path, fold: usize, entries: &[(&str, &str, &str)]) {
        let text: String = entries
            .iter()
            .map(|(id, seq, ann)| format!(">{id}|SP|NO_SP|{fold}\n{seq}\n{ann}\n"))
            .collect();
        fs::write(dir.join("cv").join(format!("cv_0{fold}_a.fasta")), text).unwrap();
    }

    fn fixture(dir: &std::path::Path) {
        fs::create_dir_all(dir.join("cv")).unwrap();
        fs::create_dir_all(dir.join("predictions")).unwrap();
        write_fold(dir, 0, &[("T1", "MKTA", "UUMM"), ("T2", "GGGG", "IIII")]);
        for fold in 1..N_FOLDS {
            let entries: Vec<(String, String, String)> = (0..5)
                .map(|i| {
                    let seq = format!("W{}{}", "A".repeat(fold), "K".repeat(i + 1));
                    (format!("F{fold}_{i}"), seq.clone(), "O".repeat(seq.len()))
                })
                .collect();
            let refs: Vec<(&str, &str, &str)> =
                entries.iter().map(|(a, b, c)| (a.as_str(), b.as_str(), c.as_str())).collect();
            write_fold(dir, fold, &refs);
        }
        fs::write(dir.join("predictions").join("blacklist.txt"), ">F1_0|SP|NO_SP|1\n>T2|SP|NO_SP|0\n").unwrap();
    }

    fn config(dir: &std::path::Path) -> MembraneConfig {
        MembraneConfig {
            data_dir: dir.to_path_buf(),
            out: dir.join("membrane.fasta"),
            split: SplitOptions::default(),
            expectations: MembraneExpectations { blacklisted: Some(2) },
        }
    }

    #[test]
    fn folds_become_train_val_test() {
        let dir = TempDir::new("membrane").unwrap();
        fixture(dir.path());
        let report = compile(&config(dir.path())).unwrap();
        assert_eq!(report.test, 1);
        assert_eq!(report.train + report.val, 19);
        assert_eq!(report.val, 2);
        assert_eq!((report.blacklisted_train, report.blacklisted_test), (1, 1));
        assert_eq!(report.repeated_ids, 0);

        let text = fs::read_to_string(dir.path().join("membrane.fasta")).unwrap();
        assert!(text.contains(">T1|SP|NO_SP|0 SET=test TARGET=UUMM MASK=0011\nMKTA\n"));
        assert!(!text.contains("F1_0|"));
        assert_eq!(text.lines().count(), 40);
    }

    #[test]
    fn identifier_repeated_in_a_later_fold_keeps_the_first() {
        let dir = TempDir::new("membrane").unwrap();
        fixture(dir.path());
        let fold3 = dir.path().join("cv").join("cv_03_a.fasta");
        let mut text = fs::read_to_string(&fold3).unwrap();
        text.push_str(">F1_1|SP|NO_SP|1\nWCCCC\nOOOOO\n");
        fs::write(&fold3, text).unwrap();

        let report = compile(&config(dir.path())).unwrap();
        assert_eq!(report.repeated_ids, 1);
        assert_eq!(report.train + report.val, 19);

        let text = fs::read_to_string(dir.path().join("membrane.fasta")).unwrap();
        assert_eq!(text.matches(">F1_1|SP|NO_SP|1 ").count(), 1);
        assert!(text.contains("\nWAKK\n"));
        assert!(!text.contains("WCCCC"));
    }

    #[test]
    fn test_id_in_training_folds_fails() {
        let dir = TempDir::new("membrane").unwrap();
        fixture(dir.path());
        fs::write(
            dir.path().join("cv").join("cv_00_a.fasta"),
            ">F2_0|SP|NO_SP|2\nMKTA\nUUMM\n",
        )
        .unwrap();
        let err = compile(&config(dir.path())).unwrap_err();
        assert!(err.to_string().contains("both the test fold and the training folds"));
    }

    #[test]
    fn missing_fold_is_reported() {
        let dir = TempDir::new("membrane").unwrap();
        fixture(dir.path());
        fs::remove_file(dir.path().join("cv").join("cv_03_a.fasta")).unwrap();
        let err = compile(&config(dir.path())).unwrap_err();
        assert!(err.to_string().contains("cv_03_a.fasta"));
    }
}
