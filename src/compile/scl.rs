//! Subcellular localisation: FLIP `mixed_hard` records re-labelled with the
//! DeepLoc identifier of the same sequence.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use anyhow::{Context, Result, bail, ensure};
use log::info;

use crate::data::check::sanity_check;
use crate::data::error::require_exists;
use crate::data::fasta::read_annotated;
use crate::data::filter::duplicated_sequences;
use crate::data::model::{RecordSet, Split};
use crate::data::writer::{split_order, write_biotrainer};

#[derive(Debug, Clone)]
pub struct SclConfig {
    pub data_dir: PathBuf,
    pub out: PathBuf,
}

impl SclConfig {
    fn input(&self, name: &str) -> PathBuf {
        self.data_dir.join(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SclReport {
    pub out: PathBuf,
    pub train: usize,
    pub val: usize,
    pub test: usize,
}

impl fmt::Display for SclReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Wrote: {}", self.out.display())?;
        writeln!(f, "  train: {}", self.train)?;
        writeln!(f, "  val:   {}", self.val)?;
        write!(f, "  test:  {} (setHARD)", self.test)
    }
}

pub fn compile(config: &SclConfig) -> Result<SclReport> {
    let train_path = config.input("deeploc_our_train_set.fasta");
    let val_path = config.input("deeploc_our_val_set.fasta");
    let hard_path = config.input("setHARD.fasta");
    let flip_path = config.input("mixed_hard.fasta");
    for path in [&train_path, &val_path, &hard_path, &flip_path] {
        require_exists(path)?;
    }

    let deeploc_parts = [
        (Split::Train, read_annotated(&train_path)?),
        (Split::Val, read_annotated(&val_path)?),
        (Split::Test, read_annotated(&hard_path)?),
    ];
    let flip = read_annotated(&flip_path)?;

    let mut deeploc = RecordSet::new();
    for (split, part) in &deeploc_parts {
        let in_flip = flip.in_split(split).count();
        ensure!(
            in_flip == part.len(),
            "FLIP has {in_flip} {split} records, DeepLoc has {}",
            part.len()
        );
        for record in part.iter() {
            deeploc
                .insert(record.clone())
                .context("DeepLoc files share an identifier")?;
        }
    }
    ensure!(
        flip.len() == deeploc.len(),
        "FLIP has {} records outside train/val/test",
        flip.len() - deeploc.len()
    );

    let duplicates = duplicated_sequences(deeploc.iter().map(|r| r.sequence()));
    if !duplicates.is_empty() {
        bail!("Found {} duplicate sequences: {duplicates:?}", duplicates.len());
    }
    let seq_to_id: BTreeMap<&str, &str> = deeploc.iter().map(|r| (r.sequence(), r.id())).collect();

    let mut mapped = RecordSet::new();
    for record in flip.iter() {
        let id = seq_to_id
            .get(record.sequence())
            .with_context(|| format!("FLIP record {} has no DeepLoc counterpart", record.id()))?;
        mapped.insert(record.clone().with_id(*id))?;
    }
    info!("mapped {} FLIP records to DeepLoc identifiers", mapped.len());

    let summary = sanity_check(&mapped, &["test"])?;
    write_biotrainer(&config.out, mapped.iter(), &split_order(&[]))?;

    let count = |s: Split| summary.per_split.get(&s).copied().unwrap_or(0);
    Ok(SclReport {
        out: config.out.clone(),
        train: count(Split::Train),
        val: count(Split::Val),
        test: count(Split::Test),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;
    use tempdir::TempDir;

    fn fixture(dir: &Path) {
        fs::write(
            dir.join("deeploc_our_train_set.fasta"),
            ">Q1 TARGET=Nucleus SET=train VALIDATION=False\nMKTAYIAKQRQISFVK\n\
             >Q2 TARGET=Cytoplasm SET=train VALIDATION=False\nMGGHHAKQRQISFVKS\n",
        )
        .unwrap();
        fs::write(
            dir.join("deeploc_our_val_set.fasta"),
            ">Q3 TARGET=Nucleus SET=train VALIDATION=True\nMPPYIAKQRQISFVKW\n",
        )
        .unwrap();
        fs::write(
            dir.join("setHARD.fasta"),
            ">H1 TARGET=Mitochondrion SET=test\nMWWWIAKQRQISFVKL\n",
        )
        .unwrap();
        fs::write(
            dir.join("mixed_hard.fasta"),
            ">Sequence1 TARGET=Cytoplasm SET=train VALIDATION=False\nMGGHHAKQRQISFVKS\n\
             >Sequence2 TARGET=Nucleus SET=train VALIDATION=True\nMPPYIAKQRQISFVKW\n\
             >Sequence3 TARGET=Mitochondrion SET=test\nMWWWIAKQRQISFVKL\n\
             >Sequence4 TARGET=Nucleus SET=train VALIDATION=False\nMKTAYIAKQRQISFVK\n",
        )
        .unwrap();
    }

    fn config(dir: &Path) -> SclConfig {
        SclConfig {
            data_dir: dir.to_path_buf(),
            out: dir.join("scl.fasta"),
        }
    }

    #[test]
    fn flip_records_take_deeploc_ids() {
        let dir = TempDir::new("scl").unwrap();
        fixture(dir.path());
        let report = compile(&config(dir.path())).unwrap();
        assert_eq!((report.train, report.val, report.test), (2, 1, 1));

        let text = fs::read_to_string(dir.path().join("scl.fasta")).unwrap();
        let expected = ">Q1 SET=train TARGET=Nucleus\nMKTAYIAKQRQISFVK\n\
                        >Q2 SET=train TARGET=Cytoplasm\nMGGHHAKQRQISFVKS\n\
                        >Q3 SET=val TARGET=Nucleus\nMPPYIAKQRQISFVKW\n\
                        >H1 SET=test TARGET=Mitochondrion\nMWWWIAKQRQISFVKL\n";
        assert_eq!(text, expected);
    }

    #[test]
    fn split_size_mismatch_fails() {
        let dir = TempDir::new("scl").unwrap();
        fixture(dir.path());
        fs::write(dir.path().join("setHARD.fasta"), "").unwrap();
        let err = compile(&config(dir.path())).unwrap_err();
        assert!(err.to_string().contains("FLIP has 1 test records, DeepLoc has 0"));
    }

    #[test]
    fn unknown_flip_sequence_fails() {
        let dir = TempDir::new("scl").unwrap();
        fixture(dir.path());
        let flip = fs::read_to_string(dir.path().join("mixed_hard.fasta"))
            .unwrap()
            .replace("MWWWIAKQRQISFVKL", "MWWWIAKQRQISFVKY");
        fs::write(dir.path().join("mixed_hard.fasta"), flip).unwrap();
        let err = compile(&config(dir.path())).unwrap_err();
        assert!(err.to_string().contains("Sequence3 has no DeepLoc counterpart"));
    }
}
