//! Secondary structure: FLIP train/val plus four test sets (newPISCES364 and
//! the CASP12/13/14 targets).

use std::fmt;
use std::path::PathBuf;

use anyhow::{Context, Result};
use log::info;
use serde::Deserialize;

use super::Expectations;
use crate::data::check::{expect_count, sanity_check};
use crate::data::error::require_exists;
use crate::data::fasta::read_annotated_as;
use crate::data::loader::read_casp_csv;
use crate::data::model::{RecordBuilder, RecordSet, Split, Target, TargetKind};
use crate::data::writer::{split_order, write_biotrainer};

/// Name given to the FLIP `test` split.
pub const NEW_PISCES: &str = "newPISCES364";

pub const CASP_SETS: [&str; 3] = ["casp12", "casp13", "casp14"];

/// CASP14 target that is also part of newPISCES364; it stays there.
pub const EXCLUDED_CASP_SEQUENCE: &str =
    "MNVDPHFDKFMESGIRHVYMLFENKSVESSEQFYSFMRTTYKNDPCSSDFECIERGAEMAQSYARIMNIKLETE";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SecondaryStructureExpectations {
    pub new_pisces: Option<usize>,
    pub casp12: Option<usize>,
    pub casp13: Option<usize>,
    pub casp14: Option<usize>,
    pub sequences: Option<usize>,
}

impl Default for SecondaryStructureExpectations {
    fn default() -> Self {
        Self {
            new_pisces: Some(364),
            casp12: Some(20),
            casp13: Some(12),
            casp14: Some(17),
            sequences: Some(11205),
        }
    }
}

impl Expectations for SecondaryStructureExpectations {
    fn unchecked() -> Self {
        Self {
            new_pisces: None,
            casp12: None,
            casp13: None,
            casp14: None,
            sequences: None,
        }
    }
}

impl SecondaryStructureExpectations {
    fn for_set(&self, name: &str) -> Option<usize> {
        match name {
            NEW_PISCES => self.new_pisces,
            "casp12" => self.casp12,
            "casp13" => self.casp13,
            "casp14" => self.casp14,
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SecondaryStructureConfig {
    pub data_dir: PathBuf,
    pub out: PathBuf,
    pub expectations: SecondaryStructureExpectations,
}

impl SecondaryStructureConfig {
    fn flip(&self) -> PathBuf {
        self.data_dir.join("sec_struct_flip.fasta")
    }

    fn casp(&self, name: &str) -> PathBuf {
        self.data_dir.join(format!("{}.csv", name.to_uppercase()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecondaryStructureReport {
    pub out: PathBuf,
    pub records: usize,
    /// Records per split, in output order.
    pub per_split: Vec<(Split, usize)>,
}

impl fmt::Display for SecondaryStructureReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Wrote {} records to {}", self.records, self.out.display())?;
        for (i, (split, n)) in self.per_split.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "  {split}: {n}")?;
        }
        Ok(())
    }
}

/// Read the CASP test sets as `casp1x-<n>` records, numbering only the
/// targets that are kept.
fn casp_records(config: &SecondaryStructureConfig, records: &mut RecordSet) -> Result<()> {
    for name in CASP_SETS {
        let entries = read_casp_csv(&config.casp(name))?;
        let mut idx = 0;
        for entry in entries {
            if entry.sequence == EXCLUDED_CASP_SEQUENCE {
                info!("{name}: skipping target already in {NEW_PISCES}");
                continue;
            }
            let id = format!("{name}-{idx}");
            let record = RecordBuilder::new(id.clone(), entry.sequence)
                .target(Target::Residues(entry.dssp3))
                .mask(entry.mask)
                .split(Split::Named(name.to_string()))
                .build()
                .with_context(|| format!("building {id}"))?;
            records.insert(record)?;
            idx += 1;
        }
    }
    Ok(())
}

pub fn compile(config: &SecondaryStructureConfig) -> Result<SecondaryStructureReport> {
    require_exists(&config.flip())?;
    for name in CASP_SETS {
        require_exists(&config.casp(name))?;
    }

    // DSSP strings are per-residue even when shorter than the length cutoff.
    let base = read_annotated_as(&config.flip(), TargetKind::PerResidue)?;
    let mut records = RecordSet::from_records(base.into_records().into_iter().map(|r| {
        if r.split() == &Split::Test {
            r.with_split(Split::Named(NEW_PISCES.to_string()))
        } else {
            r
        }
    }))?;
    casp_records(config, &mut records)?;

    let test_sets = [NEW_PISCES, CASP_SETS[0], CASP_SETS[1], CASP_SETS[2]];
    let summary = sanity_check(&records, &test_sets)?;
    for name in test_sets {
        let n = summary
            .per_split
            .get(&Split::Named(name.to_string()))
            .copied()
            .unwrap_or(0);
        expect_count(&format!("{name} records"), config.expectations.for_set(name), n)?;
    }
    expect_count("sequences", config.expectations.sequences, summary.records)?;

    let order = split_order(&test_sets);
    write_biotrainer(&config.out, records.iter(), &order)?;

    let per_split = order
        .into_iter()
        .filter_map(|s| summary.per_split.get(&s).map(|&n| (s, n)))
        .collect();
    Ok(SecondaryStructureReport {
        out: config.out.clone(),
        records: summary.records,
        per_split,
    })
}
