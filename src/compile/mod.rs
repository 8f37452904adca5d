//! One module per benchmark dataset. Each compiler parses its raw sources,
//! assigns splits, validates every invariant and only then writes its
//! biotrainer FASTA file.

use std::path::Path;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;

use crate::data::model::SequenceRecord;

pub mod binding;
pub mod disorder;
pub mod membrane;
pub mod scl;
pub mod secondary_structure;

/// Compiled files that make up a release, relative to the repository root.
pub const RELEASE_DATASETS: [&str; 9] = [
    "supervised/binding/binding_combined.fasta",
    "supervised/binding/binding_metal.fasta",
    "supervised/binding/binding_nuclear.fasta",
    "supervised/binding/binding_small.fasta",
    "supervised/conservation/conservation.fasta",
    "supervised/disorder/disorder.fasta",
    "supervised/membrane/membrane.fasta",
    "supervised/scl/scl.fasta",
    "supervised/secondary_structure/secondary_structure.fasta",
];

/// Options shared by the compilers that draw a validation split.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitOptions {
    pub val_fraction: f64,
    pub seed: u64,
}

impl Default for SplitOptions {
    fn default() -> Self {
        Self {
            val_fraction: 0.1,
            seed: 42,
        }
    }
}

/// Expected record counts of a dataset snapshot.
///
/// `Default` holds the counts of the published release; `unchecked` turns
/// every count check off while structural invariants stay enforced.
pub trait Expectations: DeserializeOwned + Default {
    fn unchecked() -> Self;
}

/// Load expectations from a JSON file, falling back to the defaults for
/// every field the file does not set.
pub fn load_expectations<E: Expectations>(path: Option<&Path>, skip: bool) -> Result<E> {
    if skip {
        return Ok(E::unchecked());
    }
    match path {
        None => Ok(E::default()),
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading expectations {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("parsing expectations {}", path.display()))
        }
    }
}

/// Fraction of positive residues over all residues of `records`.
pub fn positive_fraction<'a>(records: impl IntoIterator<Item = &'a SequenceRecord>) -> f64 {
    let (pos, total) = records.into_iter().fold((0usize, 0usize), |(p, t), r| {
        (p + r.target().positive_count(), t + r.target().len())
    });
    if total == 0 {
        0.0
    } else {
        pos as f64 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::disorder::DisorderExpectations;
    use crate::data::model::{RecordBuilder, Target};

    #[test]
    fn positive_fraction_over_records() {
        let recs = [
            RecordBuilder::new("a", "MKTA").target(Target::Residues("1100".into())).build().unwrap(),
            RecordBuilder::new("b", "MKTAYI").target(Target::Residues("000001".into())).build().unwrap(),
        ];
        assert!(float_cmp::approx_eq!(f64, positive_fraction(&recs), 0.3, ulps = 2));
        assert_eq!(positive_fraction(std::iter::empty()), 0.0);
    }

    #[test]
    fn expectations_file_overrides_single_field() {
        let dir = tempdir::TempDir::new("expect").unwrap();
        let path = dir.path().join("disorder.json");
        std::fs::write(&path, r#"{ "test_sequences": 5 }"#).unwrap();

        let e: DisorderExpectations = load_expectations(Some(&path), false).unwrap();
        assert_eq!(e.test_sequences, Some(5));
        assert_eq!(e.training_sequences, DisorderExpectations::default().training_sequences);

        let off: DisorderExpectations = load_expectations(Some(&path), true).unwrap();
        assert_eq!(off.test_sequences, None);
    }
}
