//! Binding-site datasets (metal, nuclear, small molecule and their union).
//!
//! Development sequences are split into train/val with a split stratified
//! on the fraction of binding residues per sequence; the independent set is
//! the test split of every output file.

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

use anyhow::{Context, Result, bail, ensure};
use log::{info, warn};
use serde::Deserialize;

use super::{Expectations, SplitOptions, positive_fraction};
use crate::data::check::expect_count;
use crate::data::error::require_exists;
use crate::data::fasta::{FastaEntry, read_sequences};
use crate::data::filter::{
    attach_binding_targets, check_disjoint, check_no_leakage, duplicated_sequences, remove_ids,
};
use crate::data::loader::{TargetIndices, read_ids, read_target_indices};
use crate::data::model::{RecordSet, Split};
use crate::data::split::stratified_split;
use crate::data::writer::{split_order, write_biotrainer};

/// Identifier lists that together must cover the development set.
const SPLIT_ID_FILES: [&str; 6] = [
    "ids_split1.txt",
    "ids_split2.txt",
    "ids_split3.txt",
    "ids_split4.txt",
    "ids_split5.txt",
    "uniprot_test.txt",
];

/// Development ids sharing a sequence with conflicting annotations.
pub const AMBIGUOUS_IDS: [&str; 4] = ["P84229", "P84233", "P62801", "P62799"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    Metal,
    Nuclear,
    Small,
    Combined,
}

impl BindingKind {
    pub const ALL: [BindingKind; 4] = [
        BindingKind::Metal,
        BindingKind::Nuclear,
        BindingKind::Small,
        BindingKind::Combined,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            BindingKind::Metal => "metal",
            BindingKind::Nuclear => "nuclear",
            BindingKind::Small => "small",
            BindingKind::Combined => "combined",
        }
    }

    pub fn file_name(&self) -> String {
        format!("binding_{}.fasta", self.name())
    }
}

impl fmt::Display for BindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BindingExpectations {
    pub test_sequences: Option<usize>,
}

impl Default for BindingExpectations {
    fn default() -> Self {
        Self {
            test_sequences: Some(46),
        }
    }
}

impl Expectations for BindingExpectations {
    fn unchecked() -> Self {
        Self {
            test_sequences: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BindingConfig {
    pub data_dir: PathBuf,
    pub out_dir: PathBuf,
    pub ambiguous_ids: Vec<String>,
    pub split: SplitOptions,
    pub expectations: BindingExpectations,
}

impl BindingConfig {
    pub fn new(data_dir: impl Into<PathBuf>, out_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            out_dir: out_dir.into(),
            ambiguous_ids: AMBIGUOUS_IDS.iter().map(|s| s.to_string()).collect(),
            split: SplitOptions::default(),
            expectations: BindingExpectations::default(),
        }
    }

    fn development(&self, name: &str) -> PathBuf {
        self.data_dir.join("development_set").join(name)
    }

    fn independent(&self, name: &str) -> PathBuf {
        self.data_dir.join("independent_set").join(name)
    }
}

/// Split sizes and binding-residue fractions of one output file.
#[derive(Debug, Clone, PartialEq)]
pub struct KindSummary {
    pub kind: BindingKind,
    pub out: PathBuf,
    pub train: usize,
    pub val: usize,
    pub test: usize,
    pub train_ratio: f64,
    pub val_ratio: f64,
    pub test_ratio: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BindingReport {
    pub duplicated_sequences: usize,
    pub removed_ids: usize,
    pub kinds: Vec<KindSummary>,
}

impl fmt::Display for BindingReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Duplicated sequences in development set: {} ({} ambiguous ids removed)",
            self.duplicated_sequences, self.removed_ids
        )?;
        for (i, k) in self.kinds.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            writeln!(f, "{} -> {}", k.kind, k.out.display())?;
            writeln!(f, "  Train: {} sequences, binding ratio: {:.4}", k.train, k.train_ratio)?;
            writeln!(f, "  Val:   {} sequences, binding ratio: {:.4}", k.val, k.val_ratio)?;
            write!(f, "  Test:  {} sequences, binding ratio: {:.4}", k.test, k.test_ratio)?;
        }
        Ok(())
    }
}

/// Target files of one sequence set, one per single binding kind.
struct KindTargets {
    metal: TargetIndices,
    nuclear: TargetIndices,
    small: TargetIndices,
}

impl KindTargets {
    fn sources(&self, kind: BindingKind) -> Vec<&TargetIndices> {
        match kind {
            BindingKind::Metal => vec![&self.metal],
            BindingKind::Nuclear => vec![&self.nuclear],
            BindingKind::Small => vec![&self.small],
            BindingKind::Combined => vec![&self.metal, &self.nuclear, &self.small],
        }
    }

    /// One record set per kind, in [`BindingKind::ALL`] order. The union
    /// must hold strictly more sequences than any single kind.
    fn attach(&self, entries: &[FastaEntry], what: &str) -> Result<Vec<RecordSet>> {
        let mut sets = Vec::with_capacity(BindingKind::ALL.len());
        for kind in BindingKind::ALL {
            let set = attach_binding_targets(entries, &self.sources(kind))
                .with_context(|| format!("attaching {kind} targets to the {what}"))?;
            info!("{what}: {} sequences with {kind} targets", set.len());
            sets.push(set);
        }
        let combined = sets[3].len();
        for (kind, set) in BindingKind::ALL.iter().zip(&sets).take(3) {
            ensure!(
                combined > set.len(),
                "{what}: combined set ({combined}) is not larger than the {kind} set ({})",
                set.len()
            );
        }
        Ok(sets)
    }
}

pub fn compile(config: &BindingConfig) -> Result<BindingReport> {
    let dev_fasta = config.development("all.fasta");
    let test_fasta = config.independent("indep_set.fasta");
    let dev_target_paths = ["metal", "nuclear", "small"]
        .map(|k| config.development(&format!("binding_residues_2.5_{k}.txt")));
    let test_target_paths =
        ["metal", "nuclear", "small"].map(|k| config.independent(&format!("binding_residues_{k}.txt")));
    for path in [&dev_fasta, &test_fasta]
        .into_iter()
        .chain(&dev_target_paths)
        .chain(&test_target_paths)
    {
        require_exists(path)?;
    }
    for name in SPLIT_ID_FILES {
        require_exists(&config.development(name))?;
    }

    // Development sequences
    let mut dev_seqs = read_sequences(&dev_fasta)?;
    let duplicates = duplicated_sequences(dev_seqs.iter().map(|e| e.sequence.as_str()));
    if !duplicates.is_empty() {
        warn!("Duplicated sequences in all.fasta: {duplicates:?}");
    }
    let removed_ids = remove_ids(&mut dev_seqs, &config.ambiguous_ids);
    info!("removed {removed_ids} ambiguous ids from the development set");
    let remaining = duplicated_sequences(dev_seqs.iter().map(|e| e.sequence.as_str()));
    ensure!(
        remaining.is_empty(),
        "{} development sequences still occur more than once",
        remaining.len()
    );

    let mut listed = Vec::new();
    for name in SPLIT_ID_FILES {
        listed.extend(read_ids(&config.development(name))?);
    }
    let listed_set: BTreeSet<&str> = listed.iter().map(String::as_str).collect();
    ensure!(
        listed_set.len() == listed.len(),
        "split id lists share {} identifiers",
        listed.len() - listed_set.len()
    );
    ensure!(
        listed.len() == dev_seqs.len() + config.ambiguous_ids.len(),
        "split id lists hold {} ids, expected {} kept + {} removed",
        listed.len(),
        dev_seqs.len(),
        config.ambiguous_ids.len()
    );
    if let Some(missing) = dev_seqs.iter().find(|e| !listed_set.contains(e.id.as_str())) {
        bail!("{} is not listed in any split id file", missing.id);
    }

    let [metal, nuclear, small] = dev_target_paths.each_ref().map(|p| read_target_indices(p));
    let dev_targets = KindTargets {
        metal: metal?,
        nuclear: nuclear?,
        small: small?,
    };
    let mut dev_sets = dev_targets.attach(&dev_seqs, "development set")?;

    for (kind, set) in BindingKind::ALL.iter().zip(dev_sets.iter_mut()) {
        let items: Vec<(String, f64)> = set
            .iter()
            .map(|r| (r.id().to_string(), r.positive_ratio()))
            .collect();
        let partition = stratified_split(&items, config.split.val_fraction, config.split.seed)
            .with_context(|| format!("splitting {kind} into train/val"))?;
        set.assign_split(&partition.val, &Split::Val);
    }

    // Independent test set
    let test_seqs = read_sequences(&test_fasta)?;
    check_disjoint("development set", &dev_seqs, "independent set", &test_seqs)?;
    expect_count("test sequences", config.expectations.test_sequences, test_seqs.len())?;
    let test_dups = duplicated_sequences(test_seqs.iter().map(|e| e.sequence.as_str()));
    ensure!(
        test_dups.is_empty(),
        "{} independent-set sequences occur more than once",
        test_dups.len()
    );

    let [metal, nuclear, small] = test_target_paths.each_ref().map(|p| read_target_indices(p));
    let test_targets = KindTargets {
        metal: metal?,
        nuclear: nuclear?,
        small: small?,
    };
    let test_sets = test_targets
        .attach(&test_seqs, "independent set")?
        .into_iter()
        .map(|set| RecordSet::from_records(set.into_records().into_iter().map(|r| r.with_split(Split::Test))))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    for (kind, (dev, test)) in BindingKind::ALL.iter().zip(dev_sets.iter().zip(&test_sets)) {
        check_no_leakage(dev.iter().chain(test.iter()))
            .with_context(|| format!("leakage in the {kind} dataset"))?;
    }

    let order = split_order(&[]);
    let mut kinds = Vec::with_capacity(BindingKind::ALL.len());
    for (kind, (dev, test)) in BindingKind::ALL.into_iter().zip(dev_sets.iter().zip(&test_sets)) {
        let out = config.out_dir.join(kind.file_name());
        write_biotrainer(&out, dev.iter().chain(test.iter()), &order)?;
        let summary = KindSummary {
            kind,
            out,
            train: dev.in_split(&Split::Train).count(),
            val: dev.in_split(&Split::Val).count(),
            test: test.len(),
            train_ratio: positive_fraction(dev.in_split(&Split::Train)),
            val_ratio: positive_fraction(dev.in_split(&Split::Val)),
            test_ratio: positive_fraction(test.iter()),
        };
        info!(
            "Percentage of targets ({kind}) - train: {}, val: {}, test: {}",
            summary.train_ratio, summary.val_ratio, summary.test_ratio
        );
        kinds.push(summary);
    }

    Ok(BindingReport {
        duplicated_sequences: duplicates.len(),
        removed_ids,
        kinds,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;
    use tempdir::TempDir;

    const N_DEV: usize = 30;

    fn dev_sequence(i: usize) -> String {
        format!("M{}W{}", "A".repeat(10 + i), "C".repeat(i % 3))
    }

    fn index_file(ids: impl Iterator<Item = usize>, prefix: &str, positions: &str) -> String {
        ids.map(|i| format!("{prefix}{i}\t{positions}\n")).collect()
    }

    fn fixture(root: &Path) {
        let dev = root.join("development_set");
        let indep = root.join("independent_set");
        fs::create_dir_all(&dev).unwrap();
        fs::create_dir_all(&indep).unwrap();

        let mut all = String::new();
        for i in 0..N_DEV {
            all.push_str(&format!(">D{i}\n{}\n", dev_sequence(i)));
        }
        all.push_str(">AMB1\nMKKKKKKKKKKKKK\n>AMB2\nMKKKKKKKKKKKKK\n");
        fs::write(dev.join("all.fasta"), all).unwrap();

        let ids: Vec<String> = (0..N_DEV)
            .map(|i| format!("D{i}"))
            .chain(["AMB1".to_string(), "AMB2".to_string()])
            .collect();
        for (n, name) in SPLIT_ID_FILES.iter().enumerate() {
            let chunk: String = ids
                .iter()
                .skip(n)
                .step_by(SPLIT_ID_FILES.len())
                .map(|id| format!("{id}\n"))
                .collect();
            fs::write(dev.join(name), chunk).unwrap();
        }

        fs::write(dev.join("binding_residues_2.5_metal.txt"), index_file(0..20, "D", "2")).unwrap();
        fs::write(dev.join("binding_residues_2.5_nuclear.txt"), index_file(10..30, "D", "2,3")).unwrap();
        fs::write(
            dev.join("binding_residues_2.5_small.txt"),
            index_file((0..10).chain(20..25), "D", "1,3"),
        )
        .unwrap();

        fs::write(
            indep.join("indep_set.fasta"),
            ">T0\nGGGGHHHH\n>T1\nGGPPHHHH\n>T2\nPPPPHHHH\n>T3\nYYYYHHHH\n",
        )
        .unwrap();
        fs::write(indep.join("binding_residues_metal.txt"), "T0\t1\nT1\t2\n").unwrap();
        fs::write(indep.join("binding_residues_nuclear.txt"), "T1\t3\nT2\t4\n").unwrap();
        fs::write(indep.join("binding_residues_small.txt"), "T3\t5,6\n").unwrap();
    }

    fn config(root: &Path) -> BindingConfig {
        BindingConfig {
            ambiguous_ids: vec!["AMB1".into(), "AMB2".into()],
            expectations: BindingExpectations { test_sequences: Some(4) },
            ..BindingConfig::new(root, root.join("out"))
        }
    }

    #[test]
    fn writes_four_files_with_stratified_val() {
        let dir = TempDir::new("binding").unwrap();
        fixture(dir.path());
        let report = compile(&config(dir.path())).unwrap();

        assert_eq!(report.duplicated_sequences, 1);
        assert_eq!(report.removed_ids, 2);
        let sizes: Vec<(usize, usize, usize)> =
            report.kinds.iter().map(|k| (k.train, k.val, k.test)).collect();
        assert_eq!(sizes, vec![(18, 2, 2), (18, 2, 2), (13, 2, 1), (27, 3, 4)]);

        for kind in BindingKind::ALL {
            assert!(dir.path().join("out").join(kind.file_name()).exists());
        }
        let combined = fs::read_to_string(dir.path().join("out").join("binding_combined.fasta")).unwrap();
        assert!(combined.contains(">T1 SET=test TARGET=01100000\nGGPPHHHH\n"));
        assert!(!combined.contains("AMB1"));
    }

    #[test]
    fn output_is_reproducible_for_a_seed() {
        let dir = TempDir::new("binding").unwrap();
        fixture(dir.path());
        compile(&config(dir.path())).unwrap();
        let first = fs::read_to_string(dir.path().join("out").join("binding_metal.fasta")).unwrap();
        compile(&config(dir.path())).unwrap();
        let second = fs::read_to_string(dir.path().join("out").join("binding_metal.fasta")).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_sequence_in_development_set_fails() {
        let dir = TempDir::new("binding").unwrap();
        fixture(dir.path());
        let leaked = format!(">T0\nGGGGHHHH\n>T1\n{}\n>T2\nPPPPHHHH\n>T3\nYYYYHHHH\n", dev_sequence(4));
        fs::write(dir.path().join("independent_set").join("indep_set.fasta"), leaked).unwrap();
        let err = compile(&config(dir.path())).unwrap_err();
        assert!(err.to_string().contains("also appears in development set"));
    }

    #[test]
    fn unlisted_development_id_fails() {
        let dir = TempDir::new("binding").unwrap();
        fixture(dir.path());
        fs::write(dir.path().join("development_set").join("uniprot_test.txt"), "").unwrap();
        assert!(compile(&config(dir.path())).is_err());
    }

    #[test]
    fn wrong_test_count_fails() {
        let dir = TempDir::new("binding").unwrap();
        fixture(dir.path());
        let cfg = BindingConfig {
            expectations: BindingExpectations::default(),
            ..config(dir.path())
        };
        let err = compile(&cfg).unwrap_err();
        assert!(err.to_string().contains("expected 46 test sequences, found 4"));
    }
}
