use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use log::info;

use super::error::{CompileError, Result, ensure_invariant};
use super::fasta::read_annotated;
use super::filter::{check_no_leakage, duplicated_sequences};
use super::model::{RecordSet, Split};

/// Test split names a compiled dataset may use besides `train` and `val`.
pub const KNOWN_TEST_SETS: [&str; 5] = ["test", "newPISCES364", "casp12", "casp13", "casp14"];

/// Fail unless a count matches its expected value. `None` skips the check.
pub fn expect_count(what: &str, expected: Option<usize>, actual: usize) -> Result<()> {
    match expected {
        Some(expected) if expected != actual => Err(CompileError::invariant(format!(
            "expected {expected} {what}, found {actual}"
        ))),
        _ => Ok(()),
    }
}

/// Outcome of a passed sanity check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckSummary {
    pub records: usize,
    pub per_split: BTreeMap<Split, usize>,
}

/// Dataset-wide invariants every compiled file must satisfy:
/// at least one record, unique identifiers and sequences, only known
/// splits, and no test sequence shared with train or val.
///
/// Per-record invariants (non-empty sequence and target, per-residue length
/// agreement) already hold for every [`RecordSet`].
pub fn sanity_check(records: &RecordSet, test_sets: &[&str]) -> Result<CheckSummary> {
    ensure_invariant!(!records.is_empty(), "dataset has no records");

    let allowed: BTreeSet<Split> = [Split::Train, Split::Val]
        .into_iter()
        .chain(test_sets.iter().map(|s| Split::parse(s)))
        .collect();
    for r in records.iter() {
        ensure_invariant!(
            allowed.contains(r.split()),
            "{}: unknown split {}",
            r.id(),
            r.split()
        );
    }

    let duplicates = duplicated_sequences(records.iter().map(|r| r.sequence()));
    ensure_invariant!(
        duplicates.is_empty(),
        "{} sequences occur more than once",
        duplicates.len()
    );

    check_no_leakage(records.iter())?;

    Ok(CheckSummary {
        records: records.len(),
        per_split: records.split_counts(),
    })
}

/// Parse a compiled dataset file and run [`sanity_check`] on it.
pub fn check_file(path: &Path, test_sets: &[&str]) -> Result<CheckSummary> {
    let records = read_annotated(path)?;
    let summary = sanity_check(&records, test_sets)?;
    info!("{}: {} records pass sanity checks", path.display(), summary.records);
    Ok(summary)
}
