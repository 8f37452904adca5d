use std::collections::{BTreeMap, BTreeSet};

use log::{debug, warn};

use super::error::{CompileError, Result};
use super::fasta::FastaEntry;
use super::loader::TargetIndices;
use super::model::{RecordBuilder, RecordSet, SequenceRecord, Split};

// ---------------------------------------------------------------------------
// Merging target sources
// ---------------------------------------------------------------------------

/// Union the positive residues of several target sources per identifier.
///
/// Identifiers whose union is empty are dropped, so the result only holds
/// sequences with at least one annotated residue.
pub fn combine(sources: &[&TargetIndices]) -> TargetIndices {
    let mut merged = TargetIndices::new();
    for source in sources {
        for (id, indices) in source.iter() {
            if indices.is_empty() {
                continue;
            }
            merged.entry(id.clone()).or_default().extend(indices);
        }
    }
    merged
}

/// Attach binary targets to sequences.
///
/// Every source contributing indices for an identifier is merged into one
/// multi-hot target; sequences without any contribution are skipped.
pub fn attach_binding_targets(
    sequences: &[FastaEntry],
    sources: &[&TargetIndices],
) -> Result<RecordSet> {
    let mut records = RecordSet::new();
    for entry in sequences {
        let builder = sources
            .iter()
            .filter_map(|source| source.get(&entry.id))
            .fold(
                RecordBuilder::new(entry.id.clone(), entry.sequence.clone()),
                |builder, indices| builder.positives(indices),
            );
        if builder.has_target() {
            records.insert(builder.build()?)?;
        }
    }
    Ok(records)
}

// ---------------------------------------------------------------------------
// Duplicates and exclusions
// ---------------------------------------------------------------------------

/// Sequences occurring more than once, with their occurrence count.
pub fn duplicated_sequences<'a>(sequences: impl IntoIterator<Item = &'a str>) -> BTreeMap<String, usize> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for seq in sequences {
        *counts.entry(seq).or_insert(0) += 1;
    }
    counts
        .into_iter()
        .filter(|(_, n)| *n > 1)
        .map(|(seq, n)| (seq.to_string(), n))
        .collect()
}

/// Keep the first record of every distinct sequence.
///
/// Returns the identifiers that were removed, in source order.
pub fn deduplicate(records: &mut RecordSet) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut removed = Vec::new();
    records.retain(|r| {
        if seen.insert(r.sequence().to_string()) {
            true
        } else {
            removed.push(r.id().to_string());
            false
        }
    });
    if !removed.is_empty() {
        debug!("removed {} records with repeated sequences", removed.len());
    }
    removed
}

/// Remove every record whose identifier is blacklisted.
pub fn apply_blacklist(records: &mut RecordSet, blacklist: &BTreeSet<String>) -> usize {
    let before = records.len();
    records.retain(|r| !blacklist.contains(r.id()));
    let removed = before - records.len();
    debug!("blacklist removed {removed} of {before} records");
    removed
}

/// Remove every record whose identifier is listed in `ids`.
pub fn remove_ids(entries: &mut Vec<FastaEntry>, ids: &[String]) -> usize {
    let before = entries.len();
    entries.retain(|e| !ids.contains(&e.id));
    before - entries.len()
}

// ---------------------------------------------------------------------------
// Leakage
// ---------------------------------------------------------------------------

/// Fail if an identifier or a sequence is assigned to more than one split.
pub fn check_no_leakage<'a>(records: impl IntoIterator<Item = &'a SequenceRecord>) -> Result<()> {
    let mut id_split: BTreeMap<&str, &Split> = BTreeMap::new();
    let mut seq_split: BTreeMap<&str, (&str, &Split)> = BTreeMap::new();

    for r in records {
        if let Some(prev) = id_split.insert(r.id(), r.split()) {
            if prev != r.split() {
                return Err(CompileError::invariant(format!(
                    "identifier {} is in both {prev} and {}",
                    r.id(),
                    r.split()
                )));
            }
        }
        match seq_split.get(r.sequence()) {
            Some((other_id, prev)) if *prev != r.split() => {
                warn!("sequence of {} leaks into {} via {other_id}", r.id(), r.split());
                return Err(CompileError::invariant(format!(
                    "sequence of {} ({}) also appears as {other_id} ({prev})",
                    r.id(),
                    r.split()
                )));
            }
            Some(_) => {}
            None => {
                seq_split.insert(r.sequence(), (r.id(), r.split()));
            }
        }
    }
    Ok(())
}

/// Fail if two sequence collections share an identifier or a sequence.
pub fn check_disjoint(
    left_name: &str,
    left: &[FastaEntry],
    right_name: &str,
    right: &[FastaEntry],
) -> Result<()> {
    let ids: BTreeSet<&str> = left.iter().map(|e| e.id.as_str()).collect();
    let seqs: BTreeSet<&str> = left.iter().map(|e| e.sequence.as_str()).collect();
    for e in right {
        if ids.contains(e.id.as_str()) {
            return Err(CompileError::invariant(format!(
                "{} is in both {left_name} and {right_name}",
                e.id
            )));
        }
        if seqs.contains(e.sequence.as_str()) {
            return Err(CompileError::invariant(format!(
                "sequence of {} ({right_name}) also appears in {left_name}",
                e.id
            )));
        }
    }
    Ok(())
}
