use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use super::error::{CompileError, Result, ensure_invariant};

/// Targets longer than this are treated as per-residue even when their length
/// disagrees with the sequence, so the mismatch is reported instead of being
/// mistaken for a per-sequence label.
pub const PER_RESIDUE_MIN_LEN: usize = 25;

// ---------------------------------------------------------------------------
// Split – which partition a record belongs to
// ---------------------------------------------------------------------------

/// Partition label written as `SET=<split>`.
///
/// Anything other than `train` / `val` / `test` is a named external test set
/// such as `casp12` or `newPISCES364`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Split {
    Train,
    Val,
    Test,
    Named(String),
}

impl Split {
    pub fn parse(s: &str) -> Split {
        match s {
            "train" => Split::Train,
            "val" => Split::Val,
            "test" => Split::Test,
            other => Split::Named(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Split::Train => "train",
            Split::Val => "val",
            Split::Test => "test",
            Split::Named(name) => name,
        }
    }

    /// `test` and every named test set.
    pub fn is_test(&self) -> bool {
        matches!(self, Split::Test | Split::Named(_))
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Target – what a model should predict for a record
// ---------------------------------------------------------------------------

/// Target annotation of a record.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    /// One character per residue (`0`/`1` binding, `H`/`E`/`C` structure, ...).
    Residues(String),
    /// One numeric score per residue.
    Scores(Vec<f64>),
    /// Per-sequence categories (a single label for single-label tasks).
    Labels(Vec<String>),
}

impl Target {
    /// Binary per-residue target with `1` at every index in `positives`.
    pub fn binary(len: usize, positives: &BTreeSet<usize>) -> Target {
        Target::Residues(
            (0..len)
                .map(|i| if positives.contains(&i) { '1' } else { '0' })
                .collect(),
        )
    }

    /// Decide the target kind of a raw `TARGET=` value.
    ///
    /// * `;`-joined numbers → [`Target::Scores`]
    /// * other `;`-joined values → [`Target::Labels`]
    /// * as long as the sequence, or longer than [`PER_RESIDUE_MIN_LEN`] →
    ///   [`Target::Residues`]
    /// * anything else → a single label
    pub fn infer(raw: &str, seq_len: usize) -> Option<Target> {
        if raw.is_empty() {
            return None;
        }
        if raw.contains(';') {
            let tokens: Vec<&str> = raw.split(';').collect();
            let scores: std::result::Result<Vec<f64>, _> =
                tokens.iter().map(|t| t.parse::<f64>()).collect();
            return Some(match scores {
                Ok(scores) => Target::Scores(scores),
                Err(_) => Target::Labels(tokens.iter().map(|t| t.to_string()).collect()),
            });
        }
        let n_chars = raw.chars().count();
        if n_chars == seq_len || n_chars > PER_RESIDUE_MIN_LEN {
            Some(Target::Residues(raw.to_string()))
        } else {
            Some(Target::Labels(vec![raw.to_string()]))
        }
    }

    pub fn is_per_residue(&self) -> bool {
        matches!(self, Target::Residues(_) | Target::Scores(_))
    }

    /// Number of per-residue values, or number of labels.
    pub fn len(&self) -> usize {
        match self {
            Target::Residues(s) => s.chars().count(),
            Target::Scores(v) => v.len(),
            Target::Labels(l) => l.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of `1` residues in a binary per-residue target.
    pub fn positive_count(&self) -> usize {
        match self {
            Target::Residues(s) => s.chars().filter(|&c| c == '1').count(),
            _ => 0,
        }
    }

    /// Text written after `TARGET=`.
    ///
    /// Reading the text back with [`Target::infer`] does not always give the
    /// same kind: labels that all parse as numbers come back as scores, and
    /// a single score comes back as a label.
    pub fn encode(&self) -> String {
        match self {
            Target::Residues(s) => s.clone(),
            Target::Scores(v) => v.iter().map(|&x| format_score(x)).collect::<Vec<_>>().join(";"),
            Target::Labels(l) => l.join(";"),
        }
    }
}

/// How a raw `TARGET=` value is turned into a [`Target`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    /// Decided from the value itself, see [`Target::infer`].
    Inferred,
    /// One character per residue, whatever the length.
    PerResidue,
}

impl TargetKind {
    pub fn parse(&self, raw: &str, seq_len: usize) -> Option<Target> {
        match self {
            TargetKind::Inferred => Target::infer(raw, seq_len),
            TargetKind::PerResidue => (!raw.is_empty()).then(|| Target::Residues(raw.to_string())),
        }
    }
}

/// Decimal rendering that always keeps a fractional part (`999.0`, `-1.5`).
pub fn format_score(x: f64) -> String {
    if x.is_finite() && x.fract() == 0.0 && x.abs() < 1e16 {
        format!("{x:.1}")
    } else {
        format!("{x}")
    }
}

// ---------------------------------------------------------------------------
// Mask – per-residue "target is defined" flags
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask(Vec<bool>);

impl Mask {
    pub fn new(defined: Vec<bool>) -> Self {
        Mask(defined)
    }

    /// Parse a `0`/`1` string.
    pub fn parse(raw: &str) -> Option<Mask> {
        raw.chars()
            .map(|c| match c {
                '1' => Some(true),
                '0' => Some(false),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()
            .map(Mask)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn defined_count(&self) -> usize {
        self.0.iter().filter(|&&d| d).count()
    }

    pub fn encode(&self) -> String {
        self.0.iter().map(|&d| if d { '1' } else { '0' }).collect()
    }
}

// ---------------------------------------------------------------------------
// SequenceRecord – one protein of a compiled dataset
// ---------------------------------------------------------------------------

/// A fully validated record. Only [`RecordBuilder`] creates these, so the
/// length invariants between sequence, target and mask always hold.
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceRecord {
    id: String,
    sequence: String,
    target: Target,
    mask: Option<Mask>,
    split: Split,
}

impl SequenceRecord {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn sequence(&self) -> &str {
        &self.sequence
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn mask(&self) -> Option<&Mask> {
        self.mask.as_ref()
    }

    pub fn split(&self) -> &Split {
        &self.split
    }

    pub fn set_split(&mut self, split: Split) {
        self.split = split;
    }

    pub fn with_split(mut self, split: Split) -> Self {
        self.split = split;
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Fraction of positive residues in a binary per-residue target.
    pub fn positive_ratio(&self) -> f64 {
        let len = self.target.len();
        if len == 0 {
            return 0.0;
        }
        self.target.positive_count() as f64 / len as f64
    }
}

// ---------------------------------------------------------------------------
// RecordBuilder – accumulates fragments, validates once
// ---------------------------------------------------------------------------

/// Collects the pieces of a record coming from different sources and
/// constructs the [`SequenceRecord`] once everything is merged.
#[derive(Debug, Clone)]
pub struct RecordBuilder {
    id: String,
    sequence: String,
    target: Option<Target>,
    positives: Option<BTreeSet<usize>>,
    mask: Option<Mask>,
    split: Split,
}

impl RecordBuilder {
    pub fn new(id: impl Into<String>, sequence: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            sequence: sequence.into(),
            target: None,
            positives: None,
            mask: None,
            split: Split::Train,
        }
    }

    pub fn target(mut self, target: Target) -> Self {
        self.target = Some(target);
        self
    }

    /// Union 0-based positive residue indices into a binary target.
    pub fn positives<'a>(mut self, indices: impl IntoIterator<Item = &'a usize>) -> Self {
        self.positives
            .get_or_insert_with(BTreeSet::new)
            .extend(indices.into_iter().copied());
        self
    }

    pub fn mask(mut self, mask: Mask) -> Self {
        self.mask = Some(mask);
        self
    }

    pub fn split(mut self, split: Split) -> Self {
        self.split = split;
        self
    }

    /// Whether any source contributed a target so far.
    pub fn has_target(&self) -> bool {
        self.target.as_ref().is_some_and(|t| !t.is_empty())
            || self.positives.as_ref().is_some_and(|p| !p.is_empty())
    }

    pub fn build(self) -> Result<SequenceRecord> {
        let RecordBuilder {
            id,
            sequence,
            target,
            positives,
            mask,
            split,
        } = self;

        ensure_invariant!(!id.is_empty(), "record with empty identifier");
        ensure_invariant!(!sequence.is_empty(), "{id}: empty sequence");
        let seq_len = sequence.chars().count();

        let target = match (target, positives) {
            (Some(_), Some(_)) => {
                return Err(CompileError::invariant(format!(
                    "{id}: both an explicit target and binding indices were given"
                )));
            }
            (Some(t), None) => t,
            (None, Some(p)) => {
                if let Some(&max) = p.iter().next_back() {
                    ensure_invariant!(
                        max < seq_len,
                        "{id}: residue index {} beyond sequence length {seq_len}",
                        max + 1
                    );
                }
                Target::binary(seq_len, &p)
            }
            (None, None) => {
                return Err(CompileError::invariant(format!("{id}: no target")));
            }
        };

        ensure_invariant!(!target.is_empty(), "{id}: empty target");
        if target.is_per_residue() {
            ensure_invariant!(
                target.len() == seq_len,
                "{id}: target length {} differs from sequence length {seq_len}",
                target.len()
            );
        }
        if let Some(m) = &mask {
            ensure_invariant!(
                m.len() == seq_len,
                "{id}: mask length {} differs from sequence length {seq_len}",
                m.len()
            );
        }

        Ok(SequenceRecord {
            id,
            sequence,
            target,
            mask,
            split,
        })
    }
}

// ---------------------------------------------------------------------------
// RecordSet – records in source order, unique by identifier
// ---------------------------------------------------------------------------

/// Records kept in insertion order with an identifier index.
#[derive(Debug, Clone, Default)]
pub struct RecordSet {
    records: Vec<SequenceRecord>,
    index: BTreeMap<String, usize>,
}

impl RecordSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from records, rejecting duplicate identifiers.
    pub fn from_records(records: impl IntoIterator<Item = SequenceRecord>) -> Result<Self> {
        let mut set = RecordSet::new();
        for r in records {
            set.insert(r)?;
        }
        Ok(set)
    }

    pub fn insert(&mut self, record: SequenceRecord) -> Result<()> {
        ensure_invariant!(
            !self.index.contains_key(record.id()),
            "duplicate identifier {}",
            record.id()
        );
        self.index.insert(record.id().to_string(), self.records.len());
        self.records.push(record);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&SequenceRecord> {
        self.index.get(id).map(|&i| &self.records[i])
    }

    pub fn contains_id(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SequenceRecord> {
        self.records.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|r| r.id())
    }

    pub fn into_records(self) -> Vec<SequenceRecord> {
        self.records
    }

    /// Keep only records for which `keep` returns true.
    pub fn retain(&mut self, mut keep: impl FnMut(&SequenceRecord) -> bool) {
        self.records.retain(|r| keep(r));
        self.reindex();
    }

    /// Records assigned to `split`. The iterator only borrows `self`.
    pub fn in_split(&self, split: &Split) -> impl Iterator<Item = &SequenceRecord> + '_ {
        let split = split.clone();
        self.records.iter().filter(move |r| r.split() == &split)
    }

    /// Reassign the split of every record whose id is in `ids`.
    pub fn assign_split<'a>(&mut self, ids: impl IntoIterator<Item = &'a String>, split: &Split) {
        for id in ids {
            if let Some(&i) = self.index.get(id.as_str()) {
                self.records[i].set_split(split.clone());
            }
        }
    }

    /// Number of records per split, ordered by split.
    pub fn split_counts(&self) -> BTreeMap<Split, usize> {
        let mut counts = BTreeMap::new();
        for r in &self.records {
            *counts.entry(r.split().clone()).or_insert(0) += 1;
        }
        counts
    }

    fn reindex(&mut self) {
        self.index = self
            .records
            .iter()
            .enumerate()
            .map(|(i, r)| (r.id().to_string(), i))
            .collect();
    }
}

impl IntoIterator for RecordSet {
    type Item = SequenceRecord;
    type IntoIter = std::vec::IntoIter<SequenceRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("train", Split::Train)]
    #[test_case("val", Split::Val)]
    #[test_case("test", Split::Test)]
    #[test_case("casp12", Split::Named("casp12".into()))]
    fn split_parse_and_display(raw: &str, expected: Split) {
        let split = Split::parse(raw);
        assert_eq!(split, expected);
        assert_eq!(split.to_string(), raw);
    }

    #[test]
    fn binding_positives_become_binary_target() {
        let record = RecordBuilder::new("P1", "MKTAYIA")
            .positives(&[0usize, 2])
            .positives(&[4usize, 2])
            .build()
            .unwrap();
        assert_eq!(record.target(), &Target::Residues("1010100".into()));
        assert_eq!(record.target().positive_count(), 3);
        assert!(float_cmp::approx_eq!(f64, record.positive_ratio(), 3.0 / 7.0, ulps = 2));
    }

    #[test]
    fn positive_beyond_sequence_is_rejected() {
        let err = RecordBuilder::new("P1", "MKT").positives(&[3usize]).build().unwrap_err();
        assert!(err.to_string().contains("beyond sequence length"));
    }

    #[test]
    fn per_residue_target_length_must_match() {
        let err = RecordBuilder::new("P1", "MKT")
            .target(Target::Residues("HH".into()))
            .build()
            .unwrap_err();
        assert!(matches!(err, CompileError::InvariantViolation(_)));
    }

    #[test]
    fn label_target_length_is_free() {
        let record = RecordBuilder::new("P1", "MKTAYIA")
            .target(Target::Labels(vec!["Nucleus".into()]))
            .build()
            .unwrap();
        assert!(!record.target().is_per_residue());
    }

    #[test]
    fn mask_length_must_match() {
        let err = RecordBuilder::new("P1", "MKT")
            .target(Target::Residues("CCC".into()))
            .mask(Mask::new(vec![true, false]))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("mask length"));
    }

    #[test]
    fn builder_without_target_fails() {
        let builder = RecordBuilder::new("P1", "MKT");
        assert!(!builder.has_target());
        assert!(builder.build().is_err());
    }

    #[test_case("1.5;-2.0;999.0", 3, Target::Scores(vec![1.5, -2.0, 999.0]) ; "scores")]
    #[test_case("Nucleus;Cytoplasm", 40, Target::Labels(vec!["Nucleus".into(), "Cytoplasm".into()]) ; "multi label")]
    #[test_case("HEC", 3, Target::Residues("HEC".into()) ; "residues")]
    #[test_case("Mitochondrion", 120, Target::Labels(vec!["Mitochondrion".into()]) ; "single label")]
    fn infer_target_kind(raw: &str, seq_len: usize, expected: Target) {
        assert_eq!(Target::infer(raw, seq_len), Some(expected));
    }

    #[test]
    fn long_mismatched_target_is_still_per_residue() {
        let raw = "C".repeat(30);
        assert_eq!(Target::infer(&raw, 31), Some(Target::Residues(raw.clone())));
        assert_eq!(Target::infer("", 3), None);
    }

    #[test]
    fn numeric_labels_and_single_scores_change_kind_when_reread() {
        let labels = Target::Labels(vec!["1".into(), "2".into()]);
        assert_eq!(Target::infer(&labels.encode(), 5), Some(Target::Scores(vec![1.0, 2.0])));

        let single = Target::Scores(vec![0.5]);
        assert_eq!(single.encode(), "0.5");
        assert_eq!(Target::infer(&single.encode(), 1), Some(Target::Labels(vec!["0.5".into()])));
    }

    #[test]
    fn per_residue_kind_never_becomes_a_label() {
        assert_eq!(
            TargetKind::PerResidue.parse("CCHH", 5),
            Some(Target::Residues("CCHH".into()))
        );
        assert_eq!(TargetKind::Inferred.parse("CCHH", 5), Some(Target::Labels(vec!["CCHH".into()])));
        assert_eq!(TargetKind::PerResidue.parse("", 5), None);
    }

    #[test]
    fn scores_encode_with_fraction() {
        let t = Target::Scores(vec![999.0, 1.25, -3.0]);
        assert_eq!(t.encode(), "999.0;1.25;-3.0");
    }

    #[test]
    fn record_set_rejects_duplicate_ids_and_reindexes() {
        let a = RecordBuilder::new("A", "MK").target(Target::Residues("00".into())).build().unwrap();
        let b = RecordBuilder::new("B", "MKK").target(Target::Residues("010".into())).build().unwrap();
        let mut set = RecordSet::from_records([a.clone(), b]).unwrap();
        assert!(set.insert(a).is_err());

        set.retain(|r| r.id() != "A");
        assert_eq!(set.len(), 1);
        assert!(set.get("A").is_none());
        assert_eq!(set.get("B").map(|r| r.sequence()), Some("MKK"));
    }

    #[test]
    fn assign_split_and_counts() {
        let recs = ["A", "B", "C"].map(|id| {
            RecordBuilder::new(id, "MK").target(Target::Residues("01".into())).build().unwrap()
        });
        let mut set = RecordSet::from_records(recs).unwrap();
        set.assign_split(&["B".to_string()], &Split::Val);
        let counts = set.split_counts();
        assert_eq!(counts.get(&Split::Train), Some(&2));
        assert_eq!(counts.get(&Split::Val), Some(&1));
        assert_eq!(set.in_split(&Split::Val).count(), 1);
    }

    #[test]
    fn in_split_accepts_a_temporary_split() {
        let recs = ["casp14-0", "casp14-1", "t0"].map(|id| {
            RecordBuilder::new(id, "MK").target(Target::Residues("01".into())).build().unwrap()
        });
        let mut set = RecordSet::from_records(recs).unwrap();
        set.assign_split(&["casp14-0".to_string(), "casp14-1".to_string()], &Split::parse("casp14"));
        let ids: Vec<&str> = set
            .in_split(&Split::Named("casp14".into()))
            .map(|r| r.id())
            .collect();
        assert_eq!(ids, vec!["casp14-0", "casp14-1"]);
    }

    #[test]
    fn mask_parse_rejects_other_characters() {
        assert_eq!(Mask::parse("0110").map(|m| m.defined_count()), Some(2));
        assert!(Mask::parse("01x").is_none());
    }
}
