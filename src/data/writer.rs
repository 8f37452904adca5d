use std::fmt::Write as _;
use std::path::Path;

use log::info;

use super::error::{CompileError, Result};
use super::model::{SequenceRecord, Split};

// ---------------------------------------------------------------------------
// Output ordering
// ---------------------------------------------------------------------------

/// `train`, `val`, `test`, then the named test sets in the given order.
pub fn split_order(named_test_sets: &[&str]) -> Vec<Split> {
    let mut order = vec![Split::Train, Split::Val, Split::Test];
    order.extend(named_test_sets.iter().map(|name| Split::Named(name.to_string())));
    order
}

/// Records grouped by split (in `order`) and sorted by identifier within a
/// split. A record whose split is not listed in `order` is an error.
pub fn ordered<'a>(
    records: impl IntoIterator<Item = &'a SequenceRecord>,
    order: &[Split],
) -> Result<Vec<&'a SequenceRecord>> {
    let mut keyed = Vec::new();
    for r in records {
        let rank = order.iter().position(|s| s == r.split()).ok_or_else(|| {
            CompileError::invariant(format!("{}: split {} is not declared", r.id(), r.split()))
        })?;
        keyed.push((rank, r));
    }
    keyed.sort_by(|(ra, a), (rb, b)| ra.cmp(rb).then_with(|| a.id().cmp(b.id())));
    Ok(keyed.into_iter().map(|(_, r)| r).collect())
}

// ---------------------------------------------------------------------------
// Biotrainer FASTA
// ---------------------------------------------------------------------------

/// Two-line entry: `>ID SET=.. TARGET=.. [MASK=..]` and the sequence.
pub fn encode_record(record: &SequenceRecord) -> String {
    let mut out = format!(
        ">{} SET={} TARGET={}",
        record.id(),
        record.split(),
        record.target().encode()
    );
    if let Some(mask) = record.mask() {
        let _ = write!(out, " MASK={}", mask.encode());
    }
    out.push('\n');
    out.push_str(record.sequence());
    out.push('\n');
    out
}

/// Render records in deterministic order.
pub fn render<'a>(
    records: impl IntoIterator<Item = &'a SequenceRecord>,
    order: &[Split],
) -> Result<String> {
    Ok(ordered(records, order)?
        .into_iter()
        .map(encode_record)
        .collect())
}

/// Write records to `path`, creating parent directories. Returns the number
/// of records written.
pub fn write_biotrainer<'a>(
    path: &Path,
    records: impl IntoIterator<Item = &'a SequenceRecord>,
    order: &[Split],
) -> Result<usize> {
    let records: Vec<&SequenceRecord> = records.into_iter().collect();
    let n = records.len();
    let text = render(records, order)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, text)?;
    info!("wrote {n} records to {}", path.display());
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::fasta::parse_annotated;
    use crate::data::model::{Mask, RecordBuilder, Target, TargetKind};

    fn rec(id: &str, seq: &str, target: Target, mask: Option<Mask>, split: Split) -> SequenceRecord {
        let mut b = RecordBuilder::new(id, seq).target(target).split(split);
        if let Some(m) = mask {
            b = b.mask(m);
        }
        b.build().unwrap()
    }

    #[test]
    fn entry_layout() {
        let r = rec(
            "P1",
            "MKT",
            Target::Scores(vec![1.5, 999.0, -2.0]),
            Some(Mask::new(vec![true, false, true])),
            Split::Val,
        );
        assert_eq!(encode_record(&r), ">P1 SET=val TARGET=1.5;999.0;-2.0 MASK=101\nMKT\n");
    }

    #[test]
    fn records_grouped_by_split_then_sorted_by_id() {
        let order = split_order(&["casp12"]);
        let recs = vec![
            rec("b", "GG", Target::Residues("01".into()), None, Split::Named("casp12".into())),
            rec("z", "MK", Target::Residues("11".into()), None, Split::Test),
            rec("c", "PP", Target::Residues("00".into()), None, Split::Train),
            rec("a", "WW", Target::Residues("10".into()), None, Split::Train),
            rec("m", "YY", Target::Residues("10".into()), None, Split::Val),
        ];
        let sorted = ordered(&recs, &order).unwrap();
        let ids: Vec<&str> = sorted.iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec!["a", "c", "m", "z", "b"]);
    }

    #[test]
    fn undeclared_split_is_rejected() {
        let recs = vec![rec("a", "MK", Target::Residues("11".into()), None, Split::Named("casp99".into()))];
        assert!(ordered(&recs, &split_order(&[])).is_err());
    }

    #[test]
    fn rendered_output_parses_back_identically() {
        let order = split_order(&["casp13"]);
        let recs = vec![
            rec("bind1", "MKTAYIAKQR", Target::Residues("1010100000".into()), None, Split::Train),
            rec(
                "dis1",
                "MKT",
                Target::Scores(vec![0.25, 999.0, 3.0]),
                Some(Mask::new(vec![true, false, true])),
                Split::Val,
            ),
            rec("loc1", "MKTAYIAKQR", Target::Labels(vec!["Nucleus".into()]), None, Split::Test),
            rec(
                "ss1",
                "MKTA",
                Target::Residues("CHEC".into()),
                Some(Mask::new(vec![false, true, true, true])),
                Split::Named("casp13".into()),
            ),
        ];
        let text = render(&recs, &order).unwrap();
        let parsed = parse_annotated(&text, Path::new("roundtrip.fasta"), TargetKind::Inferred).unwrap();
        assert_eq!(parsed.len(), recs.len());
        for r in &recs {
            assert_eq!(parsed.get(r.id()), Some(r));
        }
    }

    #[test]
    fn write_creates_parent_directories() {
        let dir = tempdir::TempDir::new("writer").unwrap();
        let path = dir.path().join("nested").join("out.fasta");
        let recs = vec![rec("a", "MK", Target::Residues("11".into()), None, Split::Train)];
        assert_eq!(write_biotrainer(&path, &recs, &split_order(&[])).unwrap(), 1);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), ">a SET=train TARGET=11\nMK\n");
    }
}
