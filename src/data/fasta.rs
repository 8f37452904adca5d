use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use bio::io::fasta;
use log::debug;

use super::error::{CompileError, Result, read_text};
use super::model::{Mask, RecordBuilder, RecordSet, Split, TargetKind};

// ---------------------------------------------------------------------------
// Plain FASTA: `>ID` then one or more sequence lines
// ---------------------------------------------------------------------------

/// One entry of a header-only FASTA file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastaEntry {
    pub id: String,
    pub sequence: String,
}

/// Read a FASTA file whose header is just the identifier.
///
/// Sequence lines are concatenated until the next header. Entries are
/// returned in file order.
pub fn read_sequences(path: &Path) -> Result<Vec<FastaEntry>> {
    let text = read_text(path)?;
    let entries = parse_sequences(&text, path)?;
    debug!("{}: {} sequences", path.display(), entries.len());
    Ok(entries)
}

/// A raw FASTA record with the 1-based line number of its header.
struct RawRecord {
    line: usize,
    header: String,
    sequence: String,
}

/// Read every record of `text` with the `bio` FASTA reader.
///
/// `header` is the identifier followed by the description, if any, exactly
/// as written after `>`.
fn raw_records(text: &str, origin: &Path) -> Result<Vec<RawRecord>> {
    let header_lines: Vec<usize> = text
        .lines()
        .enumerate()
        .filter(|(_, l)| l.starts_with('>'))
        .map(|(i, _)| i + 1)
        .collect();

    let mut records = Vec::new();
    for (n, result) in fasta::Reader::new(text.trim_start().as_bytes()).records().enumerate() {
        let line = header_lines.get(n).copied().unwrap_or(0);
        let record = result.map_err(|e| CompileError::malformed(origin, line, e.to_string()))?;
        if record.id().is_empty() {
            return Err(CompileError::malformed(origin, line, "empty header"));
        }
        let header = match record.desc() {
            Some(desc) => format!("{} {desc}", record.id()),
            None => record.id().to_string(),
        };
        let sequence = std::str::from_utf8(record.seq())
            .map_err(|e| CompileError::malformed(origin, line, format!("sequence is not UTF-8: {e}")))?
            .to_string();
        records.push(RawRecord { line, header, sequence });
    }
    Ok(records)
}

pub(crate) fn parse_sequences(text: &str, origin: &Path) -> Result<Vec<FastaEntry>> {
    let mut entries: Vec<FastaEntry> = Vec::new();
    let mut seen = BTreeSet::new();

    for raw in raw_records(text, origin)? {
        if !seen.insert(raw.header.clone()) {
            return Err(CompileError::malformed(
                origin,
                raw.line,
                format!("identifier {} appears more than once", raw.header),
            ));
        }
        entries.push(FastaEntry {
            id: raw.header,
            sequence: raw.sequence,
        });
    }
    Ok(entries)
}

// ---------------------------------------------------------------------------
// Annotated FASTA: `>ID SET=.. TARGET=.. [MASK=..] [VALIDATION=..]`
// ---------------------------------------------------------------------------

/// Keys accepted in an annotated header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HeaderKey {
    Set,
    Target,
    Mask,
    Validation,
}

impl HeaderKey {
    fn parse(key: &str) -> Option<HeaderKey> {
        match key {
            "SET" => Some(HeaderKey::Set),
            "TARGET" => Some(HeaderKey::Target),
            "MASK" => Some(HeaderKey::Mask),
            "VALIDATION" => Some(HeaderKey::Validation),
            _ => None,
        }
    }
}

/// Tokenized annotated header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub id: String,
    pub fields: BTreeMap<HeaderKey, String>,
}

impl Header {
    /// Split a header line (without `>`) into the identifier and its
    /// `KEY=VALUE` tokens. Unknown keys, tokens without `=`, empty values
    /// and repeated keys are rejected.
    pub fn parse(line: &str) -> std::result::Result<Header, String> {
        let mut tokens = line.split_whitespace();
        let id = tokens
            .next()
            .ok_or_else(|| "empty header".to_string())?
            .to_string();
        if id.contains('=') {
            return Err(format!("header starts with an annotation instead of an identifier: {id}"));
        }

        let mut fields = BTreeMap::new();
        for token in tokens {
            let (key, value) = token
                .split_once('=')
                .ok_or_else(|| format!("{id}: token '{token}' is not KEY=VALUE"))?;
            let key = HeaderKey::parse(key)
                .ok_or_else(|| format!("{id}: unknown header key '{key}'"))?;
            if value.is_empty() {
                return Err(format!("{id}: empty value for {key:?}"));
            }
            if fields.insert(key, value.to_string()).is_some() {
                return Err(format!("{id}: {key:?} given twice"));
            }
        }
        Ok(Header { id, fields })
    }

    pub fn get(&self, key: HeaderKey) -> Option<&str> {
        self.fields.get(&key).map(String::as_str)
    }

    /// Effective split: `VALIDATION=True` moves a record to `val`.
    pub fn split(&self) -> std::result::Result<Split, String> {
        let set = self
            .get(HeaderKey::Set)
            .map(Split::parse)
            .ok_or_else(|| format!("{}: missing SET", self.id))?;
        let validation = match self.get(HeaderKey::Validation) {
            None | Some("False") => false,
            Some("True") => true,
            Some(other) => return Err(format!("{}: VALIDATION={other} is not True/False", self.id)),
        };
        if !validation {
            return Ok(set);
        }
        if set.is_test() {
            return Err(format!("{}: flagged VALIDATION=True but SET={set}", self.id));
        }
        Ok(Split::Val)
    }
}

/// Read a biotrainer-style FASTA file into validated records.
pub fn read_annotated(path: &Path) -> Result<RecordSet> {
    read_annotated_as(path, TargetKind::Inferred)
}

/// Like [`read_annotated`], with the kind of every `TARGET=` value fixed
/// by the caller.
pub fn read_annotated_as(path: &Path, kind: TargetKind) -> Result<RecordSet> {
    let text = read_text(path)?;
    let records = parse_annotated(&text, path, kind)?;
    debug!("{}: {} annotated records", path.display(), records.len());
    Ok(records)
}

pub(crate) fn parse_annotated(text: &str, origin: &Path, kind: TargetKind) -> Result<RecordSet> {
    let raw = raw_records(text, origin)?;
    let n_headers = raw.len();
    let mut records = RecordSet::new();
    for RawRecord { line, header, sequence } in raw {
        let malformed = |msg: String| CompileError::malformed(origin, line, msg);
        let header = Header::parse(&header).map_err(malformed)?;

        let split = header.split().map_err(malformed)?;
        let raw_target = header
            .get(HeaderKey::Target)
            .ok_or_else(|| malformed(format!("{}: missing TARGET", header.id)))?;
        let seq_len = sequence.chars().count();
        let target = kind
            .parse(raw_target, seq_len)
            .ok_or_else(|| malformed(format!("{}: empty TARGET", header.id)))?;

        let mut builder = RecordBuilder::new(header.id.clone(), sequence)
            .target(target)
            .split(split);
        if let Some(raw_mask) = header.get(HeaderKey::Mask) {
            let mask = Mask::parse(raw_mask)
                .ok_or_else(|| malformed(format!("{}: MASK must be 0/1", header.id)))?;
            builder = builder.mask(mask);
        }
        let record = builder.build().map_err(|e| malformed(e.to_string()))?;
        records.insert(record).map_err(|e| malformed(e.to_string()))?;
    }

    if records.len() != n_headers {
        return Err(CompileError::malformed(
            origin,
            0,
            format!("{n_headers} headers but {} distinct identifiers", records.len()),
        ));
    }
    Ok(records)
}

// ---------------------------------------------------------------------------
// Cross-validation FASTA: header, sequence, annotation
// ---------------------------------------------------------------------------

/// One three-line record of a CV fold file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CvEntry {
    /// First whitespace-delimited token of the header, e.g. `P22619|NEGATIVE|TAT|0`.
    pub id: String,
    pub sequence: String,
    pub annotation: String,
}

/// Read a CV fold file made of complete header/sequence/annotation triplets.
pub fn read_cv_fasta(path: &Path) -> Result<Vec<CvEntry>> {
    let text = read_text(path)?;
    let entries = parse_cv_fasta(&text, path)?;
    debug!("{}: {} CV records", path.display(), entries.len());
    Ok(entries)
}

pub(crate) fn parse_cv_fasta(text: &str, origin: &Path) -> Result<Vec<CvEntry>> {
    let lines: Vec<&str> = text.lines().map(str::trim_end).collect();
    let mut entries = Vec::new();
    let mut seen = BTreeSet::new();

    let mut i = 0;
    while i < lines.len() {
        if lines[i].is_empty() {
            i += 1;
            continue;
        }
        let header = lines[i].strip_prefix('>').ok_or_else(|| {
            CompileError::malformed(origin, i + 1, "expected header starting with '>'")
        })?;
        if i + 2 >= lines.len() {
            return Err(CompileError::malformed(
                origin,
                i + 1,
                "incomplete record at end of file",
            ));
        }
        let sequence = lines[i + 1].trim();
        let annotation = lines[i + 2].trim();
        if sequence.starts_with('>') || annotation.starts_with('>') {
            return Err(CompileError::malformed(
                origin,
                i + 1,
                "record is missing its sequence or annotation line",
            ));
        }
        if sequence.is_empty() || annotation.is_empty() {
            return Err(CompileError::malformed(
                origin,
                i + 1,
                "record has an empty sequence or annotation line",
            ));
        }
        let id = header
            .split_whitespace()
            .next()
            .ok_or_else(|| CompileError::malformed(origin, i + 1, "empty header"))?
            .to_string();
        if !seen.insert(id.clone()) {
            return Err(CompileError::malformed(
                origin,
                i + 1,
                format!("identifier {id} appears more than once"),
            ));
        }
        entries.push(CvEntry {
            id,
            sequence: sequence.to_string(),
            annotation: annotation.to_string(),
        });
        i += 3;
    }
    Ok(entries)
}
