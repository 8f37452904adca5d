use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use log::debug;
use serde::Deserialize;

use super::error::{CompileError, Result, read_text, require_exists};
use super::model::Mask;

// ---------------------------------------------------------------------------
// Binding residue index files
// ---------------------------------------------------------------------------

/// Per-identifier set of 0-based positive residue indices.
pub type TargetIndices = BTreeMap<String, BTreeSet<usize>>;

/// Read `id<TAB>i,j,k` lines where indices are 1-based residue positions.
pub fn read_target_indices(path: &Path) -> Result<TargetIndices> {
    let text = read_text(path)?;
    let targets = parse_target_indices(&text, path)?;
    debug!("{}: targets for {} sequences", path.display(), targets.len());
    Ok(targets)
}

pub(crate) fn parse_target_indices(text: &str, origin: &Path) -> Result<TargetIndices> {
    let mut targets = TargetIndices::new();
    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let malformed = |msg: String| CompileError::malformed(origin, line_no + 1, msg);

        let (id, raw) = line
            .split_once('\t')
            .ok_or_else(|| malformed("expected <id>\\t<indices>".to_string()))?;
        let mut indices = BTreeSet::new();
        for tok in raw.split(',') {
            let tok = tok.trim();
            let one_based: usize = tok
                .parse()
                .map_err(|_| malformed(format!("{id}: '{tok}' is not a residue index")))?;
            if one_based == 0 {
                return Err(malformed(format!("{id}: residue indices start at 1")));
            }
            if !indices.insert(one_based - 1) {
                return Err(malformed(format!("{id}: residue {one_based} listed twice")));
            }
        }
        if targets.insert(id.to_string(), indices).is_some() {
            return Err(malformed(format!("{id}: listed twice")));
        }
    }
    Ok(targets)
}

// ---------------------------------------------------------------------------
// Identifier lists
// ---------------------------------------------------------------------------

/// Newline-delimited identifiers, in file order.
pub fn read_ids(path: &Path) -> Result<Vec<String>> {
    let text = read_text(path)?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}

/// Blacklist file: one identifier per line behind a single marker character
/// (e.g. `>P12345`).
pub fn read_blacklist(path: &Path) -> Result<BTreeSet<String>> {
    let text = read_text(path)?;
    Ok(parse_blacklist(&text))
}

pub(crate) fn parse_blacklist(text: &str) -> BTreeSet<String> {
    text.lines()
        .filter_map(|line| {
            let mut chars = line.chars();
            chars.next()?;
            let id = chars.as_str().trim();
            (!id.is_empty()).then(|| id.to_string())
        })
        .collect()
}

// ---------------------------------------------------------------------------
// CheZOD disorder scores
// ---------------------------------------------------------------------------

/// Training scores: `id:score,score,...` with stray tabs and spaces.
pub fn read_chezod_training_scores(path: &Path) -> Result<BTreeMap<String, Vec<f64>>> {
    let text = read_text(path)?;
    parse_chezod_training_scores(&text, path)
}

pub(crate) fn parse_chezod_training_scores(
    text: &str,
    origin: &Path,
) -> Result<BTreeMap<String, Vec<f64>>> {
    let mut scores = BTreeMap::new();
    for (line_no, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let malformed = |msg: String| CompileError::malformed(origin, line_no + 1, msg);
        let (id, raw) = line
            .split_once(':')
            .ok_or_else(|| malformed("expected <id>:<scores>".to_string()))?;
        let id = id.trim();
        let values = raw
            .split(',')
            .map(|tok| {
                let cleaned: String = tok.chars().filter(|c| *c != '\t' && *c != ' ').collect();
                cleaned
                    .parse::<f64>()
                    .map_err(|_| malformed(format!("{id}: '{cleaned}' is not a score")))
            })
            .collect::<Result<Vec<f64>>>()?;
        if scores.insert(id.to_string(), values).is_some() {
            return Err(malformed(format!("{id}: listed twice")));
        }
    }
    Ok(scores)
}

/// Sequence and per-residue scores from one CheZOD test file.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredSequence {
    pub sequence: String,
    pub scores: Vec<f64>,
}

/// Test scores: a directory with one `zscores<ID>.<ext>` file per protein.
///
/// Each line holds the residue in the first column and its score in the last.
/// Subdirectories are skipped; files are visited in name order.
pub fn read_chezod_test_scores(dir: &Path) -> Result<BTreeMap<String, ScoredSequence>> {
    require_exists(dir)?;
    let mut paths: Vec<_> = std::fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<_>>()?;
    paths.sort();

    let mut out = BTreeMap::new();
    for path in paths {
        if path.is_dir() {
            continue;
        }
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        let stem = file_name.split('.').next().unwrap_or_default();
        let id = stem
            .split_once("zscores")
            .map(|(_, id)| id)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                CompileError::malformed(&path, 0, "file name must look like zscores<ID>.<ext>")
            })?;
        let scored = parse_chezod_test_file(&read_text(&path)?, &path)?;
        out.insert(id.to_string(), scored);
    }
    debug!("{}: {} scored test sequences", dir.display(), out.len());
    Ok(out)
}

pub(crate) fn parse_chezod_test_file(text: &str, origin: &Path) -> Result<ScoredSequence> {
    let mut sequence = String::new();
    let mut scores = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        let cols: Vec<&str> = line.split_whitespace().collect();
        let (Some(residue), Some(score)) = (cols.first(), cols.last()) else {
            continue;
        };
        if cols.len() < 2 {
            return Err(CompileError::malformed(origin, line_no + 1, "expected residue and score"));
        }
        let score = score.parse::<f64>().map_err(|_| {
            CompileError::malformed(origin, line_no + 1, format!("'{score}' is not a score"))
        })?;
        sequence.push_str(residue);
        scores.push(score);
    }
    Ok(ScoredSequence { sequence, scores })
}

// ---------------------------------------------------------------------------
// CASP secondary structure test sets
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct CaspRow {
    input: String,
    dssp3: String,
    disorder: String,
}

/// One CASP target: sequence, 3-state structure and derived mask.
#[derive(Debug, Clone, PartialEq)]
pub struct CaspEntry {
    pub sequence: String,
    pub dssp3: String,
    pub mask: Mask,
}

/// CSV with `input`, `dssp3` and `disorder` columns.
pub fn read_casp_csv(path: &Path) -> Result<Vec<CaspEntry>> {
    require_exists(path)?;
    let mut reader = csv::Reader::from_path(path)?;
    let mut entries = Vec::new();
    for (row_no, row) in reader.deserialize::<CaspRow>().enumerate() {
        let row = row?;
        let mask = disorder_to_mask(&row.disorder).ok_or_else(|| {
            CompileError::malformed(path, row_no + 2, format!("bad disorder list '{}'", row.disorder))
        })?;
        entries.push(CaspEntry {
            sequence: row.input,
            dssp3: row.dssp3,
            mask,
        });
    }
    debug!("{}: {} CASP rows", path.display(), entries.len());
    Ok(entries)
}

/// Turn `"[1.0, 0.0, 1.0]"` or `"[1 0 1]"` into a mask, truncating each
/// value to an integer (non-zero = defined).
pub fn disorder_to_mask(raw: &str) -> Option<Mask> {
    let cleaned: String = raw.chars().filter(|c| !matches!(c, '[' | ']' | '"')).collect();
    let values: Vec<&str> = if cleaned.contains(',') {
        cleaned.split(',').map(str::trim).collect()
    } else {
        cleaned.split_whitespace().collect()
    };
    values
        .into_iter()
        .map(|v| v.parse::<f64>().ok().map(|x| x.trunc() != 0.0))
        .collect::<Option<Vec<bool>>>()
        .map(Mask::new)
}
