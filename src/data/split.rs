//! Train/validation partitioning.
//!
//! Two strategies, both reproducible from a `u64` seed:
//!
//! * [`random_split`] – plain shuffled split.
//! * [`stratified_split`] – records are binned by a continuous statistic
//!   (percentile bins) and every bin contributes proportionally to both
//!   partitions, so the statistic's distribution matches across them.

use std::collections::BTreeMap;

use log::debug;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use super::error::{CompileError, Result};

/// Identifiers assigned to each side of a train/validation split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    pub train: Vec<String>,
    pub val: Vec<String>,
}

/// Number of validation items for `n` items: `ceil(fraction * n)`.
fn val_count(n: usize, val_fraction: f64) -> Result<(usize, usize)> {
    if !(val_fraction > 0.0 && val_fraction < 1.0) {
        return Err(CompileError::InvalidSplit(format!(
            "validation fraction {val_fraction} outside (0, 1)"
        )));
    }
    let n_val = (val_fraction * n as f64).ceil() as usize;
    let n_train = n.saturating_sub(n_val);
    if n_val == 0 || n_train == 0 {
        return Err(CompileError::InvalidSplit(format!(
            "{n} items cannot give non-empty partitions at fraction {val_fraction}"
        )));
    }
    Ok((n_train, n_val))
}

// ---------------------------------------------------------------------------
// Plain random split
// ---------------------------------------------------------------------------

/// Shuffle `ids` with `seed` and move the first `ceil(f * n)` to validation.
pub fn random_split(ids: &[String], val_fraction: f64, seed: u64) -> Result<Partition> {
    let (_, n_val) = val_count(ids.len(), val_fraction)?;
    let mut rng = StdRng::seed_from_u64(seed);

    let mut order: Vec<usize> = (0..ids.len()).collect();
    order.shuffle(&mut rng);

    let val = order[..n_val].iter().map(|&i| ids[i].clone()).collect();
    let train = order[n_val..].iter().map(|&i| ids[i].clone()).collect();
    Ok(Partition { train, val })
}

// ---------------------------------------------------------------------------
// Stratified split
// ---------------------------------------------------------------------------

/// Number of percentile bins for `n` items: `n / 20`, clamped to `[2, 10]`.
pub fn bin_count(n: usize) -> usize {
    (n / 20).clamp(2, 10)
}

/// Percentile of `sorted` with linear interpolation between neighbours.
pub fn percentile(sorted: &[f64], pct: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let rank = pct / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
}

/// Inner bin edges at evenly spaced percentiles (`n_bins - 1` of them).
pub fn bin_edges(values: &[f64], n_bins: usize) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    (1..n_bins)
        .map(|j| percentile(&sorted, 100.0 * j as f64 / n_bins as f64))
        .collect()
}

/// Bin label of `value`: the number of edges that are `<= value`.
pub fn bin_of(value: f64, edges: &[f64]) -> usize {
    edges.partition_point(|&e| e <= value)
}

/// Split so that the distribution of `ratio` matches between partitions.
///
/// `items` pairs each identifier with its statistic (e.g. the fraction of
/// binding residues). Fails when a bin has fewer than two members or a
/// partition would be smaller than the number of occupied bins.
pub fn stratified_split(items: &[(String, f64)], val_fraction: f64, seed: u64) -> Result<Partition> {
    let n = items.len();
    let (n_train, n_val) = val_count(n, val_fraction)?;

    let ratios: Vec<f64> = items.iter().map(|(_, r)| *r).collect();
    let edges = bin_edges(&ratios, bin_count(n));

    let mut bins: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (i, &r) in ratios.iter().enumerate() {
        bins.entry(bin_of(r, &edges)).or_default().push(i);
    }
    let members: Vec<Vec<usize>> = bins.into_values().collect();
    debug!(
        "stratifying {n} items into {} bins (sizes {:?})",
        members.len(),
        members.iter().map(Vec::len).collect::<Vec<_>>()
    );

    let n_classes = members.len();
    if let Some(smallest) = members.iter().map(Vec::len).min() {
        if smallest < 2 {
            return Err(CompileError::InvalidSplit(
                "a stratification bin has a single member".to_string(),
            ));
        }
    }
    if n_train < n_classes || n_val < n_classes {
        return Err(CompileError::InvalidSplit(format!(
            "{n_train} train / {n_val} val items cannot cover {n_classes} bins"
        )));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let class_counts: Vec<usize> = members.iter().map(Vec::len).collect();
    let train_per_class = approximate_mode(&class_counts, n_train, &mut rng);
    let remaining: Vec<usize> = class_counts
        .iter()
        .zip(&train_per_class)
        .map(|(c, t)| c - t)
        .collect();
    let val_per_class = approximate_mode(&remaining, n_val, &mut rng);

    let mut train = Vec::with_capacity(n_train);
    let mut val = Vec::with_capacity(n_val);
    for ((mut idx, n_tr), n_va) in members.into_iter().zip(train_per_class).zip(val_per_class) {
        idx.shuffle(&mut rng);
        train.extend_from_slice(&idx[..n_tr]);
        val.extend_from_slice(&idx[n_tr..n_tr + n_va]);
    }
    train.shuffle(&mut rng);
    val.shuffle(&mut rng);

    Ok(Partition {
        train: train.into_iter().map(|i| items[i].0.clone()).collect(),
        val: val.into_iter().map(|i| items[i].0.clone()).collect(),
    })
}

/// Distribute `n_draws` over classes proportionally to `class_counts`.
///
/// Each class gets the floor of its share; leftover draws go to the classes
/// with the largest fractional remainders, ties broken at random.
fn approximate_mode(class_counts: &[usize], n_draws: usize, rng: &mut StdRng) -> Vec<usize> {
    let total: usize = class_counts.iter().sum();
    if total == 0 {
        return vec![0; class_counts.len()];
    }
    let continuous: Vec<f64> = class_counts
        .iter()
        .map(|&c| c as f64 / total as f64 * n_draws as f64)
        .collect();
    let mut floored: Vec<usize> = continuous.iter().map(|c| c.floor() as usize).collect();
    let mut need = n_draws.saturating_sub(floored.iter().sum());

    let remainders: Vec<f64> = continuous
        .iter()
        .zip(&floored)
        .map(|(c, &f)| c - f as f64)
        .collect();
    let mut levels = remainders.clone();
    levels.sort_by(|a, b| b.total_cmp(a));
    levels.dedup();

    for level in levels {
        if need == 0 {
            break;
        }
        let mut tied: Vec<usize> = (0..remainders.len())
            .filter(|&i| remainders[i] == level && floored[i] < class_counts[i])
            .collect();
        tied.shuffle(rng);
        for &i in tied.iter().take(need) {
            floored[i] += 1;
        }
        need -= tied.len().min(need);
    }
    floored
}
