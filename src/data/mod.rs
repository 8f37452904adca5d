/// Data layer: record model, raw-format parsing, filtering, splitting and
/// serialization shared by every dataset compiler.
///
/// Architecture:
/// ```text
///  .fasta / .csv / score + id files
///        │
///        ▼
///   ┌──────────────────┐
///   │ fasta / loader   │  parse raw files → entries, target indices, scores
///   └──────────────────┘
///        │
///        ▼
///   ┌──────────────────┐
///   │ model            │  RecordBuilder → SequenceRecord, RecordSet
///   └──────────────────┘
///        │
///        ▼
///   ┌──────────────────┐
///   │ filter / split   │  merge, dedup, blacklist, train/val assignment
///   └──────────────────┘
///        │
///        ▼
///   ┌──────────────────┐
///   │ check / writer   │  leakage + invariants → biotrainer FASTA
///   └──────────────────┘
/// ```

pub mod check;
pub mod error;
pub mod fasta;
pub mod filter;
pub mod loader;
pub mod model;
pub mod split;
pub mod writer;
