//! Compiles raw protein benchmark sources into biotrainer-style annotated
//! FASTA files and checks compiled files before release.

pub mod compile;
pub mod data;
