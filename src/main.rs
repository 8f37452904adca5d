//! `pbc-compile`: one subcommand per benchmark dataset plus `check`.

use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::{Args, Parser, Subcommand};
use log::{error, info};

use pbc_compiler::compile::binding::{self, BindingConfig, BindingExpectations};
use pbc_compiler::compile::disorder::{self, DisorderConfig, DisorderExpectations};
use pbc_compiler::compile::membrane::{self, MembraneConfig, MembraneExpectations};
use pbc_compiler::compile::secondary_structure::{
    self, SecondaryStructureConfig, SecondaryStructureExpectations,
};
use pbc_compiler::compile::{RELEASE_DATASETS, SplitOptions, load_expectations, scl};
use pbc_compiler::data::check::{KNOWN_TEST_SETS, check_file};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// The random seed for train/val splits.
    #[arg(short('s'), long, default_value_t = 42, global = true)]
    seed: u64,

    #[command(subcommand)]
    command: Command,
}

/// Regression counts of the dataset snapshot.
#[derive(Args, Debug)]
struct CountChecks {
    /// JSON file overriding the expected record counts.
    #[arg(long)]
    expectations: Option<PathBuf>,

    /// Skip expected-count checks; structural checks still run.
    #[arg(long, default_value_t = false)]
    skip_count_checks: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Metal, nuclear, small-molecule and combined binding sites
    Binding {
        #[arg(long, default_value = "supervised/binding/dataset_compilation/data")]
        data_dir: PathBuf,

        /// Directory receiving the four binding_*.fasta files.
        #[arg(long, default_value = "supervised/binding")]
        out_dir: PathBuf,

        #[arg(long, default_value_t = 0.1)]
        val_fraction: f64,

        /// Development ids removed for ambiguous annotations.
        #[arg(long, value_delimiter = ',', default_values_t = binding::AMBIGUOUS_IDS.map(String::from))]
        ambiguous_ids: Vec<String>,

        #[command(flatten)]
        counts: CountChecks,
    },
    /// CheZOD per-residue disorder scores
    Disorder {
        #[arg(long, default_value = "supervised/disorder/dataset_compilation")]
        data_dir: PathBuf,

        #[arg(long, default_value = "supervised/disorder/disorder.fasta")]
        out: PathBuf,

        #[arg(long, default_value_t = 0.1)]
        val_fraction: f64,

        #[command(flatten)]
        counts: CountChecks,
    },
    /// Membrane topology from cross-validation folds
    Membrane {
        #[arg(long, default_value = "supervised/membrane/dataset_compilation/data")]
        data_dir: PathBuf,

        #[arg(long, default_value = "supervised/membrane/membrane.fasta")]
        out: PathBuf,

        #[arg(long, default_value_t = 0.1)]
        val_fraction: f64,

        #[command(flatten)]
        counts: CountChecks,
    },
    /// Subcellular localisation (FLIP mixed_hard with DeepLoc ids)
    Scl {
        #[arg(long, default_value = "supervised/scl/dataset_compilation")]
        data_dir: PathBuf,

        #[arg(long, default_value = "supervised/scl/scl.fasta")]
        out: PathBuf,
    },
    /// Secondary structure with newPISCES364 and CASP12-14 test sets
    SecondaryStructure {
        #[arg(long, default_value = "supervised/secondary_structure/dataset_compilation")]
        data_dir: PathBuf,

        #[arg(long, default_value = "supervised/secondary_structure/secondary_structure.fasta")]
        out: PathBuf,

        #[command(flatten)]
        counts: CountChecks,
    },
    /// Sanity-check compiled datasets before packaging
    Check {
        /// Files to check; defaults to every dataset of a release.
        paths: Vec<PathBuf>,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    info!("{cli:?}");

    match cli.command {
        Command::Binding {
            data_dir,
            out_dir,
            val_fraction,
            ambiguous_ids,
            counts,
        } => {
            let config = BindingConfig {
                ambiguous_ids,
                split: SplitOptions {
                    val_fraction,
                    seed: cli.seed,
                },
                expectations: load_expectations::<BindingExpectations>(
                    counts.expectations.as_deref(),
                    counts.skip_count_checks,
                )?,
                ..BindingConfig::new(data_dir, out_dir)
            };
            println!("{}", binding::compile(&config)?);
        }
        Command::Disorder {
            data_dir,
            out,
            val_fraction,
            counts,
        } => {
            let config = DisorderConfig {
                data_dir,
                out,
                split: SplitOptions {
                    val_fraction,
                    seed: cli.seed,
                },
                expectations: load_expectations::<DisorderExpectations>(
                    counts.expectations.as_deref(),
                    counts.skip_count_checks,
                )?,
            };
            println!("{}", disorder::compile(&config)?);
        }
        Command::Membrane {
            data_dir,
            out,
            val_fraction,
            counts,
        } => {
            let config = MembraneConfig {
                data_dir,
                out,
                split: SplitOptions {
                    val_fraction,
                    seed: cli.seed,
                },
                expectations: load_expectations::<MembraneExpectations>(
                    counts.expectations.as_deref(),
                    counts.skip_count_checks,
                )?,
            };
            println!("{}", membrane::compile(&config)?);
        }
        Command::Scl { data_dir, out } => {
            println!("{}", scl::compile(&scl::SclConfig { data_dir, out })?);
        }
        Command::SecondaryStructure {
            data_dir,
            out,
            counts,
        } => {
            let config = SecondaryStructureConfig {
                data_dir,
                out,
                expectations: load_expectations::<SecondaryStructureExpectations>(
                    counts.expectations.as_deref(),
                    counts.skip_count_checks,
                )?,
            };
            println!("{}", secondary_structure::compile(&config)?);
        }
        Command::Check { paths } => {
            let paths = if paths.is_empty() {
                RELEASE_DATASETS.into_iter().map(PathBuf::from).collect()
            } else {
                paths
            };
            let mut failed = 0;
            for path in &paths {
                match check_file(path, &KNOWN_TEST_SETS) {
                    Ok(summary) => println!("{}: OK ({} records)", path.display(), summary.records),
                    Err(e) => {
                        error!("{}: {e}", path.display());
                        println!("{}: FAILED: {e}", path.display());
                        failed += 1;
                    }
                }
            }
            if failed > 0 {
                bail!("{failed} of {} datasets failed the sanity check", paths.len());
            }
            println!("All sanity checks passed!");
        }
    }
    Ok(())
}
