use std::path::{Path, PathBuf};

use thiserror::Error;

// ---------------------------------------------------------------------------
// CompileError – every way a compilation run can abort
// ---------------------------------------------------------------------------

/// Fatal errors raised while compiling a dataset.
///
/// Nothing in the pipeline recovers from these: a failure means the inputs
/// or the expected constants changed and a human has to look at it.
#[derive(Error, Debug)]
pub enum CompileError {
    /// Input file does not follow the expected layout.
    #[error("malformed input {}:{line}: {message}", path.display())]
    MalformedInput {
        path: PathBuf,
        /// 1-based line number, 0 when the problem is not tied to a line.
        line: usize,
        message: String,
    },

    /// A record-level or dataset-level invariant does not hold.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An expected input file or directory is absent.
    #[error("missing resource: {}", .0.display())]
    MissingResource(PathBuf),

    /// The split engine cannot honour the requested partition.
    #[error("cannot split: {0}")]
    InvalidSplit(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, CompileError>;

impl CompileError {
    pub fn malformed(path: &Path, line: usize, message: impl Into<String>) -> Self {
        CompileError::MalformedInput {
            path: path.to_path_buf(),
            line,
            message: message.into(),
        }
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        CompileError::InvariantViolation(message.into())
    }
}

/// Fail with an [`CompileError::InvariantViolation`] unless `cond` holds.
macro_rules! ensure_invariant {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            return Err($crate::data::error::CompileError::InvariantViolation(format!($($arg)+)));
        }
    };
}
pub(crate) use ensure_invariant;

/// Read a whole file, mapping a missing file to [`CompileError::MissingResource`].
pub fn read_text(path: &Path) -> Result<String> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(text),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(CompileError::MissingResource(path.to_path_buf()))
        }
        Err(e) => Err(e.into()),
    }
}

/// Fail fast when a required input is absent.
pub fn require_exists(path: &Path) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(CompileError::MissingResource(path.to_path_buf()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_missing_resource() {
        let err = read_text(Path::new("/definitely/not/here.fasta")).unwrap_err();
        assert!(matches!(err, CompileError::MissingResource(_)));
        assert!(err.to_string().contains("here.fasta"));
    }

    #[test]
    fn malformed_message_names_file_and_line() {
        let err = CompileError::malformed(Path::new("a.fasta"), 3, "sequence before header");
        assert_eq!(
            err.to_string(),
            "malformed input a.fasta:3: sequence before header"
        );
    }
}
