// Build Errors
// Error taxonomy for a matrix run; every variant aborts the whole run

use crate::execution::matrix::BuildCell;
use crate::runners::BackendError;

use std::path::PathBuf;
use thiserror::Error;

pub type BuildResult<T> = Result<T, BuildError>;

/// Errors that end a build run
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Cannot connect to execution backend: {0}")]
    Connection(#[source] BackendError),

    #[error("Cannot resolve base environment '{reference}': {source}")]
    EnvironmentResolution {
        reference: String,
        #[source]
        source: BackendError,
    },

    #[error("Build failed for {cell}{}: {stderr}", exit_suffix(.exit_code))]
    BuildExecution {
        cell: BuildCell,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("Build for {cell} did not produce '{path}'")]
    PathNotFound { cell: BuildCell, path: String },

    #[error("Failed to export build outputs to {}: {source}", .destination.display())]
    Export {
        destination: PathBuf,
        #[source]
        source: BackendError,
    },

    #[error("Build cancelled at {0}")]
    Cancelled(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Backend error while building {cell}: {source}")]
    Backend {
        cell: BuildCell,
        #[source]
        source: BackendError,
    },
}

fn exit_suffix(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!(" (exit code {})", code),
        None => String::new(),
    }
}

impl BuildError {
    /// Attach cell context to a backend failure raised while building that cell
    pub fn from_cell(cell: &BuildCell, err: BackendError) -> Self {
        match err {
            BackendError::ExecFailed { exit_code, stderr } => BuildError::BuildExecution {
                cell: cell.clone(),
                exit_code,
                stderr,
            },
            BackendError::PathNotFound(path) => BuildError::PathNotFound {
                cell: cell.clone(),
                path,
            },
            other => BuildError::Backend {
                cell: cell.clone(),
                source: other,
            },
        }
    }

    /// The cell the error belongs to, if it was raised while building one
    pub fn cell(&self) -> Option<&BuildCell> {
        match self {
            BuildError::BuildExecution { cell, .. }
            | BuildError::PathNotFound { cell, .. }
            | BuildError::Backend { cell, .. } => Some(cell),
            _ => None,
        }
    }
}
