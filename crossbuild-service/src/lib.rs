// Crossbuild Service Library
// Build-matrix execution engine: expand, build each cell in isolation, export once

pub mod config;
pub mod error;
pub mod execution;
pub mod output;
pub mod runners;

// Re-export commonly used types
pub use config::BuildConfig;
pub use error::{BuildError, BuildResult};

// Re-export execution types
pub use execution::{
    cancel_pair, progress_channel, BuildCell, BuildParameterSet, CancelHandle, CancelSignal,
    ExecutionEvent, MatrixExecutor, MatrixExpander, OutputLayout, ProgressSender, RunSummary,
};

// Re-export output types
pub use output::{Exporter, OutputTree};

// Re-export backend types
pub use runners::{
    Backend, BackendError, Directory, DockerBackend, DockerConfig, Environment, ImagePullPolicy,
    Session,
};
