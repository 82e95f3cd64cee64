// Runners Module
// Execution backends that build cells in isolated environments

pub mod docker;
pub mod environment;

#[cfg(test)]
pub(crate) mod fake;

// Re-export key types
pub use docker::{DockerBackend, DockerConfig, DockerSession, ImagePullPolicy};
pub use environment::{Directory, Environment, Mount};

use crate::output::OutputTree;

use std::path::Path;
use thiserror::Error;

/// Errors reported by an execution backend
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Backend is not available: {0}")]
    Unavailable(String),

    #[error("Base environment '{reference}' is unavailable: {message}")]
    ImageUnavailable { reference: String, message: String },

    #[error("Command failed: {stderr}")]
    ExecFailed {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("Path not found in environment: {0}")]
    PathNotFound(String),

    #[error("Export failed: {0}")]
    ExportFailed(String),

    #[error("Backend command failed: {0}")]
    CommandFailed(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result of running a command inside an environment
#[derive(Debug, Clone)]
pub struct ExecOutput {
    /// Environment reflecting the filesystem after the command
    pub environment: Environment,
    pub stdout: String,
    pub stderr: String,
}

/// An isolated-execution backend
#[async_trait::async_trait]
pub trait Backend: Send + Sync {
    type Session: Session;

    /// Human-readable tool name
    fn name(&self) -> &str;

    /// Open a session; the caller must `close` it when the run ends
    async fn connect(&self) -> Result<Self::Session, BackendError>;
}

/// A connected backend session
#[async_trait::async_trait]
pub trait Session: Send + Sync + Sized {
    /// The local source tree to mount into build environments
    fn host_source_tree(&self) -> Directory;

    /// A fresh accumulator for build outputs
    fn empty_tree(&self) -> OutputTree {
        OutputTree::new()
    }

    /// Instantiate an environment from a named base image
    async fn from_base_environment(&self, reference: &str) -> Result<Environment, BackendError>;

    /// Run a command to completion inside an environment
    async fn exec(&self, env: &Environment, argv: &[String]) -> Result<ExecOutput, BackendError>;

    /// Read the subtree at `path` from an environment's filesystem
    async fn subtree(&self, env: &Environment, path: &str) -> Result<Directory, BackendError>;

    /// Write a tree to the host; returns the number of paths written
    async fn export(&self, tree: &OutputTree, destination: &Path) -> Result<usize, BackendError>;

    /// Release everything the session holds
    async fn close(self) -> Result<(), BackendError>;
}
