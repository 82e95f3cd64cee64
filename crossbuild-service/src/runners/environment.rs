// Build Environments
// Immutable environment and directory handles threaded through backend calls

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Handle to a filesystem tree known to a backend session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directory {
    /// A directory on the host, referenced in place and never written
    Host(PathBuf),
    /// A copy staged by the session (for example, a subtree pulled out of a container)
    Staged(PathBuf),
    /// A tree with no entries
    Empty,
}

impl Directory {
    /// Local path holding the tree contents, if it has any
    pub fn local_path(&self) -> Option<&Path> {
        match self {
            Directory::Host(path) | Directory::Staged(path) => Some(path),
            Directory::Empty => None,
        }
    }
}

/// A directory mounted into an environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    pub path: String,
    pub source: Directory,
}

/// Configuration of an isolated build environment.
///
/// Each `with_*` call consumes the handle and returns a new one with one more
/// setting layered on. Cloning forks the chain, so two cells built from the
/// same toolchain environment never see each other's variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    base: String,
    mounts: Vec<Mount>,
    workdir: Option<String>,
    env: BTreeMap<String, String>,
    snapshot: Option<String>,
}

impl Environment {
    /// Start a chain from a resolved base environment reference
    pub fn from_base(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            mounts: Vec::new(),
            workdir: None,
            env: BTreeMap::new(),
            snapshot: None,
        }
    }

    pub fn with_mounted_directory(mut self, path: impl Into<String>, source: Directory) -> Self {
        let path = path.into();
        self.mounts.retain(|m| m.path != path);
        self.mounts.push(Mount { path, source });
        self
    }

    pub fn with_workdir(mut self, path: impl Into<String>) -> Self {
        self.workdir = Some(path.into());
        self
    }

    pub fn with_env_variable(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Record the filesystem state left behind by an exec.
    ///
    /// Backends call this so later calls in the chain (another exec, or a
    /// subtree read) start from the result of the previous command.
    pub fn with_snapshot(mut self, snapshot: impl Into<String>) -> Self {
        self.snapshot = Some(snapshot.into());
        self
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn mounts(&self) -> &[Mount] {
        &self.mounts
    }

    pub fn workdir(&self) -> Option<&str> {
        self.workdir.as_deref()
    }

    pub fn env_vars(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    pub fn env_var(&self, key: &str) -> Option<&str> {
        self.env.get(key).map(String::as_str)
    }

    pub fn snapshot(&self) -> Option<&str> {
        self.snapshot.as_deref()
    }

    /// Resolve a path against the working directory
    pub fn resolve_path(&self, path: &str) -> String {
        if path.starts_with('/') {
            return path.to_string();
        }
        match &self.workdir {
            Some(workdir) => format!("{}/{}", workdir.trim_end_matches('/'), path),
            None => format!("/{}", path),
        }
    }
}
