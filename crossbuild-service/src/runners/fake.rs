// Fake Backend
// In-process backend for tests: stages real files, records every call

use crate::output::{export, OutputTree};
use crate::runners::environment::{Directory, Environment};
use crate::runners::{Backend, BackendError, ExecOutput, Session};

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Counters and call log shared between a fake backend and the test
#[derive(Debug, Default)]
pub struct FakeState {
    pub connects: AtomicUsize,
    pub closes: AtomicUsize,
    pub exports: AtomicUsize,
    resolved: Mutex<Vec<String>>,
    execs: Mutex<Vec<String>>,
    export_failures: AtomicUsize,
    staged: AtomicUsize,
}

impl FakeState {
    /// Base environment references resolved, in order
    pub fn resolved(&self) -> Vec<String> {
        self.resolved.lock().unwrap().clone()
    }

    /// One entry per exec: `<base> <workdir> <KEY=VALUE...>`
    pub fn execs(&self) -> Vec<String> {
        self.execs.lock().unwrap().clone()
    }
}

pub struct FakeBackend {
    state: Arc<FakeState>,
    scratch: Arc<TempDir>,
    refuse_connections: bool,
    unknown_images: Vec<String>,
    failing_cells: Vec<String>,
    cells_without_output: Vec<String>,
    exec_delay: Option<Duration>,
    fail_close: bool,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            state: Arc::new(FakeState::default()),
            scratch: Arc::new(tempfile::tempdir().unwrap()),
            refuse_connections: false,
            unknown_images: Vec::new(),
            failing_cells: Vec::new(),
            cells_without_output: Vec::new(),
            exec_delay: None,
            fail_close: false,
        }
    }

    pub fn state(&self) -> Arc<FakeState> {
        Arc::clone(&self.state)
    }

    pub fn refuse_connections(mut self) -> Self {
        self.refuse_connections = true;
        self
    }

    pub fn unknown_image(mut self, reference: &str) -> Self {
        self.unknown_images.push(reference.to_string());
        self
    }

    /// Make the build command fail for a cell (`<version>/<os>/<arch>`)
    pub fn fail_exec(mut self, cell: &str) -> Self {
        self.failing_cells.push(cell.to_string());
        self
    }

    /// Build succeeds for a cell but leaves no output directory behind
    pub fn without_output(mut self, cell: &str) -> Self {
        self.cells_without_output.push(cell.to_string());
        self
    }

    /// Fail the first `count` export attempts
    pub fn fail_exports(self, count: usize) -> Self {
        self.state.export_failures.store(count, Ordering::SeqCst);
        self
    }

    pub fn with_exec_delay(mut self, delay: Duration) -> Self {
        self.exec_delay = Some(delay);
        self
    }

    /// Count the close but report it as failed
    pub fn fail_close(mut self) -> Self {
        self.fail_close = true;
        self
    }
}

#[async_trait::async_trait]
impl Backend for FakeBackend {
    type Session = FakeSession;

    fn name(&self) -> &str {
        "Fake"
    }

    async fn connect(&self) -> Result<FakeSession, BackendError> {
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        if self.refuse_connections {
            return Err(BackendError::Unavailable("connection refused".to_string()));
        }

        Ok(FakeSession {
            state: Arc::clone(&self.state),
            scratch: Arc::clone(&self.scratch),
            unknown_images: self.unknown_images.clone(),
            failing_cells: self.failing_cells.clone(),
            cells_without_output: self.cells_without_output.clone(),
            exec_delay: self.exec_delay,
            fail_close: self.fail_close,
        })
    }
}

pub struct FakeSession {
    state: Arc<FakeState>,
    scratch: Arc<TempDir>,
    unknown_images: Vec<String>,
    failing_cells: Vec<String>,
    cells_without_output: Vec<String>,
    exec_delay: Option<Duration>,
    fail_close: bool,
}

/// `golang:1.19.2` + GOOS/GOARCH -> `1.19.2/linux/amd64`
fn cell_label(env: &Environment) -> String {
    let version = env.base().rsplit(':').next().unwrap_or_default();
    format!(
        "{}/{}/{}",
        version,
        env.env_var("GOOS").unwrap_or_default(),
        env.env_var("GOARCH").unwrap_or_default()
    )
}

#[async_trait::async_trait]
impl Session for FakeSession {
    fn host_source_tree(&self) -> Directory {
        Directory::Host(PathBuf::from("/fake/source"))
    }

    async fn from_base_environment(&self, reference: &str) -> Result<Environment, BackendError> {
        self.state
            .resolved
            .lock()
            .unwrap()
            .push(reference.to_string());

        if self.unknown_images.iter().any(|i| i == reference) {
            return Err(BackendError::ImageUnavailable {
                reference: reference.to_string(),
                message: "manifest unknown".to_string(),
            });
        }
        Ok(Environment::from_base(reference))
    }

    async fn exec(&self, env: &Environment, argv: &[String]) -> Result<ExecOutput, BackendError> {
        let mut entry = vec![
            env.base().to_string(),
            env.workdir().unwrap_or_default().to_string(),
        ];
        entry.extend(env.env_vars().iter().map(|(k, v)| format!("{}={}", k, v)));
        self.state.execs.lock().unwrap().push(entry.join(" "));

        if let Some(delay) = self.exec_delay {
            tokio::time::sleep(delay).await;
        }

        let label = cell_label(env);
        if self.failing_cells.contains(&label) {
            return Err(BackendError::ExecFailed {
                exit_code: Some(1),
                stderr: format!("compile error in {}", label),
            });
        }

        Ok(ExecOutput {
            environment: env.clone().with_snapshot(label),
            stdout: argv.join(" "),
            stderr: String::new(),
        })
    }

    async fn subtree(&self, env: &Environment, path: &str) -> Result<Directory, BackendError> {
        let label = env
            .snapshot()
            .ok_or_else(|| BackendError::PathNotFound(path.to_string()))?;
        if self.cells_without_output.iter().any(|c| c == label) {
            return Err(BackendError::PathNotFound(path.to_string()));
        }

        let n = self.state.staged.fetch_add(1, Ordering::SeqCst);
        let dir = self.scratch.path().join(format!("subtree-{}", n));
        fs::create_dir_all(&dir)?;

        let version = env.base().rsplit(':').next().unwrap_or_default();
        let os_arch = label.split_once('/').map(|(_, rest)| rest).unwrap_or_default();
        fs::write(dir.join("app"), format!("{} {}", env.base(), os_arch))?;
        fs::write(dir.join(format!("built-with-{}", version)), "")?;

        Ok(Directory::Staged(dir))
    }

    async fn export(&self, tree: &OutputTree, destination: &Path) -> Result<usize, BackendError> {
        self.state.exports.fetch_add(1, Ordering::SeqCst);

        let remaining = self.state.export_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.state
                .export_failures
                .store(remaining - 1, Ordering::SeqCst);
            return Err(BackendError::ExportFailed("disk full".to_string()));
        }

        export::write_tree(tree, destination).map_err(|e| BackendError::ExportFailed(e.to_string()))
    }

    async fn close(self) -> Result<(), BackendError> {
        self.state.closes.fetch_add(1, Ordering::SeqCst);
        if self.fail_close {
            return Err(BackendError::CommandFailed("rm: container busy".to_string()));
        }
        Ok(())
    }
}
