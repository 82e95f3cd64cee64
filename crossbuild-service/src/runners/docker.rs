// Docker Backend
// Runs build cells in throwaway Docker containers through the docker CLI

use crate::config::BuildConfig;
use crate::output::{export, OutputTree};
use crate::runners::environment::{Directory, Environment};
use crate::runners::{Backend, BackendError, ExecOutput, Session};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Output;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Configuration for the Docker backend
#[derive(Debug, Clone)]
pub struct DockerConfig {
    /// Name or path of the docker executable
    pub binary: String,
    /// Host directory exposed as the source tree
    pub source_dir: PathBuf,
    /// Whether to pull images before use
    pub pull_policy: ImagePullPolicy,
    /// Upper bound for a single build command (None = no limit)
    pub exec_timeout: Option<Duration>,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            binary: "docker".to_string(),
            source_dir: PathBuf::from("."),
            pull_policy: ImagePullPolicy::IfNotPresent,
            exec_timeout: None,
        }
    }
}

impl DockerConfig {
    /// Backend settings carried by a build configuration
    pub fn from_build_config(config: &BuildConfig) -> Self {
        Self {
            source_dir: config.source.clone(),
            pull_policy: config.pull_policy,
            exec_timeout: config.exec_timeout(),
            ..Self::default()
        }
    }
}

/// Image pull policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImagePullPolicy {
    /// Always pull the image
    Always,
    /// Pull only if not present locally
    #[default]
    IfNotPresent,
    /// Never pull (must be present locally)
    Never,
}

/// Docker-backed execution backend
pub struct DockerBackend {
    config: DockerConfig,
}

impl DockerBackend {
    pub fn with_config(config: DockerConfig) -> Self {
        Self { config }
    }
}

#[async_trait::async_trait]
impl Backend for DockerBackend {
    type Session = DockerSession;

    fn name(&self) -> &str {
        "Docker"
    }

    async fn connect(&self) -> Result<DockerSession, BackendError> {
        let binary = which::which(&self.config.binary).map_err(|e| {
            BackendError::Unavailable(format!("'{}' not found: {}", self.config.binary, e))
        })?;

        let output = Command::new(&binary)
            .args(["version", "--format", "{{.Server.Version}}"])
            .output()
            .await
            .map_err(|e| BackendError::Unavailable(e.to_string()))?;

        if !output.status.success() {
            return Err(BackendError::Unavailable(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let source_dir = self.config.source_dir.canonicalize().map_err(|e| {
            BackendError::Unavailable(format!(
                "source directory {}: {}",
                self.config.source_dir.display(),
                e
            ))
        })?;
        let scratch = tempfile::Builder::new().prefix("crossbuild-").tempdir()?;

        info!(server = %version, scratch = %scratch.path().display(), "connected to docker");

        Ok(DockerSession {
            binary,
            config: self.config.clone(),
            source_dir,
            scratch,
            session_id: session_id(),
            counter: AtomicUsize::new(0),
            containers: Mutex::new(Vec::new()),
            images: Mutex::new(Vec::new()),
        })
    }
}

/// An open Docker session.
///
/// Tracks every container and committed image it creates so `close` can
/// remove them; staged subtrees live in a scratch directory dropped with it.
pub struct DockerSession {
    binary: PathBuf,
    config: DockerConfig,
    source_dir: PathBuf,
    scratch: TempDir,
    session_id: String,
    counter: AtomicUsize,
    containers: Mutex<Vec<String>>,
    images: Mutex<Vec<String>>,
}

impl DockerSession {
    fn next_id(&self) -> usize {
        self.counter.fetch_add(1, Ordering::Relaxed)
    }

    /// Run a docker subcommand to completion
    async fn docker(&self, args: &[String]) -> Result<Output, BackendError> {
        debug!(command = %args.join(" "), "docker");
        Command::new(&self.binary)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| BackendError::Unavailable(e.to_string()))
    }

    async fn docker_checked(&self, args: &[String]) -> Result<Output, BackendError> {
        let output = self.docker(args).await?;
        if !output.status.success() {
            return Err(BackendError::CommandFailed(format!(
                "docker {}: {}",
                args.first().map(String::as_str).unwrap_or_default(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(output)
    }

    async fn image_present(&self, image: &str) -> Result<bool, BackendError> {
        let output = self
            .docker(&to_args(["image", "inspect", "--format", "{{.Id}}", image]))
            .await?;
        Ok(output.status.success())
    }

    async fn pull_image(&self, image: &str) -> Result<(), BackendError> {
        info!(image, "pulling image");
        let output = self.docker(&to_args(["pull", image])).await?;

        if !output.status.success() {
            return Err(BackendError::ImageUnavailable {
                reference: image.to_string(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(())
    }

    /// Commit a finished container so the next command in the chain starts from it
    async fn commit(&self, container: &str) -> Result<String, BackendError> {
        let output = self.docker_checked(&to_args(["commit", container])).await?;
        let image = String::from_utf8_lossy(&output.stdout).trim().to_string();
        lock(&self.images).push(image.clone());
        Ok(image)
    }

    /// Create a container for `env` with its mounts copied in, without starting it
    async fn materialize(&self, env: &Environment, argv: &[String]) -> Result<String, BackendError> {
        let image = match env.snapshot() {
            Some(container) => self.commit(container).await?,
            None => env.base().to_string(),
        };

        let name = format!("crossbuild-{}-{}", self.session_id, self.next_id());
        self.docker_checked(&create_args(&name, env, &image, argv))
            .await?;
        lock(&self.containers).push(name.clone());

        for mount in env.mounts() {
            if let Some(source) = mount.source.local_path() {
                let from = format!("{}/.", source.display());
                let to = format!("{}:{}", name, mount.path);
                self.docker_checked(&to_args(["cp", from.as_str(), to.as_str()]))
                    .await?;
            }
        }

        Ok(name)
    }
}

#[async_trait::async_trait]
impl Session for DockerSession {
    fn host_source_tree(&self) -> Directory {
        Directory::Host(self.source_dir.clone())
    }

    async fn from_base_environment(&self, reference: &str) -> Result<Environment, BackendError> {
        match self.config.pull_policy {
            ImagePullPolicy::Never => {
                if !self.image_present(reference).await? {
                    return Err(BackendError::ImageUnavailable {
                        reference: reference.to_string(),
                        message: "not present locally and pulling is disabled".to_string(),
                    });
                }
            }
            ImagePullPolicy::Always => self.pull_image(reference).await?,
            ImagePullPolicy::IfNotPresent => {
                if !self.image_present(reference).await? {
                    self.pull_image(reference).await?;
                }
            }
        }

        Ok(Environment::from_base(reference))
    }

    async fn exec(&self, env: &Environment, argv: &[String]) -> Result<ExecOutput, BackendError> {
        let container = self.materialize(env, argv).await?;

        debug!(container = %container, argv = %argv.join(" "), "starting build");
        let run = Command::new(&self.binary)
            .args(["start", "-a", container.as_str()])
            .kill_on_drop(true)
            .output();

        let output = match self.config.exec_timeout {
            Some(limit) => match tokio::time::timeout(limit, run).await {
                Ok(output) => output,
                Err(_) => {
                    return Err(BackendError::ExecFailed {
                        exit_code: None,
                        stderr: format!("Command timed out after {:?}", limit),
                    })
                }
            },
            None => run.await,
        }
        .map_err(|e| BackendError::Unavailable(e.to_string()))?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !output.status.success() {
            return Err(BackendError::ExecFailed {
                exit_code: output.status.code(),
                stderr,
            });
        }

        Ok(ExecOutput {
            environment: env.clone().with_snapshot(container),
            stdout,
            stderr,
        })
    }

    async fn subtree(&self, env: &Environment, path: &str) -> Result<Directory, BackendError> {
        let container = match env.snapshot() {
            Some(container) => container.to_string(),
            None => self.materialize(env, &[]).await?,
        };

        let source = env.resolve_path(path);
        let target = self.scratch.path().join(format!("subtree-{}", self.next_id()));
        let from = format!("{}:{}/.", container, source.trim_end_matches('/'));
        let to = target.display().to_string();

        let output = self.docker(&to_args(["cp", from.as_str(), to.as_str()])).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if is_missing_path(&stderr) {
                return Err(BackendError::PathNotFound(path.to_string()));
            }
            return Err(BackendError::CommandFailed(format!(
                "docker cp: {}",
                stderr.trim()
            )));
        }

        Ok(Directory::Staged(target))
    }

    async fn export(&self, tree: &OutputTree, destination: &Path) -> Result<usize, BackendError> {
        let tree = tree.clone();
        let destination = destination.to_path_buf();

        tokio::task::spawn_blocking(move || export::write_tree(&tree, &destination))
            .await
            .map_err(|e| BackendError::ExportFailed(e.to_string()))?
            .map_err(|e| BackendError::ExportFailed(e.to_string()))
    }

    async fn close(self) -> Result<(), BackendError> {
        let containers = std::mem::take(&mut *lock(&self.containers));
        let images = std::mem::take(&mut *lock(&self.images));

        if !containers.is_empty() {
            let mut args = to_args(["rm", "-f"]);
            args.extend(containers);
            if let Err(e) = self.docker_checked(&args).await {
                warn!("Failed to remove build containers: {}", e);
            }
        }

        if !images.is_empty() {
            let mut args = to_args(["rmi", "-f"]);
            args.extend(images);
            if let Err(e) = self.docker_checked(&args).await {
                warn!("Failed to remove intermediate images: {}", e);
            }
        }

        debug!(scratch = %self.scratch.path().display(), "closing docker session");
        self.scratch.close()?;
        Ok(())
    }
}

/// Arguments for `docker create` realising an environment
fn create_args(name: &str, env: &Environment, image: &str, argv: &[String]) -> Vec<String> {
    let mut args = to_args(["create", "--name", name]);

    if let Some(workdir) = env.workdir() {
        args.push("-w".to_string());
        args.push(workdir.to_string());
    }

    for (key, value) in env.env_vars() {
        args.push("-e".to_string());
        args.push(format!("{}={}", key, value));
    }

    args.push(image.to_string());
    args.extend(argv.iter().cloned());
    args
}

fn is_missing_path(stderr: &str) -> bool {
    stderr.contains("Could not find the file") || stderr.contains("No such container:path")
}

fn to_args<const N: usize>(args: [&str; N]) -> Vec<String> {
    args.iter().map(|a| a.to_string()).collect()
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Generate a short id (8 hex chars) to keep container names unique per session
fn session_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let duration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let nanos = duration.as_nanos();
    format!("{:08x}", (nanos as u32) ^ std::process::id())
}
