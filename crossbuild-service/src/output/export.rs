// Exporter
// Commits the aggregated output tree to the host, once per run

use crate::error::{BuildError, BuildResult};
use crate::execution::events::{EventSender, ExecutionEvent, ProgressSender};
use crate::output::tree::OutputTree;
use crate::runners::Session;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{info, warn};
use walkdir::WalkDir;

/// Writes an output tree through a session, with optional retries
#[derive(Debug, Clone)]
pub struct Exporter {
    destination: PathBuf,
    retries: u32,
    backoff: Duration,
}

impl Exporter {
    pub fn new(destination: impl Into<PathBuf>) -> Self {
        Self {
            destination: destination.into(),
            retries: 0,
            backoff: Duration::from_millis(500),
        }
    }

    /// Additional attempts after a failed export; builds are never re-run
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Export `tree`, returning the number of paths written
    pub async fn export<S: Session>(
        &self,
        session: &S,
        tree: &OutputTree,
        events: &Option<ProgressSender>,
    ) -> BuildResult<usize> {
        let start = Instant::now();
        events.send_event(ExecutionEvent::ExportStarted {
            destination: self.destination.clone(),
            paths: tree.len(),
        });

        let mut attempt = 0;
        loop {
            match session.export(tree, &self.destination).await {
                Ok(written) => {
                    info!(destination = %self.destination.display(), written, "exported build outputs");
                    events.send_event(ExecutionEvent::ExportCompleted {
                        destination: self.destination.clone(),
                        paths: written,
                        duration: start.elapsed(),
                    });
                    return Ok(written);
                }
                Err(e) if attempt < self.retries => {
                    attempt += 1;
                    warn!("Export attempt {} failed: {}", attempt, e);
                    events.send_event(ExecutionEvent::ExportRetry {
                        attempt,
                        message: e.to_string(),
                    });
                    tokio::time::sleep(self.backoff * attempt).await;
                }
                Err(e) => {
                    return Err(BuildError::Export {
                        destination: self.destination.clone(),
                        source: e,
                    })
                }
            }
        }
    }
}

/// Copy every layer of `tree` under `destination`.
///
/// Paths are written in sorted order and each path's layers oldest first, so
/// a file present in several layers ends up with the newest content.
pub fn write_tree(tree: &OutputTree, destination: &Path) -> io::Result<usize> {
    for (path, layers) in tree.iter() {
        let target = destination.join(path);
        fs::create_dir_all(&target)?;

        for layer in layers {
            if let Some(source) = layer.local_path() {
                copy_dir(source, &target)?;
            }
        }
    }

    Ok(tree.len())
}

fn copy_dir(source: &Path, target: &Path) -> io::Result<()> {
    for entry in WalkDir::new(source).min_depth(1) {
        let entry = entry.map_err(io::Error::from)?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        let dest = target.join(relative);

        if entry.file_type().is_symlink() {
            copy_link(entry.path(), &dest)?;
        } else if entry.file_type().is_dir() {
            fs::create_dir_all(&dest)?;
        } else {
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }
            // Don't write through a link left by an earlier layer
            if fs::symlink_metadata(&dest).map_or(false, |m| m.file_type().is_symlink()) {
                fs::remove_file(&dest)?;
            }
            fs::copy(entry.path(), &dest)?;
        }
    }
    Ok(())
}

/// Recreate a symlink as-is; its target is not followed or copied
#[cfg(unix)]
fn copy_link(source: &Path, dest: &Path) -> io::Result<()> {
    let target = fs::read_link(source)?;
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    match fs::symlink_metadata(dest) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(dest)?,
        Ok(_) => fs::remove_file(dest)?,
        Err(_) => {}
    }
    std::os::unix::fs::symlink(target, dest)
}

#[cfg(not(unix))]
fn copy_link(source: &Path, _dest: &Path) -> io::Result<()> {
    warn!("Skipping symlink {}", source.display());
    Ok(())
}
