// Job Runner
// Prepares one environment per toolchain and builds each (os, arch) cell from it

use crate::config::BuildConfig;
use crate::error::{BuildError, BuildResult};
use crate::execution::cancel::CancelSignal;
use crate::execution::events::{EventSender, ExecutionEvent, ProgressSender};
use crate::execution::matrix::{base_environment_ref, BuildCell};
use crate::runners::{Directory, Environment, Session};

use tracing::debug;

/// Environment variable selecting the target operating system
pub const OS_VAR: &str = "GOOS";

/// Environment variable selecting the target architecture
pub const ARCH_VAR: &str = "GOARCH";

/// Output of one built cell, ready for aggregation
#[derive(Debug, Clone)]
pub struct CellOutput {
    pub path: String,
    pub subtree: Directory,
}

/// Runs build cells against a session
pub struct JobRunner<'a> {
    config: &'a BuildConfig,
    events: &'a Option<ProgressSender>,
    cancel: &'a CancelSignal,
}

impl<'a> JobRunner<'a> {
    pub fn new(
        config: &'a BuildConfig,
        events: &'a Option<ProgressSender>,
        cancel: &'a CancelSignal,
    ) -> Self {
        Self {
            config,
            events,
            cancel,
        }
    }

    /// Instantiate the base environment for a toolchain and mount the sources.
    ///
    /// The result is shared by every cell of that toolchain.
    pub async fn prepare<S: Session>(
        &self,
        session: &S,
        toolchain_version: &str,
    ) -> BuildResult<Environment> {
        let reference = base_environment_ref(&self.config.image_template, toolchain_version);
        debug!(toolchain = toolchain_version, image = %reference, "preparing environment");

        let env = session
            .from_base_environment(&reference)
            .await
            .map_err(|source| BuildError::EnvironmentResolution {
                reference: reference.clone(),
                source,
            })?;

        Ok(env
            .with_mounted_directory(&self.config.mount_path, session.host_source_tree())
            .with_workdir(&self.config.mount_path))
    }

    /// Build one cell on a fork of the toolchain environment
    pub async fn run_cell<S: Session>(
        &self,
        session: &S,
        toolchain_env: &Environment,
        cell: &BuildCell,
    ) -> BuildResult<CellOutput> {
        let path = cell.output_path(self.config.output_layout);
        let argv = self.config.build_command_for(&path);

        let build = toolchain_env
            .clone()
            .with_env_variable(OS_VAR, &cell.os)
            .with_env_variable(ARCH_VAR, &cell.arch);

        let executed = tokio::select! {
            result = session.exec(&build, &argv) => {
                result.map_err(|e| BuildError::from_cell(cell, e))?
            }
            _ = self.cancel.cancelled() => {
                return Err(BuildError::Cancelled(cell.to_string()));
            }
        };

        if !executed.stdout.is_empty() {
            self.events
                .send_event(ExecutionEvent::cell_output(cell, executed.stdout, false));
        }
        if !executed.stderr.is_empty() {
            self.events
                .send_event(ExecutionEvent::cell_output(cell, executed.stderr, true));
        }

        let subtree = session
            .subtree(&executed.environment, &path)
            .await
            .map_err(|e| BuildError::from_cell(cell, e))?;

        Ok(CellOutput {
            path,
            subtree,
        })
    }
}
