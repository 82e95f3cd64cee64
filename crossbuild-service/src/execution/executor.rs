// Matrix Executor
// Drives a full run: connect, build every cell in order, export once, release

use crate::config::BuildConfig;
use crate::error::{BuildError, BuildResult};
use crate::execution::cancel::CancelSignal;
use crate::execution::events::{EventSender, ExecutionEvent, ProgressSender};
use crate::execution::matrix::{BuildCell, MatrixExpander};
use crate::execution::runner::JobRunner;
use crate::output::{Exporter, OutputTree};
use crate::runners::{Backend, Session};

use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Result of a successful run
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Cells built, in execution order
    pub cells: Vec<BuildCell>,
    /// Aggregated outputs that were exported
    pub outputs: OutputTree,
    /// Where the outputs were written
    pub destination: PathBuf,
    /// Number of paths written by the export
    pub exported_paths: usize,
    pub duration: Duration,
}

/// Sequential, all-or-nothing matrix executor.
///
/// The first failing cell stops the run: later cells never start and
/// nothing is exported. The backend session is closed on every exit path.
pub struct MatrixExecutor<B: Backend> {
    backend: B,
    config: BuildConfig,
    event_tx: Option<ProgressSender>,
    cancel: CancelSignal,
    export_backoff: Duration,
}

impl<B: Backend> MatrixExecutor<B> {
    pub fn new(backend: B, config: BuildConfig) -> Self {
        Self {
            backend,
            config,
            event_tx: None,
            cancel: CancelSignal::never(),
            export_backoff: Duration::from_millis(500),
        }
    }

    /// Set progress event sender
    pub fn with_progress(mut self, tx: ProgressSender) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// Observe a cancellation signal between and during cells
    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    /// Base delay between export retries (multiplied by the attempt number)
    pub fn with_export_backoff(mut self, backoff: Duration) -> Self {
        self.export_backoff = backoff;
        self
    }

    /// Execute the whole matrix
    pub async fn execute(&self) -> BuildResult<RunSummary> {
        self.config.validate()?;

        let start = Instant::now();
        let params = self.config.parameters();
        let cells = MatrixExpander::expand(&params);

        info!(
            backend = self.backend.name(),
            cells = cells.len(),
            "starting build matrix"
        );
        self.event_tx.send_event(ExecutionEvent::RunStarted {
            backend: self.backend.name().to_string(),
            total_cells: cells.len(),
            total_toolchains: params.toolchain_versions().len(),
        });

        let mut built = 0;
        let result = self.run(cells, &mut built).await;

        if let Err(e) = &result {
            warn!("Build matrix failed: {}", e);
        }
        self.event_tx.send_event(ExecutionEvent::RunCompleted {
            success: result.is_ok(),
            cells_built: built,
            duration: start.elapsed(),
        });

        result.map(|mut summary| {
            summary.duration = start.elapsed();
            summary
        })
    }

    async fn run(&self, cells: Vec<BuildCell>, built: &mut usize) -> BuildResult<RunSummary> {
        let session = self
            .backend
            .connect()
            .await
            .map_err(BuildError::Connection)?;

        let result = self.run_in_session(&session, cells, built).await;

        if let Err(e) = session.close().await {
            warn!("Failed to release {} session: {}", self.backend.name(), e);
            self.event_tx.send_event(ExecutionEvent::warning(format!(
                "Failed to release {} session: {}",
                self.backend.name(),
                e
            )));
        }

        result
    }

    async fn run_in_session(
        &self,
        session: &B::Session,
        cells: Vec<BuildCell>,
        built: &mut usize,
    ) -> BuildResult<RunSummary> {
        let runner = JobRunner::new(&self.config, &self.event_tx, &self.cancel);
        let total = cells.len();
        let mut outputs = session.empty_tree();
        let mut completed = Vec::with_capacity(total);

        for group in MatrixExpander::group_by_toolchain(cells) {
            if self.cancel.is_cancelled() {
                return Err(BuildError::Cancelled(format!(
                    "toolchain {}",
                    group.toolchain_version
                )));
            }

            self.event_tx.send_event(ExecutionEvent::ToolchainStarted {
                toolchain_version: group.toolchain_version.clone(),
                base_environment: crate::execution::matrix::base_environment_ref(
                    &self.config.image_template,
                    &group.toolchain_version,
                ),
                total_cells: group.cells.len(),
            });

            let toolchain_env = runner.prepare(session, &group.toolchain_version).await?;

            for cell in group.cells {
                if self.cancel.is_cancelled() {
                    return Err(BuildError::Cancelled(cell.to_string()));
                }

                let cell_start = Instant::now();
                self.event_tx
                    .send_event(ExecutionEvent::cell_started(&cell, completed.len(), total));

                let output = match runner.run_cell(session, &toolchain_env, &cell).await {
                    Ok(output) => output,
                    Err(e) => {
                        self.event_tx.send_event(ExecutionEvent::CellFailed {
                            cell: cell.clone(),
                            message: e.to_string(),
                            duration: cell_start.elapsed(),
                        });
                        return Err(e);
                    }
                };

                if outputs.contains(&output.path) {
                    self.event_tx.send_event(ExecutionEvent::info(format!(
                        "{} overlays earlier output at {}",
                        cell, output.path
                    )));
                }
                outputs = outputs.with_subtree(output.path.clone(), output.subtree);

                self.event_tx.send_event(ExecutionEvent::CellCompleted {
                    cell: cell.clone(),
                    output_path: output.path,
                    duration: cell_start.elapsed(),
                });
                completed.push(cell);
                *built += 1;
            }
        }

        let exporter = Exporter::new(&self.config.output_destination)
            .with_retries(self.config.export_retries)
            .with_backoff(self.export_backoff);
        let exported_paths = exporter.export(session, &outputs, &self.event_tx).await?;

        Ok(RunSummary {
            cells: completed,
            outputs,
            destination: self.config.output_destination.clone(),
            exported_paths,
            duration: Duration::ZERO,
        })
    }
}
