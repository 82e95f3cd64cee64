use crate::commands::MatrixArgs;
use crate::output;

use clap::Args;
use color_eyre::Result;
use tracing::info;

use crossbuild_service::execution::LogLevel;
use crossbuild_service::{
    cancel_pair, progress_channel, Backend, CancelHandle, DockerBackend, DockerConfig,
    ExecutionEvent, MatrixExecutor,
};

/// Build every matrix cell in a clean container and export the outputs
#[derive(Args, Debug, Default)]
pub struct BuildArgs {
    #[command(flatten)]
    pub matrix: MatrixArgs,
}

pub async fn execute(args: BuildArgs) -> Result<()> {
    let config = args.matrix.resolve()?;

    let backend = DockerBackend::with_config(DockerConfig::from_build_config(&config));
    println!("Building with {}", backend.name());

    let (tx, mut rx) = progress_channel();
    let (cancel, signal) = cancel_pair();
    cancel_on_signal(cancel);

    let executor = MatrixExecutor::new(backend, config)
        .with_progress(tx)
        .with_cancel(signal);

    // Spawn execution in background
    let exec_handle = tokio::spawn(async move { executor.execute().await });

    // Process events in the foreground
    while let Some(event) = rx.recv().await {
        render(&event);
    }

    let summary = exec_handle.await??;
    output::run_succeeded(
        summary.cells.len(),
        summary.exported_paths,
        &summary.destination,
        summary.duration,
    );

    Ok(())
}

fn render(event: &ExecutionEvent) {
    match event {
        ExecutionEvent::RunStarted {
            backend,
            total_cells,
            total_toolchains,
        } => {
            output::header(&format!(
                "Matrix: {} cells across {} toolchains ({})",
                total_cells, total_toolchains, backend
            ));
        }

        ExecutionEvent::ToolchainStarted {
            toolchain_version,
            base_environment,
            total_cells,
        } => {
            output::toolchain_header(toolchain_version, base_environment, *total_cells);
        }

        ExecutionEvent::CellStarted { cell, index, total } => {
            output::cell_started(&cell.os, &cell.arch, *index, *total);
        }

        ExecutionEvent::CellOutput {
            output, is_error, ..
        } => output::cell_output(output, *is_error),

        ExecutionEvent::CellCompleted {
            output_path,
            duration,
            ..
        } => output::cell_completed(output_path, *duration),

        ExecutionEvent::CellFailed {
            cell, duration, ..
        } => output::cell_failed(&cell.to_string(), *duration),

        ExecutionEvent::ExportStarted { destination, paths } => {
            output::export_started(*paths, destination);
        }

        ExecutionEvent::ExportRetry { attempt, message } => {
            output::export_retry(*attempt, message);
        }

        ExecutionEvent::ExportCompleted { duration, .. } => output::export_completed(*duration),

        ExecutionEvent::RunCompleted {
            success,
            cells_built,
            duration,
        } => {
            if !*success {
                output::run_failed(*cells_built, *duration);
            }
        }

        ExecutionEvent::Log { level, message } => match level {
            LogLevel::Warning => output::warning(message),
            LogLevel::Info => output::info(message),
        },
    }
}

/// Cancel the run on the first Ctrl-C or SIGTERM; exit immediately on the second
fn cancel_on_signal(handle: CancelHandle) {
    tokio::spawn(async move {
        let signal = wait_for_signal().await;
        info!("Received {}", signal);
        output::warning("Cancelling build... (press Ctrl+C again to force quit)");
        handle.cancel();

        let signal = wait_for_signal().await;
        info!("Received {} again, exiting", signal);
        output::error("Forced exit; containers may be left behind");
        std::process::exit(FORCED_EXIT_CODE);
    });
}

/// Exit status for a forced quit (128 + SIGINT)
const FORCED_EXIT_CODE: i32 = 130;

async fn wait_for_signal() -> &'static str {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => "SIGINT (Ctrl+C)",
        _ = terminate => "SIGTERM",
    }
}
