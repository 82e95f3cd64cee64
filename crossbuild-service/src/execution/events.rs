// Execution Events
// Progress reporting and event types for matrix runs

use crate::execution::matrix::BuildCell;

use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;

/// Sender for execution progress events
pub type ProgressSender = mpsc::UnboundedSender<ExecutionEvent>;

/// Receiver for execution progress events
pub type ProgressReceiver = mpsc::UnboundedReceiver<ExecutionEvent>;

/// Create a new progress channel
pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    mpsc::unbounded_channel()
}

/// Events emitted during a matrix run
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    /// Run started; emitted before the backend is contacted
    RunStarted {
        backend: String,
        total_cells: usize,
        total_toolchains: usize,
    },

    /// Run finished, successfully or not
    RunCompleted {
        success: bool,
        cells_built: usize,
        duration: Duration,
    },

    /// Environment for a toolchain version is being prepared
    ToolchainStarted {
        toolchain_version: String,
        base_environment: String,
        total_cells: usize,
    },

    /// Cell build started
    CellStarted {
        cell: BuildCell,
        index: usize,
        total: usize,
    },

    /// Output captured from a cell's build command
    CellOutput {
        cell: BuildCell,
        output: String,
        is_error: bool,
    },

    /// Cell built and its output collected
    CellCompleted {
        cell: BuildCell,
        output_path: String,
        duration: Duration,
    },

    /// Cell failed; the run stops here
    CellFailed {
        cell: BuildCell,
        message: String,
        duration: Duration,
    },

    /// Export of the aggregated tree started
    ExportStarted { destination: PathBuf, paths: usize },

    /// Export attempt failed and will be retried
    ExportRetry { attempt: u32, message: String },

    /// Export finished
    ExportCompleted {
        destination: PathBuf,
        paths: usize,
        duration: Duration,
    },

    /// Log message (info, warning)
    Log { level: LogLevel, message: String },
}

/// Log level for log events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warning,
}

impl ExecutionEvent {
    /// Create a cell started event
    pub fn cell_started(cell: &BuildCell, index: usize, total: usize) -> Self {
        Self::CellStarted {
            cell: cell.clone(),
            index,
            total,
        }
    }

    /// Create a cell output event
    pub fn cell_output(cell: &BuildCell, output: impl Into<String>, is_error: bool) -> Self {
        Self::CellOutput {
            cell: cell.clone(),
            output: output.into(),
            is_error,
        }
    }

    /// Create an info log event
    pub fn info(message: impl Into<String>) -> Self {
        Self::Log {
            level: LogLevel::Info,
            message: message.into(),
        }
    }

    /// Create a warning log event
    pub fn warning(message: impl Into<String>) -> Self {
        Self::Log {
            level: LogLevel::Warning,
            message: message.into(),
        }
    }
}

/// Helper trait for sending events, ignoring errors (fire-and-forget)
pub trait EventSender {
    fn send_event(&self, event: ExecutionEvent);
}

impl EventSender for ProgressSender {
    fn send_event(&self, event: ExecutionEvent) {
        let _ = self.send(event);
    }
}

impl EventSender for Option<ProgressSender> {
    fn send_event(&self, event: ExecutionEvent) {
        if let Some(sender) = self {
            let _ = sender.send(event);
        }
    }
}
