// Execution Engine Module
// Matrix expansion, per-cell job running, cancellation and run orchestration

pub mod cancel;
pub mod events;
pub mod executor;
pub mod matrix;
pub mod runner;

// Re-export key types
pub use cancel::{cancel_pair, CancelHandle, CancelSignal};
pub use events::{progress_channel, EventSender, ExecutionEvent, LogLevel, ProgressSender};
pub use executor::{MatrixExecutor, RunSummary};
pub use matrix::{BuildCell, BuildParameterSet, MatrixExpander, OutputLayout, ToolchainGroup};
pub use runner::{CellOutput, JobRunner};
