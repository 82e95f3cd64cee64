// Terminal rendering for build runs and plans

use std::path::Path;
use std::time::Duration;

/// Print a right-aligned action label followed by a message
pub fn status(action: &str, message: &str) {
    eprintln!("\x1b[1;36m{:>12}\x1b[0m {}", action, message);
}

/// Print a section header
pub fn header(message: &str) {
    eprintln!("\x1b[1m==> {}\x1b[0m", message);
}

pub fn info(message: &str) {
    eprintln!("\x1b[36m  i\x1b[0m {}", message);
}

pub fn warning(message: &str) {
    eprintln!("\x1b[33m  !\x1b[0m {}", message);
}

pub fn error(message: &str) {
    eprintln!("\x1b[1;31merror:\x1b[0m {}", message);
}

/// Header for one toolchain's group of cells
pub fn toolchain_header(version: &str, image: &str, total_cells: usize) {
    eprintln!(
        "\x1b[1;34m  Toolchain\x1b[0m {} [{}] ({} cells)",
        version, image, total_cells
    );
}

pub fn cell_started(os: &str, arch: &str, index: usize, total: usize) {
    status("Building", &cell_progress(os, arch, index, total));
}

/// Build command output, indented under its cell; stderr in red
pub fn cell_output(text: &str, is_error: bool) {
    for line in text.lines() {
        if is_error {
            eprintln!("\x1b[31m        | {}\x1b[0m", line);
        } else {
            println!("        | {}", line);
        }
    }
}

pub fn cell_completed(output_path: &str, duration: Duration) {
    eprintln!(
        "\x1b[32m      OK -> {} ({})\x1b[0m",
        output_path,
        seconds(duration)
    );
}

pub fn cell_failed(cell: &str, duration: Duration) {
    eprintln!("\x1b[31m      FAIL {} ({})\x1b[0m", cell, seconds(duration));
}

pub fn export_started(paths: usize, destination: &Path) {
    status(
        "Exporting",
        &format!("{} paths to {}", paths, destination.display()),
    );
}

pub fn export_retry(attempt: u32, message: &str) {
    warning(&format!("Export attempt {} failed: {}", attempt, message));
}

pub fn export_completed(duration: Duration) {
    eprintln!("\x1b[2m      exported in {}\x1b[0m", seconds(duration));
}

pub fn run_succeeded(cells: usize, paths: usize, destination: &Path, duration: Duration) {
    eprintln!(
        "\x1b[1;32m  \u{2713}\x1b[0m {} cells built, {} output paths written to {} in {}",
        cells,
        paths,
        destination.display(),
        seconds(duration)
    );
}

pub fn run_failed(cells_built: usize, duration: Duration) {
    eprintln!(
        "\x1b[1;31m  \u{2717}\x1b[0m Build failed after {} cells in {}",
        cells_built,
        seconds(duration)
    );
}

/// One planned cell: target, output path and the command that produces it
pub fn plan_cell(os: &str, arch: &str, output_path: &str, command: &str) {
    println!("    {:<10} {:<8} -> {}  ({})", os, arch, output_path, command);
}

fn cell_progress(os: &str, arch: &str, index: usize, total: usize) -> String {
    format!("[{}/{}] {}/{}", index + 1, total, os, arch)
}

fn seconds(duration: Duration) -> String {
    format!("{:.2}s", duration.as_secs_f64())
}
