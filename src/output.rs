//! CLI progress formatting for the tiling pipeline.
//!
//! # Two Volumes
//!
//! Normal output is level-centric: one line when a zoom level starts, then a
//! tick whenever completed tiles cross a 10% boundary. A 4096-tile level
//! prints eleven lines instead of four thousand:
//!
//! ```text
//! Zoom 7: 4096 tiles
//!     10% (410/4096)
//!     20% (820/4096)
//!     ...
//! ```
//!
//! Verbose output (`-v`) trades the ticks for one line per tile, carrying
//! the tile's store-relative name so a run can be replayed against the
//! output directory:
//!
//! ```text
//! Zoom 7: 4096 tiles
//!     1/4096 7/0/127.png
//!     2/4096 7/1/127.png (skipped)
//! ```
//!
//! # Architecture
//!
//! Format functions are pure (return `Vec<String>`, no I/O) and print
//! wrappers write to stdout. Generation publishes [`ProgressEvent`]s over
//! `std::sync::mpsc`; `main` drains them on a printer thread so tile
//! workers never block on the terminal.

use crate::generate::{ProgressEvent, RunStats};

// ============================================================================
// Progress events
// ============================================================================

/// Format one progress event as display lines.
///
/// Level starts always produce a line. Tile completions produce a line per
/// tile when `verbose`, otherwise only when they cross a decile of the
/// level's total.
pub fn format_progress_event(event: &ProgressEvent, verbose: bool) -> Vec<String> {
    match event {
        ProgressEvent::LevelStarted {
            zoom,
            tiles,
            overview,
        } => {
            let kind = if *overview { " overview" } else { "" };
            vec![format!("Zoom {}: {}{} tiles", zoom, tiles, kind)]
        }
        ProgressEvent::TileFinished {
            index,
            total,
            name,
            skipped,
        } => {
            if verbose {
                let marker = if *skipped { " (skipped)" } else { "" };
                vec![format!("    {}/{} {}{}", index, total, name, marker)]
            } else if decile_crossed(*index, *total) {
                vec![format!("    {}% ({}/{})", index * 100 / total, index, total)]
            } else {
                Vec::new()
            }
        }
    }
}

/// Print one progress event to stdout.
pub fn print_progress_event(event: &ProgressEvent, verbose: bool) {
    for line in format_progress_event(event, verbose) {
        println!("{}", line);
    }
}

/// True when `index` completions land in a later decile than `index - 1`.
fn decile_crossed(index: u64, total: u64) -> bool {
    if total == 0 || index == 0 {
        return false;
    }
    index * 10 / total != (index - 1) * 10 / total
}

// ============================================================================
// Run summary
// ============================================================================

/// Format the end-of-run summary from both generation passes.
pub fn format_run_summary(base: RunStats, overview: RunStats, cancelled: bool) -> Vec<String> {
    let mut lines = Vec::new();
    if cancelled {
        lines.push("Cancelled; tiles finished so far were kept.".to_string());
    }
    lines.push(format!("Base tiles:     {}", base));
    lines.push(format!("Overview tiles: {}", overview));
    lines.push(format!("Total:          {}", base + overview));
    lines
}

/// Print the end-of-run summary to stdout.
pub fn print_run_summary(base: RunStats, overview: RunStats, cancelled: bool) {
    for line in format_run_summary(base, overview, cancelled) {
        println!("{}", line);
    }
}
