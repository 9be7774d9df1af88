pub mod completions;
pub mod discard;
pub mod move_cmd;
pub mod remove;
pub mod show;
pub mod stats;

use std::io::{self, Write};

use lanes_core::board::{Board, BucketPos};
use lanes_core::error::ReorderError;
use lanes_core::reconcile::DropReport;

use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};

/// Current position of `issue_id` on the board.
pub(crate) fn locate(board: &Board, issue_id: &str) -> Result<BucketPos, ReorderError> {
    board
        .collection()
        .locate(issue_id)
        .map(|l| BucketPos::new(l.bucket, l.index))
        .ok_or_else(|| ReorderError::IssueNotFound(issue_id.to_string()))
}

/// Render the outcome of a drop or removal. A rolled-back write is an
/// error for the caller's exit status.
pub(crate) fn finish(report: &DropReport, output: OutputMode) -> anyhow::Result<()> {
    render_mode(output, report, write_report_text, write_report_pretty)?;
    if let DropReport::RolledBack { code, error, .. } = report {
        anyhow::bail!("{code}: {error}");
    }
    Ok(())
}

fn write_report_text(report: &DropReport, w: &mut dyn Write) -> io::Result<()> {
    match report {
        DropReport::Skipped => writeln!(w, "skipped"),
        DropReport::Moved {
            issue_id,
            bucket,
            index,
            sort_order,
            marked_done,
            ..
        } => {
            write!(w, "moved {issue_id} sort_order={sort_order}")?;
            if let (Some(bucket), Some(index)) = (bucket, index) {
                write!(w, " bucket={bucket} index={index}")?;
            }
            if *marked_done {
                write!(w, " done")?;
            }
            writeln!(w)
        }
        DropReport::Removed { issue_id, .. } => writeln!(w, "removed {issue_id}"),
        DropReport::RolledBack {
            issue_id,
            code,
            error,
        } => writeln!(w, "rolled_back {issue_id} {code} {error}"),
        DropReport::Superseded { issue_id } => writeln!(w, "superseded {issue_id}"),
    }
}

fn write_report_pretty(report: &DropReport, w: &mut dyn Write) -> io::Result<()> {
    match report {
        DropReport::Skipped => writeln!(w, "Nothing to do."),
        DropReport::Moved {
            issue_id,
            bucket,
            index,
            sort_order,
            marked_done,
            refreshed,
        } => {
            pretty_section(w, &format!("Moved {issue_id}"))?;
            if let Some(bucket) = bucket {
                pretty_kv(w, "bucket", bucket)?;
            }
            if let Some(index) = index {
                pretty_kv(w, "position", index.to_string())?;
            }
            pretty_kv(w, "sort order", sort_order.to_string())?;
            if *marked_done {
                pretty_kv(w, "status", "completed")?;
            }
            if !refreshed.is_empty() {
                pretty_kv(w, "refreshed", refreshed.len().to_string())?;
            }
            Ok(())
        }
        DropReport::Removed { issue_id, .. } => writeln!(w, "Removed {issue_id}."),
        DropReport::RolledBack {
            issue_id,
            code,
            error,
        } => writeln!(w, "Change to {issue_id} was rolled back [{code}]: {error}"),
        DropReport::Superseded { issue_id } => {
            writeln!(w, "A newer change to {issue_id} took precedence.")
        }
    }
}
