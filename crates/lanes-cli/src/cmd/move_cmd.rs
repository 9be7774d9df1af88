//! `lanes move`: drop an issue into a bucket at a position.

use clap::Args;
use lanes_core::board::{Board, BucketPos, DropEvent};
use lanes_core::reconcile::Reconciler;
use lanes_core::service::IssueService;
use tracing::debug;

use crate::output::OutputMode;

#[derive(Args, Debug)]
pub struct MoveArgs {
    /// Issue ID to move.
    pub id: String,

    /// Destination bucket key (a state id, a priority, a label...).
    /// Defaults to the issue's current bucket.
    #[arg(long)]
    pub to: Option<String>,

    /// Zero-based position in the destination bucket. Defaults to the end.
    #[arg(long)]
    pub index: Option<usize>,
}

pub fn run_move(
    args: &MoveArgs,
    output: OutputMode,
    board: &mut Board,
    reconciler: &Reconciler<'_, dyn IssueService>,
) -> anyhow::Result<()> {
    let source = super::locate(board, &args.id)?;
    let bucket = args.to.clone().unwrap_or_else(|| source.bucket.clone());
    let index = args.index.unwrap_or_else(|| {
        board
            .collection()
            .bucket(&bucket)
            .map_or(0, |b| b.len())
    });
    debug!(id = %args.id, from = %source.bucket, to = %bucket, index, "move");

    let report = reconciler.handle_drop(board, DropEvent::to_bucket(source, BucketPos::new(bucket, index)))?;
    super::finish(&report, output)
}
