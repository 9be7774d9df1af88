//! `lanes discard`: drop an issue on the delete target.

use clap::Args;
use lanes_core::board::{Board, DropEvent};
use lanes_core::reconcile::Reconciler;
use lanes_core::service::IssueService;

use crate::output::OutputMode;

#[derive(Args, Debug)]
pub struct DiscardArgs {
    /// Issue ID to delete.
    pub id: String,
}

pub fn run_discard(
    args: &DiscardArgs,
    output: OutputMode,
    board: &mut Board,
    reconciler: &Reconciler<'_, dyn IssueService>,
) -> anyhow::Result<()> {
    let source = super::locate(board, &args.id)?;
    let report = reconciler.handle_drop(board, DropEvent::discard(source))?;
    super::finish(&report, output)
}
