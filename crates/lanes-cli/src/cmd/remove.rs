//! `lanes remove`: take an issue out of the cycle or module the view is
//! scoped to. The issue itself is kept.

use clap::Args;
use lanes_core::board::Board;
use lanes_core::reconcile::Reconciler;
use lanes_core::service::IssueService;

use crate::output::OutputMode;

#[derive(Args, Debug)]
pub struct RemoveArgs {
    /// Issue ID to remove from the container.
    pub id: String,
}

pub fn run_remove(
    args: &RemoveArgs,
    output: OutputMode,
    board: &mut Board,
    reconciler: &Reconciler<'_, dyn IssueService>,
) -> anyhow::Result<()> {
    let report = reconciler.remove_from_container(board, &args.id)?;
    super::finish(&report, output)
}
