//! `lanes stats`: issue counts per bucket.

use std::io::{self, Write};

use clap::Args;
use lanes_core::board::Board;
use lanes_core::group::BucketCount;
use lanes_core::view::GroupBy;
use serde::Serialize;

use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};

#[derive(Args, Debug, Default)]
pub struct StatsArgs {
    /// Hide buckets without issues.
    #[arg(long)]
    pub non_empty: bool,
}

#[derive(Debug, Serialize)]
pub struct BoardStats {
    pub group_by: GroupBy,
    pub total: usize,
    pub filtered: bool,
    pub buckets: Vec<BucketCount>,
}

pub fn collect_stats(board: &Board, non_empty: bool) -> BoardStats {
    let mut buckets = board.collection().counts();
    if non_empty {
        buckets.retain(|b| b.count > 0);
    }
    BoardStats {
        group_by: board.view().group_by(),
        total: board.collection().len(),
        filtered: board.view().filters().is_applied(),
        buckets,
    }
}

pub fn run_stats(args: &StatsArgs, output: OutputMode, board: &Board) -> anyhow::Result<()> {
    let stats = collect_stats(board, args.non_empty);
    render_mode(output, &stats, write_text, write_pretty)
}

fn write_text(stats: &BoardStats, w: &mut dyn Write) -> io::Result<()> {
    writeln!(w, "total\t{}", stats.total)?;
    for bucket in &stats.buckets {
        writeln!(w, "{}\t{}", bucket.key, bucket.count)?;
    }
    Ok(())
}

fn write_pretty(stats: &BoardStats, w: &mut dyn Write) -> io::Result<()> {
    pretty_section(w, &format!("Issues by {}", stats.group_by))?;
    for bucket in &stats.buckets {
        pretty_kv(w, &bucket.key, bucket.count.to_string())?;
    }
    pretty_kv(w, "total", stats.total.to_string())?;
    if stats.filtered {
        writeln!(w, "(filters applied)")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lanes_core::model::{Issue, Priority};
    use lanes_core::service::RouteContext;
    use lanes_core::sort_key::SortKeyAllocator;
    use lanes_core::view::{Layout, OrderBy, ViewState};

    #[test]
    fn counts_follow_bucket_order_and_can_skip_empty() {
        let mut board = Board::new(
            RouteContext::project("acme", "p1"),
            ViewState::new(Layout::List, GroupBy::Priority, OrderBy::Manual),
            SortKeyAllocator::default(),
        );
        board.rebuild(
            vec![
                Issue::new("a", "A", "todo", 1.0).with_priority(Some(Priority::High)),
                Issue::new("b", "B", "todo", 2.0).with_priority(Some(Priority::High)),
                Issue::new("c", "C", "todo", 3.0),
            ],
            Vec::new(),
        );

        let all = collect_stats(&board, false);
        assert_eq!(all.total, 3);
        assert!(all.buckets.len() > 2);

        let busy = collect_stats(&board, true);
        let pairs: Vec<_> = busy.buckets.iter().map(|b| (b.key.as_str(), b.count)).collect();
        assert_eq!(pairs, [("high", 2), ("None", 1)]);
    }
}
