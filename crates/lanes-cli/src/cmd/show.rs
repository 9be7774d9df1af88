//! `lanes show`: the grouped board as the view renders it.

use std::io::{self, Write};

use clap::Args;
use lanes_core::board::Board;
use lanes_core::error::ReorderError;
use lanes_core::group::Bucket;
use lanes_core::model::Priority;
use lanes_core::view::{GroupBy, Layout, OrderBy, ViewState};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::output::{OutputMode, pretty_section, render_mode};

#[derive(Args, Debug, Default)]
pub struct ShowArgs {
    /// Only show this bucket.
    #[arg(long)]
    pub bucket: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BoardView<'a> {
    pub layout: Layout,
    pub group_by: GroupBy,
    pub order_by: OrderBy,
    pub buckets: Vec<BucketView<'a>>,
}

#[derive(Debug, Serialize)]
pub struct BucketView<'a> {
    pub key: &'a str,
    pub count: usize,
    /// Fields a new issue created in this bucket starts with.
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub prefill: Map<String, Value>,
    pub issues: Vec<IssueRow<'a>>,
}

#[derive(Debug, Serialize)]
pub struct IssueRow<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub state: &'a str,
    pub priority: Option<Priority>,
    pub sort_order: f64,
}

impl<'a> BucketView<'a> {
    fn from_bucket(bucket: &'a Bucket, view: &ViewState) -> Self {
        Self {
            key: &bucket.key,
            count: bucket.len(),
            prefill: view.prefill_for_bucket(&bucket.key),
            issues: bucket
                .issues
                .iter()
                .map(|i| IssueRow {
                    id: &i.id,
                    name: &i.name,
                    state: &i.state,
                    priority: i.priority,
                    sort_order: i.sort_order,
                })
                .collect(),
        }
    }
}

pub fn board_view<'a>(board: &'a Board, only: Option<&str>) -> BoardView<'a> {
    let view = board.view();
    BoardView {
        layout: view.layout(),
        group_by: view.group_by(),
        order_by: view.order_by(),
        buckets: board
            .collection()
            .buckets()
            .iter()
            .filter(|b| only.is_none_or(|key| b.key == key))
            .map(|b| BucketView::from_bucket(b, view))
            .collect(),
    }
}

pub fn run_show(args: &ShowArgs, output: OutputMode, board: &Board) -> anyhow::Result<()> {
    if let Some(key) = args
        .bucket
        .as_deref()
        .filter(|key| board.collection().bucket(key).is_none())
    {
        return Err(ReorderError::UnknownBucket(key.to_string()).into());
    }
    let view = board_view(board, args.bucket.as_deref());
    render_mode(output, &view, write_text, write_pretty)
}

fn write_text(view: &BoardView<'_>, w: &mut dyn Write) -> io::Result<()> {
    for bucket in &view.buckets {
        writeln!(w, "{}\t{}", bucket.key, bucket.count)?;
        for issue in &bucket.issues {
            writeln!(w, "  {}\t{}\t{}", issue.id, issue.sort_order, issue.name)?;
        }
    }
    Ok(())
}

fn write_pretty(view: &BoardView<'_>, w: &mut dyn Write) -> io::Result<()> {
    writeln!(
        w,
        "{} board, grouped by {}, ordered by {}",
        view.layout.as_str(),
        view.group_by,
        view.order_by
    )?;
    for bucket in &view.buckets {
        writeln!(w)?;
        pretty_section(w, &format!("{} ({})", bucket.key, bucket.count))?;
        if bucket.issues.is_empty() {
            writeln!(w, "  (empty)")?;
        }
        for issue in &bucket.issues {
            let priority = issue.priority.map_or("none", Priority::as_str);
            writeln!(
                w,
                "  {:<14} {:>12} {:<8} {}",
                issue.id, issue.sort_order, priority, issue.name
            )?;
        }
    }
    Ok(())
}
