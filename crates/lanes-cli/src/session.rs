//! One command's worth of board: pick the backend, load the view, hand the
//! board and a reconciler to the command, then persist.

use anyhow::{Context, Result};
use lanes_core::board::Board;
use lanes_core::config::EffectiveConfig;
use lanes_core::reconcile::Reconciler;
use lanes_core::service::{
    ContainerScope, IssueService, LogNotifier, Notifier, RouteContext, Toast, ToastKind,
};
use lanes_core::timing;
use lanes_core::view::{GroupBy, OrderBy};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::rest::RestClient;
use crate::store::JsonFileStore;

const DEFAULT_BOARD: &str = ".lanes/board.json";

/// Backend and view overrides taken from global flags.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    pub board: Option<PathBuf>,
    pub remote: bool,
    pub group_by: Option<GroupBy>,
    pub order_by: Option<OrderBy>,
    pub scope: ContainerScope,
    /// Send toasts to the log instead of the terminal.
    pub log_toasts: bool,
}

/// Prints toasts to stderr.
pub struct TerminalNotifier;

impl Notifier for TerminalNotifier {
    fn notify(&self, toast: Toast) {
        let mark = match toast.kind {
            ToastKind::Success => "✓",
            ToastKind::Error => "✗",
        };
        eprintln!("{mark} {} {}", toast.title, toast.message);
    }
}

/// Open the board described by `opts` and `config`, run `f` on it, and
/// save the board file if any write went through.
///
/// # Errors
///
/// Fails when the backend cannot be opened or loaded, when `f` fails, or
/// when the board file cannot be saved.
pub fn run<R>(
    opts: &SessionOptions,
    config: &EffectiveConfig,
    project_root: &Path,
    f: impl FnOnce(&mut Board, &Reconciler<'_, dyn IssueService>) -> Result<R>,
) -> Result<R> {
    let notifier: &dyn Notifier = if opts.log_toasts {
        &LogNotifier
    } else {
        &TerminalNotifier
    };
    if opts.remote {
        let base_url = config
            .project
            .api
            .base_url
            .as_deref()
            .context("api.base_url is not set in .lanes/config.toml")?;
        let token = std::env::var("LANES_TOKEN")
            .ok()
            .or_else(|| config.user.token.clone());
        let client = RestClient::new(base_url, token);
        let mut board = open_board(opts, config, config.project.route());
        timing::timed("load", || board.refresh(&client))?;
        info!(base_url, issues = board.collection().len(), "remote board loaded");
        let reconciler: Reconciler<'_, dyn IssueService> = Reconciler::new(&client, notifier);
        return f(&mut board, &reconciler);
    }

    let path = opts
        .board
        .clone()
        .unwrap_or_else(|| project_root.join(DEFAULT_BOARD));
    let (store, service) = timing::timed("load", || JsonFileStore::open(&path))?;
    let route = match (store.workspace(), store.project()) {
        (Some(workspace), Some(project)) => RouteContext::project(workspace, project),
        _ => config.project.route(),
    };
    let mut board = open_board(opts, config, route);
    if !board.refresh(&service)? {
        // Nothing can be written without a route; still show what is there.
        board.rebuild(service.issues(), service.states());
    }
    debug!(path = %path.display(), issues = board.collection().len(), "board opened");

    let result = {
        let reconciler: Reconciler<'_, dyn IssueService> = Reconciler::new(&service, notifier);
        f(&mut board, &reconciler)
    };

    if service.write_count() > 0 {
        timing::timed("save", || store.save(service))?;
    }
    result
}

fn open_board(opts: &SessionOptions, config: &EffectiveConfig, route: RouteContext) -> Board {
    let mut view = config.project.view_state();
    if let Some(group_by) = opts.group_by {
        view.set_group_by(group_by);
    }
    if let Some(order_by) = opts.order_by {
        view.set_order_by(order_by);
    }
    Board::new(
        route.with_scope(opts.scope.clone()),
        view,
        config.project.allocator(),
    )
}
