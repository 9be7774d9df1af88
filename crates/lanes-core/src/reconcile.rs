//! Reconciliation writer: runs the remote call behind a [`PendingWrite`],
//! settles the board and tells the user what happened.

use serde::Serialize;
use tracing::{debug, warn};

use crate::board::{Board, DropEvent, PendingWrite, Settlement, WriteAction, WriteResponse};
use crate::error::ReorderError;
use crate::service::{
    IssueService, Notifier, RefreshTarget, ServiceError, Toast, refresh_targets,
};

const UPDATE_FAILED: &str = "Issue could not be updated. Please try again.";
const REMOVE_FAILED: &str = "Issue could not be removed. Please try again.";
const DELETED: &str = "Issue deleted successfully.";
const REMOVED: &str = "Issue removed successfully.";

/// What a drop or removal ended up doing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DropReport {
    /// Nothing to do: unresolved route, cancelled drag or drop in place.
    Skipped,
    Moved {
        issue_id: String,
        bucket: Option<String>,
        index: Option<usize>,
        sort_order: f64,
        marked_done: bool,
        refreshed: Vec<RefreshTarget>,
    },
    Removed {
        issue_id: String,
        refreshed: Vec<RefreshTarget>,
    },
    RolledBack {
        issue_id: String,
        code: &'static str,
        error: String,
    },
    Superseded {
        issue_id: String,
    },
}

/// Send the remote call a pending write stands for.
///
/// # Errors
///
/// Returns whatever the service reports.
pub fn execute<S: IssueService + ?Sized>(
    service: &S,
    write: &PendingWrite,
) -> Result<WriteResponse, ServiceError> {
    match &write.action {
        WriteAction::Update { patch } => service
            .update_issue(&write.route, &write.issue_id, patch)
            .map(WriteResponse::Updated),
        WriteAction::Delete => service
            .remove_issue(&write.route, &write.issue_id)
            .map(|()| WriteResponse::Removed),
        WriteAction::RemoveFromContainer {
            container,
            bridge_id,
        } => service
            .remove_issue_from_container(&write.route, container, bridge_id)
            .map(|()| WriteResponse::Removed),
    }
}

/// Synchronous writer: begins, executes and settles in one call.
pub struct Reconciler<'a, S: ?Sized> {
    service: &'a S,
    notifier: &'a dyn Notifier,
}

impl<'a, S: IssueService + ?Sized> Reconciler<'a, S> {
    pub const fn new(service: &'a S, notifier: &'a dyn Notifier) -> Self {
        Self { service, notifier }
    }

    /// Handle a completed drag gesture end to end.
    ///
    /// # Errors
    ///
    /// Returns [`ReorderError`] when the event does not match the board.
    pub fn handle_drop(&self, board: &mut Board, event: DropEvent) -> Result<DropReport, ReorderError> {
        let Some(write) = board.begin_drop(event)? else {
            return Ok(DropReport::Skipped);
        };
        let outcome = execute(self.service, &write);
        Ok(self.settle(board, &write, outcome))
    }

    /// Remove an issue from the cycle or module the board is scoped to.
    ///
    /// # Errors
    ///
    /// Returns [`ReorderError`] when the board is not container-scoped or the
    /// issue is not a member.
    pub fn remove_from_container(
        &self,
        board: &mut Board,
        issue_id: &str,
    ) -> Result<DropReport, ReorderError> {
        let Some(write) = board.begin_remove_from_container(issue_id)? else {
            return Ok(DropReport::Skipped);
        };
        let outcome = execute(self.service, &write);
        Ok(self.settle(board, &write, outcome))
    }

    /// Settle `write` with `outcome`, notify, and refetch the board once no
    /// other write is outstanding.
    pub fn settle(
        &self,
        board: &mut Board,
        write: &PendingWrite,
        outcome: Result<WriteResponse, ServiceError>,
    ) -> DropReport {
        let settled = self.settle_local(board, write, outcome);
        if settled.refetch_due() {
            self.refetch(board, settled.targets());
        }
        settled.report(board)
    }

    /// The board half of [`Reconciler::settle`]: apply the outcome and
    /// notify, leaving the refetch to the caller.
    pub fn settle_local(
        &self,
        board: &mut Board,
        write: &PendingWrite,
        outcome: Result<WriteResponse, ServiceError>,
    ) -> Settled {
        let kind = match board.settle(write, outcome) {
            Settlement::Superseded => SettledKind::Superseded,
            Settlement::RolledBack { error } => {
                let message = match write.action {
                    WriteAction::Update { .. } => UPDATE_FAILED,
                    WriteAction::Delete | WriteAction::RemoveFromContainer { .. } => REMOVE_FAILED,
                };
                self.notifier.notify(Toast::error("Error!", message));
                SettledKind::RolledBack {
                    code: error.code().code(),
                    error: error.to_string(),
                }
            }
            Settlement::Removed { refresh } => {
                let message = match write.action {
                    WriteAction::Delete => DELETED,
                    WriteAction::Update { .. } | WriteAction::RemoveFromContainer { .. } => REMOVED,
                };
                self.notifier.notify(Toast::success("Success!", message));
                SettledKind::Removed { refresh }
            }
            Settlement::Applied {
                marked_done,
                refresh,
            } => SettledKind::Applied {
                marked_done,
                refresh,
                sort_order: write.snapshot.issue.sort_order,
            },
        };
        let refetch_due = board.in_flight() == 0;
        if !refetch_due {
            debug!(in_flight = board.in_flight(), "refetch deferred until writes settle");
        }
        Settled {
            issue_id: write.issue_id.clone(),
            targets: refresh_targets(&write.route),
            kind,
            refetch_due,
        }
    }

    fn refetch(&self, board: &mut Board, targets: &[RefreshTarget]) {
        for target in targets {
            debug!(%target, "refreshing");
        }
        if let Err(error) = board.refresh(self.service) {
            warn!(%error, "refetch after write failed, keeping local board");
        }
    }
}

/// A settled write whose report is read off the board after any refetch.
#[derive(Debug, Clone)]
pub struct Settled {
    issue_id: String,
    targets: Vec<RefreshTarget>,
    kind: SettledKind,
    refetch_due: bool,
}

#[derive(Debug, Clone)]
enum SettledKind {
    Superseded,
    RolledBack { code: &'static str, error: String },
    Removed { refresh: Vec<RefreshTarget> },
    Applied {
        marked_done: bool,
        refresh: Vec<RefreshTarget>,
        sort_order: f64,
    },
}

impl Settled {
    /// True when this was the last outstanding write on the board.
    #[must_use]
    pub const fn refetch_due(&self) -> bool {
        self.refetch_due
    }

    #[must_use]
    pub fn targets(&self) -> &[RefreshTarget] {
        &self.targets
    }

    /// Describe the outcome against the board as it stands now.
    #[must_use]
    pub fn report(self, board: &Board) -> DropReport {
        let issue_id = self.issue_id;
        match self.kind {
            SettledKind::Superseded => DropReport::Superseded { issue_id },
            SettledKind::RolledBack { code, error } => DropReport::RolledBack {
                issue_id,
                code,
                error,
            },
            SettledKind::Removed { refresh } => DropReport::Removed {
                issue_id,
                refreshed: refresh,
            },
            SettledKind::Applied {
                marked_done,
                refresh,
                sort_order,
            } => {
                let location = board.collection().locate(&issue_id);
                let sort_order = board
                    .collection()
                    .issue(&issue_id)
                    .map_or(sort_order, |i| i.sort_order);
                DropReport::Moved {
                    issue_id,
                    bucket: location.as_ref().map(|l| l.bucket.clone()),
                    index: location.map(|l| l.index),
                    sort_order,
                    marked_done,
                    refreshed: refresh,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{DropReport, Reconciler, execute};
    use crate::board::{Board, BucketPos, DropEvent};
    use crate::memory::{MemoryService, RecordedCall, RecordingNotifier};
    use crate::model::{ContainerLink, Issue, State, StateGroup};
    use crate::service::{ContainerScope, RefreshTarget, RouteContext, ServiceError, ToastKind};
    use crate::sort_key::SortKeyAllocator;
    use crate::view::{GroupBy, Layout, OrderBy, ViewState};

    fn service() -> MemoryService {
        let mut c = Issue::new("c", "C", "todo", 300.0);
        c.cycle = Some(ContainerLink {
            id: "cy".into(),
            bridge_id: "br-c".into(),
        });
        MemoryService::new(
            vec![
                State::new("todo", "Todo", StateGroup::Unstarted),
                State::new("done", "Done", StateGroup::Completed),
            ],
            vec![
                Issue::new("a", "A", "todo", 100.0),
                Issue::new("b", "B", "todo", 200.0),
                c,
            ],
        )
    }

    fn board(svc: &MemoryService, route: RouteContext) -> Board {
        let mut board = Board::new(
            route,
            ViewState::new(Layout::Kanban, GroupBy::State, OrderBy::Manual),
            SortKeyAllocator::default(),
        );
        board.refresh(svc).unwrap();
        board
    }

    #[test]
    fn successful_move_is_persisted_and_refetched() {
        let svc = service();
        let notifier = RecordingNotifier::default();
        let mut board = board(&svc, RouteContext::project("acme", "p1"));

        let report = Reconciler::new(&svc, &notifier)
            .handle_drop(
                &mut board,
                DropEvent::to_bucket(BucketPos::new("todo", 0), BucketPos::new("done", 0)),
            )
            .unwrap();

        match report {
            DropReport::Moved {
                bucket,
                marked_done,
                refreshed,
                ..
            } => {
                assert_eq!(bucket.as_deref(), Some("done"));
                assert!(marked_done);
                assert_eq!(refreshed, vec![RefreshTarget::ProjectIssues("p1".into())]);
            }
            other => panic!("unexpected report {other:?}"),
        }
        assert_eq!(svc.issue("a").map(|i| i.state), Some("done".to_string()));
        assert!(notifier.toasts().is_empty());
        assert_eq!(svc.calls().last(), Some(&RecordedCall::FetchIssues));
    }

    #[test]
    fn failed_move_rolls_back_and_notifies() {
        let svc = service();
        svc.fail_next_write(ServiceError::Rejected {
            status: 500,
            message: "boom".into(),
        });
        let notifier = RecordingNotifier::default();
        let mut board = board(&svc, RouteContext::project("acme", "p1"));
        let before = board.collection().clone();

        let report = Reconciler::new(&svc, &notifier)
            .handle_drop(
                &mut board,
                DropEvent::to_bucket(BucketPos::new("todo", 0), BucketPos::new("todo", 2)),
            )
            .unwrap();

        assert!(matches!(report, DropReport::RolledBack { code: "E3002", .. }));
        assert_eq!(board.collection(), &before);
        let toasts = notifier.toasts();
        assert_eq!(toasts.len(), 1);
        assert_eq!(toasts[0].kind, ToastKind::Error);
        assert_eq!(svc.issue("a").map(|i| i.sort_order), Some(100.0));
    }

    #[test]
    fn unresolved_route_skips_silently() {
        let svc = service();
        let notifier = RecordingNotifier::default();
        let mut board = Board::new(
            RouteContext::default(),
            ViewState::default(),
            SortKeyAllocator::default(),
        );
        let report = Reconciler::new(&svc, &notifier)
            .handle_drop(&mut board, DropEvent::discard(BucketPos::new("All Issues", 0)))
            .unwrap();
        assert_eq!(report, DropReport::Skipped);
        assert!(svc.calls().is_empty());
        assert!(notifier.toasts().is_empty());
    }

    #[test]
    fn discard_deletes_and_confirms() {
        let svc = service();
        let notifier = RecordingNotifier::default();
        let mut board = board(&svc, RouteContext::project("acme", "p1"));

        let report = Reconciler::new(&svc, &notifier)
            .handle_drop(&mut board, DropEvent::discard(BucketPos::new("todo", 1)))
            .unwrap();

        assert!(matches!(report, DropReport::Removed { .. }));
        assert!(svc.issue("b").is_none());
        assert!(board.collection().issue("b").is_none());
        assert_eq!(notifier.toasts()[0].message, "Issue deleted successfully.");
    }

    #[test]
    fn removal_from_cycle_refreshes_cycle_aggregates() {
        let svc = service();
        let notifier = RecordingNotifier::default();
        let route = RouteContext::project("acme", "p1").with_scope(ContainerScope::Cycle("cy".into()));
        let mut board = board(&svc, route);
        assert_eq!(board.collection().len(), 1);

        let report = Reconciler::new(&svc, &notifier)
            .remove_from_container(&mut board, "c")
            .unwrap();

        assert_eq!(
            report,
            DropReport::Removed {
                issue_id: "c".into(),
                refreshed: vec![
                    RefreshTarget::CycleIssues("cy".into()),
                    RefreshTarget::CycleDetails("cy".into()),
                    RefreshTarget::ProjectIssues("p1".into()),
                ],
            }
        );
        assert!(board.collection().is_empty());
        assert!(svc.issue("c").is_some_and(|i| i.cycle.is_none()));
        assert_eq!(notifier.toasts()[0].message, "Issue removed successfully.");
    }

    fn fetches(svc: &MemoryService) -> usize {
        svc.calls()
            .iter()
            .filter(|call| **call == RecordedCall::FetchIssues)
            .count()
    }

    #[test]
    fn stale_settlement_refetches_once_writes_drain() {
        let svc = service();
        let notifier = RecordingNotifier::default();
        let mut board = board(&svc, RouteContext::project("acme", "p1"));
        let reconciler = Reconciler::new(&svc, &notifier);

        let first = board
            .begin_drop(DropEvent::to_bucket(BucketPos::new("todo", 0), BucketPos::new("done", 0)))
            .unwrap()
            .unwrap();
        let second = board
            .begin_drop(DropEvent::to_bucket(BucketPos::new("done", 0), BucketPos::new("todo", 1)))
            .unwrap()
            .unwrap();

        let outcome = execute(&svc, &second);
        let newest = reconciler.settle(&mut board, &second, outcome);
        assert!(matches!(newest, DropReport::Moved { .. }));
        let settled_fetches = fetches(&svc);

        let stale = reconciler.settle(
            &mut board,
            &first,
            Err(ServiceError::Transport("late".into())),
        );
        assert_eq!(stale, DropReport::Superseded { issue_id: "a".into() });
        assert_eq!(board.in_flight(), 0);
        assert_eq!(fetches(&svc), settled_fetches + 1);
        assert_eq!(svc.calls().last(), Some(&RecordedCall::FetchIssues));
        assert_eq!(board.collection().locate("a").unwrap().bucket, "todo");
        assert!(notifier.toasts().is_empty());
    }

    #[test]
    fn label_drop_snaps_back_to_the_issue_label_after_refetch() {
        let svc = MemoryService::new(
            vec![State::new("todo", "Todo", StateGroup::Unstarted)],
            vec![
                Issue::new("a", "A", "todo", 100.0).with_labels(["bug"]),
                Issue::new("b", "B", "todo", 200.0).with_labels(["ui"]),
            ],
        );
        let notifier = RecordingNotifier::default();
        let mut board = Board::new(
            RouteContext::project("acme", "p1"),
            ViewState::new(Layout::Kanban, GroupBy::Labels, OrderBy::Manual),
            SortKeyAllocator::default(),
        );
        board.refresh(&svc).unwrap();

        let report = Reconciler::new(&svc, &notifier)
            .handle_drop(
                &mut board,
                DropEvent::to_bucket(BucketPos::new("bug", 0), BucketPos::new("ui", 0)),
            )
            .unwrap();

        match report {
            DropReport::Moved {
                bucket, sort_order, ..
            } => {
                assert_eq!(bucket.as_deref(), Some("bug"));
                assert!(sort_order < 200.0);
            }
            other => panic!("unexpected report {other:?}"),
        }
        assert_eq!(svc.issue("a").map(|i| i.labels), Some(vec!["bug".to_string()]));
        assert_eq!(board.collection().locate("a").unwrap().bucket, "bug");
    }
}
