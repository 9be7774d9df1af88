//! Background dispatcher: the local mutation happens under the board mutex
//! on the caller's thread, the remote call runs on a worker thread.
//!
//! The mutex is the per-view mutation queue. A caller can issue drop after
//! drop without waiting for the network; settlements come back in whatever
//! order the remote answers and the board's per-issue revisions keep only
//! the newest one. The refetch after the last settlement also runs with the
//! mutex released, and its result is dropped if a newer write began.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use crate::board::{Board, DropEvent, PendingWrite};
use crate::error::ReorderError;
use crate::reconcile::{DropReport, Reconciler, execute};
use crate::service::{IssueService, Notifier};

pub struct Dispatcher<S> {
    board: Arc<Mutex<Board>>,
    service: Arc<S>,
    notifier: Arc<dyn Notifier + Send + Sync>,
}

impl<S> Clone for Dispatcher<S> {
    fn clone(&self) -> Self {
        Self {
            board: Arc::clone(&self.board),
            service: Arc::clone(&self.service),
            notifier: Arc::clone(&self.notifier),
        }
    }
}

impl<S: IssueService + Send + Sync + 'static> Dispatcher<S> {
    pub fn new(board: Board, service: Arc<S>, notifier: Arc<dyn Notifier + Send + Sync>) -> Self {
        Self {
            board: Arc::new(Mutex::new(board)),
            service,
            notifier,
        }
    }

    /// Exclusive access to the board. A poisoned lock is recovered.
    pub fn board(&self) -> MutexGuard<'_, Board> {
        self.board.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply a drop locally and send its write in the background.
    ///
    /// Returns `Ok(None)` when the drop is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`ReorderError`] when the event does not match the board.
    pub fn drop_issue(&self, event: DropEvent) -> Result<Option<JoinHandle<DropReport>>, ReorderError> {
        let write = self.board().begin_drop(event)?;
        Ok(write.map(|write| self.spawn(write)))
    }

    /// Remove an issue from the scoped container in the background.
    ///
    /// # Errors
    ///
    /// See [`Board::begin_remove_from_container`].
    pub fn remove_from_container(
        &self,
        issue_id: &str,
    ) -> Result<Option<JoinHandle<DropReport>>, ReorderError> {
        let write = self.board().begin_remove_from_container(issue_id)?;
        Ok(write.map(|write| self.spawn(write)))
    }

    fn spawn(&self, write: PendingWrite) -> JoinHandle<DropReport> {
        let this = self.clone();
        debug!(issue = %write.issue_id, revision = write.revision, "dispatching write");
        thread::spawn(move || {
            let outcome = execute(this.service.as_ref(), &write);
            let notifier: &dyn Notifier = this.notifier.as_ref();
            let reconciler = Reconciler::new(this.service.as_ref(), notifier);
            let settled = {
                let mut board = this.board();
                reconciler.settle_local(&mut board, &write, outcome)
            };
            if settled.refetch_due() {
                this.refetch();
            }
            settled.report(&this.board())
        })
    }

    fn refetch(&self) {
        let Some(request) = self.board().fetch_request() else {
            return;
        };
        match request.run(self.service.as_ref()) {
            Ok(fetched) => {
                if !self.board().apply_fetch(fetched) {
                    debug!("refetch superseded by a newer write");
                }
            }
            Err(error) => warn!(%error, "refetch after write failed, keeping local board"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Dispatcher;
    use crate::board::{Board, BucketPos, DropEvent};
    use crate::memory::{MemoryService, RecordingNotifier};
    use crate::model::{Issue, IssuePatch, State, StateGroup};
    use crate::reconcile::DropReport;
    use crate::service::{
        Container, IssueQuery, IssueRemoval, IssueUpdate, RouteContext, ServiceError,
    };
    use crate::sort_key::SortKeyAllocator;
    use crate::view::{GroupBy, Layout, OrderBy, QueryParams, ViewState};
    use std::sync::mpsc::{Receiver, Sender, channel};
    use std::sync::{Arc, Mutex};

    /// Service whose updates block until the test releases them, so
    /// settlement order can be forced.
    struct GatedService {
        inner: MemoryService,
        gates: Mutex<Vec<Receiver<Result<(), ServiceError>>>>,
        fetch_gate: Mutex<Option<(Sender<()>, Receiver<()>)>>,
    }

    impl GatedService {
        /// Hold the next issue fetch. Returns a receiver signalled when the
        /// fetch starts and a sender that lets it finish.
        fn hold_next_fetch(&self) -> (Receiver<()>, Sender<()>) {
            let (entered_tx, entered_rx) = channel();
            let (release_tx, release_rx) = channel();
            *self.fetch_gate.lock().unwrap() = Some((entered_tx, release_rx));
            (entered_rx, release_tx)
        }
    }

    impl IssueQuery for GatedService {
        fn fetch_issues(
            &self,
            route: &RouteContext,
            params: &QueryParams,
        ) -> Result<Vec<Issue>, ServiceError> {
            let held = self.fetch_gate.lock().unwrap().take();
            if let Some((entered, release)) = held {
                entered.send(()).unwrap();
                release.recv().unwrap();
            }
            self.inner.fetch_issues(route, params)
        }

        fn fetch_states(&self, route: &RouteContext) -> Result<Vec<State>, ServiceError> {
            self.inner.fetch_states(route)
        }
    }

    impl IssueUpdate for GatedService {
        fn update_issue(
            &self,
            route: &RouteContext,
            issue_id: &str,
            patch: &IssuePatch,
        ) -> Result<Issue, ServiceError> {
            let gate = self.gates.lock().unwrap().remove(0);
            gate.recv().unwrap()?;
            self.inner.update_issue(route, issue_id, patch)
        }
    }

    impl IssueRemoval for GatedService {
        fn remove_issue(&self, route: &RouteContext, issue_id: &str) -> Result<(), ServiceError> {
            self.inner.remove_issue(route, issue_id)
        }

        fn remove_issue_from_container(
            &self,
            route: &RouteContext,
            container: &Container,
            bridge_id: &str,
        ) -> Result<(), ServiceError> {
            self.inner.remove_issue_from_container(route, container, bridge_id)
        }
    }

    fn setup(gates: usize) -> (Dispatcher<GatedService>, Vec<Sender<Result<(), ServiceError>>>) {
        let (senders, receivers): (Vec<_>, Vec<_>) = (0..gates).map(|_| channel()).unzip();
        let service = Arc::new(GatedService {
            inner: MemoryService::new(
                vec![
                    State::new("todo", "Todo", StateGroup::Unstarted),
                    State::new("done", "Done", StateGroup::Completed),
                ],
                vec![
                    Issue::new("a", "A", "todo", 100.0),
                    Issue::new("b", "B", "todo", 200.0),
                ],
            ),
            gates: Mutex::new(receivers),
            fetch_gate: Mutex::new(None),
        });
        let mut board = Board::new(
            RouteContext::project("acme", "p1"),
            ViewState::new(Layout::Kanban, GroupBy::State, OrderBy::Manual),
            SortKeyAllocator::default(),
        );
        board.refresh(service.as_ref()).unwrap();
        let dispatcher = Dispatcher::new(board, service, Arc::new(RecordingNotifier::default()));
        (dispatcher, senders)
    }

    #[test]
    fn local_mutation_is_visible_before_the_write_settles() {
        let (dispatcher, senders) = setup(1);
        let handle = dispatcher
            .drop_issue(DropEvent::to_bucket(BucketPos::new("todo", 0), BucketPos::new("done", 0)))
            .unwrap()
            .unwrap();

        assert_eq!(dispatcher.board().collection().locate("a").unwrap().bucket, "done");
        assert_eq!(dispatcher.board().in_flight(), 1);

        senders[0].send(Ok(())).unwrap();
        let report = handle.join().unwrap();
        assert!(matches!(report, DropReport::Moved { marked_done: true, .. }));
        assert_eq!(dispatcher.board().in_flight(), 0);
    }

    #[test]
    fn stale_failure_does_not_undo_newer_move() {
        let (dispatcher, senders) = setup(2);
        let first = dispatcher
            .drop_issue(DropEvent::to_bucket(BucketPos::new("todo", 0), BucketPos::new("done", 0)))
            .unwrap()
            .unwrap();
        // Wait until the first worker holds its gate before issuing the second.
        while dispatcher.service.gates.lock().unwrap().len() == 2 {
            std::thread::yield_now();
        }
        let second = dispatcher
            .drop_issue(DropEvent::to_bucket(BucketPos::new("done", 0), BucketPos::new("todo", 1)))
            .unwrap()
            .unwrap();

        senders[1].send(Ok(())).unwrap();
        let newest = second.join().unwrap();
        assert!(matches!(newest, DropReport::Moved { .. }));

        senders[0]
            .send(Err(ServiceError::Transport("late".into())))
            .unwrap();
        let stale = first.join().unwrap();
        assert_eq!(stale, DropReport::Superseded { issue_id: "a".into() });

        let board = dispatcher.board();
        assert_eq!(board.collection().locate("a").unwrap().bucket, "todo");
        assert!(board.collection().bucket("done").unwrap().is_empty());
    }

    #[test]
    fn board_stays_available_while_refetching() {
        let (dispatcher, senders) = setup(2);
        let (entered, release) = dispatcher.service.hold_next_fetch();
        let first = dispatcher
            .drop_issue(DropEvent::to_bucket(BucketPos::new("todo", 0), BucketPos::new("done", 0)))
            .unwrap()
            .unwrap();
        senders[0].send(Ok(())).unwrap();
        entered.recv().unwrap();

        let second = dispatcher
            .drop_issue(DropEvent::to_bucket(BucketPos::new("todo", 0), BucketPos::new("done", 1)))
            .unwrap()
            .unwrap();
        assert_eq!(dispatcher.board().collection().locate("b").unwrap().bucket, "done");

        release.send(()).unwrap();
        assert!(matches!(first.join().unwrap(), DropReport::Moved { .. }));
        // The fetch predates the second drop and must not undo it.
        assert_eq!(dispatcher.board().collection().locate("b").unwrap().bucket, "done");

        senders[1].send(Ok(())).unwrap();
        assert!(matches!(second.join().unwrap(), DropReport::Moved { .. }));
        let board = dispatcher.board();
        assert_eq!(board.in_flight(), 0);
        assert_eq!(board.collection().bucket("done").unwrap().len(), 2);
    }
}
