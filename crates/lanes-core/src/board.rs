//! The board: a view's grouped collection plus the optimistic write protocol.
//!
//! Every mutation is two-phase. `begin_*` applies the change locally and
//! hands back a [`PendingWrite`] ticket describing the remote call to make;
//! [`Board::settle`] takes the outcome of that call and either adopts the
//! authoritative issue or restores the pre-mutation snapshot.
//!
//! Several writes for the same issue may be outstanding. Each ticket carries
//! a per-issue revision and only the newest one is allowed to settle; older
//! outcomes (successes and failures alike) are dropped.

use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::error::ReorderError;
use crate::group::{GroupDomain, GroupedCollection, apply_group_key, group_issues, group_key};
use crate::model::{Issue, IssuePatch, State, StateGroup, state::group_of};
use crate::service::{Container, IssueQuery, RefreshTarget, RouteContext, ServiceError, refresh_targets};
use crate::sort_key::{Placement, SortKeyAllocator};
use crate::view::{OrderBy, QueryParams, ViewState, order_issues};

/// A position inside one bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BucketPos {
    pub bucket: String,
    pub index: usize,
}

impl BucketPos {
    #[must_use]
    pub fn new(bucket: impl Into<String>, index: usize) -> Self {
        Self {
            bucket: bucket.into(),
            index,
        }
    }
}

/// Where a dragged issue was released.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DropTarget {
    Bucket(BucketPos),
    /// The trash zone: delete the issue.
    Discard,
}

/// A completed drag gesture. A missing destination means the drag was
/// released outside any drop zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DropEvent {
    pub source: BucketPos,
    pub destination: Option<DropTarget>,
}

impl DropEvent {
    #[must_use]
    pub fn to_bucket(source: BucketPos, destination: BucketPos) -> Self {
        Self {
            source,
            destination: Some(DropTarget::Bucket(destination)),
        }
    }

    #[must_use]
    pub const fn discard(source: BucketPos) -> Self {
        Self {
            source,
            destination: Some(DropTarget::Discard),
        }
    }

    #[must_use]
    pub const fn cancelled(source: BucketPos) -> Self {
        Self {
            source,
            destination: None,
        }
    }
}

/// The remote call a pending write stands for.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WriteAction {
    Update { patch: IssuePatch },
    Delete,
    RemoveFromContainer { container: Container, bridge_id: String },
}

/// The issue as it was before the optimistic mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub issue: Issue,
    pub bucket: String,
    pub index: usize,
}

/// Ticket for a write that has been applied locally but not yet settled.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingWrite {
    pub revision: u64,
    pub issue_id: String,
    pub route: RouteContext,
    pub action: WriteAction,
    pub snapshot: Snapshot,
}

/// Successful outcome of a remote write.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteResponse {
    Updated(Issue),
    Removed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Settlement {
    /// The authoritative issue replaced the cached one.
    Applied {
        marked_done: bool,
        refresh: Vec<RefreshTarget>,
    },
    /// The issue is gone from the view for good.
    Removed { refresh: Vec<RefreshTarget> },
    /// The remote call failed and the snapshot was restored.
    RolledBack { error: ServiceError },
    /// A newer write for the same issue was issued; this outcome is ignored.
    Superseded,
}

/// A refetch captured from the board so it can run without holding it.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    route: RouteContext,
    params: QueryParams,
    issued_at: u64,
    view_revision: u64,
}

impl FetchRequest {
    /// Fetch states and issues for the captured route and view.
    ///
    /// # Errors
    ///
    /// Returns the query service's error.
    pub fn run<Q: IssueQuery + ?Sized>(self, query: &Q) -> Result<Fetched, ServiceError> {
        let states = query.fetch_states(&self.route)?;
        let issues = query.fetch_issues(&self.route, &self.params)?;
        Ok(Fetched {
            request: self,
            states,
            issues,
        })
    }
}

/// The result of a [`FetchRequest`], applied with [`Board::apply_fetch`].
#[derive(Debug, Clone)]
pub struct Fetched {
    request: FetchRequest,
    states: Vec<State>,
    issues: Vec<Issue>,
}

#[derive(Debug, Clone)]
pub struct Board {
    route: RouteContext,
    view: ViewState,
    domain: GroupDomain,
    collection: GroupedCollection,
    built_revision: Option<u64>,
    allocator: SortKeyAllocator,
    revisions: HashMap<String, u64>,
    next_revision: u64,
    in_flight: usize,
}

impl Board {
    #[must_use]
    pub fn new(route: RouteContext, view: ViewState, allocator: SortKeyAllocator) -> Self {
        Self {
            route,
            view,
            domain: GroupDomain::default(),
            collection: GroupedCollection::default(),
            built_revision: None,
            allocator,
            revisions: HashMap::new(),
            next_revision: 0,
            in_flight: 0,
        }
    }

    #[must_use]
    pub const fn route(&self) -> &RouteContext {
        &self.route
    }

    #[must_use]
    pub const fn view(&self) -> &ViewState {
        &self.view
    }

    /// Mutable view access. Any write marks the board stale.
    pub const fn view_mut(&mut self) -> &mut ViewState {
        &mut self.view
    }

    #[must_use]
    pub const fn collection(&self) -> &GroupedCollection {
        &self.collection
    }

    #[must_use]
    pub fn states(&self) -> &[State] {
        self.domain.states.as_slice()
    }

    /// Writes begun but not settled yet.
    #[must_use]
    pub const fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// True when the view changed since the collection was last built.
    #[must_use]
    pub fn is_stale(&self) -> bool {
        self.built_revision != Some(self.view.revision())
    }

    /// Replace the collection with `issues`, grouped and ordered by the
    /// current view.
    pub fn rebuild(&mut self, mut issues: Vec<Issue>, states: Vec<State>) {
        self.domain = GroupDomain::from_issues(states, &issues);
        order_issues(&mut issues, self.view.order_by());
        self.collection = group_issues(issues, self.view.group_by(), &self.domain);
        self.built_revision = Some(self.view.revision());
        debug!(
            issues = self.collection.len(),
            buckets = self.collection.buckets().len(),
            group_by = %self.view.group_by(),
            "board rebuilt"
        );
    }

    /// Regroup the cached issues after a grouping or ordering change that
    /// does not need a refetch.
    pub fn regroup(&mut self) {
        let issues: Vec<Issue> = self
            .collection
            .buckets()
            .iter()
            .flat_map(|b| b.issues.iter().cloned())
            .collect();
        let states = std::mem::take(&mut self.domain.states);
        self.rebuild(issues, states);
    }

    /// Refetch states and issues from `query`. Does nothing and returns
    /// `false` while the route is unresolved.
    ///
    /// # Errors
    ///
    /// Returns the query service's error; the collection is left untouched.
    pub fn refresh<Q: IssueQuery + ?Sized>(&mut self, query: &Q) -> Result<bool, ServiceError> {
        if self.route.resolved().is_none() {
            debug!("refresh skipped: route unresolved");
            return Ok(false);
        }
        let states = query.fetch_states(&self.route)?;
        let issues = query.fetch_issues(&self.route, &self.view.query_params())?;
        self.rebuild(issues, states);
        Ok(true)
    }

    /// Capture what [`Board::refresh`] would fetch. `None` while the route
    /// is unresolved.
    #[must_use]
    pub fn fetch_request(&self) -> Option<FetchRequest> {
        self.route.resolved()?;
        Some(FetchRequest {
            route: self.route.clone(),
            params: self.view.query_params(),
            issued_at: self.next_revision,
            view_revision: self.view.revision(),
        })
    }

    /// Rebuild from a fetch made outside the board. Returns `false`, leaving
    /// the board as is, when a write began or the view changed after the
    /// request was captured.
    pub fn apply_fetch(&mut self, fetched: Fetched) -> bool {
        let request = &fetched.request;
        if request.issued_at != self.next_revision || request.view_revision != self.view.revision() {
            debug!(
                issued_at = request.issued_at,
                current = self.next_revision,
                "fetched board is stale, discarding"
            );
            return false;
        }
        self.rebuild(fetched.issues, fetched.states);
        true
    }

    /// Apply a drop locally and return the write to send.
    ///
    /// Returns `Ok(None)` when there is nothing to do: the route is
    /// unresolved, the drag was cancelled, or the issue was released where
    /// it started.
    ///
    /// # Errors
    ///
    /// Returns [`ReorderError`] when the event names a bucket or index that
    /// does not exist on this board.
    pub fn begin_drop(&mut self, event: DropEvent) -> Result<Option<PendingWrite>, ReorderError> {
        if self.route.resolved().is_none() {
            debug!("drop ignored: route unresolved");
            return Ok(None);
        }
        let Some(destination) = event.destination else {
            debug!(bucket = %event.source.bucket, "drop cancelled");
            return Ok(None);
        };

        let source = self.checked_source(&event.source)?;
        match destination {
            DropTarget::Discard => Ok(Some(self.begin_discard(source))),
            DropTarget::Bucket(target) => self.begin_move(source, &target),
        }
    }

    fn checked_source(&self, pos: &BucketPos) -> Result<Snapshot, ReorderError> {
        let bucket = self
            .collection
            .bucket(&pos.bucket)
            .ok_or_else(|| ReorderError::UnknownBucket(pos.bucket.clone()))?;
        let issue = bucket
            .issues
            .get(pos.index)
            .ok_or_else(|| ReorderError::IndexOutOfRange {
                bucket: pos.bucket.clone(),
                index: pos.index,
                len: bucket.len(),
            })?;
        Ok(Snapshot {
            issue: issue.clone(),
            bucket: pos.bucket.clone(),
            index: pos.index,
        })
    }

    fn begin_discard(&mut self, snapshot: Snapshot) -> PendingWrite {
        self.take(&snapshot);
        info!(issue = %snapshot.issue.id, "issue discarded");
        self.ticket(WriteAction::Delete, snapshot)
    }

    fn begin_move(
        &mut self,
        snapshot: Snapshot,
        target: &BucketPos,
    ) -> Result<Option<PendingWrite>, ReorderError> {
        let Some(dest) = self.collection.bucket(&target.bucket) else {
            return Err(ReorderError::UnknownBucket(target.bucket.clone()));
        };
        let same_bucket = target.bucket == snapshot.bucket;
        let (placement, index) = if same_bucket {
            let to = target.index.min(dest.len() - 1);
            (
                Placement::Within {
                    from: snapshot.index,
                    to,
                },
                to,
            )
        } else {
            let to = target.index.min(dest.len());
            (Placement::Across { to }, to)
        };
        if same_bucket && index == snapshot.index {
            debug!(issue = %snapshot.issue.id, "dropped in place");
            return Ok(None);
        }

        let order_by = self.view.order_by();
        let group_by = self.view.group_by();
        let mut moved = snapshot.issue.clone();
        if order_by == OrderBy::Manual {
            moved.sort_order = self.allocator.allocate(&dest.issues, &snapshot.issue, placement);
        }
        if group_by.is_writable()
            && (order_by == OrderBy::Manual || !same_bucket)
            && !apply_group_key(&mut moved, group_by, &target.bucket)
        {
            warn!(bucket = %target.bucket, %group_by, "bucket is not a valid value, attribute kept");
        }

        self.take(&snapshot);
        let dest = self.collection.bucket_or_insert(&target.bucket);
        let index = index.min(dest.len());
        dest.issues.insert(index, moved.clone());
        order_issues(&mut dest.issues, order_by);
        if let Some(source) = self.collection.bucket_mut(&snapshot.bucket) {
            order_issues(&mut source.issues, order_by);
        }

        info!(
            issue = %moved.id,
            from = %snapshot.bucket,
            to = %target.bucket,
            sort_order = moved.sort_order,
            "issue moved"
        );
        let patch = IssuePatch::from_issue(&moved);
        Ok(Some(self.ticket(WriteAction::Update { patch }, snapshot)))
    }

    /// Optimistically drop an issue from the scoped cycle or module and
    /// return the container removal to send.
    ///
    /// # Errors
    ///
    /// Returns [`ReorderError::NoContainer`] for project-scoped views,
    /// [`ReorderError::IssueNotFound`] when the issue is not on the board and
    /// [`ReorderError::MissingBridge`] when it is not linked to the container.
    pub fn begin_remove_from_container(
        &mut self,
        issue_id: &str,
    ) -> Result<Option<PendingWrite>, ReorderError> {
        if self.route.resolved().is_none() {
            debug!("removal ignored: route unresolved");
            return Ok(None);
        }
        let container = self.route.scope.container().ok_or(ReorderError::NoContainer)?;
        let location = self
            .collection
            .locate(issue_id)
            .ok_or_else(|| ReorderError::IssueNotFound(issue_id.to_string()))?;
        let snapshot = self.checked_source(&BucketPos::new(location.bucket, location.index))?;
        let bridge_id = container
            .bridge_of(&snapshot.issue)
            .ok_or_else(|| ReorderError::MissingBridge(issue_id.to_string()))?
            .to_string();

        self.take(&snapshot);
        info!(issue = issue_id, container = container.id(), "issue removed from container");
        Ok(Some(self.ticket(
            WriteAction::RemoveFromContainer {
                container,
                bridge_id,
            },
            snapshot,
        )))
    }

    fn take(&mut self, snapshot: &Snapshot) {
        if let Some(bucket) = self.collection.bucket_mut(&snapshot.bucket) {
            bucket.issues.retain(|i| i.id != snapshot.issue.id);
        }
    }

    fn ticket(&mut self, action: WriteAction, snapshot: Snapshot) -> PendingWrite {
        self.next_revision += 1;
        let revision = self.next_revision;
        self.revisions.insert(snapshot.issue.id.clone(), revision);
        self.in_flight += 1;
        PendingWrite {
            revision,
            issue_id: snapshot.issue.id.clone(),
            route: self.route.clone(),
            action,
            snapshot,
        }
    }

    /// Apply the outcome of the remote call behind `write`.
    pub fn settle(
        &mut self,
        write: &PendingWrite,
        outcome: Result<WriteResponse, ServiceError>,
    ) -> Settlement {
        self.in_flight = self.in_flight.saturating_sub(1);
        if self.revisions.get(&write.issue_id) != Some(&write.revision) {
            debug!(issue = %write.issue_id, revision = write.revision, "stale settlement ignored");
            return Settlement::Superseded;
        }
        self.revisions.remove(&write.issue_id);

        match outcome {
            Err(error) => {
                warn!(issue = %write.issue_id, %error, "write failed, restoring snapshot");
                self.restore(&write.snapshot);
                Settlement::RolledBack { error }
            }
            Ok(WriteResponse::Removed) => Settlement::Removed {
                refresh: refresh_targets(&write.route),
            },
            Ok(WriteResponse::Updated(issue)) => {
                let marked_done = self.is_done_transition(&write.snapshot.issue, &issue);
                if marked_done {
                    info!(issue = %issue.id, "issue marked done");
                }
                self.adopt(issue);
                Settlement::Applied {
                    marked_done,
                    refresh: refresh_targets(&write.route),
                }
            }
        }
    }

    fn is_done_transition(&self, before: &Issue, after: &Issue) -> bool {
        let states = &self.domain.states;
        group_of(states, &before.state) != Some(StateGroup::Completed)
            && group_of(states, &after.state) == Some(StateGroup::Completed)
    }

    fn restore(&mut self, snapshot: &Snapshot) {
        self.collection.remove_issue(&snapshot.issue.id);
        let order_by = self.view.order_by();
        let bucket = self.collection.bucket_or_insert(&snapshot.bucket);
        let index = snapshot.index.min(bucket.len());
        bucket.issues.insert(index, snapshot.issue.clone());
        order_issues(&mut bucket.issues, order_by);
    }

    fn adopt(&mut self, issue: Issue) {
        let Some((location, _)) = self.collection.remove_issue(&issue.id) else {
            debug!(issue = %issue.id, "settled issue no longer on the board");
            return;
        };
        let group_by = self.view.group_by();
        let key = if group_by.is_writable() {
            group_key(&issue, group_by)
        } else {
            location.bucket
        };
        let order_by = self.view.order_by();
        let bucket = self.collection.bucket_or_insert(&key);
        let index = location.index.min(bucket.len());
        bucket.issues.insert(index, issue);
        order_issues(&mut bucket.issues, order_by);
    }
}
