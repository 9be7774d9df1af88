//! In-memory system of record.
//!
//! Backs the CLI's file store and the test suites. Writes can be made to fail
//! on demand, and every call is recorded so tests can assert on the exact
//! remote traffic a drop produced.

use chrono::Utc;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::model::{Issue, IssuePatch, State};
use crate::service::{
    Container, ContainerScope, IssueQuery, IssueRemoval, IssueUpdate, Notifier, RouteContext,
    ServiceError, Toast,
};
use crate::view::QueryParams;

/// A call observed by [`MemoryService`].
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCall {
    FetchIssues,
    FetchStates,
    Update { issue_id: String, patch: IssuePatch },
    Remove { issue_id: String },
    RemoveFromContainer { container: Container, bridge_id: String },
}

#[derive(Debug, Default)]
struct Inner {
    states: Vec<State>,
    issues: Vec<Issue>,
    failures: VecDeque<ServiceError>,
    calls: Vec<RecordedCall>,
    writes: usize,
}

#[derive(Debug, Default)]
pub struct MemoryService {
    inner: Mutex<Inner>,
}

impl MemoryService {
    #[must_use]
    pub fn new(states: Vec<State>, issues: Vec<Issue>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                states,
                issues,
                ..Inner::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make the next write (update or removal) fail with `error`.
    pub fn fail_next_write(&self, error: ServiceError) {
        self.lock().failures.push_back(error);
    }

    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock().calls.clone()
    }

    #[must_use]
    pub fn issues(&self) -> Vec<Issue> {
        self.lock().issues.clone()
    }

    #[must_use]
    pub fn states(&self) -> Vec<State> {
        self.lock().states.clone()
    }

    #[must_use]
    pub fn issue(&self, issue_id: &str) -> Option<Issue> {
        self.lock().issues.iter().find(|i| i.id == issue_id).cloned()
    }

    /// Number of writes that succeeded.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.lock().writes
    }

    /// Consume the service, returning its states and issues.
    #[must_use]
    pub fn into_parts(self) -> (Vec<State>, Vec<Issue>) {
        let inner = self.inner.into_inner().unwrap_or_else(PoisonError::into_inner);
        (inner.states, inner.issues)
    }

    fn begin_write(inner: &mut Inner, route: &RouteContext, call: RecordedCall) -> Result<(), ServiceError> {
        inner.calls.push(call);
        if route.resolved().is_none() {
            return Err(ServiceError::MissingRoute);
        }
        if let Some(error) = inner.failures.pop_front() {
            return Err(error);
        }
        Ok(())
    }
}

fn in_scope(issue: &Issue, scope: &ContainerScope) -> bool {
    match scope {
        ContainerScope::Project => true,
        ContainerScope::Cycle(id) => issue.cycle.as_ref().is_some_and(|c| &c.id == id),
        ContainerScope::Module(id) => issue.module.as_ref().is_some_and(|m| &m.id == id),
    }
}

impl IssueQuery for MemoryService {
    fn fetch_issues(
        &self,
        route: &RouteContext,
        params: &QueryParams,
    ) -> Result<Vec<Issue>, ServiceError> {
        let mut inner = self.lock();
        inner.calls.push(RecordedCall::FetchIssues);
        if route.resolved().is_none() {
            return Err(ServiceError::MissingRoute);
        }
        Ok(inner
            .issues
            .iter()
            .filter(|issue| in_scope(issue, &route.scope))
            .filter(|issue| params.filters.matches(issue, &inner.states))
            .cloned()
            .collect())
    }

    fn fetch_states(&self, route: &RouteContext) -> Result<Vec<State>, ServiceError> {
        let mut inner = self.lock();
        inner.calls.push(RecordedCall::FetchStates);
        if route.resolved().is_none() {
            return Err(ServiceError::MissingRoute);
        }
        Ok(inner.states.clone())
    }
}

impl IssueUpdate for MemoryService {
    fn update_issue(
        &self,
        route: &RouteContext,
        issue_id: &str,
        patch: &IssuePatch,
    ) -> Result<Issue, ServiceError> {
        let mut inner = self.lock();
        Self::begin_write(
            &mut inner,
            route,
            RecordedCall::Update {
                issue_id: issue_id.to_string(),
                patch: patch.clone(),
            },
        )?;

        let issue = inner
            .issues
            .iter_mut()
            .find(|i| i.id == issue_id)
            .ok_or_else(|| ServiceError::NotFound(issue_id.to_string()))?;
        patch.apply_to(issue);
        issue.updated_at = Utc::now();
        let updated = issue.clone();
        inner.writes += 1;
        Ok(updated)
    }
}

impl IssueRemoval for MemoryService {
    fn remove_issue(&self, route: &RouteContext, issue_id: &str) -> Result<(), ServiceError> {
        let mut inner = self.lock();
        Self::begin_write(
            &mut inner,
            route,
            RecordedCall::Remove {
                issue_id: issue_id.to_string(),
            },
        )?;

        let before = inner.issues.len();
        inner.issues.retain(|i| i.id != issue_id);
        if inner.issues.len() == before {
            return Err(ServiceError::NotFound(issue_id.to_string()));
        }
        inner.writes += 1;
        Ok(())
    }

    fn remove_issue_from_container(
        &self,
        route: &RouteContext,
        container: &Container,
        bridge_id: &str,
    ) -> Result<(), ServiceError> {
        let mut inner = self.lock();
        Self::begin_write(
            &mut inner,
            route,
            RecordedCall::RemoveFromContainer {
                container: container.clone(),
                bridge_id: bridge_id.to_string(),
            },
        )?;

        let issue = inner
            .issues
            .iter_mut()
            .find(|i| container.bridge_of(i) == Some(bridge_id))
            .ok_or_else(|| ServiceError::NotFound(bridge_id.to_string()))?;
        match container {
            Container::Cycle(_) => issue.cycle = None,
            Container::Module(_) => issue.module = None,
        }
        inner.writes += 1;
        Ok(())
    }
}

/// Notifier that keeps every toast for later inspection.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    toasts: Mutex<Vec<Toast>>,
}

impl RecordingNotifier {
    #[must_use]
    pub fn toasts(&self) -> Vec<Toast> {
        self.toasts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, toast: Toast) {
        self.toasts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(toast);
    }
}

#[cfg(test)]
mod tests {
    use super::{MemoryService, RecordedCall};
    use crate::model::{ContainerLink, Issue, IssuePatch, Priority, State, StateGroup};
    use crate::service::{
        Container, ContainerScope, IssueQuery, IssueRemoval, IssueUpdate, RouteContext,
        ServiceError,
    };
    use crate::view::{FilterKey, QueryParams};

    fn service() -> MemoryService {
        let mut in_cycle = Issue::new("b", "B", "done", 2.0);
        in_cycle.cycle = Some(ContainerLink {
            id: "c1".into(),
            bridge_id: "bridge-b".into(),
        });
        MemoryService::new(
            vec![
                State::new("todo", "Todo", StateGroup::Unstarted),
                State::new("done", "Done", StateGroup::Completed),
            ],
            vec![Issue::new("a", "A", "todo", 1.0), in_cycle],
        )
    }

    fn route() -> RouteContext {
        RouteContext::project("acme", "p1")
    }

    #[test]
    fn fetch_respects_scope_and_filters() {
        let svc = service();
        let all = svc.fetch_issues(&route(), &QueryParams::default()).unwrap();
        assert_eq!(all.len(), 2);

        let cycle = route().with_scope(ContainerScope::Cycle("c1".into()));
        let scoped = svc.fetch_issues(&cycle, &QueryParams::default()).unwrap();
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].id, "b");

        let mut params = QueryParams::default();
        params.filters.set(FilterKey::State, Some(vec!["todo".into()]));
        let filtered = svc.fetch_issues(&route(), &params).unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].id, "a");
    }

    #[test]
    fn update_applies_patch_and_records_call() {
        let svc = service();
        let patch = IssuePatch {
            state: "done".into(),
            priority: Some(Priority::Low),
            sort_order: 99.0,
        };
        let updated = svc.update_issue(&route(), "a", &patch).unwrap();
        assert_eq!(updated.state, "done");
        assert_eq!(svc.issue("a").map(|i| i.priority), Some(Some(Priority::Low)));
        assert_eq!(
            svc.calls(),
            vec![RecordedCall::Update {
                issue_id: "a".into(),
                patch
            }]
        );
        assert_eq!(svc.write_count(), 1);
    }

    #[test]
    fn injected_failure_is_consumed_once() {
        let svc = service();
        svc.fail_next_write(ServiceError::Transport("offline".into()));
        let patch = IssuePatch::from_issue(&Issue::new("a", "A", "todo", 5.0));

        assert!(matches!(
            svc.update_issue(&route(), "a", &patch),
            Err(ServiceError::Transport(_))
        ));
        assert!(svc.update_issue(&route(), "a", &patch).is_ok());
        assert_eq!(svc.write_count(), 1);
    }

    #[test]
    fn removal_and_container_removal() {
        let svc = service();
        svc.remove_issue_from_container(&route(), &Container::Cycle("c1".into()), "bridge-b")
            .unwrap();
        assert!(svc.issue("b").unwrap().cycle.is_none());

        svc.remove_issue(&route(), "a").unwrap();
        assert!(svc.issue("a").is_none());
        assert!(matches!(
            svc.remove_issue(&route(), "a"),
            Err(ServiceError::NotFound(_))
        ));
    }

    #[test]
    fn missing_route_is_rejected() {
        let svc = service();
        let err = svc
            .fetch_issues(&RouteContext::default(), &QueryParams::default())
            .unwrap_err();
        assert_eq!(err, ServiceError::MissingRoute);
    }
}
