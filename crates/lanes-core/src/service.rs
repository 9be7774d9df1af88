//! Collaborator contracts: the issue query/update/removal services and the
//! user-facing notification channel.
//!
//! The engine is protocol-agnostic; implementations live elsewhere
//! ([`crate::memory::MemoryService`] in this crate, a JSON file store and a
//! REST client in the CLI).

use serde::Serialize;
use std::fmt;

use crate::error::ErrorCode;
use crate::model::{Issue, IssuePatch, State};
use crate::view::QueryParams;

/// The container a view lists issues from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum ContainerScope {
    #[default]
    Project,
    Cycle(String),
    Module(String),
}

impl ContainerScope {
    /// The cycle or module a view is scoped to, if any.
    #[must_use]
    pub fn container(&self) -> Option<Container> {
        match self {
            Self::Project => None,
            Self::Cycle(id) => Some(Container::Cycle(id.clone())),
            Self::Module(id) => Some(Container::Module(id.clone())),
        }
    }
}

/// A cycle or module an issue can be removed from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum Container {
    Cycle(String),
    Module(String),
}

impl Container {
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Cycle(id) | Self::Module(id) => id,
        }
    }

    /// The bridge id linking `issue` to this container, if it is a member.
    #[must_use]
    pub fn bridge_of<'a>(&self, issue: &'a Issue) -> Option<&'a str> {
        let link = match self {
            Self::Cycle(_) => issue.cycle.as_ref(),
            Self::Module(_) => issue.module.as_ref(),
        }?;
        (link.id == self.id()).then_some(link.bridge_id.as_str())
    }
}

/// Routing context a view runs under. Operations are no-ops until both the
/// workspace and the project are known.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct RouteContext {
    pub workspace_slug: Option<String>,
    pub project_id: Option<String>,
    pub scope: ContainerScope,
}

impl RouteContext {
    #[must_use]
    pub fn project(workspace_slug: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            workspace_slug: Some(workspace_slug.into()),
            project_id: Some(project_id.into()),
            scope: ContainerScope::Project,
        }
    }

    #[must_use]
    pub fn with_scope(mut self, scope: ContainerScope) -> Self {
        self.scope = scope;
        self
    }

    /// `(workspace_slug, project_id)` when both are present.
    #[must_use]
    pub fn resolved(&self) -> Option<(&str, &str)> {
        Some((self.workspace_slug.as_deref()?, self.project_id.as_deref()?))
    }
}

/// Cached aggregates that depend on the issue set and must be refreshed
/// after a write settles.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum RefreshTarget {
    CycleIssues(String),
    CycleDetails(String),
    ModuleIssues(String),
    ModuleDetails(String),
    ProjectIssues(String),
}

impl fmt::Display for RefreshTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CycleIssues(id) => write!(f, "cycle-issues:{id}"),
            Self::CycleDetails(id) => write!(f, "cycle-details:{id}"),
            Self::ModuleIssues(id) => write!(f, "module-issues:{id}"),
            Self::ModuleDetails(id) => write!(f, "module-details:{id}"),
            Self::ProjectIssues(id) => write!(f, "project-issues:{id}"),
        }
    }
}

/// Aggregates to refresh for a write made under `route`: the scoped
/// container's issues and details, then the project issue list.
#[must_use]
pub fn refresh_targets(route: &RouteContext) -> Vec<RefreshTarget> {
    let mut targets = match &route.scope {
        ContainerScope::Project => Vec::new(),
        ContainerScope::Cycle(id) => vec![
            RefreshTarget::CycleIssues(id.clone()),
            RefreshTarget::CycleDetails(id.clone()),
        ],
        ContainerScope::Module(id) => vec![
            RefreshTarget::ModuleIssues(id.clone()),
            RefreshTarget::ModuleDetails(id.clone()),
        ],
    };
    if let Some((_, project_id)) = route.resolved() {
        targets.push(RefreshTarget::ProjectIssues(project_id.to_string()));
    }
    targets
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    #[error("workspace or project not set")]
    MissingRoute,

    #[error("issue not found: {0}")]
    NotFound(String),

    #[error("request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("could not decode response: {0}")]
    Decode(String),
}

impl ServiceError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::MissingRoute => ErrorCode::MissingRoute,
            Self::NotFound(_) => ErrorCode::IssueNotFound,
            Self::Rejected { .. } => ErrorCode::RemoteRejected,
            Self::Transport(_) => ErrorCode::TransportFailure,
            Self::Decode(_) => ErrorCode::DecodeFailure,
        }
    }
}

/// Source of the authoritative issue set.
pub trait IssueQuery {
    /// Issues of the route's container matching `params`, in any order.
    fn fetch_issues(
        &self,
        route: &RouteContext,
        params: &QueryParams,
    ) -> Result<Vec<Issue>, ServiceError>;

    /// Project workflow states, in display order.
    fn fetch_states(&self, route: &RouteContext) -> Result<Vec<State>, ServiceError>;
}

pub trait IssueUpdate {
    /// Persist `patch` and return the authoritative issue.
    fn update_issue(
        &self,
        route: &RouteContext,
        issue_id: &str,
        patch: &IssuePatch,
    ) -> Result<Issue, ServiceError>;
}

pub trait IssueRemoval {
    fn remove_issue(&self, route: &RouteContext, issue_id: &str) -> Result<(), ServiceError>;

    fn remove_issue_from_container(
        &self,
        route: &RouteContext,
        container: &Container,
        bridge_id: &str,
    ) -> Result<(), ServiceError>;
}

/// Everything the reconciliation writer talks to.
pub trait IssueService: IssueQuery + IssueUpdate + IssueRemoval {}

impl<T: IssueQuery + IssueUpdate + IssueRemoval + ?Sized> IssueService for T {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToastKind {
    Success,
    Error,
}

/// A user-facing notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Toast {
    pub kind: ToastKind,
    pub title: String,
    pub message: String,
}

impl Toast {
    #[must_use]
    pub fn success(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: ToastKind::Success,
            title: title.into(),
            message: message.into(),
        }
    }

    #[must_use]
    pub fn error(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: ToastKind::Error,
            title: title.into(),
            message: message.into(),
        }
    }
}

/// The generic notification channel.
pub trait Notifier {
    fn notify(&self, toast: Toast);
}

/// Notifier that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, toast: Toast) {
        match toast.kind {
            ToastKind::Success => tracing::info!(title = %toast.title, "{}", toast.message),
            ToastKind::Error => tracing::warn!(title = %toast.title, "{}", toast.message),
        }
    }
}
