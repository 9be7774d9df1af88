//! REST backend for the issue services.
//!
//! Paths follow the tracker's project API:
//!
//! ```text
//! GET    {base}/api/workspaces/{slug}/projects/{project}/issues/?order_by=..
//! GET    {base}/api/workspaces/{slug}/projects/{project}/cycles/{id}/cycle-issues/
//! GET    {base}/api/workspaces/{slug}/projects/{project}/modules/{id}/module-issues/
//! GET    {base}/api/workspaces/{slug}/projects/{project}/states/
//! PATCH  {base}/api/workspaces/{slug}/projects/{project}/issues/{id}/
//! DELETE {base}/api/workspaces/{slug}/projects/{project}/issues/{id}/
//! DELETE {base}/api/workspaces/{slug}/projects/{project}/cycles/{id}/cycle-issues/{bridge}/
//! ```

use lanes_core::model::{Issue, IssuePatch, State};
use lanes_core::service::{
    Container, ContainerScope, IssueQuery, IssueRemoval, IssueUpdate, RouteContext, ServiceError,
};
use lanes_core::view::QueryParams;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Issue lists come back flat, or keyed by group when the query was grouped.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum IssuesPayload {
    List(Vec<Issue>),
    Grouped(BTreeMap<String, Vec<Issue>>),
}

impl IssuesPayload {
    /// Flatten, keeping the first copy of issues listed under several groups.
    fn into_issues(self) -> Vec<Issue> {
        match self {
            Self::List(issues) => issues,
            Self::Grouped(groups) => {
                let mut seen = HashSet::new();
                groups
                    .into_values()
                    .flatten()
                    .filter(|issue| seen.insert(issue.id.clone()))
                    .collect()
            }
        }
    }
}

/// States come back flat or keyed by state group.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StatesPayload {
    List(Vec<State>),
    Grouped(BTreeMap<String, Vec<State>>),
}

impl StatesPayload {
    fn into_states(self) -> Vec<State> {
        let mut states = match self {
            Self::List(states) => states,
            Self::Grouped(groups) => groups.into_values().flatten().collect(),
        };
        states.sort_by_key(|s| s.group.rank());
        states
    }
}

pub struct RestClient {
    agent: ureq::Agent,
    base_url: String,
    token: Option<String>,
}

impl RestClient {
    pub fn new(base_url: &str, token: Option<String>) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build();
        Self {
            agent,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    fn project_url(&self, route: &RouteContext) -> Result<String, ServiceError> {
        let (slug, project) = route.resolved().ok_or(ServiceError::MissingRoute)?;
        Ok(format!(
            "{}/api/workspaces/{slug}/projects/{project}",
            self.base_url
        ))
    }

    fn issues_url(&self, route: &RouteContext) -> Result<String, ServiceError> {
        let project = self.project_url(route)?;
        Ok(match &route.scope {
            ContainerScope::Project => format!("{project}/issues/"),
            ContainerScope::Cycle(id) => format!("{project}/cycles/{id}/cycle-issues/"),
            ContainerScope::Module(id) => format!("{project}/modules/{id}/module-issues/"),
        })
    }

    fn issue_url(&self, route: &RouteContext, issue_id: &str) -> Result<String, ServiceError> {
        Ok(format!("{}/issues/{issue_id}/", self.project_url(route)?))
    }

    fn bridge_url(
        &self,
        route: &RouteContext,
        container: &Container,
        bridge_id: &str,
    ) -> Result<String, ServiceError> {
        let project = self.project_url(route)?;
        Ok(match container {
            Container::Cycle(id) => format!("{project}/cycles/{id}/cycle-issues/{bridge_id}/"),
            Container::Module(id) => format!("{project}/modules/{id}/module-issues/{bridge_id}/"),
        })
    }

    fn request(&self, method: &str, url: &str) -> ureq::Request {
        let mut request = self
            .agent
            .request(method, url)
            .set("Accept", "application/json")
            .set("User-Agent", "lanes-cli");
        if let Some(token) = &self.token {
            request = request.set("Authorization", &format!("Bearer {token}"));
        }
        request
    }

    fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(String, String)],
    ) -> Result<T, ServiceError> {
        debug!(url, "GET");
        let mut request = self.request("GET", url);
        for (key, value) in query {
            request = request.query(key, value);
        }
        let response = request.call().map_err(map_ureq_error)?;
        response
            .into_json::<T>()
            .map_err(|e| ServiceError::Decode(e.to_string()))
    }

    fn delete(&self, url: &str) -> Result<(), ServiceError> {
        debug!(url, "DELETE");
        self.request("DELETE", url)
            .call()
            .map(drop)
            .map_err(map_ureq_error)
    }
}

fn map_ureq_error(err: ureq::Error) -> ServiceError {
    match err {
        ureq::Error::Status(status, response) => {
            let message = response
                .into_string()
                .unwrap_or_else(|_| String::from("<unreadable body>"));
            ServiceError::Rejected { status, message }
        }
        ureq::Error::Transport(transport) => ServiceError::Transport(transport.to_string()),
    }
}

impl IssueQuery for RestClient {
    fn fetch_issues(
        &self,
        route: &RouteContext,
        params: &QueryParams,
    ) -> Result<Vec<Issue>, ServiceError> {
        let url = self.issues_url(route)?;
        let payload: IssuesPayload = self.get_json(&url, &params.to_pairs())?;
        Ok(payload.into_issues())
    }

    fn fetch_states(&self, route: &RouteContext) -> Result<Vec<State>, ServiceError> {
        let url = format!("{}/states/", self.project_url(route)?);
        let payload: StatesPayload = self.get_json(&url, &[])?;
        Ok(payload.into_states())
    }
}

impl IssueUpdate for RestClient {
    fn update_issue(
        &self,
        route: &RouteContext,
        issue_id: &str,
        patch: &IssuePatch,
    ) -> Result<Issue, ServiceError> {
        let url = self.issue_url(route, issue_id)?;
        debug!(url, sort_order = patch.sort_order, "PATCH");
        let response = self
            .request("PATCH", &url)
            .send_json(patch)
            .map_err(map_ureq_error)?;
        response
            .into_json::<Issue>()
            .map_err(|e| ServiceError::Decode(e.to_string()))
    }
}

impl IssueRemoval for RestClient {
    fn remove_issue(&self, route: &RouteContext, issue_id: &str) -> Result<(), ServiceError> {
        self.delete(&self.issue_url(route, issue_id)?)
    }

    fn remove_issue_from_container(
        &self,
        route: &RouteContext,
        container: &Container,
        bridge_id: &str,
    ) -> Result<(), ServiceError> {
        self.delete(&self.bridge_url(route, container, bridge_id)?)
    }
}
