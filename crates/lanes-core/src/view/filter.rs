//! Issue filters applied by the query service.
//!
//! Each key holds an optional list of accepted values. A key that is `None`
//! does not constrain the result; a key holding values keeps only issues that
//! match at least one of them. Keys are combined with AND semantics.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::group::NONE_BUCKET;
use crate::model::state::group_of;
use crate::model::{Issue, State, StateGroup};

/// Coarse issue type filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueType {
    /// Unstarted or started work.
    Active,
    /// Issues still in a backlog state.
    Backlog,
}

impl IssueType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Backlog => "backlog",
        }
    }

    const fn accepts(self, group: StateGroup) -> bool {
        match self {
            Self::Active => matches!(group, StateGroup::Unstarted | StateGroup::Started),
            Self::Backlog => matches!(group, StateGroup::Backlog),
        }
    }
}

/// Filter keys addressable one at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKey {
    State,
    Priority,
    Assignees,
    Labels,
    CreatedBy,
}

impl FilterKey {
    pub const ALL: [Self; 5] = [
        Self::State,
        Self::Priority,
        Self::Assignees,
        Self::Labels,
        Self::CreatedBy,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::State => "state",
            Self::Priority => "priority",
            Self::Assignees => "assignees",
            Self::Labels => "labels",
            Self::CreatedBy => "created_by",
        }
    }
}

impl fmt::Display for FilterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignees: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<Vec<String>>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub issue_type: Option<IssueType>,
}

impl IssueFilters {
    #[must_use]
    pub fn get(&self, key: FilterKey) -> Option<&[String]> {
        match key {
            FilterKey::State => self.state.as_deref(),
            FilterKey::Priority => self.priority.as_deref(),
            FilterKey::Assignees => self.assignees.as_deref(),
            FilterKey::Labels => self.labels.as_deref(),
            FilterKey::CreatedBy => self.created_by.as_deref(),
        }
    }

    const fn slot_mut(&mut self, key: FilterKey) -> &mut Option<Vec<String>> {
        match key {
            FilterKey::State => &mut self.state,
            FilterKey::Priority => &mut self.priority,
            FilterKey::Assignees => &mut self.assignees,
            FilterKey::Labels => &mut self.labels,
            FilterKey::CreatedBy => &mut self.created_by,
        }
    }

    /// Replace one key. `None` clears it.
    pub fn set(&mut self, key: FilterKey, values: Option<Vec<String>>) {
        *self.slot_mut(key) = values;
    }

    /// Drop a single value from a key; the key is cleared once it is empty.
    pub fn remove_value(&mut self, key: FilterKey, value: &str) {
        let slot = self.slot_mut(key);
        if let Some(values) = slot {
            values.retain(|v| v != value);
            if values.is_empty() {
                *slot = None;
            }
        }
    }

    /// Merge `other` into `self`: every key set in `other` overrides.
    pub fn merge(&mut self, other: Self) {
        for key in FilterKey::ALL {
            if let Some(values) = other.get(key) {
                self.set(key, Some(values.to_vec()));
            }
        }
        if other.issue_type.is_some() {
            self.issue_type = other.issue_type;
        }
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// True when at least one key constrains the result.
    #[must_use]
    pub fn is_applied(&self) -> bool {
        self.issue_type.is_some() || FilterKey::ALL.iter().any(|k| self.get(*k).is_some())
    }

    /// Key/value pairs for a query string; list values are comma-joined.
    #[must_use]
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        if let Some(issue_type) = self.issue_type {
            pairs.push(("type".to_string(), issue_type.as_str().to_string()));
        }
        for key in FilterKey::ALL {
            if let Some(values) = self.get(key) {
                pairs.push((key.as_str().to_string(), values.join(",")));
            }
        }
        pairs
    }

    /// Whether `issue` passes every applied key. `states` resolves the
    /// state group needed by the issue type filter.
    #[must_use]
    pub fn matches(&self, issue: &Issue, states: &[State]) -> bool {
        if let Some(issue_type) = self.issue_type {
            let accepted =
                group_of(states, &issue.state).is_some_and(|group| issue_type.accepts(group));
            if !accepted {
                return false;
            }
        }

        let priority = issue
            .priority
            .map_or(NONE_BUCKET, crate::model::Priority::as_str);
        let created_by = issue.created_by.as_deref().unwrap_or(NONE_BUCKET);

        accepts_one(self.state.as_deref(), &issue.state)
            && accepts_one(self.priority.as_deref(), priority)
            && accepts_any(self.assignees.as_deref(), &issue.assignees)
            && accepts_any(self.labels.as_deref(), &issue.labels)
            && accepts_one(self.created_by.as_deref(), created_by)
    }
}

fn accepts_one(allowed: Option<&[String]>, value: &str) -> bool {
    allowed.is_none_or(|allowed| allowed.iter().any(|a| a == value))
}

fn accepts_any(allowed: Option<&[String]>, values: &[String]) -> bool {
    allowed.is_none_or(|allowed| {
        if values.is_empty() {
            allowed.iter().any(|a| a == NONE_BUCKET)
        } else {
            values.iter().any(|v| allowed.contains(v))
        }
    })
}
