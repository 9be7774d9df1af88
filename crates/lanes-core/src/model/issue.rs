use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use super::{ParseEnumError, normalize};

/// Issue priority. An issue without a priority is grouped under `"None"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Urgent,
    High,
    Medium,
    Low,
}

impl Priority {
    /// Every priority, most pressing first.
    pub const ALL: [Self; 4] = [Self::Urgent, Self::High, Self::Medium, Self::Low];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Urgent => "urgent",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }

    /// Rank used by priority ordering: urgent < high < medium < low < none.
    #[must_use]
    pub const fn rank(priority: Option<Self>) -> u8 {
        match priority {
            Some(Self::Urgent) => 0,
            Some(Self::High) => 1,
            Some(Self::Medium) => 2,
            Some(Self::Low) => 3,
            None => 4,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "urgent" => Ok(Self::Urgent),
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            _ => Err(ParseEnumError {
                expected: "priority",
                got: s.to_string(),
            }),
        }
    }
}

/// Membership of an issue in a cycle or module. `bridge_id` identifies the
/// membership row itself and is what container removal addresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerLink {
    pub id: String,
    pub bridge_id: String,
}

/// Cached copy of an issue owned by the remote system of record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub id: String,
    #[serde(default)]
    pub sequence_id: u64,
    pub name: String,
    /// State id.
    pub state: String,
    #[serde(default)]
    pub priority: Option<Priority>,
    /// Label ids.
    #[serde(default)]
    pub labels: Vec<String>,
    /// Member ids.
    #[serde(default)]
    pub assignees: Vec<String>,
    #[serde(default)]
    pub created_by: Option<String>,
    pub sort_order: f64,
    #[serde(default = "epoch")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "epoch")]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub target_date: Option<NaiveDate>,
    #[serde(default)]
    pub project: String,
    #[serde(default)]
    pub workspace: String,
    #[serde(default)]
    pub cycle: Option<ContainerLink>,
    #[serde(default)]
    pub module: Option<ContainerLink>,
}

const fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

impl Issue {
    /// Minimal issue with the fields ordering cares about.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        state: impl Into<String>,
        sort_order: f64,
    ) -> Self {
        Self {
            id: id.into(),
            sequence_id: 0,
            name: name.into(),
            state: state.into(),
            priority: None,
            labels: Vec::new(),
            assignees: Vec::new(),
            created_by: None,
            sort_order,
            created_at: epoch(),
            updated_at: epoch(),
            target_date: None,
            project: String::new(),
            workspace: String::new(),
            cycle: None,
            module: None,
        }
    }

    #[must_use]
    pub const fn with_priority(mut self, priority: Option<Priority>) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels = labels.into_iter().map(Into::into).collect();
        self
    }
}

/// Fields persisted by a drop: the writable group attributes and the key.
///
/// All three are always sent so the remote record matches what the board
/// displays, whichever of them the drop actually changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssuePatch {
    pub state: String,
    pub priority: Option<Priority>,
    pub sort_order: f64,
}

impl IssuePatch {
    #[must_use]
    pub fn from_issue(issue: &Issue) -> Self {
        Self {
            state: issue.state.clone(),
            priority: issue.priority,
            sort_order: issue.sort_order,
        }
    }

    pub fn apply_to(&self, issue: &mut Issue) {
        issue.state.clone_from(&self.state);
        issue.priority = self.priority;
        issue.sort_order = self.sort_order;
    }
}

#[cfg(test)]
mod tests {
    use super::{Issue, IssuePatch, Priority};
    use std::str::FromStr;

    #[test]
    fn priority_json_uses_lowercase_and_null() {
        assert_eq!(
            serde_json::to_string(&Priority::Urgent).unwrap(),
            "\"urgent\""
        );
        let issue: Issue = serde_json::from_str(
            r#"{"id":"a","name":"A","state":"todo","priority":null,"sort_order":65535}"#,
        )
        .unwrap();
        assert_eq!(issue.priority, None);
        assert!((issue.sort_order - 65535.0).abs() < f64::EPSILON);
        assert!(issue.labels.is_empty());
        assert!(issue.cycle.is_none());
    }

    #[test]
    fn priority_parse_is_case_insensitive() {
        assert_eq!(Priority::from_str(" High ").unwrap(), Priority::High);
        assert!(Priority::from_str("critical").is_err());
        for value in Priority::ALL {
            assert_eq!(Priority::from_str(&value.to_string()).unwrap(), value);
        }
    }

    #[test]
    fn rank_puts_none_last() {
        assert!(Priority::rank(Some(Priority::Urgent)) < Priority::rank(Some(Priority::Low)));
        assert!(Priority::rank(Some(Priority::Low)) < Priority::rank(None));
    }

    #[test]
    fn patch_applies_group_fields_and_key() {
        let source = Issue::new("a", "A", "done", 250.0).with_priority(Some(Priority::High));
        let patch = IssuePatch::from_issue(&source);

        let mut target = Issue::new("a", "A", "todo", 100.0);
        patch.apply_to(&mut target);
        assert_eq!(target.state, "done");
        assert_eq!(target.priority, Some(Priority::High));
        assert!((target.sort_order - 250.0).abs() < f64::EPSILON);
    }
}
