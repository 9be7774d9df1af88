//! Grouping index: partition a flat issue sequence into ordered buckets.
//!
//! Buckets are seeded from the attribute's domain (every state, every
//! priority, every known label or member) so that empty buckets still exist
//! as drop targets. Issues whose value is outside the domain get a bucket
//! appended after the seeded ones.

use serde::Serialize;
use std::collections::BTreeSet;

use crate::model::{Issue, Priority, State};
use crate::view::GroupBy;

/// Bucket key for issues with no value for the grouping attribute.
pub const NONE_BUCKET: &str = "None";

/// The single bucket used when grouping is disabled.
pub const ALL_ISSUES_BUCKET: &str = "All Issues";

/// An ordered run of issues sharing one group key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bucket {
    pub key: String,
    pub issues: Vec<Issue>,
}

impl Bucket {
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            issues: Vec::new(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.issues.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    #[must_use]
    pub fn position(&self, issue_id: &str) -> Option<usize> {
        self.issues.iter().position(|i| i.id == issue_id)
    }
}

/// Per-bucket issue count, for summary widgets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BucketCount {
    pub key: String,
    pub count: usize,
}

/// Where an issue currently sits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub bucket: String,
    pub index: usize,
}

/// The full issue set of a view, partitioned into buckets in display order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct GroupedCollection {
    buckets: Vec<Bucket>,
}

impl GroupedCollection {
    #[must_use]
    pub fn buckets(&self) -> &[Bucket] {
        &self.buckets
    }

    #[must_use]
    pub fn bucket(&self, key: &str) -> Option<&Bucket> {
        self.buckets.iter().find(|b| b.key == key)
    }

    pub fn bucket_mut(&mut self, key: &str) -> Option<&mut Bucket> {
        self.buckets.iter_mut().find(|b| b.key == key)
    }

    pub(crate) fn bucket_or_insert(&mut self, key: &str) -> &mut Bucket {
        let index = match self.buckets.iter().position(|b| b.key == key) {
            Some(index) => index,
            None => {
                self.buckets.push(Bucket::new(key));
                self.buckets.len() - 1
            }
        };
        &mut self.buckets[index]
    }

    /// Total number of issues across all buckets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buckets.iter().map(Bucket::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buckets.iter().all(Bucket::is_empty)
    }

    #[must_use]
    pub fn locate(&self, issue_id: &str) -> Option<Location> {
        self.buckets.iter().find_map(|bucket| {
            bucket.position(issue_id).map(|index| Location {
                bucket: bucket.key.clone(),
                index,
            })
        })
    }

    #[must_use]
    pub fn issue(&self, issue_id: &str) -> Option<&Issue> {
        self.buckets
            .iter()
            .flat_map(|b| b.issues.iter())
            .find(|i| i.id == issue_id)
    }

    /// Remove an issue from whichever bucket holds it.
    pub fn remove_issue(&mut self, issue_id: &str) -> Option<(Location, Issue)> {
        let location = self.locate(issue_id)?;
        let bucket = self.bucket_mut(&location.bucket)?;
        let issue = bucket.issues.remove(location.index);
        Some((location, issue))
    }

    #[must_use]
    pub fn counts(&self) -> Vec<BucketCount> {
        self.buckets
            .iter()
            .map(|b| BucketCount {
                key: b.key.clone(),
                count: b.len(),
            })
            .collect()
    }
}

/// Known values for each grouping attribute.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupDomain {
    pub states: Vec<State>,
    pub labels: Vec<String>,
    pub members: Vec<String>,
}

impl GroupDomain {
    /// Domain from the project's states plus every label and member seen on
    /// `issues`, sorted.
    #[must_use]
    pub fn from_issues(states: Vec<State>, issues: &[Issue]) -> Self {
        let mut labels = BTreeSet::new();
        let mut members = BTreeSet::new();
        for issue in issues {
            labels.extend(issue.labels.iter().cloned());
            members.extend(issue.assignees.iter().cloned());
            members.extend(issue.created_by.iter().cloned());
        }
        Self {
            states,
            labels: labels.into_iter().collect(),
            members: members.into_iter().collect(),
        }
    }

    fn seed_keys(&self, group_by: GroupBy) -> Vec<String> {
        let with_none = |values: &[String]| -> Vec<String> {
            values
                .iter()
                .cloned()
                .chain(std::iter::once(NONE_BUCKET.to_string()))
                .collect()
        };
        match group_by {
            GroupBy::None => vec![ALL_ISSUES_BUCKET.to_string()],
            GroupBy::State => self.states.iter().map(|s| s.id.clone()).collect(),
            GroupBy::Priority => Priority::ALL
                .iter()
                .map(|p| p.as_str().to_string())
                .chain(std::iter::once(NONE_BUCKET.to_string()))
                .collect(),
            GroupBy::Labels => with_none(&self.labels),
            GroupBy::Assignees | GroupBy::CreatedBy => with_none(&self.members),
        }
    }
}

/// The bucket an issue belongs to under `group_by`.
///
/// Multi-valued attributes use their first value.
#[must_use]
pub fn group_key(issue: &Issue, group_by: GroupBy) -> String {
    let or_none = |value: Option<&String>| value.map_or_else(|| NONE_BUCKET.to_string(), Clone::clone);
    match group_by {
        GroupBy::None => ALL_ISSUES_BUCKET.to_string(),
        GroupBy::State => issue.state.clone(),
        GroupBy::Priority => issue
            .priority
            .map_or(NONE_BUCKET, Priority::as_str)
            .to_string(),
        GroupBy::Labels => or_none(issue.labels.first()),
        GroupBy::Assignees => or_none(issue.assignees.first()),
        GroupBy::CreatedBy => or_none(issue.created_by.as_ref()),
    }
}

/// Rewrite the issue's group attribute to `key`. Returns `false` when the
/// grouping is not writable or `key` is not a valid value for it.
pub fn apply_group_key(issue: &mut Issue, group_by: GroupBy, key: &str) -> bool {
    match group_by {
        GroupBy::State => {
            key.clone_into(&mut issue.state);
            true
        }
        GroupBy::Priority => {
            if key == NONE_BUCKET {
                issue.priority = None;
                return true;
            }
            match key.parse::<Priority>() {
                Ok(priority) => {
                    issue.priority = Some(priority);
                    true
                }
                Err(_) => false,
            }
        }
        GroupBy::None | GroupBy::Labels | GroupBy::Assignees | GroupBy::CreatedBy => false,
    }
}

/// Partition `issues` (already in display order) into buckets.
#[must_use]
pub fn group_issues(issues: Vec<Issue>, group_by: GroupBy, domain: &GroupDomain) -> GroupedCollection {
    let mut collection = GroupedCollection {
        buckets: domain
            .seed_keys(group_by)
            .into_iter()
            .map(Bucket::new)
            .collect(),
    };
    for issue in issues {
        let key = group_key(&issue, group_by);
        collection.bucket_or_insert(&key).issues.push(issue);
    }
    collection
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::StateGroup;

    fn domain() -> GroupDomain {
        GroupDomain {
            states: vec![
                State::new("todo", "Todo", StateGroup::Unstarted),
                State::new("doing", "Doing", StateGroup::Started),
                State::new("done", "Done", StateGroup::Completed),
            ],
            labels: vec!["bug".into(), "ui".into()],
            members: vec!["u1".into()],
        }
    }

    fn keys(collection: &GroupedCollection) -> Vec<&str> {
        collection.buckets().iter().map(|b| b.key.as_str()).collect()
    }

    #[test]
    fn ungrouped_keeps_one_bucket_in_order() {
        let issues = vec![
            Issue::new("b", "B", "todo", 2.0),
            Issue::new("a", "A", "done", 1.0),
        ];
        let collection = group_issues(issues, GroupBy::None, &domain());
        assert_eq!(keys(&collection), [ALL_ISSUES_BUCKET]);
        let ids: Vec<_> = collection.buckets()[0].issues.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, ["b", "a"]);
    }

    #[test]
    fn state_grouping_seeds_every_state() {
        let issues = vec![
            Issue::new("a", "A", "todo", 1.0),
            Issue::new("b", "B", "todo", 2.0),
        ];
        let collection = group_issues(issues, GroupBy::State, &domain());
        assert_eq!(keys(&collection), ["todo", "doing", "done"]);
        assert_eq!(collection.bucket("todo").map(Bucket::len), Some(2));
        assert!(collection.bucket("done").is_some_and(Bucket::is_empty));
        assert_eq!(collection.len(), 2);
    }

    #[test]
    fn unknown_values_get_appended_buckets() {
        let issues = vec![Issue::new("a", "A", "archived", 1.0)];
        let collection = group_issues(issues, GroupBy::State, &domain());
        assert_eq!(keys(&collection), ["todo", "doing", "done", "archived"]);
    }

    #[test]
    fn priority_grouping_has_none_bucket_last() {
        let issues = vec![
            Issue::new("a", "A", "todo", 1.0).with_priority(Some(Priority::High)),
            Issue::new("b", "B", "todo", 2.0),
        ];
        let collection = group_issues(issues, GroupBy::Priority, &domain());
        assert_eq!(keys(&collection), ["urgent", "high", "medium", "low", "None"]);
        assert_eq!(collection.locate("b").map(|l| l.bucket), Some("None".to_string()));
    }

    #[test]
    fn labels_use_first_label_only() {
        let issues = vec![
            Issue::new("a", "A", "todo", 1.0).with_labels(["ui", "bug"]),
            Issue::new("b", "B", "todo", 2.0),
        ];
        let collection = group_issues(issues, GroupBy::Labels, &domain());
        assert_eq!(collection.locate("a").map(|l| l.bucket), Some("ui".to_string()));
        assert_eq!(collection.locate("b").map(|l| l.bucket), Some("None".to_string()));
        assert_eq!(collection.len(), 2);
    }

    #[test]
    fn domain_collects_labels_and_members() {
        let mut issue = Issue::new("a", "A", "todo", 1.0).with_labels(["z", "a"]);
        issue.assignees = vec!["u2".into()];
        issue.created_by = Some("u1".into());
        let domain = GroupDomain::from_issues(Vec::new(), &[issue]);
        assert_eq!(domain.labels, ["a", "z"]);
        assert_eq!(domain.members, ["u1", "u2"]);
    }

    #[test]
    fn apply_group_key_only_writes_state_and_priority() {
        let mut issue = Issue::new("a", "A", "todo", 1.0);
        assert!(apply_group_key(&mut issue, GroupBy::State, "done"));
        assert_eq!(issue.state, "done");

        assert!(apply_group_key(&mut issue, GroupBy::Priority, "urgent"));
        assert_eq!(issue.priority, Some(Priority::Urgent));
        assert!(apply_group_key(&mut issue, GroupBy::Priority, NONE_BUCKET));
        assert_eq!(issue.priority, None);
        assert!(!apply_group_key(&mut issue, GroupBy::Priority, "whenever"));

        assert!(!apply_group_key(&mut issue, GroupBy::Labels, "bug"));
        assert!(issue.labels.is_empty());
    }

    #[test]
    fn remove_and_counts() {
        let issues = vec![
            Issue::new("a", "A", "todo", 1.0),
            Issue::new("b", "B", "done", 2.0),
        ];
        let mut collection = group_issues(issues, GroupBy::State, &domain());
        let (location, issue) = collection.remove_issue("b").unwrap();
        assert_eq!(location, Location { bucket: "done".into(), index: 0 });
        assert_eq!(issue.id, "b");
        assert!(collection.remove_issue("b").is_none());

        let counts = collection.counts();
        assert_eq!(counts[0], BucketCount { key: "todo".into(), count: 1 });
        assert_eq!(counts[2].count, 0);
    }
}
