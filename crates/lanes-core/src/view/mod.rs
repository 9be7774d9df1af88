//! Owned view state: layout, grouping, ordering and filters.
//!
//! A [`ViewState`] is passed by reference to whatever needs it. Every write
//! bumps its revision, which is how a [`crate::board::Board`] notices that
//! its grouped collection must be rebuilt.

pub mod filter;
pub mod order;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{fmt, str::FromStr};

pub use filter::{FilterKey, IssueFilters, IssueType};
pub use order::order_issues;

use crate::group::NONE_BUCKET;
use crate::model::{ParseEnumError, Priority, normalize};

/// Attribute used to partition issues into buckets.
///
/// Unrecognized names parse to [`GroupBy::None`] so a bad saved view still
/// renders, ungrouped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum GroupBy {
    #[default]
    None,
    State,
    Priority,
    Labels,
    Assignees,
    CreatedBy,
}

impl GroupBy {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::State => "state",
            Self::Priority => "priority",
            Self::Labels => "labels",
            Self::Assignees => "assignees",
            Self::CreatedBy => "created_by",
        }
    }

    /// Lenient parse: anything unknown falls back to ungrouped.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match normalize(raw).as_str() {
            "state" => Self::State,
            "priority" => Self::Priority,
            "labels" | "label" => Self::Labels,
            "assignees" | "assignee" => Self::Assignees,
            "created_by" | "created-by" => Self::CreatedBy,
            "none" | "" | "null" => Self::None,
            other => {
                tracing::warn!(group_by = other, "unknown grouping, showing ungrouped");
                Self::None
            }
        }
    }

    /// Groupings whose attribute a drop may rewrite.
    #[must_use]
    pub const fn is_writable(self) -> bool {
        matches!(self, Self::State | Self::Priority)
    }
}

impl From<String> for GroupBy {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<GroupBy> for String {
    fn from(value: GroupBy) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for GroupBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordering criterion inside a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum OrderBy {
    /// Manual ordering by fractional sort key.
    #[default]
    Manual,
    CreatedDesc,
    UpdatedDesc,
    Priority,
}

impl OrderBy {
    /// Wire name, as sent in the `order_by` query parameter.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "sort_order",
            Self::CreatedDesc => "-created_at",
            Self::UpdatedDesc => "-updated_at",
            Self::Priority => "priority",
        }
    }
}

impl fmt::Display for OrderBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderBy {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "sort_order" | "manual" => Ok(Self::Manual),
            "-created_at" | "created" | "newest" => Ok(Self::CreatedDesc),
            "-updated_at" | "updated" | "recent" => Ok(Self::UpdatedDesc),
            "priority" => Ok(Self::Priority),
            _ => Err(ParseEnumError {
                expected: "order_by",
                got: s.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for OrderBy {
    type Error = ParseEnumError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<OrderBy> for String {
    fn from(value: OrderBy) -> Self {
        value.as_str().to_string()
    }
}

/// How the issue set is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layout {
    #[default]
    List,
    Kanban,
    Calendar,
    Spreadsheet,
    GanttChart,
}

impl Layout {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::List => "list",
            Self::Kanban => "kanban",
            Self::Calendar => "calendar",
            Self::Spreadsheet => "spreadsheet",
            Self::GanttChart => "gantt_chart",
        }
    }

    /// Only list and kanban render buckets; the rest show one flat set.
    #[must_use]
    pub const fn renders_buckets(self) -> bool {
        matches!(self, Self::List | Self::Kanban)
    }
}

/// Parameters handed to the query service for one fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueryParams {
    pub group_by: GroupBy,
    pub order_by: OrderBy,
    pub filters: IssueFilters,
}

impl QueryParams {
    /// Query-string pairs: `order_by`, `group_by` when grouped, then filters.
    #[must_use]
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![("order_by".to_string(), self.order_by.as_str().to_string())];
        if self.group_by != GroupBy::None {
            pairs.push(("group_by".to_string(), self.group_by.as_str().to_string()));
        }
        pairs.extend(self.filters.to_pairs());
        pairs
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ViewState {
    layout: Layout,
    group_by: GroupBy,
    order_by: OrderBy,
    filters: IssueFilters,
    #[serde(skip)]
    revision: u64,
}

impl ViewState {
    #[must_use]
    pub fn new(layout: Layout, group_by: GroupBy, order_by: OrderBy) -> Self {
        Self {
            layout,
            group_by,
            order_by,
            filters: IssueFilters::default(),
            revision: 0,
        }
    }

    #[must_use]
    pub const fn layout(&self) -> Layout {
        self.layout
    }

    /// The grouping as selected, regardless of layout.
    #[must_use]
    pub const fn selected_group_by(&self) -> GroupBy {
        self.group_by
    }

    /// The grouping actually applied: ungrouped for flat layouts.
    #[must_use]
    pub const fn group_by(&self) -> GroupBy {
        if self.layout.renders_buckets() {
            self.group_by
        } else {
            GroupBy::None
        }
    }

    #[must_use]
    pub const fn order_by(&self) -> OrderBy {
        self.order_by
    }

    #[must_use]
    pub const fn filters(&self) -> &IssueFilters {
        &self.filters
    }

    /// Incremented on every write.
    #[must_use]
    pub const fn revision(&self) -> u64 {
        self.revision
    }

    pub fn set_layout(&mut self, layout: Layout) {
        self.layout = layout;
        self.touch();
    }

    pub fn set_group_by(&mut self, group_by: GroupBy) {
        self.group_by = group_by;
        self.touch();
    }

    pub fn set_order_by(&mut self, order_by: OrderBy) {
        self.order_by = order_by;
        self.touch();
    }

    /// Merge `filters` into the current set key by key.
    pub fn set_filters(&mut self, filters: IssueFilters) {
        self.filters.merge(filters);
        self.touch();
    }

    pub fn set_filter(&mut self, key: FilterKey, values: Option<Vec<String>>) {
        self.filters.set(key, values);
        self.touch();
    }

    pub fn clear_filters(&mut self) {
        self.filters.clear();
        self.touch();
    }

    const fn touch(&mut self) {
        self.revision += 1;
    }

    #[must_use]
    pub fn query_params(&self) -> QueryParams {
        QueryParams {
            group_by: self.group_by(),
            order_by: self.order_by,
            filters: self.filters.clone(),
        }
    }

    /// Fields to preload when creating an issue from a bucket's add button.
    #[must_use]
    pub fn prefill_for_bucket(&self, bucket: &str) -> Map<String, Value> {
        let mut prefill = Map::new();
        let group_by = self.group_by();
        let value = match group_by {
            GroupBy::None => return prefill,
            GroupBy::State => Value::String(bucket.to_string()),
            GroupBy::Priority => bucket
                .parse::<Priority>()
                .map_or(Value::Null, |p| Value::String(p.as_str().to_string())),
            GroupBy::Labels | GroupBy::Assignees => {
                if bucket == NONE_BUCKET {
                    Value::Array(Vec::new())
                } else {
                    Value::Array(vec![Value::String(bucket.to_string())])
                }
            }
            GroupBy::CreatedBy => {
                if bucket == NONE_BUCKET {
                    Value::Null
                } else {
                    Value::String(bucket.to_string())
                }
            }
        };
        prefill.insert(group_by.as_str().to_string(), value);
        prefill
    }
}
