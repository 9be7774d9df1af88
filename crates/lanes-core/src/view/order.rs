//! The ordering function shared by every view renderer.

use std::cmp::Ordering;

use super::OrderBy;
use crate::model::{Issue, Priority};

/// Sort `issues` in place by the active ordering.
///
/// Ties are broken by issue id so repeated sorts are deterministic.
pub fn order_issues(issues: &mut [Issue], order_by: OrderBy) {
    issues.sort_by(|a, b| compare(a, b, order_by));
}

#[must_use]
pub fn compare(a: &Issue, b: &Issue, order_by: OrderBy) -> Ordering {
    let primary = match order_by {
        OrderBy::Manual => a.sort_order.total_cmp(&b.sort_order),
        OrderBy::CreatedDesc => b.created_at.cmp(&a.created_at),
        OrderBy::UpdatedDesc => b.updated_at.cmp(&a.updated_at),
        OrderBy::Priority => Priority::rank(a.priority)
            .cmp(&Priority::rank(b.priority))
            .then_with(|| a.sort_order.total_cmp(&b.sort_order)),
    };
    primary.then_with(|| a.id.cmp(&b.id))
}
