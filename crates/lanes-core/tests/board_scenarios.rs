//! End-to-end board scenarios against the in-memory service.

use lanes_core::board::{Board, BucketPos, DropEvent};
use lanes_core::memory::{MemoryService, RecordedCall, RecordingNotifier};
use lanes_core::model::{Issue, IssuePatch, Priority, State, StateGroup};
use lanes_core::reconcile::{DropReport, Reconciler};
use lanes_core::service::{RouteContext, ServiceError, ToastKind};
use lanes_core::sort_key::SortKeyAllocator;
use lanes_core::view::{FilterKey, GroupBy, Layout, OrderBy, ViewState};

fn states() -> Vec<State> {
    vec![
        State::new("backlog", "Backlog", StateGroup::Backlog),
        State::new("todo", "Todo", StateGroup::Unstarted),
        State::new("done", "Done", StateGroup::Completed),
    ]
}

fn open(service: &MemoryService, group_by: GroupBy) -> Board {
    let mut board = Board::new(
        RouteContext::project("acme", "p1"),
        ViewState::new(Layout::Kanban, group_by, OrderBy::Manual),
        SortKeyAllocator::default(),
    );
    board.refresh(service).unwrap();
    board
}

fn ids(board: &Board, bucket: &str) -> Vec<String> {
    board
        .collection()
        .bucket(bucket)
        .map(|b| b.issues.iter().map(|i| i.id.clone()).collect())
        .unwrap_or_default()
}

fn updates(service: &MemoryService) -> Vec<(String, IssuePatch)> {
    service
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            RecordedCall::Update { issue_id, patch } => Some((issue_id, patch)),
            _ => None,
        })
        .collect()
}

#[test]
fn dropping_first_issue_between_second_and_third() {
    let service = MemoryService::new(
        states(),
        vec![
            Issue::new("A", "A", "todo", 100.0),
            Issue::new("B", "B", "todo", 200.0),
            Issue::new("C", "C", "todo", 300.0),
        ],
    );
    let notifier = RecordingNotifier::default();
    let mut board = open(&service, GroupBy::State);

    Reconciler::new(&service, &notifier)
        .handle_drop(
            &mut board,
            DropEvent::to_bucket(BucketPos::new("todo", 0), BucketPos::new("todo", 1)),
        )
        .unwrap();

    assert_eq!(ids(&board, "todo"), ["B", "A", "C"]);
    let sent = updates(&service);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "A");
    assert!((sent[0].1.sort_order - 250.0).abs() < 1e-9);
    assert_eq!(sent[0].1.state, "todo");
}

#[test]
fn empty_done_bucket_receives_issue_with_key_unchanged() {
    let service = MemoryService::new(states(), vec![Issue::new("X", "X", "todo", 4_200.0)]);
    let notifier = RecordingNotifier::default();
    let mut board = open(&service, GroupBy::State);
    assert!(board.collection().bucket("done").is_some_and(|b| b.is_empty()));

    let report = Reconciler::new(&service, &notifier)
        .handle_drop(
            &mut board,
            DropEvent::to_bucket(BucketPos::new("todo", 0), BucketPos::new("done", 0)),
        )
        .unwrap();

    let stored = service.issue("X").unwrap();
    assert_eq!(stored.state, "done");
    assert!((stored.sort_order - 4_200.0).abs() < 1e-9);
    assert!(matches!(report, DropReport::Moved { marked_done: true, .. }));
    assert_eq!(ids(&board, "done"), ["X"]);
}

#[test]
fn dropping_at_end_of_single_issue_bucket_adds_offset() {
    let service = MemoryService::new(
        states(),
        vec![
            Issue::new("A", "A", "backlog", 100.0),
            Issue::new("N", "New", "todo", 7.0),
        ],
    );
    let notifier = RecordingNotifier::default();
    let mut board = open(&service, GroupBy::State);

    Reconciler::new(&service, &notifier)
        .handle_drop(
            &mut board,
            DropEvent::to_bucket(BucketPos::new("todo", 0), BucketPos::new("backlog", 1)),
        )
        .unwrap();

    assert!((service.issue("N").unwrap().sort_order - 10_100.0).abs() < 1e-9);
    assert_eq!(ids(&board, "backlog"), ["A", "N"]);
}

#[test]
fn discard_deletes_without_allocating_a_key() {
    let service = MemoryService::new(
        states(),
        vec![
            Issue::new("A", "A", "todo", 100.0),
            Issue::new("B", "B", "todo", 200.0),
        ],
    );
    let notifier = RecordingNotifier::default();
    let mut board = open(&service, GroupBy::State);

    Reconciler::new(&service, &notifier)
        .handle_drop(&mut board, DropEvent::discard(BucketPos::new("todo", 0)))
        .unwrap();

    assert!(updates(&service).is_empty());
    assert!(service.calls().contains(&RecordedCall::Remove {
        issue_id: "A".into()
    }));
    assert_eq!(ids(&board, "todo"), ["B"]);
}

#[test]
fn failed_update_restores_arrangement_and_raises_error_toast() {
    let service = MemoryService::new(
        states(),
        vec![
            Issue::new("A", "A", "todo", 100.0).with_priority(Some(Priority::High)),
            Issue::new("B", "B", "todo", 200.0),
        ],
    );
    service.fail_next_write(ServiceError::Transport("connection reset".into()));
    let notifier = RecordingNotifier::default();
    let mut board = open(&service, GroupBy::Priority);
    let before = board.collection().clone();

    let report = Reconciler::new(&service, &notifier)
        .handle_drop(
            &mut board,
            DropEvent::to_bucket(BucketPos::new("high", 0), BucketPos::new("low", 0)),
        )
        .unwrap();

    assert!(matches!(report, DropReport::RolledBack { .. }));
    assert_eq!(board.collection(), &before);
    let toasts = notifier.toasts();
    assert_eq!(toasts.len(), 1);
    assert_eq!(toasts[0].kind, ToastKind::Error);
    assert_eq!(service.issue("A").unwrap().priority, Some(Priority::High));
}

#[test]
fn refresh_honours_view_filters() {
    let service = MemoryService::new(
        states(),
        vec![
            Issue::new("A", "A", "todo", 100.0).with_labels(["bug"]),
            Issue::new("B", "B", "todo", 200.0),
        ],
    );
    let mut board = open(&service, GroupBy::Labels);
    assert_eq!(ids(&board, "bug"), ["A"]);
    assert_eq!(ids(&board, "None"), ["B"]);

    board
        .view_mut()
        .set_filter(FilterKey::Labels, Some(vec!["bug".into()]));
    assert!(board.is_stale());
    board.refresh(&service).unwrap();
    assert!(!board.is_stale());
    assert_eq!(board.collection().len(), 1);
}
