//! Tests for the work queue and work item model.

use serde_json::json;
use std::time::{Duration, Instant};
use tgpg::engine::WorkQueue;
use tgpg::model::{Retirement, Signals, WorkItem};

fn item(deadline: Option<Instant>) -> WorkItem {
    WorkItem::new(json!({"chat": 1}), deadline, Box::new(|_| {}))
}

#[test]
fn queue_preserves_insertion_order() {
    let mut queue = WorkQueue::new();
    let ids: Vec<_> = (0..3).map(|_| queue.push(item(None))).collect();

    let order: Vec<_> = queue.iter().map(WorkItem::id).collect();
    assert_eq!(order, ids);

    assert!(queue.remove(ids[1]).is_some());
    let order: Vec<_> = queue.iter().map(WorkItem::id).collect();
    assert_eq!(order, vec![ids[0], ids[2]]);
}

#[test]
fn removing_twice_yields_nothing() {
    let mut queue = WorkQueue::new();
    let id = queue.push(item(None));

    assert!(queue.remove(id).is_some());
    assert!(queue.remove(id).is_none());
    assert!(queue.is_empty());
}

#[test]
fn expired_lists_newest_first() {
    let now = Instant::now() + Duration::from_secs(1);
    let mut queue = WorkQueue::new();

    let old = queue.push(item(Some(now - Duration::from_millis(10))));
    queue.push(item(None));
    let fresh = queue.push(item(Some(now + Duration::from_secs(5))));
    let new = queue.push(item(Some(now)));

    assert_eq!(queue.expired(now), vec![new, old]);
    assert_eq!(
        queue.expired(now + Duration::from_secs(5)),
        vec![new, fresh, old]
    );
}

#[test]
fn new_item_is_allowed_and_not_started() {
    let item = item(None);
    assert!(item.is_allowed());
    assert!(!item.is_started());
    assert!(!item.is_expired(Instant::now()));
    assert_eq!(item.payload(), &json!({"chat": 1}));
}

#[test]
fn retirement_reasons_render_for_logs() {
    assert_eq!(Retirement::TimedOut.to_string(), "timed out");
    assert_eq!(
        Retirement::Failed("no chat".to_string()).to_string(),
        "failed: no chat"
    );
    assert_eq!(Retirement::Cancelled.label(), "cancelled");
}

#[test]
fn signals_merge_accumulates() {
    let mut pending = Signals::default();
    assert!(pending.is_empty());

    pending.merge(Signals::reconfigure());
    pending.merge(Signals::terminate());
    assert!(pending.reconfigure);
    assert!(pending.terminate);
    assert!(!pending.quit);
    assert!(!pending.reopen_logs);
}
