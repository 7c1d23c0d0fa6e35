//! Item selection and poll cycles.

use std::sync::Arc;
use std::time::Duration;

use groupwarden::platform::{Platform, ThreadSummary};
use groupwarden::poller::{select_new, Poller};
use serde_json::Value;
use tokio::sync::watch;

use crate::harness::{harness, text_item, BOT, DEV, THREAD};

fn ids(items: &[Value], last: Option<&str>) -> Vec<String> {
    select_new(items, last).into_iter().map(|e| e.id).collect()
}

#[test]
fn fresh_start_takes_only_the_newest_item() {
    let items = vec![text_item("e3", "A", "c"), text_item("e2", "A", "b")];
    assert_eq!(ids(&items, None), vec!["e3"]);
}

#[test]
fn newer_items_come_oldest_first() {
    let items = vec![
        text_item("e5", "A", "e"),
        text_item("e4", "A", "d"),
        text_item("e3", "A", "c"),
        text_item("e2", "A", "b"),
    ];
    assert_eq!(ids(&items, Some("e3")), vec!["e4", "e5"]);
    assert!(ids(&items, Some("e5")).is_empty());
}

#[test]
fn scrolled_out_last_id_takes_the_whole_page() {
    let items = vec![text_item("e9", "A", "x"), text_item("e8", "A", "y")];
    assert_eq!(ids(&items, Some("e1")), vec!["e8", "e9"]);
}

fn summary(thread_id: &str, is_group: bool) -> ThreadSummary {
    ThreadSummary {
        thread_id: thread_id.to_owned(),
        title: None,
        users: Vec::new(),
        is_group,
    }
}

#[tokio::test]
async fn poll_cycle_visits_groups_and_advances() {
    let h = harness(false, |_| {});
    h.bot.set_thread(THREAD, &[(DEV, "dev"), ("A", "alice"), (BOT, "warden")], &[BOT]);
    h.bot.set_inbox(vec![summary(THREAD, true), summary("dm", false)]);
    h.bot.set_items(
        THREAD,
        vec![text_item("e3", DEV, "/activate"), text_item("e2", "A", "old")],
    );
    h.bot.set_items("dm", vec![text_item("d1", DEV, "/activate")]);

    let platform: Arc<dyn Platform> = h.bot.clone();
    let mut poller = Poller::new(platform, h.engine, Duration::from_secs(1));

    let stats = match poller.poll_once().await {
        Ok(stats) => stats,
        Err(err) => panic!("cycle should succeed: {err}"),
    };
    assert_eq!(stats.threads, 1);
    assert_eq!(stats.processed, 1);
    assert_eq!(stats.failed, 0);
    assert!(poller.engine().privileges().is_activated(THREAD));
    assert!(!poller.engine().privileges().is_activated("dm"));

    h.bot.set_items(
        THREAD,
        vec![
            text_item("e5", "A", "two"),
            text_item("e4", "A", "one"),
            text_item("e3", DEV, "/activate"),
        ],
    );
    let stats = match poller.poll_once().await {
        Ok(stats) => stats,
        Err(err) => panic!("cycle should succeed: {err}"),
    };
    assert_eq!(stats.processed, 2);
    assert_eq!(poller.engine().last_processed(THREAD), Some("e5"));

    // Nothing new: nothing processed.
    let stats = match poller.poll_once().await {
        Ok(stats) => stats,
        Err(err) => panic!("cycle should succeed: {err}"),
    };
    assert_eq!(stats.processed, 0);
}

#[tokio::test]
async fn failed_event_holds_back_the_rest_of_its_thread() {
    let h = harness(false, |store| {
        assert!(matches!(store.activate(THREAD, DEV), Ok(true)));
    });
    h.bot.set_thread(THREAD, &[(DEV, "dev"), ("A", "alice"), (BOT, "warden")], &[BOT]);
    h.bot.set_inbox(vec![summary(THREAD, true)]);
    h.bot.set_items(THREAD, vec![text_item("e1", "A", "first")]);

    let platform: Arc<dyn Platform> = h.bot.clone();
    let mut poller = Poller::new(platform, h.engine, Duration::from_secs(1));
    if let Err(err) = poller.poll_once().await {
        panic!("cycle should succeed: {err}");
    }
    assert_eq!(poller.engine().last_processed(THREAD), Some("e1"));

    h.bot.set_items(
        THREAD,
        vec![
            text_item("e3", "A", "third"),
            text_item("e2", "A", "second"),
            text_item("e1", "A", "first"),
        ],
    );
    h.bot.fail_state_fetch(true);
    let stats = match poller.poll_once().await {
        Ok(stats) => stats,
        Err(err) => panic!("cycle should succeed: {err}"),
    };
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.processed, 0);
    assert_eq!(poller.engine().last_processed(THREAD), Some("e1"));

    h.bot.fail_state_fetch(false);
    let stats = match poller.poll_once().await {
        Ok(stats) => stats,
        Err(err) => panic!("cycle should succeed: {err}"),
    };
    assert_eq!(stats.processed, 2);
    assert_eq!(poller.engine().last_processed(THREAD), Some("e3"));
}

#[tokio::test]
async fn run_stops_on_shutdown() {
    let h = harness(false, |_| {});
    let platform: Arc<dyn Platform> = h.bot.clone();
    let poller = Poller::new(platform, h.engine, Duration::from_millis(10));

    let (tx, rx) = watch::channel(false);
    let task = tokio::spawn(poller.run(rx));
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(tx.send(true).is_ok());

    match tokio::time::timeout(Duration::from_secs(5), task).await {
        Ok(Ok(())) => {}
        other => panic!("poller should stop after shutdown: {other:?}"),
    }
}
