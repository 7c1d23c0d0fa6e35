//! Protection passes against the in-memory platform.

use std::sync::Arc;

use groupwarden::platform::Platform;
use groupwarden::protection::{Guardian, LossClass};
use groupwarden::state::PrivilegeStore;
use groupwarden::types::Identity;

use crate::fake_platform::FakePlatform;
use crate::harness::{action_item, event, guardian, remove_item, text_item, ASSISTANT, BOT, THREAD};

const MEMBERS: &[(&str, &str)] = &[
    ("A", "alice"),
    ("B", "bob"),
    ("C", "carol"),
    ("O", "olivia"),
    ("S", "sam"),
    ("X", "xavier"),
    (BOT, "warden"),
    (ASSISTANT, "warden_helper"),
];

fn privileges(owner: &str) -> PrivilegeStore {
    let mut store = PrivilegeStore::in_memory(Vec::new());
    assert!(matches!(store.activate(THREAD, "1"), Ok(true)));
    assert!(matches!(
        store.set_owner(THREAD, Identity::new(owner)),
        Ok(true)
    ));
    store
}

async fn live(platform: &FakePlatform) -> groupwarden::platform::ThreadState {
    match platform.fetch_thread_state(THREAD).await {
        Ok(state) => state,
        Err(err) => panic!("fake state fetch should succeed: {err}"),
    }
}

/// Record the current admin list as the baseline snapshot.
async fn baseline(g: &mut Guardian, platform: &FakePlatform, store: &PrivilegeStore) {
    let state = live(platform).await;
    let report = match g.protect(THREAD, &event(&text_item("e0", "B", "hi")), state, store).await {
        Ok(report) => report,
        Err(err) => panic!("baseline pass should succeed: {err}"),
    };
    assert!(report.baseline);
}

fn snapshot(g: &Guardian) -> Vec<String> {
    g.snapshots().get(THREAD).map(<[String]>::to_vec).unwrap_or_default()
}

#[tokio::test]
async fn first_observation_only_records_baseline() {
    let bot = Arc::new(FakePlatform::new());
    bot.set_thread(THREAD, MEMBERS, &["A", "B"]);
    let store = privileges("A");
    let mut g = guardian(&bot, None);

    baseline(&mut g, &bot, &store).await;

    assert!(bot.calls().is_empty());
    assert_eq!(snapshot(&g), vec!["A", "B"]);
}

#[tokio::test]
async fn unchanged_or_grown_admin_list_takes_no_action() {
    let bot = Arc::new(FakePlatform::new());
    bot.set_thread(THREAD, MEMBERS, &["A", BOT]);
    let store = privileges("A");
    let mut g = guardian(&bot, None);
    baseline(&mut g, &bot, &store).await;

    bot.set_thread(THREAD, MEMBERS, &["A", BOT, "B"]);
    let state = live(&bot).await;
    let report = match g
        .protect(THREAD, &event(&action_item("e1", "A", "A made B an admin")), state, &store)
        .await
    {
        Ok(report) => report,
        Err(err) => panic!("pass should succeed: {err}"),
    };

    assert!(report.losses.is_empty());
    assert!(!report.acted());
    assert!(bot.calls().is_empty());
    assert_eq!(snapshot(&g), vec!["A", BOT, "B"]);
}

#[tokio::test]
async fn usurped_owner_is_restored_and_offender_stripped() {
    let bot = Arc::new(FakePlatform::new());
    bot.set_thread(THREAD, MEMBERS, &["A", "B"]);
    let store = privileges("A");
    let mut g = guardian(&bot, None);
    baseline(&mut g, &bot, &store).await;

    bot.demote(THREAD, "A");
    let state = live(&bot).await;
    let raw = action_item("e1", "C", "carol removed alice as an admin");
    let report = match g.protect(THREAD, &event(&raw), state, &store).await {
        Ok(report) => report,
        Err(err) => panic!("pass should succeed: {err}"),
    };

    assert_eq!(report.losses.len(), 1);
    assert_eq!(report.losses[0].class, LossClass::OwnerUsurped);
    assert_eq!(bot.removes(), vec![(THREAD.to_owned(), "C".to_owned())]);
    assert_eq!(bot.adds(), vec![(THREAD.to_owned(), "A".to_owned())]);

    let texts = bot.sent_texts();
    assert_eq!(texts.len(), 1);
    assert!(texts[0].contains("@carol"));
    assert!(texts[0].contains("@alice"));

    // Snapshot holds the admin list re-fetched after acting.
    assert_eq!(snapshot(&g), vec!["B", "A"]);
}

#[tokio::test]
async fn stripped_bot_is_restored_through_the_assistant() {
    let bot = Arc::new(FakePlatform::new());
    let assistant = Arc::new(FakePlatform::new());
    bot.set_thread(THREAD, MEMBERS, &[BOT, ASSISTANT, "B"]);
    let store = privileges("O");
    let mut g = guardian(&bot, Some(&assistant));
    baseline(&mut g, &bot, &store).await;

    bot.demote(THREAD, BOT);
    let state = live(&bot).await;
    let raw = action_item("e1", "B", "bob removed warden as an admin");
    let report = match g.protect(THREAD, &event(&raw), state, &store).await {
        Ok(report) => report,
        Err(err) => panic!("pass should succeed: {err}"),
    };

    assert_eq!(report.losses[0].class, LossClass::BotStripped);
    assert!(bot.removes().is_empty());
    assert!(bot.adds().is_empty());
    assert_eq!(assistant.removes(), vec![(THREAD.to_owned(), "B".to_owned())]);
    assert_eq!(assistant.adds(), vec![(THREAD.to_owned(), BOT.to_owned())]);
    // Announcements always go out from the bot account.
    assert_eq!(bot.sent_texts().len(), 1);
    assert!(assistant.sent_texts().is_empty());
}

#[tokio::test]
async fn one_offender_is_stripped_once_per_pass() {
    let bot = Arc::new(FakePlatform::new());
    let assistant = Arc::new(FakePlatform::new());
    bot.set_thread(THREAD, MEMBERS, &["A", BOT, ASSISTANT]);
    let store = privileges("A");
    let mut g = guardian(&bot, Some(&assistant));
    baseline(&mut g, &bot, &store).await;

    bot.demote(THREAD, "A");
    bot.demote(THREAD, BOT);
    let state = live(&bot).await;
    let raw = action_item("e1", "C", "carol removed admins");
    let report = match g.protect(THREAD, &event(&raw), state, &store).await {
        Ok(report) => report,
        Err(err) => panic!("pass should succeed: {err}"),
    };

    let classes: Vec<LossClass> = report.losses.iter().map(|l| l.class).collect();
    assert_eq!(classes, vec![LossClass::OwnerUsurped, LossClass::BotStripped]);
    assert_eq!(assistant.removes(), vec![(THREAD.to_owned(), "C".to_owned())]);
    assert_eq!(
        assistant.adds(),
        vec![
            (THREAD.to_owned(), "A".to_owned()),
            (THREAD.to_owned(), BOT.to_owned()),
        ]
    );
    assert_eq!(bot.sent_texts().len(), 2);
}

#[tokio::test]
async fn owner_demoting_a_co_owner_is_tolerated() {
    let bot = Arc::new(FakePlatform::new());
    bot.set_thread(THREAD, MEMBERS, &["O", "S", BOT]);
    let mut store = privileges("O");
    assert!(matches!(store.add_secondary_owner(THREAD, "S"), Ok(true)));
    let mut g = guardian(&bot, None);
    baseline(&mut g, &bot, &store).await;

    bot.demote(THREAD, "S");
    let state = live(&bot).await;
    let raw = action_item("e1", "O", "olivia removed sam as an admin");
    let report = match g.protect(THREAD, &event(&raw), state, &store).await {
        Ok(report) => report,
        Err(err) => panic!("pass should succeed: {err}"),
    };

    assert_eq!(report.losses[0].class, LossClass::SecondaryDemotedByOwner);
    assert!(!report.acted());
    assert!(bot.calls().is_empty());
    assert_eq!(snapshot(&g), vec!["O", BOT]);
}

#[tokio::test]
async fn owner_demoting_a_plain_admin_is_treated_as_theft() {
    let bot = Arc::new(FakePlatform::new());
    bot.set_thread(THREAD, MEMBERS, &["O", "A", BOT]);
    let store = privileges("O");
    let mut g = guardian(&bot, None);
    baseline(&mut g, &bot, &store).await;

    bot.demote(THREAD, "A");
    let state = live(&bot).await;
    let raw = action_item("e1", "O", "olivia removed alice as an admin");
    let report = match g.protect(THREAD, &event(&raw), state, &store).await {
        Ok(report) => report,
        Err(err) => panic!("pass should succeed: {err}"),
    };

    assert_eq!(report.losses[0].class, LossClass::AdminStolen);
    assert_eq!(bot.removes(), vec![(THREAD.to_owned(), "O".to_owned())]);
    assert_eq!(bot.adds(), vec![(THREAD.to_owned(), "A".to_owned())]);
}

#[tokio::test]
async fn co_owner_demoted_by_someone_else_is_restored() {
    let bot = Arc::new(FakePlatform::new());
    bot.set_thread(THREAD, MEMBERS, &["O", "S", BOT, "C"]);
    let mut store = privileges("O");
    assert!(matches!(store.add_secondary_owner(THREAD, "S"), Ok(true)));
    let mut g = guardian(&bot, None);
    baseline(&mut g, &bot, &store).await;

    bot.demote(THREAD, "S");
    let state = live(&bot).await;
    let raw = action_item("e1", "C", "carol removed sam as an admin");
    let report = match g.protect(THREAD, &event(&raw), state, &store).await {
        Ok(report) => report,
        Err(err) => panic!("pass should succeed: {err}"),
    };

    assert_eq!(report.losses[0].class, LossClass::SecondaryOwnerStolen);
    assert_eq!(bot.removes(), vec![(THREAD.to_owned(), "C".to_owned())]);
    assert_eq!(bot.adds(), vec![(THREAD.to_owned(), "S".to_owned())]);
}

#[tokio::test]
async fn unattributed_loss_only_refreshes_the_snapshot() {
    let bot = Arc::new(FakePlatform::new());
    bot.set_thread(THREAD, MEMBERS, &["A", "B", BOT]);
    let store = privileges("A");
    let mut g = guardian(&bot, None);
    baseline(&mut g, &bot, &store).await;

    bot.demote(THREAD, "B");
    let state = live(&bot).await;
    let report = match g
        .protect(THREAD, &event(&text_item("e1", "C", "hello")), state, &store)
        .await
    {
        Ok(report) => report,
        Err(err) => panic!("pass should succeed: {err}"),
    };

    assert_eq!(report.losses[0].class, LossClass::Unattributed);
    assert!(bot.calls().is_empty());
    assert_eq!(snapshot(&g), vec!["A", BOT]);
}

#[tokio::test]
async fn failed_refetch_keeps_the_observed_state() {
    let bot = Arc::new(FakePlatform::new());
    bot.set_thread(THREAD, MEMBERS, &["A", "B", BOT]);
    let store = privileges("A");
    let mut g = guardian(&bot, None);
    baseline(&mut g, &bot, &store).await;

    bot.demote(THREAD, "B");
    let state = live(&bot).await;
    bot.fail_state_fetch(true);
    let raw = action_item("e1", "C", "carol removed bob as an admin");
    let report = match g.protect(THREAD, &event(&raw), state, &store).await {
        Ok(report) => report,
        Err(err) => panic!("pass should succeed despite the failed re-fetch: {err}"),
    };

    assert_eq!(report.losses[0].class, LossClass::AdminStolen);
    assert_eq!(bot.adds(), vec![(THREAD.to_owned(), "B".to_owned())]);
    assert_eq!(snapshot(&g), vec!["A", BOT]);
}

#[tokio::test]
async fn burst_of_removals_demotes_the_remover_once() {
    let bot = Arc::new(FakePlatform::new());
    bot.set_thread(THREAD, MEMBERS, &["O", "X", BOT]);
    let store = privileges("O");
    let mut g = guardian(&bot, None);
    baseline(&mut g, &bot, &store).await;

    for (n, victim) in ["A", "B", "C", "S"].into_iter().enumerate() {
        let state = live(&bot).await;
        let raw = remove_item(&format!("r{n}"), "X", &[victim]);
        let report = match g.protect(THREAD, &event(&raw), state, &store).await {
            Ok(report) => report,
            Err(err) => panic!("pass should succeed: {err}"),
        };
        assert!(!report.mass_removal);
    }
    assert!(bot.calls().is_empty());

    let state = live(&bot).await;
    let report = match g
        .protect(THREAD, &event(&remove_item("r4", "X", &["O"])), state, &store)
        .await
    {
        Ok(report) => report,
        Err(err) => panic!("pass should succeed: {err}"),
    };
    assert!(report.mass_removal);
    assert_eq!(bot.removes(), vec![(THREAD.to_owned(), "X".to_owned())]);
    assert_eq!(bot.sent_texts().len(), 1);

    // The window was cleared; the next removal does not fire again.
    let state = live(&bot).await;
    let report = match g
        .protect(THREAD, &event(&remove_item("r5", "X", &["B"])), state, &store)
        .await
    {
        Ok(report) => report,
        Err(err) => panic!("pass should succeed: {err}"),
    };
    assert!(!report.mass_removal);
    assert_eq!(bot.removes().len(), 1);
}

#[tokio::test]
async fn owner_removals_are_never_counted() {
    let bot = Arc::new(FakePlatform::new());
    bot.set_thread(THREAD, MEMBERS, &["O", BOT]);
    let store = privileges("O");
    let mut g = guardian(&bot, None);
    baseline(&mut g, &bot, &store).await;

    for n in 0..8 {
        let state = live(&bot).await;
        let raw = remove_item(&format!("r{n}"), "O", &["C"]);
        let report = match g.protect(THREAD, &event(&raw), state, &store).await {
            Ok(report) => report,
            Err(err) => panic!("pass should succeed: {err}"),
        };
        assert!(!report.mass_removal);
    }
    assert!(bot.calls().is_empty());
}
