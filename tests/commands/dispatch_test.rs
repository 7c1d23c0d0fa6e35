//! Command gating and handlers against the in-memory platform.

use std::sync::Arc;

use groupwarden::commands::{self, dispatch, CommandContext, Outcome, Verb};
use groupwarden::platform::{Platform, ThreadState};
use groupwarden::protection::Accounts;
use groupwarden::state::PrivilegeStore;
use groupwarden::types::Identity;

use crate::fake_platform::{Call, FakePlatform};
use crate::harness::{accounts, BOT, DEV, THREAD};

const MEMBERS: &[(&str, &str)] = &[
    (DEV, "dev"),
    ("A", "alice"),
    ("B", "bob"),
    ("C", "carol"),
    ("O", "olivia"),
    (BOT, "warden"),
];

struct Fixture {
    bot: Arc<FakePlatform>,
    accounts: Accounts,
    store: PrivilegeStore,
}

/// Activated thread owned by `O`, with `A` and the bot as native admins.
fn fixture() -> Fixture {
    let bot = Arc::new(FakePlatform::new());
    bot.set_thread(THREAD, MEMBERS, &["A", BOT]);
    let mut store = PrivilegeStore::in_memory([DEV.to_owned()]);
    assert!(matches!(store.activate(THREAD, DEV), Ok(true)));
    assert!(matches!(
        store.set_owner(THREAD, Identity::with_handle("O", "olivia")),
        Ok(true)
    ));
    let accounts = accounts(&bot, None);
    Fixture {
        bot,
        accounts,
        store,
    }
}

impl Fixture {
    async fn run(&mut self, caller: &str, body: &str, reply_to: Option<&str>) -> Outcome {
        let live: ThreadState = match self.bot.fetch_thread_state(THREAD).await {
            Ok(state) => state,
            Err(err) => panic!("fake state fetch should succeed: {err}"),
        };
        let Some(command) = commands::parse(body) else {
            panic!("{body:?} should parse as a command");
        };
        let caller = live.identity(caller);
        let reply_to = reply_to.map(Identity::new);
        let ctx = CommandContext {
            thread_id: THREAD,
            item_id: "cmd-1",
            caller: &caller,
            reply_to: reply_to.as_ref(),
            live: &live,
        };
        match dispatch(&command, &ctx, &mut self.store, &self.accounts).await {
            Ok(outcome) => outcome,
            Err(err) => panic!("dispatch should succeed: {err}"),
        }
    }

    fn last_reply(&self) -> String {
        match self.bot.sent_texts().last() {
            Some(text) => text.clone(),
            None => panic!("expected a reply"),
        }
    }
}

#[tokio::test]
async fn unauthorized_caller_is_dropped_silently() {
    let mut f = fixture();
    let outcome = f.run("C", "/kick @bob", None).await;
    assert_eq!(outcome, Outcome::Denied(Verb::Kick));
    assert!(f.bot.calls().is_empty());
}

#[tokio::test]
async fn developer_only_verbs_reject_the_owner() {
    let mut f = fixture();
    let outcome = f.run("O", "/leave", None).await;
    assert_eq!(outcome, Outcome::Denied(Verb::Leave));
    assert!(f.bot.calls().is_empty());
}

#[tokio::test]
async fn inactive_thread_ignores_everything_but_developer_verbs() {
    let mut f = fixture();
    assert!(matches!(f.store.deactivate(THREAD), Ok(true)));

    let outcome = f.run("O", "/admin @bob", None).await;
    assert_eq!(outcome, Outcome::Inactive(Verb::Admin));
    assert!(f.bot.calls().is_empty());

    let outcome = f.run(DEV, "/activate", None).await;
    assert_eq!(outcome, Outcome::Handled(Verb::Activate));
    assert!(f.store.is_activated(THREAD));
    assert_eq!(
        f.bot.calls(),
        vec![Call::Send {
            thread: THREAD.to_owned(),
            text: "Activated. I'm now protecting this group.".to_owned(),
            reply_to: Some("cmd-1".to_owned()),
        }]
    );
}

#[tokio::test]
async fn arabic_verb_is_equivalent() {
    let mut f = fixture();
    let outcome = f.run(DEV, "/تعطيل", None).await;
    assert_eq!(outcome, Outcome::Handled(Verb::Deactivate));
    assert!(!f.store.is_activated(THREAD));
}

#[tokio::test]
async fn owner_grants_and_revokes_bot_admin() {
    let mut f = fixture();

    assert_eq!(f.run("O", "/admin @bob", None).await, Outcome::Handled(Verb::Admin));
    assert!(f.store.is_bot_admin(THREAD, "B"));
    assert!(f.last_reply().contains("@bob now has admin powers"));

    // A bot-admin may now moderate.
    assert_eq!(f.run("B", "/kick @carol", None).await, Outcome::Handled(Verb::Kick));

    assert_eq!(f.run("O", "/unadmin @bob", None).await, Outcome::Handled(Verb::Unadmin));
    assert!(!f.store.is_bot_admin(THREAD, "B"));
}

#[tokio::test]
async fn native_admins_are_not_granted_or_kicked() {
    let mut f = fixture();

    f.run("O", "/admin @alice", None).await;
    assert!(!f.store.is_bot_admin(THREAD, "A"));
    assert!(f.last_reply().contains("already a group admin"));

    f.run("O", "/kick @alice", None).await;
    assert!(f.bot.removes().is_empty());
    assert_eq!(f.last_reply(), "Group admins can't be kicked.");
}

#[tokio::test]
async fn missing_target_gets_a_reply() {
    let mut f = fixture();
    let outcome = f.run("A", "/kick @nobody", None).await;
    assert_eq!(outcome, Outcome::Handled(Verb::Kick));
    assert!(f.bot.removes().is_empty());
    assert_eq!(f.last_reply(), "Couldn't find the user to kick.");
}

#[tokio::test]
async fn kick_by_reply_is_verified() {
    let mut f = fixture();
    assert!(matches!(f.store.grant_bot_admin(THREAD, "C"), Ok(true)));

    let outcome = f.run("A", "/kick", Some("C")).await;
    assert_eq!(outcome, Outcome::Handled(Verb::Kick));
    assert_eq!(f.bot.removes(), vec![(THREAD.to_owned(), "C".to_owned())]);
    assert_eq!(f.last_reply(), "@carol was kicked.");
    // Kicked members lose their bot-admin grant.
    assert!(!f.store.is_bot_admin(THREAD, "C"));
}

#[tokio::test]
async fn refused_kick_is_reported() {
    let mut f = fixture();
    f.bot.refuse_mutations(true);

    f.run("A", "/kick @carol", None).await;
    assert_eq!(f.bot.removes().len(), 1);
    assert_eq!(f.last_reply(), "Couldn't kick @carol.");
}

#[tokio::test]
async fn accept_adds_by_numeric_id() {
    let mut f = fixture();

    f.run("A", "/accept 4242", None).await;
    assert_eq!(f.bot.adds(), vec![(THREAD.to_owned(), "4242".to_owned())]);
    assert_eq!(f.last_reply(), "4242 was added to the group.");

    f.bot.clear_calls();
    f.run("A", "/accept @bob", None).await;
    assert!(f.bot.adds().is_empty());
    assert_eq!(f.last_reply(), "@bob is already in the group.");
}

#[tokio::test]
async fn ticket_is_sent_to_every_admin_but_the_bot() {
    let mut f = fixture();
    assert!(matches!(f.store.grant_bot_admin(THREAD, "B"), Ok(true)));

    let outcome = f.run("C", "/ticket someone is spamming", None).await;
    assert_eq!(outcome, Outcome::Handled(Verb::Ticket));

    let mut recipients: Vec<String> = f
        .bot
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            Call::Direct { user, text } => {
                assert_eq!(text, "@carol opened a ticket\n#ticket\nsomeone is spamming");
                Some(user)
            }
            _ => None,
        })
        .collect();
    recipients.sort();
    assert_eq!(recipients, vec!["A", "B", "O"]);
    assert_eq!(f.last_reply(), "Your ticket was sent to the admins.");
}

#[tokio::test]
async fn empty_ticket_gets_usage_reply() {
    let mut f = fixture();
    f.run("C", "/ticket", None).await;
    assert!(f
        .bot
        .calls()
        .iter()
        .all(|c| !matches!(c, Call::Direct { .. })));
    assert!(f.last_reply().starts_with("Write your complaint"));
}

#[tokio::test]
async fn developer_can_make_the_bot_leave() {
    let mut f = fixture();
    f.run(DEV, "/leave", None).await;
    assert_eq!(
        f.bot.calls().last(),
        Some(&Call::Leave {
            thread: THREAD.to_owned()
        })
    );
}

#[tokio::test]
async fn co_owner_recognition_skips_the_owner() {
    let mut f = fixture();

    f.run("O", "/coowner @carol", None).await;
    assert!(f.store.is_secondary_owner(THREAD, "C"));

    f.run(DEV, "/coowner @olivia", None).await;
    assert!(!f.store.is_secondary_owner(THREAD, "O"));
    assert_eq!(f.last_reply(), "@olivia is already the owner.");
}
