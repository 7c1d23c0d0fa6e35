//! Groupwarden: a moderation bot for group conversations.
//!
//! Polls a messaging platform as a bot account, enforces a privilege
//! hierarchy over slash commands, and watches the native admin list of
//! every activated group so stolen admin rights are restored and the
//! responsible member is demoted.
//!
//! See `DESIGN.md` for the architecture.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod credentials;
pub mod logging;
pub mod types;

pub mod events;
pub mod platform;
pub mod state;

pub mod commands;
pub mod engine;
pub mod poller;
pub mod protection;
