//! The moderation engine: one entry point per normalized event.
//!
//! [`Engine::on_event`] gates the event through the dedup ledger, runs the
//! protection pass for activated threads and dispatches slash commands.
//! The engine is owned by value by the poller; nothing here is shared.

use tracing::{debug, warn};

use crate::commands::{self, CommandContext, CommandError, Outcome};
use crate::events::{Event, EventKind};
use crate::platform::PlatformError;
use crate::protection::{Guardian, PassReport};
use crate::state::{DedupLedger, PrivilegeStore, StateError};

/// Errors that end the handling of one event.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Thread state could not be fetched.
    #[error("platform error: {0}")]
    Platform(#[from] PlatformError),
    /// A snapshot could not be stored.
    #[error("state error: {0}")]
    State(#[from] StateError),
    /// A command failed after it was authorized.
    #[error("command failed: {0}")]
    Command(#[from] CommandError),
}

/// What the engine did with one event.
#[derive(Debug, Default)]
pub struct EventReport {
    /// False when the ledger had already seen the event.
    pub processed: bool,
    /// Protection pass result, for activated threads.
    pub protection: Option<PassReport>,
    /// Command outcome, when the event was a command.
    pub command: Option<Outcome>,
}

/// Explicitly constructed moderation engine.
#[derive(Debug)]
pub struct Engine {
    privileges: PrivilegeStore,
    guardian: Guardian,
    ledger: DedupLedger,
}

impl Engine {
    /// Assemble an engine from its stores.
    pub fn new(privileges: PrivilegeStore, guardian: Guardian, ledger: DedupLedger) -> Self {
        Self {
            privileges,
            guardian,
            ledger,
        }
    }

    /// Privilege records.
    pub fn privileges(&self) -> &PrivilegeStore {
        &self.privileges
    }

    /// Protection state.
    pub fn guardian(&self) -> &Guardian {
        &self.guardian
    }

    /// Last event id processed in a thread.
    pub fn last_processed(&self, thread_id: &str) -> Option<&str> {
        self.ledger.last_processed(thread_id)
    }

    /// Handle one event of a thread. Idempotent per `(thread_id, event.id)`.
    ///
    /// # Errors
    ///
    /// Returns an error when thread state cannot be fetched, a snapshot
    /// cannot be stored, or a command fails. A failed state fetch leaves the
    /// event unrecorded so the next delivery handles it again.
    pub async fn on_event(
        &mut self,
        thread_id: &str,
        event: &Event,
    ) -> Result<EventReport, EngineError> {
        if !self.ledger.is_pending(thread_id, &event.id) {
            debug!(thread_id, event_id = %event.id, "event already processed");
            return Ok(EventReport::default());
        }

        let command = match &event.kind {
            EventKind::Text {
                from,
                body,
                reply_to,
            } if !self.guardian.accounts().is_own_account(&from.id) => {
                commands::parse(body).map(|cmd| (cmd, from, reply_to.as_ref()))
            }
            _ => None,
        };

        let activated = self.privileges.is_activated(thread_id);
        let wants_command = command
            .as_ref()
            .is_some_and(|(cmd, ..)| activated || cmd.verb.works_when_inactive());
        if !activated && !wants_command {
            self.commit(thread_id, &event.id);
            return Ok(EventReport {
                processed: true,
                ..EventReport::default()
            });
        }

        let mut live = self
            .guardian
            .accounts()
            .primary()
            .fetch_thread_state(thread_id)
            .await?;
        self.commit(thread_id, &event.id);

        let protection = if activated {
            let report = self
                .guardian
                .protect(thread_id, event, live, &self.privileges)
                .await?;
            live = report.state.clone();
            Some(report)
        } else {
            None
        };

        let command = match command {
            Some((cmd, caller, reply_to)) => {
                let ctx = CommandContext {
                    thread_id,
                    item_id: &event.id,
                    caller,
                    reply_to,
                    live: &live,
                };
                Some(
                    commands::dispatch(&cmd, &ctx, &mut self.privileges, self.guardian.accounts())
                        .await?,
                )
            }
            None => None,
        };

        Ok(EventReport {
            processed: true,
            protection,
            command,
        })
    }

    fn commit(&mut self, thread_id: &str, event_id: &str) {
        self.ledger.should_process(thread_id, event_id);
        if let Err(e) = self.ledger.persist() {
            warn!(thread_id, error = %e, "failed to persist dedup ledger");
        }
    }
}
