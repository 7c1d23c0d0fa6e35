//! Admin protection: snapshot reconciliation and mass-removal detection.
//!
//! [`Guardian::protect`] runs once per processed event of an activated
//! thread. It compares the live native-admin list with the snapshot from
//! the previous pass, classifies every loss with [`reconcile::classify`],
//! strips the responsible actor and restores the victim through whichever
//! account still holds admin rights, then stores the admin list observed
//! after acting.
//!
//! Remediation order is always strip the offender, then restore the victim.

use std::collections::HashSet;

use tracing::{debug, info, warn};

use crate::config::ProtectionConfig;
use crate::events::{Event, EventKind};
use crate::platform::{PlatformError, ThreadState};
use crate::state::{PrivilegeStore, SnapshotStore, StateError};

pub mod accounts;
pub mod rate_limit;
pub mod reconcile;

pub use accounts::{Account, Accounts, Actuator};
pub use rate_limit::KickLimiter;
pub use reconcile::{classify, removed_admins, LossClass, Roles};

/// One classified admin loss.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Loss {
    /// Id that lost its admin right.
    pub lost: String,
    /// Attributed actor.
    pub actor: Option<String>,
    /// Classification.
    pub class: LossClass,
}

/// What a protection pass saw and did.
#[derive(Debug, Clone, Default)]
pub struct PassReport {
    /// The thread had no snapshot; this pass only recorded a baseline.
    pub baseline: bool,
    /// Every admin loss found, remediated or not.
    pub losses: Vec<Loss>,
    /// A mass-removal demotion was issued.
    pub mass_removal: bool,
    /// Thread state after the pass (re-fetched when the pass acted).
    pub state: ThreadState,
}

impl PassReport {
    /// Whether the pass issued any corrective call.
    pub fn acted(&self) -> bool {
        self.mass_removal || self.losses.iter().any(|l| l.class.needs_remediation())
    }
}

/// Owner of the admin snapshots and the kick limiter.
#[derive(Debug)]
pub struct Guardian {
    accounts: Accounts,
    snapshots: SnapshotStore,
    limiter: KickLimiter,
}

impl Guardian {
    /// Create a guardian.
    pub fn new(accounts: Accounts, snapshots: SnapshotStore, limiter: KickLimiter) -> Self {
        Self {
            accounts,
            snapshots,
            limiter,
        }
    }

    /// Create a guardian with limiter settings from config.
    pub fn from_config(
        accounts: Accounts,
        snapshots: SnapshotStore,
        cfg: &ProtectionConfig,
    ) -> Self {
        Self::new(accounts, snapshots, KickLimiter::from_config(cfg))
    }

    /// The accounts this guardian acts through.
    pub fn accounts(&self) -> &Accounts {
        &self.accounts
    }

    /// Stored admin snapshots.
    pub fn snapshots(&self) -> &SnapshotStore {
        &self.snapshots
    }

    /// Run mass-removal detection and reconciliation for one event.
    ///
    /// `live` is the thread state fetched for this event. Platform failures
    /// during remediation are logged and left for the next pass.
    ///
    /// # Errors
    ///
    /// Returns an error only when the snapshot cannot be stored.
    pub async fn protect(
        &mut self,
        thread_id: &str,
        event: &Event,
        live: ThreadState,
        privileges: &PrivilegeStore,
    ) -> Result<PassReport, StateError> {
        let mut stripped: HashSet<String> = HashSet::new();
        let mass_removal = self
            .check_mass_removal(thread_id, event, &live, privileges, &mut stripped)
            .await;
        let mut report = self
            .reconcile(thread_id, event, live, privileges, &mut stripped)
            .await?;
        report.mass_removal = mass_removal;
        Ok(report)
    }

    async fn check_mass_removal(
        &mut self,
        thread_id: &str,
        event: &Event,
        live: &ThreadState,
        privileges: &PrivilegeStore,
        stripped: &mut HashSet<String>,
    ) -> bool {
        let EventKind::MemberRemoved {
            actor: Some(actor), ..
        } = &event.kind
        else {
            return false;
        };
        if privileges.is_owner(thread_id, &actor.id) || self.accounts.is_own_account(&actor.id) {
            return false;
        }
        if !self.limiter.record_removal(&actor.id) {
            debug!(
                thread_id,
                actor = %actor.id,
                pending = self.limiter.pending(&actor.id),
                "removal recorded"
            );
            return false;
        }

        let mention = live.identity(&actor.id).mention();
        warn!(thread_id, actor = %actor.id, "mass removal detected");
        let act = self.accounts.actuator(live);
        if !act.capable {
            warn!(thread_id, "no account holds admin rights, demoting on a best-effort basis");
        }
        if stripped.insert(actor.id.clone()) {
            report_call(
                act.platform.remove_member(thread_id, &actor.id).await,
                thread_id,
                "strip mass remover",
            );
        }
        self.announce(
            thread_id,
            &format!("{mention} removed too many members in a short time. I revoked their admin rights."),
        )
        .await;
        true
    }

    async fn reconcile(
        &mut self,
        thread_id: &str,
        event: &Event,
        live: ThreadState,
        privileges: &PrivilegeStore,
        stripped: &mut HashSet<String>,
    ) -> Result<PassReport, StateError> {
        let Some(previous) = self.snapshots.get(thread_id) else {
            info!(thread_id, admins = live.admins.len(), "recording first admin snapshot");
            self.snapshots.set(thread_id, &live.admins)?;
            return Ok(PassReport {
                baseline: true,
                state: live,
                ..PassReport::default()
            });
        };

        let removed = removed_admins(previous, &live.admins);
        if removed.is_empty() {
            if previous != live.admins.as_slice() {
                debug!(thread_id, "admin list changed without losses, refreshing snapshot");
                self.snapshots.set(thread_id, &live.admins)?;
            }
            return Ok(PassReport {
                state: live,
                ..PassReport::default()
            });
        }

        let record = privileges.record(thread_id).cloned().unwrap_or_default();
        let roles = Roles {
            owner: record.owner.as_ref().map(|o| o.id.as_str()),
            secondary_owners: &record.secondary_owners,
            bot_id: self.accounts.bot_id(),
            assistant_id: self.accounts.assistant_id(),
        };
        let actor = event.attributed_actor().map(|a| a.id.clone());

        let mut losses = Vec::with_capacity(removed.len());
        for lost in removed {
            let class = classify(&lost, actor.as_deref(), &roles);
            losses.push(Loss {
                lost,
                actor: actor.clone(),
                class,
            });
        }

        let mut acted = false;
        for loss in &losses {
            let Some(actor) = loss.actor.as_deref().filter(|_| loss.class.needs_remediation())
            else {
                info!(
                    thread_id,
                    lost = %loss.lost,
                    actor = loss.actor.as_deref().unwrap_or("unknown"),
                    class = %loss.class,
                    "admin loss not remediated"
                );
                continue;
            };

            warn!(thread_id, lost = %loss.lost, actor, class = %loss.class, "admin right taken, remediating");
            let act = self.accounts.actuator(&live);
            if !act.capable {
                warn!(
                    thread_id,
                    "neither the bot nor the assistant holds admin rights, remediating on a best-effort basis"
                );
            }
            debug!(thread_id, account = ?act.account, "acting account");

            if stripped.insert(actor.to_owned()) {
                report_call(
                    act.platform.remove_member(thread_id, actor).await,
                    thread_id,
                    "strip offender",
                );
            }
            report_call(
                act.platform.add_member(thread_id, &loss.lost).await,
                thread_id,
                "restore admin",
            );
            acted = true;

            let text = reconcile::announcement(
                loss.class,
                &live.identity(actor).mention(),
                &live.identity(&loss.lost).mention(),
            );
            self.announce(thread_id, &text).await;
        }

        let state = if acted {
            match self.accounts.primary().fetch_thread_state(thread_id).await {
                Ok(after) => after,
                Err(e) => {
                    warn!(thread_id, error = %e, "re-fetch after remediation failed, keeping observed state");
                    live
                }
            }
        } else {
            live
        };
        self.snapshots.set(thread_id, &state.admins)?;

        Ok(PassReport {
            baseline: false,
            losses,
            mass_removal: false,
            state,
        })
    }

    async fn announce(&self, thread_id: &str, text: &str) {
        report_call(
            self.accounts.primary().send_message(thread_id, text, None).await,
            thread_id,
            "announcement",
        );
    }
}

fn report_call(result: Result<bool, PlatformError>, thread_id: &str, what: &str) {
    match result {
        Ok(true) => debug!(thread_id, call = what, "platform call accepted"),
        Ok(false) => warn!(thread_id, call = what, "platform call refused"),
        Err(e) => warn!(thread_id, call = what, error = %e, "platform call failed"),
    }
}
