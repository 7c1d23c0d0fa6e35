use std::collections::BTreeSet;

use tracing::{debug, info, warn};

use super::{resolve_target, Command, CommandError, Gate, Verb};
use crate::platform::ThreadState;
use crate::protection::Accounts;
use crate::state::PrivilegeStore;
use crate::types::Identity;

/// Where a command was posted and by whom.
#[derive(Debug, Clone, Copy)]
pub struct CommandContext<'a> {
    /// Thread the command was posted in.
    pub thread_id: &'a str,
    /// Item id of the command message; replies quote it.
    pub item_id: &'a str,
    /// Author of the command.
    pub caller: &'a Identity,
    /// Author of the message the command replies to.
    pub reply_to: Option<&'a Identity>,
    /// Live thread state.
    pub live: &'a ThreadState,
}

/// What the dispatcher did with a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The command ran (including replies for missing targets).
    Handled(Verb),
    /// The caller is not allowed to run the verb; nothing was sent.
    Denied(Verb),
    /// The bot is not activated in the thread; nothing was sent.
    Inactive(Verb),
}

/// Run one command.
///
/// # Errors
///
/// Returns an error when a privilege change cannot be saved or when a
/// verification fetch fails.
pub async fn dispatch(
    command: &Command,
    ctx: &CommandContext<'_>,
    privileges: &mut PrivilegeStore,
    accounts: &Accounts,
) -> Result<Outcome, CommandError> {
    let verb = command.verb;
    if !verb.works_when_inactive() && !privileges.is_activated(ctx.thread_id) {
        debug!(thread_id = ctx.thread_id, ?verb, "bot not activated, ignoring command");
        return Ok(Outcome::Inactive(verb));
    }
    if !permitted(verb.gate(), ctx, privileges) {
        debug!(
            thread_id = ctx.thread_id,
            caller = %ctx.caller.id,
            ?verb,
            "caller not permitted, dropping command"
        );
        return Ok(Outcome::Denied(verb));
    }

    info!(thread_id = ctx.thread_id, caller = %ctx.caller.id, ?verb, "running command");
    let handler = Handler {
        ctx,
        accounts,
        args: &command.args,
    };
    match verb {
        Verb::Activate => handler.activate(privileges).await?,
        Verb::Deactivate => handler.deactivate(privileges).await?,
        Verb::Leave => handler.leave().await?,
        Verb::Owner => handler.owner(privileges).await?,
        Verb::CoOwner => handler.co_owner(privileges).await?,
        Verb::Admin => handler.grant(privileges).await?,
        Verb::Unadmin => handler.revoke(privileges).await?,
        Verb::Kick => handler.kick(privileges).await?,
        Verb::Accept => handler.accept().await?,
        Verb::Ticket => handler.ticket(privileges).await,
    }
    Ok(Outcome::Handled(verb))
}

fn permitted(gate: Gate, ctx: &CommandContext<'_>, privileges: &PrivilegeStore) -> bool {
    let caller = ctx.caller.id.as_str();
    match gate {
        Gate::Developer => privileges.is_developer(caller),
        Gate::DeveloperOrOwner => {
            privileges.is_developer(caller) || privileges.is_owner(ctx.thread_id, caller)
        }
        Gate::Authorized => privileges.is_authorized(ctx.thread_id, caller, ctx.live),
        Gate::Member => true,
    }
}

struct Handler<'a> {
    ctx: &'a CommandContext<'a>,
    accounts: &'a Accounts,
    args: &'a str,
}

impl Handler<'_> {
    async fn reply(&self, text: &str) {
        let thread_id = self.ctx.thread_id;
        match self
            .accounts
            .primary()
            .send_message(thread_id, text, Some(self.ctx.item_id))
            .await
        {
            Ok(true) => {}
            Ok(false) => warn!(thread_id, "command reply refused"),
            Err(e) => warn!(thread_id, error = %e, "command reply failed"),
        }
    }

    /// Resolve the target or reply with `missing`.
    async fn target(&self, missing: &str) -> Option<Identity> {
        let target = resolve_target(self.args, self.ctx.reply_to, self.ctx.live);
        if target.is_none() {
            self.reply(missing).await;
        }
        target
    }

    async fn activate(&self, privileges: &mut PrivilegeStore) -> Result<(), CommandError> {
        let text = if privileges.activate(self.ctx.thread_id, &self.ctx.caller.id)? {
            "Activated. I'm now protecting this group."
        } else {
            "Already active in this group."
        };
        self.reply(text).await;
        Ok(())
    }

    async fn deactivate(&self, privileges: &mut PrivilegeStore) -> Result<(), CommandError> {
        let text = if privileges.deactivate(self.ctx.thread_id)? {
            "Deactivated. Moderation commands are off in this group."
        } else {
            "I'm not active in this group."
        };
        self.reply(text).await;
        Ok(())
    }

    async fn leave(&self) -> Result<(), CommandError> {
        self.reply("Leaving the group.").await;
        if !self.accounts.primary().leave_thread(self.ctx.thread_id).await? {
            warn!(thread_id = self.ctx.thread_id, "platform refused to let the bot leave");
        }
        Ok(())
    }

    async fn owner(&self, privileges: &mut PrivilegeStore) -> Result<(), CommandError> {
        let Some(target) = self.target("Couldn't find the user to recognise as owner.").await
        else {
            return Ok(());
        };
        let mention = target.mention();
        privileges.set_owner(self.ctx.thread_id, target)?;
        self.reply(&format!(
            "{mention} is now recognised as the group owner, with full authority and theft protection."
        ))
        .await;
        Ok(())
    }

    async fn co_owner(&self, privileges: &mut PrivilegeStore) -> Result<(), CommandError> {
        let Some(target) = self.target("Couldn't find the user to make co-owner.").await else {
            return Ok(());
        };
        let mention = target.mention();
        let text = if privileges.is_owner(self.ctx.thread_id, &target.id) {
            format!("{mention} is already the owner.")
        } else if privileges.add_secondary_owner(self.ctx.thread_id, &target.id)? {
            format!("{mention} is now a co-owner and protected against admin theft.")
        } else {
            format!("{mention} is already a co-owner.")
        };
        self.reply(&text).await;
        Ok(())
    }

    async fn grant(&self, privileges: &mut PrivilegeStore) -> Result<(), CommandError> {
        let Some(target) = self.target("Couldn't find the user to promote.").await else {
            return Ok(());
        };
        let mention = target.mention();
        let text = if self.ctx.live.is_admin(&target.id) {
            format!("{mention} is already a group admin and doesn't need bot admin powers.")
        } else if privileges.grant_bot_admin(self.ctx.thread_id, &target.id)? {
            format!("{mention} now has admin powers in this group.")
        } else {
            format!("{mention} already has admin powers.")
        };
        self.reply(&text).await;
        Ok(())
    }

    async fn revoke(&self, privileges: &mut PrivilegeStore) -> Result<(), CommandError> {
        let Some(target) = self.target("Couldn't find the user to demote.").await else {
            return Ok(());
        };
        let mention = target.mention();
        let text = if self.ctx.live.is_admin(&target.id) {
            format!("{mention} is a group admin; their rights can't be revoked with a bot command.")
        } else if privileges.revoke_bot_admin(self.ctx.thread_id, &target.id)? {
            format!("{mention} no longer has admin powers.")
        } else {
            format!("{mention} has no bot admin powers.")
        };
        self.reply(&text).await;
        Ok(())
    }

    async fn kick(&self, privileges: &mut PrivilegeStore) -> Result<(), CommandError> {
        let Some(target) = self.target("Couldn't find the user to kick.").await else {
            return Ok(());
        };
        if self.ctx.live.is_admin(&target.id) || self.accounts.is_own_account(&target.id) {
            self.reply("Group admins can't be kicked.").await;
            return Ok(());
        }

        let thread_id = self.ctx.thread_id;
        let act = self.accounts.actuator(self.ctx.live);
        match act.platform.remove_member(thread_id, &target.id).await {
            Ok(accepted) => debug!(thread_id, accepted, "kick requested"),
            Err(e) => warn!(thread_id, error = %e, "kick request failed"),
        }

        let after = self.accounts.primary().fetch_thread_state(thread_id).await?;
        let mention = target.mention();
        if after.is_member(&target.id) {
            self.reply(&format!("Couldn't kick {mention}.")).await;
        } else {
            privileges.revoke_bot_admin(thread_id, &target.id)?;
            self.reply(&format!("{mention} was kicked.")).await;
        }
        Ok(())
    }

    async fn accept(&self) -> Result<(), CommandError> {
        let Some(target) = self.target("Couldn't find the user to accept.").await else {
            return Ok(());
        };
        let thread_id = self.ctx.thread_id;
        let mention = target.mention();
        if self.ctx.live.is_member(&target.id) {
            self.reply(&format!("{mention} is already in the group.")).await;
            return Ok(());
        }

        let act = self.accounts.actuator(self.ctx.live);
        match act.platform.add_member(thread_id, &target.id).await {
            Ok(accepted) => debug!(thread_id, accepted, "add requested"),
            Err(e) => warn!(thread_id, error = %e, "add request failed"),
        }

        let after = self.accounts.primary().fetch_thread_state(thread_id).await?;
        if after.is_member(&target.id) {
            self.reply(&format!("{mention} was added to the group.")).await;
        } else {
            self.reply(&format!("Couldn't add {mention}.")).await;
        }
        Ok(())
    }

    async fn ticket(&self, privileges: &PrivilegeStore) {
        if self.args.is_empty() {
            self.reply("Write your complaint after the command, e.g. /ticket someone is spamming.")
                .await;
            return;
        }

        let thread_id = self.ctx.thread_id;
        let mut recipients: BTreeSet<String> = self.ctx.live.admins.iter().cloned().collect();
        if let Some(record) = privileges.record(thread_id) {
            recipients.extend(record.bot_admins.iter().cloned());
            recipients.extend(record.owner.iter().map(|o| o.id.clone()));
        }
        recipients.retain(|id| !self.accounts.is_own_account(id));

        let text = format!(
            "{} opened a ticket\n#ticket\n{}",
            self.ctx.caller.mention(),
            self.args
        );
        let mut delivered = 0_usize;
        for id in &recipients {
            match self.accounts.primary().send_direct(id, &text).await {
                Ok(true) => delivered = delivered.saturating_add(1),
                Ok(false) => warn!(thread_id, recipient = %id, "ticket delivery refused"),
                Err(e) => warn!(thread_id, recipient = %id, error = %e, "ticket delivery failed"),
            }
        }
        info!(thread_id, recipients = recipients.len(), delivered, "ticket escalated");
        self.reply("Your ticket was sent to the admins.").await;
    }
}
