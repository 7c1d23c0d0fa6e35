use std::sync::LazyLock;

use regex::Regex;

use crate::platform::ThreadState;
use crate::types::Identity;

static HANDLE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"@([A-Za-z0-9._]{1,30})").ok());

/// Resolve the target of a command.
///
/// A replied-to message wins. Otherwise the first `@handle` that names a
/// current member, and failing that a bare numeric user id in the arguments.
pub fn resolve_target(
    args: &str,
    reply_to: Option<&Identity>,
    live: &ThreadState,
) -> Option<Identity> {
    if let Some(author) = reply_to {
        return Some(live.identity(&author.id));
    }

    if let Some(re) = HANDLE.as_ref() {
        for caps in re.captures_iter(args) {
            if let Some(member) = caps.get(1).and_then(|m| live.member_by_handle(m.as_str())) {
                return Some(member.clone());
            }
        }
    }

    args.split_whitespace()
        .find(|t| t.chars().all(|c| c.is_ascii_digit()))
        .map(|id| live.identity(id))
}
