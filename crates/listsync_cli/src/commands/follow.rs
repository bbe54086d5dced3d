use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use console::Term;
use listsync::{FollowKind, SyncMode};

use super::shared::{CommandResult, build_context, display_report};
use crate::SyncArgs;
use crate::config::Config;

/// Mirror one side of a user's follow graph into a list.
///
/// Defaults to a full resync so the list matches the graph exactly.
pub(crate) async fn handle_follow(
    kind: FollowKind,
    user_id: &str,
    limit: Option<usize>,
    sync_opts: &SyncArgs,
    config: &Config,
    shutdown_flag: Arc<AtomicBool>,
) -> CommandResult {
    if user_id.trim().is_empty() {
        return Err("User id must not be empty".into());
    }

    let is_tty = Term::stdout().is_term();
    let (ctx, reporter) = build_context(config, sync_opts, SyncMode::FullResync, shutdown_flag)?;

    if ctx.is_dry_run() && is_tty {
        println!("Dry run mode - no changes will be made\n");
    }

    let result = ctx.sync_follow_graph(user_id, kind, limit).await;
    reporter.finish();

    let report = result?;
    display_report(&report, is_tty);
    Ok(())
}
