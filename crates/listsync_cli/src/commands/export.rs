use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use console::Term;
use listsync::remote::UserRef;
use listsync::{Candidate, FollowKind, SyncContext};

use super::shared::{CommandResult, build_client};
use crate::config::Config;

/// Convert list members to import entries.
pub(crate) fn to_candidates(members: Vec<UserRef>) -> Vec<Candidate> {
    members
        .into_iter()
        .map(|user| Candidate::new(user.id, user.display_name.unwrap_or_default()))
        .collect()
}

/// Write the members of a list in the format `import` reads.
pub(crate) async fn handle_export(
    list: &str,
    output: Option<PathBuf>,
    config: &Config,
) -> CommandResult {
    let client = build_client(config, config.sync.no_rate_limit)?;
    let ctx = SyncContext::builder().client(client).build()?;

    let (_, members) = ctx.collection_members(list).await?;
    write_entries(&to_candidates(members), output, &format!("members of '{}'", list))
}

/// Write one side of a user's follow graph in the format `import` reads.
pub(crate) async fn handle_follow_export(
    kind: FollowKind,
    user_id: &str,
    limit: Option<usize>,
    output: Option<PathBuf>,
    config: &Config,
    shutdown_flag: Arc<AtomicBool>,
) -> CommandResult {
    if user_id.trim().is_empty() {
        return Err("User id must not be empty".into());
    }

    let client = build_client(config, config.sync.no_rate_limit)?;
    let ctx = SyncContext::builder()
        .client(client)
        .shutdown_flag(shutdown_flag)
        .build()?;

    let entries = ctx.follow_graph(user_id, kind, limit).await?;
    write_entries(&entries, output, &format!("{} of {}", follow_label(kind), user_id))
}

fn follow_label(kind: FollowKind) -> &'static str {
    match kind {
        FollowKind::Followees => "followees",
        FollowKind::Followers => "followers",
    }
}

fn write_entries(entries: &[Candidate], output: Option<PathBuf>, what: &str) -> CommandResult {
    let json = serde_json::to_string_pretty(entries)?;

    match output {
        Some(path) => {
            std::fs::write(&path, format!("{}\n", json))
                .map_err(|e| format!("Failed to write {}: {}", path.display(), e))?;
            if Term::stderr().is_term() {
                eprintln!("Exported {} {} to {}", entries.len(), what, path.display());
            } else {
                tracing::info!(what, count = entries.len(), path = %path.display(), "Exported");
            }
        }
        None => println!("{}", json),
    }

    Ok(())
}
