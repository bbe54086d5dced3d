use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use console::Term;
use listsync::{Candidate, SyncMode};
use serde::Deserialize;

use super::shared::{CommandResult, build_context, display_estimate, display_report};
use crate::SyncArgs;
use crate::config::Config;

/// One entry of an import file: a bare id or a member object.
#[derive(Deserialize)]
#[serde(untagged)]
enum ImportEntry {
    Id(String),
    Member(Candidate),
}

impl From<ImportEntry> for Candidate {
    fn from(entry: ImportEntry) -> Self {
        match entry {
            ImportEntry::Id(id) => Candidate::new(id, ""),
            ImportEntry::Member(candidate) => candidate,
        }
    }
}

/// Parse the members of an import file.
///
/// Blank ids are rejected; duplicates are left for the engine to collapse.
pub(crate) fn parse_members(content: &str) -> Result<Vec<Candidate>, String> {
    let entries: Vec<ImportEntry> =
        serde_json::from_str(content).map_err(|e| format!("Invalid member list: {}", e))?;

    let members: Vec<Candidate> = entries.into_iter().map(Candidate::from).collect();
    if let Some(pos) = members.iter().position(|c| c.user_id.trim().is_empty()) {
        return Err(format!("Entry {} has an empty user_id", pos + 1));
    }
    Ok(members)
}

/// List name derived from the import file, e.g. `friends.json` -> `friends`.
pub(crate) fn default_list_name(path: &Path) -> Option<String> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .map(str::trim)
        .filter(|stem| !stem.is_empty())
        .map(str::to_string)
}

pub(crate) async fn handle_import(
    file: &Path,
    list: Option<String>,
    sync_opts: &SyncArgs,
    config: &Config,
    shutdown_flag: Arc<AtomicBool>,
) -> CommandResult {
    let content = std::fs::read_to_string(file)
        .map_err(|e| format!("Failed to read {}: {}", file.display(), e))?;
    let members = parse_members(&content)?;

    let name = match list {
        Some(name) => name,
        None => default_list_name(file).ok_or_else(|| {
            format!(
                "Cannot derive a list name from {}; pass --list",
                file.display()
            )
        })?,
    };

    let is_tty = Term::stdout().is_term();
    let (ctx, reporter) = build_context(config, sync_opts, SyncMode::DiffOnly, shutdown_flag)?;

    if ctx.is_dry_run() && is_tty {
        println!("Dry run mode - no changes will be made\n");
    }
    display_estimate(&ctx.estimate(members.len()), members.len(), is_tty);

    let result = ctx.sync_members(&name, members).await;
    reporter.finish();

    let report = result?;
    display_report(&report, is_tty);
    Ok(())
}
