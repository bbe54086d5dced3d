//! Sync engine for remote collections.
//!
//! A session runs four phases strictly in order, one remote call at a time:
//!
//! 1. Diff the desired members against the collection ([`diff_members`])
//! 2. Drop candidates that cannot be added ([`filter_candidates`])
//! 3. Add the rest in fixed-size batches separated by a window ([`add_all`])
//! 4. Roll back a collection the session created if the run leaves it useless
//!
//! # Example
//!
//! ```ignore
//! use listsync::sync::{Candidate, SyncOptions, SyncSession, sync_collection};
//!
//! let options = SyncOptions::default();
//! let mut session = SyncSession::new(&options);
//! let desired = vec![Candidate::new("12", "alice"), Candidate::new("34", "bob")];
//! let report = sync_collection(&client, &mut session, "friends", desired).await?;
//! println!("added {} members", report.added);
//! ```

mod batch;
mod diff;
mod eligibility;
mod pages;
mod rollback;
mod source;

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::Instrument;
use uuid::Uuid;

use super::error::{Result, SyncError};
use super::progress::{ProgressCallback, SyncProgress, emit};
use super::types::{Candidate, SyncOptions, SyncReport};
use crate::remote::{Caller, CollectionClient, CollectionRef};

pub use batch::{Batch, BatchState, add_all, estimate_duration, partition, plan_batches};
pub use diff::{dedupe_candidates, diff_members};
pub use eligibility::filter_candidates;
pub use source::{
    collection_members, follow_graph_candidates, follow_graph_collection_name, owned_collections,
};

/// State carried through one synchronization run.
///
/// The session caches the caller and the caller's block list so each is
/// fetched at most once, and remembers the collection it created so rollback
/// never touches a collection that existed before the run.
pub struct SyncSession<'a> {
    id: Uuid,
    options: &'a SyncOptions,
    on_progress: Option<&'a ProgressCallback>,
    shutdown_flag: Option<&'a AtomicBool>,
    caller: Option<Caller>,
    blocked: Option<HashSet<String>>,
    target: Option<String>,
    created: Option<CollectionRef>,
    attempted: usize,
    added: usize,
}

impl<'a> SyncSession<'a> {
    /// Start a session with the given options.
    pub fn new(options: &'a SyncOptions) -> Self {
        Self {
            id: Uuid::new_v4(),
            options,
            on_progress: None,
            shutdown_flag: None,
            caller: None,
            blocked: None,
            target: None,
            created: None,
            attempted: 0,
            added: 0,
        }
    }

    /// Report progress events to `callback`.
    pub fn with_progress(mut self, callback: Option<&'a ProgressCallback>) -> Self {
        self.on_progress = callback;
        self
    }

    /// Stop before the next remote call once `flag` is set.
    pub fn with_shutdown_flag(mut self, flag: Option<&'a AtomicBool>) -> Self {
        self.shutdown_flag = flag;
        self
    }

    /// Unique identifier of this session, used in log spans.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn options(&self) -> &'a SyncOptions {
        self.options
    }

    /// The caller, once verified.
    pub fn caller(&self) -> Option<&Caller> {
        self.caller.as_ref()
    }

    /// The collection this session created, if it still exists.
    pub fn created_collection(&self) -> Option<&CollectionRef> {
        self.created.as_ref()
    }

    /// Members submitted to add calls so far.
    pub fn attempted(&self) -> usize {
        self.attempted
    }

    /// Members whose addition was verified so far.
    pub fn added(&self) -> usize {
        self.added
    }

    pub(crate) fn emit(&self, event: SyncProgress) {
        emit(self.on_progress, event);
    }

    pub(crate) fn shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    /// Fail with [`SyncError::Interrupted`] once a shutdown was requested.
    pub(crate) fn check_shutdown(&self) -> Result<()> {
        if !self.shutdown_requested() {
            return Ok(());
        }
        tracing::warn!(added = self.added, "Shutdown requested, stopping");
        Err(SyncError::Interrupted {
            collection: self.target.clone().unwrap_or_default(),
            added: self.added,
        })
    }

    /// Name the collection this session works on.
    pub(crate) fn set_target(&mut self, name: &str) {
        self.target = Some(name.to_string());
    }

    pub(crate) fn record_created(&mut self, collection: CollectionRef) {
        self.created = Some(collection);
    }

    pub(crate) fn take_created(&mut self) -> Option<CollectionRef> {
        self.created.take()
    }

    pub(crate) fn record_attempted(&mut self, count: usize) {
        self.attempted += count;
    }

    pub(crate) fn record_added(&mut self, count: usize) {
        self.added += count;
    }

    pub(crate) fn blocked(&self) -> Option<&HashSet<String>> {
        self.blocked.as_ref()
    }

    pub(crate) fn cache_blocked(&mut self, blocked: HashSet<String>) {
        self.blocked = Some(blocked);
    }
}

/// Return the verified caller, verifying the credential on first use.
pub(crate) async fn ensure_caller<C: CollectionClient>(
    client: &C,
    session: &mut SyncSession<'_>,
) -> Result<Caller> {
    if let Some(caller) = session.caller() {
        return Ok(caller.clone());
    }

    let caller =
        pages::with_rate_limit_wait(session, "verify credentials", move || client.verify_caller())
            .await?;
    tracing::debug!(caller = %caller.display_name, can_write = caller.can_write, "Verified credential");
    session.caller = Some(caller.clone());
    Ok(caller)
}

/// Converge the collection `name` towards `desired`.
///
/// Runs the diff, eligibility and batch phases in order, then settles the
/// outcome: a collection created by this session is destroyed when the run
/// fails before anything was kept, or when it finishes without adding anyone.
///
/// # Errors
///
/// Returns the first error that aborted the run. Rollback failures are
/// logged and never replace the original error.
pub async fn sync_collection<C: CollectionClient>(
    client: &C,
    session: &mut SyncSession<'_>,
    name: &str,
    desired: Vec<Candidate>,
) -> Result<SyncReport> {
    let options = session.options();
    options
        .validate()
        .map_err(|message| SyncError::InvalidOptions { message })?;
    session.set_target(name);

    let span = tracing::info_span!(
        "sync_session",
        session_id = %session.id(),
        collection = %name,
        mode = %options.mode,
        dry_run = options.dry_run,
    );

    async move {
        let result = run_session(client, session, name, desired).await;
        rollback::settle(client, session, result).await
    }
    .instrument(span)
    .await
}

async fn run_session<C: CollectionClient>(
    client: &C,
    session: &mut SyncSession<'_>,
    name: &str,
    desired: Vec<Candidate>,
) -> Result<SyncReport> {
    let options = session.options();
    let desired = dedupe_candidates(desired);
    let requested = desired.len();
    session.check_shutdown()?;

    if requested > 0 {
        let caller = ensure_caller(client, session).await?;
        if !caller.can_write && !options.dry_run {
            return Err(SyncError::AuthorizationMismatch {
                account: caller.display_name,
            });
        }
    }

    let diff = diff_members(client, session, name, desired).await?;
    let eligibility = filter_candidates(client, session, diff.to_add).await?;
    let to_add = eligibility.eligible_ids();

    let mut collection = diff.collection;
    let outcome = if options.dry_run {
        plan_batches(session, &to_add)
    } else {
        match collection.as_mut() {
            Some(target) => add_all(client, session, target, &to_add).await?,
            None => Default::default(),
        }
    };

    session.emit(SyncProgress::SyncComplete {
        name: name.to_string(),
        added: outcome.added,
        skipped: eligibility.ineligible.len(),
    });
    tracing::info!(
        added = outcome.added,
        skipped = eligibility.ineligible.len(),
        batches = outcome.batches,
        "Sync finished"
    );

    Ok(SyncReport {
        collection_name: name.to_string(),
        collection,
        created: diff.created,
        destroyed: false,
        mode: options.mode,
        requested,
        present_before: diff.already_present,
        attempted: outcome.attempted,
        added: outcome.added,
        skipped: eligibility.ineligible,
        batches: outcome.batches,
        dry_run: options.dry_run,
    })
}
