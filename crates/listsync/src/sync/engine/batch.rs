//! Batch scheduler: adds members in fixed-size batches separated by a window.

use chrono::{Duration, Utc};

use super::SyncSession;
use crate::remote::{CollectionClient, CollectionRef};
use crate::sync::error::{Result, SyncError};
use crate::sync::progress::SyncProgress;
use crate::sync::types::{BatchOutcome, QUOTA_RESET_HOURS, RunEstimate, SyncOptions};

/// An ordered slice of members submitted in one add call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    number: usize,
    user_ids: Vec<String>,
}

impl Batch {
    /// 1-indexed position in the plan.
    pub fn number(&self) -> usize {
        self.number
    }

    pub fn user_ids(&self) -> &[String] {
        &self.user_ids
    }

    pub fn len(&self) -> usize {
        self.user_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.user_ids.is_empty()
    }
}

/// Where a batch is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Ready,
    Submitting,
    Verifying,
    Waiting,
    Done,
    Failed,
}

fn transition(state: &mut BatchState, next: BatchState, batch: usize) {
    tracing::trace!(batch, from = ?*state, to = ?next, "Batch state");
    *state = next;
}

/// Split `user_ids` into ordered batches of at most `batch_size`.
///
/// Only the last batch may be shorter. A `batch_size` of 0 is treated as 1.
pub fn partition(user_ids: &[String], batch_size: usize) -> Vec<Batch> {
    user_ids
        .chunks(batch_size.max(1))
        .enumerate()
        .map(|(index, chunk)| Batch {
            number: index + 1,
            user_ids: chunk.to_vec(),
        })
        .collect()
}

/// Estimate the shape of a run adding `count` members.
///
/// Batches beyond the daily quota are reported as deferred; the duration
/// covers the waits between the batches that run today.
pub fn estimate_duration(count: usize, options: &SyncOptions) -> RunEstimate {
    let batch_size = options.batch_size.max(1);
    let batches = count.div_ceil(batch_size);

    let mut planned = 0;
    let mut batches_today = 0;
    for number in 0..batches {
        let size = batch_size.min(count - number * batch_size);
        if planned + size > options.daily_quota {
            break;
        }
        planned += size;
        batches_today += 1;
    }

    RunEstimate {
        batches,
        batches_today,
        deferred: count - planned,
        duration: window_offset(options.window, batches_today.saturating_sub(1)),
    }
}

/// `window` repeated `waits` times, saturating at the largest duration.
fn window_offset(window: Duration, waits: usize) -> Duration {
    i32::try_from(waits)
        .ok()
        .and_then(|waits| window.checked_mul(waits))
        .unwrap_or(Duration::MAX)
}

/// Describe the batches a run would submit, without submitting anything.
pub fn plan_batches(session: &SyncSession<'_>, to_add: &[String]) -> BatchOutcome {
    let options = session.options();
    let batches = partition(to_add, options.batch_size);
    let estimate = estimate_duration(to_add.len(), options);

    session.emit(SyncProgress::BatchesPlanned {
        batches: batches.len(),
        members: to_add.len(),
        batch_size: options.batch_size,
        dry_run: true,
    });

    let now = Utc::now();
    for (offset, batch) in batches.iter().enumerate() {
        let starts_at = now
            .checked_add_signed(window_offset(options.window, offset))
            .map_or_else(|| "never".to_string(), |at| at.to_rfc3339());
        tracing::info!(
            batch = batch.number(),
            count = batch.len(),
            starts_at = %starts_at,
            users = %batch.user_ids().join(","),
            "Would add batch"
        );
    }

    if estimate.deferred > 0 {
        let message = format!(
            "Only {} of {} batches fit in the daily quota of {}; {} members would be deferred",
            estimate.batches_today, estimate.batches, options.daily_quota, estimate.deferred
        );
        tracing::warn!("{}", message);
        session.emit(SyncProgress::Warning { message });
    }

    BatchOutcome {
        added: 0,
        attempted: 0,
        batches: batches.len(),
    }
}

/// Add `to_add` to `collection` in batches.
///
/// Each batch is verified by comparing the remote member count after the add
/// with the count before it; any difference fails the run. Consecutive
/// batches are separated by the configured window. The run stops with
/// [`SyncError::QuotaExceeded`] when the next batch would exceed the daily
/// quota, and with [`SyncError::Interrupted`] when a shutdown was requested.
///
/// `collection.member_count` is kept up to date as batches are verified.
pub async fn add_all<C: CollectionClient>(
    client: &C,
    session: &mut SyncSession<'_>,
    collection: &mut CollectionRef,
    to_add: &[String],
) -> Result<BatchOutcome> {
    let options = session.options();
    let batches = partition(to_add, options.batch_size);
    let total_batches = batches.len();
    let mut outcome = BatchOutcome::default();

    if batches.is_empty() {
        return Ok(outcome);
    }

    tracing::info!(
        batches = total_batches,
        members = to_add.len(),
        batch_size = options.batch_size,
        "Adding members"
    );
    session.emit(SyncProgress::BatchesPlanned {
        batches: total_batches,
        members: to_add.len(),
        batch_size: options.batch_size,
        dry_run: false,
    });

    let mut state = BatchState::Ready;
    for batch in &batches {
        if outcome.added + batch.len() > options.daily_quota {
            let resume_at = Utc::now() + Duration::hours(QUOTA_RESET_HOURS);
            let remaining = to_add.len() - outcome.attempted;
            tracing::warn!(
                added = outcome.added,
                remaining,
                resume_at = %resume_at,
                "Daily quota reached"
            );
            session.emit(SyncProgress::QuotaReached {
                added: outcome.added,
                remaining,
                resume_at,
            });
            return Err(SyncError::QuotaExceeded {
                collection: collection.name.clone(),
                daily_quota: options.daily_quota,
                added: outcome.added,
                remaining,
                resume_at,
            });
        }

        if batch.number() > 1 {
            transition(&mut state, BatchState::Waiting, batch.number());
            let resume_at = Utc::now() + options.window;
            tracing::info!(
                next_batch = batch.number(),
                total_batches,
                resume_at = %resume_at,
                "Waiting before next batch"
            );
            session.emit(SyncProgress::WaitingForWindow {
                next_batch: batch.number(),
                total_batches,
                resume_at,
            });
            tokio::time::sleep(options.window.to_std().unwrap_or_default()).await;
        }

        if session.shutdown_requested() {
            tracing::warn!(added = outcome.added, "Shutdown requested, stopping before next batch");
            return Err(SyncError::Interrupted {
                collection: collection.name.clone(),
                added: outcome.added,
            });
        }

        transition(&mut state, BatchState::Submitting, batch.number());
        session.emit(SyncProgress::SubmittingBatch {
            batch: batch.number(),
            total_batches,
            count: batch.len(),
        });

        let before = collection.member_count;
        outcome.attempted += batch.len();
        outcome.batches += 1;
        session.record_attempted(batch.len());

        let updated = match client.add_members(collection, batch.user_ids()).await {
            Ok(updated) => updated,
            Err(source) => {
                transition(&mut state, BatchState::Failed, batch.number());
                return Err(SyncError::AddFailed {
                    collection: collection.name.clone(),
                    batch: batch.number(),
                    user_ids: batch.user_ids().to_vec(),
                    source,
                });
            }
        };

        transition(&mut state, BatchState::Verifying, batch.number());
        let after = updated.member_count;
        if after != before + batch.len() {
            transition(&mut state, BatchState::Failed, batch.number());
            tracing::error!(
                batch = batch.number(),
                before,
                after,
                expected = batch.len(),
                users = %batch.user_ids().join(","),
                "Member count mismatch"
            );
            return Err(SyncError::CountMismatch {
                collection: collection.name.clone(),
                batch: batch.number(),
                before,
                expected: batch.len(),
                after,
                user_ids: batch.user_ids().to_vec(),
            });
        }

        collection.member_count = after;
        outcome.added += batch.len();
        session.record_added(batch.len());

        tracing::info!(batch = batch.number(), total_batches, before, after, "Batch verified");
        session.emit(SyncProgress::BatchVerified {
            batch: batch.number(),
            total_batches,
            before,
            after,
        });
    }

    transition(&mut state, BatchState::Done, total_batches);
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;

    use super::*;
    use crate::remote::{InMemoryRemote, Operation, RemoteError};

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn numbered(count: usize) -> Vec<String> {
        (0..count).map(|i| format!("u{i}")).collect()
    }

    #[test]
    fn test_partition_preserves_order_and_sizes() {
        let users = numbered(7);
        let batches = partition(&users, 3);

        assert_eq!(batches.len(), 3);
        assert_eq!(batches.iter().map(Batch::len).collect::<Vec<_>>(), vec![3, 3, 1]);
        assert_eq!(batches[2].number(), 3);
        let joined: Vec<String> = batches
            .iter()
            .flat_map(|b| b.user_ids().iter().cloned())
            .collect();
        assert_eq!(joined, users);
    }

    #[test]
    fn test_partition_empty() {
        assert!(partition(&[], 50).is_empty());
    }

    #[test]
    fn test_estimate_within_quota() {
        let options = SyncOptions::default();
        let estimate = estimate_duration(100, &options);

        assert_eq!(estimate.batches, 2);
        assert_eq!(estimate.batches_today, 2);
        assert_eq!(estimate.deferred, 0);
        assert_eq!(estimate.duration, Duration::minutes(30));
    }

    #[test]
    fn test_estimate_defers_beyond_quota() {
        let options = SyncOptions::default();
        let estimate = estimate_duration(120, &options);

        assert_eq!(estimate.batches, 3);
        assert_eq!(estimate.batches_today, 2);
        assert_eq!(estimate.deferred, 20);
    }

    #[test]
    fn test_estimate_saturates_on_huge_window() {
        let options = SyncOptions {
            window: Duration::MAX,
            daily_quota: 150,
            ..SyncOptions::default()
        };
        let estimate = estimate_duration(150, &options);

        assert_eq!(estimate.batches_today, 3);
        assert_eq!(estimate.duration, Duration::MAX);
        assert_eq!(window_offset(Duration::minutes(30), 2), Duration::hours(1));
        assert_eq!(window_offset(Duration::days(1), usize::MAX), Duration::MAX);
    }

    #[test]
    fn test_plan_batches_with_huge_window() {
        let options = SyncOptions {
            window: Duration::MAX,
            batch_size: 1,
            ..SyncOptions::default()
        };
        let session = SyncSession::new(&options);

        let outcome = plan_batches(&session, &ids(&["a", "b", "c"]));

        assert_eq!(outcome.batches, 3);
        assert_eq!(outcome.added, 0);
    }

    #[test]
    fn test_estimate_single_batch_has_no_wait() {
        let estimate = estimate_duration(10, &SyncOptions::default());
        assert_eq!(estimate.duration, Duration::zero());
        assert_eq!(estimate_duration(0, &SyncOptions::default()).batches, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_all_verifies_each_batch() {
        let remote = InMemoryRemote::new("me")
            .with_users(&["a", "b", "c"])
            .with_collection("friends", &[]);
        let mut collection = remote.collection("friends").unwrap();
        let options = SyncOptions {
            batch_size: 2,
            ..SyncOptions::default()
        };
        let mut session = SyncSession::new(&options);

        let start = tokio::time::Instant::now();
        let outcome = add_all(&remote, &mut session, &mut collection, &ids(&["a", "b", "c"]))
            .await
            .unwrap();

        assert_eq!(outcome.added, 3);
        assert_eq!(outcome.attempted, 3);
        assert_eq!(outcome.batches, 2);
        assert_eq!(collection.member_count, 3);
        assert_eq!(remote.add_batches(), vec![ids(&["a", "b"]), ids(&["c"])]);
        // One window between two batches, none after the last.
        assert_eq!(start.elapsed(), std::time::Duration::from_secs(30 * 60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_all_stops_at_quota() {
        let users = numbered(120);
        let refs: Vec<&str> = users.iter().map(String::as_str).collect();
        let remote = InMemoryRemote::new("me")
            .with_users(&refs)
            .with_collection("friends", &[]);
        let mut collection = remote.collection("friends").unwrap();
        let options = SyncOptions::default();
        let mut session = SyncSession::new(&options);

        let err = add_all(&remote, &mut session, &mut collection, &users)
            .await
            .unwrap_err();

        match err {
            SyncError::QuotaExceeded {
                added,
                remaining,
                resume_at,
                ..
            } => {
                assert_eq!(added, 100);
                assert_eq!(remaining, 20);
                assert!(resume_at > Utc::now() + Duration::hours(23));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(remote.add_batches().len(), 2);
        assert_eq!(session.added(), 100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_all_detects_count_mismatch() {
        let remote = InMemoryRemote::new("me")
            .with_users(&["a", "b", "c"])
            .with_collection("friends", &[]);
        remote.refuse_on_add("c");
        let mut collection = remote.collection("friends").unwrap();
        let options = SyncOptions {
            batch_size: 2,
            ..SyncOptions::default()
        };
        let mut session = SyncSession::new(&options);

        let err = add_all(&remote, &mut session, &mut collection, &ids(&["a", "b", "c"]))
            .await
            .unwrap_err();

        match err {
            SyncError::CountMismatch {
                batch,
                before,
                after,
                user_ids,
                ..
            } => {
                assert_eq!(batch, 2);
                assert_eq!(before, 2);
                assert_eq!(after, 2);
                assert_eq!(user_ids, ids(&["c"]));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(session.added(), 2);
        assert_eq!(session.attempted(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_all_stops_when_interrupted() {
        let remote = InMemoryRemote::new("me")
            .with_users(&["a", "b"])
            .with_collection("friends", &[]);
        let mut collection = remote.collection("friends").unwrap();
        let options = SyncOptions {
            batch_size: 1,
            ..SyncOptions::default()
        };
        let flag = AtomicBool::new(true);
        let mut session = SyncSession::new(&options).with_shutdown_flag(Some(&flag));

        let err = add_all(&remote, &mut session, &mut collection, &ids(&["a", "b"]))
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::Interrupted { added: 0, .. }));
        assert_eq!(remote.call_count(Operation::AddMembers), 0);
    }

    #[tokio::test]
    async fn test_add_failure_is_not_retried() {
        let remote = InMemoryRemote::new("me")
            .with_users(&["a"])
            .with_collection("friends", &[]);
        remote.fail_next(Operation::AddMembers, RemoteError::network("timed out"));
        let mut collection = remote.collection("friends").unwrap();
        let options = SyncOptions::default();
        let mut session = SyncSession::new(&options);

        let err = add_all(&remote, &mut session, &mut collection, &ids(&["a"]))
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::AddFailed { batch: 1, .. }));
        assert_eq!(remote.call_count(Operation::AddMembers), 1);
    }

    #[test]
    fn test_plan_batches_counts_without_adding() {
        let options = SyncOptions {
            batch_size: 2,
            dry_run: true,
            ..SyncOptions::default()
        };
        let session = SyncSession::new(&options);

        let outcome = plan_batches(&session, &ids(&["a", "b", "c"]));

        assert_eq!(outcome.batches, 2);
        assert_eq!(outcome.added, 0);
    }
}
