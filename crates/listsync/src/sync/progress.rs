//! Progress reporting types for sync operations.
//!
//! The engine emits these events as it moves through a session so the CLI
//! can render them either as log lines or as interactive progress bars.

use chrono::{DateTime, Utc};

use super::types::{Eligibility, SyncMode};

/// Progress events emitted during sync operations.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum SyncProgress {
    /// Looking up the target collection.
    CheckingCollection {
        /// Collection name.
        name: String,
        /// Mode of the run.
        mode: SyncMode,
    },

    /// The target collection already exists.
    CollectionFound {
        /// Collection name.
        name: String,
        /// Member count reported by the remote service.
        member_count: usize,
    },

    /// The session created the target collection.
    CollectionCreated {
        /// Collection name.
        name: String,
    },

    /// A collection was destroyed.
    CollectionDestroyed {
        /// Collection name.
        name: String,
        /// Why it was destroyed.
        reason: String,
    },

    /// Fetched a page of a paged listing.
    FetchedPage {
        /// What is being listed ("members", "blocked users", ...).
        source: String,
        /// Page number (1-indexed).
        page: u32,
        /// Number of users on this page.
        count: usize,
        /// Running total of users fetched so far.
        total_so_far: usize,
    },

    /// Diff against existing members is complete.
    DiffComplete {
        /// Distinct desired members.
        desired: usize,
        /// Desired members already present.
        already_present: usize,
        /// Members left to add.
        to_add: usize,
    },

    /// Starting eligibility checks.
    CheckingEligibility {
        /// Number of candidates to check.
        count: usize,
    },

    /// A candidate was excluded.
    CandidateSkipped {
        /// User identifier.
        user_id: String,
        /// Display name, if known.
        display_name: String,
        /// Why the candidate was excluded.
        reason: Eligibility,
    },

    /// Eligibility checks are complete.
    EligibilityComplete {
        /// Candidates that passed.
        eligible: usize,
        /// Candidates that were excluded.
        ineligible: usize,
    },

    /// Batches have been planned.
    BatchesPlanned {
        /// Number of batches.
        batches: usize,
        /// Number of members across all batches.
        members: usize,
        /// Members per batch.
        batch_size: usize,
        /// Whether this is a dry run.
        dry_run: bool,
    },

    /// Waiting for the next window before submitting a batch.
    WaitingForWindow {
        /// 1-indexed batch that will be submitted next.
        next_batch: usize,
        /// Total number of batches.
        total_batches: usize,
        /// When the next batch will be submitted.
        resume_at: DateTime<Utc>,
    },

    /// Submitting a batch.
    SubmittingBatch {
        /// 1-indexed batch number.
        batch: usize,
        /// Total number of batches.
        total_batches: usize,
        /// Members in this batch.
        count: usize,
    },

    /// A batch was added and its member count verified.
    BatchVerified {
        /// 1-indexed batch number.
        batch: usize,
        /// Total number of batches.
        total_batches: usize,
        /// Member count before the batch.
        before: usize,
        /// Member count after the batch.
        after: usize,
    },

    /// A read request was rate limited and the engine is waiting for the reset.
    RateLimitWait {
        /// Operation that was limited.
        operation: String,
        /// When the request will be retried.
        resume_at: DateTime<Utc>,
        /// Current wait number (1-indexed).
        attempt: u32,
    },

    /// The daily quota would be exceeded by the next batch.
    QuotaReached {
        /// Members added so far.
        added: usize,
        /// Members not yet submitted.
        remaining: usize,
        /// When the quota resets.
        resume_at: DateTime<Utc>,
    },

    /// Warning message (non-fatal).
    Warning {
        /// Warning message.
        message: String,
    },

    /// The session finished.
    SyncComplete {
        /// Collection name.
        name: String,
        /// Members added.
        added: usize,
        /// Candidates excluded.
        skipped: usize,
    },
}

/// Callback for progress updates during sync operations.
pub type ProgressCallback = Box<dyn Fn(SyncProgress) + Send + Sync>;

/// Emit a progress event if a callback is provided.
///
/// # Example
///
/// ```ignore
/// use listsync::sync::{emit, SyncProgress, ProgressCallback};
///
/// fn report(on_progress: Option<&ProgressCallback>) {
///     emit(on_progress, SyncProgress::Warning { message: "slow".into() });
/// }
/// ```
#[inline]
pub fn emit(on_progress: Option<&ProgressCallback>, event: SyncProgress) {
    if let Some(cb) = on_progress {
        cb(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_emit_with_callback() {
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);

        let callback: ProgressCallback = Box::new(move |_event| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        emit(
            Some(&callback),
            SyncProgress::CollectionCreated {
                name: "friends".to_string(),
            },
        );
        emit(
            Some(&callback),
            SyncProgress::EligibilityComplete {
                eligible: 3,
                ineligible: 1,
            },
        );

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_emit_without_callback() {
        // Should not panic when callback is None
        emit(
            None,
            SyncProgress::Warning {
                message: "nothing listening".to_string(),
            },
        );
    }

    #[test]
    fn test_sync_progress_candidate_skipped_debug() {
        let event = SyncProgress::CandidateSkipped {
            user_id: "42".to_string(),
            display_name: "locked".to_string(),
            reason: Eligibility::Protected,
        };

        let debug_str = format!("{:?}", event);
        assert!(debug_str.contains("CandidateSkipped"));
        assert!(debug_str.contains("Protected"));
    }

    #[test]
    fn test_sync_progress_waiting_for_window() {
        let resume_at = Utc::now();
        let event = SyncProgress::WaitingForWindow {
            next_batch: 2,
            total_batches: 3,
            resume_at,
        };

        if let SyncProgress::WaitingForWindow {
            next_batch,
            resume_at: at,
            ..
        } = event.clone()
        {
            assert_eq!(next_batch, 2);
            assert_eq!(at, resume_at);
        } else {
            panic!("Clone produced wrong variant");
        }
    }

    #[test]
    fn test_emit_preserves_order() {
        let events = Arc::new(std::sync::Mutex::new(Vec::new()));
        let events_clone = Arc::clone(&events);

        let callback: ProgressCallback = Box::new(move |event| {
            events_clone.lock().unwrap().push(format!("{:?}", event));
        });

        emit(
            Some(&callback),
            SyncProgress::SubmittingBatch {
                batch: 1,
                total_batches: 2,
                count: 50,
            },
        );
        emit(
            Some(&callback),
            SyncProgress::BatchVerified {
                batch: 1,
                total_batches: 2,
                before: 0,
                after: 50,
            },
        );

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert!(events[0].contains("SubmittingBatch"));
        assert!(events[1].contains("BatchVerified"));
    }
}
