use listsync::SyncProgress;

/// Logging reporter using tracing for structured output.
pub struct LoggingReporter;

impl LoggingReporter {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, event: SyncProgress) {
        match event {
            SyncProgress::CheckingCollection { name, mode } => {
                tracing::info!(list = %name, mode = %mode, "Checking list");
            }

            SyncProgress::CollectionFound { name, member_count } => {
                tracing::info!(list = %name, member_count, "Found list");
            }

            SyncProgress::CollectionCreated { name } => {
                tracing::info!(list = %name, "Created list");
            }

            SyncProgress::CollectionDestroyed { name, reason } => {
                tracing::warn!(list = %name, reason = %reason, "Destroyed list");
            }

            SyncProgress::FetchedPage {
                source,
                page,
                count,
                total_so_far,
            } => {
                tracing::debug!(source = %source, page, count, total_so_far, "Fetched page");
            }

            SyncProgress::DiffComplete {
                desired,
                already_present,
                to_add,
            } => {
                tracing::info!(desired, already_present, to_add, "Diff complete");
            }

            SyncProgress::CheckingEligibility { count } => {
                tracing::info!(count, "Checking eligibility");
            }

            SyncProgress::CandidateSkipped {
                user_id,
                display_name,
                reason,
            } => {
                tracing::info!(
                    user_id = %user_id,
                    display_name = %display_name,
                    reason = %reason,
                    "Skipped"
                );
            }

            SyncProgress::EligibilityComplete {
                eligible,
                ineligible,
            } => {
                tracing::info!(eligible, ineligible, "Eligibility complete");
            }

            SyncProgress::BatchesPlanned {
                batches,
                members,
                batch_size,
                dry_run,
            } => {
                tracing::info!(batches, members, batch_size, dry_run, "Planned batches");
            }

            SyncProgress::WaitingForWindow {
                next_batch,
                total_batches,
                resume_at,
            } => {
                tracing::info!(
                    next_batch,
                    total_batches,
                    resume_at = %resume_at.to_rfc3339(),
                    "Waiting for next window"
                );
            }

            SyncProgress::SubmittingBatch {
                batch,
                total_batches,
                count,
            } => {
                tracing::debug!(batch, total_batches, count, "Submitting batch");
            }

            SyncProgress::BatchVerified {
                batch,
                total_batches,
                before,
                after,
            } => {
                tracing::info!(batch, total_batches, before, after, "Batch added");
            }

            SyncProgress::RateLimitWait {
                operation,
                resume_at,
                attempt,
            } => {
                tracing::warn!(
                    operation = %operation,
                    resume_at = %resume_at.to_rfc3339(),
                    attempt,
                    "Rate limited, waiting"
                );
            }

            SyncProgress::QuotaReached {
                added,
                remaining,
                resume_at,
            } => {
                tracing::warn!(
                    added,
                    remaining,
                    resume_at = %resume_at.to_rfc3339(),
                    "Daily quota reached"
                );
            }

            SyncProgress::Warning { message } => {
                tracing::warn!(message = %message, "Warning");
            }

            SyncProgress::SyncComplete {
                name,
                added,
                skipped,
            } => {
                tracing::info!(list = %name, added, skipped, "Sync complete");
            }

            _ => {}
        }
    }
}

impl Default for LoggingReporter {
    fn default() -> Self {
        Self::new()
    }
}
