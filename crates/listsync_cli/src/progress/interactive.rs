use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::Local;
use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use listsync::SyncProgress;

const TICK: Duration = Duration::from_millis(100);

/// Consolidated progress state to avoid multiple mutex locks.
#[derive(Default)]
struct ProgressState {
    /// Paged reads, keyed by what is being listed.
    fetch_bars: HashMap<String, ProgressBar>,
    /// Eligibility checks.
    check_bar: Option<ProgressBar>,
    /// Batch submissions.
    batch_bar: Option<ProgressBar>,
}

/// Interactive progress reporter using indicatif.
pub struct InteractiveReporter {
    multi: MultiProgress,
    state: Mutex<ProgressState>,
}

impl InteractiveReporter {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            state: Mutex::new(ProgressState::default()),
        }
    }

    fn println(&self, line: String) {
        self.multi.println(line).ok();
    }

    pub fn handle(&self, event: SyncProgress) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        match event {
            SyncProgress::CheckingCollection { name, mode } => {
                drop(state);
                self.println(format!(
                    "{} list {} ({} mode)",
                    style("→").cyan(),
                    style(&name).bold(),
                    mode
                ));
            }

            SyncProgress::CollectionFound { name, member_count } => {
                drop(state);
                self.println(format!("  found '{}' with {} members", name, member_count));
            }

            SyncProgress::CollectionCreated { name } => {
                drop(state);
                self.println(format!("  {} created '{}'", style("+").green(), name));
            }

            SyncProgress::CollectionDestroyed { name, reason } => {
                drop(state);
                self.println(format!(
                    "  {} destroyed '{}' ({})",
                    style("-").red(),
                    name,
                    reason
                ));
            }

            SyncProgress::FetchedPage {
                source,
                page,
                count: _,
                total_so_far,
            } => {
                let pb = state.fetch_bars.entry(source.clone()).or_insert_with(|| {
                    let bar = self.multi.add(ProgressBar::new_spinner());
                    bar.set_style(Self::spinner_style());
                    bar.set_prefix(format!("{:12}", source));
                    bar.enable_steady_tick(TICK);
                    bar
                });
                pb.set_message(format!("page {} ({} users)", page, total_so_far));
            }

            SyncProgress::DiffComplete {
                desired,
                already_present,
                to_add,
            } => {
                for pb in state.fetch_bars.values() {
                    if !pb.is_finished() {
                        pb.finish();
                    }
                }
                drop(state);
                self.println(format!(
                    "  {} requested, {} already present, {} to add",
                    desired, already_present, to_add
                ));
            }

            SyncProgress::CheckingEligibility { count } => {
                let pb = self.multi.add(ProgressBar::new(count as u64));
                pb.set_style(Self::bar_style());
                pb.set_prefix(format!("{:12}", "Checking"));
                pb.set_message("eligibility...");
                state.check_bar = Some(pb);
            }

            SyncProgress::CandidateSkipped {
                user_id,
                display_name,
                reason,
            } => {
                if let Some(ref pb) = state.check_bar {
                    pb.inc(1);
                    pb.set_message(format!(
                        "✗ {} ({})",
                        display_label(&user_id, &display_name),
                        reason
                    ));
                }
                drop(state);
                self.println(format!(
                    "  {} skip {}: {}",
                    style("·").yellow(),
                    display_label(&user_id, &display_name),
                    reason
                ));
            }

            SyncProgress::EligibilityComplete {
                eligible,
                ineligible,
            } => {
                if let Some(ref pb) = state.check_bar {
                    pb.set_position((eligible + ineligible) as u64);
                    pb.finish_with_message(format!(
                        "✓ {} eligible, {} skipped",
                        eligible, ineligible
                    ));
                }
            }

            SyncProgress::BatchesPlanned {
                batches,
                members,
                batch_size,
                dry_run,
            } => {
                if dry_run {
                    drop(state);
                    self.println(format!(
                        "  {} would add {} members in {} batches of up to {}",
                        style("dry run:").yellow().bold(),
                        members,
                        batches,
                        batch_size
                    ));
                    return;
                }
                let pb = self.multi.add(ProgressBar::new(batches as u64));
                pb.set_style(Self::bar_style());
                pb.set_prefix(format!("{:12}", "Adding"));
                pb.set_message(format!("{} members", members));
                state.batch_bar = Some(pb);
            }

            SyncProgress::WaitingForWindow {
                next_batch,
                total_batches,
                resume_at,
            } => {
                if let Some(ref pb) = state.batch_bar {
                    pb.set_message(format!(
                        "⏳ batch {}/{} at {}",
                        next_batch,
                        total_batches,
                        resume_at.with_timezone(&Local).format("%H:%M:%S")
                    ));
                }
            }

            SyncProgress::SubmittingBatch {
                batch,
                total_batches,
                count,
            } => {
                if let Some(ref pb) = state.batch_bar {
                    pb.set_message(format!(
                        "batch {}/{} ({} members)...",
                        batch, total_batches, count
                    ));
                }
            }

            SyncProgress::BatchVerified {
                batch: _,
                total_batches: _,
                before,
                after,
            } => {
                if let Some(ref pb) = state.batch_bar {
                    pb.inc(1);
                    pb.set_message(format!("✓ {} → {} members", before, after));
                }
            }

            SyncProgress::RateLimitWait {
                operation,
                resume_at,
                attempt,
            } => {
                drop(state);
                self.println(format!(
                    "  {} {} rate limited, retry {} at {}",
                    style("⏳").yellow(),
                    operation,
                    attempt,
                    resume_at.with_timezone(&Local).format("%H:%M:%S")
                ));
            }

            SyncProgress::QuotaReached {
                added,
                remaining,
                resume_at,
            } => {
                if let Some(ref pb) = state.batch_bar {
                    pb.abandon_with_message(format!("daily quota reached after {} added", added));
                }
                drop(state);
                self.println(format!(
                    "{} {} members remain; the quota resets at {}",
                    style("⚠").yellow(),
                    remaining,
                    resume_at.with_timezone(&Local).format("%Y-%m-%d %H:%M")
                ));
            }

            SyncProgress::Warning { message } => {
                drop(state);
                self.println(format!("{} {}", style("⚠").yellow(), message));
            }

            SyncProgress::SyncComplete {
                name,
                added,
                skipped: _,
            } => {
                if let Some(ref pb) = state.batch_bar
                    && !pb.is_finished()
                {
                    pb.finish_with_message(format!("✓ {} added to '{}'", added, name));
                }
            }

            _ => {}
        }
    }

    pub fn finish(&self) {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        for pb in state.fetch_bars.values() {
            if !pb.is_finished() {
                pb.finish();
            }
        }
        if let Some(ref pb) = state.check_bar
            && !pb.is_finished()
        {
            pb.finish();
        }
        if let Some(ref pb) = state.batch_bar
            && !pb.is_finished()
        {
            pb.abandon();
        }
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::default_spinner()
            .template("{prefix:.bold.cyan} {spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
    }

    fn bar_style() -> ProgressStyle {
        ProgressStyle::default_bar()
            .template("{prefix:.bold.cyan} [{bar:40.cyan/blue}] {pos:>3}/{len:3} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░")
    }
}

impl Default for InteractiveReporter {
    fn default() -> Self {
        Self::new()
    }
}

fn display_label(user_id: &str, display_name: &str) -> String {
    if display_name.is_empty() {
        user_id.to_string()
    } else {
        format!("@{} ({})", display_name, user_id)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use listsync::{Eligibility, SyncMode};

    use super::*;

    #[test]
    fn test_display_label() {
        assert_eq!(display_label("12", ""), "12");
        assert_eq!(display_label("12", "jack"), "@jack (12)");
    }

    #[test]
    fn test_handles_full_event_sequence() {
        let reporter = InteractiveReporter::new();
        reporter.multi.set_draw_target(indicatif::ProgressDrawTarget::hidden());

        reporter.handle(SyncProgress::CheckingCollection {
            name: "friends".to_string(),
            mode: SyncMode::DiffOnly,
        });
        reporter.handle(SyncProgress::FetchedPage {
            source: "members".to_string(),
            page: 1,
            count: 2,
            total_so_far: 2,
        });
        reporter.handle(SyncProgress::DiffComplete {
            desired: 3,
            already_present: 1,
            to_add: 2,
        });
        reporter.handle(SyncProgress::CheckingEligibility { count: 2 });
        reporter.handle(SyncProgress::CandidateSkipped {
            user_id: "9".to_string(),
            display_name: "locked".to_string(),
            reason: Eligibility::Protected,
        });
        reporter.handle(SyncProgress::EligibilityComplete {
            eligible: 1,
            ineligible: 1,
        });
        reporter.handle(SyncProgress::BatchesPlanned {
            batches: 1,
            members: 1,
            batch_size: 50,
            dry_run: false,
        });
        reporter.handle(SyncProgress::WaitingForWindow {
            next_batch: 1,
            total_batches: 1,
            resume_at: Utc::now(),
        });
        reporter.handle(SyncProgress::BatchVerified {
            batch: 1,
            total_batches: 1,
            before: 1,
            after: 2,
        });
        reporter.handle(SyncProgress::SyncComplete {
            name: "friends".to_string(),
            added: 1,
            skipped: 1,
        });
        reporter.finish();

        let state = reporter.state.lock().unwrap();
        assert!(state.fetch_bars["members"].is_finished());
        assert_eq!(state.check_bar.as_ref().unwrap().position(), 2);
        let batch_bar = state.batch_bar.as_ref().unwrap();
        assert_eq!(batch_bar.position(), 1);
        assert!(batch_bar.is_finished());
    }
}
