//! Sync types and constants.

use std::fmt;
use std::str::FromStr;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::remote::{CollectionRef, MAX_ADD_IDS};

/// Default number of members submitted per add call.
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Default wait between batches, in minutes.
pub const DEFAULT_WINDOW_MINUTES: i64 = 30;

/// Default maximum number of successful additions per rolling day.
pub const DEFAULT_DAILY_QUOTA: usize = 100;

/// How long the daily quota takes to reset.
pub const QUOTA_RESET_HOURS: i64 = 24;

/// Maximum consecutive rate-limit waits for a single read request.
pub const MAX_RATE_LIMIT_WAITS: u32 = 3;

/// How the target collection is converged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SyncMode {
    /// Destroy and recreate the collection, then add every desired member.
    #[serde(rename = "full", alias = "full-resync")]
    FullResync,
    /// Add only desired members that are not already present.
    #[default]
    #[serde(rename = "diff", alias = "diff-only")]
    DiffOnly,
}

impl SyncMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FullResync => "full",
            Self::DiffOnly => "diff",
        }
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" | "full-resync" | "full_resync" => Ok(Self::FullResync),
            "diff" | "diff-only" | "diff_only" => Ok(Self::DiffOnly),
            other => Err(format!("unknown sync mode '{other}' (expected 'full' or 'diff')")),
        }
    }
}

/// Options for a synchronization run.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// How the collection is converged.
    pub mode: SyncMode,
    /// Maximum members per add call.
    pub batch_size: usize,
    /// Wait between consecutive batches.
    pub window: Duration,
    /// Maximum successful additions per run before the quota stop.
    pub daily_quota: usize,
    /// Dry run mode - read remote state but never create, destroy or add.
    pub dry_run: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            mode: SyncMode::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            window: Duration::minutes(DEFAULT_WINDOW_MINUTES),
            daily_quota: DEFAULT_DAILY_QUOTA,
            dry_run: false,
        }
    }
}

impl SyncOptions {
    /// Check the options against the remote service's hard limits.
    ///
    /// Returns a human-readable description of the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        if self.batch_size == 0 {
            return Err("batch size must be at least 1".to_string());
        }
        if self.batch_size > MAX_ADD_IDS {
            return Err(format!(
                "batch size {} exceeds the remote maximum of {}",
                self.batch_size, MAX_ADD_IDS
            ));
        }
        if self.window <= Duration::zero() {
            return Err("window must be longer than zero minutes".to_string());
        }
        if self.window > Duration::hours(QUOTA_RESET_HOURS) {
            return Err(format!(
                "window of {} minutes exceeds the {QUOTA_RESET_HOURS} hour quota period",
                self.window.num_minutes()
            ));
        }
        if self.daily_quota == 0 {
            return Err("daily quota must be at least 1".to_string());
        }
        if self.batch_size > self.daily_quota {
            return Err(format!(
                "batch size {} exceeds the daily quota of {}",
                self.batch_size, self.daily_quota
            ));
        }
        Ok(())
    }
}

/// Why a candidate can or cannot be added to a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Eligibility {
    /// Not checked yet.
    #[default]
    Unknown,
    /// Passed every check.
    Eligible,
    /// The account is protected.
    Protected,
    /// The account blocks the caller.
    BlockingCaller,
    /// The caller blocks the account.
    BlockedByCaller,
    /// The identifier did not resolve to an account.
    Unresolved,
}

impl Eligibility {
    #[must_use]
    pub fn is_eligible(self) -> bool {
        matches!(self, Self::Eligible)
    }

    /// Short description used in reports and log lines.
    #[must_use]
    pub fn reason(self) -> &'static str {
        match self {
            Self::Unknown => "not checked",
            Self::Eligible => "eligible",
            Self::Protected => "protected account",
            Self::BlockingCaller => "blocks you",
            Self::BlockedByCaller => "blocked by you",
            Self::Unresolved => "account not found",
        }
    }
}

impl fmt::Display for Eligibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reason())
    }
}

/// A user the caller wants in the collection.
///
/// Eligibility starts as [`Eligibility::Unknown`] and is only ever set by the
/// eligibility filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    /// Opaque user identifier.
    pub user_id: String,
    /// Display name (may be empty until resolved).
    #[serde(default)]
    pub display_name: String,
    #[serde(skip)]
    eligibility: Eligibility,
}

impl Candidate {
    pub fn new(user_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
            eligibility: Eligibility::Unknown,
        }
    }

    #[must_use]
    pub fn eligibility(&self) -> Eligibility {
        self.eligibility
    }

    pub(crate) fn set_eligibility(&mut self, eligibility: Eligibility) {
        self.eligibility = eligibility;
    }
}

/// Output of the diff engine.
#[derive(Debug, Clone)]
pub struct DiffOutcome {
    /// The target collection. `None` only when it does not exist and nothing
    /// was created (empty desired set or dry run).
    pub collection: Option<CollectionRef>,
    /// Whether the collection was created by this session.
    pub created: bool,
    /// Desired members not yet in the collection, in desired order.
    pub to_add: Vec<Candidate>,
    /// Number of desired members already in the collection.
    pub already_present: usize,
}

/// Output of the eligibility filter.
#[derive(Debug, Clone, Default)]
pub struct EligibilityReport {
    /// Candidates that passed every check, in input order.
    pub eligible: Vec<Candidate>,
    /// Candidates that were excluded, each carrying its reason.
    pub ineligible: Vec<Candidate>,
}

impl EligibilityReport {
    pub(crate) fn accept(&mut self, mut candidate: Candidate) {
        candidate.set_eligibility(Eligibility::Eligible);
        self.eligible.push(candidate);
    }

    pub(crate) fn reject(&mut self, mut candidate: Candidate, reason: Eligibility) {
        candidate.set_eligibility(reason);
        self.ineligible.push(candidate);
    }

    /// Identifiers of the eligible candidates, in order.
    #[must_use]
    pub fn eligible_ids(&self) -> Vec<String> {
        self.eligible.iter().map(|c| c.user_id.clone()).collect()
    }
}

/// Output of the batch scheduler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Members whose addition was verified.
    pub added: usize,
    /// Members submitted to add calls.
    pub attempted: usize,
    /// Batches submitted.
    pub batches: usize,
}

/// Result of a synchronization run.
#[derive(Debug, Clone)]
pub struct SyncReport {
    /// Name of the target collection.
    pub collection_name: String,
    /// Final state of the collection, `None` if it does not exist afterwards.
    pub collection: Option<CollectionRef>,
    /// Whether the collection was created by this run.
    pub created: bool,
    /// Whether the run destroyed the collection it created because nothing was added.
    pub destroyed: bool,
    /// Mode the run used.
    pub mode: SyncMode,
    /// Distinct desired members.
    pub requested: usize,
    /// Desired members already present before the run.
    pub present_before: usize,
    /// Members submitted to add calls.
    pub attempted: usize,
    /// Members whose addition was verified.
    pub added: usize,
    /// Candidates excluded by the eligibility filter.
    pub skipped: Vec<Candidate>,
    /// Batches planned (dry run) or submitted.
    pub batches: usize,
    /// Whether this was a dry run.
    pub dry_run: bool,
}

/// Expected shape and duration of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunEstimate {
    /// Total batches needed.
    pub batches: usize,
    /// Batches that fit in today's quota.
    pub batches_today: usize,
    /// Members that do not fit in today's quota.
    pub deferred: usize,
    /// Wall-clock time of today's batches (waits between them).
    pub duration: Duration,
}
