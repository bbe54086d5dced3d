//! Collection membership sync.
//!
//! This module converges a remote collection towards a desired member set
//! under the remote service's rate limits and daily quota.
//!
//! # Module Structure
//!
//! - [`types`] - Core types: `SyncOptions`, `Candidate`, `SyncReport`, constants
//! - [`progress`] - Progress reporting: `SyncProgress`, `ProgressCallback`, `emit()`
//! - [`engine`] - Sync engine: diff, eligibility, batching and rollback
//! - [`context`] - `SyncContext` builder bundling client, options and callbacks
//!
//! # Example
//!
//! ```ignore
//! use listsync::remote::{RateLimitedClient, rate_limits};
//! use listsync::sync::{Candidate, SyncContext, SyncOptions};
//!
//! let client = RateLimitedClient::new(rest_client, 180, rate_limits::WINDOW);
//! let ctx = SyncContext::builder()
//!     .client(client)
//!     .options(SyncOptions::default())
//!     .build()?;
//! let report = ctx.sync_members("friends", vec![Candidate::new("12", "alice")]).await?;
//! println!("Added {} members", report.added);
//! ```

mod context;
pub mod engine;
mod error;
mod progress;
mod types;

// Re-export types
pub use types::{
    BatchOutcome, Candidate, DiffOutcome, Eligibility, EligibilityReport, RunEstimate, SyncMode,
    SyncOptions, SyncReport,
};

// Re-export constants
pub use types::{
    DEFAULT_BATCH_SIZE, DEFAULT_DAILY_QUOTA, DEFAULT_WINDOW_MINUTES, MAX_RATE_LIMIT_WAITS,
    QUOTA_RESET_HOURS,
};

pub use context::{SyncContext, SyncContextBuilder, SyncContextError};
pub use error::{Result, SyncError};

// Re-export progress types
pub use progress::{ProgressCallback, SyncProgress, emit};

// Re-export engine functions for convenience
pub use engine::{
    Batch, BatchState, SyncSession, add_all, collection_members, dedupe_candidates, diff_members,
    estimate_duration, filter_candidates, follow_graph_candidates, follow_graph_collection_name,
    owned_collections, partition, plan_batches, sync_collection,
};
