//! listsync - rate-limited list membership synchronization.
//!
//! This library converges a remote member collection ("list") towards a
//! desired set of users while staying inside the remote service's request
//! windows and daily add quota. Ineligible accounts are filtered out before
//! any write, batches are verified by their member-count delta, and a
//! collection created by a failed run is rolled back.
//!
//! # Features
//!
//! - `rest` (default) - Enables the reqwest-backed HTTP transport and the
//!   [`rest::RestClient`] adapter.
//!
//! # Example
//!
//! ```ignore
//! use listsync::rest::{DEFAULT_BASE_URL, RestClient};
//! use listsync::{Candidate, SyncContext, SyncOptions};
//!
//! let client = RestClient::new(DEFAULT_BASE_URL, &token)?;
//! let ctx = SyncContext::builder()
//!     .client(client)
//!     .options(SyncOptions::default())
//!     .build()?;
//!
//! let report = ctx
//!     .sync_members("friends", vec![Candidate::new("12", "jack")])
//!     .await?;
//! println!("{} added, {} skipped", report.added, report.skipped.len());
//! ```

pub mod remote;
pub mod sync;

#[cfg(feature = "rest")]
pub mod http;

#[cfg(feature = "rest")]
pub mod rest;

pub use remote::{
    ApiRateLimiter, CollectionClient, CollectionRef, FollowKind, InMemoryRemote, RateLimitedClient,
    RemoteError, rate_limits,
};
pub use sync::{
    Candidate, Eligibility, SyncContext, SyncError, SyncMode, SyncOptions, SyncProgress,
    SyncReport,
};
