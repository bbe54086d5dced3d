//! Client boundary for the remote list API.
//!
//! This module defines the `CollectionClient` trait that the sync engine
//! drives, the typed response structs implementations validate into, and the
//! error type shared by every implementation.
//!
//! # Example
//!
//! ```ignore
//! use listsync::remote::{CollectionClient, RemoteError};
//!
//! async fn show<C: CollectionClient>(client: &C, name: &str) -> Result<(), RemoteError> {
//!     if let Some(list) = client.find_collection(name).await? {
//!         println!("{} has {} members", list.name, list.member_count);
//!     }
//!     Ok(())
//! }
//! ```

mod errors;
pub mod memory;
mod rate_limit;
mod types;

pub use errors::{RemoteError, Result, short_error_message};
pub use memory::{InMemoryRemote, Operation};
pub use rate_limit::{ApiRateLimiter, RateLimitedClient, rate_limits};
pub use types::{
    Caller, CollectionClient, CollectionRef, FollowKind, MAX_ADD_IDS, MAX_LOOKUP_IDS, Page,
    Relationship, ResolvedUser, UserRef,
};
