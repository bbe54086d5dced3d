use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::errors::Result;

/// Maximum number of identifiers accepted by a single bulk lookup.
pub const MAX_LOOKUP_IDS: usize = 100;

/// Maximum number of identifiers accepted by a single add-members call.
pub const MAX_ADD_IDS: usize = 100;

/// A user as it appears in a paged listing (collection members, block list,
/// follow graph).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    /// Opaque user identifier.
    pub id: String,
    /// Display name, when the listing includes it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl UserRef {
    /// Create a reference without a display name.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: None,
        }
    }
}

/// A user returned by a bulk lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedUser {
    /// Opaque user identifier, as requested.
    pub id: String,
    /// Display name.
    pub display_name: String,
    /// Whether the account is protected (cannot be added to collections).
    pub protected: bool,
}

/// Pairwise relationship between a source and a target user.
///
/// The flags are `None` when the remote service did not report them, which
/// is the case unless the source is the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Relationship {
    /// Whether the source blocks the target.
    pub blocking: Option<bool>,
    /// Whether the target blocks the source.
    pub blocked_by: Option<bool>,
}

/// A remote collection ("list").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionRef {
    /// Remote collection identifier.
    pub id: String,
    /// Collection name.
    pub name: String,
    /// Number of members, as last reported by the remote service.
    pub member_count: usize,
}

/// The account the credential belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    /// Opaque user identifier of the caller.
    pub id: String,
    /// Display name of the caller.
    pub display_name: String,
    /// Whether the credential may mutate collections.
    pub can_write: bool,
}

/// One page of a cursor-paged listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    /// Items on this page.
    pub items: Vec<T>,
    /// Cursor for the next page, `None` on the last page.
    pub next_cursor: Option<String>,
}

impl<T> Page<T> {
    /// A final page.
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            next_cursor: None,
        }
    }
}

/// Which side of a user's follow graph to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FollowKind {
    /// Accounts the user follows.
    Followees,
    /// Accounts following the user.
    Followers,
}

impl FollowKind {
    /// Prefix used when naming a collection generated from this side of the graph.
    #[must_use]
    pub fn collection_prefix(self) -> &'static str {
        match self {
            Self::Followees => "followee",
            Self::Followers => "follower",
        }
    }
}

/// Trait for remote list API clients.
///
/// Implementors validate responses at the boundary and hand back the typed
/// structs above. Paged listings return a single page per call; the sync
/// engine drives the cursor so it can wait out rate limits between pages.
///
/// # Implementation Notes
///
/// Implementors should:
/// - Map rate limit responses to `RemoteError::RateLimited` with the reset time
/// - Map timeouts, connection failures and 5xx responses to transient errors
/// - Never retry writes internally
#[async_trait]
pub trait CollectionClient: Send + Sync {
    /// Resolve the account the credential belongs to and its access level.
    async fn verify_caller(&self) -> Result<Caller>;

    /// Find a collection owned by the caller by name.
    async fn find_collection(&self, name: &str) -> Result<Option<CollectionRef>>;

    /// Fetch one page of the collections owned by the caller.
    async fn owned_collections(&self, cursor: Option<String>) -> Result<Page<CollectionRef>>;

    /// Fetch one page of a collection's members.
    async fn list_members(
        &self,
        collection: &CollectionRef,
        cursor: Option<String>,
    ) -> Result<Page<UserRef>>;

    /// Resolve up to [`MAX_LOOKUP_IDS`] identifiers.
    ///
    /// Identifiers that do not resolve are simply absent from the result.
    async fn bulk_lookup(&self, user_ids: &[String]) -> Result<Vec<ResolvedUser>>;

    /// Query the relationship from `source_id` to `target_id`.
    ///
    /// Blocking flags are only reliable when `source_id` is the caller.
    async fn relationship(&self, source_id: &str, target_id: &str) -> Result<Relationship>;

    /// Fetch one page of the users blocked by the caller.
    async fn blocked_users(&self, cursor: Option<String>) -> Result<Page<UserRef>>;

    /// Fetch one page of a user's followees or followers.
    async fn follow_graph(
        &self,
        user_id: &str,
        kind: FollowKind,
        cursor: Option<String>,
    ) -> Result<Page<UserRef>>;

    /// Create an empty collection.
    async fn create_collection(&self, name: &str) -> Result<CollectionRef>;

    /// Destroy a collection.
    async fn destroy_collection(&self, collection: &CollectionRef) -> Result<()>;

    /// Add a batch of members and return the collection with its post-add
    /// member count.
    async fn add_members(
        &self,
        collection: &CollectionRef,
        user_ids: &[String],
    ) -> Result<CollectionRef>;
}
