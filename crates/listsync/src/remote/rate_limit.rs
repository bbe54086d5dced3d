use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};

use super::errors::Result;
use super::types::{
    Caller, CollectionClient, CollectionRef, FollowKind, Page, Relationship, ResolvedUser, UserRef,
};

/// Type alias for the governor rate limiter.
type GovernorRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Default request budgets of the remote API.
pub mod rate_limits {
    use std::time::Duration;

    /// Length of the remote rate-limit window.
    pub const WINDOW: Duration = Duration::from_secs(15 * 60);
    /// Requests per window for the tightest read endpoint we call per candidate
    /// (relationship lookups).
    pub const DEFAULT_REQUESTS_PER_WINDOW: u32 = 180;
}

/// Build a quota of `requests` evenly spread over `window`, allowing the
/// whole budget as a burst.
fn window_quota(requests: u32, window: Duration) -> Quota {
    let requests = NonZeroU32::new(requests).unwrap_or(NonZeroU32::MIN);
    let period = window / requests.get();
    Quota::with_period(period)
        .unwrap_or_else(|| Quota::per_second(requests))
        .allow_burst(requests)
}

/// A standalone API rate limiter using the governor crate.
///
/// # Example
///
/// ```ignore
/// use listsync::remote::{ApiRateLimiter, rate_limits};
///
/// let limiter = ApiRateLimiter::per_window(180, rate_limits::WINDOW);
///
/// // Before each API call:
/// limiter.wait().await;
/// client.relationship(caller, candidate).await?;
/// ```
#[derive(Clone)]
pub struct ApiRateLimiter {
    inner: Arc<GovernorRateLimiter>,
}

impl ApiRateLimiter {
    /// Create a limiter that allows `requests` per `window`.
    ///
    /// A budget of 0 is treated as 1.
    pub fn per_window(requests: u32, window: Duration) -> Self {
        Self {
            inner: Arc::new(RateLimiter::direct(window_quota(requests, window))),
        }
    }

    /// Wait until a request is allowed by the rate limiter.
    pub async fn wait(&self) {
        self.inner.until_ready().await;
    }
}

/// A rate-limited wrapper around any `CollectionClient`.
///
/// Every trait method waits for the shared limiter before delegating to the
/// inner client, so all calls made with one credential draw from one budget.
///
/// # Example
///
/// ```ignore
/// use listsync::remote::{RateLimitedClient, rate_limits};
///
/// let client = RateLimitedClient::new(rest_client, 180, rate_limits::WINDOW);
/// let caller = client.verify_caller().await?;
/// ```
pub struct RateLimitedClient<C> {
    inner: C,
    limiter: Option<ApiRateLimiter>,
}

impl<C> RateLimitedClient<C> {
    /// Wrap `inner`, allowing `requests` per `window`.
    pub fn new(inner: C, requests: u32, window: Duration) -> Self {
        Self::with_limiter(inner, Some(ApiRateLimiter::per_window(requests, window)))
    }

    /// Wrap `inner` with an existing limiter, or none to disable pacing.
    ///
    /// Sharing one limiter between clients makes them draw from one budget.
    pub fn with_limiter(inner: C, limiter: Option<ApiRateLimiter>) -> Self {
        Self { inner, limiter }
    }

    /// Whether requests are paced.
    pub fn is_throttled(&self) -> bool {
        self.limiter.is_some()
    }

    async fn wait(&self) {
        if let Some(ref limiter) = self.limiter {
            limiter.wait().await;
        }
    }

    /// Get a reference to the inner client.
    pub fn inner(&self) -> &C {
        &self.inner
    }
}

impl<C: Clone> Clone for RateLimitedClient<C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            limiter: self.limiter.clone(),
        }
    }
}

#[async_trait]
impl<C: CollectionClient> CollectionClient for RateLimitedClient<C> {
    async fn verify_caller(&self) -> Result<Caller> {
        self.wait().await;
        self.inner.verify_caller().await
    }

    async fn find_collection(&self, name: &str) -> Result<Option<CollectionRef>> {
        self.wait().await;
        self.inner.find_collection(name).await
    }

    async fn owned_collections(&self, cursor: Option<String>) -> Result<Page<CollectionRef>> {
        self.wait().await;
        self.inner.owned_collections(cursor).await
    }

    async fn list_members(
        &self,
        collection: &CollectionRef,
        cursor: Option<String>,
    ) -> Result<Page<UserRef>> {
        self.wait().await;
        self.inner.list_members(collection, cursor).await
    }

    async fn bulk_lookup(&self, user_ids: &[String]) -> Result<Vec<ResolvedUser>> {
        self.wait().await;
        self.inner.bulk_lookup(user_ids).await
    }

    async fn relationship(&self, source_id: &str, target_id: &str) -> Result<Relationship> {
        self.wait().await;
        self.inner.relationship(source_id, target_id).await
    }

    async fn blocked_users(&self, cursor: Option<String>) -> Result<Page<UserRef>> {
        self.wait().await;
        self.inner.blocked_users(cursor).await
    }

    async fn follow_graph(
        &self,
        user_id: &str,
        kind: FollowKind,
        cursor: Option<String>,
    ) -> Result<Page<UserRef>> {
        self.wait().await;
        self.inner.follow_graph(user_id, kind, cursor).await
    }

    async fn create_collection(&self, name: &str) -> Result<CollectionRef> {
        self.wait().await;
        self.inner.create_collection(name).await
    }

    async fn destroy_collection(&self, collection: &CollectionRef) -> Result<()> {
        self.wait().await;
        self.inner.destroy_collection(collection).await
    }

    async fn add_members(
        &self,
        collection: &CollectionRef,
        user_ids: &[String],
    ) -> Result<CollectionRef> {
        self.wait().await;
        self.inner.add_members(collection, user_ids).await
    }
}
