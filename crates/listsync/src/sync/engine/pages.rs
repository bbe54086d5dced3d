//! Rate-limit waits and cursor paging for read requests.

use std::future::Future;

use chrono::{DateTime, Duration, Utc};

use super::SyncSession;
use crate::remote::{self, Page, RemoteError};
use crate::sync::error::Result;
use crate::sync::progress::SyncProgress;
use crate::sync::types::MAX_RATE_LIMIT_WAITS;

/// How long to wait for a rate limit that resets at `reset_at`.
///
/// Never negative and never longer than one batch window.
pub(super) fn rate_limit_delay(
    reset_at: DateTime<Utc>,
    now: DateTime<Utc>,
    window: Duration,
) -> std::time::Duration {
    (reset_at - now)
        .clamp(Duration::zero(), window)
        .to_std()
        .unwrap_or_default()
}

/// Run a read request, sleeping through rate limits.
///
/// Up to [`MAX_RATE_LIMIT_WAITS`] consecutive rate-limit responses are waited
/// out; the next one is returned to the caller. Only use this for reads:
/// a write that failed may still have been applied.
pub(super) async fn with_rate_limit_wait<T, F, Fut>(
    session: &SyncSession<'_>,
    operation: &str,
    mut call: F,
) -> remote::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = remote::Result<T>>,
{
    let mut waits = 0;
    loop {
        match call().await {
            Err(RemoteError::RateLimited { reset_at }) if waits < MAX_RATE_LIMIT_WAITS => {
                waits += 1;
                let now = Utc::now();
                let delay = rate_limit_delay(reset_at, now, session.options().window);
                let resume_at =
                    now + Duration::from_std(delay).unwrap_or_else(|_| Duration::zero());

                tracing::warn!(
                    operation,
                    attempt = waits,
                    resume_at = %resume_at,
                    "Rate limited, waiting for reset"
                );
                session.emit(SyncProgress::RateLimitWait {
                    operation: operation.to_string(),
                    resume_at,
                    attempt: waits,
                });

                tokio::time::sleep(delay).await;
            }
            other => return other,
        }
    }
}

/// Follow a cursor-paged listing to the end.
///
/// Stops early once `limit` items have been collected, and before the next
/// page once a shutdown was requested.
pub(super) async fn collect_pages<T, F, Fut>(
    session: &SyncSession<'_>,
    source: &str,
    limit: Option<usize>,
    mut fetch: F,
) -> Result<Vec<T>>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = remote::Result<Page<T>>>,
{
    let mut users = Vec::new();
    let mut cursor: Option<String> = None;
    let mut page = 0u32;

    loop {
        session.check_shutdown()?;
        let current = cursor.take();
        let Page { items, next_cursor } =
            with_rate_limit_wait(session, source, || fetch(current.clone())).await?;

        page += 1;
        let count = items.len();
        users.extend(items);

        tracing::debug!(source, page, count, total_so_far = users.len(), "Fetched page");
        session.emit(SyncProgress::FetchedPage {
            source: source.to_string(),
            page,
            count,
            total_so_far: users.len(),
        });

        if let Some(limit) = limit
            && users.len() >= limit
        {
            users.truncate(limit);
            break;
        }

        match next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    Ok(users)
}
