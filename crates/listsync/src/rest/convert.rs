//! Validation of wire types into the client boundary structs.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::error::RestError;
use super::types::{CursoredLists, CursoredUsers, RateLimitResponse, WireList, WireUser};
use crate::remote::{Caller, CollectionRef, Page, ResolvedUser, UserRef};

/// Rate-limit status of one endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateLimitStatus {
    /// Resource family, e.g. `lists`.
    pub resource_family: String,
    /// Endpoint path, e.g. `/lists/members`.
    pub endpoint: String,
    /// Requests allowed per window.
    pub limit: u32,
    /// Requests left in the current window.
    pub remaining: u32,
    /// When the window resets.
    pub reset_at: DateTime<Utc>,
}

/// Cursor value the API uses to request the first page.
pub const FIRST_CURSOR: &str = "-1";

/// Map the API's terminal cursor ("0") to `None`.
pub fn next_cursor(raw: Option<String>) -> Option<String> {
    raw.filter(|c| !c.is_empty() && c != "0")
}

fn require_id(kind: &str, id: &str) -> Result<(), RestError> {
    if id.trim().is_empty() {
        return Err(RestError::Shape(format!("{} without id_str", kind)));
    }
    Ok(())
}

pub fn to_user_ref(user: WireUser) -> Result<UserRef, RestError> {
    require_id("user", &user.id_str)?;
    Ok(UserRef {
        id: user.id_str,
        display_name: Some(user.screen_name),
    })
}

pub fn to_resolved_user(user: WireUser) -> Result<ResolvedUser, RestError> {
    require_id("user", &user.id_str)?;
    Ok(ResolvedUser {
        id: user.id_str,
        display_name: user.screen_name,
        protected: user.protected,
    })
}

pub fn to_collection_ref(list: WireList) -> Result<CollectionRef, RestError> {
    require_id("list", &list.id_str)?;
    Ok(CollectionRef {
        id: list.id_str,
        name: list.name,
        member_count: list.member_count,
    })
}

pub fn to_user_page(page: CursoredUsers) -> Result<Page<UserRef>, RestError> {
    let items = page
        .users
        .into_iter()
        .map(to_user_ref)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Page {
        items,
        next_cursor: next_cursor(page.next_cursor_str),
    })
}

pub fn to_collection_page(page: CursoredLists) -> Result<Page<CollectionRef>, RestError> {
    let items = page
        .lists
        .into_iter()
        .map(to_collection_ref)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Page {
        items,
        next_cursor: next_cursor(page.next_cursor_str),
    })
}

/// Flatten a rate-limit response, ordered by family and endpoint.
pub fn to_rate_limits(response: RateLimitResponse) -> Result<Vec<RateLimitStatus>, RestError> {
    let mut limits = Vec::new();
    for (family, endpoints) in response.resources {
        for (endpoint, limit) in endpoints {
            let reset_at = DateTime::from_timestamp(limit.reset, 0).ok_or_else(|| {
                RestError::Shape(format!("reset time {} of {} out of range", limit.reset, endpoint))
            })?;
            limits.push(RateLimitStatus {
                resource_family: family.clone(),
                endpoint,
                limit: limit.limit,
                remaining: limit.remaining,
                reset_at,
            });
        }
    }
    Ok(limits)
}

/// Build the caller from `account/verify_credentials`.
///
/// `access_level` is the `x-access-level` response header (`read`,
/// `read-write`, `read-write-directmessages`). A missing header is treated as
/// write access; the first write will fail with 403 if that is wrong.
pub fn to_caller(user: WireUser, access_level: Option<&str>) -> Result<Caller, RestError> {
    require_id("account", &user.id_str)?;
    let can_write = access_level.is_none_or(|level| level.contains("write"));
    Ok(Caller {
        id: user.id_str,
        display_name: user.screen_name,
        can_write,
    })
}
