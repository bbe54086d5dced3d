//! Wire types of the REST API.
//!
//! Only the fields the adapter reads are declared, so unrelated changes to
//! the payloads do not break decoding.

use std::collections::BTreeMap;

use serde::Deserialize;

/// A user object.
#[derive(Debug, Clone, Deserialize)]
pub struct WireUser {
    /// Numeric id as a string.
    pub id_str: String,
    /// Handle, used as the display name.
    pub screen_name: String,
    #[serde(default)]
    pub protected: bool,
}

/// A list object.
#[derive(Debug, Clone, Deserialize)]
pub struct WireList {
    pub id_str: String,
    pub name: String,
    #[serde(default)]
    pub member_count: usize,
}

/// A cursored page of users (members, blocks, friends, followers).
#[derive(Debug, Clone, Deserialize)]
pub struct CursoredUsers {
    #[serde(default)]
    pub users: Vec<WireUser>,
    #[serde(default)]
    pub next_cursor_str: Option<String>,
}

/// A cursored page of lists.
#[derive(Debug, Clone, Deserialize)]
pub struct CursoredLists {
    #[serde(default)]
    pub lists: Vec<WireList>,
    #[serde(default)]
    pub next_cursor_str: Option<String>,
}

/// Response of `application/rate_limit_status`, keyed by resource family
/// and then by endpoint path.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitResponse {
    #[serde(default)]
    pub resources: BTreeMap<String, BTreeMap<String, WireRateLimit>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireRateLimit {
    pub limit: u32,
    pub remaining: u32,
    /// Epoch seconds.
    pub reset: i64,
}

/// Response of `friendships/show`.
#[derive(Debug, Clone, Deserialize)]
pub struct FriendshipShow {
    pub relationship: FriendshipPair,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FriendshipPair {
    pub source: FriendshipSource,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FriendshipSource {
    /// Absent or null when the service does not report the flag. Only
    /// reported when the source is the authenticated user.
    #[serde(default)]
    pub blocking: Option<bool>,
    #[serde(default)]
    pub blocked_by: Option<bool>,
}

/// Error envelope: `{"errors": [{"code": 34, "message": "..."}]}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorEnvelope {
    #[serde(default)]
    pub errors: Vec<ErrorDetail>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorDetail {
    #[serde(default)]
    pub code: Option<i64>,
    pub message: String,
}
