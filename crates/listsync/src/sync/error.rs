use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::remote::RemoteError;

/// Errors that abort a synchronization session.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A remote call failed outside of the more specific cases below.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// The credential is read-only and cannot modify collections.
    #[error(
        "Credential for @{account} cannot modify lists; re-authorize the application with write access"
    )]
    AuthorizationMismatch { account: String },

    /// The collection to read does not exist.
    #[error("List '{name}' not found")]
    CollectionNotFound { name: String },

    /// Resolving a chunk of identifiers failed.
    #[error("Lookup failed for {} users starting at '{}': {source}", .user_ids.len(), .user_ids.first().map(String::as_str).unwrap_or(""))]
    Lookup {
        user_ids: Vec<String>,
        #[source]
        source: RemoteError,
    },

    /// A relationship query failed.
    #[error("Relationship check failed for user '{user_id}': {source}")]
    Relationship {
        user_id: String,
        #[source]
        source: RemoteError,
    },

    /// An add call failed. The batch may or may not have been applied.
    #[error("Adding batch {batch} to list '{collection}' failed ({}): {source}", .user_ids.join(", "))]
    AddFailed {
        collection: String,
        batch: usize,
        user_ids: Vec<String>,
        #[source]
        source: RemoteError,
    },

    /// The remote member count after a batch does not match the expected count.
    #[error(
        "List '{collection}' batch {batch}: expected {} members after adding {expected} to {before}, remote reports {after} (users: {})",
        .before + .expected,
        .user_ids.join(", ")
    )]
    CountMismatch {
        collection: String,
        batch: usize,
        before: usize,
        expected: usize,
        after: usize,
        user_ids: Vec<String>,
    },

    /// The next batch would exceed the daily quota.
    #[error(
        "Daily quota of {daily_quota} reached for list '{collection}' after adding {added} members; {remaining} remain, resume after {resume_at}"
    )]
    QuotaExceeded {
        collection: String,
        daily_quota: usize,
        added: usize,
        remaining: usize,
        resume_at: DateTime<Utc>,
    },

    /// A shutdown was requested between batches.
    #[error("Interrupted after adding {added} members to list '{collection}'")]
    Interrupted { collection: String, added: usize },

    /// The run options violate the remote service's limits.
    #[error("Invalid sync options: {message}")]
    InvalidOptions { message: String },
}

impl SyncError {
    /// Whether batches applied before this error stay in place.
    ///
    /// A quota stop or an interruption leaves a valid partial collection that a
    /// later run can resume in diff mode.
    #[must_use]
    pub fn keeps_applied_batches(&self) -> bool {
        matches!(self, Self::QuotaExceeded { .. } | Self::Interrupted { .. })
    }

    /// When a quota-stopped run may be resumed.
    #[must_use]
    pub fn resume_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::QuotaExceeded { resume_at, .. } => Some(*resume_at),
            _ => None,
        }
    }

    /// The underlying remote error, if any.
    #[must_use]
    pub fn remote(&self) -> Option<&RemoteError> {
        match self {
            Self::Remote(source)
            | Self::Lookup { source, .. }
            | Self::Relationship { source, .. }
            | Self::AddFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_mismatch_names_users() {
        let err = SyncError::CountMismatch {
            collection: "friends".to_string(),
            batch: 2,
            before: 2,
            expected: 1,
            after: 2,
            user_ids: vec!["c".to_string()],
        };

        let msg = err.to_string();
        assert!(msg.contains("friends"));
        assert!(msg.contains("expected 3 members"));
        assert!(msg.contains("reports 2"));
        assert!(msg.contains("users: c"));
        assert!(!err.keeps_applied_batches());
    }

    #[test]
    fn test_quota_exceeded_keeps_batches() {
        let resume_at = Utc::now();
        let err = SyncError::QuotaExceeded {
            collection: "friends".to_string(),
            daily_quota: 100,
            added: 100,
            remaining: 20,
            resume_at,
        };

        assert!(err.keeps_applied_batches());
        assert_eq!(err.resume_at(), Some(resume_at));
        assert!(err.to_string().contains("20 remain"));
    }

    #[test]
    fn test_lookup_error_exposes_remote() {
        let err = SyncError::Lookup {
            user_ids: vec!["a".to_string(), "b".to_string()],
            source: RemoteError::network("connection reset"),
        };

        assert!(err.to_string().contains("2 users starting at 'a'"));
        assert!(err.remote().is_some_and(RemoteError::is_transient));
    }

    #[test]
    fn test_auth_mismatch_message() {
        let err = SyncError::AuthorizationMismatch {
            account: "me".to_string(),
        };
        assert!(err.to_string().contains("@me"));
        assert!(err.remote().is_none());
        assert!(err.resume_at().is_none());
    }
}
