//! Sync context builder for simplified sync operations.
//!
//! This module provides a builder that bundles the client, options, progress
//! callback and shutdown flag, and starts a fresh session for every run.
//!
//! # Example
//!
//! ```ignore
//! use listsync::sync::{SyncContext, SyncOptions};
//!
//! let ctx = SyncContext::builder()
//!     .client(client)
//!     .options(SyncOptions::default())
//!     .progress(callback)
//!     .build()?;
//!
//! let report = ctx.sync_members("friends", desired).await?;
//! ```

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use super::engine::{
    SyncSession, collection_members, estimate_duration, follow_graph_candidates,
    follow_graph_collection_name, owned_collections, sync_collection,
};
use super::error::Result as SyncResult;
use super::progress::ProgressCallback;
use super::types::{Candidate, RunEstimate, SyncOptions, SyncReport};
use crate::remote::{CollectionClient, CollectionRef, FollowKind, UserRef};

/// Error type for sync context construction.
#[derive(Debug, thiserror::Error)]
pub enum SyncContextError {
    /// Missing required field in builder.
    #[error("Missing required field: {field}")]
    MissingField { field: &'static str },

    /// The options violate the remote service's limits.
    #[error("Invalid sync options: {message}")]
    InvalidOptions { message: String },
}

/// Result type for sync context construction.
pub type Result<T> = std::result::Result<T, SyncContextError>;

/// Builder for creating a `SyncContext`.
pub struct SyncContextBuilder<C> {
    client: Option<C>,
    options: Option<SyncOptions>,
    progress: Option<Arc<ProgressCallback>>,
    shutdown_flag: Option<Arc<AtomicBool>>,
}

impl<C> Default for SyncContextBuilder<C> {
    fn default() -> Self {
        Self {
            client: None,
            options: None,
            progress: None,
            shutdown_flag: None,
        }
    }
}

impl<C: CollectionClient> SyncContextBuilder<C> {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the remote client.
    pub fn client(mut self, client: C) -> Self {
        self.client = Some(client);
        self
    }

    /// Set sync options.
    pub fn options(mut self, options: SyncOptions) -> Self {
        self.options = Some(options);
        self
    }

    /// Set the progress callback.
    pub fn progress(mut self, callback: Arc<ProgressCallback>) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Set the shutdown flag for graceful shutdown.
    pub fn shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    /// Build the sync context.
    ///
    /// # Errors
    ///
    /// Returns `SyncContextError::MissingField` if no client was set and
    /// `SyncContextError::InvalidOptions` if the options fail validation.
    pub fn build(self) -> Result<SyncContext<C>> {
        let client = self
            .client
            .ok_or(SyncContextError::MissingField { field: "client" })?;
        let options = self.options.unwrap_or_default();
        options
            .validate()
            .map_err(|message| SyncContextError::InvalidOptions { message })?;

        Ok(SyncContext {
            client,
            options,
            progress: self.progress,
            shutdown_flag: self.shutdown_flag,
        })
    }
}

/// Context for sync operations.
pub struct SyncContext<C> {
    client: C,
    options: SyncOptions,
    progress: Option<Arc<ProgressCallback>>,
    shutdown_flag: Option<Arc<AtomicBool>>,
}

impl<C: CollectionClient> SyncContext<C> {
    /// Create a new builder.
    pub fn builder() -> SyncContextBuilder<C> {
        SyncContextBuilder::new()
    }

    /// Get a reference to the client.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Get a reference to the options.
    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// Check if dry run mode is enabled.
    pub fn is_dry_run(&self) -> bool {
        self.options.dry_run
    }

    fn session(&self) -> SyncSession<'_> {
        SyncSession::new(&self.options)
            .with_progress(self.progress.as_deref())
            .with_shutdown_flag(self.shutdown_flag.as_deref())
    }

    /// Synchronize the collection `name` with an explicit member list.
    pub async fn sync_members(&self, name: &str, desired: Vec<Candidate>) -> SyncResult<SyncReport> {
        let mut session = self.session();
        sync_collection(&self.client, &mut session, name, desired).await
    }

    /// Synchronize the collection mirroring one side of `user_id`'s follow graph.
    ///
    /// The collection name is derived from the user; see
    /// [`follow_graph_collection_name`].
    pub async fn sync_follow_graph(
        &self,
        user_id: &str,
        kind: FollowKind,
        limit: Option<usize>,
    ) -> SyncResult<SyncReport> {
        let mut session = self.session();
        let name = follow_graph_collection_name(&self.client, &session, user_id, kind).await?;
        session.set_target(&name);
        let desired = follow_graph_candidates(&self.client, &session, user_id, kind, limit).await?;
        sync_collection(&self.client, &mut session, &name, desired).await
    }

    /// Read every member of the collection `name`.
    pub async fn collection_members(&self, name: &str) -> SyncResult<(CollectionRef, Vec<UserRef>)> {
        let session = self.session();
        collection_members(&self.client, &session, name).await
    }

    /// Every collection owned by the caller.
    pub async fn collections(&self) -> SyncResult<Vec<CollectionRef>> {
        let session = self.session();
        owned_collections(&self.client, &session).await
    }

    /// Read one side of `user_id`'s follow graph without touching any collection.
    ///
    /// Stops after `limit` users when given.
    pub async fn follow_graph(
        &self,
        user_id: &str,
        kind: FollowKind,
        limit: Option<usize>,
    ) -> SyncResult<Vec<Candidate>> {
        let session = self.session();
        follow_graph_candidates(&self.client, &session, user_id, kind, limit).await
    }

    /// Estimate the batches and wall-clock time needed to add `count` members.
    pub fn estimate(&self, count: usize) -> RunEstimate {
        estimate_duration(count, &self.options)
    }
}
