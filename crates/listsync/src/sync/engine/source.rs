//! Desired-set sources and read-only collection access.

use super::SyncSession;
use super::pages::{collect_pages, with_rate_limit_wait};
use crate::remote::{CollectionClient, CollectionRef, FollowKind, RemoteError, UserRef};
use crate::sync::error::{Result, SyncError};
use crate::sync::types::Candidate;

/// Name of the collection mirroring one side of a user's follow graph.
///
/// The name is `{prefix}_{user_id}_{display_name}`, where the prefix is
/// `followee` or `follower`.
pub async fn follow_graph_collection_name<C: CollectionClient>(
    client: &C,
    session: &SyncSession<'_>,
    user_id: &str,
    kind: FollowKind,
) -> Result<String> {
    session.check_shutdown()?;
    let user_ids = [user_id.to_string()];
    let requested = user_ids.as_slice();
    let resolved = with_rate_limit_wait(session, "lookup users", move || {
        client.bulk_lookup(requested)
    })
    .await
    .map_err(|source| SyncError::Lookup {
        user_ids: user_ids.to_vec(),
        source,
    })?;

    let user = resolved
        .into_iter()
        .find(|user| user.id == user_id)
        .ok_or_else(|| RemoteError::not_found(format!("user {user_id}")))?;

    Ok(format!(
        "{}_{}_{}",
        kind.collection_prefix(),
        user.id,
        user.display_name
    ))
}

/// Read one side of a user's follow graph as candidates.
///
/// Stops after `limit` users when given.
pub async fn follow_graph_candidates<C: CollectionClient>(
    client: &C,
    session: &SyncSession<'_>,
    user_id: &str,
    kind: FollowKind,
    limit: Option<usize>,
) -> Result<Vec<Candidate>> {
    let source = match kind {
        FollowKind::Followees => "followees",
        FollowKind::Followers => "followers",
    };
    let users = collect_pages(session, source, limit, move |cursor| {
        client.follow_graph(user_id, kind, cursor)
    })
    .await?;

    tracing::info!(user_id, source, count = users.len(), "Read follow graph");
    Ok(users
        .into_iter()
        .map(|user| Candidate::new(user.id, user.display_name.unwrap_or_default()))
        .collect())
}

/// Read every member of the collection `name`.
///
/// # Errors
///
/// Returns [`SyncError::CollectionNotFound`] when no such collection exists.
pub async fn collection_members<C: CollectionClient>(
    client: &C,
    session: &SyncSession<'_>,
    name: &str,
) -> Result<(CollectionRef, Vec<UserRef>)> {
    let collection = with_rate_limit_wait(session, "find list", move || {
        client.find_collection(name)
    })
    .await?
    .ok_or_else(|| SyncError::CollectionNotFound {
        name: name.to_string(),
    })?;

    let target = &collection;
    let members = collect_pages(session, "members", None, move |cursor| {
        client.list_members(target, cursor)
    })
    .await?;

    Ok((collection, members))
}

/// Read every collection owned by the caller.
pub async fn owned_collections<C: CollectionClient>(
    client: &C,
    session: &SyncSession<'_>,
) -> Result<Vec<CollectionRef>> {
    let collections = collect_pages(session, "lists", None, move |cursor| {
        client.owned_collections(cursor)
    })
    .await?;
    tracing::debug!(count = collections.len(), "Read owned lists");
    Ok(collections)
}
