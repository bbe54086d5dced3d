//! Diff engine: decides which desired members still need adding.

use std::collections::HashSet;

use super::SyncSession;
use super::pages::{collect_pages, with_rate_limit_wait};
use crate::remote::{CollectionClient, CollectionRef};
use crate::sync::error::Result;
use crate::sync::progress::SyncProgress;
use crate::sync::types::{Candidate, DiffOutcome, SyncMode};

/// Drop repeated user identifiers, keeping the first occurrence.
pub fn dedupe_candidates(desired: Vec<Candidate>) -> Vec<Candidate> {
    let mut seen = HashSet::new();
    desired
        .into_iter()
        .filter(|candidate| seen.insert(candidate.user_id.clone()))
        .collect()
}

/// Compare `desired` against the collection `name` and prepare it for adding.
///
/// In full-resync mode an existing collection is destroyed and a fresh one
/// created, so every desired member is returned. In diff-only mode the
/// existing members are read and only missing ones are returned; an absent
/// collection is created empty. A dry run never creates or destroys.
///
/// An empty desired set only checks whether the collection exists.
pub async fn diff_members<C: CollectionClient>(
    client: &C,
    session: &mut SyncSession<'_>,
    name: &str,
    desired: Vec<Candidate>,
) -> Result<DiffOutcome> {
    let options = session.options();
    let desired = dedupe_candidates(desired);
    let requested = desired.len();

    session.emit(SyncProgress::CheckingCollection {
        name: name.to_string(),
        mode: options.mode,
    });
    let existing =
        with_rate_limit_wait(session, "find list", move || client.find_collection(name)).await?;

    if let Some(collection) = &existing {
        tracing::debug!(
            collection = %collection.name,
            member_count = collection.member_count,
            "Found existing list"
        );
        session.emit(SyncProgress::CollectionFound {
            name: collection.name.clone(),
            member_count: collection.member_count,
        });
    }

    if desired.is_empty() {
        tracing::info!("No members requested, leaving list untouched");
        return Ok(DiffOutcome {
            collection: existing,
            created: false,
            to_add: Vec::new(),
            already_present: 0,
        });
    }

    let outcome = match options.mode {
        SyncMode::FullResync if options.dry_run => DiffOutcome {
            collection: existing,
            created: false,
            to_add: desired,
            already_present: 0,
        },
        SyncMode::FullResync => {
            if let Some(old) = existing {
                session.check_shutdown()?;
                client.destroy_collection(&old).await?;
                tracing::info!(collection = %old.name, members = old.member_count, "Destroyed list for full resync");
                session.emit(SyncProgress::CollectionDestroyed {
                    name: old.name,
                    reason: "full resync".to_string(),
                });
            }
            let created = create_collection(client, session, name).await?;
            DiffOutcome {
                collection: Some(created),
                created: true,
                to_add: desired,
                already_present: 0,
            }
        }
        SyncMode::DiffOnly => {
            let (collection, created, present_ids) = match existing {
                Some(collection) => {
                    let target = &collection;
                    let members = collect_pages(session, "members", None, move |cursor| {
                        client.list_members(target, cursor)
                    })
                    .await?;
                    let present_ids: HashSet<String> =
                        members.into_iter().map(|user| user.id).collect();
                    (Some(collection), false, present_ids)
                }
                None if options.dry_run => (None, false, HashSet::new()),
                None => {
                    let created = create_collection(client, session, name).await?;
                    (Some(created), true, HashSet::new())
                }
            };

            let (present, to_add): (Vec<Candidate>, Vec<Candidate>) = desired
                .into_iter()
                .partition(|candidate| present_ids.contains(&candidate.user_id));

            DiffOutcome {
                collection,
                created,
                to_add,
                already_present: present.len(),
            }
        }
    };

    tracing::info!(
        desired = requested,
        already_present = outcome.already_present,
        to_add = outcome.to_add.len(),
        "Diff complete"
    );
    session.emit(SyncProgress::DiffComplete {
        desired: requested,
        already_present: outcome.already_present,
        to_add: outcome.to_add.len(),
    });

    Ok(outcome)
}

async fn create_collection<C: CollectionClient>(
    client: &C,
    session: &mut SyncSession<'_>,
    name: &str,
) -> Result<CollectionRef> {
    session.check_shutdown()?;
    let created = client.create_collection(name).await?;
    tracing::info!(collection = %created.name, id = %created.id, "Created list");
    session.emit(SyncProgress::CollectionCreated {
        name: created.name.clone(),
    });
    session.record_created(created.clone());
    Ok(created)
}
