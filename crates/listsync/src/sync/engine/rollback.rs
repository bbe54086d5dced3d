//! Rollback controller: cleans up a collection the session created.

use super::SyncSession;
use crate::remote::{self, CollectionClient, CollectionRef, short_error_message};
use crate::sync::error::Result;
use crate::sync::progress::SyncProgress;
use crate::sync::types::SyncReport;

/// Settle the outcome of a run.
///
/// Only the collection created by this session is ever destroyed:
///
/// - on failure, unless the failure keeps applied batches (quota stop or
///   interruption) and at least one member was added
/// - on success when nothing was added
///
/// A failed destroy is logged and the original outcome is returned.
pub(super) async fn settle<C: CollectionClient>(
    client: &C,
    session: &mut SyncSession<'_>,
    result: Result<SyncReport>,
) -> Result<SyncReport> {
    let Some(created) = session.created_collection().cloned() else {
        return result;
    };

    match result {
        Ok(mut report) if report.added == 0 => {
            match destroy(client, session, &created, "no members were added").await {
                Ok(()) => {
                    report.destroyed = true;
                    report.collection = None;
                }
                Err(err) => {
                    let message = format!(
                        "Could not remove empty list '{}': {}",
                        created.name,
                        short_error_message(&err)
                    );
                    tracing::warn!("{}", message);
                    session.emit(SyncProgress::Warning { message });
                }
            }
            Ok(report)
        }
        Ok(report) => Ok(report),
        Err(err) if err.keeps_applied_batches() && session.added() > 0 => {
            tracing::warn!(
                collection = %created.name,
                added = session.added(),
                "Keeping partially filled list"
            );
            Err(err)
        }
        Err(err) => {
            let reason = format!("rollback after error: {}", short_error_message(&err));
            if let Err(destroy_err) = destroy(client, session, &created, &reason).await {
                tracing::error!(
                    collection = %created.name,
                    error = %destroy_err,
                    original = %err,
                    "Rollback failed, list was left in place"
                );
                session.emit(SyncProgress::Warning {
                    message: format!(
                        "Could not roll back list '{}': {}",
                        created.name,
                        short_error_message(&destroy_err)
                    ),
                });
            }
            Err(err)
        }
    }
}

async fn destroy<C: CollectionClient>(
    client: &C,
    session: &mut SyncSession<'_>,
    collection: &CollectionRef,
    reason: &str,
) -> remote::Result<()> {
    client.destroy_collection(collection).await?;
    session.take_created();
    tracing::info!(collection = %collection.name, reason, "Destroyed list");
    session.emit(SyncProgress::CollectionDestroyed {
        name: collection.name.clone(),
        reason: reason.to_string(),
    });
    Ok(())
}
