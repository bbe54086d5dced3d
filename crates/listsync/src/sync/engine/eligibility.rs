//! Eligibility filter: drops candidates the remote service would refuse.

use std::collections::{HashMap, HashSet};

use super::pages::{collect_pages, with_rate_limit_wait};
use super::{SyncSession, ensure_caller};
use crate::remote::{CollectionClient, MAX_LOOKUP_IDS, ResolvedUser};
use crate::sync::error::{Result, SyncError};
use crate::sync::progress::SyncProgress;
use crate::sync::types::{Candidate, Eligibility, EligibilityReport};

/// Split candidates into eligible and ineligible ones.
///
/// Checks run in a fixed order and a candidate stops at the first failure:
///
/// 1. Unresolved identifiers (bulk lookup in chunks of [`MAX_LOOKUP_IDS`])
/// 2. Protected accounts
/// 3. Accounts on the caller's block list (fetched once per session)
/// 4. Accounts that block the caller (one relationship query each, asked
///    from the caller's side)
///
/// A candidate that both blocks and is blocked by the caller is reported as
/// blocked by the caller. A relationship that does not report a blocked-by
/// flag counts as not blocking. Any failed lookup aborts the filter, and so
/// does a shutdown request between two remote calls.
pub async fn filter_candidates<C: CollectionClient>(
    client: &C,
    session: &mut SyncSession<'_>,
    candidates: Vec<Candidate>,
) -> Result<EligibilityReport> {
    let mut report = EligibilityReport::default();
    if candidates.is_empty() {
        return Ok(report);
    }

    tracing::info!(count = candidates.len(), "Checking eligibility");
    session.emit(SyncProgress::CheckingEligibility {
        count: candidates.len(),
    });

    let mut survivors = Vec::with_capacity(candidates.len());
    for chunk in candidates.chunks(MAX_LOOKUP_IDS) {
        session.check_shutdown()?;
        let user_ids: Vec<String> = chunk.iter().map(|c| c.user_id.clone()).collect();
        let requested = user_ids.as_slice();
        let resolved = with_rate_limit_wait(session, "lookup users", move || {
            client.bulk_lookup(requested)
        })
        .await
        .map_err(|source| SyncError::Lookup {
            user_ids: user_ids.clone(),
            source,
        })?;

        let by_id: HashMap<&str, &ResolvedUser> =
            resolved.iter().map(|user| (user.id.as_str(), user)).collect();

        for candidate in chunk {
            let mut candidate = candidate.clone();
            match by_id.get(candidate.user_id.as_str()) {
                None => skip(session, &mut report, candidate, Eligibility::Unresolved),
                Some(user) if user.protected => {
                    skip(session, &mut report, candidate, Eligibility::Protected)
                }
                Some(user) => {
                    if candidate.display_name.is_empty() {
                        candidate.display_name = user.display_name.clone();
                    }
                    survivors.push(candidate);
                }
            }
        }
    }

    if !survivors.is_empty() {
        let blocked = blocked_ids(client, session).await?;
        let caller = ensure_caller(client, session).await?;
        let caller_id = caller.id.as_str();

        for candidate in survivors {
            if blocked.contains(&candidate.user_id) {
                skip(session, &mut report, candidate, Eligibility::BlockedByCaller);
                continue;
            }

            session.check_shutdown()?;
            let user_id = candidate.user_id.as_str();
            let relationship = with_rate_limit_wait(session, "relationship", move || {
                client.relationship(caller_id, user_id)
            })
            .await
            .map_err(|source| SyncError::Relationship {
                user_id: user_id.to_string(),
                source,
            })?;

            match relationship.blocked_by {
                Some(true) => skip(session, &mut report, candidate, Eligibility::BlockingCaller),
                Some(false) => report.accept(candidate),
                None => {
                    tracing::debug!(user_id = %candidate.user_id, "Relationship has no blocked-by flag, treating as not blocking");
                    report.accept(candidate);
                }
            }
        }
    }

    tracing::info!(
        eligible = report.eligible.len(),
        ineligible = report.ineligible.len(),
        "Eligibility checks complete"
    );
    session.emit(SyncProgress::EligibilityComplete {
        eligible: report.eligible.len(),
        ineligible: report.ineligible.len(),
    });

    Ok(report)
}

fn skip(
    session: &SyncSession<'_>,
    report: &mut EligibilityReport,
    candidate: Candidate,
    reason: Eligibility,
) {
    tracing::info!(
        user_id = %candidate.user_id,
        display_name = %candidate.display_name,
        reason = %reason,
        "Skipping candidate"
    );
    session.emit(SyncProgress::CandidateSkipped {
        user_id: candidate.user_id.clone(),
        display_name: candidate.display_name.clone(),
        reason,
    });
    report.reject(candidate, reason);
}

/// The caller's block list, fetched on first use and cached in the session.
async fn blocked_ids<C: CollectionClient>(
    client: &C,
    session: &mut SyncSession<'_>,
) -> Result<HashSet<String>> {
    if let Some(blocked) = session.blocked() {
        return Ok(blocked.clone());
    }

    let users = collect_pages(session, "blocked users", None, move |cursor| {
        client.blocked_users(cursor)
    })
    .await?;
    let blocked: HashSet<String> = users.into_iter().map(|user| user.id).collect();
    tracing::debug!(count = blocked.len(), "Fetched block list");
    session.cache_blocked(blocked.clone());
    Ok(blocked)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;
    use crate::remote::{InMemoryRemote, Operation, RemoteError};
    use crate::sync::progress::ProgressCallback;
    use crate::sync::types::SyncOptions;

    fn candidates(ids: &[&str]) -> Vec<Candidate> {
        ids.iter().map(|id| Candidate::new(*id, "")).collect()
    }

    fn eligible(report: &EligibilityReport) -> Vec<&str> {
        report.eligible.iter().map(|c| c.user_id.as_str()).collect()
    }

    fn reason_for(report: &EligibilityReport, user_id: &str) -> Option<Eligibility> {
        report
            .ineligible
            .iter()
            .find(|c| c.user_id == user_id)
            .map(Candidate::eligibility)
    }

    #[tokio::test]
    async fn test_each_check_applies_its_reason() {
        let remote = InMemoryRemote::new("me")
            .with_user("ok", "Okay")
            .with_protected_user("locked", "Locked")
            .with_user("muted", "Muted")
            .with_blocked_by_caller("muted")
            .with_user_blocking_caller("hostile", "Hostile");
        let options = SyncOptions::default();
        let mut session = SyncSession::new(&options);

        let report = filter_candidates(
            &remote,
            &mut session,
            candidates(&["ok", "ghost", "locked", "muted", "hostile"]),
        )
        .await
        .unwrap();

        assert_eq!(eligible(&report), vec!["ok"]);
        assert_eq!(report.eligible[0].display_name, "Okay");
        assert_eq!(reason_for(&report, "ghost"), Some(Eligibility::Unresolved));
        assert_eq!(reason_for(&report, "locked"), Some(Eligibility::Protected));
        assert_eq!(reason_for(&report, "muted"), Some(Eligibility::BlockedByCaller));
        assert_eq!(reason_for(&report, "hostile"), Some(Eligibility::BlockingCaller));
    }

    #[tokio::test]
    async fn test_unknown_blocking_flag_is_eligible() {
        let remote = InMemoryRemote::new("me").with_user_unknown_relationship("quiet", "Quiet");
        let options = SyncOptions::default();
        let mut session = SyncSession::new(&options);

        let report = filter_candidates(&remote, &mut session, candidates(&["quiet"]))
            .await
            .unwrap();

        assert_eq!(eligible(&report), vec!["quiet"]);
    }

    #[tokio::test]
    async fn test_block_list_skipped_when_nothing_survives_lookup() {
        let remote = InMemoryRemote::new("me").with_protected_user("locked", "Locked");
        let options = SyncOptions::default();
        let mut session = SyncSession::new(&options);

        let report = filter_candidates(&remote, &mut session, candidates(&["locked", "ghost"]))
            .await
            .unwrap();

        assert!(report.eligible.is_empty());
        assert_eq!(remote.call_count(Operation::BlockedUsers), 0);
        assert_eq!(remote.call_count(Operation::Relationship), 0);
    }

    #[tokio::test]
    async fn test_blocked_candidates_need_no_relationship_query() {
        let remote = InMemoryRemote::new("me")
            .with_users(&["a", "b"])
            .with_blocked_by_caller("a");
        let options = SyncOptions::default();
        let mut session = SyncSession::new(&options);

        filter_candidates(&remote, &mut session, candidates(&["a", "b"]))
            .await
            .unwrap();

        assert_eq!(remote.call_count(Operation::Relationship), 1);
    }

    #[tokio::test]
    async fn test_lookup_chunks_and_block_list_cached() {
        let ids: Vec<String> = (0..150).map(|i| format!("u{i}")).collect();
        let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        let remote = InMemoryRemote::new("me").with_users(&refs);
        let options = SyncOptions::default();
        let mut session = SyncSession::new(&options);

        let report = filter_candidates(&remote, &mut session, candidates(&refs))
            .await
            .unwrap();
        assert_eq!(report.eligible.len(), 150);
        assert_eq!(remote.call_count(Operation::BulkLookup), 2);

        filter_candidates(&remote, &mut session, candidates(&["u0"]))
            .await
            .unwrap();
        assert_eq!(remote.call_count(Operation::BlockedUsers), 1);
    }

    #[tokio::test]
    async fn test_lookup_failure_aborts() {
        let remote = InMemoryRemote::new("me").with_users(&["a"]);
        remote.fail_next(Operation::BulkLookup, RemoteError::network("timed out"));
        let options = SyncOptions::default();
        let mut session = SyncSession::new(&options);

        let err = filter_candidates(&remote, &mut session, candidates(&["a"]))
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::Lookup { ref user_ids, .. } if user_ids == &["a".to_string()]));
    }

    #[tokio::test]
    async fn test_relationship_failure_names_user() {
        let remote = InMemoryRemote::new("me").with_users(&["a"]);
        remote.fail_next(Operation::Relationship, RemoteError::api(500, "over capacity"));
        let options = SyncOptions::default();
        let mut session = SyncSession::new(&options);

        let err = filter_candidates(&remote, &mut session, candidates(&["a"]))
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::Relationship { ref user_id, .. } if user_id == "a"));
    }

    #[tokio::test]
    async fn test_blocked_and_blocking_reports_blocked_by_caller() {
        let remote = InMemoryRemote::new("me")
            .with_user_blocking_caller("both", "Both")
            .with_blocked_by_caller("both");
        let options = SyncOptions::default();
        let mut session = SyncSession::new(&options);

        let report = filter_candidates(&remote, &mut session, candidates(&["both"]))
            .await
            .unwrap();

        assert_eq!(reason_for(&report, "both"), Some(Eligibility::BlockedByCaller));
        assert_eq!(remote.call_count(Operation::Relationship), 0);
    }

    #[tokio::test]
    async fn test_shutdown_stops_before_lookup() {
        let remote = InMemoryRemote::new("me").with_users(&["a"]);
        let options = SyncOptions::default();
        let flag = AtomicBool::new(true);
        let mut session = SyncSession::new(&options).with_shutdown_flag(Some(&flag));

        let err = filter_candidates(&remote, &mut session, candidates(&["a"]))
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::Interrupted { added: 0, .. }));
        assert!(remote.calls().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_stops_between_relationship_queries() {
        let remote = InMemoryRemote::new("me")
            .with_users(&["a", "b"])
            .with_blocked_by_caller("a");
        let options = SyncOptions::default();
        let flag = Arc::new(AtomicBool::new(false));
        let flag_clone = Arc::clone(&flag);
        let callback: ProgressCallback = Box::new(move |event| {
            if matches!(event, SyncProgress::CandidateSkipped { .. }) {
                flag_clone.store(true, Ordering::SeqCst);
            }
        });
        let mut session = SyncSession::new(&options)
            .with_progress(Some(&callback))
            .with_shutdown_flag(Some(&flag));

        let err = filter_candidates(&remote, &mut session, candidates(&["a", "b"]))
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::Interrupted { .. }));
        assert_eq!(remote.call_count(Operation::BlockedUsers), 1);
        assert_eq!(remote.call_count(Operation::Relationship), 0);
    }
}
