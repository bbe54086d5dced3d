//! End-to-end tests for sync sessions against the in-memory remote.
//!
//! Every test drives a full session through `SyncContext` and then inspects
//! the remote: which lists exist, what they contain, and which calls were
//! made. Tokio time is paused so batch windows and rate-limit waits finish
//! instantly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};
use listsync::remote::{Operation, UserRef};
use listsync::sync::ProgressCallback;
use listsync::{
    Candidate, Eligibility, FollowKind, InMemoryRemote, RemoteError, SyncContext, SyncError,
    SyncMode, SyncOptions, SyncProgress,
};

fn candidates(ids: &[&str]) -> Vec<Candidate> {
    ids.iter().map(|id| Candidate::new(*id, *id)).collect()
}

fn options(mode: SyncMode, batch_size: usize) -> SyncOptions {
    SyncOptions {
        mode,
        batch_size,
        ..SyncOptions::default()
    }
}

fn context(remote: &InMemoryRemote, options: SyncOptions) -> SyncContext<InMemoryRemote> {
    SyncContext::builder()
        .client(remote.clone())
        .options(options)
        .build()
        .unwrap()
}

fn recording_context(
    remote: &InMemoryRemote,
    options: SyncOptions,
) -> (SyncContext<InMemoryRemote>, Arc<Mutex<Vec<SyncProgress>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let callback: Arc<ProgressCallback> = Arc::new(Box::new(move |event| {
        sink.lock().unwrap().push(event);
    }));

    let ctx = SyncContext::builder()
        .client(remote.clone())
        .options(options)
        .progress(callback)
        .build()
        .unwrap();
    (ctx, events)
}

fn write_calls(remote: &InMemoryRemote) -> Vec<Operation> {
    remote
        .calls()
        .into_iter()
        .filter(|op| op.is_write())
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_full_resync_creates_and_fills_in_batches() {
    let remote = InMemoryRemote::new("me").with_users(&["a", "b", "c"]);
    let ctx = context(&remote, options(SyncMode::FullResync, 2));

    let report = ctx
        .sync_members("friends", candidates(&["a", "b", "c"]))
        .await
        .unwrap();

    assert!(report.created);
    assert!(!report.destroyed);
    assert_eq!(report.added, 3);
    assert_eq!(report.attempted, 3);
    assert_eq!(report.batches, 2);
    assert_eq!(report.present_before, 0);
    assert_eq!(
        remote.add_batches(),
        vec![
            vec!["a".to_string(), "b".to_string()],
            vec!["c".to_string()]
        ]
    );
    assert_eq!(remote.collection("friends").unwrap().member_count, 3);
}

#[tokio::test(start_paused = true)]
async fn test_full_resync_replaces_existing_list() {
    let remote = InMemoryRemote::new("me")
        .with_users(&["a", "b", "old"])
        .with_collection("friends", &["old"]);
    let ctx = context(&remote, options(SyncMode::FullResync, 50));

    let report = ctx
        .sync_members("friends", candidates(&["a", "b"]))
        .await
        .unwrap();

    assert!(report.created);
    assert_eq!(report.added, 2);
    assert_eq!(
        remote.members("friends").unwrap(),
        vec!["a".to_string(), "b".to_string()]
    );
    assert_eq!(remote.call_count(Operation::DestroyCollection), 1);
}

#[tokio::test(start_paused = true)]
async fn test_diff_only_adds_missing_members() {
    let remote = InMemoryRemote::new("me")
        .with_users(&["a", "b"])
        .with_collection("friends", &["a"]);
    let ctx = context(&remote, options(SyncMode::DiffOnly, 50));

    let report = ctx
        .sync_members("friends", candidates(&["a", "b"]))
        .await
        .unwrap();

    assert!(!report.created);
    assert_eq!(report.present_before, 1);
    assert_eq!(report.added, 1);
    assert_eq!(remote.add_batches(), vec![vec!["b".to_string()]]);
    assert_eq!(
        remote.members("friends").unwrap(),
        vec!["a".to_string(), "b".to_string()]
    );
}

#[tokio::test(start_paused = true)]
async fn test_diff_only_second_run_adds_nothing() {
    let remote = InMemoryRemote::new("me")
        .with_users(&["a", "b", "c"])
        .with_collection("friends", &[]);
    let ctx = context(&remote, options(SyncMode::DiffOnly, 2));

    let first = ctx
        .sync_members("friends", candidates(&["a", "b", "c"]))
        .await
        .unwrap();
    assert_eq!(first.added, 3);

    let second = ctx
        .sync_members("friends", candidates(&["a", "b", "c"]))
        .await
        .unwrap();
    assert_eq!(second.added, 0);
    assert_eq!(second.present_before, 3);
    assert_eq!(remote.call_count(Operation::AddMembers), 2);
    assert!(remote.collection("friends").is_some());
}

#[tokio::test(start_paused = true)]
async fn test_all_protected_destroys_created_list() {
    let remote = InMemoryRemote::new("me")
        .with_protected_user("a", "alice")
        .with_protected_user("b", "bob");
    let ctx = context(&remote, options(SyncMode::FullResync, 50));

    let report = ctx
        .sync_members("friends", candidates(&["a", "b"]))
        .await
        .unwrap();

    assert_eq!(report.added, 0);
    assert!(report.destroyed);
    assert!(report.collection.is_none());
    assert_eq!(report.skipped.len(), 2);
    assert!(
        report
            .skipped
            .iter()
            .all(|c| c.eligibility() == Eligibility::Protected)
    );
    assert!(remote.collection("friends").is_none());
    assert_eq!(remote.call_count(Operation::AddMembers), 0);
}

#[tokio::test(start_paused = true)]
async fn test_existing_list_survives_when_nobody_is_eligible() {
    let remote = InMemoryRemote::new("me")
        .with_users(&["kept"])
        .with_protected_user("a", "alice")
        .with_collection("friends", &["kept"]);
    let ctx = context(&remote, options(SyncMode::DiffOnly, 50));

    let report = ctx
        .sync_members("friends", candidates(&["a"]))
        .await
        .unwrap();

    assert_eq!(report.added, 0);
    assert!(!report.destroyed);
    assert_eq!(remote.members("friends").unwrap(), vec!["kept".to_string()]);
    assert_eq!(remote.call_count(Operation::DestroyCollection), 0);
}

#[tokio::test(start_paused = true)]
async fn test_every_exclusion_reason() {
    let remote = InMemoryRemote::new("me")
        .with_users(&["ok"])
        .with_protected_user("locked", "locked")
        .with_user_blocking_caller("hater", "hater")
        .with_user_unknown_relationship("quiet", "quiet")
        .with_users(&["muted"])
        .with_blocked_by_caller("muted");
    let ctx = context(&remote, options(SyncMode::FullResync, 50));

    let report = ctx
        .sync_members(
            "friends",
            candidates(&["ok", "locked", "hater", "quiet", "muted", "ghost"]),
        )
        .await
        .unwrap();

    assert_eq!(report.added, 2);
    assert_eq!(
        remote.members("friends").unwrap(),
        vec!["ok".to_string(), "quiet".to_string()]
    );

    let mut reasons: Vec<(String, Eligibility)> = report
        .skipped
        .iter()
        .map(|c| (c.user_id.clone(), c.eligibility()))
        .collect();
    reasons.sort_by(|a, b| a.0.cmp(&b.0));
    assert_eq!(
        reasons,
        vec![
            ("ghost".to_string(), Eligibility::Unresolved),
            ("hater".to_string(), Eligibility::BlockingCaller),
            ("locked".to_string(), Eligibility::Protected),
            ("muted".to_string(), Eligibility::BlockedByCaller),
        ]
    );
    assert_eq!(remote.call_count(Operation::BlockedUsers), 1);
}

#[tokio::test(start_paused = true)]
async fn test_count_mismatch_on_second_batch_rolls_back() {
    let remote = InMemoryRemote::new("me").with_users(&["a", "b", "c", "d"]);
    remote.refuse_on_add("c");
    let ctx = context(&remote, options(SyncMode::FullResync, 2));

    let err = ctx
        .sync_members("friends", candidates(&["a", "b", "c", "d"]))
        .await
        .unwrap_err();

    match err {
        SyncError::CountMismatch {
            batch,
            before,
            after,
            ref user_ids,
            ..
        } => {
            assert_eq!(batch, 2);
            assert_eq!(before, 2);
            assert_eq!(after, 3);
            assert_eq!(user_ids, &vec!["c".to_string(), "d".to_string()]);
        }
        other => panic!("expected CountMismatch, got {other:?}"),
    }
    assert!(remote.collection("friends").is_none());
    assert_eq!(remote.call_count(Operation::AddMembers), 2);
}

#[tokio::test(start_paused = true)]
async fn test_count_mismatch_keeps_pre_existing_list() {
    let remote = InMemoryRemote::new("me")
        .with_users(&["a", "b"])
        .with_collection("friends", &[]);
    remote.refuse_on_add("b");
    let ctx = context(&remote, options(SyncMode::DiffOnly, 50));

    let err = ctx
        .sync_members("friends", candidates(&["a", "b"]))
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::CountMismatch { batch: 1, .. }));
    assert!(remote.collection("friends").is_some());
    assert_eq!(remote.call_count(Operation::DestroyCollection), 0);
}

#[tokio::test(start_paused = true)]
async fn test_quota_stops_after_two_batches() {
    let ids: Vec<String> = (0..120).map(|i| format!("u{i}")).collect();
    let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();
    let remote = InMemoryRemote::new("me").with_users(&id_refs);
    let ctx = context(&remote, options(SyncMode::FullResync, 50));

    let before = Utc::now();
    let err = ctx
        .sync_members("friends", candidates(&id_refs))
        .await
        .unwrap_err();

    match &err {
        SyncError::QuotaExceeded {
            added,
            remaining,
            daily_quota,
            resume_at,
            ..
        } => {
            assert_eq!(*added, 100);
            assert_eq!(*remaining, 20);
            assert_eq!(*daily_quota, 100);
            assert!(*resume_at >= before + Duration::hours(24));
        }
        other => panic!("expected QuotaExceeded, got {other:?}"),
    }
    assert!(err.resume_at().is_some());
    assert_eq!(remote.add_batches().len(), 2);
    // Applied batches are kept for the next run.
    assert_eq!(remote.collection("friends").unwrap().member_count, 100);
}

#[tokio::test(start_paused = true)]
async fn test_quota_resume_with_diff_only() {
    let ids: Vec<String> = (0..120).map(|i| format!("u{i}")).collect();
    let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();
    let remote = InMemoryRemote::new("me").with_users(&id_refs);

    let first = context(&remote, options(SyncMode::DiffOnly, 50))
        .sync_members("friends", candidates(&id_refs))
        .await;
    assert!(matches!(first, Err(SyncError::QuotaExceeded { .. })));

    let report = context(&remote, options(SyncMode::DiffOnly, 50))
        .sync_members("friends", candidates(&id_refs))
        .await
        .unwrap();
    assert_eq!(report.present_before, 100);
    assert_eq!(report.added, 20);
    assert_eq!(remote.collection("friends").unwrap().member_count, 120);
}

#[tokio::test(start_paused = true)]
async fn test_read_only_credential_fails_before_mutation() {
    let remote = InMemoryRemote::new("me").with_users(&["a"]).read_only();
    let ctx = context(&remote, options(SyncMode::FullResync, 50));

    let err = ctx
        .sync_members("friends", candidates(&["a"]))
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::AuthorizationMismatch { .. }));
    assert!(write_calls(&remote).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_lookup_failure_propagates_and_rolls_back() {
    let remote = InMemoryRemote::new("me").with_users(&["a", "b"]);
    remote.fail_next(Operation::BulkLookup, RemoteError::network("timeout"));
    let ctx = context(&remote, options(SyncMode::FullResync, 50));

    let err = ctx
        .sync_members("friends", candidates(&["a", "b"]))
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Lookup { .. }));
    assert!(remote.collection("friends").is_none());
    assert_eq!(remote.call_count(Operation::CreateCollection), 1);
    assert_eq!(remote.call_count(Operation::DestroyCollection), 1);
    assert_eq!(remote.call_count(Operation::AddMembers), 0);
}

#[tokio::test(start_paused = true)]
async fn test_add_failure_is_not_retried() {
    let remote = InMemoryRemote::new("me").with_users(&["a"]);
    remote.fail_next(Operation::AddMembers, RemoteError::api(503, "over capacity"));
    let ctx = context(&remote, options(SyncMode::FullResync, 50));

    let err = ctx
        .sync_members("friends", candidates(&["a"]))
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::AddFailed { batch: 1, .. }));
    assert_eq!(remote.call_count(Operation::AddMembers), 1);
    assert!(remote.collection("friends").is_none());
}

#[tokio::test(start_paused = true)]
async fn test_empty_desired_set_only_checks_existence() {
    let remote = InMemoryRemote::new("me");
    let ctx = context(&remote, options(SyncMode::FullResync, 50));

    let report = ctx.sync_members("friends", Vec::new()).await.unwrap();

    assert_eq!(report.requested, 0);
    assert_eq!(report.added, 0);
    assert!(!report.created);
    assert_eq!(remote.calls(), vec![Operation::FindCollection]);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limited_read_waits_and_continues() {
    let remote = InMemoryRemote::new("me")
        .with_users(&["a", "b"])
        .with_collection("friends", &["a"]);
    remote.fail_next(
        Operation::ListMembers,
        RemoteError::RateLimited {
            reset_at: Utc::now() + Duration::minutes(5),
        },
    );
    let (ctx, events) = recording_context(&remote, options(SyncMode::DiffOnly, 50));

    let report = ctx
        .sync_members("friends", candidates(&["a", "b"]))
        .await
        .unwrap();

    assert_eq!(report.added, 1);
    assert_eq!(remote.call_count(Operation::ListMembers), 2);
    let waits = events
        .lock()
        .unwrap()
        .iter()
        .filter(|e| matches!(e, SyncProgress::RateLimitWait { .. }))
        .count();
    assert_eq!(waits, 1);
}

#[tokio::test(start_paused = true)]
async fn test_batches_are_spaced_by_the_window() {
    let remote = InMemoryRemote::new("me").with_users(&["a", "b", "c"]);
    let (ctx, events) = recording_context(
        &remote,
        SyncOptions {
            window: Duration::minutes(10),
            ..options(SyncMode::FullResync, 1)
        },
    );

    let started = tokio::time::Instant::now();
    ctx.sync_members("friends", candidates(&["a", "b", "c"]))
        .await
        .unwrap();

    // Two waits between three batches, none after the last.
    assert!(started.elapsed() >= std::time::Duration::from_secs(20 * 60));
    assert!(started.elapsed() < std::time::Duration::from_secs(30 * 60));
    let windows: Vec<usize> = events
        .lock()
        .unwrap()
        .iter()
        .filter_map(|e| match e {
            SyncProgress::WaitingForWindow { next_batch, .. } => Some(*next_batch),
            _ => None,
        })
        .collect();
    assert_eq!(windows, vec![2, 3]);
}

#[tokio::test(start_paused = true)]
async fn test_dry_run_never_writes() {
    let remote = InMemoryRemote::new("me")
        .with_users(&["a", "b", "c"])
        .with_collection("friends", &["a"]);
    let ctx = context(
        &remote,
        SyncOptions {
            dry_run: true,
            ..options(SyncMode::FullResync, 2)
        },
    );

    let report = ctx
        .sync_members("friends", candidates(&["a", "b", "c"]))
        .await
        .unwrap();

    assert!(report.dry_run);
    assert_eq!(report.added, 0);
    assert_eq!(report.attempted, 0);
    assert_eq!(report.batches, 2);
    assert!(write_calls(&remote).is_empty());
    assert_eq!(remote.members("friends").unwrap(), vec!["a".to_string()]);
}

fn stop_on(
    remote: &InMemoryRemote,
    options: SyncOptions,
    stop: fn(&SyncProgress) -> bool,
) -> SyncContext<InMemoryRemote> {
    let flag = Arc::new(AtomicBool::new(false));
    let trigger = Arc::clone(&flag);
    let callback: Arc<ProgressCallback> = Arc::new(Box::new(move |event| {
        if stop(&event) {
            trigger.store(true, Ordering::SeqCst);
        }
    }));

    SyncContext::builder()
        .client(remote.clone())
        .options(options)
        .progress(callback)
        .shutdown_flag(flag)
        .build()
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_before_run_makes_no_checks_or_writes() {
    let remote = InMemoryRemote::new("me")
        .with_users(&["a", "b"])
        .with_collection("friends", &[]);
    let flag = Arc::new(AtomicBool::new(true));
    let ctx = SyncContext::builder()
        .client(remote.clone())
        .options(options(SyncMode::DiffOnly, 1))
        .shutdown_flag(flag)
        .build()
        .unwrap();

    let err = ctx
        .sync_members("friends", candidates(&["a", "b"]))
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Interrupted { added: 0, ref collection } if collection == "friends"));
    assert_eq!(remote.call_count(Operation::Relationship), 0);
    assert!(write_calls(&remote).is_empty());
    assert!(remote.collection("friends").is_some());
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_during_eligibility_rolls_back_new_list() {
    let remote = InMemoryRemote::new("me").with_users(&["a", "b"]);
    let ctx = stop_on(&remote, options(SyncMode::FullResync, 1), |event| {
        matches!(event, SyncProgress::CheckingEligibility { .. })
    });

    let err = ctx
        .sync_members("friends", candidates(&["a", "b"]))
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Interrupted { added: 0, .. }));
    assert_eq!(remote.call_count(Operation::BulkLookup), 0);
    assert_eq!(remote.call_count(Operation::Relationship), 0);
    assert_eq!(remote.call_count(Operation::AddMembers), 0);
    assert!(remote.collection("friends").is_none());
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_keeps_applied_batches() {
    let remote = InMemoryRemote::new("me").with_users(&["a", "b", "c"]);
    let ctx = stop_on(&remote, options(SyncMode::FullResync, 1), |event| {
        matches!(event, SyncProgress::BatchVerified { .. })
    });

    let err = ctx
        .sync_members("friends", candidates(&["a", "b", "c"]))
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Interrupted { added: 1, .. }));
    assert_eq!(remote.members("friends"), Some(vec!["a".to_string()]));
    assert_eq!(remote.call_count(Operation::AddMembers), 1);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_while_reading_follow_graph() {
    let remote = InMemoryRemote::new("me")
        .with_user("12", "jack")
        .with_users(&["a", "b", "c"])
        .with_follow_graph("12", FollowKind::Followers, &["a", "b", "c"])
        .with_page_size(1);
    let ctx = stop_on(&remote, options(SyncMode::FullResync, 50), |event| {
        matches!(event, SyncProgress::FetchedPage { .. })
    });

    let err = ctx
        .sync_follow_graph("12", FollowKind::Followers, None)
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Interrupted { ref collection, .. } if collection == "follower_12_jack"));
    assert_eq!(remote.call_count(Operation::FollowGraph), 1);
    assert!(write_calls(&remote).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_follow_graph_mirrors_into_named_list() {
    let remote = InMemoryRemote::new("me")
        .with_user("12", "jack")
        .with_users(&["a", "b", "c"])
        .with_follow_graph("12", FollowKind::Followees, &["a", "b", "c"])
        .with_page_size(2);
    let ctx = context(&remote, options(SyncMode::FullResync, 50));

    let report = ctx
        .sync_follow_graph("12", FollowKind::Followees, Some(2))
        .await
        .unwrap();

    assert_eq!(report.collection_name, "followee_12_jack");
    assert_eq!(report.added, 2);
    assert_eq!(
        remote.members("followee_12_jack").unwrap(),
        vec!["a".to_string(), "b".to_string()]
    );
}

#[tokio::test(start_paused = true)]
async fn test_collection_members_reads_every_page() {
    let remote = InMemoryRemote::new("me")
        .with_users(&["a", "b", "c"])
        .with_collection("friends", &["a", "b", "c"])
        .with_page_size(1);
    let ctx = context(&remote, SyncOptions::default());

    let (collection, members) = ctx.collection_members("friends").await.unwrap();

    assert_eq!(collection.member_count, 3);
    let ids: Vec<String> = members.into_iter().map(|u: UserRef| u.id).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
    assert_eq!(remote.call_count(Operation::ListMembers), 3);

    let err = ctx.collection_members("missing").await.unwrap_err();
    assert!(matches!(err, SyncError::CollectionNotFound { .. }));
}
