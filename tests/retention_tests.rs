//! Integration tests for the retention engine and the retention jobs.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::SystemTime;

use anyhow::Result;
use chrono::Duration;
use sea_orm::{ConnectionTrait, EntityTrait, PaginatorTrait, Statement};
use sentinel_jobs::config::JobsConfig;
use sentinel_jobs::jobs::{Job, JobContext, RetentionJob, TriggerSource};
use sentinel_jobs::media_cache::MediaCache;
use sentinel_jobs::models::{
    EventInterest, EventLog, EventUpdateLog, GiphyCache, MemberStatusLog, MessageAttachment,
    NicknameLog, PollLog, PollVote, VoiceLog,
};
use sentinel_jobs::retention::{RetentionEngine, RetentionPolicy, RetentionTarget};
use sentinel_jobs::trigger::ManualClock;
use tempfile::TempDir;

#[path = "test_utils/mod.rs"]
mod test_utils;
use test_utils::*;

fn log_policies(days: u32) -> Vec<RetentionPolicy> {
    RetentionTarget::LOG_TARGETS
        .iter()
        .map(|target| RetentionPolicy::days(*target, days))
        .collect()
}

#[tokio::test]
async fn activity_logs_are_pruned_strictly_before_cutoff() -> Result<()> {
    let db = setup_test_db().await?;
    let cache_dir = TempDir::new()?;
    let now = reference_now();

    let old_voice = insert_voice_log(&db, days_ago(now, 32)).await?;
    let boundary_voice = insert_voice_log(&db, days_ago(now, 31)).await?;
    let recent_voice = insert_voice_log(&db, days_ago(now, 30)).await?;
    insert_member_status_log(&db, days_ago(now, 31) - Duration::seconds(1)).await?;
    insert_member_status_log(&db, days_ago(now, 1)).await?;
    insert_nickname_log(&db, days_ago(now, 90)).await?;
    insert_nickname_log(&db, days_ago(now, 31)).await?;

    let engine = RetentionEngine::new(db.clone(), MediaCache::new(cache_dir.path()));
    let report = engine.run(&log_policies(31), now).await;

    assert!(report.failed_targets().is_empty());
    assert_eq!(report.outcome(RetentionTarget::VoiceLogs).unwrap().deleted, 1);
    assert_eq!(report.outcome(RetentionTarget::MemberStatusLogs).unwrap().deleted, 1);
    assert_eq!(report.outcome(RetentionTarget::NicknameLogs).unwrap().deleted, 1);

    let remaining: HashSet<i32> = VoiceLog::find()
        .all(&db)
        .await?
        .into_iter()
        .map(|row| row.id)
        .collect();
    assert!(!remaining.contains(&old_voice));
    assert!(remaining.contains(&boundary_voice));
    assert!(remaining.contains(&recent_voice));
    assert_eq!(MemberStatusLog::find().count(&db).await?, 1);
    assert_eq!(NicknameLog::find().count(&db).await?, 1);
    Ok(())
}

#[tokio::test]
async fn votes_of_open_polls_are_kept() -> Result<()> {
    let db = setup_test_db().await?;
    let cache_dir = TempDir::new()?;
    let now = reference_now();

    insert_poll(&db, "closed-long-ago", days_ago(now, 60), Some(days_ago(now, 40))).await?;
    insert_poll(&db, "closed-recently", days_ago(now, 60), Some(days_ago(now, 10))).await?;
    insert_poll(&db, "still-open", days_ago(now, 60), None).await?;
    insert_poll_vote(&db, "closed-long-ago", 1, days_ago(now, 59)).await?;
    insert_poll_vote(&db, "closed-long-ago", 2, days_ago(now, 45)).await?;
    insert_poll_vote(&db, "closed-recently", 1, days_ago(now, 59)).await?;
    let open_vote = insert_poll_vote(&db, "still-open", 1, days_ago(now, 59)).await?;

    let engine = RetentionEngine::new(db.clone(), MediaCache::new(cache_dir.path()));
    let report = engine
        .run(&[RetentionPolicy::days(RetentionTarget::PollVotes, 31)], now)
        .await;

    assert_eq!(report.outcome(RetentionTarget::PollVotes).unwrap().deleted, 2);
    let votes = PollVote::find().all(&db).await?;
    assert_eq!(votes.len(), 2);
    assert!(votes.iter().any(|v| v.id == open_vote));
    assert!(votes.iter().all(|v| v.poll_id != "closed-long-ago"));
    // Parent polls are never removed.
    assert_eq!(PollLog::find().count(&db).await?, 3);
    Ok(())
}

#[tokio::test]
async fn event_rows_are_pruned_only_for_past_events() -> Result<()> {
    let db = setup_test_db().await?;
    let cache_dir = TempDir::new()?;
    let now = reference_now();

    // Ended well before the cutoff
    insert_event(&db, 1, days_ago(now, 45), Some(days_ago(now, 44))).await?;
    // No end time recorded
    insert_event(&db, 2, days_ago(now, 45), None).await?;
    // Ended inside the window
    insert_event(&db, 3, days_ago(now, 45), Some(days_ago(now, 5))).await?;

    insert_event_interest(&db, 1, 10, days_ago(now, 50)).await?;
    insert_event_interest(&db, 2, 10, days_ago(now, 50)).await?;
    insert_event_interest(&db, 3, 10, days_ago(now, 50)).await?;
    insert_event_update(&db, 1, days_ago(now, 46)).await?;
    insert_event_update(&db, 2, days_ago(now, 46)).await?;
    insert_event_update(&db, 3, days_ago(now, 46)).await?;

    let engine = RetentionEngine::new(db.clone(), MediaCache::new(cache_dir.path()));
    let report = engine
        .run(
            &[
                RetentionPolicy::days(RetentionTarget::EventInterests, 31),
                RetentionPolicy::days(RetentionTarget::EventUpdateLogs, 31),
            ],
            now,
        )
        .await;

    assert_eq!(report.total_deleted(), 2);
    let interests = EventInterest::find().all(&db).await?;
    assert_eq!(
        interests.iter().map(|i| i.event_id).collect::<HashSet<_>>(),
        HashSet::from([2, 3])
    );
    let updates = EventUpdateLog::find().all(&db).await?;
    assert_eq!(
        updates.iter().map(|u| u.event_id).collect::<HashSet<_>>(),
        HashSet::from([2, 3])
    );
    assert_eq!(EventLog::find().count(&db).await?, 3);
    Ok(())
}

#[tokio::test]
async fn second_run_deletes_nothing() -> Result<()> {
    let db = setup_test_db().await?;
    let cache_dir = TempDir::new()?;
    let now = reference_now();

    insert_voice_log(&db, days_ago(now, 40)).await?;
    insert_nickname_log(&db, days_ago(now, 40)).await?;
    insert_poll(&db, "p", days_ago(now, 60), Some(days_ago(now, 40))).await?;
    insert_poll_vote(&db, "p", 1, days_ago(now, 50)).await?;

    let engine = RetentionEngine::new(db.clone(), MediaCache::new(cache_dir.path()));
    let first = engine.run(&log_policies(31), now).await;
    assert_eq!(first.total_deleted(), 3);

    let second = engine.run(&log_policies(31), now).await;
    assert_eq!(second.total_deleted(), 0);
    assert!(second.failed_targets().is_empty());
    Ok(())
}

#[tokio::test]
async fn cache_eviction_job_drops_unused_gifs() -> Result<()> {
    let db = setup_test_db().await?;
    let cache_dir = TempDir::new()?;
    let now = reference_now();

    insert_giphy(&db, "stale", days_ago(now, 8)).await?;
    let fresh = insert_giphy(&db, "fresh", days_ago(now, 6)).await?;
    // Activity logs are not this job's concern.
    insert_voice_log(&db, days_ago(now, 400)).await?;

    let engine = RetentionEngine::new(db.clone(), MediaCache::new(cache_dir.path()));
    let clock = Arc::new(ManualClock::new(now));
    let job = RetentionJob::cache_eviction(engine, &JobsConfig::default(), clock);
    assert_eq!(job.name(), "cache_eviction");

    let report = job
        .run(&JobContext::new(TriggerSource::Manual, now))
        .await?;

    assert_eq!(report.items_affected, 1);
    let gifs = GiphyCache::find().all(&db).await?;
    assert_eq!(gifs.len(), 1);
    assert_eq!(gifs[0].id, fresh);
    assert_eq!(VoiceLog::find().count(&db).await?, 1);
    Ok(())
}

#[tokio::test]
async fn log_retention_job_uses_configured_window() -> Result<()> {
    let db = setup_test_db().await?;
    let cache_dir = TempDir::new()?;
    let now = reference_now();

    insert_voice_log(&db, days_ago(now, 10)).await?;
    insert_voice_log(&db, days_ago(now, 3)).await?;
    insert_giphy(&db, "ancient", days_ago(now, 400)).await?;

    let config = JobsConfig {
        log_retention_days: 7,
        ..JobsConfig::default()
    };
    let engine = RetentionEngine::new(db.clone(), MediaCache::new(cache_dir.path()));
    let job = RetentionJob::log_retention(engine, &config, Arc::new(ManualClock::new(now)));
    assert!(job.policies().iter().all(|p| p.max_age == Duration::days(7)));

    job.run(&JobContext::new(TriggerSource::Schedule, now))
        .await?;

    assert_eq!(VoiceLog::find().count(&db).await?, 1);
    assert_eq!(GiphyCache::find().count(&db).await?, 1);
    Ok(())
}

#[tokio::test]
async fn expired_cached_media_is_evicted_and_unlinked() -> Result<()> {
    let db = setup_test_db().await?;
    let cache_dir = TempDir::new()?;
    let cache = MediaCache::new(cache_dir.path());
    cache.ensure_directories().await?;
    let now = reference_now();

    let expired_path = cache.store("old.png", Some("image/png"), b"old!").await?;
    let fresh_path = cache.store("new.png", Some("image/png"), b"new!").await?;
    let orphan_path = cache.store("orphan.mp4", Some("video/mp4"), b"lost").await?;

    // Push the orphan's mtime before the cutoff so the sweep picks it up.
    let orphan_file = std::fs::File::options()
        .write(true)
        .open(cache_dir.path().join(&orphan_path))?;
    orphan_file.set_modified(SystemTime::from(days_ago(now, 60)))?;
    drop(orphan_file);

    let expired = insert_attachment(&db, 1, 11, Some(&expired_path), Some(days_ago(now, 40))).await?;
    let fresh = insert_attachment(&db, 2, 12, Some(&fresh_path), Some(days_ago(now, 2))).await?;
    // Row whose file is already gone still gets its path cleared.
    let missing = insert_attachment(&db, 3, 13, Some("images/gone.png"), Some(days_ago(now, 40))).await?;

    let engine = RetentionEngine::new(db.clone(), cache.clone());
    let report = engine
        .run(&[RetentionPolicy::days(RetentionTarget::CachedMedia, 31)], now)
        .await;

    let outcome = report.outcome(RetentionTarget::CachedMedia).unwrap();
    assert_eq!(outcome.error, None);
    assert_eq!(outcome.deleted, 3);
    assert_eq!(outcome.failed, 0);

    assert!(!cache_dir.path().join(&expired_path).exists());
    assert!(!cache_dir.path().join(&orphan_path).exists());
    assert!(cache_dir.path().join(&fresh_path).exists());

    let rows = MessageAttachment::find().all(&db).await?;
    let path_of = |id: i32| rows.iter().find(|r| r.id == id).unwrap().local_path.clone();
    assert_eq!(path_of(expired), None);
    assert_eq!(path_of(missing), None);
    assert_eq!(path_of(fresh), Some(fresh_path));
    // Attachment rows themselves stay.
    assert_eq!(rows.len(), 3);
    Ok(())
}

#[tokio::test]
async fn failing_target_does_not_stop_the_others() -> Result<()> {
    let db = setup_test_db().await?;
    let cache_dir = TempDir::new()?;
    let now = reference_now();

    insert_member_status_log(&db, days_ago(now, 40)).await?;
    insert_nickname_log(&db, days_ago(now, 40)).await?;
    db.execute(Statement::from_string(
        db.get_database_backend(),
        "DROP TABLE voice_logs".to_string(),
    ))
    .await?;

    let engine = RetentionEngine::new(db.clone(), MediaCache::new(cache_dir.path()));
    let report = engine.run(&log_policies(31), now).await;

    assert_eq!(report.failed_targets(), vec![RetentionTarget::VoiceLogs]);
    let voice = report.outcome(RetentionTarget::VoiceLogs).unwrap();
    assert!(voice.error.as_deref().is_some_and(|e| e.contains("voice_logs")));
    assert_eq!(voice.deleted, 0);
    assert_eq!(report.outcome(RetentionTarget::MemberStatusLogs).unwrap().deleted, 1);
    assert_eq!(report.outcome(RetentionTarget::NicknameLogs).unwrap().deleted, 1);
    assert_eq!(MemberStatusLog::find().count(&db).await?, 0);
    assert_eq!(NicknameLog::find().count(&db).await?, 0);

    // The job still succeeds and reports the broken target as a failure.
    let job = RetentionJob::log_retention(engine, &JobsConfig::default(), Arc::new(ManualClock::new(now)));
    let job_report = job
        .run(&JobContext::new(TriggerSource::Schedule, now))
        .await?;
    assert_eq!(job_report.items_failed, 1);
    Ok(())
}

#[tokio::test]
async fn unremovable_file_keeps_its_path_and_others_still_evict() -> Result<()> {
    let db = setup_test_db().await?;
    let outer = TempDir::new()?;
    let cache = MediaCache::new(outer.path().join("cache"));
    cache.ensure_directories().await?;
    let now = reference_now();

    // A path pointing outside the cache root must never be deleted.
    let outside = outer.path().join("escape.png");
    std::fs::write(&outside, b"keep")?;

    let first_path = cache.store("one.png", Some("image/png"), b"1").await?;
    let second_path = cache.store("two.png", Some("image/png"), b"2").await?;
    let first = insert_attachment(&db, 1, 11, Some(&first_path), Some(days_ago(now, 40))).await?;
    let escaping = insert_attachment(&db, 2, 12, Some("../escape.png"), Some(days_ago(now, 40))).await?;
    let second = insert_attachment(&db, 3, 13, Some(&second_path), Some(days_ago(now, 40))).await?;

    let engine = RetentionEngine::new(db.clone(), cache.clone());
    let report = engine
        .run(&[RetentionPolicy::days(RetentionTarget::CachedMedia, 31)], now)
        .await;

    let outcome = report.outcome(RetentionTarget::CachedMedia).unwrap();
    assert_eq!(outcome.error, None);
    assert_eq!(outcome.deleted, 2);
    assert_eq!(outcome.failed, 1);

    assert!(outside.exists());
    assert!(!cache.root().join(&first_path).exists());
    assert!(!cache.root().join(&second_path).exists());

    let rows = MessageAttachment::find().all(&db).await?;
    let path_of = |id: i32| rows.iter().find(|r| r.id == id).unwrap().local_path.clone();
    assert_eq!(path_of(first), None);
    assert_eq!(path_of(second), None);
    assert_eq!(path_of(escaping).as_deref(), Some("../escape.png"));
    Ok(())
}
