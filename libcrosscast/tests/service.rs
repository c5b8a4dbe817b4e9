//! Integration tests for CrosscastService
//!
//! Tests the service layer as a whole, including interactions between the
//! posting service, the publisher and the scheduler.

use chrono::{Duration, TimeZone, Utc};
use std::sync::Arc;
use tempfile::TempDir;

use libcrosscast::platforms::mock::MockAdapter;
use libcrosscast::platforms::AdapterRegistry;
use libcrosscast::service::events::Event;
use libcrosscast::service::CrosscastService;
use libcrosscast::{
    Config, CrosscastError, Database, Integration, Platform, PostStatus, PublishRequest,
};

/// Setup test service with temporary database and mock adapters
async fn setup_test_service() -> (CrosscastService, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");

    let mut config = Config::default_config();
    config.database.path = db_path.to_str().unwrap().to_string();

    let db = Database::new(&config.database.path).await.unwrap();
    let mut registry = AdapterRegistry::new();
    registry.register(Arc::new(MockAdapter::with_limit(Platform::Twitter, 280)));
    registry.register(Arc::new(MockAdapter::success(Platform::Linkedin)));

    let service = CrosscastService::from_parts(config, db, registry).unwrap();
    (service, temp_dir)
}

async fn connect(service: &CrosscastService, user_id: &str, platform: Platform) {
    let mut integration = Integration::new(user_id, platform, "token");
    integration.external_id = Some("member-1".to_string());
    service.connections().connect(integration).await.unwrap();
}

fn request(text: &str, platforms: &[Platform]) -> PublishRequest {
    PublishRequest {
        text: text.to_string(),
        platforms: platforms.to_vec(),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_publish_through_service_emits_events() {
    let (service, _temp_dir) = setup_test_service().await;
    connect(&service, "alice", Platform::Twitter).await;
    let mut receiver = service.subscribe();

    let report = service
        .posting()
        .publish("alice", &request("Hello", &[Platform::Twitter]))
        .await
        .unwrap();
    assert_eq!(report.succeeded.len(), 1);

    let first = receiver.try_recv().unwrap();
    assert!(matches!(first, Event::PublishStarted { .. }));
    assert_eq!(first.post_id(), report.post_id);

    let fetched = service.posting().get("alice", &report.post_id).await.unwrap();
    assert_eq!(fetched.post.status, PostStatus::Published);
}

#[tokio::test]
async fn test_save_draft_and_list_by_status() {
    let (service, _temp_dir) = setup_test_service().await;

    let draft = service
        .posting()
        .save_draft("alice", &request("Not ready yet", &[Platform::Linkedin]))
        .await
        .unwrap();
    assert_eq!(draft.status, PostStatus::Draft);

    let empty = service
        .posting()
        .save_draft("alice", &request("  ", &[]))
        .await;
    assert!(matches!(empty, Err(CrosscastError::InvalidInput(_))));

    let drafts = service
        .posting()
        .list("alice", Some(PostStatus::Draft), 10)
        .await
        .unwrap();
    assert_eq!(drafts.len(), 1);
    assert_eq!(drafts[0].id, draft.id);
    assert_eq!(drafts[0].platforms, vec![Platform::Linkedin]);

    assert!(service
        .posting()
        .list("alice", Some(PostStatus::Published), 10)
        .await
        .unwrap()
        .is_empty());
    assert!(service.posting().list("bob", None, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_schedule_validates_up_front() {
    let (service, _temp_dir) = setup_test_service().await;
    let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
    let later = now + Duration::hours(2);

    // No integrations yet
    let result = service
        .posting()
        .schedule("alice", &request("Soon", &[]), later, now)
        .await;
    assert!(matches!(result, Err(CrosscastError::NoActiveIntegrations)));

    connect(&service, "alice", Platform::Twitter).await;

    let past = service
        .posting()
        .schedule("alice", &request("Too late", &[]), now - Duration::minutes(1), now)
        .await;
    assert!(matches!(past, Err(CrosscastError::InvalidInput(_))));

    let too_long = service
        .posting()
        .schedule("alice", &request(&"a".repeat(281), &[Platform::Twitter]), later, now)
        .await;
    match too_long {
        Err(CrosscastError::InvalidInput(message)) => assert!(message.starts_with("twitter: ")),
        other => panic!("expected InvalidInput, got {:?}", other.map(|p| p.id)),
    }

    let post = service
        .posting()
        .schedule("alice", &request("Right on time", &[]), later, now)
        .await
        .unwrap();
    assert_eq!(post.status, PostStatus::Scheduled);
    assert_eq!(post.scheduled_at, Some(later.timestamp()));
    assert!(post.platforms.is_empty());
}

#[tokio::test]
async fn test_scheduled_post_goes_out_on_tick() {
    let (service, _temp_dir) = setup_test_service().await;
    connect(&service, "alice", Platform::Linkedin).await;

    let now = Utc::now();
    let at = now + Duration::minutes(5);
    let post = service
        .posting()
        .schedule("alice", &request("Later", &[Platform::Linkedin]), at, now)
        .await
        .unwrap();

    let scheduler = service.scheduler();
    assert_eq!(scheduler.tick(now.timestamp()).await.unwrap().due, 0);

    let summary = scheduler.tick(at.timestamp()).await.unwrap();
    assert_eq!(summary.published, 1);

    let fetched = service.posting().get("alice", &post.id).await.unwrap();
    assert_eq!(fetched.post.status, PostStatus::Published);
    assert!(fetched.result_urls().contains_key(&Platform::Linkedin));
}

#[tokio::test]
async fn test_delete_rules() {
    let (service, _temp_dir) = setup_test_service().await;
    connect(&service, "alice", Platform::Twitter).await;
    let posting = service.posting();

    let draft = posting
        .save_draft("alice", &request("Scratch", &[]))
        .await
        .unwrap();

    // Someone else's post looks like it does not exist
    let foreign = posting.delete("bob", &draft.id).await;
    assert!(matches!(foreign, Err(CrosscastError::NotFound(_))));
    assert!(matches!(
        posting.get("bob", &draft.id).await,
        Err(CrosscastError::NotFound(_))
    ));

    posting.delete("alice", &draft.id).await.unwrap();
    assert!(matches!(
        posting.get("alice", &draft.id).await,
        Err(CrosscastError::NotFound(_))
    ));

    let report = posting
        .publish("alice", &request("Shipped", &[Platform::Twitter]))
        .await
        .unwrap();
    let published = posting.delete("alice", &report.post_id).await;
    assert!(matches!(published, Err(CrosscastError::InvalidInput(_))));

    let now = Utc::now();
    let scheduled = posting
        .schedule("alice", &request("Queued", &[]), now + Duration::hours(1), now)
        .await
        .unwrap();
    service
        .database()
        .claim_scheduled_post(&scheduled.id, "cast-send-test", now.timestamp())
        .await
        .unwrap();
    let claimed = posting.delete("alice", &scheduled.id).await;
    assert!(matches!(claimed, Err(CrosscastError::InvalidInput(_))));

    let missing = posting.delete("alice", "no-such-post").await;
    assert!(matches!(missing, Err(CrosscastError::NotFound(_))));
}

#[tokio::test]
async fn test_connections_round_trip() {
    let (service, _temp_dir) = setup_test_service().await;
    connect(&service, "alice", Platform::Twitter).await;
    connect(&service, "alice", Platform::Linkedin).await;

    let listed = service.connections().list("alice").await.unwrap();
    assert_eq!(listed.len(), 2);

    service
        .connections()
        .disconnect("alice", Platform::Twitter, Utc::now().timestamp())
        .await
        .unwrap();

    let active = service.database().active_integrations("alice").await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].platform, Platform::Linkedin);
}
