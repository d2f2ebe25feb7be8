//! Integration tests for the session lifecycle.
//!
//! Start, extend, end and expire against the in-memory store, including the
//! one-active-session-per-user race.

use live_match::{
    LiveMatch,
    db::MemoryStore,
    events::{InMemoryPhotoStorage, InMemoryUserDirectory},
    geo::{Coordinate, haversine_km},
    profile::{Gender, ProfileRequest, UserId, UserSummary},
    session::{DeviceInfo, SessionError, StartSessionRequest},
};
use std::{sync::Arc, time::Duration};

/// Helper to build a service without delayed tasks
async fn setup() -> (Arc<LiveMatch>, Arc<MemoryStore>, Arc<InMemoryUserDirectory>) {
    let store = Arc::new(MemoryStore::new());
    let directory = Arc::new(InMemoryUserDirectory::new());
    let service = LiveMatch::builder(
        store.clone(),
        directory.clone(),
        Arc::new(InMemoryPhotoStorage::new()),
    )
    .build_degraded();
    (service, store, directory)
}

/// Helper to register a main profile and a live profile
async fn onboard(service: &LiveMatch, directory: &InMemoryUserDirectory, user_id: UserId) {
    directory
        .insert(UserSummary {
            user_id,
            display_name: format!("user{user_id}"),
            age: 30,
            gender: Gender::Female,
            orientation: None,
        })
        .await;
    service
        .profiles
        .create_profile(user_id, &ProfileRequest::default())
        .await
        .expect("Failed to create live profile");
}

fn start_request(duration: i64) -> StartSessionRequest {
    StartSessionRequest {
        duration,
        latitude: 40.0,
        longitude: -74.0,
        device: None,
    }
}

#[tokio::test]
async fn test_start_requires_live_profile() {
    let (service, _store, directory) = setup().await;
    directory
        .insert(UserSummary {
            user_id: 1,
            display_name: "no_profile".to_string(),
            age: 25,
            gender: Gender::Male,
            orientation: None,
        })
        .await;

    let err = service.sessions.start(1, &start_request(30)).await.unwrap_err();
    assert!(matches!(err, SessionError::ProfileRequired));
    assert_eq!(err.code(), "PROFILE_REQUIRED");
}

#[tokio::test]
async fn test_start_validates_duration_and_coordinate() {
    let (service, _store, directory) = setup().await;
    onboard(&service, &directory, 1).await;

    let err = service.sessions.start(1, &start_request(1)).await.unwrap_err();
    assert!(matches!(err, SessionError::InvalidDuration { .. }));

    let err = service.sessions.start(1, &start_request(500)).await.unwrap_err();
    assert!(matches!(err, SessionError::InvalidDuration { .. }));

    let bad_location = StartSessionRequest {
        latitude: 91.0,
        ..start_request(30)
    };
    let err = service.sessions.start(1, &bad_location).await.unwrap_err();
    assert_eq!(err.code(), "INVALID_COORDINATE");

    // Nothing was opened by the rejected calls
    assert!(!service.sessions.status(1).await.unwrap().active);
}

#[tokio::test]
async fn test_session_location_is_fuzzed_within_radius() {
    let (service, _store, directory) = setup().await;
    onboard(&service, &directory, 1).await;

    let session = service.sessions.start(1, &start_request(30)).await.unwrap();
    let origin = Coordinate::new(40.0, -74.0).unwrap();
    let offset = haversine_km(origin, session.fuzzed_location);
    let radius = service.config().fuzz_radius_km;
    assert!(
        offset <= radius + 0.1,
        "fuzzed point {offset} km away exceeds radius {radius}"
    );
}

#[tokio::test]
async fn test_concurrent_starts_exactly_one_wins() {
    let (service, _store, directory) = setup().await;
    onboard(&service, &directory, 7).await;

    let attempts = 16;
    let mut handles = Vec::new();
    for _ in 0..attempts {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            service.sessions.start(7, &start_request(30)).await
        }));
    }

    let mut started = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => started += 1,
            Err(SessionError::SessionAlreadyActive) => rejected += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(started, 1);
    assert_eq!(rejected, attempts - 1);
}

#[tokio::test]
async fn test_extend_pushes_expiry_forward() {
    let (service, _store, directory) = setup().await;
    onboard(&service, &directory, 1).await;

    let session = service.sessions.start(1, &start_request(30)).await.unwrap();
    let extended = service.sessions.extend(1, 15).await.unwrap();
    assert_eq!(extended.id, session.id);
    assert_eq!(
        extended.expires_at - session.expires_at,
        chrono::Duration::minutes(15)
    );

    let status = service.sessions.status(1).await.unwrap();
    assert!(status.active);
    assert!(status.remaining_seconds > 30 * 60);
    assert!(status.remaining_seconds <= 45 * 60);

    let err = service.sessions.extend(1, 0).await.unwrap_err();
    assert!(matches!(err, SessionError::InvalidExtension { .. }));
}

#[tokio::test]
async fn test_extend_and_end_without_session() {
    let (service, _store, directory) = setup().await;
    onboard(&service, &directory, 1).await;

    let err = service.sessions.extend(1, 10).await.unwrap_err();
    assert!(matches!(err, SessionError::NoActiveSession));

    let err = service.sessions.end(1).await.unwrap_err();
    assert!(matches!(err, SessionError::NoActiveSession));
    assert_eq!(err.code(), "NO_ACTIVE_SESSION");
}

#[tokio::test]
async fn test_end_then_late_expiry_is_noop() {
    let (service, _store, directory) = setup().await;
    onboard(&service, &directory, 1).await;

    let session = service.sessions.start(1, &start_request(30)).await.unwrap();
    let ended = service.sessions.end(1).await.unwrap();
    assert_eq!(ended.id, session.id);
    assert!(ended.ended_at.is_some());

    // Timer fires after the manual end
    let expired = service.sessions.expire(session.id).await.unwrap();
    assert!(expired.is_none());

    let status = service.sessions.status(1).await.unwrap();
    assert!(!status.active);
    assert_eq!(status.remaining_seconds, 0);

    // A new session can be started right away
    assert!(service.sessions.start(1, &start_request(30)).await.is_ok());
}

#[tokio::test]
async fn test_early_expiry_fire_leaves_session_open() {
    let (service, _store, directory) = setup().await;
    onboard(&service, &directory, 1).await;

    let session = service.sessions.start(1, &start_request(30)).await.unwrap();
    let expired = service.sessions.expire(session.id).await.unwrap();
    assert!(expired.is_none());
    assert!(service.sessions.status(1).await.unwrap().active);
}

#[tokio::test]
async fn test_device_fingerprint_is_recorded() {
    let (service, store, directory) = setup().await;
    onboard(&service, &directory, 1).await;

    let request = StartSessionRequest {
        device: Some(DeviceInfo {
            device_id: "device-abc".to_string(),
            device_model: Some("Pixel 9".to_string()),
            platform: Some("android".to_string()),
        }),
        ..start_request(30)
    };
    service.sessions.start(1, &request).await.unwrap();

    // Written off the request path
    for _ in 0..50 {
        if store.device_count().await == 1 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("device fingerprint was not recorded");
}

#[tokio::test]
async fn test_session_events_are_published() {
    let (service, _store, directory) = setup().await;
    onboard(&service, &directory, 1).await;
    let mut events = service.events().subscribe();

    service.sessions.start(1, &start_request(30)).await.unwrap();
    service.sessions.extend(1, 5).await.unwrap();
    service.sessions.end(1).await.unwrap();

    let kinds: Vec<&str> = [
        events.recv().await.unwrap(),
        events.recv().await.unwrap(),
        events.recv().await.unwrap(),
    ]
    .iter()
    .map(|e| e.kind())
    .collect();
    assert_eq!(kinds, vec!["session_started", "session_extended", "session_ended"]);
}
