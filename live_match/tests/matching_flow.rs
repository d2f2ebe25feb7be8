//! Integration tests for matching, declines, acceptance and the nearby count.

use async_trait::async_trait;
use live_match::{
    LiveMatch, LiveMatchConfig,
    db::{MatchRepository, MemoryStore},
    events::{
        CollaboratorResult, InMemoryPhotoStorage, InMemoryUserDirectory, Notification, Notifier,
    },
    matching::{CurrentMatch, Match, MatchError},
    profile::{Gender, Orientation, ProfileRequest, UserId, UserSummary},
    scheduler::TimerHandle,
    session::{Session, StartSessionRequest},
};
use std::{collections::HashSet, sync::Arc, time::Duration};
use tokio::sync::Mutex;

#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<(UserId, Notification)>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(
        &self,
        user_id: UserId,
        notification: &Notification,
    ) -> CollaboratorResult<()> {
        self.sent.lock().await.push((user_id, notification.clone()));
        Ok(())
    }
}

struct Fixture {
    service: Arc<LiveMatch>,
    store: Arc<MemoryStore>,
    directory: Arc<InMemoryUserDirectory>,
    notifier: Arc<RecordingNotifier>,
}

/// Helper to build a service without delayed tasks; matching runs by hand
fn setup() -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let directory = Arc::new(InMemoryUserDirectory::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let service = LiveMatch::builder(
        store.clone(),
        directory.clone(),
        Arc::new(InMemoryPhotoStorage::new()),
    )
    .notifier(notifier.clone())
    .build_degraded();
    Fixture {
        service,
        store,
        directory,
        notifier,
    }
}

/// Helper to build a service driven by the in-process timer queue
fn setup_timed(config: LiveMatchConfig) -> (Fixture, TimerHandle) {
    let store = Arc::new(MemoryStore::new());
    let directory = Arc::new(InMemoryUserDirectory::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let (service, timer) = LiveMatch::builder(
        store.clone(),
        directory.clone(),
        Arc::new(InMemoryPhotoStorage::new()),
    )
    .notifier(notifier.clone())
    .config(config)
    .spawn();
    let fixture = Fixture {
        service,
        store,
        directory,
        notifier,
    };
    (fixture, timer)
}

/// Helper to register a user with a live profile
async fn onboard(
    fixture: &Fixture,
    user_id: UserId,
    gender: Gender,
    orientation: Orientation,
    age: i32,
) {
    fixture
        .directory
        .insert(UserSummary {
            user_id,
            display_name: format!("user{user_id}"),
            age,
            gender,
            orientation: Some(orientation),
        })
        .await;
    fixture
        .service
        .profiles
        .create_profile(
            user_id,
            &ProfileRequest {
                description: Some(format!("hello from {user_id}")),
            },
        )
        .await
        .expect("Failed to create live profile");
}

/// Helper to open a 30 minute session at a coordinate
async fn start_at(fixture: &Fixture, user_id: UserId, latitude: f64, longitude: f64) -> Session {
    fixture
        .service
        .sessions
        .start(
            user_id,
            &StartSessionRequest {
                duration: 30,
                latitude,
                longitude,
                device: None,
            },
        )
        .await
        .expect("Failed to start session")
}

/// Helper to onboard X and Y as a compatible pair with open sessions
async fn compatible_pair(fixture: &Fixture) -> (Session, Session) {
    onboard(fixture, 1, Gender::Female, Orientation::Straight, 30).await;
    onboard(fixture, 2, Gender::Male, Orientation::Straight, 32).await;
    let x = start_at(fixture, 1, 40.0, -74.0).await;
    let y = start_at(fixture, 2, 40.001, -74.001).await;
    (x, y)
}

async fn run(fixture: &Fixture, session: &Session) -> Option<Match> {
    fixture
        .service
        .matches
        .run_matching(session.user_id, session.id)
        .await
        .expect("Matching run failed")
}

#[tokio::test]
async fn test_end_to_end_match_decline_and_exclusion() {
    let config = LiveMatchConfig {
        settle_delay: Duration::from_millis(30),
        decline_cooldown: Duration::from_millis(100),
        release_delay: Duration::from_millis(10),
        ..Default::default()
    };
    let (fixture, timer) = setup_timed(config);
    let service = fixture.service.clone();

    compatible_pair(&fixture).await;

    // Matched by the settle trigger, no manual run
    let mut matched = None;
    for _ in 0..100 {
        if let CurrentMatch::Matched { match_id, .. } = service.matches.current(1).await.unwrap() {
            matched = Some(match_id);
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let match_id = matched.expect("X and Y were not matched within the settle delay");

    match service.matches.current(2).await.unwrap() {
        CurrentMatch::Matched {
            match_id: seen,
            profile,
            distance_km,
            ..
        } => {
            assert_eq!(seen, match_id);
            assert_eq!(profile.user_id, 1);
            assert_eq!(profile.description.as_deref(), Some("hello from 1"));
            assert!(distance_km < 2.0);
        }
        other => panic!("Y should see the match, got {other:?}"),
    }

    service.matches.decline(1, match_id).await.unwrap();
    assert!(matches!(
        service.matches.current(2).await.unwrap(),
        CurrentMatch::Searching
    ));

    let record = service
        .matches
        .declines()
        .find(1, 2)
        .await
        .unwrap()
        .expect("decline record missing");
    assert_eq!(record.counter, 1);

    // Both re-trigger after the cooldown and stay apart
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(matches!(
        service.matches.current(1).await.unwrap(),
        CurrentMatch::Searching
    ));
    assert!(matches!(
        service.matches.current(2).await.unwrap(),
        CurrentMatch::Searching
    ));

    timer.shutdown().await;
}

#[tokio::test]
async fn test_match_notifies_both_users_and_publishes() {
    let fixture = setup();
    let (x, _y) = compatible_pair(&fixture).await;
    let mut events = fixture.service.events().subscribe();

    let created = run(&fixture, &x).await.expect("expected a match");
    assert_eq!((created.user_a, created.user_b), (1, 2));
    assert!(created.expires_at > created.created_at);

    let sent = fixture.notifier.sent.lock().await;
    let recipients: HashSet<UserId> = sent.iter().map(|(user, _)| *user).collect();
    assert_eq!(recipients, HashSet::from([1, 2]));
    assert!(sent.iter().all(|(_, n)| n.match_id == Some(created.id)));

    let event = events.recv().await.unwrap();
    assert_eq!(event.kind(), "match_created");
    assert!(event.is_for(1) && event.is_for(2));
}

#[tokio::test]
async fn test_already_matched_user_is_not_matched_again() {
    let fixture = setup();
    let (x, y) = compatible_pair(&fixture).await;

    assert!(run(&fixture, &x).await.is_some());
    assert!(run(&fixture, &x).await.is_none());
    assert!(run(&fixture, &y).await.is_none());
}

#[tokio::test]
async fn test_incompatible_preferences_never_match() {
    let fixture = setup();
    onboard(&fixture, 1, Gender::Female, Orientation::Straight, 30).await;
    onboard(&fixture, 2, Gender::Female, Orientation::Straight, 30).await;
    let x = start_at(&fixture, 1, 40.0, -74.0).await;
    start_at(&fixture, 2, 40.0, -74.0).await;

    assert!(run(&fixture, &x).await.is_none());
    assert!(matches!(
        fixture.service.matches.current(1).await.unwrap(),
        CurrentMatch::Searching
    ));
}

#[tokio::test]
async fn test_out_of_range_users_never_match() {
    let fixture = setup();
    onboard(&fixture, 1, Gender::Female, Orientation::Straight, 30).await;
    onboard(&fixture, 2, Gender::Male, Orientation::Straight, 30).await;
    let x = start_at(&fixture, 1, 40.0, -74.0).await;
    // About 111 km north, beyond the 10 km default
    start_at(&fixture, 2, 41.0, -74.0).await;

    assert!(run(&fixture, &x).await.is_none());
}

#[tokio::test]
async fn test_concurrent_matching_at_most_one_live_match_per_user() {
    let fixture = setup();
    let mut sessions = Vec::new();
    for user_id in 1..=6 {
        onboard(&fixture, user_id, Gender::NonBinary, Orientation::Pansexual, 28).await;
        sessions.push(start_at(&fixture, user_id, 40.0, -74.0).await);
    }

    let mut handles = Vec::new();
    for session in sessions {
        let service = fixture.service.clone();
        handles.push(tokio::spawn(async move {
            service
                .matches
                .run_matching(session.user_id, session.id)
                .await
        }));
    }

    let mut seen = HashSet::new();
    let mut created = 0;
    for handle in handles {
        if let Some(m) = handle.await.unwrap().unwrap() {
            created += 1;
            assert!(seen.insert(m.user_a), "user {} matched twice", m.user_a);
            assert!(seen.insert(m.user_b), "user {} matched twice", m.user_b);
        }
    }
    assert!(created >= 1);
    assert!(created <= 3);
}

#[tokio::test]
async fn test_decline_errors() {
    let fixture = setup();
    let (x, _y) = compatible_pair(&fixture).await;
    onboard(&fixture, 3, Gender::Male, Orientation::Straight, 30).await;
    let created = run(&fixture, &x).await.unwrap();

    // Outsider without a session
    let err = fixture.service.matches.decline(3, created.id).await.unwrap_err();
    assert!(matches!(err, MatchError::NoActiveSession));
    assert_eq!(err.code(), "NO_ACTIVE_SESSION");

    // Outsider with a session
    start_at(&fixture, 3, 10.0, 10.0).await;
    let err = fixture.service.matches.decline(3, created.id).await.unwrap_err();
    assert!(matches!(err, MatchError::MatchNotFound));

    // Already declined
    fixture.service.matches.decline(2, created.id).await.unwrap();
    let err = fixture.service.matches.decline(1, created.id).await.unwrap_err();
    assert!(matches!(err, MatchError::MatchNotFound));
    assert_eq!(err.code(), "MATCH_NOT_FOUND");
}

#[tokio::test]
async fn test_decline_wrap_makes_pair_eligible_again() {
    let fixture = setup();
    let (x, y) = compatible_pair(&fixture).await;
    let declines = fixture.service.matches.declines();

    for expected in 1..=2 {
        let record = declines.record_decline(1, 2, x.id).await.unwrap();
        assert_eq!(record.counter, expected);
        assert!(declines.is_excluded(1, 2).await.unwrap());
        assert!(declines.is_excluded(2, 1).await.unwrap());
        assert!(run(&fixture, &x).await.is_none());
        assert!(run(&fixture, &y).await.is_none());
    }

    let record = declines.record_decline(1, 2, x.id).await.unwrap();
    assert_eq!(record.counter, 3);
    assert!(!declines.is_excluded(1, 2).await.unwrap());

    // Eligible again after the third decline
    let created = run(&fixture, &x).await.expect("pair should be matchable again");
    fixture.service.matches.decline(1, created.id).await.unwrap();

    let record = declines.find(1, 2).await.unwrap().unwrap();
    assert_eq!(record.counter, 1);
    // The pair is eligible only while the counter sits at 3. The 4th decline
    // wraps it back to 1, which excludes the pair again rather than keeping
    // it eligible after the wrap.
    assert!(run(&fixture, &x).await.is_none());
}

#[tokio::test]
async fn test_auto_decline_on_behalf_of_candidate() {
    let fixture = setup();
    let (x, _y) = compatible_pair(&fixture).await;
    let created = run(&fixture, &x).await.unwrap();

    let declined = fixture
        .service
        .matches
        .auto_decline(created.id)
        .await
        .unwrap()
        .expect("undecided match should auto-decline");
    assert!(declined.auto_declined);
    assert_eq!(declined.declined_by, Some(created.user_b));

    let record = fixture
        .service
        .matches
        .declines()
        .find(created.user_b, created.user_a)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.counter, 1);

    // Second fire is a no-op
    assert!(
        fixture
            .service
            .matches
            .auto_decline(created.id)
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_accepted_match_is_not_auto_declined() {
    let fixture = setup();
    let (x, _y) = compatible_pair(&fixture).await;
    let created = run(&fixture, &x).await.unwrap();

    let accepted = fixture.service.matches.accept(2, created.id).await.unwrap();
    assert_eq!(accepted.accepted_by, Some(2));
    match fixture.service.matches.current(1).await.unwrap() {
        CurrentMatch::Matched { accepted, .. } => assert!(accepted),
        other => panic!("expected matched, got {other:?}"),
    }

    assert!(
        fixture
            .service
            .matches
            .auto_decline(created.id)
            .await
            .unwrap()
            .is_none()
    );
    let stored = fixture.store.find_match(created.id).await.unwrap().unwrap();
    assert_eq!(stored.declined_by, None);
    assert!(
        fixture
            .service
            .matches
            .declines()
            .find(2, 1)
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_ending_session_releases_partner() {
    let fixture = setup();
    let (x, y) = compatible_pair(&fixture).await;
    let created = run(&fixture, &x).await.unwrap();

    fixture.service.sessions.end(1).await.unwrap();

    assert!(matches!(
        fixture.service.matches.current(1).await.unwrap(),
        CurrentMatch::NoSession
    ));
    assert!(matches!(
        fixture.service.matches.current(2).await.unwrap(),
        CurrentMatch::Searching
    ));

    // The timer for the invalidated match finds nothing to do
    assert!(
        fixture
            .service
            .matches
            .auto_decline(created.id)
            .await
            .unwrap()
            .is_none()
    );
    assert!(run(&fixture, &y).await.is_none());
}

#[tokio::test]
async fn test_nearby_count() {
    let fixture = setup();
    for user_id in 1..=4 {
        onboard(&fixture, user_id, Gender::Male, Orientation::Straight, 30).await;
    }

    let err = fixture.service.matches.nearby(1).await.unwrap_err();
    assert!(matches!(err, MatchError::NoActiveSession));

    start_at(&fixture, 1, 40.0, -74.0).await;
    let alone = fixture.service.matches.nearby(1).await.unwrap();
    assert_eq!(alone.count, 0);
    assert_eq!(alone.max_distance_km, 10.0);

    start_at(&fixture, 2, 40.002, -74.002).await;
    start_at(&fixture, 3, 40.003, -74.0).await;
    // Far outside the default radius
    start_at(&fixture, 4, 45.0, -74.0).await;

    assert_eq!(fixture.service.matches.nearby(1).await.unwrap().count, 2);
}
