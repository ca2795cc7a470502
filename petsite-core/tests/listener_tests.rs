//! Session listener behaviour with scripted collaborators
//!
//! The identity provider and profile store are test doubles so failures,
//! slow fetches and event ordering can be driven directly.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use petsite_core::domain::{Identity, NewProfile, Profile, SessionEvent, SessionView};
use petsite_core::ports::{
    AuthError, AuthResult, IdentityProvider, Precondition, ProfileChange, ProfileStore,
    SessionBroadcaster, SessionSubscription,
};
use petsite_core::services::{SessionConsumer, SessionListener, SessionPublisher};
use petsite_core::Error;

/// Provider whose session transitions are pushed by the test
#[derive(Default)]
struct ScriptedProvider {
    broadcaster: SessionBroadcaster,
    current: Mutex<Option<Identity>>,
}

impl ScriptedProvider {
    fn emit(&self, identity: Option<Identity>) {
        *self.current.lock().unwrap() = identity.clone();
        self.broadcaster.publish(identity.into());
    }
}

#[async_trait]
impl IdentityProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn register(&self, _email: &str, _password: &str) -> AuthResult<Identity> {
        Err(AuthError::OperationNotAllowed)
    }

    async fn sign_in(&self, _email: &str, _password: &str) -> AuthResult<Identity> {
        Err(AuthError::Network("offline".to_string()))
    }

    async fn sign_out(&self) -> AuthResult<()> {
        self.emit(None);
        Ok(())
    }

    fn current_identity(&self) -> Option<Identity> {
        self.current.lock().unwrap().clone()
    }

    fn subscribe(&self) -> SessionSubscription {
        self.broadcaster
            .subscribe(|| SessionEvent::from(self.current_identity()))
    }

    async fn send_password_reset(&self, _email: &str) -> AuthResult<()> {
        Ok(())
    }

    async fn confirm_password_reset(&self, _code: &str, _new_password: &str) -> AuthResult<()> {
        Err(AuthError::InvalidActionCode)
    }

    async fn send_email_verification(&self, _identity: &Identity) -> AuthResult<()> {
        Ok(())
    }

    async fn verify_email(&self, _code: &str) -> AuthResult<Identity> {
        Err(AuthError::InvalidActionCode)
    }
}

/// In-memory store that can fail reads or hold them until released
#[derive(Default)]
struct ScriptedStore {
    profiles: Mutex<HashMap<String, Profile>>,
    fail_reads: bool,
    hold_reads: bool,
    read_started: Notify,
    release: Notify,
    reads: AtomicUsize,
}

impl ScriptedStore {
    fn with_profile(profile: Profile) -> Self {
        let store = Self::default();
        store
            .profiles
            .lock()
            .unwrap()
            .insert(profile.id.clone(), profile);
        store
    }
}

#[async_trait]
impl ProfileStore for ScriptedStore {
    async fn get(&self, id: &str) -> petsite_core::domain::result::Result<Option<Profile>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.read_started.notify_one();
        if self.hold_reads {
            self.release.notified().await;
        }
        if self.fail_reads {
            return Err(Error::read("backend unavailable"));
        }
        Ok(self.profiles.lock().unwrap().get(id).cloned())
    }

    async fn set(&self, id: &str, profile: &Profile) -> petsite_core::domain::result::Result<u64> {
        self.profiles
            .lock()
            .unwrap()
            .insert(id.to_string(), profile.clone());
        Ok(1)
    }

    async fn update(
        &self,
        _id: &str,
        _changes: &[ProfileChange],
        _precondition: Precondition,
    ) -> petsite_core::domain::result::Result<u64> {
        Err(Error::write("read-only"))
    }
}

/// Store that tears the listener down from inside a read that completes
/// without ever yielding, so the cancel lands after the fetch select
#[derive(Default)]
struct TeardownStore {
    listener: Mutex<Option<SessionListener>>,
}

#[async_trait]
impl ProfileStore for TeardownStore {
    async fn get(&self, id: &str) -> petsite_core::domain::result::Result<Option<Profile>> {
        drop(self.listener.lock().unwrap().take());
        Ok(Some(Profile::new(id, NewProfile::new("rexfan", "a@b.com"))))
    }

    async fn set(&self, _id: &str, _profile: &Profile) -> petsite_core::domain::result::Result<u64> {
        Ok(1)
    }

    async fn update(
        &self,
        _id: &str,
        _changes: &[ProfileChange],
        _precondition: Precondition,
    ) -> petsite_core::domain::result::Result<u64> {
        Err(Error::write("read-only"))
    }
}

fn identity() -> Identity {
    Identity::new("uid-1", "a@b.com")
}

fn start(
    provider: &Arc<ScriptedProvider>,
    store: &Arc<ScriptedStore>,
) -> (SessionListener, Arc<SessionPublisher>, SessionConsumer) {
    let publisher = Arc::new(SessionPublisher::new());
    let consumer = publisher.subscribe();
    let listener = SessionListener::start(
        provider.clone(),
        store.clone(),
        Arc::clone(&publisher),
        "New User",
    )
    .unwrap();
    (listener, publisher, consumer)
}

async fn wait_until_detached(publisher: &SessionPublisher) {
    tokio::time::timeout(Duration::from_secs(1), async {
        while publisher.is_attached() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("listener task never released the publisher");
}

async fn wait_for_view(
    consumer: &mut SessionConsumer,
    pred: impl Fn(&SessionView) -> bool,
) -> SessionView {
    tokio::time::timeout(Duration::from_secs(1), async {
        loop {
            let view = consumer.current().unwrap();
            if pred(&view) {
                return view;
            }
            consumer.changed().await.unwrap();
        }
    })
    .await
    .expect("session view never reached the expected state")
}

#[tokio::test]
async fn test_no_identity_clears_loading() {
    let provider = Arc::new(ScriptedProvider::default());
    let store = Arc::new(ScriptedStore::default());
    let (_listener, _publisher, mut consumer) = start(&provider, &store);

    let view = consumer.ready().await.unwrap();
    assert!(view.user.is_none());
    assert_eq!(store.reads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_stored_profile_is_merged() {
    let provider = Arc::new(ScriptedProvider::default());
    let store = Arc::new(ScriptedStore::with_profile(Profile::new(
        "uid-1",
        NewProfile::new("rexfan", "a@b.com"),
    )));
    let (_listener, _publisher, mut consumer) = start(&provider, &store);
    consumer.ready().await.unwrap();

    provider.emit(Some(identity()));
    let view = wait_for_view(&mut consumer, |v| !v.loading && v.is_signed_in()).await;
    assert_eq!(view.user.unwrap().username(), "rexfan");
}

#[tokio::test]
async fn test_fallback_prefers_display_name() {
    let provider = Arc::new(ScriptedProvider::default());
    let store = Arc::new(ScriptedStore::default());
    provider.emit(Some(identity().with_display_name("Rex Owner")));

    let (_listener, _publisher, mut consumer) = start(&provider, &store);
    let view = consumer.ready().await.unwrap();
    let user = view.user.unwrap();
    assert_eq!(user.username(), "Rex Owner");
    assert!(!user.profile.is_stored());
}

#[tokio::test]
async fn test_fetch_failure_sets_error_without_retry() {
    let provider = Arc::new(ScriptedProvider::default());
    let store = Arc::new(ScriptedStore {
        fail_reads: true,
        ..ScriptedStore::default()
    });
    provider.emit(Some(identity()));

    let (_listener, _publisher, mut consumer) = start(&provider, &store);
    let view = consumer.ready().await.unwrap();

    assert!(!view.loading);
    assert_eq!(view.error.as_deref(), Some("Read error: backend unavailable"));
    assert_eq!(view.user.unwrap().username(), "New User");
    tokio::task::yield_now().await;
    assert_eq!(store.reads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_user_hidden_while_resolving() {
    let provider = Arc::new(ScriptedProvider::default());
    let store = Arc::new(ScriptedStore {
        hold_reads: true,
        ..ScriptedStore::default()
    });
    provider.emit(Some(identity()));

    let (_listener, publisher, mut consumer) = start(&provider, &store);
    store.read_started.notified().await;

    let view = publisher.current();
    assert!(view.loading);
    assert!(view.user.is_none());

    store.release.notify_one();
    let view = consumer.ready().await.unwrap();
    assert_eq!(view.uid(), Some("uid-1"));
}

#[tokio::test]
async fn test_events_processed_in_order() {
    let provider = Arc::new(ScriptedProvider::default());
    let store = Arc::new(ScriptedStore::default());
    let (_listener, _publisher, mut consumer) = start(&provider, &store);
    consumer.ready().await.unwrap();

    provider.emit(Some(identity()));
    provider.emit(Some(Identity::new("uid-2", "c@d.com")));

    // The later identity wins because events are never reordered
    let view = wait_for_view(&mut consumer, |v| !v.loading && v.uid() == Some("uid-2")).await;
    assert_eq!(view.user.unwrap().profile.email(), "c@d.com");
    assert_eq!(store.reads.load(Ordering::SeqCst), 2);

    provider.emit(None);
    let view = wait_for_view(&mut consumer, |v| !v.loading && !v.is_signed_in()).await;
    assert!(view.error.is_none());
}

#[tokio::test]
async fn test_shutdown_cancels_in_flight_fetch() {
    let provider = Arc::new(ScriptedProvider::default());
    let store = Arc::new(ScriptedStore {
        hold_reads: true,
        ..ScriptedStore::default()
    });
    provider.emit(Some(identity()));

    let (listener, publisher, _consumer) = start(&provider, &store);
    store.read_started.notified().await;
    assert!(publisher.is_attached());

    listener.shutdown().await;
    store.release.notify_one();
    tokio::task::yield_now().await;

    // The cancelled fetch never reaches the view
    let view = publisher.current();
    assert!(view.loading);
    assert!(view.user.is_none());
    assert!(!publisher.is_attached());
    assert_eq!(provider.broadcaster.subscriber_count(), 0);
}

#[tokio::test]
async fn test_dropping_listener_releases_subscription() {
    let provider = Arc::new(ScriptedProvider::default());
    let store = Arc::new(ScriptedStore::default());
    let (listener, publisher, mut consumer) = start(&provider, &store);
    consumer.ready().await.unwrap();
    assert_eq!(provider.broadcaster.subscriber_count(), 1);

    drop(listener);
    wait_until_detached(&publisher).await;
    assert_eq!(provider.broadcaster.subscriber_count(), 0);

    // Transitions after teardown are not applied
    provider.emit(Some(identity()));
    tokio::task::yield_now().await;
    assert!(!publisher.current().is_signed_in());
}

#[tokio::test]
async fn test_consumer_fails_once_publisher_is_gone() {
    let provider = Arc::new(ScriptedProvider::default());
    let store = Arc::new(ScriptedStore::default());
    let (listener, publisher, mut consumer) = start(&provider, &store);
    consumer.ready().await.unwrap();

    listener.shutdown().await;
    drop(publisher);

    let err = consumer.current().unwrap_err();
    assert_eq!(
        err.to_string(),
        "Configuration error: session consumer used outside an active session publisher"
    );
}

#[tokio::test]
async fn test_teardown_after_completed_fetch_is_not_published() {
    let provider = Arc::new(ScriptedProvider::default());
    let store = Arc::new(TeardownStore::default());
    provider.emit(Some(identity()));

    let publisher = Arc::new(SessionPublisher::new());
    let listener = SessionListener::start(
        provider.clone(),
        store.clone(),
        Arc::clone(&publisher),
        "New User",
    )
    .unwrap();
    *store.listener.lock().unwrap() = Some(listener);

    wait_until_detached(&publisher).await;

    // The read finished, but the listener was already gone when it did
    let view = publisher.current();
    assert!(view.loading);
    assert!(view.user.is_none());
    assert_eq!(provider.broadcaster.subscriber_count(), 0);
}

#[tokio::test]
async fn test_publisher_stays_attached_until_task_ends() {
    let provider = Arc::new(ScriptedProvider::default());
    let store = Arc::new(ScriptedStore {
        hold_reads: true,
        ..ScriptedStore::default()
    });
    provider.emit(Some(identity()));

    let (listener, publisher, _consumer) = start(&provider, &store);
    store.read_started.notified().await;

    drop(listener);
    // The aborted task has not been dropped yet, so its slot is still held
    assert!(publisher.is_attached());
    assert!(matches!(publisher.attach(), Err(Error::Config(_))));

    wait_until_detached(&publisher).await;
    publisher.attach().unwrap();
}
