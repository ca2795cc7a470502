//! Session publisher, consumers and the listener that drives them
//!
//! The publisher is the single holder of the [`SessionView`]. It only
//! changes through [`SessionPublisher::dispatch`], which runs the reducer and
//! broadcasts the result over a `watch` channel. The listener turns the
//! identity provider's session stream into dispatched messages, fetching the
//! profile for every active identity.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::oneshot::error::TryRecvError;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

use crate::domain::result::{Error, Result};
use crate::domain::session::reduce;
use crate::domain::{SessionEvent, SessionMessage, SessionView};
use crate::ports::{IdentityProvider, ProfileStore, SessionSubscription};

fn outside_publisher() -> Error {
    Error::config("session consumer used outside an active session publisher")
}

/// Process-wide holder of the session view
#[derive(Debug)]
pub struct SessionPublisher {
    sender: watch::Sender<SessionView>,
    attached: AtomicBool,
}

impl Default for SessionPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionPublisher {
    /// Start in the initial `{ loading: true, user: None }` state
    pub fn new() -> Self {
        let (sender, _) = watch::channel(SessionView::initial());
        Self {
            sender,
            attached: AtomicBool::new(false),
        }
    }

    /// Apply a message through the reducer and notify consumers
    pub fn dispatch(&self, message: SessionMessage) {
        self.sender.send_modify(|view| {
            *view = reduce(view, message);
        });
    }

    /// Snapshot of the current view
    pub fn current(&self) -> SessionView {
        self.sender.borrow().clone()
    }

    pub fn subscribe(&self) -> SessionConsumer {
        SessionConsumer {
            receiver: self.sender.subscribe(),
        }
    }

    /// Reserve the publisher for one listener
    pub fn attach(&self) -> Result<()> {
        self.attached
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| Error::config("a session listener is already attached"))
    }

    pub fn detach(&self) {
        self.attached.store(false, Ordering::Release);
    }

    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::Acquire)
    }
}

/// Read handle on the session view
///
/// Every method fails with a configuration error once the publisher is gone.
#[derive(Debug, Clone)]
pub struct SessionConsumer {
    receiver: watch::Receiver<SessionView>,
}

impl SessionConsumer {
    /// The latest view
    pub fn current(&self) -> Result<SessionView> {
        self.receiver.has_changed().map_err(|_| outside_publisher())?;
        Ok(self.receiver.borrow().clone())
    }

    /// Wait for the next view change
    pub async fn changed(&mut self) -> Result<SessionView> {
        self.receiver.has_changed().map_err(|_| outside_publisher())?;
        self.receiver
            .changed()
            .await
            .map_err(|_| outside_publisher())?;
        Ok(self.receiver.borrow_and_update().clone())
    }

    /// Wait until resolution has finished (`loading == false`)
    pub async fn ready(&mut self) -> Result<SessionView> {
        self.receiver.has_changed().map_err(|_| outside_publisher())?;
        let view = self
            .receiver
            .wait_for(|view| !view.loading)
            .await
            .map_err(|_| outside_publisher())?;
        Ok(view.clone())
    }
}

/// Holds the publisher's single-listener slot for the lifetime of the task
struct Attachment(Arc<SessionPublisher>);

impl Drop for Attachment {
    fn drop(&mut self) {
        self.0.detach();
    }
}

/// Bridges the identity provider's session stream into the publisher
///
/// One task processes provider events strictly in order. [`shutdown`]
/// cancels an in-flight profile fetch (its result is never published),
/// releases the provider subscription and detaches from the publisher once
/// the task has ended. Dropping the listener does the same without waiting
/// for the task.
///
/// [`shutdown`]: SessionListener::shutdown
pub struct SessionListener {
    cancel: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl SessionListener {
    /// Attach to the publisher, subscribe to the provider and spawn the task
    ///
    /// Must be called inside a tokio runtime.
    pub fn start(
        provider: Arc<dyn IdentityProvider>,
        store: Arc<dyn ProfileStore>,
        publisher: Arc<SessionPublisher>,
        fallback_username: impl Into<String>,
    ) -> Result<Self> {
        publisher.attach()?;
        let attachment = Attachment(publisher);

        let subscription = provider.subscribe();
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let handle = tokio::spawn(listen(
            subscription,
            store,
            attachment,
            fallback_username.into(),
            cancel_rx,
        ));
        tracing::debug!(provider = provider.name(), "session listener started");

        Ok(Self {
            cancel: Some(cancel_tx),
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the listener and wait for its task to finish
    pub async fn shutdown(mut self) {
        self.cancel_task();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "session listener task ended abnormally");
            }
        }
    }

    fn cancel_task(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
    }
}

impl Drop for SessionListener {
    fn drop(&mut self) {
        self.cancel_task();
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
        tracing::debug!("session listener stopped");
    }
}

async fn listen(
    mut subscription: SessionSubscription,
    store: Arc<dyn ProfileStore>,
    attachment: Attachment,
    fallback_username: String,
    mut cancel: oneshot::Receiver<()>,
) {
    let publisher = &attachment.0;
    loop {
        let event = tokio::select! {
            biased;
            _ = &mut cancel => break,
            event = subscription.next() => match event {
                Some(event) => event,
                None => break,
            },
        };

        let identity = match event {
            SessionEvent::NoIdentity => {
                publisher.dispatch(SessionMessage::SignedOut);
                continue;
            }
            SessionEvent::ActiveIdentity(identity) => identity,
        };

        publisher.dispatch(SessionMessage::Resolving(identity.clone()));

        let fetched = tokio::select! {
            biased;
            _ = &mut cancel => break,
            fetched = store.get(&identity.id) => fetched,
        };

        let message = match fetched {
            Ok(profile) => {
                if profile.is_none() {
                    tracing::info!(identity_id = %identity.id, "no profile stored, using fallback");
                }
                SessionMessage::Resolved {
                    identity,
                    profile,
                    fallback_username: fallback_username.clone(),
                }
            }
            Err(e) => {
                tracing::warn!(identity_id = %identity.id, error = %e, "profile fetch failed");
                SessionMessage::ResolveFailed {
                    identity,
                    error: e.to_string(),
                    fallback_username: fallback_username.clone(),
                }
            }
        };

        // Shutdown may land after the fetch completed but before dispatch
        if !matches!(cancel.try_recv(), Err(TryRecvError::Empty)) {
            break;
        }
        publisher.dispatch(message);
    }

    subscription.unsubscribe();
}
