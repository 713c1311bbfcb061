//! The process-wide bearer credential.
//!
//! [`CredentialStore`] is the single writer for three copies of the token:
//! the persisted entry, the transport's `Authorization` header and the value
//! observers see. `set` updates all three under one lock before any observer
//! runs, and leaves all three untouched if persisting fails.

use crate::storage::KeyValueStore;
use crate::transport::AuthorizedTransport;
use crate::Error;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub const CREDENTIAL_KEY: &str = "tracery_jwt_token";

/// Receives every credential change, synchronously, after it is applied.
pub trait CredentialObserver: Send + Sync {
    fn credential_changed(&self, credential: Option<&str>);
}

impl<F> CredentialObserver for F
where
    F: Fn(Option<&str>) + Send + Sync,
{
    fn credential_changed(&self, credential: Option<&str>) {
        self(credential);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

pub struct CredentialStore {
    storage: Arc<dyn KeyValueStore>,
    transport: Arc<AuthorizedTransport>,
    token: Mutex<Option<String>>,
    observers: Mutex<Vec<(SubscriptionId, Arc<dyn CredentialObserver>)>>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore")
            .field("present", &self.is_present())
            .field("observers", &self.observers.lock().len())
            .finish_non_exhaustive()
    }
}

impl CredentialStore {
    /// Reads the persisted credential and installs it into `transport`.
    ///
    /// Call this before issuing any request through the transport.
    ///
    /// # Errors
    /// Returns an error if storage cannot be read or the persisted token is
    /// not usable as a header value.
    pub fn load(
        storage: Arc<dyn KeyValueStore>,
        transport: Arc<AuthorizedTransport>,
    ) -> Result<Self, Error> {
        let token = storage.get(CREDENTIAL_KEY)?;
        match &token {
            Some(token) => transport.install_credential(token)?,
            None => transport.remove_credential(),
        }
        tracing::debug!(present = token.is_some(), "credential loaded");
        Ok(Self {
            storage,
            transport,
            token: Mutex::new(token),
            observers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
        })
    }

    #[must_use]
    pub fn get(&self) -> Option<String> {
        self.token.lock().clone()
    }

    #[must_use]
    pub fn is_present(&self) -> bool {
        self.token.lock().is_some()
    }

    #[must_use]
    pub const fn transport(&self) -> &Arc<AuthorizedTransport> {
        &self.transport
    }

    /// Replaces the credential and notifies observers.
    ///
    /// `Some` persists the token and installs it as a bearer header; `None`
    /// erases the persisted entry and removes the header.
    ///
    /// # Errors
    /// Returns an error if the token is not header-safe or storage fails. In
    /// both cases nothing has changed.
    pub fn set(&self, credential: Option<String>) -> Result<(), Error> {
        {
            let mut token = self.token.lock();
            match &credential {
                Some(value) => {
                    let header = AuthorizedTransport::bearer(value)?;
                    self.storage
                        .set(CREDENTIAL_KEY, value)
                        .inspect_err(|err| tracing::warn!(%err, "failed to persist credential"))?;
                    self.transport.install_bearer(header);
                    tracing::info!("credential installed");
                }
                None => {
                    self.storage
                        .remove(CREDENTIAL_KEY)
                        .inspect_err(|err| tracing::warn!(%err, "failed to erase credential"))?;
                    self.transport.remove_credential();
                    tracing::info!("credential cleared");
                }
            }
            *token = credential.clone();
        }
        self.notify(credential.as_deref());
        Ok(())
    }

    /// Registers an observer. It is not called for the current value.
    pub fn subscribe(&self, observer: Arc<dyn CredentialObserver>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.observers.lock().push((id, observer));
        id
    }

    /// Returns `false` if `id` was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut observers = self.observers.lock();
        let before = observers.len();
        observers.retain(|(existing, _)| *existing != id);
        observers.len() != before
    }

    fn notify(&self, credential: Option<&str>) {
        // observers may subscribe or read the store from inside the callback
        let observers: Vec<_> = self
            .observers
            .lock()
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();
        for observer in observers {
            observer.credential_changed(credential);
        }
    }
}
