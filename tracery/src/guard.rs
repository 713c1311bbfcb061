//! Per-page access rules re-evaluated on every credential change.

use crate::credential::{CredentialObserver, CredentialStore, SubscriptionId};
use parking_lot::Mutex;
use std::sync::Arc;

pub const AUTHORIZED_LANDING: &str = "/";
pub const UNAUTHORIZED_LANDING: &str = "/auth/login";

/// `authorized: true` means the page needs a credential, `false` means it
/// needs there to be none (login, sign-up).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardPolicy {
    pub authorized: bool,
}

impl GuardPolicy {
    pub const AUTHORIZED: Self = Self { authorized: true };
    pub const UNAUTHORIZED: Self = Self { authorized: false };
}

/// Where to send the user when a policy is violated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Landing {
    /// Target when a credential is present on a page that forbids one
    pub authorized: String,
    /// Target when a credential is missing on a page that needs one
    pub unauthorized: String,
}

impl Default for Landing {
    fn default() -> Self {
        Self {
            authorized: AUTHORIZED_LANDING.to_string(),
            unauthorized: UNAUTHORIZED_LANDING.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardState {
    Allowed,
    Redirecting { target: String },
}

/// Navigation capability provided by the front-end.
pub trait Navigator: Send + Sync {
    fn navigate(&self, route: &str);
}

/// Navigator that only records where it was sent.
#[derive(Debug, Default)]
pub struct NavigationLog {
    routes: Mutex<Vec<String>>,
}

impl NavigationLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn routes(&self) -> Vec<String> {
        self.routes.lock().clone()
    }

    #[must_use]
    pub fn last(&self) -> Option<String> {
        self.routes.lock().last().cloned()
    }
}

impl Navigator for NavigationLog {
    fn navigate(&self, route: &str) {
        self.routes.lock().push(route.to_string());
    }
}

#[must_use]
pub fn evaluate(policy: GuardPolicy, landing: &Landing, has_credential: bool) -> GuardState {
    match (policy.authorized, has_credential) {
        (true, false) => GuardState::Redirecting {
            target: landing.unauthorized.clone(),
        },
        (false, true) => GuardState::Redirecting {
            target: landing.authorized.clone(),
        },
        _ => GuardState::Allowed,
    }
}

pub struct RouteGuard {
    policy: GuardPolicy,
    landing: Landing,
    navigator: Arc<dyn Navigator>,
    state: Mutex<GuardState>,
    /// Credential presence at the last evaluation, `None` before mount
    presence: Mutex<Option<bool>>,
    subscription: Mutex<Option<SubscriptionId>>,
}

impl std::fmt::Debug for RouteGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteGuard")
            .field("policy", &self.policy)
            .field("landing", &self.landing)
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}

impl RouteGuard {
    pub fn new(policy: GuardPolicy, navigator: Arc<dyn Navigator>) -> Self {
        Self {
            policy,
            landing: Landing::default(),
            navigator,
            state: Mutex::new(GuardState::Allowed),
            presence: Mutex::new(None),
            subscription: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn with_landing(mut self, landing: Landing) -> Self {
        self.landing = landing;
        self
    }

    /// Subscribes to `store` and evaluates the current credential.
    ///
    /// Subscribing first means a change racing with the mount is still seen.
    #[must_use]
    pub fn mount(self, store: &CredentialStore) -> Arc<Self> {
        let guard = Arc::new(self);
        let id = store.subscribe(Arc::clone(&guard) as Arc<dyn CredentialObserver>);
        *guard.subscription.lock() = Some(id);
        guard.credential_changed(store.get().as_deref());
        guard
    }

    /// Stops reacting to credential changes.
    pub fn unmount(&self, store: &CredentialStore) {
        if let Some(id) = self.subscription.lock().take() {
            store.unsubscribe(id);
        }
    }

    #[must_use]
    pub const fn policy(&self) -> GuardPolicy {
        self.policy
    }

    #[must_use]
    pub fn state(&self) -> GuardState {
        self.state.lock().clone()
    }

    #[must_use]
    pub fn is_allowed(&self) -> bool {
        *self.state.lock() == GuardState::Allowed
    }
}

impl CredentialObserver for RouteGuard {
    fn credential_changed(&self, credential: Option<&str>) {
        let present = credential.is_some();
        if self.presence.lock().replace(present) == Some(present) {
            return;
        }
        let next = evaluate(self.policy, &self.landing, present);
        *self.state.lock() = next.clone();
        if let GuardState::Redirecting { target } = next {
            tracing::debug!(route = %target, authorized = self.policy.authorized, "redirecting");
            self.navigator.navigate(&target);
        }
    }
}
