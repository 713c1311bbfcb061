use crate::cache::{QueryCache, QueryKey};
use crate::credential::{CredentialObserver, CredentialStore};
use crate::guard::{GuardPolicy, Navigator, RouteGuard};
use crate::search::{DebouncedSearch, SearchOutcome};
use crate::storage::KeyValueStore;
use crate::types::{
    Event, LoginRequest, LoginResponse, MessageResponse, Profile, SignUpRequest, User, UserSummary,
};
use crate::{AuthorizedTransport, Error, ErrorPayload, TraceryClient};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Everything a front-end needs: credential, typed calls and cached reads.
///
/// Reads go through the [`QueryCache`]. Friend and event mutations mark the
/// profile and user reads stale once acknowledged. Any credential change
/// empties the cache.
#[derive(Debug)]
pub struct Session {
    client: TraceryClient,
    credentials: Arc<CredentialStore>,
    cache: Arc<QueryCache>,
    user_search: DebouncedSearch<Arc<Vec<UserSummary>>>,
    event_search: DebouncedSearch<Arc<Vec<Event>>>,
}

impl Session {
    /// Loads the persisted credential into `transport` and wires the cache
    /// to credential changes.
    ///
    /// # Errors
    /// Returns an error if the persisted credential cannot be read or installed.
    pub fn open(
        transport: Arc<AuthorizedTransport>,
        storage: Arc<dyn KeyValueStore>,
    ) -> Result<Self, Error> {
        let credentials = Arc::new(CredentialStore::load(storage, Arc::clone(&transport))?);
        let cache = Arc::new(QueryCache::new());
        credentials.subscribe(Arc::clone(&cache) as Arc<dyn CredentialObserver>);
        Ok(Self {
            client: TraceryClient::new(transport),
            credentials,
            cache,
            user_search: DebouncedSearch::default(),
            event_search: DebouncedSearch::default(),
        })
    }

    /// Sets the quiet period used by the search-as-you-type helpers.
    #[must_use]
    pub fn with_search_debounce(mut self, quiet: Duration) -> Self {
        self.user_search = DebouncedSearch::new(quiet);
        self.event_search = DebouncedSearch::new(quiet);
        self
    }

    #[must_use]
    pub const fn client(&self) -> &TraceryClient {
        &self.client
    }

    #[must_use]
    pub const fn credentials(&self) -> &Arc<CredentialStore> {
        &self.credentials
    }

    #[must_use]
    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    #[must_use]
    pub fn is_logged_in(&self) -> bool {
        self.credentials.is_present()
    }

    /// Mounts a guard for a page with the given policy.
    #[must_use]
    pub fn guard(&self, policy: GuardPolicy, navigator: Arc<dyn Navigator>) -> Arc<RouteGuard> {
        RouteGuard::new(policy, navigator).mount(&self.credentials)
    }

    // -------------------------------------------------------------------------
    // authentication
    // -------------------------------------------------------------------------

    /// Logs in and installs the returned token.
    ///
    /// # Errors
    /// Returns an [`ErrorPayload`] if the login is rejected or the token
    /// cannot be stored.
    pub async fn login(&self, request: &LoginRequest) -> Result<LoginResponse, ErrorPayload> {
        let response = self.client.login(request).await?;
        self.credentials
            .set(Some(response.access_token.clone()))
            .map_err(ErrorPayload::from)?;
        Ok(response)
    }

    /// Registers an account without logging in.
    ///
    /// # Errors
    /// Returns an [`ErrorPayload`] if the sign-up is rejected.
    pub async fn sign_up(&self, request: &SignUpRequest) -> Result<MessageResponse, ErrorPayload> {
        self.client.sign_up(request).await
    }

    /// Registers an account, then logs in with its nickname and password.
    ///
    /// # Errors
    /// Returns an [`ErrorPayload`] from whichever step failed.
    pub async fn sign_up_and_login(
        &self,
        request: &SignUpRequest,
    ) -> Result<LoginResponse, ErrorPayload> {
        self.sign_up(request).await?;
        let login = LoginRequest::new(request.nickname.as_str(), request.password.as_str());
        self.login(&login).await
    }

    /// Forgets the credential.
    ///
    /// # Errors
    /// Returns an [`ErrorPayload`] if the persisted token cannot be erased.
    pub fn logout(&self) -> Result<(), ErrorPayload> {
        self.credentials.set(None).map_err(ErrorPayload::from)
    }

    // -------------------------------------------------------------------------
    // cached reads
    // -------------------------------------------------------------------------

    /// # Errors
    /// Returns an [`ErrorPayload`] if the profile cannot be fetched.
    pub async fn profile(&self) -> Result<Arc<Profile>, ErrorPayload> {
        self.cache
            .fetch(QueryKey::ProfileInfo, || self.client.get_profile())
            .await
    }

    /// # Errors
    /// Returns an [`ErrorPayload`] if the user cannot be fetched.
    pub async fn user(&self, id: i64) -> Result<Arc<User>, ErrorPayload> {
        self.cache
            .fetch(QueryKey::UserInfo(id), || self.client.get_user(id))
            .await
    }

    /// # Errors
    /// Returns an [`ErrorPayload`] if the event cannot be fetched.
    pub async fn event(&self, id: i64) -> Result<Arc<Event>, ErrorPayload> {
        self.cache
            .fetch(QueryKey::EventInfo(id), || self.client.get_event(id))
            .await
    }

    /// # Errors
    /// Returns an [`ErrorPayload`] if the search fails.
    pub async fn search_users(
        &self,
        page: u32,
        search: &str,
    ) -> Result<Arc<Vec<UserSummary>>, ErrorPayload> {
        let key = QueryKey::PotentialFriends {
            page,
            search: search.to_string(),
        };
        self.cache
            .fetch(key, || self.client.search_users(page, search))
            .await
    }

    /// # Errors
    /// Returns an [`ErrorPayload`] if the search fails.
    pub async fn search_events(
        &self,
        page: u32,
        search: &str,
    ) -> Result<Arc<Vec<Event>>, ErrorPayload> {
        let key = QueryKey::EventsSearch {
            page,
            search: search.to_string(),
        };
        self.cache
            .fetch(key, || self.client.search_events(page, search))
            .await
    }

    // -------------------------------------------------------------------------
    // search as you type
    // -------------------------------------------------------------------------

    /// Feeds one keystroke of the friend search box. Always searches page 1.
    pub async fn type_user_search(&self, search: String) -> SearchOutcome {
        self.user_search
            .input(search, |search| async move {
                self.search_users(1, &search).await
            })
            .await
    }

    #[must_use]
    pub const fn user_search(&self) -> &DebouncedSearch<Arc<Vec<UserSummary>>> {
        &self.user_search
    }

    /// Feeds one keystroke of the event search box. Always searches page 1.
    pub async fn type_event_search(&self, search: String) -> SearchOutcome {
        self.event_search
            .input(search, |search| async move {
                self.search_events(1, &search).await
            })
            .await
    }

    #[must_use]
    pub const fn event_search(&self) -> &DebouncedSearch<Arc<Vec<Event>>> {
        &self.event_search
    }

    // -------------------------------------------------------------------------
    // mutations
    // -------------------------------------------------------------------------

    async fn mutate<Fut>(&self, mutation: Fut) -> Result<MessageResponse, ErrorPayload>
    where
        Fut: Future<Output = Result<MessageResponse, ErrorPayload>>,
    {
        let acknowledged = mutation.await?;
        self.cache.invalidate_mutation_dependents();
        Ok(acknowledged)
    }

    /// # Errors
    /// Returns an [`ErrorPayload`] if the server rejects the change.
    pub async fn add_friend(&self, friend_id: i64) -> Result<MessageResponse, ErrorPayload> {
        self.mutate(self.client.add_friend(friend_id)).await
    }

    /// # Errors
    /// Returns an [`ErrorPayload`] if the server rejects the change.
    pub async fn remove_friend(&self, friend_id: i64) -> Result<MessageResponse, ErrorPayload> {
        self.mutate(self.client.remove_friend(friend_id)).await
    }

    /// # Errors
    /// Returns an [`ErrorPayload`] if the server rejects the change.
    pub async fn add_event(&self, event_id: i64) -> Result<MessageResponse, ErrorPayload> {
        self.mutate(self.client.add_event(event_id)).await
    }

    /// # Errors
    /// Returns an [`ErrorPayload`] if the server rejects the change.
    pub async fn remove_event(&self, event_id: i64) -> Result<MessageResponse, ErrorPayload> {
        self.mutate(self.client.remove_event(event_id)).await
    }
}
