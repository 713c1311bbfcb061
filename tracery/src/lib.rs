pub mod cache;
pub mod contract;
pub mod credential;
pub mod forms;
pub mod guard;
pub mod search;
mod session;
pub mod storage;
pub mod transport;
pub mod types;

pub use crate::contract::{extract_message, into_error_payload, is_error_payload, ErrorPayload};
pub use crate::credential::CredentialStore;
pub use crate::session::Session;
pub use crate::transport::AuthorizedTransport;

use crate::contract::Contract;
use crate::types::{
    Event, EventMembership, FriendRequest, LoginRequest, LoginResponse, MessageResponse, Profile,
    SearchQuery, SignUpRequest, User, UserSummary,
};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("HTTP status {status} {reason}")]
    HttpStatus {
        status: u16,
        reason: String,
        body: String,
    },
    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),
    #[error("credential is not a valid bearer header value")]
    InvalidCredential,
}

mod routes {
    pub const LOGIN: &str = "/auth/login";
    pub const SIGN_UP: &str = "/auth/sign-up";
    pub const PROFILE_INFO: &str = "/profile";
    pub const USER_INFO: &str = "/user/info";
    pub const SEARCH_FRIENDS: &str = "/user/friends";
    pub const ADD_FRIEND: &str = "/user/add-friend";
    pub const REMOVE_FRIEND: &str = "/user/remove-friend";
    pub const EVENTS: &str = "/event";
    pub const ADD_EVENT: &str = "/event/add";
    pub const REMOVE_EVENT: &str = "/event/remove";
}

/// Typed access to every Tracery endpoint.
///
/// Each call goes through the shared [`AuthorizedTransport`], so whatever
/// credential is installed there at dispatch time is attached. Failures of
/// any kind come back as an [`ErrorPayload`].
#[derive(Debug, Clone)]
pub struct TraceryClient {
    transport: Arc<AuthorizedTransport>,
}

impl TraceryClient {
    async fn get<T, Q>(&self, endpoint: &str, query: &Q) -> Result<T, ErrorPayload>
    where
        T: Contract,
        Q: Serialize + ?Sized,
    {
        contract::settle(self.transport.get(endpoint, query).await)
    }

    async fn post<T, B>(&self, endpoint: &str, body: &B) -> Result<T, ErrorPayload>
    where
        T: Contract,
        B: Serialize + ?Sized,
    {
        contract::settle(self.transport.post(endpoint, body).await)
    }

    async fn delete<T, B>(&self, endpoint: &str, body: &B) -> Result<T, ErrorPayload>
    where
        T: Contract,
        B: Serialize + ?Sized,
    {
        contract::settle(self.transport.delete(endpoint, body).await)
    }

    /// Creates a client over a shared transport.
    #[must_use]
    pub const fn new(transport: Arc<AuthorizedTransport>) -> Self {
        Self { transport }
    }

    #[must_use]
    pub const fn transport(&self) -> &Arc<AuthorizedTransport> {
        &self.transport
    }

    /// Exchanges a login and password for an access token.
    ///
    /// The token is only returned here; installing it is up to the caller
    /// (see [`Session::login`]).
    ///
    /// # Errors
    /// Returns an [`ErrorPayload`] if the request fails or the body is not a
    /// login response.
    pub async fn login(&self, credentials: &LoginRequest) -> Result<LoginResponse, ErrorPayload> {
        self.post(routes::LOGIN, credentials).await
    }

    /// Registers a new account.
    ///
    /// # Errors
    /// Returns an [`ErrorPayload`] if the request fails or the body carries no message.
    pub async fn sign_up(&self, account: &SignUpRequest) -> Result<MessageResponse, ErrorPayload> {
        self.post(routes::SIGN_UP, account).await
    }

    /// Retrieves the profile of the logged-in user.
    ///
    /// # Errors
    /// Returns an [`ErrorPayload`] if the request fails or the body is not a profile.
    pub async fn get_profile(&self) -> Result<Profile, ErrorPayload> {
        self.get(routes::PROFILE_INFO, &()).await
    }

    /// Retrieves another user by id.
    ///
    /// # Errors
    /// Returns an [`ErrorPayload`] if the request fails or the body is not a user.
    pub async fn get_user(&self, id: i64) -> Result<User, ErrorPayload> {
        let endpoint = format!("{}/{id}", routes::USER_INFO);
        self.get(&endpoint, &()).await
    }

    /// Retrieves a single event with its participants.
    ///
    /// # Errors
    /// Returns an [`ErrorPayload`] if the request fails or the body is not an event.
    pub async fn get_event(&self, id: i64) -> Result<Event, ErrorPayload> {
        let endpoint = format!("{}/{id}", routes::EVENTS);
        self.get(&endpoint, &()).await
    }

    /// Searches users that could be added as friends.
    ///
    /// # Arguments
    /// * `page` - Page number, 1-indexed
    /// * `search` - Free-text filter, may be empty
    ///
    /// # Errors
    /// Returns an [`ErrorPayload`] if the request fails or the body is not a list of users.
    pub async fn search_users(
        &self,
        page: u32,
        search: &str,
    ) -> Result<Vec<UserSummary>, ErrorPayload> {
        let query = SearchQuery { page, search };
        self.get(routes::SEARCH_FRIENDS, &query).await
    }

    /// Searches events.
    ///
    /// # Arguments
    /// * `page` - Page number, 1-indexed
    /// * `search` - Free-text filter, may be empty
    ///
    /// # Errors
    /// Returns an [`ErrorPayload`] if the request fails or the body is not a list of events.
    pub async fn search_events(&self, page: u32, search: &str) -> Result<Vec<Event>, ErrorPayload> {
        let query = SearchQuery { page, search };
        self.get(routes::EVENTS, &query).await
    }

    /// Adds a user to the friend list.
    ///
    /// # Errors
    /// Returns an [`ErrorPayload`] if the request fails or the body carries no message.
    pub async fn add_friend(&self, friend_id: i64) -> Result<MessageResponse, ErrorPayload> {
        self.post(routes::ADD_FRIEND, &FriendRequest { friend_id })
            .await
    }

    /// Removes a user from the friend list.
    ///
    /// # Errors
    /// Returns an [`ErrorPayload`] if the request fails or the body carries no message.
    pub async fn remove_friend(&self, friend_id: i64) -> Result<MessageResponse, ErrorPayload> {
        self.delete(routes::REMOVE_FRIEND, &FriendRequest { friend_id })
            .await
    }

    /// Joins an event.
    ///
    /// # Errors
    /// Returns an [`ErrorPayload`] if the request fails or the body carries no message.
    pub async fn add_event(&self, event_id: i64) -> Result<MessageResponse, ErrorPayload> {
        self.post(routes::ADD_EVENT, &EventMembership { event_id })
            .await
    }

    /// Leaves an event.
    ///
    /// # Errors
    /// Returns an [`ErrorPayload`] if the request fails or the body carries no message.
    pub async fn remove_event(&self, event_id: i64) -> Result<MessageResponse, ErrorPayload> {
        self.delete(routes::REMOVE_EVENT, &EventMembership { event_id })
            .await
    }
}
