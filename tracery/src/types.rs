use crate::contract::Contract;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

// =============================================================================
// PREDICATES - required fields and their JSON types, one helper per shape
// =============================================================================

fn has_number(object: &Map<String, Value>, field: &str) -> bool {
    object.get(field).is_some_and(Value::is_number)
}

fn has_string(object: &Map<String, Value>, field: &str) -> bool {
    object.get(field).is_some_and(Value::is_string)
}

fn has_array(object: &Map<String, Value>, field: &str) -> bool {
    object.get(field).is_some_and(Value::is_array)
}

fn has_identity(object: &Map<String, Value>) -> bool {
    has_number(object, "id")
        && ["nickname", "firstName", "lastName", "email"]
            .iter()
            .all(|field| has_string(object, field))
}

// =============================================================================
// USERS
// =============================================================================

/// A user without nested friend lists.
///
/// Used for friend lists, event participants and search results so that
/// user graphs never nest more than one level deep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: i64,
    pub nickname: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

impl UserSummary {
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

impl Contract for UserSummary {
    fn matches(body: &Value) -> bool {
        body.as_object().is_some_and(has_identity)
    }
}

/// Another user as returned by `/user/info/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub nickname: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub friends: Vec<UserSummary>,
}

impl Contract for User {
    fn matches(body: &Value) -> bool {
        body.as_object()
            .is_some_and(|object| has_identity(object) && has_array(object, "friends"))
    }
}

/// The logged-in user with friends and joined events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: i64,
    pub nickname: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub friends: Vec<UserSummary>,
    pub events: Vec<Event>,
}

impl Profile {
    #[must_use]
    pub fn is_friend(&self, user_id: i64) -> bool {
        self.friends.iter().any(|friend| friend.id == user_id)
    }

    #[must_use]
    pub fn has_joined(&self, event_id: i64) -> bool {
        self.events.iter().any(|event| event.id == event_id)
    }

    /// Splits search results into existing friends and potential friends.
    ///
    /// The profile's own entry is dropped from both lists.
    #[must_use]
    pub fn partition_search<'a>(
        &self,
        users: &'a [UserSummary],
    ) -> (Vec<&'a UserSummary>, Vec<&'a UserSummary>) {
        users
            .iter()
            .filter(|user| user.id != self.id)
            .partition(|user| self.is_friend(user.id))
    }
}

impl Contract for Profile {
    fn matches(body: &Value) -> bool {
        body.as_object().is_some_and(|object| {
            has_identity(object) && has_array(object, "friends") && has_array(object, "events")
        })
    }
}

// =============================================================================
// EVENTS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub location: String,
    /// Date as sent by the server, normally RFC 3339
    pub date: String,
    /// Participants
    pub users: Vec<UserSummary>,
}

impl Event {
    /// Parses `date` as RFC 3339, if it is one.
    #[must_use]
    pub fn parsed_date(&self) -> Option<OffsetDateTime> {
        OffsetDateTime::parse(&self.date, &Rfc3339).ok()
    }
}

impl Contract for Event {
    fn matches(body: &Value) -> bool {
        body.as_object().is_some_and(|object| {
            has_number(object, "id")
                && ["title", "description", "location", "date"]
                    .iter()
                    .all(|field| has_string(object, field))
                && has_array(object, "users")
        })
    }
}

// =============================================================================
// AUTH AND MUTATIONS
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub login: String,
    pub password: String,
}

impl LoginRequest {
    pub fn new(login: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            password: password.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
}

impl Contract for LoginResponse {
    fn matches(body: &Value) -> bool {
        body.as_object()
            .is_some_and(|object| has_string(object, "access_token"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignUpRequest {
    pub nickname: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
}

/// Acknowledgement returned by sign-up and membership changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl Contract for MessageResponse {
    fn matches(body: &Value) -> bool {
        body.as_object()
            .is_some_and(|object| has_string(object, "message"))
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendRequest {
    pub friend_id: i64,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMembership {
    pub event_id: i64,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct SearchQuery<'a> {
    pub page: u32,
    pub search: &'a str,
}
