//! Classification of decoded response bodies.
//!
//! Every body the server sends, on the success path or the error path, ends
//! up as either a validated domain value or an [`ErrorPayload`]. Nothing else
//! reaches calling code.

use crate::Error;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

pub const UNKNOWN_ERROR_MESSAGE: &str = "unknown error";
pub const UNKNOWN_ERROR_LABEL: &str = "Unknown Error";
pub const UNKNOWN_ERROR_STATUS: i64 = 500;

/// Server messages come either as one sentence or as a list of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
    Text(String),
    Parts(Vec<String>),
}

impl Message {
    /// The message as a single line, parts separated by `", "`.
    #[must_use]
    pub fn joined(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Parts(parts) => parts.join(", "),
        }
    }
}

impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for Message {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Vec<String>> for Message {
    fn from(parts: Vec<String>) -> Self {
        Self::Parts(parts)
    }
}

/// Normalized failure returned by every API call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "camelCase")]
#[error("{}", capitalize_first(&.message.joined()))]
pub struct ErrorPayload {
    pub message: Message,
    pub error: String,
    /// Kept as sent, so `400.0` and `400` stay distinguishable
    pub status_code: Number,
}

impl ErrorPayload {
    pub fn new(
        message: impl Into<Message>,
        error: impl Into<String>,
        status_code: impl Into<Number>,
    ) -> Self {
        Self {
            message: message.into(),
            error: error.into(),
            status_code: status_code.into(),
        }
    }

    /// The canonical payload for failures that carry no usable shape.
    #[must_use]
    pub fn unknown() -> Self {
        Self {
            message: Message::Parts(vec![UNKNOWN_ERROR_MESSAGE.to_string()]),
            error: UNKNOWN_ERROR_LABEL.to_string(),
            status_code: Number::from(UNKNOWN_ERROR_STATUS),
        }
    }

    #[must_use]
    pub fn is_unknown(&self) -> bool {
        *self == Self::unknown()
    }
}

/// Structural check for the error shape: `message` is a string or a list of
/// strings, `error` is a string, `statusCode` is a number.
#[must_use]
pub fn is_error_payload(body: &Value) -> bool {
    let Some(object) = body.as_object() else {
        return false;
    };
    let message = match object.get("message") {
        Some(Value::String(_)) => true,
        Some(Value::Array(parts)) => parts.iter().all(Value::is_string),
        _ => false,
    };
    message
        && object.get("error").is_some_and(Value::is_string)
        && object.get("statusCode").is_some_and(Value::is_number)
}

/// Reads `body` as an [`ErrorPayload`], or returns [`ErrorPayload::unknown`].
///
/// Never fails.
#[must_use]
pub fn into_error_payload(body: &Value) -> ErrorPayload {
    if !is_error_payload(body) {
        return ErrorPayload::unknown();
    }
    ErrorPayload::deserialize(body).unwrap_or_else(|_| ErrorPayload::unknown())
}

/// The payload's message as one sentence with its first letter upper-cased.
#[must_use]
pub fn extract_message(payload: &ErrorPayload) -> String {
    capitalize_first(&payload.message.joined())
}

fn capitalize_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        // line terminators are left alone
        Some(first) if !matches!(first, '\n' | '\r' | '\u{2028}' | '\u{2029}') => {
            first.to_uppercase().chain(chars).collect()
        }
        _ => text.to_string(),
    }
}

/// A success shape with a structural predicate checked before decoding.
///
/// Predicates only look at required fields and their JSON types; the typed
/// decode afterwards does the rest.
pub trait Contract: DeserializeOwned {
    fn matches(body: &Value) -> bool;
}

impl<T: Contract> Contract for Vec<T> {
    fn matches(body: &Value) -> bool {
        body.as_array()
            .is_some_and(|items| items.iter().all(T::matches))
    }
}

/// Turns a decoded 2xx body into `T`, or into an error payload if the body
/// does not satisfy `T`'s contract.
///
/// # Errors
/// Returns the body as an [`ErrorPayload`] (or the unknown error) when it is
/// not a `T`.
pub fn validate<T: Contract>(body: Value) -> Result<T, ErrorPayload> {
    if !T::matches(&body) {
        return Err(into_error_payload(&body));
    }
    serde_json::from_value(body).map_err(|err| {
        tracing::debug!(%err, "body matched contract but did not decode");
        ErrorPayload::unknown()
    })
}

/// The protocol shared by every API function: transport errors and invalid
/// bodies both end as an [`ErrorPayload`].
///
/// # Errors
/// Returns an [`ErrorPayload`] for any transport failure or contract mismatch.
pub fn settle<T: Contract>(result: Result<Value, Error>) -> Result<T, ErrorPayload> {
    result.map_err(ErrorPayload::from).and_then(validate)
}

impl From<Error> for ErrorPayload {
    fn from(err: Error) -> Self {
        match err {
            Error::HttpStatus { status, body, .. } => serde_json::from_str::<Value>(&body)
                .map_or_else(
                    |_| {
                        tracing::debug!(status, "error response without a JSON body");
                        Self::unknown()
                    },
                    |body| into_error_payload(&body),
                ),
            other => {
                tracing::debug!(error = %other, "transport failure");
                Self::unknown()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn recognizes_error_shapes() {
        assert!(is_error_payload(
            &json!({"message": "nope", "error": "Bad Request", "statusCode": 400})
        ));
        assert!(is_error_payload(
            &json!({"message": ["a", "b"], "error": "Bad Request", "statusCode": 400, "extra": 1})
        ));
    }

    #[test]
    fn any_json_number_is_a_status_code() {
        for status in [json!(400.0), json!(400.5), json!(u64::MAX), json!(-1)] {
            let body = json!({"message": "a", "error": "x", "statusCode": status});
            assert!(is_error_payload(&body), "{body}");
            let payload = into_error_payload(&body);
            assert!(!payload.is_unknown(), "{body}");
            assert_eq!(serde_json::to_value(&payload).unwrap(), body);
        }
    }

    #[test]
    fn oversized_status_code_is_kept() {
        let body = json!({"message": "a", "error": "x", "statusCode": u64::MAX});
        let payload = into_error_payload(&body);
        assert_eq!(payload.status_code.as_u64(), Some(u64::MAX));
        assert_eq!(payload.status_code.as_i64(), None);
    }

    #[test]
    fn rejects_other_shapes() {
        for body in [
            Value::Null,
            json!(42),
            json!("message"),
            json!([]),
            json!({}),
            json!({"message": 1, "error": "x", "statusCode": 400}),
            json!({"message": ["a", 2], "error": "x", "statusCode": 400}),
            json!({"message": "a", "error": null, "statusCode": 400}),
            json!({"message": "a", "error": "x", "statusCode": "400"}),
            json!({"message": "a", "error": "x"}),
        ] {
            assert!(!is_error_payload(&body), "{body}");
            assert_eq!(into_error_payload(&body), ErrorPayload::unknown(), "{body}");
        }
    }

    #[test]
    fn into_error_payload_keeps_matching_bodies() {
        let body = json!({"message": ["name is taken"], "error": "Conflict", "statusCode": 409});
        let payload = into_error_payload(&body);
        assert_eq!(
            payload,
            ErrorPayload::new(vec!["name is taken".to_string()], "Conflict", 409)
        );
        assert_eq!(serde_json::to_value(&payload).unwrap(), body);
    }

    #[test]
    fn unknown_payload_is_canonical() {
        let unknown = ErrorPayload::unknown();
        assert_eq!(
            serde_json::to_value(&unknown).unwrap(),
            json!({"message": ["unknown error"], "error": "Unknown Error", "statusCode": 500})
        );
        assert!(unknown.is_unknown());
    }

    #[test]
    fn extract_message_joins_and_capitalizes() {
        let parts = ErrorPayload::new(vec!["a".to_string(), "b".to_string()], "x", 400);
        assert_eq!(extract_message(&parts), "A, b");
        let text = ErrorPayload::new("oops", "x", 400);
        assert_eq!(extract_message(&text), "Oops");
        assert_eq!(extract_message(&ErrorPayload::unknown()), "Unknown error");
    }

    #[test]
    fn extract_message_is_idempotent() {
        for message in ["oops", "Oops", "", "élan vital", "1 thing", "\nnewline"] {
            let once = extract_message(&ErrorPayload::new(message, "x", 400));
            let twice = extract_message(&ErrorPayload::new(once.as_str(), "x", 400));
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn display_matches_extract_message() {
        let payload = ErrorPayload::new(vec!["wrong password".to_string()], "Unauthorized", 401);
        assert_eq!(payload.to_string(), "Wrong password");
    }

    #[test]
    fn status_error_uses_json_body() {
        let err = Error::HttpStatus {
            status: 401,
            reason: "Unauthorized".to_string(),
            body: r#"{"message":"Unauthorized","statusCode":401,"error":"Unauthorized"}"#
                .to_string(),
        };
        assert_eq!(
            ErrorPayload::from(err),
            ErrorPayload::new("Unauthorized", "Unauthorized", 401)
        );
    }

    #[test]
    fn status_error_without_json_is_unknown() {
        let err = Error::HttpStatus {
            status: 502,
            reason: "Bad Gateway".to_string(),
            body: "<html>bad gateway</html>".to_string(),
        };
        assert!(ErrorPayload::from(err).is_unknown());
    }

    #[test]
    fn error_shaped_success_body_becomes_that_error() {
        let body = json!({"message": "gone", "error": "Not Found", "statusCode": 404});
        let result: Result<crate::types::Profile, _> = validate(body);
        assert_eq!(result.unwrap_err().status_code.as_u64(), Some(404));
    }
}
