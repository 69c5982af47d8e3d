//! Result envelope returned by every API call.
//!
//! # Design
//! An `ApiResponse` is exactly one of Success, Error or Duplicate. The tag is
//! fixed by the constructor and the fields are private, so `is_error()` can
//! never disagree with the outcome.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::http::HttpResponse;

pub const DEFAULT_SUCCESS_MESSAGE: &str = "Successful request.";
pub const DEFAULT_ERROR_MESSAGE: &str = "Error handling request. Please try again later.";
pub const DEFAULT_DUPLICATE_MESSAGE: &str = "Duplicate request suppressed.";

/// Field name to first error message for that field.
pub type ErrorFields = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Error,
    Duplicate,
}

/// Normalized outcome of a network call.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse<T> {
    outcome: Outcome,
    message: String,
    response: Option<HttpResponse>,
    error_fields: ErrorFields,
    obj: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(response: Option<HttpResponse>, message: Option<String>, obj: Option<T>) -> Self {
        Self {
            outcome: Outcome::Success,
            message: message.unwrap_or_else(|| DEFAULT_SUCCESS_MESSAGE.to_string()),
            response,
            error_fields: ErrorFields::new(),
            obj,
        }
    }

    pub fn error(response: Option<HttpResponse>, message: Option<String>, error_fields: ErrorFields) -> Self {
        Self {
            outcome: Outcome::Error,
            message: message.unwrap_or_else(|| DEFAULT_ERROR_MESSAGE.to_string()),
            response,
            error_fields,
            obj: None,
        }
    }

    /// A suppressed call. `response`/`obj` are the previous call's when the
    /// guard serves cached results.
    pub fn duplicate(response: Option<HttpResponse>, obj: Option<T>) -> Self {
        Self {
            outcome: Outcome::Duplicate,
            message: DEFAULT_DUPLICATE_MESSAGE.to_string(),
            response,
            error_fields: ErrorFields::new(),
            obj,
        }
    }

    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    pub fn is_error(&self) -> bool {
        self.outcome != Outcome::Success
    }

    pub fn is_duplicate(&self) -> bool {
        self.outcome == Outcome::Duplicate
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Raw transport response, absent when the transport failed or the call
    /// was dropped as a duplicate.
    pub fn response(&self) -> Option<&HttpResponse> {
        self.response.as_ref()
    }

    pub fn error_fields(&self) -> &ErrorFields {
        &self.error_fields
    }

    pub fn obj(&self) -> Option<&T> {
        self.obj.as_ref()
    }

    pub fn into_obj(self) -> Option<T> {
        self.obj
    }

    pub fn map_obj<U>(self, f: impl FnOnce(T) -> U) -> ApiResponse<U> {
        ApiResponse {
            outcome: self.outcome,
            message: self.message,
            response: self.response,
            error_fields: self.error_fields,
            obj: self.obj.map(f),
        }
    }
}

impl ApiResponse<Value> {
    /// Convert the JSON payload into `U`.
    ///
    /// A payload that does not match `U` turns the envelope into an Error
    /// carrying the serde message; the raw response is kept.
    pub fn deserialize<U: DeserializeOwned>(self) -> ApiResponse<U> {
        let Some(value) = self.obj else {
            return ApiResponse {
                outcome: self.outcome,
                message: self.message,
                response: self.response,
                error_fields: self.error_fields,
                obj: None,
            };
        };
        match serde_json::from_value::<U>(value) {
            Ok(obj) => ApiResponse {
                outcome: self.outcome,
                message: self.message,
                response: self.response,
                error_fields: self.error_fields,
                obj: Some(obj),
            },
            Err(e) => ApiResponse::error(
                self.response,
                Some(format!("unexpected payload: {e}")),
                self.error_fields,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Item {
        id: u32,
    }

    #[test]
    fn error_flag_follows_outcome() {
        let ok: ApiResponse<()> = ApiResponse::success(None, None, None);
        let err: ApiResponse<()> = ApiResponse::error(None, None, ErrorFields::new());
        let dup: ApiResponse<()> = ApiResponse::duplicate(None, None);
        assert!(!ok.is_error());
        assert!(err.is_error());
        assert!(dup.is_error());
        assert!(dup.is_duplicate());
        assert_eq!(ok.message(), DEFAULT_SUCCESS_MESSAGE);
        assert_eq!(err.message(), DEFAULT_ERROR_MESSAGE);
    }

    #[test]
    fn deserialize_typed_payload() {
        let res = ApiResponse::success(None, None, Some(json!([{"id": 1}, {"id": 2}])));
        let typed: ApiResponse<Vec<Item>> = res.deserialize();
        assert_eq!(typed.outcome(), Outcome::Success);
        assert_eq!(typed.obj().unwrap(), &vec![Item { id: 1 }, Item { id: 2 }]);
    }

    #[test]
    fn deserialize_mismatch_becomes_error() {
        let res = ApiResponse::success(None, None, Some(json!({"id": "nope"})));
        let typed: ApiResponse<Item> = res.deserialize();
        assert_eq!(typed.outcome(), Outcome::Error);
        assert!(typed.message().starts_with("unexpected payload"));
        assert!(typed.obj().is_none());
    }

    #[test]
    fn deserialize_keeps_duplicate_tag() {
        let res = ApiResponse::duplicate(None, Some(json!({"id": 3})));
        let typed: ApiResponse<Item> = res.deserialize();
        assert!(typed.is_duplicate());
        assert_eq!(typed.into_obj(), Some(Item { id: 3 }));
    }
}
