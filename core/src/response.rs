//! Turns transport results into `ApiResponse` envelopes.
//!
//! # Error precedence
//! For a response with status >= 300 the message is taken from the first of
//! these that is present and non-empty:
//!
//! 1. `non_field_errors` (first element when it is an array)
//! 2. `detail`
//! 3. `message`
//!
//! falling back to the default error message. `error_fields` is always
//! collected, keeping the first message for each field.

use serde_json::{Map, Value};
use tracing::warn;

use crate::envelope::{ApiResponse, ErrorFields};
use crate::error::ApiError;
use crate::http::HttpResponse;

/// Normalizes responses for one named API.
#[derive(Debug, Clone)]
pub struct ResponseHandler {
    name: String,
}

impl ResponseHandler {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }

    pub fn handle(&self, result: Result<HttpResponse, ApiError>) -> ApiResponse<Value> {
        let response = match result {
            Ok(response) => response,
            Err(e) => {
                warn!(api = %self.name, error = %e, "request failed");
                return ApiResponse::error(None, Some(e.to_string()), ErrorFields::new());
            }
        };

        if !response.is_success() {
            return self.handle_error(response);
        }

        let body = match response.json() {
            Ok(body) => body,
            Err(e) => {
                warn!(api = %self.name, status = response.status, error = %e, "unreadable body");
                return ApiResponse::error(Some(response), Some(e.to_string()), ErrorFields::new());
            }
        };

        let Some(body) = body else {
            return ApiResponse::success(Some(response), None, None);
        };
        let message = body
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string);
        let obj = match body.get("results") {
            Some(results) if !results.is_null() => results.clone(),
            _ => body,
        };
        ApiResponse::success(Some(response), message, Some(obj))
    }

    fn handle_error(&self, response: HttpResponse) -> ApiResponse<Value> {
        let data = match response.json() {
            Ok(Some(Value::Object(data))) => data,
            _ => {
                warn!(api = %self.name, status = response.status, "error response without JSON object body");
                return ApiResponse::error(Some(response), None, ErrorFields::new());
            }
        };

        let error_fields = collect_error_fields(&data);
        let message = data
            .get("non_field_errors")
            .and_then(first_message)
            .or_else(|| data.get("detail").and_then(first_message))
            .or_else(|| data.get("message").and_then(first_message));

        warn!(
            api = %self.name,
            status = response.status,
            reason = message.as_deref().unwrap_or_default(),
            "error response"
        );
        ApiResponse::error(Some(response), message, error_fields)
    }
}

/// First non-empty message in a string or array value.
fn first_message(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => return items.first().and_then(first_message),
        Value::Null => return None,
        other => other.to_string(),
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn collect_error_fields(data: &Map<String, Value>) -> ErrorFields {
    let Some(Value::Object(fields)) = data.get("error_fields") else {
        return ErrorFields::new();
    };
    fields
        .iter()
        .filter_map(|(field, value)| first_message(value).map(|msg| (field.clone(), msg)))
        .collect()
}
