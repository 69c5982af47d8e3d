//! Blocking REST client core with Django REST framework conventions.
//!
//! # Overview
//! Every call returns an `ApiResponse` envelope tagged Success, Error or
//! Duplicate instead of a bare `Result`: HTTP error statuses, backend
//! validation errors and transport failures all arrive as Error envelopes
//! with a human-readable message and per-field errors.
//!
//! # Design
//! - `BaseApi` holds the configuration and a `Transport`, builds plain-data
//!   `HttpRequest` values and exposes GET/POST/PATCH/DELETE.
//! - `ResponseHandler` turns whatever the transport produced into an envelope.
//! - `DjangoApi<M>` adds token auth, filter query strings and page-number
//!   pagination bookkeeping.
//! - `DuplicateGuard` suppresses repeats of the same request inside a
//!   configurable window.
//! - The transport is a trait so tests can replay canned responses; the
//!   default one is a blocking ureq agent.

pub mod base;
pub mod config;
pub mod dedupe;
pub mod drf;
pub mod envelope;
pub mod error;
pub mod http;
pub mod query;
pub mod response;
pub mod transport;

pub use base::{BaseApi, Dispatch};
pub use config::{ClientConfig, DedupeConfig, DedupePolicy};
pub use dedupe::{Admission, Clock, DuplicateGuard, ManualClock, SystemClock};
pub use drf::{DjangoApi, PageCursor};
pub use envelope::{ApiResponse, ErrorFields, Outcome};
pub use error::{ApiError, ConfigError};
pub use http::{HttpMethod, HttpRequest, HttpResponse, Transport};
pub use response::ResponseHandler;
pub use transport::UreqTransport;
