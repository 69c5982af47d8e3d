//! Generic REST API wrapper.
//!
//! # Design
//! `BaseApi` owns the connection settings and a `Transport`, builds
//! `HttpRequest` values for GET/POST/PATCH/DELETE and runs them through the
//! duplicate guard. It knows nothing about any backend's conventions; the
//! `drf` layer adds those on top.

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::config::ClientConfig;
use crate::dedupe::{Admission, DuplicateGuard};
use crate::envelope::ApiResponse;
use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse, Transport};
use crate::response::ResponseHandler;
use crate::transport::UreqTransport;

/// Result of handing a request to `BaseApi::send`.
#[derive(Debug)]
pub enum Dispatch {
    /// The request reached the transport.
    Sent(Result<HttpResponse, ApiError>),
    /// The guard suppressed the request; carries the cached response, if any.
    Duplicate(Option<HttpResponse>),
}

pub struct BaseApi {
    config: ClientConfig,
    transport: Box<dyn Transport>,
    guard: DuplicateGuard,
    handler: ResponseHandler,
}

impl std::fmt::Debug for BaseApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BaseApi")
            .field("config", &self.config)
            .field("guard", &self.guard)
            .finish()
    }
}

impl BaseApi {
    /// Validate `config` and connect through a ureq transport.
    pub fn new(config: ClientConfig) -> Result<Self, ApiError> {
        config.validate()?;
        let transport = UreqTransport::new(config.timeout());
        Ok(Self::with_transport(config, transport))
    }

    pub fn with_transport(config: ClientConfig, transport: impl Transport + 'static) -> Self {
        let guard = DuplicateGuard::new(config.dedupe.clone());
        let handler = ResponseHandler::new(&config.name);
        Self {
            config,
            transport: Box::new(transport),
            guard,
            handler,
        }
    }

    /// Replace the duplicate guard, e.g. with one shared by several clients.
    pub fn with_guard(mut self, guard: DuplicateGuard) -> Self {
        self.guard = guard;
        self
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn guard(&self) -> &DuplicateGuard {
        &self.guard
    }

    pub fn handler(&self) -> &ResponseHandler {
        &self.handler
    }

    /// `{base}/api/{endpoint}/`, or `{base}/api/{endpoint}/{slug}/` when
    /// `slug` is non-empty.
    pub fn url_api(&self, slug: Option<&str>) -> String {
        match slug {
            Some(slug) if !slug.is_empty() => {
                format!("{}/api/{}/{slug}/", self.config.base_url, self.config.endpoint)
            }
            _ => format!("{}/api/{}/", self.config.base_url, self.config.endpoint),
        }
    }

    /// Headers sent with every request.
    pub fn default_headers(&self) -> Vec<(String, String)> {
        let mut headers = vec![("Content-Type".to_string(), "application/json".to_string())];
        if let Some(csrf) = self.config.csrf_token.as_deref().filter(|t| !t.is_empty()) {
            headers.push(("X-CSRFToken".to_string(), csrf.to_string()));
        }
        headers
    }

    /// Build a request, merging `headers` over the defaults. A header given
    /// in `headers` replaces a default of the same name.
    pub fn build_request(
        &self,
        method: HttpMethod,
        url: &str,
        body: Option<String>,
        headers: &[(String, String)],
    ) -> HttpRequest {
        let mut merged = self.default_headers();
        for (name, value) in headers {
            merged.retain(|(existing, _)| !existing.eq_ignore_ascii_case(name));
            merged.push((name.clone(), value.clone()));
        }
        HttpRequest {
            method,
            url: url.to_string(),
            headers: merged,
            body,
        }
    }

    /// Run `request` through the duplicate guard and the transport.
    pub fn send(&self, request: &HttpRequest) -> Dispatch {
        let key = request.key();
        match self.guard.admit(&key) {
            Admission::Proceed => {}
            Admission::Drop => return Dispatch::Duplicate(None),
            Admission::Cached(response) => return Dispatch::Duplicate(response),
        }

        debug!(api = %self.config.name, method = %request.method, url = %request.url, "sending request");
        let result = self.transport.execute(request);
        if let Ok(response) = &result {
            debug!(api = %self.config.name, status = response.status, "received response");
        }
        self.guard.record(&key, result.as_ref().ok());
        Dispatch::Sent(result)
    }

    /// Send `request` and normalize the outcome into an envelope.
    pub fn request(&self, request: &HttpRequest) -> ApiResponse<Value> {
        match self.send(request) {
            Dispatch::Sent(result) => self.handler.handle(result),
            Dispatch::Duplicate(None) => ApiResponse::duplicate(None, None),
            Dispatch::Duplicate(Some(cached)) => {
                let normalized = self.handler.handle(Ok(cached.clone()));
                ApiResponse::duplicate(Some(cached), normalized.into_obj())
            }
        }
    }

    pub fn http_get(&self, url: &str, headers: &[(String, String)]) -> ApiResponse<Value> {
        self.request(&self.build_request(HttpMethod::Get, url, None, headers))
    }

    pub fn http_post<B: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &B,
        headers: &[(String, String)],
    ) -> Result<ApiResponse<Value>, ApiError> {
        let body = to_body(body)?;
        Ok(self.request(&self.build_request(HttpMethod::Post, url, Some(body), headers)))
    }

    pub fn http_patch<B: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &B,
        headers: &[(String, String)],
    ) -> Result<ApiResponse<Value>, ApiError> {
        let body = to_body(body)?;
        Ok(self.request(&self.build_request(HttpMethod::Patch, url, Some(body), headers)))
    }

    /// POST a pre-encoded body, e.g. multipart form data. Pass the matching
    /// `Content-Type` in `headers`; it replaces the JSON default.
    pub fn http_post_raw(&self, url: &str, body: String, headers: &[(String, String)]) -> ApiResponse<Value> {
        self.request(&self.build_request(HttpMethod::Post, url, Some(body), headers))
    }

    pub fn http_patch_raw(&self, url: &str, body: String, headers: &[(String, String)]) -> ApiResponse<Value> {
        self.request(&self.build_request(HttpMethod::Patch, url, Some(body), headers))
    }

    pub fn http_delete(&self, url: &str, headers: &[(String, String)]) -> ApiResponse<Value> {
        self.request(&self.build_request(HttpMethod::Delete, url, None, headers))
    }
}

fn to_body<B: Serialize + ?Sized>(body: &B) -> Result<String, ApiError> {
    serde_json::to_string(body).map_err(|e| ApiError::Serialization(e.to_string()))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::{DedupeConfig, DedupePolicy};
    use crate::dedupe::ManualClock;
    use crate::envelope::Outcome;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Transport that replays canned responses and records what it was sent.
    #[derive(Clone, Default)]
    pub(crate) struct FakeTransport {
        pub(crate) sent: Arc<Mutex<Vec<HttpRequest>>>,
        pub(crate) replies: Arc<Mutex<VecDeque<Result<HttpResponse, ApiError>>>>,
    }

    impl FakeTransport {
        pub(crate) fn reply(&self, status: u16, body: &str) {
            self.replies.lock().unwrap().push_back(Ok(HttpResponse {
                status,
                headers: Vec::new(),
                body: body.to_string(),
            }));
        }

        pub(crate) fn fail(&self, error: ApiError) {
            self.replies.lock().unwrap().push_back(Err(error));
        }

        pub(crate) fn sent_urls(&self) -> Vec<String> {
            self.sent.lock().unwrap().iter().map(|r| r.url.clone()).collect()
        }
    }

    impl Transport for FakeTransport {
        fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, ApiError> {
            self.sent.lock().unwrap().push(request.clone());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ApiError::Transport("no canned reply".to_string())))
        }
    }

    fn config() -> ClientConfig {
        ClientConfig::new("articles", "http://localhost:8000/", "articles")
    }

    #[test]
    fn url_api_with_and_without_slug() {
        let api = BaseApi::with_transport(config(), FakeTransport::default());
        assert_eq!(api.url_api(None), "http://localhost:8000/api/articles/");
        assert_eq!(api.url_api(Some("")), "http://localhost:8000/api/articles/");
        assert_eq!(api.url_api(Some("42")), "http://localhost:8000/api/articles/42/");
    }

    #[test]
    fn default_headers_include_csrf() {
        let api = BaseApi::with_transport(config().with_csrf_token("abc"), FakeTransport::default());
        assert_eq!(
            api.default_headers(),
            vec![
                ("Content-Type".to_string(), "application/json".to_string()),
                ("X-CSRFToken".to_string(), "abc".to_string()),
            ]
        );
    }

    #[test]
    fn extra_headers_override_defaults() {
        let api = BaseApi::with_transport(config(), FakeTransport::default());
        let req = api.build_request(
            HttpMethod::Get,
            "http://x/",
            None,
            &[("content-type".to_string(), "text/plain".to_string())],
        );
        assert_eq!(req.headers, vec![("content-type".to_string(), "text/plain".to_string())]);
    }

    #[test]
    fn post_serializes_body() {
        let transport = FakeTransport::default();
        transport.reply(201, r#"{"id":1,"title":"Hello"}"#);
        let api = BaseApi::with_transport(config(), transport.clone());
        let res = api
            .http_post(&api.url_api(None), &json!({"title": "Hello"}), &[])
            .unwrap();
        assert_eq!(res.outcome(), Outcome::Success);
        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent[0].method, HttpMethod::Post);
        assert_eq!(sent[0].body.as_deref(), Some(r#"{"title":"Hello"}"#));
    }

    #[test]
    fn transport_error_becomes_error_envelope() {
        let transport = FakeTransport::default();
        transport.fail(ApiError::Transport("connection refused".to_string()));
        let api = BaseApi::with_transport(config(), transport);
        let res = api.http_get("http://localhost:8000/api/articles/", &[]);
        assert_eq!(res.outcome(), Outcome::Error);
        assert!(res.message().contains("connection refused"));
    }

    fn deduped(policy: DedupePolicy, transport: FakeTransport) -> (BaseApi, ManualClock) {
        let clock = ManualClock::new();
        let dedupe = DedupeConfig::new(policy, Duration::from_millis(500));
        let guard = DuplicateGuard::with_clock(dedupe.clone(), Arc::new(clock.clone()));
        let api = BaseApi::with_transport(config().with_dedupe(dedupe), transport).with_guard(guard);
        (api, clock)
    }

    #[test]
    fn drop_policy_skips_transport() {
        let transport = FakeTransport::default();
        transport.reply(200, r#"{"id":1}"#);
        let (api, _) = deduped(DedupePolicy::Drop, transport.clone());
        let url = api.url_api(Some("1"));

        let first = api.http_get(&url, &[]);
        let second = api.http_get(&url, &[]);
        assert_eq!(first.outcome(), Outcome::Success);
        assert_eq!(second.outcome(), Outcome::Duplicate);
        assert!(second.obj().is_none());
        assert_eq!(transport.sent.lock().unwrap().len(), 1);
    }

    #[test]
    fn cached_policy_replays_payload() {
        let transport = FakeTransport::default();
        transport.reply(200, r#"{"id":1}"#);
        let (api, _) = deduped(DedupePolicy::Cached, transport.clone());
        let url = api.url_api(Some("1"));

        api.http_get(&url, &[]);
        let second = api.http_get(&url, &[]);
        assert!(second.is_duplicate());
        assert_eq!(second.obj(), Some(&json!({"id": 1})));
        assert_eq!(transport.sent.lock().unwrap().len(), 1);
    }

    #[test]
    fn requests_outside_window_are_sent() {
        let transport = FakeTransport::default();
        transport.reply(200, "{}");
        transport.reply(200, "{}");
        let (api, clock) = deduped(DedupePolicy::Drop, transport.clone());
        let url = api.url_api(None);

        api.http_get(&url, &[]);
        clock.advance(Duration::from_millis(600));
        let second = api.http_get(&url, &[]);
        assert_eq!(second.outcome(), Outcome::Success);
        assert_eq!(transport.sent.lock().unwrap().len(), 2);
    }

    #[test]
    fn methods_are_deduplicated_separately() {
        let transport = FakeTransport::default();
        transport.reply(200, "{}");
        transport.reply(204, "");
        let (api, _) = deduped(DedupePolicy::Drop, transport.clone());
        let url = api.url_api(Some("1"));

        api.http_get(&url, &[]);
        let res = api.http_delete(&url, &[]);
        assert_eq!(res.outcome(), Outcome::Success);
        assert_eq!(transport.sent_urls().len(), 2);
    }

    #[test]
    fn shared_guard_spans_clients_on_other_threads() {
        let transport = FakeTransport::default();
        transport.reply(200, "{}");
        transport.reply(200, "{}");
        let (first, _) = deduped(DedupePolicy::Drop, transport.clone());
        let second = BaseApi::with_transport(config(), transport.clone()).with_guard(first.guard().clone());
        let url = first.url_api(None);

        let url_a = url.clone();
        let sent = std::thread::spawn(move || first.http_get(&url_a, &[]).outcome())
            .join()
            .unwrap();
        let suppressed = std::thread::spawn(move || second.http_get(&url, &[]).outcome())
            .join()
            .unwrap();

        assert_eq!(sent, Outcome::Success);
        assert_eq!(suppressed, Outcome::Duplicate);
        assert_eq!(transport.sent.lock().unwrap().len(), 1);
    }

    #[test]
    fn raw_body_is_sent_verbatim() {
        let transport = FakeTransport::default();
        transport.reply(201, r#"{"id":1}"#);
        let api = BaseApi::with_transport(config(), transport.clone());
        let body = "--b\r\nContent-Disposition: form-data; name=\"title\"\r\n\r\nHello\r\n--b--\r\n";
        let headers = [("Content-Type".to_string(), "multipart/form-data; boundary=b".to_string())];

        let res = api.http_post_raw(&api.url_api(None), body.to_string(), &headers);
        assert_eq!(res.outcome(), Outcome::Success);
        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent[0].body.as_deref(), Some(body));
        assert_eq!(sent[0].headers, headers.to_vec());
    }
}
