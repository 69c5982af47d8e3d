//! Django REST framework conventions on top of `BaseApi`.
//!
//! # Design
//! `DjangoApi<M>` talks to one DRF resource whose items deserialize into `M`.
//! It adds token authentication, filter query strings and page-number
//! pagination. The last list, the last single item and the pagination cursor
//! are kept on the client and replaced by each call, so every method that
//! touches them takes `&mut self`.
//!
//! Duplicate envelopes never modify client state.

use std::collections::HashSet;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::base::BaseApi;
use crate::config::ClientConfig;
use crate::dedupe::DuplicateGuard;
use crate::envelope::{ApiResponse, Outcome};
use crate::error::ApiError;
use crate::http::Transport;
use crate::query::{create_query_string, page_number};

/// Position within a paginated list endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCursor {
    pub count: Option<u64>,
    pub next: Option<String>,
    pub prev: Option<String>,
    pub page_current: u32,
    pub page_total: u32,
}

impl Default for PageCursor {
    fn default() -> Self {
        Self {
            count: None,
            next: None,
            prev: None,
            page_current: 1,
            page_total: 1,
        }
    }
}

impl PageCursor {
    /// Overwrite `count`, `next` and `prev` from a DRF page body. Keys that
    /// are missing or null clear the field.
    fn overwrite(&mut self, body: Option<&Value>) {
        self.count = body.and_then(|b| b.get("count")).and_then(Value::as_u64);
        self.next = link(body, "next");
        self.prev = link(body, "previous");
        self.calculate_page_current();
    }

    /// DRF omits `page` from the link to page 1, so a `previous` link
    /// without it means the current page is 2.
    fn calculate_page_current(&mut self) {
        if let Some(next) = &self.next {
            self.page_current = page_number(next).unwrap_or(2).saturating_sub(1);
        } else if let Some(prev) = &self.prev {
            self.page_current = page_number(prev).unwrap_or(1).saturating_add(1);
        } else {
            self.page_current = 1;
        }
    }

    fn calculate_page_total(&mut self, page_len: usize) {
        if let Some(count) = self.count.filter(|_| page_len > 0) {
            self.page_total = u32::try_from(count.div_ceil(page_len as u64)).unwrap_or(u32::MAX);
        }
    }
}

fn link(body: Option<&Value>, key: &str) -> Option<String> {
    body.and_then(|b| b.get(key))
        .and_then(Value::as_str)
        .filter(|url| !url.is_empty())
        .map(str::to_string)
}

pub struct DjangoApi<M> {
    base: BaseApi,
    cursor: PageCursor,
    list: Vec<M>,
    result: Option<M>,
}

impl<M> std::fmt::Debug for DjangoApi<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DjangoApi")
            .field("base", &self.base)
            .field("cursor", &self.cursor)
            .field("list_len", &self.list.len())
            .finish()
    }
}

impl<M: DeserializeOwned + Clone> DjangoApi<M> {
    pub fn new(config: ClientConfig) -> Result<Self, ApiError> {
        Ok(Self::from_base(BaseApi::new(config)?))
    }

    pub fn with_transport(config: ClientConfig, transport: impl Transport + 'static) -> Self {
        Self::from_base(BaseApi::with_transport(config, transport))
    }

    pub fn from_base(base: BaseApi) -> Self {
        Self {
            base,
            cursor: PageCursor::default(),
            list: Vec::new(),
            result: None,
        }
    }

    pub fn with_guard(mut self, guard: DuplicateGuard) -> Self {
        self.base = self.base.with_guard(guard);
        self
    }

    pub fn base(&self) -> &BaseApi {
        &self.base
    }

    pub fn token(&self) -> Option<&str> {
        self.base.config().token.as_deref()
    }

    pub fn cursor(&self) -> &PageCursor {
        &self.cursor
    }

    pub fn list(&self) -> &[M] {
        &self.list
    }

    pub fn result(&self) -> Option<&M> {
        self.result.as_ref()
    }

    /// `Authorization: Token ...` when a token is configured, then `extra`.
    pub fn auth_headers(&self, extra: &[(String, String)]) -> Vec<(String, String)> {
        let mut headers = Vec::with_capacity(extra.len() + 1);
        if let Some(token) = self.token() {
            headers.push(("Authorization".to_string(), format!("Token {token}")));
        }
        headers.extend_from_slice(extra);
        headers
    }

    /// Resource URL for `id` (or the list URL) with `filters` as query string.
    pub fn url_api<F: Serialize + ?Sized>(&self, id: Option<&str>, filters: &F) -> Result<String, ApiError> {
        let mut url = self.base.url_api(id);
        let query = create_query_string(filters)?;
        if !query.is_empty() {
            url.push('?');
            url.push_str(&query);
        }
        Ok(url)
    }

    /// GET the list endpoint. With `paginated` the body is read as a DRF page
    /// and the cursor, including `page_total`, is recomputed.
    pub fn get_list<F: Serialize + ?Sized>(
        &mut self,
        paginated: bool,
        filters: &F,
        extra: &[(String, String)],
    ) -> Result<ApiResponse<Vec<M>>, ApiError> {
        let url = self.url_api(None, filters)?;
        Ok(self.fetch_list(&url, paginated, extra))
    }

    /// GET a nested list under `id`, e.g. a detail route returning a page.
    pub fn get_retrieve_list<F: Serialize + ?Sized>(
        &mut self,
        id: &str,
        paginated: bool,
        filters: &F,
        extra: &[(String, String)],
    ) -> Result<ApiResponse<Vec<M>>, ApiError> {
        let url = self.url_api(Some(id), filters)?;
        Ok(self.fetch_list(&url, paginated, extra))
    }

    /// GET a single item.
    pub fn get_retrieve<F: Serialize + ?Sized>(
        &mut self,
        id: &str,
        filters: &F,
        extra: &[(String, String)],
    ) -> Result<ApiResponse<M>, ApiError> {
        let url = self.url_api(Some(id), filters)?;
        let headers = self.auth_headers(extra);
        let res: ApiResponse<M> = self.base.http_get(&url, &headers).deserialize();
        if !res.is_duplicate() {
            self.result = res.obj().cloned();
        }
        Ok(res)
    }

    /// Walk every page starting from the first and return all items.
    ///
    /// Stops at the first page that does not succeed and returns its
    /// envelope; `list()` then holds the items gathered so far.
    pub fn get_list_all(&mut self, extra: &[(String, String)]) -> Result<ApiResponse<Vec<M>>, ApiError> {
        let start = self.url_api(None, &())?;
        let first = self.fetch_list(&start, true, extra);
        if first.is_error() {
            return Ok(first);
        }

        let mut items = first.obj().cloned().unwrap_or_default();
        let mut visited = HashSet::from([start]);
        let mut pages = 1;
        let mut last = first;
        while let Some(next) = self.cursor.next.clone() {
            if !visited.insert(next.clone()) {
                warn!(api = %self.base.name(), url = %next, "pagination loop detected");
                break;
            }
            pages += 1;
            let page = self.fetch_page(&next, false, extra);
            if page.is_error() {
                self.list = items;
                return Ok(page);
            }
            items.extend(page.obj().cloned().unwrap_or_default());
            last = page;
        }

        self.cursor.page_total = pages;
        self.list = items.clone();
        let response = last.response().cloned();
        let message = last.message().to_string();
        Ok(ApiResponse::success(response, Some(message), Some(items)))
    }

    /// Follow the cursor's `next` link. `None` when there is no next page.
    pub fn get_next(&mut self, combine: bool, extra: &[(String, String)]) -> Option<ApiResponse<Vec<M>>> {
        let next = self.cursor.next.clone()?;
        Some(self.fetch_page(&next, combine, extra))
    }

    /// Follow the cursor's `previous` link. `None` when there is none.
    pub fn get_prev(&mut self, combine: bool, extra: &[(String, String)]) -> Option<ApiResponse<Vec<M>>> {
        let prev = self.cursor.prev.clone()?;
        Some(self.fetch_page(&prev, combine, extra))
    }

    /// GET a specific page of the list endpoint.
    pub fn get_page(&mut self, page: u32, extra: &[(String, String)]) -> ApiResponse<Vec<M>> {
        let url = format!("{}?page={page}", self.base.url_api(None));
        self.fetch_page(&url, false, extra)
    }

    /// POST a new item.
    pub fn post_create<B: Serialize + ?Sized>(
        &mut self,
        body: &B,
        extra: &[(String, String)],
    ) -> Result<ApiResponse<M>, ApiError> {
        let url = self.base.url_api(None);
        let headers = self.auth_headers(extra);
        let res: ApiResponse<M> = self.base.http_post(&url, body, &headers)?.deserialize();
        if !res.is_duplicate() {
            self.result = res.obj().cloned();
        }
        Ok(res)
    }

    /// PATCH an existing item.
    pub fn patch_update<B: Serialize + ?Sized>(
        &mut self,
        id: &str,
        body: &B,
        extra: &[(String, String)],
    ) -> Result<ApiResponse<M>, ApiError> {
        let url = self.base.url_api(Some(id));
        let headers = self.auth_headers(extra);
        let res: ApiResponse<M> = self.base.http_patch(&url, body, &headers)?.deserialize();
        if !res.is_duplicate() {
            self.result = res.obj().cloned();
        }
        Ok(res)
    }

    /// DELETE an item. The payload, if any, is discarded.
    pub fn delete_item(&mut self, id: &str, extra: &[(String, String)]) -> ApiResponse<()> {
        let url = self.base.url_api(Some(id));
        let headers = self.auth_headers(extra);
        self.base.http_delete(&url, &headers).map_obj(|_| ())
    }

    fn fetch_list(&mut self, url: &str, paginated: bool, extra: &[(String, String)]) -> ApiResponse<Vec<M>> {
        if paginated {
            let res = self.fetch_page(url, false, extra);
            match res.outcome() {
                Outcome::Duplicate => {}
                Outcome::Error => self.cursor.page_total = 1,
                Outcome::Success => self.cursor.calculate_page_total(self.list.len()),
            }
            return res;
        }

        let headers = self.auth_headers(extra);
        let res: ApiResponse<Vec<M>> = self.base.http_get(url, &headers).deserialize();
        if !res.is_duplicate() {
            self.list = res.obj().cloned().unwrap_or_default();
        }
        res
    }

    /// GET one DRF page and fold it into the cursor and list.
    fn fetch_page(&mut self, url: &str, combine: bool, extra: &[(String, String)]) -> ApiResponse<Vec<M>> {
        let headers = self.auth_headers(extra);
        let raw = self.base.http_get(url, &headers);
        if raw.is_duplicate() {
            return raw.deserialize();
        }

        let body = raw.response().and_then(|r| r.json().ok().flatten());
        self.cursor.overwrite(body.as_ref());

        let res: ApiResponse<Vec<M>> = raw.deserialize();
        let page = res.obj().cloned().unwrap_or_default();
        if combine {
            self.list.extend(page);
        } else {
            self.list = page;
        }
        res
    }
}
