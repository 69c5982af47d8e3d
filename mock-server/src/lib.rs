//! In-memory `articles` API following Django REST framework conventions.
//!
//! Lists use page-number pagination (`count`/`next`/`previous`/`results`),
//! validation failures use `error_fields` and `non_field_errors`, unknown
//! ids answer 404 with `detail`. Success bodies carry a `message`.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::info;
use uuid::Uuid;

pub const DEFAULT_PAGE_SIZE: usize = 2;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Article {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub published: bool,
}

#[derive(Deserialize)]
pub struct CreateArticle {
    pub title: Option<String>,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub published: bool,
}

#[derive(Deserialize)]
pub struct UpdateArticle {
    pub title: Option<String>,
    pub body: Option<String>,
    pub published: Option<bool>,
}

#[derive(Deserialize)]
pub struct ListParams {
    pub page: Option<usize>,
    pub page_size: Option<usize>,
    pub published: Option<bool>,
}

pub type Db = Arc<RwLock<Vec<Article>>>;

#[derive(Clone)]
pub struct AppState {
    db: Db,
    token: Option<String>,
}

/// Router without authentication.
pub fn app() -> Router {
    router(None)
}

/// Router that requires `Authorization: Token <token>` on every request.
pub fn app_with_token(token: &str) -> Router {
    router(Some(token.to_string()))
}

fn router(token: Option<String>) -> Router {
    let state = AppState {
        db: Arc::new(RwLock::new(Vec::new())),
        token,
    };
    Router::new()
        .route("/api/articles/", get(list_articles).post(create_article))
        .route(
            "/api/articles/{id}/",
            get(get_article).patch(update_article).delete(delete_article),
        )
        .layer(middleware::from_fn_with_state(state.clone(), require_token))
        .with_state(state)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    serve(listener, app()).await
}

pub async fn serve(listener: TcpListener, app: Router) -> Result<(), std::io::Error> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "mock server listening");
    }
    axum::serve(listener, app).await
}

fn error(status: StatusCode, body: Value) -> Response {
    (status, Json(body)).into_response()
}

fn not_found() -> Response {
    error(StatusCode::NOT_FOUND, json!({ "detail": "Not found." }))
}

/// Serialize an article with a `message` alongside its fields.
fn with_message(article: &Article, message: &str) -> Value {
    let mut value = json!(article);
    if let Value::Object(map) = &mut value {
        map.insert("message".to_string(), json!(message));
    }
    value
}

async fn require_token(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let Some(token) = state.token.as_deref() else {
        return next.run(request).await;
    };
    let expected = format!("Token {token}");
    let provided = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    if provided != Some(expected.as_str()) {
        return error(
            StatusCode::UNAUTHORIZED,
            json!({ "detail": "Authentication credentials were not provided." }),
        );
    }
    next.run(request).await
}

fn page_link(host: &str, page: usize, params: &ListParams) -> String {
    let mut query = Vec::new();
    if page > 1 {
        query.push(format!("page={page}"));
    }
    if let Some(size) = params.page_size {
        query.push(format!("page_size={size}"));
    }
    if let Some(published) = params.published {
        query.push(format!("published={published}"));
    }
    let base = format!("http://{host}/api/articles/");
    if query.is_empty() {
        base
    } else {
        format!("{base}?{}", query.join("&"))
    }
}

async fn list_articles(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ListParams>,
) -> Response {
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost")
        .to_string();
    let articles = state.db.read().await;
    let matching: Vec<&Article> = articles
        .iter()
        .filter(|a| params.published.map_or(true, |p| a.published == p))
        .collect();

    let page_size = params.page_size.unwrap_or(DEFAULT_PAGE_SIZE).max(1);
    let page = params.page.unwrap_or(1);
    let count = matching.len();
    let last_page = count.div_ceil(page_size).max(1);
    if page == 0 || page > last_page {
        return error(StatusCode::NOT_FOUND, json!({ "detail": "Invalid page." }));
    }

    let results: Vec<&Article> = matching
        .into_iter()
        .skip((page - 1) * page_size)
        .take(page_size)
        .collect();
    let next = (page < last_page).then(|| page_link(&host, page + 1, &params));
    let previous = (page > 1).then(|| page_link(&host, page - 1, &params));

    Json(json!({
        "count": count,
        "next": next,
        "previous": previous,
        "results": results,
        "message": "Fetched articles.",
    }))
    .into_response()
}

async fn create_article(State(state): State<AppState>, Json(input): Json<CreateArticle>) -> Response {
    let title = input.title.unwrap_or_default();
    if title.trim().is_empty() {
        return error(
            StatusCode::BAD_REQUEST,
            json!({
                "message": "Invalid data.",
                "error_fields": { "title": ["This field is required."] },
            }),
        );
    }

    let mut articles = state.db.write().await;
    if articles.iter().any(|a| a.title == title) {
        return error(
            StatusCode::BAD_REQUEST,
            json!({ "non_field_errors": ["An article with this title already exists."] }),
        );
    }
    let article = Article {
        id: Uuid::new_v4(),
        title,
        body: input.body,
        published: input.published,
    };
    articles.push(article.clone());
    (StatusCode::CREATED, Json(with_message(&article, "Created article."))).into_response()
}

async fn get_article(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    let articles = state.db.read().await;
    match articles.iter().find(|a| a.id == id) {
        Some(article) => Json(with_message(article, "Fetched article.")).into_response(),
        None => not_found(),
    }
}

async fn update_article(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateArticle>,
) -> Response {
    let mut articles = state.db.write().await;
    if let Some(title) = &input.title {
        if title.trim().is_empty() {
            return error(
                StatusCode::BAD_REQUEST,
                json!({
                    "message": "Invalid data.",
                    "error_fields": { "title": ["This field may not be blank."] },
                }),
            );
        }
    }
    let Some(article) = articles.iter_mut().find(|a| a.id == id) else {
        return not_found();
    };
    if let Some(title) = input.title {
        article.title = title;
    }
    if let Some(body) = input.body {
        article.body = body;
    }
    if let Some(published) = input.published {
        article.published = published;
    }
    Json(with_message(article, "Updated article.")).into_response()
}

async fn delete_article(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    let mut articles = state.db.write().await;
    let Some(index) = articles.iter().position(|a| a.id == id) else {
        return not_found();
    };
    articles.remove(index);
    StatusCode::NO_CONTENT.into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(page_size: Option<usize>, published: Option<bool>) -> ListParams {
        ListParams {
            page: None,
            page_size,
            published,
        }
    }

    #[test]
    fn article_serializes_to_json() {
        let article = Article {
            id: Uuid::nil(),
            title: "Test".to_string(),
            body: String::new(),
            published: false,
        };
        let json = serde_json::to_value(&article).unwrap();
        assert_eq!(json["id"], "00000000-0000-0000-0000-000000000000");
        assert_eq!(json["title"], "Test");
        assert_eq!(json["published"], false);
    }

    #[test]
    fn with_message_adds_field() {
        let article = Article {
            id: Uuid::nil(),
            title: "Test".to_string(),
            body: "b".to_string(),
            published: true,
        };
        let value = with_message(&article, "Done.");
        assert_eq!(value["message"], "Done.");
        assert_eq!(value["body"], "b");
    }

    #[test]
    fn create_article_title_is_optional_for_validation() {
        let input: CreateArticle = serde_json::from_str(r#"{"body":"x"}"#).unwrap();
        assert!(input.title.is_none());
        assert!(!input.published);
    }

    #[test]
    fn update_article_all_fields_optional() {
        let input: UpdateArticle = serde_json::from_str(r#"{}"#).unwrap();
        assert!(input.title.is_none());
        assert!(input.body.is_none());
        assert!(input.published.is_none());
    }

    #[test]
    fn first_page_link_has_no_page_param() {
        assert_eq!(
            page_link("h:1", 1, &params(None, None)),
            "http://h:1/api/articles/"
        );
        assert_eq!(
            page_link("h:1", 3, &params(Some(5), Some(true))),
            "http://h:1/api/articles/?page=3&page_size=5&published=true"
        );
    }
}
