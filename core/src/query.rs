//! Query-string construction and inspection.

use serde::Serialize;
use serde_json::Value;
use url::form_urlencoded;
use url::Url;

use crate::error::ApiError;

/// Build `key=value&key=value` from a filter object.
///
/// `filters` must serialize to a JSON object (a struct or a map). Keys come
/// out sorted, `null` becomes an empty value and arrays are joined with `,`.
/// Keys and values are form-url-encoded.
pub fn create_query_string<F: Serialize + ?Sized>(filters: &F) -> Result<String, ApiError> {
    let value = serde_json::to_value(filters).map_err(|e| ApiError::Serialization(e.to_string()))?;
    let map = match value {
        Value::Object(map) => map,
        Value::Null => return Ok(String::new()),
        other => {
            return Err(ApiError::Serialization(format!(
                "filters must be an object, got {other}"
            )))
        }
    };

    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (key, value) in map.iter().filter(|(key, _)| !key.is_empty()) {
        serializer.append_pair(key, &query_value(value));
    }
    Ok(serializer.finish())
}

fn query_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(query_value).collect::<Vec<_>>().join(","),
        other => other.to_string(),
    }
}

/// Value of `key` in the query of `url`, if any.
pub fn query_param(url: &str, key: &str) -> Option<String> {
    let url = Url::parse(url).ok()?;
    url.query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

/// The `page` query parameter of a pagination link.
pub fn page_number(url: &str) -> Option<u32> {
    query_param(url, "page")?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;
    use std::collections::BTreeMap;

    #[derive(Serialize)]
    struct ArticleFilters {
        published: bool,
        author: Option<String>,
        tags: Vec<&'static str>,
    }

    #[test]
    fn struct_filters_become_pairs() {
        let filters = ArticleFilters {
            published: true,
            author: None,
            tags: vec!["rust", "http"],
        };
        let qs = create_query_string(&filters).unwrap();
        assert_eq!(qs, "author=&published=true&tags=rust%2Chttp");
    }

    #[test]
    fn values_are_encoded() {
        let mut filters = BTreeMap::new();
        filters.insert("search", "a b&c");
        assert_eq!(create_query_string(&filters).unwrap(), "search=a+b%26c");
    }

    #[test]
    fn empty_keys_are_skipped() {
        let mut filters = BTreeMap::new();
        filters.insert("", "x");
        filters.insert("page_size", "10");
        assert_eq!(create_query_string(&filters).unwrap(), "page_size=10");
    }

    #[test]
    fn unit_filters_are_empty() {
        assert_eq!(create_query_string(&()).unwrap(), "");
    }

    #[test]
    fn non_object_filters_are_rejected() {
        let err = create_query_string(&[1, 2]).unwrap_err();
        assert!(matches!(err, ApiError::Serialization(_)));
    }

    #[test]
    fn page_number_reads_page_param() {
        assert_eq!(page_number("http://x/api/a/?page=3&page_size=2"), Some(3));
        assert_eq!(page_number("http://x/api/a/?page_size=2"), None);
        assert_eq!(page_number("http://x/api/a/?page=last"), None);
        assert_eq!(page_number("not a url"), None);
    }

    #[test]
    fn query_param_decodes() {
        assert_eq!(
            query_param("http://x/?q=a+b%26c", "q").as_deref(),
            Some("a b&c")
        );
    }
}
