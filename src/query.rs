//! Query-string codec for listing locations and API requests.
//!
//! Encoding walks a flat list of `(key, value)` pairs: missing values are
//! dropped, lists become repeated `key=value` pairs in order, and scalars are
//! written in their canonical text form.

use url::form_urlencoded;

#[derive(Debug, Clone, PartialEq)]
pub enum QueryValue {
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
    List(Vec<String>),
}

impl From<bool> for QueryValue {
    fn from(value: bool) -> Self {
        QueryValue::Bool(value)
    }
}

impl From<u32> for QueryValue {
    fn from(value: u32) -> Self {
        QueryValue::Int(i64::from(value))
    }
}

impl From<&str> for QueryValue {
    fn from(value: &str) -> Self {
        QueryValue::Text(value.to_string())
    }
}

impl From<String> for QueryValue {
    fn from(value: String) -> Self {
        QueryValue::Text(value)
    }
}

impl From<Vec<String>> for QueryValue {
    fn from(value: Vec<String>) -> Self {
        QueryValue::List(value)
    }
}

impl<T: Into<QueryValue>> From<Option<T>> for QueryValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(QueryValue::Null)
    }
}

pub fn encode(params: &[(&str, QueryValue)]) -> String {
    let mut out = form_urlencoded::Serializer::new(String::new());
    for (key, value) in params {
        match value {
            QueryValue::Null => {}
            QueryValue::Bool(b) => {
                out.append_pair(key, if *b { "true" } else { "false" });
            }
            QueryValue::Int(n) => {
                out.append_pair(key, &n.to_string());
            }
            QueryValue::Text(s) => {
                out.append_pair(key, s);
            }
            QueryValue::List(items) => {
                for item in items {
                    out.append_pair(key, item);
                }
            }
        }
    }
    out.finish()
}

/// Ordered multimap produced by [`decode`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    pairs: Vec<(String, String)>,
}

impl QueryParams {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn get_all(&self, key: &str) -> Vec<&str> {
        self.pairs
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn remove(&mut self, key: &str) {
        self.pairs.retain(|(k, _)| k != key);
    }

    pub fn append(&mut self, key: &str, value: &str) {
        self.pairs.push((key.to_string(), value.to_string()));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn encode(&self) -> String {
        form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.pairs.iter())
            .finish()
    }
}

/// Parses a query string, with or without its leading `?`.
pub fn decode(query: &str) -> QueryParams {
    let query = query.trim().trim_start_matches('?');
    QueryParams {
        pairs: form_urlencoded::parse(query.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_encode_skips_null_and_repeats_lists() {
        let qs = encode(&[
            ("positionTypes", QueryValue::List(vec!["FRONT".into(), "APP".into()])),
            ("domains", QueryValue::Null),
            ("isActive", true.into()),
            ("order", 1u32.into()),
            ("page", 0u32.into()),
        ]);
        assert_eq!(qs, "positionTypes=FRONT&positionTypes=APP&isActive=true&order=1&page=0");
    }

    #[test]
    fn test_encode_empty_list_writes_nothing() {
        let qs = encode(&[("domains", QueryValue::List(vec![])), ("page", 3u32.into())]);
        assert_eq!(qs, "page=3");
    }

    #[test]
    fn test_encode_escapes_text() {
        let qs = encode(&[("q", "a b&c".into())]);
        assert_eq!(qs, "q=a+b%26c");
        assert_eq!(decode(&qs).get("q"), Some("a b&c"));
    }

    #[test]
    fn test_option_none_is_omitted() {
        let missing: Option<bool> = None;
        assert_eq!(encode(&[("isActive", missing.into())]), "");
    }

    #[test]
    fn test_decode_accepts_leading_question_mark() {
        let params = decode("?positionTypes=BACKEND&positionTypes=DESIGN&order=1");
        assert_eq!(params.get_all("positionTypes"), vec!["BACKEND", "DESIGN"]);
        assert_eq!(params.get("order"), Some("1"));
        assert_eq!(params.get("page"), None);
        assert_eq!(decode("").iter().count(), 0);
    }

    #[test]
    fn test_remove_and_append_keep_foreign_keys() {
        let mut params = decode("tab=bookmarks&page=4");
        params.remove("page");
        params.append("page", "0");
        assert_eq!(params.encode(), "tab=bookmarks&page=0");
    }
}
