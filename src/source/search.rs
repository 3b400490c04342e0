//! Keyword search. Returns raw book records; selection is left to the caller.

use crate::source::retry::any_failure;
use crate::source::{ApiClient, RetryPolicy, SourceError};
use serde_json::Value;

/// Search retries twice regardless of the configured budget.
pub const SEARCH_MAX_RETRIES: u32 = 2;

/// Search books by keyword. An absent `data.books` path yields an empty list.
pub fn search_books(
    client: &ApiClient,
    keyword: &str,
    retry: &RetryPolicy,
) -> Result<Vec<Value>, SourceError> {
    let url = client.endpoint("search");
    let policy = retry.with_max_retries(SEARCH_MAX_RETRIES);
    policy.run(any_failure, || {
        let response = client
            .get_query(&url, &[("wd", keyword)])
            .map_err(|e| SourceError::Network {
                url: url.clone(),
                source: e,
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::UnexpectedStatus {
                status: status.as_u16(),
                url: url.clone(),
            });
        }
        let body = response.text().map_err(|e| SourceError::Network {
            url: url.clone(),
            source: e,
        })?;
        parse_search(&body).map_err(|reason| SourceError::Decode {
            url: url.clone(),
            reason,
        })
    })
}

/// Extract `data.books` from a search response body.
pub fn parse_search(body: &str) -> Result<Vec<Value>, String> {
    let value: Value = serde_json::from_str(body).map_err(|e| format!("invalid JSON: {}", e))?;
    Ok(value
        .get("data")
        .and_then(|d| d.get("books"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default())
}

/// One display line for a search hit: `title - author (words words, status)`.
pub fn describe_book(book: &Value) -> String {
    let field = |key: &str, default: &str| match book.get(key) {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => default.to_string(),
    };
    let status = if field("is_over", "0") == "1" {
        "completed"
    } else {
        "ongoing"
    };
    format!(
        "{} - {} ({} words, {})",
        field("original_title", "unknown title"),
        field("author", "unknown author"),
        field("words_num", "unknown"),
        status
    )
}

/// Id of a search hit as a string, if present.
pub fn book_id(book: &Value) -> Option<String> {
    match book.get("id")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_search_returns_books() -> Result<(), String> {
        let books = parse_search(r#"{"data":{"books":[{"id":"1"},{"id":"2"}]}}"#)?;
        assert_eq!(books.len(), 2);
        Ok(())
    }

    #[test]
    fn parse_search_missing_books_is_empty() -> Result<(), String> {
        assert!(parse_search(r#"{"data":{}}"#)?.is_empty());
        assert!(parse_search("{}")?.is_empty());
        Ok(())
    }

    #[test]
    fn describe_book_formats_status() {
        let done = json!({"original_title": "T", "author": "A", "words_num": "12万", "is_over": "1"});
        assert_eq!(describe_book(&done), "T - A (12万 words, completed)");
        let ongoing = json!({"original_title": "T", "words_num": 5000});
        assert_eq!(
            describe_book(&ongoing),
            "T - unknown author (5000 words, ongoing)"
        );
    }

    #[test]
    fn book_id_accepts_string_or_number() {
        assert_eq!(book_id(&json!({"id": "77"})).as_deref(), Some("77"));
        assert_eq!(book_id(&json!({"id": 78})).as_deref(), Some("78"));
        assert_eq!(book_id(&json!({})), None);
    }
}
