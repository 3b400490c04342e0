//! Chapter catalog: fetch the chapter list for a book and order it by sort key.

use crate::model::{Catalog, ChapterEntry, ItemId};
use crate::source::retry::any_failure;
use crate::source::{ApiClient, RetryPolicy, SourceError};
use serde_json::Value;
use tracing::info;

/// Parse a chapter list response body (`{data:{chapters:[...]}}`) into a catalog.
pub fn parse_catalog(body: &str) -> Result<Catalog, String> {
    let value: Value = serde_json::from_str(body).map_err(|e| format!("invalid JSON: {}", e))?;
    let chapters = value
        .get("data")
        .and_then(|d| d.get("chapters"))
        .ok_or_else(|| "response has no data.chapters".to_string())?;
    let entries: Vec<ChapterEntry> = serde_json::from_value(chapters.clone())
        .map_err(|e| format!("invalid chapter entry: {}", e))?;
    Ok(Catalog::from_entries(entries))
}

/// Fetch and build the catalog. Every failure is retried under `retry`; the last one
/// surfaces as `CatalogFetchFailed`.
pub fn fetch_catalog(
    client: &ApiClient,
    item_id: &ItemId,
    retry: &RetryPolicy,
) -> Result<Catalog, SourceError> {
    let url = client.endpoint(&format!("book/{}/chapters", item_id));
    let failed = |reason: String| SourceError::CatalogFetchFailed {
        item_id: item_id.to_string(),
        reason,
    };
    let catalog = retry.run(any_failure, || {
        let response = client
            .get(&url)
            .map_err(|e| failed(format!("could not reach {}: {}", url, e)))?;
        let status = response.status();
        if !status.is_success() {
            return Err(failed(format!("HTTP {} from {}", status.as_u16(), url)));
        }
        let body = response
            .text()
            .map_err(|e| failed(format!("failed to read body: {}", e)))?;
        parse_catalog(&body).map_err(failed)
    })?;
    info!(item_id = %item_id, chapters = catalog.len(), "chapter catalog fetched");
    Ok(catalog)
}
