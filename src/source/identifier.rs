//! Book id resolution from a bare id or a book page link. No network access.

use crate::model::ItemId;
use crate::source::SourceError;
use once_cell::sync::Lazy;
use regex::Regex;

static BOOK_PAGE_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"www\.qimao\.com/shuku/(\d+)").expect("book page pattern is valid")
});
static BARE_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)$").expect("bare id pattern is valid"));

/// Resolve user input to a book id. Tries the book page link pattern first, then a bare
/// all-digit string, and returns the first matching digit run.
pub fn resolve_item_id(input: &str) -> Result<ItemId, SourceError> {
    let trimmed = input.trim();
    for pattern in [&*BOOK_PAGE_ID, &*BARE_ID] {
        if let Some(id) = pattern.captures(trimmed).and_then(|c| c.get(1)) {
            return Ok(ItemId::new_unchecked(id.as_str()));
        }
    }
    Err(SourceError::InvalidIdentifier {
        input: input.to_string(),
    })
}
