//! Remote API access: id resolution, HTTP client, retry policy, archive acquisition,
//! chapter catalog and search.

mod client;
mod error;

pub mod archive;
pub mod catalog;
pub mod identifier;
pub mod retry;
pub mod search;

pub use archive::acquire_archive;
pub use catalog::fetch_catalog;
pub use client::{ApiClient, ApiClientBuilder};
pub use client::{DEFAULT_API_BASE, DEFAULT_DOWNLOAD_TIMEOUT_SECS, DEFAULT_TIMEOUT_SECS};
pub use error::SourceError;
pub use identifier::resolve_item_id;
pub use retry::RetryPolicy;
pub use search::search_books;
