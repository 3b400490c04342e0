//! Shared error type for the network-facing stages: identifier resolution, link resolution,
//! archive download/extraction, catalog and search.

use std::path::PathBuf;
use thiserror::Error;

/// Error from any stage that talks to the remote API or handles the downloaded archive.
#[derive(Debug, Error)]
pub enum SourceError {
    // Input
    #[error("Invalid book id or link: '{input}'. Enter a numeric id or a https://www.qimao.com/shuku/<id> link.")]
    InvalidIdentifier { input: String },

    // HTTP and network
    #[error("Network error: could not reach {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("Redirect from {url} carried no usable Location header")]
    MissingLocation { url: String },

    // Stage failures
    #[error("Download of book {item_id} failed: {source}")]
    DownloadFailed {
        item_id: String,
        #[source]
        source: Box<SourceError>,
    },

    #[error("Could not fetch chapter catalog for book {item_id}: {reason}")]
    CatalogFetchFailed { item_id: String, reason: String },

    // Local I/O and decoding
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not extract archive {path}: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("Could not decode response from {url}: {reason}")]
    Decode { url: String, reason: String },
}

impl SourceError {
    /// True for transport-level failures (timeouts, refused connections, broken bodies).
    pub fn is_transport(&self) -> bool {
        matches!(self, SourceError::Network { .. })
    }
}
