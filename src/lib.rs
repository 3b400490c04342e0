//! qmfetch: download a Qimao book's encrypted chapter archive, decrypt every chapter and merge
//! them into one text document.

pub mod cli;
pub mod config;
pub mod crypto;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod source;

// Re-exports for CLI and consumers.
pub use crypto::{ChapterCipher, DecryptError, KeyError};
pub use model::{Catalog, ChapterEntry, ItemId, ItemMetadata};
pub use pipeline::{run, FailedFiles, PipelineError, PipelineOptions, RunReport};
pub use source::{resolve_item_id, ApiClient, ApiClientBuilder, RetryPolicy, SourceError};
