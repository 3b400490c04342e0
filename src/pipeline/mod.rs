//! Download-to-document pipeline: resolve id, acquire archive, fetch catalog, decrypt chapters
//! in parallel, merge and clean up. All intermediates live in a temporary working area owned by
//! the run; only the merged document is copied to the output directory.

mod error;

pub mod decrypt;
pub mod merge;

pub use decrypt::{decrypt_chapters, discover_chapter_files, plan_jobs, ChapterError, ChapterJob};
pub use error::PipelineError;
pub use merge::{cleanup_intermediates, merge_chapters, render_header};

use crate::crypto::ChapterCipher;
use crate::model::{Catalog, ItemId, ItemMetadata};
use crate::source::{acquire_archive, fetch_catalog, resolve_item_id, ApiClient, RetryPolicy};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// Default number of decryption workers.
pub const DEFAULT_WORKERS: usize = 8;
const CHAPTERS_DIR: &str = "chapters";
const MERGED_DIR: &str = "merged";
const FORBIDDEN_FILENAME_CHARS: [char; 9] = ['\\', '/', '*', '?', '"', '<', '>', '|', ':'];

/// Replace each character that is invalid in file names on common platforms with `_`.
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| {
            if FORBIDDEN_FILENAME_CHARS.contains(&c) {
                '_'
            } else {
                c
            }
        })
        .collect()
}

/// Append-only list of payload file names whose unit failed. Safe to share across workers.
#[derive(Debug, Default)]
pub struct FailedFiles {
    inner: Mutex<Vec<String>>,
}

impl FailedFiles {
    pub fn push(&self, file_name: String) {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(file_name);
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the names recorded so far, in append order.
    pub fn snapshot(&self) -> Vec<String> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn into_inner(self) -> Vec<String> {
        self.inner
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// State of one run, passed explicitly through the stages. Dropping it removes the working
/// area.
#[derive(Debug)]
pub struct RunContext {
    pub item_id: ItemId,
    pub metadata: ItemMetadata,
    pub catalog: Catalog,
    pub failed: FailedFiles,
    work: TempDir,
}

impl RunContext {
    pub fn new(item_id: ItemId, metadata: ItemMetadata) -> Result<Self, PipelineError> {
        let work = tempfile::Builder::new()
            .prefix("qmfetch-")
            .tempdir()
            .map_err(|e| PipelineError::WorkDir { source: e })?;
        Ok(Self {
            item_id,
            metadata,
            catalog: Catalog::default(),
            failed: FailedFiles::default(),
            work,
        })
    }

    pub fn work_dir(&self) -> &Path {
        self.work.path()
    }

    pub fn chapters_dir(&self) -> PathBuf {
        self.work.path().join(CHAPTERS_DIR)
    }

    pub fn merged_dir(&self) -> PathBuf {
        self.work.path().join(MERGED_DIR)
    }
}

/// Options for a pipeline run: output location, decryption setup, retry policy, the raw book
/// record for the header, and progress callbacks.
pub struct PipelineOptions<'a> {
    pub output_dir: PathBuf,
    pub cipher: ChapterCipher,
    pub workers: usize,
    pub retry: RetryPolicy,
    /// Raw book record (e.g. a search hit). `None` gives default metadata.
    pub record: Option<Value>,
    pub on_download: Option<&'a dyn Fn(u64, Option<u64>)>,
    pub on_chapter: Option<&'a (dyn Fn(u32, u32) + Sync)>,
}

impl PipelineOptions<'_> {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            cipher: ChapterCipher::default(),
            workers: DEFAULT_WORKERS,
            retry: RetryPolicy::default(),
            record: None,
            on_download: None,
            on_chapter: None,
        }
    }
}

/// Outcome of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub item_id: String,
    pub title: String,
    /// Path of the merged document in the output directory; `None` when no chapter decrypted.
    pub merged_path: Option<PathBuf>,
    pub chapters_written: usize,
    pub catalog_len: usize,
    /// Failed payload names, ordered by numeric stem.
    pub failed_files: Vec<String>,
}

/// Run the whole pipeline for `input` (a book id or link).
///
/// Fails before any network access on an invalid id. Acquisition and catalog failures abort
/// the run; chapter failures are reported in [RunReport::failed_files]. The working area is
/// removed on every exit path.
pub fn run(
    client: &ApiClient,
    input: &str,
    options: &PipelineOptions<'_>,
) -> Result<RunReport, PipelineError> {
    let item_id = resolve_item_id(input)?;
    let metadata = match &options.record {
        Some(record) => ItemMetadata::from_record(record, &item_id),
        None => ItemMetadata::unknown(&item_id),
    };
    let mut ctx = RunContext::new(item_id, metadata)?;

    let extract_dir = acquire_archive(
        client,
        &ctx.item_id,
        ctx.work_dir(),
        &options.retry,
        options.on_download,
    )?;

    std::fs::create_dir_all(&options.output_dir).map_err(|e| PipelineError::OutputDir {
        path: options.output_dir.clone(),
        source: e,
    })?;

    info!(title = %ctx.metadata.title, "processing book");
    ctx.catalog = fetch_catalog(client, &ctx.item_id, &options.retry)?;

    let report = decrypt_and_merge(&ctx, &extract_dir, options)?;
    if !report.failed_files.is_empty() {
        warn!(failed = report.failed_files.len(), "some chapters could not be decrypted");
    }
    Ok(report)
}

/// Decrypt the extracted payloads of `ctx` and write the merged document to the output
/// directory.
pub fn decrypt_and_merge(
    ctx: &RunContext,
    extract_dir: &Path,
    options: &PipelineOptions<'_>,
) -> Result<RunReport, PipelineError> {
    let chapters_dir = ctx.chapters_dir();
    std::fs::create_dir_all(&chapters_dir).map_err(|e| PipelineError::WorkDir { source: e })?;

    let files = discover_chapter_files(extract_dir).map_err(|e| PipelineError::Scan {
        path: extract_dir.to_path_buf(),
        source: e,
    })?;
    info!(files = files.len(), workers = options.workers, "decrypting chapters");
    let jobs = plan_jobs(files, &ctx.catalog, &chapters_dir);
    let decrypted = decrypt_chapters(
        &jobs,
        &options.cipher,
        &ctx.failed,
        options.workers,
        options.on_chapter,
    )?;
    let chapters_written = decrypted.len();

    let merged_path = if decrypted.is_empty() {
        None
    } else {
        let merged_dir = ctx.merged_dir();
        let merged = merge_chapters(decrypted, &ctx.metadata, &merged_dir).map_err(|e| {
            PipelineError::Merge {
                path: merged_dir.clone(),
                source: e,
            }
        })?;
        let removed = cleanup_intermediates(&chapters_dir, &merged);
        debug!(removed, "intermediate chapter files removed");

        let dest = options.output_dir.join(merge::merged_file_name(&ctx.metadata));
        std::fs::copy(&merged, &dest).map_err(|e| PipelineError::Copy {
            path: dest.clone(),
            source: e,
        })?;
        info!(path = %dest.display(), "merged document written");
        Some(dest)
    };

    let mut failed_files = ctx.failed.snapshot();
    failed_files.sort_by_key(|name| {
        let stem = name.split('.').next().unwrap_or_default();
        (stem.parse::<u64>().unwrap_or(u64::MAX), name.clone())
    });

    Ok(RunReport {
        item_id: ctx.item_id.to_string(),
        title: ctx.metadata.title.clone(),
        merged_path,
        chapters_written,
        catalog_len: ctx.catalog.len(),
        failed_files,
    })
}
