//! Parallel chapter decryption. Each extracted payload is an independent unit: read, decrypt,
//! indent, write under its catalog title. A failing unit is recorded and never stops the others.

use crate::crypto::{ChapterCipher, DecryptError};
use crate::model::{Catalog, ChapterFile, DecryptedChapter};
use crate::pipeline::{sanitize_filename, FailedFiles};
use rayon::prelude::*;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use thiserror::Error;
use tracing::{debug, warn};

/// Prefix applied to every line of chapter text.
pub const INDENT: &str = "    ";
const PAYLOAD_EXT: &str = "txt";

/// Why a single chapter unit failed.
#[derive(Debug, Error)]
pub enum ChapterError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Decrypt(#[from] DecryptError),

    #[error("cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One scheduled unit: the payload plus its resolved title and output path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterJob {
    pub file: ChapterFile,
    pub title: String,
    pub output: PathBuf,
}

/// List `<digits>.txt` payloads directly under `dir`, ordered by numeric stem.
pub fn discover_chapter_files(dir: &Path) -> std::io::Result<Vec<ChapterFile>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !entry.file_type()?.is_file() {
            continue;
        }
        let is_payload = path
            .extension()
            .map(|e| e.eq_ignore_ascii_case(PAYLOAD_EXT))
            .unwrap_or(false);
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
        let sort_key = match stem.parse::<u64>() {
            Ok(n) if is_payload && stem.bytes().all(|b| b.is_ascii_digit()) => n,
            _ => {
                debug!(path = %path.display(), "skipping non-chapter file");
                continue;
            }
        };
        files.push(ChapterFile {
            id: stem.to_string(),
            sort_key,
            file_name: entry.file_name().to_string_lossy().into_owned(),
            path,
        });
    }
    files.sort_by_key(|f| f.sort_key);
    Ok(files)
}

/// Resolve titles and output paths for `files`, in order. Chapters whose sanitized titles
/// collide get `_<id>` appended, then a counter if that name is taken too, so that no two
/// units write the same file.
pub fn plan_jobs(files: Vec<ChapterFile>, catalog: &Catalog, out_dir: &Path) -> Vec<ChapterJob> {
    let mut taken = HashSet::new();
    files
        .into_iter()
        .map(|file| {
            let title = catalog.resolve_title(&file.id);
            let base = sanitize_filename(&title);
            let mut name = base.clone();
            if !taken.insert(name.to_lowercase()) {
                name = format!("{}_{}", base, file.id);
                let mut n = 2;
                while !taken.insert(name.to_lowercase()) {
                    name = format!("{}_{}_{}", base, file.id, n);
                    n += 1;
                }
            }
            let output = out_dir.join(format!("{}.{}", name, PAYLOAD_EXT));
            ChapterJob {
                file,
                title,
                output,
            }
        })
        .collect()
}

/// Prefix the text and every line after a newline with [INDENT].
pub fn indent_text(text: &str) -> String {
    format!("{}{}", INDENT, text.replace('\n', &format!("\n{}", INDENT)))
}

/// Run one unit: read, decrypt, indent, write.
pub fn process_chapter(
    job: &ChapterJob,
    cipher: &ChapterCipher,
) -> Result<DecryptedChapter, ChapterError> {
    let payload = std::fs::read_to_string(&job.file.path).map_err(|e| ChapterError::Read {
        path: job.file.path.clone(),
        source: e,
    })?;
    let text = cipher.decrypt_payload(&payload)?;
    std::fs::write(&job.output, indent_text(&text)).map_err(|e| ChapterError::Write {
        path: job.output.clone(),
        source: e,
    })?;
    Ok(DecryptedChapter {
        chapter_id: job.file.id.clone(),
        title: job.title.clone(),
        path: job.output.clone(),
    })
}

/// Decrypt every job on a pool of `workers` threads and wait for all of them.
///
/// Results come back in no particular order. Failed units are appended to `failed` by
/// original file name. `progress` receives (finished, total) after each unit.
pub fn decrypt_chapters(
    jobs: &[ChapterJob],
    cipher: &ChapterCipher,
    failed: &FailedFiles,
    workers: usize,
    progress: Option<&(dyn Fn(u32, u32) + Sync)>,
) -> Result<Vec<DecryptedChapter>, rayon::ThreadPoolBuildError> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .thread_name(|i| format!("decrypt-{}", i))
        .build()?;
    let total = jobs.len() as u32;
    let finished = AtomicU32::new(0);

    let results: Vec<Option<DecryptedChapter>> = pool.install(|| {
        jobs.par_iter()
            .map(|job| {
                let outcome = match process_chapter(job, cipher) {
                    Ok(chapter) => Some(chapter),
                    Err(e) => {
                        warn!(file = %job.file.file_name, error = %e, "chapter failed");
                        failed.push(job.file.file_name.clone());
                        None
                    }
                };
                let n = finished.fetch_add(1, Ordering::Relaxed) + 1;
                if let Some(p) = progress {
                    p(n, total);
                }
                outcome
            })
            .collect()
    });
    Ok(results.into_iter().flatten().collect())
}
