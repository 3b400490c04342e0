//! CLI parsing and orchestration. Parses args, merges config, runs search or the download
//! pipeline, reports the result. Maps errors to exit codes.

use crate::config::{self, Config};
use crate::crypto::ChapterCipher;
use crate::pipeline::{self, PipelineError, PipelineOptions, RunReport, DEFAULT_WORKERS};
use crate::source::search::{book_id, describe_book};
use crate::source::{search_books, ApiClient, RetryPolicy, SourceError};
use clap::Parser;
use once_cell::sync::OnceCell;
use serde_json::Value;
use std::cell::RefCell;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_OUTPUT_DIR: &str = "book";
const SEARCH_LIST_LIMIT: usize = 10;
const FAILED_SAMPLE: usize = 3;

/// CLI error carrying exit code and message.
#[derive(Debug, Error)]
pub enum CliRunError {
    #[error("{0}")]
    InvalidInput(String),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("No chapter could be decrypted ({failed} failed); nothing was written.")]
    NoChapters { failed: usize },
}

impl CliRunError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliRunError::InvalidInput(_)
            | CliRunError::Source(SourceError::InvalidIdentifier { .. })
            | CliRunError::Pipeline(PipelineError::Source(SourceError::InvalidIdentifier {
                ..
            })) => 1,
            CliRunError::Source(_) | CliRunError::Pipeline(PipelineError::Source(_)) => 2,
            CliRunError::Pipeline(_) | CliRunError::NoChapters { .. } => 3,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "qmfetch")]
#[command(about = "Download a book's encrypted chapter archive and merge it into one text file")]
#[command(
    after_help = "Config file keys (output_dir, api_base, user_agent, referer, timeout_secs, download_timeout_secs, retry_count, retry_delay_secs, workers, aes_key) are read from ./qmfetch.toml or the user config dir. CLI flags override config."
)]
pub struct Args {
    /// Book id or book page link, e.g. 1837204 or https://www.qimao.com/shuku/1837204/.
    pub input: Option<String>,

    /// Output directory for the merged text file. Default: ./book.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Search by keyword instead of giving an id. Lists matches unless --pick is set.
    #[arg(long)]
    pub search: Option<String>,

    /// With --search: download the Nth listed match (1-based).
    #[arg(long, requires = "search")]
    pub pick: Option<usize>,

    /// API base URL (overrides config).
    #[arg(long)]
    pub api_base: Option<String>,

    /// Chapter decryption key as 32 hex characters (overrides config).
    #[arg(long)]
    pub key: Option<String>,

    /// Decryption worker threads (overrides config; default 8).
    #[arg(long)]
    pub workers: Option<usize>,

    /// Request timeout in seconds for API calls (overrides config; default 15).
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Retries after a failed request (overrides config; default 3).
    #[arg(long)]
    pub retries: Option<u32>,

    /// HTTP User-Agent (overrides config).
    #[arg(long)]
    pub user_agent: Option<String>,

    /// Suppress progress output (errors only).
    #[arg(short, long)]
    pub quiet: bool,

    /// Debug logging and full error chain.
    #[arg(long)]
    pub verbose: bool,
}

/// Settings after applying CLI flags over config over defaults.
#[derive(Debug)]
struct Settings {
    output_dir: PathBuf,
    workers: usize,
    retry: RetryPolicy,
    cipher: ChapterCipher,
}

fn resolve_settings(args: &Args, config: Option<&Config>) -> Result<Settings, CliRunError> {
    let output_dir = args
        .output
        .clone()
        .or_else(|| config.and_then(|c| c.output_dir.clone()))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR));
    let workers = args
        .workers
        .or_else(|| config.and_then(|c| c.workers))
        .unwrap_or(DEFAULT_WORKERS);
    if workers == 0 {
        return Err(CliRunError::InvalidInput(
            "Worker count must be at least 1.".to_string(),
        ));
    }
    let defaults = RetryPolicy::default();
    let max_retries = args
        .retries
        .or_else(|| config.and_then(|c| c.retry_count))
        .unwrap_or(defaults.max_retries);
    let delay = config
        .and_then(|c| c.retry_delay_secs)
        .map(Duration::from_secs)
        .unwrap_or(defaults.delay);
    let cipher = match args
        .key
        .as_deref()
        .or_else(|| config.and_then(|c| c.aes_key.as_deref()))
    {
        Some(hex) => ChapterCipher::from_hex(hex)
            .map_err(|e| CliRunError::InvalidInput(format!("Invalid decryption key: {}", e)))?,
        None => ChapterCipher::default(),
    };
    Ok(Settings {
        output_dir,
        workers,
        retry: RetryPolicy::new(max_retries, delay),
        cipher,
    })
}

fn build_client(args: &Args, config: Option<&Config>) -> Result<ApiClient, CliRunError> {
    let mut builder = ApiClient::builder();
    if let Some(base) = args
        .api_base
        .clone()
        .or_else(|| config.and_then(|c| c.api_base.clone()))
    {
        builder = builder.base_url(base);
    }
    if let Some(ua) = args
        .user_agent
        .clone()
        .or_else(|| config.and_then(|c| c.user_agent.clone()))
    {
        builder = builder.user_agent(ua);
    }
    if let Some(referer) = config.and_then(|c| c.referer.clone()) {
        builder = builder.referer(referer);
    }
    if let Some(t) = args.timeout.or_else(|| config.and_then(|c| c.timeout_secs)) {
        builder = builder.timeout_secs(t);
    }
    if let Some(t) = config.and_then(|c| c.download_timeout_secs) {
        builder = builder.download_timeout_secs(t);
    }
    builder
        .build()
        .map_err(|e| CliRunError::InvalidInput(format!("Failed to create HTTP client: {}", e)))
}

/// Pick the Nth (1-based) search hit among the listed ones.
fn pick_result(books: &[Value], pick: usize) -> Result<(String, Value), CliRunError> {
    let listed = books.len().min(SEARCH_LIST_LIMIT);
    if pick == 0 || pick > listed {
        return Err(CliRunError::InvalidInput(format!(
            "Invalid --pick {}: choose 1 to {}.",
            pick, listed
        )));
    }
    let record = books[pick - 1].clone();
    let id = book_id(&record).ok_or_else(|| {
        CliRunError::InvalidInput(format!("Search result {} has no book id.", pick))
    })?;
    Ok((id, record))
}

fn print_search_results(books: &[Value]) {
    if books.is_empty() {
        println!("No books found.");
        return;
    }
    println!("Found {} result(s):", books.len());
    for (i, book) in books.iter().take(SEARCH_LIST_LIMIT).enumerate() {
        println!("[{}] {}", i + 1, describe_book(book));
    }
}

fn new_bar(len: u64, template: &str) -> indicatif::ProgressBar {
    let bar = indicatif::ProgressBar::new(len);
    if let Ok(style) = indicatif::ProgressStyle::default_bar().template(template) {
        bar.set_style(style.progress_chars("█▉▊▋▌▍▎▏ "));
    }
    bar
}

fn report_run(report: &RunReport, quiet: bool) -> Result<(), CliRunError> {
    let Some(path) = &report.merged_path else {
        return Err(CliRunError::NoChapters {
            failed: report.failed_files.len(),
        });
    };
    if !quiet {
        eprintln!(
            "Wrote {} ({} of {} chapters)",
            path.display(),
            report.chapters_written,
            report.chapters_written + report.failed_files.len()
        );
    }
    if !report.failed_files.is_empty() {
        eprintln!("Failed files: {}", report.failed_files.len());
        for name in report.failed_files.iter().take(FAILED_SAMPLE) {
            eprintln!("  e.g. {}", name);
        }
    }
    Ok(())
}

/// Entry point for the CLI. Returns Ok(()) on success; Err with exit code and message on failure.
pub fn run(args: &Args) -> Result<(), CliRunError> {
    let config = config::load_config().map_err(CliRunError::InvalidInput)?;
    let settings = resolve_settings(args, config.as_ref())?;
    let client = build_client(args, config.as_ref())?;

    let (input, record) = match &args.search {
        Some(keyword) => {
            let keyword = keyword.trim();
            if keyword.is_empty() {
                return Err(CliRunError::InvalidInput(
                    "Search keyword must not be empty.".to_string(),
                ));
            }
            let books = search_books(&client, keyword, &settings.retry)?;
            match args.pick {
                None => {
                    print_search_results(&books);
                    return Ok(());
                }
                Some(n) => {
                    let (id, record) = pick_result(&books, n)?;
                    (id, Some(record))
                }
            }
        }
        None => match &args.input {
            Some(input) => (input.clone(), None),
            None => {
                return Err(CliRunError::InvalidInput(
                    "Provide a book id or link, or use --search KEYWORD.".to_string(),
                ))
            }
        },
    };

    let download_bar: RefCell<Option<indicatif::ProgressBar>> = RefCell::new(None);
    let on_download = |written: u64, total: Option<u64>| {
        let mut state = download_bar.borrow_mut();
        let bar = state.get_or_insert_with(|| match total {
            Some(len) => new_bar(
                len,
                "Downloading [{bar:40}] {bytes}/{total_bytes} ({elapsed})",
            ),
            None => indicatif::ProgressBar::new_spinner(),
        });
        bar.set_position(written);
    };
    let chapter_bar: OnceCell<indicatif::ProgressBar> = OnceCell::new();
    let on_chapter = |done: u32, total: u32| {
        let bar = chapter_bar
            .get_or_init(|| new_bar(total as u64, "Decrypting  [{bar:40}] {pos}/{len} ({elapsed})"));
        bar.set_position(done as u64);
    };

    let options = PipelineOptions {
        output_dir: settings.output_dir,
        cipher: settings.cipher,
        workers: settings.workers,
        retry: settings.retry,
        record,
        on_download: if args.quiet {
            None
        } else {
            Some(&on_download as &dyn Fn(u64, Option<u64>))
        },
        on_chapter: if args.quiet {
            None
        } else {
            Some(&on_chapter as &(dyn Fn(u32, u32) + Sync))
        },
    };
    let result = pipeline::run(&client, &input, &options);

    if let Some(bar) = download_bar.borrow_mut().take() {
        bar.finish_and_clear();
    }
    if let Some(bar) = chapter_bar.get() {
        bar.finish_and_clear();
    }

    report_run(&result?, args.quiet)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["qmfetch"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn parse_positional_input_and_flags() {
        let a = args(&["123456", "-o", "out", "--workers", "4", "-q"]);
        assert_eq!(a.input.as_deref(), Some("123456"));
        assert_eq!(a.output, Some(PathBuf::from("out")));
        assert_eq!(a.workers, Some(4));
        assert!(a.quiet);
    }

    #[test]
    fn pick_requires_search() {
        assert!(Args::try_parse_from(["qmfetch", "--pick", "1"]).is_err());
        let a = args(&["--search", "dragon", "--pick", "2"]);
        assert_eq!(a.search.as_deref(), Some("dragon"));
        assert_eq!(a.pick, Some(2));
    }

    #[test]
    fn settings_defaults_without_config() -> Result<(), CliRunError> {
        let s = resolve_settings(&args(&["1"]), None)?;
        assert_eq!(s.output_dir, PathBuf::from("book"));
        assert_eq!(s.workers, 8);
        assert_eq!(s.retry, RetryPolicy::default());
        Ok(())
    }

    #[test]
    fn settings_cli_overrides_config() -> Result<(), CliRunError> {
        let config = Config {
            output_dir: Some(PathBuf::from("from-config")),
            workers: Some(2),
            retry_count: Some(5),
            retry_delay_secs: Some(0),
            ..Config::default()
        };
        let s = resolve_settings(&args(&["1", "--workers", "3"]), Some(&config))?;
        assert_eq!(s.output_dir, PathBuf::from("from-config"));
        assert_eq!(s.workers, 3);
        assert_eq!(s.retry, RetryPolicy::new(5, Duration::ZERO));
        Ok(())
    }

    #[test]
    fn settings_reject_bad_key_and_zero_workers() {
        let bad_key = resolve_settings(&args(&["1", "--key", "xyz"]), None);
        assert!(matches!(bad_key, Err(CliRunError::InvalidInput(_))));
        let zero = resolve_settings(&args(&["1", "--workers", "0"]), None);
        assert!(matches!(zero, Err(CliRunError::InvalidInput(_))));
    }

    #[test]
    fn pick_result_bounds() -> Result<(), CliRunError> {
        let books = vec![json!({"id": "11"}), json!({"id": 12}), json!({"title": "x"})];
        let (id, _) = pick_result(&books, 2)?;
        assert_eq!(id, "12");
        assert!(pick_result(&books, 0).is_err());
        assert!(pick_result(&books, 4).is_err());
        assert!(pick_result(&books, 3).is_err());
        Ok(())
    }

    #[test]
    fn report_without_merged_document_is_error() {
        let report = RunReport {
            item_id: "1".into(),
            title: "t".into(),
            merged_path: None,
            chapters_written: 0,
            catalog_len: 2,
            failed_files: vec!["1.txt".into(), "2.txt".into()],
        };
        match report_run(&report, true) {
            Err(e @ CliRunError::NoChapters { failed: 2 }) => assert_eq!(e.exit_code(), 3),
            other => panic!("expected NoChapters, got {:?}", other),
        }
    }

    #[test]
    fn cli_run_error_exit_codes() {
        assert_eq!(CliRunError::InvalidInput("x".into()).exit_code(), 1);
        assert_eq!(
            CliRunError::Pipeline(PipelineError::Source(SourceError::InvalidIdentifier {
                input: "x".into()
            }))
            .exit_code(),
            1
        );
        assert_eq!(
            CliRunError::Source(SourceError::UnexpectedStatus {
                status: 500,
                url: "u".into()
            })
            .exit_code(),
            2
        );
        assert_eq!(
            CliRunError::Pipeline(PipelineError::Source(SourceError::CatalogFetchFailed {
                item_id: "1".into(),
                reason: "r".into()
            }))
            .exit_code(),
            2
        );
        assert_eq!(
            CliRunError::Pipeline(PipelineError::WorkDir {
                source: std::io::Error::other("disk")
            })
            .exit_code(),
            3
        );
    }
}
