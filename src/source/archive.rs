//! Archive acquisition: resolve the redirect-based download link, stream the archive to disk,
//! extract it into the working area.

use crate::model::ItemId;
use crate::source::{ApiClient, RetryPolicy, SourceError};
use reqwest::header::LOCATION;
use reqwest::{StatusCode, Url};
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const CHUNK_SIZE: usize = 8192;
const EXTRACT_DIR: &str = "extracted";

/// Resolve the archive link for a book: the endpoint answers with a redirect whose
/// `Location` is the archive URL. Transport failures are retried; any status other than
/// 301/302/303/307/308 fails with `UnexpectedStatus` at once.
pub fn resolve_download_link(
    client: &ApiClient,
    item_id: &ItemId,
    retry: &RetryPolicy,
) -> Result<String, SourceError> {
    let url = client.endpoint(item_id.as_str());
    retry.run(SourceError::is_transport, || {
        let response = client.get(&url).map_err(|e| SourceError::Network {
            url: url.clone(),
            source: e,
        })?;
        let status = response.status();
        if !is_link_redirect(status) {
            return Err(SourceError::UnexpectedStatus {
                status: status.as_u16(),
                url: url.clone(),
            });
        }
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| SourceError::MissingLocation { url: url.clone() })?;
        absolute_location(&url, location)
    })
}

fn is_link_redirect(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::SEE_OTHER
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT
    )
}

/// Resolve a possibly relative `Location` against the URL that produced it.
fn absolute_location(request_url: &str, location: &str) -> Result<String, SourceError> {
    let base = Url::parse(request_url).map_err(|_| SourceError::MissingLocation {
        url: request_url.to_string(),
    })?;
    base.join(location.trim())
        .map(|u| u.to_string())
        .map_err(|_| SourceError::MissingLocation {
            url: request_url.to_string(),
        })
}

/// Stream `url` into `dest` in fixed-size chunks. `progress` receives (bytes written,
/// content length if known) after every chunk. Returns the byte count.
pub fn stream_to_file(
    client: &ApiClient,
    url: &str,
    dest: &Path,
    progress: Option<&dyn Fn(u64, Option<u64>)>,
) -> Result<u64, SourceError> {
    let mut response = client.get_download(url).map_err(|e| SourceError::Network {
        url: url.to_string(),
        source: e,
    })?;
    if !response.status().is_success() {
        return Err(SourceError::UnexpectedStatus {
            status: response.status().as_u16(),
            url: url.to_string(),
        });
    }
    let total = response.content_length();
    let io_err = |e| SourceError::Io {
        path: dest.to_path_buf(),
        source: e,
    };
    let mut out = BufWriter::new(File::create(dest).map_err(io_err)?);
    let mut buf = [0u8; CHUNK_SIZE];
    let mut written = 0u64;
    loop {
        let n = response
            .read(&mut buf)
            .map_err(|e| SourceError::Io {
                path: dest.to_path_buf(),
                source: e,
            })?;
        if n == 0 {
            break;
        }
        out.write_all(&buf[..n]).map_err(io_err)?;
        written += n as u64;
        if let Some(p) = progress {
            p(written, total);
        }
    }
    out.flush().map_err(io_err)?;
    debug!(bytes = written, path = %dest.display(), "archive downloaded");
    Ok(written)
}

/// Extract every entry of the zip at `archive` into `dest`.
pub fn extract_archive(archive: &Path, dest: &Path) -> Result<(), SourceError> {
    let file = File::open(archive).map_err(|e| SourceError::Io {
        path: archive.to_path_buf(),
        source: e,
    })?;
    let mut zip = zip::ZipArchive::new(file).map_err(|e| SourceError::Archive {
        path: archive.to_path_buf(),
        source: e,
    })?;
    std::fs::create_dir_all(dest).map_err(|e| SourceError::Io {
        path: dest.to_path_buf(),
        source: e,
    })?;
    let entries = zip.len();
    zip.extract(dest).map_err(|e| SourceError::Archive {
        path: archive.to_path_buf(),
        source: e,
    })?;
    debug!(entries, dest = %dest.display(), "archive extracted");
    Ok(())
}

/// Full acquisition into `work_dir`: link, download, extract. Returns the extraction
/// directory. Any failure is reported as `DownloadFailed` carrying the cause.
pub fn acquire_archive(
    client: &ApiClient,
    item_id: &ItemId,
    work_dir: &Path,
    retry: &RetryPolicy,
    progress: Option<&dyn Fn(u64, Option<u64>)>,
) -> Result<PathBuf, SourceError> {
    let wrap = |e: SourceError| SourceError::DownloadFailed {
        item_id: item_id.to_string(),
        source: Box::new(e),
    };

    info!(item_id = %item_id, "resolving download link");
    let link = resolve_download_link(client, item_id, retry).map_err(wrap)?;

    info!(item_id = %item_id, "downloading archive");
    let archive_path = work_dir.join(format!("{}.zip", item_id));
    stream_to_file(client, &link, &archive_path, progress).map_err(wrap)?;

    info!(item_id = %item_id, "extracting archive");
    let extract_dir = work_dir.join(EXTRACT_DIR);
    extract_archive(&archive_path, &extract_dir).map_err(wrap)?;
    Ok(extract_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;
    use zip::write::SimpleFileOptions;

    #[test]
    fn only_location_redirects_count_as_links() {
        for code in [301u16, 302, 303, 307, 308] {
            let status = StatusCode::from_u16(code).unwrap();
            assert!(is_link_redirect(status), "{}", code);
        }
        for code in [200u16, 300, 304, 305, 404, 500] {
            let status = StatusCode::from_u16(code).unwrap();
            assert!(!is_link_redirect(status), "{}", code);
        }
    }

    #[test]
    fn absolute_location_keeps_absolute_urls() -> Result<(), SourceError> {
        assert_eq!(
            absolute_location("https://api.example/123", "https://cdn.example/a.zip")?,
            "https://cdn.example/a.zip"
        );
        Ok(())
    }

    #[test]
    fn absolute_location_resolves_relative_paths() -> Result<(), SourceError> {
        assert_eq!(
            absolute_location("https://api.example/123", "/files/123.zip")?,
            "https://api.example/files/123.zip"
        );
        Ok(())
    }

    #[test]
    fn extract_archive_writes_all_entries() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let archive = dir.path().join("book.zip");
        let mut zip = zip::ZipWriter::new(File::create(&archive)?);
        for (name, body) in [("1.txt", "one"), ("2.txt", "two")] {
            zip.start_file(name, SimpleFileOptions::default())?;
            zip.write_all(body.as_bytes())?;
        }
        zip.finish()?;

        let dest = dir.path().join("out");
        extract_archive(&archive, &dest)?;
        assert_eq!(std::fs::read_to_string(dest.join("1.txt"))?, "one");
        assert_eq!(std::fs::read_to_string(dest.join("2.txt"))?, "two");
        Ok(())
    }

    #[test]
    fn extract_archive_rejects_non_zip() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let archive = dir.path().join("book.zip");
        std::fs::write(&archive, b"this is not a zip")?;
        let result = extract_archive(&archive, &dir.path().join("out"));
        assert!(matches!(result, Err(SourceError::Archive { .. })));
        Ok(())
    }
}
