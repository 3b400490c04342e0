//! Merged document: metadata header plus every decrypted chapter in chapter-id order, then
//! best-effort removal of the per-chapter files.

use crate::model::{DecryptedChapter, ItemMetadata};
use crate::pipeline::sanitize_filename;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Separator line closing the header.
pub const SEPARATOR_WIDTH: usize = 50;
const TAG_SEPARATOR: &str = ", ";

/// Header block written at the top of the merged document.
pub fn render_header(meta: &ItemMetadata) -> String {
    format!(
        "Title: {}\nAuthor: {}\nTags: {}\nWords: {}\nBook ID: {}\nIntroduction:\n{}\n\n{}\n",
        meta.title,
        meta.author,
        meta.tags.join(TAG_SEPARATOR),
        meta.word_count,
        meta.id,
        meta.introduction,
        "=".repeat(SEPARATOR_WIDTH)
    )
}

/// File name of the merged document for a book.
pub fn merged_file_name(meta: &ItemMetadata) -> String {
    format!("{}.txt", sanitize_filename(&meta.title))
}

/// Write the merged document into `dest_dir`. Chapters are sorted by numeric chapter id
/// first, since workers finish in arbitrary order. Returns the written path.
pub fn merge_chapters(
    mut chapters: Vec<DecryptedChapter>,
    meta: &ItemMetadata,
    dest_dir: &Path,
) -> std::io::Result<PathBuf> {
    chapters.sort_by_key(DecryptedChapter::sort_key);
    std::fs::create_dir_all(dest_dir)?;
    let path = dest_dir.join(merged_file_name(meta));
    let mut out = BufWriter::new(File::create(&path)?);
    out.write_all(render_header(meta).as_bytes())?;
    for chapter in &chapters {
        let body = std::fs::read_to_string(&chapter.path)?;
        write!(out, "\n\n{}\n\n", chapter.title)?;
        out.write_all(body.as_bytes())?;
    }
    out.flush()?;
    debug!(path = %path.display(), chapters = chapters.len(), "merged document written");
    Ok(path)
}

/// Delete every `.txt` file in `dir` except `keep`. Errors are ignored. Returns how many
/// files were removed.
pub fn cleanup_intermediates(dir: &Path, keep: &Path) -> usize {
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) => {
            debug!(dir = %dir.display(), error = %e, "cleanup skipped");
            return 0;
        }
    };
    let mut removed = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        let is_txt = path.extension().map(|e| e == "txt").unwrap_or(false);
        if !is_txt || path == keep {
            continue;
        }
        match std::fs::remove_file(&path) {
            Ok(()) => removed += 1,
            Err(e) => debug!(path = %path.display(), error = %e, "could not remove intermediate"),
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    fn meta() -> ItemMetadata {
        ItemMetadata {
            title: "A/B Story".to_string(),
            author: "Writer".to_string(),
            image_link: String::new(),
            tags: vec!["fantasy".to_string(), "eastern".to_string()],
            word_count: "1000".to_string(),
            id: "123456".to_string(),
            introduction: "An intro.".to_string(),
        }
    }

    fn chapter(dir: &Path, id: &str, title: &str, body: &str) -> std::io::Result<DecryptedChapter> {
        let path = dir.join(format!("{}.txt", title));
        std::fs::write(&path, body)?;
        Ok(DecryptedChapter {
            chapter_id: id.to_string(),
            title: title.to_string(),
            path,
        })
    }

    #[test]
    fn header_layout() {
        let header = render_header(&meta());
        assert!(header.starts_with("Title: A/B Story\nAuthor: Writer\nTags: fantasy, eastern\n"));
        assert!(header.contains("Words: 1000\nBook ID: 123456\nIntroduction:\nAn intro.\n\n"));
        assert!(header.ends_with(&format!("{}\n", "=".repeat(50))));
    }

    #[test]
    fn merge_orders_by_numeric_id_regardless_of_input_order() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let chapters = vec![
            chapter(dir.path(), "10", "Ten", "    ten")?,
            chapter(dir.path(), "2", "Two", "    two")?,
            chapter(dir.path(), "9", "Nine", "    nine")?,
        ];
        let path = merge_chapters(chapters, &meta(), &dir.path().join("merged"))?;
        assert_eq!(path.file_name().and_then(|n| n.to_str()), Some("A_B Story.txt"));
        let text = std::fs::read_to_string(&path)?;
        let expected_tail = "\n\nTwo\n\n    two\n\nNine\n\n    nine\n\nTen\n\n    ten";
        assert!(text.ends_with(expected_tail), "got: {}", text);
        assert!(text.starts_with("Title: A/B Story\n"));
        Ok(())
    }

    #[test]
    fn cleanup_removes_txt_except_kept() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let keep = dir.path().join("Book.txt");
        for name in ["Book.txt", "Ch1.txt", "Ch2.txt", "cover.jpg"] {
            std::fs::write(dir.path().join(name), "x")?;
        }
        assert_eq!(cleanup_intermediates(dir.path(), &keep), 2);
        assert!(keep.exists());
        assert!(dir.path().join("cover.jpg").exists());
        assert!(!dir.path().join("Ch1.txt").exists());
        Ok(())
    }

    #[test]
    fn cleanup_of_missing_dir_is_silent() {
        let missing = std::env::temp_dir().join("qmfetch_no_such_dir_xyz");
        assert_eq!(cleanup_intermediates(&missing, &missing.join("a.txt")), 0);
    }
}
