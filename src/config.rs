//! Optional config file loading. Search order: ./qmfetch.toml, then
//! $XDG_CONFIG_HOME/qmfetch/config.toml (or ~/.config/qmfetch/config.toml).

use serde::Deserialize;
use std::path::PathBuf;

/// Config file contents. All fields optional; only present keys override defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct Config {
    /// Directory for the merged document when -o is not set. Paths are relative to CWD.
    pub output_dir: Option<PathBuf>,
    /// API base URL.
    pub api_base: Option<String>,
    /// HTTP User-Agent header.
    pub user_agent: Option<String>,
    /// HTTP Referer header.
    pub referer: Option<String>,
    /// Timeout in seconds for link, catalog and search requests (default 15).
    pub timeout_secs: Option<u64>,
    /// Timeout in seconds for the archive download (default 300).
    pub download_timeout_secs: Option<u64>,
    /// Failures absorbed before the final attempt (default 3).
    pub retry_count: Option<u32>,
    /// Constant delay in seconds between attempts (default 2).
    pub retry_delay_secs: Option<u64>,
    /// Decryption worker threads (default 8).
    pub workers: Option<usize>,
    /// Chapter decryption key, 32 hex characters.
    pub aes_key: Option<String>,
}

/// Search order: (1) ./qmfetch.toml, (2) $XDG_CONFIG_HOME/qmfetch/config.toml.
/// Missing file returns Ok(None). Invalid TOML or I/O error reading a present file returns Err.
pub fn load_config() -> Result<Option<Config>, String> {
    let cwd = std::env::current_dir()
        .map_err(|e| format!("Cannot determine current directory: {}", e))?;
    let mut paths = vec![cwd.join("qmfetch.toml")];
    if let Some(d) = dirs::config_dir() {
        paths.push(d.join("qmfetch").join("config.toml"));
    }
    for path in &paths {
        if path.exists() {
            let s = std::fs::read_to_string(path)
                .map_err(|e| format!("Cannot read config {}: {}", path.display(), e))?;
            let config: Config = toml::from_str(&s)
                .map_err(|e| format!("Invalid config {}: {}", path.display(), e))?;
            tracing::debug!(path = %path.display(), "config loaded");
            return Ok(Some(config));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_empty_config() {
        let c: Config = toml::from_str("").unwrap();
        assert!(c.output_dir.is_none());
        assert!(c.api_base.is_none());
        assert!(c.user_agent.is_none());
        assert!(c.referer.is_none());
        assert!(c.timeout_secs.is_none());
        assert!(c.download_timeout_secs.is_none());
        assert!(c.retry_count.is_none());
        assert!(c.retry_delay_secs.is_none());
        assert!(c.workers.is_none());
        assert!(c.aes_key.is_none());
    }

    #[test]
    fn parse_full_config() {
        let s = r#"
            output_dir = "book"
            api_base = "http://localhost:8080"
            user_agent = "Custom/1.0"
            referer = "https://example.com/"
            timeout_secs = 20
            download_timeout_secs = 600
            retry_count = 5
            retry_delay_secs = 1
            workers = 4
            aes_key = "00112233445566778899aabbccddeeff"
        "#;
        let c: Config = toml::from_str(s).unwrap();
        assert_eq!(c.output_dir.as_deref(), Some(std::path::Path::new("book")));
        assert_eq!(c.api_base.as_deref(), Some("http://localhost:8080"));
        assert_eq!(c.user_agent.as_deref(), Some("Custom/1.0"));
        assert_eq!(c.referer.as_deref(), Some("https://example.com/"));
        assert_eq!(c.timeout_secs, Some(20));
        assert_eq!(c.download_timeout_secs, Some(600));
        assert_eq!(c.retry_count, Some(5));
        assert_eq!(c.retry_delay_secs, Some(1));
        assert_eq!(c.workers, Some(4));
        assert_eq!(
            c.aes_key.as_deref(),
            Some("00112233445566778899aabbccddeeff")
        );
    }

    #[test]
    fn parse_partial_config() {
        let c: Config = toml::from_str("workers = 2").unwrap();
        assert_eq!(c.workers, Some(2));
        assert!(c.output_dir.is_none());
        assert!(c.retry_count.is_none());
    }

    #[test]
    fn invalid_toml_errors() {
        assert!(toml::from_str::<Config>("output_dir = [").is_err());
        assert!(toml::from_str::<Config>("workers = \"many\"").is_err());
    }
}
