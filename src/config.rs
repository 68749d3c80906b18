use anyhow::{anyhow, Context, Result};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

pub const DEFAULT_API_URL: &str = "https://api-internhasha.wafflestudio.com";
const DEFAULT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: Url,
    pub timeout: Duration,
    pub data_dir: PathBuf,
}

impl Config {
    /// Reads `HASHA_API_URL`, `HASHA_TIMEOUT_SECS` and `HASHA_DATA_DIR`,
    /// falling back to defaults. `api_override` (from the command line) wins.
    pub fn load(api_override: Option<&str>) -> Result<Self> {
        let raw_url = match api_override {
            Some(url) => url.to_string(),
            None => var("HASHA_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
        };
        let mut api_url = Url::parse(&raw_url)
            .with_context(|| format!("Invalid API URL: {}", raw_url))?;
        if !matches!(api_url.scheme(), "http" | "https") {
            return Err(anyhow!("API URL must be http or https: {}", raw_url));
        }
        // endpoint paths are joined relative to the base, so it must end in `/`
        if !api_url.path().ends_with('/') {
            let path = format!("{}/", api_url.path());
            api_url.set_path(&path);
        }

        let timeout = match var("HASHA_TIMEOUT_SECS") {
            Some(raw) => match raw.parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    warn!("Invalid HASHA_TIMEOUT_SECS value {raw:?}, using {DEFAULT_TIMEOUT_SECS}");
                    Duration::from_secs(DEFAULT_TIMEOUT_SECS)
                }
            },
            None => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        };

        let data_dir = match var("HASHA_DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => default_data_dir(),
        };

        Ok(Self { api_url, timeout, data_dir })
    }

    pub fn storage_path(&self) -> PathBuf {
        self.data_dir.join("storage.json")
    }

    pub fn location_path(&self) -> PathBuf {
        self.data_dir.join("location")
    }
}

fn var(key: &str) -> Option<String> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => Some(value.trim().to_string()),
        _ => {
            debug!("{key} not set, using default");
            None
        }
    }
}

fn default_data_dir() -> PathBuf {
    // XDG data directory or fallback
    if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "hasha") {
        proj_dirs.data_dir().to_path_buf()
    } else {
        PathBuf::from(".hasha")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_wins_and_is_validated() {
        let config = Config::load(Some("http://localhost:8080")).unwrap();
        assert_eq!(config.api_url.as_str(), "http://localhost:8080/");
        assert!(config.storage_path().ends_with("storage.json"));

        let proxied = Config::load(Some("https://example.com/proxy")).unwrap();
        assert_eq!(proxied.api_url.as_str(), "https://example.com/proxy/");

        assert!(Config::load(Some("not a url")).is_err());
        assert!(Config::load(Some("ftp://example.com")).is_err());
    }
}
