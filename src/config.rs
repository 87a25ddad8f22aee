use anyhow::{bail, Result};
use std::env;
use std::path::PathBuf;

use crate::i18n::Locale;

pub const DEFAULT_BASE_URL: &str = "https://api.themoviedb.org/3/";
pub const DEFAULT_LANGUAGE: &str = "en-US";

#[derive(Clone)]
pub struct Config {
    /// Checked at fetch time, not here.
    pub api_key: Option<String>,
    pub base_url: String,
    pub language: String,
    pub locale: Locale,
    pub data_dir: PathBuf,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("language", &self.language)
            .field("locale", &self.locale)
            .field("data_dir", &self.data_dir)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            language: DEFAULT_LANGUAGE.to_string(),
            locale: Locale::En,
            data_dir: default_data_dir(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mut base_url = get("TMDB_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            bail!("TMDB_BASE_URL must be an http(s) URL, got '{}'", base_url);
        }
        if !base_url.ends_with('/') {
            base_url.push('/');
        }

        Ok(Self {
            api_key: get("TMDB_API_KEY"),
            base_url,
            language: get("TMDB_LANGUAGE").unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
            locale: get("MOVIEHUB_LOCALE")
                .map(|tag| Locale::from_tag(&tag))
                .unwrap_or_default(),
            data_dir: get("MOVIEHUB_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(default_data_dir),
        })
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("moviehub"))
        .unwrap_or_else(|| PathBuf::from(".moviehub"))
}
