use anyhow::Context;
use async_trait::async_trait;
use reqwest::header::CACHE_CONTROL;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

use crate::config::Config;
use crate::error::{Result, TmdbError};
use crate::schema::{self, Credits, GenreId, GenreList, Movie, MovieDetails, MovieId, Paged, Shape};

const LIST_MAX_AGE: Duration = Duration::from_secs(60 * 60);
const DETAIL_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

#[async_trait]
pub trait TmdbApi: Send + Sync {
    async fn trending(&self, window: TimeWindow) -> Result<Paged<Movie>>;
    async fn popular(&self, page: u32) -> Result<Paged<Movie>>;
    async fn top_rated(&self, page: u32) -> Result<Paged<Movie>>;
    async fn upcoming(&self, page: u32) -> Result<Paged<Movie>>;
    async fn now_playing(&self, page: u32) -> Result<Paged<Movie>>;
    async fn search(&self, query: &str, page: u32) -> Result<Paged<Movie>>;
    async fn details(&self, id: MovieId) -> Result<MovieDetails>;
    async fn credits(&self, id: MovieId) -> Result<Credits>;
    async fn similar(&self, id: MovieId, page: u32) -> Result<Paged<Movie>>;
    async fn genres(&self) -> Result<GenreList>;
    async fn discover(&self, params: &DiscoverParams) -> Result<Paged<Movie>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TimeWindow {
    Day,
    #[default]
    Week,
}

impl TimeWindow {
    pub fn as_str(self) -> &'static str {
        match self {
            TimeWindow::Day => "day",
            TimeWindow::Week => "week",
        }
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeWindow {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_lowercase().as_str() {
            "day" => Ok(TimeWindow::Day),
            "week" => Ok(TimeWindow::Week),
            _ => Err(anyhow::anyhow!("time window must be 'day' or 'week'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SortBy {
    #[default]
    PopularityDesc,
    PopularityAsc,
    ReleaseDateDesc,
    ReleaseDateAsc,
    VoteAverageDesc,
    VoteAverageAsc,
    TitleAsc,
    TitleDesc,
}

impl SortBy {
    pub const ALL: [SortBy; 8] = [
        SortBy::PopularityDesc,
        SortBy::PopularityAsc,
        SortBy::ReleaseDateDesc,
        SortBy::ReleaseDateAsc,
        SortBy::VoteAverageDesc,
        SortBy::VoteAverageAsc,
        SortBy::TitleAsc,
        SortBy::TitleDesc,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SortBy::PopularityDesc => "popularity.desc",
            SortBy::PopularityAsc => "popularity.asc",
            SortBy::ReleaseDateDesc => "release_date.desc",
            SortBy::ReleaseDateAsc => "release_date.asc",
            SortBy::VoteAverageDesc => "vote_average.desc",
            SortBy::VoteAverageAsc => "vote_average.asc",
            SortBy::TitleAsc => "title.asc",
            SortBy::TitleDesc => "title.desc",
        }
    }
}

impl fmt::Display for SortBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortBy {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> anyhow::Result<Self> {
        SortBy::ALL
            .into_iter()
            .find(|sort| sort.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("unknown sort order '{}'", s))
    }
}

/// Filters for `discover/movie`. Changing a filter resets to page 1.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DiscoverParams {
    pub page: u32,
    pub with_genres: Vec<GenreId>,
    pub sort_by: SortBy,
}

impl Default for DiscoverParams {
    fn default() -> Self {
        Self {
            page: 1,
            with_genres: Vec::new(),
            sort_by: SortBy::default(),
        }
    }
}

impl DiscoverParams {
    pub fn with_page(mut self, page: u32) -> Self {
        self.page = page;
        self
    }

    /// Add the genre if absent, remove it if present.
    pub fn with_genre_toggled(mut self, genre: GenreId) -> Self {
        if let Some(pos) = self.with_genres.iter().position(|g| *g == genre) {
            self.with_genres.remove(pos);
        } else {
            self.with_genres.push(genre);
        }
        self.page = 1;
        self
    }

    pub fn with_sort(mut self, sort_by: SortBy) -> Self {
        self.sort_by = sort_by;
        self.page = 1;
        self
    }

    pub fn genres_param(&self) -> String {
        self.with_genres
            .iter()
            .map(|g| g.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Advisory caching hint for the transport, sent as `Cache-Control`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheHint {
    Cacheable(Duration),
    NoStore,
}

impl CacheHint {
    pub fn header_value(self) -> String {
        match self {
            CacheHint::Cacheable(max_age) => format!("max-age={}", max_age.as_secs()),
            CacheHint::NoStore => "no-store".to_string(),
        }
    }
}

#[derive(Clone)]
pub struct TmdbClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    language: String,
}

impl fmt::Debug for TmdbClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TmdbClient")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("language", &self.language)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    status_message: String,
}

impl TmdbClient {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let user_agent = format!("moviehub/{}", env!("CARGO_PKG_VERSION"));
        let client = Client::builder()
            .user_agent(user_agent)
            .build()
            .context("Failed to build TMDB HTTP client")?;
        let mut base_url = config.base_url.clone();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        Ok(Self {
            client,
            base_url,
            api_key: config.api_key.clone(),
            language: config.language.clone(),
        })
    }

    pub fn from_env() -> anyhow::Result<Self> {
        Self::new(&Config::from_env()?)
    }

    fn api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| TmdbError::Config("TMDB API key is not configured".to_string()))
    }

    fn url(&self, path: &str, params: &[(&str, String)], api_key: &str) -> String {
        let mut url = format!(
            "{}{path}?language={}",
            self.base_url,
            urlencoding::encode(&self.language)
        );
        for (name, value) in params {
            url.push_str(&format!("&{name}={}", urlencoding::encode(value)));
        }
        url.push_str(&format!("&api_key={}", urlencoding::encode(api_key)));
        url
    }

    async fn get_json<T: Shape>(
        &self,
        path: &str,
        params: &[(&str, String)],
        hint: CacheHint,
    ) -> Result<T> {
        let api_key = self.api_key()?;
        let url = self.url(path, params, api_key);
        debug!(path, shape = T::NAME, cache = %hint.header_value(), "TMDB request");

        let res = self
            .client
            .get(&url)
            .header(CACHE_CONTROL, hint.header_value())
            .send()
            .await
            .map_err(|e| TmdbError::Network(describe(e)))?;
        let status = res.status();
        let text = res
            .text()
            .await
            .map_err(|e| TmdbError::Network(format!("reading body failed: {}", describe(e))))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorBody>(&text)
                .ok()
                .map(|b| b.status_message);
            debug!(path, status = status.as_u16(), ?message, "TMDB error response");
            return Err(TmdbError::Provider {
                status: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or_default().to_string(),
                message,
            });
        }

        let payload: Value = serde_json::from_str(&text).map_err(|e| TmdbError::Validation {
            shape: T::NAME,
            reason: format!("invalid JSON: {e}"),
        })?;
        schema::validate(payload)
    }

    async fn movie_list(&self, path: &str, page: u32) -> Result<Paged<Movie>> {
        self.get_json(
            path,
            &[("page", page.to_string())],
            CacheHint::Cacheable(LIST_MAX_AGE),
        )
        .await
    }
}

// reqwest's Display embeds the URL, which carries the API key.
fn describe(err: reqwest::Error) -> String {
    let err = err.without_url();
    let mut msg = err.to_string();
    let mut source = std::error::Error::source(&err);
    while let Some(inner) = source {
        msg.push_str(&format!(": {inner}"));
        source = std::error::Error::source(inner);
    }
    msg
}

#[async_trait]
impl TmdbApi for TmdbClient {
    async fn trending(&self, window: TimeWindow) -> Result<Paged<Movie>> {
        let path = format!("trending/movie/{window}");
        self.get_json(&path, &[], CacheHint::Cacheable(LIST_MAX_AGE)).await
    }

    async fn popular(&self, page: u32) -> Result<Paged<Movie>> {
        self.movie_list("movie/popular", page).await
    }

    async fn top_rated(&self, page: u32) -> Result<Paged<Movie>> {
        self.movie_list("movie/top_rated", page).await
    }

    async fn upcoming(&self, page: u32) -> Result<Paged<Movie>> {
        self.movie_list("movie/upcoming", page).await
    }

    async fn now_playing(&self, page: u32) -> Result<Paged<Movie>> {
        self.movie_list("movie/now_playing", page).await
    }

    async fn search(&self, query: &str, page: u32) -> Result<Paged<Movie>> {
        self.get_json(
            "search/movie",
            &[("query", query.to_string()), ("page", page.to_string())],
            CacheHint::NoStore,
        )
        .await
    }

    async fn details(&self, id: MovieId) -> Result<MovieDetails> {
        let path = format!("movie/{id}");
        self.get_json(&path, &[], CacheHint::Cacheable(DETAIL_MAX_AGE)).await
    }

    async fn credits(&self, id: MovieId) -> Result<Credits> {
        let path = format!("movie/{id}/credits");
        self.get_json(&path, &[], CacheHint::Cacheable(DETAIL_MAX_AGE)).await
    }

    async fn similar(&self, id: MovieId, page: u32) -> Result<Paged<Movie>> {
        let path = format!("movie/{id}/similar");
        self.movie_list(&path, page).await
    }

    async fn genres(&self) -> Result<GenreList> {
        self.get_json("genre/movie/list", &[], CacheHint::Cacheable(DETAIL_MAX_AGE)).await
    }

    async fn discover(&self, params: &DiscoverParams) -> Result<Paged<Movie>> {
        let mut query = vec![
            ("page", params.page.to_string()),
            ("sort_by", params.sort_by.as_str().to_string()),
        ];
        if !params.with_genres.is_empty() {
            query.push(("with_genres", params.genres_param()));
        }
        self.get_json("discover/movie", &query, CacheHint::NoStore).await
    }
}
