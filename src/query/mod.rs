//! Cached, coalesced access to every TMDB operation the app uses.

pub mod cache;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub use cache::{QueryCache, QueryHandle, QueryKey, QueryPolicy, QueryState};

use crate::error::Result;
use crate::schema::{Credits, GenreList, Movie, MovieDetails, MovieId, Paged};
use crate::tmdb::{DiscoverParams, TimeWindow, TmdbApi};

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;

pub const LIST_POLICY: QueryPolicy =
    QueryPolicy::new(Duration::from_secs(HOUR), Duration::from_secs(2 * HOUR));
pub const SEARCH_POLICY: QueryPolicy =
    QueryPolicy::new(Duration::from_secs(5 * MINUTE), Duration::from_secs(30 * MINUTE));
pub const DETAIL_POLICY: QueryPolicy =
    QueryPolicy::new(Duration::from_secs(HOUR), Duration::from_secs(24 * HOUR));
pub const GENRE_POLICY: QueryPolicy =
    QueryPolicy::new(Duration::from_secs(24 * HOUR), Duration::from_secs(48 * HOUR));

/// One cache per result type, shared by every caller holding a clone.
#[derive(Clone)]
pub struct MovieQueries {
    api: Arc<dyn TmdbApi>,
    lists: QueryCache<Paged<Movie>>,
    details: QueryCache<MovieDetails>,
    credits: QueryCache<Credits>,
    genres: QueryCache<GenreList>,
    retry_delay: Option<Duration>,
}

impl std::fmt::Debug for MovieQueries {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MovieQueries")
            .field("lists", &self.lists)
            .field("details", &self.details)
            .field("credits", &self.credits)
            .field("genres", &self.genres)
            .finish()
    }
}

impl MovieQueries {
    pub fn new(api: Arc<dyn TmdbApi>) -> Self {
        Self {
            api,
            lists: QueryCache::new(),
            details: QueryCache::new(),
            credits: QueryCache::new(),
            genres: QueryCache::new(),
            retry_delay: None,
        }
    }

    /// Override the pause before the single retry of a failed fetch.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }

    fn policy(&self, base: QueryPolicy) -> QueryPolicy {
        match self.retry_delay {
            Some(delay) => base.with_retry_delay(delay),
            None => base,
        }
    }

    // Each fetch gets its own handle on the client so the closure is 'static.
    fn bind<T, F, Fut>(&self, run: F) -> impl Fn() -> Fut + Send + Sync + 'static
    where
        F: Fn(Arc<dyn TmdbApi>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let api = Arc::clone(&self.api);
        move || run(Arc::clone(&api))
    }

    pub fn trending(&self, window: TimeWindow) -> QueryHandle<Paged<Movie>> {
        let key = QueryKey::new("movies/trending").param(window);
        let fetch = self.bind(move |api| async move { api.trending(window).await });
        self.lists.query(key, self.policy(LIST_POLICY), fetch)
    }

    pub fn popular(&self, page: u32) -> QueryHandle<Paged<Movie>> {
        let key = QueryKey::new("movies/popular").param(page);
        let fetch = self.bind(move |api| async move { api.popular(page).await });
        self.lists.query(key, self.policy(LIST_POLICY), fetch)
    }

    pub fn top_rated(&self, page: u32) -> QueryHandle<Paged<Movie>> {
        let key = QueryKey::new("movies/top_rated").param(page);
        let fetch = self.bind(move |api| async move { api.top_rated(page).await });
        self.lists.query(key, self.policy(LIST_POLICY), fetch)
    }

    pub fn upcoming(&self, page: u32) -> QueryHandle<Paged<Movie>> {
        let key = QueryKey::new("movies/upcoming").param(page);
        let fetch = self.bind(move |api| async move { api.upcoming(page).await });
        self.lists.query(key, self.policy(LIST_POLICY), fetch)
    }

    pub fn now_playing(&self, page: u32) -> QueryHandle<Paged<Movie>> {
        let key = QueryKey::new("movies/now_playing").param(page);
        let fetch = self.bind(move |api| async move { api.now_playing(page).await });
        self.lists.query(key, self.policy(LIST_POLICY), fetch)
    }

    /// Disabled while the query text is blank.
    pub fn search(&self, query: &str, page: u32) -> QueryHandle<Paged<Movie>> {
        let query = query.trim().to_string();
        if query.is_empty() {
            return QueryHandle::disabled();
        }
        let key = QueryKey::new("movies/search").param(&query).param(page);
        let fetch = self.bind(move |api| {
            let query = query.clone();
            async move { api.search(&query, page).await }
        });
        self.lists.query(key, self.policy(SEARCH_POLICY), fetch)
    }

    /// Disabled for id 0.
    pub fn details(&self, id: MovieId) -> QueryHandle<MovieDetails> {
        if id == 0 {
            return QueryHandle::disabled();
        }
        let key = QueryKey::new("movie/details").param(id);
        let fetch = self.bind(move |api| async move { api.details(id).await });
        self.details.query(key, self.policy(DETAIL_POLICY), fetch)
    }

    /// Disabled for id 0.
    pub fn credits(&self, id: MovieId) -> QueryHandle<Credits> {
        if id == 0 {
            return QueryHandle::disabled();
        }
        let key = QueryKey::new("movie/credits").param(id);
        let fetch = self.bind(move |api| async move { api.credits(id).await });
        self.credits.query(key, self.policy(DETAIL_POLICY), fetch)
    }

    /// Disabled for id 0.
    pub fn similar(&self, id: MovieId, page: u32) -> QueryHandle<Paged<Movie>> {
        if id == 0 {
            return QueryHandle::disabled();
        }
        let key = QueryKey::new("movie/similar").param(id).param(page);
        let fetch = self.bind(move |api| async move { api.similar(id, page).await });
        self.lists.query(key, self.policy(LIST_POLICY), fetch)
    }

    pub fn genres(&self) -> QueryHandle<GenreList> {
        let key = QueryKey::new("genres");
        let fetch = self.bind(|api| async move { api.genres().await });
        self.genres.query(key, self.policy(GENRE_POLICY), fetch)
    }

    pub fn discover(&self, params: &DiscoverParams) -> QueryHandle<Paged<Movie>> {
        // Genre filters are a set; toggle order must not split the cache.
        let mut genres = params.with_genres.clone();
        genres.sort_unstable();
        genres.dedup();
        let genres = genres
            .iter()
            .map(|g| g.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let key = QueryKey::new("movies/discover")
            .param(params.page)
            .param(genres)
            .param(params.sort_by);
        let params = params.clone();
        let fetch = self.bind(move |api| {
            let params = params.clone();
            async move { api.discover(&params).await }
        });
        self.lists.query(key, self.policy(SEARCH_POLICY), fetch)
    }

    /// Evict expired entries from every cache. Returns how many went.
    pub fn collect_garbage(&self) -> usize {
        self.lists.collect_garbage()
            + self.details.collect_garbage()
            + self.credits.collect_garbage()
            + self.genres.collect_garbage()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TmdbError;
    use crate::schema::Genre;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeTmdb {
        calls: AtomicUsize,
        seen: Mutex<Vec<String>>,
    }

    impl FakeTmdb {
        fn record(&self, call: String) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(call);
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn page(&self, page: u32, ids: &[MovieId]) -> Paged<Movie> {
            Paged {
                page,
                results: ids.iter().map(|id| movie(*id)).collect(),
                total_pages: 10,
                total_results: 200,
            }
        }
    }

    fn movie(id: MovieId) -> Movie {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "title": format!("Movie {id}"),
            "original_title": format!("Movie {id}"),
            "poster_path": null,
            "backdrop_path": null,
        }))
        .unwrap()
    }

    #[async_trait]
    impl TmdbApi for FakeTmdb {
        async fn trending(&self, window: TimeWindow) -> Result<Paged<Movie>> {
            self.record(format!("trending {window}"));
            Ok(self.page(1, &[1]))
        }
        async fn popular(&self, page: u32) -> Result<Paged<Movie>> {
            self.record(format!("popular {page}"));
            Ok(self.page(page, &[1, 2]))
        }
        async fn top_rated(&self, page: u32) -> Result<Paged<Movie>> {
            self.record(format!("top_rated {page}"));
            Ok(self.page(page, &[3]))
        }
        async fn upcoming(&self, page: u32) -> Result<Paged<Movie>> {
            self.record(format!("upcoming {page}"));
            Ok(self.page(page, &[4]))
        }
        async fn now_playing(&self, page: u32) -> Result<Paged<Movie>> {
            self.record(format!("now_playing {page}"));
            Ok(self.page(page, &[5]))
        }
        async fn search(&self, query: &str, page: u32) -> Result<Paged<Movie>> {
            self.record(format!("search {query} {page}"));
            Ok(self.page(page, &[6]))
        }
        async fn details(&self, id: MovieId) -> Result<MovieDetails> {
            self.record(format!("details {id}"));
            Err(TmdbError::Provider {
                status: 404,
                status_text: "Not Found".into(),
                message: None,
            })
        }
        async fn credits(&self, id: MovieId) -> Result<Credits> {
            self.record(format!("credits {id}"));
            Ok(Credits {
                cast: Vec::new(),
                crew: Vec::new(),
            })
        }
        async fn similar(&self, id: MovieId, page: u32) -> Result<Paged<Movie>> {
            self.record(format!("similar {id} {page}"));
            Ok(self.page(page, &[7]))
        }
        async fn genres(&self) -> Result<GenreList> {
            self.record("genres".into());
            Ok(GenreList {
                genres: vec![Genre {
                    id: 28,
                    name: "Action".into(),
                }],
            })
        }
        async fn discover(&self, params: &DiscoverParams) -> Result<Paged<Movie>> {
            self.record(format!("discover {} {}", params.genres_param(), params.sort_by));
            Ok(self.page(params.page, &[8]))
        }
    }

    fn setup() -> (Arc<FakeTmdb>, MovieQueries) {
        let fake = Arc::new(FakeTmdb::default());
        let queries = MovieQueries::new(fake.clone()).with_retry_delay(Duration::ZERO);
        (fake, queries)
    }

    #[tokio::test(start_paused = true)]
    async fn list_pages_are_cached_per_page() {
        let (fake, queries) = setup();

        let mut first = queries.popular(1);
        let state = first.settled().await;
        assert_eq!(state.data.unwrap().results.len(), 2);

        queries.popular(1).settled().await;
        assert_eq!(fake.calls(), 1);

        queries.popular(2).settled().await;
        assert_eq!(fake.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn same_page_of_different_lists_does_not_collide() {
        let (fake, queries) = setup();
        let popular = queries.popular(1).settled().await;
        let top = queries.top_rated(1).settled().await;
        assert_ne!(popular.data.unwrap().results[0].id, top.data.unwrap().results[0].id);
        assert_eq!(fake.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn blank_search_never_fetches() {
        let (fake, queries) = setup();
        let mut handle = queries.search("   ", 1);
        assert!(!handle.is_enabled());
        assert!(handle.settled().await.is_idle());
        assert_eq!(fake.calls(), 0);

        queries.search(" dune ", 1).settled().await;
        assert_eq!(fake.seen.lock().unwrap().as_slice(), ["search dune 1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_id_disables_movie_queries() {
        let (fake, queries) = setup();
        assert!(queries.details(0).state().is_idle());
        assert!(queries.credits(0).state().is_idle());
        assert!(queries.similar(0, 1).state().is_idle());
        assert_eq!(fake.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn provider_errors_are_retried_once_then_surfaced() {
        let (fake, queries) = setup();
        let state = queries.details(550).settled().await;
        assert_eq!(state.error.unwrap().status(), Some(404));
        assert_eq!(fake.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn discover_keys_on_filters() {
        let (fake, queries) = setup();
        let params = DiscoverParams::default().with_genre_toggled(28);
        queries.discover(&params).settled().await;
        queries.discover(&params).settled().await;
        assert_eq!(fake.calls(), 1);

        queries
            .discover(&params.clone().with_genre_toggled(12))
            .settled()
            .await;
        assert_eq!(fake.calls(), 2);
        assert_eq!(
            fake.seen.lock().unwrap().last().map(String::as_str),
            Some("discover 28,12 popularity.desc")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn discover_genre_order_shares_one_entry() {
        let (fake, queries) = setup();
        let forward = DiscoverParams::default()
            .with_genre_toggled(28)
            .with_genre_toggled(12);
        let backward = DiscoverParams::default()
            .with_genre_toggled(12)
            .with_genre_toggled(28);
        queries.discover(&forward).settled().await;
        queries.discover(&backward).settled().await;
        assert_eq!(fake.calls(), 1);
    }

    #[test]
    fn policies_match_resource_lifetimes() {
        assert_eq!(LIST_POLICY.stale_time, Duration::from_secs(60 * 60));
        assert_eq!(LIST_POLICY.gc_time, Duration::from_secs(2 * 60 * 60));
        assert_eq!(SEARCH_POLICY.stale_time, Duration::from_secs(5 * 60));
        assert_eq!(SEARCH_POLICY.gc_time, Duration::from_secs(30 * 60));
        assert_eq!(DETAIL_POLICY.gc_time, Duration::from_secs(24 * 60 * 60));
        assert_eq!(GENRE_POLICY.stale_time, Duration::from_secs(24 * 60 * 60));
        assert_eq!(GENRE_POLICY.gc_time, Duration::from_secs(48 * 60 * 60));
        assert_eq!(GENRE_POLICY.retries, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn genres_stay_fresh_for_a_day() {
        let (fake, queries) = setup();
        let mut handle = queries.genres();
        let list = handle.settled().await.data.unwrap();
        assert_eq!(list.name_of(28), Some("Action"));

        tokio::time::advance(Duration::from_secs(23 * HOUR)).await;
        queries.genres().settled().await;
        assert_eq!(fake.calls(), 1);

        tokio::time::advance(Duration::from_secs(2 * HOUR)).await;
        queries.genres().settled().await;
        assert_eq!(fake.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn search_results_expire_sooner_than_lists() {
        let (fake, queries) = setup();
        queries.search("alien", 1).settled().await;
        queries.trending(TimeWindow::Week).settled().await;

        tokio::time::advance(Duration::from_secs(31 * MINUTE)).await;
        assert_eq!(queries.collect_garbage(), 1);
        assert_eq!(fake.calls(), 2);
    }
}
