use anyhow::{bail, Context, Result};
use dotenvy::dotenv;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use moviehub::config::Config;
use moviehub::favorites::{FavoritesStore, FileStorage};
use moviehub::i18n::{format_rating, format_release_date, format_runtime, release_year, Messages};
use moviehub::images::ImageSize;
use moviehub::query::{MovieQueries, QueryHandle};
use moviehub::schema::{Movie, MovieId, Paged};
use moviehub::tmdb::{DiscoverParams, TimeWindow, TmdbClient};

const USAGE: &str = "usage: moviehub <command>

  trending [day|week]
  popular|top-rated|upcoming|now-playing [page]
  search <text> [page]
  movie <id>
  credits <id>
  similar <id> [page]
  genres
  discover [--genre ID]... [--sort KEY] [--page N]
  fav list|add <id>|remove <id>|toggle <id>|clear";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListKind {
    Popular,
    TopRated,
    Upcoming,
    NowPlaying,
}

#[derive(Debug, PartialEq)]
enum Command {
    Trending(TimeWindow),
    List(ListKind, u32),
    Search(String, u32),
    Movie(MovieId),
    Credits(MovieId),
    Similar(MovieId, u32),
    Genres,
    Discover(DiscoverParams),
    FavList,
    FavAdd(MovieId),
    FavRemove(MovieId),
    FavToggle(MovieId),
    FavClear,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn parse_id(arg: Option<&String>) -> Result<MovieId> {
    let raw = arg.context("missing movie id")?;
    let id: MovieId = raw
        .parse()
        .with_context(|| format!("invalid movie id '{raw}'"))?;
    if id == 0 {
        bail!("movie id must be positive");
    }
    Ok(id)
}

fn parse_page(arg: Option<&String>) -> Result<u32> {
    match arg {
        None => Ok(1),
        Some(raw) => {
            let page: u32 = raw.parse().with_context(|| format!("invalid page '{raw}'"))?;
            if page == 0 {
                bail!("page must be at least 1");
            }
            Ok(page)
        }
    }
}

fn parse_discover(args: &[String]) -> Result<DiscoverParams> {
    let mut params = DiscoverParams::default();
    let mut page = 1;
    let mut iter = args.iter();
    while let Some(flag) = iter.next() {
        let value = iter.next().with_context(|| format!("{flag} needs a value"))?;
        match flag.as_str() {
            "--genre" => {
                let genre = value
                    .parse()
                    .with_context(|| format!("invalid genre id '{value}'"))?;
                params = params.with_genre_toggled(genre);
            }
            "--sort" => params = params.with_sort(value.parse()?),
            "--page" => page = parse_page(Some(value))?,
            other => bail!("unknown discover option '{other}'"),
        }
    }
    Ok(params.with_page(page))
}

fn parse_args(args: &[String]) -> Result<Command> {
    let Some(name) = args.first() else {
        bail!("{USAGE}");
    };
    let rest = &args[1..];
    let command = match name.as_str() {
        "trending" => Command::Trending(match rest.first() {
            Some(w) => w.parse()?,
            None => TimeWindow::default(),
        }),
        "popular" => Command::List(ListKind::Popular, parse_page(rest.first())?),
        "top-rated" => Command::List(ListKind::TopRated, parse_page(rest.first())?),
        "upcoming" => Command::List(ListKind::Upcoming, parse_page(rest.first())?),
        "now-playing" => Command::List(ListKind::NowPlaying, parse_page(rest.first())?),
        "search" => {
            let text = rest.first().context("missing search text")?;
            Command::Search(text.clone(), parse_page(rest.get(1))?)
        }
        "movie" => Command::Movie(parse_id(rest.first())?),
        "credits" => Command::Credits(parse_id(rest.first())?),
        "similar" => Command::Similar(parse_id(rest.first())?, parse_page(rest.get(1))?),
        "genres" => Command::Genres,
        "discover" => Command::Discover(parse_discover(rest)?),
        "fav" => match rest.first().map(String::as_str) {
            None | Some("list") => Command::FavList,
            Some("add") => Command::FavAdd(parse_id(rest.get(1))?),
            Some("remove") => Command::FavRemove(parse_id(rest.get(1))?),
            Some("toggle") => Command::FavToggle(parse_id(rest.get(1))?),
            Some("clear") => Command::FavClear,
            Some(other) => bail!("unknown fav command '{other}'\n\n{USAGE}"),
        },
        other => bail!("unknown command '{other}'\n\n{USAGE}"),
    };
    Ok(command)
}

/// Wait for the query to settle and surface its error, if any.
async fn resolve<T: Send + Sync + 'static>(mut handle: QueryHandle<T>) -> Result<Arc<T>> {
    let state = handle.settled().await;
    if let Some(err) = state.error {
        return Err(err.into());
    }
    state.data.context("query returned no data")
}

fn movie_line(movie: &Movie, messages: &Messages) -> String {
    let year = release_year(&movie.release_date)
        .map(|y| y.to_string())
        .unwrap_or_else(|| messages.t("common.notAvailable"));
    format!(
        "{:>8}  {} ({})  ★ {}",
        movie.id,
        movie.title,
        year,
        format_rating(movie.vote_average)
    )
}

fn print_page(title: &str, page: &Paged<Movie>, messages: &Messages) {
    println!("{title}");
    if page.results.is_empty() {
        println!("  {}", messages.t("searchPage.noResults"));
    }
    for movie in &page.results {
        println!("{}", movie_line(movie, messages));
    }
    let current = page.page.to_string();
    let total = page.total_pages.to_string();
    println!(
        "{}",
        messages.t_with("common.page", &[("page", &current), ("total", &total)])
    );
}

fn format_money(amount: u64, messages: &Messages) -> String {
    if amount == 0 {
        messages.t("movieDetails.unknown")
    } else {
        format!("${amount}")
    }
}

async fn run(command: Command, config: &Config, messages: &Messages) -> Result<()> {
    let client = TmdbClient::new(config)?;
    let queries = MovieQueries::new(Arc::new(client));
    let locale = messages.locale();

    match command {
        Command::Trending(window) => {
            let page = resolve(queries.trending(window)).await?;
            print_page(&messages.t("home.trending"), &page, messages);
        }
        Command::List(kind, page) => {
            let (key, handle) = match kind {
                ListKind::Popular => ("home.popular", queries.popular(page)),
                ListKind::TopRated => ("home.topRated", queries.top_rated(page)),
                ListKind::Upcoming => ("home.upcoming", queries.upcoming(page)),
                ListKind::NowPlaying => ("home.nowPlaying", queries.now_playing(page)),
            };
            let results = resolve(handle).await?;
            print_page(&messages.t(key), &results, messages);
        }
        Command::Search(text, page) => {
            let handle = queries.search(&text, page);
            if !handle.is_enabled() {
                println!("{}", messages.t("searchPage.emptyQuery"));
                return Ok(());
            }
            let results = resolve(handle).await?;
            let title = messages.t_with("searchPage.resultsFor", &[("query", text.trim())]);
            print_page(&title, &results, messages);
        }
        Command::Movie(id) => {
            let details = resolve(queries.details(id)).await?;
            println!("{} ({})", details.title, details.status);
            if let Some(tagline) = details.tagline.as_deref().filter(|t| !t.is_empty()) {
                println!("  {tagline}");
            }
            println!(
                "{}: {}",
                messages.t("movieDetails.releaseDate"),
                format_release_date(&details.release_date, locale)
            );
            println!(
                "{}: {}",
                messages.t("movieDetails.runtime"),
                format_runtime(details.runtime, locale)
            );
            println!("★ {}", format_rating(details.vote_average));
            println!(
                "{}: {}",
                messages.t("moviesPage.genres"),
                details
                    .genres
                    .iter()
                    .map(|g| g.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            println!(
                "{}: {}",
                messages.t("movieDetails.budget"),
                format_money(details.budget, messages)
            );
            println!(
                "{}: {}",
                messages.t("movieDetails.revenue"),
                format_money(details.revenue, messages)
            );
            println!("{}", details.poster_url(ImageSize::Large));
            if !details.overview.is_empty() {
                println!("\n{}", details.overview);
            }
        }
        Command::Credits(id) => {
            let credits = resolve(queries.credits(id)).await?;
            for director in credits.directors() {
                println!("{}: {}", messages.t("movieDetails.director"), director.name);
            }
            println!("{}:", messages.t("movieDetails.cast"));
            for cast in credits.top_billed(10) {
                println!("  {} as {}", cast.name, cast.character);
            }
        }
        Command::Similar(id, page) => {
            let results = resolve(queries.similar(id, page)).await?;
            print_page(&messages.t("movieDetails.similar"), &results, messages);
        }
        Command::Genres => {
            let list = resolve(queries.genres()).await?;
            println!("{}", messages.t("moviesPage.genres"));
            for genre in &list.genres {
                println!("{:>8}  {}", genre.id, genre.name);
            }
        }
        Command::Discover(params) => {
            let results = resolve(queries.discover(&params)).await?;
            let count = results.total_results.to_string();
            let title = format!(
                "{} ({})",
                messages.t("moviesPage.title"),
                messages.t_with("moviesPage.showingResults", &[("count", &count)])
            );
            print_page(&title, &results, messages);
        }
        Command::FavList => list_favorites(&store(config), messages),
        Command::FavRemove(id) => remove_favorite(&mut store(config), id, messages),
        Command::FavClear => {
            store(config).clear();
            println!("{}", messages.t("favoritesPage.cleared"));
        }
        Command::FavAdd(id) => add_favorite(&mut store(config), &queries, id, messages).await?,
        Command::FavToggle(id) => {
            let mut store = store(config);
            if store.is_favorite(id) {
                remove_favorite(&mut store, id, messages);
            } else {
                add_favorite(&mut store, &queries, id, messages).await?;
            }
        }
    }
    Ok(())
}

async fn add_favorite(
    store: &mut FavoritesStore<FileStorage>,
    queries: &MovieQueries,
    id: MovieId,
    messages: &Messages,
) -> Result<()> {
    let details = resolve(queries.details(id)).await?;
    let movie = details.summary();
    let key = if store.add(&movie) {
        "favoritesPage.added"
    } else {
        "favoritesPage.alreadyFavorite"
    };
    println!("{}", messages.t_with(key, &[("title", &movie.title)]));
    Ok(())
}

fn store(config: &Config) -> FavoritesStore<FileStorage> {
    FavoritesStore::load(FileStorage::new(&config.data_dir))
}

fn remove_favorite(store: &mut FavoritesStore<FileStorage>, id: MovieId, messages: &Messages) {
    let title = store
        .favorites()
        .iter()
        .find(|m| m.id == id)
        .map(|m| m.title.clone());
    match title {
        Some(title) if store.remove(id) => {
            println!("{}", messages.t_with("favoritesPage.removed", &[("title", &title)]));
        }
        _ => {
            let id = id.to_string();
            println!("{}", messages.t_with("favoritesPage.notFavorite", &[("id", &id)]));
        }
    }
}

fn list_favorites(store: &FavoritesStore<FileStorage>, messages: &Messages) {
    println!("{}", messages.t("favoritesPage.title"));
    if store.is_empty() {
        println!("  {}", messages.t("favoritesPage.noFavorites"));
        println!("  {}", messages.t("favoritesPage.noFavoritesDescription"));
        return;
    }
    let count = store.len().to_string();
    println!(
        "{}",
        messages.t_with("favoritesPage.totalFavorites", &[("count", &count)])
    );
    for movie in store.favorites() {
        println!("{}", movie_line(movie, messages));
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let loaded = dotenv();
    init_tracing();
    match loaded {
        Ok(path) => debug!("Loaded environment from {:?}", path),
        Err(e) => debug!("No .env file loaded ({}), relying on environment", e),
    }

    let args: Vec<String> = std::env::args().skip(1).collect();
    if matches!(args.first().map(String::as_str), Some("-h" | "--help" | "help")) {
        println!("{USAGE}");
        return Ok(());
    }
    let command = parse_args(&args)?;
    let config = Config::from_env()?;
    let messages = Messages::for_locale(config.locale);
    info!(locale = %config.locale, data_dir = %config.data_dir.display(), "moviehub starting");

    run(command, &config, &messages).await
}
