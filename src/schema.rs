//! Typed shapes for every TMDB payload the app consumes, and the validator
//! that turns raw JSON into them.
//!
//! Optional fields carry their documented defaults; required fields fail
//! validation when absent. Nullable fields (`poster_path`, `tagline`, ...)
//! accept `null` but the key itself must be present.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashSet;

use crate::error::{Result, TmdbError};

pub type MovieId = u64;
pub type GenreId = u64;

/// A payload shape that can be validated from untyped JSON.
pub trait Shape: DeserializeOwned {
    const NAME: &'static str;

    /// Invariants serde cannot express.
    fn check(&self) -> std::result::Result<(), String> {
        Ok(())
    }
}

/// Validate `payload` as `T`, applying defaults. Returns a `Validation`
/// error naming the shape on any mismatch; no partial value escapes.
pub fn validate<T: Shape>(payload: Value) -> Result<T> {
    let value: T = serde_json::from_value(payload).map_err(|e| TmdbError::Validation {
        shape: T::NAME,
        reason: e.to_string(),
    })?;
    value.check().map_err(|reason| TmdbError::Validation {
        shape: T::NAME,
        reason,
    })?;
    Ok(value)
}

// Present-but-nullable: without `default`, a missing key is an error.
fn nullable<'de, D, T>(de: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(de)
}

fn default_language() -> String {
    "en".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Movie {
    pub id: MovieId,
    pub title: String,
    pub original_title: String,
    #[serde(default)]
    pub overview: String,
    #[serde(deserialize_with = "nullable")]
    pub poster_path: Option<String>,
    #[serde(deserialize_with = "nullable")]
    pub backdrop_path: Option<String>,
    /// Free text from the provider; may be empty or unparseable.
    #[serde(default)]
    pub release_date: String,
    #[serde(default)]
    pub vote_average: f64,
    #[serde(default)]
    pub vote_count: u64,
    #[serde(default)]
    pub popularity: f64,
    #[serde(default)]
    pub genre_ids: Vec<GenreId>,
    #[serde(default)]
    pub adult: bool,
    #[serde(default)]
    pub video: bool,
    #[serde(default = "default_language")]
    pub original_language: String,
}

impl Shape for Movie {
    const NAME: &'static str = "movie";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Genre {
    pub id: GenreId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenreList {
    pub genres: Vec<Genre>,
}

impl Shape for GenreList {
    const NAME: &'static str = "genre list";
}

impl GenreList {
    pub fn name_of(&self, id: GenreId) -> Option<&str> {
        self.genres
            .iter()
            .find(|g| g.id == id)
            .map(|g| g.name.as_str())
    }
}

/// English names of the provider's movie genres, for use before the
/// catalog has been fetched.
pub fn genre_name(id: GenreId) -> Option<&'static str> {
    let name = match id {
        28 => "Action",
        12 => "Adventure",
        16 => "Animation",
        35 => "Comedy",
        80 => "Crime",
        99 => "Documentary",
        18 => "Drama",
        10751 => "Family",
        14 => "Fantasy",
        36 => "History",
        27 => "Horror",
        10402 => "Music",
        9648 => "Mystery",
        10749 => "Romance",
        878 => "Science Fiction",
        10770 => "TV Movie",
        53 => "Thriller",
        10752 => "War",
        37 => "Western",
        _ => return None,
    };
    Some(name)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionCompany {
    pub id: u64,
    pub name: String,
    #[serde(deserialize_with = "nullable")]
    pub logo_path: Option<String>,
    pub origin_country: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionCountry {
    pub iso_3166_1: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpokenLanguage {
    pub iso_639_1: String,
    pub name: String,
    pub english_name: String,
}

/// Full record for one movie. Carries the summary fields except
/// `genre_ids`, which are replaced by the resolved `genres`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovieDetails {
    pub id: MovieId,
    pub title: String,
    pub original_title: String,
    #[serde(default)]
    pub overview: String,
    #[serde(deserialize_with = "nullable")]
    pub poster_path: Option<String>,
    #[serde(deserialize_with = "nullable")]
    pub backdrop_path: Option<String>,
    #[serde(default)]
    pub release_date: String,
    #[serde(default)]
    pub vote_average: f64,
    #[serde(default)]
    pub vote_count: u64,
    #[serde(default)]
    pub popularity: f64,
    #[serde(default)]
    pub adult: bool,
    #[serde(default)]
    pub video: bool,
    #[serde(default = "default_language")]
    pub original_language: String,
    /// Minutes.
    pub runtime: u32,
    pub genres: Vec<Genre>,
    /// 0 when the provider has no figure. A genuine zero budget looks the
    /// same; the provider offers no way to tell them apart.
    pub budget: u64,
    /// Same convention as `budget`.
    pub revenue: u64,
    pub status: String,
    #[serde(deserialize_with = "nullable")]
    pub tagline: Option<String>,
    #[serde(deserialize_with = "nullable")]
    pub homepage: Option<String>,
    #[serde(deserialize_with = "nullable")]
    pub imdb_id: Option<String>,
    pub production_companies: Vec<ProductionCompany>,
    pub production_countries: Vec<ProductionCountry>,
    pub spoken_languages: Vec<SpokenLanguage>,
}

impl Shape for MovieDetails {
    const NAME: &'static str = "movie details";
}

impl MovieDetails {
    /// Summary record for this movie, e.g. to store as a favorite from the
    /// details view.
    pub fn summary(&self) -> Movie {
        Movie {
            id: self.id,
            title: self.title.clone(),
            original_title: self.original_title.clone(),
            overview: self.overview.clone(),
            poster_path: self.poster_path.clone(),
            backdrop_path: self.backdrop_path.clone(),
            release_date: self.release_date.clone(),
            vote_average: self.vote_average,
            vote_count: self.vote_count,
            popularity: self.popularity,
            genre_ids: self.genres.iter().map(|g| g.id).collect(),
            adult: self.adult,
            video: self.video,
            original_language: self.original_language.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cast {
    pub id: u64,
    pub name: String,
    pub character: String,
    #[serde(deserialize_with = "nullable")]
    pub profile_path: Option<String>,
    pub order: u32,
    pub cast_id: u64,
    pub credit_id: String,
    pub gender: u8,
    pub known_for_department: String,
}

impl Shape for Cast {
    const NAME: &'static str = "cast member";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Crew {
    pub id: u64,
    pub name: String,
    pub job: String,
    pub department: String,
    #[serde(deserialize_with = "nullable")]
    pub profile_path: Option<String>,
    pub credit_id: String,
    pub gender: u8,
}

/// Cast is kept in the provider's billing order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credits {
    pub cast: Vec<Cast>,
    pub crew: Vec<Crew>,
}

impl Shape for Credits {
    const NAME: &'static str = "credits";
}

impl Credits {
    pub fn top_billed(&self, max: usize) -> &[Cast] {
        &self.cast[..self.cast.len().min(max)]
    }

    pub fn directors(&self) -> impl Iterator<Item = &Crew> {
        self.crew.iter().filter(|c| c.job == "Director")
    }
}

/// One page of any item shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paged<T> {
    pub page: u32,
    pub results: Vec<T>,
    pub total_pages: u32,
    pub total_results: u64,
}

impl<T: Shape> Shape for Paged<T> {
    const NAME: &'static str = "paged results";

    fn check(&self) -> std::result::Result<(), String> {
        if self.page < 1 {
            return Err(format!("page must be >= 1, got {}", self.page));
        }
        for (i, item) in self.results.iter().enumerate() {
            item.check()
                .map_err(|e| format!("results[{i}] ({}): {e}", T::NAME))?;
        }
        Ok(())
    }
}

impl<T> Paged<T> {
    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }
}

/// Append a later page to an accumulated list, skipping ids already seen.
/// Ids are only unique within a page, so infinite scroll needs this.
pub fn merge_pages(acc: &mut Vec<Movie>, page: &Paged<Movie>) -> usize {
    let mut seen: HashSet<MovieId> = acc.iter().map(|m| m.id).collect();
    let before = acc.len();
    for movie in &page.results {
        if seen.insert(movie.id) {
            acc.push(movie.clone());
        }
    }
    acc.len() - before
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn minimal_movie(id: u64) -> Value {
        json!({
            "id": id,
            "title": format!("Movie {id}"),
            "original_title": format!("Movie {id}"),
            "poster_path": null,
            "backdrop_path": null
        })
    }

    fn details_payload() -> Value {
        json!({
            "id": 550,
            "title": "Fight Club",
            "original_title": "Fight Club",
            "overview": "An insomniac office worker...",
            "poster_path": "/pB8BM7pdSp6B6Ih7QZ4DrQ3PmJK.jpg",
            "backdrop_path": null,
            "release_date": "1999-10-15",
            "vote_average": 8.4,
            "vote_count": 26280,
            "popularity": 61.4,
            "adult": false,
            "video": false,
            "original_language": "en",
            "runtime": 139,
            "genres": [{ "id": 18, "name": "Drama" }],
            "budget": 63000000,
            "revenue": 100853753,
            "status": "Released",
            "tagline": "Mischief. Mayhem. Soap.",
            "homepage": null,
            "imdb_id": "tt0137523",
            "production_companies": [
                { "id": 508, "name": "Regency Enterprises", "logo_path": null, "origin_country": "US" }
            ],
            "production_countries": [{ "iso_3166_1": "US", "name": "United States of America" }],
            "spoken_languages": [{ "iso_639_1": "en", "name": "English", "english_name": "English" }]
        })
    }

    #[test]
    fn movie_missing_optional_fields_gets_defaults() {
        let movie: Movie = validate(minimal_movie(7)).expect("valid movie");
        assert_eq!(movie.overview, "");
        assert_eq!(movie.release_date, "");
        assert_eq!(movie.vote_average, 0.0);
        assert_eq!(movie.vote_count, 0);
        assert_eq!(movie.popularity, 0.0);
        assert!(movie.genre_ids.is_empty());
        assert!(!movie.adult);
        assert!(!movie.video);
        assert_eq!(movie.original_language, "en");
    }

    #[test]
    fn movie_missing_nullable_key_is_rejected() {
        let mut payload = minimal_movie(7);
        payload.as_object_mut().unwrap().remove("poster_path");
        let err = validate::<Movie>(payload).unwrap_err();
        match err {
            TmdbError::Validation { shape, reason } => {
                assert_eq!(shape, "movie");
                assert!(reason.contains("poster_path"), "{reason}");
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn movie_with_wrong_type_is_rejected() {
        let mut payload = minimal_movie(7);
        payload["title"] = json!(42);
        assert!(matches!(
            validate::<Movie>(payload),
            Err(TmdbError::Validation { .. })
        ));
    }

    #[test]
    fn details_parse_and_keep_nullable_fields() {
        let details: MovieDetails = validate(details_payload()).expect("valid details");
        assert_eq!(details.runtime, 139);
        assert_eq!(details.genres[0].name, "Drama");
        assert_eq!(details.homepage, None);
        assert_eq!(details.imdb_id.as_deref(), Some("tt0137523"));
        assert_eq!(details.production_companies[0].logo_path, None);
    }

    #[test]
    fn details_missing_required_field_fails() {
        for field in ["status", "runtime", "genres", "budget", "revenue"] {
            let mut payload = details_payload();
            payload.as_object_mut().unwrap().remove(field);
            let err = validate::<MovieDetails>(payload).unwrap_err();
            assert!(
                matches!(&err, TmdbError::Validation { shape: "movie details", reason } if reason.contains(field)),
                "{field}: {err:?}"
            );
        }
    }

    #[test]
    fn details_summary_carries_genre_ids() {
        let details: MovieDetails = validate(details_payload()).unwrap();
        let summary = details.summary();
        assert_eq!(summary.id, 550);
        assert_eq!(summary.genre_ids, vec![18]);
        assert_eq!(summary.poster_path, details.poster_path);
    }

    #[test]
    fn paged_wrapper_validates_items() {
        let payload = json!({
            "page": 1,
            "results": [minimal_movie(1), minimal_movie(2)],
            "total_pages": 500,
            "total_results": 10000
        });
        let page: Paged<Movie> = validate(payload).unwrap();
        assert_eq!(page.results.len(), 2);
        assert_eq!(page.total_pages, 500);
        assert!(page.has_next());

        let bad = json!({
            "page": 1,
            "results": [{ "id": 1 }],
            "total_pages": 1,
            "total_results": 1
        });
        assert!(validate::<Paged<Movie>>(bad).is_err());
    }

    #[test]
    fn paged_wrapper_rejects_page_zero() {
        let payload = json!({ "page": 0, "results": [], "total_pages": 0, "total_results": 0 });
        let err = validate::<Paged<Movie>>(payload).unwrap_err();
        assert!(matches!(err, TmdbError::Validation { shape: "paged results", .. }));
    }

    #[test]
    fn paged_wrapper_composes_over_cast() {
        let payload = json!({
            "page": 1,
            "results": [{
                "id": 819, "name": "Edward Norton", "character": "The Narrator",
                "profile_path": null, "order": 0, "cast_id": 4,
                "credit_id": "52fe4250c3a36847f80149f3", "gender": 2,
                "known_for_department": "Acting"
            }],
            "total_pages": 1,
            "total_results": 1
        });
        let page: Paged<Cast> = validate(payload).unwrap();
        assert_eq!(page.results[0].name, "Edward Norton");
    }

    #[test]
    fn credits_keep_billing_order() {
        let cast = |id: u64, order: u32| {
            json!({
                "id": id, "name": format!("Actor {id}"), "character": "",
                "profile_path": null, "order": order, "cast_id": id,
                "credit_id": format!("c{id}"), "gender": 0,
                "known_for_department": "Acting"
            })
        };
        let payload = json!({
            "id": 550,
            "cast": [cast(3, 2), cast(1, 0), cast(2, 1)],
            "crew": [{
                "id": 7467, "name": "David Fincher", "job": "Director",
                "department": "Directing", "profile_path": null,
                "credit_id": "d1", "gender": 2
            }]
        });
        let credits: Credits = validate(payload).unwrap();
        let ids: Vec<u64> = credits.cast.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![3, 1, 2]);
        assert_eq!(credits.top_billed(2).len(), 2);
        assert_eq!(credits.directors().next().unwrap().name, "David Fincher");
    }

    #[test]
    fn merge_pages_drops_repeated_ids() {
        let first: Paged<Movie> = validate(json!({
            "page": 1, "results": [minimal_movie(1), minimal_movie(2)],
            "total_pages": 2, "total_results": 4
        }))
        .unwrap();
        let second: Paged<Movie> = validate(json!({
            "page": 2, "results": [minimal_movie(2), minimal_movie(3)],
            "total_pages": 2, "total_results": 4
        }))
        .unwrap();
        let mut acc = Vec::new();
        assert_eq!(merge_pages(&mut acc, &first), 2);
        assert_eq!(merge_pages(&mut acc, &second), 1);
        let ids: Vec<u64> = acc.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn genre_lookup_prefers_catalog_and_has_static_fallback() {
        let catalog: GenreList = validate(json!({ "genres": [{ "id": 28, "name": "أكشن" }] })).unwrap();
        assert_eq!(catalog.name_of(28), Some("أكشن"));
        assert_eq!(catalog.name_of(12), None);
        assert_eq!(genre_name(12), Some("Adventure"));
        assert_eq!(genre_name(1), None);
    }
}
