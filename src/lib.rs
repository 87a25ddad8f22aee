//! Data layer for a TMDB movie-discovery app: validated API access, a
//! coalescing query cache, persisted favorites, image URLs and localized
//! messages.

pub mod config;
pub mod error;
pub mod favorites;
pub mod i18n;
pub mod images;
pub mod query;
pub mod schema;
pub mod tmdb;
