use crate::schema::{Cast, Movie, MovieDetails};

pub const IMAGE_BASE: &str = "https://image.tmdb.org/t/p";
pub const PLACEHOLDER_URL: &str = "https://via.placeholder.com/500x750?text=No+Image";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Poster,
    Backdrop,
    Profile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageSize {
    Small,
    #[default]
    Medium,
    Large,
    Original,
}

impl ImageKind {
    /// TMDB size token for this asset kind.
    pub fn size_token(self, size: ImageSize) -> &'static str {
        match (self, size) {
            (_, ImageSize::Original) => "original",
            (ImageKind::Poster, ImageSize::Small) => "w185",
            (ImageKind::Poster, ImageSize::Medium) => "w342",
            (ImageKind::Poster, ImageSize::Large) => "w500",
            (ImageKind::Backdrop, ImageSize::Small) => "w300",
            (ImageKind::Backdrop, ImageSize::Medium) => "w780",
            (ImageKind::Backdrop, ImageSize::Large) => "w1280",
            (ImageKind::Profile, ImageSize::Small) => "w45",
            (ImageKind::Profile, ImageSize::Medium) => "w185",
            (ImageKind::Profile, ImageSize::Large) => "h632",
        }
    }
}

pub fn image_url(path: Option<&str>, kind: ImageKind, size: ImageSize) -> String {
    match path.filter(|p| !p.is_empty()) {
        Some(p) => format!("{IMAGE_BASE}/{}{p}", kind.size_token(size)),
        None => PLACEHOLDER_URL.to_string(),
    }
}

impl Movie {
    pub fn poster_url(&self, size: ImageSize) -> String {
        image_url(self.poster_path.as_deref(), ImageKind::Poster, size)
    }

    pub fn backdrop_url(&self, size: ImageSize) -> String {
        image_url(self.backdrop_path.as_deref(), ImageKind::Backdrop, size)
    }
}

impl MovieDetails {
    pub fn poster_url(&self, size: ImageSize) -> String {
        image_url(self.poster_path.as_deref(), ImageKind::Poster, size)
    }

    pub fn backdrop_url(&self, size: ImageSize) -> String {
        image_url(self.backdrop_path.as_deref(), ImageKind::Backdrop, size)
    }
}

impl Cast {
    pub fn profile_url(&self, size: ImageSize) -> String {
        image_url(self.profile_path.as_deref(), ImageKind::Profile, size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_url_from_size_token_and_path() {
        assert_eq!(
            image_url(Some("/abc.jpg"), ImageKind::Poster, ImageSize::Medium),
            "https://image.tmdb.org/t/p/w342/abc.jpg"
        );
        assert_eq!(
            image_url(Some("/abc.jpg"), ImageKind::Backdrop, ImageSize::Large),
            "https://image.tmdb.org/t/p/w1280/abc.jpg"
        );
        assert_eq!(
            image_url(Some("/abc.jpg"), ImageKind::Profile, ImageSize::Large),
            "https://image.tmdb.org/t/p/h632/abc.jpg"
        );
        assert_eq!(
            image_url(Some("/abc.jpg"), ImageKind::Profile, ImageSize::Original),
            "https://image.tmdb.org/t/p/original/abc.jpg"
        );
    }

    #[test]
    fn missing_path_maps_to_placeholder() {
        assert_eq!(
            image_url(None, ImageKind::Poster, ImageSize::Small),
            PLACEHOLDER_URL
        );
        assert_eq!(
            image_url(Some(""), ImageKind::Backdrop, ImageSize::Small),
            PLACEHOLDER_URL
        );
    }
}
