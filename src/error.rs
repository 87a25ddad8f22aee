use thiserror::Error;

/// The one error shape every TMDB fetch surfaces, whatever went wrong.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TmdbError {
    /// A required credential is missing. Nothing was sent.
    #[error("TMDB configuration error: {0}")]
    Config(String),

    /// The provider answered with a non-success status.
    #[error("TMDB API error: {status} {status_text}{}", message.as_deref().map(|m| format!(" ({m})")).unwrap_or_default())]
    Provider {
        status: u16,
        status_text: String,
        message: Option<String>,
    },

    /// The payload did not match the expected shape.
    #[error("TMDB response did not match {shape}: {reason}")]
    Validation { shape: &'static str, reason: String },

    /// DNS, connect, reset, body read...
    #[error("Failed to fetch from TMDB: {0}")]
    Network(String),
}

impl TmdbError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, TmdbError::Provider { .. } | TmdbError::Network(_))
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            TmdbError::Provider { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, TmdbError>;
