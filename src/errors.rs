use std::io;

use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("{0}")]
    Config(String),
    #[error("search service throttled the request (status {status})")]
    Throttled { status: u16 },
    #[error("search service returned a non-JSON response (content-type={content_type:?})")]
    Blocked { content_type: String },
    #[error("request to {endpoint} failed after {attempts} attempts: {keyword} (page={page})")]
    Fetch {
        endpoint: String,
        keyword: String,
        page: usize,
        attempts: u32,
        #[source]
        source: Box<AppError>,
    },
    #[error("search failed on all endpoints: {keyword} (page={page})")]
    Search {
        keyword: String,
        page: usize,
        #[source]
        source: Box<AppError>,
    },
    #[error("keyword {keyword:?} references unknown place_id {place_id:?}")]
    UnknownPlace { keyword: String, place_id: String },
    #[error("history store rejected: {0}")]
    Store(String),
}

impl AppError {
    pub fn is_throttle(&self) -> bool {
        matches!(self, AppError::Throttled { .. } | AppError::Blocked { .. })
    }
}
