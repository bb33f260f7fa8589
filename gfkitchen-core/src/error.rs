use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("HTTP {status} fetching {url}")]
    Status { status: u16, url: String },
}

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Duplicate recipe slug: {0}")]
    DuplicateSlug(String),

    #[error("Invalid recipe slug {slug:?}: {reason}")]
    InvalidSlug { slug: String, reason: &'static str },

    #[error("Failed to read recipe catalog {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse recipe catalog {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}
