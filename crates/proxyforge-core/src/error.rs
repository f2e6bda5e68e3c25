//! Error types for ProxyForge Core

/// Result type alias for ProxyForge operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for ProxyForge
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("fetch error: {message}")]
    Fetch { message: String },

    #[error("parse error: {message}")]
    Parse { message: String },

    #[error("queue error: {message}")]
    Queue { message: String },

    #[error("cache error: {message}")]
    Cache { message: String },

    #[error("probe error: {message}")]
    Probe { message: String },

    #[error("geoip error: {message}")]
    GeoIp { message: String },

    #[error("output error: {message}")]
    Output { message: String },

    #[error("configuration error: {message}")]
    Config { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("generic error: {0}")]
    Generic(String),
}

impl From<String> for Error {
    fn from(message: String) -> Self {
        Self::Generic(message)
    }
}

impl Error {
    pub fn fetch<S: Into<String>>(message: S) -> Self {
        Self::Fetch { message: message.into() }
    }

    pub fn parse<S: Into<String>>(message: S) -> Self {
        Self::Parse { message: message.into() }
    }

    pub fn queue<S: Into<String>>(message: S) -> Self {
        Self::Queue { message: message.into() }
    }

    pub fn cache<S: Into<String>>(message: S) -> Self {
        Self::Cache { message: message.into() }
    }

    pub fn probe<S: Into<String>>(message: S) -> Self {
        Self::Probe { message: message.into() }
    }

    pub fn geoip<S: Into<String>>(message: S) -> Self {
        Self::GeoIp { message: message.into() }
    }

    pub fn output<S: Into<String>>(message: S) -> Self {
        Self::Output { message: message.into() }
    }

    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into() }
    }

    pub fn generic<S: Into<String>>(message: S) -> Self {
        Self::Generic(message.into())
    }
}
