use thiserror::Error;

#[derive(Debug, Error)]
pub enum PanelError {
    #[error("malformed reply: {0}")]
    MalformedReply(#[from] serde_json::Error),
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("cookie store error: {0}")]
    CookieStore(#[from] std::io::Error),
    #[error("transport event channel closed")]
    ChannelClosed,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid page url {url}: {source}")]
    Url {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("unsupported page scheme {0:?} (expected http or https)")]
    UnsupportedScheme(String),
    #[error("page url {0} has no host")]
    MissingHost(String),
}
