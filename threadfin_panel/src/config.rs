use crate::error::ConfigError;
use crate::location::PageLocation;
use std::path::PathBuf;

pub const DEFAULT_PAGE_URL: &str = "http://127.0.0.1:34400/web/";
pub const DEFAULT_RELEASES_URL: &str =
    "https://api.github.com/repos/marcelGoerentz/Threadfin/releases";

#[derive(Debug, Clone)]
pub struct PanelConfig {
    pub page: PageLocation,
    /// Persists the session cookie between runs when set.
    pub cookie_file: Option<PathBuf>,
    /// Token to seed the cookie jar with, e.g. one copied from a browser session.
    pub initial_token: Option<String>,
    pub releases_url: String,
}

impl PanelConfig {
    pub fn new(page_url: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            page: PageLocation::parse(page_url)?,
            cookie_file: None,
            initial_token: None,
            releases_url: DEFAULT_RELEASES_URL.to_string(),
        })
    }

    pub fn with_cookie_file(mut self, path: Option<PathBuf>) -> Self {
        self.cookie_file = path;
        self
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.initial_token = token.filter(|t| !t.trim().is_empty());
        self
    }

    pub fn with_releases_url(mut self, url: Option<String>) -> Self {
        if let Some(url) = url {
            self.releases_url = url;
        }
        self
    }
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            page: PageLocation {
                scheme: crate::location::PageScheme::Http,
                host: "127.0.0.1".to_string(),
                port: Some(34400),
            },
            cookie_file: None,
            initial_token: None,
            releases_url: DEFAULT_RELEASES_URL.to_string(),
        }
    }
}
